//! Renders a 3D density texture as smoke inside a unit cube proxy.
//!
//! Each frame [`VolumeRenderer::render_volume`]:
//!
//! 1. builds the world matrix from the renderer's [`Transform`]
//! 2. reads the camera's eye position
//! 3. computes `wvp = proj * view * world`
//! 4. writes the vertex, pixel and smoke constant buffers (in that order)
//! 5. binds resources and samplers
//! 6. draws the cube
//!
//! All values are sent again every frame. A failed buffer write aborts the
//! frame's draw; the next frame starts over.
//!
//! ```no_run
//! use plume::{Camera, Mat4, TextureId, Vec3, VolumeRenderer};
//! # fn demo(
//! #     device: &mut dyn plume::GraphicsDevice,
//! #     ctx: &mut dyn plume::DeviceContext,
//! #     density: TextureId,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let mut volume = VolumeRenderer::new(Vec3::splat(64.0), Vec3::ZERO);
//! volume.initialize(device, "demo")?;
//!
//! let camera = Camera::new().at(Vec3::new(0.0, 0.0, -3.0)).looking_at(Vec3::ZERO);
//! let view = camera.view_matrix();
//! let proj = camera.projection_matrix(16.0 / 9.0, 0.1, 100.0);
//! volume.render_volume(ctx, density, &camera, view, proj)?;
//! # Ok(())
//! # }
//! ```

use std::rc::Rc;

use glam::{Mat4, Vec3};

use crate::bounds::{Bounds, BoundsShape};
use crate::camera::EyePosition;
use crate::config::{SmokeProperties, VolumeConfig};
use crate::device::{DeviceContext, GraphicsDevice, TextureId};
use crate::error::{InitializationError, RenderError};
use crate::game_object::{GameObject, ObjectId};
use crate::mesh::Mesh;
use crate::shader::{Shader, initialize_shader};
use crate::transform::Transform;
use crate::volume_shader::VolumeShader;

/// A smoke volume placed in the scene.
pub struct VolumeRenderer {
    id: ObjectId,
    transform: Transform,
    bounds: Bounds,
    volume_size: Vec3,
    shader: VolumeShader,
    cube: Option<Mesh>,
    smoke: SmokeProperties,
    source_texture: Option<TextureId>,
    camera: Option<Rc<dyn EyePosition>>,
}

impl VolumeRenderer {
    /// A renderer for a `volume_size` grid at `position`, unit scale.
    pub fn new(volume_size: Vec3, position: Vec3) -> Self {
        let id = ObjectId::next();
        Self {
            id,
            transform: Transform::owned_by(id).position(position),
            bounds: Bounds::owned_by(id, BoundsShape::UNIT_BOX),
            volume_size,
            shader: VolumeShader::default(),
            cube: None,
            smoke: SmokeProperties::default(),
            source_texture: None,
            camera: None,
        }
    }

    pub fn from_config(config: &VolumeConfig) -> Self {
        let mut renderer = Self::new(config.size.as_vec3(), config.position);
        renderer.shader = VolumeShader::new(config.vertex_stage.clone(), config.pixel_stage.clone());
        renderer.smoke = config.smoke;
        renderer
    }

    /// Builds the shader and the cube proxy. Fails if either fails.
    pub fn initialize(
        &mut self,
        device: &mut dyn GraphicsDevice,
        window: &str,
    ) -> Result<(), InitializationError> {
        initialize_shader(&mut self.shader, device, window)?;

        match Mesh::cube(device) {
            Ok(cube) => {
                self.cube = Some(cube);
                Ok(())
            }
            Err(e) => {
                log::error!("[{window}] volume proxy: {e}");
                self.shader.dispose(device);
                Err(e)
            }
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.shader.is_ready() && self.cube.is_some()
    }

    /// Draws `texture` as smoke seen from `camera`.
    pub fn render_volume(
        &mut self,
        ctx: &mut dyn DeviceContext,
        texture: TextureId,
        camera: &dyn EyePosition,
        view: Mat4,
        proj: Mat4,
    ) -> Result<(), RenderError> {
        let (Some(cube), Some(programs)) = (self.cube, self.shader.programs().copied()) else {
            return Err(RenderError::NotInitialized);
        };

        let world = self.transform.world_matrix();
        let eye = camera.eye_position();
        let wvp = proj * view * world;

        self.shader.set_vertex_buffer_values(ctx, wvp, world)?;
        self.shader.set_pixel_buffer_values(
            ctx,
            self.transform.scale_factors(),
            self.transform.position,
            eye,
            self.volume_size,
            texture,
        )?;
        self.shader.set_smoke_properties(ctx, &self.smoke)?;

        self.shader.bind_shader_resources(ctx)?;
        self.shader.apply_samplers(ctx);

        ctx.draw_indexed(cube.geometry(), &programs.draw_state())?;
        Ok(())
    }

    /// Moves the volume. Takes effect on the next render.
    pub fn set_position(&mut self, position: Vec3) {
        self.transform.position = position;
    }

    pub fn set_source_texture(&mut self, texture: TextureId) {
        self.source_texture = Some(texture);
    }

    pub fn set_camera(&mut self, camera: Rc<dyn EyePosition>) {
        self.camera = Some(camera);
    }

    pub fn volume_size(&self) -> Vec3 {
        self.volume_size
    }

    pub fn smoke_properties(&self) -> &SmokeProperties {
        &self.smoke
    }

    /// Live-editable smoke settings, picked up on the next render.
    pub fn smoke_properties_mut(&mut self) -> &mut SmokeProperties {
        &mut self.smoke
    }

    pub fn dispose(&mut self, device: &mut dyn GraphicsDevice) {
        self.shader.dispose(device);
        if let Some(cube) = self.cube.take() {
            cube.release(device);
        }
    }
}

impl GameObject for VolumeRenderer {
    fn id(&self) -> ObjectId {
        self.id
    }

    fn transform(&self) -> &Transform {
        &self.transform
    }

    fn transform_mut(&mut self) -> &mut Transform {
        &mut self.transform
    }

    fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    fn update(&mut self) {
        self.bounds.update(&self.transform);
    }

    fn render(
        &mut self,
        ctx: &mut dyn DeviceContext,
        view: Mat4,
        proj: Mat4,
    ) -> Result<(), RenderError> {
        let texture = self.source_texture.ok_or(RenderError::MissingSourceTexture)?;
        let camera = self.camera.clone().ok_or(RenderError::MissingCamera)?;
        self.render_volume(ctx, texture, &*camera, view, proj)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::backend::{Call, RecordingDevice};
    use crate::camera::Camera;
    use crate::constant_buffer::gpu_matrix;
    use crate::device::{ShaderStage, TextureDimension};
    use crate::error::FrameSyncError;
    use crate::volume_shader::{SmokeUniforms, VolumePixelUniforms, VolumeVertexUniforms};

    struct Fixture {
        device: RecordingDevice,
        texture: TextureId,
        camera: Camera,
        view: Mat4,
        proj: Mat4,
    }

    fn fixture() -> Fixture {
        let mut device = RecordingDevice::new();
        let texture = device.create_texture(TextureDimension::D3);
        let camera = Camera::new()
            .at(Vec3::new(0.0, 0.0, -5.0))
            .looking_at(Vec3::ZERO);
        Fixture {
            device,
            texture,
            view: camera.view_matrix(),
            proj: camera.projection_matrix(16.0 / 9.0, 0.1, 100.0),
            camera,
        }
    }

    fn ready_renderer(f: &mut Fixture, size: Vec3, position: Vec3) -> VolumeRenderer {
        let mut renderer = VolumeRenderer::new(size, position);
        renderer.initialize(&mut f.device, "volume-test").unwrap();
        renderer
    }

    #[test]
    fn three_writes_then_binds_then_one_draw() {
        let mut f = fixture();
        let mut renderer = ready_renderer(&mut f, Vec3::splat(2.0), Vec3::ZERO);
        let mut ctx = f.device.context();

        renderer
            .render_volume(&mut ctx, f.texture, &f.camera, f.view, f.proj)
            .unwrap();

        let calls = ctx.calls();
        let maps: Vec<_> = calls.iter().filter(|c| c.is_map()).collect();
        let unmaps = calls.iter().filter(|c| matches!(c, Call::Unmap(_))).count();
        assert_eq!(maps.len(), 3);
        assert_eq!(unmaps, 3);

        // every write is closed before the next opens
        for pair in calls[..6].chunks(2) {
            match pair {
                [Call::Map(a), Call::Unmap(b)] => assert_eq!(a, b),
                other => panic!("expected map/unmap pair, got {other:?}"),
            }
        }

        let first_bind = calls.iter().position(Call::is_bind).unwrap();
        assert_eq!(first_bind, 6);
        assert!(calls[6..calls.len() - 1].iter().all(Call::is_bind));
        assert!(matches!(calls.last(), Some(Call::Draw(_))));
        assert_eq!(ctx.draws().len(), 1);
    }

    #[test]
    fn identity_volume_seen_from_minus_z() {
        let mut f = fixture();
        let mut renderer = ready_renderer(&mut f, Vec3::splat(2.0), Vec3::ZERO);
        let mut ctx = f.device.context();

        renderer
            .render_volume(&mut ctx, f.texture, &f.camera, f.view, f.proj)
            .unwrap();

        let draw = &ctx.draws()[0];
        let vertex: VolumeVertexUniforms = draw.constant(ShaderStage::Vertex, 0).unwrap();
        assert_eq!(vertex.wvp, gpu_matrix(f.proj * f.view));
        assert_eq!(vertex.world, gpu_matrix(Mat4::IDENTITY));

        let pixel: VolumePixelUniforms = draw.constant(ShaderStage::Pixel, 0).unwrap();
        assert_eq!(pixel.eye_pos, [0.0, 0.0, -5.0]);
        assert_eq!(pixel.dimensions, [2.0, 2.0, 2.0]);
        assert_eq!(pixel.scale, [1.0, 1.0, 1.0]);
        assert_eq!(pixel.translate, [0.0, 0.0, 0.0]);

        let smoke: SmokeUniforms = draw.constant(ShaderStage::Pixel, 1).unwrap();
        assert_eq!(smoke, SmokeUniforms::from(&SmokeProperties::default()));
        assert_eq!(draw.textures.get(&0), Some(&f.texture));
    }

    #[test]
    fn failed_map_skips_draw_and_recovers() {
        let mut f = fixture();
        let mut renderer = ready_renderer(&mut f, Vec3::splat(2.0), Vec3::ZERO);
        let mut ctx = f.device.context();

        ctx.fail_next_map();
        let err = renderer.render_volume(&mut ctx, f.texture, &f.camera, f.view, f.proj);

        assert!(matches!(
            err,
            Err(RenderError::FrameSync(FrameSyncError::MapFailed { .. }))
        ));
        assert!(ctx.draws().is_empty());
        assert!(!ctx.calls().iter().any(|c| matches!(c, Call::Draw(_))));
        assert_eq!(ctx.open_maps(), 0);

        ctx.clear_calls();
        renderer
            .render_volume(&mut ctx, f.texture, &f.camera, f.view, f.proj)
            .unwrap();
        assert_eq!(ctx.draws().len(), 1);
    }

    #[test]
    fn renderers_do_not_share_buffers() {
        let mut f = fixture();
        let mut left = ready_renderer(&mut f, Vec3::splat(2.0), Vec3::new(-3.0, 0.0, 0.0));
        let mut right = ready_renderer(&mut f, Vec3::splat(4.0), Vec3::new(3.0, 0.0, 0.0));
        let mut ctx = f.device.context();

        left.render_volume(&mut ctx, f.texture, &f.camera, f.view, f.proj)
            .unwrap();
        right
            .render_volume(&mut ctx, f.texture, &f.camera, f.view, f.proj)
            .unwrap();

        let draws = ctx.draws();
        let a: VolumePixelUniforms = draws[0].constant(ShaderStage::Pixel, 0).unwrap();
        let b: VolumePixelUniforms = draws[1].constant(ShaderStage::Pixel, 0).unwrap();
        assert_eq!(a.translate, [-3.0, 0.0, 0.0]);
        assert_eq!(a.dimensions, [2.0; 3]);
        assert_eq!(b.translate, [3.0, 0.0, 0.0]);
        assert_eq!(b.dimensions, [4.0; 3]);

        let mapped: Vec<_> = ctx
            .calls()
            .iter()
            .filter_map(|c| match c {
                Call::Map(id) => Some(*id),
                _ => None,
            })
            .collect();
        assert!(mapped[..3].iter().all(|id| !mapped[3..].contains(id)));
    }

    #[test]
    fn set_position_shows_on_next_render() {
        let mut f = fixture();
        let mut renderer = ready_renderer(&mut f, Vec3::splat(2.0), Vec3::ZERO);
        let mut ctx = f.device.context();

        renderer
            .render_volume(&mut ctx, f.texture, &f.camera, f.view, f.proj)
            .unwrap();
        renderer.set_position(Vec3::new(0.0, 1.5, 0.0));
        renderer
            .render_volume(&mut ctx, f.texture, &f.camera, f.view, f.proj)
            .unwrap();

        let draws = ctx.draws();
        let before: VolumePixelUniforms = draws[0].constant(ShaderStage::Pixel, 0).unwrap();
        let after: VolumePixelUniforms = draws[1].constant(ShaderStage::Pixel, 0).unwrap();
        assert_eq!(before.translate, [0.0; 3]);
        assert_eq!(after.translate, [0.0, 1.5, 0.0]);

        let vertex: VolumeVertexUniforms = draws[1].constant(ShaderStage::Vertex, 0).unwrap();
        assert_eq!(vertex.world[3], [0.0, 1.5, 0.0, 1.0]);
    }

    #[test]
    fn values_are_resent_every_frame() {
        let mut f = fixture();
        let mut renderer = ready_renderer(&mut f, Vec3::splat(2.0), Vec3::ZERO);
        let mut ctx = f.device.context();

        for _ in 0..3 {
            renderer
                .render_volume(&mut ctx, f.texture, &f.camera, f.view, f.proj)
                .unwrap();
        }

        assert_eq!(ctx.calls().iter().filter(|c| c.is_map()).count(), 9);
        assert_eq!(ctx.draws().len(), 3);
    }

    #[test]
    fn smoke_edits_are_forwarded() {
        let mut f = fixture();
        let mut renderer = ready_renderer(&mut f, Vec3::splat(2.0), Vec3::ZERO);
        let mut ctx = f.device.context();

        renderer.smoke_properties_mut().absorption = 5.0;
        renderer.smoke_properties_mut().num_samples = 128;
        renderer
            .render_volume(&mut ctx, f.texture, &f.camera, f.view, f.proj)
            .unwrap();

        let smoke: SmokeUniforms = ctx.draws()[0].constant(ShaderStage::Pixel, 1).unwrap();
        assert_eq!(smoke.absorption, 5.0);
        assert_eq!(smoke.num_samples, 128);
    }

    #[test]
    fn failed_initialization_blocks_rendering() {
        let mut f = fixture();
        f.device.fail_stage(ShaderStage::Pixel);
        let mut renderer = VolumeRenderer::new(Vec3::splat(2.0), Vec3::ZERO);

        let err = renderer.initialize(&mut f.device, "volume-test");
        assert!(matches!(
            err,
            Err(InitializationError::StageCompilation { stage: ShaderStage::Pixel, .. })
        ));
        assert!(!renderer.is_initialized());

        let mut ctx = f.device.context();
        let err = renderer.render_volume(&mut ctx, f.texture, &f.camera, f.view, f.proj);
        assert!(matches!(err, Err(RenderError::NotInitialized)));
        assert!(ctx.calls().is_empty());
    }

    #[test]
    fn game_object_render_needs_texture_and_camera() {
        let mut f = fixture();
        let mut renderer = ready_renderer(&mut f, Vec3::splat(2.0), Vec3::ZERO);
        let mut ctx = f.device.context();

        let err = renderer.render(&mut ctx, f.view, f.proj);
        assert!(matches!(err, Err(RenderError::MissingSourceTexture)));

        renderer.set_source_texture(f.texture);
        let err = renderer.render(&mut ctx, f.view, f.proj);
        assert!(matches!(err, Err(RenderError::MissingCamera)));
        assert!(ctx.calls().is_empty());

        let camera = Rc::new(Cell::new(f.camera));
        renderer.set_camera(camera.clone());
        camera.set(f.camera.at(Vec3::new(0.0, 2.0, -5.0)));
        renderer.render(&mut ctx, f.view, f.proj).unwrap();

        let pixel: VolumePixelUniforms = ctx.draws()[0].constant(ShaderStage::Pixel, 0).unwrap();
        assert_eq!(pixel.eye_pos, [0.0, 2.0, -5.0]);
    }

    #[test]
    fn dispose_releases_all_buffers() {
        let mut f = fixture();
        let mut renderer = ready_renderer(&mut f, Vec3::splat(2.0), Vec3::ZERO);
        assert_eq!(f.device.live_buffers(), 3);

        renderer.dispose(&mut f.device);

        assert_eq!(f.device.live_buffers(), 0);
        assert!(!renderer.is_initialized());
    }
}
