//! The shader that ray-marches a 3D density texture inside a unit cube.
//!
//! Resources:
//!
//! | Stage  | Slot | Resource                                   |
//! |--------|------|--------------------------------------------|
//! | Vertex | cb 0 | [`VolumeVertexUniforms`]                   |
//! | Pixel  | cb 0 | [`VolumePixelUniforms`]                    |
//! | Pixel  | cb 1 | [`SmokeUniforms`]                          |
//! | Pixel  | t 0  | density texture (3D, single float channel) |
//! | Pixel  | s 0  | linear sampler, clamped on U, V and W      |

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

use crate::config::SmokeProperties;
use crate::constant_buffer::{ConstantBuffer, gpu_matrix};
use crate::device::{
    BlendMode, CullMode, DeviceContext, GraphicsDevice, RasterState, ResourceBinding, ResourceId,
    SamplerDescription, SamplerId, ShaderStage, StageDescription, TextureDimension, TextureId,
};
use crate::error::{FrameSyncError, InitializationError};
use crate::mesh::Vertex3d;
use crate::shader::{Shader, ShaderCore, ShaderDescription, VertexLayout};

pub const VOLUME_SHADER_SOURCE: &str = "volume_render.wgsl";
pub const VOLUME_VERTEX_ENTRY: &str = "vs_volume";
pub const VOLUME_PIXEL_ENTRY: &str = "fs_volume";

/// Vertex stage constants.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct VolumeVertexUniforms {
    pub wvp: [[f32; 4]; 4],
    pub world: [[f32; 4]; 4],
}

/// Pixel stage constants describing the volume's placement and the eye.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct VolumePixelUniforms {
    pub dimensions: [f32; 3],
    pub _pad0: f32,
    pub scale: [f32; 3],
    pub _pad1: f32,
    pub translate: [f32; 3],
    pub _pad2: f32,
    pub eye_pos: [f32; 3],
    pub _pad3: f32,
}

/// Smoke shading constants.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct SmokeUniforms {
    pub color: [f32; 4],
    pub absorption: f32,
    pub num_samples: i32,
    pub _pad: [f32; 2],
}

const _: () = assert!(std::mem::size_of::<VolumeVertexUniforms>() % 16 == 0);
const _: () = assert!(std::mem::size_of::<VolumePixelUniforms>() % 16 == 0);
const _: () = assert!(std::mem::size_of::<SmokeUniforms>() % 16 == 0);

impl From<&SmokeProperties> for SmokeUniforms {
    fn from(smoke: &SmokeProperties) -> Self {
        Self {
            color: smoke.color.to_array(),
            absorption: smoke.absorption,
            num_samples: smoke.num_samples,
            _pad: [0.0; 2],
        }
    }
}

/// Ray-marching volume shader. Each instance owns its three constant buffers.
#[derive(Debug)]
pub struct VolumeShader {
    core: ShaderCore,
    vertex_stage: StageDescription,
    pixel_stage: StageDescription,
    vertex_buffer: Option<ConstantBuffer<VolumeVertexUniforms>>,
    pixel_buffer: Option<ConstantBuffer<VolumePixelUniforms>>,
    smoke_buffer: Option<ConstantBuffer<SmokeUniforms>>,
    sampler: Option<SamplerId>,
    texture: Option<TextureId>,
}

impl Default for VolumeShader {
    fn default() -> Self {
        Self::new(
            StageDescription::new(VOLUME_SHADER_SOURCE, VOLUME_VERTEX_ENTRY),
            StageDescription::new(VOLUME_SHADER_SOURCE, VOLUME_PIXEL_ENTRY),
        )
    }
}

fn uninitialized(buffer: &str) -> FrameSyncError {
    FrameSyncError::StaleResource(format!("volume {buffer} buffer was never created"))
}

impl VolumeShader {
    pub fn new(vertex_stage: StageDescription, pixel_stage: StageDescription) -> Self {
        Self {
            core: ShaderCore::default(),
            vertex_stage,
            pixel_stage,
            vertex_buffer: None,
            pixel_buffer: None,
            smoke_buffer: None,
            sampler: None,
            texture: None,
        }
    }

    /// Writes the vertex stage constants. Both matrices go through [`gpu_matrix`].
    pub fn set_vertex_buffer_values(
        &self,
        ctx: &mut dyn DeviceContext,
        wvp: Mat4,
        world: Mat4,
    ) -> Result<(), FrameSyncError> {
        let buffer = self
            .vertex_buffer
            .as_ref()
            .ok_or_else(|| uninitialized("vertex"))?;
        buffer.write(
            ctx,
            &VolumeVertexUniforms {
                wvp: gpu_matrix(wvp),
                world: gpu_matrix(world),
            },
        )
    }

    /// Writes the pixel stage constants and remembers `texture` for binding.
    pub fn set_pixel_buffer_values(
        &mut self,
        ctx: &mut dyn DeviceContext,
        scale: Vec3,
        translate: Vec3,
        eye_pos: Vec3,
        dimensions: Vec3,
        texture: TextureId,
    ) -> Result<(), FrameSyncError> {
        self.texture = Some(texture);
        let buffer = self
            .pixel_buffer
            .as_ref()
            .ok_or_else(|| uninitialized("pixel"))?;
        buffer.write(
            ctx,
            &VolumePixelUniforms {
                dimensions: dimensions.to_array(),
                scale: scale.to_array(),
                translate: translate.to_array(),
                eye_pos: eye_pos.to_array(),
                ..Default::default()
            },
        )
    }

    pub fn set_smoke_properties(
        &self,
        ctx: &mut dyn DeviceContext,
        smoke: &SmokeProperties,
    ) -> Result<(), FrameSyncError> {
        let buffer = self
            .smoke_buffer
            .as_ref()
            .ok_or_else(|| uninitialized("smoke"))?;
        buffer.write(ctx, &SmokeUniforms::from(smoke))
    }

    /// The texture bound at pixel slot 0 by the next
    /// [`bind_shader_resources`](Shader::bind_shader_resources).
    pub fn texture(&self) -> Option<TextureId> {
        self.texture
    }
}

impl Shader for VolumeShader {
    fn description(&self) -> ShaderDescription {
        ShaderDescription {
            vertex: self.vertex_stage.clone(),
            pixel: self.pixel_stage.clone(),
            elements: Vertex3d::ELEMENTS.to_vec(),
            bindings: vec![
                ResourceBinding::constant_buffer(
                    ShaderStage::Vertex,
                    0,
                    ConstantBuffer::<VolumeVertexUniforms>::SIZE,
                ),
                ResourceBinding::constant_buffer(
                    ShaderStage::Pixel,
                    0,
                    ConstantBuffer::<VolumePixelUniforms>::SIZE,
                ),
                ResourceBinding::constant_buffer(
                    ShaderStage::Pixel,
                    1,
                    ConstantBuffer::<SmokeUniforms>::SIZE,
                ),
                ResourceBinding::texture(ShaderStage::Pixel, 0, TextureDimension::D3),
                ResourceBinding::sampler(ShaderStage::Pixel, 0),
            ],
            raster: RasterState {
                blend: BlendMode::Alpha,
                cull: CullMode::Back,
            },
        }
    }

    fn core(&self) -> &ShaderCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ShaderCore {
        &mut self.core
    }

    fn specific_initialization(
        &mut self,
        device: &mut dyn GraphicsDevice,
    ) -> Result<(), InitializationError> {
        self.vertex_buffer = Some(ConstantBuffer::create(device, "Volume Vertex Uniforms")?);
        self.pixel_buffer = Some(ConstantBuffer::create(device, "Volume Pixel Uniforms")?);
        self.smoke_buffer = Some(ConstantBuffer::create(device, "Smoke Uniforms")?);
        self.sampler = Some(device.create_sampler(&SamplerDescription::LINEAR_CLAMP)?);
        Ok(())
    }

    fn bind_shader_resources(&self, ctx: &mut dyn DeviceContext) -> Result<(), FrameSyncError> {
        let (Some(vertex), Some(pixel), Some(smoke)) = (
            self.vertex_buffer.as_ref(),
            self.pixel_buffer.as_ref(),
            self.smoke_buffer.as_ref(),
        ) else {
            return Err(uninitialized("constant"));
        };

        ctx.set_constant_buffers(ShaderStage::Vertex, 0, &[vertex.id()]);
        ctx.set_constant_buffers(ShaderStage::Pixel, 0, &[pixel.id(), smoke.id()]);
        ctx.set_texture(ShaderStage::Pixel, 0, self.texture);
        Ok(())
    }

    fn apply_samplers(&self, ctx: &mut dyn DeviceContext) {
        if let Some(sampler) = self.sampler {
            ctx.set_samplers(ShaderStage::Pixel, 0, &[sampler]);
        }
    }

    fn release_resources(&mut self, device: &mut dyn GraphicsDevice) {
        if let Some(buffer) = self.vertex_buffer.take() {
            buffer.release(device);
        }
        if let Some(buffer) = self.pixel_buffer.take() {
            buffer.release(device);
        }
        if let Some(buffer) = self.smoke_buffer.take() {
            buffer.release(device);
        }
        if let Some(sampler) = self.sampler.take() {
            device.release(ResourceId::Sampler(sampler));
        }
        self.texture = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Call, DeviceCall, RecordingDevice};
    use crate::shader::{InputLayoutSchema, initialize_shader};

    fn ready_shader(device: &mut RecordingDevice) -> VolumeShader {
        let mut shader = VolumeShader::default();
        initialize_shader(&mut shader, device, "volume-test").unwrap();
        shader
    }

    #[test]
    fn payload_sizes() {
        assert_eq!(std::mem::size_of::<VolumeVertexUniforms>(), 128);
        assert_eq!(std::mem::size_of::<VolumePixelUniforms>(), 64);
        assert_eq!(std::mem::size_of::<SmokeUniforms>(), 32);
    }

    #[test]
    fn declared_layout_matches_cube_vertices() {
        let description = VolumeShader::default().description();
        let schema = InputLayoutSchema::new(&description.elements);
        assert_eq!(schema.validate_against::<Vertex3d>(), Ok(()));
    }

    #[test]
    fn creates_three_buffers_and_one_clamped_sampler() {
        let mut device = RecordingDevice::new();
        let _shader = ready_shader(&mut device);

        let calls = device.calls();
        let buffers = calls
            .iter()
            .filter(|c| matches!(c, DeviceCall::CreateConstantBuffer { .. }))
            .count();
        assert_eq!(buffers, 3);
        assert!(calls.contains(&DeviceCall::CreateSampler(SamplerDescription::LINEAR_CLAMP)));
    }

    #[test]
    fn sampler_failure_fails_initialization() {
        let mut device = RecordingDevice::new();
        device.fail_sampler_creation(true);
        let mut shader = VolumeShader::default();

        let err = initialize_shader(&mut shader, &mut device, "volume-test");

        assert!(matches!(err, Err(InitializationError::SamplerCreation)));
        assert!(!shader.is_ready());
        assert_eq!(device.live_buffers(), 0);
    }

    #[test]
    fn vertex_values_are_converted() {
        let mut device = RecordingDevice::new();
        let shader = ready_shader(&mut device);
        let mut ctx = device.context();

        let world = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
        shader
            .set_vertex_buffer_values(&mut ctx, Mat4::IDENTITY, world)
            .unwrap();

        let id = shader.vertex_buffer.as_ref().unwrap().id();
        let written: VolumeVertexUniforms =
            bytemuck::pod_read_unaligned(ctx.buffer_contents(id).unwrap());
        assert_eq!(written.world, gpu_matrix(world));
        assert_eq!(written.wvp, gpu_matrix(Mat4::IDENTITY));
    }

    #[test]
    fn smoke_values_are_forwarded() {
        let mut device = RecordingDevice::new();
        let shader = ready_shader(&mut device);
        let mut ctx = device.context();

        let smoke = SmokeProperties::new().absorption(12.5).num_samples(32);
        shader.set_smoke_properties(&mut ctx, &smoke).unwrap();

        let id = shader.smoke_buffer.as_ref().unwrap().id();
        let written: SmokeUniforms = bytemuck::pod_read_unaligned(ctx.buffer_contents(id).unwrap());
        assert_eq!(written.absorption, 12.5);
        assert_eq!(written.num_samples, 32);
        assert_eq!(written.color, [1.0; 4]);
    }

    #[test]
    fn binds_fixed_slots() {
        let mut device = RecordingDevice::new();
        let texture = device.create_texture(TextureDimension::D3);
        let mut shader = ready_shader(&mut device);
        let mut ctx = device.context();

        shader
            .set_pixel_buffer_values(
                &mut ctx,
                Vec3::ONE,
                Vec3::ZERO,
                Vec3::Z,
                Vec3::splat(8.0),
                texture,
            )
            .unwrap();
        ctx.clear_calls();
        shader.bind_shader_resources(&mut ctx).unwrap();
        shader.apply_samplers(&mut ctx);

        let vertex = shader.vertex_buffer.as_ref().unwrap().id();
        let pixel = shader.pixel_buffer.as_ref().unwrap().id();
        let smoke = shader.smoke_buffer.as_ref().unwrap().id();
        assert_eq!(
            ctx.calls(),
            &[
                Call::SetConstantBuffers {
                    stage: ShaderStage::Vertex,
                    start_slot: 0,
                    buffers: vec![vertex],
                },
                Call::SetConstantBuffers {
                    stage: ShaderStage::Pixel,
                    start_slot: 0,
                    buffers: vec![pixel, smoke],
                },
                Call::SetTexture {
                    stage: ShaderStage::Pixel,
                    slot: 0,
                    texture: Some(texture),
                },
                Call::SetSamplers {
                    stage: ShaderStage::Pixel,
                    start_slot: 0,
                    samplers: vec![shader.sampler.unwrap()],
                },
            ]
        );
    }

    #[test]
    fn buffers_not_written_in_a_context_decode_as_none() {
        let mut device = RecordingDevice::new();
        let texture = device.create_texture(TextureDimension::D3);
        let cube = crate::mesh::Mesh::cube(&mut device).unwrap();
        let mut shader = ready_shader(&mut device);

        let mut writer = device.context();
        shader
            .set_pixel_buffer_values(
                &mut writer,
                Vec3::ONE,
                Vec3::ZERO,
                Vec3::Z,
                Vec3::splat(8.0),
                texture,
            )
            .unwrap();

        // a second context binds the same buffers but never writes them
        let mut ctx = device.context();
        shader.bind_shader_resources(&mut ctx).unwrap();
        shader.apply_samplers(&mut ctx);
        let state = shader.programs().unwrap().draw_state();
        ctx.draw_indexed(cube.geometry(), &state).unwrap();

        let draw = &ctx.draws()[0];
        assert!(draw.constant::<VolumePixelUniforms>(ShaderStage::Pixel, 0).is_none());
        assert!(draw.constant::<SmokeUniforms>(ShaderStage::Pixel, 1).is_none());
        assert!(draw.constant::<VolumeVertexUniforms>(ShaderStage::Vertex, 0).is_none());
    }

    #[test]
    fn writes_before_initialization_fail() {
        let device = RecordingDevice::new();
        let shader = VolumeShader::default();
        let mut ctx = device.context();

        let err = shader.set_vertex_buffer_values(&mut ctx, Mat4::IDENTITY, Mat4::IDENTITY);

        assert!(matches!(err, Err(FrameSyncError::StaleResource(_))));
        assert!(ctx.calls().is_empty());
    }
}
