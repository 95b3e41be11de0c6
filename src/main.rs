use std::cell::Cell;
use std::error::Error;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;

use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use plume::{
    AppConfig, Camera, GameObject, GpuContext, GraphicsDevice, GraphicsSystem, InitializationError,
    Input, InputSystem, KeyCode, MouseButton, Primitive, PrimitiveGameObject, Scene, Services,
    SmokeProperties, TextureDimension, UVec3, Vec3, Vec4, VolumeRenderer, WgpuDevice, init_logging,
};

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
const MOVE_SPEED: f32 = 1.5;
const ORBIT_SPEED: f32 = 0.005;
const CAMERA_DISTANCE: f32 = 3.5;

/// An animated density field standing in for a fluid simulation.
struct DensityField {
    texture: wgpu::Texture,
    size: UVec3,
    cells: Vec<u8>,
}

impl DensityField {
    fn new(device: &wgpu::Device, size: UVec3) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Density Field"),
            size: extent(size),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D3,
            format: wgpu::TextureFormat::R8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        Self {
            texture,
            size,
            cells: vec![0; (size.x * size.y * size.z) as usize],
        }
    }

    fn view(&self) -> wgpu::TextureView {
        self.texture.create_view(&wgpu::TextureViewDescriptor {
            dimension: Some(wgpu::TextureViewDimension::D3),
            ..Default::default()
        })
    }

    /// Three drifting puffs with a little swirl.
    fn fill(&mut self, time: f32) {
        let puffs = [
            (Vec3::new(0.5 + 0.2 * time.sin(), 0.35, 0.5), 0.18),
            (Vec3::new(0.5, 0.55 + 0.1 * (time * 0.7).cos(), 0.5 + 0.2 * (time * 0.5).sin()), 0.22),
            (Vec3::new(0.45 + 0.15 * (time * 1.3).cos(), 0.75, 0.45), 0.14),
        ];
        let dims = self.size.as_vec3();

        let mut i = 0;
        for z in 0..self.size.z {
            for y in 0..self.size.y {
                for x in 0..self.size.x {
                    let p = (Vec3::new(x as f32, y as f32, z as f32) + 0.5) / dims;
                    let swirl = 0.5
                        + 0.5 * (p.x * 13.0 + time).sin() * (p.y * 11.0 - time * 0.8).cos()
                            * (p.z * 9.0 + time * 0.6).sin();

                    let mut density = 0.0;
                    for (center, radius) in puffs {
                        let d = (p - center).length_squared() / (radius * radius);
                        density += (-d).exp();
                    }

                    self.cells[i] = ((density * (0.6 + 0.4 * swirl)).clamp(0.0, 1.0) * 255.0) as u8;
                    i += 1;
                }
            }
        }
    }

    fn upload(&self, queue: &wgpu::Queue) {
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &self.cells,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(self.size.x),
                rows_per_image: Some(self.size.y),
            },
            extent(self.size),
        );
    }
}

fn extent(size: UVec3) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width: size.x,
        height: size.y,
        depth_or_array_layers: size.z,
    }
}

fn depth_view(gpu: &GpuContext) -> wgpu::TextureView {
    gpu.device
        .create_texture(&wgpu::TextureDescriptor {
            label: Some("Depth"),
            size: wgpu::Extent3d {
                width: gpu.width(),
                height: gpu.height(),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        })
        .create_view(&wgpu::TextureViewDescriptor::default())
}

/// The window's graphics system: surface, device and depth target.
struct WindowGraphics {
    label: String,
    window: Arc<Window>,
    gpu: GpuContext,
    device: WgpuDevice,
    depth: wgpu::TextureView,
}

impl WindowGraphics {
    fn new(window: Arc<Window>, label: &str) -> Result<Self, InitializationError> {
        let gpu = GpuContext::new(window.clone())?;
        let device = WgpuDevice::with_formats(
            gpu.device.clone(),
            gpu.queue.clone(),
            gpu.config.format,
            Some(DEPTH_FORMAT),
        );
        let depth = depth_view(&gpu);

        Ok(Self {
            label: label.to_string(),
            window,
            gpu,
            device,
            depth,
        })
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.gpu.resize(width, height);
        self.depth = depth_view(&self.gpu);
    }
}

impl GraphicsSystem for WindowGraphics {
    fn window_label(&self) -> &str {
        &self.label
    }

    fn aspect(&self) -> f32 {
        self.gpu.aspect()
    }

    fn device(&mut self) -> &mut dyn GraphicsDevice {
        &mut self.device
    }
}

type DemoServices = Services<Input, WindowGraphics>;

/// Scene content and camera state.
struct Demo {
    density: DensityField,
    scene: Scene,
    volume: VolumeRenderer,
    camera: Rc<Cell<Camera>>,
    clear_color: wgpu::Color,
    yaw: f32,
    pitch: f32,
}

impl Demo {
    fn new(services: &mut DemoServices, config: &AppConfig) -> Result<Self, Box<dyn Error>> {
        let graphics = services.graphics_mut()?;
        let label = graphics.window_label().to_string();

        let density = DensityField::new(&graphics.gpu.device, config.volume.size);
        let density_texture = graphics
            .device
            .register_texture(density.view(), TextureDimension::D3);

        let camera = Rc::new(Cell::new(Camera::new().with_fov(60.0)));

        let mut volume = VolumeRenderer::from_config(&config.volume);
        volume.transform_mut().set_scale(Vec3::splat(2.0));
        volume.initialize(graphics.device(), &label)?;
        volume.set_source_texture(density_texture);
        volume.set_camera(camera.clone());

        let floor = Rc::new(Primitive::cube(
            graphics.device(),
            &label,
            Vec4::new(0.32, 0.34, 0.38, 1.0),
        )?);
        let mut scene = Scene::new();
        let mut slab = PrimitiveGameObject::new(floor);
        slab.transform_mut().position = Vec3::new(0.0, -1.1, 0.0);
        slab.transform_mut().set_scale(Vec3::new(6.0, 0.1, 6.0));
        scene.add(Box::new(slab));

        let mut demo = Self {
            density,
            scene,
            volume,
            camera,
            clear_color: wgpu::Color {
                r: config.clear_color[0],
                g: config.clear_color[1],
                b: config.clear_color[2],
                a: config.clear_color[3],
            },
            yaw: 0.0,
            pitch: 0.25,
        };
        demo.place_camera();
        Ok(demo)
    }

    fn place_camera(&mut self) {
        let offset = Vec3::new(
            self.yaw.sin() * self.pitch.cos(),
            self.pitch.sin(),
            -self.yaw.cos() * self.pitch.cos(),
        ) * CAMERA_DISTANCE;
        let camera = self.camera.get().at(offset).looking_at(Vec3::ZERO);
        self.camera.set(camera);
    }

    fn apply_controls(&mut self, input: &dyn InputSystem, dt: f32) {
        if input.mouse_down(MouseButton::Left) {
            let delta = input.mouse_delta();
            self.yaw += delta.x * ORBIT_SPEED;
            self.pitch = (self.pitch + delta.y * ORBIT_SPEED).clamp(-1.4, 1.4);
            self.place_camera();
        }

        let mut step = Vec3::ZERO;
        if input.key_down(KeyCode::ArrowLeft) {
            step.x -= 1.0;
        }
        if input.key_down(KeyCode::ArrowRight) {
            step.x += 1.0;
        }
        if input.key_down(KeyCode::ArrowUp) {
            step.z += 1.0;
        }
        if input.key_down(KeyCode::ArrowDown) {
            step.z -= 1.0;
        }
        if step != Vec3::ZERO {
            let position = self.volume.transform().position + step * MOVE_SPEED * dt;
            self.volume.set_position(position);
        }

        let smoke = *self.volume.smoke_properties();
        let mut edited = smoke;
        if input.key_pressed(KeyCode::BracketLeft) {
            edited = edited.absorption(smoke.absorption - 5.0);
        }
        if input.key_pressed(KeyCode::BracketRight) {
            edited = edited.absorption(smoke.absorption + 5.0);
        }
        if input.key_pressed(KeyCode::Minus) {
            edited = edited.num_samples(smoke.num_samples - 8);
        }
        if input.key_pressed(KeyCode::Equal) {
            edited = edited.num_samples(smoke.num_samples + 8);
        }
        if edited != smoke {
            log_smoke(&edited);
            *self.volume.smoke_properties_mut() = edited;
        }
    }

    fn render(&mut self, graphics: &mut WindowGraphics, time: f32) -> Result<(), wgpu::SurfaceError> {
        self.density.fill(time);
        self.density.upload(&graphics.gpu.queue);

        let camera = self.camera.get();
        let view = camera.view_matrix();
        let proj = camera.projection_matrix(graphics.aspect(), 0.1, 100.0);

        let output = graphics.gpu.surface.get_current_texture()?;
        let target = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = graphics
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            });

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Scene Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(self.clear_color),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &graphics.depth,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            let mut ctx = graphics.device.frame(&mut render_pass);

            // opaque objects first, smoke blends over them
            self.scene.update();
            self.scene.render(&mut ctx, view, proj);

            self.volume.update();
            if let Err(e) = self.volume.render(&mut ctx, view, proj) {
                log::warn!("volume skipped this frame: {e}");
            }
        }

        graphics.gpu.queue.submit(std::iter::once(encoder.finish()));
        output.present();
        Ok(())
    }
}

fn log_smoke(smoke: &SmokeProperties) {
    log::info!(
        "absorption {:.1}, samples {}",
        smoke.absorption,
        smoke.num_samples
    );
}

struct App {
    config: AppConfig,
    services: DemoServices,
    demo: Option<Demo>,
    start_time: Instant,
    last_frame: Instant,
}

impl App {
    fn new(config: AppConfig) -> Self {
        Self {
            config,
            services: Services::new(),
            demo: None,
            start_time: Instant::now(),
            last_frame: Instant::now(),
        }
    }

    fn start(&mut self, window: Arc<Window>) -> Result<Demo, Box<dyn Error>> {
        let graphics = WindowGraphics::new(window, &self.config.title)?;
        self.services
            .install(Box::new(Input::new()), Box::new(graphics))?;
        Demo::new(&mut self.services, &self.config)
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) -> Result<(), Box<dyn Error>> {
        let Some(demo) = &mut self.demo else {
            return Ok(());
        };

        let now = Instant::now();
        let dt = (now - self.last_frame).as_secs_f32();
        self.last_frame = now;

        demo.apply_controls(self.services.input()?, dt);
        self.services.input_mut()?.begin_frame();

        let graphics = self.services.graphics_mut()?;
        match demo.render(graphics, self.start_time.elapsed().as_secs_f32()) {
            Ok(()) => {}
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                let (width, height) = (graphics.gpu.width(), graphics.gpu.height());
                graphics.resize(width, height);
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                log::error!("surface out of memory");
                event_loop.exit();
            }
            Err(e) => log::warn!("frame dropped: {e}"),
        }

        graphics.window.request_redraw();
        Ok(())
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.services.is_ready() {
            return;
        }

        let attributes = Window::default_attributes()
            .with_title(self.config.title.clone())
            .with_inner_size(LogicalSize::new(self.config.width, self.config.height));
        let window = match event_loop.create_window(attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                log::error!("failed to create window: {e}");
                event_loop.exit();
                return;
            }
        };

        match self.start(window) {
            Ok(demo) => {
                log_smoke(demo.volume.smoke_properties());
                self.demo = Some(demo);
            }
            Err(e) => {
                log::error!("startup failed: {e}");
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        if let Ok(input) = self.services.input_mut() {
            input.handle_event(&event);
        }

        match event {
            WindowEvent::CloseRequested => {
                if let (Some(demo), Ok(graphics)) = (&mut self.demo, self.services.graphics_mut()) {
                    demo.volume.dispose(graphics.device());
                }
                self.services.dispose();
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Ok(graphics) = self.services.graphics_mut() {
                    graphics.resize(size.width, size.height);
                }
            }
            WindowEvent::RedrawRequested => {
                if let Err(e) = self.redraw(event_loop) {
                    log::error!("redraw failed: {e}");
                    event_loop.exit();
                }
            }
            _ => (),
        }
    }
}

fn main() {
    let config = AppConfig::new();
    init_logging(config.logging.clone());

    let event_loop = match EventLoop::new() {
        Ok(event_loop) => event_loop,
        Err(e) => {
            log::error!("failed to create event loop: {e}");
            return;
        }
    };
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    if let Err(e) = event_loop.run_app(&mut app) {
        log::error!("event loop error: {e}");
    }
}
