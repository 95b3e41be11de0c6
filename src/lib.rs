//! # Plume
//!
//! **Ray-marched smoke volumes on wgpu.**
//!
//! Plume draws a 3D density texture as smoke: a unit cube is placed in the
//! scene, and every pixel it covers marches a ray from the eye through the
//! density grid, accumulating absorption.
//!
//! ## Quick Start
//!
//! ```no_run
//! use plume::*;
//!
//! # fn frame(
//! #     device: &mut dyn GraphicsDevice,
//! #     ctx: &mut dyn DeviceContext,
//! #     density: TextureId,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let mut volume = VolumeRenderer::new(Vec3::splat(64.0), Vec3::ZERO);
//! volume.initialize(device, "main")?;
//!
//! let camera = Camera::new().at(Vec3::new(0.0, 0.5, -3.0)).looking_at(Vec3::ZERO);
//! volume.smoke_properties_mut().absorption = 40.0;
//! volume.render_volume(
//!     ctx,
//!     density,
//!     &camera,
//!     camera.view_matrix(),
//!     camera.projection_matrix(16.0 / 9.0, 0.1, 100.0),
//! )?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Layers
//!
//! - [`GraphicsDevice`] / [`DeviceContext`]: the resource and draw-call seam.
//!   [`WgpuDevice`] renders for real; [`backend::RecordingDevice`] records
//!   calls for tests.
//! - [`Shader`]: compiled stages, input layout, bindings, and the constant
//!   buffers a concrete shader owns. [`VolumeShader`] and [`FlatShader`] are
//!   the two shaders.
//! - [`GameObject`]: transform, bounds, and a draw. [`VolumeRenderer`] and
//!   [`PrimitiveGameObject`] implement it; a [`Scene`] drives them.
//! - [`Services`]: the input and graphics systems, passed explicitly.

pub mod backend;
mod bounds;
mod camera;
mod config;
mod constant_buffer;
mod device;
mod error;
mod flat_shader;
mod game_object;
mod gpu;
mod input;
mod logging;
mod mesh;
mod scene;
mod services;
mod shader;
mod transform;
mod volume_renderer;
mod volume_shader;

pub use backend::{ShaderSourceResolver, WgpuDevice, WgpuFrame};
pub use bounds::{Aabb, Bounds, BoundsShape};
pub use camera::{Camera, EyePosition};
pub use config::{AppConfig, SmokeProperties, VolumeConfig};
pub use constant_buffer::{CONSTANT_BUFFER_ALIGNMENT, ConstantBuffer, MappedBuffer, gpu_matrix};
pub use device::{
    AddressMode, BindingKind, BindingLayoutId, BlendMode, BufferId, CullMode, DeviceContext,
    DrawState, FilterMode, GeometryId, GraphicsDevice, InputElement, InputLayoutId, ProgramId,
    RasterState, ResourceBinding, ResourceId, SamplerDescription, SamplerId, ShaderStage,
    StageDescription, StepMode, TextureDimension, TextureId, VertexFormat,
};
pub use error::{
    FrameSyncError, InitializationError, LayoutMismatch, MapFailure, RenderError, ServiceError,
};
pub use flat_shader::{FlatPixelUniforms, FlatShader, FlatVertexUniforms};
pub use game_object::{GameObject, ObjectId, PrimitiveGameObject};
pub use gpu::GpuContext;
pub use input::Input;
pub use logging::{LoggingConfig, init_logging};
pub use mesh::{Mesh, Primitive, Vertex3d, unit_cube};
pub use scene::{FrameReport, Scene};
pub use services::{GraphicsSystem, InputSystem, Services};
pub use shader::{
    InputLayoutSchema, Lifecycle, Shader, ShaderCore, ShaderDescription, ShaderPrograms,
    VertexLayout, initialize_shader,
};
pub use transform::{Transform, euler_to_quat};
pub use volume_renderer::VolumeRenderer;
pub use volume_shader::{
    SmokeUniforms, VOLUME_PIXEL_ENTRY, VOLUME_SHADER_SOURCE, VOLUME_VERTEX_ENTRY, VolumePixelUniforms,
    VolumeShader, VolumeVertexUniforms,
};

// Re-export glam math types for convenience
pub use glam::{Mat4, Quat, UVec3, Vec2, Vec3, Vec4};

// Re-export commonly used winit types for convenience
pub use winit::event::MouseButton;
pub use winit::keyboard::KeyCode;
