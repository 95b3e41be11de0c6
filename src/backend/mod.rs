//! Implementations of [`GraphicsDevice`](crate::device::GraphicsDevice) and
//! [`DeviceContext`](crate::device::DeviceContext).

mod recording;
mod wgpu_backend;

pub use recording::{Call, DeviceCall, DrawRecord, RecordingContext, RecordingDevice};
pub use wgpu_backend::{
    SAMPLER_BINDING_BASE, ShaderSourceResolver, TEXTURE_BINDING_BASE, WgpuDevice, WgpuFrame,
};
