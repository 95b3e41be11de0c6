//! Solid-color shader used by primitive game objects.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec4};

use crate::constant_buffer::{ConstantBuffer, gpu_matrix};
use crate::device::{
    DeviceContext, GraphicsDevice, RasterState, ResourceBinding, ShaderStage, StageDescription,
};
use crate::error::{FrameSyncError, InitializationError};
use crate::mesh::Vertex3d;
use crate::shader::{Shader, ShaderCore, ShaderDescription, VertexLayout};

pub const FLAT_SHADER_SOURCE: &str = "flat.wgsl";

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct FlatVertexUniforms {
    pub wvp: [[f32; 4]; 4],
    pub world: [[f32; 4]; 4],
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct FlatPixelUniforms {
    pub color: [f32; 4],
}

/// Lambert-lit solid color. Vertex cb 0 holds the matrices, pixel cb 0 the color.
#[derive(Debug, Default)]
pub struct FlatShader {
    core: ShaderCore,
    vertex_buffer: Option<ConstantBuffer<FlatVertexUniforms>>,
    pixel_buffer: Option<ConstantBuffer<FlatPixelUniforms>>,
}

impl FlatShader {
    pub fn set_vertex_buffer_values(
        &self,
        ctx: &mut dyn DeviceContext,
        wvp: Mat4,
        world: Mat4,
    ) -> Result<(), FrameSyncError> {
        let buffer = self.vertex_buffer.as_ref().ok_or_else(not_created)?;
        buffer.write(
            ctx,
            &FlatVertexUniforms {
                wvp: gpu_matrix(wvp),
                world: gpu_matrix(world),
            },
        )
    }

    pub fn set_color(&self, ctx: &mut dyn DeviceContext, color: Vec4) -> Result<(), FrameSyncError> {
        let buffer = self.pixel_buffer.as_ref().ok_or_else(not_created)?;
        buffer.write(
            ctx,
            &FlatPixelUniforms {
                color: color.to_array(),
            },
        )
    }
}

fn not_created() -> FrameSyncError {
    FrameSyncError::StaleResource("flat shader buffers were never created".into())
}

impl Shader for FlatShader {
    fn description(&self) -> ShaderDescription {
        ShaderDescription {
            vertex: StageDescription::new(FLAT_SHADER_SOURCE, "vs_flat"),
            pixel: StageDescription::new(FLAT_SHADER_SOURCE, "fs_flat"),
            elements: Vertex3d::ELEMENTS.to_vec(),
            bindings: vec![
                ResourceBinding::constant_buffer(
                    ShaderStage::Vertex,
                    0,
                    ConstantBuffer::<FlatVertexUniforms>::SIZE,
                ),
                ResourceBinding::constant_buffer(
                    ShaderStage::Pixel,
                    0,
                    ConstantBuffer::<FlatPixelUniforms>::SIZE,
                ),
            ],
            raster: RasterState::default(),
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
        self.vertex_buffer = Some(ConstantBuffer::create(device, "Flat Vertex Uniforms")?);
        self.pixel_buffer = Some(ConstantBuffer::create(device, "Flat Pixel Uniforms")?);
        Ok(())
    }

    fn bind_shader_resources(&self, ctx: &mut dyn DeviceContext) -> Result<(), FrameSyncError> {
        let (Some(vertex), Some(pixel)) = (self.vertex_buffer.as_ref(), self.pixel_buffer.as_ref())
        else {
            return Err(not_created());
        };

        ctx.set_constant_buffers(ShaderStage::Vertex, 0, &[vertex.id()]);
        ctx.set_constant_buffers(ShaderStage::Pixel, 0, &[pixel.id()]);
        Ok(())
    }

    // no textures, no samplers
    fn apply_samplers(&self, _ctx: &mut dyn DeviceContext) {}

    fn release_resources(&mut self, device: &mut dyn GraphicsDevice) {
        if let Some(buffer) = self.vertex_buffer.take() {
            buffer.release(device);
        }
        if let Some(buffer) = self.pixel_buffer.take() {
            buffer.release(device);
        }
    }
}
