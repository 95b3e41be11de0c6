//! Vertex format, immutable geometry and drawable primitives.
//!
//! - [`Vertex3d`] is the vertex format of every mesh, containing position,
//!   normal and UV data.
//! - [`Mesh`] is uploaded, immutable vertex + index data.
//! - [`Primitive`] pairs a mesh with a [`FlatShader`] so a game object can
//!   draw it. Primitives are shared between objects behind an `Rc`.
//!
//! # Vertex Layout
//!
//! The [`Vertex3d`] struct uses the following layout (32 bytes per vertex):
//!
//! | Attribute | Format    | Offset | Shader Location |
//! |-----------|-----------|--------|-----------------|
//! | position  | Float32x3 | 0      | 0               |
//! | normal    | Float32x3 | 12     | 1               |
//! | uv        | Float32x2 | 24     | 2               |
//!
//! The same table is exposed as [`Vertex3d::ELEMENTS`]; shaders that draw
//! meshes declare it as their input layout.

use glam::{Mat4, Vec4};

use crate::device::{DeviceContext, GeometryId, GraphicsDevice, InputElement, ResourceId, VertexFormat};
use crate::error::{FrameSyncError, InitializationError};
use crate::flat_shader::FlatShader;
use crate::shader::{Shader, VertexLayout, initialize_shader};

/// A vertex for 3D mesh rendering with position, normal, and texture coordinates.
///
/// Uses `#[repr(C)]` for a predictable memory layout and derives
/// [`bytemuck::Pod`] so vertex slices cast straight to bytes.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex3d {
    /// The 3D position of this vertex in model space.
    pub position: [f32; 3],
    /// The surface normal vector.
    pub normal: [f32; 3],
    /// Texture coordinates, typically in the range [0, 1].
    pub uv: [f32; 2],
}

impl VertexLayout for Vertex3d {
    const ELEMENTS: &'static [InputElement] = &[
        InputElement::per_vertex("POSITION", VertexFormat::Float32x3, 0, 0),
        InputElement::per_vertex("NORMAL", VertexFormat::Float32x3, 12, 1),
        InputElement::per_vertex("TEXCOORD", VertexFormat::Float32x2, 24, 2),
    ];
}

impl Vertex3d {
    pub fn new(position: [f32; 3], normal: [f32; 3], uv: [f32; 2]) -> Self {
        Self {
            position,
            normal,
            uv,
        }
    }
}

/// Vertices and indices of a unit cube centered at the origin.
///
/// The cube spans -0.5 to 0.5 on all axes. Each face has its own four
/// vertices (24 total) so normals stay flat, and maps the full \[0,1\] UV
/// range. Faces wind counter-clockwise when seen from outside.
pub fn unit_cube() -> (Vec<Vertex3d>, Vec<u32>) {
    #[rustfmt::skip]
    let vertices = vec![
        // Front face (Z+)
        Vertex3d::new([-0.5, -0.5,  0.5], [ 0.0,  0.0,  1.0], [0.0, 0.0]),
        Vertex3d::new([ 0.5, -0.5,  0.5], [ 0.0,  0.0,  1.0], [1.0, 0.0]),
        Vertex3d::new([ 0.5,  0.5,  0.5], [ 0.0,  0.0,  1.0], [1.0, 1.0]),
        Vertex3d::new([-0.5,  0.5,  0.5], [ 0.0,  0.0,  1.0], [0.0, 1.0]),
        // Back face (Z-)
        Vertex3d::new([ 0.5, -0.5, -0.5], [ 0.0,  0.0, -1.0], [0.0, 0.0]),
        Vertex3d::new([-0.5, -0.5, -0.5], [ 0.0,  0.0, -1.0], [1.0, 0.0]),
        Vertex3d::new([-0.5,  0.5, -0.5], [ 0.0,  0.0, -1.0], [1.0, 1.0]),
        Vertex3d::new([ 0.5,  0.5, -0.5], [ 0.0,  0.0, -1.0], [0.0, 1.0]),
        // Top face (Y+)
        Vertex3d::new([-0.5,  0.5,  0.5], [ 0.0,  1.0,  0.0], [0.0, 0.0]),
        Vertex3d::new([ 0.5,  0.5,  0.5], [ 0.0,  1.0,  0.0], [1.0, 0.0]),
        Vertex3d::new([ 0.5,  0.5, -0.5], [ 0.0,  1.0,  0.0], [1.0, 1.0]),
        Vertex3d::new([-0.5,  0.5, -0.5], [ 0.0,  1.0,  0.0], [0.0, 1.0]),
        // Bottom face (Y-)
        Vertex3d::new([-0.5, -0.5, -0.5], [ 0.0, -1.0,  0.0], [0.0, 0.0]),
        Vertex3d::new([ 0.5, -0.5, -0.5], [ 0.0, -1.0,  0.0], [1.0, 0.0]),
        Vertex3d::new([ 0.5, -0.5,  0.5], [ 0.0, -1.0,  0.0], [1.0, 1.0]),
        Vertex3d::new([-0.5, -0.5,  0.5], [ 0.0, -1.0,  0.0], [0.0, 1.0]),
        // Right face (X+)
        Vertex3d::new([ 0.5, -0.5,  0.5], [ 1.0,  0.0,  0.0], [0.0, 0.0]),
        Vertex3d::new([ 0.5, -0.5, -0.5], [ 1.0,  0.0,  0.0], [1.0, 0.0]),
        Vertex3d::new([ 0.5,  0.5, -0.5], [ 1.0,  0.0,  0.0], [1.0, 1.0]),
        Vertex3d::new([ 0.5,  0.5,  0.5], [ 1.0,  0.0,  0.0], [0.0, 1.0]),
        // Left face (X-)
        Vertex3d::new([-0.5, -0.5, -0.5], [-1.0,  0.0,  0.0], [0.0, 0.0]),
        Vertex3d::new([-0.5, -0.5,  0.5], [-1.0,  0.0,  0.0], [1.0, 0.0]),
        Vertex3d::new([-0.5,  0.5,  0.5], [-1.0,  0.0,  0.0], [1.0, 1.0]),
        Vertex3d::new([-0.5,  0.5, -0.5], [-1.0,  0.0,  0.0], [0.0, 1.0]),
    ];

    #[rustfmt::skip]
    let indices: Vec<u32> = vec![
        0,  1,  2,  2,  3,  0,  // front
        4,  5,  6,  6,  7,  4,  // back
        8,  9,  10, 10, 11, 8,  // top
        12, 13, 14, 14, 15, 12, // bottom
        16, 17, 18, 18, 19, 16, // right
        20, 21, 22, 22, 23, 20, // left
    ];

    (vertices, indices)
}

/// Uploaded, immutable geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mesh {
    geometry: GeometryId,
    index_count: u32,
}

impl Mesh {
    /// Uploads vertex and index data.
    pub fn new(
        device: &mut dyn GraphicsDevice,
        label: &str,
        vertices: &[Vertex3d],
        indices: &[u32],
    ) -> Result<Self, InitializationError> {
        let geometry = device.create_geometry(
            label,
            bytemuck::cast_slice(vertices),
            std::mem::size_of::<Vertex3d>() as u32,
            indices,
        )?;

        Ok(Self {
            geometry,
            index_count: indices.len() as u32,
        })
    }

    /// Creates the unit cube from [`unit_cube`].
    pub fn cube(device: &mut dyn GraphicsDevice) -> Result<Self, InitializationError> {
        let (vertices, indices) = unit_cube();
        Self::new(device, "Unit Cube", &vertices, &indices)
    }

    pub fn geometry(&self) -> GeometryId {
        self.geometry
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    pub fn release(self, device: &mut dyn GraphicsDevice) {
        device.release(ResourceId::Geometry(self.geometry));
    }
}

/// A mesh drawn with a solid-color [`FlatShader`].
///
/// Immutable once built; game objects share one primitive through `Rc`.
#[derive(Debug)]
pub struct Primitive {
    mesh: Mesh,
    shader: FlatShader,
    color: Vec4,
}

impl Primitive {
    /// Builds a unit cube primitive in the given color.
    pub fn cube(
        device: &mut dyn GraphicsDevice,
        window: &str,
        color: Vec4,
    ) -> Result<Self, InitializationError> {
        let mut shader = FlatShader::default();
        initialize_shader(&mut shader, device, window)?;

        let mesh = match Mesh::cube(device) {
            Ok(mesh) => mesh,
            Err(e) => {
                shader.dispose(device);
                return Err(e);
            }
        };

        Ok(Self {
            mesh,
            shader,
            color,
        })
    }

    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    pub fn color(&self) -> Vec4 {
        self.color
    }

    /// Writes the shader constants for `world` and draws the mesh.
    pub fn draw(
        &self,
        ctx: &mut dyn DeviceContext,
        world: Mat4,
        view: Mat4,
        proj: Mat4,
    ) -> Result<(), FrameSyncError> {
        let programs = self
            .shader
            .programs()
            .ok_or_else(|| FrameSyncError::StaleResource("flat shader not initialized".into()))?;

        self.shader
            .set_vertex_buffer_values(ctx, proj * view * world, world)?;
        self.shader.set_color(ctx, self.color)?;
        self.shader.bind_shader_resources(ctx)?;
        self.shader.apply_samplers(ctx);
        ctx.draw_indexed(self.mesh.geometry, &programs.draw_state())
    }

    pub fn release(mut self, device: &mut dyn GraphicsDevice) {
        self.shader.dispose(device);
        self.mesh.release(device);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Call, DeviceCall, RecordingDevice};

    #[test]
    fn cube_has_24_vertices_and_12_triangles() {
        let (vertices, indices) = unit_cube();
        assert_eq!(vertices.len(), 24);
        assert_eq!(indices.len(), 36);
        assert!(indices.iter().all(|&i| (i as usize) < vertices.len()));
    }

    #[test]
    fn cube_faces_point_outward() {
        let (vertices, indices) = unit_cube();
        for tri in indices.chunks(3) {
            let [a, b, c] = [tri[0], tri[1], tri[2]].map(|i| glam::Vec3::from(vertices[i as usize].position));
            let face_normal = (b - a).cross(c - a).normalize();
            let stored = glam::Vec3::from(vertices[tri[0] as usize].normal);
            assert!(face_normal.dot(stored) > 0.99);
        }
    }

    #[test]
    fn vertex_is_32_bytes() {
        assert_eq!(std::mem::size_of::<Vertex3d>(), 32);
    }

    #[test]
    fn primitive_draws_with_flat_shader() {
        let mut device = RecordingDevice::new();
        let primitive = Primitive::cube(&mut device, "mesh-test", Vec4::new(1.0, 0.0, 0.0, 1.0)).unwrap();
        let mut ctx = device.context();

        primitive
            .draw(&mut ctx, Mat4::IDENTITY, Mat4::IDENTITY, Mat4::IDENTITY)
            .unwrap();

        let draws = ctx.draws();
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].index_count, 36);
        assert_eq!(ctx.calls().last(), Some(&Call::Draw(primitive.mesh().geometry())));
        assert!(device
            .calls()
            .contains(&DeviceCall::CreateGeometry { label: "Unit Cube".into(), index_count: 36 }));
    }

    #[test]
    fn release_frees_buffers() {
        let mut device = RecordingDevice::new();
        let primitive = Primitive::cube(&mut device, "mesh-test", Vec4::ONE).unwrap();
        assert!(device.live_buffers() > 0);

        primitive.release(&mut device);

        assert_eq!(device.live_buffers(), 0);
    }
}
