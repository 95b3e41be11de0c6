//! Backend-neutral graphics device interface.
//!
//! Shaders and renderers never touch wgpu directly. They talk to a
//! [`GraphicsDevice`] when creating resources and to a [`DeviceContext`] when
//! submitting per-frame work. Resources are addressed through small typed
//! handles ([`BufferId`], [`ProgramId`], ...), so a handle of one kind can
//! never be passed where another is expected.
//!
//! The binding model is slot based: each shader stage has constant-buffer,
//! texture and sampler slots, declared up front in a [`BindingLayoutId`] and
//! filled per frame through the context.
//!
//! Two backends ship with the crate:
//!
//! - [`WgpuDevice`](crate::backend::WgpuDevice) renders for real.
//! - [`RecordingDevice`](crate::backend::RecordingDevice) records every call
//!   and can inject failures. All tests use it.

use crate::error::{FrameSyncError, InitializationError};

/// Handle to a constant (uniform) buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BufferId(pub(crate) usize);

/// Handle to an immutable sampler state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SamplerId(pub(crate) usize);

/// Handle to one compiled shader stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ProgramId(pub(crate) usize);

/// Handle to a vertex input layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct InputLayoutId(pub(crate) usize);

/// Handle to a declared set of resource bindings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BindingLayoutId(pub(crate) usize);

/// Handle to uploaded, immutable vertex + index data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GeometryId(pub(crate) usize);

/// Handle to a readable texture owned outside the renderer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureId(pub(crate) usize);

/// Any releasable resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceId {
    Buffer(BufferId),
    Sampler(SamplerId),
    Program(ProgramId),
    InputLayout(InputLayoutId),
    BindingLayout(BindingLayoutId),
    Geometry(GeometryId),
}

/// A programmable pipeline stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Pixel,
}

/// Identifies one stage's source: a resolvable source name and its entry point.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StageDescription {
    pub source: String,
    pub entry_point: String,
}

impl StageDescription {
    pub fn new(source: impl Into<String>, entry_point: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            entry_point: entry_point.into(),
        }
    }
}

/// Per-vertex attribute formats.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VertexFormat {
    Float32x2,
    Float32x3,
    Float32x4,
}

impl VertexFormat {
    /// Size of one attribute in bytes.
    pub const fn size(self) -> u32 {
        match self {
            VertexFormat::Float32x2 => 8,
            VertexFormat::Float32x3 => 12,
            VertexFormat::Float32x4 => 16,
        }
    }
}

/// Whether an element advances per vertex or per instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StepMode {
    PerVertex,
    PerInstance,
}

/// One entry of an input layout.
///
/// Elements must appear in the same order, with the same offsets, as the
/// fields of the vertex buffer they describe.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InputElement {
    pub semantic: &'static str,
    pub format: VertexFormat,
    pub offset: u32,
    pub location: u32,
    pub step: StepMode,
}

impl InputElement {
    pub const fn per_vertex(
        semantic: &'static str,
        format: VertexFormat,
        offset: u32,
        location: u32,
    ) -> Self {
        Self {
            semantic,
            format,
            offset,
            location,
            step: StepMode::PerVertex,
        }
    }
}

/// Dimensionality of a bound texture.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureDimension {
    D2,
    D3,
}

/// What kind of resource a slot holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BindingKind {
    ConstantBuffer { size: u64 },
    Texture { dimension: TextureDimension },
    Sampler,
}

impl BindingKind {
    pub(crate) fn name(self) -> &'static str {
        match self {
            BindingKind::ConstantBuffer { .. } => "constant buffer",
            BindingKind::Texture { .. } => "texture",
            BindingKind::Sampler => "sampler",
        }
    }
}

/// A resource slot a shader reads from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ResourceBinding {
    pub stage: ShaderStage,
    pub slot: u32,
    pub kind: BindingKind,
}

impl ResourceBinding {
    pub const fn constant_buffer(stage: ShaderStage, slot: u32, size: u64) -> Self {
        Self {
            stage,
            slot,
            kind: BindingKind::ConstantBuffer { size },
        }
    }

    pub const fn texture(stage: ShaderStage, slot: u32, dimension: TextureDimension) -> Self {
        Self {
            stage,
            slot,
            kind: BindingKind::Texture { dimension },
        }
    }

    pub const fn sampler(stage: ShaderStage, slot: u32) -> Self {
        Self {
            stage,
            slot,
            kind: BindingKind::Sampler,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FilterMode {
    Nearest,
    Linear,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AddressMode {
    Clamp,
    Repeat,
}

/// Immutable sampler state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SamplerDescription {
    pub filter: FilterMode,
    pub address_u: AddressMode,
    pub address_v: AddressMode,
    pub address_w: AddressMode,
}

impl SamplerDescription {
    /// Linear filtering with clamp addressing on all three axes.
    pub const LINEAR_CLAMP: Self = Self {
        filter: FilterMode::Linear,
        address_u: AddressMode::Clamp,
        address_v: AddressMode::Clamp,
        address_w: AddressMode::Clamp,
    };
}

/// How a draw's output combines with the target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlendMode {
    Opaque,
    Alpha,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CullMode {
    None,
    Front,
    Back,
}

/// Fixed-function state a shader expects.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RasterState {
    pub blend: BlendMode,
    pub cull: CullMode,
}

impl Default for RasterState {
    fn default() -> Self {
        Self {
            blend: BlendMode::Opaque,
            cull: CullMode::Back,
        }
    }
}

/// Everything needed to issue a draw with a given shader.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DrawState {
    pub vertex: ProgramId,
    pub pixel: ProgramId,
    pub input_layout: InputLayoutId,
    pub bindings: BindingLayoutId,
    pub raster: RasterState,
}

/// Resource creation. Used during initialization only.
pub trait GraphicsDevice {
    /// Resolves and compiles one stage.
    fn compile_stage(
        &mut self,
        stage: ShaderStage,
        description: &StageDescription,
    ) -> Result<ProgramId, InitializationError>;

    /// Builds an input layout for a compiled vertex stage.
    fn create_input_layout(
        &mut self,
        vertex_program: ProgramId,
        elements: &[InputElement],
    ) -> Result<InputLayoutId, InitializationError>;

    /// Declares the resource slots a program pair reads.
    fn create_binding_layout(
        &mut self,
        bindings: &[ResourceBinding],
    ) -> Result<BindingLayoutId, InitializationError>;

    /// Checks that the compiled stages, input layout and binding layout in
    /// `state` form a drawable pipeline. Entry points and resource
    /// declarations the stages disagree on are reported here, not at the
    /// first draw.
    fn link_programs(&mut self, state: &DrawState) -> Result<(), InitializationError>;

    /// Creates a CPU-writable constant buffer of `size` bytes.
    fn create_constant_buffer(
        &mut self,
        label: &str,
        size: u64,
    ) -> Result<BufferId, InitializationError>;

    fn create_sampler(
        &mut self,
        description: &SamplerDescription,
    ) -> Result<SamplerId, InitializationError>;

    /// Uploads immutable geometry. `vertices` is raw bytes with the given stride.
    fn create_geometry(
        &mut self,
        label: &str,
        vertices: &[u8],
        stride: u32,
        indices: &[u32],
    ) -> Result<GeometryId, InitializationError>;

    /// Releases a resource. Releasing an unknown or already released id is a no-op.
    fn release(&mut self, resource: ResourceId);
}

/// Per-frame submission. Calls are executed in the order they are made.
pub trait DeviceContext {
    /// Acquires a buffer for exclusive CPU write, discarding its prior contents.
    ///
    /// Every successful call must be paired with exactly one [`unmap`](Self::unmap).
    /// Prefer [`MappedBuffer`](crate::constant_buffer::MappedBuffer), which
    /// does the pairing on drop.
    fn map_discard(&mut self, buffer: BufferId) -> Result<(), FrameSyncError>;

    /// The writable bytes of a currently mapped buffer, `None` if it is not mapped.
    fn mapped_data(&mut self, buffer: BufferId) -> Option<&mut [u8]>;

    /// Releases a buffer acquired with [`map_discard`](Self::map_discard).
    fn unmap(&mut self, buffer: BufferId);

    fn set_constant_buffers(&mut self, stage: ShaderStage, start_slot: u32, buffers: &[BufferId]);

    fn set_texture(&mut self, stage: ShaderStage, slot: u32, texture: Option<TextureId>);

    fn set_samplers(&mut self, stage: ShaderStage, start_slot: u32, samplers: &[SamplerId]);

    /// Draws all indices of `geometry` using the currently bound resources.
    fn draw_indexed(
        &mut self,
        geometry: GeometryId,
        state: &DrawState,
    ) -> Result<(), FrameSyncError>;
}
