//! The shader resource contract.
//!
//! A [`Shader`] describes its two stages, its vertex input layout and the
//! resource slots it reads. [`initialize_shader`] turns that description into
//! device objects in a fixed order:
//!
//! 1. compile the vertex stage
//! 2. compile the pixel stage
//! 3. create the input layout from the declared elements
//! 4. declare the binding layout
//! 5. link the stages against both layouts
//! 6. run the shader's own [`Shader::specific_initialization`]
//!
//! If any step fails everything created so far is released and the shader
//! stays unusable.
//!
//! Per frame a shader's owner writes its constant buffers, then calls
//! [`Shader::bind_shader_resources`] and [`Shader::apply_samplers`], then draws
//! with [`ShaderPrograms::draw_state`].

use crate::device::{
    BindingLayoutId, DeviceContext, DrawState, GraphicsDevice, InputElement, InputLayoutId,
    ProgramId, RasterState, ResourceBinding, ResourceId, ShaderStage, StageDescription,
};
use crate::error::{FrameSyncError, InitializationError, LayoutMismatch};

/// Where a shader (or [`Services`](crate::services::Services) bundle) is in
/// its life.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Lifecycle {
    #[default]
    Uninitialized,
    Ready,
    Disposed,
}

/// Everything a shader declares before a device exists.
#[derive(Clone, Debug)]
pub struct ShaderDescription {
    pub vertex: StageDescription,
    pub pixel: StageDescription,
    /// Input elements in vertex-buffer order.
    pub elements: Vec<InputElement>,
    pub bindings: Vec<ResourceBinding>,
    pub raster: RasterState,
}

/// Device objects produced by [`initialize_shader`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShaderPrograms {
    pub vertex: ProgramId,
    pub pixel: ProgramId,
    pub input_layout: InputLayoutId,
    pub bindings: BindingLayoutId,
    pub raster: RasterState,
}

impl ShaderPrograms {
    pub fn draw_state(&self) -> DrawState {
        DrawState {
            vertex: self.vertex,
            pixel: self.pixel,
            input_layout: self.input_layout,
            bindings: self.bindings,
            raster: self.raster,
        }
    }

    pub fn release(self, device: &mut dyn GraphicsDevice) {
        device.release(ResourceId::BindingLayout(self.bindings));
        device.release(ResourceId::InputLayout(self.input_layout));
        device.release(ResourceId::Program(self.pixel));
        device.release(ResourceId::Program(self.vertex));
    }
}

/// State every shader carries regardless of its payloads.
#[derive(Debug, Default)]
pub struct ShaderCore {
    programs: Option<ShaderPrograms>,
    lifecycle: Lifecycle,
}

impl ShaderCore {
    pub fn programs(&self) -> Option<&ShaderPrograms> {
        self.programs.as_ref()
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    /// Releases the programs and marks the shader disposed.
    pub fn dispose(&mut self, device: &mut dyn GraphicsDevice) {
        if let Some(programs) = self.programs.take() {
            programs.release(device);
        }
        self.lifecycle = Lifecycle::Disposed;
    }
}

/// A vertex/pixel program pair with the resources it reads.
pub trait Shader {
    /// Stage identifiers, input layout and resource slots.
    fn description(&self) -> ShaderDescription;

    fn core(&self) -> &ShaderCore;

    fn core_mut(&mut self) -> &mut ShaderCore;

    /// Creates the constant buffers and samplers this shader owns.
    ///
    /// Resources created before a failure must be left where
    /// [`dispose`](Self::dispose) can find them.
    fn specific_initialization(
        &mut self,
        device: &mut dyn GraphicsDevice,
    ) -> Result<(), InitializationError>;

    /// Binds every constant buffer and texture the shader reads.
    fn bind_shader_resources(&self, ctx: &mut dyn DeviceContext) -> Result<(), FrameSyncError>;

    /// Binds the shader's sampler states.
    fn apply_samplers(&self, ctx: &mut dyn DeviceContext);

    /// Releases the shader's own buffers and samplers.
    fn release_resources(&mut self, device: &mut dyn GraphicsDevice);

    fn programs(&self) -> Option<&ShaderPrograms> {
        self.core().programs()
    }

    fn is_ready(&self) -> bool {
        self.core().lifecycle() == Lifecycle::Ready
    }

    /// Releases everything the shader owns. Safe to call more than once.
    fn dispose(&mut self, device: &mut dyn GraphicsDevice) {
        self.release_resources(device);
        self.core_mut().dispose(device);
    }
}

fn create_programs(
    device: &mut dyn GraphicsDevice,
    description: &ShaderDescription,
    created: &mut Vec<ResourceId>,
) -> Result<ShaderPrograms, InitializationError> {
    let vertex = device.compile_stage(ShaderStage::Vertex, &description.vertex)?;
    created.push(ResourceId::Program(vertex));

    let pixel = device.compile_stage(ShaderStage::Pixel, &description.pixel)?;
    created.push(ResourceId::Program(pixel));

    let input_layout = device.create_input_layout(vertex, &description.elements)?;
    created.push(ResourceId::InputLayout(input_layout));

    let bindings = device.create_binding_layout(&description.bindings)?;
    created.push(ResourceId::BindingLayout(bindings));

    let programs = ShaderPrograms {
        vertex,
        pixel,
        input_layout,
        bindings,
        raster: description.raster,
    };
    device.link_programs(&programs.draw_state())?;
    Ok(programs)
}

/// Compiles, lays out and initializes `shader` on `device`.
///
/// `window` only labels log output. A shader that is already ready is left
/// alone; a disposed one is built again from scratch.
pub fn initialize_shader<S: Shader + ?Sized>(
    shader: &mut S,
    device: &mut dyn GraphicsDevice,
    window: &str,
) -> Result<(), InitializationError> {
    if shader.is_ready() {
        log::debug!("[{window}] shader already initialized");
        return Ok(());
    }

    let description = shader.description();
    let mut created = Vec::new();
    let programs = match create_programs(device, &description, &mut created) {
        Ok(programs) => programs,
        Err(e) => {
            log::error!("[{window}] {e}");
            for resource in created.into_iter().rev() {
                device.release(resource);
            }
            return Err(e);
        }
    };

    shader.core_mut().programs = Some(programs);
    if let Err(e) = shader.specific_initialization(device) {
        log::error!("[{window}] {e}");
        shader.dispose(device);
        shader.core_mut().lifecycle = Lifecycle::Uninitialized;
        return Err(e);
    }

    shader.core_mut().lifecycle = Lifecycle::Ready;
    log::info!(
        "[{window}] initialized shader '{}' / '{}'",
        description.vertex.entry_point,
        description.pixel.entry_point
    );
    Ok(())
}

/// A vertex type with a known physical layout.
pub trait VertexLayout: bytemuck::Pod {
    /// Input elements in field order.
    const ELEMENTS: &'static [InputElement];
}

/// Checks a declared input layout against a vertex type.
///
/// Nothing in [`initialize_shader`] calls this; a declared layout that
/// disagrees with the vertex buffer renders garbage rather than failing.
#[derive(Clone, Debug)]
pub struct InputLayoutSchema<'a> {
    elements: &'a [InputElement],
}

impl<'a> InputLayoutSchema<'a> {
    pub fn new(elements: &'a [InputElement]) -> Self {
        Self { elements }
    }

    /// Bytes from the start of one vertex to the next.
    pub fn stride(&self) -> u32 {
        self.elements
            .iter()
            .map(|e| e.offset + e.format.size())
            .max()
            .unwrap_or(0)
    }

    pub fn validate_against<V: VertexLayout>(&self) -> Result<(), LayoutMismatch> {
        let actual = std::mem::size_of::<V>() as u32;
        if self.stride() != actual {
            return Err(LayoutMismatch::Stride {
                declared: self.stride(),
                actual,
            });
        }

        if self.elements.len() != V::ELEMENTS.len() {
            return Err(LayoutMismatch::ElementCount {
                declared: self.elements.len(),
                actual: V::ELEMENTS.len(),
            });
        }

        for (index, (declared, actual)) in self.elements.iter().zip(V::ELEMENTS).enumerate() {
            let same = declared.offset == actual.offset
                && declared.format == actual.format
                && declared.location == actual.location
                && declared.step == actual.step;
            if !same {
                return Err(LayoutMismatch::Element {
                    index,
                    semantic: declared.semantic,
                });
            }
        }

        Ok(())
    }
}
