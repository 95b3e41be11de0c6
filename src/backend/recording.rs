//! A device that records every call instead of talking to a GPU.
//!
//! [`RecordingDevice`] hands out handles and keeps enough bookkeeping to
//! validate draws the same way the wgpu backend does (unbound slots, released
//! resources). Each [`RecordingContext`] logs its calls in order, keeps the
//! bytes written into each buffer, and snapshots bound constant buffers at
//! every draw.
//!
//! Failures can be injected for stage compilation, linking, buffer and
//! sampler creation, and buffer mapping.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::device::{
    BindingKind, BindingLayoutId, BufferId, DeviceContext, DrawState, GeometryId, GraphicsDevice,
    InputElement, InputLayoutId, ProgramId, ResourceBinding, ResourceId, SamplerDescription,
    SamplerId, ShaderStage, StageDescription, TextureDimension, TextureId,
};
use crate::error::{FrameSyncError, InitializationError, MapFailure};

/// A device-side call.
#[derive(Clone, Debug, PartialEq)]
pub enum DeviceCall {
    CompileStage {
        stage: ShaderStage,
        source: String,
        entry_point: String,
    },
    CreateInputLayout(Vec<InputElement>),
    CreateBindingLayout(Vec<ResourceBinding>),
    LinkPrograms(DrawState),
    CreateConstantBuffer { label: String, size: u64 },
    CreateSampler(SamplerDescription),
    CreateGeometry { label: String, index_count: u32 },
    Release(ResourceId),
}

/// A context-side call.
#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    Map(BufferId),
    MapFailed(BufferId),
    Unmap(BufferId),
    SetConstantBuffers {
        stage: ShaderStage,
        start_slot: u32,
        buffers: Vec<BufferId>,
    },
    SetTexture {
        stage: ShaderStage,
        slot: u32,
        texture: Option<TextureId>,
    },
    SetSamplers {
        stage: ShaderStage,
        start_slot: u32,
        samplers: Vec<SamplerId>,
    },
    Draw(GeometryId),
}

impl Call {
    pub fn is_map(&self) -> bool {
        matches!(self, Call::Map(_))
    }

    pub fn is_bind(&self) -> bool {
        matches!(
            self,
            Call::SetConstantBuffers { .. } | Call::SetTexture { .. } | Call::SetSamplers { .. }
        )
    }
}

/// What a draw saw when it was issued.
#[derive(Clone, Debug)]
pub struct DrawRecord {
    pub geometry: GeometryId,
    pub state: DrawState,
    pub index_count: u32,
    /// Contents of each bound constant buffer, keyed by stage and slot.
    pub constants: HashMap<(ShaderStage, u32), Vec<u8>>,
    pub textures: HashMap<u32, TextureId>,
}

impl DrawRecord {
    /// Decodes the constant buffer bound at `stage`/`slot`.
    pub fn constant<T: bytemuck::Pod>(&self, stage: ShaderStage, slot: u32) -> Option<T> {
        self.constants
            .get(&(stage, slot))
            .and_then(|bytes| bytes.get(..std::mem::size_of::<T>()))
            .map(bytemuck::pod_read_unaligned)
    }
}

#[derive(Default)]
struct Registry {
    buffers: Vec<Option<u64>>,
    samplers: Vec<bool>,
    programs: Vec<Option<ShaderStage>>,
    entry_points: Vec<String>,
    input_layouts: Vec<bool>,
    binding_layouts: Vec<Option<Vec<ResourceBinding>>>,
    geometries: Vec<Option<u32>>,
    textures: Vec<TextureDimension>,
    calls: Vec<DeviceCall>,
    fail_stage: Option<ShaderStage>,
    fail_link: bool,
    missing_entry_points: HashSet<String>,
    fail_buffer_creation: bool,
    fail_sampler_creation: bool,
}

fn push<T>(list: &mut Vec<T>, value: T) -> usize {
    list.push(value);
    list.len() - 1
}

fn is_live<T>(list: &[Option<T>], index: usize) -> bool {
    matches!(list.get(index), Some(Some(_)))
}

/// Records resource creation and hands out [`RecordingContext`]s.
#[derive(Clone, Default)]
pub struct RecordingDevice {
    registry: Rc<RefCell<Registry>>,
}

impl RecordingDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh context sharing this device's resources.
    pub fn context(&self) -> RecordingContext {
        RecordingContext {
            registry: Rc::clone(&self.registry),
            calls: Vec::new(),
            draws: Vec::new(),
            contents: HashMap::new(),
            mapped: HashSet::new(),
            fail_next_map: false,
            constant_buffers: HashMap::new(),
            textures: HashMap::new(),
            samplers: HashMap::new(),
        }
    }

    /// Registers an externally produced texture.
    pub fn create_texture(&mut self, dimension: TextureDimension) -> TextureId {
        TextureId(push(&mut self.registry.borrow_mut().textures, dimension))
    }

    /// Makes the next compilation of `stage` fail.
    pub fn fail_stage(&mut self, stage: ShaderStage) {
        self.registry.borrow_mut().fail_stage = Some(stage);
    }

    /// Makes every link fail until cleared.
    pub fn fail_link(&mut self, fail: bool) {
        self.registry.borrow_mut().fail_link = fail;
    }

    /// Treats `entry_point` as absent from every source, so a stage naming
    /// it compiles but fails to link.
    pub fn fail_entry_point(&mut self, entry_point: &str) {
        self.registry
            .borrow_mut()
            .missing_entry_points
            .insert(entry_point.to_string());
    }

    /// Makes every constant buffer creation fail until cleared.
    pub fn fail_buffer_creation(&mut self, fail: bool) {
        self.registry.borrow_mut().fail_buffer_creation = fail;
    }

    pub fn fail_sampler_creation(&mut self, fail: bool) {
        self.registry.borrow_mut().fail_sampler_creation = fail;
    }

    pub fn calls(&self) -> Vec<DeviceCall> {
        self.registry.borrow().calls.clone()
    }

    /// Number of buffers created and not yet released.
    pub fn live_buffers(&self) -> usize {
        self.registry.borrow().buffers.iter().flatten().count()
    }
}

impl GraphicsDevice for RecordingDevice {
    fn compile_stage(
        &mut self,
        stage: ShaderStage,
        description: &StageDescription,
    ) -> Result<ProgramId, InitializationError> {
        let mut reg = self.registry.borrow_mut();
        reg.calls.push(DeviceCall::CompileStage {
            stage,
            source: description.source.clone(),
            entry_point: description.entry_point.clone(),
        });

        if reg.fail_stage == Some(stage) {
            reg.fail_stage = None;
            return Err(InitializationError::StageCompilation {
                stage,
                source_name: description.source.clone(),
                entry_point: description.entry_point.clone(),
            });
        }

        reg.entry_points.push(description.entry_point.clone());
        Ok(ProgramId(push(&mut reg.programs, Some(stage))))
    }

    fn create_input_layout(
        &mut self,
        vertex_program: ProgramId,
        elements: &[InputElement],
    ) -> Result<InputLayoutId, InitializationError> {
        let mut reg = self.registry.borrow_mut();
        reg.calls
            .push(DeviceCall::CreateInputLayout(elements.to_vec()));

        if reg.programs.get(vertex_program.0).copied().flatten() != Some(ShaderStage::Vertex) {
            return Err(InitializationError::InputLayout(format!(
                "{vertex_program:?} is not a live vertex program"
            )));
        }
        if elements.is_empty() {
            return Err(InitializationError::InputLayout("no elements".into()));
        }

        Ok(InputLayoutId(push(&mut reg.input_layouts, true)))
    }

    fn create_binding_layout(
        &mut self,
        bindings: &[ResourceBinding],
    ) -> Result<BindingLayoutId, InitializationError> {
        let mut reg = self.registry.borrow_mut();
        reg.calls
            .push(DeviceCall::CreateBindingLayout(bindings.to_vec()));

        let mut seen = HashSet::new();
        for binding in bindings {
            let class = std::mem::discriminant(&binding.kind);
            if !seen.insert((binding.stage, binding.slot, class)) {
                return Err(InitializationError::BindingLayout(format!(
                    "{:?} {} slot {} declared twice",
                    binding.stage,
                    binding.kind.name(),
                    binding.slot
                )));
            }
        }

        Ok(BindingLayoutId(push(
            &mut reg.binding_layouts,
            Some(bindings.to_vec()),
        )))
    }

    fn link_programs(&mut self, state: &DrawState) -> Result<(), InitializationError> {
        let mut reg = self.registry.borrow_mut();
        reg.calls.push(DeviceCall::LinkPrograms(*state));

        let stage_of = |id: ProgramId| reg.programs.get(id.0).copied().flatten();
        let layouts_live = reg.input_layouts.get(state.input_layout.0) == Some(&true)
            && is_live(&reg.binding_layouts, state.bindings.0);
        if stage_of(state.vertex) != Some(ShaderStage::Vertex)
            || stage_of(state.pixel) != Some(ShaderStage::Pixel)
            || !layouts_live
        {
            return Err(InitializationError::PipelineLink(format!(
                "{state:?} names a released or mismatched resource"
            )));
        }

        for program in [state.vertex, state.pixel] {
            let entry = &reg.entry_points[program.0];
            if reg.missing_entry_points.contains(entry) {
                return Err(InitializationError::PipelineLink(format!(
                    "entry point '{entry}' not found"
                )));
            }
        }

        if reg.fail_link {
            return Err(InitializationError::PipelineLink(
                "device rejected the pipeline".into(),
            ));
        }
        Ok(())
    }

    fn create_constant_buffer(
        &mut self,
        label: &str,
        size: u64,
    ) -> Result<BufferId, InitializationError> {
        let mut reg = self.registry.borrow_mut();
        reg.calls.push(DeviceCall::CreateConstantBuffer {
            label: label.to_string(),
            size,
        });

        if reg.fail_buffer_creation || size == 0 {
            return Err(InitializationError::BufferCreation {
                label: label.to_string(),
                size,
            });
        }

        Ok(BufferId(push(&mut reg.buffers, Some(size))))
    }

    fn create_sampler(
        &mut self,
        description: &SamplerDescription,
    ) -> Result<SamplerId, InitializationError> {
        let mut reg = self.registry.borrow_mut();
        reg.calls.push(DeviceCall::CreateSampler(*description));

        if reg.fail_sampler_creation {
            return Err(InitializationError::SamplerCreation);
        }

        Ok(SamplerId(push(&mut reg.samplers, true)))
    }

    fn create_geometry(
        &mut self,
        label: &str,
        vertices: &[u8],
        stride: u32,
        indices: &[u32],
    ) -> Result<GeometryId, InitializationError> {
        let mut reg = self.registry.borrow_mut();
        let index_count = indices.len() as u32;
        reg.calls.push(DeviceCall::CreateGeometry {
            label: label.to_string(),
            index_count,
        });

        let vertex_count = if stride == 0 {
            0
        } else {
            vertices.len() / stride as usize
        };
        let in_range = indices.iter().all(|&i| (i as usize) < vertex_count);
        if vertices.is_empty() || indices.is_empty() || !in_range {
            return Err(InitializationError::GeometryCreation(label.to_string()));
        }

        Ok(GeometryId(push(&mut reg.geometries, Some(index_count))))
    }

    fn release(&mut self, resource: ResourceId) {
        let mut reg = self.registry.borrow_mut();
        reg.calls.push(DeviceCall::Release(resource));

        match resource {
            ResourceId::Buffer(id) => {
                if let Some(slot) = reg.buffers.get_mut(id.0) {
                    *slot = None;
                }
            }
            ResourceId::Sampler(id) => {
                if let Some(slot) = reg.samplers.get_mut(id.0) {
                    *slot = false;
                }
            }
            ResourceId::Program(id) => {
                if let Some(slot) = reg.programs.get_mut(id.0) {
                    *slot = None;
                }
            }
            ResourceId::InputLayout(id) => {
                if let Some(slot) = reg.input_layouts.get_mut(id.0) {
                    *slot = false;
                }
            }
            ResourceId::BindingLayout(id) => {
                if let Some(slot) = reg.binding_layouts.get_mut(id.0) {
                    *slot = None;
                }
            }
            ResourceId::Geometry(id) => {
                if let Some(slot) = reg.geometries.get_mut(id.0) {
                    *slot = None;
                }
            }
        }
    }
}

/// Records per-frame calls against a [`RecordingDevice`].
pub struct RecordingContext {
    registry: Rc<RefCell<Registry>>,
    calls: Vec<Call>,
    draws: Vec<DrawRecord>,
    contents: HashMap<BufferId, Vec<u8>>,
    mapped: HashSet<BufferId>,
    fail_next_map: bool,
    constant_buffers: HashMap<(ShaderStage, u32), BufferId>,
    textures: HashMap<(ShaderStage, u32), TextureId>,
    samplers: HashMap<(ShaderStage, u32), SamplerId>,
}

impl RecordingContext {
    pub fn calls(&self) -> &[Call] {
        &self.calls
    }

    pub fn draws(&self) -> &[DrawRecord] {
        &self.draws
    }

    /// Forgets recorded calls and draws. Buffer contents and bindings persist.
    pub fn clear_calls(&mut self) {
        self.calls.clear();
        self.draws.clear();
    }

    /// Makes the next `map_discard` fail as if the device refused it.
    pub fn fail_next_map(&mut self) {
        self.fail_next_map = true;
    }

    /// Buffers currently mapped.
    pub fn open_maps(&self) -> usize {
        self.mapped.len()
    }

    /// Last bytes written into `buffer` through this context.
    pub fn buffer_contents(&self, buffer: BufferId) -> Option<&[u8]> {
        self.contents.get(&buffer).map(Vec::as_slice)
    }

    fn snapshot(
        &self,
        geometry: GeometryId,
        state: &DrawState,
    ) -> Result<DrawRecord, FrameSyncError> {
        let reg = self.registry.borrow();

        let index_count = reg
            .geometries
            .get(geometry.0)
            .copied()
            .flatten()
            .ok_or_else(|| FrameSyncError::StaleResource(format!("{geometry:?}")))?;

        let live = is_live(&reg.programs, state.vertex.0)
            && is_live(&reg.programs, state.pixel.0)
            && reg.input_layouts.get(state.input_layout.0) == Some(&true);
        if !live {
            return Err(FrameSyncError::StaleResource(format!("{state:?}")));
        }

        let bindings = reg
            .binding_layouts
            .get(state.bindings.0)
            .cloned()
            .flatten()
            .ok_or_else(|| FrameSyncError::StaleResource(format!("{:?}", state.bindings)))?;

        let mut record = DrawRecord {
            geometry,
            state: *state,
            index_count,
            constants: HashMap::new(),
            textures: HashMap::new(),
        };

        for binding in bindings {
            let key = (binding.stage, binding.slot);
            let unbound = FrameSyncError::UnboundSlot {
                stage: binding.stage,
                kind: binding.kind.name(),
                slot: binding.slot,
            };
            match binding.kind {
                BindingKind::ConstantBuffer { .. } => {
                    let buffer = *self.constant_buffers.get(&key).ok_or(unbound)?;
                    if !is_live(&reg.buffers, buffer.0) {
                        return Err(FrameSyncError::StaleResource(format!("{buffer:?}")));
                    }
                    let bytes = self.contents.get(&buffer).cloned().unwrap_or_default();
                    record.constants.insert(key, bytes);
                }
                BindingKind::Texture { .. } => {
                    let texture = *self.textures.get(&key).ok_or(unbound)?;
                    record.textures.insert(binding.slot, texture);
                }
                BindingKind::Sampler => {
                    self.samplers.get(&key).ok_or(unbound)?;
                }
            }
        }

        Ok(record)
    }
}

impl DeviceContext for RecordingContext {
    fn map_discard(&mut self, buffer: BufferId) -> Result<(), FrameSyncError> {
        let size = self.registry.borrow().buffers.get(buffer.0).copied().flatten();

        let failure = if std::mem::take(&mut self.fail_next_map) {
            Some(MapFailure::Refused)
        } else if size.is_none() {
            Some(MapFailure::UnknownBuffer)
        } else if self.mapped.contains(&buffer) {
            Some(MapFailure::AlreadyMapped)
        } else {
            None
        };

        if let Some(reason) = failure {
            self.calls.push(Call::MapFailed(buffer));
            return Err(FrameSyncError::MapFailed { buffer, reason });
        }

        self.calls.push(Call::Map(buffer));
        self.mapped.insert(buffer);
        // discard: the previous contents are gone
        self.contents
            .insert(buffer, vec![0; size.unwrap_or(0) as usize]);
        Ok(())
    }

    fn mapped_data(&mut self, buffer: BufferId) -> Option<&mut [u8]> {
        if !self.mapped.contains(&buffer) {
            return None;
        }
        self.contents.get_mut(&buffer).map(Vec::as_mut_slice)
    }

    fn unmap(&mut self, buffer: BufferId) {
        self.calls.push(Call::Unmap(buffer));
        self.mapped.remove(&buffer);
    }

    fn set_constant_buffers(&mut self, stage: ShaderStage, start_slot: u32, buffers: &[BufferId]) {
        self.calls.push(Call::SetConstantBuffers {
            stage,
            start_slot,
            buffers: buffers.to_vec(),
        });
        for (slot, buffer) in (start_slot..).zip(buffers) {
            self.constant_buffers.insert((stage, slot), *buffer);
        }
    }

    fn set_texture(&mut self, stage: ShaderStage, slot: u32, texture: Option<TextureId>) {
        self.calls.push(Call::SetTexture {
            stage,
            slot,
            texture,
        });
        match texture {
            Some(texture) => self.textures.insert((stage, slot), texture),
            None => self.textures.remove(&(stage, slot)),
        };
    }

    fn set_samplers(&mut self, stage: ShaderStage, start_slot: u32, samplers: &[SamplerId]) {
        self.calls.push(Call::SetSamplers {
            stage,
            start_slot,
            samplers: samplers.to_vec(),
        });
        for (slot, sampler) in (start_slot..).zip(samplers) {
            self.samplers.insert((stage, slot), *sampler);
        }
    }

    fn draw_indexed(
        &mut self,
        geometry: GeometryId,
        state: &DrawState,
    ) -> Result<(), FrameSyncError> {
        let record = self.snapshot(geometry, state)?;
        self.calls.push(Call::Draw(geometry));
        self.draws.push(record);
        Ok(())
    }
}
