//! wgpu implementation of the device interface.
//!
//! # Binding model
//!
//! Slots map onto two bind groups:
//!
//! | Stage  | Group | Constant buffer slot `s` | Texture slot `t` | Sampler slot `k` |
//! |--------|-------|--------------------------|------------------|------------------|
//! | Vertex | 0     | binding `s`              | binding `8 + t`  | binding `12 + k` |
//! | Pixel  | 1     | binding `s`              | binding `8 + t`  | binding `12 + k` |
//!
//! WGSL sources written for this backend declare their resources with these
//! group/binding numbers.
//!
//! # Write-discard
//!
//! `map_discard` hands out a zeroed staging region. `unmap` uploads it into a
//! spare version of the uniform buffer, which becomes the buffer's current
//! version. Draws recorded earlier in the same submission keep the version
//! they were bound with, so reusing one shader for several draws per frame
//! is safe.
//!
//! Versions replaced during a frame return to the spare list when the next
//! [`WgpuDevice::frame`] opens. One `frame` call per queue submission keeps
//! that reuse sound.
//!
//! # Pipelines
//!
//! Render pipelines are built and cached when a shader links its stages
//! during initialization, so a bad entry point or a binding the WGSL does not
//! declare fails there. A draw state that was never linked is built on its
//! first draw.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use wgpu::util::DeviceExt;

use crate::device::{
    AddressMode, BindingKind, BindingLayoutId, BlendMode, BufferId, CullMode, DeviceContext,
    DrawState, FilterMode, GeometryId, GraphicsDevice, InputElement, InputLayoutId, ProgramId,
    ResourceBinding, ResourceId, SamplerDescription, SamplerId, ShaderStage, StageDescription,
    StepMode, TextureDimension, TextureId, VertexFormat,
};
use crate::error::{FrameSyncError, InitializationError, MapFailure};
use crate::gpu::GpuContext;

/// First binding index used for texture slots within a stage's group.
pub const TEXTURE_BINDING_BASE: u32 = 8;
/// First binding index used for sampler slots within a stage's group.
pub const SAMPLER_BINDING_BASE: u32 = 12;

const STAGES: [ShaderStage; 2] = [ShaderStage::Vertex, ShaderStage::Pixel];

fn binding_index(binding: &ResourceBinding) -> u32 {
    match binding.kind {
        BindingKind::ConstantBuffer { .. } => binding.slot,
        BindingKind::Texture { .. } => TEXTURE_BINDING_BASE + binding.slot,
        BindingKind::Sampler => SAMPLER_BINDING_BASE + binding.slot,
    }
}

fn visibility(stage: ShaderStage) -> wgpu::ShaderStages {
    match stage {
        ShaderStage::Vertex => wgpu::ShaderStages::VERTEX,
        ShaderStage::Pixel => wgpu::ShaderStages::FRAGMENT,
    }
}

fn view_dimension(dimension: TextureDimension) -> wgpu::TextureViewDimension {
    match dimension {
        TextureDimension::D2 => wgpu::TextureViewDimension::D2,
        TextureDimension::D3 => wgpu::TextureViewDimension::D3,
    }
}

fn vertex_format(format: VertexFormat) -> wgpu::VertexFormat {
    match format {
        VertexFormat::Float32x2 => wgpu::VertexFormat::Float32x2,
        VertexFormat::Float32x3 => wgpu::VertexFormat::Float32x3,
        VertexFormat::Float32x4 => wgpu::VertexFormat::Float32x4,
    }
}

fn address_mode(mode: AddressMode) -> wgpu::AddressMode {
    match mode {
        AddressMode::Clamp => wgpu::AddressMode::ClampToEdge,
        AddressMode::Repeat => wgpu::AddressMode::Repeat,
    }
}

fn filter_mode(mode: FilterMode) -> wgpu::FilterMode {
    match mode {
        FilterMode::Nearest => wgpu::FilterMode::Nearest,
        FilterMode::Linear => wgpu::FilterMode::Linear,
    }
}

fn live<T>(list: &[Option<T>], index: usize) -> Option<&T> {
    list.get(index).and_then(Option::as_ref)
}

/// Resolves shader source names to WGSL text.
///
/// Embedded sources are checked first, then `search_dir` on disk.
#[derive(Debug, Default)]
pub struct ShaderSourceResolver {
    embedded: HashMap<String, &'static str>,
    search_dir: Option<PathBuf>,
}

impl ShaderSourceResolver {
    /// A resolver preloaded with the crate's built-in shaders.
    pub fn with_builtin() -> Self {
        let mut resolver = Self::default();
        resolver.embed(
            crate::volume_shader::VOLUME_SHADER_SOURCE,
            include_str!("../shaders/volume_render.wgsl"),
        );
        resolver.embed(
            crate::flat_shader::FLAT_SHADER_SOURCE,
            include_str!("../shaders/flat.wgsl"),
        );
        resolver
    }

    pub fn embed(&mut self, name: impl Into<String>, source: &'static str) {
        self.embedded.insert(name.into(), source);
    }

    /// Directory searched for names that are not embedded.
    pub fn search_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.search_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn resolve(&self, name: &str) -> Result<String, InitializationError> {
        if let Some(source) = self.embedded.get(name) {
            return Ok((*source).to_string());
        }

        let path = match &self.search_dir {
            Some(dir) => dir.join(name),
            None => PathBuf::from(name),
        };
        std::fs::read_to_string(&path).map_err(|e| InitializationError::SourceNotFound {
            source_name: name.to_string(),
            reason: format!("{}: {e}", path.display()),
        })
    }
}

struct Program {
    stage: ShaderStage,
    module: wgpu::ShaderModule,
    entry_point: String,
}

struct InputLayout {
    stride: u64,
    step_mode: wgpu::VertexStepMode,
    attributes: Vec<wgpu::VertexAttribute>,
}

struct BindingLayout {
    bindings: Vec<ResourceBinding>,
    groups: Vec<wgpu::BindGroupLayout>,
}

struct UniformSlot {
    label: String,
    current: wgpu::Buffer,
    /// Versions replaced this frame; still referenced by recorded draws.
    in_flight: Vec<wgpu::Buffer>,
    spare: Vec<wgpu::Buffer>,
    staging: Vec<u8>,
    mapped: bool,
}

impl UniformSlot {
    fn create_version(device: &wgpu::Device, label: &str, size: u64) -> wgpu::Buffer {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    fn recycle(&mut self) {
        self.spare.append(&mut self.in_flight);
    }

    fn destroy(self) {
        self.current.destroy();
        for buffer in self.in_flight.iter().chain(&self.spare) {
            buffer.destroy();
        }
    }
}

struct Geometry {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
}

struct BoundTexture {
    view: wgpu::TextureView,
    dimension: TextureDimension,
}

#[derive(Default)]
struct BoundSlots {
    constant_buffers: HashMap<(ShaderStage, u32), BufferId>,
    textures: HashMap<(ShaderStage, u32), TextureId>,
    samplers: HashMap<(ShaderStage, u32), SamplerId>,
}

/// Resource owner for the wgpu backend.
pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    color_format: wgpu::TextureFormat,
    depth_format: Option<wgpu::TextureFormat>,
    sources: ShaderSourceResolver,
    modules: HashMap<String, wgpu::ShaderModule>,
    programs: Vec<Option<Program>>,
    input_layouts: Vec<Option<InputLayout>>,
    binding_layouts: Vec<Option<BindingLayout>>,
    buffers: Vec<Option<UniformSlot>>,
    samplers: Vec<Option<wgpu::Sampler>>,
    geometries: Vec<Option<Geometry>>,
    textures: Vec<Option<BoundTexture>>,
    pipelines: HashMap<DrawState, wgpu::RenderPipeline>,
    bound: BoundSlots,
}

impl WgpuDevice {
    /// Creates a device rendering into `gpu`'s surface format, without depth.
    pub fn new(gpu: &GpuContext) -> Self {
        Self::with_formats(gpu.device.clone(), gpu.queue.clone(), gpu.config.format, None)
    }

    pub fn with_formats(
        device: wgpu::Device,
        queue: wgpu::Queue,
        color_format: wgpu::TextureFormat,
        depth_format: Option<wgpu::TextureFormat>,
    ) -> Self {
        Self {
            device,
            queue,
            color_format,
            depth_format,
            sources: ShaderSourceResolver::with_builtin(),
            modules: HashMap::new(),
            programs: Vec::new(),
            input_layouts: Vec::new(),
            binding_layouts: Vec::new(),
            buffers: Vec::new(),
            samplers: Vec::new(),
            geometries: Vec::new(),
            textures: Vec::new(),
            pipelines: HashMap::new(),
            bound: BoundSlots::default(),
        }
    }

    /// Replaces the shader source resolver.
    pub fn set_sources(&mut self, sources: ShaderSourceResolver) {
        self.sources = sources;
        self.modules.clear();
    }

    /// Registers an externally owned texture view so it can be bound.
    ///
    /// The view must be filterable (e.g. `R8Unorm`, `R16Float`, `Rgba8Unorm`).
    pub fn register_texture(
        &mut self,
        view: wgpu::TextureView,
        dimension: TextureDimension,
    ) -> TextureId {
        self.textures.push(Some(BoundTexture { view, dimension }));
        TextureId(self.textures.len() - 1)
    }

    /// Points an existing texture id at a new view.
    pub fn replace_texture(&mut self, texture: TextureId, view: wgpu::TextureView) {
        if let Some(Some(bound)) = self.textures.get_mut(texture.0) {
            bound.view = view;
        }
    }

    pub fn unregister_texture(&mut self, texture: TextureId) {
        if let Some(slot) = self.textures.get_mut(texture.0) {
            *slot = None;
        }
    }

    /// Opens a per-frame context recording into `pass`.
    ///
    /// Buffer versions replaced during the previous frame become reusable.
    pub fn frame<'a, 'pass>(
        &'a mut self,
        pass: &'a mut wgpu::RenderPass<'pass>,
    ) -> WgpuFrame<'a, 'pass> {
        for slot in self.buffers.iter_mut().flatten() {
            slot.recycle();
        }
        WgpuFrame { device: self, pass }
    }

    fn module(
        &mut self,
        stage: ShaderStage,
        description: &StageDescription,
    ) -> Result<wgpu::ShaderModule, InitializationError> {
        let source_name = description.source.as_str();
        if let Some(module) = self.modules.get(source_name) {
            return Ok(module.clone());
        }

        let source = self.sources.resolve(source_name)?;
        let device = &self.device;
        // wgpu reports invalid WGSL through its error handler, which panics by default
        let module = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(source_name),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            })
        }))
        .map_err(|_| InitializationError::StageCompilation {
            stage,
            source_name: source_name.to_string(),
            entry_point: description.entry_point.clone(),
        })?;

        self.modules.insert(source_name.to_string(), module.clone());
        Ok(module)
    }

    fn build_pipeline(&self, state: &DrawState) -> Result<wgpu::RenderPipeline, FrameSyncError> {
        let stale = |what: String| FrameSyncError::StaleResource(what);
        let vertex = live(&self.programs, state.vertex.0)
            .ok_or_else(|| stale(format!("{:?}", state.vertex)))?;
        let pixel = live(&self.programs, state.pixel.0)
            .ok_or_else(|| stale(format!("{:?}", state.pixel)))?;
        let layout = live(&self.input_layouts, state.input_layout.0)
            .ok_or_else(|| stale(format!("{:?}", state.input_layout)))?;
        let bindings = live(&self.binding_layouts, state.bindings.0)
            .ok_or_else(|| stale(format!("{:?}", state.bindings)))?;

        if vertex.stage != ShaderStage::Vertex || pixel.stage != ShaderStage::Pixel {
            return Err(FrameSyncError::Pipeline("program stages swapped".into()));
        }

        let group_layouts: Vec<&wgpu::BindGroupLayout> = bindings.groups.iter().collect();
        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Plume Pipeline Layout"),
                bind_group_layouts: &group_layouts,
                push_constant_ranges: &[],
            });

        let buffers = [wgpu::VertexBufferLayout {
            array_stride: layout.stride,
            step_mode: layout.step_mode,
            attributes: &layout.attributes,
        }];

        let blend = match state.raster.blend {
            BlendMode::Opaque => wgpu::BlendState::REPLACE,
            BlendMode::Alpha => wgpu::BlendState::ALPHA_BLENDING,
        };
        let cull_mode = match state.raster.cull {
            CullMode::None => None,
            CullMode::Front => Some(wgpu::Face::Front),
            CullMode::Back => Some(wgpu::Face::Back),
        };
        let depth_stencil = self.depth_format.map(|format| wgpu::DepthStencilState {
            format,
            depth_write_enabled: state.raster.blend == BlendMode::Opaque,
            depth_compare: wgpu::CompareFunction::Less,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        });

        let device = &self.device;
        std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("Plume Pipeline"),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &vertex.module,
                    entry_point: Some(&vertex.entry_point),
                    buffers: &buffers,
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &pixel.module,
                    entry_point: Some(&pixel.entry_point),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: self.color_format,
                        blend: Some(blend),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    cull_mode,
                    front_face: wgpu::FrontFace::Ccw,
                    ..Default::default()
                },
                depth_stencil,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            })
        }))
        .map_err(|_| {
            FrameSyncError::Pipeline(format!(
                "'{}' / '{}' rejected by validation",
                vertex.entry_point, pixel.entry_point
            ))
        })
    }

    fn pipeline(&mut self, state: &DrawState) -> Result<wgpu::RenderPipeline, FrameSyncError> {
        if let Some(pipeline) = self.pipelines.get(state) {
            return Ok(pipeline.clone());
        }

        let pipeline = self.build_pipeline(state)?;
        log::warn!("built pipeline for unlinked {state:?} at draw time");
        self.pipelines.insert(*state, pipeline.clone());
        Ok(pipeline)
    }

    fn bind_groups(&self, state: &DrawState) -> Result<Vec<wgpu::BindGroup>, FrameSyncError> {
        let layout = live(&self.binding_layouts, state.bindings.0)
            .ok_or_else(|| FrameSyncError::StaleResource(format!("{:?}", state.bindings)))?;

        let mut groups = Vec::with_capacity(STAGES.len());
        for (group_layout, stage) in layout.groups.iter().zip(STAGES) {
            let mut entries = Vec::new();

            for binding in layout.bindings.iter().filter(|b| b.stage == stage) {
                let key = (stage, binding.slot);
                let unbound = || FrameSyncError::UnboundSlot {
                    stage,
                    kind: binding.kind.name(),
                    slot: binding.slot,
                };

                let resource = match binding.kind {
                    BindingKind::ConstantBuffer { .. } => {
                        let id = self.bound.constant_buffers.get(&key).ok_or_else(unbound)?;
                        let slot = live(&self.buffers, id.0)
                            .ok_or_else(|| FrameSyncError::StaleResource(format!("{id:?}")))?;
                        slot.current.as_entire_binding()
                    }
                    BindingKind::Texture { dimension } => {
                        let id = self.bound.textures.get(&key).ok_or_else(unbound)?;
                        let texture = live(&self.textures, id.0)
                            .ok_or_else(|| FrameSyncError::StaleResource(format!("{id:?}")))?;
                        if texture.dimension != dimension {
                            return Err(FrameSyncError::StaleResource(format!(
                                "{id:?} is {:?}, slot expects {dimension:?}",
                                texture.dimension
                            )));
                        }
                        wgpu::BindingResource::TextureView(&texture.view)
                    }
                    BindingKind::Sampler => {
                        let id = self.bound.samplers.get(&key).ok_or_else(unbound)?;
                        let sampler = live(&self.samplers, id.0)
                            .ok_or_else(|| FrameSyncError::StaleResource(format!("{id:?}")))?;
                        wgpu::BindingResource::Sampler(sampler)
                    }
                };

                entries.push(wgpu::BindGroupEntry {
                    binding: binding_index(binding),
                    resource,
                });
            }

            groups.push(self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Plume Bind Group"),
                layout: group_layout,
                entries: &entries,
            }));
        }

        Ok(groups)
    }
}

impl GraphicsDevice for WgpuDevice {
    fn compile_stage(
        &mut self,
        stage: ShaderStage,
        description: &StageDescription,
    ) -> Result<ProgramId, InitializationError> {
        let module = self.module(stage, description)?;

        log::debug!(
            "compiled {stage:?} stage '{}' from '{}'",
            description.entry_point,
            description.source
        );
        self.programs.push(Some(Program {
            stage,
            module,
            entry_point: description.entry_point.clone(),
        }));
        Ok(ProgramId(self.programs.len() - 1))
    }

    fn create_input_layout(
        &mut self,
        vertex_program: ProgramId,
        elements: &[InputElement],
    ) -> Result<InputLayoutId, InitializationError> {
        match live(&self.programs, vertex_program.0) {
            Some(program) if program.stage == ShaderStage::Vertex => {}
            _ => {
                return Err(InitializationError::InputLayout(format!(
                    "{vertex_program:?} is not a live vertex program"
                )));
            }
        }

        let first = elements
            .first()
            .ok_or_else(|| InitializationError::InputLayout("no elements".into()))?;
        if elements.iter().any(|e| e.step != first.step) {
            return Err(InitializationError::InputLayout(
                "per-vertex and per-instance elements need separate buffers".into(),
            ));
        }

        let stride = elements
            .iter()
            .map(|e| (e.offset + e.format.size()) as u64)
            .max()
            .unwrap_or(0);
        let attributes = elements
            .iter()
            .map(|e| wgpu::VertexAttribute {
                format: vertex_format(e.format),
                offset: e.offset as u64,
                shader_location: e.location,
            })
            .collect();
        let step_mode = match first.step {
            StepMode::PerVertex => wgpu::VertexStepMode::Vertex,
            StepMode::PerInstance => wgpu::VertexStepMode::Instance,
        };

        self.input_layouts.push(Some(InputLayout {
            stride,
            step_mode,
            attributes,
        }));
        Ok(InputLayoutId(self.input_layouts.len() - 1))
    }

    fn create_binding_layout(
        &mut self,
        bindings: &[ResourceBinding],
    ) -> Result<BindingLayoutId, InitializationError> {
        let mut groups = Vec::with_capacity(STAGES.len());

        for stage in STAGES {
            let mut entries: Vec<wgpu::BindGroupLayoutEntry> = Vec::new();
            for binding in bindings.iter().filter(|b| b.stage == stage) {
                let index = binding_index(binding);
                if entries.iter().any(|e| e.binding == index) {
                    return Err(InitializationError::BindingLayout(format!(
                        "{stage:?} {} slot {} declared twice",
                        binding.kind.name(),
                        binding.slot
                    )));
                }

                let ty = match binding.kind {
                    BindingKind::ConstantBuffer { size } => wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: wgpu::BufferSize::new(size),
                    },
                    BindingKind::Texture { dimension } => wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: view_dimension(dimension),
                        multisampled: false,
                    },
                    BindingKind::Sampler => {
                        wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering)
                    }
                };

                entries.push(wgpu::BindGroupLayoutEntry {
                    binding: index,
                    visibility: visibility(stage),
                    ty,
                    count: None,
                });
            }

            groups.push(
                self.device
                    .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                        label: Some("Plume Bind Group Layout"),
                        entries: &entries,
                    }),
            );
        }

        self.binding_layouts.push(Some(BindingLayout {
            bindings: bindings.to_vec(),
            groups,
        }));
        Ok(BindingLayoutId(self.binding_layouts.len() - 1))
    }

    fn link_programs(&mut self, state: &DrawState) -> Result<(), InitializationError> {
        if self.pipelines.contains_key(state) {
            return Ok(());
        }

        let pipeline = self
            .build_pipeline(state)
            .map_err(|e| InitializationError::PipelineLink(e.to_string()))?;
        log::debug!("linked pipeline for {state:?}");
        self.pipelines.insert(*state, pipeline);
        Ok(())
    }

    fn create_constant_buffer(
        &mut self,
        label: &str,
        size: u64,
    ) -> Result<BufferId, InitializationError> {
        let max = self.device.limits().max_uniform_buffer_binding_size as u64;
        if size == 0 || size > max {
            return Err(InitializationError::BufferCreation {
                label: label.to_string(),
                size,
            });
        }

        let current = UniformSlot::create_version(&self.device, label, size);

        self.buffers.push(Some(UniformSlot {
            label: label.to_string(),
            current,
            in_flight: Vec::new(),
            spare: Vec::new(),
            staging: vec![0; size as usize],
            mapped: false,
        }));
        Ok(BufferId(self.buffers.len() - 1))
    }

    fn create_sampler(
        &mut self,
        description: &SamplerDescription,
    ) -> Result<SamplerId, InitializationError> {
        let filter = filter_mode(description.filter);
        let sampler = self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Plume Sampler"),
            address_mode_u: address_mode(description.address_u),
            address_mode_v: address_mode(description.address_v),
            address_mode_w: address_mode(description.address_w),
            mag_filter: filter,
            min_filter: filter,
            mipmap_filter: filter,
            ..Default::default()
        });

        self.samplers.push(Some(sampler));
        Ok(SamplerId(self.samplers.len() - 1))
    }

    fn create_geometry(
        &mut self,
        label: &str,
        vertices: &[u8],
        stride: u32,
        indices: &[u32],
    ) -> Result<GeometryId, InitializationError> {
        let vertex_count = vertices.len() / stride.max(1) as usize;
        if vertices.is_empty()
            || indices.is_empty()
            || indices.iter().any(|&i| i as usize >= vertex_count)
        {
            return Err(InitializationError::GeometryCreation(label.to_string()));
        }

        let vertex_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("{label} Vertex Buffer")),
                contents: vertices,
                usage: wgpu::BufferUsages::VERTEX,
            });
        let index_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("{label} Index Buffer")),
                contents: bytemuck::cast_slice(indices),
                usage: wgpu::BufferUsages::INDEX,
            });

        self.geometries.push(Some(Geometry {
            vertex_buffer,
            index_buffer,
            index_count: indices.len() as u32,
        }));
        Ok(GeometryId(self.geometries.len() - 1))
    }

    fn release(&mut self, resource: ResourceId) {
        match resource {
            ResourceId::Buffer(id) => {
                if let Some(Some(slot)) = self.buffers.get_mut(id.0).map(Option::take) {
                    slot.destroy();
                }
            }
            ResourceId::Sampler(id) => {
                if let Some(slot) = self.samplers.get_mut(id.0) {
                    *slot = None;
                }
            }
            ResourceId::Program(id) => {
                if let Some(slot) = self.programs.get_mut(id.0) {
                    *slot = None;
                }
                self.pipelines
                    .retain(|state, _| state.vertex != id && state.pixel != id);
            }
            ResourceId::InputLayout(id) => {
                if let Some(slot) = self.input_layouts.get_mut(id.0) {
                    *slot = None;
                }
                self.pipelines.retain(|state, _| state.input_layout != id);
            }
            ResourceId::BindingLayout(id) => {
                if let Some(slot) = self.binding_layouts.get_mut(id.0) {
                    *slot = None;
                }
                self.pipelines.retain(|state, _| state.bindings != id);
            }
            ResourceId::Geometry(id) => {
                if let Some(Some(geometry)) = self.geometries.get_mut(id.0).map(Option::take) {
                    geometry.vertex_buffer.destroy();
                    geometry.index_buffer.destroy();
                }
            }
        }
    }
}

/// Per-frame context over one render pass.
pub struct WgpuFrame<'a, 'pass> {
    device: &'a mut WgpuDevice,
    pass: &'a mut wgpu::RenderPass<'pass>,
}

impl DeviceContext for WgpuFrame<'_, '_> {
    fn map_discard(&mut self, buffer: BufferId) -> Result<(), FrameSyncError> {
        let slot = self
            .device
            .buffers
            .get_mut(buffer.0)
            .and_then(Option::as_mut)
            .ok_or(FrameSyncError::MapFailed {
                buffer,
                reason: MapFailure::UnknownBuffer,
            })?;

        if slot.mapped {
            return Err(FrameSyncError::MapFailed {
                buffer,
                reason: MapFailure::AlreadyMapped,
            });
        }

        slot.staging.fill(0);
        slot.mapped = true;
        Ok(())
    }

    fn mapped_data(&mut self, buffer: BufferId) -> Option<&mut [u8]> {
        self.device
            .buffers
            .get_mut(buffer.0)
            .and_then(Option::as_mut)
            .filter(|slot| slot.mapped)
            .map(|slot| slot.staging.as_mut_slice())
    }

    fn unmap(&mut self, buffer: BufferId) {
        let device = &self.device.device;
        let queue = &self.device.queue;
        let Some(Some(slot)) = self.device.buffers.get_mut(buffer.0) else {
            return;
        };
        if !slot.mapped {
            return;
        }

        let next = match slot.spare.pop() {
            Some(spare) => spare,
            None => UniformSlot::create_version(device, &slot.label, slot.staging.len() as u64),
        };
        queue.write_buffer(&next, 0, &slot.staging);
        let previous = std::mem::replace(&mut slot.current, next);
        slot.in_flight.push(previous);
        slot.mapped = false;
    }

    fn set_constant_buffers(&mut self, stage: ShaderStage, start_slot: u32, buffers: &[BufferId]) {
        for (slot, buffer) in (start_slot..).zip(buffers) {
            self.device
                .bound
                .constant_buffers
                .insert((stage, slot), *buffer);
        }
    }

    fn set_texture(&mut self, stage: ShaderStage, slot: u32, texture: Option<TextureId>) {
        let textures = &mut self.device.bound.textures;
        match texture {
            Some(texture) => textures.insert((stage, slot), texture),
            None => textures.remove(&(stage, slot)),
        };
    }

    fn set_samplers(&mut self, stage: ShaderStage, start_slot: u32, samplers: &[SamplerId]) {
        for (slot, sampler) in (start_slot..).zip(samplers) {
            self.device.bound.samplers.insert((stage, slot), *sampler);
        }
    }

    fn draw_indexed(
        &mut self,
        geometry: GeometryId,
        state: &DrawState,
    ) -> Result<(), FrameSyncError> {
        let pipeline = self.device.pipeline(state)?;
        let groups = self.device.bind_groups(state)?;
        let geometry = live(&self.device.geometries, geometry.0)
            .ok_or_else(|| FrameSyncError::StaleResource(format!("{geometry:?}")))?;

        self.pass.set_pipeline(&pipeline);
        for (index, group) in groups.iter().enumerate() {
            self.pass.set_bind_group(index as u32, group, &[]);
        }
        self.pass
            .set_vertex_buffer(0, geometry.vertex_buffer.slice(..));
        self.pass
            .set_index_buffer(geometry.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
        self.pass.draw_indexed(0..geometry.index_count, 0, 0..1);
        Ok(())
    }
}
