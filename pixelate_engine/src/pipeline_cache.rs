//! Hash-keyed cache of compiled graphics pipelines
//!
//! A pipeline is keyed by its descriptor plus the render-target layout of the
//! pass using it (per-attachment blend states and formats). Viewport and
//! scissor are dynamic, so cached pipelines survive swapchain resizes.
//! Entries live until [`PipelineCache::dispose`]; there is no eviction.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use rustc_hash::FxHashMap;

use crate::device::*;
use crate::error::{Error, Result};
use crate::hasher::{ContentHash, Hasher};
use crate::{engine_debug, engine_error};

const SOURCE: &str = "pixelate::PipelineCache";

/// Shader entry point used for every stage
pub const SHADER_ENTRY_POINT: &str = "main";

/// Graphics stages a pipeline may load bytecode for, in pipeline order
const GRAPHICS_STAGES: [ShaderStageFlags; 2] = [ShaderStageFlags::VERTEX, ShaderStageFlags::FRAGMENT];

// ===== DESCRIPTORS =====

/// Location of a shader program's compiled stages
///
/// Stage bytecode is read from `{path}/{name}_{stage}.spv`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShaderRef {
    pub path: PathBuf,
    pub name: String,
}

impl ShaderRef {
    pub fn new(path: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self { path: path.into(), name: name.into() }
    }

    /// Bytecode path of one stage, None for stages without a file suffix
    pub fn stage_path(&self, stage: ShaderStageFlags) -> Option<PathBuf> {
        let suffix = stage.file_suffix()?;
        Some(self.path.join(format!("{}_{}.spv", self.name, suffix)))
    }
}

impl ContentHash for ShaderRef {
    fn content_hash(&self, hasher: &mut Hasher) {
        hasher
            .hash_str(&self.path.to_string_lossy())
            .hash_str(&self.name);
    }
}

/// Everything that identifies a graphics pipeline apart from its render targets
#[derive(Debug, Clone, PartialEq)]
pub struct GraphicsPipelineDescriptor {
    pub shader: ShaderRef,
    pub stages: ShaderStageFlags,
    pub vertex_layout: VertexLayout,
    pub input_assembly: InputAssemblyState,
    pub rasterization: RasterizationState,
    pub multisample: MultisampleState,
    pub depth_stencil: DepthStencilState,
    pub color_blend: ColorBlendState,
    /// One binding list per descriptor set, in set order
    pub descriptor_set_layouts: Vec<Vec<DescriptorSetLayoutBinding>>,
    pub push_constant_ranges: Vec<PushConstantRange>,
}

impl GraphicsPipelineDescriptor {
    /// Vertex + fragment pipeline with default fixed-function state
    pub fn new(shader: ShaderRef) -> Self {
        Self {
            shader,
            stages: ShaderStageFlags::VERTEX | ShaderStageFlags::FRAGMENT,
            vertex_layout: VertexLayout::default(),
            input_assembly: InputAssemblyState::default(),
            rasterization: RasterizationState::default(),
            multisample: MultisampleState::default(),
            depth_stencil: DepthStencilState::default(),
            color_blend: ColorBlendState::default(),
            descriptor_set_layouts: Vec::new(),
            push_constant_ranges: Vec::new(),
        }
    }
}

impl ContentHash for GraphicsPipelineDescriptor {
    fn content_hash(&self, hasher: &mut Hasher) {
        hasher
            .hash_content(&self.shader)
            .hash_content(&self.stages)
            .hash_content(&self.vertex_layout)
            .hash_content(&self.input_assembly)
            .hash_content(&self.rasterization)
            .hash_content(&self.multisample)
            .hash_content(&self.depth_stencil)
            .hash_content(&self.color_blend)
            .hash_slice(&self.descriptor_set_layouts)
            .hash_slice(&self.push_constant_ranges);
    }
}

/// One color attachment as seen by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColorTarget {
    pub format: Format,
    pub blend: ColorBlendAttachment,
}

/// Attachment formats and blend states a pipeline renders into
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct RenderTargetLayout {
    /// In attachment order
    pub color_targets: Vec<ColorTarget>,
    pub depth_format: Option<Format>,
}

impl ContentHash for ColorTarget {
    fn content_hash(&self, hasher: &mut Hasher) {
        hasher.hash_content(&self.format).hash_content(&self.blend);
    }
}

impl ContentHash for RenderTargetLayout {
    fn content_hash(&self, hasher: &mut Hasher) {
        hasher
            .hash_slice(&self.color_targets)
            .hash_content(&self.depth_format);
    }
}

/// Cache key of a descriptor rendering into a target layout
pub fn pipeline_key(descriptor: &GraphicsPipelineDescriptor, targets: &RenderTargetLayout) -> u64 {
    let mut hasher = Hasher::new();
    hasher.hash_content(descriptor).hash_content(targets);
    hasher.value()
}

// ===== CACHE =====

/// A compiled pipeline and the layout objects it was built with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedPipeline {
    pub pipeline: PipelineHandle,
    pub layout: PipelineLayoutHandle,
    pub set_layouts: Vec<DescriptorSetLayoutHandle>,
}

pub struct PipelineCache {
    device: Arc<dyn GraphicsDevice>,
    shader_loader: Arc<dyn ShaderLoader>,
    pipelines: Mutex<FxHashMap<u64, CachedPipeline>>,
}

impl PipelineCache {
    pub fn new(device: Arc<dyn GraphicsDevice>, shader_loader: Arc<dyn ShaderLoader>) -> Self {
        Self {
            device,
            shader_loader,
            pipelines: Mutex::new(FxHashMap::default()),
        }
    }

    fn pipelines(&self) -> MutexGuard<'_, FxHashMap<u64, CachedPipeline>> {
        self.pipelines.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Get or compile the pipeline for a descriptor and render-target layout
    ///
    /// The cache lock is held while compiling, so concurrent misses on one key
    /// compile once. Nothing is cached when compilation fails.
    ///
    /// # Errors
    ///
    /// `ShaderLoadFailed` when a stage's bytecode cannot be read,
    /// `InvalidResource` without a vertex stage, backend errors otherwise.
    pub fn get_graphics_pipeline(
        &self,
        descriptor: &GraphicsPipelineDescriptor,
        targets: &RenderTargetLayout,
    ) -> Result<CachedPipeline> {
        let key = pipeline_key(descriptor, targets);
        let mut pipelines = self.pipelines();
        if let Some(cached) = pipelines.get(&key) {
            return Ok(cached.clone());
        }

        let cached = self.compile(descriptor, targets)?;
        engine_debug!(SOURCE, "Compiled pipeline {:?} for shader '{}' ({} color targets)",
            cached.pipeline, descriptor.shader.name, targets.color_targets.len());
        pipelines.insert(key, cached.clone());
        Ok(cached)
    }

    fn compile(&self, descriptor: &GraphicsPipelineDescriptor, targets: &RenderTargetLayout) -> Result<CachedPipeline> {
        if !descriptor.stages.contains(ShaderStageFlags::VERTEX) {
            let message = format!("Pipeline '{}' has no vertex stage", descriptor.shader.name);
            engine_error!(SOURCE, "{}", message);
            return Err(Error::InvalidResource(message));
        }

        let stages = self.load_shader_stages(descriptor)?;
        let result = self.build(descriptor, targets, &stages);

        // Modules are only needed while the pipeline is compiled
        for stage in &stages {
            self.device.destroy_shader_module(stage.module);
        }
        result
    }

    fn load_shader_stages(&self, descriptor: &GraphicsPipelineDescriptor) -> Result<Vec<ShaderStage>> {
        let mut stages = Vec::new();
        for stage in GRAPHICS_STAGES {
            if !descriptor.stages.contains(stage) {
                continue;
            }
            let loaded = descriptor
                .shader
                .stage_path(stage)
                .ok_or_else(|| Error::InvalidResource(format!("No bytecode suffix for {:?}", stage)))
                .and_then(|path| self.load_module(&path));

            match loaded {
                Ok(module) => stages.push(ShaderStage {
                    stage,
                    module,
                    entry_point: SHADER_ENTRY_POINT.to_string(),
                }),
                Err(e) => {
                    for created in &stages {
                        self.device.destroy_shader_module(created.module);
                    }
                    return Err(e);
                }
            }
        }
        Ok(stages)
    }

    fn load_module(&self, path: &Path) -> Result<ShaderModuleHandle> {
        let code = self.shader_loader.load(path)?;
        self.device.create_shader_module(&code).map_err(|e| {
            engine_error!(SOURCE, "Failed to create shader module from '{}': {}", path.display(), e);
            e
        })
    }

    fn build(
        &self,
        descriptor: &GraphicsPipelineDescriptor,
        targets: &RenderTargetLayout,
        stages: &[ShaderStage],
    ) -> Result<CachedPipeline> {
        let set_layouts = self.create_descriptor_set_layouts(descriptor)?;
        let layout = match self
            .device
            .create_pipeline_layout(&set_layouts, &descriptor.push_constant_ranges)
        {
            Ok(layout) => layout,
            Err(e) => {
                engine_error!(SOURCE, "Failed to create pipeline layout for '{}': {}", descriptor.shader.name, e);
                self.destroy_set_layouts(&set_layouts);
                return Err(e);
            }
        };

        let info = GraphicsPipelineCreateInfo {
            stages: stages.to_vec(),
            vertex_layout: descriptor.vertex_layout.clone(),
            input_assembly: descriptor.input_assembly,
            rasterization: descriptor.rasterization,
            multisample: descriptor.multisample,
            depth_stencil: descriptor.depth_stencil,
            color_blend: descriptor.color_blend,
            color_blend_attachments: targets.color_targets.iter().map(|target| target.blend).collect(),
            color_formats: targets.color_targets.iter().map(|target| target.format).collect(),
            depth_format: targets.depth_format,
            layout,
        };

        match self.device.create_graphics_pipeline(&info) {
            Ok(pipeline) => Ok(CachedPipeline { pipeline, layout, set_layouts }),
            Err(e) => {
                engine_error!(SOURCE, "Failed to create graphics pipeline for '{}': {}", descriptor.shader.name, e);
                self.device.destroy_pipeline_layout(layout);
                self.destroy_set_layouts(&set_layouts);
                Err(e)
            }
        }
    }

    /// Create one descriptor set layout per binding list (not cached)
    ///
    /// The caller owns the returned layouts. On failure nothing is leaked.
    pub fn create_descriptor_set_layouts(
        &self,
        descriptor: &GraphicsPipelineDescriptor,
    ) -> Result<Vec<DescriptorSetLayoutHandle>> {
        let mut layouts = Vec::with_capacity(descriptor.descriptor_set_layouts.len());
        for bindings in &descriptor.descriptor_set_layouts {
            match self.device.create_descriptor_set_layout(bindings) {
                Ok(layout) => layouts.push(layout),
                Err(e) => {
                    engine_error!(SOURCE, "Failed to create descriptor set layout: {}", e);
                    self.destroy_set_layouts(&layouts);
                    return Err(e);
                }
            }
        }
        Ok(layouts)
    }

    /// Create a pipeline layout and its set layouts (not cached)
    pub fn create_pipeline_layout(
        &self,
        descriptor: &GraphicsPipelineDescriptor,
    ) -> Result<(PipelineLayoutHandle, Vec<DescriptorSetLayoutHandle>)> {
        let set_layouts = self.create_descriptor_set_layouts(descriptor)?;
        match self.device.create_pipeline_layout(&set_layouts, &descriptor.push_constant_ranges) {
            Ok(layout) => Ok((layout, set_layouts)),
            Err(e) => {
                self.destroy_set_layouts(&set_layouts);
                Err(e)
            }
        }
    }

    fn destroy_set_layouts(&self, layouts: &[DescriptorSetLayoutHandle]) {
        for layout in layouts {
            self.device.destroy_descriptor_set_layout(*layout);
        }
    }

    pub fn pipeline_count(&self) -> usize {
        self.pipelines().len()
    }

    /// Destroy every cached pipeline and its layouts. The GPU must be idle.
    pub fn dispose(&self) {
        let drained: Vec<CachedPipeline> = self.pipelines().drain().map(|(_, cached)| cached).collect();
        for cached in drained {
            self.device.destroy_pipeline(cached.pipeline);
            self.device.destroy_pipeline_layout(cached.layout);
            self.destroy_set_layouts(&cached.set_layouts);
        }
    }
}

#[cfg(test)]
#[path = "pipeline_cache_tests.rs"]
mod tests;
