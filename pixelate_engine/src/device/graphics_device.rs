/// GraphicsDevice trait - the engine's only route to the GPU
///
/// Backends implement this over an already created logical device. Device
/// selection, instance and swapchain creation happen before the engine sees it.

use crate::device::handles::*;
use crate::device::pipeline_state::*;
use crate::device::types::*;
use crate::error::Result;

/// One shader stage of a pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderStage {
    /// Single stage bit
    pub stage: ShaderStageFlags,
    pub module: ShaderModuleHandle,
    pub entry_point: String,
}

/// Everything needed to compile one graphics pipeline for dynamic rendering
///
/// Viewport and scissor are always dynamic state.
#[derive(Debug, Clone)]
pub struct GraphicsPipelineCreateInfo {
    pub stages: Vec<ShaderStage>,
    pub vertex_layout: VertexLayout,
    pub input_assembly: InputAssemblyState,
    pub rasterization: RasterizationState,
    pub multisample: MultisampleState,
    pub depth_stencil: DepthStencilState,
    pub color_blend: ColorBlendState,
    /// One entry per color attachment, in attachment order
    pub color_blend_attachments: Vec<ColorBlendAttachment>,
    /// One entry per color attachment, in attachment order
    pub color_formats: Vec<Format>,
    pub depth_format: Option<Format>,
    pub layout: PipelineLayoutHandle,
}

/// Queue family indices supplied by the bootstrap layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueFamilyIndices {
    pub graphics: Option<u32>,
    pub compute: Option<u32>,
    pub present: Option<u32>,
}

impl QueueFamilyIndices {
    pub fn for_queue(&self, queue: QueueType) -> Option<u32> {
        match queue {
            QueueType::Graphics => self.graphics,
            QueueType::Compute => self.compute,
        }
    }
}

/// Logical device abstraction
///
/// All methods take `&self`; implementations synchronize internally where the
/// underlying API requires it (queue access).
pub trait GraphicsDevice: Send + Sync {
    fn queue_family_indices(&self) -> QueueFamilyIndices;

    // ===== COMMAND POOLS / BUFFERS =====

    fn create_command_pool(&self, queue_family_index: u32, flags: CommandPoolFlags) -> Result<CommandPoolHandle>;

    /// Destroys the pool and frees every buffer allocated from it
    fn destroy_command_pool(&self, pool: CommandPoolHandle);

    fn allocate_command_buffers(
        &self,
        pool: CommandPoolHandle,
        level: CommandBufferLevel,
        count: u32,
    ) -> Result<Vec<CommandBufferHandle>>;

    /// Reset a single command buffer
    ///
    /// # Arguments
    ///
    /// * `release_resources` - Return the buffer's memory to the pool
    fn reset_command_buffer(&self, command_buffer: CommandBufferHandle, release_resources: bool) -> Result<()>;

    fn begin_command_buffer(&self, command_buffer: CommandBufferHandle, usage: CommandBufferUsageFlags) -> Result<()>;

    fn end_command_buffer(&self, command_buffer: CommandBufferHandle) -> Result<()>;

    // ===== FENCES =====

    fn create_fence(&self, signaled: bool) -> Result<FenceHandle>;

    fn destroy_fence(&self, fence: FenceHandle);

    /// Block until every fence is signaled
    ///
    /// # Errors
    ///
    /// `Error::Timeout` when `timeout_ns` elapses first.
    fn wait_for_fences(&self, fences: &[FenceHandle], timeout_ns: u64) -> Result<()>;

    fn reset_fences(&self, fences: &[FenceHandle]) -> Result<()>;

    // ===== SEMAPHORES =====

    fn create_semaphore(&self) -> Result<SemaphoreHandle>;

    fn destroy_semaphore(&self, semaphore: SemaphoreHandle);

    // ===== PIPELINES =====

    /// Create a shader module from SPIR-V bytes
    fn create_shader_module(&self, code: &[u8]) -> Result<ShaderModuleHandle>;

    fn destroy_shader_module(&self, module: ShaderModuleHandle);

    fn create_descriptor_set_layout(&self, bindings: &[DescriptorSetLayoutBinding]) -> Result<DescriptorSetLayoutHandle>;

    fn destroy_descriptor_set_layout(&self, layout: DescriptorSetLayoutHandle);

    fn create_pipeline_layout(
        &self,
        set_layouts: &[DescriptorSetLayoutHandle],
        push_constant_ranges: &[PushConstantRange],
    ) -> Result<PipelineLayoutHandle>;

    fn destroy_pipeline_layout(&self, layout: PipelineLayoutHandle);

    fn create_graphics_pipeline(&self, info: &GraphicsPipelineCreateInfo) -> Result<PipelineHandle>;

    fn destroy_pipeline(&self, pipeline: PipelineHandle);

    // ===== RECORDING =====

    fn cmd_begin_rendering(&self, command_buffer: CommandBufferHandle, info: &RenderingInfo);

    fn cmd_end_rendering(&self, command_buffer: CommandBufferHandle);

    fn cmd_bind_graphics_pipeline(&self, command_buffer: CommandBufferHandle, pipeline: PipelineHandle);

    fn cmd_set_viewport(&self, command_buffer: CommandBufferHandle, viewport: &Viewport);

    fn cmd_set_scissor(&self, command_buffer: CommandBufferHandle, scissor: &Rect2D);

    fn cmd_draw(
        &self,
        command_buffer: CommandBufferHandle,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    );

    // ===== SUBMISSION =====

    /// Submit to the queue of the given type, signaling `fence` on completion
    fn queue_submit(&self, queue: QueueType, submit: &SubmitInfo<'_>, fence: Option<FenceHandle>) -> Result<()>;

    fn wait_idle(&self) -> Result<()>;
}
