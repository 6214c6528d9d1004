/// Mock device, shader loader and presenter for unit tests (no GPU required)
///
/// Every call is recorded so tests can assert on creations, submissions and
/// recorded commands. Fences become signaled when a submission names them.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::device::graphics_device::*;
use crate::device::handles::*;
use crate::device::pipeline_state::*;
use crate::device::presenter::*;
use crate::device::shader_loader::ShaderLoader;
use crate::device::types::*;
use crate::error::{Error, Result};

// ============================================================================
// Recorded data
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum MockCommand {
    Begin(CommandBufferUsageFlags),
    End,
    BeginRendering(RenderingInfo),
    EndRendering,
    BindPipeline(PipelineHandle),
    SetViewport(Viewport),
    SetScissor(Rect2D),
    Draw { vertex_count: u32, instance_count: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct MockSubmission {
    pub queue: QueueType,
    pub command_buffers: Vec<CommandBufferHandle>,
    pub wait_semaphores: Vec<SemaphoreSubmitInfo>,
    pub signal_semaphores: Vec<SemaphoreSubmitInfo>,
    pub fence: Option<FenceHandle>,
}

#[derive(Debug, Default)]
pub struct MockState {
    next_handle: u64,

    pub command_pools: Vec<(CommandPoolHandle, u32, CommandPoolFlags)>,
    pub destroyed_command_pools: Vec<CommandPoolHandle>,
    /// Batch size of every allocation call, in call order
    pub allocation_batches: Vec<u32>,
    pub buffer_levels: HashMap<CommandBufferHandle, CommandBufferLevel>,
    /// (buffer, release_resources) of every reset
    pub resets: Vec<(CommandBufferHandle, bool)>,
    pub commands: Vec<(CommandBufferHandle, MockCommand)>,

    /// Fence handle -> signaled
    pub fences: HashMap<FenceHandle, bool>,
    pub destroyed_fences: Vec<FenceHandle>,
    pub fence_waits: Vec<Vec<FenceHandle>>,
    pub fence_resets: Vec<Vec<FenceHandle>>,

    pub semaphores: HashSet<SemaphoreHandle>,
    pub destroyed_semaphores: Vec<SemaphoreHandle>,

    pub shader_modules: HashMap<ShaderModuleHandle, usize>,
    pub destroyed_shader_modules: Vec<ShaderModuleHandle>,
    pub set_layouts: Vec<DescriptorSetLayoutHandle>,
    pub destroyed_set_layouts: Vec<DescriptorSetLayoutHandle>,
    pub pipeline_layouts: Vec<PipelineLayoutHandle>,
    pub destroyed_pipeline_layouts: Vec<PipelineLayoutHandle>,
    pub pipelines: Vec<(PipelineHandle, GraphicsPipelineCreateInfo)>,
    pub destroyed_pipelines: Vec<PipelineHandle>,

    pub submissions: Vec<MockSubmission>,
    pub wait_idle_calls: u32,

    // Failure injection
    pub fail_pipeline_creation: bool,
    pub fail_fence_creation: bool,
    pub fail_semaphore_creation: bool,
    /// Leave fences unsignaled on submit (simulates GPU still busy)
    pub hold_fences: bool,
}

impl MockState {
    fn next(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    /// Commands recorded into one command buffer, in order
    pub fn commands_for(&self, command_buffer: CommandBufferHandle) -> Vec<MockCommand> {
        self.commands
            .iter()
            .filter(|(cb, _)| *cb == command_buffer)
            .map(|(_, cmd)| cmd.clone())
            .collect()
    }

    pub fn allocated_buffer_count(&self) -> usize {
        self.buffer_levels.len()
    }

    pub fn live_fence_count(&self) -> usize {
        self.fences.len()
    }

    pub fn live_semaphore_count(&self) -> usize {
        self.semaphores.len()
    }

    pub fn live_pipeline_count(&self) -> usize {
        self.pipelines.len() - self.destroyed_pipelines.len()
    }
}

// ============================================================================
// Mock GraphicsDevice
// ============================================================================

pub struct MockGraphicsDevice {
    queue_families: QueueFamilyIndices,
    state: Mutex<MockState>,
}

impl MockGraphicsDevice {
    /// Device with graphics family 0, compute family 1 and present family 0
    pub fn new() -> Self {
        Self::with_queue_families(QueueFamilyIndices {
            graphics: Some(0),
            compute: Some(1),
            present: Some(0),
        })
    }

    pub fn with_queue_families(queue_families: QueueFamilyIndices) -> Self {
        Self {
            queue_families,
            state: Mutex::new(MockState::default()),
        }
    }

    pub fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    /// Mark a fence signaled as if the GPU finished
    pub fn signal_fence(&self, fence: FenceHandle) {
        self.state().fences.insert(fence, true);
    }

    pub fn is_fence_signaled(&self, fence: FenceHandle) -> bool {
        self.state().fences.get(&fence).copied().unwrap_or(false)
    }

    fn record(&self, command_buffer: CommandBufferHandle, command: MockCommand) {
        self.state().commands.push((command_buffer, command));
    }
}

impl GraphicsDevice for MockGraphicsDevice {
    fn queue_family_indices(&self) -> QueueFamilyIndices {
        self.queue_families
    }

    fn create_command_pool(&self, queue_family_index: u32, flags: CommandPoolFlags) -> Result<CommandPoolHandle> {
        let mut state = self.state();
        let pool = CommandPoolHandle(state.next());
        state.command_pools.push((pool, queue_family_index, flags));
        Ok(pool)
    }

    fn destroy_command_pool(&self, pool: CommandPoolHandle) {
        self.state().destroyed_command_pools.push(pool);
    }

    fn allocate_command_buffers(
        &self,
        _pool: CommandPoolHandle,
        level: CommandBufferLevel,
        count: u32,
    ) -> Result<Vec<CommandBufferHandle>> {
        let mut state = self.state();
        state.allocation_batches.push(count);
        let mut buffers = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let buffer = CommandBufferHandle(state.next());
            state.buffer_levels.insert(buffer, level);
            buffers.push(buffer);
        }
        Ok(buffers)
    }

    fn reset_command_buffer(&self, command_buffer: CommandBufferHandle, release_resources: bool) -> Result<()> {
        let mut state = self.state();
        state.resets.push((command_buffer, release_resources));
        state.commands.retain(|(cb, _)| *cb != command_buffer);
        Ok(())
    }

    fn begin_command_buffer(&self, command_buffer: CommandBufferHandle, usage: CommandBufferUsageFlags) -> Result<()> {
        // Begin implicitly resets a buffer from a RESET_COMMAND_BUFFER pool
        let mut state = self.state();
        state.commands.retain(|(cb, _)| *cb != command_buffer);
        state.commands.push((command_buffer, MockCommand::Begin(usage)));
        Ok(())
    }

    fn end_command_buffer(&self, command_buffer: CommandBufferHandle) -> Result<()> {
        self.record(command_buffer, MockCommand::End);
        Ok(())
    }

    fn create_fence(&self, signaled: bool) -> Result<FenceHandle> {
        let mut state = self.state();
        if state.fail_fence_creation {
            return Err(Error::BackendError("mock fence creation failure".to_string()));
        }
        let fence = FenceHandle(state.next());
        state.fences.insert(fence, signaled);
        Ok(fence)
    }

    fn destroy_fence(&self, fence: FenceHandle) {
        let mut state = self.state();
        state.fences.remove(&fence);
        state.destroyed_fences.push(fence);
    }

    fn wait_for_fences(&self, fences: &[FenceHandle], _timeout_ns: u64) -> Result<()> {
        let mut state = self.state();
        state.fence_waits.push(fences.to_vec());
        let all_signaled = fences
            .iter()
            .all(|fence| state.fences.get(fence).copied().unwrap_or(false));
        if all_signaled {
            Ok(())
        } else {
            Err(Error::Timeout("mock fence not signaled".to_string()))
        }
    }

    fn reset_fences(&self, fences: &[FenceHandle]) -> Result<()> {
        let mut state = self.state();
        for fence in fences {
            state.fences.insert(*fence, false);
        }
        state.fence_resets.push(fences.to_vec());
        Ok(())
    }

    fn create_semaphore(&self) -> Result<SemaphoreHandle> {
        let mut state = self.state();
        if state.fail_semaphore_creation {
            return Err(Error::BackendError("mock semaphore creation failure".to_string()));
        }
        let semaphore = SemaphoreHandle(state.next());
        state.semaphores.insert(semaphore);
        Ok(semaphore)
    }

    fn destroy_semaphore(&self, semaphore: SemaphoreHandle) {
        let mut state = self.state();
        state.semaphores.remove(&semaphore);
        state.destroyed_semaphores.push(semaphore);
    }

    fn create_shader_module(&self, code: &[u8]) -> Result<ShaderModuleHandle> {
        let mut state = self.state();
        let module = ShaderModuleHandle(state.next());
        state.shader_modules.insert(module, code.len());
        Ok(module)
    }

    fn destroy_shader_module(&self, module: ShaderModuleHandle) {
        self.state().destroyed_shader_modules.push(module);
    }

    fn create_descriptor_set_layout(&self, _bindings: &[DescriptorSetLayoutBinding]) -> Result<DescriptorSetLayoutHandle> {
        let mut state = self.state();
        let layout = DescriptorSetLayoutHandle(state.next());
        state.set_layouts.push(layout);
        Ok(layout)
    }

    fn destroy_descriptor_set_layout(&self, layout: DescriptorSetLayoutHandle) {
        self.state().destroyed_set_layouts.push(layout);
    }

    fn create_pipeline_layout(
        &self,
        _set_layouts: &[DescriptorSetLayoutHandle],
        _push_constant_ranges: &[PushConstantRange],
    ) -> Result<PipelineLayoutHandle> {
        let mut state = self.state();
        let layout = PipelineLayoutHandle(state.next());
        state.pipeline_layouts.push(layout);
        Ok(layout)
    }

    fn destroy_pipeline_layout(&self, layout: PipelineLayoutHandle) {
        self.state().destroyed_pipeline_layouts.push(layout);
    }

    fn create_graphics_pipeline(&self, info: &GraphicsPipelineCreateInfo) -> Result<PipelineHandle> {
        let mut state = self.state();
        if state.fail_pipeline_creation {
            return Err(Error::BackendError("mock pipeline creation failure".to_string()));
        }
        let pipeline = PipelineHandle(state.next());
        state.pipelines.push((pipeline, info.clone()));
        Ok(pipeline)
    }

    fn destroy_pipeline(&self, pipeline: PipelineHandle) {
        self.state().destroyed_pipelines.push(pipeline);
    }

    fn cmd_begin_rendering(&self, command_buffer: CommandBufferHandle, info: &RenderingInfo) {
        self.record(command_buffer, MockCommand::BeginRendering(info.clone()));
    }

    fn cmd_end_rendering(&self, command_buffer: CommandBufferHandle) {
        self.record(command_buffer, MockCommand::EndRendering);
    }

    fn cmd_bind_graphics_pipeline(&self, command_buffer: CommandBufferHandle, pipeline: PipelineHandle) {
        self.record(command_buffer, MockCommand::BindPipeline(pipeline));
    }

    fn cmd_set_viewport(&self, command_buffer: CommandBufferHandle, viewport: &Viewport) {
        self.record(command_buffer, MockCommand::SetViewport(*viewport));
    }

    fn cmd_set_scissor(&self, command_buffer: CommandBufferHandle, scissor: &Rect2D) {
        self.record(command_buffer, MockCommand::SetScissor(*scissor));
    }

    fn cmd_draw(
        &self,
        command_buffer: CommandBufferHandle,
        vertex_count: u32,
        instance_count: u32,
        _first_vertex: u32,
        _first_instance: u32,
    ) {
        self.record(command_buffer, MockCommand::Draw { vertex_count, instance_count });
    }

    fn queue_submit(&self, queue: QueueType, submit: &SubmitInfo<'_>, fence: Option<FenceHandle>) -> Result<()> {
        let mut state = self.state();
        if let Some(fence) = fence {
            let hold = state.hold_fences;
            state.fences.insert(fence, !hold);
        }
        state.submissions.push(MockSubmission {
            queue,
            command_buffers: submit.command_buffers.to_vec(),
            wait_semaphores: submit.wait_semaphores.to_vec(),
            signal_semaphores: submit.signal_semaphores.to_vec(),
            fence,
        });
        Ok(())
    }

    fn wait_idle(&self) -> Result<()> {
        self.state().wait_idle_calls += 1;
        Ok(())
    }
}

// ============================================================================
// Mock ShaderLoader
// ============================================================================

/// Serves any `.spv` path with 4 bytes of fake bytecode, except paths marked missing
#[derive(Default)]
pub struct MockShaderLoader {
    pub loaded: Mutex<Vec<PathBuf>>,
    pub missing: Vec<PathBuf>,
}

impl MockShaderLoader {
    pub fn loaded_paths(&self) -> Vec<PathBuf> {
        self.loaded.lock().unwrap().clone()
    }
}

impl ShaderLoader for MockShaderLoader {
    fn load(&self, path: &Path) -> Result<Vec<u8>> {
        if self.missing.iter().any(|missing| missing == path) {
            return Err(Error::ShaderLoadFailed(path.display().to_string()));
        }
        self.loaded.lock().unwrap().push(path.to_path_buf());
        Ok(vec![0x03, 0x02, 0x23, 0x07])
    }
}

// ============================================================================
// Mock Presenter
// ============================================================================

pub struct MockPresenter {
    pub info: SwapchainInfo,
    next_image: u32,
    /// Status returned by the next acquire (then reset to Optimal)
    pub acquire_status: SwapchainStatus,
    pub present_status: SwapchainStatus,
    pub acquired: Vec<(u32, SemaphoreHandle)>,
    pub presented: Vec<(u32, Vec<SemaphoreHandle>)>,
    pub transitions_recorded: Mutex<Vec<(CommandBufferHandle, u32)>>,
    /// Make `record_present_transition` fail
    pub fail_transition: bool,
}

impl MockPresenter {
    /// Swapchain of `image_count` 800x600 B8G8R8A8_SRGB images
    pub fn new(image_count: u32) -> Self {
        Self {
            info: SwapchainInfo {
                extent: Extent2D { width: 800, height: 600 },
                format: Format::B8G8R8A8_SRGB,
                image_views: (0..image_count).map(|i| ImageViewHandle(10_000 + i as u64)).collect(),
            },
            next_image: 0,
            acquire_status: SwapchainStatus::Optimal,
            present_status: SwapchainStatus::Optimal,
            acquired: Vec::new(),
            presented: Vec::new(),
            transitions_recorded: Mutex::new(Vec::new()),
            fail_transition: false,
        }
    }
}

impl Presenter for MockPresenter {
    fn swapchain_info(&self) -> SwapchainInfo {
        self.info.clone()
    }

    fn acquire_next_image(&mut self, signal: SemaphoreHandle) -> Result<AcquireResult> {
        let status = std::mem::replace(&mut self.acquire_status, SwapchainStatus::Optimal);
        let image_index = self.next_image;
        if status != SwapchainStatus::OutOfDate {
            self.acquired.push((image_index, signal));
            self.next_image = (self.next_image + 1) % self.info.image_count();
        }
        Ok(AcquireResult { image_index, status })
    }

    fn record_present_transition(&self, command_buffer: CommandBufferHandle, image_index: u32) -> Result<()> {
        if self.fail_transition {
            return Err(Error::BackendError("mock transition failure".to_string()));
        }
        self.transitions_recorded.lock().unwrap().push((command_buffer, image_index));
        Ok(())
    }

    fn present(&mut self, image_index: u32, wait: &[SemaphoreHandle]) -> Result<SwapchainStatus> {
        self.presented.push((image_index, wait.to_vec()));
        Ok(self.present_status)
    }
}
