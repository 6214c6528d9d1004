//! Compiled render graph
//!
//! Construction resolves every graphics pass to a pipeline from the cache and
//! one command buffer per frame-in-flight slot. Each frame,
//! [`RenderGraph::record_and_submit`] walks the passes in declared order and
//! submits each graphics pass separately:
//!
//! - the caller's wait semaphores go on the first submission only
//! - the last pass writing the swapchain signals the image's ready-to-present semaphore
//! - every submission signals its own fence in the slot's fence group
//!
//! No barriers are inserted and passes are never reordered.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use crate::command_buffer_pool::{CommandBufferDescriptor, CommandBufferPool};
use crate::device::{
    CommandBufferHandle, GraphicsDevice, ImageViewHandle, PerformanceProfile, PipelineStageFlags, QueueType, Rect2D,
    SemaphoreSubmitInfo, SubmitInfo, SwapchainInfo, Viewport,
};
use crate::error::Result;
use crate::fence_manager::{lock_group, FenceGroup, FenceGroupDescriptor, FenceIdentifier, FenceManager};
use crate::pipeline_cache::{CachedPipeline, PipelineCache};
use crate::render_context::RenderContext;
use crate::render_graph::pass::{GraphicsPass, HostContext, Pass, PassFlags, RenderGraphDescriptor, ResourceRef};
use crate::render_graph::runtime_pass::{
    rendering_info, swapchain_attachments, PassSlot, RecordState, RuntimeGraphicsPass, RuntimePass,
};
use crate::semaphore_manager::{submit_infos, Semaphore, SemaphoreDescriptor, SemaphoreIdentifier, SemaphoreManager};
use crate::{engine_bail_invalid, engine_debug, engine_err, engine_trace, engine_warn};

const SOURCE: &str = "pixelate::RenderGraph";

/// How far an in-progress frame got
#[derive(Default)]
struct SubmitProgress {
    submitted: u32,
    /// Set once the pass signaling ready-to-present was submitted
    ready_signaled: Option<Semaphore>,
}

/// What the caller waits on and presents with after a frame's submissions
pub struct FrameSubmission {
    /// One fence per graphics pass, for this frame-in-flight slot
    pub fence_group: Arc<Mutex<FenceGroup>>,
    /// Signaled by the last pass writing the swapchain (None if no pass does)
    pub ready_to_present: Option<Semaphore>,
}

pub struct RenderGraph {
    device: Arc<dyn GraphicsDevice>,
    command_buffers: Arc<CommandBufferPool>,
    fences: Arc<FenceManager>,
    semaphores: Arc<SemaphoreManager>,
    pipelines: Arc<PipelineCache>,
    max_frames_in_flight: u32,
    swapchain: SwapchainInfo,
    passes: Vec<RuntimePass>,
}

impl RenderGraph {
    /// Compile the passes of `descriptor` against the current swapchain
    ///
    /// # Errors
    ///
    /// `InvalidResource` for malformed passes (swapchain output without the
    /// `COLOR_OUTPUT_TO_SWAPCHAIN` flag, several depth outputs, duplicate
    /// names), plus any pipeline or command buffer creation error. On error,
    /// command buffers acquired so far are returned to the pool.
    pub fn new(context: &RenderContext, descriptor: RenderGraphDescriptor, swapchain: SwapchainInfo) -> Result<Self> {
        let mut graph = Self {
            device: context.device().clone(),
            command_buffers: context.command_buffers().clone(),
            fences: context.fences().clone(),
            semaphores: context.semaphores().clone(),
            pipelines: context.pipelines().clone(),
            max_frames_in_flight: context.max_frames_in_flight(),
            swapchain,
            passes: Vec::with_capacity(descriptor.passes.len()),
        };

        let mut names = HashSet::new();
        for pass in descriptor.passes {
            if !names.insert(pass.name().to_string()) {
                let name = pass.name().to_string();
                graph.dispose();
                engine_bail_invalid!(SOURCE, "Duplicate pass name '{}'", name);
            }

            let runtime = match pass {
                Pass::Graphics(pass) => graph.compile(pass).map(RuntimePass::Graphics),
                Pass::Host(pass) => Ok(RuntimePass::Host(pass)),
            };
            match runtime {
                Ok(runtime) => graph.passes.push(runtime),
                Err(e) => {
                    graph.dispose();
                    return Err(e);
                }
            }
        }

        engine_debug!(SOURCE, "Compiled render graph: {} passes ({} graphics), {} frames in flight",
            graph.pass_count(), graph.graphics_pass_count(), graph.max_frames_in_flight);
        Ok(graph)
    }

    fn compile(&self, pass: GraphicsPass) -> Result<RuntimeGraphicsPass> {
        validate(&pass)?;

        let targets = pass.render_target_layout(self.swapchain.format);
        let pipeline = self.pipelines.get_graphics_pipeline(&pass.pipeline, &targets)?;

        let profile = if pass.flags.contains(PassFlags::RECORD_ONCE) {
            PerformanceProfile::PersistentResources
        } else {
            PerformanceProfile::Default
        };
        let descriptor = CommandBufferDescriptor::with_profile(profile);
        let rendering = rendering_info(&pass, self.swapchain.extent);

        let mut slots = Vec::with_capacity(self.max_frames_in_flight as usize);
        for _ in 0..self.max_frames_in_flight {
            match self.command_buffers.get(&descriptor) {
                Ok(command_buffer) => slots.push(PassSlot {
                    command_buffer: Some(command_buffer),
                    rendering: rendering.clone(),
                    record_state: RecordState::Unrecorded,
                }),
                Err(e) => {
                    self.release_slots(&mut slots);
                    return Err(e);
                }
            }
        }

        engine_debug!(SOURCE, "Pass '{}' bound to pipeline {:?}", pass.name, pipeline.pipeline);
        Ok(RuntimeGraphicsPass {
            swapchain_attachments: swapchain_attachments(&pass),
            viewport: Viewport::full(self.swapchain.extent),
            scissor: Rect2D::full(self.swapchain.extent),
            pass,
            pipeline,
            slots,
        })
    }

    fn release_slots(&self, slots: &mut [PassSlot]) {
        for slot in slots {
            if let Some(command_buffer) = slot.command_buffer.take() {
                if let Err(e) = self.command_buffers.return_buffer(command_buffer) {
                    engine_warn!(SOURCE, "Failed to return command buffer: {}", e);
                }
            }
        }
    }

    /// Fence group guarding the submissions of one frame-in-flight slot
    pub fn fence_group_descriptor(&self, frame_index: u32) -> FenceGroupDescriptor {
        FenceGroupDescriptor {
            identifier: FenceIdentifier::RenderGraphQueueSubmit,
            slot: frame_index,
            size: self.graphics_pass_count() as u32,
            signaled: false,
        }
    }

    pub fn fence_group(&self, frame_index: u32) -> Result<Arc<Mutex<FenceGroup>>> {
        self.fences.get_fence_group(self.fence_group_descriptor(frame_index))
    }

    /// Record (where needed) and submit every pass for one frame
    ///
    /// Only the `frame_index` slot of each pass is touched. RecordOnce passes
    /// are re-recorded only when the slot was never recorded or was recorded
    /// against another swapchain image.
    ///
    /// The slot's fence group is locked only around each submission, so draw
    /// and host callbacks may register fenced callbacks on it.
    ///
    /// # Errors
    ///
    /// `InvalidResource` if either index is out of range or the slot's previous
    /// submissions have not been waited on. Draw and host callback errors
    /// abort the frame and are returned as is. On any error the semaphores
    /// the frame left signaled (`wait_semaphores` if nothing was submitted,
    /// the ready-to-present semaphore if its pass was) are consumed by an
    /// empty submission, fenced in the slot's group when a fence is free.
    pub fn record_and_submit(
        &mut self,
        frame_index: u32,
        swapchain_image_index: u32,
        wait_semaphores: &[Semaphore],
    ) -> Result<FrameSubmission> {
        let prepared = self
            .swapchain_view(frame_index, swapchain_image_index)
            .and_then(|view| Ok((view, self.fence_group(frame_index)?)));
        let (swapchain_view, fence_group) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => {
                self.release_semaphores(None, wait_semaphores, &SubmitProgress::default());
                return Err(e);
            }
        };

        let mut progress = SubmitProgress::default();
        match self.submit_passes(
            frame_index,
            swapchain_image_index,
            swapchain_view,
            wait_semaphores,
            &fence_group,
            &mut progress,
        ) {
            Ok(ready_to_present) => {
                engine_trace!(SOURCE, "Frame slot {} submitted {} passes (image {})",
                    frame_index, progress.submitted, swapchain_image_index);
                Ok(FrameSubmission { fence_group, ready_to_present })
            }
            Err(e) => {
                engine_warn!(SOURCE, "Frame slot {} aborted after {} submissions: {}",
                    frame_index, progress.submitted, e);
                self.release_semaphores(Some(&*fence_group), wait_semaphores, &progress);
                Err(e)
            }
        }
    }

    fn swapchain_view(&self, frame_index: u32, swapchain_image_index: u32) -> Result<ImageViewHandle> {
        if frame_index >= self.max_frames_in_flight {
            engine_bail_invalid!(SOURCE, "Frame index {} out of range ({} frames in flight)",
                frame_index, self.max_frames_in_flight);
        }
        match self.swapchain.image_views.get(swapchain_image_index as usize) {
            Some(&view) => Ok(view),
            None => {
                engine_bail_invalid!(SOURCE, "Swapchain image index {} out of range ({} images)",
                    swapchain_image_index, self.swapchain.image_count());
            }
        }
    }

    fn submit_passes(
        &mut self,
        frame_index: u32,
        swapchain_image_index: u32,
        swapchain_view: ImageViewHandle,
        wait_semaphores: &[Semaphore],
        fence_group: &Mutex<FenceGroup>,
        progress: &mut SubmitProgress,
    ) -> Result<Option<Semaphore>> {
        if lock_group(fence_group).any_pending() {
            engine_bail_invalid!(SOURCE, "Frame slot {} is still in flight", frame_index);
        }

        let last_swapchain_pass = self.passes.iter().rposition(|pass| {
            matches!(pass, RuntimePass::Graphics(runtime) if runtime.writes_swapchain())
        });
        let ready_to_present = match last_swapchain_pass {
            Some(_) => Some(self.semaphores.get_semaphore(
                PipelineStageFlags::ALL_GRAPHICS,
                SemaphoreDescriptor {
                    identifier: SemaphoreIdentifier::SwapchainImageReadyToPresent,
                    index: swapchain_image_index,
                },
            )?),
            None => None,
        };

        let waits = submit_infos(wait_semaphores);
        let slot = frame_index as usize;
        let host_context = HostContext { frame_index, swapchain_image_index };

        for (index, pass) in self.passes.iter_mut().enumerate() {
            let runtime = match pass {
                RuntimePass::Host(host) => {
                    (host.callback)(&host_context)?;
                    continue;
                }
                RuntimePass::Graphics(runtime) => runtime,
            };

            let command_buffer = if runtime.needs_recording(slot, swapchain_image_index) {
                runtime.record(self.device.as_ref(), slot, swapchain_image_index, swapchain_view)?
            } else {
                engine_trace!(SOURCE, "Resubmitting '{}' slot {}", runtime.pass.name, slot);
                resubmit_handle(runtime, slot)?
            };

            let signals_ready = last_swapchain_pass == Some(index);
            let signals: Vec<SemaphoreSubmitInfo> = match ready_to_present {
                Some(semaphore) if signals_ready => vec![semaphore.submit_info()],
                _ => Vec::new(),
            };
            let command_buffers = [command_buffer];
            let submit = SubmitInfo {
                command_buffers: &command_buffers,
                wait_semaphores: if progress.submitted == 0 { waits.as_slice() } else { &[] },
                signal_semaphores: &signals,
            };

            let mut group = lock_group(fence_group);
            let fence = group.fence(progress.submitted)?;
            self.device.queue_submit(QueueType::Graphics, &submit, Some(fence))?;
            group.mark_submitted(progress.submitted)?;
            drop(group);

            progress.submitted += 1;
            if signals_ready {
                progress.ready_signaled = ready_to_present;
            }
        }

        Ok(ready_to_present)
    }

    /// Consume the semaphores an aborted frame left signaled
    ///
    /// An acquire semaphore may only be signaled again once this wait has
    /// completed, hence the fence whenever the group has one free.
    fn release_semaphores(
        &self,
        fence_group: Option<&Mutex<FenceGroup>>,
        wait_semaphores: &[Semaphore],
        progress: &SubmitProgress,
    ) {
        let mut dangling = Vec::new();
        if progress.submitted == 0 {
            dangling.extend(submit_infos(wait_semaphores));
        }
        if let Some(ready) = progress.ready_signaled {
            dangling.push(ready.submit_info());
        }
        if dangling.is_empty() {
            return;
        }

        let fence_index = progress.submitted;
        let mut group = fence_group.map(lock_group);
        let fence = group
            .as_ref()
            .filter(|group| (fence_index as usize) < group.len() && !group.is_pending(fence_index))
            .and_then(|group| group.fence(fence_index).ok());

        let submit = SubmitInfo {
            command_buffers: &[],
            wait_semaphores: &dangling,
            signal_semaphores: &[],
        };
        if let Err(e) = self.device.queue_submit(QueueType::Graphics, &submit, fence) {
            engine_warn!(SOURCE, "Failed to release {} semaphores of an aborted frame: {}", dangling.len(), e);
            return;
        }
        if let (Some(group), Some(_)) = (group.as_mut(), fence) {
            group.mark_submitted(fence_index).ok();
        }
        engine_debug!(SOURCE, "Released {} semaphores of an aborted frame", dangling.len());
    }

    /// Adopt a recreated swapchain
    ///
    /// Viewports and render areas follow the new extent and every slot is
    /// re-recorded. A format change fetches pipelines for the new format.
    /// The device must be idle.
    pub fn update_swapchain(&mut self, swapchain: SwapchainInfo) -> Result<()> {
        let format_changed = swapchain.format != self.swapchain.format;
        for pass in &mut self.passes {
            let RuntimePass::Graphics(runtime) = pass else {
                continue;
            };
            if format_changed {
                let targets = runtime.pass.render_target_layout(swapchain.format);
                runtime.pipeline = self.pipelines.get_graphics_pipeline(&runtime.pass.pipeline, &targets)?;
            }
            runtime.resize(swapchain.extent);
        }

        engine_debug!(SOURCE, "Swapchain updated: {}x{} {:?}, {} images",
            swapchain.extent.width, swapchain.extent.height, swapchain.format, swapchain.image_count());
        self.swapchain = swapchain;
        Ok(())
    }

    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    pub fn graphics_pass_count(&self) -> usize {
        self.passes.iter().filter(|pass| matches!(pass, RuntimePass::Graphics(_))).count()
    }

    pub fn max_frames_in_flight(&self) -> u32 {
        self.max_frames_in_flight
    }

    pub fn swapchain(&self) -> &SwapchainInfo {
        &self.swapchain
    }

    /// Whether any graphics pass renders into the swapchain
    pub fn presents(&self) -> bool {
        self.passes
            .iter()
            .any(|pass| matches!(pass, RuntimePass::Graphics(runtime) if runtime.writes_swapchain()))
    }

    fn graphics_pass(&self, name: &str) -> Option<&RuntimeGraphicsPass> {
        self.passes.iter().find_map(|pass| match pass {
            RuntimePass::Graphics(runtime) if runtime.pass.name == name => Some(runtime),
            _ => None,
        })
    }

    pub fn pass_names(&self) -> Vec<&str> {
        self.passes.iter().map(RuntimePass::name).collect()
    }

    pub fn pipeline(&self, pass_name: &str) -> Option<&CachedPipeline> {
        self.graphics_pass(pass_name).map(|runtime| &runtime.pipeline)
    }

    pub fn command_buffer(&self, pass_name: &str, frame_index: u32) -> Option<CommandBufferHandle> {
        self.graphics_pass(pass_name)?.command_buffer(frame_index as usize)
    }

    pub fn record_state(&self, pass_name: &str, frame_index: u32) -> Option<RecordState> {
        self.graphics_pass(pass_name)?
            .slots
            .get(frame_index as usize)
            .map(|slot| slot.record_state)
    }

    /// Return every command buffer to the pool and drop the passes
    ///
    /// The slots' submissions must have completed.
    pub fn dispose(&mut self) {
        let passes = std::mem::take(&mut self.passes);
        for pass in passes {
            if let RuntimePass::Graphics(mut runtime) = pass {
                self.release_slots(&mut runtime.slots);
            }
        }
    }
}

fn resubmit_handle(runtime: &RuntimeGraphicsPass, slot: usize) -> Result<CommandBufferHandle> {
    runtime.command_buffer(slot).ok_or_else(|| {
        engine_err!(SOURCE, "Pass '{}' has no command buffer for slot {}", runtime.pass.name, slot)
    })
}

fn validate(pass: &GraphicsPass) -> Result<()> {
    let to_swapchain = pass.flags.contains(PassFlags::COLOR_OUTPUT_TO_SWAPCHAIN);

    for output in &pass.outputs {
        let attachment = output.is_color_attachment() || output.is_depth_attachment();
        if output.is_color_attachment() && output.is_depth_attachment() {
            engine_bail_invalid!(SOURCE, "Pass '{}' declares an output as both color and depth", pass.name);
        }
        if attachment && matches!(output.resource, ResourceRef::Buffer { .. }) {
            engine_bail_invalid!(SOURCE, "Pass '{}' uses a buffer as an attachment", pass.name);
        }
        if output.is_swapchain() {
            if !to_swapchain {
                engine_bail_invalid!(SOURCE,
                    "Pass '{}' writes the swapchain without COLOR_OUTPUT_TO_SWAPCHAIN", pass.name);
            }
            if !output.is_color_attachment() {
                engine_bail_invalid!(SOURCE, "Pass '{}' uses the swapchain as a non-color output", pass.name);
            }
        }
    }

    if to_swapchain && !pass.writes_swapchain() {
        engine_bail_invalid!(SOURCE, "Pass '{}' is flagged COLOR_OUTPUT_TO_SWAPCHAIN but has no swapchain output",
            pass.name);
    }

    let depth_outputs = pass.outputs.iter().filter(|output| output.is_depth_attachment()).count();
    if depth_outputs > 1 {
        engine_bail_invalid!(SOURCE, "Pass '{}' has {} depth outputs (at most 1)", pass.name, depth_outputs);
    }
    if let Some(ResourceRef::Image { format, .. }) = pass.depth_output().map(|output| &output.resource) {
        if !format.is_depth() {
            engine_bail_invalid!(SOURCE, "Pass '{}' depth output has color format {:?}", pass.name, format);
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "render_graph_tests.rs"]
mod tests;
