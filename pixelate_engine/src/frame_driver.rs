//! Frame loop: wait → acquire → record/submit → transition → present
//!
//! The driver owns the frame-in-flight counter. A slot's resources are only
//! reused after the fences of its previous submissions have been waited on.
//! Swapchain recreation is left to the caller: an out-of-date swapchain is
//! reported through [`FrameStatus`]. The slot advances only once the frame was
//! submitted, so an out-of-date acquire or a failed frame retries the same slot.

use std::sync::Mutex;

use crate::command_buffer_pool::{CommandBufferDescriptor, PooledCommandBuffer};
use crate::device::{
    CommandBufferHandle, CommandBufferUsageFlags, PipelineStageFlags, Presenter, QueueType, SubmitInfo,
    SwapchainStatus,
};
use crate::error::Result;
use crate::fence_manager::{lock_group, wait_submitted, FenceGroup, FenceGroupDescriptor, FenceIdentifier};
use crate::render_context::RenderContext;
use crate::render_graph::RenderGraph;
use crate::semaphore_manager::{Semaphore, SemaphoreDescriptor, SemaphoreIdentifier};
use crate::{engine_bail_invalid, engine_debug, engine_trace, engine_warn};

const SOURCE: &str = "pixelate::FrameDriver";

/// Outcome of one [`FrameDriver::render_frame`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    Presented,
    /// Presented, but the swapchain no longer matches the surface exactly
    Suboptimal,
    /// The swapchain must be recreated (nothing was submitted if acquisition failed)
    SwapchainOutOfDate,
}

pub struct FrameDriver {
    frame_index: u32,
    max_frames_in_flight: u32,
    wait_timeout_ns: u64,
    /// Present-layout transition buffers, indexed by swapchain image
    transitions: Vec<Option<PooledCommandBuffer>>,
    frames_submitted: u64,
}

impl FrameDriver {
    pub fn new(context: &RenderContext) -> Self {
        Self {
            frame_index: 0,
            max_frames_in_flight: context.max_frames_in_flight(),
            wait_timeout_ns: context.settings().fence_wait_timeout_ns,
            transitions: Vec::new(),
            frames_submitted: 0,
        }
    }

    /// Slot the next frame will use
    pub fn frame_index(&self) -> u32 {
        self.frame_index
    }

    pub fn frames_submitted(&self) -> u64 {
        self.frames_submitted
    }

    fn transition_fence_descriptor(slot: u32) -> FenceGroupDescriptor {
        FenceGroupDescriptor {
            identifier: FenceIdentifier::SwapchainLayoutTransition,
            slot,
            size: 1,
            signaled: false,
        }
    }

    /// Render and present one frame
    ///
    /// # Errors
    ///
    /// `InvalidResource` if no pass of `graph` writes the swapchain, `Timeout`
    /// if the slot's previous frame does not finish within the configured
    /// timeout, and any acquisition, recording or submission error.
    pub fn render_frame(
        &mut self,
        context: &RenderContext,
        graph: &mut RenderGraph,
        presenter: &mut dyn Presenter,
    ) -> Result<FrameStatus> {
        if !graph.presents() {
            engine_bail_invalid!(SOURCE, "Render graph has no pass writing the swapchain");
        }
        let slot = self.frame_index;

        let graph_group = graph.fence_group(slot)?;
        wait_submitted(&graph_group, self.wait_timeout_ns)?;
        let transition_group = context.fences().get_fence_group(Self::transition_fence_descriptor(slot))?;
        wait_submitted(&transition_group, self.wait_timeout_ns)?;

        let acquired = context.semaphores().get_semaphore(
            PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            SemaphoreDescriptor { identifier: SemaphoreIdentifier::SwapchainImageAcquired, index: slot },
        )?;
        let acquire = presenter.acquire_next_image(acquired.handle)?;
        match acquire.status {
            SwapchainStatus::OutOfDate => {
                engine_warn!(SOURCE, "Swapchain out of date on acquire (slot {})", slot);
                return Ok(FrameStatus::SwapchainOutOfDate);
            }
            SwapchainStatus::Suboptimal => {
                engine_warn!(SOURCE, "Swapchain suboptimal on acquire (image {})", acquire.image_index);
            }
            SwapchainStatus::Optimal => {}
        }
        let image_index = acquire.image_index;

        // On error the graph has already consumed the acquire semaphore
        let submission = graph.record_and_submit(slot, image_index, &[acquired])?;
        let Some(ready) = submission.ready_to_present else {
            engine_bail_invalid!(SOURCE, "Frame {} produced no ready-to-present semaphore", slot);
        };

        let to_present = match self.submit_transition(context, presenter, &transition_group, image_index, ready) {
            Ok(to_present) => to_present,
            Err(e) => {
                engine_warn!(SOURCE, "Frame slot {} aborted after submission: {}", slot, e);
                release_semaphore(context, ready);
                return Err(e);
            }
        };

        let present_status = presenter.present(image_index, &[to_present.handle])?;
        self.frame_index = (self.frame_index + 1) % self.max_frames_in_flight;
        self.frames_submitted += 1;
        engine_trace!(SOURCE, "Presented image {} from slot {}", image_index, slot);

        Ok(match (acquire.status, present_status) {
            (_, SwapchainStatus::OutOfDate) => {
                engine_warn!(SOURCE, "Swapchain out of date on present (image {})", image_index);
                FrameStatus::SwapchainOutOfDate
            }
            (SwapchainStatus::Suboptimal, _) | (_, SwapchainStatus::Suboptimal) => {
                if present_status == SwapchainStatus::Suboptimal {
                    engine_warn!(SOURCE, "Swapchain suboptimal on present (image {})", image_index);
                }
                FrameStatus::Suboptimal
            }
            _ => FrameStatus::Presented,
        })
    }

    /// Submit the present-layout transition of `image_index` after `ready`
    fn submit_transition(
        &mut self,
        context: &RenderContext,
        presenter: &dyn Presenter,
        transition_group: &Mutex<FenceGroup>,
        image_index: u32,
        ready: Semaphore,
    ) -> Result<Semaphore> {
        let transition = self.transition_buffer(context, presenter, image_index)?;
        let to_present = context.semaphores().get_semaphore(
            PipelineStageFlags::ALL_GRAPHICS,
            SemaphoreDescriptor { identifier: SemaphoreIdentifier::SwapchainImageTransitionToPresent, index: image_index },
        )?;

        let mut group = lock_group(transition_group);
        let command_buffers = [transition];
        let waits = [ready.submit_info()];
        let signals = [to_present.submit_info()];
        let submit = SubmitInfo {
            command_buffers: &command_buffers,
            wait_semaphores: &waits,
            signal_semaphores: &signals,
        };
        context.device().queue_submit(QueueType::Graphics, &submit, Some(group.fence(0)?))?;
        group.mark_submitted(0)?;
        Ok(to_present)
    }

    /// Command buffer moving `image_index` to the present layout, recorded on first use
    fn transition_buffer(
        &mut self,
        context: &RenderContext,
        presenter: &dyn Presenter,
        image_index: u32,
    ) -> Result<CommandBufferHandle> {
        let index = image_index as usize;
        if index >= self.transitions.len() {
            self.transitions.resize_with(index + 1, || None);
        }
        if let Some(buffer) = &self.transitions[index] {
            return Ok(buffer.handle());
        }

        let pool = context.command_buffers();
        let buffer = pool.get(&CommandBufferDescriptor::default())?;
        let handle = buffer.handle();
        let recorded = context
            .device()
            .begin_command_buffer(handle, CommandBufferUsageFlags::SIMULTANEOUS_USE)
            .and_then(|_| presenter.record_present_transition(handle, image_index))
            .and_then(|_| context.device().end_command_buffer(handle));
        if let Err(e) = recorded {
            if let Err(returned) = pool.return_buffer(buffer) {
                engine_warn!(SOURCE, "Failed to return transition buffer: {}", returned);
            }
            return Err(e);
        }

        engine_debug!(SOURCE, "Recorded present transition for image {} into {:?}", image_index, handle);
        self.transitions[index] = Some(buffer);
        Ok(handle)
    }

    /// Drop the transition buffers of a replaced swapchain. The device must be idle.
    pub fn on_swapchain_recreated(&mut self, context: &RenderContext) {
        self.release_transitions(context);
    }

    pub fn dispose(&mut self, context: &RenderContext) {
        self.release_transitions(context);
    }

    fn release_transitions(&mut self, context: &RenderContext) {
        for buffer in self.transitions.drain(..).flatten() {
            if let Err(e) = context.command_buffers().return_buffer(buffer) {
                engine_warn!(SOURCE, "Failed to return transition buffer: {}", e);
            }
        }
    }
}

/// Consume a semaphore an aborted frame left signaled
///
/// Its next signal operation would otherwise be invalid.
fn release_semaphore(context: &RenderContext, semaphore: Semaphore) {
    let waits = [semaphore.submit_info()];
    let submit = SubmitInfo {
        command_buffers: &[],
        wait_semaphores: &waits,
        signal_semaphores: &[],
    };
    if let Err(e) = context.device().queue_submit(QueueType::Graphics, &submit, None) {
        engine_warn!(SOURCE, "Failed to release {:?} after an aborted frame: {}", semaphore.handle, e);
    }
}

#[cfg(test)]
#[path = "frame_driver_tests.rs"]
mod tests;
