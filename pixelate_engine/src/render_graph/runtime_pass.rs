//! Graphics passes bound to device objects

use crate::command_buffer_pool::PooledCommandBuffer;
use crate::device::{
    CommandBufferHandle, CommandBufferUsageFlags, Extent2D, GraphicsDevice, ImageLayout,
    ImageViewHandle, Rect2D, RenderingAttachment, RenderingInfo, Viewport,
};
use crate::{engine_err, engine_trace, engine_warn};
use crate::error::Result;
use crate::pipeline_cache::CachedPipeline;
use crate::render_graph::pass::{DrawContext, GraphicsPass, HostPass, PassFlags, ResourceRef, ResourceUsage};

const SOURCE: &str = "pixelate::RenderGraph";

/// Recording state of one pass in one frame-in-flight slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    Unrecorded,
    /// Recorded against this swapchain image (None when the pass does not write the swapchain)
    Recorded { swapchain_image: Option<u32> },
}

/// Per-slot command buffer and attachment set
pub(crate) struct PassSlot {
    pub(crate) command_buffer: Option<PooledCommandBuffer>,
    pub(crate) rendering: RenderingInfo,
    pub(crate) record_state: RecordState,
}

pub(crate) struct RuntimeGraphicsPass {
    pub(crate) pass: GraphicsPass,
    pub(crate) pipeline: CachedPipeline,
    pub(crate) viewport: Viewport,
    pub(crate) scissor: Rect2D,
    /// Color attachment positions patched with the acquired swapchain view
    pub(crate) swapchain_attachments: Vec<usize>,
    pub(crate) slots: Vec<PassSlot>,
}

pub(crate) enum RuntimePass {
    Graphics(RuntimeGraphicsPass),
    Host(HostPass),
}

impl RuntimePass {
    pub(crate) fn name(&self) -> &str {
        match self {
            RuntimePass::Graphics(runtime) => &runtime.pass.name,
            RuntimePass::Host(pass) => &pass.name,
        }
    }
}

fn attachment(usage: &ResourceUsage, layout: ImageLayout) -> RenderingAttachment {
    let image_view = match &usage.resource {
        ResourceRef::Image { view, .. } => *view,
        // Swapchain views are bound at record time
        ResourceRef::Swapchain | ResourceRef::Buffer { .. } => ImageViewHandle::NULL,
    };
    RenderingAttachment {
        image_view,
        layout,
        load_op: usage.load_op,
        store_op: usage.store_op,
        clear_value: usage.clear_value,
    }
}

/// Attachment set of a pass with swapchain views left unbound
pub(crate) fn rendering_info(pass: &GraphicsPass, extent: Extent2D) -> RenderingInfo {
    RenderingInfo {
        render_area: Rect2D::full(extent),
        color_attachments: pass
            .color_outputs()
            .map(|output| attachment(output, ImageLayout::ColorAttachment))
            .collect(),
        depth_attachment: pass
            .depth_output()
            .map(|output| attachment(output, ImageLayout::DepthStencilAttachment)),
    }
}

pub(crate) fn swapchain_attachments(pass: &GraphicsPass) -> Vec<usize> {
    pass.color_outputs()
        .enumerate()
        .filter(|(_, output)| output.is_swapchain())
        .map(|(i, _)| i)
        .collect()
}

impl RuntimeGraphicsPass {
    pub(crate) fn is_record_once(&self) -> bool {
        self.pass.flags.contains(PassFlags::RECORD_ONCE)
    }

    pub(crate) fn writes_swapchain(&self) -> bool {
        !self.swapchain_attachments.is_empty()
    }

    pub(crate) fn command_buffer(&self, slot: usize) -> Option<CommandBufferHandle> {
        self.slots
            .get(slot)
            .and_then(|slot| slot.command_buffer.as_ref())
            .map(PooledCommandBuffer::handle)
    }

    /// Whether the slot's command buffer must be recorded before submission
    pub(crate) fn needs_recording(&self, slot: usize, swapchain_image: u32) -> bool {
        if !self.is_record_once() {
            return true;
        }
        let bound = self.writes_swapchain().then_some(swapchain_image);
        self.slots[slot].record_state != RecordState::Recorded { swapchain_image: bound }
    }

    /// Extent changed: new viewport and render area, every slot re-recorded
    pub(crate) fn resize(&mut self, extent: Extent2D) {
        self.viewport = Viewport::full(extent);
        self.scissor = Rect2D::full(extent);
        for slot in &mut self.slots {
            slot.rendering.render_area = Rect2D::full(extent);
            slot.record_state = RecordState::Unrecorded;
        }
    }

    /// Record the slot's command buffer
    ///
    /// Begin, bind the swapchain view, begin rendering, set dynamic state and
    /// bind the pipeline, run the draw callback, then end.
    pub(crate) fn record(
        &mut self,
        device: &dyn GraphicsDevice,
        slot: usize,
        swapchain_image: u32,
        swapchain_view: ImageViewHandle,
    ) -> Result<CommandBufferHandle> {
        let usage = if self.is_record_once() {
            CommandBufferUsageFlags::empty()
        } else {
            CommandBufferUsageFlags::ONE_TIME_SUBMIT
        };
        let bound = self.writes_swapchain().then_some(swapchain_image);

        let Self { pass, pipeline, viewport, scissor, swapchain_attachments, slots } = self;
        let pass_slot = &mut slots[slot];
        let Some(command_buffer) = pass_slot.command_buffer.as_ref().map(PooledCommandBuffer::handle) else {
            return Err(engine_err!(SOURCE, "Pass '{}' has no command buffer for slot {}", pass.name, slot));
        };

        pass_slot.record_state = RecordState::Unrecorded;
        for &index in swapchain_attachments.iter() {
            pass_slot.rendering.color_attachments[index].image_view = swapchain_view;
        }

        device.begin_command_buffer(command_buffer, usage)?;
        device.cmd_begin_rendering(command_buffer, &pass_slot.rendering);
        device.cmd_set_viewport(command_buffer, viewport);
        device.cmd_set_scissor(command_buffer, scissor);
        device.cmd_bind_graphics_pipeline(command_buffer, pipeline.pipeline);

        let mut ctx = DrawContext {
            device,
            command_buffer,
            pipeline: pipeline.pipeline,
            layout: pipeline.layout,
            frame_index: slot as u32,
            swapchain_image_index: swapchain_image,
        };
        if let Err(e) = (pass.draw)(&mut ctx) {
            // Close the buffer so the next frame can begin it again
            device.cmd_end_rendering(command_buffer);
            if let Err(end) = device.end_command_buffer(command_buffer) {
                engine_warn!(SOURCE, "Failed to close '{}' slot {} after a draw error: {}", pass.name, slot, end);
            }
            return Err(e);
        }

        device.cmd_end_rendering(command_buffer);
        device.end_command_buffer(command_buffer)?;

        pass_slot.record_state = RecordState::Recorded { swapchain_image: bound };
        engine_trace!(SOURCE, "Recorded '{}' slot {} into {:?}", pass.name, slot, command_buffer);
        Ok(command_buffer)
    }
}
