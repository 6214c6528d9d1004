//! Unit tests for the render graph (pass.rs, runtime_pass.rs, render_graph.rs)

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use crate::command_buffer_pool::CommandBufferDescriptor;
use crate::device::mock_graphics_device::{MockCommand, MockGraphicsDevice, MockPresenter, MockShaderLoader};
use crate::device::*;
use crate::error::Error;
use crate::fence_manager::{lock_group, wait_submitted, FenceGroupDescriptor, FenceIdentifier, FenceIndex};
use crate::pipeline_cache::{GraphicsPipelineDescriptor, ShaderRef};
use crate::render_context::RenderContext;
use crate::render_graph::*;
use crate::semaphore_manager::{Semaphore, SemaphoreDescriptor, SemaphoreIdentifier};
use crate::settings::RenderSettings;

// ============================================================================
// Helpers
// ============================================================================

fn setup() -> (Arc<MockGraphicsDevice>, RenderContext) {
    let device = Arc::new(MockGraphicsDevice::new());
    let ctx = RenderContext::new(
        device.clone() as Arc<dyn GraphicsDevice>,
        Arc::new(MockShaderLoader::default()),
        RenderSettings::default(),
    )
    .unwrap();
    (device, ctx)
}

fn swapchain(image_count: u32) -> SwapchainInfo {
    MockPresenter::new(image_count).info
}

fn triangle_pipeline() -> GraphicsPipelineDescriptor {
    GraphicsPipelineDescriptor::new(ShaderRef::new("basic", "triangle"))
}

/// Swapchain pass drawing 3 vertices, counting its recordings
fn counted_pass(name: &str, flags: PassFlags, recordings: Arc<AtomicU32>) -> GraphicsPass {
    GraphicsPass::new(name, triangle_pipeline(), move |ctx| {
        recordings.fetch_add(1, Ordering::SeqCst);
        ctx.draw(3, 1);
        Ok(())
    })
    .with_flags(flags | PassFlags::COLOR_OUTPUT_TO_SWAPCHAIN)
    .with_output(ResourceUsage::swapchain_color())
}

fn triangle_pass(name: &str) -> GraphicsPass {
    counted_pass(name, PassFlags::RECORD_ONCE, Arc::new(AtomicU32::new(0)))
}

fn offscreen_pass(name: &str) -> GraphicsPass {
    GraphicsPass::new(name, GraphicsPipelineDescriptor::new(ShaderRef::new("basic", "offscreen")), |ctx| {
        ctx.draw(6, 1);
        Ok(())
    })
    .with_output(ResourceUsage::color_attachment(ImageViewHandle(500), Format::R16G16B16A16_SFLOAT))
}

fn acquired_semaphore(ctx: &RenderContext, slot: u32) -> Semaphore {
    ctx.semaphores()
        .get_semaphore(
            PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            SemaphoreDescriptor { identifier: SemaphoreIdentifier::SwapchainImageAcquired, index: slot },
        )
        .unwrap()
}

fn finish(submission: &FrameSubmission) {
    lock_group(&submission.fence_group).wait(FenceIndex::All, u64::MAX).unwrap();
}

// ============================================================================
// Construction
// ============================================================================

#[test]
fn test_triangle_pass_construction() {
    let (device, ctx) = setup();
    let descriptor = RenderGraphDescriptor::new().with_pass(triangle_pass("Triangle"));

    let graph = RenderGraph::new(&ctx, descriptor, swapchain(3)).unwrap();

    // One command buffer per frame-in-flight slot, checked out of the pool
    let cb0 = graph.command_buffer("Triangle", 0).unwrap();
    let cb1 = graph.command_buffer("Triangle", 1).unwrap();
    assert_ne!(cb0, cb1);
    assert_eq!(graph.command_buffer("Triangle", 2), None);
    let persistent = CommandBufferDescriptor::with_profile(PerformanceProfile::PersistentResources);
    let allocated = ctx.command_buffers().allocated_count(&persistent) as usize;
    assert_eq!(allocated - ctx.command_buffers().idle_count(&persistent), 2);

    // Exactly one pipeline, compiled for the swapchain format
    let state = device.state();
    assert_eq!(state.pipelines.len(), 1);
    assert_eq!(state.pipelines[0].1.color_formats, vec![Format::B8G8R8A8_SRGB]);
    assert_eq!(graph.pipeline("Triangle").unwrap().pipeline, state.pipelines[0].0);
}

#[test]
fn test_identical_descriptors_share_pipeline() {
    let (device, ctx) = setup();
    let descriptor = RenderGraphDescriptor::new()
        .with_pass(triangle_pass("First"))
        .with_pass(triangle_pass("Second"));

    let graph = RenderGraph::new(&ctx, descriptor, swapchain(2)).unwrap();

    assert_eq!(graph.pipeline("First"), graph.pipeline("Second"));
    assert_eq!(device.state().pipelines.len(), 1);
    assert_eq!(graph.graphics_pass_count(), 2);
}

#[test]
fn test_record_once_uses_persistent_profile() {
    let (_device, ctx) = setup();
    let descriptor = RenderGraphDescriptor::new()
        .with_pass(triangle_pass("Once"))
        .with_pass(offscreen_pass("Every"));

    let _graph = RenderGraph::new(&ctx, descriptor, swapchain(2)).unwrap();

    let persistent = CommandBufferDescriptor::with_profile(PerformanceProfile::PersistentResources);
    let transient = CommandBufferDescriptor::default();
    assert!(ctx.command_buffers().allocated_count(&persistent) >= 2);
    assert!(ctx.command_buffers().allocated_count(&transient) >= 2);
    assert_eq!(ctx.command_buffers().pool_count(), 2);
}

#[test]
fn test_swapchain_output_requires_flag() {
    let (_device, ctx) = setup();
    let pass = GraphicsPass::new("Unflagged", triangle_pipeline(), |_| Ok(()))
        .with_output(ResourceUsage::swapchain_color());

    let result = RenderGraph::new(&ctx, RenderGraphDescriptor::new().with_pass(pass), swapchain(2));

    assert!(matches!(result, Err(Error::InvalidResource(_))));
}

#[test]
fn test_flag_requires_swapchain_output() {
    let (_device, ctx) = setup();
    let pass = GraphicsPass::new("Flagged", triangle_pipeline(), |_| Ok(()))
        .with_flags(PassFlags::COLOR_OUTPUT_TO_SWAPCHAIN)
        .with_output(ResourceUsage::color_attachment(ImageViewHandle(7), Format::R8G8B8A8_UNORM));

    let result = RenderGraph::new(&ctx, RenderGraphDescriptor::new().with_pass(pass), swapchain(2));

    assert!(matches!(result, Err(Error::InvalidResource(_))));
}

#[test]
fn test_at_most_one_depth_output() {
    let (_device, ctx) = setup();
    let pass = triangle_pass("Depth")
        .with_output(ResourceUsage::depth_attachment(ImageViewHandle(1), Format::D32_FLOAT))
        .with_output(ResourceUsage::depth_attachment(ImageViewHandle(2), Format::D32_FLOAT));

    let result = RenderGraph::new(&ctx, RenderGraphDescriptor::new().with_pass(pass), swapchain(2));

    assert!(matches!(result, Err(Error::InvalidResource(_))));
}

#[test]
fn test_buffer_cannot_be_attachment() {
    let (_device, ctx) = setup();
    let pass = GraphicsPass::new("Bad", triangle_pipeline(), |_| Ok(())).with_output(ResourceUsage::buffer(
        "vertices",
        ResourceUsageFlags::COLOR_ATTACHMENT,
        PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
    ));

    let result = RenderGraph::new(&ctx, RenderGraphDescriptor::new().with_pass(pass), swapchain(2));

    assert!(matches!(result, Err(Error::InvalidResource(_))));
}

#[test]
fn test_duplicate_names_rejected_and_buffers_returned() {
    let (_device, ctx) = setup();
    let descriptor = RenderGraphDescriptor::new()
        .with_pass(triangle_pass("Same"))
        .with_pass(triangle_pass("Same"));

    let result = RenderGraph::new(&ctx, descriptor, swapchain(2));

    assert!(matches!(result, Err(Error::InvalidResource(_))));
    let persistent = CommandBufferDescriptor::with_profile(PerformanceProfile::PersistentResources);
    assert_eq!(
        ctx.command_buffers().idle_count(&persistent),
        ctx.command_buffers().allocated_count(&persistent) as usize
    );
}

#[test]
fn test_depth_output_flows_into_targets_and_rendering() {
    let (device, ctx) = setup();
    let pass = triangle_pass("Depth").with_output(ResourceUsage::depth_attachment(ImageViewHandle(42), Format::D32_FLOAT));
    let mut graph = RenderGraph::new(&ctx, RenderGraphDescriptor::new().with_pass(pass), swapchain(2)).unwrap();

    graph.record_and_submit(0, 0, &[]).unwrap();

    let cb = graph.command_buffer("Depth", 0).unwrap();
    let state = device.state();
    assert_eq!(state.pipelines[0].1.depth_format, Some(Format::D32_FLOAT));
    let Some(MockCommand::BeginRendering(info)) = state.commands_for(cb).into_iter().nth(1) else {
        panic!("expected BeginRendering");
    };
    let depth = info.depth_attachment.unwrap();
    assert_eq!(depth.image_view, ImageViewHandle(42));
    assert_eq!(depth.layout, ImageLayout::DepthStencilAttachment);
}

// ============================================================================
// Recording and submission
// ============================================================================

#[test]
fn test_recorded_command_sequence() {
    let (device, ctx) = setup();
    let info = swapchain(3);
    let mut graph = RenderGraph::new(&ctx, RenderGraphDescriptor::new().with_pass(triangle_pass("Triangle")), info.clone())
        .unwrap();

    graph.record_and_submit(0, 2, &[]).unwrap();

    let cb = graph.command_buffer("Triangle", 0).unwrap();
    let pipeline = graph.pipeline("Triangle").unwrap().pipeline;
    let expected_rendering = RenderingInfo {
        render_area: Rect2D::full(info.extent),
        color_attachments: vec![RenderingAttachment {
            image_view: info.image_views[2],
            layout: ImageLayout::ColorAttachment,
            load_op: LoadOp::Clear,
            store_op: StoreOp::Store,
            clear_value: ClearValue::BLACK,
        }],
        depth_attachment: None,
    };
    assert_eq!(
        device.state().commands_for(cb),
        vec![
            MockCommand::Begin(CommandBufferUsageFlags::empty()),
            MockCommand::BeginRendering(expected_rendering),
            MockCommand::SetViewport(Viewport::full(info.extent)),
            MockCommand::SetScissor(Rect2D::full(info.extent)),
            MockCommand::BindPipeline(pipeline),
            MockCommand::Draw { vertex_count: 3, instance_count: 1 },
            MockCommand::EndRendering,
            MockCommand::End,
        ]
    );
}

#[test]
fn test_semaphore_chain_and_fences() {
    let (device, ctx) = setup();
    let descriptor = RenderGraphDescriptor::new()
        .with_pass(offscreen_pass("Offscreen"))
        .with_pass(triangle_pass("Composite"))
        .with_pass(offscreen_pass("Debug"));
    let mut graph = RenderGraph::new(&ctx, descriptor, swapchain(3)).unwrap();
    let acquired = acquired_semaphore(&ctx, 0);

    let submission = graph.record_and_submit(0, 1, &[acquired]).unwrap();

    let ready = submission.ready_to_present.unwrap();
    let expected_ready = ctx
        .semaphores()
        .get_semaphore(
            PipelineStageFlags::ALL_GRAPHICS,
            SemaphoreDescriptor { identifier: SemaphoreIdentifier::SwapchainImageReadyToPresent, index: 1 },
        )
        .unwrap();
    assert_eq!(ready, expected_ready);

    let state = device.state();
    assert_eq!(state.submissions.len(), 3);
    assert_eq!(state.submissions[0].wait_semaphores, vec![acquired.submit_info()]);
    assert!(state.submissions[1].wait_semaphores.is_empty());
    assert!(state.submissions[2].wait_semaphores.is_empty());
    assert!(state.submissions[0].signal_semaphores.is_empty());
    assert_eq!(state.submissions[1].signal_semaphores, vec![ready.submit_info()]);
    assert!(state.submissions[2].signal_semaphores.is_empty());
    assert!(state.submissions.iter().all(|s| s.queue == QueueType::Graphics));

    let group = lock_group(&submission.fence_group);
    assert_eq!(group.len(), 3);
    for i in 0..3 {
        assert_eq!(state.submissions[i as usize].fence, Some(group.fence(i).unwrap()));
        assert!(group.is_pending(i));
    }
}

#[test]
fn test_last_swapchain_pass_signals_ready() {
    let (device, ctx) = setup();
    let descriptor = RenderGraphDescriptor::new()
        .with_pass(triangle_pass("Scene"))
        .with_pass(triangle_pass("Overlay"));
    let mut graph = RenderGraph::new(&ctx, descriptor, swapchain(2)).unwrap();

    let submission = graph.record_and_submit(0, 0, &[]).unwrap();

    let ready = submission.ready_to_present.unwrap().submit_info();
    let state = device.state();
    assert!(state.submissions[0].signal_semaphores.is_empty());
    assert_eq!(state.submissions[1].signal_semaphores, vec![ready]);
}

#[test]
fn test_graph_without_swapchain_output_has_no_ready_semaphore() {
    let (_device, ctx) = setup();
    let mut graph = RenderGraph::new(&ctx, RenderGraphDescriptor::new().with_pass(offscreen_pass("Shadow")), swapchain(2))
        .unwrap();

    let submission = graph.record_and_submit(0, 0, &[]).unwrap();

    assert!(submission.ready_to_present.is_none());
    assert!(!graph.presents());
}

#[test]
fn test_frame_isolation() {
    let (device, ctx) = setup();
    let mut graph = RenderGraph::new(&ctx, RenderGraphDescriptor::new().with_pass(offscreen_pass("Scene")), swapchain(2))
        .unwrap();
    let cb0 = graph.command_buffer("Scene", 0).unwrap();
    let cb1 = graph.command_buffer("Scene", 1).unwrap();

    graph.record_and_submit(0, 0, &[]).unwrap();
    {
        let state = device.state();
        assert!(!state.commands_for(cb0).is_empty());
        assert!(state.commands_for(cb1).is_empty());
        assert!(state.submissions.iter().all(|s| s.command_buffers == vec![cb0]));
    }

    graph.record_and_submit(1, 1, &[]).unwrap();
    let state = device.state();
    assert_eq!(state.submissions.len(), 2);
    assert_eq!(state.submissions[1].command_buffers, vec![cb1]);
    // Slot 1's fences are a different group than slot 0's
    assert_ne!(state.submissions[0].fence, state.submissions[1].fence);
}

#[test]
fn test_record_once_resubmits_without_recording() {
    let (device, ctx) = setup();
    let recordings = Arc::new(AtomicU32::new(0));
    let pass = counted_pass("Triangle", PassFlags::RECORD_ONCE, recordings.clone());
    let mut graph = RenderGraph::new(&ctx, RenderGraphDescriptor::new().with_pass(pass), swapchain(2)).unwrap();
    assert_eq!(graph.record_state("Triangle", 0), Some(RecordState::Unrecorded));

    let first = graph.record_and_submit(0, 0, &[]).unwrap();
    assert_eq!(graph.record_state("Triangle", 0), Some(RecordState::Recorded { swapchain_image: Some(0) }));
    finish(&first);

    let second = graph.record_and_submit(0, 0, &[]).unwrap();
    finish(&second);

    assert_eq!(recordings.load(Ordering::SeqCst), 1);
    assert_eq!(device.state().submissions.len(), 2);
    assert_eq!(graph.record_state("Triangle", 1), Some(RecordState::Unrecorded));
}

#[test]
fn test_record_once_rerecords_for_other_swapchain_image() {
    let (_device, ctx) = setup();
    let recordings = Arc::new(AtomicU32::new(0));
    let pass = counted_pass("Triangle", PassFlags::RECORD_ONCE, recordings.clone());
    let mut graph = RenderGraph::new(&ctx, RenderGraphDescriptor::new().with_pass(pass), swapchain(3)).unwrap();

    for image in [0, 1, 1, 0] {
        let submission = graph.record_and_submit(0, image, &[]).unwrap();
        finish(&submission);
    }

    // Image 0, then 1, then 1 again (reused), then 0 (re-recorded)
    assert_eq!(recordings.load(Ordering::SeqCst), 3);
    assert_eq!(graph.record_state("Triangle", 0), Some(RecordState::Recorded { swapchain_image: Some(0) }));
}

#[test]
fn test_default_passes_record_every_frame() {
    let (device, ctx) = setup();
    let recordings = Arc::new(AtomicU32::new(0));
    let pass = counted_pass("Triangle", PassFlags::empty(), recordings.clone());
    let mut graph = RenderGraph::new(&ctx, RenderGraphDescriptor::new().with_pass(pass), swapchain(2)).unwrap();

    for _ in 0..3 {
        let submission = graph.record_and_submit(0, 0, &[]).unwrap();
        finish(&submission);
    }

    assert_eq!(recordings.load(Ordering::SeqCst), 3);
    let cb = graph.command_buffer("Triangle", 0).unwrap();
    assert_eq!(
        device.state().commands_for(cb)[0],
        MockCommand::Begin(CommandBufferUsageFlags::ONE_TIME_SUBMIT)
    );
}

#[test]
fn test_host_pass_runs_in_order_without_submission() {
    let (device, ctx) = setup();
    let order = Arc::new(Mutex::new(Vec::new()));
    let host_order = order.clone();
    let draw_order = order.clone();
    let descriptor = RenderGraphDescriptor::new()
        .with_pass(HostPass::new("Upload", move |host| {
            host_order.lock().unwrap().push(format!("upload {}", host.frame_index));
            Ok(())
        }))
        .with_pass(
            GraphicsPass::new("Triangle", triangle_pipeline(), move |_| {
                draw_order.lock().unwrap().push("draw".to_string());
                Ok(())
            })
            .with_flags(PassFlags::COLOR_OUTPUT_TO_SWAPCHAIN)
            .with_output(ResourceUsage::swapchain_color()),
        );
    let mut graph = RenderGraph::new(&ctx, descriptor, swapchain(2)).unwrap();

    let submission = graph.record_and_submit(1, 0, &[]).unwrap();

    assert_eq!(*order.lock().unwrap(), vec!["upload 1".to_string(), "draw".to_string()]);
    assert_eq!(graph.pass_names(), vec!["Upload", "Triangle"]);
    assert_eq!(device.state().submissions.len(), 1);
    assert_eq!(lock_group(&submission.fence_group).len(), 1);
}

#[test]
fn test_pending_slot_is_rejected() {
    let (device, ctx) = setup();
    device.state().hold_fences = true;
    let mut graph = RenderGraph::new(&ctx, RenderGraphDescriptor::new().with_pass(triangle_pass("Triangle")), swapchain(2))
        .unwrap();

    let submission = graph.record_and_submit(0, 0, &[]).unwrap();
    let again = graph.record_and_submit(0, 1, &[]);
    assert!(matches!(again, Err(Error::InvalidResource(_))));

    // The other slot is free
    graph.record_and_submit(1, 1, &[]).unwrap();

    let fence = lock_group(&submission.fence_group).fence(0).unwrap();
    device.signal_fence(fence);
    finish(&submission);
    graph.record_and_submit(0, 0, &[]).unwrap();
}

#[test]
fn test_indices_out_of_range() {
    let (_device, ctx) = setup();
    let mut graph = RenderGraph::new(&ctx, RenderGraphDescriptor::new().with_pass(triangle_pass("Triangle")), swapchain(3))
        .unwrap();

    assert!(matches!(graph.record_and_submit(2, 0, &[]), Err(Error::InvalidResource(_))));
    assert!(matches!(graph.record_and_submit(0, 3, &[]), Err(Error::InvalidResource(_))));
}

#[test]
fn test_draw_error_aborts_frame() {
    let (device, ctx) = setup();
    let pass = GraphicsPass::new("Failing", triangle_pipeline(), |_| {
        Err(Error::InvalidResource("missing mesh".to_string()))
    })
    .with_flags(PassFlags::RECORD_ONCE | PassFlags::COLOR_OUTPUT_TO_SWAPCHAIN)
    .with_output(ResourceUsage::swapchain_color());
    let mut graph = RenderGraph::new(&ctx, RenderGraphDescriptor::new().with_pass(pass), swapchain(2)).unwrap();

    let result = graph.record_and_submit(0, 0, &[]);

    assert!(matches!(result, Err(Error::InvalidResource(_))));
    assert!(device.state().submissions.is_empty());
    assert_eq!(graph.record_state("Failing", 0), Some(RecordState::Unrecorded));
}

fn failing_pass(name: &str) -> GraphicsPass {
    GraphicsPass::new(name, triangle_pipeline(), |_| Err(Error::InvalidResource("missing mesh".to_string())))
        .with_flags(PassFlags::RECORD_ONCE | PassFlags::COLOR_OUTPUT_TO_SWAPCHAIN)
        .with_output(ResourceUsage::swapchain_color())
}

#[test]
fn test_draw_error_consumes_wait_semaphores() {
    let (device, ctx) = setup();
    let mut graph = RenderGraph::new(&ctx, RenderGraphDescriptor::new().with_pass(failing_pass("Failing")), swapchain(2))
        .unwrap();
    let acquired = acquired_semaphore(&ctx, 0);

    let result = graph.record_and_submit(0, 0, &[acquired]);
    assert!(matches!(result, Err(Error::InvalidResource(_))));

    // One empty submission waits on the semaphore, fenced in the slot's group
    let group = graph.fence_group(0).unwrap();
    let fence = lock_group(&group).fence(0).unwrap();
    assert!(lock_group(&group).is_pending(0));
    let cb = graph.command_buffer("Failing", 0).unwrap();
    let state = device.state();
    assert_eq!(state.submissions.len(), 1);
    let release = &state.submissions[0];
    assert!(release.command_buffers.is_empty());
    assert_eq!(release.wait_semaphores, vec![acquired.submit_info()]);
    assert!(release.signal_semaphores.is_empty());
    assert_eq!(release.fence, Some(fence));

    // The aborted recording was closed
    assert_eq!(state.commands_for(cb).last(), Some(&MockCommand::End));
}

#[test]
fn test_host_error_after_swapchain_pass_consumes_ready_semaphore() {
    let (device, ctx) = setup();
    let descriptor = RenderGraphDescriptor::new()
        .with_pass(triangle_pass("Triangle"))
        .with_pass(HostPass::new("Readback", |_| Err(Error::BackendError("readback failed".to_string()))));
    let mut graph = RenderGraph::new(&ctx, descriptor, swapchain(2)).unwrap();
    let acquired = acquired_semaphore(&ctx, 0);
    let ready = ctx
        .semaphores()
        .get_semaphore(
            PipelineStageFlags::ALL_GRAPHICS,
            SemaphoreDescriptor { identifier: SemaphoreIdentifier::SwapchainImageReadyToPresent, index: 0 },
        )
        .unwrap();

    let result = graph.record_and_submit(0, 0, &[acquired]);
    assert!(matches!(result, Err(Error::BackendError(_))));

    let state = device.state();
    assert_eq!(state.submissions.len(), 2);
    assert_eq!(state.submissions[0].signal_semaphores, vec![ready.submit_info()]);
    // The acquire semaphore was consumed by the pass; only ready is left over
    let release = &state.submissions[1];
    assert!(release.command_buffers.is_empty());
    assert_eq!(release.wait_semaphores, vec![ready.submit_info()]);
    assert_eq!(release.fence, None);
}

#[test]
fn test_failed_frame_leaves_slot_usable() {
    let (device, ctx) = setup();
    let fail = Arc::new(AtomicU32::new(1));
    let remaining = fail.clone();
    let pass = GraphicsPass::new("Flaky", triangle_pipeline(), move |draw| {
        if remaining.load(Ordering::SeqCst) > 0 {
            remaining.fetch_sub(1, Ordering::SeqCst);
            return Err(Error::InvalidResource("not ready".to_string()));
        }
        draw.draw(3, 1);
        Ok(())
    })
    .with_flags(PassFlags::COLOR_OUTPUT_TO_SWAPCHAIN)
    .with_output(ResourceUsage::swapchain_color());
    let mut graph = RenderGraph::new(&ctx, RenderGraphDescriptor::new().with_pass(pass), swapchain(2)).unwrap();
    let acquired = acquired_semaphore(&ctx, 0);

    assert!(graph.record_and_submit(0, 0, &[acquired]).is_err());
    let group = graph.fence_group(0).unwrap();
    wait_submitted(&group, u64::MAX).unwrap();

    let submission = graph.record_and_submit(0, 0, &[acquired]).unwrap();
    assert!(submission.ready_to_present.is_some());
    assert_eq!(graph.record_state("Flaky", 0), Some(RecordState::Recorded { swapchain_image: Some(0) }));
    assert_eq!(device.state().submissions.len(), 2);
}

#[test]
fn test_draw_callback_registers_fenced_callback_on_its_slot() {
    let (_device, ctx) = setup();
    let fences = ctx.fences().clone();
    let released = Arc::new(AtomicU32::new(0));
    let counter = released.clone();
    let pass = GraphicsPass::new("Streaming", triangle_pipeline(), move |draw| {
        let group = fences.get_fence_group(FenceGroupDescriptor {
            identifier: FenceIdentifier::RenderGraphQueueSubmit,
            slot: draw.frame_index,
            size: 1,
            signaled: false,
        })?;
        let counter = counter.clone();
        lock_group(&group).add_fenced_callback(
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
            FenceIndex::At(0),
        )?;
        draw.draw(3, 1);
        Ok(())
    })
    .with_flags(PassFlags::COLOR_OUTPUT_TO_SWAPCHAIN)
    .with_output(ResourceUsage::swapchain_color());
    let mut graph = RenderGraph::new(&ctx, RenderGraphDescriptor::new().with_pass(pass), swapchain(2)).unwrap();

    let submission = graph.record_and_submit(0, 0, &[]).unwrap();
    assert_eq!(lock_group(&submission.fence_group).pending_callback_count(FenceIndex::At(0)), 1);
    assert_eq!(released.load(Ordering::SeqCst), 0);

    wait_submitted(&submission.fence_group, u64::MAX).unwrap();
    assert_eq!(released.load(Ordering::SeqCst), 1);
}

// ============================================================================
// Swapchain updates and dispose
// ============================================================================

#[test]
fn test_update_swapchain_resets_recordings() {
    let (device, ctx) = setup();
    let recordings = Arc::new(AtomicU32::new(0));
    let pass = counted_pass("Triangle", PassFlags::RECORD_ONCE, recordings.clone());
    let mut graph = RenderGraph::new(&ctx, RenderGraphDescriptor::new().with_pass(pass), swapchain(2)).unwrap();
    finish(&graph.record_and_submit(0, 0, &[]).unwrap());

    let mut resized = swapchain(2);
    resized.extent = Extent2D { width: 1920, height: 1080 };
    graph.update_swapchain(resized.clone()).unwrap();

    assert_eq!(graph.record_state("Triangle", 0), Some(RecordState::Unrecorded));
    graph.record_and_submit(0, 0, &[]).unwrap();
    assert_eq!(recordings.load(Ordering::SeqCst), 2);

    let cb = graph.command_buffer("Triangle", 0).unwrap();
    let commands = device.state().commands_for(cb);
    assert!(commands.contains(&MockCommand::SetViewport(Viewport::full(resized.extent))));
    // Same format: the cached pipeline is kept
    assert_eq!(device.state().pipelines.len(), 1);
}

#[test]
fn test_update_swapchain_format_fetches_new_pipeline() {
    let (device, ctx) = setup();
    let mut graph = RenderGraph::new(&ctx, RenderGraphDescriptor::new().with_pass(triangle_pass("Triangle")), swapchain(2))
        .unwrap();
    let before = graph.pipeline("Triangle").unwrap().pipeline;

    let mut srgb = swapchain(2);
    srgb.format = Format::R8G8B8A8_SRGB;
    graph.update_swapchain(srgb).unwrap();

    assert_ne!(graph.pipeline("Triangle").unwrap().pipeline, before);
    let state = device.state();
    assert_eq!(state.pipelines.len(), 2);
    assert_eq!(state.pipelines[1].1.color_formats, vec![Format::R8G8B8A8_SRGB]);
}

#[test]
fn test_dispose_returns_command_buffers() {
    let (_device, ctx) = setup();
    let mut graph = RenderGraph::new(&ctx, RenderGraphDescriptor::new().with_pass(triangle_pass("Triangle")), swapchain(2))
        .unwrap();
    let persistent = CommandBufferDescriptor::with_profile(PerformanceProfile::PersistentResources);
    let idle_before = ctx.command_buffers().idle_count(&persistent);

    graph.dispose();

    assert_eq!(ctx.command_buffers().idle_count(&persistent), idle_before + 2);
    assert_eq!(graph.pass_count(), 0);
    assert_eq!(graph.command_buffer("Triangle", 0), None);
}
