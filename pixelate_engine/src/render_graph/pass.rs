//! Declarative render graph nodes
//!
//! A [`Pass`] names the pipeline it draws with and the resources it reads and
//! writes. The graph turns each graphics pass into a runtime pass bound to a
//! compiled pipeline and one command buffer per frame-in-flight slot.

use bitflags::bitflags;

use crate::device::{
    ClearValue, ColorBlendAttachment, CommandBufferHandle, Format, GraphicsDevice, ImageViewHandle,
    LoadOp, PipelineHandle, PipelineLayoutHandle, PipelineStageFlags, StoreOp,
};
use crate::error::Result;
use crate::pipeline_cache::{ColorTarget, GraphicsPipelineDescriptor, RenderTargetLayout};

bitflags! {
    /// How a pass uses a resource
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ResourceUsageFlags: u32 {
        const COLOR_ATTACHMENT = 1 << 0;
        const DEPTH_ATTACHMENT = 1 << 1;
        const VERTEX_BUFFER = 1 << 2;
        const INDEX_BUFFER = 1 << 3;
        const UNIFORM_BUFFER = 1 << 4;
        const STORAGE_BUFFER = 1 << 5;
        const SAMPLED_IMAGE = 1 << 6;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PassFlags: u32 {
        /// Record each slot's command buffer once and resubmit it afterwards
        const RECORD_ONCE = 1 << 0;
        /// The pass renders into the acquired swapchain image
        const COLOR_OUTPUT_TO_SWAPCHAIN = 1 << 1;
    }
}

/// Resource a pass reads or writes
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceRef {
    /// The image acquired for the current frame
    Swapchain,
    Image { view: ImageViewHandle, format: Format },
    /// Buffers are owned outside the graph and only named here
    Buffer { name: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResourceUsage {
    pub resource: ResourceRef,
    pub usage: ResourceUsageFlags,
    pub stages: PipelineStageFlags,
    /// Blend state when used as a color attachment
    pub blend: ColorBlendAttachment,
    pub load_op: LoadOp,
    pub store_op: StoreOp,
    pub clear_value: ClearValue,
}

impl ResourceUsage {
    /// Swapchain color output cleared to opaque black and stored
    pub fn swapchain_color() -> Self {
        Self {
            resource: ResourceRef::Swapchain,
            usage: ResourceUsageFlags::COLOR_ATTACHMENT,
            stages: PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            blend: ColorBlendAttachment::default(),
            load_op: LoadOp::Clear,
            store_op: StoreOp::Store,
            clear_value: ClearValue::BLACK,
        }
    }

    pub fn color_attachment(view: ImageViewHandle, format: Format) -> Self {
        Self {
            resource: ResourceRef::Image { view, format },
            ..Self::swapchain_color()
        }
    }

    /// Depth output cleared to 1.0
    pub fn depth_attachment(view: ImageViewHandle, format: Format) -> Self {
        Self {
            resource: ResourceRef::Image { view, format },
            usage: ResourceUsageFlags::DEPTH_ATTACHMENT,
            stages: PipelineStageFlags::EARLY_FRAGMENT_TESTS | PipelineStageFlags::LATE_FRAGMENT_TESTS,
            blend: ColorBlendAttachment::default(),
            load_op: LoadOp::Clear,
            store_op: StoreOp::DontCare,
            clear_value: ClearValue::DepthStencil { depth: 1.0, stencil: 0 },
        }
    }

    pub fn buffer(name: impl Into<String>, usage: ResourceUsageFlags, stages: PipelineStageFlags) -> Self {
        Self {
            resource: ResourceRef::Buffer { name: name.into() },
            usage,
            stages,
            blend: ColorBlendAttachment::default(),
            load_op: LoadOp::Load,
            store_op: StoreOp::Store,
            clear_value: ClearValue::BLACK,
        }
    }

    pub fn with_blend(mut self, blend: ColorBlendAttachment) -> Self {
        self.blend = blend;
        self
    }

    pub fn with_load_op(mut self, load_op: LoadOp) -> Self {
        self.load_op = load_op;
        self
    }

    pub fn with_clear_value(mut self, clear_value: ClearValue) -> Self {
        self.clear_value = clear_value;
        self
    }

    pub fn is_color_attachment(&self) -> bool {
        self.usage.contains(ResourceUsageFlags::COLOR_ATTACHMENT)
    }

    pub fn is_depth_attachment(&self) -> bool {
        self.usage.contains(ResourceUsageFlags::DEPTH_ATTACHMENT)
    }

    pub fn is_swapchain(&self) -> bool {
        self.resource == ResourceRef::Swapchain
    }
}

// ===== CALLBACK CONTEXTS =====

/// What a draw callback may record into
pub struct DrawContext<'a> {
    pub device: &'a dyn GraphicsDevice,
    pub command_buffer: CommandBufferHandle,
    pub pipeline: PipelineHandle,
    pub layout: PipelineLayoutHandle,
    pub frame_index: u32,
    pub swapchain_image_index: u32,
}

impl DrawContext<'_> {
    pub fn draw(&self, vertex_count: u32, instance_count: u32) {
        self.device.cmd_draw(self.command_buffer, vertex_count, instance_count, 0, 0);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostContext {
    pub frame_index: u32,
    pub swapchain_image_index: u32,
}

pub type DrawCallback = Box<dyn FnMut(&mut DrawContext<'_>) -> Result<()> + Send>;
pub type HostCallback = Box<dyn FnMut(&HostContext) -> Result<()> + Send>;

// ===== PASSES =====

pub struct GraphicsPass {
    pub name: String,
    pub pipeline: GraphicsPipelineDescriptor,
    pub flags: PassFlags,
    pub inputs: Vec<ResourceUsage>,
    pub outputs: Vec<ResourceUsage>,
    pub draw: DrawCallback,
}

impl GraphicsPass {
    pub fn new<F>(name: impl Into<String>, pipeline: GraphicsPipelineDescriptor, draw: F) -> Self
    where
        F: FnMut(&mut DrawContext<'_>) -> Result<()> + Send + 'static,
    {
        Self {
            name: name.into(),
            pipeline,
            flags: PassFlags::empty(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            draw: Box::new(draw),
        }
    }

    pub fn with_flags(mut self, flags: PassFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_input(mut self, input: ResourceUsage) -> Self {
        self.inputs.push(input);
        self
    }

    pub fn with_output(mut self, output: ResourceUsage) -> Self {
        self.outputs.push(output);
        self
    }

    pub fn color_outputs(&self) -> impl Iterator<Item = &ResourceUsage> {
        self.outputs.iter().filter(|output| output.is_color_attachment())
    }

    pub fn depth_output(&self) -> Option<&ResourceUsage> {
        self.outputs.iter().find(|output| output.is_depth_attachment())
    }

    pub fn writes_swapchain(&self) -> bool {
        self.outputs.iter().any(ResourceUsage::is_swapchain)
    }

    /// Attachment formats and blend states the pipeline must be compiled for
    ///
    /// Swapchain outputs take the live swapchain format.
    pub fn render_target_layout(&self, swapchain_format: Format) -> RenderTargetLayout {
        let format_of = |usage: &ResourceUsage| match &usage.resource {
            ResourceRef::Swapchain => swapchain_format,
            ResourceRef::Image { format, .. } => *format,
            ResourceRef::Buffer { .. } => Format::Undefined,
        };

        RenderTargetLayout {
            color_targets: self
                .color_outputs()
                .map(|output| ColorTarget { format: format_of(output), blend: output.blend })
                .collect(),
            depth_format: self.depth_output().map(format_of),
        }
    }
}

/// Callback run on the recording thread, between the submissions of its neighbours
pub struct HostPass {
    pub name: String,
    pub callback: HostCallback,
}

impl HostPass {
    pub fn new<F>(name: impl Into<String>, callback: F) -> Self
    where
        F: FnMut(&HostContext) -> Result<()> + Send + 'static,
    {
        Self { name: name.into(), callback: Box::new(callback) }
    }
}

pub enum Pass {
    Graphics(GraphicsPass),
    Host(HostPass),
}

impl Pass {
    pub fn name(&self) -> &str {
        match self {
            Pass::Graphics(pass) => &pass.name,
            Pass::Host(pass) => &pass.name,
        }
    }
}

impl From<GraphicsPass> for Pass {
    fn from(pass: GraphicsPass) -> Self {
        Pass::Graphics(pass)
    }
}

impl From<HostPass> for Pass {
    fn from(pass: HostPass) -> Self {
        Pass::Host(pass)
    }
}

/// Ordered passes of a graph; execution follows declaration order
#[derive(Default)]
pub struct RenderGraphDescriptor {
    pub passes: Vec<Pass>,
}

impl RenderGraphDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pass(mut self, pass: impl Into<Pass>) -> Self {
        self.passes.push(pass.into());
        self
    }
}
