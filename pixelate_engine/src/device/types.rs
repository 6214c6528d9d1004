/// Queue, command, synchronization and rendering types shared with backends

use bitflags::bitflags;
use crate::device::handles::{CommandBufferHandle, ImageViewHandle, SemaphoreHandle};
use crate::hasher::{ContentHash, Hasher};

// ===== QUEUES / COMMAND BUFFERS =====

/// Queue a command buffer is submitted to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueType {
    Graphics,
    Compute,
}

/// Command buffer level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandBufferLevel {
    /// Submitted directly to a queue
    Primary,
    /// Executed from a primary command buffer
    Secondary,
}

/// How a pooled command buffer is reset when returned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PerformanceProfile {
    /// Cheap reset, backing memory kept by the pool
    Default,
    /// Recorded rarely and kept long; reset releases backing memory
    PersistentResources,
}

bitflags! {
    /// Command pool creation flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CommandPoolFlags: u32 {
        const TRANSIENT = 1 << 0;
        const RESET_COMMAND_BUFFER = 1 << 1;
    }
}

bitflags! {
    /// Command buffer begin flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CommandBufferUsageFlags: u32 {
        const ONE_TIME_SUBMIT = 1 << 0;
        const SIMULTANEOUS_USE = 1 << 1;
    }
}

// ===== PIPELINE STAGES / SHADER STAGES =====

bitflags! {
    /// Pipeline stages (synchronization2 granularity)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PipelineStageFlags: u64 {
        const TOP_OF_PIPE = 1 << 0;
        const DRAW_INDIRECT = 1 << 1;
        const VERTEX_INPUT = 1 << 2;
        const VERTEX_SHADER = 1 << 3;
        const FRAGMENT_SHADER = 1 << 7;
        const EARLY_FRAGMENT_TESTS = 1 << 8;
        const LATE_FRAGMENT_TESTS = 1 << 9;
        const COLOR_ATTACHMENT_OUTPUT = 1 << 10;
        const COMPUTE_SHADER = 1 << 11;
        const TRANSFER = 1 << 12;
        const BOTTOM_OF_PIPE = 1 << 13;
        const ALL_GRAPHICS = 1 << 15;
        const ALL_COMMANDS = 1 << 16;
    }
}

bitflags! {
    /// Shader stages
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShaderStageFlags: u32 {
        const VERTEX = 1 << 0;
        const FRAGMENT = 1 << 4;
        const COMPUTE = 1 << 5;
    }
}

impl ShaderStageFlags {
    /// File-name suffix of the compiled bytecode for a single stage
    pub fn file_suffix(self) -> Option<&'static str> {
        if self == Self::VERTEX {
            Some("vertex")
        } else if self == Self::FRAGMENT {
            Some("fragment")
        } else if self == Self::COMPUTE {
            Some("compute")
        } else {
            None
        }
    }
}

impl ContentHash for ShaderStageFlags {
    fn content_hash(&self, hasher: &mut Hasher) {
        hasher.hash_u32(self.bits());
    }
}

// ===== FORMATS / GEOMETRY =====

/// Attachment and vertex attribute formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(non_camel_case_types)]
pub enum Format {
    Undefined,
    R8G8B8A8_SRGB,
    R8G8B8A8_UNORM,
    B8G8R8A8_SRGB,
    B8G8R8A8_UNORM,
    R16G16B16A16_SFLOAT,
    D16_UNORM,
    D32_FLOAT,
    D24_UNORM_S8_UINT,
    R32_SFLOAT,
    R32G32_SFLOAT,
    R32G32B32_SFLOAT,
    R32G32B32A32_SFLOAT,
}

impl Format {
    pub fn is_depth(self) -> bool {
        matches!(self, Format::D16_UNORM | Format::D32_FLOAT | Format::D24_UNORM_S8_UINT)
    }
}

impl ContentHash for Format {
    fn content_hash(&self, hasher: &mut Hasher) {
        hasher.hash_u32(*self as u32);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Extent2D {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Offset2D {
    pub x: i32,
    pub y: i32,
}

/// Scissor / render area rectangle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect2D {
    pub offset: Offset2D,
    pub extent: Extent2D,
}

impl Rect2D {
    /// Rectangle covering the whole extent
    pub fn full(extent: Extent2D) -> Self {
        Self { offset: Offset2D::default(), extent }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    /// Viewport covering the whole extent with depth range [0, 1]
    pub fn full(extent: Extent2D) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

// ===== DYNAMIC RENDERING =====

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadOp {
    Load,
    Clear,
    DontCare,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Store,
    DontCare,
}

/// Image layouts the engine renders or presents from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageLayout {
    Undefined,
    ColorAttachment,
    DepthStencilAttachment,
    PresentSrc,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClearValue {
    Color([f32; 4]),
    DepthStencil { depth: f32, stencil: u32 },
}

impl ClearValue {
    /// Opaque black
    pub const BLACK: Self = ClearValue::Color([0.0, 0.0, 0.0, 1.0]);
}

/// One attachment of a dynamic-rendering scope
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderingAttachment {
    pub image_view: ImageViewHandle,
    pub layout: ImageLayout,
    pub load_op: LoadOp,
    pub store_op: StoreOp,
    pub clear_value: ClearValue,
}

/// Parameters of `cmd_begin_rendering`
#[derive(Debug, Clone, PartialEq)]
pub struct RenderingInfo {
    pub render_area: Rect2D,
    pub color_attachments: Vec<RenderingAttachment>,
    pub depth_attachment: Option<RenderingAttachment>,
}

// ===== SUBMISSION =====

/// Semaphore wait/signal entry of a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SemaphoreSubmitInfo {
    pub semaphore: SemaphoreHandle,
    pub stage_mask: PipelineStageFlags,
    /// Timeline value (always 0, binary semaphores only)
    pub value: u64,
    pub device_index: u32,
}

/// One queue submission
#[derive(Debug, Clone, Copy, Default)]
pub struct SubmitInfo<'a> {
    pub command_buffers: &'a [CommandBufferHandle],
    pub wait_semaphores: &'a [SemaphoreSubmitInfo],
    pub signal_semaphores: &'a [SemaphoreSubmitInfo],
}
