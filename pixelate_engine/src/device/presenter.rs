/// Presentation seam: image acquisition and present

use crate::device::handles::{CommandBufferHandle, ImageViewHandle, SemaphoreHandle};
use crate::device::types::{Extent2D, Format};
use crate::error::Result;

/// Swapchain properties the render graph compiles against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapchainInfo {
    pub extent: Extent2D,
    pub format: Format,
    /// One view per swapchain image, indexed by swapchain image index
    pub image_views: Vec<ImageViewHandle>,
}

impl SwapchainInfo {
    pub fn image_count(&self) -> u32 {
        self.image_views.len() as u32
    }
}

/// Health of the swapchain reported by acquire/present
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapchainStatus {
    Optimal,
    /// Still presentable but no longer matches the surface
    Suboptimal,
    /// Must be recreated before the next acquire
    OutOfDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquireResult {
    pub image_index: u32,
    pub status: SwapchainStatus,
}

/// Swapchain owned by the bootstrap layer
///
/// Suboptimal and out-of-date states are returned as `Ok` statuses; only real
/// failures (device lost, ...) are errors. Recreation is the caller's job.
pub trait Presenter {
    fn swapchain_info(&self) -> SwapchainInfo;

    /// Acquire the next image, signaling `signal` when it is ready to be rendered to
    fn acquire_next_image(&mut self, signal: SemaphoreHandle) -> Result<AcquireResult>;

    /// Record the color-attachment to present-source transition of one image
    ///
    /// Called once per swapchain image; the recorded buffer is resubmitted every frame.
    fn record_present_transition(&self, command_buffer: CommandBufferHandle, image_index: u32) -> Result<()>;

    /// Queue the image for presentation once every `wait` semaphore is signaled
    fn present(&mut self, image_index: u32, wait: &[SemaphoreHandle]) -> Result<SwapchainStatus>;
}
