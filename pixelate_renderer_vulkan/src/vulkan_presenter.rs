/// VulkanPresenter - Vulkan implementation of the Presenter trait
///
/// Presents through a `VkSwapchainKHR` created by the bootstrap layer. The
/// presenter owns the per-image views and destroys them on drop; the swapchain
/// itself stays with its creator.

use ash::vk;
use ash::vk::Handle;
use pixelate_engine::pixelate::{Error, Result};
use pixelate_engine::pixelate::device::*;
use pixelate_engine::{engine_bail_invalid, engine_debug, engine_err, engine_error};
use std::sync::Arc;

use crate::vulkan_device::VulkanDevice;
use crate::vulkan_format::*;

const SOURCE: &str = "pixelate::vulkan";

const COLOR_SUBRESOURCE: vk::ImageSubresourceRange = vk::ImageSubresourceRange {
    aspect_mask: vk::ImageAspectFlags::COLOR,
    base_mip_level: 0,
    level_count: 1,
    base_array_layer: 0,
    layer_count: 1,
};

pub struct VulkanPresenter {
    device: Arc<VulkanDevice>,
    swapchain_loader: ash::khr::swapchain::Device,
    swapchain: vk::SwapchainKHR,
    present_queue: vk::Queue,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    format: Format,
    extent: Extent2D,
    acquire_timeout_ns: u64,
}

impl VulkanPresenter {
    /// Wrap an existing swapchain
    ///
    /// # Arguments
    ///
    /// * `device` - Device whose queue families include a present family
    /// * `swapchain_loader` - `VK_KHR_swapchain` function table
    /// * `swapchain` - Swapchain created with `COLOR_ATTACHMENT` usage
    /// * `format` - Surface format the swapchain was created with
    /// * `extent` - Swapchain extent
    pub fn new(
        device: Arc<VulkanDevice>,
        swapchain_loader: ash::khr::swapchain::Device,
        swapchain: vk::SwapchainKHR,
        format: vk::Format,
        extent: vk::Extent2D,
    ) -> Result<Self> {
        let Some(present_queue) = device.present_queue() else {
            engine_error!(SOURCE, "VulkanPresenter requires a present queue family");
            return Err(Error::InitializationFailed("no present queue family".to_string()));
        };

        let mut presenter = Self {
            device,
            swapchain_loader,
            swapchain: vk::SwapchainKHR::null(),
            present_queue,
            images: Vec::new(),
            image_views: Vec::new(),
            format: Format::Undefined,
            extent: Extent2D::default(),
            acquire_timeout_ns: u64::MAX,
        };
        presenter.replace_swapchain(swapchain, format, extent)?;

        Ok(presenter)
    }

    /// Bound the wait for a free image (default: forever)
    pub fn with_acquire_timeout(mut self, timeout_ns: u64) -> Self {
        self.acquire_timeout_ns = timeout_ns;
        self
    }

    pub fn swapchain(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    /// Adopt a recreated swapchain
    ///
    /// Destroys the previous image views and rebuilds them for the new images.
    /// The caller destroys the old swapchain once the device is idle.
    pub fn replace_swapchain(&mut self, swapchain: vk::SwapchainKHR, format: vk::Format, extent: vk::Extent2D) -> Result<()> {
        let Some(engine_format) = vk_to_format(format) else {
            engine_error!(SOURCE, "Unsupported swapchain format {:?}", format);
            return Err(Error::InitializationFailed(format!("unsupported swapchain format {:?}", format)));
        };

        self.destroy_image_views();

        let images = unsafe { self.swapchain_loader.get_swapchain_images(swapchain) }.map_err(|e| {
            engine_error!(SOURCE, "Failed to get swapchain images: {:?}", e);
            Error::InitializationFailed(format!("Failed to get swapchain images: {:?}", e))
        })?;

        for &image in &images {
            let create_info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(format)
                .components(vk::ComponentMapping {
                    r: vk::ComponentSwizzle::IDENTITY,
                    g: vk::ComponentSwizzle::IDENTITY,
                    b: vk::ComponentSwizzle::IDENTITY,
                    a: vk::ComponentSwizzle::IDENTITY,
                })
                .subresource_range(COLOR_SUBRESOURCE);

            match unsafe { self.device.raw().create_image_view(&create_info, None) } {
                Ok(view) => self.image_views.push(view),
                Err(e) => {
                    // Views created so far are released by the next replace or drop
                    engine_error!(SOURCE, "Failed to create swapchain image view: {:?}", e);
                    return Err(Error::InitializationFailed(format!("Failed to create image view: {:?}", e)));
                }
            }
        }

        engine_debug!(SOURCE, "Swapchain adopted: {} images, {}x{}, {:?}",
            images.len(), extent.width, extent.height, engine_format);

        self.swapchain = swapchain;
        self.images = images;
        self.format = engine_format;
        self.extent = Extent2D { width: extent.width, height: extent.height };

        Ok(())
    }

    fn destroy_image_views(&mut self) {
        for view in self.image_views.drain(..) {
            unsafe {
                self.device.raw().destroy_image_view(view, None);
            }
        }
    }
}

impl Presenter for VulkanPresenter {
    fn swapchain_info(&self) -> SwapchainInfo {
        SwapchainInfo {
            extent: self.extent,
            format: self.format,
            image_views: self.image_views.iter().map(|view| ImageViewHandle(view.as_raw())).collect(),
        }
    }

    fn acquire_next_image(&mut self, signal: SemaphoreHandle) -> Result<AcquireResult> {
        let result = unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                self.acquire_timeout_ns,
                semaphore_to_vk(signal),
                vk::Fence::null(),
            )
        };

        match result {
            Ok((image_index, false)) => Ok(AcquireResult { image_index, status: SwapchainStatus::Optimal }),
            Ok((image_index, true)) => {
                engine_debug!(SOURCE, "Acquired image {} from a suboptimal swapchain", image_index);
                Ok(AcquireResult { image_index, status: SwapchainStatus::Suboptimal })
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                engine_debug!(SOURCE, "Swapchain out of date during acquire");
                Ok(AcquireResult { image_index: 0, status: SwapchainStatus::OutOfDate })
            }
            Err(vk::Result::TIMEOUT) | Err(vk::Result::NOT_READY) => Err(Error::Timeout(format!(
                "no swapchain image available after {} ns",
                self.acquire_timeout_ns
            ))),
            Err(e) => Err(engine_err!(SOURCE, "Failed to acquire next swapchain image: {:?}", e)),
        }
    }

    fn record_present_transition(&self, command_buffer: CommandBufferHandle, image_index: u32) -> Result<()> {
        let Some(&image) = self.images.get(image_index as usize) else {
            engine_bail_invalid!(SOURCE,
                "record_present_transition: image_index {} out of range (count: {})",
                image_index, self.images.len());
        };

        let barrier = vk::ImageMemoryBarrier2::default()
            .src_stage_mask(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT)
            .src_access_mask(vk::AccessFlags2::COLOR_ATTACHMENT_WRITE)
            .dst_stage_mask(vk::PipelineStageFlags2::BOTTOM_OF_PIPE)
            .dst_access_mask(vk::AccessFlags2::empty())
            .old_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .new_layout(vk::ImageLayout::PRESENT_SRC_KHR)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(COLOR_SUBRESOURCE);

        let dependency_info = vk::DependencyInfo::default()
            .image_memory_barriers(std::slice::from_ref(&barrier));

        unsafe {
            self.device.raw().cmd_pipeline_barrier2(command_buffer_to_vk(command_buffer), &dependency_info);
        }

        Ok(())
    }

    fn present(&mut self, image_index: u32, wait: &[SemaphoreHandle]) -> Result<SwapchainStatus> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let wait_semaphores: Vec<vk::Semaphore> = wait.iter().map(|&semaphore| semaphore_to_vk(semaphore)).collect();

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = {
            let _queues = self.device.lock_queues();
            unsafe { self.swapchain_loader.queue_present(self.present_queue, &present_info) }
        };

        match result {
            Ok(false) => Ok(SwapchainStatus::Optimal),
            Ok(true) => {
                engine_debug!(SOURCE, "Presented image {} to a suboptimal swapchain", image_index);
                Ok(SwapchainStatus::Suboptimal)
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                engine_debug!(SOURCE, "Swapchain out of date during present");
                Ok(SwapchainStatus::OutOfDate)
            }
            Err(e) => Err(engine_err!(SOURCE, "Failed to present swapchain image: {:?}", e)),
        }
    }
}

impl Drop for VulkanPresenter {
    fn drop(&mut self) {
        self.destroy_image_views();
    }
}
