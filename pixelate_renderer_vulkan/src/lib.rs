/*!
# Pixelate - Vulkan Backend

Vulkan implementation of the Pixelate engine's device and presentation seams.

`VulkanDevice` implements `GraphicsDevice` over an `ash::Device` created by the
application (Vulkan 1.3, dynamic rendering and synchronization2 enabled).
`VulkanPresenter` implements `Presenter` over an existing `VkSwapchainKHR`.

# Example

```no_run
use std::sync::Arc;
use pixelate_engine::pixelate::{RenderContext, RenderSettings, FrameDriver};
use pixelate_engine::pixelate::device::QueueFamilyIndices;
use pixelate_renderer_vulkan::pixelate::{VulkanDevice, VulkanPresenter};

# fn run(device: ash::Device, loader: ash::khr::swapchain::Device,
#        swapchain: ash::vk::SwapchainKHR, format: ash::vk::Format, extent: ash::vk::Extent2D)
#        -> pixelate_engine::pixelate::Result<()> {
let families = QueueFamilyIndices { graphics: Some(0), compute: None, present: Some(0) };
let device = Arc::new(VulkanDevice::new(device, families)?);
let presenter = VulkanPresenter::new(device.clone(), loader, swapchain, format, extent)?;
let context = RenderContext::with_file_shaders(device, RenderSettings::default())?;
let driver = FrameDriver::new(&context);
# Ok(())
# }
```
*/

mod vulkan_format;
mod vulkan_device;
mod vulkan_presenter;

pub mod pixelate {
    pub use crate::vulkan_device::VulkanDevice;
    pub use crate::vulkan_presenter::VulkanPresenter;
}
