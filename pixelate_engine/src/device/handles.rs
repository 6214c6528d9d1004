/// Opaque GPU object handles
///
/// Backends map these to their native handles (for Vulkan, `vk::Handle::as_raw`).
/// Zero is reserved for "no object".

macro_rules! define_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
        pub struct $name(pub u64);

        impl $name {
            pub const NULL: Self = Self(0);

            pub fn is_null(self) -> bool {
                self.0 == 0
            }

            pub fn raw(self) -> u64 {
                self.0
            }
        }
    };
}

define_handle!(
    /// Command pool bound to one queue family
    CommandPoolHandle
);
define_handle!(CommandBufferHandle);
define_handle!(
    /// GPU to CPU completion signal
    FenceHandle
);
define_handle!(
    /// GPU-side ordering primitive
    SemaphoreHandle
);
define_handle!(ShaderModuleHandle);
define_handle!(DescriptorSetLayoutHandle);
define_handle!(PipelineLayoutHandle);
define_handle!(PipelineHandle);
define_handle!(
    /// Attachment view (swapchain image view or offscreen target)
    ImageViewHandle
);
