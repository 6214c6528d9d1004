/*!
# Pixelate Engine

GPU resource pooling and frame synchronization for an explicit graphics API.

The crate is backend-agnostic: every GPU call goes through the
[`GraphicsDevice`](pixelate::device::GraphicsDevice) trait, implemented by a
backend crate (Vulkan via `pixelate_renderer_vulkan`).

## Architecture

- **Hasher**: FNV-1a content hashing used as the key of every cache
- **CommandBufferPool**: per-thread pools of reusable command buffers
- **FenceManager**: fence groups with deferred completion callbacks
- **SemaphoreManager**: persistent semaphores keyed by identifier and index
- **PipelineCache**: compiled graphics pipelines keyed by their descriptor
- **RenderGraph**: declarative passes recorded and submitted every frame
- **RenderContext**: owner of all caches for one device
- **FrameDriver**: wait, acquire, submit and present loop
*/

// Internal modules
mod error;
mod engine;
pub mod log;
pub mod hasher;
pub mod thread_safe_queue;
pub mod settings;
pub mod device;
pub mod command_buffer_pool;
pub mod fence_manager;
pub mod semaphore_manager;
pub mod pipeline_cache;
pub mod render_graph;
pub mod render_context;
pub mod frame_driver;

// Main pixelate namespace module
pub mod pixelate {
    // Error types
    pub use crate::error::{Error, Result};

    // Global logger access
    pub use crate::engine::Engine;

    pub use crate::hasher::{ContentHash, Hasher};
    pub use crate::thread_safe_queue::ThreadSafeFifoQueue;
    pub use crate::settings::{RenderSettings, MAX_FRAMES_IN_FLIGHT};

    pub use crate::command_buffer_pool::{
        CommandBufferDescriptor, CommandBufferPool, CommandBufferPoolConfig, PooledCommandBuffer,
    };
    pub use crate::fence_manager::{
        lock_group, wait_group, wait_submitted, FenceGroup, FenceGroupDescriptor, FenceIdentifier, FenceIndex,
        FenceManager, FencedCallback,
    };
    pub use crate::semaphore_manager::{
        submit_infos, Semaphore, SemaphoreDescriptor, SemaphoreIdentifier, SemaphoreManager,
    };
    pub use crate::pipeline_cache::{
        CachedPipeline, ColorTarget, GraphicsPipelineDescriptor, PipelineCache, RenderTargetLayout, ShaderRef,
    };
    pub use crate::render_context::RenderContext;
    pub use crate::frame_driver::{FrameDriver, FrameStatus};

    // Logging sub-module (types only; the engine_* macros live at the crate root)
    pub mod log {
        pub use crate::log::{Logger, LogEntry, LogSeverity, DefaultLogger};
    }

    // GPU seam: handles, descriptors, device/presenter/shader loader traits
    pub mod device {
        pub use crate::device::*;
    }

    // Declarative passes and the compiled graph
    pub mod render_graph {
        pub use crate::render_graph::*;
    }
}
