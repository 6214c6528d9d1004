//! Owner of every GPU cache
//!
//! One `RenderContext` per logical device replaces process-wide singletons:
//! render graphs and the frame driver borrow its caches, and tests build a
//! fresh context per case.

use std::sync::Arc;

use crate::command_buffer_pool::{CommandBufferPool, CommandBufferPoolConfig};
use crate::device::{FileShaderLoader, GraphicsDevice, ShaderLoader};
use crate::error::Result;
use crate::fence_manager::FenceManager;
use crate::pipeline_cache::PipelineCache;
use crate::semaphore_manager::SemaphoreManager;
use crate::settings::RenderSettings;
use crate::{engine_error, engine_info};

const SOURCE: &str = "pixelate::RenderContext";

pub struct RenderContext {
    device: Arc<dyn GraphicsDevice>,
    settings: RenderSettings,
    command_buffers: Arc<CommandBufferPool>,
    fences: Arc<FenceManager>,
    semaphores: Arc<SemaphoreManager>,
    pipelines: Arc<PipelineCache>,
}

impl RenderContext {
    /// Build empty caches over a device
    ///
    /// # Errors
    ///
    /// `InitializationFailed` if the settings are invalid.
    pub fn new(
        device: Arc<dyn GraphicsDevice>,
        shader_loader: Arc<dyn ShaderLoader>,
        settings: RenderSettings,
    ) -> Result<Self> {
        settings.validate().map_err(|e| {
            engine_error!(SOURCE, "Invalid render settings: {}", e);
            e
        })?;

        let pool_config = CommandBufferPoolConfig {
            initial_batch: settings.command_buffer_initial_batch,
            growth_factor: settings.command_buffer_growth_factor,
        };

        engine_info!(SOURCE, "Render context created ({} frames in flight)", settings.max_frames_in_flight);
        Ok(Self {
            command_buffers: Arc::new(CommandBufferPool::new(device.clone(), pool_config)),
            fences: Arc::new(FenceManager::new(device.clone())),
            semaphores: Arc::new(SemaphoreManager::new(device.clone())),
            pipelines: Arc::new(PipelineCache::new(device.clone(), shader_loader)),
            device,
            settings,
        })
    }

    /// Context whose shaders are read from `settings.shader_directory`
    pub fn with_file_shaders(device: Arc<dyn GraphicsDevice>, settings: RenderSettings) -> Result<Self> {
        let loader = Arc::new(FileShaderLoader::new(settings.shader_directory.clone()));
        Self::new(device, loader, settings)
    }

    pub fn device(&self) -> &Arc<dyn GraphicsDevice> {
        &self.device
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    pub fn max_frames_in_flight(&self) -> u32 {
        self.settings.max_frames_in_flight
    }

    pub fn command_buffers(&self) -> &Arc<CommandBufferPool> {
        &self.command_buffers
    }

    pub fn fences(&self) -> &Arc<FenceManager> {
        &self.fences
    }

    pub fn semaphores(&self) -> &Arc<SemaphoreManager> {
        &self.semaphores
    }

    pub fn pipelines(&self) -> &Arc<PipelineCache> {
        &self.pipelines
    }

    /// Wait for the device to go idle, then destroy every cached object
    ///
    /// Render graphs built on this context must be disposed first so their
    /// command buffers are back in the pool.
    pub fn dispose(&self) -> Result<()> {
        self.device.wait_idle()?;
        self.pipelines.dispose();
        self.semaphores.dispose();
        self.fences.dispose();
        self.command_buffers.dispose();
        engine_info!(SOURCE, "Render context disposed");
        Ok(())
    }
}

#[cfg(test)]
#[path = "render_context_tests.rs"]
mod tests;
