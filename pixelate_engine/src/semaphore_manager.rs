//! Persistent semaphores keyed by (identifier, index)
//!
//! The index is usually a frame-in-flight slot or a swapchain image index.
//! Semaphores are binary and never reset here: each cached semaphore must be
//! signaled once and waited once per cycle before it is signaled again.

use std::sync::{Arc, Mutex, MutexGuard};

use rustc_hash::FxHashMap;

use crate::device::{GraphicsDevice, PipelineStageFlags, SemaphoreHandle, SemaphoreSubmitInfo};
use crate::error::Result;
use crate::hasher::{ContentHash, Hasher};
use crate::{engine_debug, engine_error};

const SOURCE: &str = "pixelate::SemaphoreManager";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SemaphoreIdentifier {
    SwapchainImageAcquired = 1,
    SwapchainImageTransitionToPresent = 2,
    SwapchainImageReadyToPresent = 4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SemaphoreDescriptor {
    pub identifier: SemaphoreIdentifier,
    pub index: u32,
}

impl ContentHash for SemaphoreDescriptor {
    fn content_hash(&self, hasher: &mut Hasher) {
        hasher.hash_u32(self.identifier as u32).hash_u32(self.index);
    }
}

/// Semaphore handle with the stage mask it is waited or signaled at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Semaphore {
    pub handle: SemaphoreHandle,
    pub stage_mask: PipelineStageFlags,
}

impl Semaphore {
    /// Projection used in queue submissions
    pub fn submit_info(&self) -> SemaphoreSubmitInfo {
        SemaphoreSubmitInfo {
            semaphore: self.handle,
            stage_mask: self.stage_mask,
            value: 0,
            device_index: 0,
        }
    }
}

/// Submit infos for a list of semaphores, in order
pub fn submit_infos(semaphores: &[Semaphore]) -> Vec<SemaphoreSubmitInfo> {
    semaphores.iter().map(Semaphore::submit_info).collect()
}

/// Hash-keyed cache of semaphores
pub struct SemaphoreManager {
    device: Arc<dyn GraphicsDevice>,
    semaphores: Mutex<FxHashMap<u64, Semaphore>>,
}

impl SemaphoreManager {
    pub fn new(device: Arc<dyn GraphicsDevice>) -> Self {
        Self {
            device,
            semaphores: Mutex::new(FxHashMap::default()),
        }
    }

    fn semaphores(&self) -> MutexGuard<'_, FxHashMap<u64, Semaphore>> {
        self.semaphores.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Get or create the semaphore for a descriptor
    ///
    /// The stage mask is fixed by the first request for a key; later requests
    /// get the cached value regardless of the mask they pass.
    pub fn get_semaphore(&self, stage_mask: PipelineStageFlags, descriptor: SemaphoreDescriptor) -> Result<Semaphore> {
        let key = descriptor.hash_key();
        let mut semaphores = self.semaphores();
        if let Some(semaphore) = semaphores.get(&key) {
            return Ok(*semaphore);
        }

        let handle = self.device.create_semaphore().map_err(|e| {
            engine_error!(SOURCE, "Failed to create semaphore {:?}: {}", descriptor, e);
            e
        })?;
        let semaphore = Semaphore { handle, stage_mask };
        semaphores.insert(key, semaphore);
        engine_debug!(SOURCE, "Created semaphore {:?} for {:?}", handle, descriptor);
        Ok(semaphore)
    }

    pub fn semaphore_count(&self) -> usize {
        self.semaphores().len()
    }

    /// Destroy every semaphore. The GPU must be idle.
    pub fn dispose(&self) {
        let drained: Vec<Semaphore> = self.semaphores().drain().map(|(_, semaphore)| semaphore).collect();
        for semaphore in drained {
            self.device.destroy_semaphore(semaphore.handle);
        }
    }
}

#[cfg(test)]
#[path = "semaphore_manager_tests.rs"]
mod tests;
