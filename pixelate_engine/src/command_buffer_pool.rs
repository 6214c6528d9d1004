//! Per-thread pools of reusable command buffers
//!
//! Pools are keyed by (queue type, level, performance profile, calling thread).
//! Command pools are not safe for concurrent recording or reset, so each
//! thread gets its own. Idle buffers wait in a [`ThreadSafeFifoQueue`] so a
//! buffer can be returned from any thread (typically a fence callback).

use std::hash::BuildHasher;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, ThreadId};

use rustc_hash::{FxBuildHasher, FxHashMap};

use crate::device::{
    CommandBufferHandle, CommandBufferLevel, CommandPoolFlags, CommandPoolHandle,
    GraphicsDevice, PerformanceProfile, QueueType,
};
use crate::error::{Error, Result};
use crate::hasher::{ContentHash, Hasher};
use crate::thread_safe_queue::ThreadSafeFifoQueue;
use crate::{engine_debug, engine_error, engine_trace, engine_warn};

const SOURCE: &str = "pixelate::CommandBufferPool";

// ===== DESCRIPTOR =====

/// What kind of command buffer to hand out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandBufferDescriptor {
    pub queue_type: QueueType,
    pub level: CommandBufferLevel,
    pub performance_profile: PerformanceProfile,
}

impl Default for CommandBufferDescriptor {
    fn default() -> Self {
        Self {
            queue_type: QueueType::Graphics,
            level: CommandBufferLevel::Primary,
            performance_profile: PerformanceProfile::Default,
        }
    }
}

impl CommandBufferDescriptor {
    pub fn with_profile(performance_profile: PerformanceProfile) -> Self {
        Self { performance_profile, ..Self::default() }
    }

    /// Pool key of this descriptor for the given thread
    pub fn pool_key(&self, thread_id: ThreadId) -> u64 {
        let mut hasher = Hasher::new();
        self.content_hash(&mut hasher);
        hasher.hash_u64(FxBuildHasher.hash_one(thread_id));
        hasher.value()
    }
}

impl ContentHash for CommandBufferDescriptor {
    fn content_hash(&self, hasher: &mut Hasher) {
        hasher
            .hash_u8(self.queue_type as u8)
            .hash_u8(self.level as u8)
            .hash_u8(self.performance_profile as u8);
    }
}

// ===== CONFIG =====

/// Batch allocation policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandBufferPoolConfig {
    pub initial_batch: u32,
    pub growth_factor: u32,
}

impl Default for CommandBufferPoolConfig {
    fn default() -> Self {
        Self { initial_batch: 8, growth_factor: 2 }
    }
}

// ===== CHECKED-OUT BUFFER =====

/// A command buffer exclusively owned by its holder until handed back with
/// [`CommandBufferPool::return_buffer`]
///
/// Deliberately neither `Clone` nor `Copy`.
#[derive(Debug, PartialEq, Eq)]
pub struct PooledCommandBuffer {
    handle: CommandBufferHandle,
    descriptor: CommandBufferDescriptor,
    key: u64,
}

impl PooledCommandBuffer {
    pub fn handle(&self) -> CommandBufferHandle {
        self.handle
    }

    pub fn descriptor(&self) -> &CommandBufferDescriptor {
        &self.descriptor
    }
}

// ===== POOL =====

struct GrowthState {
    next_batch: u32,
    allocated: u32,
}

struct PoolEntry {
    command_pool: CommandPoolHandle,
    level: CommandBufferLevel,
    idle: ThreadSafeFifoQueue<CommandBufferHandle>,
    growth: Mutex<GrowthState>,
}

impl PoolEntry {
    fn growth(&self) -> MutexGuard<'_, GrowthState> {
        self.growth.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Hash-keyed cache of command pools and their idle command buffers
pub struct CommandBufferPool {
    device: Arc<dyn GraphicsDevice>,
    config: CommandBufferPoolConfig,
    entries: Mutex<FxHashMap<u64, Arc<PoolEntry>>>,
}

impl CommandBufferPool {
    pub fn new(device: Arc<dyn GraphicsDevice>, config: CommandBufferPoolConfig) -> Self {
        Self {
            device,
            config,
            entries: Mutex::new(FxHashMap::default()),
        }
    }

    fn entries(&self) -> MutexGuard<'_, FxHashMap<u64, Arc<PoolEntry>>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Find or create the pool entry for a key
    ///
    /// The map lock is held across command pool creation so concurrent misses
    /// on one key create a single pool.
    fn entry_for(&self, key: u64, descriptor: &CommandBufferDescriptor) -> Result<Arc<PoolEntry>> {
        let mut entries = self.entries();
        if let Some(entry) = entries.get(&key) {
            return Ok(entry.clone());
        }

        let Some(queue_family) = self.device.queue_family_indices().for_queue(descriptor.queue_type) else {
            let message = format!("No queue family for {:?} command buffers", descriptor.queue_type);
            engine_error!(SOURCE, "{}", message);
            return Err(Error::InvalidResource(message));
        };

        let command_pool = self.device.create_command_pool(
            queue_family,
            CommandPoolFlags::TRANSIENT | CommandPoolFlags::RESET_COMMAND_BUFFER,
        )?;
        engine_debug!(SOURCE, "Created command pool {:?} (family {}) for {:?}",
            command_pool, queue_family, descriptor);

        let entry = Arc::new(PoolEntry {
            command_pool,
            level: descriptor.level,
            idle: ThreadSafeFifoQueue::new(),
            growth: Mutex::new(GrowthState {
                next_batch: self.config.initial_batch.max(1),
                allocated: 0,
            }),
        });
        entries.insert(key, entry.clone());
        Ok(entry)
    }

    fn existing_entry(&self, descriptor: &CommandBufferDescriptor) -> Option<Arc<PoolEntry>> {
        let key = descriptor.pool_key(thread::current().id());
        self.entries().get(&key).cloned()
    }

    /// Check out a command buffer for the calling thread
    ///
    /// Pops an idle buffer if one is queued; otherwise allocates the next batch
    /// (initial batch, then growing geometrically), keeps one and queues the rest.
    ///
    /// # Errors
    ///
    /// `InvalidResource` if the device has no queue family for the descriptor's
    /// queue type; backend errors from pool creation or allocation.
    pub fn get(&self, descriptor: &CommandBufferDescriptor) -> Result<PooledCommandBuffer> {
        let key = descriptor.pool_key(thread::current().id());
        let entry = self.entry_for(key, descriptor)?;

        let handle = match entry.idle.try_pop() {
            Some(handle) => handle,
            None => self.allocate_batch(&entry)?,
        };

        Ok(PooledCommandBuffer {
            handle,
            descriptor: *descriptor,
            key,
        })
    }

    fn allocate_batch(&self, entry: &PoolEntry) -> Result<CommandBufferHandle> {
        let mut growth = entry.growth();

        // A buffer may have been returned while waiting for the growth lock
        if let Some(handle) = entry.idle.try_pop() {
            return Ok(handle);
        }

        let batch = growth.next_batch;
        let mut buffers = self
            .device
            .allocate_command_buffers(entry.command_pool, entry.level, batch)?;

        let Some(handle) = buffers.pop() else {
            let message = format!("Command buffer allocation of {} returned no buffers", batch);
            engine_error!(SOURCE, "{}", message);
            return Err(Error::BackendError(message));
        };

        growth.allocated += buffers.len() as u32 + 1;
        growth.next_batch = batch.saturating_mul(self.config.growth_factor.max(1));
        engine_debug!(SOURCE, "Allocated batch of {} command buffers from {:?} (total {})",
            batch, entry.command_pool, growth.allocated);

        entry.idle.push_range(buffers);
        Ok(handle)
    }

    /// Reset a checked-out buffer and queue it on the pool it came from
    ///
    /// PersistentResources buffers release their backing memory on reset.
    pub fn return_buffer(&self, buffer: PooledCommandBuffer) -> Result<()> {
        let entry = self.entries().get(&buffer.key).cloned();
        let Some(entry) = entry else {
            let message = format!("Command buffer {:?} returned to an unknown or disposed pool", buffer.handle);
            engine_error!(SOURCE, "{}", message);
            return Err(Error::InvalidResource(message));
        };

        let release = buffer.descriptor.performance_profile == PerformanceProfile::PersistentResources;
        self.device.reset_command_buffer(buffer.handle, release)?;
        engine_trace!(SOURCE, "Returned command buffer {:?}", buffer.handle);

        entry.idle.push(buffer.handle);
        Ok(())
    }

    /// Buffers allocated so far for this descriptor on the calling thread
    pub fn allocated_count(&self, descriptor: &CommandBufferDescriptor) -> u32 {
        self.existing_entry(descriptor)
            .map(|entry| entry.growth().allocated)
            .unwrap_or(0)
    }

    /// Idle buffers queued for this descriptor on the calling thread
    pub fn idle_count(&self, descriptor: &CommandBufferDescriptor) -> usize {
        self.existing_entry(descriptor)
            .map(|entry| entry.idle.len())
            .unwrap_or(0)
    }

    /// Number of command pools (one per key)
    pub fn pool_count(&self) -> usize {
        self.entries().len()
    }

    /// Destroy every command pool, freeing all buffers allocated from them
    ///
    /// The GPU must be idle. Buffers still checked out become invalid.
    pub fn dispose(&self) {
        let drained: Vec<Arc<PoolEntry>> = self.entries().drain().map(|(_, entry)| entry).collect();
        for entry in drained {
            let outstanding = entry.growth().allocated as usize - entry.idle.len();
            if outstanding > 0 {
                engine_warn!(SOURCE, "Destroying command pool {:?} with {} buffers still checked out",
                    entry.command_pool, outstanding);
            }
            self.device.destroy_command_pool(entry.command_pool);
        }
    }
}

#[cfg(test)]
#[path = "command_buffer_pool_tests.rs"]
mod tests;
