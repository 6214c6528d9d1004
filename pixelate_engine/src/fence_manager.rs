//! Fence groups with deferred completion callbacks
//!
//! A [`FenceGroup`] is a fixed array of fences sized to the unit of parallelism
//! it guards (e.g. one fence per submitted pass). Callbacks registered against
//! a fence index run on the waiting thread once that fence is observed
//! signaled, and before it is reset for reuse. This is how "GPU finished"
//! turns into CPU-side cleanup such as returning command buffers.

use std::sync::{Arc, Mutex, MutexGuard};

use rustc_hash::FxHashMap;

use crate::device::{FenceHandle, GraphicsDevice};
use crate::error::{Error, Result};
use crate::hasher::{ContentHash, Hasher};
use crate::{engine_debug, engine_error, engine_trace, engine_warn};

const SOURCE: &str = "pixelate::FenceManager";

/// Deferred CPU work bound to a fence
pub type FencedCallback = Box<dyn FnOnce() + Send>;

/// What a fence group guards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FenceIdentifier {
    SwapchainLayoutTransition = 2,
    RenderGraphQueueSubmit = 4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FenceGroupDescriptor {
    pub identifier: FenceIdentifier,
    /// Distinguishes groups sharing an identifier (typically the frame-in-flight slot)
    pub slot: u32,
    /// Number of fences
    pub size: u32,
    /// Create the fences already signaled
    pub signaled: bool,
}

impl ContentHash for FenceGroupDescriptor {
    fn content_hash(&self, hasher: &mut Hasher) {
        hasher
            .hash_u32(self.identifier as u32)
            .hash_u32(self.slot)
            .hash_u32(self.size)
            .hash_bool(self.signaled);
    }
}

/// Fence selector for callbacks and waits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FenceIndex {
    At(u32),
    /// Every fence of the group
    All,
}

// ===== FENCE GROUP =====

pub struct FenceGroup {
    device: Arc<dyn GraphicsDevice>,
    descriptor: FenceGroupDescriptor,
    fences: Vec<FenceHandle>,
    pending: Vec<bool>,
    indexed_callbacks: Vec<Vec<FencedCallback>>,
    all_callbacks: Vec<FencedCallback>,
}

impl FenceGroup {
    /// Create `descriptor.size` fences
    ///
    /// On failure every fence created so far is destroyed.
    pub fn new(device: Arc<dyn GraphicsDevice>, descriptor: FenceGroupDescriptor) -> Result<Self> {
        let mut fences = Vec::with_capacity(descriptor.size as usize);
        for _ in 0..descriptor.size {
            match device.create_fence(descriptor.signaled) {
                Ok(fence) => fences.push(fence),
                Err(e) => {
                    engine_error!(SOURCE, "Failed to create fence for {:?}: {}", descriptor, e);
                    for fence in fences {
                        device.destroy_fence(fence);
                    }
                    return Err(e);
                }
            }
        }

        let size = descriptor.size as usize;
        Ok(Self {
            device,
            descriptor,
            fences,
            pending: vec![false; size],
            indexed_callbacks: (0..size).map(|_| Vec::new()).collect(),
            all_callbacks: Vec::new(),
        })
    }

    pub fn descriptor(&self) -> &FenceGroupDescriptor {
        &self.descriptor
    }

    pub fn len(&self) -> usize {
        self.fences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fences.is_empty()
    }

    fn check_index(&self, index: u32) -> Result<usize> {
        let i = index as usize;
        if i >= self.fences.len() {
            let message = format!("Fence index {} out of range for {:?} (size {})",
                index, self.descriptor.identifier, self.fences.len());
            engine_error!(SOURCE, "{}", message);
            return Err(Error::InvalidResource(message));
        }
        Ok(i)
    }

    /// Fence handle to signal from a submission
    pub fn fence(&self, index: u32) -> Result<FenceHandle> {
        Ok(self.fences[self.check_index(index)?])
    }

    /// Register a callback to run after the selected fence(s) signal
    ///
    /// `FenceIndex::All` callbacks run only on `wait(FenceIndex::All)`.
    pub fn add_fenced_callback(&mut self, callback: FencedCallback, index: FenceIndex) -> Result<()> {
        match index {
            FenceIndex::At(i) => {
                let i = self.check_index(i)?;
                self.indexed_callbacks[i].push(callback);
            }
            FenceIndex::All => self.all_callbacks.push(callback),
        }
        Ok(())
    }

    /// Record that fence `index` was handed to a queue submission
    pub fn mark_submitted(&mut self, index: u32) -> Result<()> {
        let i = self.check_index(index)?;
        self.pending[i] = true;
        Ok(())
    }

    pub fn is_pending(&self, index: u32) -> bool {
        self.pending.get(index as usize).copied().unwrap_or(false)
    }

    pub fn any_pending(&self) -> bool {
        self.pending.iter().any(|&pending| pending)
    }

    /// Callbacks waiting on the selected index (for `All`: the broadcast list only)
    pub fn pending_callback_count(&self, index: FenceIndex) -> usize {
        match index {
            FenceIndex::At(i) => self.indexed_callbacks.get(i as usize).map_or(0, Vec::len),
            FenceIndex::All => self.all_callbacks.len(),
        }
    }

    /// Block until the selected fence(s) signal, run their callbacks, then reset them
    ///
    /// `FenceIndex::All` runs every indexed list followed by the broadcast list.
    /// Callbacks run while `self` is borrowed; for a group shared behind a
    /// mutex use [`wait_group`], which lets callbacks lock the group.
    ///
    /// # Errors
    ///
    /// `Timeout` if `timeout_ns` elapses; callbacks are kept and fences are not
    /// reset. `InvalidResource` for an out-of-range index.
    pub fn wait(&mut self, index: FenceIndex, timeout_ns: u64) -> Result<()> {
        let fences = self.selected_fences(index)?;
        if fences.is_empty() {
            return Ok(());
        }
        self.device.wait_for_fences(&fences, timeout_ns)?;

        for callback in self.take_callbacks(index) {
            callback();
        }
        self.reset(index, &fences)
    }

    fn selected_fences(&self, index: FenceIndex) -> Result<Vec<FenceHandle>> {
        match index {
            FenceIndex::At(i) => Ok(vec![self.fences[self.check_index(i)?]]),
            FenceIndex::All => Ok(self.fences.clone()),
        }
    }

    /// Detach the callbacks of a signaled selection, indexed lists first
    fn take_callbacks(&mut self, index: FenceIndex) -> Vec<FencedCallback> {
        let callbacks: Vec<FencedCallback> = match index {
            FenceIndex::At(i) => self.indexed_callbacks
                .get_mut(i as usize)
                .map(std::mem::take)
                .unwrap_or_default(),
            FenceIndex::All => {
                let mut callbacks: Vec<FencedCallback> = self.indexed_callbacks
                    .iter_mut()
                    .flat_map(std::mem::take)
                    .collect();
                callbacks.append(&mut self.all_callbacks);
                callbacks
            }
        };
        engine_trace!(SOURCE, "{:?} {:?} signaled, running {} callbacks",
            self.descriptor.identifier, index, callbacks.len());
        callbacks
    }

    fn reset(&mut self, index: FenceIndex, fences: &[FenceHandle]) -> Result<()> {
        self.device.reset_fences(fences)?;
        match index {
            FenceIndex::At(i) => {
                if let Some(pending) = self.pending.get_mut(i as usize) {
                    *pending = false;
                }
            }
            FenceIndex::All => self.pending.iter_mut().for_each(|pending| *pending = false),
        }
        Ok(())
    }

    fn destroy(&mut self) {
        let dropped = self.indexed_callbacks.iter().map(Vec::len).sum::<usize>() + self.all_callbacks.len();
        if dropped > 0 {
            engine_warn!(SOURCE, "Disposing {:?} with {} callbacks never run",
                self.descriptor.identifier, dropped);
        }
        self.indexed_callbacks.iter_mut().for_each(Vec::clear);
        self.all_callbacks.clear();
        for fence in self.fences.drain(..) {
            self.device.destroy_fence(fence);
        }
        self.pending.clear();
    }
}

/// Lock a shared group, recovering from a poisoned lock
pub fn lock_group(group: &Mutex<FenceGroup>) -> MutexGuard<'_, FenceGroup> {
    group.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// [`FenceGroup::wait`] for a shared group
///
/// The lock is released while blocking on the device and while callbacks
/// run, so a callback may lock its own group (e.g. to register work for the
/// next submission). One thread waits on a given group at a time.
pub fn wait_group(group: &Mutex<FenceGroup>, index: FenceIndex, timeout_ns: u64) -> Result<()> {
    let (device, fences) = {
        let group = lock_group(group);
        (group.device.clone(), group.selected_fences(index)?)
    };
    if fences.is_empty() {
        return Ok(());
    }
    device.wait_for_fences(&fences, timeout_ns)?;

    let callbacks = lock_group(group).take_callbacks(index);
    for callback in callbacks {
        callback();
    }
    lock_group(group).reset(index, &fences)
}

/// Wait on every fence of a shared group that was handed to a submission
///
/// A fully submitted group is waited as a whole so broadcast callbacks run;
/// after a partial submission only the submitted fences are waited.
pub fn wait_submitted(group: &Mutex<FenceGroup>, timeout_ns: u64) -> Result<()> {
    let (count, pending) = {
        let group = lock_group(group);
        let count = group.len() as u32;
        (count, (0..count).filter(|&i| group.is_pending(i)).collect::<Vec<u32>>())
    };
    if count > 0 && pending.len() == count as usize {
        return wait_group(group, FenceIndex::All, timeout_ns);
    }
    for i in pending {
        wait_group(group, FenceIndex::At(i), timeout_ns)?;
    }
    Ok(())
}

// ===== FENCE MANAGER =====

/// Hash-keyed cache of fence groups
pub struct FenceManager {
    device: Arc<dyn GraphicsDevice>,
    groups: Mutex<FxHashMap<u64, Arc<Mutex<FenceGroup>>>>,
}

impl FenceManager {
    pub fn new(device: Arc<dyn GraphicsDevice>) -> Self {
        Self {
            device,
            groups: Mutex::new(FxHashMap::default()),
        }
    }

    fn groups(&self) -> MutexGuard<'_, FxHashMap<u64, Arc<Mutex<FenceGroup>>>> {
        self.groups.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Get or create the group for a descriptor
    ///
    /// Equal descriptors return the same group. A failed creation is not cached.
    pub fn get_fence_group(&self, descriptor: FenceGroupDescriptor) -> Result<Arc<Mutex<FenceGroup>>> {
        let key = descriptor.hash_key();
        let mut groups = self.groups();
        if let Some(group) = groups.get(&key) {
            return Ok(group.clone());
        }

        let group = Arc::new(Mutex::new(FenceGroup::new(self.device.clone(), descriptor)?));
        engine_debug!(SOURCE, "Created fence group {:?}", descriptor);
        groups.insert(key, group.clone());
        Ok(group)
    }

    pub fn group_count(&self) -> usize {
        self.groups().len()
    }

    /// Destroy every fence of every group. The GPU must be idle.
    pub fn dispose(&self) {
        let drained: Vec<_> = self.groups().drain().map(|(_, group)| group).collect();
        for group in drained {
            lock_group(&group).destroy();
        }
    }
}

#[cfg(test)]
#[path = "fence_manager_tests.rs"]
mod tests;
