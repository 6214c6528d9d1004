//! Unit tests for fence_manager.rs

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use crate::device::mock_graphics_device::MockGraphicsDevice;
use crate::device::{GraphicsDevice, QueueType, SubmitInfo};
use crate::error::Error;
use crate::fence_manager::*;

fn descriptor(size: u32) -> FenceGroupDescriptor {
    FenceGroupDescriptor {
        identifier: FenceIdentifier::RenderGraphQueueSubmit,
        slot: 0,
        size,
        signaled: false,
    }
}

fn setup(size: u32) -> (Arc<MockGraphicsDevice>, FenceGroup) {
    let device = Arc::new(MockGraphicsDevice::new());
    let group = FenceGroup::new(device.clone() as Arc<dyn GraphicsDevice>, descriptor(size)).unwrap();
    (device, group)
}

/// Submit an empty batch signaling the group's fence `index`
fn submit(device: &MockGraphicsDevice, group: &mut FenceGroup, index: u32) {
    device
        .queue_submit(QueueType::Graphics, &SubmitInfo::default(), Some(group.fence(index).unwrap()))
        .unwrap();
    group.mark_submitted(index).unwrap();
}

// ============================================================================
// GROUP CONSTRUCTION
// ============================================================================

#[test]
fn test_group_creates_size_fences() {
    let (device, group) = setup(3);
    assert_eq!(group.len(), 3);
    assert_eq!(device.state().live_fence_count(), 3);
    assert_eq!(group.descriptor().size, 3);
}

#[test]
fn test_signaled_flag_is_forwarded() {
    let device = Arc::new(MockGraphicsDevice::new());
    let group = FenceGroup::new(
        device.clone() as Arc<dyn GraphicsDevice>,
        FenceGroupDescriptor { signaled: true, ..descriptor(1) },
    )
    .unwrap();
    assert!(device.is_fence_signaled(group.fence(0).unwrap()));
}

#[test]
fn test_fence_index_out_of_range() {
    let (_device, mut group) = setup(2);
    assert!(matches!(group.fence(2), Err(Error::InvalidResource(_))));
    assert!(matches!(group.wait(FenceIndex::At(5), 0), Err(Error::InvalidResource(_))));
    assert!(matches!(
        group.add_fenced_callback(Box::new(|| {}), FenceIndex::At(2)),
        Err(Error::InvalidResource(_))
    ));
}

// ============================================================================
// CALLBACK ORDERING
// ============================================================================

#[test]
fn test_callback_runs_after_signal_and_before_reset() {
    let (device, mut group) = setup(2);
    let fence = group.fence(1).unwrap();
    let observed = Arc::new(Mutex::new(None));

    {
        let device = device.clone();
        let observed = observed.clone();
        group
            .add_fenced_callback(
                Box::new(move || {
                    *observed.lock().unwrap() = Some(device.is_fence_signaled(fence));
                }),
                FenceIndex::At(1),
            )
            .unwrap();
    }
    submit(&device, &mut group, 1);
    group.wait(FenceIndex::At(1), u64::MAX).unwrap();

    // Signaled while the callback ran, reset afterwards
    assert_eq!(*observed.lock().unwrap(), Some(true));
    assert!(!device.is_fence_signaled(fence));
    assert_eq!(device.state().fence_resets.last().unwrap(), &vec![fence]);
}

#[test]
fn test_callback_runs_exactly_once() {
    let (device, mut group) = setup(1);
    let count = Arc::new(AtomicU32::new(0));
    let counter = count.clone();
    group
        .add_fenced_callback(Box::new(move || { counter.fetch_add(1, Ordering::SeqCst); }), FenceIndex::At(0))
        .unwrap();

    submit(&device, &mut group, 0);
    group.wait(FenceIndex::At(0), u64::MAX).unwrap();
    submit(&device, &mut group, 0);
    group.wait(FenceIndex::At(0), u64::MAX).unwrap();

    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert_eq!(group.pending_callback_count(FenceIndex::At(0)), 0);
}

#[test]
fn test_wait_index_runs_only_that_index() {
    let (device, mut group) = setup(2);
    let log = Arc::new(Mutex::new(Vec::new()));
    for index in [0u32, 1] {
        let log = log.clone();
        group
            .add_fenced_callback(Box::new(move || log.lock().unwrap().push(index)), FenceIndex::At(index))
            .unwrap();
    }
    {
        let log = log.clone();
        group.add_fenced_callback(Box::new(move || log.lock().unwrap().push(99)), FenceIndex::All).unwrap();
    }

    submit(&device, &mut group, 0);
    group.wait(FenceIndex::At(0), u64::MAX).unwrap();

    assert_eq!(*log.lock().unwrap(), vec![0]);
    assert_eq!(group.pending_callback_count(FenceIndex::At(1)), 1);
    assert_eq!(group.pending_callback_count(FenceIndex::All), 1);
}

#[test]
fn test_wait_all_runs_indexed_then_broadcast_callbacks() {
    let (device, mut group) = setup(2);
    let log = Arc::new(Mutex::new(Vec::new()));
    for (index, tag) in [(FenceIndex::All, 99u32), (FenceIndex::At(1), 1), (FenceIndex::At(0), 0)] {
        let log = log.clone();
        group.add_fenced_callback(Box::new(move || log.lock().unwrap().push(tag)), index).unwrap();
    }

    submit(&device, &mut group, 0);
    submit(&device, &mut group, 1);
    group.wait(FenceIndex::All, u64::MAX).unwrap();

    assert_eq!(*log.lock().unwrap(), vec![0, 1, 99]);
    assert!(!group.any_pending());
    assert_eq!(device.state().fence_resets.last().unwrap().len(), 2);
}

#[test]
fn test_callbacks_for_same_index_run_in_registration_order() {
    let (device, mut group) = setup(1);
    let log = Arc::new(Mutex::new(Vec::new()));
    for tag in 0..4u32 {
        let log = log.clone();
        group.add_fenced_callback(Box::new(move || log.lock().unwrap().push(tag)), FenceIndex::At(0)).unwrap();
    }

    submit(&device, &mut group, 0);
    group.wait(FenceIndex::At(0), u64::MAX).unwrap();

    assert_eq!(*log.lock().unwrap(), vec![0, 1, 2, 3]);
}

// ============================================================================
// TIMEOUT / PENDING
// ============================================================================

#[test]
fn test_timeout_keeps_callbacks_and_fence_state() {
    let (device, mut group) = setup(1);
    device.state().hold_fences = true;
    let ran = Arc::new(AtomicU32::new(0));
    let flag = ran.clone();
    group
        .add_fenced_callback(Box::new(move || { flag.fetch_add(1, Ordering::SeqCst); }), FenceIndex::At(0))
        .unwrap();
    submit(&device, &mut group, 0);

    let result = group.wait(FenceIndex::At(0), 1_000);

    assert!(matches!(result, Err(Error::Timeout(_))));
    assert_eq!(ran.load(Ordering::SeqCst), 0);
    assert!(group.is_pending(0));
    assert!(device.state().fence_resets.is_empty());

    // GPU catches up
    device.signal_fence(group.fence(0).unwrap());
    group.wait(FenceIndex::At(0), 1_000).unwrap();
    assert_eq!(ran.load(Ordering::SeqCst), 1);
    assert!(!group.is_pending(0));
}

#[test]
fn test_pending_tracking() {
    let (device, mut group) = setup(3);
    assert!(!group.any_pending());

    submit(&device, &mut group, 2);

    assert!(group.is_pending(2));
    assert!(!group.is_pending(0));
    assert!(!group.is_pending(10));
    assert!(group.any_pending());
}

// ============================================================================
// SHARED GROUPS
// ============================================================================

fn shared(size: u32) -> (Arc<MockGraphicsDevice>, Arc<Mutex<FenceGroup>>) {
    let (device, group) = setup(size);
    (device, Arc::new(Mutex::new(group)))
}

#[test]
fn test_callback_can_lock_its_own_group() {
    let (device, group) = shared(1);
    let count = Arc::new(AtomicU32::new(0));

    {
        let same_group = group.clone();
        let counter = count.clone();
        let mut locked = lock_group(&group);
        locked
            .add_fenced_callback(
                Box::new(move || {
                    // Re-arm for the next submission of the same fence
                    lock_group(&same_group)
                        .add_fenced_callback(
                            Box::new(move || {
                                counter.fetch_add(1, Ordering::SeqCst);
                            }),
                            FenceIndex::At(0),
                        )
                        .unwrap();
                }),
                FenceIndex::At(0),
            )
            .unwrap();
        submit(&device, &mut locked, 0);
    }

    wait_group(&group, FenceIndex::At(0), u64::MAX).unwrap();
    assert!(!lock_group(&group).is_pending(0));
    assert_eq!(lock_group(&group).pending_callback_count(FenceIndex::At(0)), 1);
    assert_eq!(count.load(Ordering::SeqCst), 0);

    submit(&device, &mut lock_group(&group), 0);
    wait_group(&group, FenceIndex::At(0), u64::MAX).unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[test]
fn test_shared_wait_timeout_keeps_callbacks() {
    let (device, group) = shared(1);
    device.state().hold_fences = true;
    lock_group(&group).add_fenced_callback(Box::new(|| {}), FenceIndex::All).unwrap();
    submit(&device, &mut lock_group(&group), 0);

    let result = wait_group(&group, FenceIndex::All, 0);

    assert!(matches!(result, Err(Error::Timeout(_))));
    assert!(lock_group(&group).is_pending(0));
    assert_eq!(lock_group(&group).pending_callback_count(FenceIndex::All), 1);
    assert!(device.state().fence_resets.is_empty());
}

#[test]
fn test_wait_submitted_waits_only_pending_fences() {
    let (device, group) = shared(3);
    let fence = lock_group(&group).fence(1).unwrap();
    submit(&device, &mut lock_group(&group), 1);

    wait_submitted(&group, u64::MAX).unwrap();

    assert_eq!(device.state().fence_waits, vec![vec![fence]]);
    assert!(!lock_group(&group).any_pending());

    // Nothing pending: no device wait at all
    wait_submitted(&group, u64::MAX).unwrap();
    assert_eq!(device.state().fence_waits.len(), 1);
}

#[test]
fn test_wait_submitted_full_group_runs_broadcast_callbacks() {
    let (device, group) = shared(2);
    let ran = Arc::new(AtomicU32::new(0));
    let counter = ran.clone();
    lock_group(&group)
        .add_fenced_callback(Box::new(move || { counter.fetch_add(1, Ordering::SeqCst); }), FenceIndex::All)
        .unwrap();
    submit(&device, &mut lock_group(&group), 0);
    submit(&device, &mut lock_group(&group), 1);

    wait_submitted(&group, u64::MAX).unwrap();

    assert_eq!(ran.load(Ordering::SeqCst), 1);
    assert_eq!(device.state().fence_waits.len(), 1);
    assert_eq!(device.state().fence_waits[0].len(), 2);
}

// ============================================================================
// MANAGER
// ============================================================================

#[test]
fn test_manager_returns_same_group_for_equal_descriptors() {
    let device = Arc::new(MockGraphicsDevice::new());
    let manager = FenceManager::new(device.clone() as Arc<dyn GraphicsDevice>);

    let a = manager.get_fence_group(descriptor(2)).unwrap();
    let b = manager.get_fence_group(descriptor(2)).unwrap();

    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(manager.group_count(), 1);
    assert_eq!(device.state().live_fence_count(), 2);
}

#[test]
fn test_manager_separates_slots_and_identifiers() {
    let device = Arc::new(MockGraphicsDevice::new());
    let manager = FenceManager::new(device.clone() as Arc<dyn GraphicsDevice>);

    let slot0 = manager.get_fence_group(descriptor(2)).unwrap();
    let slot1 = manager.get_fence_group(FenceGroupDescriptor { slot: 1, ..descriptor(2) }).unwrap();
    let other = manager
        .get_fence_group(FenceGroupDescriptor { identifier: FenceIdentifier::SwapchainLayoutTransition, ..descriptor(2) })
        .unwrap();

    assert!(!Arc::ptr_eq(&slot0, &slot1));
    assert!(!Arc::ptr_eq(&slot0, &other));
    assert_eq!(manager.group_count(), 3);
}

#[test]
fn test_failed_creation_is_not_cached() {
    let device = Arc::new(MockGraphicsDevice::new());
    let manager = FenceManager::new(device.clone() as Arc<dyn GraphicsDevice>);
    device.state().fail_fence_creation = true;

    assert!(manager.get_fence_group(descriptor(2)).is_err());
    assert_eq!(manager.group_count(), 0);

    device.state().fail_fence_creation = false;
    assert!(manager.get_fence_group(descriptor(2)).is_ok());
    assert_eq!(manager.group_count(), 1);
}

#[test]
fn test_dispose_destroys_all_fences() {
    let device = Arc::new(MockGraphicsDevice::new());
    let manager = FenceManager::new(device.clone() as Arc<dyn GraphicsDevice>);
    manager.get_fence_group(descriptor(2)).unwrap();
    manager.get_fence_group(FenceGroupDescriptor { slot: 1, ..descriptor(3) }).unwrap();

    manager.dispose();

    assert_eq!(device.state().live_fence_count(), 0);
    assert_eq!(device.state().destroyed_fences.len(), 5);
    assert_eq!(manager.group_count(), 0);
}
