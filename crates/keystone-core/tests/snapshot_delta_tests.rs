// SPDX-License-Identifier: Apache-2.0
// © Emberfall Project Contributors
//! Snapshot capture contract and delta build/apply behavior.

mod common;

use common::register_buf;
use keystone_core::{SnapshotError, SnapshotManager, SystemId};

#[test]
fn delta_round_trip_single_mutated_window() {
    // A 256-byte state, one contiguous 40-byte mutation.
    let mut snapshots = SnapshotManager::new();
    let state = register_buf(&mut snapshots, 101, vec![0u8; 256]);
    let id = SystemId::from_raw(101);

    let base = snapshots.capture(id).expect("capture v1").clone();

    {
        let mut state = state.borrow_mut();
        for i in 100..140 {
            state.bytes[i] = 0xAB;
        }
        state.version = 2;
    }
    let target = snapshots.capture(id).expect("capture v2").clone();

    let delta = snapshots.build_delta(&base, &target).expect("build delta");
    assert_eq!(delta.ranges.len(), 1);
    assert_eq!(delta.ranges[0].offset, 100);
    assert_eq!(delta.ranges[0].length, 40);
    assert_eq!(delta.data.len(), 40);

    let applied = snapshots.apply_delta(&base, &delta).expect("apply delta");
    assert_eq!(applied.size(), 256);
    assert_eq!(applied.hash, target.hash);
    assert_eq!(&applied.data[..], &target.data[..]);
}

#[test]
fn delta_carries_grown_tail() {
    let mut snapshots = SnapshotManager::new();
    let state = register_buf(&mut snapshots, 7, vec![1, 2, 3, 4]);
    let id = SystemId::from_raw(7);

    let base = snapshots.capture(id).expect("capture").clone();
    {
        let mut state = state.borrow_mut();
        state.bytes = vec![1, 2, 9, 4, 5, 6];
        state.version = 2;
    }
    let target = snapshots.capture(id).expect("capture").clone();

    let delta = snapshots.build_delta(&base, &target).expect("build");
    // One interior range for byte 2, one tail range for the growth.
    assert_eq!(delta.ranges.len(), 2);
    assert_eq!(delta.ranges[1].offset, 4);
    assert_eq!(delta.ranges[1].length, 2);

    let applied = snapshots.apply_delta(&base, &delta).expect("apply");
    assert_eq!(&applied.data[..], &target.data[..]);
    assert_eq!(applied.hash, target.hash);
}

#[test]
fn delta_round_trips_a_shrunk_target() {
    let mut snapshots = SnapshotManager::new();
    let state = register_buf(&mut snapshots, 8, vec![5u8; 32]);
    let id = SystemId::from_raw(8);

    let base = snapshots.capture(id).expect("capture").clone();
    {
        let mut state = state.borrow_mut();
        state.bytes = vec![5u8; 20];
        state.bytes[3] = 0;
        state.version = 2;
    }
    let target = snapshots.capture(id).expect("capture").clone();

    let delta = snapshots.build_delta(&base, &target).expect("build");
    let applied = snapshots.apply_delta(&base, &delta).expect("apply");
    assert_eq!(applied.size(), 20);
    assert_eq!(&applied.data[..], &target.data[..]);
    assert_eq!(applied.hash, target.hash);
}

#[test]
fn identical_payloads_produce_empty_delta() {
    let mut snapshots = SnapshotManager::new();
    let state = register_buf(&mut snapshots, 9, vec![7u8; 64]);
    let id = SystemId::from_raw(9);

    let base = snapshots.capture(id).expect("capture").clone();
    state.borrow_mut().version = 2;
    let target = snapshots.capture(id).expect("capture").clone();

    let delta = snapshots.build_delta(&base, &target).expect("build");
    assert!(delta.ranges.is_empty());
    assert!(delta.data.is_empty());

    let applied = snapshots.apply_delta(&base, &delta).expect("apply");
    assert_eq!(applied.hash, target.hash);
}

#[test]
fn deltas_are_deterministic() {
    let mut snapshots = SnapshotManager::new();
    let state = register_buf(&mut snapshots, 10, vec![0u8; 128]);
    let id = SystemId::from_raw(10);

    let base = snapshots.capture(id).expect("capture").clone();
    {
        let mut state = state.borrow_mut();
        state.bytes[10] = 1;
        state.bytes[11] = 2;
        state.bytes[90] = 3;
        state.version = 2;
    }
    let target = snapshots.capture(id).expect("capture").clone();

    let first = snapshots.build_delta(&base, &target).expect("build");
    let second = snapshots.build_delta(&base, &target).expect("build");
    assert_eq!(first, second);
}

#[test]
fn apply_rejects_wrong_base_version() {
    let mut snapshots = SnapshotManager::new();
    let state = register_buf(&mut snapshots, 11, vec![0u8; 16]);
    let id = SystemId::from_raw(11);

    let v1 = snapshots.capture(id).expect("capture").clone();
    {
        let mut state = state.borrow_mut();
        state.bytes[0] = 1;
        state.version = 2;
    }
    let v2 = snapshots.capture(id).expect("capture").clone();
    {
        let mut state = state.borrow_mut();
        state.bytes[1] = 1;
        state.version = 3;
    }
    let v3 = snapshots.capture(id).expect("capture").clone();

    let delta = snapshots.build_delta(&v2, &v3).expect("build");
    let err = snapshots.apply_delta(&v1, &delta).unwrap_err();
    assert!(matches!(err, SnapshotError::MismatchedBase { .. }));
    assert_eq!(snapshots.stats().delta_apply_failures, 1);
}

#[test]
fn build_requires_forward_versions() {
    let mut snapshots = SnapshotManager::new();
    let state = register_buf(&mut snapshots, 12, vec![0u8; 8]);
    let id = SystemId::from_raw(12);

    let v1 = snapshots.capture(id).expect("capture").clone();
    {
        let mut state = state.borrow_mut();
        state.bytes[0] = 1;
        state.version = 2;
    }
    let v2 = snapshots.capture(id).expect("capture").clone();

    assert!(matches!(
        snapshots.build_delta(&v2, &v1),
        Err(SnapshotError::DeltaNotForward { base: 2, target: 1 })
    ));
    assert!(matches!(
        snapshots.build_delta(&v1, &v1),
        Err(SnapshotError::DeltaNotForward { .. })
    ));
}

#[test]
fn truncated_delta_payload_rejected() {
    let mut snapshots = SnapshotManager::new();
    let state = register_buf(&mut snapshots, 16, vec![0u8; 16]);
    let id = SystemId::from_raw(16);

    let base = snapshots.capture(id).expect("capture").clone();
    {
        let mut state = state.borrow_mut();
        state.bytes[4] = 1;
        state.bytes[5] = 1;
        state.version = 2;
    }
    let target = snapshots.capture(id).expect("capture").clone();

    let mut delta = snapshots.build_delta(&base, &target).expect("build");
    delta.data.pop();
    assert!(matches!(
        snapshots.apply_delta(&base, &delta),
        Err(SnapshotError::TruncatedDelta {
            needed: 2,
            actual: 1,
        })
    ));
}

#[test]
fn versions_are_strictly_monotonic() {
    let mut snapshots = SnapshotManager::new();
    let state = register_buf(&mut snapshots, 13, vec![1u8; 8]);
    let id = SystemId::from_raw(13);

    snapshots.capture(id).expect("capture v1");
    // Same version offered again: rejected, stored snapshot untouched.
    state.borrow_mut().bytes = vec![2u8; 8];
    assert!(matches!(
        snapshots.capture(id),
        Err(SnapshotError::StaleVersion {
            offered: 1,
            stored: 1,
            ..
        })
    ));
    let stored = snapshots.get(id).expect("snapshot");
    assert_eq!(&stored.data[..], &[1u8; 8]);

    // Lower version: also rejected.
    state.borrow_mut().version = 0;
    assert!(matches!(
        snapshots.capture(id),
        Err(SnapshotError::StaleVersion { .. })
    ));

    // Advancing version: accepted.
    state.borrow_mut().version = 5;
    let snap = snapshots.capture(id).expect("capture v5");
    assert_eq!(snap.version, 5);
}

#[test]
fn rehash_matches_stored_hash() {
    let mut snapshots = SnapshotManager::new();
    register_buf(&mut snapshots, 14, b"emberfall".to_vec());
    let id = SystemId::from_raw(14);
    let snap = snapshots.capture(id).expect("capture").clone();
    assert_eq!(SnapshotManager::rehash(&snap), snap.hash);
    assert_eq!(snap.hash, keystone_hash::fnv1a64(b"emberfall"));
}

#[test]
fn reset_drops_snapshot_but_keeps_registration() {
    let mut snapshots = SnapshotManager::new();
    let state = register_buf(&mut snapshots, 15, vec![3u8; 4]);
    let id = SystemId::from_raw(15);

    snapshots.capture(id).expect("capture");
    assert!(snapshots.get(id).is_some());
    snapshots.reset(id).expect("reset");
    assert!(snapshots.get(id).is_none());

    // Re-capture works from scratch; version 1 is acceptable again.
    state.borrow_mut().version = 1;
    snapshots.capture(id).expect("capture after reset");
}
