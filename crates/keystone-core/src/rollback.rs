// SPDX-License-Identifier: Apache-2.0
// © Emberfall Project Contributors

//! Per-system rollback rings with step-back, partial rewind, and auto-rollback.
//!
//! Each configured system gets a bounded ring of past snapshot copies. The
//! ring keeps its own payload copies: the snapshot manager is free to
//! overwrite its current slot without disturbing history. Entries are ordered
//! newest-first relative to `head` — step 0 is the most recent capture, step
//! `count - 1` the oldest retained one.
//!
//! Auto-rollback is the transaction abort hook: a participant can be mapped
//! to a system, and aborting a transaction re-applies that system's most
//! recent captured snapshot, recording an `auto_triggered` event.

use bytes::Bytes;
use rustc_hash::FxHashMap;
use thiserror::Error;
use tracing::{debug, warn};

use crate::clock::{Clock, ZeroClock};
use crate::ident::{ParticipantId, SystemId};
use crate::ring::BoundedLog;
use crate::snapshot::{Snapshot, SnapshotError, SnapshotManager};

/// Errors surfaced by the rollback manager.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RollbackError {
    /// Requested ring capacity is outside `1..=16`.
    #[error("ring capacity {0} outside 1..={max}", max = RollbackManager::MAX_RING_CAPACITY)]
    InvalidCapacity(usize),
    /// The system has no configured ring.
    #[error("system {0} has no rollback ring")]
    NotConfigured(SystemId),
    /// Fewer captures are retained than the requested step.
    #[error("system {system} has {available} entries, cannot step back {steps}")]
    NotEnoughHistory {
        /// System whose ring was consulted.
        system: SystemId,
        /// Requested step count.
        steps: u32,
        /// Entries currently retained.
        available: usize,
    },
    /// The participant has no mapped system.
    #[error("participant {0} is not mapped to a system")]
    UnmappedParticipant(ParticipantId),
    /// The underlying snapshot operation failed.
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

/// One rollback event.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RollbackEvent {
    /// Monotonic sequence number (starts at 1).
    pub seq: u64,
    /// System that was rewound.
    pub system_id: SystemId,
    /// Version installed before the restore, if a snapshot was present.
    pub version_before: Option<u32>,
    /// Version restored from the ring.
    pub version_after: u32,
    /// `true` when fired from the transaction abort path.
    pub auto_triggered: bool,
    /// Participant that triggered an auto rollback, if any.
    pub participant: Option<ParticipantId>,
    /// Clock reading at restore time.
    pub timestamp_ms: u64,
}

/// Counters kept by the rollback manager.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RollbackStats {
    /// Ring captures performed.
    pub checkpoints_captured: u64,
    /// Restores performed (step-back, partial, auto).
    pub restores_performed: u64,
    /// Restores whose verification failed.
    pub validation_failures: u64,
    /// Partial (multi-system) rewind calls.
    pub partial_rollbacks: u64,
    /// Auto rollbacks fired from the transaction abort path.
    pub auto_rollbacks: u64,
    /// Systems affected by rewind operations.
    pub systems_rewound: u64,
    /// Cumulative bytes of state restored.
    pub bytes_rewound: u64,
}

/// A ring entry summary yielded by [`RollbackManager::entries`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingEntryInfo {
    /// Version of the stored snapshot copy.
    pub version: u32,
    /// Content hash of the stored payload.
    pub hash: u64,
    /// Payload size in bytes.
    pub size: usize,
}

struct RingEntry {
    version: u32,
    hash: u64,
    data: Bytes,
}

struct Ring {
    capacity: usize,
    head: usize,
    count: usize,
    entries: Vec<Option<RingEntry>>,
}

impl Ring {
    fn new(capacity: usize) -> Self {
        let mut entries = Vec::with_capacity(capacity);
        entries.resize_with(capacity, || None);
        Self {
            capacity,
            head: 0,
            count: 0,
            entries,
        }
    }

    fn push(&mut self, entry: RingEntry) {
        self.entries[self.head] = Some(entry);
        self.head = (self.head + 1) % self.capacity;
        if self.count < self.capacity {
            self.count += 1;
        }
    }

    /// Slot index of the entry `steps` back from the newest.
    fn slot_back(&self, steps: usize) -> usize {
        (self.head + self.capacity - 1 - steps) % self.capacity
    }
}

/// Bounded per-system rollback history with an event log.
pub struct RollbackManager {
    rings: FxHashMap<SystemId, Ring>,
    participant_map: FxHashMap<ParticipantId, SystemId>,
    events: BoundedLog<RollbackEvent>,
    event_seq: u64,
    clock: Box<dyn Clock>,
    stats: RollbackStats,
}

impl RollbackManager {
    /// Largest configurable ring capacity.
    pub const MAX_RING_CAPACITY: usize = 16;
    /// Retained rollback events.
    pub const EVENT_CAPACITY: usize = 256;

    /// Creates a manager pinned to the zero clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Box::new(ZeroClock))
    }

    /// Creates a manager stamping events with the given clock.
    #[must_use]
    pub fn with_clock(clock: Box<dyn Clock>) -> Self {
        Self {
            rings: FxHashMap::default(),
            participant_map: FxHashMap::default(),
            events: BoundedLog::new(Self::EVENT_CAPACITY),
            event_seq: 0,
            clock,
            stats: RollbackStats::default(),
        }
    }

    /// Configures (or reconfigures) the ring for `system_id`.
    ///
    /// Any previously retained history is dropped.
    pub fn configure(&mut self, system_id: SystemId, capacity: usize) -> Result<(), RollbackError> {
        if capacity == 0 || capacity > Self::MAX_RING_CAPACITY {
            return Err(RollbackError::InvalidCapacity(capacity));
        }
        debug!(system = %system_id, capacity, "rollback ring configured");
        self.rings.insert(system_id, Ring::new(capacity));
        Ok(())
    }

    /// Captures a checkpoint: snapshot first, then an owned ring copy.
    pub fn capture(
        &mut self,
        snapshots: &mut SnapshotManager,
        system_id: SystemId,
    ) -> Result<(), RollbackError> {
        if !self.rings.contains_key(&system_id) {
            return Err(RollbackError::NotConfigured(system_id));
        }
        snapshots.capture(system_id)?;
        let snap = snapshots
            .get(system_id)
            .ok_or(SnapshotError::UnknownId(system_id))?;
        let entry = RingEntry {
            version: snap.version,
            hash: snap.hash,
            data: Bytes::copy_from_slice(&snap.data),
        };
        // contains_key checked above.
        if let Some(ring) = self.rings.get_mut(&system_id) {
            ring.push(entry);
        }
        self.stats.checkpoints_captured += 1;
        Ok(())
    }

    /// Captures checkpoints for every listed system, reporting each outcome.
    ///
    /// Partial failures do not roll back earlier captures in the batch.
    pub fn capture_multi(
        &mut self,
        snapshots: &mut SnapshotManager,
        system_ids: &[SystemId],
    ) -> Vec<(SystemId, Result<(), RollbackError>)> {
        system_ids
            .iter()
            .map(|&id| (id, self.capture(snapshots, id)))
            .collect()
    }

    /// Restores the snapshot `steps` back from the newest capture.
    ///
    /// Step 0 re-applies the most recent capture. Fails without touching any
    /// state when the ring holds fewer than `steps + 1` entries.
    pub fn step_back(
        &mut self,
        snapshots: &mut SnapshotManager,
        system_id: SystemId,
        steps: u32,
    ) -> Result<(), RollbackError> {
        self.restore_entry(snapshots, system_id, steps, false, None)
    }

    /// Re-applies the latest capture (consistency check).
    pub fn latest(
        &mut self,
        snapshots: &mut SnapshotManager,
        system_id: SystemId,
    ) -> Result<(), RollbackError> {
        self.step_back(snapshots, system_id, 0)
    }

    /// Rewinds several systems in one call, each by its own step count.
    ///
    /// Every pair performs an independent step-back; one event is recorded per
    /// system actually rewound.
    pub fn partial(
        &mut self,
        snapshots: &mut SnapshotManager,
        requests: &[(SystemId, u32)],
    ) -> Vec<(SystemId, Result<(), RollbackError>)> {
        self.stats.partial_rollbacks += 1;
        requests
            .iter()
            .map(|&(id, steps)| (id, self.step_back(snapshots, id, steps)))
            .collect()
    }

    /// Maps a transaction participant to a system for auto-rollback.
    ///
    /// Several participants may map to the same system; remapping replaces
    /// the previous association.
    pub fn map_participant(&mut self, participant: ParticipantId, system_id: SystemId) {
        self.participant_map.insert(participant, system_id);
    }

    /// Re-applies the latest capture of the system mapped to `participant`.
    ///
    /// Invoked by the transaction manager on abort; records an event with
    /// `auto_triggered` set.
    pub fn auto_for_participant(
        &mut self,
        snapshots: &mut SnapshotManager,
        participant: ParticipantId,
    ) -> Result<(), RollbackError> {
        let system_id = *self
            .participant_map
            .get(&participant)
            .ok_or(RollbackError::UnmappedParticipant(participant))?;
        self.restore_entry(snapshots, system_id, 0, true, Some(participant))?;
        self.stats.auto_rollbacks += 1;
        Ok(())
    }

    fn restore_entry(
        &mut self,
        snapshots: &mut SnapshotManager,
        system_id: SystemId,
        steps: u32,
        auto_triggered: bool,
        participant: Option<ParticipantId>,
    ) -> Result<(), RollbackError> {
        let ring = self
            .rings
            .get(&system_id)
            .ok_or(RollbackError::NotConfigured(system_id))?;
        if steps as usize >= ring.count {
            return Err(RollbackError::NotEnoughHistory {
                system: system_id,
                steps,
                available: ring.count,
            });
        }
        let slot = ring.slot_back(steps as usize);
        let entry = ring.entries[slot]
            .as_ref()
            .ok_or(RollbackError::NotConfigured(system_id))?;

        let version_before = snapshots.get(system_id).map(|s| s.version);
        let restored = Snapshot {
            system_id,
            name: snapshots.name_of(system_id).unwrap_or_default().to_owned(),
            version: entry.version,
            hash: entry.hash,
            data: entry.data.clone(),
            timestamp: 0,
        };
        let size = restored.size();
        let version_after = entry.version;
        snapshots.restore(system_id, &restored)?;

        self.stats.restores_performed += 1;
        self.stats.systems_rewound += 1;
        self.stats.bytes_rewound += size as u64;
        self.event_seq += 1;
        let event = RollbackEvent {
            seq: self.event_seq,
            system_id,
            version_before,
            version_after,
            auto_triggered,
            participant,
            timestamp_ms: self.clock.now_ms(),
        };
        if auto_triggered {
            warn!(
                system = %system_id,
                version = version_after,
                "auto rollback applied"
            );
        } else {
            debug!(system = %system_id, steps, version = version_after, "rollback applied");
        }
        self.events.push(event);
        Ok(())
    }

    /// Drops every retained entry of the system's ring, keeping it configured.
    pub fn purge(&mut self, system_id: SystemId) -> Result<(), RollbackError> {
        let ring = self
            .rings
            .get_mut(&system_id)
            .ok_or(RollbackError::NotConfigured(system_id))?;
        let capacity = ring.capacity;
        *ring = Ring::new(capacity);
        Ok(())
    }

    /// Iterates the retained ring entries of a system, newest first.
    pub fn entries(
        &self,
        system_id: SystemId,
    ) -> Result<impl Iterator<Item = RingEntryInfo> + '_, RollbackError> {
        let ring = self
            .rings
            .get(&system_id)
            .ok_or(RollbackError::NotConfigured(system_id))?;
        Ok((0..ring.count).filter_map(move |step| {
            ring.entries[ring.slot_back(step)]
                .as_ref()
                .map(|entry| RingEntryInfo {
                    version: entry.version,
                    hash: entry.hash,
                    size: entry.data.len(),
                })
        }))
    }

    /// Iterates recorded rollback events, oldest first in the retained window.
    pub fn events(&self) -> impl Iterator<Item = &RollbackEvent> {
        self.events.iter()
    }

    /// Returns the counters.
    #[must_use]
    pub fn stats(&self) -> &RollbackStats {
        &self.stats
    }

    /// Formats a per-system summary of the retained history.
    #[must_use]
    pub fn report(&self) -> String {
        use std::fmt::Write as _;

        let mut out = String::from("rollback rings\n");
        let mut ids: Vec<_> = self.rings.keys().copied().collect();
        ids.sort_unstable();
        for id in ids {
            let ring = &self.rings[&id];
            let _ = write!(
                out,
                "  system {id}: cap={} count={} versions:",
                ring.capacity, ring.count
            );
            for step in 0..ring.count {
                if let Some(entry) = ring.entries[ring.slot_back(step)].as_ref() {
                    let _ = write!(out, " {}", entry.version);
                }
            }
            out.push('\n');
        }
        out
    }
}

impl Default for RollbackManager {
    fn default() -> Self {
        Self::new()
    }
}
