// SPDX-License-Identifier: Apache-2.0
// © Emberfall Project Contributors

//! Per-system state snapshots with versioning, hashing, and byte deltas.
//!
//! Determinism contract
//! - A snapshot's `hash` is FNV-1a 64 over its payload bytes, nothing else.
//! - Versions are strictly monotonic per system: a capture offering a version
//!   lower than or equal to the stored one is rejected and the stored
//!   snapshot is left untouched.
//! - `timestamp` is a process-local capture index (1, 2, 3, …), not wall
//!   time.
//! - Delta construction is a pure function of the two payloads: identical
//!   inputs yield byte-identical deltas, and applying a delta to its base
//!   reconstructs the target payload and hash exactly — including targets
//!   shorter than their base.

use bytes::Bytes;
use keystone_hash::fnv1a64;
use rustc_hash::FxHashMap;
use thiserror::Error;
use tracing::{debug, warn};

use crate::fault::SystemFault;
use crate::ident::SystemId;
use crate::ring::BoundedLog;

/// Errors surfaced by the snapshot manager.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnapshotError {
    /// The registry is full.
    #[error("snapshot registry full ({max} systems)")]
    CapacityExhausted {
        /// Maximum number of registrable systems.
        max: usize,
    },
    /// The system id is already registered.
    #[error("system {0} already registered for snapshots")]
    DuplicateId(SystemId),
    /// The system id is not registered.
    #[error("system {0} not registered for snapshots")]
    UnknownId(SystemId),
    /// The capture callback reported a failure.
    #[error("capture failed for system {system}: {fault}")]
    CaptureFailed {
        /// System whose capture failed.
        system: SystemId,
        /// The callback's reported fault.
        fault: SystemFault,
    },
    /// The captured payload exceeds the registered ceiling.
    #[error("captured {size} bytes for system {system}, ceiling is {max_size}")]
    TooLarge {
        /// System whose capture was rejected.
        system: SystemId,
        /// Size of the rejected payload.
        size: usize,
        /// Registered ceiling.
        max_size: usize,
    },
    /// The offered version does not advance past the stored snapshot.
    #[error("stale version {offered} for system {system} (stored {stored})")]
    StaleVersion {
        /// System whose capture was rejected.
        system: SystemId,
        /// Version offered by the capture callback.
        offered: u32,
        /// Version of the retained snapshot.
        stored: u32,
    },
    /// The system has no restore hook.
    #[error("system {0} has no restore hook")]
    NoRestoreCallback(SystemId),
    /// The restore callback reported a failure.
    #[error("restore failed for system {system}: {fault}")]
    RestoreFailed {
        /// System whose restore failed.
        system: SystemId,
        /// The callback's reported fault.
        fault: SystemFault,
    },
    /// A snapshot was presented for the wrong system.
    #[error("snapshot belongs to system {actual}, expected {expected}")]
    MismatchedSystem {
        /// System the caller named.
        expected: SystemId,
        /// System the snapshot carries.
        actual: SystemId,
    },
    /// Delta endpoints are not in forward version order.
    #[error("delta requires base version < target version (got {base} -> {target})")]
    DeltaNotForward {
        /// Base snapshot version.
        base: u32,
        /// Target snapshot version.
        target: u32,
    },
    /// The delta was built against a different base.
    #[error("delta base version {delta_base} does not match snapshot version {snapshot}")]
    MismatchedBase {
        /// Base version recorded in the delta.
        delta_base: u32,
        /// Version of the snapshot the caller supplied.
        snapshot: u32,
    },
    /// The delta payload is shorter than its ranges claim.
    #[error("delta payload truncated: ranges need {needed} bytes, payload has {actual}")]
    TruncatedDelta {
        /// Bytes the ranges require.
        needed: usize,
        /// Bytes the payload holds.
        actual: usize,
    },
    /// A delta range does not fit the reconstructed buffer.
    #[error("delta range [{offset}, +{length}) exceeds reconstructed size {size}")]
    RangeOutOfBounds {
        /// Range offset.
        offset: usize,
        /// Range length.
        length: usize,
        /// Reconstructed buffer size.
        size: usize,
    },
    /// Capture-order dependencies form a cycle.
    #[error("capture-order dependency cycle involving system {0}")]
    DependencyCycle(SystemId),
    /// A dependency edge references the same system on both ends.
    #[error("system {0} cannot depend on itself")]
    SelfDependency(SystemId),
}

/// Outcome of a restore callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreResult {
    /// The source adopted the snapshot bytes.
    Applied,
    /// The source rejected the snapshot.
    Failed(SystemFault),
    /// The source does not support restore at all.
    Unsupported,
}

/// Payload handed back by a capture callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedState {
    /// Freshly produced state bytes; the manager takes ownership.
    pub bytes: Vec<u8>,
    /// Version of the captured state. Must advance past the stored snapshot.
    pub version: u32,
}

/// Capture/restore endpoint for one system's byte-image.
pub trait SnapshotSource {
    /// Produces an owned byte-image of the current state plus its version.
    fn capture(&mut self) -> Result<CapturedState, SystemFault>;

    /// Adopts `bytes` as the current state.
    ///
    /// The default declines: systems that only feed validation never need a
    /// restore path, and the manager reports
    /// [`SnapshotError::NoRestoreCallback`] for them.
    fn restore(&mut self, bytes: &[u8], version: u32) -> RestoreResult {
        let _ = (bytes, version);
        RestoreResult::Unsupported
    }
}

/// Registration descriptor for a snapshot endpoint.
#[derive(Debug, Clone)]
pub struct SnapshotDesc {
    /// Caller-chosen system id, unique within the manager.
    pub system_id: SystemId,
    /// Human-readable name carried into snapshots and reports.
    pub name: String,
    /// Advisory payload ceiling in bytes; 0 means unlimited.
    pub max_size: usize,
}

/// An immutable, versioned byte-image of one system's state.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Snapshot {
    /// Owning system.
    pub system_id: SystemId,
    /// Name of the owning system at capture time.
    pub name: String,
    /// Strictly increasing per system.
    pub version: u32,
    /// FNV-1a 64 over `data`.
    pub hash: u64,
    /// The payload. Shared handles are cheap to clone and immutable.
    pub data: Bytes,
    /// Monotonic capture index (process-local, starts at 1).
    pub timestamp: u64,
}

impl Snapshot {
    /// Payload size in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Returns the content hash as a lowercase hex string.
    #[must_use]
    pub fn hash_hex(&self) -> String {
        hex::encode(self.hash.to_be_bytes())
    }
}

/// A contiguous run of changed bytes inside a delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeltaRange {
    /// Byte offset of the run in the target payload.
    pub offset: usize,
    /// Length of the run.
    pub length: usize,
}

/// Byte-range difference between two snapshots of the same system.
///
/// `data` holds the replacement bytes for every range, concatenated in range
/// order. `target_size` pins the reconstructed payload length so that deltas
/// to a shorter target round-trip exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SnapshotDelta {
    /// Owning system.
    pub system_id: SystemId,
    /// Version the delta applies to.
    pub base_version: u32,
    /// Version the delta reconstructs.
    pub target_version: u32,
    /// Size of the reconstructed payload.
    pub target_size: usize,
    /// Changed byte runs, ascending by offset.
    pub ranges: Vec<DeltaRange>,
    /// Concatenated replacement bytes, one run per range.
    pub data: Vec<u8>,
}

/// Result of applying a delta to a base snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedDelta {
    /// The reconstructed payload.
    pub data: Bytes,
    /// FNV-1a 64 over the reconstructed payload.
    pub hash: u64,
}

impl AppliedDelta {
    /// Reconstructed payload size in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// One delta-journal record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeltaRecord {
    /// Owning system.
    pub system_id: SystemId,
    /// Base version of the recorded delta.
    pub base_version: u32,
    /// Target version of the recorded delta.
    pub target_version: u32,
    /// Capture index of the target snapshot.
    pub timestamp: u64,
    /// Full size of the target payload.
    pub full_size: usize,
    /// Size of the delta payload.
    pub delta_size: usize,
    /// Number of changed ranges.
    pub range_count: usize,
    /// Content hash of the target payload.
    pub target_hash: u64,
}

/// Counters kept by the snapshot manager.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SnapshotStats {
    /// Systems currently registered.
    pub registered_systems: usize,
    /// Successful captures.
    pub total_captures: u64,
    /// Captures whose callback reported a failure.
    pub total_capture_failures: u64,
    /// Bytes accepted across all successful captures.
    pub total_bytes_stored: u64,
    /// Deltas built.
    pub total_delta_generated: u64,
    /// Delta payload bytes produced.
    pub total_delta_bytes: u64,
    /// Deltas applied.
    pub total_delta_applied: u64,
    /// Delta applications rejected.
    pub delta_apply_failures: u64,
    /// Bytes a same-size delta saved over shipping the full payload.
    pub bytes_saved_via_delta: u64,
}

struct Slot {
    desc: SnapshotDesc,
    source: Box<dyn SnapshotSource>,
    current: Option<Snapshot>,
}

const SNAPSHOT_CAP: usize = 64;

/// Registry of snapshot endpoints and their current snapshots.
pub struct SnapshotManager {
    slots: Vec<Slot>,
    index: FxHashMap<SystemId, usize>,
    capture_counter: u64,
    deps: Box<[[bool; SNAPSHOT_CAP]; SNAPSHOT_CAP]>,
    journal: Option<BoundedLog<DeltaRecord>>,
    stats: SnapshotStats,
}

impl SnapshotManager {
    /// Maximum number of registrable snapshot endpoints.
    pub const MAX_SYSTEMS: usize = SNAPSHOT_CAP;

    /// Creates an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            index: FxHashMap::default(),
            capture_counter: 0,
            deps: Box::new([[false; Self::MAX_SYSTEMS]; Self::MAX_SYSTEMS]),
            journal: None,
            stats: SnapshotStats::default(),
        }
    }

    /// Registers a snapshot endpoint.
    ///
    /// Fails if the id is taken or the registry is full.
    pub fn register(
        &mut self,
        desc: SnapshotDesc,
        source: Box<dyn SnapshotSource>,
    ) -> Result<(), SnapshotError> {
        if self.index.contains_key(&desc.system_id) {
            return Err(SnapshotError::DuplicateId(desc.system_id));
        }
        if self.slots.len() >= Self::MAX_SYSTEMS {
            return Err(SnapshotError::CapacityExhausted {
                max: Self::MAX_SYSTEMS,
            });
        }
        debug!(system = %desc.system_id, name = %desc.name, "snapshot endpoint registered");
        self.index.insert(desc.system_id, self.slots.len());
        self.slots.push(Slot {
            desc,
            source,
            current: None,
        });
        self.stats.registered_systems = self.slots.len();
        Ok(())
    }

    fn slot_index(&self, system_id: SystemId) -> Result<usize, SnapshotError> {
        self.index
            .get(&system_id)
            .copied()
            .ok_or(SnapshotError::UnknownId(system_id))
    }

    /// Returns the registered name of a system, if any.
    #[must_use]
    pub fn name_of(&self, system_id: SystemId) -> Option<&str> {
        let idx = self.index.get(&system_id)?;
        Some(self.slots[*idx].desc.name.as_str())
    }

    /// Captures a fresh snapshot for `system_id`.
    ///
    /// The capture callback hands over an owned payload and its version. The
    /// capture is rejected — leaving the stored snapshot untouched — when the
    /// payload exceeds the registered ceiling or the version fails to advance.
    pub fn capture(&mut self, system_id: SystemId) -> Result<&Snapshot, SnapshotError> {
        let idx = self.slot_index(system_id)?;
        let slot = &mut self.slots[idx];

        let captured = match slot.source.capture() {
            Ok(captured) => captured,
            Err(fault) => {
                self.stats.total_capture_failures += 1;
                warn!(system = %system_id, %fault, "snapshot capture failed");
                return Err(SnapshotError::CaptureFailed {
                    system: system_id,
                    fault,
                });
            }
        };

        if slot.desc.max_size > 0 && captured.bytes.len() > slot.desc.max_size {
            return Err(SnapshotError::TooLarge {
                system: system_id,
                size: captured.bytes.len(),
                max_size: slot.desc.max_size,
            });
        }
        if let Some(current) = &slot.current {
            if captured.version <= current.version {
                return Err(SnapshotError::StaleVersion {
                    system: system_id,
                    offered: captured.version,
                    stored: current.version,
                });
            }
        }

        let data = Bytes::from(captured.bytes);
        let hash = fnv1a64(&data);
        self.capture_counter += 1;
        let size = data.len();
        let snapshot = Snapshot {
            system_id,
            name: slot.desc.name.clone(),
            version: captured.version,
            hash,
            data,
            timestamp: self.capture_counter,
        };
        self.stats.total_captures += 1;
        self.stats.total_bytes_stored += size as u64;
        debug!(
            system = %system_id,
            version = captured.version,
            size,
            "snapshot captured"
        );
        Ok(self.slots[idx].current.insert(snapshot))
    }

    /// Returns the current snapshot of `system_id`, if one has been captured.
    #[must_use]
    pub fn get(&self, system_id: SystemId) -> Option<&Snapshot> {
        let idx = self.index.get(&system_id)?;
        self.slots[*idx].current.as_ref()
    }

    /// Hands `snap` to the system's restore hook.
    ///
    /// The manager's own bookkeeping (current snapshot, stats) is not touched:
    /// restoring is the source adopting bytes, not a new capture.
    pub fn restore(&mut self, system_id: SystemId, snap: &Snapshot) -> Result<(), SnapshotError> {
        if snap.system_id != system_id {
            return Err(SnapshotError::MismatchedSystem {
                expected: system_id,
                actual: snap.system_id,
            });
        }
        let idx = self.slot_index(system_id)?;
        match self.slots[idx].source.restore(&snap.data, snap.version) {
            RestoreResult::Applied => {
                debug!(system = %system_id, version = snap.version, "snapshot restored");
                Ok(())
            }
            RestoreResult::Failed(fault) => Err(SnapshotError::RestoreFailed {
                system: system_id,
                fault,
            }),
            RestoreResult::Unsupported => Err(SnapshotError::NoRestoreCallback(system_id)),
        }
    }

    /// Recomputes the FNV-1a 64 hash of a snapshot's payload.
    #[must_use]
    pub fn rehash(snap: &Snapshot) -> u64 {
        fnv1a64(&snap.data)
    }

    /// Drops the stored snapshot for `system_id`, keeping the registration.
    pub fn reset(&mut self, system_id: SystemId) -> Result<(), SnapshotError> {
        let idx = self.slot_index(system_id)?;
        self.slots[idx].current = None;
        Ok(())
    }

    // ── Deltas ──────────────────────────────────────────────────────────

    /// Builds a byte-range delta transforming `base` into `target`.
    ///
    /// Both snapshots must belong to the same system and `base.version` must
    /// precede `target.version`. The scan groups contiguous differing bytes
    /// into ranges over the overlapping prefix; a grown target contributes one
    /// tail range carrying the extra bytes.
    pub fn build_delta(
        &mut self,
        base: &Snapshot,
        target: &Snapshot,
    ) -> Result<SnapshotDelta, SnapshotError> {
        if base.system_id != target.system_id {
            return Err(SnapshotError::MismatchedSystem {
                expected: base.system_id,
                actual: target.system_id,
            });
        }
        if base.version >= target.version {
            return Err(SnapshotError::DeltaNotForward {
                base: base.version,
                target: target.version,
            });
        }

        let a = &base.data;
        let b = &target.data;
        let overlap = a.len().min(b.len());
        let mut ranges = Vec::new();
        let mut data = Vec::new();

        let mut i = 0;
        while i < overlap {
            if a[i] == b[i] {
                i += 1;
                continue;
            }
            let start = i;
            while i < overlap && a[i] != b[i] {
                i += 1;
            }
            ranges.push(DeltaRange {
                offset: start,
                length: i - start,
            });
            data.extend_from_slice(&b[start..i]);
        }
        if b.len() > a.len() {
            ranges.push(DeltaRange {
                offset: a.len(),
                length: b.len() - a.len(),
            });
            data.extend_from_slice(&b[a.len()..]);
        }

        self.stats.total_delta_generated += 1;
        self.stats.total_delta_bytes += data.len() as u64;
        if base.size() == target.size() {
            self.stats.bytes_saved_via_delta +=
                target.size().saturating_sub(data.len()) as u64;
        }

        let delta = SnapshotDelta {
            system_id: base.system_id,
            base_version: base.version,
            target_version: target.version,
            target_size: target.size(),
            ranges,
            data,
        };
        if let Some(journal) = &mut self.journal {
            journal.push(DeltaRecord {
                system_id: target.system_id,
                base_version: base.version,
                target_version: target.version,
                timestamp: target.timestamp,
                full_size: target.size(),
                delta_size: delta.data.len(),
                range_count: delta.ranges.len(),
                target_hash: target.hash,
            });
        }
        Ok(delta)
    }

    /// Applies `delta` to `base`, reconstructing the target payload.
    ///
    /// The delta must have been built against `base`'s version. The
    /// reconstructed payload is the base copied into a buffer of the delta's
    /// target size, with every range overwritten from the delta payload in
    /// order.
    pub fn apply_delta(
        &mut self,
        base: &Snapshot,
        delta: &SnapshotDelta,
    ) -> Result<AppliedDelta, SnapshotError> {
        if base.system_id != delta.system_id {
            self.stats.delta_apply_failures += 1;
            return Err(SnapshotError::MismatchedSystem {
                expected: delta.system_id,
                actual: base.system_id,
            });
        }
        if base.version != delta.base_version {
            self.stats.delta_apply_failures += 1;
            return Err(SnapshotError::MismatchedBase {
                delta_base: delta.base_version,
                snapshot: base.version,
            });
        }

        let needed: usize = delta.ranges.iter().map(|r| r.length).sum();
        if needed > delta.data.len() {
            self.stats.delta_apply_failures += 1;
            return Err(SnapshotError::TruncatedDelta {
                needed,
                actual: delta.data.len(),
            });
        }

        let size = delta.target_size;
        let mut buf = vec![0u8; size];
        let prefix = base.size().min(size);
        buf[..prefix].copy_from_slice(&base.data[..prefix]);

        let mut payload_offset = 0;
        for range in &delta.ranges {
            let end = range.offset + range.length;
            if end > size {
                self.stats.delta_apply_failures += 1;
                return Err(SnapshotError::RangeOutOfBounds {
                    offset: range.offset,
                    length: range.length,
                    size,
                });
            }
            buf[range.offset..end]
                .copy_from_slice(&delta.data[payload_offset..payload_offset + range.length]);
            payload_offset += range.length;
        }

        let hash = fnv1a64(&buf);
        self.stats.total_delta_applied += 1;
        Ok(AppliedDelta {
            data: Bytes::from(buf),
            hash,
        })
    }

    // ── Capture-order dependencies ──────────────────────────────────────

    /// Declares that `system_id` captures after `depends_on`.
    pub fn add_dependency(
        &mut self,
        system_id: SystemId,
        depends_on: SystemId,
    ) -> Result<(), SnapshotError> {
        if system_id == depends_on {
            return Err(SnapshotError::SelfDependency(system_id));
        }
        let a = self.slot_index(system_id)?;
        let b = self.slot_index(depends_on)?;
        self.deps[a][b] = true;
        Ok(())
    }

    /// Computes a capture order honoring every declared dependency.
    ///
    /// Dependencies come first. Fails with [`SnapshotError::DependencyCycle`]
    /// if the declarations form a cycle.
    pub fn plan_order(&self) -> Result<Vec<SystemId>, SnapshotError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            InProgress,
            Done,
        }

        fn visit(
            idx: usize,
            slots: &[Slot],
            deps: &[[bool; SnapshotManager::MAX_SYSTEMS]],
            marks: &mut [Mark],
            order: &mut Vec<SystemId>,
        ) -> Result<(), SnapshotError> {
            match marks[idx] {
                Mark::Done => return Ok(()),
                Mark::InProgress => {
                    return Err(SnapshotError::DependencyCycle(slots[idx].desc.system_id))
                }
                Mark::Unvisited => {}
            }
            marks[idx] = Mark::InProgress;
            for (dep, &edge) in deps[idx].iter().enumerate().take(slots.len()) {
                if edge {
                    visit(dep, slots, deps, marks, order)?;
                }
            }
            marks[idx] = Mark::Done;
            order.push(slots[idx].desc.system_id);
            Ok(())
        }

        let mut marks = vec![Mark::Unvisited; self.slots.len()];
        let mut order = Vec::with_capacity(self.slots.len());
        for idx in 0..self.slots.len() {
            visit(idx, &self.slots, &self.deps[..], &mut marks, &mut order)?;
        }
        Ok(order)
    }

    // ── Delta journal ───────────────────────────────────────────────────

    /// Enables the delta journal with the given capacity; 0 disables it and
    /// clears any recorded entries.
    pub fn enable_delta_journal(&mut self, capacity: usize) {
        if capacity == 0 {
            self.journal = None;
        } else {
            self.journal = Some(BoundedLog::new(capacity));
        }
    }

    /// Iterates journal records, oldest first within the retained window.
    pub fn journal(&self) -> impl Iterator<Item = &DeltaRecord> {
        self.journal.iter().flat_map(BoundedLog::iter)
    }

    // ── Introspection ───────────────────────────────────────────────────

    /// Returns the counters.
    #[must_use]
    pub fn stats(&self) -> &SnapshotStats {
        &self.stats
    }

    /// Formats a human-readable summary of every registered system.
    #[must_use]
    pub fn report(&self) -> String {
        use std::fmt::Write as _;

        let mut out = String::new();
        let _ = writeln!(
            out,
            "[snapshots] systems={} captures={} deltas={} bytes={} delta_bytes={} saved={}",
            self.stats.registered_systems,
            self.stats.total_captures,
            self.stats.total_delta_generated,
            self.stats.total_bytes_stored,
            self.stats.total_delta_bytes,
            self.stats.bytes_saved_via_delta,
        );
        for slot in &self.slots {
            match &slot.current {
                Some(snap) => {
                    let _ = writeln!(
                        out,
                        "  sys id={} name={} ver={} size={} hash={}",
                        slot.desc.system_id,
                        slot.desc.name,
                        snap.version,
                        snap.size(),
                        snap.hash_hex(),
                    );
                }
                None => {
                    let _ = writeln!(
                        out,
                        "  sys id={} name={} (no snapshot)",
                        slot.desc.system_id, slot.desc.name,
                    );
                }
            }
        }
        out
    }
}

impl Default for SnapshotManager {
    fn default() -> Self {
        Self::new()
    }
}
