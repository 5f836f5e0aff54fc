// SPDX-License-Identifier: Apache-2.0
// © Emberfall Project Contributors

//! Multi-system transactions: two-phase commit with isolation and timeouts.
//!
//! Determinism contract
//! - Prepare, commit, and abort iterate marked participants in ascending
//!   registration slot order.
//! - Transaction ids increase monotonically from 1.
//! - Timestamps come exclusively from the injected clock; under a fixed clock
//!   an identical call sequence produces identical log contents and stats.
//!
//! Abort policy: `abort` runs on **every** marked participant, including ones
//! whose prepare was never reached because an earlier participant failed.
//! Cleanup is uniform that way — a participant's abort hook must tolerate
//! being called without a preceding prepare.

use rustc_hash::FxHashMap;
use thiserror::Error;
use tracing::{debug, warn};

use crate::clock::{Clock, ZeroClock};
use crate::fault::SystemFault;
use crate::ident::{ParticipantId, TxId};
use crate::ring::BoundedLog;
use crate::rollback::RollbackManager;
use crate::snapshot::SnapshotManager;

/// Errors surfaced by the transaction manager.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransactionError {
    /// No free transaction slots remain.
    #[error("transaction table full ({max} slots)")]
    CapacityExhausted {
        /// Maximum concurrent transaction records.
        max: usize,
    },
    /// No free participant slots remain.
    #[error("participant table full ({max} slots)")]
    ParticipantCapacityExhausted {
        /// Maximum registrable participants.
        max: usize,
    },
    /// The participant id is already registered.
    #[error("participant {0} already registered")]
    DuplicateParticipant(ParticipantId),
    /// The participant id is not registered.
    #[error("participant {0} not registered")]
    UnknownParticipant(ParticipantId),
    /// The transaction id does not exist.
    #[error("unknown transaction {0}")]
    UnknownTx(TxId),
    /// The operation is not legal in the transaction's current state.
    #[error("transaction {tx} is {state:?}, operation requires Active")]
    WrongState {
        /// The transaction.
        tx: TxId,
        /// Its current state.
        state: TxState,
    },
    /// The transaction exceeded its timeout at commit.
    #[error("transaction {0} timed out")]
    TimedOut(TxId),
    /// A repeatable-read version check failed at commit.
    #[error("transaction {tx} aborted: participant {participant} changed under repeatable read")]
    IsolationViolation {
        /// The transaction.
        tx: TxId,
        /// Participant whose version moved between read and commit.
        participant: ParticipantId,
    },
    /// A participant vetoed the prepare phase.
    #[error("participant {participant} failed prepare: {message}")]
    PrepareFailed {
        /// Participant that vetoed.
        participant: ParticipantId,
        /// Its reported message, truncated.
        message: String,
    },
    /// A participant failed during the commit phase.
    ///
    /// Participants should always succeed at commit after a successful
    /// prepare; this variant means the atomicity contract was broken by a
    /// participant.
    #[error("participant {participant} failed commit")]
    CommitFailed {
        /// Participant that failed.
        participant: ParticipantId,
    },
}

/// Transaction isolation level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TxIsolation {
    /// No version tracking; reads always observe the latest state.
    ReadCommitted,
    /// Versions observed by [`TransactionManager::read`] are re-checked at
    /// commit; any movement aborts the transaction.
    RepeatableRead,
}

/// Transaction lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TxState {
    /// Slot never used (appears only as a log `from` state).
    Unused,
    /// Accepting marks and reads.
    Active,
    /// Running participant prepare hooks.
    Preparing,
    /// Running participant commit hooks.
    Committing,
    /// Terminal: all participants committed.
    Committed,
    /// Terminal: aborted, participants notified.
    Aborted,
    /// Terminal: commit refused because the timeout had expired.
    TimedOut,
}

/// A participant in two-phase commit.
///
/// `prepare` and `commit` are the two phases; `abort` (default no-op) is the
/// cleanup hook; `version` feeds isolation tracking.
pub trait TxParticipant {
    /// Phase one: validate and stage the transaction's effects.
    ///
    /// Returns the participant's version at prepare time. Under repeatable
    /// read this must equal the version observed at read time; staging must
    /// not bump the version until commit.
    fn prepare(&mut self, tx: TxId) -> Result<u32, SystemFault>;

    /// Phase two: make staged effects durable.
    fn commit(&mut self, tx: TxId) -> Result<(), SystemFault>;

    /// Undo staged effects. Called on every marked participant when the
    /// transaction aborts, whether or not its prepare ran.
    fn abort(&mut self, tx: TxId) {
        let _ = tx;
    }

    /// Current version, for read tracking and repeatable-read validation.
    fn version(&self) -> u32;
}

/// Registration descriptor for a transaction participant.
#[derive(Debug, Clone)]
pub struct TxParticipantDesc {
    /// Caller-chosen id, unique within the manager.
    pub participant_id: ParticipantId,
    /// Human-readable name for logs and reports.
    pub name: String,
}

/// One transaction-log entry: a single state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TxLogEntry {
    /// The transaction.
    pub tx_id: TxId,
    /// State before the transition.
    pub from_state: TxState,
    /// State after the transition.
    pub to_state: TxState,
    /// Clock reading at transition time.
    pub timestamp_ms: u64,
    /// Isolation level of the transaction.
    pub isolation: TxIsolation,
    /// Bitmask of marked participants (bit per registration slot).
    pub participants_marked: u64,
}

/// Counters kept by the transaction manager.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TxStats {
    /// Transactions begun.
    pub started: u64,
    /// Transactions committed.
    pub committed: u64,
    /// Transactions aborted.
    pub aborted: u64,
    /// Prepare-phase vetoes.
    pub prepare_failures: u64,
    /// Repeatable-read violations detected at commit.
    pub isolation_violations: u64,
    /// Commits refused for exceeding the timeout.
    pub timeouts: u64,
    /// Abort paths that ran (each may fan out to several auto-rollbacks).
    pub rollback_invocations: u64,
    /// Highest number of simultaneously active transactions.
    pub active_peak: u64,
    /// Entries currently retained in the log.
    pub log_entries: u64,
}

struct ParticipantSlot {
    id: ParticipantId,
    name: String,
    handler: Box<dyn TxParticipant>,
}

const ABORT_REASON_MAX: usize = 128;

struct TxRecord {
    id: TxId,
    state: TxState,
    isolation: TxIsolation,
    timeout_ms: u32,
    start_ms: u64,
    participant_mask: u64,
    read_versions: [Option<u32>; TransactionManager::MAX_PARTICIPANTS],
    prepare_versions: [Option<u32>; TransactionManager::MAX_PARTICIPANTS],
    abort_reason: String,
}

/// Two-phase-commit coordinator over registered participants.
pub struct TransactionManager {
    participants: Vec<ParticipantSlot>,
    pindex: FxHashMap<ParticipantId, usize>,
    txs: Vec<TxRecord>,
    tindex: FxHashMap<TxId, usize>,
    next_tx: u64,
    clock: Box<dyn Clock>,
    log: Option<BoundedLog<TxLogEntry>>,
    stats: TxStats,
}

impl TransactionManager {
    /// Maximum registrable participants (the mark bitmask is 64 bits wide).
    pub const MAX_PARTICIPANTS: usize = 64;
    /// Maximum transaction records retained between [`Self::reset`] calls.
    pub const MAX_TRANSACTIONS: usize = 256;

    /// Creates a manager pinned to the zero clock (no timeouts ever fire).
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Box::new(ZeroClock))
    }

    /// Creates a manager reading time from the given clock.
    #[must_use]
    pub fn with_clock(clock: Box<dyn Clock>) -> Self {
        Self {
            participants: Vec::new(),
            pindex: FxHashMap::default(),
            txs: Vec::new(),
            tindex: FxHashMap::default(),
            next_tx: 1,
            clock,
            log: None,
            stats: TxStats::default(),
        }
    }

    /// Registers a participant.
    pub fn register_participant(
        &mut self,
        desc: TxParticipantDesc,
        handler: Box<dyn TxParticipant>,
    ) -> Result<(), TransactionError> {
        if self.pindex.contains_key(&desc.participant_id) {
            return Err(TransactionError::DuplicateParticipant(desc.participant_id));
        }
        if self.participants.len() >= Self::MAX_PARTICIPANTS {
            return Err(TransactionError::ParticipantCapacityExhausted {
                max: Self::MAX_PARTICIPANTS,
            });
        }
        debug!(participant = %desc.participant_id, name = %desc.name, "participant registered");
        self.pindex.insert(desc.participant_id, self.participants.len());
        self.participants.push(ParticipantSlot {
            id: desc.participant_id,
            name: desc.name,
            handler,
        });
        Ok(())
    }

    /// Begins a transaction, returning its id.
    pub fn begin(
        &mut self,
        isolation: TxIsolation,
        timeout_ms: u32,
    ) -> Result<TxId, TransactionError> {
        if self.txs.len() >= Self::MAX_TRANSACTIONS {
            return Err(TransactionError::CapacityExhausted {
                max: Self::MAX_TRANSACTIONS,
            });
        }
        let id = TxId::from_raw(self.next_tx);
        self.next_tx += 1;
        let record = TxRecord {
            id,
            state: TxState::Active,
            isolation,
            timeout_ms,
            start_ms: self.clock.now_ms(),
            participant_mask: 0,
            read_versions: [None; Self::MAX_PARTICIPANTS],
            prepare_versions: [None; Self::MAX_PARTICIPANTS],
            abort_reason: String::new(),
        };
        self.tindex.insert(id, self.txs.len());
        self.txs.push(record);

        self.stats.started += 1;
        let active = self
            .txs
            .iter()
            .filter(|t| t.state == TxState::Active)
            .count() as u64;
        if active > self.stats.active_peak {
            self.stats.active_peak = active;
        }
        self.push_log(id, TxState::Unused, TxState::Active, isolation, 0);
        debug!(tx = %id, ?isolation, timeout_ms, "transaction begun");
        Ok(id)
    }

    fn record_index(&self, tx: TxId) -> Result<usize, TransactionError> {
        self.tindex
            .get(&tx)
            .copied()
            .ok_or(TransactionError::UnknownTx(tx))
    }

    fn participant_index(&self, participant: ParticipantId) -> Result<usize, TransactionError> {
        self.pindex
            .get(&participant)
            .copied()
            .ok_or(TransactionError::UnknownParticipant(participant))
    }

    /// Marks a participant as involved in the transaction.
    pub fn mark(&mut self, tx: TxId, participant: ParticipantId) -> Result<(), TransactionError> {
        let pidx = self.participant_index(participant)?;
        let idx = self.record_index(tx)?;
        let record = &mut self.txs[idx];
        if record.state != TxState::Active {
            return Err(TransactionError::WrongState {
                tx,
                state: record.state,
            });
        }
        record.participant_mask |= 1 << pidx;
        Ok(())
    }

    /// Reads a participant's current version.
    ///
    /// Under repeatable read the observed version is recorded and re-checked
    /// at commit.
    pub fn read(&mut self, tx: TxId, participant: ParticipantId) -> Result<u32, TransactionError> {
        let pidx = self.participant_index(participant)?;
        let idx = self.record_index(tx)?;
        if self.txs[idx].state != TxState::Active {
            return Err(TransactionError::WrongState {
                tx,
                state: self.txs[idx].state,
            });
        }
        let version = self.participants[pidx].handler.version();
        let record = &mut self.txs[idx];
        if record.isolation == TxIsolation::RepeatableRead {
            record.read_versions[pidx] = Some(version);
        }
        Ok(version)
    }

    /// Runs two-phase commit.
    ///
    /// Order of checks: timeout, repeatable-read validation against read-time
    /// versions, prepare phase, repeatable-read re-validation against the
    /// versions prepare reported, commit phase. Any failure transitions the
    /// transaction to `TimedOut` or `Aborted` (running the abort path,
    /// including auto-rollback for mapped participants) and returns the
    /// corresponding error.
    pub fn commit(
        &mut self,
        tx: TxId,
        rollback: &mut RollbackManager,
        snapshots: &mut SnapshotManager,
    ) -> Result<(), TransactionError> {
        let idx = self.record_index(tx)?;
        let (state, isolation, mask, timeout_ms, start_ms) = {
            let r = &self.txs[idx];
            (r.state, r.isolation, r.participant_mask, r.timeout_ms, r.start_ms)
        };
        if state != TxState::Active {
            return Err(TransactionError::WrongState { tx, state });
        }

        // Timeout: a single check, here at commit.
        if timeout_ms > 0 && self.clock.now_ms().saturating_sub(start_ms) > u64::from(timeout_ms) {
            self.txs[idx].state = TxState::TimedOut;
            self.stats.timeouts += 1;
            self.push_log(tx, TxState::Active, TxState::TimedOut, isolation, mask);
            warn!(tx = %tx, "transaction timed out at commit");
            return Err(TransactionError::TimedOut(tx));
        }

        // Repeatable-read validation against versions recorded at read time.
        if isolation == TxIsolation::RepeatableRead {
            for pidx in 0..self.participants.len() {
                if mask & (1 << pidx) == 0 {
                    continue;
                }
                let Some(read_version) = self.txs[idx].read_versions[pidx] else {
                    continue;
                };
                let current = self.participants[pidx].handler.version();
                if current != read_version {
                    let participant = self.participants[pidx].id;
                    self.stats.isolation_violations += 1;
                    self.abort(tx, "isolation violation", rollback, snapshots)?;
                    return Err(TransactionError::IsolationViolation { tx, participant });
                }
            }
        }

        // Prepare phase.
        self.txs[idx].state = TxState::Preparing;
        self.push_log(tx, TxState::Active, TxState::Preparing, isolation, mask);
        for pidx in 0..self.participants.len() {
            if mask & (1 << pidx) == 0 {
                continue;
            }
            match self.participants[pidx].handler.prepare(tx) {
                Ok(version) => {
                    self.txs[idx].prepare_versions[pidx] = Some(version);
                }
                Err(fault) => {
                    let participant = self.participants[pidx].id;
                    let message = truncate(fault.message(), ABORT_REASON_MAX);
                    self.stats.prepare_failures += 1;
                    self.abort(tx, "prepare failure", rollback, snapshots)?;
                    return Err(TransactionError::PrepareFailed {
                        participant,
                        message,
                    });
                }
            }
        }

        // Under repeatable read, re-check the versions participants reported
        // from prepare against the ones recorded at read time. A mismatch
        // means the participant's state moved between read and prepare —
        // the same write skew the pre-prepare check catches, one phase later.
        if isolation == TxIsolation::RepeatableRead {
            for pidx in 0..self.participants.len() {
                if mask & (1 << pidx) == 0 {
                    continue;
                }
                let record = &self.txs[idx];
                let (Some(read_version), Some(prepared_version)) =
                    (record.read_versions[pidx], record.prepare_versions[pidx])
                else {
                    continue;
                };
                if prepared_version != read_version {
                    let participant = self.participants[pidx].id;
                    self.stats.isolation_violations += 1;
                    self.abort(tx, "isolation violation", rollback, snapshots)?;
                    return Err(TransactionError::IsolationViolation { tx, participant });
                }
            }
        }

        // Commit phase.
        self.txs[idx].state = TxState::Committing;
        self.push_log(tx, TxState::Preparing, TxState::Committing, isolation, mask);
        for pidx in 0..self.participants.len() {
            if mask & (1 << pidx) == 0 {
                continue;
            }
            if self.participants[pidx].handler.commit(tx).is_err() {
                let participant = self.participants[pidx].id;
                self.abort(tx, "commit failure", rollback, snapshots)?;
                return Err(TransactionError::CommitFailed { participant });
            }
        }

        self.txs[idx].state = TxState::Committed;
        self.stats.committed += 1;
        self.push_log(tx, TxState::Committing, TxState::Committed, isolation, mask);
        debug!(tx = %tx, "transaction committed");
        Ok(())
    }

    /// Aborts the transaction.
    ///
    /// Idempotent: a transaction already committed or aborted is left alone.
    /// Every marked participant's abort hook runs, then auto-rollback fires
    /// for each marked participant mapped in the rollback manager.
    pub fn abort(
        &mut self,
        tx: TxId,
        reason: &str,
        rollback: &mut RollbackManager,
        snapshots: &mut SnapshotManager,
    ) -> Result<(), TransactionError> {
        let idx = self.record_index(tx)?;
        let (prev, isolation, mask) = {
            let r = &self.txs[idx];
            (r.state, r.isolation, r.participant_mask)
        };
        if prev == TxState::Committed || prev == TxState::Aborted {
            return Ok(());
        }

        self.txs[idx].state = TxState::Aborted;
        self.txs[idx].abort_reason = truncate(reason, ABORT_REASON_MAX);

        for pidx in 0..self.participants.len() {
            if mask & (1 << pidx) == 0 {
                continue;
            }
            self.participants[pidx].handler.abort(tx);
        }

        self.stats.aborted += 1;
        self.stats.rollback_invocations += 1;
        self.push_log(tx, prev, TxState::Aborted, isolation, mask);
        warn!(tx = %tx, reason, "transaction aborted");

        // Auto-rollback for mapped participants. Failures here (unmapped,
        // empty ring) must not mask the abort itself.
        for pidx in 0..self.participants.len() {
            if mask & (1 << pidx) == 0 {
                continue;
            }
            let participant = self.participants[pidx].id;
            if let Err(err) = rollback.auto_for_participant(snapshots, participant) {
                debug!(tx = %tx, %participant, %err, "auto rollback skipped");
            }
        }
        Ok(())
    }

    /// Returns the transaction's current state.
    #[must_use]
    pub fn state(&self, tx: TxId) -> Option<TxState> {
        let idx = self.tindex.get(&tx)?;
        Some(self.txs[*idx].state)
    }

    /// Returns the recorded abort reason, if the transaction aborted.
    #[must_use]
    pub fn abort_reason(&self, tx: TxId) -> Option<&str> {
        let idx = self.tindex.get(&tx)?;
        let record = &self.txs[*idx];
        (record.state == TxState::Aborted).then_some(record.abort_reason.as_str())
    }

    /// Enables the state-transition log with the given capacity.
    ///
    /// Capacity 0 disables logging and clears retained entries.
    pub fn set_log_capacity(&mut self, capacity: usize) {
        if capacity == 0 {
            self.log = None;
        } else {
            self.log = Some(BoundedLog::new(capacity));
        }
        self.stats.log_entries = 0;
    }

    /// Iterates log entries, oldest first in the retained window.
    pub fn log_entries(&self) -> impl Iterator<Item = &TxLogEntry> {
        self.log.iter().flat_map(BoundedLog::iter)
    }

    fn push_log(
        &mut self,
        tx_id: TxId,
        from_state: TxState,
        to_state: TxState,
        isolation: TxIsolation,
        participants_marked: u64,
    ) {
        let Some(log) = &mut self.log else {
            return;
        };
        log.push(TxLogEntry {
            tx_id,
            from_state,
            to_state,
            timestamp_ms: self.clock.now_ms(),
            isolation,
            participants_marked,
        });
        self.stats.log_entries = log.len() as u64;
    }

    /// Returns the counters.
    #[must_use]
    pub fn stats(&self) -> &TxStats {
        &self.stats
    }

    /// Clears transactions, participants, stats, and the log. Test support;
    /// must not be called with work in flight.
    pub fn reset(&mut self) {
        self.txs.clear();
        self.tindex.clear();
        self.participants.clear();
        self.pindex.clear();
        self.next_tx = 1;
        self.stats = TxStats::default();
        if let Some(log) = &mut self.log {
            log.clear();
        }
    }

    /// Formats stats plus one line per transaction record.
    #[must_use]
    pub fn report(&self) -> String {
        use std::fmt::Write as _;

        let mut out = String::new();
        let _ = writeln!(
            out,
            "[tx] started={} committed={} aborted={} prep_fail={} iso_vio={} timeouts={} \
             rollback={} peak_active={} log={}",
            self.stats.started,
            self.stats.committed,
            self.stats.aborted,
            self.stats.prepare_failures,
            self.stats.isolation_violations,
            self.stats.timeouts,
            self.stats.rollback_invocations,
            self.stats.active_peak,
            self.stats.log_entries,
        );
        for slot in &self.participants {
            let _ = writeln!(out, "  participant id={} name={}", slot.id, slot.name);
        }
        for record in &self.txs {
            let _ = writeln!(
                out,
                "  tx id={} state={:?} iso={:?} mask={:#x} reason={}",
                record.id, record.state, record.isolation, record.participant_mask,
                record.abort_reason,
            );
        }
        out
    }
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new()
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_owned();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_owned()
}
