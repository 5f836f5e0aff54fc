// SPDX-License-Identifier: Apache-2.0
// © Emberfall Project Contributors

//! Scheduled state validation with hash-based incremental skip and repair.
//!
//! Validators run against the snapshot manager's current snapshots. A system
//! whose snapshot hash has not moved since the validator last ran is skipped
//! (unless forced), so per-frame validation stays cheap when nothing changed.
//! Corruptions can be handed to a repair hook; every validator invocation is
//! recorded in a bounded event ring.

use rustc_hash::FxHashMap;
use thiserror::Error;
use tracing::{debug, warn};

use crate::ident::SystemId;
use crate::ring::BoundedLog;
use crate::snapshot::SnapshotManager;

/// Errors surfaced by the validation manager.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The system already has a validator.
    #[error("system {0} already has a validator")]
    DuplicateSystem(SystemId),
    /// The validator table is full.
    #[error("validator table full ({max} systems)")]
    CapacityExhausted {
        /// Maximum registrable validators.
        max: usize,
    },
    /// The cross-rule table is full.
    #[error("cross-rule table full ({max} rules)")]
    CrossRuleCapacityExhausted {
        /// Maximum registrable cross rules.
        max: usize,
    },
}

/// Severity of a validation finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Severity {
    /// State is consistent.
    Ok,
    /// Suspicious but playable.
    Warn,
    /// State violates an invariant.
    Corrupt,
}

/// Result returned by a validator or cross rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationOutcome {
    /// Finding severity.
    pub severity: Severity,
    /// Validator-defined finding code.
    pub code: u32,
    /// Short human-readable description.
    pub message: String,
}

impl ValidationOutcome {
    /// A clean bill of health.
    #[must_use]
    pub fn ok() -> Self {
        Self {
            severity: Severity::Ok,
            code: 0,
            message: String::new(),
        }
    }

    /// A warning finding.
    #[must_use]
    pub fn warn(code: u32, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warn,
            code,
            message: message.into(),
        }
    }

    /// A corruption finding.
    #[must_use]
    pub fn corrupt(code: u32, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Corrupt,
            code,
            message: message.into(),
        }
    }
}

/// Outcome of a repair attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairOutcome {
    /// The validator has no repair hook.
    Unsupported,
    /// The repair succeeded.
    Fixed,
    /// The repair ran and failed.
    Failed,
}

/// Per-system state validator with an optional repair hook.
pub trait SystemValidator {
    /// Checks the system's state.
    fn validate(&mut self) -> ValidationOutcome;

    /// Attempts to repair a corruption reported with `code`.
    ///
    /// The default declines; a repair is only attempted (and counted) when a
    /// validator overrides this.
    fn repair(&mut self, code: u32) -> RepairOutcome {
        let _ = code;
        RepairOutcome::Unsupported
    }
}

/// A validation rule spanning multiple systems.
pub type CrossRule = Box<dyn FnMut() -> ValidationOutcome>;

/// One validation event.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ValidationEvent {
    /// Monotonic sequence number (starts at 1).
    pub seq: u64,
    /// Tick the triggering run was scheduled at.
    pub tick: u64,
    /// Validated system, or `None` for a cross rule.
    pub system_id: Option<SystemId>,
    /// Finding severity.
    pub severity: Severity,
    /// Validator-defined finding code.
    pub code: u32,
    /// Finding message, truncated.
    pub message: String,
    /// Whether a repair was attempted.
    pub repair_attempted: bool,
    /// Whether the attempted repair succeeded.
    pub repair_success: bool,
}

/// Counters kept by the validation manager.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ValidationStats {
    /// Runs started (scheduled or explicit).
    pub runs_initiated: u64,
    /// Runs that finished.
    pub runs_completed: u64,
    /// System validators invoked.
    pub system_validations_run: u64,
    /// Validators skipped because the snapshot hash was unchanged.
    pub skipped_unchanged: u64,
    /// Cross rules invoked.
    pub cross_rule_runs: u64,
    /// Warn findings.
    pub warnings: u64,
    /// Corrupt findings.
    pub corruptions_detected: u64,
    /// Repairs attempted.
    pub repairs_attempted: u64,
    /// Repairs that succeeded.
    pub repairs_succeeded: u64,
}

struct SystemSlot {
    system_id: SystemId,
    validator: Box<dyn SystemValidator>,
    last_hash: Option<u64>,
}

struct CrossSlot {
    name: String,
    rule: CrossRule,
}

const MESSAGE_MAX: usize = 96;

/// Scheduler and dispatcher for state validation.
pub struct ValidationManager {
    systems: Vec<SystemSlot>,
    index: FxHashMap<SystemId, usize>,
    cross: Vec<CrossSlot>,
    events: BoundedLog<ValidationEvent>,
    event_seq: u64,
    interval_ticks: u32,
    last_run_tick: u64,
    pending: bool,
    stats: ValidationStats,
}

impl ValidationManager {
    /// Maximum registrable system validators.
    pub const MAX_SYSTEMS: usize = 64;
    /// Maximum registrable cross rules.
    pub const MAX_CROSS_RULES: usize = 64;
    /// Retained validation events.
    pub const EVENT_CAPACITY: usize = 256;

    /// Creates an empty manager with scheduling disabled.
    #[must_use]
    pub fn new() -> Self {
        Self {
            systems: Vec::new(),
            index: FxHashMap::default(),
            cross: Vec::new(),
            events: BoundedLog::new(Self::EVENT_CAPACITY),
            event_seq: 0,
            interval_ticks: 0,
            last_run_tick: 0,
            pending: false,
            stats: ValidationStats::default(),
        }
    }

    /// Registers a validator for `system_id`.
    pub fn register_system(
        &mut self,
        system_id: SystemId,
        validator: Box<dyn SystemValidator>,
    ) -> Result<(), ValidationError> {
        if self.index.contains_key(&system_id) {
            return Err(ValidationError::DuplicateSystem(system_id));
        }
        if self.systems.len() >= Self::MAX_SYSTEMS {
            return Err(ValidationError::CapacityExhausted {
                max: Self::MAX_SYSTEMS,
            });
        }
        self.index.insert(system_id, self.systems.len());
        self.systems.push(SystemSlot {
            system_id,
            validator,
            last_hash: None,
        });
        Ok(())
    }

    /// Registers a named cross rule.
    pub fn register_cross_rule(
        &mut self,
        name: impl Into<String>,
        rule: CrossRule,
    ) -> Result<(), ValidationError> {
        if self.cross.len() >= Self::MAX_CROSS_RULES {
            return Err(ValidationError::CrossRuleCapacityExhausted {
                max: Self::MAX_CROSS_RULES,
            });
        }
        self.cross.push(CrossSlot {
            name: name.into(),
            rule,
        });
        Ok(())
    }

    /// Sets the scheduled run interval in ticks; 0 disables scheduling.
    ///
    /// Explicit triggers and [`Self::run_now`] keep working either way.
    pub fn set_interval(&mut self, ticks: u32) {
        self.interval_ticks = ticks;
    }

    /// Marks a run to happen on the next tick regardless of the interval.
    pub fn trigger(&mut self) {
        self.pending = true;
    }

    /// Advances the scheduler; runs validation when due.
    ///
    /// Call once per frame with a monotonically increasing tick.
    pub fn tick(&mut self, snapshots: &SnapshotManager, current_tick: u64) {
        let current_tick = current_tick.max(1);
        if self.last_run_tick == 0 {
            self.last_run_tick = current_tick - 1;
        }
        if self.interval_ticks == 0 && !self.pending {
            return;
        }
        if !self.pending && current_tick - self.last_run_tick < u64::from(self.interval_ticks) {
            return;
        }
        self.last_run_tick = current_tick;
        self.pending = false;
        self.run_internal(snapshots, false);
    }

    /// Runs validation immediately.
    ///
    /// With `force_all` set, the unchanged-hash skip is bypassed and every
    /// validator runs.
    pub fn run_now(&mut self, snapshots: &SnapshotManager, force_all: bool) {
        self.run_internal(snapshots, force_all);
    }

    fn run_internal(&mut self, snapshots: &SnapshotManager, force_all: bool) {
        let tick = self.last_run_tick;
        self.stats.runs_initiated += 1;

        for idx in 0..self.systems.len() {
            let system_id = self.systems[idx].system_id;
            if let Some(snap) = snapshots.get(system_id) {
                if !force_all && self.systems[idx].last_hash == Some(snap.hash) {
                    self.stats.skipped_unchanged += 1;
                    continue;
                }
                self.systems[idx].last_hash = Some(snap.hash);
            }

            let outcome = self.systems[idx].validator.validate();
            self.stats.system_validations_run += 1;
            match outcome.severity {
                Severity::Ok => {}
                Severity::Warn => self.stats.warnings += 1,
                Severity::Corrupt => self.stats.corruptions_detected += 1,
            }

            let mut repair_attempted = false;
            let mut repair_success = false;
            if outcome.severity == Severity::Corrupt {
                match self.systems[idx].validator.repair(outcome.code) {
                    RepairOutcome::Unsupported => {}
                    RepairOutcome::Fixed => {
                        repair_attempted = true;
                        repair_success = true;
                        self.stats.repairs_attempted += 1;
                        self.stats.repairs_succeeded += 1;
                    }
                    RepairOutcome::Failed => {
                        repair_attempted = true;
                        self.stats.repairs_attempted += 1;
                    }
                }
                warn!(
                    system = %system_id,
                    code = outcome.code,
                    repaired = repair_success,
                    "corruption detected"
                );
            }
            self.log_event(tick, Some(system_id), &outcome, repair_attempted, repair_success);
        }

        for idx in 0..self.cross.len() {
            let outcome = (self.cross[idx].rule)();
            self.stats.cross_rule_runs += 1;
            match outcome.severity {
                Severity::Ok => {}
                Severity::Warn => self.stats.warnings += 1,
                Severity::Corrupt => {
                    self.stats.corruptions_detected += 1;
                    warn!(rule = %self.cross[idx].name, code = outcome.code, "cross rule failed");
                }
            }
            self.log_event(tick, None, &outcome, false, false);
        }

        self.stats.runs_completed += 1;
        debug!(tick, "validation run complete");
    }

    fn log_event(
        &mut self,
        tick: u64,
        system_id: Option<SystemId>,
        outcome: &ValidationOutcome,
        repair_attempted: bool,
        repair_success: bool,
    ) {
        self.event_seq += 1;
        let mut message = outcome.message.clone();
        if message.len() > MESSAGE_MAX {
            let mut end = MESSAGE_MAX;
            while !message.is_char_boundary(end) {
                end -= 1;
            }
            message.truncate(end);
        }
        self.events.push(ValidationEvent {
            seq: self.event_seq,
            tick,
            system_id,
            severity: outcome.severity,
            code: outcome.code,
            message,
            repair_attempted,
            repair_success,
        });
    }

    /// Iterates recorded events, oldest first in the retained window.
    pub fn events(&self) -> impl Iterator<Item = &ValidationEvent> {
        self.events.iter()
    }

    /// Returns the counters.
    #[must_use]
    pub fn stats(&self) -> &ValidationStats {
        &self.stats
    }

    /// Clears all registrations, events, scheduling state, and stats.
    pub fn reset(&mut self) {
        self.systems.clear();
        self.index.clear();
        self.cross.clear();
        self.events.clear();
        self.event_seq = 0;
        self.interval_ticks = 0;
        self.last_run_tick = 0;
        self.pending = false;
        self.stats = ValidationStats::default();
    }

    /// Formats stats plus recent events.
    #[must_use]
    pub fn report(&self) -> String {
        use std::fmt::Write as _;

        let mut out = String::new();
        let _ = writeln!(
            out,
            "[validation] runs={} done={} sys={} skipped={} cross={} warn={} corrupt={} \
             repairs={}/{}",
            self.stats.runs_initiated,
            self.stats.runs_completed,
            self.stats.system_validations_run,
            self.stats.skipped_unchanged,
            self.stats.cross_rule_runs,
            self.stats.warnings,
            self.stats.corruptions_detected,
            self.stats.repairs_succeeded,
            self.stats.repairs_attempted,
        );
        for event in self.events.iter() {
            let system = event
                .system_id
                .map_or_else(|| "cross".to_owned(), |id| id.to_string());
            let _ = writeln!(
                out,
                "  evt{} tick={} sys={} sev={:?} code={} repaired={}/{} msg={}",
                event.seq,
                event.tick,
                system,
                event.severity,
                event.code,
                event.repair_attempted,
                event.repair_success,
                event.message,
            );
        }
        out
    }
}

impl Default for ValidationManager {
    fn default() -> Self {
        Self::new()
    }
}
