// SPDX-License-Identifier: Apache-2.0
// © Emberfall Project Contributors

//! The `Runtime` facade: the five managers wired together.
//!
//! The managers are plain values with explicit collaborator parameters on
//! their cross-manager operations. `Runtime` owns one of each and threads the
//! borrows so game code can write `runtime.commit(tx)` instead of spelling
//! out the rollback/snapshot wiring at every call site.

use crate::clock::Clock;
use crate::ident::{SystemId, TxId};
use crate::rollback::{RollbackError, RollbackManager};
use crate::snapshot::SnapshotManager;
use crate::transaction::{TransactionError, TransactionManager};
use crate::registry::SystemRegistry;
use crate::validation::ValidationManager;

/// Owns and wires the integration core's managers.
///
/// Fields are public: anything without a cross-manager call path is used
/// directly (`runtime.snapshots.capture(..)`, `runtime.registry.pause(..)`).
pub struct Runtime {
    /// System registry and lifecycle manager.
    pub registry: SystemRegistry,
    /// Snapshot manager.
    pub snapshots: SnapshotManager,
    /// Rollback manager.
    pub rollback: RollbackManager,
    /// Transaction manager.
    pub transactions: TransactionManager,
    /// Validation manager.
    pub validation: ValidationManager,
}

impl Runtime {
    /// Creates a runtime pinned to the zero clock.
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: SystemRegistry::new(),
            snapshots: SnapshotManager::new(),
            rollback: RollbackManager::new(),
            transactions: TransactionManager::new(),
            validation: ValidationManager::new(),
        }
    }

    /// Creates a runtime sharing one clock across every manager that keeps
    /// time (registry, transactions, rollback events).
    #[must_use]
    pub fn with_clock<C>(clock: C) -> Self
    where
        C: Clock + Clone + 'static,
    {
        Self {
            registry: SystemRegistry::with_clock(Box::new(clock.clone())),
            snapshots: SnapshotManager::new(),
            rollback: RollbackManager::with_clock(Box::new(clock.clone())),
            transactions: TransactionManager::with_clock(Box::new(clock)),
            validation: ValidationManager::new(),
        }
    }

    /// One frame: registry update, then the validation scheduler.
    pub fn tick(&mut self, current_tick: u64, dt_ms: f64) {
        self.registry.update(dt_ms);
        self.validation.tick(&self.snapshots, current_tick);
    }

    /// Captures a rollback checkpoint for `system_id`.
    pub fn rollback_capture(&mut self, system_id: SystemId) -> Result<(), RollbackError> {
        self.rollback.capture(&mut self.snapshots, system_id)
    }

    /// Restores the snapshot `steps` back from the newest capture.
    pub fn rollback_step_back(
        &mut self,
        system_id: SystemId,
        steps: u32,
    ) -> Result<(), RollbackError> {
        self.rollback.step_back(&mut self.snapshots, system_id, steps)
    }

    /// Commits a transaction, with the abort path wired to auto-rollback.
    pub fn commit(&mut self, tx: TxId) -> Result<(), TransactionError> {
        self.transactions
            .commit(tx, &mut self.rollback, &mut self.snapshots)
    }

    /// Aborts a transaction, running participant abort hooks and
    /// auto-rollback for mapped participants.
    pub fn abort(&mut self, tx: TxId, reason: &str) -> Result<(), TransactionError> {
        self.transactions
            .abort(tx, reason, &mut self.rollback, &mut self.snapshots)
    }

    /// Runs validation immediately.
    pub fn validate_now(&mut self, force_all: bool) {
        self.validation.run_now(&self.snapshots, force_all);
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}
