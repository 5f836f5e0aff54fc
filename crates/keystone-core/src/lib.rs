// SPDX-License-Identifier: Apache-2.0
// © Emberfall Project Contributors
//! keystone-core: the Emberfall integration core.
//!
//! The runtime substrate the gameplay subsystems hang off of: a typed system
//! registry with dependency-ordered lifecycle management, versioned state
//! snapshots with byte deltas, bounded rollback rings, two-phase-commit
//! transactions with isolation levels, and scheduled state validation.
//!
//! Everything is single-threaded and cooperative: managers are plain values,
//! callbacks run to completion, and time comes from an injected [`Clock`].
//! With a fixed clock, an identical call sequence produces identical logs,
//! events, and statistics.
#![forbid(unsafe_code)]

mod capability;
mod clock;
mod fault;
mod ident;
mod registry;
mod ring;
mod rollback;
mod runtime;
mod snapshot;
mod taxonomy;
mod transaction;
mod validation;

// Re-exports for the stable public API.

/// System classification and capability bits.
pub use capability::{SystemCapabilities, SystemPriority, SystemState, SystemType};
/// Injectable time sources.
pub use clock::{Clock, ManualClock, ZeroClock};
/// Callback-side failure type.
pub use fault::SystemFault;
/// Identifier newtypes.
pub use ident::{ParticipantId, SystemId, TxId};
/// System registry and lifecycle management.
pub use registry::{
    GameSystem, RegistryError, ResourceUsage, SystemDescriptor, SystemEntry, SystemHealth,
    SystemRegistry,
};
/// Rollback rings, events, and auto-rollback.
pub use rollback::{
    RingEntryInfo, RollbackError, RollbackEvent, RollbackManager, RollbackStats,
};
/// The wired-together facade.
pub use runtime::Runtime;
/// Snapshots, deltas, and the capture/restore contract.
pub use snapshot::{
    AppliedDelta, CapturedState, DeltaRange, DeltaRecord, RestoreResult, Snapshot, SnapshotDelta,
    SnapshotDesc, SnapshotError, SnapshotManager, SnapshotSource, SnapshotStats,
};
/// The static system catalog.
pub use taxonomy::{SystemCatalog, SystemInfo, TaxonomyError};
/// Two-phase-commit transactions.
pub use transaction::{
    TransactionError, TransactionManager, TxIsolation, TxLogEntry, TxParticipant,
    TxParticipantDesc, TxState, TxStats,
};
/// Scheduled state validation.
pub use validation::{
    CrossRule, RepairOutcome, Severity, SystemValidator, ValidationError, ValidationEvent,
    ValidationManager, ValidationOutcome, ValidationStats,
};
