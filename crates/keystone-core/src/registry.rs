// SPDX-License-Identifier: Apache-2.0
// © Emberfall Project Contributors

//! Typed system registry with dependency-ordered lifecycle management.
//!
//! Systems register a descriptor (type, priority, capabilities, hard/soft
//! dependencies) and a [`GameSystem`] implementation. The registry owns the
//! lifecycle state machine, computes a topological initialization order over
//! hard dependencies, drives update ticks in that order, restarts failed
//! systems under exponential backoff, and keeps health and performance
//! counters.
//!
//! All time observations go through the injected clock; the registry never
//! reads OS time.

use std::any::Any;

use rustc_hash::FxHashMap;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::capability::{SystemCapabilities, SystemPriority, SystemState, SystemType};
use crate::clock::{Clock, ZeroClock};
use crate::fault::SystemFault;
use crate::ident::SystemId;

/// Errors surfaced by the system registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The registry is full.
    #[error("system registry full ({max} systems)")]
    CapacityExhausted {
        /// Maximum registrable systems.
        max: usize,
    },
    /// A system name must be unique and non-empty.
    #[error("system name {0:?} already registered")]
    DuplicateName(String),
    /// A system name must be non-empty.
    #[error("system name must not be empty")]
    EmptyName,
    /// A descriptor declared more dependencies than the registry tracks.
    #[error("system {name:?} declares more than {max} dependencies")]
    TooManyDependencies {
        /// Offending system name.
        name: String,
        /// Per-kind dependency bound.
        max: usize,
    },
    /// The system id is not registered.
    #[error("unknown system {0}")]
    UnknownId(SystemId),
    /// The operation is not legal in the system's current state.
    #[error("system {system} is {state}, operation not permitted")]
    WrongState {
        /// The system.
        system: SystemId,
        /// Its current state.
        state: SystemState,
    },
    /// A restart was requested before the backoff window elapsed.
    #[error("system {system} restart backoff active ({remaining_ms} ms remaining)")]
    BackoffActive {
        /// The system.
        system: SystemId,
        /// Milliseconds until a restart is permitted.
        remaining_ms: u64,
    },
    /// The init callback failed.
    #[error("system {system} initialization failed: {fault}")]
    InitFailed {
        /// The system.
        system: SystemId,
        /// The callback's reported fault.
        fault: SystemFault,
    },
    /// A hard dependency references a system that does not exist.
    #[error("system {system} depends on non-existent system {dependency}")]
    UnknownDependency {
        /// The dependent system.
        system: SystemId,
        /// The missing dependency.
        dependency: SystemId,
    },
    /// The hard-dependency graph contains a cycle.
    #[error("circular dependency detected in system graph")]
    CycleDetected,
}

/// Interface contract implemented by every registered system.
///
/// `init`, `update`, `shutdown`, and `state` are mandatory; the rest have
/// no-op defaults for systems that don't need them.
pub trait GameSystem {
    /// Brings the system up. Called from `Uninitialized` or `Failed`.
    fn init(&mut self) -> Result<(), SystemFault>;

    /// Advances the system by `dt_ms` milliseconds of game time.
    fn update(&mut self, dt_ms: f64);

    /// Tears the system down.
    fn shutdown(&mut self);

    /// Opaque access to the system's state for callers that know the
    /// concrete type.
    fn state(&self) -> &dyn Any;

    /// Applies a configuration value; returns `false` if unsupported.
    fn set_config(&mut self, config: &dyn Any) -> bool {
        let _ = config;
        false
    }

    /// Serializes the system's state, if supported.
    fn serialize(&self) -> Option<Vec<u8>> {
        None
    }

    /// Restores the system's state from `bytes`.
    fn deserialize(&mut self, bytes: &[u8]) -> Result<(), SystemFault> {
        let _ = bytes;
        Err(SystemFault::new("deserialize unsupported"))
    }

    /// One-line debug summary for reports.
    fn debug_info(&self) -> String {
        String::new()
    }
}

/// Estimated steady-state resource footprint, for capacity planning reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ResourceUsage {
    /// Estimated CPU usage, 0–100.
    pub cpu_percent: u32,
    /// Estimated memory footprint in KiB.
    pub memory_kb: u32,
    /// I/O operations per frame.
    pub io_ops_per_frame: u32,
    /// Network usage in KiB per second.
    pub network_kb_per_sec: u32,
}

/// Registration descriptor for a game system.
#[derive(Debug, Clone)]
pub struct SystemDescriptor {
    /// Unique, non-empty name.
    pub name: String,
    /// Version string.
    pub version: String,
    /// Broad classification.
    pub kind: SystemType,
    /// Priority level.
    pub priority: SystemPriority,
    /// Declared capability bits.
    pub capabilities: SystemCapabilities,
    /// Systems that must initialize first.
    pub hard_dependencies: Vec<SystemId>,
    /// Systems that improve functionality but are not required.
    pub soft_dependencies: Vec<SystemId>,
    /// Estimated resource footprint.
    pub resources: ResourceUsage,
}

impl SystemDescriptor {
    /// Convenience constructor with no dependencies and default resources.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        kind: SystemType,
        priority: SystemPriority,
        capabilities: SystemCapabilities,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            kind,
            priority,
            capabilities,
            hard_dependencies: Vec::new(),
            soft_dependencies: Vec::new(),
            resources: ResourceUsage::default(),
        }
    }
}

/// Runtime health indicators for one system.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SystemHealth {
    /// Seconds since the last successful (re)start.
    pub uptime_s: u32,
    /// Recoverable errors observed.
    pub error_count: u32,
    /// Successful (re)starts.
    pub restart_count: u32,
    /// Clock reading of the last successful update.
    pub last_update_ms: u64,
    /// Whether the system is responding to updates.
    pub responsive: bool,
}

/// A registered system: descriptor, state machine, and health.
pub struct SystemEntry {
    /// Registry-assigned id.
    pub id: SystemId,
    /// The descriptor supplied at registration.
    pub descriptor: SystemDescriptor,
    /// Current lifecycle state.
    pub state: SystemState,
    /// Health indicators.
    pub health: SystemHealth,
    /// Clock reading of the last (re)start.
    pub last_restart_ms: u64,
    /// Current restart backoff window.
    pub restart_backoff_ms: u32,
    system: Box<dyn GameSystem>,
}

impl SystemEntry {
    /// The system implementation.
    #[must_use]
    pub fn system(&self) -> &dyn GameSystem {
        self.system.as_ref()
    }

    /// Mutable access to the system implementation.
    pub fn system_mut(&mut self) -> &mut dyn GameSystem {
        self.system.as_mut()
    }
}

const INITIAL_BACKOFF_MS: u32 = 1_000;
const MAX_BACKOFF_MS: u32 = 60_000;

/// The typed system registry and lifecycle manager.
pub struct SystemRegistry {
    entries: Vec<SystemEntry>,
    index: FxHashMap<SystemId, usize>,
    next_id: u32,
    init_order: Vec<SystemId>,
    clock: Box<dyn Clock>,
    total_update_ms: f64,
    max_update_ms: f64,
    update_call_count: u32,
}

impl SystemRegistry {
    /// Maximum registrable systems.
    pub const MAX_SYSTEMS: usize = 32;
    /// Per-kind dependency bound on a descriptor.
    pub const MAX_DEPENDENCIES: usize = 8;

    /// Creates a registry pinned to the zero clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Box::new(ZeroClock))
    }

    /// Creates a registry reading time from the given clock.
    #[must_use]
    pub fn with_clock(clock: Box<dyn Clock>) -> Self {
        Self {
            entries: Vec::new(),
            index: FxHashMap::default(),
            next_id: 1,
            init_order: Vec::new(),
            clock,
            total_update_ms: 0.0,
            max_update_ms: 0.0,
            update_call_count: 0,
        }
    }

    /// Registers a system, assigning the next dense id.
    pub fn register(
        &mut self,
        descriptor: SystemDescriptor,
        system: Box<dyn GameSystem>,
    ) -> Result<SystemId, RegistryError> {
        if descriptor.name.is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if self.find_by_name(&descriptor.name).is_some() {
            return Err(RegistryError::DuplicateName(descriptor.name));
        }
        if self.entries.len() >= Self::MAX_SYSTEMS {
            return Err(RegistryError::CapacityExhausted {
                max: Self::MAX_SYSTEMS,
            });
        }
        if descriptor.hard_dependencies.len() > Self::MAX_DEPENDENCIES
            || descriptor.soft_dependencies.len() > Self::MAX_DEPENDENCIES
        {
            return Err(RegistryError::TooManyDependencies {
                name: descriptor.name,
                max: Self::MAX_DEPENDENCIES,
            });
        }

        let id = SystemId::from_raw(self.next_id);
        self.next_id += 1;
        info!(
            system = %descriptor.name,
            id = id.value(),
            kind = %descriptor.kind,
            priority = %descriptor.priority,
            "system registered"
        );
        self.index.insert(id, self.entries.len());
        self.entries.push(SystemEntry {
            id,
            descriptor,
            state: SystemState::Uninitialized,
            health: SystemHealth {
                responsive: true,
                ..SystemHealth::default()
            },
            last_restart_ms: self.clock.now_ms(),
            restart_backoff_ms: INITIAL_BACKOFF_MS,
            system,
        });
        Ok(id)
    }

    /// Unregisters a system, shutting it down first if needed.
    ///
    /// The initialization order is invalidated; rebuild it before the next
    /// dependency-ordered operation.
    pub fn unregister(&mut self, system_id: SystemId) -> Result<(), RegistryError> {
        let idx = self.entry_index(system_id)?;
        if matches!(
            self.entries[idx].state,
            SystemState::Running | SystemState::Paused
        ) {
            self.shutdown(system_id)?;
        }
        info!(system = %self.entries[idx].descriptor.name, "system unregistered");
        self.entries.swap_remove(idx);
        self.index.remove(&system_id);
        if idx < self.entries.len() {
            self.index.insert(self.entries[idx].id, idx);
        }
        self.init_order.clear();
        Ok(())
    }

    fn entry_index(&self, system_id: SystemId) -> Result<usize, RegistryError> {
        self.index
            .get(&system_id)
            .copied()
            .ok_or(RegistryError::UnknownId(system_id))
    }

    /// Returns the entry for `system_id`, if registered.
    #[must_use]
    pub fn get(&self, system_id: SystemId) -> Option<&SystemEntry> {
        let idx = self.index.get(&system_id)?;
        Some(&self.entries[*idx])
    }

    /// Mutable access to the entry for `system_id`, if registered.
    pub fn get_mut(&mut self, system_id: SystemId) -> Option<&mut SystemEntry> {
        let idx = *self.index.get(&system_id)?;
        Some(&mut self.entries[idx])
    }

    /// Finds a system by its unique name.
    #[must_use]
    pub fn find_by_name(&self, name: &str) -> Option<&SystemEntry> {
        self.entries.iter().find(|e| e.descriptor.name == name)
    }

    /// Returns `true` if the system declares the given capability bits.
    #[must_use]
    pub fn has_capability(&self, system_id: SystemId, capability: SystemCapabilities) -> bool {
        self.get(system_id)
            .is_some_and(|e| e.descriptor.capabilities.contains(capability))
    }

    /// Number of registered systems.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no systems are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // ── Lifecycle ───────────────────────────────────────────────────────

    /// Initializes a system. Permitted from `Uninitialized` or `Failed`.
    pub fn initialize(&mut self, system_id: SystemId) -> Result<(), RegistryError> {
        let idx = self.entry_index(system_id)?;
        let state = self.entries[idx].state;
        if !matches!(state, SystemState::Uninitialized | SystemState::Failed) {
            return Err(RegistryError::WrongState {
                system: system_id,
                state,
            });
        }

        self.entries[idx].state = SystemState::Initializing;
        debug!(system = %self.entries[idx].descriptor.name, "initializing");
        match self.entries[idx].system.init() {
            Ok(()) => {
                let now = self.clock.now_ms();
                let entry = &mut self.entries[idx];
                entry.state = SystemState::Running;
                entry.last_restart_ms = now;
                entry.health.restart_count += 1;
                entry.restart_backoff_ms = INITIAL_BACKOFF_MS;
                info!(system = %entry.descriptor.name, "system initialized");
                Ok(())
            }
            Err(fault) => {
                let entry = &mut self.entries[idx];
                entry.state = SystemState::Failed;
                entry.health.error_count += 1;
                error!(system = %entry.descriptor.name, %fault, "system initialization failed");
                Err(RegistryError::InitFailed {
                    system: system_id,
                    fault,
                })
            }
        }
    }

    /// Initializes every system in dependency order.
    ///
    /// Builds the dependency graph first if it has not been built. Stops at
    /// the first failure.
    pub fn initialize_all(&mut self) -> Result<(), RegistryError> {
        if self.init_order.len() != self.entries.len() {
            self.build_dependency_graph()?;
        }
        for id in self.init_order.clone() {
            if matches!(
                self.get(id).map(|e| e.state),
                Some(SystemState::Uninitialized | SystemState::Failed)
            ) {
                self.initialize(id)?;
            }
        }
        Ok(())
    }

    /// Shuts a system down.
    ///
    /// Idempotent from `Uninitialized` and `Shutdown`; otherwise runs the
    /// shutdown callback and transitions to `Shutdown`.
    pub fn shutdown(&mut self, system_id: SystemId) -> Result<(), RegistryError> {
        let idx = self.entry_index(system_id)?;
        if matches!(
            self.entries[idx].state,
            SystemState::Uninitialized | SystemState::Shutdown
        ) {
            return Ok(());
        }
        self.entries[idx].system.shutdown();
        self.entries[idx].state = SystemState::Shutdown;
        info!(system = %self.entries[idx].descriptor.name, "system shut down");
        Ok(())
    }

    /// Shuts down all running or paused systems in reverse registration order.
    pub fn shutdown_all(&mut self) {
        let ids: Vec<SystemId> = self
            .entries
            .iter()
            .rev()
            .filter(|e| matches!(e.state, SystemState::Running | SystemState::Paused))
            .map(|e| e.id)
            .collect();
        for id in ids {
            // Entries cannot disappear between collection and shutdown.
            let _ = self.shutdown(id);
        }
    }

    /// Pauses a running system.
    pub fn pause(&mut self, system_id: SystemId) -> Result<(), RegistryError> {
        let idx = self.entry_index(system_id)?;
        let state = self.entries[idx].state;
        if state != SystemState::Running {
            return Err(RegistryError::WrongState {
                system: system_id,
                state,
            });
        }
        self.entries[idx].state = SystemState::Paused;
        info!(system = %self.entries[idx].descriptor.name, "system paused");
        Ok(())
    }

    /// Resumes a paused system.
    pub fn resume(&mut self, system_id: SystemId) -> Result<(), RegistryError> {
        let idx = self.entry_index(system_id)?;
        let state = self.entries[idx].state;
        if state != SystemState::Paused {
            return Err(RegistryError::WrongState {
                system: system_id,
                state,
            });
        }
        self.entries[idx].state = SystemState::Running;
        info!(system = %self.entries[idx].descriptor.name, "system resumed");
        Ok(())
    }

    /// Restarts a system: shutdown, then initialize, gated by backoff.
    ///
    /// A failed restart doubles the backoff window up to the 60-second cap.
    pub fn restart(&mut self, system_id: SystemId) -> Result<(), RegistryError> {
        let idx = self.entry_index(system_id)?;
        let state = self.entries[idx].state;
        if matches!(state, SystemState::Uninitialized | SystemState::Shutdown) {
            return Err(RegistryError::WrongState {
                system: system_id,
                state,
            });
        }

        let now = self.clock.now_ms();
        let elapsed = now.saturating_sub(self.entries[idx].last_restart_ms);
        let backoff = u64::from(self.entries[idx].restart_backoff_ms);
        if elapsed < backoff {
            let remaining_ms = backoff - elapsed;
            warn!(
                system = %self.entries[idx].descriptor.name,
                remaining_ms,
                "restart refused, backoff active"
            );
            return Err(RegistryError::BackoffActive {
                system: system_id,
                remaining_ms,
            });
        }

        info!(system = %self.entries[idx].descriptor.name, "restarting");
        if matches!(state, SystemState::Running | SystemState::Paused) {
            self.shutdown(system_id)?;
        }
        self.entries[idx].state = SystemState::Uninitialized;
        let result = self.initialize(system_id);
        if result.is_err() {
            let entry = &mut self.entries[idx];
            entry.restart_backoff_ms = (entry.restart_backoff_ms * 2).min(MAX_BACKOFF_MS);
        }
        result
    }

    // ── Dependency management ───────────────────────────────────────────

    /// Computes the topological initialization order over hard dependencies.
    ///
    /// Repeatedly admits systems whose hard dependencies are all admitted;
    /// a stall before every system is admitted means a cycle.
    pub fn build_dependency_graph(&mut self) -> Result<(), RegistryError> {
        let mut ordered: Vec<SystemId> = Vec::with_capacity(self.entries.len());
        let mut admitted = vec![false; self.entries.len()];

        let mut made_progress = true;
        while made_progress && ordered.len() < self.entries.len() {
            made_progress = false;
            for (i, entry) in self.entries.iter().enumerate() {
                if admitted[i] {
                    continue;
                }
                let deps_satisfied = entry
                    .descriptor
                    .hard_dependencies
                    .iter()
                    .all(|dep| ordered.contains(dep));
                if deps_satisfied {
                    ordered.push(entry.id);
                    admitted[i] = true;
                    made_progress = true;
                }
            }
        }

        if ordered.len() != self.entries.len() {
            error!("circular dependency detected in system graph");
            return Err(RegistryError::CycleDetected);
        }
        debug!(systems = ordered.len(), "dependency graph built");
        self.init_order = ordered;
        Ok(())
    }

    /// Validates declared dependencies.
    ///
    /// Missing hard dependencies are errors; missing soft dependencies are
    /// logged as warnings. Cycles in the hard graph are detected by per-node
    /// depth-first probes.
    pub fn validate_dependencies(&self) -> Result<(), RegistryError> {
        for entry in &self.entries {
            for &dep in &entry.descriptor.hard_dependencies {
                if !self.index.contains_key(&dep) {
                    return Err(RegistryError::UnknownDependency {
                        system: entry.id,
                        dependency: dep,
                    });
                }
            }
            for &dep in &entry.descriptor.soft_dependencies {
                if !self.index.contains_key(&dep) {
                    warn!(
                        system = %entry.descriptor.name,
                        dependency = dep.value(),
                        "soft dependency does not exist"
                    );
                }
            }
        }

        for entry in &self.entries {
            let mut visiting = Vec::new();
            if self.probe_cycle(entry.id, &mut visiting) {
                return Err(RegistryError::CycleDetected);
            }
        }
        Ok(())
    }

    fn probe_cycle(&self, system_id: SystemId, visiting: &mut Vec<SystemId>) -> bool {
        if visiting.contains(&system_id) {
            return true;
        }
        let Some(entry) = self.get(system_id) else {
            return false;
        };
        visiting.push(system_id);
        for &dep in &entry.descriptor.hard_dependencies {
            if self.probe_cycle(dep, visiting) {
                return true;
            }
        }
        visiting.pop();
        false
    }

    /// The initialization order from the last [`Self::build_dependency_graph`].
    #[must_use]
    pub fn initialization_order(&self) -> &[SystemId] {
        &self.init_order
    }

    // ── Update loop ─────────────────────────────────────────────────────

    /// Advances every running system by `dt_ms`.
    ///
    /// Systems update in the built initialization order (registration order
    /// if the graph has not been built). Per-system wall time feeds the
    /// health and performance counters.
    pub fn update(&mut self, dt_ms: f64) {
        let frame_start = self.clock.now_ms();
        let order: Vec<usize> = if self.init_order.is_empty() {
            (0..self.entries.len()).collect()
        } else {
            self.init_order
                .iter()
                .filter_map(|id| self.index.get(id).copied())
                .collect()
        };

        for idx in order {
            if self.entries[idx].state != SystemState::Running {
                continue;
            }
            let start = self.clock.now_ms();
            self.entries[idx].system.update(dt_ms);
            let now = self.clock.now_ms();
            let elapsed = (now - start) as f64;
            if elapsed > self.max_update_ms {
                self.max_update_ms = elapsed;
            }
            let entry = &mut self.entries[idx];
            entry.health.last_update_ms = now;
            entry.health.uptime_s =
                (now.saturating_sub(entry.last_restart_ms) / 1_000) as u32;
            entry.health.responsive = true;
        }

        let frame_elapsed = (self.clock.now_ms() - frame_start) as f64;
        self.total_update_ms += frame_elapsed;
        self.update_call_count += 1;
    }

    // ── Health & performance ────────────────────────────────────────────

    /// A system is healthy when it is running and responsive.
    #[must_use]
    pub fn is_healthy(&self, system_id: SystemId) -> bool {
        self.get(system_id)
            .is_some_and(|e| e.state == SystemState::Running && e.health.responsive)
    }

    /// Mean frame update time across all update calls.
    #[must_use]
    pub fn average_update_ms(&self) -> f64 {
        if self.update_call_count == 0 {
            return 0.0;
        }
        self.total_update_ms / f64::from(self.update_call_count)
    }

    /// Worst single-system update time observed.
    #[must_use]
    pub fn max_update_ms(&self) -> f64 {
        self.max_update_ms
    }

    /// Number of update calls since the last counter reset.
    #[must_use]
    pub fn update_call_count(&self) -> u32 {
        self.update_call_count
    }

    /// Zeroes the performance counters.
    pub fn reset_performance_counters(&mut self) {
        self.total_update_ms = 0.0;
        self.max_update_ms = 0.0;
        self.update_call_count = 0;
    }

    // ── Reports ─────────────────────────────────────────────────────────

    /// Per-system health summary.
    #[must_use]
    pub fn health_report(&self) -> String {
        use std::fmt::Write as _;

        let mut out = String::from("Integration Health Report\n");
        let _ = writeln!(
            out,
            "Systems: {}/{} registered",
            self.entries.len(),
            Self::MAX_SYSTEMS
        );
        for entry in &self.entries {
            let _ = writeln!(
                out,
                "  {}: {} (errors: {}, restarts: {}, uptime: {}s)",
                entry.descriptor.name,
                entry.state,
                entry.health.error_count,
                entry.health.restart_count,
                entry.health.uptime_s,
            );
        }
        out
    }

    /// Capability matrix: one row per system, one column per capability.
    #[must_use]
    pub fn capability_matrix(&self) -> String {
        use std::fmt::Write as _;

        let mut out = String::from("Capability Matrix\n");
        for entry in &self.entries {
            let _ = writeln!(
                out,
                "  {:<24} [{}]",
                entry.descriptor.name, entry.descriptor.capabilities,
            );
        }
        out
    }

    /// Initialization-order report from the last dependency-graph build.
    #[must_use]
    pub fn init_report(&self) -> String {
        use std::fmt::Write as _;

        let mut out = String::from("Initialization Order\n");
        if self.init_order.is_empty() {
            out.push_str("  (dependency graph not built)\n");
            return out;
        }
        for (pos, id) in self.init_order.iter().enumerate() {
            if let Some(entry) = self.get(*id) {
                let _ = writeln!(
                    out,
                    "  {:>2}. {} (priority: {})",
                    pos + 1,
                    entry.descriptor.name,
                    entry.descriptor.priority,
                );
            }
        }
        out
    }

    /// Aggregate estimated resource usage by system type.
    #[must_use]
    pub fn resource_report(&self) -> String {
        use std::fmt::Write as _;

        let mut out = String::from("Estimated Resource Usage\n");
        let mut total_cpu = 0u32;
        let mut total_mem = 0u32;
        for entry in &self.entries {
            let res = entry.descriptor.resources;
            total_cpu += res.cpu_percent;
            total_mem += res.memory_kb;
            let _ = writeln!(
                out,
                "  {:<24} cpu={}% mem={}KiB io={}/frame net={}KiB/s",
                entry.descriptor.name,
                res.cpu_percent,
                res.memory_kb,
                res.io_ops_per_frame,
                res.network_kb_per_sec,
            );
        }
        let _ = writeln!(out, "  total: cpu={total_cpu}% mem={total_mem}KiB");
        out
    }
}

impl Default for SystemRegistry {
    fn default() -> Self {
        Self::new()
    }
}
