// SPDX-License-Identifier: Apache-2.0
// © Emberfall Project Contributors

//! Static catalog of Emberfall's known subsystems.
//!
//! The catalog is documentation the code can query: which systems exist, how
//! they are classified, and how far along each one is. It is deliberately not
//! a mirror of the live registry — entries describe the game's architecture,
//! including systems that are planned but not yet registered at runtime.

use thiserror::Error;

use crate::capability::{SystemCapabilities, SystemPriority, SystemType};

/// Errors surfaced by the system catalog.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaxonomyError {
    /// The catalog is full.
    #[error("system catalog full ({max} entries)")]
    CapacityExhausted {
        /// Maximum catalog entries.
        max: usize,
    },
    /// A catalog id must be unique and non-zero.
    #[error("catalog id {0} already present")]
    DuplicateId(u32),
    /// Catalog ids must be non-zero.
    #[error("catalog id must be non-zero")]
    InvalidId,
    /// A catalog name must be unique.
    #[error("catalog name {0:?} already present")]
    DuplicateName(String),
    /// A catalog name must be non-empty.
    #[error("catalog name must not be empty")]
    EmptyName,
}

/// One catalog entry describing a known subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SystemInfo {
    /// Catalog-local id (non-zero; unrelated to registry ids).
    pub system_id: u32,
    /// Unique name.
    pub name: &'static str,
    /// One-line description.
    pub description: &'static str,
    /// Broad classification.
    pub kind: SystemType,
    /// Priority level.
    pub priority: SystemPriority,
    /// Declared capability bits.
    pub capabilities: SystemCapabilities,
    /// Whether the system exists in the codebase today.
    pub implemented: bool,
    /// Short implementation status note.
    pub status: &'static str,
    /// Version string of the current implementation.
    pub version: &'static str,
}

/// The static system catalog.
#[derive(Debug, Clone, Default)]
pub struct SystemCatalog {
    systems: Vec<SystemInfo>,
}

impl SystemCatalog {
    /// Maximum catalog entries.
    pub const MAX_SYSTEMS: usize = 64;

    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a catalog pre-populated with Emberfall's known subsystems.
    #[must_use]
    pub fn with_known_systems() -> Self {
        let mut catalog = Self::new();
        for info in KNOWN_SYSTEMS {
            // The built-in table is validated by tests; entries cannot collide.
            let _ = catalog.add(*info);
        }
        catalog
    }

    /// Adds an entry to the catalog.
    pub fn add(&mut self, info: SystemInfo) -> Result<(), TaxonomyError> {
        if info.system_id == 0 {
            return Err(TaxonomyError::InvalidId);
        }
        if info.name.is_empty() {
            return Err(TaxonomyError::EmptyName);
        }
        if self.systems.len() >= Self::MAX_SYSTEMS {
            return Err(TaxonomyError::CapacityExhausted {
                max: Self::MAX_SYSTEMS,
            });
        }
        if self.systems.iter().any(|s| s.system_id == info.system_id) {
            return Err(TaxonomyError::DuplicateId(info.system_id));
        }
        if self.systems.iter().any(|s| s.name == info.name) {
            return Err(TaxonomyError::DuplicateName(info.name.to_owned()));
        }
        self.systems.push(info);
        Ok(())
    }

    /// Looks an entry up by catalog id.
    #[must_use]
    pub fn get(&self, system_id: u32) -> Option<&SystemInfo> {
        self.systems.iter().find(|s| s.system_id == system_id)
    }

    /// Looks an entry up by name.
    #[must_use]
    pub fn find_by_name(&self, name: &str) -> Option<&SystemInfo> {
        self.systems.iter().find(|s| s.name == name)
    }

    /// Number of catalog entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.systems.len()
    }

    /// Returns `true` if the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }

    /// Iterates all entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &SystemInfo> {
        self.systems.iter()
    }

    /// Counts entries of the given type.
    #[must_use]
    pub fn count_by_type(&self, kind: SystemType) -> usize {
        self.systems.iter().filter(|s| s.kind == kind).count()
    }

    /// Counts entries of the given priority.
    #[must_use]
    pub fn count_by_priority(&self, priority: SystemPriority) -> usize {
        self.systems.iter().filter(|s| s.priority == priority).count()
    }

    /// Counts entries declaring the given capability bits.
    #[must_use]
    pub fn count_by_capability(&self, capability: SystemCapabilities) -> usize {
        self.systems
            .iter()
            .filter(|s| s.capabilities.contains(capability))
            .count()
    }

    /// Counts implemented entries.
    #[must_use]
    pub fn count_implemented(&self) -> usize {
        self.systems.iter().filter(|s| s.implemented).count()
    }

    /// Validates catalog integrity: unique non-zero ids, unique non-empty
    /// names.
    pub fn validate(&self) -> Result<(), TaxonomyError> {
        for (i, info) in self.systems.iter().enumerate() {
            if info.system_id == 0 {
                return Err(TaxonomyError::InvalidId);
            }
            if info.name.is_empty() {
                return Err(TaxonomyError::EmptyName);
            }
            for other in &self.systems[..i] {
                if other.system_id == info.system_id {
                    return Err(TaxonomyError::DuplicateId(info.system_id));
                }
                if other.name == info.name {
                    return Err(TaxonomyError::DuplicateName(info.name.to_owned()));
                }
            }
        }
        Ok(())
    }

    /// Capability matrix over the catalog.
    #[must_use]
    pub fn capability_matrix(&self) -> String {
        use std::fmt::Write as _;

        let mut out = String::from("Catalog Capability Matrix\n");
        for info in &self.systems {
            let _ = writeln!(out, "  {:<24} [{}]", info.name, info.capabilities);
        }
        for (flag, label) in SystemCapabilities::ALL {
            let _ = writeln!(
                out,
                "  {:>12}: {} systems",
                label,
                self.count_by_capability(flag)
            );
        }
        out
    }

    /// Initialization-requirements report: systems grouped by priority in
    /// the order they must come up.
    #[must_use]
    pub fn init_report(&self) -> String {
        use std::fmt::Write as _;

        let mut out = String::from("System Initialization Requirements\n");
        for priority in [
            SystemPriority::Critical,
            SystemPriority::Important,
            SystemPriority::Optional,
        ] {
            let count = self.count_by_priority(priority);
            if count == 0 {
                continue;
            }
            let _ = writeln!(out, "\n{priority} Priority Systems ({count}):");
            for info in self.systems.iter().filter(|s| s.priority == priority) {
                let _ = writeln!(
                    out,
                    "  {:<24} {} [{}]",
                    info.name,
                    info.kind,
                    if info.implemented { info.status } else { "planned" },
                );
            }
        }
        out
    }

    /// Resource-usage analysis over the catalog.
    ///
    /// The catalog carries no measured figures, so the analysis is the
    /// type-based heuristic the load planning uses: Core systems dominate
    /// CPU, Content systems dominate memory, Infrastructure systems dominate
    /// I/O. Implemented-vs-planned counts bound how much of the projected
    /// load exists today.
    #[must_use]
    pub fn resource_report(&self) -> String {
        use std::fmt::Write as _;

        let mut out = String::from("System Resource Usage Analysis\n");
        let total = self.systems.len();
        let _ = writeln!(out, "Total Systems: {total}");
        if total == 0 {
            return out;
        }

        let percent = |count: usize| count as f64 * 100.0 / total as f64;
        let high_cpu = self.count_by_type(SystemType::Core);
        let high_memory = self.count_by_type(SystemType::Content);
        let io_intensive = self.count_by_type(SystemType::Infrastructure);
        let _ = writeln!(out, "High CPU Usage: {high_cpu} ({:.1}%)", percent(high_cpu));
        let _ = writeln!(
            out,
            "High Memory Usage: {high_memory} ({:.1}%)",
            percent(high_memory)
        );
        let _ = writeln!(
            out,
            "I/O Intensive: {io_intensive} ({:.1}%)",
            percent(io_intensive)
        );

        let implemented = self.count_implemented();
        let _ = writeln!(
            out,
            "Implemented: {implemented} ({:.1}%), planned: {}",
            percent(implemented),
            total - implemented,
        );
        out
    }

    /// Summary report: counts by type, priority, and implementation status.
    #[must_use]
    pub fn report(&self) -> String {
        use std::fmt::Write as _;

        let mut out = String::from("System Catalog\n");
        let _ = writeln!(
            out,
            "  {} systems ({} implemented)",
            self.systems.len(),
            self.count_implemented()
        );
        for kind in [
            SystemType::Core,
            SystemType::Content,
            SystemType::Ui,
            SystemType::Infrastructure,
        ] {
            let _ = writeln!(out, "  {}: {}", kind, self.count_by_type(kind));
        }
        for priority in [
            SystemPriority::Critical,
            SystemPriority::Important,
            SystemPriority::Optional,
        ] {
            let _ = writeln!(out, "  {}: {}", priority, self.count_by_priority(priority));
        }
        for info in &self.systems {
            let _ = writeln!(
                out,
                "  [{}] {:<24} {} v{} — {}",
                if info.implemented { "x" } else { " " },
                info.name,
                info.status,
                info.version,
                info.description,
            );
        }
        out
    }
}

/// Emberfall's known subsystems.
const KNOWN_SYSTEMS: &[SystemInfo] = &[
    SystemInfo {
        system_id: 1,
        name: "combat",
        description: "Damage resolution, status effects, hit reactions",
        kind: SystemType::Core,
        priority: SystemPriority::Critical,
        capabilities: SystemCapabilities::from_bits(0x17), // entities|events|update
        implemented: true,
        status: "stable",
        version: "1.4.0",
    },
    SystemInfo {
        system_id: 2,
        name: "player-progression",
        description: "Experience, levels, mastery tracks",
        kind: SystemType::Core,
        priority: SystemPriority::Critical,
        capabilities: SystemCapabilities::from_bits(0x56), // events|update|serialize
        implemented: true,
        status: "stable",
        version: "1.2.1",
    },
    SystemInfo {
        system_id: 3,
        name: "enemy-ai",
        description: "Behavior trees, perception, group tactics",
        kind: SystemType::Core,
        priority: SystemPriority::Critical,
        capabilities: SystemCapabilities::from_bits(0x15), // entities|events-out|update
        implemented: true,
        status: "stable",
        version: "1.3.0",
    },
    SystemInfo {
        system_id: 4,
        name: "physics",
        description: "Collision, knockback, projectile sweep",
        kind: SystemType::Core,
        priority: SystemPriority::Critical,
        capabilities: SystemCapabilities::from_bits(0x11), // entities|update
        implemented: true,
        status: "stable",
        version: "1.1.0",
    },
    SystemInfo {
        system_id: 10,
        name: "loot",
        description: "Drop tables, rarity rolls, loot instances",
        kind: SystemType::Content,
        priority: SystemPriority::Important,
        capabilities: SystemCapabilities::from_bits(0x57), // entities|events|update|serialize
        implemented: true,
        status: "stable",
        version: "1.5.2",
    },
    SystemInfo {
        system_id: 11,
        name: "crafting",
        description: "Recipes, material registry, upgrade paths",
        kind: SystemType::Content,
        priority: SystemPriority::Important,
        capabilities: SystemCapabilities::from_bits(0x62), // events-in|config|serialize
        implemented: true,
        status: "stable",
        version: "1.0.3",
    },
    SystemInfo {
        system_id: 12,
        name: "vendor-economy",
        description: "Vendor inventories, pricing curves, restock",
        kind: SystemType::Content,
        priority: SystemPriority::Important,
        capabilities: SystemCapabilities::from_bits(0x72), // events-in|config|serialize|update
        implemented: true,
        status: "stable",
        version: "1.1.4",
    },
    SystemInfo {
        system_id: 13,
        name: "dialogue",
        description: "Branching dialogue, quest hooks",
        kind: SystemType::Content,
        priority: SystemPriority::Optional,
        capabilities: SystemCapabilities::from_bits(0x26), // events|config
        implemented: false,
        status: "planned",
        version: "0.0.0",
    },
    SystemInfo {
        system_id: 20,
        name: "hud",
        description: "Health bars, buff belt, minimap overlays",
        kind: SystemType::Ui,
        priority: SystemPriority::Important,
        capabilities: SystemCapabilities::from_bits(0x1a), // events-in|render|update
        implemented: true,
        status: "stable",
        version: "1.6.0",
    },
    SystemInfo {
        system_id: 21,
        name: "inventory-ui",
        description: "Grid inventory, drag-drop, comparison tooltips",
        kind: SystemType::Ui,
        priority: SystemPriority::Important,
        capabilities: SystemCapabilities::from_bits(0x0a), // events-in|render
        implemented: true,
        status: "stable",
        version: "1.2.0",
    },
    SystemInfo {
        system_id: 22,
        name: "vendor-ui",
        description: "Vendor panels, buyback tab, haggling",
        kind: SystemType::Ui,
        priority: SystemPriority::Optional,
        capabilities: SystemCapabilities::from_bits(0x0a), // events-in|render
        implemented: true,
        status: "beta",
        version: "0.9.1",
    },
    SystemInfo {
        system_id: 30,
        name: "world-gen",
        description: "Tile generation, vegetation, biome stitching",
        kind: SystemType::Infrastructure,
        priority: SystemPriority::Critical,
        capabilities: SystemCapabilities::from_bits(0x21), // entities|config
        implemented: true,
        status: "stable",
        version: "2.0.0",
    },
    SystemInfo {
        system_id: 31,
        name: "persistence",
        description: "Save sections, autosave, migration",
        kind: SystemType::Infrastructure,
        priority: SystemPriority::Critical,
        capabilities: SystemCapabilities::from_bits(0x60), // config|serialize
        implemented: true,
        status: "stable",
        version: "1.3.2",
    },
    SystemInfo {
        system_id: 32,
        name: "audio",
        description: "Mixing, positional cues, music layers",
        kind: SystemType::Infrastructure,
        priority: SystemPriority::Optional,
        capabilities: SystemCapabilities::from_bits(0x32), // events-in|update|config
        implemented: true,
        status: "stable",
        version: "1.0.0",
    },
    SystemInfo {
        system_id: 33,
        name: "pathfinding",
        description: "Nav grid, flow fields, path caching",
        kind: SystemType::Infrastructure,
        priority: SystemPriority::Important,
        capabilities: SystemCapabilities::from_bits(0x10), // update
        implemented: true,
        status: "stable",
        version: "1.1.1",
    },
    SystemInfo {
        system_id: 34,
        name: "hot-reload",
        description: "Config and asset hot reload in dev builds",
        kind: SystemType::Infrastructure,
        priority: SystemPriority::Optional,
        capabilities: SystemCapabilities::from_bits(0xa0), // config|hot-reload
        implemented: false,
        status: "prototype",
        version: "0.2.0",
    },
];
