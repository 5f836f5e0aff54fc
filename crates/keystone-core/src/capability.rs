// SPDX-License-Identifier: Apache-2.0
// © Emberfall Project Contributors

//! System classification: type, priority, lifecycle state, capability bits.

/// Broad classification of a game system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SystemType {
    /// Gameplay-critical simulation (combat, physics, AI).
    Core,
    /// Content pipelines (loot, crafting, progression).
    Content,
    /// Player-facing presentation (HUD, menus, panels).
    Ui,
    /// Supporting machinery (persistence, world generation).
    Infrastructure,
}

impl core::fmt::Display for SystemType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Self::Core => "Core",
            Self::Content => "Content",
            Self::Ui => "UI",
            Self::Infrastructure => "Infrastructure",
        };
        f.write_str(name)
    }
}

/// How much the game depends on a system staying up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SystemPriority {
    /// Must never fail; the game is unplayable without it.
    Critical,
    /// Can degrade gracefully.
    Important,
    /// Can be disabled outright.
    Optional,
}

impl core::fmt::Display for SystemPriority {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Self::Critical => "Critical",
            Self::Important => "Important",
            Self::Optional => "Optional",
        };
        f.write_str(name)
    }
}

/// Lifecycle state of a registered system.
///
/// Transitions are enforced by the registry:
/// - `Uninitialized`/`Failed` → init → `Running` (or `Failed` on error).
/// - `Running` ↔ `Paused` via pause/resume.
/// - `Running`/`Paused` → `Shutdown`.
/// - restart = shutdown + init, gated by exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SystemState {
    /// Registered but never initialized.
    Uninitialized,
    /// Inside the init callback.
    Initializing,
    /// Receiving update ticks.
    Running,
    /// Temporarily not updated; resume returns to `Running`.
    Paused,
    /// Shut down; only restart leaves this state.
    Shutdown,
    /// Init failed; init or restart may retry.
    Failed,
}

impl core::fmt::Display for SystemState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Self::Uninitialized => "Uninitialized",
            Self::Initializing => "Initializing",
            Self::Running => "Running",
            Self::Paused => "Paused",
            Self::Shutdown => "Shutdown",
            Self::Failed => "Failed",
        };
        f.write_str(name)
    }
}

/// Declarative capability bits for a system.
///
/// A closed eight-bit set; combine flags with `|`.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SystemCapabilities(u8);

impl SystemCapabilities {
    /// No capabilities.
    pub const EMPTY: Self = Self(0);
    /// Creates or manages entities.
    pub const PROVIDES_ENTITIES: Self = Self(0x01);
    /// Subscribes to events.
    pub const CONSUMES_EVENTS: Self = Self(0x02);
    /// Publishes events.
    pub const PRODUCES_EVENTS: Self = Self(0x04);
    /// Needs a render pass.
    pub const REQUIRES_RENDERING: Self = Self(0x08);
    /// Needs an update tick.
    pub const REQUIRES_UPDATE: Self = Self(0x10);
    /// Accepts configuration.
    pub const CONFIGURABLE: Self = Self(0x20);
    /// Can save and load its state.
    pub const SERIALIZABLE: Self = Self(0x40);
    /// Supports hot reload.
    pub const HOT_RELOADABLE: Self = Self(0x80);

    /// Every flag paired with its short label, in bit order.
    pub const ALL: [(Self, &'static str); 8] = [
        (Self::PROVIDES_ENTITIES, "entities"),
        (Self::CONSUMES_EVENTS, "events-in"),
        (Self::PRODUCES_EVENTS, "events-out"),
        (Self::REQUIRES_RENDERING, "render"),
        (Self::REQUIRES_UPDATE, "update"),
        (Self::CONFIGURABLE, "config"),
        (Self::SERIALIZABLE, "serialize"),
        (Self::HOT_RELOADABLE, "hot-reload"),
    ];

    /// Constructs a set from raw bits.
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// Returns the raw bits.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Returns `true` if every flag in `other` is set in `self`.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns `true` if no flags are set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl core::ops::BitOr for SystemCapabilities {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl core::ops::BitOrAssign for SystemCapabilities {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl core::fmt::Display for SystemCapabilities {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        let mut first = true;
        for (flag, label) in Self::ALL {
            if self.contains(flag) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(label)?;
                first = false;
            }
        }
        Ok(())
    }
}
