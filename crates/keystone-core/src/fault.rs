// SPDX-License-Identifier: Apache-2.0
// © Emberfall Project Contributors

//! Callback-side failure type.

use thiserror::Error;

/// Failure reported by game-side callback code.
///
/// Carried back through the managers when an `init`, `capture`, `restore`,
/// `prepare`, `commit`, or `deserialize` hook fails. The message is the
/// callback's own description; managers truncate it where their records are
/// bounded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct SystemFault {
    message: String,
}

impl SystemFault {
    /// Creates a fault with the given message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Returns the fault message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}
