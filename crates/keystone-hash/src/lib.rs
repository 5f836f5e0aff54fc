// SPDX-License-Identifier: Apache-2.0
// © Emberfall Project Contributors
//! FNV-1a hashing over byte buffers.
//!
//! The integration core hashes snapshot payloads, validates unchanged state by
//! hash comparison, and stamps delta-journal records — all with FNV-1a. The
//! algorithm is fixed here byte for byte so that hashes are stable across
//! platforms and builds:
//!
//! - start from the offset basis, then for each input byte: XOR the byte into
//!   the state, multiply by the FNV prime (wrapping).
//! - 32- and 64-bit variants use the standard basis/prime constants.
//!
//! Changing either constant or the XOR/multiply order changes every recorded
//! hash and must be treated as a breaking change.

/// 32-bit FNV offset basis.
pub const FNV32_OFFSET_BASIS: u32 = 0x811c_9dc5;
/// 32-bit FNV prime.
pub const FNV32_PRIME: u32 = 0x0100_0193;
/// 64-bit FNV offset basis.
pub const FNV64_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
/// 64-bit FNV prime.
pub const FNV64_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Computes the FNV-1a 32-bit hash of `data`.
#[must_use]
pub fn fnv1a32(data: &[u8]) -> u32 {
    let mut state = FNV32_OFFSET_BASIS;
    for &byte in data {
        state ^= u32::from(byte);
        state = state.wrapping_mul(FNV32_PRIME);
    }
    state
}

/// Computes the FNV-1a 64-bit hash of `data`.
#[must_use]
pub fn fnv1a64(data: &[u8]) -> u64 {
    let mut state = FNV64_OFFSET_BASIS;
    for &byte in data {
        state ^= u64::from(byte);
        state = state.wrapping_mul(FNV64_PRIME);
    }
    state
}

/// Streaming FNV-1a 64-bit hasher.
///
/// Feeding a buffer in any number of chunks yields the same digest as hashing
/// it in one call to [`fnv1a64`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fnv64 {
    state: u64,
}

impl Fnv64 {
    /// Creates a hasher seeded with the offset basis.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: FNV64_OFFSET_BASIS,
        }
    }

    /// Absorbs `data` into the hash state.
    pub fn update(&mut self, data: &[u8]) -> &mut Self {
        for &byte in data {
            self.state ^= u64::from(byte);
            self.state = self.state.wrapping_mul(FNV64_PRIME);
        }
        self
    }

    /// Returns the current digest without consuming the hasher.
    #[must_use]
    pub const fn finish(&self) -> u64 {
        self.state
    }
}

impl Default for Fnv64 {
    fn default() -> Self {
        Self::new()
    }
}
