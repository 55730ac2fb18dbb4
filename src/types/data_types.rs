/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Types that exist only to store bytes, and do not have any major "active" behavior.

use std::{
    fmt::{self, Debug, Display, Formatter},
    hash::Hash,
    ops::{Add, AddAssign, SubAssign},
};

use borsh::{BorshDeserialize, BorshSerialize};

/// Position of a consensus instance: the shard it belongs to, and the block number within that shard.
///
/// Every shard runs an independent sequence of consensus instances, one per block number. Two heights
/// with different `shard_index`es never interact: messages that name another shard are dropped.
///
/// `Height`s are ordered first by `shard_index`, then by `block_number`, so comparisons between heights
/// of the same shard follow block numbers.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize,
)]
pub struct Height {
    shard_index: u32,
    block_number: u64,
}

impl Height {
    /// Create a new `Height` for `block_number` in the shard identified by `shard_index`.
    pub const fn new(shard_index: u32, block_number: u64) -> Self {
        Self {
            shard_index,
            block_number,
        }
    }

    /// Get the index of the shard this `Height` belongs to.
    pub const fn shard_index(&self) -> u32 {
        self.shard_index
    }

    /// Get the block number of this `Height`.
    pub const fn block_number(&self) -> u64 {
        self.block_number
    }

    /// Get the height that directly follows this one in the same shard.
    pub const fn next(&self) -> Self {
        Self::new(self.shard_index, self.block_number + 1)
    }

    /// Get the height that directly precedes this one in the same shard, saturating at block number 0.
    pub const fn prev(&self) -> Self {
        Self::new(self.shard_index, self.block_number.saturating_sub(1))
    }

    /// Get the little-endian representation of this `Height`, used as part of storage keys.
    pub fn to_le_bytes(&self) -> [u8; 12] {
        let mut bytes = [0u8; 12];
        bytes[..4].copy_from_slice(&self.shard_index.to_le_bytes());
        bytes[4..].copy_from_slice(&self.block_number.to_le_bytes());
        bytes
    }
}

impl Display for Height {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.shard_index, self.block_number)
    }
}

impl Add<u64> for Height {
    type Output = Height;

    fn add(self, rhs: u64) -> Self::Output {
        Height::new(self.shard_index, self.block_number.saturating_add(rhs))
    }
}

/// Round number within a single [`Height`]. Starts at 0 and only ever increases.
///
/// The special value [`Round::nil`] (`-1`) is used as the `pol_round` of fresh proposals, i.e.,
/// proposals that do not re-propose a value that gathered a polka in an earlier round.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize,
)]
pub struct Round(i64);

impl Round {
    /// Create a new `Round` wrapping `int`.
    pub const fn new(int: i64) -> Self {
        Self(int)
    }

    /// Get the first round of every height, which is 0.
    pub const fn init() -> Self {
        Self(0)
    }

    /// Get the "no round" marker, which is -1.
    pub const fn nil() -> Self {
        Self(-1)
    }

    /// Check whether this is the "no round" marker.
    pub const fn is_nil(&self) -> bool {
        self.0 < 0
    }

    /// Get the inner `i64` of this `Round`.
    pub const fn int(&self) -> i64 {
        self.0
    }
}

impl Display for Round {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

impl Add<i64> for Round {
    type Output = Round;

    fn add(self, rhs: i64) -> Self::Output {
        Round(self.0.add(rhs))
    }
}

/// 32-byte cryptographic hash.
///
/// Inside this crate these are always SHA256 hashes, computed with
/// [`CryptoHasher`](super::crypto_primitives::CryptoHasher).
#[derive(Clone, Copy, PartialEq, Eq, Hash, BorshDeserialize, BorshSerialize)]
pub struct CryptoHash([u8; 32]);

impl CryptoHash {
    /// Create a new `CryptoHash` wrapping `bytes`.
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the inner `[u8; 32]` value of this `CryptoHash`.
    pub const fn bytes(&self) -> [u8; 32] {
        self.0
    }
}

impl Display for CryptoHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Debug for CryptoHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identifier of a candidate value: the hash of the full value together with the index of the shard the
/// value was produced for.
///
/// Votes and proposals carry only the `ShardHash`. The full value bytes travel separately, in a
/// [`FullProposal`](crate::tendermint::messages::FullProposal) or a
/// [`SyncValueResponse`](crate::sync::messages::SyncValueResponse), and are resolved through the
/// [`ValueSource`](crate::value_source::ValueSource).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, BorshDeserialize, BorshSerialize)]
pub struct ShardHash {
    pub shard_index: u32,
    pub hash: CryptoHash,
}

impl ShardHash {
    /// Create a new `ShardHash`.
    pub const fn new(shard_index: u32, hash: CryptoHash) -> Self {
        Self { shard_index, hash }
    }
}

/// Ed25519 digital signature.
///
/// Produced using the [`ed25519_dalek`] crate, whose main definitions are re-exported from the
/// [`crypto_primitives`](super::crypto_primitives) module.
#[derive(Clone, Copy, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct SignatureBytes([u8; 64]);

impl SignatureBytes {
    /// Create a new `SignatureBytes` wrapping `bytes`.
    pub const fn new(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    /// Get the inner `[u8; 64]` value of this `SignatureBytes`.
    pub const fn bytes(&self) -> [u8; 64] {
        self.0
    }
}

impl Debug for SignatureBytes {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Serializable form of an Ed25519 verifying key.
pub type VerifyingKeyBytes = [u8; 32];

/// Weight of a specific validator's votes in consensus decisions.
///
/// The higher the power, the more weight the validator's votes have.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, BorshDeserialize, BorshSerialize)]
pub struct Power(u64);

impl Power {
    /// Create a new `Power` wrapping `int`.
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    /// Get the inner `u64` value of this `Power`.
    pub const fn int(&self) -> u64 {
        self.0
    }
}

/// Sum of the [`Power`]s of a set of validators.
///
/// The inner type is `u128`, which is bigger than the inner `u64` of `Power`, so that summing up large
/// `Power`s does not cause `TotalPower` to overflow.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, BorshDeserialize, BorshSerialize)]
pub struct TotalPower(u128);

impl TotalPower {
    /// Create a new `TotalPower` wrapping `int`.
    pub const fn new(int: u128) -> Self {
        Self(int)
    }

    /// Get the inner `u128` value of this `TotalPower`.
    pub const fn int(&self) -> u128 {
        self.0
    }
}

impl AddAssign<Power> for TotalPower {
    fn add_assign(&mut self, rhs: Power) {
        self.0.add_assign(rhs.0 as u128)
    }
}

impl SubAssign<Power> for TotalPower {
    fn sub_assign(&mut self, rhs: Power) {
        self.0 = self.0.saturating_sub(rhs.0 as u128)
    }
}

/// Size of a buffer (in bytes).
#[derive(Clone, Copy, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct BufferSize(u64);

impl BufferSize {
    /// Create a new `BufferSize` wrapping `int`.
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    /// Get the inner `u64` value of this `BufferSize`.
    pub const fn int(&self) -> u64 {
        self.0
    }
}

impl AddAssign<u64> for BufferSize {
    fn add_assign(&mut self, rhs: u64) {
        self.0.add_assign(rhs)
    }
}

impl SubAssign<u64> for BufferSize {
    fn sub_assign(&mut self, rhs: u64) {
        self.0.sub_assign(rhs)
    }
}
