/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Trait for pluggable sources and sinks of the values that replicas agree on.
//!
//! The round state machine never looks inside a value. It only handles
//! [`ShardHash`](crate::types::data_types::ShardHash)es, which name a value, and opaque byte
//! strings, which are a value's full content. Everything that depends on what a value actually is (a
//! block, a shard chunk, or anything else) is delegated to the library user's implementation of
//! [`ValueSource`].
//!
//! ## Determinism
//!
//! [`validate`](ValueSource::validate) must be deterministic: every correct replica must reach the same
//! verdict on the same `(height, value, full_value)`. Otherwise correct replicas may prevote
//! differently and fail to reach a polka.

use crate::{
    commits::types::Commits,
    types::data_types::{Height, ShardHash},
};

pub trait ValueSource: Send + 'static {
    /// Called when this replica is the proposer of a round at `height` and has no valid value to
    /// re-propose.
    ///
    /// Returns the hash of the new candidate value together with its full bytes.
    fn propose(&mut self, height: Height) -> (ShardHash, Vec<u8>);

    /// Called when the full bytes of a candidate value for `height` are received from the network,
    /// either in a [`FullProposal`](crate::tendermint::messages::FullProposal) or in a
    /// [`SyncValueResponse`](crate::sync::messages::SyncValueResponse).
    ///
    /// Returns whether `full_value` is acceptable at `height` and is actually named by `value`. Only
    /// values for which this returns `true` are ever prevoted for, locked on, or committed by this
    /// replica.
    fn validate(&mut self, height: Height, value: &ShardHash, full_value: &[u8]) -> bool;

    /// Get the full bytes of a value that this value source produced itself, or already has for some
    /// other reason.
    fn resolve(&self, value: &ShardHash) -> Option<Vec<u8>>;

    /// Called exactly once per height, when a value is final at that height, with its quorum
    /// certificate and full bytes.
    fn apply(&mut self, commits: &Commits, full_value: &[u8]);
}
