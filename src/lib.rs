/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! A Rust implementation of per-shard Tendermint consensus.
//!
//! Each shard of a sharded ledger (including its coordinator shard) decides one value per height with
//! an independent instance of a three-step (propose, prevote, precommit) Byzantine fault tolerant round
//! protocol. A decided value is proven by a [commit certificate](commits::types::Commits): precommits for
//! it from validators holding more than two thirds of the voting power of the shard's validator set.
//!
//! As long as validators holding at most a third of the power are Byzantine, no two different values are
//! ever committed at the same height. A replica that falls behind catches up by fetching decided values,
//! each checked against its certificate, from its peers.
//!
//! ## Pluggable components
//!
//! Library users provide:
//! - A [`Network`](networking::network::Network): point-to-point and broadcast messaging between peers.
//! - A [`KVStore`](commit_store::pluggables::KVStore): persistent storage for decided values and their
//!   commit certificates.
//! - A [`ValueSource`](value_source::ValueSource): produces the values this replica proposes, validates
//!   the values others propose, and applies decided values.
//! - A [`ValidatorSetRegistry`](types::validator_set::ValidatorSetRegistry): the validator set in effect
//!   at each height.
//!
//! These are put together into a running [`Replica`](replica::Replica) by the builder in [`replica`].

pub mod types;

pub mod tendermint;

pub mod pacemaker;

pub mod commits;

pub mod commit_store;

pub mod value_source;

pub mod networking;

pub mod sync;

pub mod events;

pub mod event_bus;

pub(crate) mod logging;

pub(crate) mod algorithm;

pub mod replica;
