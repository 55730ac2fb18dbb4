/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Subprotocol for deciding one value per height of a shard.
//!
//! ## Heights and rounds
//!
//! Each shard decides a sequence of values, one per [`Height`](crate::types::data_types::Height). A
//! height is decided in one or more rounds. Every round has a designated proposer, selected by
//! [`roles::select_proposer`], and goes through three steps:
//! 1. **Propose**: the proposer broadcasts a [`Proposal`](messages::Proposal) for a value together with
//!    the value's full bytes in a [`FullProposal`](messages::FullProposal). Everyone else waits for it
//!    until the propose timeout.
//! 2. **Prevote**: every validator broadcasts a prevote, for the proposed value if it is valid and
//!    compatible with its lock, or for nil otherwise.
//! 3. **Precommit**: a validator that sees a polka (a quorum of prevotes for the same value) locks on
//!    the value and precommits it. A polka for nil, or the prevote timeout, leads to a precommit for nil.
//!
//! A quorum of precommits for a value in any round of the height decides it. The precommits are
//! assembled into a [`Commits`](crate::commits::types::Commits) certificate, persisted, and the replica
//! moves on to the next height. A quorum of precommits for nil, or the precommit timeout, moves the
//! replica to the next round of the same height instead.
//!
//! ## Locks
//!
//! A validator that precommits a value in round `r` is locked on it. In later rounds, it only prevotes
//! for a different value if the proposal carries a `pol_round` of at least the lock's round, and the
//! validator has itself seen the polka for that value in `pol_round`. This is what stops two values from
//! being decided at the same height, as long as validators with less than a third of the power are
//! faulty.
//!
//! ## Catch-up
//!
//! A replica that falls behind does not vote its way through the heights it missed. It fetches decided
//! values with their certificates from peers instead. See [`sync`](crate::sync).

pub(crate) mod aggregator;

pub(crate) mod implementation;

pub mod messages;

pub mod roles;

pub mod types;
