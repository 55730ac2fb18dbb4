/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Step timeouts of the round state machine.
//!
//! Every step of a round (propose, prevote and precommit) is bounded by a timeout. Timeouts are
//! wall-clock based and are scheduled when a step is entered, or (for the precommit step) when a quorum
//! of precommits for any value has been seen. When the round or height changes, all pending timeouts
//! are cancelled.
//!
//! ## Linear backoff
//!
//! Liveness requires that, after the network becomes synchronous, rounds eventually last long enough
//! for a quorum of validators to go through all three steps together. To get there without
//! synchronized clocks, the timeout of every step grows linearly with the round number:
//!
//! ```text
//! timeout(round, step) = base(step) + round * timeout_delta
//! ```
//!
//! The base of each step and `timeout_delta` are set in the replica's
//! [`Configuration`](crate::replica::Configuration).

pub(crate) mod implementation;
