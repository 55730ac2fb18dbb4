/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Commit certificates and the Commit Assembler.
//!
//! A [`Commits`](types::Commits) certificate is the proof that a value is final at a height: a set of
//! precommit signatures for the exact `(height, round, value)` tuple from distinct validators that
//! together hold a quorum of the power of the validator set active at that height.
//!
//! Certificates are produced in two ways:
//! 1. Live, by the [`assembler`] once the round state machine sees a quorum of precommits for a value.
//! 2. During catch-up, by receiving one from a peer in a
//!    [`SyncValueResponse`](crate::sync::messages::SyncValueResponse).
//!
//! In both cases the certificate passes through [`assembler::finalize`], which verifies it against the
//! validator set before anything is persisted or handed to the
//! [`ValueSource`](crate::value_source::ValueSource).

pub(crate) mod assembler;

pub mod types;
