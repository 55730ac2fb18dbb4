/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Types and traits that are used across multiple components of the consensus engine.
//!
//! Types specific to a single component live in that component's module, e.g.,
//! [`crate::tendermint::messages`].

pub mod crypto_primitives;

pub mod data_types;

pub mod signed_messages;

pub mod validator_set;
