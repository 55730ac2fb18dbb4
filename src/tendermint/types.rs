/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Types specific to the round state machine.

use borsh::{BorshDeserialize, BorshSerialize};

use crate::types::data_types::{Height, Round, ShardHash};

/// The step a replica is in within the current round.
///
/// A round always starts in `Propose`. `Commit` is entered once a value is decided at the current
/// height, and is left only by moving on to the next height.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshSerialize, BorshDeserialize)]
pub enum Step {
    Propose,
    Prevote,
    Precommit,
    Commit,
}

/// A value together with the round in which it gathered a polka.
///
/// Used both for a validator's lock (the value it precommitted and will not abandon without a later
/// polka) and for its valid value (the most recent value it saw a polka for, which it re-proposes when
/// it becomes proposer).
#[derive(Clone, Copy, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct LockedValue {
    pub round: Round,
    pub value: ShardHash,
}

/// The in-memory voting state of a replica at its current height.
#[derive(Clone, Debug)]
pub(crate) struct RoundState {
    pub(crate) height: Height,
    pub(crate) round: Round,
    pub(crate) step: Step,
    pub(crate) locked: Option<LockedValue>,
    pub(crate) valid: Option<LockedValue>,
}

impl RoundState {
    /// The state of a replica that has just entered `height`, before round 0 starts.
    pub(crate) fn new(height: Height) -> Self {
        Self {
            height,
            round: Round::init(),
            step: Step::Propose,
            locked: None,
            valid: None,
        }
    }
}
