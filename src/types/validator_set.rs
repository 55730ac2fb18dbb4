/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The Validator Set Registry: validator identities, their voting powers, and quorum arithmetic.

use borsh::{BorshDeserialize, BorshSerialize};
use std::{collections::HashMap, slice};

use super::data_types::{Height, Power, TotalPower, VerifyingKeyBytes};

pub use ed25519_dalek::{Signature, SigningKey, VerifyingKey};

/// Stores the identities of validators and their voting powers.
///
/// ## Ordering of validators
///
/// `ValidatorSet` internally maintains the list of validators in ascending order of their
/// `VerifyingKey`s, and avails the methods [`validators`](ValidatorSet::validators),
/// [`validators_and_powers`](ValidatorSet::validators_and_powers), and
/// [`position`](ValidatorSet::position) that users can use to get them in this order. Proposer selection
/// walks validators in this order, so every replica that holds the same set picks the same proposer.
///
/// ## Limits to total power
///
/// Users must make sure that the total power of the validator set does not exceed `u128::MAX/2`.
#[derive(Clone, Debug, PartialEq)]
pub struct ValidatorSet {
    // The verifying keys of validators are included here in ascending order.
    validators: Vec<VerifyingKey>,
    powers: HashMap<VerifyingKey, Power>,
}

impl Default for ValidatorSet {
    fn default() -> Self {
        ValidatorSet::new()
    }
}

impl ValidatorSet {
    /// Create an empty validator set.
    pub fn new() -> ValidatorSet {
        Self {
            validators: Vec::new(),
            powers: HashMap::new(),
        }
    }

    /// Create a validator set in which every validator in `validators` has a power of 1.
    pub fn equally_weighted(validators: impl IntoIterator<Item = VerifyingKey>) -> ValidatorSet {
        let mut validator_set = ValidatorSet::new();
        validators
            .into_iter()
            .for_each(|validator| validator_set.put(&validator, Power::new(1)));
        validator_set
    }

    /// Put a `validator` with the specified `power` into the validator set, keeping the
    /// [ordering of validators](Self#ordering-of-validators).
    ///
    /// If `validator` already exists in the validator set, this function updates its power instead.
    pub fn put(&mut self, validator: &VerifyingKey, power: Power) {
        let validator_bytes = validator.to_bytes();
        if let Err(insert_pos) = self
            .validators
            .binary_search_by(|v| v.to_bytes().cmp(&validator_bytes))
        {
            self.validators.insert(insert_pos, *validator);
        }

        self.powers.insert(*validator, power);
    }

    /// Remove `validator` from the validator set, returning its power before the removal, if it was in
    /// the validator set.
    pub fn remove(&mut self, validator: &VerifyingKey) -> Option<(VerifyingKey, Power)> {
        let pos = self.position(validator)?;
        self.validators.remove(pos);
        self.powers.remove_entry(validator)
    }

    /// Get the power of the specified `validator` inside the validator set.
    pub fn power(&self, validator: &VerifyingKey) -> Option<&Power> {
        self.powers.get(validator)
    }

    /// Get the sum of the powers of all of the validators inside the validator set.
    pub fn total_power(&self) -> TotalPower {
        let mut total_power = TotalPower::new(0);
        for power in self.powers.values() {
            total_power += *power
        }
        total_power
    }

    /// Check whether the validator set contains `validator`.
    pub fn contains(&self, validator: &VerifyingKey) -> bool {
        self.powers.contains_key(validator)
    }

    /// Get an iterator through validators' verifying keys which walks through them in ascending order.
    pub fn validators(&self) -> slice::Iter<VerifyingKey> {
        self.validators.iter()
    }

    /// Get a vector containing each validator and its power, in ascending order of the validators'
    /// verifying keys.
    pub fn validators_and_powers(&self) -> Vec<(VerifyingKey, Power)> {
        self.validators
            .iter()
            .filter_map(|v| self.power(v).map(|power| (*v, *power)))
            .collect()
    }

    /// Get the number of validators currently in the validator set.
    pub fn len(&self) -> usize {
        self.validators.len()
    }

    /// Check whether the validator set is empty (i.e., `self.len() == 0`).
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the index of the given `validator` in the [sorted order](Self#ordering-of-validators) of
    /// `VerifyingKey`s in the validator set, if it is actually in the validator set.
    pub fn position(&self, validator: &VerifyingKey) -> Option<usize> {
        let validator_bytes = validator.to_bytes();
        self.validators
            .binary_search_by(|v| v.to_bytes().cmp(&validator_bytes))
            .ok()
    }

    /// Compute the total power that a set of matching votes must match or exceed (`>=`) in order to
    /// count as a quorum: `total_power * 2 / 3 + 1`.
    ///
    /// With four validators of power 1 this is 3, with seven it is 5.
    pub fn quorum(&self) -> TotalPower {
        const TOTAL_POWER_OVERFLOW: &str =
            "Validator set power exceeds u128::MAX/2. Read the itemdoc for `ValidatorSet`.";

        TotalPower::new(
            (self
                .total_power()
                .int()
                .checked_mul(2)
                .expect(TOTAL_POWER_OVERFLOW)
                / 3)
                + 1,
        )
    }

    /// Compute the smallest total power that is strictly more than a third of the validator set's
    /// power: `total_power / 3 + 1`.
    ///
    /// Any set of validators this powerful contains at least one correct validator.
    pub fn one_third_plus_one(&self) -> TotalPower {
        TotalPower::new(self.total_power().int() / 3 + 1)
    }
}

/// Intermediate representation of [`ValidatorSet`] for safe serialization and deserialization.
///
/// [`ed25519_dalek::VerifyingKey`] does not implement the Borsh traits, so this type replaces it with
/// [`VerifyingKeyBytes`]. Because arbitrary bytes are not necessarily valid Ed25519 points, conversion
/// back into `ValidatorSet` using `TryFrom` is fallible.
#[derive(Clone, BorshSerialize, BorshDeserialize)]
pub struct ValidatorSetBytes {
    validators_and_powers: Vec<(VerifyingKeyBytes, Power)>,
}

impl TryFrom<ValidatorSetBytes> for ValidatorSet {
    type Error = ed25519_dalek::SignatureError;

    fn try_from(value: ValidatorSetBytes) -> Result<Self, Self::Error> {
        let mut validator_set = ValidatorSet::new();
        for (validator_bytes, power) in value.validators_and_powers {
            validator_set.put(&VerifyingKey::from_bytes(&validator_bytes)?, power);
        }
        Ok(validator_set)
    }
}

impl From<&ValidatorSet> for ValidatorSetBytes {
    fn from(value: &ValidatorSet) -> Self {
        ValidatorSetBytes {
            validators_and_powers: value
                .validators_and_powers()
                .into_iter()
                .map(|(validator, power)| (validator.to_bytes(), power))
                .collect(),
        }
    }
}

/// Read-only source of the validator set that is active at a given height.
///
/// The registry is supplied by the library user. It is consulted when a new height starts, and when a
/// [`Commits`](crate::commits::types::Commits) certificate received during catch-up is verified.
pub trait ValidatorSetRegistry: Clone + Send + 'static {
    /// Get the validator set that is active at `height`, or `None` if it is not known locally.
    fn validator_set(&self, height: Height) -> Option<ValidatorSet>;
}

/// A single, static validator set is active at every height of every shard.
impl ValidatorSetRegistry for ValidatorSet {
    fn validator_set(&self, _height: Height) -> Option<ValidatorSet> {
        Some(self.clone())
    }
}

/// Validator sets that are fixed per shard, keyed by shard index.
#[derive(Clone, Default)]
pub struct ShardValidatorSets(HashMap<u32, ValidatorSet>);

impl ShardValidatorSets {
    /// Create a registry that knows no shards.
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    /// Set the validator set of the shard identified by `shard_index`.
    pub fn insert(&mut self, shard_index: u32, validator_set: ValidatorSet) {
        self.0.insert(shard_index, validator_set);
    }
}

impl ValidatorSetRegistry for ShardValidatorSets {
    fn validator_set(&self, height: Height) -> Option<ValidatorSet> {
        self.0.get(&height.shard_index()).cloned()
    }
}
