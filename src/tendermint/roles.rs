/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Functions that determine what role a replica plays at a given height and round.

use crate::types::{
    crypto_primitives::VerifyingKey,
    data_types::{Height, Round},
    validator_set::ValidatorSet,
};

/// Deterministically select the validator in `validator_set` that proposes in `round` of `height`,
/// using the [Interleaved WRR](https://en.wikipedia.org/wiki/Weighted_round_robin#Interleaved_WRR)
/// algorithm.
///
/// The position in the abstract, power-weighted array of proposers is
/// `(height.block_number() + round) mod total_power`, so consecutive heights, and consecutive rounds of
/// the same height, rotate through the validator set. Every validator is selected a number of times
/// proportional to its power over any window of `total_power` positions.
///
/// Returns `None` if `validator_set` has no power, or if `round` is [`Round::nil`].
pub fn select_proposer(
    height: Height,
    round: Round,
    validator_set: &ValidatorSet,
) -> Option<VerifyingKey> {
    if round.is_nil() {
        return None;
    }

    // Length of the abstract array.
    let p_total = validator_set.total_power().int();
    if p_total == 0 {
        return None;
    }

    // Index in the abstract array.
    let index = (height.block_number() as u128 + round.int() as u128) % p_total;

    // Max. power among the validators.
    let validators_and_powers = validator_set.validators_and_powers();
    let p_max = validators_and_powers
        .iter()
        .map(|(_, power)| power.int())
        .max()?;

    let mut counter = 0;

    // Search for a validator at the given index in the abstract array of proposers.
    for threshold in 1..=p_max {
        for (validator, power) in &validators_and_powers {
            if power.int() >= threshold {
                if counter == index {
                    return Some(*validator);
                }
                counter += 1
            }
        }
    }

    None
}

/// Check whether `replica` is the proposer of `round` at `height`.
pub fn is_proposer(
    replica: &VerifyingKey,
    height: Height,
    round: Round,
    validator_set: &ValidatorSet,
) -> bool {
    select_proposer(height, round, validator_set).is_some_and(|proposer| &proposer == replica)
}

/// Check whether `replica` is allowed to vote under `validator_set`.
pub fn is_validator(replica: &VerifyingKey, validator_set: &ValidatorSet) -> bool {
    validator_set.contains(replica)
}

#[cfg(test)]
mod tests {
    use ed25519_dalek::SigningKey;
    use rand_core::OsRng;

    use super::*;
    use crate::types::data_types::Power;

    /// Tests if the number of times each validator is selected as a proposer is proportional to its
    /// power, when walking through rounds.
    #[test]
    fn select_proposer_fairness_test() {
        let mut csprg = OsRng {};
        let n = 20;
        let mut validator_set = ValidatorSet::new();
        (0..n).for_each(|power| {
            validator_set.put(
                &SigningKey::generate(&mut csprg).verifying_key(),
                Power::new(power),
            )
        });

        let height = Height::new(3, 1_000);
        let total_power = validator_set.total_power().int() as i64;
        let proposer_sequence: Vec<VerifyingKey> = (0..total_power)
            .map(|round| select_proposer(height, Round::new(round), &validator_set).unwrap())
            .collect();

        validator_set.validators().for_each(|validator| {
            assert_eq!(
                proposer_sequence
                    .iter()
                    .filter(|proposer| proposer == &validator)
                    .count(),
                validator_set.power(validator).unwrap().int() as usize
            )
        })
    }

    #[test]
    fn select_proposer_rotates_across_heights_test() {
        let mut csprg = OsRng {};
        let validator_set = ValidatorSet::equally_weighted(
            (0..4).map(|_| SigningKey::generate(&mut csprg).verifying_key()),
        );

        let proposer = |block_number, round| {
            select_proposer(Height::new(1, block_number), Round::new(round), &validator_set)
                .unwrap()
        };

        // Pure: the same inputs always give the same proposer.
        assert_eq!(proposer(100, 0), proposer(100, 0));

        // Height 100 round 1 and height 101 round 0 occupy the same position.
        assert_eq!(proposer(100, 1), proposer(101, 0));

        // Four consecutive rounds visit all four validators.
        let mut proposers: Vec<[u8; 32]> = (0..4).map(|r| proposer(100, r).to_bytes()).collect();
        proposers.sort();
        proposers.dedup();
        assert_eq!(proposers.len(), 4);

        assert!(select_proposer(Height::new(1, 100), Round::nil(), &validator_set).is_none());
        assert!(select_proposer(Height::new(1, 100), Round::init(), &ValidatorSet::new()).is_none());
    }
}
