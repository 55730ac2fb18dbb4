/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The Commit Assembler: turns a quorum of precommits into a [`Commits`] certificate, and hands decided
//! values to the commit store and the value source.

use crate::{
    commit_store::{pluggables::KVStore, CommitStore, CommitStoreError},
    tendermint::aggregator::Aggregator,
    types::{
        data_types::{Height, Round, ShardHash},
        signed_messages::Certificate,
        validator_set::ValidatorSet,
    },
    value_source::ValueSource,
};

use super::types::Commits;

/// Collect exactly the precommits for `value` in `round` that `aggregator` has counted, and build a
/// certificate out of them.
///
/// # Errors
///
/// Returns [`CommitError::NoQuorum`] if the collected signatures do not add up to a quorum of the
/// aggregator's validator set.
pub(crate) fn assemble(
    aggregator: &Aggregator,
    round: Round,
    value: ShardHash,
) -> Result<Commits, CommitError> {
    let height = aggregator.height();
    let precommits = aggregator.signed_precommits(round, value);
    let commits = Commits::from_precommits(height, round, value, &precommits);

    if !commits.is_correctly_signed(aggregator.validator_set()) {
        return Err(CommitError::NoQuorum { height, round });
    }

    Ok(commits)
}

/// Persist `commits` together with `full_value` and apply them through `value_source`.
///
/// This is the only way a decided value is ever persisted or applied, so `commits` is always verified
/// against `validator_set` first.
///
/// Returns `Ok(true)` if the value was newly committed, and `Ok(false)` if the same value was already
/// committed at `commits.height`, in which case nothing is written or applied.
pub(crate) fn finalize<K: KVStore, V: ValueSource>(
    commit_store: &mut CommitStore<K>,
    value_source: &mut V,
    validator_set: &ValidatorSet,
    commits: &Commits,
    full_value: &[u8],
) -> Result<bool, CommitError> {
    if !commits.is_correctly_signed(validator_set) {
        return Err(CommitError::IncorrectCertificate {
            height: commits.height,
        });
    }

    if !commit_store.put_decided_value(commits.height, commits, full_value)? {
        return Ok(false);
    }

    value_source.apply(commits, full_value);
    Ok(true)
}

/// Get the full bytes of `value` from `value_source`.
pub(crate) fn resolve<V: ValueSource>(
    value_source: &V,
    value: &ShardHash,
) -> Result<Vec<u8>, CommitError> {
    value_source
        .resolve(value)
        .ok_or(CommitError::ValueNotFound { value: *value })
}

/// Enumerates the different ways assembling or finalizing a commit can fail.
#[derive(Debug)]
pub enum CommitError {
    /// The precommits collected for a value at `height` and `round` do not form a quorum.
    NoQuorum { height: Height, round: Round },

    /// A certificate for `height` does not carry correct precommit signatures from a quorum.
    IncorrectCertificate { height: Height },

    /// The full bytes of `value` are not available.
    ValueNotFound { value: ShardHash },

    /// See: [`CommitStoreError`].
    CommitStoreError(CommitStoreError),
}

impl From<CommitStoreError> for CommitError {
    fn from(value: CommitStoreError) -> Self {
        CommitError::CommitStoreError(value)
    }
}

#[cfg(test)]
mod tests {
    use ed25519_dalek::SigningKey;
    use rand_core::OsRng;

    use super::*;
    use crate::{
        tendermint::messages::{Vote, VoteType},
        types::crypto_primitives::{hash, Keypair},
    };

    const HEIGHT: Height = Height::new(1, 100);

    #[test]
    fn assemble_collects_only_matching_precommits_test() {
        let mut csprg = OsRng {};
        let keypairs: Vec<Keypair> = (0..4)
            .map(|_| Keypair::new(SigningKey::generate(&mut csprg)))
            .collect();
        let validator_set =
            ValidatorSet::equally_weighted(keypairs.iter().map(|keypair| keypair.public()));
        let mut aggregator = Aggregator::new(HEIGHT, validator_set);
        let (a, b) = (ShardHash::new(1, hash(b"A")), ShardHash::new(1, hash(b"B")));

        let precommit = |keypair: &Keypair, value| {
            Vote {
                vote_type: VoteType::Precommit,
                height: HEIGHT,
                round: Round::init(),
                value,
                voter: keypair.public().to_bytes(),
            }
            .sign(keypair)
        };

        aggregator.add_vote(precommit(&keypairs[0], Some(a)), Round::init());
        aggregator.add_vote(precommit(&keypairs[1], Some(a)), Round::init());
        aggregator.add_vote(precommit(&keypairs[2], Some(b)), Round::init());
        assert!(matches!(
            assemble(&aggregator, Round::init(), a),
            Err(CommitError::NoQuorum { .. })
        ));

        aggregator.add_vote(precommit(&keypairs[3], Some(a)), Round::init());
        let commits = assemble(&aggregator, Round::init(), a).unwrap();
        assert_eq!(commits.height, HEIGHT);
        assert_eq!(commits.round, Round::init());
        assert_eq!(commits.value, a);
        assert_eq!(commits.signatures.len(), 3);
        assert!(!commits
            .signatures
            .iter()
            .any(|signature| signature.signer == keypairs[2].public().to_bytes()));
    }
}
