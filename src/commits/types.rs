/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The [`Commits`] quorum certificate.

use std::collections::HashSet;

use borsh::{BorshDeserialize, BorshSerialize};

use crate::{
    tendermint::messages::{SignedVote, Vote, VoteType},
    types::{
        crypto_primitives::{Signature, Verifier, VerifyingKey},
        data_types::{Height, Round, ShardHash, SignatureBytes, TotalPower, VerifyingKeyBytes},
        signed_messages::Certificate,
        validator_set::ValidatorSet,
    },
};

/// A single validator's precommit signature inside a [`Commits`] certificate.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct CommitSignature {
    pub signer: VerifyingKeyBytes,
    pub signature: SignatureBytes,
}

/// Proof that `value` was decided at `height`: precommit signatures over `(height, round, value)` from
/// a quorum of the validator set active at `height`.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Commits {
    pub height: Height,
    pub round: Round,
    pub value: ShardHash,
    pub signatures: Vec<CommitSignature>,
}

impl Commits {
    /// Build a certificate out of precommits for `value` at `height` and `round`.
    ///
    /// Precommits for any other height, round or value are skipped. Whether the result is actually a
    /// quorum is only known after calling [`is_correctly_signed`](Certificate::is_correctly_signed).
    pub fn from_precommits<'a>(
        height: Height,
        round: Round,
        value: ShardHash,
        precommits: impl IntoIterator<Item = &'a SignedVote>,
    ) -> Self {
        let signatures = precommits
            .into_iter()
            .filter(|signed_vote| {
                signed_vote.vote.vote_type == VoteType::Precommit
                    && signed_vote.vote.height == height
                    && signed_vote.vote.round == round
                    && signed_vote.vote.value == Some(value)
            })
            .map(|signed_vote| CommitSignature {
                signer: signed_vote.vote.voter,
                signature: signed_vote.signature,
            })
            .collect();

        Self {
            height,
            round,
            value,
            signatures,
        }
    }

    /// Get the precommit that `signer` must have signed for its signature to be part of this certificate.
    pub fn precommit(&self, signer: VerifyingKeyBytes) -> Vote {
        Vote {
            vote_type: VoteType::Precommit,
            height: self.height,
            round: self.round,
            value: Some(self.value),
            voter: signer,
        }
    }

    /// Turn the certificate back into the individual signed precommits it is made of.
    pub fn signed_precommits(&self) -> Vec<SignedVote> {
        self.signatures
            .iter()
            .map(|commit_signature| SignedVote {
                vote: self.precommit(commit_signature.signer),
                signature: commit_signature.signature,
            })
            .collect()
    }
}

impl Certificate for Commits {
    /// Checks that every signer is a distinct member of `validator_set`, that every signature is a
    /// correct precommit signature over this certificate's `(height, round, value)`, and that the signers'
    /// powers add up to a quorum.
    ///
    /// A single signature that fails any of these checks makes the whole certificate incorrect.
    fn is_correctly_signed(&self, validator_set: &ValidatorSet) -> bool {
        let mut signers = HashSet::new();
        let mut total_power = TotalPower::new(0);

        for commit_signature in &self.signatures {
            if !signers.insert(commit_signature.signer) {
                return false;
            }

            let signer = match VerifyingKey::from_bytes(&commit_signature.signer) {
                Ok(signer) => signer,
                Err(_) => return false,
            };

            let power = match validator_set.power(&signer) {
                Some(power) => *power,
                None => return false,
            };

            let signature = Signature::from_bytes(&commit_signature.signature.bytes());
            if signer
                .verify(
                    &self.precommit(commit_signature.signer).signing_bytes(),
                    &signature,
                )
                .is_err()
            {
                return false;
            }

            total_power += power;
        }

        total_power >= validator_set.quorum()
    }
}

#[cfg(test)]
mod tests {
    use ed25519_dalek::SigningKey;
    use rand_core::OsRng;

    use super::*;
    use crate::types::crypto_primitives::{hash, Keypair};

    const HEIGHT: Height = Height::new(1, 100);

    fn setup() -> (Vec<Keypair>, ValidatorSet, ShardHash) {
        let mut csprg = OsRng {};
        let keypairs: Vec<Keypair> = (0..4)
            .map(|_| Keypair::new(SigningKey::generate(&mut csprg)))
            .collect();
        let validator_set =
            ValidatorSet::equally_weighted(keypairs.iter().map(|keypair| keypair.public()));
        (keypairs, validator_set, ShardHash::new(1, hash(b"A")))
    }

    fn precommit(keypair: &Keypair, value: ShardHash) -> SignedVote {
        Vote {
            vote_type: VoteType::Precommit,
            height: HEIGHT,
            round: Round::init(),
            value: Some(value),
            voter: keypair.public().to_bytes(),
        }
        .sign(keypair)
    }

    #[test]
    fn quorum_of_precommits_is_correct_test() {
        let (keypairs, validator_set, value) = setup();
        let precommits: Vec<SignedVote> =
            keypairs[..3].iter().map(|kp| precommit(kp, value)).collect();
        let commits = Commits::from_precommits(HEIGHT, Round::init(), value, &precommits);

        assert_eq!(commits.signatures.len(), 3);
        assert!(commits.is_correctly_signed(&validator_set));
        assert_eq!(commits.signed_precommits(), precommits);
    }

    #[test]
    fn insufficient_power_test() {
        let (keypairs, validator_set, value) = setup();
        let precommits: Vec<SignedVote> =
            keypairs[..2].iter().map(|kp| precommit(kp, value)).collect();
        let commits = Commits::from_precommits(HEIGHT, Round::init(), value, &precommits);
        assert!(!commits.is_correctly_signed(&validator_set));
    }

    #[test]
    fn duplicate_signers_test() {
        let (keypairs, validator_set, value) = setup();
        let precommits = vec![
            precommit(&keypairs[0], value),
            precommit(&keypairs[1], value),
            precommit(&keypairs[1], value),
        ];
        let commits = Commits::from_precommits(HEIGHT, Round::init(), value, &precommits);
        assert_eq!(commits.signatures.len(), 3);
        assert!(!commits.is_correctly_signed(&validator_set));
    }

    #[test]
    fn foreign_signer_test() {
        let (keypairs, validator_set, value) = setup();
        let outsider = Keypair::new(SigningKey::generate(&mut OsRng {}));
        let precommits = vec![
            precommit(&keypairs[0], value),
            precommit(&keypairs[1], value),
            precommit(&keypairs[2], value),
            precommit(&outsider, value),
        ];
        let commits = Commits::from_precommits(HEIGHT, Round::init(), value, &precommits);
        assert!(!commits.is_correctly_signed(&validator_set));
    }

    #[test]
    fn tampered_signature_test() {
        let (keypairs, validator_set, value) = setup();
        let precommits: Vec<SignedVote> =
            keypairs[..3].iter().map(|kp| precommit(kp, value)).collect();
        let mut commits = Commits::from_precommits(HEIGHT, Round::init(), value, &precommits);

        let mut bytes = commits.signatures[0].signature.bytes();
        bytes[0] ^= 0xff;
        commits.signatures[0].signature = SignatureBytes::new(bytes);
        assert!(!commits.is_correctly_signed(&validator_set));
    }

    #[test]
    fn wrong_value_test() {
        let (keypairs, validator_set, value) = setup();
        let precommits: Vec<SignedVote> =
            keypairs[..3].iter().map(|kp| precommit(kp, value)).collect();
        let mut commits = Commits::from_precommits(HEIGHT, Round::init(), value, &precommits);

        commits.value = ShardHash::new(1, hash(b"B"));
        assert!(!commits.is_correctly_signed(&validator_set));

        // Precommits for another value are not picked up in the first place.
        let other = Commits::from_precommits(
            HEIGHT,
            Round::init(),
            ShardHash::new(1, hash(b"B")),
            &precommits,
        );
        assert!(other.signatures.is_empty());
    }
}
