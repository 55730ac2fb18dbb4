/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Collection of votes and proposals for the current height, and the quorum queries the round state
//! machine asks of them.
//!
//! ## Counting rules
//!
//! - Only votes from members of the validator set active at the height are recorded.
//! - Only the first vote of a voter per `(round, vote_type)` counts. Repeating the same vote is a
//!   no-op.
//! - A voter that casts a second, different vote for the same `(round, vote_type)` is an
//!   equivocator: both votes are kept as evidence, and neither counts toward any quorum. Further votes
//!   from that voter for the same `(round, vote_type)` are rejected.
//! - Only the first proposal from the designated proposer of a round counts.
//!
//! Signatures are not checked here. Callers must only pass in votes and proposals whose signatures
//! they have already verified.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::types::{
    crypto_primitives::VerifyingKey,
    data_types::{Height, Round, ShardHash, TotalPower},
    validator_set::ValidatorSet,
};

use super::{
    messages::{SignedProposal, SignedVote, VoteType},
    roles::is_proposer,
};

/// How many rounds past the current round votes may be recorded for.
pub(crate) const MAX_FUTURE_ROUNDS: i64 = 64;

/// The result of recording a vote with [`Aggregator::add_vote`].
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum AddVoteOutcome {
    /// The vote was recorded and counts toward quorums.
    Added,

    /// An identical vote from the same voter had already been recorded.
    Duplicate,

    /// The vote conflicts with one recorded earlier. Both are kept, neither counts.
    Equivocation {
        first: SignedVote,
        second: SignedVote,
    },

    /// The vote was not recorded.
    Rejected(VoteRejection),
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum VoteRejection {
    WrongHeight,
    RoundOutOfRange,
    NotAValidator,
    KnownEquivocator,
}

/// The votes of a single type in a single round.
#[derive(Clone, Default)]
pub(crate) struct VoteTally {
    votes: HashMap<VerifyingKey, SignedVote>,
    equivocations: HashMap<VerifyingKey, (SignedVote, SignedVote)>,
    power_by_value: HashMap<Option<ShardHash>, TotalPower>,
    counted_power: TotalPower,
}

impl VoteTally {
    fn add(
        &mut self,
        voter: VerifyingKey,
        signed_vote: SignedVote,
        validator_set: &ValidatorSet,
    ) -> AddVoteOutcome {
        let power = match validator_set.power(&voter) {
            Some(power) => *power,
            None => return AddVoteOutcome::Rejected(VoteRejection::NotAValidator),
        };

        if self.equivocations.contains_key(&voter) {
            return AddVoteOutcome::Rejected(VoteRejection::KnownEquivocator);
        }

        match self.votes.get(&voter) {
            Some(existing) if existing.vote.value == signed_vote.vote.value => {
                AddVoteOutcome::Duplicate
            }
            Some(_) => {
                // Safety: the entry was found just above.
                let first = self.votes.remove(&voter).unwrap();
                if let Some(value_power) = self.power_by_value.get_mut(&first.vote.value) {
                    *value_power -= power;
                }
                self.counted_power -= power;
                self.equivocations
                    .insert(voter, (first.clone(), signed_vote.clone()));
                AddVoteOutcome::Equivocation {
                    first,
                    second: signed_vote,
                }
            }
            None => {
                *self
                    .power_by_value
                    .entry(signed_vote.vote.value)
                    .or_default() += power;
                self.counted_power += power;
                self.votes.insert(voter, signed_vote);
                AddVoteOutcome::Added
            }
        }
    }

    /// Get the value (or nil) whose counted power reaches `quorum`, if any.
    fn polka(&self, quorum: TotalPower) -> Option<Option<ShardHash>> {
        self.power_by_value
            .iter()
            .find(|(_, power)| **power >= quorum)
            .map(|(value, _)| *value)
    }

    fn counted_power(&self) -> TotalPower {
        self.counted_power
    }

    fn voters(&self) -> impl Iterator<Item = &VerifyingKey> {
        self.votes.keys().chain(self.equivocations.keys())
    }

    fn counted_votes(&self) -> impl Iterator<Item = &SignedVote> {
        self.votes.values()
    }

    fn votes_for(&self, value: Option<ShardHash>) -> impl Iterator<Item = &SignedVote> {
        self.votes
            .values()
            .filter(move |signed_vote| signed_vote.vote.value == value)
    }
}

/// Everything received for a single round.
#[derive(Clone, Default)]
pub(crate) struct RoundVotes {
    proposal: Option<SignedProposal>,
    prevotes: VoteTally,
    precommits: VoteTally,
}

impl RoundVotes {
    fn tally(&self, vote_type: VoteType) -> &VoteTally {
        match vote_type {
            VoteType::Prevote => &self.prevotes,
            VoteType::Precommit => &self.precommits,
        }
    }

    fn tally_mut(&mut self, vote_type: VoteType) -> &mut VoteTally {
        match vote_type {
            VoteType::Prevote => &mut self.prevotes,
            VoteType::Precommit => &mut self.precommits,
        }
    }
}

/// Votes and proposals for every round of one height, checked against the validator set of that
/// height.
pub(crate) struct Aggregator {
    height: Height,
    validator_set: ValidatorSet,
    rounds: BTreeMap<Round, RoundVotes>,
}

impl Aggregator {
    pub(crate) fn new(height: Height, validator_set: ValidatorSet) -> Self {
        Self {
            height,
            validator_set,
            rounds: BTreeMap::new(),
        }
    }

    pub(crate) fn height(&self) -> Height {
        self.height
    }

    pub(crate) fn validator_set(&self) -> &ValidatorSet {
        &self.validator_set
    }

    /// Record `signed_vote`, whose signature the caller has already verified, given that the replica
    /// is currently in `cur_round`.
    pub(crate) fn add_vote(&mut self, signed_vote: SignedVote, cur_round: Round) -> AddVoteOutcome {
        let vote = &signed_vote.vote;
        if vote.height != self.height {
            return AddVoteOutcome::Rejected(VoteRejection::WrongHeight);
        }
        if vote.round.is_nil() || vote.round.int() > cur_round.int() + MAX_FUTURE_ROUNDS {
            return AddVoteOutcome::Rejected(VoteRejection::RoundOutOfRange);
        }
        let voter = match signed_vote.voter() {
            Ok(voter) => voter,
            Err(_) => return AddVoteOutcome::Rejected(VoteRejection::NotAValidator),
        };

        let (round, vote_type) = (vote.round, vote.vote_type);
        self.rounds
            .entry(round)
            .or_default()
            .tally_mut(vote_type)
            .add(voter, signed_vote, &self.validator_set)
    }

    /// Record `signed_proposal` if it is the first proposal of its round, and it was made by the
    /// round's designated proposer. Returns whether it was recorded.
    pub(crate) fn add_proposal(&mut self, signed_proposal: SignedProposal, cur_round: Round) -> bool {
        let proposal = &signed_proposal.proposal;
        if proposal.height != self.height
            || proposal.round.is_nil()
            || proposal.round.int() > cur_round.int() + MAX_FUTURE_ROUNDS
        {
            return false;
        }

        let is_designated_proposer = signed_proposal.proposer().is_ok_and(|proposer| {
            is_proposer(&proposer, self.height, proposal.round, &self.validator_set)
        });
        if !is_designated_proposer {
            return false;
        }

        let round_votes = self.rounds.entry(proposal.round).or_default();
        if round_votes.proposal.is_some() {
            return false;
        }
        round_votes.proposal = Some(signed_proposal);
        true
    }

    /// Get the value (`Some(value)`) or nil (`None`) that a quorum of `vote_type` votes at `height` and
    /// `round` agree on, if there is one.
    pub(crate) fn has_polka(
        &self,
        height: Height,
        round: Round,
        vote_type: VoteType,
    ) -> Option<Option<ShardHash>> {
        if height != self.height {
            return None;
        }
        self.rounds
            .get(&round)?
            .tally(vote_type)
            .polka(self.validator_set.quorum())
    }

    /// Get the first valid proposal received for `height` and `round`.
    pub(crate) fn has_proposal(&self, height: Height, round: Round) -> Option<&SignedProposal> {
        if height != self.height {
            return None;
        }
        self.rounds.get(&round)?.proposal.as_ref()
    }

    /// Check whether validators with a quorum of power have cast a `vote_type` vote in `round`, no
    /// matter for which value.
    pub(crate) fn has_any_quorum(&self, round: Round, vote_type: VoteType) -> bool {
        self.rounds.get(&round).is_some_and(|round_votes| {
            round_votes.tally(vote_type).counted_power() >= self.validator_set.quorum()
        })
    }

    /// Get the highest round greater than `cur_round` in which validators holding more than a third of
    /// the power have sent votes.
    pub(crate) fn skip_round(&self, cur_round: Round) -> Option<Round> {
        let threshold = self.validator_set.one_third_plus_one();
        self.rounds
            .range(cur_round + 1..)
            .rev()
            .find(|(_, round_votes)| {
                let voters: HashSet<&VerifyingKey> = round_votes
                    .prevotes
                    .voters()
                    .chain(round_votes.precommits.voters())
                    .collect();
                let mut power = TotalPower::new(0);
                voters
                    .into_iter()
                    .filter_map(|voter| self.validator_set.power(voter))
                    .for_each(|voter_power| power += *voter_power);
                power >= threshold
            })
            .map(|(round, _)| *round)
    }

    /// Get every round in which a quorum of precommits agrees on a value, with that value.
    pub(crate) fn decided_values(&self) -> Vec<(Round, ShardHash)> {
        let quorum = self.validator_set.quorum();
        self.rounds
            .iter()
            .filter_map(|(round, round_votes)| match round_votes.precommits.polka(quorum) {
                Some(Some(value)) => Some((*round, value)),
                _ => None,
            })
            .collect()
    }

    /// Get the counted precommits for `value` in `round`, excluding those of equivocators.
    pub(crate) fn signed_precommits(&self, round: Round, value: ShardHash) -> Vec<SignedVote> {
        self.rounds
            .get(&round)
            .map(|round_votes| {
                round_votes
                    .precommits
                    .votes_for(Some(value))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Get every counted prevote and precommit of `round`.
    pub(crate) fn vote_set(&self, round: Round) -> Vec<SignedVote> {
        self.rounds
            .get(&round)
            .map(|round_votes| {
                round_votes
                    .prevotes
                    .counted_votes()
                    .chain(round_votes.precommits.counted_votes())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use ed25519_dalek::SigningKey;
    use rand_core::OsRng;

    use super::*;
    use crate::{
        tendermint::{
            messages::{Proposal, Vote},
            roles::select_proposer,
        },
        types::crypto_primitives::{hash, Keypair},
    };

    const HEIGHT: Height = Height::new(1, 100);

    fn keypairs(n: usize) -> Vec<Keypair> {
        let mut csprg = OsRng {};
        (0..n)
            .map(|_| Keypair::new(SigningKey::generate(&mut csprg)))
            .collect()
    }

    fn validator_set(keypairs: &[Keypair]) -> ValidatorSet {
        ValidatorSet::equally_weighted(keypairs.iter().map(|keypair| keypair.public()))
    }

    fn value(tag: &str) -> ShardHash {
        ShardHash::new(1, hash(tag.as_bytes()))
    }

    fn vote(
        keypair: &Keypair,
        vote_type: VoteType,
        round: i64,
        value: Option<ShardHash>,
    ) -> SignedVote {
        Vote {
            vote_type,
            height: HEIGHT,
            round: Round::new(round),
            value,
            voter: keypair.public().to_bytes(),
        }
        .sign(keypair)
    }

    fn assert_polka_boundary(n: usize, below: usize, at: usize) {
        let keypairs = keypairs(n);
        let mut aggregator = Aggregator::new(HEIGHT, validator_set(&keypairs));
        let a = value("A");

        for keypair in &keypairs[..below] {
            let outcome = aggregator.add_vote(vote(keypair, VoteType::Prevote, 0, Some(a)), Round::init());
            assert_eq!(outcome, AddVoteOutcome::Added);
        }
        assert_eq!(aggregator.has_polka(HEIGHT, Round::init(), VoteType::Prevote), None);
        assert!(!aggregator.has_any_quorum(Round::init(), VoteType::Prevote));

        for keypair in &keypairs[below..at] {
            aggregator.add_vote(vote(keypair, VoteType::Prevote, 0, Some(a)), Round::init());
        }
        assert_eq!(
            aggregator.has_polka(HEIGHT, Round::init(), VoteType::Prevote),
            Some(Some(a))
        );
        assert!(aggregator.has_any_quorum(Round::init(), VoteType::Prevote));
        assert_eq!(aggregator.has_polka(HEIGHT, Round::init(), VoteType::Precommit), None);
        assert_eq!(
            aggregator.has_polka(Height::new(1, 101), Round::init(), VoteType::Prevote),
            None
        );
    }

    #[test]
    fn polka_boundary_with_four_validators_test() {
        assert_polka_boundary(4, 2, 3);
    }

    #[test]
    fn polka_boundary_with_seven_validators_test() {
        assert_polka_boundary(7, 4, 5);
    }

    #[test]
    fn nil_polka_test() {
        let keypairs = keypairs(4);
        let mut aggregator = Aggregator::new(HEIGHT, validator_set(&keypairs));
        for keypair in &keypairs[..2] {
            aggregator.add_vote(vote(keypair, VoteType::Precommit, 2, None), Round::new(2));
        }
        aggregator.add_vote(vote(&keypairs[2], VoteType::Precommit, 2, Some(value("A"))), Round::new(2));
        assert_eq!(aggregator.has_polka(HEIGHT, Round::new(2), VoteType::Precommit), None);
        assert!(aggregator.has_any_quorum(Round::new(2), VoteType::Precommit));

        aggregator.add_vote(vote(&keypairs[3], VoteType::Precommit, 2, None), Round::new(2));
        assert_eq!(
            aggregator.has_polka(HEIGHT, Round::new(2), VoteType::Precommit),
            Some(None)
        );
        assert!(aggregator.decided_values().is_empty());
    }

    #[test]
    fn equivocation_is_recorded_but_not_counted_test() {
        let keypairs = keypairs(4);
        let mut aggregator = Aggregator::new(HEIGHT, validator_set(&keypairs));
        let (a, b) = (value("A"), value("B"));

        aggregator.add_vote(vote(&keypairs[0], VoteType::Prevote, 0, Some(a)), Round::init());
        aggregator.add_vote(vote(&keypairs[1], VoteType::Prevote, 0, Some(a)), Round::init());

        let first = vote(&keypairs[2], VoteType::Prevote, 0, Some(a));
        let second = vote(&keypairs[2], VoteType::Prevote, 0, Some(b));
        assert_eq!(aggregator.add_vote(first.clone(), Round::init()), AddVoteOutcome::Added);
        assert_eq!(
            aggregator.add_vote(first.clone(), Round::init()),
            AddVoteOutcome::Duplicate
        );
        assert_eq!(
            aggregator.add_vote(second.clone(), Round::init()),
            AddVoteOutcome::Equivocation {
                first: first.clone(),
                second: second.clone()
            }
        );

        // Three votes for A were received, but the equivocator's does not count.
        assert_eq!(aggregator.has_polka(HEIGHT, Round::init(), VoteType::Prevote), None);
        assert_eq!(
            aggregator.add_vote(first, Round::init()),
            AddVoteOutcome::Rejected(VoteRejection::KnownEquivocator)
        );

        // The equivocator's precommits are tallied separately.
        assert_eq!(
            aggregator.add_vote(vote(&keypairs[2], VoteType::Precommit, 0, Some(a)), Round::init()),
            AddVoteOutcome::Added
        );

        aggregator.add_vote(vote(&keypairs[3], VoteType::Prevote, 0, Some(a)), Round::init());
        assert_eq!(
            aggregator.has_polka(HEIGHT, Round::init(), VoteType::Prevote),
            Some(Some(a))
        );
        assert_eq!(aggregator.vote_set(Round::init()).len(), 4);
    }

    #[test]
    fn rejects_malformed_votes_test() {
        let keypairs = keypairs(5);
        let mut aggregator = Aggregator::new(HEIGHT, validator_set(&keypairs[..4]));
        let a = value("A");

        assert_eq!(
            aggregator.add_vote(vote(&keypairs[4], VoteType::Prevote, 0, Some(a)), Round::init()),
            AddVoteOutcome::Rejected(VoteRejection::NotAValidator)
        );

        let mut other_height = vote(&keypairs[0], VoteType::Prevote, 0, Some(a));
        other_height.vote.height = Height::new(2, 100);
        assert_eq!(
            aggregator.add_vote(other_height, Round::init()),
            AddVoteOutcome::Rejected(VoteRejection::WrongHeight)
        );

        assert_eq!(
            aggregator.add_vote(
                vote(&keypairs[0], VoteType::Prevote, MAX_FUTURE_ROUNDS + 1, Some(a)),
                Round::init()
            ),
            AddVoteOutcome::Rejected(VoteRejection::RoundOutOfRange)
        );
    }

    #[test]
    fn first_proposal_from_designated_proposer_counts_test() {
        let keypairs = keypairs(4);
        let validator_set = validator_set(&keypairs);
        let mut aggregator = Aggregator::new(HEIGHT, validator_set.clone());
        let proposer = select_proposer(HEIGHT, Round::init(), &validator_set).unwrap();
        let proposer_keypair = keypairs.iter().find(|kp| kp.public() == proposer).unwrap();
        let other_keypair = keypairs.iter().find(|kp| kp.public() != proposer).unwrap();

        let proposal = |keypair: &Keypair, tag: &str| {
            Proposal {
                height: HEIGHT,
                round: Round::init(),
                pol_round: Round::nil(),
                proposer: keypair.public().to_bytes(),
                value: value(tag),
            }
            .sign(keypair)
        };

        assert!(!aggregator.add_proposal(proposal(other_keypair, "A"), Round::init()));
        assert!(aggregator.add_proposal(proposal(proposer_keypair, "A"), Round::init()));
        assert!(!aggregator.add_proposal(proposal(proposer_keypair, "B"), Round::init()));
        assert_eq!(
            aggregator
                .has_proposal(HEIGHT, Round::init())
                .map(|p| p.proposal.value),
            Some(value("A"))
        );
    }

    #[test]
    fn skip_round_needs_more_than_a_third_test() {
        let keypairs = keypairs(4);
        let mut aggregator = Aggregator::new(HEIGHT, validator_set(&keypairs));

        aggregator.add_vote(vote(&keypairs[0], VoteType::Prevote, 3, None), Round::init());
        assert_eq!(aggregator.skip_round(Round::init()), None);

        aggregator.add_vote(vote(&keypairs[1], VoteType::Precommit, 3, None), Round::init());
        assert_eq!(aggregator.skip_round(Round::init()), Some(Round::new(3)));
        assert_eq!(aggregator.skip_round(Round::new(3)), None);
    }
}
