/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The round state machine of one shard: [`Tendermint`], and the errors it can return.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::mpsc::Sender,
    time::{Instant, SystemTime},
};

use rand::seq::SliceRandom;

use crate::{
    commit_store::{pluggables::KVStore, CommitStore, CommitStoreError},
    commits::{
        assembler::{self, CommitError},
        types::Commits,
    },
    events::*,
    networking::{
        network::{Network, ValidatorSetUpdateHandle},
        sending::SenderHandle,
    },
    pacemaker::implementation::{Pacemaker, PacemakerConfiguration},
    sync::messages::{SyncValueResponse, SyncVoteSetRequest, SyncVoteSetResponse},
    types::{
        crypto_primitives::{Keypair, VerifyingKey},
        data_types::{Height, Round, ShardHash, TotalPower},
        signed_messages::{Certificate, SignedMessage},
        validator_set::{ValidatorSet, ValidatorSetRegistry},
    },
    value_source::ValueSource,
};

use super::{
    aggregator::{AddVoteOutcome, Aggregator, MAX_FUTURE_ROUNDS},
    messages::{ConsensusMessage, FullProposal, Proposal, SignedVote, Vote, VoteType},
    roles::{is_proposer, is_validator, select_proposer},
    types::{LockedValue, RoundState, Step},
};

/// A single-writer instance of the round state machine for one shard.
///
/// Every method that takes `&mut self` is an event handler. Handlers first record what they received,
/// then call `advance`, which applies the upon-rules of the state machine repeatedly until none of them
/// fires. The rules, in the order in which they are checked:
/// 1. A quorum of precommits for a value whose full bytes are available, in any round: commit it and
///    move to the next height.
/// 2. Votes from validators with more than a third of the power for a higher round: skip to it.
/// 3. In the propose step, with the proposal of the current round at hand: prevote.
/// 4. A polka for a valid value in the current round, for the first time: update the valid value and,
///    in the prevote step, lock on it and precommit it.
/// 5. A polka for nil in the prevote step: precommit nil.
/// 6. A quorum of precommits for nil in the current round: start the next round.
pub(crate) struct Tendermint<N: Network, K: KVStore, V: ValueSource, R: ValidatorSetRegistry> {
    config: TendermintConfiguration,
    state: RoundState,
    aggregator: Aggregator,
    pacemaker: Pacemaker,
    // Full bytes of the values at the current height that passed `ValueSource::validate`, or that
    // this replica proposed itself.
    full_values: HashMap<ShardHash, Vec<u8>>,
    // The first value of each round whose full bytes were kept. A round's other values are only kept
    // if they are the value of its recorded proposal.
    full_value_rounds: BTreeMap<Round, ShardHash>,
    // Rounds of the current height in which rule 4 has already fired.
    polka_rounds: BTreeSet<Round>,
    value_source: V,
    commit_store: CommitStore<K>,
    validator_sets: R,
    sender: SenderHandle<N>,
    validator_set_update_handle: ValidatorSetUpdateHandle<N>,
    event_publisher: Option<Sender<Event>>,
}

impl<N: Network, K: KVStore, V: ValueSource, R: ValidatorSetRegistry> Tendermint<N, K, V, R> {
    pub(crate) fn new(
        config: TendermintConfiguration,
        pacemaker_config: PacemakerConfiguration,
        value_source: V,
        commit_store: CommitStore<K>,
        validator_sets: R,
        network: N,
        event_publisher: Option<Sender<Event>>,
    ) -> Self {
        let initial_height = Height::new(config.shard_index, config.initial_height);
        Self {
            config,
            state: RoundState::new(initial_height),
            aggregator: Aggregator::new(initial_height, ValidatorSet::new()),
            pacemaker: Pacemaker::new(pacemaker_config),
            full_values: HashMap::new(),
            full_value_rounds: BTreeMap::new(),
            polka_rounds: BTreeSet::new(),
            value_source,
            commit_store,
            validator_sets,
            sender: SenderHandle::new(network.clone()),
            validator_set_update_handle: ValidatorSetUpdateHandle::new(network),
            event_publisher,
        }
    }

    /// Enter the height after the highest one committed in the commit store (or the configured initial
    /// height), and start its round 0.
    pub(crate) fn start(&mut self) -> Result<(), TendermintError> {
        let height = self.next_height()?;
        self.enter_height(height)?;
        self.start_round(Round::init())?;
        self.advance()
    }

    /// Move to the height after the highest committed one if catch-up committed past the current
    /// height, and carry on from where the state machine stands.
    pub(crate) fn resume(&mut self) -> Result<(), TendermintError> {
        let height = self.next_height()?;
        if height > self.state.height {
            self.enter_height(height)?;
            self.start_round(Round::init())?;
        }
        self.advance()
    }

    pub(crate) fn height(&self) -> Height {
        self.state.height
    }

    pub(crate) fn validator_set(&self) -> &ValidatorSet {
        self.aggregator.validator_set()
    }

    #[cfg(test)]
    pub(crate) fn round(&self) -> Round {
        self.state.round
    }

    #[cfg(test)]
    pub(crate) fn step(&self) -> Step {
        self.state.step
    }

    #[cfg(test)]
    pub(crate) fn locked(&self) -> Option<LockedValue> {
        self.state.locked
    }

    #[cfg(test)]
    pub(crate) fn valid(&self) -> Option<LockedValue> {
        self.state.valid
    }

    /// Get the earliest instant at which a scheduled timeout expires.
    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.pacemaker.next_deadline()
    }

    /// Process a vote or proposal received from `origin`.
    ///
    /// Messages for other heights and messages that are not correctly signed are dropped.
    pub(crate) fn on_receive_msg(
        &mut self,
        origin: VerifyingKey,
        msg: ConsensusMessage,
    ) -> Result<(), TendermintError> {
        if msg.height() != self.state.height {
            log::debug!(
                "Dropping consensus message for height {} at height {}",
                msg.height(),
                self.state.height
            );
            return Ok(());
        }
        if !msg.is_correctly_signed() {
            log::debug!("Dropping incorrectly signed consensus message");
            return Ok(());
        }

        match msg {
            ConsensusMessage::Vote(signed_vote) => {
                Event::ReceiveVote(ReceiveVoteEvent {
                    timestamp: SystemTime::now(),
                    origin,
                    vote: signed_vote.vote.clone(),
                })
                .publish(&self.event_publisher);
                self.record_vote(signed_vote);
            }
            ConsensusMessage::Proposal(signed_proposal) => {
                Event::ReceiveProposal(ReceiveProposalEvent {
                    timestamp: SystemTime::now(),
                    origin,
                    proposal: signed_proposal.proposal.clone(),
                })
                .publish(&self.event_publisher);
                if !self
                    .aggregator
                    .add_proposal(signed_proposal, self.state.round)
                {
                    log::debug!("Ignoring proposal that is not the first from its round's proposer");
                }
            }
        }

        self.advance()
    }

    /// Process the full bytes of a value proposed by `origin`.
    ///
    /// They are only kept if `origin` is the designated proposer of their round, the round is at most
    /// `MAX_FUTURE_ROUNDS` ahead, they are the first full value of their round or the value of the
    /// round's recorded proposal, and the value source validates them.
    pub(crate) fn on_receive_full_proposal(
        &mut self,
        origin: VerifyingKey,
        full_proposal: FullProposal,
    ) -> Result<(), TendermintError> {
        let (height, round, value) = (
            full_proposal.height,
            full_proposal.round,
            full_proposal.value,
        );
        if height != self.state.height || self.full_values.contains_key(&value) {
            return Ok(());
        }
        if round.is_nil() || round.int() > self.state.round.int() + MAX_FUTURE_ROUNDS {
            log::debug!("Dropping full proposal for out of range round {}", round);
            return Ok(());
        }
        if full_proposal.proposer != origin.to_bytes()
            || !is_proposer(&origin, height, round, self.aggregator.validator_set())
        {
            log::debug!(
                "Dropping full proposal from {:?}, which is not the proposer of round {}",
                origin,
                round
            );
            return Ok(());
        }

        let expected = self
            .aggregator
            .has_proposal(height, round)
            .map(|signed_proposal| signed_proposal.proposal.value)
            .or_else(|| self.full_value_rounds.get(&round).copied());
        if expected.is_some_and(|expected| expected != value) {
            log::debug!(
                "Dropping second full proposal of round {} that does not match its proposal",
                round
            );
            return Ok(());
        }

        if !self
            .value_source
            .validate(height, &value, &full_proposal.full_value)
        {
            log::debug!("Dropping full proposal that fails validation at height {}", height);
            return Ok(());
        }
        self.full_value_rounds.entry(round).or_insert(value);
        self.full_values.insert(value, full_proposal.full_value);

        self.advance()
    }

    /// Handle every timeout that has expired, then carry on.
    pub(crate) fn tick(&mut self) -> Result<(), TendermintError> {
        for (round, step) in self.pacemaker.tick() {
            self.on_timeout(round, step)?;
        }
        self.advance()
    }

    /// React to the timeout of `step` in `round`. Timeouts of earlier rounds are stale and ignored.
    pub(crate) fn on_timeout(&mut self, round: Round, step: Step) -> Result<(), TendermintError> {
        if round != self.state.round {
            return Ok(());
        }

        Event::Timeout(TimeoutEvent {
            timestamp: SystemTime::now(),
            height: self.state.height,
            round,
            step,
            timeout: self.pacemaker.timeout_duration(round, step),
        })
        .publish(&self.event_publisher);

        match step {
            Step::Propose if self.state.step == Step::Propose => {
                self.vote(VoteType::Prevote, None)
            }
            Step::Prevote if self.state.step == Step::Prevote => {
                self.vote(VoteType::Precommit, None)
            }
            Step::Precommit => {
                self.request_vote_set_from_random_validator(round);
                self.start_round(round + 1)?;
            }
            _ => (),
        }

        self.advance()
    }

    /// Answer a vote set request with the votes recorded for the requested round at the current height,
    /// or with the precommits of the commit certificate of an earlier height.
    pub(crate) fn on_receive_vote_set_request(
        &mut self,
        origin: VerifyingKey,
        request: SyncVoteSetRequest,
    ) -> Result<(), TendermintError> {
        let votes = if request.height == self.state.height {
            self.aggregator.vote_set(request.round)
        } else if request.height.shard_index() == self.config.shard_index
            && request.height < self.state.height
        {
            self.commit_store
                .get_commit(request.height)?
                .map(|commits| commits.signed_precommits())
                .unwrap_or_default()
        } else {
            Vec::new()
        };

        if !votes.is_empty() {
            self.sender.send(
                origin,
                SyncVoteSetResponse::new(request.height, request.round, votes),
            );
        }
        Ok(())
    }

    /// Record every correctly signed vote in a vote set response for the current height.
    pub(crate) fn on_receive_vote_set_response(
        &mut self,
        origin: VerifyingKey,
        response: SyncVoteSetResponse,
    ) -> Result<(), TendermintError> {
        if response.height != self.state.height {
            return Ok(());
        }
        let signed_votes = match response.signed_votes() {
            Some(signed_votes) => signed_votes,
            None => {
                log::debug!("Dropping vote set response with mismatched vote and signature counts");
                return Ok(());
            }
        };

        for signed_vote in signed_votes {
            if signed_vote.vote.height != self.state.height {
                continue;
            }
            if !signed_vote
                .voter()
                .is_ok_and(|voter| signed_vote.is_correct(&voter))
            {
                log::debug!(
                    "Dropping incorrectly signed vote in vote set response from {:?}",
                    origin
                );
                continue;
            }
            self.record_vote(signed_vote);
        }

        self.advance()
    }

    /// Commit a value decided at some height, as received from a sync peer.
    ///
    /// The certificate is checked against the validator set that the registry holds for its height, and
    /// the full value against the value source. Returns whether the value was newly committed; `false`
    /// means the same value was already committed, and nothing changed.
    pub(crate) fn apply_synced_value(
        &mut self,
        response: &SyncValueResponse,
    ) -> Result<bool, TendermintError> {
        let commits = &response.commits;
        let height = commits.height;
        let validator_set = self
            .validator_sets
            .validator_set(height)
            .ok_or(TendermintError::MissingValidatorSet { height })?;

        if !commits.is_correctly_signed(&validator_set) {
            return Err(CommitError::IncorrectCertificate { height }.into());
        }
        if !self
            .value_source
            .validate(height, &commits.value, &response.full_value)
        {
            return Err(TendermintError::InvalidSyncedValue { height });
        }

        let committed = assembler::finalize(
            &mut self.commit_store,
            &mut self.value_source,
            &validator_set,
            commits,
            &response.full_value,
        )?;
        if committed {
            self.publish_commit(commits.clone());
        }
        Ok(committed)
    }

    /* ↓↓↓ Heights and rounds ↓↓↓ */

    fn next_height(&self) -> Result<Height, TendermintError> {
        Ok(
            match self
                .commit_store
                .highest_committed_height(self.config.shard_index)?
            {
                Some(highest) => highest.next(),
                None => Height::new(self.config.shard_index, self.config.initial_height),
            },
        )
    }

    fn enter_height(&mut self, height: Height) -> Result<(), TendermintError> {
        let validator_set = self
            .validator_sets
            .validator_set(height)
            .filter(|validator_set| validator_set.total_power() > TotalPower::new(0))
            .ok_or(TendermintError::MissingValidatorSet { height })?;

        self.validator_set_update_handle
            .update_validator_set(validator_set.clone());
        self.state = RoundState::new(height);
        self.aggregator = Aggregator::new(height, validator_set);
        self.pacemaker.clear();
        self.full_values.clear();
        self.full_value_rounds.clear();
        self.polka_rounds.clear();
        Ok(())
    }

    fn start_round(&mut self, round: Round) -> Result<(), TendermintError> {
        self.state.round = round;
        self.state.step = Step::Propose;
        self.pacemaker.clear();

        let height = self.state.height;
        if let Some(proposer) = select_proposer(height, round, self.aggregator.validator_set()) {
            Event::StartRound(StartRoundEvent {
                timestamp: SystemTime::now(),
                height,
                round,
                proposer,
            })
            .publish(&self.event_publisher);

            if self.me().is_some_and(|me| me == proposer) {
                self.propose();
            }
        }

        self.pacemaker.schedule(round, Step::Propose);
        Ok(())
    }

    /// Broadcast a proposal for the valid value, if there is one, or for a fresh value from the value
    /// source.
    fn propose(&mut self) {
        let (height, round) = (self.state.height, self.state.round);

        let reproposal = self
            .state
            .valid
            .and_then(|valid| self.full_value(&valid.value).ok().map(|bytes| (valid, bytes)));
        let (value, full_value, pol_round) = match reproposal {
            Some((valid, full_value)) => (valid.value, full_value, valid.round),
            None => {
                let (value, full_value) = self.value_source.propose(height);
                (value, full_value, Round::nil())
            }
        };
        self.full_values.insert(value, full_value.clone());
        self.full_value_rounds.entry(round).or_insert(value);

        let signed_proposal = match self.voting_keypair() {
            Some(keypair) => Proposal {
                height,
                round,
                pol_round,
                proposer: keypair.public().to_bytes(),
                value,
            }
            .sign(keypair),
            None => return,
        };

        self.sender.broadcast(FullProposal {
            height,
            round,
            proposer: signed_proposal.proposal.proposer,
            value,
            full_value,
        });
        self.sender.broadcast(signed_proposal.clone());

        Event::Propose(ProposeEvent {
            timestamp: SystemTime::now(),
            proposal: signed_proposal.proposal.clone(),
        })
        .publish(&self.event_publisher);

        self.aggregator.add_proposal(signed_proposal, round);
    }

    /* ↓↓↓ Upon-rules ↓↓↓ */

    fn advance(&mut self) -> Result<(), TendermintError> {
        loop {
            let progressed = self.try_commit()?
                || self.try_skip_round()?
                || self.try_prevote_on_proposal()
                || self.try_lock_on_polka()
                || self.try_precommit_nil_on_nil_polka()
                || self.try_next_round_on_nil_precommits()?;
            if !progressed {
                break;
            }
        }

        let round = self.state.round;
        if self.state.step == Step::Prevote
            && self.aggregator.has_any_quorum(round, VoteType::Prevote)
        {
            self.pacemaker.schedule(round, Step::Prevote);
        }
        if self.aggregator.has_any_quorum(round, VoteType::Precommit) {
            self.pacemaker.schedule(round, Step::Precommit);
        }
        Ok(())
    }

    fn try_commit(&mut self) -> Result<bool, TendermintError> {
        let decided = self
            .aggregator
            .decided_values()
            .into_iter()
            .find_map(|(round, value)| match self.full_value(&value) {
                Ok(full_value) => Some((round, value, full_value)),
                Err(error) => {
                    log::debug!("Waiting for the full bytes of a decided value: {:?}", error);
                    None
                }
            });
        let (round, value, full_value) = match decided {
            Some(decided) => decided,
            None => return Ok(false),
        };

        self.state.step = Step::Commit;
        let commits = assembler::assemble(&self.aggregator, round, value)?;
        if assembler::finalize(
            &mut self.commit_store,
            &mut self.value_source,
            self.aggregator.validator_set(),
            &commits,
            &full_value,
        )? {
            self.publish_commit(commits);
        }

        let next_height = self.state.height.next();
        self.enter_height(next_height)?;
        self.start_round(Round::init())?;
        Ok(true)
    }

    fn try_skip_round(&mut self) -> Result<bool, TendermintError> {
        match self.aggregator.skip_round(self.state.round) {
            Some(round) => {
                self.start_round(round)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn try_prevote_on_proposal(&mut self) -> bool {
        if self.state.step != Step::Propose {
            return false;
        }
        let (height, round) = (self.state.height, self.state.round);
        let proposal = match self.aggregator.has_proposal(height, round) {
            Some(signed_proposal) => signed_proposal.proposal.clone(),
            None => return false,
        };
        let value = proposal.value;

        if proposal.pol_round.is_nil() {
            // Wait for the full value, or for the propose timeout.
            if !self.is_valid(&value) {
                return false;
            }
            let acceptable = self
                .state
                .locked
                .map_or(true, |locked| locked.value == value);
            self.vote(VoteType::Prevote, acceptable.then_some(value));
            return true;
        }

        if proposal.pol_round >= round {
            log::debug!("Prevoting nil for proposal with pol_round not below its round");
            self.vote(VoteType::Prevote, None);
            return true;
        }

        match self
            .aggregator
            .has_polka(height, proposal.pol_round, VoteType::Prevote)
        {
            Some(Some(polka_value)) if polka_value == value => {
                if !self.is_valid(&value) {
                    return false;
                }
                let acceptable = self.state.locked.map_or(true, |locked| {
                    locked.round <= proposal.pol_round || locked.value == value
                });
                self.vote(VoteType::Prevote, acceptable.then_some(value));
            }
            polka => {
                log::debug!(
                    "Prevoting nil for proposal whose pol_round {} has no polka for its value",
                    proposal.pol_round
                );
                if polka.is_none() {
                    if let Ok(proposer) = VerifyingKey::from_bytes(&proposal.proposer) {
                        self.sender.send(
                            proposer,
                            SyncVoteSetRequest {
                                height,
                                round: proposal.pol_round,
                            },
                        );
                    }
                }
                self.vote(VoteType::Prevote, None);
            }
        }
        true
    }

    fn try_lock_on_polka(&mut self) -> bool {
        let (height, round) = (self.state.height, self.state.round);
        if self.state.step == Step::Propose || self.polka_rounds.contains(&round) {
            return false;
        }
        let value = match self.aggregator.has_polka(height, round, VoteType::Prevote) {
            Some(Some(value)) if self.is_valid(&value) => value,
            _ => return false,
        };
        self.polka_rounds.insert(round);
        self.publish_polka(VoteType::Prevote, Some(value));

        let polka_value = LockedValue { round, value };
        if self.state.step == Step::Prevote {
            self.state.locked = Some(polka_value);
            Event::UpdateLockedValue(UpdateLockedValueEvent {
                timestamp: SystemTime::now(),
                height,
                locked: polka_value,
            })
            .publish(&self.event_publisher);
            self.vote(VoteType::Precommit, Some(value));
        }
        self.state.valid = Some(polka_value);
        Event::UpdateValidValue(UpdateValidValueEvent {
            timestamp: SystemTime::now(),
            height,
            valid: polka_value,
        })
        .publish(&self.event_publisher);
        true
    }

    fn try_precommit_nil_on_nil_polka(&mut self) -> bool {
        if self.state.step != Step::Prevote
            || self
                .aggregator
                .has_polka(self.state.height, self.state.round, VoteType::Prevote)
                != Some(None)
        {
            return false;
        }
        self.publish_polka(VoteType::Prevote, None);
        self.vote(VoteType::Precommit, None);
        true
    }

    fn try_next_round_on_nil_precommits(&mut self) -> Result<bool, TendermintError> {
        let round = self.state.round;
        if self
            .aggregator
            .has_polka(self.state.height, round, VoteType::Precommit)
            != Some(None)
        {
            return Ok(false);
        }
        self.publish_polka(VoteType::Precommit, None);
        self.start_round(round + 1)?;
        Ok(true)
    }

    /* ↓↓↓ Helpers ↓↓↓ */

    fn me(&self) -> Option<VerifyingKey> {
        self.config.keypair.as_ref().map(|keypair| keypair.public())
    }

    /// Get the keypair of this replica if it is a validator at the current height.
    fn voting_keypair(&self) -> Option<&Keypair> {
        self.config
            .keypair
            .as_ref()
            .filter(|keypair| is_validator(&keypair.public(), self.aggregator.validator_set()))
    }

    fn is_valid(&self, value: &ShardHash) -> bool {
        self.full_values.contains_key(value)
    }

    /// Get the full bytes of `value` from the values received at this height, or else from the value
    /// source.
    fn full_value(&self, value: &ShardHash) -> Result<Vec<u8>, CommitError> {
        match self.full_values.get(value) {
            Some(full_value) => Ok(full_value.clone()),
            None => assembler::resolve(&self.value_source, value),
        }
    }

    /// Move to the step that follows casting a `vote_type` vote, and cast the vote if this replica is a
    /// validator.
    fn vote(&mut self, vote_type: VoteType, value: Option<ShardHash>) {
        self.state.step = match vote_type {
            VoteType::Prevote => Step::Prevote,
            VoteType::Precommit => Step::Precommit,
        };

        let signed_vote = match self.voting_keypair() {
            Some(keypair) => Vote {
                vote_type,
                height: self.state.height,
                round: self.state.round,
                value,
                voter: keypair.public().to_bytes(),
            }
            .sign(keypair),
            None => return,
        };

        self.sender.broadcast(signed_vote.clone());
        Event::Vote(VoteEvent {
            timestamp: SystemTime::now(),
            vote: signed_vote.vote.clone(),
        })
        .publish(&self.event_publisher);
        self.record_vote(signed_vote);
    }

    fn record_vote(&mut self, signed_vote: SignedVote) {
        match self.aggregator.add_vote(signed_vote, self.state.round) {
            AddVoteOutcome::Added | AddVoteOutcome::Duplicate => (),
            AddVoteOutcome::Equivocation { first, second } => {
                if let Ok(voter) = first.voter() {
                    Event::Equivocation(EquivocationEvent {
                        timestamp: SystemTime::now(),
                        voter,
                        first,
                        second,
                    })
                    .publish(&self.event_publisher);
                }
            }
            AddVoteOutcome::Rejected(reason) => log::debug!("Dropping vote: {:?}", reason),
        }
    }

    fn request_vote_set_from_random_validator(&mut self, round: Round) {
        let me = self.me();
        let peers: Vec<VerifyingKey> = self
            .aggregator
            .validator_set()
            .validators()
            .filter(|validator| Some(**validator) != me)
            .copied()
            .collect();
        if let Some(peer) = peers.choose(&mut rand::thread_rng()) {
            self.sender.send(
                *peer,
                SyncVoteSetRequest {
                    height: self.state.height,
                    round,
                },
            );
        }
    }

    fn publish_polka(&self, vote_type: VoteType, value: Option<ShardHash>) {
        Event::CollectPolka(CollectPolkaEvent {
            timestamp: SystemTime::now(),
            height: self.state.height,
            round: self.state.round,
            vote_type,
            value,
        })
        .publish(&self.event_publisher);
    }

    fn publish_commit(&self, commits: Commits) {
        Event::CommitValue(CommitValueEvent {
            timestamp: SystemTime::now(),
            commits,
        })
        .publish(&self.event_publisher);
    }

    #[cfg(test)]
    pub(crate) fn has_full_value(&self, value: &ShardHash) -> bool {
        self.full_values.contains_key(value)
    }

    #[cfg(test)]
    pub(crate) fn commit_store(&self) -> &CommitStore<K> {
        &self.commit_store
    }
}

/// Immutable parameters of a [`Tendermint`] instance.
pub(crate) struct TendermintConfiguration {
    pub(crate) shard_index: u32,
    pub(crate) initial_height: u64,
    /// `None` for replicas that follow consensus without voting.
    pub(crate) keypair: Option<Keypair>,
}

/// Enumerates the errors that stop the round state machine.
///
/// Malformed or misbehaving input is never an error. It is logged and dropped.
#[derive(Debug)]
pub enum TendermintError {
    /// See [`CommitError`].
    CommitError(CommitError),

    /// See [`CommitStoreError`].
    CommitStoreError(CommitStoreError),

    /// The validator set registry has no validator set with positive power for `height`.
    MissingValidatorSet { height: Height },

    /// A sync peer served a correctly certified value whose full bytes the value source rejects.
    InvalidSyncedValue { height: Height },
}

impl From<CommitError> for TendermintError {
    fn from(value: CommitError) -> Self {
        TendermintError::CommitError(value)
    }
}

impl From<CommitStoreError> for TendermintError {
    fn from(value: CommitStoreError) -> Self {
        TendermintError::CommitStoreError(value)
    }
}
