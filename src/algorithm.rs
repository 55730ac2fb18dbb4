/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The algorithm thread: the single writer of a shard's consensus state.
//!
//! Every input that can change the round state machine is handled on this thread, one at a time. The
//! thread is a loop, each iteration of which:
//! 1. Checks for a shutdown signal.
//! 2. Catches up through the [sync client](crate::sync::client) if some peer shows that the replica has
//!    fallen behind. While catching up, no progress messages are processed and no votes are cast.
//! 3. Fires every step timeout that has expired.
//! 4. Answers and applies pending vote set requests and responses.
//! 5. Waits for the next progress message, until the earliest timeout expires or a short poll period
//!    passes, and feeds it to the round state machine. Status messages go to the sync client.

use std::{
    cmp::min,
    sync::mpsc::{Receiver, Sender, TryRecvError},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crate::{
    commit_store::{pluggables::KVStore, CommitStore},
    events::Event,
    networking::{
        messages::ProgressMessage,
        network::Network,
        receiving::{
            ProgressMessageReceiveError, ProgressMessageStub, VoteSetMessage, VoteSetStub,
        },
    },
    pacemaker::implementation::PacemakerConfiguration,
    sync::{
        client::{SyncClient, SyncClientConfiguration, SyncError},
        messages::SyncValueResponse,
    },
    tendermint::implementation::{Tendermint, TendermintConfiguration, TendermintError},
    types::{
        crypto_primitives::VerifyingKey, data_types::BufferSize,
        validator_set::ValidatorSetRegistry,
    },
    value_source::ValueSource,
};

/// Upper bound on how long the thread waits for a progress message before it checks on everything else.
const POLL_PERIOD: Duration = Duration::from_millis(50);

pub(crate) struct Algorithm<
    N: Network + 'static,
    K: KVStore,
    V: ValueSource,
    R: ValidatorSetRegistry,
> {
    config: AlgorithmConfiguration,
    tendermint: Tendermint<N, K, V, R>,
    sync_client: SyncClient<N>,
    progress_msg_stub: ProgressMessageStub,
    vote_set_stub: VoteSetStub,
    shutdown_signal: Receiver<()>,
}

impl<N: Network + 'static, K: KVStore, V: ValueSource, R: ValidatorSetRegistry>
    Algorithm<N, K, V, R>
{
    pub(crate) fn new(
        config: AlgorithmConfiguration,
        tendermint_config: TendermintConfiguration,
        pacemaker_config: PacemakerConfiguration,
        sync_client_config: SyncClientConfiguration,
        commit_store: CommitStore<K>,
        value_source: V,
        validator_sets: R,
        network: N,
        progress_msgs: Receiver<(VerifyingKey, ProgressMessage)>,
        sync_responses: Receiver<(VerifyingKey, SyncValueResponse)>,
        vote_set_msgs: Receiver<(VerifyingKey, VoteSetMessage)>,
        shutdown_signal: Receiver<()>,
        event_publisher: Option<Sender<Event>>,
    ) -> Self {
        let progress_msg_stub =
            ProgressMessageStub::new(progress_msgs, config.progress_msg_buffer_capacity);
        let tendermint = Tendermint::new(
            tendermint_config,
            pacemaker_config,
            value_source,
            commit_store,
            validator_sets,
            network.clone(),
            event_publisher.clone(),
        );
        let sync_client =
            SyncClient::new(sync_client_config, sync_responses, network, event_publisher);

        Self {
            config,
            tendermint,
            sync_client,
            progress_msg_stub,
            vote_set_stub: VoteSetStub::new(vote_set_msgs),
            shutdown_signal,
        }
    }

    pub(crate) fn start(mut self) -> JoinHandle<()> {
        thread::spawn(move || {
            if let Err(err) = self.execute() {
                log::error!("Algorithm thread of shard {} stopped: {:?}", self.config.shard_index, err);
                // Stay alive until the replica is dropped, so that its shutdown signal can be delivered.
                let _ = self.shutdown_signal.recv();
            }
        })
    }

    fn execute(&mut self) -> Result<(), AlgorithmError> {
        self.tendermint.start()?;

        loop {
            match self.shutdown_signal.try_recv() {
                Ok(()) => return Ok(()),
                Err(TryRecvError::Empty) => (),
                Err(TryRecvError::Disconnected) => {
                    panic!("Algorithm thread disconnected from main thread")
                }
            }

            // 1. Catch up if the network is ahead.
            if self.sync_client.should_sync(self.tendermint.height()) {
                self.sync_client.sync(&mut self.tendermint)?;
                continue;
            }

            // 2. Fire expired timeouts.
            self.tendermint.tick()?;

            // 3. Vote set backfill.
            while let Ok((origin, msg)) = self.vote_set_stub.try_recv() {
                match msg {
                    VoteSetMessage::Request(request) => self
                        .tendermint
                        .on_receive_vote_set_request(origin, request)?,
                    VoteSetMessage::Response(response) => self
                        .tendermint
                        .on_receive_vote_set_response(origin, response)?,
                }
            }

            // 4. Progress messages.
            let poll_deadline = Instant::now() + POLL_PERIOD;
            let deadline = self
                .tendermint
                .next_deadline()
                .map_or(poll_deadline, |next_deadline| min(next_deadline, poll_deadline));
            match self.progress_msg_stub.recv(
                self.config.shard_index,
                self.tendermint.height(),
                self.config.max_future_heights,
                deadline,
            ) {
                Ok((origin, ProgressMessage::ConsensusMessage(msg))) => {
                    self.tendermint.on_receive_msg(origin, msg)?
                }
                Ok((origin, ProgressMessage::FullProposal(full_proposal))) => self
                    .tendermint
                    .on_receive_full_proposal(origin, full_proposal)?,
                Ok((origin, ProgressMessage::StatusMessage(status))) => self
                    .sync_client
                    .on_receive_status(origin, status, self.tendermint.validator_set()),
                Err(ProgressMessageReceiveError::Timeout) => (),
                Err(ProgressMessageReceiveError::Disconnected) => {
                    return Err(AlgorithmError::PollerDisconnected)
                }
            }
        }
    }
}

/// Immutable parameters of the [`Algorithm`] loop itself.
pub(crate) struct AlgorithmConfiguration {
    pub(crate) shard_index: u32,
    pub(crate) max_future_heights: u64,
    pub(crate) progress_msg_buffer_capacity: BufferSize,
}

#[derive(Debug)]
enum AlgorithmError {
    TendermintError(TendermintError),
    SyncError(SyncError),
    PollerDisconnected,
}

impl From<TendermintError> for AlgorithmError {
    fn from(value: TendermintError) -> Self {
        AlgorithmError::TendermintError(value)
    }
}

impl From<SyncError> for AlgorithmError {
    fn from(value: SyncError) -> Self {
        AlgorithmError::SyncError(value)
    }
}
