/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Methods to build and run a replica of one shard.
//!
//! A replica runs the consensus instance of exactly one shard. Operators who take part in several
//! shards (including the coordinator shard) start one replica per shard, each with its own
//! [`KVStore`] namespace or instance. Replicas of different shards share nothing but the validator set
//! registry, which they only read.
//!
//! The key components of this module are:
//! - The builder-pattern interface to construct a [specification of the replica](ReplicaSpec) with:
//!   1. `ReplicaSpec::builder` to construct a `ReplicaSpecBuilder`,
//!   2. The setters of the `ReplicaSpecBuilder`, and
//!   3. The `ReplicaSpecBuilder::build` method to construct a [`ReplicaSpec`],
//! - The function to [start](ReplicaSpec::start) a [`Replica`] given its specification,
//! - [The type](Replica) which keeps the replica alive.
//!
//! ## Validators and read nodes
//!
//! Not every replica has to vote. A replica configured with `voting(false)` follows the progress
//! messages of its shard and catches up through sync, and applies every decided value through its
//! [`ValueSource`], but never signs a proposal or a vote. For such read nodes to keep up, the
//! [networking provider's](crate::networking) broadcast method must send progress messages to every
//! peer it is connected to, and not only to the validators.
//!
//! ## Starting a replica
//!
//! ```ignore
//! let replica =
//!     ReplicaSpec::builder()
//!     .network(network)
//!     .kv_store(kv_store)
//!     .value_source(value_source)
//!     .validator_sets(validator_sets)
//!     .configuration(configuration)
//!     .on_commit_value(commit_handler)
//!     .build()
//!     .start()?;
//! ```
//!
//! The replica's [configuration](Configuration) is also built using the builder pattern:
//!
//! ```ignore
//! let configuration =
//!     Configuration::builder()
//!     .me(signing_key)
//!     .shard_index(1)
//!     .initial_height(100)
//!     .propose_timeout(Duration::from_millis(500))
//!     .prevote_timeout(Duration::from_millis(500))
//!     .precommit_timeout(Duration::from_millis(500))
//!     .timeout_delta(Duration::from_millis(250))
//!     .progress_msg_buffer_capacity(BufferSize::new(1024 * 1024))
//!     .max_future_heights(10)
//!     .sync_request_timeout(Duration::from_secs(3))
//!     .sync_trigger_min_height_difference(2)
//!     .sync_blacklist_expiry_time(Duration::from_secs(60))
//!     .status_broadcast_period(Duration::from_secs(1))
//!     .log_events(true)
//!     .build()
//! ```

use std::{
    sync::mpsc::{self, Sender},
    thread::JoinHandle,
    time::Duration,
};

use ed25519_dalek::SigningKey;
use typed_builder::TypedBuilder;

use crate::{
    algorithm::{Algorithm, AlgorithmConfiguration},
    commit_store::{pluggables::KVStore, CommitStore, CommitStoreError},
    event_bus::*,
    events::*,
    networking::{network::Network, receiving::start_polling},
    pacemaker::implementation::PacemakerConfiguration,
    sync::{
        client::SyncClientConfiguration,
        server::{SyncServer, SyncServerConfiguration},
    },
    tendermint::implementation::TendermintConfiguration,
    types::{
        crypto_primitives::Keypair,
        data_types::{BufferSize, Height, TotalPower},
        validator_set::ValidatorSetRegistry,
    },
    value_source::ValueSource,
};

/// Stores the user-defined parameters required to start the replica.
///
/// ## Timeouts
///
/// The timeout of a step in round `r` is its base timeout plus `r * timeout_delta`, so that rounds get
/// longer until the network is synchronous enough for a round to decide.
///
/// Durations must be "well below" [`u64::MAX`] seconds, since they are added to [`std::time::Instant`]s.
///
/// ## Log Events
///
/// This crate logs using the [log](https://docs.rs/log/latest/log/) crate. To get these messages printed
/// onto a terminal or to a file, set up a [logging
/// implementation](https://docs.rs/log/latest/log/#available-logging-implementations).
#[derive(TypedBuilder)]
#[builder(builder_method(doc = "
    Create a builder for building a [Configuration]. On the builder call the following methods to construct a valid [Configuration].

    Required:
    - `.shard_index(...)`
    - `.initial_height(...)`
    - `.propose_timeout(...)`
    - `.prevote_timeout(...)`
    - `.precommit_timeout(...)`
    - `.timeout_delta(...)`
    - `.progress_msg_buffer_capacity(...)`
    - `.max_future_heights(...)`
    - `.sync_request_timeout(...)`
    - `.sync_trigger_min_height_difference(...)`
    - `.sync_blacklist_expiry_time(...)`
    - `.status_broadcast_period(...)`
    - `.log_events(...)`

    Optional:
    - `.me(...)`
    - `.voting(...)`
"))]
pub struct Configuration {
    #[builder(default, setter(strip_option, doc = "Set the replica's signing key, used to sign proposals and votes. Required if the replica votes."))]
    pub me: Option<SigningKey>,
    #[builder(default = true, setter(doc = "Set whether the replica votes. A replica that does not vote is a read node. Defaults to `true`."))]
    pub voting: bool,
    #[builder(setter(doc = "Set the index of the shard whose consensus instance the replica runs. Required."))]
    pub shard_index: u32,
    #[builder(setter(doc = "Set the block number of the first height, used while nothing of the shard is committed. Required."))]
    pub initial_height: u64,
    #[builder(setter(doc = "Set the base timeout of the propose step. Required."))]
    pub propose_timeout: Duration,
    #[builder(setter(doc = "Set the base timeout of the prevote step. Required."))]
    pub prevote_timeout: Duration,
    #[builder(setter(doc = "Set the base timeout of the precommit step. Required."))]
    pub precommit_timeout: Duration,
    #[builder(setter(doc = "Set how much longer every step timeout gets with each round. Required."))]
    pub timeout_delta: Duration,
    #[builder(setter(doc = "Set the maximum number of bytes of future-height progress messages that the replica buffers. Required."))]
    pub progress_msg_buffer_capacity: BufferSize,
    #[builder(setter(doc = "Set how many heights ahead of the current one progress messages are buffered for. Required."))]
    pub max_future_heights: u64,
    #[builder(setter(doc = "Set how long to wait for a response to a sync request. Required."))]
    pub sync_request_timeout: Duration,
    #[builder(setter(doc = "Set by how many heights a peer must be ahead before the replica catches up. Required."))]
    pub sync_trigger_min_height_difference: u64,
    #[builder(setter(doc = "Set for how long a peer that served an invalid sync response is not synced from. Required."))]
    pub sync_blacklist_expiry_time: Duration,
    #[builder(setter(doc = "Set how often the replica advertises the heights it can serve. Required."))]
    pub status_broadcast_period: Duration,
    #[builder(setter(doc = "Enable logging? Required."))]
    pub log_events: bool,
}

impl Configuration {
    fn into_parts(
        self,
    ) -> (
        AlgorithmConfiguration,
        TendermintConfiguration,
        PacemakerConfiguration,
        SyncClientConfiguration,
        SyncServerConfiguration,
    ) {
        let me = self.me.as_ref().map(|signing_key| signing_key.verifying_key());
        let algorithm_config = AlgorithmConfiguration {
            shard_index: self.shard_index,
            max_future_heights: self.max_future_heights,
            progress_msg_buffer_capacity: self.progress_msg_buffer_capacity,
        };
        let tendermint_config = TendermintConfiguration {
            shard_index: self.shard_index,
            initial_height: self.initial_height,
            keypair: self.me.filter(|_| self.voting).map(Keypair::new),
        };
        let pacemaker_config = PacemakerConfiguration {
            propose_timeout: self.propose_timeout,
            prevote_timeout: self.prevote_timeout,
            precommit_timeout: self.precommit_timeout,
            timeout_delta: self.timeout_delta,
        };
        let sync_client_config = SyncClientConfiguration {
            shard_index: self.shard_index,
            me,
            request_timeout: self.sync_request_timeout,
            trigger_min_height_difference: self.sync_trigger_min_height_difference,
            blacklist_expiry_time: self.sync_blacklist_expiry_time,
        };
        let sync_server_config = SyncServerConfiguration {
            shard_index: self.shard_index,
            initial_height: self.initial_height,
            me,
            status_broadcast_period: self.status_broadcast_period,
        };
        (
            algorithm_config,
            tendermint_config,
            pacemaker_config,
            sync_client_config,
            sync_server_config,
        )
    }
}

/// Stores all necessary parameters and trait implementations required to run the [`Replica`].
#[derive(TypedBuilder)]
#[builder(builder_method(doc = "
    Create a builder for building a [ReplicaSpec]. On the builder call the following methods to construct a valid [ReplicaSpec].

    Required:
    - `.network(...)`
    - `.kv_store(...)`
    - `.value_source(...)`
    - `.validator_sets(...)`
    - `.configuration(...)`

    Optional:
    - `.on_start_round(...)`
    - `.on_collect_polka(...)`
    - `.on_update_locked_value(...)`
    - `.on_update_valid_value(...)`
    - `.on_timeout(...)`
    - `.on_commit_value(...)`
    - `.on_propose(...)`
    - `.on_vote(...)`
    - `.on_receive_proposal(...)`
    - `.on_receive_vote(...)`
    - `.on_equivocation(...)`
    - `.on_start_sync(...)`
    - `.on_end_sync(...)`
    - `.on_receive_sync_request(...)`
    - `.on_send_sync_response(...)`
    - `.on_reject_sync_response(...)`
"))]
pub struct ReplicaSpec<
    K: KVStore,
    V: ValueSource,
    N: Network + 'static,
    R: ValidatorSetRegistry,
> {
    // Required parameters
    #[builder(setter(doc = "Set the implementation of peer-to-peer networking. The argument must implement the [Network](crate::networking::network::Network) trait. Required."))]
    network: N,
    #[builder(setter(doc = "Set the implementation of the replica's Key-Value store. The argument must implement the [KVStore](crate::commit_store::pluggables::KVStore) trait. Required."))]
    kv_store: K,
    #[builder(setter(doc = "Set the source of proposed values, which also validates and applies them. The argument must implement the [ValueSource](crate::value_source::ValueSource) trait. Required."))]
    value_source: V,
    #[builder(setter(doc = "Set the registry of validator sets per height. The argument must implement the [ValidatorSetRegistry](crate::types::validator_set::ValidatorSetRegistry) trait. Required."))]
    validator_sets: R,
    #[builder(setter(doc = "Set the [configuration](Configuration), which contains the necessary parameters to run a replica. Required."))]
    configuration: Configuration,
    // Optional parameters
    #[builder(default, setter(transform = |handler: impl Fn(&StartRoundEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<StartRoundEvent>),
    doc = "Register a handler closure to be invoked after the replica starts a round. Optional."))]
    on_start_round: Option<HandlerPtr<StartRoundEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&CollectPolkaEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<CollectPolkaEvent>),
    doc = "Register a handler closure to be invoked after the replica observes a polka. Optional."))]
    on_collect_polka: Option<HandlerPtr<CollectPolkaEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&UpdateLockedValueEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<UpdateLockedValueEvent>),
    doc = "Register a handler closure to be invoked after the replica locks on a value. Optional."))]
    on_update_locked_value: Option<HandlerPtr<UpdateLockedValueEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&UpdateValidValueEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<UpdateValidValueEvent>),
    doc = "Register a handler closure to be invoked after the replica updates its valid value. Optional."))]
    on_update_valid_value: Option<HandlerPtr<UpdateValidValueEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&TimeoutEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<TimeoutEvent>),
    doc = "Register a handler closure to be invoked after a step of the current round times out. Optional."))]
    on_timeout: Option<HandlerPtr<TimeoutEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&CommitValueEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<CommitValueEvent>),
    doc = "Register a handler closure to be invoked after a value is committed. Optional."))]
    on_commit_value: Option<HandlerPtr<CommitValueEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ProposeEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ProposeEvent>),
    doc = "Register a handler closure to be invoked after the replica broadcasts a proposal. Optional."))]
    on_propose: Option<HandlerPtr<ProposeEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&VoteEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<VoteEvent>),
    doc = "Register a handler closure to be invoked after the replica broadcasts a vote. Optional."))]
    on_vote: Option<HandlerPtr<VoteEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ReceiveProposalEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ReceiveProposalEvent>),
    doc = "Register a handler closure to be invoked after the replica receives a proposal. Optional."))]
    on_receive_proposal: Option<HandlerPtr<ReceiveProposalEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ReceiveVoteEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ReceiveVoteEvent>),
    doc = "Register a handler closure to be invoked after the replica receives a vote. Optional."))]
    on_receive_vote: Option<HandlerPtr<ReceiveVoteEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&EquivocationEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<EquivocationEvent>),
    doc = "Register a handler closure to be invoked with the evidence of a validator that voted twice. Optional."))]
    on_equivocation: Option<HandlerPtr<EquivocationEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&StartSyncEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<StartSyncEvent>),
    doc = "Register a handler closure to be invoked after the replica starts catching up. Optional."))]
    on_start_sync: Option<HandlerPtr<StartSyncEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&EndSyncEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<EndSyncEvent>),
    doc = "Register a handler closure to be invoked after the replica stops catching up. Optional."))]
    on_end_sync: Option<HandlerPtr<EndSyncEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ReceiveSyncRequestEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ReceiveSyncRequestEvent>),
    doc = "Register a handler closure to be invoked after the replica receives a sync request from a peer. Optional."))]
    on_receive_sync_request: Option<HandlerPtr<ReceiveSyncRequestEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&SendSyncResponseEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<SendSyncResponseEvent>),
    doc = "Register a handler closure to be invoked after the replica sends a sync response to a peer. Optional."))]
    on_send_sync_response: Option<HandlerPtr<SendSyncResponseEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&RejectSyncResponseEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<RejectSyncResponseEvent>),
    doc = "Register a handler closure to be invoked after the replica rejects a sync response and blacklists its sender. Optional."))]
    on_reject_sync_response: Option<HandlerPtr<RejectSyncResponseEvent>>,
}

impl<K: KVStore, V: ValueSource, N: Network + 'static, R: ValidatorSetRegistry>
    ReplicaSpec<K, V, N, R>
{
    /// Starts all threads and channels associated with running a replica, and returns the handles to them
    /// in a [`Replica`] struct.
    ///
    /// # Errors
    ///
    /// Fails without starting anything if the replica is configured to vote but has no signing key, or if
    /// the validator set registry has no validator set with positive power for the height the replica
    /// would start in.
    pub fn start(mut self) -> Result<Replica<K>, StartReplicaError> {
        if self.configuration.voting && self.configuration.me.is_none() {
            return Err(StartReplicaError::MissingSigningKey);
        }

        let commit_store = CommitStore::new(self.kv_store.clone());
        let shard_index = self.configuration.shard_index;
        let start_height = match commit_store.highest_committed_height(shard_index)? {
            Some(highest) => highest.next(),
            None => Height::new(shard_index, self.configuration.initial_height),
        };
        let validator_set = self
            .validator_sets
            .validator_set(start_height)
            .filter(|validator_set| validator_set.total_power() > TotalPower::new(0))
            .ok_or(StartReplicaError::EmptyValidatorSet {
                height: start_height,
            })?;
        self.network.init_validator_set(validator_set);

        let log_events = self.configuration.log_events;
        let (
            algorithm_config,
            tendermint_config,
            pacemaker_config,
            sync_client_config,
            sync_server_config,
        ) = self.configuration.into_parts();

        let (poller_shutdown, poller_shutdown_receiver) = mpsc::channel();
        let (poller, progress_msgs, sync_requests, sync_responses, vote_set_msgs) =
            start_polling(self.network.clone(), poller_shutdown_receiver);

        let event_handlers = EventHandlers::new(
            log_events,
            self.on_start_round,
            self.on_collect_polka,
            self.on_update_locked_value,
            self.on_update_valid_value,
            self.on_timeout,
            self.on_commit_value,
            self.on_propose,
            self.on_vote,
            self.on_receive_proposal,
            self.on_receive_vote,
            self.on_equivocation,
            self.on_start_sync,
            self.on_end_sync,
            self.on_receive_sync_request,
            self.on_send_sync_response,
            self.on_reject_sync_response,
        );

        let (event_publisher, event_subscriber) = if !event_handlers.is_empty() {
            Some(mpsc::channel()).unzip()
        } else {
            (None, None)
        };

        let (sync_server_shutdown, sync_server_shutdown_receiver) = mpsc::channel();
        let sync_server = SyncServer::new(
            sync_server_config,
            commit_store.clone(),
            sync_requests,
            self.network.clone(),
            sync_server_shutdown_receiver,
            event_publisher.clone(),
        )
        .start();

        let (algorithm_shutdown, algorithm_shutdown_receiver) = mpsc::channel();
        let algorithm = Algorithm::new(
            algorithm_config,
            tendermint_config,
            pacemaker_config,
            sync_client_config,
            commit_store.clone(),
            self.value_source,
            self.validator_sets,
            self.network,
            progress_msgs,
            sync_responses,
            vote_set_msgs,
            algorithm_shutdown_receiver,
            event_publisher,
        )
        .start();

        let (event_bus_shutdown, event_bus_shutdown_receiver) = if !event_handlers.is_empty() {
            Some(mpsc::channel()).unzip()
        } else {
            (None, None)
        };

        let event_bus = match (event_subscriber, event_bus_shutdown_receiver) {
            (Some(event_subscriber), Some(event_bus_shutdown_receiver)) => Some(start_event_bus(
                event_handlers,
                event_subscriber,
                event_bus_shutdown_receiver,
            )),
            _ => None,
        };

        Ok(Replica {
            commit_store,
            poller: Some(poller),
            poller_shutdown,
            algorithm: Some(algorithm),
            algorithm_shutdown,
            sync_server: Some(sync_server),
            sync_server_shutdown,
            event_bus,
            event_bus_shutdown,
        })
    }
}

/// Enumerates the misconfigurations that stop a replica from starting.
#[derive(Debug)]
pub enum StartReplicaError {
    /// The replica is configured to vote, but no signing key was provided.
    MissingSigningKey,

    /// The validator set registry has no validator set with positive power for `height`, the height the
    /// replica would start in.
    EmptyValidatorSet { height: Height },

    /// See [`CommitStoreError`].
    CommitStoreError(CommitStoreError),
}

impl From<CommitStoreError> for StartReplicaError {
    fn from(value: CommitStoreError) -> Self {
        StartReplicaError::CommitStoreError(value)
    }
}

/// A handle to the background threads of a replica. When this value is dropped, all background threads
/// are gracefully shut down.
pub struct Replica<K: KVStore> {
    commit_store: CommitStore<K>,
    poller: Option<JoinHandle<()>>,
    poller_shutdown: Sender<()>,
    algorithm: Option<JoinHandle<()>>,
    algorithm_shutdown: Sender<()>,
    sync_server: Option<JoinHandle<()>>,
    sync_server_shutdown: Sender<()>,
    event_bus: Option<JoinHandle<()>>,
    event_bus_shutdown: Option<Sender<()>>,
}

impl<K: KVStore> Replica<K> {
    /// Returns a read handle into the replica's [`CommitStore`], which holds the decided values and their
    /// commit certificates.
    pub fn commit_store(&self) -> &CommitStore<K> {
        &self.commit_store
    }
}

impl<K: KVStore> Drop for Replica<K> {
    fn drop(&mut self) {
        // Safety: the order of thread shutdown in this function is important, as the threads make assumptions
        // about the validity of their channels based on this. The algorithm and sync server threads receive
        // messages from the poller, and assume that the poller will live longer than them.

        self.event_bus_shutdown
            .iter()
            .for_each(|shutdown| shutdown.send(()).unwrap());
        if let Some(event_bus) = self.event_bus.take() {
            event_bus.join().unwrap();
        }

        self.algorithm_shutdown.send(()).unwrap();
        self.algorithm.take().unwrap().join().unwrap();

        self.sync_server_shutdown.send(()).unwrap();
        self.sync_server.take().unwrap().join().unwrap();

        self.poller_shutdown.send(()).unwrap();
        self.poller.take().unwrap().join().unwrap();
    }
}
