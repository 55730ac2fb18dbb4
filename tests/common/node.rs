use std::{
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use ed25519_dalek::SigningKey;
use shard_bft::{
    commits::types::Commits,
    events::{CommitValueEvent, EndSyncEvent, StartSyncEvent, VoteEvent},
    replica::{Configuration, Replica, ReplicaSpec},
    types::{
        crypto_primitives::VerifyingKey,
        data_types::{BufferSize, Height},
        validator_set::ValidatorSet,
    },
};

use crate::common::{
    logging::{first_seven_base64_chars, log_with_context},
    mem_db::MemDB,
    network::NetworkStub,
    value_source::{CounterValue, CounterValueSource},
};

pub(crate) const SHARD_INDEX: u32 = 1;

pub(crate) const INITIAL_HEIGHT: u64 = 100;

/// Things the Nodes will have in common:
/// - Validator Set.
/// - Configuration (except for whether they vote).
///
/// Things that they will differ in:
/// - Value source instance.
/// - Network instance.
/// - KVStore.
/// - Keypair.
pub(crate) struct Node {
    verifying_key: VerifyingKey,
    applied: Arc<Mutex<Vec<(Commits, CounterValue)>>>,
    votes_cast: Arc<AtomicUsize>,
    values_synced: Arc<AtomicU64>,
    replica: Replica<MemDB>,
}

impl Node {
    pub(crate) fn new(
        index: u8,
        keypair: SigningKey,
        network: NetworkStub,
        validator_set: ValidatorSet,
        voting: bool,
    ) -> Node {
        let verifying_key = keypair.verifying_key();
        let value_source = CounterValueSource::new(index);
        let applied = value_source.applied();
        let votes_cast = Arc::new(AtomicUsize::new(0));
        let values_synced = Arc::new(AtomicU64::new(0));

        let configuration = Configuration::builder()
            .me(keypair)
            .voting(voting)
            .shard_index(SHARD_INDEX)
            .initial_height(INITIAL_HEIGHT)
            .propose_timeout(Duration::from_millis(500))
            .prevote_timeout(Duration::from_millis(500))
            .precommit_timeout(Duration::from_millis(500))
            .timeout_delta(Duration::from_millis(250))
            .progress_msg_buffer_capacity(BufferSize::new(1024 * 1024))
            .max_future_heights(10)
            .sync_request_timeout(Duration::from_secs(3))
            .sync_trigger_min_height_difference(2)
            .sync_blacklist_expiry_time(Duration::from_secs(10))
            .status_broadcast_period(Duration::from_millis(500))
            .log_events(false)
            .build();

        let replica = ReplicaSpec::builder()
            .network(network)
            .kv_store(MemDB::new())
            .value_source(value_source)
            .validator_sets(validator_set)
            .configuration(configuration)
            .on_commit_value(commit_value_handler(verifying_key))
            .on_vote(vote_handler(votes_cast.clone()))
            .on_start_sync(start_sync_handler(verifying_key))
            .on_end_sync(end_sync_handler(verifying_key, values_synced.clone()))
            .build()
            .start()
            .expect("Cannot start the replica!");

        Node {
            verifying_key,
            applied,
            votes_cast,
            values_synced,
            replica,
        }
    }

    pub(crate) fn verifying_key(&self) -> VerifyingKey {
        self.verifying_key
    }

    /// Get the commit certificate this node stored for `block_number` of the test shard.
    pub(crate) fn commit(&self, block_number: u64) -> Option<Commits> {
        self.replica
            .commit_store()
            .get_commit(Height::new(SHARD_INDEX, block_number))
            .expect("Cannot read the commit store!")
    }

    pub(crate) fn decided_value(&self, block_number: u64) -> Option<Vec<u8>> {
        self.replica
            .commit_store()
            .decided_value(Height::new(SHARD_INDEX, block_number))
    }

    pub(crate) fn highest_committed_block_number(&self) -> Option<u64> {
        self.replica
            .commit_store()
            .highest_committed_height(SHARD_INDEX)
            .expect("Cannot read the commit store!")
            .map(|height| height.block_number())
    }

    pub(crate) fn has_committed(&self, block_number: u64) -> bool {
        self.highest_committed_block_number()
            .is_some_and(|highest| highest >= block_number)
    }

    /// Get every value the node's value source applied so far, in the order they were applied.
    pub(crate) fn applied(&self) -> Vec<(Commits, CounterValue)> {
        self.applied.lock().unwrap().clone()
    }

    pub(crate) fn votes_cast(&self) -> usize {
        self.votes_cast.load(Ordering::SeqCst)
    }

    /// Get the number of values the node fetched from its peers instead of deciding them itself.
    pub(crate) fn values_synced(&self) -> u64 {
        self.values_synced.load(Ordering::SeqCst)
    }
}

fn commit_value_handler(
    verifying_key: VerifyingKey,
) -> impl Fn(&CommitValueEvent) + Send + 'static {
    move |commit_value_event| {
        log_with_context(
            Some(&verifying_key.to_bytes()),
            &format!(
                "Committed Value, height: {}, round: {}, value: {}, no. of signatures: {}",
                commit_value_event.commits.height,
                commit_value_event.commits.round,
                first_seven_base64_chars(&commit_value_event.commits.value.hash.bytes()),
                commit_value_event.commits.signatures.len(),
            ),
        );
    }
}

fn vote_handler(votes_cast: Arc<AtomicUsize>) -> impl Fn(&VoteEvent) + Send + 'static {
    move |_| {
        votes_cast.fetch_add(1, Ordering::SeqCst);
    }
}

fn start_sync_handler(verifying_key: VerifyingKey) -> impl Fn(&StartSyncEvent) + Send + 'static {
    move |start_sync_event| {
        log_with_context(
            Some(&verifying_key.to_bytes()),
            &format!(
                "Started Sync, peer: {}, height: {}",
                first_seven_base64_chars(&start_sync_event.peer.to_bytes()),
                start_sync_event.height,
            ),
        );
    }
}

fn end_sync_handler(
    verifying_key: VerifyingKey,
    values_synced: Arc<AtomicU64>,
) -> impl Fn(&EndSyncEvent) + Send + 'static {
    move |end_sync_event| {
        values_synced.fetch_add(end_sync_event.values_synced, Ordering::SeqCst);
        log_with_context(
            Some(&verifying_key.to_bytes()),
            &format!(
                "Ended Sync, peer: {}, height: {}, values synced: {}",
                first_seven_base64_chars(&end_sync_event.peer.to_bytes()),
                end_sync_event.height,
                end_sync_event.values_synced,
            ),
        );
    }
}
