/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The [`SyncServer`], which answers [`SyncValueRequest`]s from the commit store and advertises which
//! heights it can serve.
//!
//! The server's responsibility as part of the protocol is to:
//! 1. Respond to value requests with the full value and commit certificate of the requested height, if it
//!    has them. Requests for heights it has no commit for go unanswered, and the requester times out.
//! 2. Periodically broadcast a [`StatusMessage`], which lets lagging replicas notice that they are behind
//!    and pick a peer to catch up from.

use std::{
    sync::mpsc::{Receiver, Sender, TryRecvError},
    thread::{self, JoinHandle},
    time::{Duration, Instant, SystemTime},
};

use crate::{
    commit_store::{pluggables::KVStore, CommitStore, CommitStoreError},
    events::{Event, ReceiveSyncRequestEvent, SendSyncResponseEvent},
    networking::{network::Network, receiving::SyncServerStub, sending::SenderHandle},
    types::{crypto_primitives::VerifyingKey, data_types::Height},
};

use super::messages::{StatusMessage, SyncValueRequest, SyncValueResponse};

pub(crate) struct SyncServer<N: Network + 'static, K: KVStore> {
    config: SyncServerConfiguration,
    commit_store: CommitStore<K>,
    last_status_broadcast: Option<Instant>,
    receiver: SyncServerStub,
    sender: SenderHandle<N>,
    shutdown_signal: Receiver<()>,
    event_publisher: Option<Sender<Event>>,
}

impl<N: Network + 'static, K: KVStore> SyncServer<N, K> {
    pub(crate) fn new(
        config: SyncServerConfiguration,
        commit_store: CommitStore<K>,
        requests: Receiver<(VerifyingKey, SyncValueRequest)>,
        network: N,
        shutdown_signal: Receiver<()>,
        event_publisher: Option<Sender<Event>>,
    ) -> Self {
        Self {
            config,
            commit_store,
            last_status_broadcast: None,
            receiver: SyncServerStub::new(requests),
            sender: SenderHandle::new(network),
            shutdown_signal,
            event_publisher,
        }
    }

    pub(crate) fn start(mut self) -> JoinHandle<()> {
        thread::spawn(move || loop {
            match self.shutdown_signal.try_recv() {
                Ok(()) => return,
                Err(TryRecvError::Empty) => (),
                Err(TryRecvError::Disconnected) => {
                    panic!("Sync server thread disconnected from main thread")
                }
            }

            // 1. Respond to a received value request.
            if let Ok((origin, request)) = self.receiver.recv_request() {
                self.on_receive_request(origin, request);
            }

            // 2. Advertise the range of heights this server can serve, if it is time to.
            if self
                .last_status_broadcast
                .map_or(true, |last| last.elapsed() >= self.config.status_broadcast_period)
            {
                self.broadcast_status();
                self.last_status_broadcast = Some(Instant::now());
            }

            thread::yield_now();
        })
    }

    fn on_receive_request(&mut self, origin: VerifyingKey, request: SyncValueRequest) {
        let height = request.height;
        if height.shard_index() != self.config.shard_index {
            log::debug!(
                "Ignoring sync request for height {} of another shard",
                height
            );
            return;
        }

        Event::ReceiveSyncRequest(ReceiveSyncRequestEvent {
            timestamp: SystemTime::now(),
            peer: origin,
            height,
        })
        .publish(&self.event_publisher);

        match self.commit_store.decided(height) {
            Ok(Some((commits, full_value))) => {
                self.sender.send(
                    origin,
                    SyncValueResponse {
                        height,
                        full_value,
                        commits: commits.clone(),
                    },
                );

                Event::SendSyncResponse(SendSyncResponseEvent {
                    timestamp: SystemTime::now(),
                    peer: origin,
                    commits,
                })
                .publish(&self.event_publisher);
            }
            Ok(None) => log::debug!("No decided value to serve at height {}", height),
            Err(err) => log::error!("Sync server failed to read height {}: {:?}", height, err),
        }
    }

    fn broadcast_status(&mut self) {
        let me = match self.config.me {
            Some(me) => me,
            None => return,
        };

        match self.status(me) {
            Ok(status) => self.sender.broadcast(status),
            Err(err) => log::error!("Sync server failed to read its committed heights: {:?}", err),
        }
    }

    fn status(&self, me: VerifyingKey) -> Result<StatusMessage, CommitStoreError> {
        let shard_index = self.config.shard_index;
        let height = match self.commit_store.highest_committed_height(shard_index)? {
            Some(highest) => highest,
            None => Height::new(shard_index, self.config.initial_height).prev(),
        };
        let min_height = self
            .commit_store
            .lowest_committed_height(shard_index)?
            .unwrap_or(height.next());

        Ok(StatusMessage {
            peer_id: me.to_bytes(),
            height,
            min_height,
        })
    }
}

/// Immutable parameters that define the behaviour of the [`SyncServer`].
pub(crate) struct SyncServerConfiguration {
    pub(crate) shard_index: u32,
    pub(crate) initial_height: u64,
    /// The key that status messages are advertised under. Replicas without one only answer requests.
    pub(crate) me: Option<VerifyingKey>,
    pub(crate) status_broadcast_period: Duration,
}
