/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The [`SyncClient`], which decides when the local replica has fallen behind and catches it up one
//! height at a time.
//!
//! The client keeps the latest [`StatusMessage`] of each validator of the current height. A status is
//! only accepted from the peer it names. Peers that time out or serve a response that fails verification are blacklisted until
//! `blacklist_expiry_time` passes, and are neither counted as evidence of lagging behind nor asked for
//! values in the meantime.

use std::{
    collections::HashMap,
    sync::mpsc::{Receiver, Sender},
    time::{Duration, Instant, SystemTime},
};

use rand::seq::SliceRandom;

use crate::{
    commit_store::pluggables::KVStore,
    commits::assembler::CommitError,
    events::{EndSyncEvent, Event, RejectSyncResponseEvent, StartSyncEvent, SyncRejectionReason},
    networking::{
        network::Network,
        receiving::{SyncClientStub, SyncResponseReceiveError},
        sending::SenderHandle,
    },
    tendermint::{
        implementation::{Tendermint, TendermintError},
        roles::is_validator,
    },
    types::{
        crypto_primitives::VerifyingKey,
        data_types::Height,
        validator_set::{ValidatorSet, ValidatorSetRegistry},
    },
    value_source::ValueSource,
};

use super::messages::{StatusMessage, SyncValueRequest, SyncValueResponse};

pub(crate) struct SyncClient<N: Network> {
    config: SyncClientConfiguration,
    receiver: SyncClientStub,
    sender: SenderHandle<N>,
    peers: HashMap<VerifyingKey, StatusMessage>,
    // Peers mapped to the instant their blacklisting expires.
    blacklist: HashMap<VerifyingKey, Instant>,
    event_publisher: Option<Sender<Event>>,
}

impl<N: Network> SyncClient<N> {
    pub(crate) fn new(
        config: SyncClientConfiguration,
        responses: Receiver<(VerifyingKey, SyncValueResponse)>,
        network: N,
        event_publisher: Option<Sender<Event>>,
    ) -> Self {
        Self {
            config,
            receiver: SyncClientStub::new(responses),
            sender: SenderHandle::new(network),
            peers: HashMap::new(),
            blacklist: HashMap::new(),
            event_publisher,
        }
    }

    /// Remember the status that `origin` advertised, if `origin` is in `validator_set`. Statuses of peers
    /// that are no longer in `validator_set` are forgotten.
    pub(crate) fn on_receive_status(
        &mut self,
        origin: VerifyingKey,
        status: StatusMessage,
        validator_set: &ValidatorSet,
    ) {
        self.peers.retain(|peer, _| is_validator(peer, validator_set));

        if status.peer_id != origin.to_bytes() {
            log::debug!("Dropping status message whose peer_id does not match its sender");
            return;
        }
        if !is_validator(&origin, validator_set) {
            log::debug!("Dropping status message from non-validator {:?}", origin);
            return;
        }
        if status.height.shard_index() != self.config.shard_index
            || self.config.me.is_some_and(|me| me == origin)
        {
            return;
        }
        self.peers.insert(origin, status);
    }

    /// Check whether some peer that is not blacklisted can serve `cur_height`, and has committed at least
    /// `sync_trigger_min_height_difference - 1` heights past it.
    pub(crate) fn should_sync(&mut self, cur_height: Height) -> bool {
        self.remove_expired_blacklistings();
        let min_difference = self.config.trigger_min_height_difference;
        self.eligible_peers(cur_height).iter().any(|peer| {
            self.peers.get(peer).is_some_and(|status| {
                status.height.block_number() + 1 >= cur_height.block_number() + min_difference
            })
        })
    }

    /// Catch `tendermint` up with a random eligible peer, requesting one height at a time starting from
    /// the height that `tendermint` is in, for as long as the peer can serve it.
    ///
    /// Returns `Ok(())` when the peer has nothing more to serve, or was blacklisted along the way. Only
    /// errors that make further progress impossible are returned.
    pub(crate) fn sync<K: KVStore, V: ValueSource, R: ValidatorSetRegistry>(
        &mut self,
        tendermint: &mut Tendermint<N, K, V, R>,
    ) -> Result<(), SyncError> {
        let start_height = tendermint.height();
        let peer = match self.eligible_peers(start_height).choose(&mut rand::thread_rng()) {
            Some(peer) => *peer,
            None => return Ok(()),
        };

        Event::StartSync(StartSyncEvent {
            timestamp: SystemTime::now(),
            peer,
            height: start_height,
        })
        .publish(&self.event_publisher);

        let mut height = start_height;
        let mut values_synced = 0;
        while self
            .peers
            .get(&peer)
            .is_some_and(|status| status.can_serve(height))
        {
            self.sender.send(peer, SyncValueRequest { height });
            let deadline = Instant::now() + self.config.request_timeout;
            let response = match self.receiver.recv_response(peer, height, deadline) {
                Ok(response) => response,
                Err(SyncResponseReceiveError::Timeout) => {
                    self.reject(peer, height, SyncRejectionReason::Timeout);
                    break;
                }
                Err(SyncResponseReceiveError::Disconnected) => return Err(SyncError::Disconnected),
            };

            if response.height != height || response.commits.height != height {
                self.reject(peer, height, SyncRejectionReason::WrongHeight);
                break;
            }

            match tendermint.apply_synced_value(&response) {
                Ok(_) => {
                    values_synced += 1;
                    height = height.next();
                }
                Err(TendermintError::CommitError(CommitError::IncorrectCertificate { .. })) => {
                    self.reject(peer, height, SyncRejectionReason::IncorrectCertificate);
                    break;
                }
                Err(TendermintError::InvalidSyncedValue { .. }) => {
                    self.reject(peer, height, SyncRejectionReason::InvalidValue);
                    break;
                }
                Err(err) => return Err(err.into()),
            }
        }

        // Rejoin the round state machine at the height after the last one applied.
        tendermint.resume()?;

        Event::EndSync(EndSyncEvent {
            timestamp: SystemTime::now(),
            peer,
            height: tendermint.height(),
            values_synced,
        })
        .publish(&self.event_publisher);

        Ok(())
    }

    fn eligible_peers(&self, height: Height) -> Vec<VerifyingKey> {
        self.peers
            .iter()
            .filter(|(peer, status)| !self.blacklist.contains_key(*peer) && status.can_serve(height))
            .map(|(peer, _)| *peer)
            .collect()
    }

    fn reject(&mut self, peer: VerifyingKey, height: Height, reason: SyncRejectionReason) {
        self.blacklist
            .insert(peer, Instant::now() + self.config.blacklist_expiry_time);

        Event::RejectSyncResponse(RejectSyncResponseEvent {
            timestamp: SystemTime::now(),
            peer,
            height,
            reason,
        })
        .publish(&self.event_publisher);
    }

    fn remove_expired_blacklistings(&mut self) {
        let now = Instant::now();
        self.blacklist.retain(|_, expiry| *expiry > now);
    }
}

/// Immutable parameters that define the behaviour of the [`SyncClient`].
pub(crate) struct SyncClientConfiguration {
    pub(crate) shard_index: u32,
    pub(crate) me: Option<VerifyingKey>,
    pub(crate) request_timeout: Duration,
    pub(crate) trigger_min_height_difference: u64,
    pub(crate) blacklist_expiry_time: Duration,
}

/// Enumerates the errors that stop catch-up for good.
#[derive(Debug)]
pub enum SyncError {
    /// See [`TendermintError`].
    TendermintError(TendermintError),

    /// The poller thread that delivers sync responses has shut down.
    Disconnected,
}

impl From<TendermintError> for SyncError {
    fn from(value: TendermintError) -> Self {
        SyncError::TendermintError(value)
    }
}
