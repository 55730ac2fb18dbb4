/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Events that a replica publishes when its state changes or when it sends or receives messages.
//!
//! An event for a given action indicates that the action has been completed. Library users subscribe to
//! events by registering handlers on the [`ReplicaSpec`](crate::replica::ReplicaSpec), and every event
//! can also be logged by the default handlers in [`logging`](crate::logging).

use std::{
    sync::mpsc::Sender,
    time::{Duration, SystemTime},
};

use crate::{
    commits::types::Commits,
    tendermint::{
        messages::{Proposal, SignedVote, Vote, VoteType},
        types::{LockedValue, Step},
    },
    types::{
        crypto_primitives::VerifyingKey,
        data_types::{Height, Round, ShardHash},
    },
};

pub enum Event {
    // Events that change the round state.
    StartRound(StartRoundEvent),
    CollectPolka(CollectPolkaEvent),
    UpdateLockedValue(UpdateLockedValueEvent),
    UpdateValidValue(UpdateValidValueEvent),
    Timeout(TimeoutEvent),
    CommitValue(CommitValueEvent),
    // Events that involve broadcasting a consensus message.
    Propose(ProposeEvent),
    Vote(VoteEvent),
    // Events that involve receiving a consensus message.
    ReceiveProposal(ReceiveProposalEvent),
    ReceiveVote(ReceiveVoteEvent),
    Equivocation(EquivocationEvent),
    // Sync events.
    StartSync(StartSyncEvent),
    EndSync(EndSyncEvent),
    ReceiveSyncRequest(ReceiveSyncRequestEvent),
    SendSyncResponse(SendSyncResponseEvent),
    RejectSyncResponse(RejectSyncResponseEvent),
}

impl Event {
    /// Send the event to the event bus, if there is one.
    pub(crate) fn publish(self, event_publisher: &Option<Sender<Event>>) {
        if let Some(event_publisher) = event_publisher {
            // The event bus thread may already be gone during shutdown.
            let _ = event_publisher.send(self);
        }
    }
}

pub struct StartRoundEvent {
    pub timestamp: SystemTime,
    pub height: Height,
    pub round: Round,
    pub proposer: VerifyingKey,
}

pub struct CollectPolkaEvent {
    pub timestamp: SystemTime,
    pub height: Height,
    pub round: Round,
    pub vote_type: VoteType,
    /// `None` for a polka for nil.
    pub value: Option<ShardHash>,
}

pub struct UpdateLockedValueEvent {
    pub timestamp: SystemTime,
    pub height: Height,
    pub locked: LockedValue,
}

pub struct UpdateValidValueEvent {
    pub timestamp: SystemTime,
    pub height: Height,
    pub valid: LockedValue,
}

pub struct TimeoutEvent {
    pub timestamp: SystemTime,
    pub height: Height,
    pub round: Round,
    pub step: Step,
    pub timeout: Duration,
}

pub struct CommitValueEvent {
    pub timestamp: SystemTime,
    pub commits: Commits,
}

pub struct ProposeEvent {
    pub timestamp: SystemTime,
    pub proposal: Proposal,
}

pub struct VoteEvent {
    pub timestamp: SystemTime,
    pub vote: Vote,
}

pub struct ReceiveProposalEvent {
    pub timestamp: SystemTime,
    pub origin: VerifyingKey,
    pub proposal: Proposal,
}

pub struct ReceiveVoteEvent {
    pub timestamp: SystemTime,
    pub origin: VerifyingKey,
    pub vote: Vote,
}

/// Published when a validator is found to have cast two different votes of the same type in the same
/// height and round. Carries both signed votes as evidence.
pub struct EquivocationEvent {
    pub timestamp: SystemTime,
    pub voter: VerifyingKey,
    pub first: SignedVote,
    pub second: SignedVote,
}

pub struct StartSyncEvent {
    pub timestamp: SystemTime,
    pub peer: VerifyingKey,
    pub height: Height,
}

pub struct EndSyncEvent {
    pub timestamp: SystemTime,
    pub peer: VerifyingKey,
    pub height: Height,
    pub values_synced: u64,
}

pub struct ReceiveSyncRequestEvent {
    pub timestamp: SystemTime,
    pub peer: VerifyingKey,
    pub height: Height,
}

pub struct SendSyncResponseEvent {
    pub timestamp: SystemTime,
    pub peer: VerifyingKey,
    pub commits: Commits,
}

pub struct RejectSyncResponseEvent {
    pub timestamp: SystemTime,
    pub peer: VerifyingKey,
    pub height: Height,
    pub reason: SyncRejectionReason,
}

/// Why a sync client stopped trusting a sync peer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncRejectionReason {
    /// No response arrived before the request timeout.
    Timeout,
    /// The response was for a different height than the one requested.
    WrongHeight,
    /// The commit certificate was not signed by a quorum of the height's validator set.
    IncorrectCertificate,
    /// The value source refused the full value, or it does not match the certificate.
    InvalidValue,
}
