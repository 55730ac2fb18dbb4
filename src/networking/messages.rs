/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Exhaustive enumerations around every message variant that replicas exchange.

use borsh::{BorshDeserialize, BorshSerialize};

use crate::{
    sync::messages::{
        StatusMessage, SyncRequest, SyncResponse, SyncValueRequest, SyncValueResponse,
        SyncVoteSetRequest, SyncVoteSetResponse,
    },
    tendermint::messages::{ConsensusMessage, FullProposal, SignedProposal, SignedVote},
    types::data_types::Height,
};

/// All message variants.
#[derive(Clone, Debug, BorshSerialize, BorshDeserialize)]
pub enum Message {
    /// See: [`ProgressMessage`].
    ProgressMessage(ProgressMessage),

    /// See: [`SyncMessage`].
    SyncMessage(SyncMessage),
}

/// Message variants received by the [`algorithm`](crate::algorithm) thread through the height-aware
/// buffer.
#[derive(Clone, Debug, BorshSerialize, BorshDeserialize)]
pub enum ProgressMessage {
    /// See [`ConsensusMessage`].
    ConsensusMessage(ConsensusMessage),

    /// See [`FullProposal`].
    FullProposal(FullProposal),

    /// See [`StatusMessage`].
    StatusMessage(StatusMessage),
}

impl ProgressMessage {
    /// Get the height that the inner message is about, if it is about one. Status messages are not.
    pub fn height(&self) -> Option<Height> {
        match self {
            ProgressMessage::ConsensusMessage(msg) => Some(msg.height()),
            ProgressMessage::FullProposal(msg) => Some(msg.height),
            ProgressMessage::StatusMessage(_) => None,
        }
    }

    /// Get the shard that the inner message belongs to.
    pub fn shard_index(&self) -> u32 {
        match self {
            ProgressMessage::ConsensusMessage(msg) => msg.height().shard_index(),
            ProgressMessage::FullProposal(msg) => msg.height.shard_index(),
            ProgressMessage::StatusMessage(msg) => msg.height.shard_index(),
        }
    }

    /// Get the number of bytes the message takes up in the progress message buffer.
    pub fn size(&self) -> u64 {
        match self {
            ProgressMessage::ConsensusMessage(msg) => msg.size(),
            ProgressMessage::FullProposal(msg) => msg.size(),
            ProgressMessage::StatusMessage(msg) => msg.size(),
        }
    }
}

/// Message variants exchanged to catch up on decided values and to backfill vote sets.
#[derive(Clone, Debug, BorshSerialize, BorshDeserialize)]
pub enum SyncMessage {
    SyncRequest(SyncRequest),
    SyncResponse(SyncResponse),
}

impl From<ConsensusMessage> for Message {
    fn from(value: ConsensusMessage) -> Self {
        Message::ProgressMessage(ProgressMessage::ConsensusMessage(value))
    }
}

impl From<SignedVote> for Message {
    fn from(value: SignedVote) -> Self {
        Message::from(ConsensusMessage::Vote(value))
    }
}

impl From<SignedProposal> for Message {
    fn from(value: SignedProposal) -> Self {
        Message::from(ConsensusMessage::Proposal(value))
    }
}

impl From<FullProposal> for Message {
    fn from(value: FullProposal) -> Self {
        Message::ProgressMessage(ProgressMessage::FullProposal(value))
    }
}

impl From<StatusMessage> for Message {
    fn from(value: StatusMessage) -> Self {
        Message::ProgressMessage(ProgressMessage::StatusMessage(value))
    }
}

impl From<SyncRequest> for Message {
    fn from(value: SyncRequest) -> Self {
        Message::SyncMessage(SyncMessage::SyncRequest(value))
    }
}

impl From<SyncResponse> for Message {
    fn from(value: SyncResponse) -> Self {
        Message::SyncMessage(SyncMessage::SyncResponse(value))
    }
}

impl From<SyncValueRequest> for Message {
    fn from(value: SyncValueRequest) -> Self {
        Message::from(SyncRequest::Value(value))
    }
}

impl From<SyncVoteSetRequest> for Message {
    fn from(value: SyncVoteSetRequest) -> Self {
        Message::from(SyncRequest::VoteSet(value))
    }
}

impl From<SyncValueResponse> for Message {
    fn from(value: SyncValueResponse) -> Self {
        Message::from(SyncResponse::Value(value))
    }
}

impl From<SyncVoteSetResponse> for Message {
    fn from(value: SyncVoteSetResponse) -> Self {
        Message::from(SyncResponse::VoteSet(value))
    }
}
