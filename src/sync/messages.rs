/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Messages exchanged as part of catch-up and vote-set backfill.

use std::mem;

use borsh::{BorshDeserialize, BorshSerialize};

use crate::{
    commits::types::Commits,
    tendermint::messages::{SignedVote, Vote},
    types::data_types::{Height, Round, SignatureBytes, VerifyingKeyBytes},
};

#[derive(Clone, Debug, BorshSerialize, BorshDeserialize)]
pub enum SyncRequest {
    Value(SyncValueRequest),
    VoteSet(SyncVoteSetRequest),
}

#[derive(Clone, Debug, BorshSerialize, BorshDeserialize)]
pub enum SyncResponse {
    Value(SyncValueResponse),
    VoteSet(SyncVoteSetResponse),
}

/// Request for the value decided at `height`, with its commit certificate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct SyncValueRequest {
    pub height: Height,
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct SyncValueResponse {
    pub height: Height,
    pub full_value: Vec<u8>,
    pub commits: Commits,
}

/// Request for every vote the receiver has counted in `round` of `height`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct SyncVoteSetRequest {
    pub height: Height,
    pub round: Round,
}

/// Votes and their signatures, in two arrays of equal length where `signatures[i]` signs `votes[i]`.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct SyncVoteSetResponse {
    pub height: Height,
    pub round: Round,
    pub votes: Vec<Vote>,
    pub signatures: Vec<SignatureBytes>,
}

impl SyncVoteSetResponse {
    pub fn new(height: Height, round: Round, signed_votes: Vec<SignedVote>) -> Self {
        let (votes, signatures) = signed_votes
            .into_iter()
            .map(|signed_vote| (signed_vote.vote, signed_vote.signature))
            .unzip();
        Self {
            height,
            round,
            votes,
            signatures,
        }
    }

    /// Pair every vote with its signature, or return `None` if the arrays differ in length.
    pub fn signed_votes(self) -> Option<Vec<SignedVote>> {
        if self.votes.len() != self.signatures.len() {
            return None;
        }
        Some(
            self.votes
                .into_iter()
                .zip(self.signatures)
                .map(|(vote, signature)| SignedVote { vote, signature })
                .collect(),
        )
    }
}

/// Periodic advertisement of the heights a replica can serve.
///
/// `height` is the highest height the sender has a commit for, and `min_height` the lowest. A sender
/// with no commits advertises `min_height == height + 1`, so that no height falls in its range.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct StatusMessage {
    pub peer_id: VerifyingKeyBytes,
    pub height: Height,
    pub min_height: Height,
}

impl StatusMessage {
    /// Check whether the sender claims to be able to serve the commit of `height`.
    pub fn can_serve(&self, height: Height) -> bool {
        self.min_height <= height && height <= self.height
    }

    pub fn size(&self) -> u64 {
        mem::size_of::<StatusMessage>() as u64
    }
}
