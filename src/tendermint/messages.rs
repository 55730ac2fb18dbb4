/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Messages that validators exchange while running a single height of the round state machine.
//!
//! Every message that can affect voting is a [`ConsensusMessage`]: either a [`SignedVote`] or a
//! [`SignedProposal`]. Both carry an Ed25519 signature over the Borsh encoding of the inner message,
//! prefixed with a one-byte domain tag so that a vote's bytes can never be mistaken for a proposal's.
//!
//! The full bytes of the proposed value travel in an unsigned [`FullProposal`]. A receiver only keeps
//! one that its network-authenticated sender names as `proposer`, when that sender is the designated
//! proposer of the round, and only if the value source validates the bytes against `value`.

use std::mem;

use borsh::{BorshDeserialize, BorshSerialize};

use crate::types::{
    crypto_primitives::{Keypair, SignatureError, VerifyingKey},
    data_types::{Height, Round, ShardHash, SignatureBytes, VerifyingKeyBytes},
    signed_messages::SignedMessage,
};

const VOTE_DOMAIN: u8 = 0;
const PROPOSAL_DOMAIN: u8 = 1;

/// The two kinds of votes cast in every round.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize)]
pub enum VoteType {
    Prevote,
    Precommit,
}

/// A validator's vote for a value, or for nothing (`value == None`), at a specific height and round.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Vote {
    pub vote_type: VoteType,
    pub height: Height,
    pub round: Round,
    pub value: Option<ShardHash>,
    pub voter: VerifyingKeyBytes,
}

impl Vote {
    /// Get the canonical bytes that a voter signs.
    pub fn signing_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![VOTE_DOMAIN];
        // Safety: Borsh serialization into memory does not fail.
        bytes.extend(self.try_to_vec().unwrap());
        bytes
    }

    /// Sign the vote with `keypair`.
    pub(crate) fn sign(self, keypair: &Keypair) -> SignedVote {
        let signature = keypair.sign(&self.signing_bytes());
        SignedVote {
            vote: self,
            signature,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct SignedVote {
    pub vote: Vote,
    pub signature: SignatureBytes,
}

impl SignedVote {
    /// Get the verifying key of the voter, if its bytes encode a valid Ed25519 point.
    pub fn voter(&self) -> Result<VerifyingKey, SignatureError> {
        VerifyingKey::from_bytes(&self.vote.voter)
    }
}

impl SignedMessage for SignedVote {
    fn message_bytes(&self) -> Vec<u8> {
        self.vote.signing_bytes()
    }

    fn signature_bytes(&self) -> SignatureBytes {
        self.signature
    }
}

/// A proposer's suggestion of `value` for `height` in `round`.
///
/// `pol_round` is [`Round::nil`] for fresh proposals. Otherwise, it names an earlier round of the same
/// height in which `value` gathered a polka of prevotes, justifying its re-proposal.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Proposal {
    pub height: Height,
    pub round: Round,
    pub pol_round: Round,
    pub proposer: VerifyingKeyBytes,
    pub value: ShardHash,
}

impl Proposal {
    pub fn signing_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![PROPOSAL_DOMAIN];
        // Safety: Borsh serialization into memory does not fail.
        bytes.extend(self.try_to_vec().unwrap());
        bytes
    }

    pub(crate) fn sign(self, keypair: &Keypair) -> SignedProposal {
        let signature = keypair.sign(&self.signing_bytes());
        SignedProposal {
            proposal: self,
            signature,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct SignedProposal {
    pub proposal: Proposal,
    pub signature: SignatureBytes,
}

impl SignedProposal {
    pub fn proposer(&self) -> Result<VerifyingKey, SignatureError> {
        VerifyingKey::from_bytes(&self.proposal.proposer)
    }
}

impl SignedMessage for SignedProposal {
    fn message_bytes(&self) -> Vec<u8> {
        self.proposal.signing_bytes()
    }

    fn signature_bytes(&self) -> SignatureBytes {
        self.signature
    }
}

/// The envelope for every message that can change a validator's voting state. Carries exactly one of
/// a vote or a proposal.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum ConsensusMessage {
    Vote(SignedVote),
    Proposal(SignedProposal),
}

impl ConsensusMessage {
    /// Get the height the inner message is about.
    pub fn height(&self) -> Height {
        match self {
            ConsensusMessage::Vote(signed_vote) => signed_vote.vote.height,
            ConsensusMessage::Proposal(signed_proposal) => signed_proposal.proposal.height,
        }
    }

    /// Get the round the inner message is about.
    pub fn round(&self) -> Round {
        match self {
            ConsensusMessage::Vote(signed_vote) => signed_vote.vote.round,
            ConsensusMessage::Proposal(signed_proposal) => signed_proposal.proposal.round,
        }
    }

    /// Check that the inner message is signed by the voter or proposer it names.
    pub fn is_correctly_signed(&self) -> bool {
        match self {
            ConsensusMessage::Vote(signed_vote) => signed_vote
                .voter()
                .is_ok_and(|voter| signed_vote.is_correct(&voter)),
            ConsensusMessage::Proposal(signed_proposal) => signed_proposal
                .proposer()
                .is_ok_and(|proposer| signed_proposal.is_correct(&proposer)),
        }
    }

    /// Get the number of bytes required to store the message in memory.
    pub fn size(&self) -> u64 {
        match self {
            ConsensusMessage::Vote(_) => mem::size_of::<SignedVote>() as u64,
            ConsensusMessage::Proposal(_) => mem::size_of::<SignedProposal>() as u64,
        }
    }
}

impl From<SignedVote> for ConsensusMessage {
    fn from(value: SignedVote) -> Self {
        ConsensusMessage::Vote(value)
    }
}

impl From<SignedProposal> for ConsensusMessage {
    fn from(value: SignedProposal) -> Self {
        ConsensusMessage::Proposal(value)
    }
}

/// The full bytes of a proposed value, gossiped by the proposer alongside its [`SignedProposal`].
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct FullProposal {
    pub height: Height,
    pub round: Round,
    pub proposer: VerifyingKeyBytes,
    pub value: ShardHash,
    pub full_value: Vec<u8>,
}

impl FullProposal {
    pub fn size(&self) -> u64 {
        (mem::size_of::<FullProposal>() + self.full_value.len()) as u64
    }
}
