/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Functions that log out events.
//!
//! The logs defined in this module are printed if the user enabled them via the replica's
//! [configuration](crate::replica::Configuration).
//!
//! This crate logs using the [log](https://docs.rs/log/latest/log/) crate. To get these messages
//! printed onto a terminal or to a file, set up a
//! [logging implementation](https://docs.rs/log/latest/log/#available-logging-implementations).
//!
//! ## Log message format
//!
//! Log messages are CSVs (Comma Separated Values) with at least two values. The first two values are
//! always:
//! 1. The name of the [event](crate::events) in PascalCase (defined in this module as constants).
//! 2. The time the event was emitted (as number of seconds since the Unix Epoch).
//!
//! The rest of the values differ depending on the kind of event. For example, the following snippet
//! is how a [ReceiveProposal](crate::events::ReceiveProposalEvent) is printed:
//!
//! ```text
//! ReceiveProposal, 1701329264, Id5u7f6, 1/100, 0, -1, fNGCJyk
//! ```
//!
//! In the snippet:
//! - The third value is the first seven characters of the Base64 encoding of the verifying key of the
//!   origin of the proposal.
//! - The fourth and fifth values are the height (`shard/block`) and round of the proposal.
//! - The sixth value is the proposal's `pol_round`.
//! - The seventh value is the first seven characters of the Base64 encoding of the proposed value's hash.
//!
//! A vote for nil prints `nil` in place of a value hash.

use std::time::SystemTime;

use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};

use crate::{events::*, types::data_types::ShardHash};

// Names of each event in PascalCase for printing:
pub const START_ROUND: &str = "StartRound";
pub const COLLECT_POLKA: &str = "CollectPolka";
pub const UPDATE_LOCKED_VALUE: &str = "UpdateLockedValue";
pub const UPDATE_VALID_VALUE: &str = "UpdateValidValue";
pub const TIMEOUT: &str = "Timeout";
pub const COMMIT_VALUE: &str = "CommitValue";

pub const PROPOSE: &str = "Propose";
pub const VOTE: &str = "Vote";

pub const RECEIVE_PROPOSAL: &str = "ReceiveProposal";
pub const RECEIVE_VOTE: &str = "ReceiveVote";
pub const EQUIVOCATION: &str = "Equivocation";

pub const START_SYNC: &str = "StartSync";
pub const END_SYNC: &str = "EndSync";
pub const RECEIVE_SYNC_REQUEST: &str = "ReceiveSyncRequest";
pub const SEND_SYNC_RESPONSE: &str = "SendSyncResponse";
pub const REJECT_SYNC_RESPONSE: &str = "RejectSyncResponse";

/// Implemented by event types. Used to get a closure that logs the event.
pub(crate) trait Logger {
    /// Returns a pointer to the default logging handler for a given event type.
    fn get_logger() -> Box<dyn Fn(&Self) + Send>;
}

impl Logger for StartRoundEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |start_round_event: &StartRoundEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                START_ROUND,
                secs_since_unix_epoch(start_round_event.timestamp),
                start_round_event.height,
                start_round_event.round,
                first_seven_base64_chars(&start_round_event.proposer.to_bytes())
            )
        };
        Box::new(logger)
    }
}

impl Logger for CollectPolkaEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |collect_polka_event: &CollectPolkaEvent| {
            log::info!(
                "{}, {}, {}, {}, {:?}, {}",
                COLLECT_POLKA,
                secs_since_unix_epoch(collect_polka_event.timestamp),
                collect_polka_event.height,
                collect_polka_event.round,
                collect_polka_event.vote_type,
                value_or_nil(&collect_polka_event.value)
            )
        };
        Box::new(logger)
    }
}

impl Logger for UpdateLockedValueEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |update_locked_value_event: &UpdateLockedValueEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                UPDATE_LOCKED_VALUE,
                secs_since_unix_epoch(update_locked_value_event.timestamp),
                update_locked_value_event.height,
                update_locked_value_event.locked.round,
                first_seven_base64_chars(&update_locked_value_event.locked.value.hash.bytes())
            )
        };
        Box::new(logger)
    }
}

impl Logger for UpdateValidValueEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |update_valid_value_event: &UpdateValidValueEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                UPDATE_VALID_VALUE,
                secs_since_unix_epoch(update_valid_value_event.timestamp),
                update_valid_value_event.height,
                update_valid_value_event.valid.round,
                first_seven_base64_chars(&update_valid_value_event.valid.value.hash.bytes())
            )
        };
        Box::new(logger)
    }
}

impl Logger for TimeoutEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |timeout_event: &TimeoutEvent| {
            log::info!(
                "{}, {}, {}, {}, {:?}, {}",
                TIMEOUT,
                secs_since_unix_epoch(timeout_event.timestamp),
                timeout_event.height,
                timeout_event.round,
                timeout_event.step,
                timeout_event.timeout.as_millis()
            )
        };
        Box::new(logger)
    }
}

impl Logger for CommitValueEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |commit_value_event: &CommitValueEvent| {
            log::info!(
                "{}, {}, {}, {}, {}, {}",
                COMMIT_VALUE,
                secs_since_unix_epoch(commit_value_event.timestamp),
                commit_value_event.commits.height,
                commit_value_event.commits.round,
                first_seven_base64_chars(&commit_value_event.commits.value.hash.bytes()),
                commit_value_event.commits.signatures.len()
            )
        };
        Box::new(logger)
    }
}

impl Logger for ProposeEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |propose_event: &ProposeEvent| {
            log::info!(
                "{}, {}, {}, {}, {}, {}",
                PROPOSE,
                secs_since_unix_epoch(propose_event.timestamp),
                propose_event.proposal.height,
                propose_event.proposal.round,
                propose_event.proposal.pol_round,
                first_seven_base64_chars(&propose_event.proposal.value.hash.bytes())
            )
        };
        Box::new(logger)
    }
}

impl Logger for VoteEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |vote_event: &VoteEvent| {
            log::info!(
                "{}, {}, {:?}, {}, {}, {}",
                VOTE,
                secs_since_unix_epoch(vote_event.timestamp),
                vote_event.vote.vote_type,
                vote_event.vote.height,
                vote_event.vote.round,
                value_or_nil(&vote_event.vote.value)
            )
        };
        Box::new(logger)
    }
}

impl Logger for ReceiveProposalEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |receive_proposal_event: &ReceiveProposalEvent| {
            log::info!(
                "{}, {}, {}, {}, {}, {}, {}",
                RECEIVE_PROPOSAL,
                secs_since_unix_epoch(receive_proposal_event.timestamp),
                first_seven_base64_chars(&receive_proposal_event.origin.to_bytes()),
                receive_proposal_event.proposal.height,
                receive_proposal_event.proposal.round,
                receive_proposal_event.proposal.pol_round,
                first_seven_base64_chars(&receive_proposal_event.proposal.value.hash.bytes())
            )
        };
        Box::new(logger)
    }
}

impl Logger for ReceiveVoteEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |receive_vote_event: &ReceiveVoteEvent| {
            log::info!(
                "{}, {}, {}, {:?}, {}, {}, {}",
                RECEIVE_VOTE,
                secs_since_unix_epoch(receive_vote_event.timestamp),
                first_seven_base64_chars(&receive_vote_event.origin.to_bytes()),
                receive_vote_event.vote.vote_type,
                receive_vote_event.vote.height,
                receive_vote_event.vote.round,
                value_or_nil(&receive_vote_event.vote.value)
            )
        };
        Box::new(logger)
    }
}

impl Logger for EquivocationEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |equivocation_event: &EquivocationEvent| {
            log::warn!(
                "{}, {}, {}, {:?}, {}, {}, {}, {}",
                EQUIVOCATION,
                secs_since_unix_epoch(equivocation_event.timestamp),
                first_seven_base64_chars(&equivocation_event.voter.to_bytes()),
                equivocation_event.first.vote.vote_type,
                equivocation_event.first.vote.height,
                equivocation_event.first.vote.round,
                value_or_nil(&equivocation_event.first.vote.value),
                value_or_nil(&equivocation_event.second.vote.value)
            )
        };
        Box::new(logger)
    }
}

impl Logger for StartSyncEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |start_sync_event: &StartSyncEvent| {
            log::info!(
                "{}, {}, {}, {}",
                START_SYNC,
                secs_since_unix_epoch(start_sync_event.timestamp),
                first_seven_base64_chars(&start_sync_event.peer.to_bytes()),
                start_sync_event.height
            )
        };
        Box::new(logger)
    }
}

impl Logger for EndSyncEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |end_sync_event: &EndSyncEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                END_SYNC,
                secs_since_unix_epoch(end_sync_event.timestamp),
                first_seven_base64_chars(&end_sync_event.peer.to_bytes()),
                end_sync_event.height,
                end_sync_event.values_synced
            )
        };
        Box::new(logger)
    }
}

impl Logger for ReceiveSyncRequestEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |receive_sync_request_event: &ReceiveSyncRequestEvent| {
            log::info!(
                "{}, {}, {}, {}",
                RECEIVE_SYNC_REQUEST,
                secs_since_unix_epoch(receive_sync_request_event.timestamp),
                first_seven_base64_chars(&receive_sync_request_event.peer.to_bytes()),
                receive_sync_request_event.height
            )
        };
        Box::new(logger)
    }
}

impl Logger for SendSyncResponseEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |send_sync_response_event: &SendSyncResponseEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                SEND_SYNC_RESPONSE,
                secs_since_unix_epoch(send_sync_response_event.timestamp),
                first_seven_base64_chars(&send_sync_response_event.peer.to_bytes()),
                send_sync_response_event.commits.height,
                first_seven_base64_chars(&send_sync_response_event.commits.value.hash.bytes())
            )
        };
        Box::new(logger)
    }
}

impl Logger for RejectSyncResponseEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |reject_sync_response_event: &RejectSyncResponseEvent| {
            log::info!(
                "{}, {}, {}, {}, {:?}",
                REJECT_SYNC_RESPONSE,
                secs_since_unix_epoch(reject_sync_response_event.timestamp),
                first_seven_base64_chars(&reject_sync_response_event.peer.to_bytes()),
                reject_sync_response_event.height,
                reject_sync_response_event.reason
            )
        };
        Box::new(logger)
    }
}

fn first_seven_base64_chars(bytes: &[u8]) -> String {
    let encoded = STANDARD_NO_PAD.encode(bytes);
    if encoded.len() > 7 {
        encoded[0..7].to_string()
    } else {
        encoded
    }
}

fn value_or_nil(value: &Option<ShardHash>) -> String {
    match value {
        Some(value) => first_seven_base64_chars(&value.hash.bytes()),
        None => String::from("nil"),
    }
}

fn secs_since_unix_epoch(timestamp: SystemTime) -> u64 {
    timestamp
        .duration_since(SystemTime::UNIX_EPOCH)
        .expect("Event occured before the Unix Epoch.")
        .as_secs()
}
