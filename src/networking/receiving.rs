/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Functions and types for receiving messages from the P2P network.

use std::{
    collections::{BTreeMap, VecDeque},
    mem,
    sync::mpsc::{self, Receiver, RecvTimeoutError, TryRecvError},
    thread::{self, JoinHandle},
    time::Instant,
};

use crate::{
    sync::messages::{
        SyncRequest, SyncResponse, SyncValueRequest, SyncValueResponse, SyncVoteSetRequest,
        SyncVoteSetResponse,
    },
    types::{
        crypto_primitives::VerifyingKey,
        data_types::{BufferSize, Height},
    },
};

use super::{
    messages::{Message, ProgressMessage, SyncMessage},
    network::Network,
};

/// Spawn the poller thread, which polls the [`Network`] for messages and distributes them into receiver
/// handles.
///
/// The kinds of messages that the poller distributes are:
/// 1. Progress messages, processed by the [`Algorithm`](crate::algorithm::Algorithm)'s execute loop.
/// 2. Sync value requests, processed by the [`SyncServer`](crate::sync::server::SyncServer).
/// 3. Sync value responses, processed by the [`SyncClient`](crate::sync::client::SyncClient).
/// 4. Vote set requests and responses, processed by the algorithm thread in between progress messages.
pub(crate) fn start_polling<N: Network + 'static>(
    mut network: N,
    shutdown_signal: Receiver<()>,
) -> (
    JoinHandle<()>,
    Receiver<(VerifyingKey, ProgressMessage)>,
    Receiver<(VerifyingKey, SyncValueRequest)>,
    Receiver<(VerifyingKey, SyncValueResponse)>,
    Receiver<(VerifyingKey, VoteSetMessage)>,
) {
    let (to_progress_msg_receiver, progress_msg_receiver) = mpsc::channel();
    let (to_sync_request_receiver, sync_request_receiver) = mpsc::channel();
    let (to_sync_response_receiver, sync_response_receiver) = mpsc::channel();
    let (to_vote_set_receiver, vote_set_receiver) = mpsc::channel();

    let poller_thread = thread::spawn(move || loop {
        match shutdown_signal.try_recv() {
            Ok(()) => return,
            Err(TryRecvError::Empty) => (),
            Err(TryRecvError::Disconnected) => {
                panic!("Poller thread disconnected from main thread")
            }
        }

        if let Some((origin, msg)) = network.recv() {
            match msg {
                Message::ProgressMessage(p_msg) => {
                    let _ = to_progress_msg_receiver.send((origin, p_msg));
                }
                Message::SyncMessage(SyncMessage::SyncRequest(SyncRequest::Value(s_req))) => {
                    let _ = to_sync_request_receiver.send((origin, s_req));
                }
                Message::SyncMessage(SyncMessage::SyncResponse(SyncResponse::Value(s_res))) => {
                    let _ = to_sync_response_receiver.send((origin, s_res));
                }
                Message::SyncMessage(SyncMessage::SyncRequest(SyncRequest::VoteSet(v_req))) => {
                    let _ = to_vote_set_receiver.send((origin, VoteSetMessage::Request(v_req)));
                }
                Message::SyncMessage(SyncMessage::SyncResponse(SyncResponse::VoteSet(v_res))) => {
                    let _ = to_vote_set_receiver.send((origin, VoteSetMessage::Response(v_res)));
                }
            }
        } else {
            thread::yield_now()
        }
    });
    (
        poller_thread,
        progress_msg_receiver,
        sync_request_receiver,
        sync_response_receiver,
        vote_set_receiver,
    )
}

/// A receiving end for [`ProgressMessage`]s.
///
/// ## Height-aware buffering
///
/// `ProgressMessageStub` inspects the shard and height of every incoming message to decide whether to:
/// 1. Return it from `recv` for immediate processing, if it is for the current height or is a status
///    message.
/// 2. Place it in its buffer, if it is for one of the next `max_future_heights` heights. Validators
///    rarely enter a height at exactly the same time, so the first votes of a height often arrive at
///    replicas that are still finishing the previous one.
/// 3. Discard it, if it is for another shard, a past height, or a height too far in the future.
///
/// Consensus messages are not checked for correct signatures here. That is left to the aggregator.
///
/// ## Buffer management
///
/// If the message buffer grows beyond the capacity specified in [`new`](Self::new), messages for the
/// highest heights are removed first to make space for messages of lower heights.
pub(crate) struct ProgressMessageStub {
    receiver: Receiver<(VerifyingKey, ProgressMessage)>,
    msg_buffer: ProgressMessageBuffer,
}

impl ProgressMessageStub {
    /// Create a fresh [`ProgressMessageStub`] with a given receiver end and buffer capacity.
    pub(crate) fn new(
        receiver: Receiver<(VerifyingKey, ProgressMessage)>,
        msg_buffer_capacity: BufferSize,
    ) -> ProgressMessageStub {
        Self {
            receiver,
            msg_buffer: ProgressMessageBuffer::new(msg_buffer_capacity),
        }
    }

    /// Receive a message for `cur_height` of the shard with `shard_index`, or a status message of that
    /// shard, waiting until `deadline` at the latest.
    pub(crate) fn recv(
        &mut self,
        shard_index: u32,
        cur_height: Height,
        max_future_heights: u64,
        deadline: Instant,
    ) -> Result<(VerifyingKey, ProgressMessage), ProgressMessageReceiveError> {
        self.msg_buffer.remove_expired_msgs(cur_height);

        if let Some((sender, msg)) = self.msg_buffer.get_msg(&cur_height) {
            return Ok((sender, msg));
        }

        while Instant::now() < deadline {
            match self.receiver.recv_timeout(deadline - Instant::now()) {
                Ok((sender, msg)) => {
                    if msg.shard_index() != shard_index {
                        log::debug!(
                            "Dropping progress message from another shard: {}",
                            msg.shard_index()
                        );
                        continue;
                    }

                    let height = match msg.height() {
                        None => return Ok((sender, msg)),
                        Some(height) => height,
                    };

                    if height == cur_height {
                        return Ok((sender, msg));
                    } else if height < cur_height {
                        log::debug!("Dropping progress message for past height: {}", height);
                    } else if height > cur_height + max_future_heights {
                        log::debug!("Dropping progress message for far-future height: {}", height);
                    } else {
                        self.msg_buffer.insert(sender, height, msg);
                    }
                }
                Err(RecvTimeoutError::Timeout) => thread::yield_now(),
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(ProgressMessageReceiveError::Disconnected)
                }
            }
        }

        Err(ProgressMessageReceiveError::Timeout)
    }
}

#[derive(Debug)]
pub(crate) enum ProgressMessageReceiveError {
    Timeout,
    Disconnected,
}

/// Message buffer for [`ProgressMessage`]s of future heights.
///
/// Its size is bounded by its capacity, and when the capacity is reached messages for the highest
/// heights may be removed.
struct ProgressMessageBuffer {
    buffer_capacity: BufferSize,
    buffer: BTreeMap<Height, VecDeque<(VerifyingKey, ProgressMessage)>>,
    buffer_size: BufferSize,
}

impl ProgressMessageBuffer {
    fn new(buffer_capacity: BufferSize) -> Self {
        Self {
            buffer_capacity,
            buffer: BTreeMap::new(),
            buffer_size: BufferSize::new(0),
        }
    }

    fn entry_size(msg: &ProgressMessage) -> u64 {
        mem::size_of::<VerifyingKey>() as u64 + msg.size()
    }

    /// Try inserting a message for `height` into the buffer.
    ///
    /// If storing the message would grow the buffer beyond its capacity, then:
    /// 1. If `height` is not lower than every height currently in the buffer, the message is dropped.
    /// 2. Otherwise, just enough messages of the highest heights are removed to make space for it.
    ///
    /// Returns whether the message was inserted.
    fn insert(&mut self, sender: VerifyingKey, height: Height, msg: ProgressMessage) -> bool {
        let bytes_requested = Self::entry_size(&msg);
        let buffer_will_be_overloaded = self
            .buffer_size
            .int()
            .checked_add(bytes_requested)
            .map_or(true, |new_size| new_size > self.buffer_capacity.int());

        if buffer_will_be_overloaded {
            let lower_than_max = self
                .buffer
                .keys()
                .next_back()
                .map_or(false, |max_height| height < *max_height);
            if !lower_than_max || bytes_requested > self.buffer_capacity.int() {
                return false;
            }
            self.remove_highest_msgs(bytes_requested);
        }

        self.buffer_size += bytes_requested;
        self.buffer
            .entry(height)
            .or_insert_with(VecDeque::new)
            .push_back((sender, msg));
        true
    }

    /// If there are messages for `height` in the buffer, remove and return the message at the front of
    /// its queue.
    fn get_msg(&mut self, height: &Height) -> Option<(VerifyingKey, ProgressMessage)> {
        let msg_queue = self.buffer.get_mut(height)?;
        let (sender, msg) = msg_queue.pop_front()?;
        if msg_queue.is_empty() {
            self.buffer.remove(height);
        }
        self.buffer_size -= Self::entry_size(&msg);
        Some((sender, msg))
    }

    /// Remove just enough messages of the highest heights to free at least `bytes_to_remove` bytes, newest
    /// messages first.
    fn remove_highest_msgs(&mut self, bytes_to_remove: u64) {
        let mut bytes_removed = 0;
        while bytes_removed < bytes_to_remove {
            let mut highest = match self.buffer.last_entry() {
                Some(entry) => entry,
                None => break,
            };
            if let Some((_, msg)) = highest.get_mut().pop_back() {
                bytes_removed += Self::entry_size(&msg);
            }
            if highest.get().is_empty() {
                highest.remove();
            }
        }
        self.buffer_size -= bytes_removed;
    }

    /// Remove all messages for heights lower than `cur_height`.
    fn remove_expired_msgs(&mut self, cur_height: Height) {
        let kept = self.buffer.split_off(&cur_height);
        let expired_bytes: u64 = self
            .buffer
            .values()
            .flatten()
            .map(|(_, msg)| Self::entry_size(msg))
            .sum();
        self.buffer_size -= expired_bytes;
        self.buffer = kept;
    }

    #[cfg(test)]
    fn heights(&self) -> Vec<Height> {
        self.buffer.keys().copied().collect()
    }
}

/// A receiving end for [`SyncValueResponse`]s.
pub(crate) struct SyncClientStub {
    responses: Receiver<(VerifyingKey, SyncValueResponse)>,
}

impl SyncClientStub {
    pub(crate) fn new(responses: Receiver<(VerifyingKey, SyncValueResponse)>) -> SyncClientStub {
        SyncClientStub { responses }
    }

    /// Receive a [`SyncValueResponse`] from `peer` to a request for `height`. Waits for the response until
    /// `deadline`, and returns [`SyncResponseReceiveError::Timeout`] if none is received.
    ///
    /// Responses from other peers, and late responses to earlier requests for lower heights, are discarded.
    pub(crate) fn recv_response(
        &self,
        peer: VerifyingKey,
        height: Height,
        deadline: Instant,
    ) -> Result<SyncValueResponse, SyncResponseReceiveError> {
        while Instant::now() < deadline {
            match self.responses.recv_timeout(deadline - Instant::now()) {
                Ok((sender, sync_response)) => {
                    if sender != peer {
                        continue;
                    }
                    if sync_response.height < height {
                        log::debug!(
                            "Discarding late sync response for height {}",
                            sync_response.height
                        );
                        continue;
                    }
                    return Ok(sync_response);
                }
                Err(RecvTimeoutError::Timeout) => thread::yield_now(),
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(SyncResponseReceiveError::Disconnected)
                }
            }
        }

        Err(SyncResponseReceiveError::Timeout)
    }
}

#[derive(Debug)]
pub enum SyncResponseReceiveError {
    Disconnected,
    Timeout,
}

/// A receiving end for [`SyncValueRequest`]s.
pub(crate) struct SyncServerStub {
    requests: Receiver<(VerifyingKey, SyncValueRequest)>,
}

impl SyncServerStub {
    pub(crate) fn new(requests: Receiver<(VerifyingKey, SyncValueRequest)>) -> SyncServerStub {
        SyncServerStub { requests }
    }

    /// Receive a [`SyncValueRequest`] if one is available, else return
    /// [`SyncRequestReceiveError::NotAvailable`].
    pub(crate) fn recv_request(
        &self,
    ) -> Result<(VerifyingKey, SyncValueRequest), SyncRequestReceiveError> {
        match self.requests.try_recv() {
            Ok((origin, request)) => Ok((origin, request)),
            Err(TryRecvError::Disconnected) => Err(SyncRequestReceiveError::Disconnected),
            Err(TryRecvError::Empty) => Err(SyncRequestReceiveError::NotAvailable),
        }
    }
}

#[derive(Debug)]
pub enum SyncRequestReceiveError {
    Disconnected,
    NotAvailable,
}

/// Vote set backfill messages, which are handled by the algorithm thread because answering and applying
/// them reads and writes the aggregator.
#[derive(Clone, Debug)]
pub(crate) enum VoteSetMessage {
    Request(SyncVoteSetRequest),
    Response(SyncVoteSetResponse),
}

/// A non-blocking receiving end for [`VoteSetMessage`]s.
pub(crate) struct VoteSetStub {
    receiver: Receiver<(VerifyingKey, VoteSetMessage)>,
}

impl VoteSetStub {
    pub(crate) fn new(receiver: Receiver<(VerifyingKey, VoteSetMessage)>) -> VoteSetStub {
        VoteSetStub { receiver }
    }

    /// Receive a vote set message if one is available.
    pub(crate) fn try_recv(&self) -> Result<(VerifyingKey, VoteSetMessage), SyncRequestReceiveError> {
        match self.receiver.try_recv() {
            Ok(msg) => Ok(msg),
            Err(TryRecvError::Disconnected) => Err(SyncRequestReceiveError::Disconnected),
            Err(TryRecvError::Empty) => Err(SyncRequestReceiveError::NotAvailable),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use ed25519_dalek::SigningKey;
    use rand_core::OsRng;

    use super::*;
    use crate::{
        sync::messages::StatusMessage,
        tendermint::messages::FullProposal,
        types::{
            crypto_primitives::hash,
            data_types::{Round, ShardHash},
        },
    };

    fn full_proposal(height: Height, full_value: Vec<u8>) -> ProgressMessage {
        ProgressMessage::FullProposal(FullProposal {
            height,
            round: Round::init(),
            proposer: [0; 32],
            value: ShardHash::new(height.shard_index(), hash(&full_value)),
            full_value,
        })
    }

    #[test]
    fn buffer_evicts_highest_heights_first_test() {
        let sender = SigningKey::generate(&mut OsRng).verifying_key();
        let msg_size = ProgressMessageBuffer::entry_size(&full_proposal(Height::new(0, 0), vec![0]));
        let mut buffer = ProgressMessageBuffer::new(BufferSize::new(msg_size * 2));

        assert!(buffer.insert(sender, Height::new(0, 12), full_proposal(Height::new(0, 12), vec![0])));
        assert!(buffer.insert(sender, Height::new(0, 13), full_proposal(Height::new(0, 13), vec![0])));

        // Full, and not lower than the highest buffered height.
        assert!(!buffer.insert(sender, Height::new(0, 14), full_proposal(Height::new(0, 14), vec![0])));
        assert_eq!(buffer.heights(), vec![Height::new(0, 12), Height::new(0, 13)]);

        // Full, but lower than the highest buffered height, so the highest is evicted.
        assert!(buffer.insert(sender, Height::new(0, 11), full_proposal(Height::new(0, 11), vec![0])));
        assert_eq!(buffer.heights(), vec![Height::new(0, 11), Height::new(0, 12)]);

        buffer.remove_expired_msgs(Height::new(0, 12));
        assert_eq!(buffer.heights(), vec![Height::new(0, 12)]);
        assert_eq!(buffer.buffer_size.int(), msg_size);

        assert!(buffer.get_msg(&Height::new(0, 12)).is_some());
        assert!(buffer.get_msg(&Height::new(0, 12)).is_none());
        assert_eq!(buffer.buffer_size.int(), 0);
    }

    #[test]
    fn stub_filters_by_shard_and_height_test() {
        let sender = SigningKey::generate(&mut OsRng).verifying_key();
        let (to_stub, receiver) = mpsc::channel();
        let mut stub = ProgressMessageStub::new(receiver, BufferSize::new(1 << 20));
        let cur = Height::new(1, 100);

        to_stub.send((sender, full_proposal(Height::new(2, 100), vec![1]))).unwrap();
        to_stub.send((sender, full_proposal(Height::new(1, 99), vec![2]))).unwrap();
        to_stub.send((sender, full_proposal(Height::new(1, 150), vec![3]))).unwrap();
        to_stub.send((sender, full_proposal(Height::new(1, 101), vec![4]))).unwrap();
        to_stub.send((sender, full_proposal(Height::new(1, 100), vec![5]))).unwrap();
        to_stub
            .send((
                sender,
                ProgressMessage::StatusMessage(StatusMessage {
                    peer_id: sender.to_bytes(),
                    height: Height::new(1, 120),
                    min_height: Height::new(1, 0),
                }),
            ))
            .unwrap();

        let deadline = || Instant::now() + Duration::from_millis(50);

        let (_, msg) = stub.recv(1, cur, 10, deadline()).unwrap();
        assert!(matches!(msg, ProgressMessage::FullProposal(p) if p.full_value == vec![5]));

        let (_, msg) = stub.recv(1, cur, 10, deadline()).unwrap();
        assert!(matches!(msg, ProgressMessage::StatusMessage(_)));

        assert!(matches!(
            stub.recv(1, cur, 10, deadline()),
            Err(ProgressMessageReceiveError::Timeout)
        ));

        // The buffered message for the next height is delivered once that height is entered.
        let (_, msg) = stub.recv(1, cur.next(), 10, deadline()).unwrap();
        assert!(matches!(msg, ProgressMessage::FullProposal(p) if p.full_value == vec![4]));
    }
}
