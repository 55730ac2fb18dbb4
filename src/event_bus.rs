/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The event bus thread, which receives [events](crate::events) published by the other threads of a
//! replica and runs the handlers registered for them.

use std::{
    sync::mpsc::{Receiver, TryRecvError},
    thread::{self, JoinHandle},
};

use crate::{events::*, logging::Logger};

pub type HandlerPtr<T> = Box<dyn Fn(&T) + Send>;

/// The handlers registered for each event type, including the default logging handlers if enabled.
pub(crate) struct EventHandlers {
    pub(crate) start_round_handlers: Vec<HandlerPtr<StartRoundEvent>>,
    pub(crate) collect_polka_handlers: Vec<HandlerPtr<CollectPolkaEvent>>,
    pub(crate) update_locked_value_handlers: Vec<HandlerPtr<UpdateLockedValueEvent>>,
    pub(crate) update_valid_value_handlers: Vec<HandlerPtr<UpdateValidValueEvent>>,
    pub(crate) timeout_handlers: Vec<HandlerPtr<TimeoutEvent>>,
    pub(crate) commit_value_handlers: Vec<HandlerPtr<CommitValueEvent>>,
    pub(crate) propose_handlers: Vec<HandlerPtr<ProposeEvent>>,
    pub(crate) vote_handlers: Vec<HandlerPtr<VoteEvent>>,
    pub(crate) receive_proposal_handlers: Vec<HandlerPtr<ReceiveProposalEvent>>,
    pub(crate) receive_vote_handlers: Vec<HandlerPtr<ReceiveVoteEvent>>,
    pub(crate) equivocation_handlers: Vec<HandlerPtr<EquivocationEvent>>,
    pub(crate) start_sync_handlers: Vec<HandlerPtr<StartSyncEvent>>,
    pub(crate) end_sync_handlers: Vec<HandlerPtr<EndSyncEvent>>,
    pub(crate) receive_sync_request_handlers: Vec<HandlerPtr<ReceiveSyncRequestEvent>>,
    pub(crate) send_sync_response_handlers: Vec<HandlerPtr<SendSyncResponseEvent>>,
    pub(crate) reject_sync_response_handlers: Vec<HandlerPtr<RejectSyncResponseEvent>>,
}

/// Collect the default logger (if `log_events`) and the user-defined handler (if any) of one event type.
fn handlers_of<T: Logger>(log_events: bool, user_handler: Option<HandlerPtr<T>>) -> Vec<HandlerPtr<T>> {
    let mut handlers = Vec::new();
    if log_events {
        handlers.push(T::get_logger());
    }
    handlers.extend(user_handler);
    handlers
}

impl EventHandlers {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        log_events: bool,
        start_round_handler: Option<HandlerPtr<StartRoundEvent>>,
        collect_polka_handler: Option<HandlerPtr<CollectPolkaEvent>>,
        update_locked_value_handler: Option<HandlerPtr<UpdateLockedValueEvent>>,
        update_valid_value_handler: Option<HandlerPtr<UpdateValidValueEvent>>,
        timeout_handler: Option<HandlerPtr<TimeoutEvent>>,
        commit_value_handler: Option<HandlerPtr<CommitValueEvent>>,
        propose_handler: Option<HandlerPtr<ProposeEvent>>,
        vote_handler: Option<HandlerPtr<VoteEvent>>,
        receive_proposal_handler: Option<HandlerPtr<ReceiveProposalEvent>>,
        receive_vote_handler: Option<HandlerPtr<ReceiveVoteEvent>>,
        equivocation_handler: Option<HandlerPtr<EquivocationEvent>>,
        start_sync_handler: Option<HandlerPtr<StartSyncEvent>>,
        end_sync_handler: Option<HandlerPtr<EndSyncEvent>>,
        receive_sync_request_handler: Option<HandlerPtr<ReceiveSyncRequestEvent>>,
        send_sync_response_handler: Option<HandlerPtr<SendSyncResponseEvent>>,
        reject_sync_response_handler: Option<HandlerPtr<RejectSyncResponseEvent>>,
    ) -> EventHandlers {
        EventHandlers {
            start_round_handlers: handlers_of(log_events, start_round_handler),
            collect_polka_handlers: handlers_of(log_events, collect_polka_handler),
            update_locked_value_handlers: handlers_of(log_events, update_locked_value_handler),
            update_valid_value_handlers: handlers_of(log_events, update_valid_value_handler),
            timeout_handlers: handlers_of(log_events, timeout_handler),
            commit_value_handlers: handlers_of(log_events, commit_value_handler),
            propose_handlers: handlers_of(log_events, propose_handler),
            vote_handlers: handlers_of(log_events, vote_handler),
            receive_proposal_handlers: handlers_of(log_events, receive_proposal_handler),
            receive_vote_handlers: handlers_of(log_events, receive_vote_handler),
            equivocation_handlers: handlers_of(log_events, equivocation_handler),
            start_sync_handlers: handlers_of(log_events, start_sync_handler),
            end_sync_handlers: handlers_of(log_events, end_sync_handler),
            receive_sync_request_handlers: handlers_of(log_events, receive_sync_request_handler),
            send_sync_response_handlers: handlers_of(log_events, send_sync_response_handler),
            reject_sync_response_handlers: handlers_of(log_events, reject_sync_response_handler),
        }
    }

    /// Check whether no handler at all is registered, in which case no event bus needs to be started.
    pub(crate) fn is_empty(&self) -> bool {
        self.start_round_handlers.is_empty()
            && self.collect_polka_handlers.is_empty()
            && self.update_locked_value_handlers.is_empty()
            && self.update_valid_value_handlers.is_empty()
            && self.timeout_handlers.is_empty()
            && self.commit_value_handlers.is_empty()
            && self.propose_handlers.is_empty()
            && self.vote_handlers.is_empty()
            && self.receive_proposal_handlers.is_empty()
            && self.receive_vote_handlers.is_empty()
            && self.equivocation_handlers.is_empty()
            && self.start_sync_handlers.is_empty()
            && self.end_sync_handlers.is_empty()
            && self.receive_sync_request_handlers.is_empty()
            && self.send_sync_response_handlers.is_empty()
            && self.reject_sync_response_handlers.is_empty()
    }

    pub(crate) fn fire_handlers(&self, event: Event) {
        match event {
            Event::StartRound(start_round_event) => self
                .start_round_handlers
                .iter()
                .for_each(|handler| handler(&start_round_event)),
            Event::CollectPolka(collect_polka_event) => self
                .collect_polka_handlers
                .iter()
                .for_each(|handler| handler(&collect_polka_event)),
            Event::UpdateLockedValue(update_locked_value_event) => self
                .update_locked_value_handlers
                .iter()
                .for_each(|handler| handler(&update_locked_value_event)),
            Event::UpdateValidValue(update_valid_value_event) => self
                .update_valid_value_handlers
                .iter()
                .for_each(|handler| handler(&update_valid_value_event)),
            Event::Timeout(timeout_event) => self
                .timeout_handlers
                .iter()
                .for_each(|handler| handler(&timeout_event)),
            Event::CommitValue(commit_value_event) => self
                .commit_value_handlers
                .iter()
                .for_each(|handler| handler(&commit_value_event)),
            Event::Propose(propose_event) => self
                .propose_handlers
                .iter()
                .for_each(|handler| handler(&propose_event)),
            Event::Vote(vote_event) => self
                .vote_handlers
                .iter()
                .for_each(|handler| handler(&vote_event)),
            Event::ReceiveProposal(receive_proposal_event) => self
                .receive_proposal_handlers
                .iter()
                .for_each(|handler| handler(&receive_proposal_event)),
            Event::ReceiveVote(receive_vote_event) => self
                .receive_vote_handlers
                .iter()
                .for_each(|handler| handler(&receive_vote_event)),
            Event::Equivocation(equivocation_event) => self
                .equivocation_handlers
                .iter()
                .for_each(|handler| handler(&equivocation_event)),
            Event::StartSync(start_sync_event) => self
                .start_sync_handlers
                .iter()
                .for_each(|handler| handler(&start_sync_event)),
            Event::EndSync(end_sync_event) => self
                .end_sync_handlers
                .iter()
                .for_each(|handler| handler(&end_sync_event)),
            Event::ReceiveSyncRequest(receive_sync_request_event) => self
                .receive_sync_request_handlers
                .iter()
                .for_each(|handler| handler(&receive_sync_request_event)),
            Event::SendSyncResponse(send_sync_response_event) => self
                .send_sync_response_handlers
                .iter()
                .for_each(|handler| handler(&send_sync_response_event)),
            Event::RejectSyncResponse(reject_sync_response_event) => self
                .reject_sync_response_handlers
                .iter()
                .for_each(|handler| handler(&reject_sync_response_event)),
        }
    }
}

/// Spawn the event bus thread, which runs the handlers of every event received from `event_subscriber`
/// until a shutdown signal is received.
pub(crate) fn start_event_bus(
    event_handlers: EventHandlers,
    event_subscriber: Receiver<Event>,
    shutdown_signal: Receiver<()>,
) -> JoinHandle<()> {
    thread::spawn(move || loop {
        match shutdown_signal.try_recv() {
            Ok(()) => return,
            Err(TryRecvError::Empty) => (),
            Err(TryRecvError::Disconnected) => {
                panic!("Event bus thread disconnected from main thread")
            }
        }

        match event_subscriber.try_recv() {
            Ok(event) => event_handlers.fire_handlers(event),
            Err(TryRecvError::Empty) => thread::yield_now(),
            // Every publisher has shut down. Wait for our own shutdown signal.
            Err(TryRecvError::Disconnected) => thread::yield_now(),
        }
    })
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{mpsc, Arc, Mutex},
        time::SystemTime,
    };

    use super::*;
    use crate::types::data_types::{Height, Round};

    #[test]
    fn handlers_receive_published_events_test() {
        let starts = Arc::new(Mutex::new(Vec::new()));
        let starts_clone = starts.clone();
        let handler: HandlerPtr<StartRoundEvent> = Box::new(move |event: &StartRoundEvent| {
            starts_clone.lock().unwrap().push((event.height, event.round))
        });

        let event_handlers = EventHandlers::new(
            false,
            Some(handler),
            None,
            None,
            None,
            None,
            None,
            None,
            None,
            None,
            None,
            None,
            None,
            None,
            None,
            None,
            None,
        );
        assert!(!event_handlers.is_empty());
        assert!(event_handlers.commit_value_handlers.is_empty());

        let proposer = ed25519_dalek::SigningKey::generate(&mut rand_core::OsRng).verifying_key();
        event_handlers.fire_handlers(Event::StartRound(StartRoundEvent {
            timestamp: SystemTime::now(),
            height: Height::new(1, 100),
            round: Round::new(2),
            proposer,
        }));

        let (publisher, _subscriber) = mpsc::channel();
        Event::StartRound(StartRoundEvent {
            timestamp: SystemTime::now(),
            height: Height::new(1, 101),
            round: Round::init(),
            proposer,
        })
        .publish(&Some(publisher));

        assert_eq!(*starts.lock().unwrap(), vec![(Height::new(1, 100), Round::new(2))]);
    }

    #[test]
    fn log_events_registers_a_logger_for_every_event_test() {
        let event_handlers = EventHandlers::new(
            true, None, None, None, None, None, None, None, None, None, None, None, None, None, None,
            None, None,
        );
        assert_eq!(event_handlers.timeout_handlers.len(), 1);
        assert_eq!(event_handlers.reject_sync_response_handlers.len(), 1);
    }
}
