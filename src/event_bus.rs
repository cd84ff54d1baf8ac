/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Thread that delivers [events](crate::events) to the handlers registered for them.

use std::sync::mpsc::{Receiver, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::events::*;
use crate::logging::Logger;

pub(crate) type HandlerPtr<T> = Box<dyn Fn(&T) + Send>;

pub(crate) struct EventHandlers {
    pub(crate) need_consensus_handlers: Vec<HandlerPtr<NeedConsensusEvent>>,
    pub(crate) need_publish_tx_handlers: Vec<HandlerPtr<NeedPublishTXEvent>>,
    pub(crate) publish_tx_result_handlers: Vec<HandlerPtr<PublishTXResultEvent>>,
    pub(crate) committee_rotation_handlers: Vec<HandlerPtr<CommitteeRotationEvent>>,
    pub(crate) commit_block_handlers: Vec<HandlerPtr<CommitBlockEvent>>,
    pub(crate) request_block_handlers: Vec<HandlerPtr<RequestBlockEvent>>,
    pub(crate) receive_block_handlers: Vec<HandlerPtr<ReceiveBlockEvent>>,
    pub(crate) start_session_handlers: Vec<HandlerPtr<StartSessionEvent>>,
    pub(crate) end_session_handlers: Vec<HandlerPtr<EndSessionEvent>>,
    pub(crate) restart_session_handlers: Vec<HandlerPtr<RestartSessionEvent>>,
    pub(crate) share_request_handlers: Vec<HandlerPtr<ShareRequestEvent>>,
    pub(crate) receive_request_handlers: Vec<HandlerPtr<ReceiveRequestEvent>>,
}

impl EventHandlers {
    /// Collect the user-registered handlers, prepending the default loggers if `log_events` is set.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        log_events: bool,
        need_consensus_handler: Option<HandlerPtr<NeedConsensusEvent>>,
        need_publish_tx_handler: Option<HandlerPtr<NeedPublishTXEvent>>,
        publish_tx_result_handler: Option<HandlerPtr<PublishTXResultEvent>>,
        committee_rotation_handler: Option<HandlerPtr<CommitteeRotationEvent>>,
        commit_block_handler: Option<HandlerPtr<CommitBlockEvent>>,
        request_block_handler: Option<HandlerPtr<RequestBlockEvent>>,
        receive_block_handler: Option<HandlerPtr<ReceiveBlockEvent>>,
        start_session_handler: Option<HandlerPtr<StartSessionEvent>>,
        end_session_handler: Option<HandlerPtr<EndSessionEvent>>,
        restart_session_handler: Option<HandlerPtr<RestartSessionEvent>>,
        share_request_handler: Option<HandlerPtr<ShareRequestEvent>>,
        receive_request_handler: Option<HandlerPtr<ReceiveRequestEvent>>,
    ) -> EventHandlers {
        EventHandlers {
            need_consensus_handlers: handlers_for(log_events, need_consensus_handler),
            need_publish_tx_handlers: handlers_for(log_events, need_publish_tx_handler),
            publish_tx_result_handlers: handlers_for(log_events, publish_tx_result_handler),
            committee_rotation_handlers: handlers_for(log_events, committee_rotation_handler),
            commit_block_handlers: handlers_for(log_events, commit_block_handler),
            request_block_handlers: handlers_for(log_events, request_block_handler),
            receive_block_handlers: handlers_for(log_events, receive_block_handler),
            start_session_handlers: handlers_for(log_events, start_session_handler),
            end_session_handlers: handlers_for(log_events, end_session_handler),
            restart_session_handlers: handlers_for(log_events, restart_session_handler),
            share_request_handlers: handlers_for(log_events, share_request_handler),
            receive_request_handlers: handlers_for(log_events, receive_request_handler),
        }
    }

    /// Whether no handler at all is registered, in which case no event bus is started.
    pub(crate) fn is_empty(&self) -> bool {
        self.need_consensus_handlers.is_empty()
            && self.need_publish_tx_handlers.is_empty()
            && self.publish_tx_result_handlers.is_empty()
            && self.committee_rotation_handlers.is_empty()
            && self.commit_block_handlers.is_empty()
            && self.request_block_handlers.is_empty()
            && self.receive_block_handlers.is_empty()
            && self.start_session_handlers.is_empty()
            && self.end_session_handlers.is_empty()
            && self.restart_session_handlers.is_empty()
            && self.share_request_handlers.is_empty()
            && self.receive_request_handlers.is_empty()
    }

    pub(crate) fn fire_handlers(&self, event: Event) {
        match event {
            Event::NeedConsensus(need_consensus_event) => self
                .need_consensus_handlers
                .iter()
                .for_each(|handler| handler(&need_consensus_event)),

            Event::NeedPublishTX(need_publish_tx_event) => self
                .need_publish_tx_handlers
                .iter()
                .for_each(|handler| handler(&need_publish_tx_event)),

            Event::PublishTXResult(publish_tx_result_event) => self
                .publish_tx_result_handlers
                .iter()
                .for_each(|handler| handler(&publish_tx_result_event)),

            Event::CommitteeRotation(committee_rotation_event) => self
                .committee_rotation_handlers
                .iter()
                .for_each(|handler| handler(&committee_rotation_event)),

            Event::CommitBlock(commit_block_event) => self
                .commit_block_handlers
                .iter()
                .for_each(|handler| handler(&commit_block_event)),

            Event::RequestBlock(request_block_event) => self
                .request_block_handlers
                .iter()
                .for_each(|handler| handler(&request_block_event)),

            Event::ReceiveBlock(receive_block_event) => self
                .receive_block_handlers
                .iter()
                .for_each(|handler| handler(&receive_block_event)),

            Event::StartSession(start_session_event) => self
                .start_session_handlers
                .iter()
                .for_each(|handler| handler(&start_session_event)),

            Event::EndSession(end_session_event) => self
                .end_session_handlers
                .iter()
                .for_each(|handler| handler(&end_session_event)),

            Event::RestartSession(restart_session_event) => self
                .restart_session_handlers
                .iter()
                .for_each(|handler| handler(&restart_session_event)),

            Event::ShareRequest(share_request_event) => self
                .share_request_handlers
                .iter()
                .for_each(|handler| handler(&share_request_event)),

            Event::ReceiveRequest(receive_request_event) => self
                .receive_request_handlers
                .iter()
                .for_each(|handler| handler(&receive_request_event)),
        }
    }
}

fn handlers_for<T: Logger>(log_events: bool, handler: Option<HandlerPtr<T>>) -> Vec<HandlerPtr<T>> {
    let mut handlers = Vec::new();
    if log_events {
        handlers.push(T::get_logger());
    }
    handlers.extend(handler);
    handlers
}

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

        if let Ok(event) = event_subscriber.recv_timeout(Duration::from_millis(10)) {
            event_handlers.fire_handlers(event)
        }
    })
}
