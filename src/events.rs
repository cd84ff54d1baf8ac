/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions of the events a node emits, for event handling and logging.
//!
//! An event for a given action indicates that the action has been completed. Events are published by
//! the components running inside the driver thread and delivered to user-registered handlers (and,
//! optionally, the [default loggers](crate::logging)) on the [event bus](crate::event_bus) thread.

use std::sync::mpsc::Sender;
use std::time::SystemTime;

use crate::types::{
    data_types::{CommitteeAddress, L1Commitment, LogIndex, NodeID, OutputID, StateIndex, TransactionID},
    request::RequestRef,
};

pub enum Event {
    // Events emitted by the chain manager.
    NeedConsensus(NeedConsensusEvent),
    NeedPublishTX(NeedPublishTXEvent),
    PublishTXResult(PublishTXResultEvent),
    CommitteeRotation(CommitteeRotationEvent),
    // Events emitted by the state manager.
    CommitBlock(CommitBlockEvent),
    RequestBlock(RequestBlockEvent),
    ReceiveBlock(ReceiveBlockEvent),
    // Events emitted by the driver about consensus sessions.
    StartSession(StartSessionEvent),
    EndSession(EndSessionEvent),
    RestartSession(RestartSessionEvent),
    // Events emitted by the mempool distribution sync.
    ShareRequest(ShareRequestEvent),
    ReceiveRequest(ReceiveRequestEvent),
}

impl Event {
    pub(crate) fn publish(event_publisher: &Option<Sender<Event>>, event: Event) {
        if let Some(event_publisher) = event_publisher {
            // The event bus only disconnects while the node is shutting down.
            let _ = event_publisher.send(event);
        }
    }
}

/// The chain manager started asking for a consensus session.
pub struct NeedConsensusEvent {
    pub timestamp: SystemTime,
    pub committee: CommitteeAddress,
    pub log_index: LogIndex,
    pub base_output: OutputID,
}

/// The chain manager registered a signed transaction that needs publishing.
pub struct NeedPublishTXEvent {
    pub timestamp: SystemTime,
    pub committee: CommitteeAddress,
    pub log_index: LogIndex,
    pub transaction: TransactionID,
}

pub struct PublishTXResultEvent {
    pub timestamp: SystemTime,
    pub transaction: TransactionID,
    pub confirmed: bool,
}

/// A confirmed anchor output is controlled by a different committee than the previous one.
pub struct CommitteeRotationEvent {
    pub timestamp: SystemTime,
    pub from: Option<CommitteeAddress>,
    pub to: CommitteeAddress,
}

pub struct CommitBlockEvent {
    pub timestamp: SystemTime,
    pub l1_commitment: L1Commitment,
    pub state_index: StateIndex,
}

/// The state manager asked `peers` for a block it is missing.
pub struct RequestBlockEvent {
    pub timestamp: SystemTime,
    pub l1_commitment: L1Commitment,
    pub peers: Vec<NodeID>,
}

/// The state manager received a block it was waiting for.
pub struct ReceiveBlockEvent {
    pub timestamp: SystemTime,
    pub origin: NodeID,
    pub l1_commitment: L1Commitment,
}

pub struct StartSessionEvent {
    pub timestamp: SystemTime,
    pub committee: CommitteeAddress,
    pub log_index: LogIndex,
    pub base_output: OutputID,
}

pub struct EndSessionEvent {
    pub timestamp: SystemTime,
    pub committee: CommitteeAddress,
    pub log_index: LogIndex,
    pub outcome: SessionOutcome,
}

/// How a consensus session ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The session's transaction was handed over for publication.
    Completed,
    Skipped,
    Failed { reason: String },
    Cancelled,
}

/// A session made no progress within the recovery timeout and was restarted.
pub struct RestartSessionEvent {
    pub timestamp: SystemTime,
    pub committee: CommitteeAddress,
    pub log_index: LogIndex,
}

/// The distribution sync sent a request to `recipients` nodes.
pub struct ShareRequestEvent {
    pub timestamp: SystemTime,
    pub request: RequestRef,
    pub recipients: usize,
    pub ttl: u8,
}

pub struct ReceiveRequestEvent {
    pub timestamp: SystemTime,
    pub origin: NodeID,
    pub request: RequestRef,
}
