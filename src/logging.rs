/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Functions that log out events.
//!
//! The logs defined in this module are printed if the user enabled them via the node's
//! [config](crate::config::Configuration).
//!
//! The node logs using the [log](https://docs.rs/log/latest/log/) crate. To get these messages
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
//! is how a [NeedConsensus](crate::events::NeedConsensusEvent) is printed:
//!
//! ```text
//! NeedConsensus, 1701329264, Id5u7f6, 12, fNGCJyk, 0
//! ```
//!
//! In the snippet:
//! - The third value is the first seven characters of the Base64 encoding of the committee address.
//! - The fourth value is the log index the consensus is needed for.
//! - The fifth and sixth values identify the base anchor output: the first seven characters of the
//!   Base64 encoding of the transaction that created it, and its index in that transaction.

use std::time::SystemTime;

use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};

use crate::events::*;

// Names of each event in PascalCase for printing:
pub const NEED_CONSENSUS: &str = "NeedConsensus";
pub const NEED_PUBLISH_TX: &str = "NeedPublishTX";
pub const PUBLISH_TX_RESULT: &str = "PublishTXResult";
pub const COMMITTEE_ROTATION: &str = "CommitteeRotation";

pub const COMMIT_BLOCK: &str = "CommitBlock";
pub const REQUEST_BLOCK: &str = "RequestBlock";
pub const RECEIVE_BLOCK: &str = "ReceiveBlock";

pub const START_SESSION: &str = "StartSession";
pub const END_SESSION: &str = "EndSession";
pub const RESTART_SESSION: &str = "RestartSession";

pub const SHARE_REQUEST: &str = "ShareRequest";
pub const RECEIVE_REQUEST: &str = "ReceiveRequest";

/// Implemented by event types. Used to get a closure that logs the event.
pub(crate) trait Logger {
    /// Returns a pointer to the default logging handler for a given event type.
    fn get_logger() -> Box<dyn Fn(&Self) + Send>;
}

impl Logger for NeedConsensusEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |need_consensus_event: &NeedConsensusEvent| {
            log::info!(
                "{}, {}, {}, {}, {}, {}",
                NEED_CONSENSUS,
                secs_since_unix_epoch(need_consensus_event.timestamp),
                first_seven_base64_chars(&need_consensus_event.committee.bytes()),
                need_consensus_event.log_index,
                first_seven_base64_chars(&need_consensus_event.base_output.transaction.bytes()),
                need_consensus_event.base_output.index
            )
        };
        Box::new(logger)
    }
}

impl Logger for NeedPublishTXEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |need_publish_tx_event: &NeedPublishTXEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                NEED_PUBLISH_TX,
                secs_since_unix_epoch(need_publish_tx_event.timestamp),
                first_seven_base64_chars(&need_publish_tx_event.committee.bytes()),
                need_publish_tx_event.log_index,
                first_seven_base64_chars(&need_publish_tx_event.transaction.bytes())
            )
        };
        Box::new(logger)
    }
}

impl Logger for PublishTXResultEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |publish_tx_result_event: &PublishTXResultEvent| {
            log::info!(
                "{}, {}, {}, {}",
                PUBLISH_TX_RESULT,
                secs_since_unix_epoch(publish_tx_result_event.timestamp),
                first_seven_base64_chars(&publish_tx_result_event.transaction.bytes()),
                publish_tx_result_event.confirmed
            )
        };
        Box::new(logger)
    }
}

impl Logger for CommitteeRotationEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |committee_rotation_event: &CommitteeRotationEvent| {
            let from = match committee_rotation_event.from {
                Some(from) => first_seven_base64_chars(&from.bytes()),
                None => String::from("None"),
            };
            log::info!(
                "{}, {}, {}, {}",
                COMMITTEE_ROTATION,
                secs_since_unix_epoch(committee_rotation_event.timestamp),
                from,
                first_seven_base64_chars(&committee_rotation_event.to.bytes())
            )
        };
        Box::new(logger)
    }
}

impl Logger for CommitBlockEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |commit_block_event: &CommitBlockEvent| {
            log::info!(
                "{}, {}, {}, {}",
                COMMIT_BLOCK,
                secs_since_unix_epoch(commit_block_event.timestamp),
                first_seven_base64_chars(&commit_block_event.l1_commitment.block_hash.bytes()),
                commit_block_event.state_index
            )
        };
        Box::new(logger)
    }
}

impl Logger for RequestBlockEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |request_block_event: &RequestBlockEvent| {
            log::info!(
                "{}, {}, {}, {}",
                REQUEST_BLOCK,
                secs_since_unix_epoch(request_block_event.timestamp),
                first_seven_base64_chars(&request_block_event.l1_commitment.block_hash.bytes()),
                request_block_event.peers.len()
            )
        };
        Box::new(logger)
    }
}

impl Logger for ReceiveBlockEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |receive_block_event: &ReceiveBlockEvent| {
            log::info!(
                "{}, {}, {}, {}",
                RECEIVE_BLOCK,
                secs_since_unix_epoch(receive_block_event.timestamp),
                first_seven_base64_chars(&receive_block_event.origin.bytes()),
                first_seven_base64_chars(&receive_block_event.l1_commitment.block_hash.bytes())
            )
        };
        Box::new(logger)
    }
}

impl Logger for StartSessionEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |start_session_event: &StartSessionEvent| {
            log::info!(
                "{}, {}, {}, {}, {}, {}",
                START_SESSION,
                secs_since_unix_epoch(start_session_event.timestamp),
                first_seven_base64_chars(&start_session_event.committee.bytes()),
                start_session_event.log_index,
                first_seven_base64_chars(&start_session_event.base_output.transaction.bytes()),
                start_session_event.base_output.index
            )
        };
        Box::new(logger)
    }
}

impl Logger for EndSessionEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |end_session_event: &EndSessionEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                END_SESSION,
                secs_since_unix_epoch(end_session_event.timestamp),
                first_seven_base64_chars(&end_session_event.committee.bytes()),
                end_session_event.log_index,
                outcome_info(&end_session_event.outcome)
            )
        };
        Box::new(logger)
    }
}

impl Logger for RestartSessionEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |restart_session_event: &RestartSessionEvent| {
            log::info!(
                "{}, {}, {}, {}",
                RESTART_SESSION,
                secs_since_unix_epoch(restart_session_event.timestamp),
                first_seven_base64_chars(&restart_session_event.committee.bytes()),
                restart_session_event.log_index
            )
        };
        Box::new(logger)
    }
}

impl Logger for ShareRequestEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |share_request_event: &ShareRequestEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                SHARE_REQUEST,
                secs_since_unix_epoch(share_request_event.timestamp),
                first_seven_base64_chars(&share_request_event.request.hash.bytes()),
                share_request_event.recipients,
                share_request_event.ttl
            )
        };
        Box::new(logger)
    }
}

impl Logger for ReceiveRequestEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |receive_request_event: &ReceiveRequestEvent| {
            log::info!(
                "{}, {}, {}, {}",
                RECEIVE_REQUEST,
                secs_since_unix_epoch(receive_request_event.timestamp),
                first_seven_base64_chars(&receive_request_event.origin.bytes()),
                first_seven_base64_chars(&receive_request_event.request.hash.bytes())
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

fn secs_since_unix_epoch(timestamp: SystemTime) -> u64 {
    timestamp
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|duration| duration.as_secs())
        .unwrap_or(0)
}

fn outcome_info(outcome: &SessionOutcome) -> String {
    match outcome {
        SessionOutcome::Completed => String::from("Completed"),
        SessionOutcome::Skipped => String::from("Skipped"),
        SessionOutcome::Failed { reason } => format!("Failed: {}", reason),
        SessionOutcome::Cancelled => String::from("Cancelled"),
    }
}
