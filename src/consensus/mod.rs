/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Subprotocol that produces the block and the signed transaction of one log index.
//!
//! One [`ConsensusSession`] runs per committee address and log index. A session proceeds as follows:
//! 1. It is given the base anchor output through a [`Proposal`](types::SessionInput::Proposal), and asks
//!    the mempool which requests could be processed on it, and the state manager to make the base's
//!    blocks available. Both answers are one-shot latches, so redelivered answers are ignored.
//! 2. Once both have answered, the local proposal is handed to the committee agreement, which decides
//!    on one base and one batch of requests for the whole committee. An empty batch skips the session.
//! 3. The agreed requests are fetched from the mempool and the agreed base state from the state
//!    manager. The VM runs the requests on the base state exactly once, with entropy derived from the
//!    base anchor output. The requests it ran are recorded as processed in the resulting state.
//! 4. The state manager commits the produced block. The transaction that anchors the new state is then
//!    signed with this node's DK share, and the partial signature is sent to the rest of the
//!    committee.
//! 5. Once enough valid partial signatures are collected, the full signature is recovered and the
//!    signed transaction is the session's result. The session completes when the chain manager is done
//!    publishing it.
//!
//! Messages between committee members are meant to be sent through an
//! [`AckHandler`](crate::gpa::ack::AckHandler), which redelivers them until they are acknowledged.

pub mod collaborators;

pub mod messages;

pub mod types;

pub(crate) mod sync_mp;

pub(crate) mod sync_sm;

mod session;
pub use session::ConsensusSession;
