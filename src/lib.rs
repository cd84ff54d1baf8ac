/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! A node of a chain whose state is anchored to an L1 ledger.
//!
//! The chain is run by a committee of nodes that jointly control a single L1 output, the *anchor
//! output*. Every block the committee produces is committed to by a transaction that consumes the
//! current anchor output and produces the next one, signed with the committee's threshold key.
//!
//! ## Components
//!
//! - [`state_manager`]: keeps the store of blocks and states, and fetches missing blocks from peers.
//! - [`mempool`]: keeps pending requests, and spreads them between nodes.
//! - [`consensus`]: runs one session per log index, which agrees on a batch of requests, runs it,
//!   and collects the signature of the resulting transaction.
//! - [`chain_manager`]: follows the anchor outputs L1 confirms, and decides which session to run
//!   and which transactions to publish.
//! - [`node`]: the thread that drives all of the above, and the handle used to start and stop it.
//!
//! Every component is an [automaton](gpa::Automaton): a state machine that reacts to inputs and
//! messages from peers with messages to send.

pub mod types;

pub mod gpa;

pub mod store;

pub mod events;

pub mod logging;

pub(crate) mod event_bus;

pub mod config;

pub mod state_manager;

pub mod mempool;

pub mod consensus;

pub mod chain_manager;

pub mod networking;

pub mod node;
