/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! A running chain node: the components, the thread that drives them, and the handle to it.
//!
//! ## Starting a node
//!
//! A node is started by building a [`ChainNodeSpec`] and calling [`start`](ChainNodeSpec::start) on
//! it. This spawns three threads:
//! 1. A poller, which receives messages from the [network](crate::networking::network::Network).
//! 2. The driver, which owns the [state manager](crate::state_manager), the
//!    [mempool](crate::mempool), the [chain manager](crate::chain_manager) and every running
//!    [consensus session](crate::consensus), and feeds them their inputs one at a time.
//! 3. An event bus, started only if at least one event handler is registered or
//!    [`log_events`](crate::config::Configuration::log_events) is set.
//!
//! Components never call each other. Whenever one needs an answer from another, it receives a
//! [`Respond`](crate::gpa::Respond) callback which, when called, queues the answer as an input of
//! the driver.
//!
//! ## Collaborators
//!
//! The node does not talk to L1, does not run requests and does not run the committee agreement
//! itself. These are provided by the user as implementations of [`L1Client`],
//! [`VirtualMachine`](crate::consensus::collaborators::VirtualMachine) and [`CommitteeAgreement`].
//!
//! [`L1Client`]: collaborators::L1Client
//! [`CommitteeAgreement`]: collaborators::CommitteeAgreement

pub mod collaborators;

pub mod status;

pub(crate) mod driver;
pub use driver::DriverConfiguration;

mod chain_node;
pub use chain_node::{ChainNode, ChainNodeSpec};
