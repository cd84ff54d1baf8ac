/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Pluggable peer-to-peer (P2P) networking.
//!
//! The transport is unreliable: messages may be lost, duplicated or reordered. Consensus session
//! messages are made reliable by the [ack layer](crate::gpa::ack), while the state manager and the
//! distribution sync retry on their own timers.

pub mod network;

pub mod messages;

pub(crate) mod receiving;

pub(crate) mod sending;
