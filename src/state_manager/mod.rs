/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Subprotocol that keeps the local [store](crate::store) in sync with the chain of blocks the rest of
//! the committee has agreed on.
//!
//! ## Block tracing
//!
//! Every request the state manager serves names an [`L1Commitment`](crate::types::data_types::L1Commitment).
//! To serve it, the state manager walks the chain of blocks backwards from the commitment, following
//! each block's `previous_l1_commitment`:
//! 1. If the state of the current commitment is already in the store, tracing is done.
//! 2. Else, if the block is in the block cache (or was previously received), it is remembered and the
//!    walk continues with its parent.
//! 3. Else, the block is requested from [`nodes_to_query`](StateManagerConfiguration::nodes_to_query)
//!    random peers with a [`GetBlock`](messages::StateManagerMessage::GetBlock) message, and the request
//!    is parked until a peer responds with the block.
//!
//! Once tracing is done, the walked blocks are committed oldest first, so every block in the store has
//! its parent's state in the store too.
//!
//! ## Differential fetch
//!
//! The mempool moves between states with [`ChainFetchStateDiff`](inputs::StateManagerInput::ChainFetchStateDiff).
//! Both the old and the new states are traced, and then the blocks that lead from their latest common
//! ancestor to each of them are returned as [`StateDiff`](inputs::StateDiff).
//!
//! ## Periodic work
//!
//! On [`TimerTick`](inputs::StateManagerInput::TimerTick), blocks still missing after
//! [`get_block_retry`](StateManagerConfiguration::get_block_retry) are requested again (preferring
//! peers that were not asked the last time), old blocks are evicted from the block cache, and requests
//! whose consumer has cancelled them are dropped.

pub mod messages;

pub mod inputs;

pub mod block_request;

pub(crate) mod block_cache;

pub(crate) mod node_randomiser;

mod implementation;
pub use implementation::{StateManager, StateManagerConfiguration, StateManagerError};
