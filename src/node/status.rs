/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

use crate::types::{anchor_output::AnchorOutput, data_types::L1Commitment};

/// What the node driver last reported about itself.
///
/// The driver updates it on every timer tick. Other threads only ever read it.
#[derive(Clone, Debug, Default)]
pub struct NodeStatus {
    pub latest_confirmed: Option<AnchorOutput>,
    /// Commitment of the latest block in the store, the one the mempool follows.
    pub latest_block: Option<L1Commitment>,
    pub chain_manager: String,
    pub state_manager: String,
    pub mempool: String,
    /// Status of every running consensus session, by log index.
    pub sessions: Vec<String>,
}
