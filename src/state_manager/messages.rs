/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Messages the state managers of different nodes exchange to fetch blocks from each other.

use borsh::{BorshDeserialize, BorshSerialize};

use crate::types::{block::Block, data_types::L1Commitment};

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum StateManagerMessage {
    /// Ask a peer for the block that produced the state committed to by `l1_commitment`.
    GetBlock { l1_commitment: L1Commitment },

    /// Answer to [`GetBlock`](StateManagerMessage::GetBlock). Peers that do not have the block do not
    /// answer.
    Block { block: Block },
}
