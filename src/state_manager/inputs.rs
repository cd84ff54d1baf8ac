/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Local inputs of the [state manager](super::StateManager), and the results it responds with.

use std::time::Instant;

use crate::{
    gpa::Respond,
    types::{
        anchor_output::AnchorOutput,
        block::{Block, StateDraft},
        cancellation::CancelToken,
        data_types::{L1Commitment, NodeID},
        state::ChainState,
    },
};

pub enum StateManagerInput {
    /// A consensus session proposes to build on `anchor_output`. `respond` is called once every block
    /// up to the anchor output's state is in the store.
    ConsensusStateProposal {
        anchor_output: AnchorOutput,
        cancel: CancelToken,
        respond: Respond<()>,
    },

    /// A consensus session decided to build on `anchor_output` and needs its state.
    ConsensusDecidedState {
        anchor_output: AnchorOutput,
        cancel: CancelToken,
        respond: Respond<ChainState>,
    },

    /// A consensus session produced a block. The draft is committed and the resulting block is passed
    /// to `respond`.
    ConsensusBlockProduced {
        state_draft: StateDraft,
        respond: Respond<Block>,
    },

    /// The mempool wants to move from the state `old` to the state `new`.
    ChainFetchStateDiff {
        old: L1Commitment,
        new: L1Commitment,
        cancel: CancelToken,
        respond: Respond<StateDiff>,
    },

    /// The set of peers blocks may be requested from has changed.
    PeersUpdated(Vec<NodeID>),

    TimerTick(Instant),
}

/// Result of a [`ChainFetchStateDiff`](StateManagerInput::ChainFetchStateDiff).
///
/// `added` and `removed` are both in ascending state index order, and both start right above the
/// latest block the old and the new states have in common.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StateDiff {
    pub new_state: ChainState,
    pub added: Vec<Block>,
    pub removed: Vec<Block>,
}
