/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! In-flight demands for the chain of blocks leading to some commitment.

use std::fmt::{self, Display, Formatter};

use crate::{
    gpa::Respond,
    types::{
        block::Block, cancellation::CancelToken, data_types::L1Commitment, state::ChainState,
    },
};

pub(crate) type BlockRequestID = u64;

/// Identifies a pending differential fetch, whose two sides are traced by two separate requests.
pub(crate) type DiffID = u64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum DiffSide {
    Old,
    New,
}

/// Who a [`BlockRequest`] was made for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockRequestOrigin {
    Local,
    ConsensusStateProposal,
    ConsensusDecidedState,
    MempoolDiff,
}

impl Display for BlockRequestOrigin {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            BlockRequestOrigin::Local => write!(f, "local"),
            BlockRequestOrigin::ConsensusStateProposal => write!(f, "from-consensus-proposal"),
            BlockRequestOrigin::ConsensusDecidedState => write!(f, "from-consensus-decided-state"),
            BlockRequestOrigin::MempoolDiff => write!(f, "from-mempool-diff"),
        }
    }
}

/// What to do once a request's chain of blocks is in the store.
pub(crate) enum Completion {
    Nothing,
    StateProposal(Respond<()>),
    DecidedState(Respond<ChainState>),
    MempoolDiff { diff: DiffID, side: DiffSide },
}

pub(crate) struct BlockRequest {
    id: BlockRequestID,
    target: L1Commitment,
    cancel: Option<CancelToken>,
    // Blocks walked so far, newest first.
    block_chain: Vec<Block>,
    completion: Completion,
}

impl BlockRequest {
    pub(crate) fn new(
        id: BlockRequestID,
        target: L1Commitment,
        cancel: Option<CancelToken>,
        completion: Completion,
    ) -> Self {
        Self {
            id,
            target,
            cancel,
            block_chain: Vec::new(),
            completion,
        }
    }

    pub(crate) fn id(&self) -> BlockRequestID {
        self.id
    }

    pub(crate) fn target(&self) -> L1Commitment {
        self.target
    }

    pub(crate) fn origin(&self) -> BlockRequestOrigin {
        match self.completion {
            Completion::Nothing => BlockRequestOrigin::Local,
            Completion::StateProposal(_) => BlockRequestOrigin::ConsensusStateProposal,
            Completion::DecidedState(_) => BlockRequestOrigin::ConsensusDecidedState,
            Completion::MempoolDiff { .. } => BlockRequestOrigin::MempoolDiff,
        }
    }

    /// Whether whoever made the request is still interested in it. Local requests always are.
    pub(crate) fn is_valid(&self) -> bool {
        self.cancel
            .as_ref()
            .map_or(true, |cancel| !cancel.is_cancelled())
    }

    pub(crate) fn block_available(&mut self, block: Block) {
        self.block_chain.push(block);
    }

    /// Blocks walked by this request, newest first.
    pub(crate) fn block_chain(&self) -> &[Block] {
        &self.block_chain
    }

    pub(crate) fn into_completion(self) -> Completion {
        self.completion
    }
}
