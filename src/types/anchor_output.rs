/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The L1 side of the chain: anchor outputs.

use std::fmt::{self, Display, Formatter};

use borsh::{BorshDeserialize, BorshSerialize};

use super::data_types::{CommitteeAddress, L1Commitment, OutputID, StateIndex};

/// An L1 ledger output that represents one committed chain state.
///
/// Anchor outputs are produced by the L1 collaborator and are immutable once observed. The output
/// carries the [`L1Commitment`] of the chain state in its metadata, and is controlled by the address
/// of the committee that is allowed to consume it in the next state transition.
#[derive(Clone, Debug, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize)]
pub struct AnchorOutput {
    pub output_id: OutputID,
    pub committee: CommitteeAddress,
    pub state_index: StateIndex,
    pub l1_commitment: L1Commitment,
}

impl AnchorOutput {
    pub fn new(
        output_id: OutputID,
        committee: CommitteeAddress,
        state_index: StateIndex,
        l1_commitment: L1Commitment,
    ) -> AnchorOutput {
        AnchorOutput {
            output_id,
            committee,
            state_index,
            l1_commitment,
        }
    }
}

impl Display for AnchorOutput {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AnchorOutput(id={}, committee={}, si={})",
            self.output_id, self.committee, self.state_index
        )
    }
}
