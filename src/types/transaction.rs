/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The state transition transaction a committee signs and publishes to L1.
//!
//! The L1 transaction format itself is the L1 collaborator's business. What the committee agrees on
//! and signs is the [`TransactionEssence`]: which anchor output is consumed, and what the successor
//! anchor output commits to.

use borsh::{BorshDeserialize, BorshSerialize};

use super::{
    anchor_output::AnchorOutput,
    crypto_primitives::hash_borsh,
    data_types::{ChainID, CommitteeAddress, L1Commitment, OutputID, StateIndex, TransactionID},
};

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct TransactionEssence {
    pub chain_id: ChainID,
    pub consumed: OutputID,
    pub committee: CommitteeAddress,
    pub next_state_index: StateIndex,
    pub l1_commitment: L1Commitment,
}

impl TransactionEssence {
    pub fn id(&self) -> TransactionID {
        TransactionID::new(hash_borsh(b"transaction", self))
    }

    /// The bytes committee members sign.
    pub fn signing_bytes(&self) -> Vec<u8> {
        self.id().bytes().to_vec()
    }

    /// The anchor output this transaction creates once it is confirmed on L1.
    pub fn produced_anchor_output(&self) -> AnchorOutput {
        AnchorOutput::new(
            OutputID::new(self.id(), 0),
            self.committee,
            self.next_state_index,
            self.l1_commitment,
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct SignedTransaction {
    pub essence: TransactionEssence,
    pub signature: FullSignature,
}

impl SignedTransaction {
    pub fn id(&self) -> TransactionID {
        self.essence.id()
    }
}

/// One committee member's share of a threshold signature.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct PartialSignature {
    pub share_index: u16,
    pub bytes: Vec<u8>,
}

/// A threshold signature recovered from enough [`PartialSignature`]s.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct FullSignature(pub Vec<u8>);
