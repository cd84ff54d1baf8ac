/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Messages exchanged between the committee members running the same consensus session.

use borsh::{BorshDeserialize, BorshSerialize};

use crate::types::{data_types::TransactionID, transaction::PartialSignature};

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum ConsensusMessage {
    /// The sender's partial signature over the essence of `transaction`.
    SignatureShare {
        transaction: TransactionID,
        partial: PartialSignature,
    },
}
