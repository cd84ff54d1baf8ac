/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Requests to the chain, and content-addressed references to them.
//!
//! Requests are owned by the [mempool](crate::mempool). Consensus sessions and the distribution sync
//! only ever hold [`RequestRef`]s, and compare them through their [`RequestRefKey`].

use std::fmt::{self, Display, Formatter};

use borsh::{BorshDeserialize, BorshSerialize};

use super::{
    crypto_primitives::hash_borsh,
    data_types::{ChainID, CryptoHash, NodeID, OutputID},
};

/// A call to the chain, either deposited on L1 or submitted directly to a node.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum Request {
    /// A request carried by an L1 output addressed to the chain.
    OnLedger(OnLedgerRequest),

    /// A request submitted to a node and propagated among nodes off the ledger.
    OffLedger(OffLedgerRequest),
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct OnLedgerRequest {
    pub output_id: OutputID,
    pub payload: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct OffLedgerRequest {
    pub chain_id: ChainID,
    pub sender: NodeID,
    pub nonce: u64,
    pub payload: Vec<u8>,
}

impl Request {
    /// Identifier of the request, stable across re-submissions of the same call.
    pub fn id(&self) -> RequestID {
        match self {
            Request::OnLedger(req) => RequestID(hash_borsh(b"request_id", &req.output_id)),
            Request::OffLedger(req) => RequestID(hash_borsh(
                b"request_id",
                &(req.chain_id, req.sender, req.nonce),
            )),
        }
    }

    /// Content-addressed reference to this request.
    pub fn reference(&self) -> RequestRef {
        RequestRef {
            id: self.id(),
            hash: hash_borsh(b"request", self),
        }
    }

    pub fn is_off_ledger(&self) -> bool {
        matches!(self, Request::OffLedger(_))
    }
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshSerialize, BorshDeserialize,
)]
pub struct RequestID(CryptoHash);

impl RequestID {
    pub const fn bytes(&self) -> [u8; 32] {
        self.0.bytes()
    }
}

/// Reference to a request: its id plus the hash of its full content.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize)]
pub struct RequestRef {
    pub id: RequestID,
    pub hash: CryptoHash,
}

impl RequestRef {
    pub fn key(&self) -> RequestRefKey {
        RequestRefKey(self.id, self.hash)
    }

    /// Whether `request` is the one this reference points to.
    pub fn is_for(&self, request: &Request) -> bool {
        request.reference() == *self
    }
}

impl Display for RequestRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.hash)
    }
}

/// Value by which request references are compared and indexed.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshSerialize, BorshDeserialize,
)]
pub struct RequestRefKey(RequestID, CryptoHash);

/// Prefix of the state keys under which processed requests are recorded.
pub const PROCESSED_REQUESTS: [u8; 2] = [b'r', b'/'];

/// State key that records that the request with `id` has been processed.
pub fn processed_request_key(id: &RequestID) -> Vec<u8> {
    let mut key = PROCESSED_REQUESTS.to_vec();
    key.extend_from_slice(&id.bytes());
    key
}
