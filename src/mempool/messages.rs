/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Messages the distribution syncs of different nodes exchange to spread and locate requests.

use borsh::{BorshDeserialize, BorshSerialize};

use crate::types::request::{Request, RequestRef};

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum DistSyncMessage {
    /// The sender needs the request `request_ref` points to. Nodes that have it answer with a
    /// [`ShareRequest`](DistSyncMessage::ShareRequest).
    MissingRequest { request_ref: RequestRef },

    /// A request, and the number of hops it may still be forwarded.
    ShareRequest { request: Request, ttl: u8 },
}
