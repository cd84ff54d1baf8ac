/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Storage for pending requests.

use std::{collections::HashMap, time::Instant};

use crate::types::{
    request::{processed_request_key, Request, RequestRef, RequestRefKey},
    state::ChainState,
};

/// What the [distribution sync](super::dist_sync::DistSync) needs from the pool of pending requests.
pub trait RequestPool: Send {
    /// Get the request `request_ref` points to, if the pool has it.
    fn get(&self, request_ref: &RequestRef) -> Option<Request>;

    /// Hand a request received from a peer to the pool.
    fn receive(&mut self, request: Request);
}

struct PoolEntry {
    request: Request,
    added: Instant,
}

/// Pending requests of one kind, indexed by [`RequestRefKey`].
pub struct TypedPool {
    requests: HashMap<RequestRefKey, PoolEntry>,
}

impl TypedPool {
    pub fn new() -> Self {
        Self {
            requests: HashMap::new(),
        }
    }

    /// Add `request` to the pool. Returns whether it was not in the pool already.
    pub fn add(&mut self, request: Request) -> bool {
        let key = request.reference().key();
        if self.requests.contains_key(&key) {
            return false;
        }
        log::debug!("ADD {} to the request pool.", request.reference());
        self.requests.insert(
            key,
            PoolEntry {
                request,
                added: Instant::now(),
            },
        );
        true
    }

    pub fn remove(&mut self, request_ref: &RequestRef) -> Option<Request> {
        self.requests.remove(&request_ref.key()).map(|entry| {
            log::debug!("DEL {} from the request pool.", request_ref);
            entry.request
        })
    }

    pub fn has(&self, request_ref: &RequestRef) -> bool {
        self.requests.contains_key(&request_ref.key())
    }

    pub fn get(&self, request_ref: &RequestRef) -> Option<&Request> {
        self.requests
            .get(&request_ref.key())
            .map(|entry| &entry.request)
    }

    /// Keep only the requests for which `predicate` returns `true`.
    pub fn filter(&mut self, mut predicate: impl FnMut(&Request, Instant) -> bool) {
        self.requests
            .retain(|_, entry| predicate(&entry.request, entry.added));
    }

    /// References to every request in the pool, oldest first.
    pub fn refs(&self) -> Vec<RequestRef> {
        let mut entries: Vec<(&RequestRefKey, &PoolEntry)> = self.requests.iter().collect();
        entries.sort_by_key(|(key, entry)| (entry.added, **key));
        entries
            .into_iter()
            .map(|(_, entry)| entry.request.reference())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

impl Default for TypedPool {
    fn default() -> Self {
        TypedPool::new()
    }
}

/// The on-ledger and off-ledger request pools of the [`Mempool`](super::Mempool), together with the
/// chain state they are checked against.
///
/// Requests already processed in the tracked chain state are never added.
pub struct RequestPools {
    pub(crate) on_ledger: TypedPool,
    pub(crate) off_ledger: TypedPool,
    pub(crate) chain_state: Option<ChainState>,
}

impl RequestPools {
    pub fn new() -> Self {
        Self {
            on_ledger: TypedPool::new(),
            off_ledger: TypedPool::new(),
            chain_state: None,
        }
    }

    /// Whether `request` is recorded as processed in the tracked chain state.
    pub fn is_processed(&self, request: &Request) -> bool {
        self.chain_state.as_ref().map_or(false, |state| {
            state.get(&processed_request_key(&request.id())).is_some()
        })
    }

    /// Add `request` to the pool of its kind. Returns whether the request is new and unprocessed.
    pub fn add(&mut self, request: Request) -> bool {
        if self.is_processed(&request) {
            log::debug!(
                "Request {} is already processed, not adding it to the pool.",
                request.reference()
            );
            return false;
        }
        if request.is_off_ledger() {
            self.off_ledger.add(request)
        } else {
            self.on_ledger.add(request)
        }
    }

    pub fn has(&self, request_ref: &RequestRef) -> bool {
        self.on_ledger.has(request_ref) || self.off_ledger.has(request_ref)
    }

    /// References to every pending request, on-ledger requests first.
    pub fn refs(&self) -> Vec<RequestRef> {
        let mut refs = self.on_ledger.refs();
        refs.extend(self.off_ledger.refs());
        refs
    }

    pub fn len(&self) -> usize {
        self.on_ledger.len() + self.off_ledger.len()
    }

    pub fn is_empty(&self) -> bool {
        self.on_ledger.is_empty() && self.off_ledger.is_empty()
    }

    /// Drop every request recorded as processed in `chain_state`, then track it.
    pub(crate) fn set_chain_state(&mut self, chain_state: ChainState) {
        let is_unprocessed = |request: &Request, _: Instant| {
            chain_state
                .get(&processed_request_key(&request.id()))
                .is_none()
        };
        self.on_ledger.filter(is_unprocessed);
        self.off_ledger.filter(is_unprocessed);
        self.chain_state = Some(chain_state);
    }
}

impl Default for RequestPools {
    fn default() -> Self {
        RequestPools::new()
    }
}

impl RequestPool for RequestPools {
    fn get(&self, request_ref: &RequestRef) -> Option<Request> {
        self.on_ledger
            .get(request_ref)
            .or_else(|| self.off_ledger.get(request_ref))
            .cloned()
    }

    fn receive(&mut self, request: Request) {
        self.add(request);
    }
}
