/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! What a session needs from the mempool, and what it got.

use crate::types::{
    anchor_output::AnchorOutput,
    request::{Request, RequestRef},
};

/// One-shot latches for the two questions a session asks the mempool. Repeated answers are ignored.
#[derive(Default)]
pub(crate) struct SyncMP {
    base: Option<AnchorOutput>,
    proposal: Option<Vec<RequestRef>>,
    decided_refs: Option<Vec<RequestRef>>,
    requests: Option<Vec<Request>>,
}

impl SyncMP {
    pub(crate) fn base_anchor_output(&mut self, base: AnchorOutput) {
        self.base = Some(base);
    }

    /// Record the mempool's proposal. Returns whether it is the first one.
    pub(crate) fn proposal_received(&mut self, proposal: Vec<RequestRef>) -> bool {
        if self.base.is_none() || self.proposal.is_some() {
            return false;
        }
        self.proposal = Some(proposal);
        true
    }

    pub(crate) fn requests_decided(&mut self, decided_refs: Vec<RequestRef>) {
        if self.decided_refs.is_none() {
            self.decided_refs = Some(decided_refs);
        }
    }

    /// Record the decided requests. Returns whether they are the first ones, and are the ones decided.
    pub(crate) fn requests_received(&mut self, requests: Vec<Request>) -> bool {
        let decided_refs = match (&self.decided_refs, &self.requests) {
            (Some(decided_refs), None) => decided_refs,
            _ => return false,
        };
        let matches = decided_refs.len() == requests.len()
            && decided_refs
                .iter()
                .zip(requests.iter())
                .all(|(request_ref, request)| request_ref.is_for(request));
        if !matches {
            log::warn!("Mempool responded with requests other than the decided ones, ignoring them.");
            return false;
        }
        self.requests = Some(requests);
        true
    }

    /// The anchor output the mempool still has to propose requests for.
    pub(crate) fn proposal_needed(&self) -> Option<&AnchorOutput> {
        match self.proposal {
            None => self.base.as_ref(),
            Some(_) => None,
        }
    }

    /// The decided requests the mempool still has to provide.
    pub(crate) fn requests_needed(&self) -> Option<&Vec<RequestRef>> {
        match self.requests {
            None => self.decided_refs.as_ref(),
            Some(_) => None,
        }
    }

    pub(crate) fn proposal(&self) -> Option<&Vec<RequestRef>> {
        self.proposal.as_ref()
    }

    pub(crate) fn requests(&self) -> Option<&Vec<Request>> {
        self.requests.as_ref()
    }

    pub(crate) fn status_string(&self) -> String {
        let proposal = match (&self.base, &self.proposal) {
            (None, _) => "WAIT[BaseAnchorOutput]",
            (Some(_), None) => "WAIT[RespFromMemPool]",
            (Some(_), Some(_)) => "OK",
        };
        let requests = match (&self.decided_refs, &self.requests) {
            (None, _) => "WAIT[acs decision]",
            (Some(_), None) => "WAIT[RespFromMemPool]",
            (Some(_), Some(_)) => "OK",
        };
        format!("MP/proposal={}/requests={}", proposal, requests)
    }
}
