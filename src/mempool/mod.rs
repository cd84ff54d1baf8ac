/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Pool of pending requests, and the subprotocol that spreads them between nodes.
//!
//! The [`Mempool`] answers consensus sessions' two questions: "which requests could be processed
//! next" ([`ConsensusProposal`](MempoolInput::ConsensusProposal)) and "give me the requests the
//! committee decided to process" ([`ConsensusRequests`](MempoolInput::ConsensusRequests)). Requests
//! it does not have are looked for through the [distribution sync](dist_sync), and the question is
//! answered once they arrive.
//!
//! The mempool follows the chain head through [`StateDiff`]s: a request recorded as processed in the
//! chain head's state is dropped from the pool. Requests processed by blocks this node produced, but
//! which are not confirmed yet, stay in the pool but are not proposed again.

pub mod messages;

pub mod request_pool;

pub mod dist_sync;

use std::{collections::HashSet, sync::mpsc::Sender};

use crate::{
    events::Event,
    gpa::{Automaton, OutMessages, Respond},
    state_manager::inputs::StateDiff,
    types::{
        anchor_output::AnchorOutput,
        block::Block,
        cancellation::CancelToken,
        data_types::{L1Commitment, NodeID},
        request::{processed_request_key, Request, RequestID, RequestRef, PROCESSED_REQUESTS},
    },
};

use self::{
    dist_sync::{DistSync, DistSyncConfiguration, DistSyncInput},
    messages::DistSyncMessage,
    request_pool::{RequestPool, RequestPools},
};

pub enum MempoolInput {
    /// Requests submitted to this node, or observed on L1. They are added to the pool and shared.
    ReceiveRequests(Vec<Request>),

    /// A consensus session building on `anchor_output` asks for the requests it could propose.
    /// `respond` is called once at least one request is available.
    ConsensusProposal {
        anchor_output: AnchorOutput,
        cancel: CancelToken,
        respond: Respond<Vec<RequestRef>>,
    },

    /// A consensus session needs the requests the committee decided on, in the given order.
    ConsensusRequests {
        request_refs: Vec<RequestRef>,
        cancel: CancelToken,
        respond: Respond<Vec<Request>>,
    },

    /// The chain head moved to `l1_commitment`, as described by `diff`.
    ChainHead {
        l1_commitment: L1Commitment,
        diff: StateDiff,
    },

    /// A block this node produced, which may not be confirmed yet.
    BlockApplied(Block),

    ServerNodes {
        server_nodes: Vec<NodeID>,
        committee_nodes: Vec<NodeID>,
    },

    AccessNodes {
        access_nodes: Vec<NodeID>,
        committee_nodes: Vec<NodeID>,
    },

    TimerTick,
}

struct PendingProposal {
    anchor_output: AnchorOutput,
    cancel: CancelToken,
    respond: Respond<Vec<RequestRef>>,
}

struct PendingRequests {
    request_refs: Vec<RequestRef>,
    cancel: CancelToken,
    respond: Respond<Vec<Request>>,
}

pub struct Mempool {
    dist_sync: DistSync<RequestPools>,
    chain_head: Option<L1Commitment>,
    // Requests processed by applied, but not yet confirmed, blocks.
    tentatively_processed: HashSet<RequestID>,
    pending_proposals: Vec<PendingProposal>,
    pending_requests: Vec<PendingRequests>,
}

impl Mempool {
    pub fn new(
        me: NodeID,
        config: DistSyncConfiguration,
        event_publisher: Option<Sender<Event>>,
    ) -> Self {
        Self {
            dist_sync: DistSync::new(me, RequestPools::new(), config, event_publisher),
            chain_head: None,
            tentatively_processed: HashSet::new(),
            pending_proposals: Vec::new(),
            pending_requests: Vec::new(),
        }
    }

    /// The last chain head the mempool has been told about.
    pub fn chain_head(&self) -> Option<L1Commitment> {
        self.chain_head
    }

    pub fn pools(&self) -> &RequestPools {
        self.dist_sync.pool()
    }

    pub fn dist_sync(&self) -> &DistSync<RequestPools> {
        &self.dist_sync
    }

    fn on_receive_requests(&mut self, requests: Vec<Request>) -> OutMessages<DistSyncMessage> {
        let mut out = OutMessages::new();
        for request in requests {
            if self.dist_sync.pool_mut().add(request.clone()) {
                out.append(
                    self.dist_sync
                        .input(DistSyncInput::PublishRequest(request)),
                );
            }
        }
        out
    }

    fn on_consensus_requests(
        &mut self,
        request_refs: Vec<RequestRef>,
        cancel: CancelToken,
        respond: Respond<Vec<Request>>,
    ) -> OutMessages<DistSyncMessage> {
        let mut out = OutMessages::new();
        for request_ref in &request_refs {
            if !self.dist_sync.pool().has(request_ref) {
                log::debug!("Request {} decided on, but missing locally.", request_ref);
                out.append(self.dist_sync.input(DistSyncInput::RequestNeeded {
                    request_ref: *request_ref,
                    needed: true,
                }));
            }
        }
        self.pending_requests.push(PendingRequests {
            request_refs,
            cancel,
            respond,
        });
        out
    }

    fn on_chain_head(
        &mut self,
        l1_commitment: L1Commitment,
        diff: StateDiff,
    ) -> OutMessages<DistSyncMessage> {
        if !diff.removed.is_empty() {
            log::info!(
                "Chain head moved to {}, rolling back {} blocks.",
                l1_commitment,
                diff.removed.len()
            );
        }
        // Requests already processed on the new head are not looked for anymore.
        let mut out = OutMessages::new();
        for request_ref in self.dist_sync.needed_refs() {
            if diff
                .new_state
                .get(&processed_request_key(&request_ref.id))
                .is_some()
            {
                out.append(self.dist_sync.input(DistSyncInput::RequestNeeded {
                    request_ref,
                    needed: false,
                }));
            }
        }

        let before = self.dist_sync.pool().len();
        self.dist_sync.pool_mut().set_chain_state(diff.new_state);
        log::debug!(
            "Chain head moved to {} by {} blocks, {} processed requests removed from the pool.",
            l1_commitment,
            diff.added.len(),
            before - self.dist_sync.pool().len()
        );
        self.chain_head = Some(l1_commitment);
        self.tentatively_processed.clear();
        out
    }

    fn on_block_applied(&mut self, block: Block) {
        for (key, _) in block.mutations.sets() {
            if let Some(id) = key.strip_prefix(&PROCESSED_REQUESTS[..]) {
                if let Some(request_id) = self.request_id_by_bytes(id) {
                    self.tentatively_processed.insert(request_id);
                }
            }
        }
    }

    fn request_id_by_bytes(&self, bytes: &[u8]) -> Option<RequestID> {
        let pools = self.dist_sync.pool();
        pools
            .refs()
            .into_iter()
            .map(|request_ref| request_ref.id)
            .find(|id| id.bytes()[..] == *bytes)
    }

    // Answer every parked question that can be answered now, and forget the cancelled ones. Requests
    // only cancelled questions were waiting for are not looked for anymore.
    fn answer_pending(&mut self) -> OutMessages<DistSyncMessage> {
        let proposal = self.proposal();
        let pending_proposals = std::mem::take(&mut self.pending_proposals);
        for pending in pending_proposals {
            if pending.cancel.is_cancelled() {
                continue;
            }
            if proposal.is_empty() {
                self.pending_proposals.push(pending);
            } else {
                log::debug!(
                    "Proposing {} requests on {}.",
                    proposal.len(),
                    pending.anchor_output
                );
                (pending.respond)(proposal.clone());
            }
        }

        let mut abandoned: Vec<RequestRef> = Vec::new();
        let pending_requests = std::mem::take(&mut self.pending_requests);
        for pending in pending_requests {
            if pending.cancel.is_cancelled() {
                abandoned.extend(pending.request_refs);
                continue;
            }
            let pools = self.dist_sync.pool();
            let requests: Option<Vec<Request>> = pending
                .request_refs
                .iter()
                .map(|request_ref| pools.get(request_ref))
                .collect();
            match requests {
                Some(requests) => (pending.respond)(requests),
                None => self.pending_requests.push(pending),
            }
        }

        let mut out = OutMessages::new();
        for request_ref in abandoned {
            let still_wanted = self
                .pending_requests
                .iter()
                .any(|pending| pending.request_refs.contains(&request_ref));
            if !still_wanted && self.dist_sync.is_needed(&request_ref) {
                log::debug!("Request {} no longer needed.", request_ref);
                out.append(self.dist_sync.input(DistSyncInput::RequestNeeded {
                    request_ref,
                    needed: false,
                }));
            }
        }
        out
    }

    fn proposal(&self) -> Vec<RequestRef> {
        self.dist_sync
            .pool()
            .refs()
            .into_iter()
            .filter(|request_ref| !self.tentatively_processed.contains(&request_ref.id))
            .collect()
    }
}

impl Automaton for Mempool {
    type Input = MempoolInput;
    type Message = DistSyncMessage;
    type Output = ();

    fn input(&mut self, input: Self::Input) -> OutMessages<Self::Message> {
        let mut out = match input {
            MempoolInput::ReceiveRequests(requests) => self.on_receive_requests(requests),
            MempoolInput::ConsensusProposal {
                anchor_output,
                cancel,
                respond,
            } => {
                self.pending_proposals.push(PendingProposal {
                    anchor_output,
                    cancel,
                    respond,
                });
                OutMessages::new()
            }
            MempoolInput::ConsensusRequests {
                request_refs,
                cancel,
                respond,
            } => self.on_consensus_requests(request_refs, cancel, respond),
            MempoolInput::ChainHead {
                l1_commitment,
                diff,
            } => self.on_chain_head(l1_commitment, diff),
            MempoolInput::BlockApplied(block) => {
                self.on_block_applied(block);
                OutMessages::new()
            }
            MempoolInput::ServerNodes {
                server_nodes,
                committee_nodes,
            } => self.dist_sync.input(DistSyncInput::ServerNodes {
                server_nodes,
                committee_nodes,
            }),
            MempoolInput::AccessNodes {
                access_nodes,
                committee_nodes,
            } => self.dist_sync.input(DistSyncInput::AccessNodes {
                access_nodes,
                committee_nodes,
            }),
            MempoolInput::TimerTick => self.dist_sync.input(DistSyncInput::TimeTick),
        };
        out.append(self.answer_pending());
        out
    }

    fn message(&mut self, origin: NodeID, msg: Self::Message) -> OutMessages<Self::Message> {
        let mut out = self.dist_sync.message(origin, msg);
        out.append(self.answer_pending());
        out
    }

    fn output(&self) -> Option<Self::Output> {
        None
    }

    fn status_string(&self) -> String {
        format!(
            "{{MP: on-ledger={}, off-ledger={}, pending proposals={}, pending requests={}, {}}}",
            self.dist_sync.pool().on_ledger.len(),
            self.dist_sync.pool().off_ledger.len(),
            self.pending_proposals.len(),
            self.pending_requests.len(),
            self.dist_sync.status_string()
        )
    }
}
