/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The [`StateManager`] automaton.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::mpsc::Sender,
    time::{Duration, Instant, SystemTime},
};

use crate::{
    events::{CommitBlockEvent, Event, ReceiveBlockEvent, RequestBlockEvent},
    gpa::{Automaton, OutMessages, Respond},
    store::{Store, StoreError},
    types::{
        block::{Block, StateDraft},
        cancellation::CancelToken,
        data_types::{BlockHash, L1Commitment, NodeID},
        state::ChainState,
    },
};

use super::{
    block_cache::BlockCache,
    block_request::{BlockRequest, BlockRequestID, Completion, DiffID, DiffSide},
    inputs::{StateDiff, StateManagerInput},
    messages::StateManagerMessage,
    node_randomiser::NodeRandomiser,
};

/// Timing and sizing parameters of the [`StateManager`].
#[derive(Clone, Debug)]
pub struct StateManagerConfiguration {
    /// How many random peers a missing block is requested from.
    pub nodes_to_query: usize,

    /// How long to wait for a missing block before requesting it again.
    pub get_block_retry: Duration,

    /// How often requests are checked for whether their consumer is still interested.
    pub request_cleaning_period: Duration,

    /// How often the block cache is cleaned.
    pub cache_cleaning_period: Duration,

    /// How long a block stays in the block cache.
    pub blocks_in_cache_duration: Duration,

    pub block_cache_max_size: usize,
}

impl Default for StateManagerConfiguration {
    fn default() -> Self {
        Self {
            nodes_to_query: 5,
            get_block_retry: Duration::from_secs(3),
            request_cleaning_period: Duration::from_secs(1),
            cache_cleaning_period: Duration::from_secs(60),
            blocks_in_cache_duration: Duration::from_secs(60 * 60),
            block_cache_max_size: 1000,
        }
    }
}

#[derive(Debug)]
pub enum StateManagerError {
    StoreError(StoreError),
    BlockNotFound { l1_commitment: L1Commitment },
    StateNotFound { l1_commitment: L1Commitment },
    NoCommonAncestor { old: L1Commitment, new: L1Commitment },
}

impl From<StoreError> for StateManagerError {
    fn from(value: StoreError) -> Self {
        StateManagerError::StoreError(value)
    }
}

// Requests blocked on one missing block, plus the peers the block was last requested from.
struct WaitingBlock {
    l1_commitment: L1Commitment,
    requests: Vec<BlockRequest>,
    queried: Vec<NodeID>,
}

struct PendingDiff {
    old: L1Commitment,
    new: L1Commitment,
    old_done: bool,
    new_done: bool,
    cancel: CancelToken,
    respond: Option<Respond<StateDiff>>,
}

/// Resolves commitments into chains of blocks, and serves blocks to peers.
///
/// Every request for a state is resolved by tracing the chain of blocks backwards from the requested
/// commitment until a state already in the [`Store`] is reached. Blocks are looked up in the block
/// cache first, then in the store, and lastly requested from random peers. Once tracing succeeds,
/// the traced blocks are committed oldest first, so the store always holds a contiguous chain.
pub struct StateManager<S: Store> {
    config: StateManagerConfiguration,
    store: S,
    block_cache: BlockCache,
    waiting: HashMap<BlockHash, WaitingBlock>,
    diffs: HashMap<DiffID, PendingDiff>,
    node_randomiser: NodeRandomiser,
    last_block_request_id: BlockRequestID,
    last_get_blocks_time: Option<Instant>,
    last_clean_block_cache_time: Option<Instant>,
    last_clean_requests_time: Option<Instant>,
    event_publisher: Option<Sender<Event>>,
}

impl<S: Store> StateManager<S> {
    pub fn new(
        me: NodeID,
        store: S,
        config: StateManagerConfiguration,
        event_publisher: Option<Sender<Event>>,
    ) -> Self {
        Self {
            block_cache: BlockCache::new(config.block_cache_max_size),
            config,
            store,
            waiting: HashMap::new(),
            diffs: HashMap::new(),
            node_randomiser: NodeRandomiser::new(me),
            last_block_request_id: 0,
            last_get_blocks_time: None,
            last_clean_block_cache_time: None,
            last_clean_requests_time: None,
            event_publisher,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Number of distinct missing blocks the state manager is waiting for.
    pub fn waiting_block_count(&self) -> usize {
        self.waiting.len()
    }

    /// Number of requests blocked on missing blocks.
    pub fn waiting_request_count(&self) -> usize {
        self.waiting.values().map(|waiting| waiting.requests.len()).sum()
    }

    pub fn cached_block_count(&self) -> usize {
        self.block_cache.len()
    }

    fn next_request_id(&mut self) -> BlockRequestID {
        self.last_block_request_id += 1;
        self.last_block_request_id
    }

    /* ↓↓↓ Inputs ↓↓↓ */

    fn on_consensus_state_proposal(
        &mut self,
        target: L1Commitment,
        cancel: CancelToken,
        respond: Respond<()>,
    ) -> OutMessages<StateManagerMessage> {
        log::debug!("Input consensus state proposal {} received.", target);
        let id = self.next_request_id();
        let request = BlockRequest::new(id, target, Some(cancel), Completion::StateProposal(respond));
        self.trace_or_log(request)
    }

    fn on_consensus_decided_state(
        &mut self,
        target: L1Commitment,
        cancel: CancelToken,
        respond: Respond<ChainState>,
    ) -> OutMessages<StateManagerMessage> {
        log::debug!("Input consensus decided state {} received.", target);
        let id = self.next_request_id();
        let request = BlockRequest::new(id, target, Some(cancel), Completion::DecidedState(respond));
        self.trace_or_log(request)
    }

    fn on_consensus_block_produced(
        &mut self,
        state_draft: StateDraft,
        respond: Respond<Block>,
    ) -> OutMessages<StateManagerMessage> {
        if let Some(base) = state_draft.base_l1_commitment() {
            if !self.store.has_trie_root(&base.trie_root) {
                panic!(
                    "Block produced on state {}, which is not in the store",
                    base
                );
            }
        }

        let block = match self.store.commit(state_draft) {
            Ok(block) => block,
            Err(err) => {
                log::error!("Committing a produced block failed: {:?}", err);
                return OutMessages::new();
            }
        };
        self.publish_commit(&block);
        self.block_cache.add_block(block.clone());
        respond(block.clone());

        // Requests may have been waiting for a block a peer would otherwise have to send us.
        if let Some(waiting) = self.waiting.remove(&block.hash) {
            let mut requests = waiting.requests;
            requests
                .iter_mut()
                .for_each(|request| request.block_available(block.clone()));
            if let Err(err) = self.complete_requests(Some(block.hash), requests) {
                log::error!(
                    "Completing requests waiting for produced block {} failed: {:?}",
                    block.l1_commitment(),
                    err
                );
            }
        }
        OutMessages::new()
    }

    fn on_chain_fetch_state_diff(
        &mut self,
        old: L1Commitment,
        new: L1Commitment,
        cancel: CancelToken,
        respond: Respond<StateDiff>,
    ) -> OutMessages<StateManagerMessage> {
        log::debug!("Input state diff from {} to {} received.", old, new);
        let old_id = self.next_request_id();
        let new_id = self.next_request_id();
        let diff = new_id;
        self.diffs.insert(
            diff,
            PendingDiff {
                old,
                new,
                old_done: false,
                new_done: false,
                cancel: cancel.clone(),
                respond: Some(respond),
            },
        );

        let mut out = OutMessages::new();
        out.append(self.trace_or_log(BlockRequest::new(
            old_id,
            old,
            Some(cancel.clone()),
            Completion::MempoolDiff {
                diff,
                side: DiffSide::Old,
            },
        )));
        out.append(self.trace_or_log(BlockRequest::new(
            new_id,
            new,
            Some(cancel),
            Completion::MempoolDiff {
                diff,
                side: DiffSide::New,
            },
        )));
        out
    }

    fn on_timer_tick(&mut self, now: Instant) -> OutMessages<StateManagerMessage> {
        let mut out = OutMessages::new();

        // 1. Re-request every block still missing.
        if is_due(self.last_get_blocks_time, self.config.get_block_retry, now) {
            let nodes_to_query = self.config.nodes_to_query;
            let mut requested = Vec::new();
            for waiting in self.waiting.values_mut() {
                let peers = self
                    .node_randomiser
                    .random_other_nodes(nodes_to_query, &waiting.queried);
                waiting.queried = peers.clone();
                requested.push((waiting.l1_commitment, peers));
            }
            for (l1_commitment, peers) in requested {
                out.append(self.get_block_messages(l1_commitment, peers));
            }
            self.last_get_blocks_time = Some(now);
        }

        // 2. Evict blocks that have been cached for too long.
        if is_due(
            self.last_clean_block_cache_time,
            self.config.cache_cleaning_period,
            now,
        ) {
            if let Some(limit) = now.checked_sub(self.config.blocks_in_cache_duration) {
                self.block_cache.clean_older_than(limit);
            }
            self.last_clean_block_cache_time = Some(now);
        }

        // 3. Drop requests nobody is interested in anymore.
        if is_due(
            self.last_clean_requests_time,
            self.config.request_cleaning_period,
            now,
        ) {
            self.waiting.retain(|_, waiting| {
                waiting.requests.retain(|request| {
                    let valid = request.is_valid();
                    if !valid {
                        log::debug!(
                            "Dropping {} request {} for {}: no longer valid.",
                            request.origin(),
                            request.id(),
                            request.target()
                        );
                    }
                    valid
                });
                !waiting.requests.is_empty()
            });
            self.diffs.retain(|_, diff| !diff.cancel.is_cancelled());
            self.last_clean_requests_time = Some(now);
        }

        out
    }

    /* ↓↓↓ Messages ↓↓↓ */

    fn on_peer_get_block(
        &mut self,
        origin: NodeID,
        l1_commitment: L1Commitment,
    ) -> OutMessages<StateManagerMessage> {
        let mut out = OutMessages::new();
        match self.get_block(&l1_commitment) {
            Some(block) => {
                log::debug!("Sending block {} to peer {}.", l1_commitment, origin);
                out.add(origin, StateManagerMessage::Block { block });
            }
            None => log::debug!(
                "Block {} requested by peer {} not found, ignoring the request.",
                l1_commitment,
                origin
            ),
        }
        out
    }

    fn on_peer_block(&mut self, origin: NodeID, block: Block) -> OutMessages<StateManagerMessage> {
        if !block.is_correct() {
            log::warn!("Peer {} sent a block with an incorrect hash, ignoring it.", origin);
            return OutMessages::new();
        }
        let l1_commitment = block.l1_commitment();
        let waiting = match self.waiting.remove(&block.hash) {
            Some(waiting) if waiting.l1_commitment == l1_commitment => waiting,
            Some(waiting) => {
                log::warn!(
                    "Peer {} sent block {} but {} was expected, ignoring it.",
                    origin,
                    l1_commitment,
                    waiting.l1_commitment
                );
                self.waiting.insert(block.hash, waiting);
                return OutMessages::new();
            }
            None => {
                log::debug!("Block {} from peer {} is not needed.", l1_commitment, origin);
                return OutMessages::new();
            }
        };
        Event::publish(
            &self.event_publisher,
            Event::ReceiveBlock(ReceiveBlockEvent {
                timestamp: SystemTime::now(),
                origin,
                l1_commitment,
            }),
        );

        self.block_cache.add_block(block.clone());
        let mut requests = waiting.requests;
        let id = self.next_request_id();
        requests.push(BlockRequest::new(id, l1_commitment, None, Completion::Nothing));
        requests
            .iter_mut()
            .for_each(|request| request.block_available(block.clone()));

        let result = match block.previous_l1_commitment {
            Some(previous) => self.trace_block_chain(previous, requests),
            None => self
                .complete_requests(None, requests)
                .map(|_| OutMessages::new()),
        };
        result.unwrap_or_else(|err| {
            log::error!("Tracing from block {} failed: {:?}", l1_commitment, err);
            OutMessages::new()
        })
    }

    /* ↓↓↓ Tracing ↓↓↓ */

    fn trace_or_log(&mut self, request: BlockRequest) -> OutMessages<StateManagerMessage> {
        let (origin, id, target) = (request.origin(), request.id(), request.target());
        self.trace_block_chain_by_request(request)
            .unwrap_or_else(|err| {
                log::error!(
                    "Tracing {} request {} for {} failed: {:?}",
                    origin,
                    id,
                    target,
                    err
                );
                OutMessages::new()
            })
    }

    fn trace_block_chain_by_request(
        &mut self,
        request: BlockRequest,
    ) -> Result<OutMessages<StateManagerMessage>, StateManagerError> {
        let target = request.target();
        if self.store.has_trie_root(&target.trie_root) {
            self.mark_request_completed(request);
            return Ok(OutMessages::new());
        }
        if let Some(waiting) = self.waiting.get_mut(&target.block_hash) {
            waiting.requests.push(request);
            return Ok(OutMessages::new());
        }
        self.trace_block_chain(target, vec![request])
    }

    // Walk back from `init` until a stored state is reached, or a block is missing. In the latter case
    // `requests` are parked until the missing block arrives.
    fn trace_block_chain(
        &mut self,
        init: L1Commitment,
        mut requests: Vec<BlockRequest>,
    ) -> Result<OutMessages<StateManagerMessage>, StateManagerError> {
        let mut commitment = init;
        while !self.store.has_trie_root(&commitment.trie_root) {
            match self.block_cache.get_block(&commitment) {
                Some(block) => {
                    let previous = block.previous_l1_commitment;
                    requests
                        .iter_mut()
                        .for_each(|request| request.block_available(block.clone()));
                    match previous {
                        Some(previous) => commitment = previous,
                        None => break,
                    }
                }
                None => {
                    if let Some(waiting) = self.waiting.get_mut(&commitment.block_hash) {
                        waiting.requests.append(&mut requests);
                        return Ok(OutMessages::new());
                    }
                    let peers = self
                        .node_randomiser
                        .random_other_nodes(self.config.nodes_to_query, &[]);
                    self.waiting.insert(
                        commitment.block_hash,
                        WaitingBlock {
                            l1_commitment: commitment,
                            requests,
                            queried: peers.clone(),
                        },
                    );
                    return Ok(self.get_block_messages(commitment, peers));
                }
            }
        }
        self.complete_requests(None, requests)?;
        Ok(OutMessages::new())
    }

    // Commit the blocks of every request oldest first, then complete the requests.
    fn complete_requests(
        &mut self,
        already_committed: Option<BlockHash>,
        requests: Vec<BlockRequest>,
    ) -> Result<(), StateManagerError> {
        let mut committed: HashSet<BlockHash> = already_committed.into_iter().collect();
        for request in &requests {
            for block in request.block_chain().iter().rev() {
                if committed.contains(&block.hash) {
                    continue;
                }
                let draft = match block.previous_l1_commitment {
                    Some(previous) => self.store.new_state_draft(&previous)?,
                    None => StateDraft::origin(BTreeMap::new()),
                }
                .with_mutations(block.mutations.clone());
                let committed_block = self.store.commit(draft)?;
                if committed_block.l1_commitment() != block.l1_commitment() {
                    panic!(
                        "Committing block {} resulted in a different block {}",
                        block.l1_commitment(),
                        committed_block.l1_commitment()
                    );
                }
                self.publish_commit(&committed_block);
                committed.insert(block.hash);
            }
        }

        for request in requests {
            self.mark_request_completed(request);
        }
        Ok(())
    }

    fn mark_request_completed(&mut self, request: BlockRequest) {
        if !request.is_valid() {
            log::debug!(
                "{} request {} completed, but is no longer valid.",
                request.origin(),
                request.id()
            );
            return;
        }
        let target = request.target();
        match request.into_completion() {
            Completion::Nothing => (),
            Completion::StateProposal(respond) => respond(()),
            Completion::DecidedState(respond) => match self.store.state_by_trie_root(&target.trie_root) {
                Ok(Some(state)) => respond(state),
                Ok(None) => log::error!("State {} vanished from the store.", target),
                Err(err) => log::error!("Reading state {} failed: {:?}", target, err),
            },
            Completion::MempoolDiff { diff, side } => self.diff_side_completed(diff, side),
        }
    }

    /* ↓↓↓ Differential fetch ↓↓↓ */

    fn diff_side_completed(&mut self, diff: DiffID, side: DiffSide) {
        let pending = match self.diffs.get_mut(&diff) {
            Some(pending) => pending,
            None => return,
        };
        match side {
            DiffSide::Old => pending.old_done = true,
            DiffSide::New => pending.new_done = true,
        }
        if !(pending.old_done && pending.new_done) {
            return;
        }

        let mut pending = match self.diffs.remove(&diff) {
            Some(pending) => pending,
            None => return,
        };
        match self.state_diff(pending.old, pending.new) {
            Ok(state_diff) => {
                if let Err(err) = self.store.set_latest(&pending.new.trie_root) {
                    log::error!("Updating the latest state to {} failed: {:?}", pending.new, err);
                }
                if let Some(respond) = pending.respond.take() {
                    respond(state_diff)
                }
            }
            Err(err) => log::error!(
                "Computing the state diff from {} to {} failed: {:?}",
                pending.old,
                pending.new,
                err
            ),
        }
    }

    /// Walk back from both `old` and `new` until they meet, collecting the blocks each side has and the
    /// other does not. Both sides must be in the store.
    fn state_diff(&self, old: L1Commitment, new: L1Commitment) -> Result<StateDiff, StateManagerError> {
        let mut old_block = self.committed_block(&old)?;
        let mut new_block = self.committed_block(&new)?;
        let mut added = Vec::new();
        let mut removed = Vec::new();

        while new_block.state_index > old_block.state_index {
            let parent = self.parent(&new_block, old, new)?;
            added.push(std::mem::replace(&mut new_block, parent));
        }
        while old_block.state_index > new_block.state_index {
            let parent = self.parent(&old_block, old, new)?;
            removed.push(std::mem::replace(&mut old_block, parent));
        }
        while old_block.l1_commitment() != new_block.l1_commitment() {
            let new_parent = self.parent(&new_block, old, new)?;
            let old_parent = self.parent(&old_block, old, new)?;
            added.push(std::mem::replace(&mut new_block, new_parent));
            removed.push(std::mem::replace(&mut old_block, old_parent));
        }
        added.reverse();
        removed.reverse();

        let new_state = self
            .store
            .state_by_trie_root(&new.trie_root)?
            .ok_or(StateManagerError::StateNotFound { l1_commitment: new })?;
        Ok(StateDiff {
            new_state,
            added,
            removed,
        })
    }

    fn committed_block(&self, l1_commitment: &L1Commitment) -> Result<Block, StateManagerError> {
        self.store
            .block_by_trie_root(&l1_commitment.trie_root)?
            .ok_or(StateManagerError::BlockNotFound {
                l1_commitment: *l1_commitment,
            })
    }

    fn parent(
        &self,
        block: &Block,
        old: L1Commitment,
        new: L1Commitment,
    ) -> Result<Block, StateManagerError> {
        match block.previous_l1_commitment {
            Some(previous) => self.committed_block(&previous),
            None => Err(StateManagerError::NoCommonAncestor { old, new }),
        }
    }

    /* ↓↓↓ Helpers ↓↓↓ */

    // Look a block up in the cache, then in the store.
    fn get_block(&mut self, l1_commitment: &L1Commitment) -> Option<Block> {
        if let Some(block) = self.block_cache.get_block(l1_commitment) {
            return Some(block);
        }
        if !self.store.has_trie_root(&l1_commitment.trie_root) {
            return None;
        }
        match self.store.block_by_trie_root(&l1_commitment.trie_root) {
            Ok(Some(block)) if block.l1_commitment() == *l1_commitment => {
                self.block_cache.add_block(block.clone());
                Some(block)
            }
            Ok(Some(block)) => {
                log::error!(
                    "Block loaded for {} from the store has commitment {}.",
                    l1_commitment,
                    block.l1_commitment()
                );
                None
            }
            Ok(None) => None,
            Err(err) => {
                log::error!("Loading block {} from the store failed: {:?}", l1_commitment, err);
                None
            }
        }
    }

    fn get_block_messages(
        &self,
        l1_commitment: L1Commitment,
        peers: Vec<NodeID>,
    ) -> OutMessages<StateManagerMessage> {
        log::debug!("Requesting block {} from {} peers.", l1_commitment, peers.len());
        let mut out = OutMessages::new();
        out.broadcast(&peers, StateManagerMessage::GetBlock { l1_commitment });
        Event::publish(
            &self.event_publisher,
            Event::RequestBlock(RequestBlockEvent {
                timestamp: SystemTime::now(),
                l1_commitment,
                peers,
            }),
        );
        out
    }

    fn publish_commit(&self, block: &Block) {
        Event::publish(
            &self.event_publisher,
            Event::CommitBlock(CommitBlockEvent {
                timestamp: SystemTime::now(),
                l1_commitment: block.l1_commitment(),
                state_index: block.state_index,
            }),
        );
    }
}

impl<S: Store> Automaton for StateManager<S> {
    type Input = StateManagerInput;
    type Message = StateManagerMessage;
    type Output = ();

    fn input(&mut self, input: Self::Input) -> OutMessages<Self::Message> {
        match input {
            StateManagerInput::ConsensusStateProposal {
                anchor_output,
                cancel,
                respond,
            } => self.on_consensus_state_proposal(anchor_output.l1_commitment, cancel, respond),
            StateManagerInput::ConsensusDecidedState {
                anchor_output,
                cancel,
                respond,
            } => self.on_consensus_decided_state(anchor_output.l1_commitment, cancel, respond),
            StateManagerInput::ConsensusBlockProduced {
                state_draft,
                respond,
            } => self.on_consensus_block_produced(state_draft, respond),
            StateManagerInput::ChainFetchStateDiff {
                old,
                new,
                cancel,
                respond,
            } => self.on_chain_fetch_state_diff(old, new, cancel, respond),
            StateManagerInput::PeersUpdated(peers) => {
                self.node_randomiser.update_nodes(peers);
                OutMessages::new()
            }
            StateManagerInput::TimerTick(now) => self.on_timer_tick(now),
        }
    }

    fn message(&mut self, origin: NodeID, msg: Self::Message) -> OutMessages<Self::Message> {
        match msg {
            StateManagerMessage::GetBlock { l1_commitment } => {
                self.on_peer_get_block(origin, l1_commitment)
            }
            StateManagerMessage::Block { block } => self.on_peer_block(origin, block),
        }
    }

    fn output(&self) -> Option<Self::Output> {
        None
    }

    fn status_string(&self) -> String {
        format!(
            "{{SM: waiting for {} blocks, {} requests, {} pending diffs, {} cached blocks, {} peers}}",
            self.waiting.len(),
            self.waiting_request_count(),
            self.diffs.len(),
            self.block_cache.len(),
            self.node_randomiser.node_count()
        )
    }
}

// Whether a periodic action last done at `last` is due again at `now`.
fn is_due(last: Option<Instant>, period: Duration, now: Instant) -> bool {
    last.map_or(true, |last| now.saturating_duration_since(last) >= period)
}
