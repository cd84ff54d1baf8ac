/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The [`ConsensusSession`] automaton.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use crate::{
    gpa::{Automaton, OutMessages},
    types::{
        anchor_output::AnchorOutput,
        block::{Block, StateDraft},
        crypto_primitives::hash_borsh,
        data_types::{ChainID, LogIndex, NodeID, TransactionID},
        request::{processed_request_key, RequestRef},
        transaction::{PartialSignature, SignedTransaction, TransactionEssence},
    },
};

use super::{
    collaborators::{DKShare, SigningError, VMError, VMTask},
    messages::ConsensusMessage,
    sync_mp::SyncMP,
    sync_sm::SyncSM,
    types::{
        AgreementProposal, SessionError, SessionInput, SessionOutput, SessionResult, SessionState,
    },
};

/// Produces and signs the block of one log index of one committee.
///
/// The session never does slow work itself. Everything it waits for is listed in its
/// [output](Automaton::output), and the answers are fed back in as [`SessionInput`]s.
pub struct ConsensusSession {
    chain_id: ChainID,
    me: NodeID,
    log_index: LogIndex,
    dk_share: Arc<dyn DKShare>,
    state: SessionState,
    base: Option<AnchorOutput>,
    sync_mp: SyncMP,
    sync_sm: SyncSM,
    agreement: Option<AgreementProposal>,
    agreed_base: Option<AnchorOutput>,
    vm_task: Option<VMTask>,
    vm_done: bool,
    essence: Option<TransactionEssence>,
    own_share_sent: bool,
    // Every share received from a peer, for whichever transaction the peer signed.
    received_shares: HashMap<NodeID, (TransactionID, PartialSignature)>,
    // Verified shares over `essence`, by share index.
    shares: BTreeMap<u16, PartialSignature>,
    result: Option<SessionResult>,
}

impl ConsensusSession {
    pub fn new(
        chain_id: ChainID,
        me: NodeID,
        log_index: LogIndex,
        dk_share: Arc<dyn DKShare>,
    ) -> Self {
        Self {
            chain_id,
            me,
            log_index,
            dk_share,
            state: SessionState::Created,
            base: None,
            sync_mp: SyncMP::default(),
            sync_sm: SyncSM::default(),
            agreement: None,
            agreed_base: None,
            vm_task: None,
            vm_done: false,
            essence: None,
            own_share_sent: false,
            received_shares: HashMap::new(),
            shares: BTreeMap::new(),
            result: None,
        }
    }

    pub fn log_index(&self) -> LogIndex {
        self.log_index
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn base(&self) -> Option<&AnchorOutput> {
        self.base.as_ref()
    }

    /// Go back to [`Created`](SessionState::Created), keeping what stays valid for a session on the
    /// same base: whether the base's blocks are available, the decided state, and the signature
    /// shares received from peers. The session is started again by a new
    /// [`Proposal`](SessionInput::Proposal).
    pub fn restart(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        log::info!(
            "Restarting consensus session {} in state {}.",
            self.log_index,
            self.state
        );
        self.state = SessionState::Created;
        self.base = None;
        self.sync_mp = SyncMP::default();
        self.sync_sm.restart();
        self.agreement = None;
        self.agreed_base = None;
        self.vm_task = None;
        self.vm_done = false;
        self.essence = None;
        self.own_share_sent = false;
        self.shares.clear();
    }

    /* ↓↓↓ Proposal ↓↓↓ */

    fn on_proposal(&mut self, base: AnchorOutput) -> OutMessages<ConsensusMessage> {
        if let Some(current) = &self.base {
            if *current != base {
                log::warn!(
                    "Session {} already started on {}, ignoring proposal on {}.",
                    self.log_index,
                    current,
                    base
                );
            }
            return OutMessages::new();
        }
        self.sync_mp.base_anchor_output(base.clone());
        self.sync_sm.base_anchor_output(base.clone());
        self.base = Some(base);
        self.state = SessionState::WaitInputsReady;
        self.try_propose();
        OutMessages::new()
    }

    fn try_propose(&mut self) {
        if self.state != SessionState::WaitInputsReady && self.state != SessionState::WaitProposal {
            return;
        }
        let base = match &self.base {
            Some(base) => base.clone(),
            None => return,
        };
        match (self.sync_mp.proposal(), self.sync_sm.is_proposal_confirmed()) {
            (Some(request_refs), true) => {
                self.agreement = Some(AgreementProposal {
                    base,
                    request_refs: request_refs.clone(),
                });
                self.state = SessionState::WaitAgreedBatch;
            }
            (None, false) => (),
            _ => self.state = SessionState::WaitProposal,
        }
    }

    /* ↓↓↓ Agreement ↓↓↓ */

    fn on_agreed_batch(&mut self, base: AnchorOutput, request_refs: Vec<RequestRef>) {
        if self.agreed_base.is_some() || self.state.is_terminal() {
            return;
        }
        self.agreement = None;
        self.agreed_base = Some(base.clone());
        if request_refs.is_empty() {
            log::info!("Session {} skipped: nothing to process on {}.", self.log_index, base);
            self.finish_skipped(base);
            return;
        }
        self.sync_mp.requests_decided(request_refs);
        self.sync_sm.base_decided(base);
        self.state = SessionState::WaitVMResult;
        self.try_run_vm();
    }

    /* ↓↓↓ Block production ↓↓↓ */

    fn try_run_vm(&mut self) {
        if self.vm_task.is_some() || self.state != SessionState::WaitVMResult {
            return;
        }
        let (requests, state, base) = match (
            self.sync_mp.requests(),
            self.sync_sm.decided_state(),
            &self.agreed_base,
        ) {
            (Some(requests), Some(state), Some(base)) => (requests, state, base.clone()),
            _ => return,
        };

        // Requests processed by an earlier block can be decided on again when blocks are pipelined.
        let requests: Vec<_> = requests
            .iter()
            .filter(|request| state.get(&processed_request_key(&request.id())).is_none())
            .cloned()
            .collect();
        if requests.is_empty() {
            log::info!(
                "Session {} skipped: every decided request is already processed on {}.",
                self.log_index,
                base
            );
            self.finish_skipped(base);
            return;
        }

        let state_draft = StateDraft::new(base.l1_commitment, state);
        self.vm_task = Some(VMTask {
            entropy: hash_borsh(b"entropy", &base.output_id),
            anchor_output: base,
            state_draft,
            requests,
        });
    }

    fn on_vm_result(&mut self, result: Result<StateDraft, VMError>) {
        let task = match &self.vm_task {
            Some(task) if !self.vm_done => task,
            _ => return,
        };
        self.vm_done = true;
        let mut draft = match result {
            Ok(draft) => draft,
            Err(err) => return self.finish_failed(err.into()),
        };
        if draft.base_l1_commitment() != task.state_draft.base_l1_commitment()
            || draft.state_index() != task.state_draft.state_index()
        {
            return self.finish_failed(VMError::WrongBaseState.into());
        }
        for request in &task.requests {
            let request_ref = request.reference();
            draft.set(
                processed_request_key(&request_ref.id),
                request_ref.hash.bytes().to_vec(),
            );
        }
        self.sync_sm.block_produced(draft);
    }

    fn on_block_saved(&mut self, block: Block) -> OutMessages<ConsensusMessage> {
        if !self.sync_sm.block_saved(block.clone()) {
            return OutMessages::new();
        }
        let base = match &self.agreed_base {
            Some(base) => base,
            None => return OutMessages::new(),
        };
        self.essence = Some(TransactionEssence {
            chain_id: self.chain_id,
            consumed: base.output_id,
            committee: self.dk_share.committee_address(),
            next_state_index: block.state_index,
            l1_commitment: block.l1_commitment(),
        });
        self.state = SessionState::WaitSignaturesCollected;

        // Shares may have arrived before the block was saved.
        let received: Vec<(NodeID, TransactionID, PartialSignature)> = self
            .received_shares
            .iter()
            .map(|(origin, (transaction, partial))| (*origin, *transaction, partial.clone()))
            .collect();
        for (origin, transaction, partial) in received {
            self.add_share(origin, transaction, partial);
        }
        self.try_recover();
        OutMessages::new()
    }

    /* ↓↓↓ Signing ↓↓↓ */

    fn on_signature_share_produced(
        &mut self,
        result: Result<PartialSignature, SigningError>,
    ) -> OutMessages<ConsensusMessage> {
        let transaction = match &self.essence {
            Some(essence) if !self.own_share_sent => essence.id(),
            _ => return OutMessages::new(),
        };
        let partial = match result {
            Ok(partial) => partial,
            Err(err) => {
                self.finish_failed(err.into());
                return OutMessages::new();
            }
        };
        self.own_share_sent = true;
        self.shares.insert(partial.share_index, partial.clone());

        let me = self.me;
        let mut out = OutMessages::new();
        out.broadcast(
            self.dk_share
                .committee_nodes()
                .iter()
                .filter(|node| **node != me),
            ConsensusMessage::SignatureShare {
                transaction,
                partial,
            },
        );
        self.try_recover();
        out
    }

    fn on_signature_share(
        &mut self,
        origin: NodeID,
        transaction: TransactionID,
        partial: PartialSignature,
    ) -> OutMessages<ConsensusMessage> {
        self.received_shares
            .insert(origin, (transaction, partial.clone()));
        if self.state == SessionState::WaitSignaturesCollected {
            self.add_share(origin, transaction, partial);
            self.try_recover();
        }
        OutMessages::new()
    }

    fn add_share(&mut self, origin: NodeID, transaction: TransactionID, partial: PartialSignature) {
        let essence = match &self.essence {
            Some(essence) => essence,
            None => return,
        };
        if transaction != essence.id() {
            log::warn!(
                "Session {}: peer signed transaction {}, but {} was produced.",
                self.log_index,
                transaction,
                essence.id()
            );
            return;
        }
        let committee_nodes = self.dk_share.committee_nodes();
        if committee_nodes.get(partial.share_index as usize) != Some(&origin) {
            log::warn!(
                "Session {}: share index {} does not belong to its sender.",
                self.log_index,
                partial.share_index
            );
            return;
        }
        match self
            .dk_share
            .verify_partial(&essence.signing_bytes(), &partial)
        {
            Ok(()) => {
                self.shares.insert(partial.share_index, partial);
            }
            Err(err) => log::warn!(
                "Session {}: invalid signature share from share index {}: {:?}",
                self.log_index,
                partial.share_index,
                err
            ),
        }
    }

    fn try_recover(&mut self) {
        if self.state != SessionState::WaitSignaturesCollected
            || self.shares.len() < self.dk_share.threshold()
        {
            return;
        }
        let (essence, base, block) = match (
            &self.essence,
            &self.agreed_base,
            self.sync_sm.saved_block(),
        ) {
            (Some(essence), Some(base), Some(block)) => {
                (essence.clone(), base.clone(), block.clone())
            }
            _ => return,
        };
        let partials: Vec<PartialSignature> = self.shares.values().cloned().collect();
        match self
            .dk_share
            .recover_full(&essence.signing_bytes(), &partials)
        {
            Ok(signature) => {
                let produced = essence.produced_anchor_output();
                log::info!(
                    "Session {} signed transaction {} producing {}.",
                    self.log_index,
                    essence.id(),
                    produced
                );
                self.result = Some(SessionResult::Done {
                    base,
                    block,
                    transaction: SignedTransaction { essence, signature },
                    produced,
                });
                self.state = SessionState::WaitPublishAcknowledged;
            }
            Err(err) => self.finish_failed(err.into()),
        }
    }

    /* ↓↓↓ Completion ↓↓↓ */

    fn on_publish_acknowledged(&mut self, confirmed: bool) {
        if self.state != SessionState::WaitPublishAcknowledged {
            return;
        }
        log::debug!(
            "Session {} completed, transaction confirmed: {}.",
            self.log_index,
            confirmed
        );
        self.state = SessionState::Completed;
    }

    fn finish_skipped(&mut self, base: AnchorOutput) {
        self.result = Some(SessionResult::Skipped { base });
        self.state = SessionState::Skipped;
    }

    fn finish_failed(&mut self, err: SessionError) {
        log::error!("Session {} failed: {:?}", self.log_index, err);
        self.result = Some(SessionResult::Failed(err));
        self.state = SessionState::Failed;
    }
}

impl Automaton for ConsensusSession {
    type Input = SessionInput;
    type Message = ConsensusMessage;
    type Output = SessionOutput;

    fn input(&mut self, input: Self::Input) -> OutMessages<Self::Message> {
        if self.state.is_terminal() {
            log::debug!("Session {} is {}, ignoring input.", self.log_index, self.state);
            return OutMessages::new();
        }
        match input {
            SessionInput::Proposal { base } => return self.on_proposal(base),
            SessionInput::MempoolProposal(request_refs) => {
                if self.sync_mp.proposal_received(request_refs) {
                    self.try_propose();
                }
            }
            SessionInput::StateProposalConfirmed => {
                if self.sync_sm.proposal_confirmed() {
                    self.try_propose();
                }
            }
            SessionInput::AgreedBatch { base, request_refs } => {
                self.on_agreed_batch(base, request_refs)
            }
            SessionInput::MempoolRequests(requests) => {
                if self.sync_mp.requests_received(requests) {
                    self.try_run_vm();
                }
            }
            SessionInput::DecidedState(state) => {
                if self.sync_sm.decided_state_received(state) {
                    self.try_run_vm();
                }
            }
            SessionInput::VMResult(result) => self.on_vm_result(result),
            SessionInput::BlockSaved(block) => return self.on_block_saved(block),
            SessionInput::SignatureShareProduced(result) => {
                return self.on_signature_share_produced(result)
            }
            SessionInput::PublishAcknowledged { confirmed } => {
                self.on_publish_acknowledged(confirmed)
            }
        }
        OutMessages::new()
    }

    fn message(&mut self, origin: NodeID, msg: Self::Message) -> OutMessages<Self::Message> {
        if self.state == SessionState::Created {
            self.state = SessionState::WaitBaseAnchorOutput;
        }
        match msg {
            ConsensusMessage::SignatureShare {
                transaction,
                partial,
            } => self.on_signature_share(origin, transaction, partial),
        }
    }

    fn output(&self) -> Option<Self::Output> {
        let running = !self.state.is_terminal();
        let need_signature_share = match &self.essence {
            Some(essence) if !self.own_share_sent && running => Some(essence.signing_bytes()),
            _ => None,
        };
        Some(SessionOutput {
            state: self.state,
            need_mempool_proposal: self
                .sync_mp
                .proposal_needed()
                .filter(|_| running)
                .cloned(),
            need_state_proposal: self
                .sync_sm
                .proposal_needed()
                .filter(|_| running)
                .cloned(),
            need_agreement: self.agreement.clone(),
            need_mempool_requests: self
                .sync_mp
                .requests_needed()
                .filter(|_| running)
                .cloned(),
            need_decided_state: self
                .sync_sm
                .decided_state_needed()
                .filter(|_| running)
                .cloned(),
            need_vm_run: match self.vm_done {
                false => self.vm_task.clone(),
                true => None,
            },
            need_block_save: self
                .sync_sm
                .block_save_needed()
                .filter(|_| running)
                .cloned(),
            need_signature_share,
            result: self.result.clone(),
        })
    }

    fn status_string(&self) -> String {
        format!(
            "{{CS: LI={}, state={}, {}, {}, shares={}/{}}}",
            self.log_index,
            self.state,
            self.sync_mp.status_string(),
            self.sync_sm.status_string(),
            self.shares.len(),
            self.dk_share.threshold()
        )
    }
}
