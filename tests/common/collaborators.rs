//! Mock implementations of the collaborators a node is started with.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

use anchored_chain::{
    consensus::{
        collaborators::{VMError, VMTask, VirtualMachine},
        types::AgreementProposal,
    },
    gpa::Respond,
    node::collaborators::{CommitteeAgreement, L1Client},
    types::{
        anchor_output::AnchorOutput,
        block::StateDraft,
        cancellation::CancelToken,
        data_types::{CommitteeAddress, LogIndex},
        request::Request,
        transaction::SignedTransaction,
    },
};

use super::chain_factory::COUNTER_KEY;

/// A VM that increments the counter once per request, and counts its runs.
#[derive(Clone, Default)]
pub(crate) struct CounterVM {
    runs: Arc<AtomicUsize>,
}

impl CounterVM {
    pub(crate) fn new() -> CounterVM {
        CounterVM::default()
    }

    pub(crate) fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

impl VirtualMachine for CounterVM {
    fn run(&self, task: VMTask) -> Result<StateDraft, VMError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        let mut draft = task.state_draft;
        let counter = draft
            .get(&COUNTER_KEY)
            .map(|bytes| {
                let mut int = [0u8; 4];
                int.copy_from_slice(&bytes[..4]);
                u32::from_le_bytes(int)
            })
            .unwrap_or(0);
        let counter = counter + task.requests.len() as u32;
        draft.set(COUNTER_KEY.to_vec(), counter.to_le_bytes().to_vec());
        Ok(draft)
    }
}

/// A one-member "agreement", which decides on the proposal it is given.
pub(crate) struct OwnProposalAgreement;

impl CommitteeAgreement for OwnProposalAgreement {
    fn propose(
        &mut self,
        _committee: CommitteeAddress,
        _log_index: LogIndex,
        proposal: AgreementProposal,
        cancel: CancelToken,
        decided: Respond<AgreementProposal>,
    ) {
        if !cancel.is_cancelled() {
            decided(proposal)
        }
    }
}

/// An L1 that confirms every published transaction right away, and then reports the anchor output
/// it produces.
#[derive(Default)]
pub(crate) struct InstantL1 {
    on_anchor_output: Option<Box<dyn Fn(AnchorOutput) + Send>>,
    published: Arc<Mutex<Vec<SignedTransaction>>>,
}

impl InstantL1 {
    pub(crate) fn new() -> InstantL1 {
        InstantL1::default()
    }

    /// The transactions published so far, shared with the clone handed to the node.
    pub(crate) fn published(&self) -> Arc<Mutex<Vec<SignedTransaction>>> {
        Arc::clone(&self.published)
    }
}

impl L1Client for InstantL1 {
    fn attach(
        &mut self,
        _on_request: Box<dyn Fn(Request) + Send>,
        on_anchor_output: Box<dyn Fn(AnchorOutput) + Send>,
    ) {
        self.on_anchor_output = Some(on_anchor_output);
    }

    fn publish_tx(&mut self, transaction: SignedTransaction, confirmed: Respond<bool>) {
        let produced = transaction.essence.produced_anchor_output();
        self.published.lock().unwrap().push(transaction);
        confirmed(true);
        if let Some(on_anchor_output) = &self.on_anchor_output {
            on_anchor_output(produced);
        }
    }
}
