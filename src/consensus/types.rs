/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Inputs, outputs and states of a [consensus session](super::ConsensusSession).

use std::{
    fmt::{self, Display, Formatter},
    time::Duration,
};

use crate::types::{
    anchor_output::AnchorOutput,
    block::{Block, StateDraft},
    data_types::ChainID,
    request::{Request, RequestRef},
    state::ChainState,
    transaction::{PartialSignature, SignedTransaction},
};

use super::collaborators::{SigningError, VMError, VMTask};

#[derive(Clone, Debug)]
pub struct ConsensusConfiguration {
    pub chain_id: ChainID,

    /// How long unacknowledged session messages wait before being sent again.
    pub redelivery_period: Duration,

    /// How long a session may go without progress before it is restarted.
    pub recovery_timeout: Duration,
}

/// Where a session is in producing its block.
///
/// A session moves through the states in the order they are declared in, except that it may end in
/// `Skipped` right after `WaitAgreedBatch`, and in `Failed` from `WaitVMResult` or
/// `WaitSignaturesCollected`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing has happened yet.
    Created,
    /// Peers are active, but the base anchor output is not known yet.
    WaitBaseAnchorOutput,
    /// The base anchor output is known, and the mempool and state manager have been asked to
    /// prepare a proposal on it.
    WaitInputsReady,
    /// One of the mempool and the state manager has answered.
    WaitProposal,
    /// The local proposal has been handed to the committee agreement.
    WaitAgreedBatch,
    /// The agreed requests and the agreed base state are being fetched, and then run by the VM.
    WaitVMResult,
    /// The block is saved, and partial signatures over its transaction are being collected.
    WaitSignaturesCollected,
    /// The transaction is signed and handed over for publication.
    WaitPublishAcknowledged,
    Completed,
    Skipped,
    Failed,
}

impl SessionState {
    /// Whether the session will not move anymore.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Skipped | SessionState::Failed
        )
    }
}

impl Display for SessionState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A member's proposal for the committee agreement.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AgreementProposal {
    pub base: AnchorOutput,
    pub request_refs: Vec<RequestRef>,
}

pub enum SessionInput {
    /// Start the session on `base`.
    Proposal { base: AnchorOutput },

    /// Requests the mempool proposes to process.
    MempoolProposal(Vec<RequestRef>),

    /// Every block up to the base anchor output's state is in the store.
    StateProposalConfirmed,

    /// The committee agreed to process `request_refs` on top of `base`. An empty list means the
    /// session is skipped.
    AgreedBatch {
        base: AnchorOutput,
        request_refs: Vec<RequestRef>,
    },

    /// The agreed requests, as fetched from the mempool.
    MempoolRequests(Vec<Request>),

    /// The state of the agreed base anchor output.
    DecidedState(ChainState),

    VMResult(Result<StateDraft, VMError>),

    /// The produced block has been committed.
    BlockSaved(Block),

    /// This node's partial signature over the produced transaction.
    SignatureShareProduced(Result<PartialSignature, SigningError>),

    /// The chain manager is done publishing the transaction, successfully or not.
    PublishAcknowledged { confirmed: bool },
}

/// Snapshot of what a session needs from its environment, and what it produced.
///
/// Every `need_*` field is `Some` while the corresponding answer is outstanding.
#[derive(Clone, Debug)]
pub struct SessionOutput {
    pub state: SessionState,
    pub need_mempool_proposal: Option<AnchorOutput>,
    pub need_state_proposal: Option<AnchorOutput>,
    pub need_agreement: Option<AgreementProposal>,
    pub need_mempool_requests: Option<Vec<RequestRef>>,
    pub need_decided_state: Option<AnchorOutput>,
    pub need_vm_run: Option<VMTask>,
    pub need_block_save: Option<StateDraft>,
    /// Payload this node has to produce a partial signature over.
    pub need_signature_share: Option<Vec<u8>>,
    pub result: Option<SessionResult>,
}

#[derive(Clone, Debug)]
pub enum SessionResult {
    /// A block was produced on `base` and its transaction, which produces `produced`, is signed.
    Done {
        base: AnchorOutput,
        block: Block,
        transaction: SignedTransaction,
        produced: AnchorOutput,
    },

    /// The committee agreed not to produce a block on `base`.
    Skipped { base: AnchorOutput },

    Failed(SessionError),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionError {
    VMError(VMError),
    SigningError(SigningError),
}

impl From<VMError> for SessionError {
    fn from(value: VMError) -> Self {
        SessionError::VMError(value)
    }
}

impl From<SigningError> for SessionError {
    fn from(value: SigningError) -> Self {
        SessionError::SigningError(value)
    }
}
