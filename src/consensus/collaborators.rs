/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Traits for the pluggable components a consensus session depends on: the committee member's share
//! of the committee's threshold key, and the virtual machine.
//!
//! Both are called from worker threads spawned by the [driver](crate::node), never from inside the
//! session, except for [`DKShare::verify_partial`] and [`DKShare::recover_full`], which are expected
//! to be cheap.

use crate::types::{
    anchor_output::AnchorOutput,
    block::StateDraft,
    data_types::{CommitteeAddress, CryptoHash, NodeID},
    request::Request,
    transaction::{FullSignature, PartialSignature},
};

/// This node's share of a committee's distributed threshold key.
///
/// A committee of `n` nodes signs with a `threshold`-of-`n` scheme: any `threshold` valid partial
/// signatures over the same payload can be combined into the committee's full signature.
pub trait DKShare: Send + Sync {
    /// The L1 address controlled by the committee's full key.
    fn committee_address(&self) -> CommitteeAddress;

    /// Every member of the committee, including this node, ordered by share index.
    fn committee_nodes(&self) -> Vec<NodeID>;

    /// Index of this node's share.
    fn share_index(&self) -> u16;

    /// Number of partial signatures needed to recover a full signature.
    fn threshold(&self) -> usize;

    /// Sign `payload` with this node's share. May be slow.
    fn sign_partial(&self, payload: &[u8]) -> Result<PartialSignature, SigningError>;

    /// Check that `partial` is a valid partial signature over `payload` by the share it claims to be
    /// from.
    fn verify_partial(&self, payload: &[u8], partial: &PartialSignature)
        -> Result<(), SigningError>;

    /// Combine at least [`threshold`](DKShare::threshold) valid partial signatures over `payload`.
    fn recover_full(
        &self,
        payload: &[u8],
        partials: &[PartialSignature],
    ) -> Result<FullSignature, SigningError>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SigningError {
    UnknownShareIndex { share_index: u16 },
    InvalidPartialSignature { share_index: u16 },
    NotEnoughPartialSignatures { have: usize, need: usize },
    KeyUnavailable,
}

/// Everything a VM run depends on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VMTask {
    /// The anchor output the produced state builds on.
    pub anchor_output: AnchorOutput,

    /// Empty draft on top of the anchor output's state.
    pub state_draft: StateDraft,

    /// Requests to run, in order.
    pub requests: Vec<Request>,

    /// Randomness every committee member derives identically from the anchor output.
    pub entropy: CryptoHash,
}

/// The deterministic state transition function of the chain.
pub trait VirtualMachine: Send + Sync {
    /// Run `task.requests` in order on top of `task.state_draft`, and return the draft with every
    /// resulting mutation.
    ///
    /// Requests that fail for business reasons (e.g., a contract error) are not VM errors: their
    /// failure is recorded in the returned draft like any other outcome. An `Err` means the VM could
    /// not produce a result at all, and fails the session.
    fn run(&self, task: VMTask) -> Result<StateDraft, VMError>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VMError {
    /// The draft returned by the VM is not on top of the state it was given.
    WrongBaseState,
    /// The VM could not run the requests.
    Execution { reason: String },
}
