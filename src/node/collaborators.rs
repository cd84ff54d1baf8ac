/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Traits for the pluggable components the node driver talks to, besides the
//! [network](crate::networking::network::Network), the [store](crate::store::Store), the
//! [VM](crate::consensus::collaborators::VirtualMachine) and the
//! [DK share registry](crate::chain_manager::types::DKShareRegistry).
//!
//! Every callback handed to a collaborator may be called from any thread, at most once.

use crate::{
    consensus::types::AgreementProposal,
    gpa::Respond,
    types::{
        anchor_output::AnchorOutput,
        cancellation::CancelToken,
        data_types::{CommitteeAddress, LogIndex},
        request::Request,
        transaction::SignedTransaction,
    },
};

/// Access to the L1 ledger the chain is anchored to.
pub trait L1Client: Send {
    /// Start following the chain. `on_request` is called with every request sent to the chain on L1,
    /// and `on_anchor_output` with every anchor output of the chain L1 confirms, in the order L1
    /// confirms them.
    fn attach(
        &mut self,
        on_request: Box<dyn Fn(Request) + Send>,
        on_anchor_output: Box<dyn Fn(AnchorOutput) + Send>,
    );

    /// Publish `transaction`. `confirmed` is called with `true` once L1 confirmed it, or with
    /// `false` once L1 definitively rejected it.
    fn publish_tx(&mut self, transaction: SignedTransaction, confirmed: Respond<bool>);
}

/// The committee's agreement on the batch a consensus session processes.
///
/// Every member proposes a base anchor output and the requests it would process. All honest members
/// are handed the same decided batch, which may have no requests.
pub trait CommitteeAgreement: Send {
    fn propose(
        &mut self,
        committee: CommitteeAddress,
        log_index: LogIndex,
        proposal: AgreementProposal,
        cancel: CancelToken,
        decided: Respond<AgreementProposal>,
    );
}
