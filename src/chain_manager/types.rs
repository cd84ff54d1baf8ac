/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Inputs and outputs of the [chain manager](super::ChainManager).

use std::{
    fmt::{self, Debug, Formatter},
    sync::Arc,
    time::Instant,
};

use crate::{
    consensus::collaborators::DKShare,
    types::{
        anchor_output::AnchorOutput,
        data_types::{CommitteeAddress, LogIndex, TransactionID},
        transaction::SignedTransaction,
    },
};

#[derive(Clone, Debug)]
pub struct ChainManagerConfiguration {
    /// How many produced, but not yet confirmed, anchor outputs a committee may build on before it
    /// waits for confirmations.
    pub pipelining_limit: usize,
}

impl Default for ChainManagerConfiguration {
    fn default() -> Self {
        Self {
            pipelining_limit: 3,
        }
    }
}

pub enum ChainManagerInput {
    /// L1 confirmed `anchor_output` as the chain's latest state.
    AnchorOutputConfirmed(AnchorOutput),

    /// The session `log_index` of `committee` signed a transaction that consumes `base` and produces
    /// `produced`.
    ConsensusOutputDone {
        committee: CommitteeAddress,
        log_index: LogIndex,
        base: AnchorOutput,
        transaction: SignedTransaction,
        produced: AnchorOutput,
    },

    /// The session `log_index` of `committee` produced nothing on `base`.
    ConsensusOutputSkip {
        committee: CommitteeAddress,
        log_index: LogIndex,
        base: AnchorOutput,
    },

    /// The L1 client is done publishing `transaction`.
    ChainTxPublishResult {
        committee: CommitteeAddress,
        log_index: LogIndex,
        transaction: TransactionID,
        confirmed: bool,
    },

    TimerTick(Instant),
}

/// Request for a consensus session on `base` at `log_index` of `committee`.
#[derive(Clone)]
pub struct NeedConsensus {
    pub committee: CommitteeAddress,
    pub log_index: LogIndex,
    pub base: AnchorOutput,
    pub dk_share: Arc<dyn DKShare>,
}

impl Debug for NeedConsensus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("NeedConsensus")
            .field("committee", &self.committee)
            .field("log_index", &self.log_index)
            .field("base", &self.base)
            .field("share_index", &self.dk_share.share_index())
            .finish()
    }
}

/// A signed transaction that has to be published to L1.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NeedPublishTX {
    pub committee: CommitteeAddress,
    pub log_index: LogIndex,
    pub transaction: SignedTransaction,
    /// The anchor output the transaction consumes.
    pub base: AnchorOutput,
    /// The anchor output the transaction produces.
    pub produced: AnchorOutput,
}

/// Snapshot of the chain manager's view of the chain.
#[derive(Clone, Debug)]
pub struct ChainManagerOutput {
    pub latest_confirmed: Option<AnchorOutput>,
    pub active_committee: Option<CommitteeAddress>,
    pub need_consensus: Option<NeedConsensus>,
    /// Ordered by log index.
    pub need_publish_tx: Vec<NeedPublishTX>,
}

/// Lookup of this node's DK shares.
pub trait DKShareRegistry: Send + Sync {
    /// This node's share of `committee`'s key, or `None` if this node is not a member of it.
    fn dk_share(&self, committee: &CommitteeAddress) -> Option<Arc<dyn DKShare>>;
}

#[derive(Debug, PartialEq, Eq)]
pub enum ChainManagerError {
    /// The input is about a committee that is not the active one anymore.
    InactiveCommittee { committee: CommitteeAddress },
    /// The input is about a log index other than the one being worked on.
    UnexpectedLogIndex { expected: LogIndex, got: LogIndex },
    /// The session at `log_index` was built on a base the log has moved away from since.
    StaleBase { log_index: LogIndex },
}
