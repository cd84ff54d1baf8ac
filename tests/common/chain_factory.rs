//! Builders of synthetic chains, anchor outputs and requests.

use std::collections::BTreeMap;

use anchored_chain::{
    store::{BlockStore, Store},
    types::{
        anchor_output::AnchorOutput,
        block::Block,
        data_types::{ChainID, CommitteeAddress, CryptoHash, NodeID, OutputID, TransactionID},
        request::{OffLedgerRequest, Request},
    },
};

use super::mem_db::MemDB;

pub(crate) const CHAIN_ID: ChainID = ChainID::new(7);

pub(crate) const COUNTER_KEY: [u8; 7] = *b"counter";

/// A fresh store containing the origin block. Every store created this way contains the same origin.
pub(crate) fn origin_store() -> (BlockStore<MemDB>, Block) {
    let mut store = BlockStore::new(MemDB::new());
    let mut initial_kvs = BTreeMap::new();
    initial_kvs.insert(COUNTER_KEY.to_vec(), 0u32.to_le_bytes().to_vec());
    let origin = store.initialize(initial_kvs).unwrap();
    (store, origin)
}

/// Commit `count` blocks on top of `base` into `store`, returning them in ascending state index order.
///
/// `fork` is written into every block, so chains extended from the same base with different `fork`s
/// diverge.
pub(crate) fn extend_chain(
    store: &mut BlockStore<MemDB>,
    base: &Block,
    count: u32,
    fork: u8,
) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut previous = base.clone();
    for _ in 0..count {
        let mut draft = store.new_state_draft(&previous.l1_commitment()).unwrap();
        let counter = draft.state_index().int();
        draft.set(COUNTER_KEY.to_vec(), counter.to_le_bytes().to_vec());
        draft.set(b"fork".to_vec(), vec![fork]);
        let block = store.commit(draft).unwrap();
        blocks.push(block.clone());
        previous = block;
    }
    blocks
}

pub(crate) fn committee_address(tag: u8) -> CommitteeAddress {
    CommitteeAddress::new(CryptoHash::new([tag; 32]))
}

/// An anchor output of `committee` committing to `block`, created by a transaction identified by `tag`.
pub(crate) fn anchor_output(committee: CommitteeAddress, block: &Block, tag: u8) -> AnchorOutput {
    AnchorOutput::new(
        OutputID::new(TransactionID::new(CryptoHash::new([tag; 32])), 0),
        committee,
        block.state_index,
        block.l1_commitment(),
    )
}

pub(crate) fn off_ledger_request(sender: NodeID, nonce: u64) -> Request {
    Request::OffLedger(OffLedgerRequest {
        chain_id: CHAIN_ID,
        sender,
        nonce,
        payload: nonce.to_le_bytes().to_vec(),
    })
}
