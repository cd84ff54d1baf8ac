/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The durable block store.
//!
//! [`Store`] is the interface the engine uses for persistence: block and state lookup by trie root,
//! committing [state drafts](crate::types::block::StateDraft), and a "latest" pointer. All calls are
//! synchronous. [`BlockStore`] implements it on top of any user-provided [`KVStore`].
//!
//! ## Idempotent commit
//!
//! Committing is a pure function of the draft. Committing a draft whose block is already stored is a
//! no-op that returns the stored block, which makes it safe for the state manager and a consensus
//! session to commit the same block independently. If the stored block for the same trie root has a
//! different commitment, an invariant has been violated and [`Store::commit`] panics.

use borsh::BorshSerialize;

use crate::types::{
    block::{Block, StateDraft},
    data_types::{L1Commitment, TrieRoot},
    state::ChainState,
};

use super::{
    pluggables::{KVGetError, KVStore, WriteBatch},
    variables::{self, concat},
};

pub trait Store: Send {
    /// Whether the state with `trie_root` is stored.
    fn has_trie_root(&self, trie_root: &TrieRoot) -> bool;

    fn block_by_trie_root(&self, trie_root: &TrieRoot) -> Result<Option<Block>, StoreError>;

    fn state_by_trie_root(&self, trie_root: &TrieRoot) -> Result<Option<ChainState>, StoreError>;

    /// Create an empty draft on top of the stored state `base`.
    fn new_state_draft(&self, base: &L1Commitment) -> Result<StateDraft, StoreError>;

    /// Persist the block and the state `draft` produces, returning the block.
    fn commit(&mut self, draft: StateDraft) -> Result<Block, StoreError>;

    fn latest_block(&self) -> Result<Option<Block>, StoreError>;

    fn set_latest(&mut self, trie_root: &TrieRoot) -> Result<(), StoreError>;
}

#[derive(Debug)]
pub enum StoreError {
    KVGetError(KVGetError),
    StateNotFound { trie_root: TrieRoot },
    BlockNotFound { trie_root: TrieRoot },
}

impl From<KVGetError> for StoreError {
    fn from(value: KVGetError) -> Self {
        StoreError::KVGetError(value)
    }
}

/// A [`Store`] that keeps blocks and states Borsh-serialized in a [`KVStore`].
#[derive(Clone)]
pub struct BlockStore<K: KVStore> {
    kv_store: K,
}

impl<K: KVStore> BlockStore<K> {
    pub fn new(kv_store: K) -> Self {
        Self { kv_store }
    }

    /// Commit the origin block holding `initial_kvs` and make it the latest. Returns the origin block.
    pub fn initialize(
        &mut self,
        initial_kvs: std::collections::BTreeMap<Vec<u8>, Vec<u8>>,
    ) -> Result<Block, StoreError> {
        let origin = self.commit(StateDraft::origin(initial_kvs))?;
        self.set_latest(&origin.trie_root)?;
        Ok(origin)
    }

    pub fn kv_store(&self) -> &K {
        &self.kv_store
    }
}

impl<K: KVStore> Store for BlockStore<K> {
    fn has_trie_root(&self, trie_root: &TrieRoot) -> bool {
        self.kv_store.contains_state(trie_root)
    }

    fn block_by_trie_root(&self, trie_root: &TrieRoot) -> Result<Option<Block>, StoreError> {
        Ok(self.kv_store.block(trie_root)?)
    }

    fn state_by_trie_root(&self, trie_root: &TrieRoot) -> Result<Option<ChainState>, StoreError> {
        Ok(self.kv_store.state(trie_root)?)
    }

    fn new_state_draft(&self, base: &L1Commitment) -> Result<StateDraft, StoreError> {
        let base_state =
            self.kv_store
                .state(&base.trie_root)?
                .ok_or(StoreError::StateNotFound {
                    trie_root: base.trie_root,
                })?;
        Ok(StateDraft::new(*base, &base_state))
    }

    fn commit(&mut self, draft: StateDraft) -> Result<Block, StoreError> {
        let block = draft.resulting_block();

        // 1. Committing an already stored block is a no-op.
        if let Some(stored) = self.kv_store.block(&block.trie_root)? {
            if stored.l1_commitment() != block.l1_commitment() {
                panic!(
                    "Re-derived commitment {} differs from the stored commitment {} at state index {}",
                    block.l1_commitment(),
                    stored.l1_commitment(),
                    block.state_index
                );
            }
            return Ok(stored);
        }

        // 2. Blocks are only ever stored on top of their parent, keeping the stored chain contiguous.
        if let Some(base) = draft.base_l1_commitment() {
            if !self.kv_store.contains_state(&base.trie_root) {
                return Err(StoreError::StateNotFound {
                    trie_root: base.trie_root,
                });
            }
        }

        // 3. Write the block and the state it produces in one batch.
        let state = draft.resulting_state();
        let mut wb = K::WriteBatch::new();
        wb.set(
            &concat(&variables::BLOCKS, &block.trie_root.bytes()),
            &block.try_to_vec().unwrap(),
        );
        wb.set(
            &concat(&variables::STATES, &block.trie_root.bytes()),
            &state.try_to_vec().unwrap(),
        );
        self.kv_store.write(wb);

        Ok(block)
    }

    fn latest_block(&self) -> Result<Option<Block>, StoreError> {
        match self.kv_store.latest()? {
            Some(trie_root) => {
                let block = self
                    .kv_store
                    .block(&trie_root)?
                    .ok_or(StoreError::BlockNotFound { trie_root })?;
                Ok(Some(block))
            }
            None => Ok(None),
        }
    }

    fn set_latest(&mut self, trie_root: &TrieRoot) -> Result<(), StoreError> {
        if !self.kv_store.contains_state(trie_root) {
            return Err(StoreError::StateNotFound {
                trie_root: *trie_root,
            });
        }
        let mut wb = K::WriteBatch::new();
        wb.set(&variables::LATEST, &trie_root.try_to_vec().unwrap());
        self.kv_store.write(wb);
        Ok(())
    }
}
