/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions for the 'block' type, the 'state draft' type it is produced from, and their associated
//! methods.
//!
//! A [`Block`] is an immutable, hash-linked unit of state mutations. Each block points to the
//! [`L1Commitment`] of the state it was applied on top of, forming a singly-linked chain back to the
//! origin block, whose `previous_l1_commitment` is `None`.

use std::collections::BTreeMap;

use borsh::{BorshDeserialize, BorshSerialize};

use super::{
    crypto_primitives::hash_borsh,
    data_types::{BlockHash, L1Commitment, StateIndex, TrieRoot},
    state::{ChainState, Mutations},
};

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Block {
    pub previous_l1_commitment: Option<L1Commitment>,
    pub state_index: StateIndex,
    pub mutations: Mutations,
    pub trie_root: TrieRoot,
    pub hash: BlockHash,
}

impl Block {
    pub fn new(
        previous_l1_commitment: Option<L1Commitment>,
        state_index: StateIndex,
        mutations: Mutations,
        trie_root: TrieRoot,
    ) -> Block {
        Block {
            hash: Block::hash(&previous_l1_commitment, state_index, &mutations, &trie_root),
            previous_l1_commitment,
            state_index,
            mutations,
            trie_root,
        }
    }

    pub fn hash(
        previous_l1_commitment: &Option<L1Commitment>,
        state_index: StateIndex,
        mutations: &Mutations,
        trie_root: &TrieRoot,
    ) -> BlockHash {
        BlockHash::new(hash_borsh(
            b"block",
            &(previous_l1_commitment, state_index, mutations, trie_root),
        ))
    }

    /// Get the commitment to the state this block produces.
    pub fn l1_commitment(&self) -> L1Commitment {
        L1Commitment::new(self.trie_root, self.hash)
    }

    /// Checks whether the stored hash matches the block's content.
    pub fn is_correct(&self) -> bool {
        self.hash
            == Block::hash(
                &self.previous_l1_commitment,
                self.state_index,
                &self.mutations,
                &self.trie_root,
            )
    }

    pub fn is_origin(&self) -> bool {
        self.previous_l1_commitment.is_none()
    }
}

/// A set of mutations being prepared on top of a base state, not yet committed into a [`Block`].
///
/// The VM produces a `StateDraft` when executing a batch of requests. Committing the draft (see
/// [`Store::commit`](crate::store::Store::commit)) turns it into a block. Since the resulting block is
/// a pure function of the draft, committing the same draft twice yields the same
/// [`L1Commitment`].
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct StateDraft {
    base_l1_commitment: Option<L1Commitment>,
    state_index: StateIndex,
    base_kvs: BTreeMap<Vec<u8>, Vec<u8>>,
    mutations: Mutations,
}

impl StateDraft {
    /// Create a draft on top of `base_state`, whose commitment is `base_l1_commitment`.
    pub fn new(base_l1_commitment: L1Commitment, base_state: &ChainState) -> StateDraft {
        StateDraft {
            base_l1_commitment: Some(base_l1_commitment),
            state_index: base_state.state_index() + 1,
            base_kvs: base_state.kvs().clone(),
            mutations: Mutations::new(),
        }
    }

    /// Create the draft of the origin state, containing `initial_kvs`.
    pub fn origin(initial_kvs: BTreeMap<Vec<u8>, Vec<u8>>) -> StateDraft {
        let mut mutations = Mutations::new();
        initial_kvs
            .into_iter()
            .for_each(|(key, value)| mutations.set(key, value));
        StateDraft {
            base_l1_commitment: None,
            state_index: StateIndex::new(0),
            base_kvs: BTreeMap::new(),
            mutations,
        }
    }

    pub fn base_l1_commitment(&self) -> Option<L1Commitment> {
        self.base_l1_commitment
    }

    pub fn state_index(&self) -> StateIndex {
        self.state_index
    }

    pub fn mutations(&self) -> &Mutations {
        &self.mutations
    }

    /// Read a key, seeing the draft's own mutations on top of the base state.
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        if self.mutations.dels.contains(key) {
            return None;
        }
        self.mutations
            .sets
            .get(key)
            .or_else(|| self.base_kvs.get(key))
            .cloned()
    }

    pub fn set(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.mutations.set(key, value)
    }

    pub fn del(&mut self, key: Vec<u8>) {
        self.mutations.del(key)
    }

    /// Replace the draft's mutations wholesale, e.g., with those of a block received from a peer.
    pub(crate) fn with_mutations(mut self, mutations: Mutations) -> StateDraft {
        self.mutations = mutations;
        self
    }

    /// The state this draft produces once committed.
    pub fn resulting_state(&self) -> ChainState {
        let mut kvs = self.base_kvs.clone();
        self.mutations.apply_to(&mut kvs);
        ChainState::new(self.state_index, kvs)
    }

    /// The block this draft produces once committed.
    pub fn resulting_block(&self) -> Block {
        let state = self.resulting_state();
        Block::new(
            self.base_l1_commitment,
            self.state_index,
            self.mutations.clone(),
            state.trie_root(),
        )
    }

    pub fn resulting_l1_commitment(&self) -> L1Commitment {
        self.resulting_block().l1_commitment()
    }
}
