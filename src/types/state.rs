/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The key-value chain state and the mutations that move it forward.

use std::collections::{BTreeMap, BTreeSet};

use borsh::{BorshDeserialize, BorshSerialize};

use super::{
    crypto_primitives::hash_borsh,
    data_types::{StateIndex, TrieRoot},
};

/// A snapshot of the chain's key-value state at a given [`StateIndex`].
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct ChainState {
    state_index: StateIndex,
    kvs: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl ChainState {
    pub fn new(state_index: StateIndex, kvs: BTreeMap<Vec<u8>, Vec<u8>>) -> ChainState {
        ChainState { state_index, kvs }
    }

    pub fn state_index(&self) -> StateIndex {
        self.state_index
    }

    pub fn get(&self, key: &[u8]) -> Option<&Vec<u8>> {
        self.kvs.get(key)
    }

    pub fn kvs(&self) -> &BTreeMap<Vec<u8>, Vec<u8>> {
        &self.kvs
    }

    /// Root hash over the state index and every key-value pair, in key order.
    pub fn trie_root(&self) -> TrieRoot {
        TrieRoot::new(hash_borsh(b"trie_root", &(self.state_index, &self.kvs)))
    }
}

/// Key-value updates of one block. The last of `set` and `del` called on a key wins.
#[derive(Clone, Debug, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Mutations {
    pub(crate) sets: BTreeMap<Vec<u8>, Vec<u8>>,
    pub(crate) dels: BTreeSet<Vec<u8>>,
}

impl Mutations {
    pub fn new() -> Mutations {
        Mutations::default()
    }

    pub fn set(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.dels.remove(&key);
        self.sets.insert(key, value);
    }

    pub fn del(&mut self, key: Vec<u8>) {
        self.sets.remove(&key);
        self.dels.insert(key);
    }

    pub fn sets(&self) -> impl Iterator<Item = (&Vec<u8>, &Vec<u8>)> {
        self.sets.iter()
    }

    pub fn dels(&self) -> impl Iterator<Item = &Vec<u8>> {
        self.dels.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty() && self.dels.is_empty()
    }

    pub fn apply_to(&self, kvs: &mut BTreeMap<Vec<u8>, Vec<u8>>) {
        for (key, value) in &self.sets {
            kvs.insert(key.clone(), value.clone());
        }
        for key in &self.dels {
            kvs.remove(key);
        }
    }
}
