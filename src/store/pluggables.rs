/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Traits for pluggable block store persistence.
//!
//! Library users provide the key-value engine by implementing [`KVStore`]. The typed getters on
//! [`KVGet`] decode the [variables](super::variables) the [`BlockStore`](super::BlockStore) writes.

use std::fmt::Display;

use borsh::BorshDeserialize;

use crate::types::{block::Block, data_types::TrieRoot, state::ChainState};

use super::variables::{self, concat};

pub trait KVStore: KVGet + Clone + Send + 'static {
    type WriteBatch: WriteBatch;

    fn write(&mut self, wb: Self::WriteBatch);
    fn clear(&mut self);
}

pub trait KVGet {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>>;

    /* ↓↓↓ Blocks ↓↓↓ */

    fn block(&self, trie_root: &TrieRoot) -> Result<Option<Block>, KVGetError> {
        if let Some(bytes) = self.get(&concat(&variables::BLOCKS, &trie_root.bytes())) {
            let block = Block::deserialize(&mut bytes.as_slice()).map_err(|err| {
                KVGetError::DeserializeValueError {
                    key: Key::Block {
                        trie_root: *trie_root,
                    },
                    source: err,
                }
            })?;
            Ok(Some(block))
        } else {
            Ok(None)
        }
    }

    /* ↓↓↓ States ↓↓↓ */

    fn state(&self, trie_root: &TrieRoot) -> Result<Option<ChainState>, KVGetError> {
        if let Some(bytes) = self.get(&concat(&variables::STATES, &trie_root.bytes())) {
            let state = ChainState::deserialize(&mut bytes.as_slice()).map_err(|err| {
                KVGetError::DeserializeValueError {
                    key: Key::State {
                        trie_root: *trie_root,
                    },
                    source: err,
                }
            })?;
            Ok(Some(state))
        } else {
            Ok(None)
        }
    }

    fn contains_state(&self, trie_root: &TrieRoot) -> bool {
        self.get(&concat(&variables::STATES, &trie_root.bytes()))
            .is_some()
    }

    /* ↓↓↓ Latest ↓↓↓ */

    fn latest(&self) -> Result<Option<TrieRoot>, KVGetError> {
        if let Some(bytes) = self.get(&variables::LATEST) {
            let trie_root = TrieRoot::deserialize(&mut bytes.as_slice()).map_err(|err| {
                KVGetError::DeserializeValueError {
                    key: Key::Latest,
                    source: err,
                }
            })?;
            Ok(Some(trie_root))
        } else {
            Ok(None)
        }
    }
}

pub trait WriteBatch {
    fn new() -> Self;
    fn set(&mut self, key: &[u8], value: &[u8]);
    fn delete(&mut self, key: &[u8]);
}

/// Error when trying to read a value corresponding to a given key from the [key value store][KVStore].
#[derive(Debug)]
pub enum KVGetError {
    DeserializeValueError { key: Key, source: std::io::Error },
}

#[derive(Debug)]
pub enum Key {
    Block { trie_root: TrieRoot },
    State { trie_root: TrieRoot },
    Latest,
}

impl Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Key::Block { trie_root } => write!(f, "Block for trie root {}", trie_root),
            Key::State { trie_root } => write!(f, "State for trie root {}", trie_root),
            Key::Latest => write!(f, "Latest"),
        }
    }
}
