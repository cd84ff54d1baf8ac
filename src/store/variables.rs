/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Byte-prefixes that specify where each block store variable is stored in the user-provided key-value
//! store.
//!
//! # List of variables
//!
//! |Variable|Type|Description|
//! |---|---|---|
//! |Blocks|[`TrieRoot`](crate::types::data_types::TrieRoot) -> [`Block`](crate::types::block::Block)|Mapping between the trie root a block produces and the block itself.|
//! |States|[`TrieRoot`](crate::types::data_types::TrieRoot) -> [`ChainState`](crate::types::state::ChainState)|Mapping between a trie root and the state snapshot it is the root of.|
//! |Latest|[`TrieRoot`](crate::types::data_types::TrieRoot)|The trie root of the state most recently marked as latest.|
//!
//! # Persistence
//!
//! Every value is stored **Borsh-serialized**. Mappings are stored under keys formed by concatenating
//! the variable's one-byte prefix with the 32 bytes of the trie root. Single values are stored under
//! their one-byte prefix alone.

pub const BLOCKS: [u8; 1] = [0];
pub const STATES: [u8; 1] = [1];
pub const LATEST: [u8; 1] = [2];

/// Takes references to two byteslices and returns a vector containing the bytes of the first one, and
/// then the bytes of the second one.
pub fn concat(a: &[u8], b: &[u8]) -> Vec<u8> {
    let mut res = Vec::with_capacity(a.len() + b.len());
    res.extend_from_slice(a);
    res.extend_from_slice(b);
    res
}
