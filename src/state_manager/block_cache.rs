/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

use std::{
    collections::{HashMap, VecDeque},
    time::Instant,
};

use crate::types::{
    block::Block,
    data_types::{BlockHash, L1Commitment},
};

/// Bounded in-memory cache of recently seen blocks.
///
/// Blocks are evicted oldest first, either because the cache is full or because they have been in the
/// cache for longer than the retention window (see [`clean_older_than`](Self::clean_older_than)).
pub(crate) struct BlockCache {
    blocks: HashMap<BlockHash, Block>,
    added: VecDeque<(Instant, BlockHash)>,
    max_size: usize,
}

impl BlockCache {
    pub(crate) fn new(max_size: usize) -> Self {
        Self {
            blocks: HashMap::new(),
            added: VecDeque::new(),
            max_size,
        }
    }

    pub(crate) fn add_block(&mut self, block: Block) {
        if self.blocks.contains_key(&block.hash) {
            return;
        }
        self.added.push_back((Instant::now(), block.hash));
        self.blocks.insert(block.hash, block);

        while self.blocks.len() > self.max_size {
            match self.added.pop_front() {
                Some((_, hash)) => {
                    self.blocks.remove(&hash);
                }
                None => break,
            }
        }
    }

    /// Get the block that produced the state `l1_commitment` commits to.
    pub(crate) fn get_block(&self, l1_commitment: &L1Commitment) -> Option<Block> {
        self.blocks
            .get(&l1_commitment.block_hash)
            .filter(|block| block.trie_root == l1_commitment.trie_root)
            .cloned()
    }

    /// Evict every block added before `limit`.
    pub(crate) fn clean_older_than(&mut self, limit: Instant) {
        while let Some((added_at, hash)) = self.added.front() {
            if *added_at >= limit {
                break;
            }
            self.blocks.remove(hash);
            self.added.pop_front();
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.blocks.len()
    }
}
