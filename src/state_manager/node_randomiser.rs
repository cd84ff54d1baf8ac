/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

use crate::types::data_types::NodeID;

/// Picks random peers to query, never including the local node.
pub(crate) struct NodeRandomiser {
    me: NodeID,
    nodes: Vec<NodeID>,
    rng: StdRng,
}

impl NodeRandomiser {
    pub(crate) fn new(me: NodeID) -> Self {
        Self {
            me,
            nodes: Vec::new(),
            rng: StdRng::from_entropy(),
        }
    }

    pub(crate) fn update_nodes(&mut self, nodes: Vec<NodeID>) {
        self.nodes = nodes;
        self.nodes.retain(|node| *node != self.me);
        self.nodes.sort();
        self.nodes.dedup();
    }

    pub(crate) fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Pick up to `count` distinct peers. Peers in `avoid` are only picked when there are not enough
    /// other peers.
    pub(crate) fn random_other_nodes(&mut self, count: usize, avoid: &[NodeID]) -> Vec<NodeID> {
        let (mut preferred, mut avoided): (Vec<NodeID>, Vec<NodeID>) = self
            .nodes
            .iter()
            .copied()
            .partition(|node| !avoid.contains(node));
        preferred.shuffle(&mut self.rng);
        avoided.shuffle(&mut self.rng);
        preferred.extend(avoided);
        preferred.truncate(count);
        preferred
    }
}
