//! A set of automatons of the same kind, one per node, exchanging messages in memory.

use std::collections::VecDeque;

use anchored_chain::{
    gpa::{Automaton, OutMessages},
    types::data_types::NodeID,
};

pub(crate) struct TestContext<A: Automaton> {
    nodes: Vec<NodeID>,
    automatons: Vec<A>,
    // Whether a message from the first node to the second is lost.
    lost: Box<dyn Fn(NodeID, NodeID) -> bool>,
    delivered: usize,
    dropped: usize,
}

impl<A: Automaton> TestContext<A> {
    /// `automatons[i]` runs on `nodes[i]`.
    pub(crate) fn new(nodes: Vec<NodeID>, automatons: Vec<A>) -> TestContext<A> {
        assert_eq!(nodes.len(), automatons.len());
        TestContext {
            nodes,
            automatons,
            lost: Box::new(|_, _| false),
            delivered: 0,
            dropped: 0,
        }
    }

    /// Lose every message for which `lost(sender, recipient)` holds.
    pub(crate) fn with_message_loss(
        mut self,
        lost: impl Fn(NodeID, NodeID) -> bool + 'static,
    ) -> TestContext<A> {
        self.lost = Box::new(lost);
        self
    }

    pub(crate) fn node(&self, index: usize) -> &A {
        &self.automatons[index]
    }

    pub(crate) fn automatons(&self) -> &[A] {
        &self.automatons
    }

    /// Messages delivered since the context was created.
    pub(crate) fn delivered(&self) -> usize {
        self.delivered
    }

    /// Messages lost since the context was created.
    pub(crate) fn dropped(&self) -> usize {
        self.dropped
    }

    /// Feed `input` to the automaton of `nodes[index]`, and run until no messages are left.
    pub(crate) fn input(&mut self, index: usize, input: A::Input) {
        let out = self.automatons[index].input(input);
        self.run_to_quiescence(index, out);
    }

    /// Deliver `out`, sent by `nodes[sender]`, and every message it causes, until no messages are
    /// left.
    pub(crate) fn run_to_quiescence(&mut self, sender: usize, out: OutMessages<A::Message>) {
        let mut queue: VecDeque<(NodeID, OutMessages<A::Message>)> = VecDeque::new();
        queue.push_back((self.nodes[sender], out));
        while let Some((origin, out)) = queue.pop_front() {
            for msg in out {
                if (self.lost)(origin, msg.recipient) {
                    self.dropped += 1;
                    continue;
                }
                let recipient = self
                    .nodes
                    .iter()
                    .position(|node| *node == msg.recipient)
                    .unwrap();
                self.delivered += 1;
                let out = self.automatons[recipient].message(origin, msg.message);
                queue.push_back((msg.recipient, out));
            }
        }
    }
}
