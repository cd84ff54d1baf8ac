/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The [`Automaton`] trait and the [`OutMessages`] batch it produces.

use std::vec;

use crate::types::data_types::NodeID;

/// A deterministic, message-driven state machine.
///
/// Every implementor defines one closed enum for its inputs and one for its wire messages, so
/// handlers can match exhaustively.
pub trait Automaton {
    /// Local events fed in by the owner of the automaton.
    type Input;

    /// Messages exchanged with the same automaton on other nodes.
    type Message: Clone;

    /// Snapshot of the results the automaton exposes to its owner.
    type Output;

    /// Handle a local input.
    fn input(&mut self, input: Self::Input) -> OutMessages<Self::Message>;

    /// Handle a message received from the peer `origin`.
    fn message(&mut self, origin: NodeID, msg: Self::Message) -> OutMessages<Self::Message>;

    /// Current output, or `None` if the automaton has nothing to report yet.
    fn output(&self) -> Option<Self::Output>;

    /// One-line human readable description of the automaton's state, for diagnostics.
    fn status_string(&self) -> String;
}

/// Message type of automatons that never talk to peers.
#[derive(Clone, Debug)]
pub enum Never {}

/// Callback through which an automaton answers a request made through one of its inputs.
///
/// The owner typically supplies a closure that pushes the answer into its own event queue, so the
/// automaton never holds a reference back to whoever asked.
pub type Respond<T> = Box<dyn FnOnce(T) + Send>;

/// A message addressed to a single node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutMessage<M> {
    pub recipient: NodeID,
    pub message: M,
}

/// Ordered multiset of addressed messages.
///
/// Order is preserved within the batch, but nothing is guaranteed about the order in which different
/// recipients receive their messages.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutMessages<M>(Vec<OutMessage<M>>);

impl<M> OutMessages<M> {
    pub fn new() -> Self {
        OutMessages(Vec::new())
    }

    /// Add a message for `recipient`.
    pub fn add(&mut self, recipient: NodeID, message: M) -> &mut Self {
        self.0.push(OutMessage { recipient, message });
        self
    }

    /// Move every message in `other` to the end of this batch.
    pub fn append(&mut self, mut other: OutMessages<M>) -> &mut Self {
        self.0.append(&mut other.0);
        self
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, OutMessage<M>> {
        self.0.iter()
    }

    /// Convert every message, keeping recipients. Used to wrap the messages of an inner automaton.
    pub fn map<N>(self, mut f: impl FnMut(NodeID, M) -> N) -> OutMessages<N> {
        OutMessages(
            self.0
                .into_iter()
                .map(|OutMessage { recipient, message }| OutMessage {
                    recipient,
                    message: f(recipient, message),
                })
                .collect(),
        )
    }
}

impl<M: Clone> OutMessages<M> {
    /// Add a copy of `message` for each of `recipients`.
    pub fn broadcast<'a>(
        &mut self,
        recipients: impl IntoIterator<Item = &'a NodeID>,
        message: M,
    ) -> &mut Self {
        for recipient in recipients {
            self.0.push(OutMessage {
                recipient: *recipient,
                message: message.clone(),
            });
        }
        self
    }
}

impl<M> Default for OutMessages<M> {
    fn default() -> Self {
        OutMessages::new()
    }
}

impl<M> IntoIterator for OutMessages<M> {
    type Item = OutMessage<M>;
    type IntoIter = vec::IntoIter<OutMessage<M>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
