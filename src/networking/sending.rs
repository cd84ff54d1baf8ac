/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Functions and types for sending messages to the P2P network.

use crate::{gpa::OutMessages, types::data_types::NodeID};

use super::{messages::Message, network::Network};

/// Handle for sending messages to the [`Network`].
///
/// It can be used to send instances of any type that implement the [`Into<Message>`] trait.
#[derive(Clone)]
pub(crate) struct SenderHandle<N: Network> {
    network: N,
}

impl<N: Network> SenderHandle<N> {
    pub(crate) fn new(network: N) -> Self {
        Self { network }
    }

    pub(crate) fn send<S: Into<Message>>(&mut self, peer: NodeID, msg: S) {
        self.network.send(peer, msg.into())
    }

    /// Send every message in `msgs` to its recipient.
    pub(crate) fn send_all<S: Into<Message>>(&mut self, msgs: OutMessages<S>) {
        for out in msgs {
            self.send(out.recipient, out.message);
        }
    }

    pub(crate) fn update_peers(&mut self, peers: Vec<NodeID>) {
        self.network.update_peers(peers)
    }
}
