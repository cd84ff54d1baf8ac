/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

use crate::types::data_types::NodeID;

use super::messages::Message;

pub trait Network: Clone + Send {
    /// Inform the network provider of the nodes the node exchanges messages with, for example after a
    /// committee rotation.
    fn update_peers(&mut self, peers: Vec<NodeID>);

    /// Send a message to the specified peer without blocking.
    fn send(&mut self, peer: NodeID, message: Message);

    /// Receive a message from any peer. Returns immediately with a None if no message is available now.
    fn recv(&mut self) -> Option<(NodeID, Message)>;
}
