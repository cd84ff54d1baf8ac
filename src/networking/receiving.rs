/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Functions for receiving messages from the P2P network.

use std::{
    sync::mpsc::{self, Receiver, TryRecvError},
    thread::{self, JoinHandle},
};

use crate::types::data_types::NodeID;

use super::{messages::Message, network::Network};

/// Spawn the poller thread, which polls the [`Network`] for messages and passes them on to the
/// driver through the returned receiver.
pub(crate) fn start_polling<N: Network + 'static>(
    mut network: N,
    shutdown_signal: Receiver<()>,
) -> (JoinHandle<()>, Receiver<(NodeID, Message)>) {
    let (to_driver, from_poller) = mpsc::channel();

    let poller_thread = thread::spawn(move || loop {
        match shutdown_signal.try_recv() {
            Ok(()) => return,
            Err(TryRecvError::Empty) => (),
            Err(TryRecvError::Disconnected) => {
                panic!("Poller thread disconnected from main thread")
            }
        }

        if let Some((origin, msg)) = network.recv() {
            // The driver only stops receiving while the node shuts down.
            let _ = to_driver.send((origin, msg));
        } else {
            thread::yield_now()
        }
    });
    (poller_thread, from_poller)
}
