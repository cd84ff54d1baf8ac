/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The automaton contract shared by every protocol component of the engine.
//!
//! # Automatons
//!
//! The [state manager](crate::state_manager), the [distribution sync](crate::mempool::dist_sync),
//! [consensus sessions](crate::consensus) and the [chain manager](crate::chain_manager) are all
//! [`Automaton`]s: deterministic state machines that move forward only when they are handed either a
//! local [`Input`](Automaton::Input) or a [`Message`](Automaton::Message) from a peer. Each call
//! returns the batch of messages ([`OutMessages`]) the automaton wants delivered to peers.
//!
//! Automatons never block and never spawn work. Anything slow (VM execution, signing, L1 publication)
//! is announced through the automaton's [`Output`](Automaton::Output), carried out by the caller, and
//! fed back in as a later input. This makes every automaton testable in isolation by simply calling
//! it.
//!
//! # Reliable delivery
//!
//! Peer transport is unreliable. The [`AckHandler`](ack::AckHandler) wraps an automaton, numbering
//! each outgoing message and redelivering it periodically until the recipient acknowledges it.
//! Delivery becomes at-least-once, so every automaton's message handlers must be idempotent.

pub mod ack;

pub mod automaton;

pub use automaton::{Automaton, Never, OutMessage, OutMessages, Respond};
