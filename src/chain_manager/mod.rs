/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Bookkeeping of log indices and anchor outputs, which decides what the node's consensus sessions
//! and L1 client work on.
//!
//! ## Confirmed anchor outputs
//!
//! The anchor output with the highest state index is the latest confirmed one. An output with a lower
//! state index is stale and ignored. Two different outputs with the same state index mean L1 is
//! inconsistent, which is fatal.
//!
//! The committee controlling the latest confirmed output is the active one. When it changes, the
//! new committee's log starts at the log index after the last one it ever used (1 for a committee
//! seen for the first time), and every publishing obligation of the previous committee is dropped.
//!
//! ## Pipelining
//!
//! When a session outputs a signed transaction, the transaction has to be published, and the next
//! session is started right away on the anchor output the transaction will produce. At most
//! [`pipelining_limit`](types::ChainManagerConfiguration::pipelining_limit) such prospective
//! outputs are built on before they are confirmed.
//!
//! A confirmed output that is none of the prospective ones abandons all of them: the log moves on to
//! the next log index, based on the confirmed output. The same happens when L1 rejects a published
//! transaction.

pub mod types;

pub mod committee_log;

mod implementation;
pub use implementation::ChainManager;
