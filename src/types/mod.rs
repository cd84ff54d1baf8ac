//! Types that are used across multiple components of the engine.
//!
//! Types specific to a single component live in that component's own module, e.g.,
//! [`crate::state_manager::messages`].

pub mod anchor_output;

pub mod block;

pub mod cancellation;

pub mod crypto_primitives;

pub mod data_types;

pub mod request;

pub mod state;

pub mod transaction;
