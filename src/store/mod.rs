//! Durable storage of blocks and chain states.
//!
//! The engine reads and writes persistent state only through the [`Store`] trait. [`BlockStore`]
//! implements it on top of a [pluggable](pluggables) key-value engine, laying out its
//! [variables](variables) as Borsh-serialized values.

pub mod block_store;

pub mod pluggables;

pub mod variables;

pub use block_store::{BlockStore, Store, StoreError};
