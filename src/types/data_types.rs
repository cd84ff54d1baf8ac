/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Types that exist only to store bytes or counters, and do not have any major "active" behavior.

use std::{
    fmt::{self, Debug, Display, Formatter},
    hash::Hash,
    ops::{Add, AddAssign},
};

use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};
use borsh::{BorshDeserialize, BorshSerialize};
use ed25519_dalek::VerifyingKey;

/// Number that uniquely identifies a chain.
///
/// All nodes that take part in running the same chain should be configured with the same `ChainID`.
/// It is mixed into transaction essences so that signatures for one chain can never be replayed on
/// another.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, BorshDeserialize, BorshSerialize)]
pub struct ChainID(u64);

impl ChainID {
    /// Create a new `ChainID` with an `int` value.
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    /// Get the `u64` value of this `ChainID`.
    pub const fn int(&self) -> u64 {
        self.0
    }
}

/// Position of a chain state in the chain's history.
///
/// The origin state has index 0. Every block increases the index by exactly 1, and every anchor output
/// carries the index of the state it commits to.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize,
)]
pub struct StateIndex(u32);

impl StateIndex {
    /// Create a new `StateIndex` with an `int` inner value.
    pub const fn new(int: u32) -> Self {
        Self(int)
    }

    /// Get the inner `u32` value of this `StateIndex`.
    pub const fn int(&self) -> u32 {
        self.0
    }

    /// Get the index of the state that precedes this one, or `None` if this is the origin.
    pub fn prev(&self) -> Option<StateIndex> {
        self.0.checked_sub(1).map(StateIndex)
    }
}

impl Display for StateIndex {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl Add<u32> for StateIndex {
    type Output = StateIndex;
    fn add(self, rhs: u32) -> Self::Output {
        StateIndex(self.0 + rhs)
    }
}

/// Per-committee round counter.
///
/// A committee address together with a `LogIndex` identifies exactly one consensus session. Log
/// indices of a committee only ever increase. `LogIndex::NIL` (0) is never used for a session.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize,
)]
pub struct LogIndex(u32);

impl LogIndex {
    pub const NIL: LogIndex = LogIndex(0);

    /// Create a new `LogIndex` with an `int` inner value.
    pub const fn new(int: u32) -> Self {
        Self(int)
    }

    /// Get the inner `u32` value of this `LogIndex`.
    pub const fn int(&self) -> u32 {
        self.0
    }

    /// Get the log index that follows this one.
    pub fn next(&self) -> LogIndex {
        LogIndex(self.0 + 1)
    }
}

impl Display for LogIndex {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl AddAssign<u32> for LogIndex {
    fn add_assign(&mut self, rhs: u32) {
        self.0.add_assign(rhs)
    }
}

/// 32-byte cryptographic hash.
///
/// Within this crate, every `CryptoHash` is a SHA256 hash produced with
/// [`CryptoHasher`](super::crypto_primitives::CryptoHasher).
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, BorshDeserialize, BorshSerialize,
)]
pub struct CryptoHash([u8; 32]);

impl CryptoHash {
    /// Create a new `CryptoHash` wrapping `bytes`.
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the inner `[u8; 32]` value of this `CryptoHash`.
    pub const fn bytes(&self) -> [u8; 32] {
        self.0
    }
}

impl Display for CryptoHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", short_base64(&self.0))
    }
}

impl Debug for CryptoHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "CryptoHash({})", short_base64(&self.0))
    }
}

/// Root hash of the key-value snapshot of a chain state.
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, BorshDeserialize, BorshSerialize,
)]
pub struct TrieRoot(CryptoHash);

impl TrieRoot {
    pub const fn new(hash: CryptoHash) -> Self {
        Self(hash)
    }

    pub const fn hash(&self) -> CryptoHash {
        self.0
    }

    pub const fn bytes(&self) -> [u8; 32] {
        self.0.bytes()
    }
}

impl Display for TrieRoot {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// Hash of a [`Block`](super::block::Block).
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, BorshDeserialize, BorshSerialize,
)]
pub struct BlockHash(CryptoHash);

impl BlockHash {
    pub const fn new(hash: CryptoHash) -> Self {
        Self(hash)
    }

    pub const fn hash(&self) -> CryptoHash {
        self.0
    }

    pub const fn bytes(&self) -> [u8; 32] {
        self.0.bytes()
    }
}

impl Display for BlockHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// Pair of hashes that binds a state snapshot to the block that produced it.
///
/// Two commitments are equal if and only if both components match.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, BorshDeserialize, BorshSerialize)]
pub struct L1Commitment {
    pub trie_root: TrieRoot,
    pub block_hash: BlockHash,
}

impl L1Commitment {
    pub const fn new(trie_root: TrieRoot, block_hash: BlockHash) -> Self {
        Self {
            trie_root,
            block_hash,
        }
    }
}

impl Display for L1Commitment {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.trie_root, self.block_hash)
    }
}

/// Identifier of an L1 transaction, computed as the hash of its
/// [essence](super::transaction::TransactionEssence).
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, BorshDeserialize, BorshSerialize,
)]
pub struct TransactionID(CryptoHash);

impl TransactionID {
    pub const fn new(hash: CryptoHash) -> Self {
        Self(hash)
    }

    pub const fn bytes(&self) -> [u8; 32] {
        self.0.bytes()
    }
}

impl Display for TransactionID {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// Identifier of an L1 output: the transaction that created it and the position of the output in
/// that transaction.
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, BorshDeserialize, BorshSerialize,
)]
pub struct OutputID {
    pub transaction: TransactionID,
    pub index: u16,
}

impl OutputID {
    pub const fn new(transaction: TransactionID, index: u16) -> Self {
        Self { transaction, index }
    }
}

impl Display for OutputID {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.transaction, self.index)
    }
}

/// L1 address controlled by the threshold key of a committee. An anchor output whose controlling
/// address changes signals a committee rotation.
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, BorshDeserialize, BorshSerialize,
)]
pub struct CommitteeAddress(CryptoHash);

impl CommitteeAddress {
    pub const fn new(hash: CryptoHash) -> Self {
        Self(hash)
    }

    pub const fn bytes(&self) -> [u8; 32] {
        self.0.bytes()
    }
}

impl Display for CommitteeAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// Identity of a node: the bytes of its Ed25519 verifying key.
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize,
)]
pub struct NodeID([u8; 32]);

impl NodeID {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub const fn bytes(&self) -> [u8; 32] {
        self.0
    }
}

impl From<VerifyingKey> for NodeID {
    fn from(value: VerifyingKey) -> Self {
        NodeID(value.to_bytes())
    }
}

impl From<&VerifyingKey> for NodeID {
    fn from(value: &VerifyingKey) -> Self {
        NodeID(value.to_bytes())
    }
}

impl Display for NodeID {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", short_base64(&self.0))
    }
}

impl Debug for NodeID {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "NodeID({})", short_base64(&self.0))
    }
}

// First seven characters of the Base64 encoding of `bytes`.
fn short_base64(bytes: &[u8]) -> String {
    let encoded = STANDARD_NO_PAD.encode(bytes);
    if encoded.len() > 7 {
        encoded[0..7].to_string()
    } else {
        encoded
    }
}
