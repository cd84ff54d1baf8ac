/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Cryptographic primitives.
//!
//! The definitions and re-exports in this module provide two categories of cryptographic primitives:
//! 1. **Cryptographic Hashes**: provided by the [`sha2`] crate.
//! 2. **Digital Signatures**: provided by the [`ed25519_dalek`] crate. These identify nodes. Threshold
//!    signing of transactions is the business of the DK share collaborator and is not done here.

use borsh::BorshSerialize;

use super::data_types::{CryptoHash, NodeID};

// re-exports below.
pub use sha2::Digest;
pub use sha2::Sha256 as CryptoHasher;

pub use ed25519_dalek::{Signature, SignatureError, Signer, SigningKey, Verifier, VerifyingKey};

/// A facade around [`SigningKey`] that implements method for [`sign`](Self::sign)-ing messages as well
/// as getters for the [`public`](Self::public) key and [`NodeID`] associated with the signing key.
#[derive(Clone)]
pub struct Keypair(SigningKey);

impl Keypair {
    /// Create a `Keypair` that wraps over `signing_key`.
    pub fn new(signing_key: SigningKey) -> Keypair {
        Keypair(signing_key)
    }

    /// Sign an arbitrary `message` with the `Keypair`.
    pub fn sign(&self, message: &[u8]) -> Signature {
        self.0.sign(message)
    }

    /// Get the `VerifyingKey` of this `Keypair`.
    pub fn public(&self) -> VerifyingKey {
        self.0.verifying_key()
    }

    /// Get the identity other nodes know this `Keypair`'s owner by.
    pub fn node_id(&self) -> NodeID {
        NodeID::from(self.0.verifying_key())
    }
}

/// Hash the Borsh serialization of `value`, prefixed with a `domain` separator so that equal bytes
/// hashed for different purposes yield different hashes.
pub fn hash_borsh<T: BorshSerialize>(domain: &[u8], value: &T) -> CryptoHash {
    let mut hasher = CryptoHasher::new();
    hasher.update(domain);
    // Serializing into a Vec cannot fail.
    hasher.update(&value.try_to_vec().unwrap());
    CryptoHash::new(hasher.finalize().into())
}
