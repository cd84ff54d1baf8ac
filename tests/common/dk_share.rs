//! A stand-in for distributed threshold keys: every member signs with its own Ed25519 key, and a
//! "full signature" is `threshold` member signatures concatenated in share index order.

use std::{collections::HashMap, sync::Arc};

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};

use anchored_chain::{
    chain_manager::types::DKShareRegistry,
    consensus::collaborators::{DKShare, SigningError},
    types::{
        data_types::{CommitteeAddress, NodeID},
        transaction::{FullSignature, PartialSignature},
    },
};

pub(crate) struct MockDKShare {
    committee: CommitteeAddress,
    members: Vec<VerifyingKey>,
    share_index: u16,
    threshold: usize,
    signing_key: SigningKey,
}

/// The shares of every member of a committee made of `signing_keys`, in share index order.
pub(crate) fn committee_shares(
    committee: CommitteeAddress,
    signing_keys: &[SigningKey],
    threshold: usize,
) -> Vec<Arc<MockDKShare>> {
    let members: Vec<VerifyingKey> = signing_keys.iter().map(|key| key.verifying_key()).collect();
    signing_keys
        .iter()
        .enumerate()
        .map(|(share_index, signing_key)| {
            Arc::new(MockDKShare {
                committee,
                members: members.clone(),
                share_index: share_index as u16,
                threshold,
                signing_key: signing_key.clone(),
            })
        })
        .collect()
}

impl DKShare for MockDKShare {
    fn committee_address(&self) -> CommitteeAddress {
        self.committee
    }

    fn committee_nodes(&self) -> Vec<NodeID> {
        self.members.iter().map(NodeID::from).collect()
    }

    fn share_index(&self) -> u16 {
        self.share_index
    }

    fn threshold(&self) -> usize {
        self.threshold
    }

    fn sign_partial(&self, payload: &[u8]) -> Result<PartialSignature, SigningError> {
        Ok(PartialSignature {
            share_index: self.share_index,
            bytes: self.signing_key.sign(payload).to_bytes().to_vec(),
        })
    }

    fn verify_partial(
        &self,
        payload: &[u8],
        partial: &PartialSignature,
    ) -> Result<(), SigningError> {
        let member = self
            .members
            .get(partial.share_index as usize)
            .ok_or(SigningError::UnknownShareIndex {
                share_index: partial.share_index,
            })?;
        let invalid = SigningError::InvalidPartialSignature {
            share_index: partial.share_index,
        };
        let signature = Signature::from_slice(&partial.bytes).map_err(|_| invalid.clone())?;
        member.verify(payload, &signature).map_err(|_| invalid)
    }

    fn recover_full(
        &self,
        payload: &[u8],
        partials: &[PartialSignature],
    ) -> Result<FullSignature, SigningError> {
        let mut valid: Vec<&PartialSignature> = partials
            .iter()
            .filter(|partial| self.verify_partial(payload, partial).is_ok())
            .collect();
        valid.sort_by_key(|partial| partial.share_index);
        valid.dedup_by_key(|partial| partial.share_index);
        if valid.len() < self.threshold {
            return Err(SigningError::NotEnoughPartialSignatures {
                have: valid.len(),
                need: self.threshold,
            });
        }
        Ok(FullSignature(
            valid
                .into_iter()
                .take(self.threshold)
                .flat_map(|partial| partial.bytes.clone())
                .collect(),
        ))
    }
}

/// The shares one node holds, by committee.
#[derive(Default)]
pub(crate) struct MockDKRegistry {
    shares: HashMap<CommitteeAddress, Arc<dyn DKShare>>,
}

impl MockDKRegistry {
    pub(crate) fn new() -> MockDKRegistry {
        MockDKRegistry::default()
    }

    pub(crate) fn with(mut self, share: Arc<MockDKShare>) -> MockDKRegistry {
        self.shares
            .insert(share.committee_address(), share as Arc<dyn DKShare>);
        self
    }
}

impl DKShareRegistry for MockDKRegistry {
    fn dk_share(&self, committee: &CommitteeAddress) -> Option<Arc<dyn DKShare>> {
        self.shares.get(committee).cloned()
    }
}
