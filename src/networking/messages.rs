/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Exhaustive enumeration of the messages nodes of a chain exchange.

use borsh::{BorshDeserialize, BorshSerialize};

use crate::{
    consensus::messages::ConsensusMessage,
    gpa::ack::AckMessage,
    mempool::messages::DistSyncMessage,
    state_manager::messages::StateManagerMessage,
    types::data_types::{CommitteeAddress, LogIndex},
};

/// All message variants sent between nodes.
#[derive(Clone, Debug, BorshSerialize, BorshDeserialize)]
pub enum Message {
    /// See: [`StateManagerMessage`].
    StateManager(StateManagerMessage),

    /// See: [`DistSyncMessage`].
    DistSync(DistSyncMessage),

    /// See: [`SessionMessage`].
    Session(SessionMessage),
}

/// A [`ConsensusMessage`] wrapped by the ack layer, addressed to the session `log_index` of
/// `committee`.
#[derive(Clone, Debug, BorshSerialize, BorshDeserialize)]
pub struct SessionMessage {
    pub committee: CommitteeAddress,
    pub log_index: LogIndex,
    pub message: AckMessage<ConsensusMessage>,
}

impl From<StateManagerMessage> for Message {
    fn from(value: StateManagerMessage) -> Self {
        Message::StateManager(value)
    }
}

impl From<DistSyncMessage> for Message {
    fn from(value: DistSyncMessage) -> Self {
        Message::DistSync(value)
    }
}

impl From<SessionMessage> for Message {
    fn from(value: SessionMessage) -> Self {
        Message::Session(value)
    }
}
