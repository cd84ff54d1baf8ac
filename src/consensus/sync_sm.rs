/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! What a session needs from the state manager, and what it got.

use crate::types::{
    anchor_output::AnchorOutput,
    block::{Block, StateDraft},
    state::ChainState,
};

/// One-shot latches for the three things a session asks the state manager for. Repeated answers are
/// ignored.
#[derive(Default)]
pub(crate) struct SyncSM {
    proposal_base: Option<AnchorOutput>,
    proposal_confirmed: bool,
    decided_base: Option<AnchorOutput>,
    decided_state: Option<ChainState>,
    block_draft: Option<StateDraft>,
    saved_block: Option<Block>,
}

impl SyncSM {
    pub(crate) fn base_anchor_output(&mut self, base: AnchorOutput) {
        if self.proposal_base.as_ref() != Some(&base) {
            self.proposal_confirmed = false;
        }
        self.proposal_base = Some(base);
    }

    /// Record that the proposal base is available. Returns whether it was not confirmed before.
    pub(crate) fn proposal_confirmed(&mut self) -> bool {
        if self.proposal_base.is_none() || self.proposal_confirmed {
            return false;
        }
        self.proposal_confirmed = true;
        true
    }

    pub(crate) fn base_decided(&mut self, base: AnchorOutput) {
        if self.decided_base.as_ref() != Some(&base) {
            self.decided_state = None;
        }
        self.decided_base = Some(base);
    }

    /// Record the decided state. Returns whether it is the first one, and is the decided one.
    pub(crate) fn decided_state_received(&mut self, state: ChainState) -> bool {
        let decided_base = match (&self.decided_base, &self.decided_state) {
            (Some(decided_base), None) => decided_base,
            _ => return false,
        };
        if state.trie_root() != decided_base.l1_commitment.trie_root {
            log::warn!(
                "State manager responded with a state other than the one of {}, ignoring it.",
                decided_base
            );
            return false;
        }
        self.decided_state = Some(state);
        true
    }

    pub(crate) fn block_produced(&mut self, draft: StateDraft) {
        if self.block_draft.is_none() {
            self.block_draft = Some(draft);
        }
    }

    /// Record the saved block. Returns whether it is the first one, and is the produced one.
    pub(crate) fn block_saved(&mut self, block: Block) -> bool {
        let draft = match (&self.block_draft, &self.saved_block) {
            (Some(draft), None) => draft,
            _ => return false,
        };
        if draft.resulting_l1_commitment() != block.l1_commitment() {
            log::warn!("Saved block {} is not the produced one, ignoring it.", block.l1_commitment());
            return false;
        }
        self.saved_block = Some(block);
        true
    }

    pub(crate) fn proposal_needed(&self) -> Option<&AnchorOutput> {
        match self.proposal_confirmed {
            false => self.proposal_base.as_ref(),
            true => None,
        }
    }

    pub(crate) fn decided_state_needed(&self) -> Option<&AnchorOutput> {
        match self.decided_state {
            None => self.decided_base.as_ref(),
            Some(_) => None,
        }
    }

    pub(crate) fn block_save_needed(&self) -> Option<&StateDraft> {
        match self.saved_block {
            None => self.block_draft.as_ref(),
            Some(_) => None,
        }
    }

    pub(crate) fn is_proposal_confirmed(&self) -> bool {
        self.proposal_confirmed
    }

    pub(crate) fn decided_state(&self) -> Option<&ChainState> {
        self.decided_state.as_ref()
    }

    pub(crate) fn saved_block(&self) -> Option<&Block> {
        self.saved_block.as_ref()
    }

    /// Forget everything except what still holds for a session restarted on the same base: whether
    /// the proposal base is available, and the decided state.
    pub(crate) fn restart(&mut self) {
        if self.decided_state.is_none() {
            self.decided_base = None;
        }
        self.block_draft = None;
        self.saved_block = None;
    }

    pub(crate) fn status_string(&self) -> String {
        let proposal = match (&self.proposal_base, self.proposal_confirmed) {
            (None, _) => "WAIT[BaseAnchorOutput]",
            (Some(_), false) => "WAIT[RespFromStateMgr]",
            (Some(_), true) => "OK",
        };
        let state = match (&self.decided_base, &self.decided_state) {
            (None, _) => "WAIT[acs decision]",
            (Some(_), None) => "WAIT[RespFromStateMgr]",
            (Some(_), Some(_)) => "OK",
        };
        let saved = match (&self.block_draft, &self.saved_block) {
            (None, _) => "WAIT[BlockFromVM]",
            (Some(_), None) => "WAIT[RespFromStateMgr]",
            (Some(_), Some(_)) => "OK",
        };
        format!("SM/proposal={}/state={}/saved={}", proposal, state, saved)
    }
}
