/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Log index bookkeeping of one committee.

use crate::types::{
    anchor_output::AnchorOutput,
    data_types::{CommitteeAddress, LogIndex},
};

use super::types::ChainManagerError;

/// The log index a committee works on, the anchor output it builds on, and the anchor outputs it
/// produced ahead of their confirmation on L1.
///
/// `base` is either the latest confirmed anchor output, or the last of `unconfirmed`.
#[derive(Clone, Debug)]
pub struct CommitteeLog {
    committee: CommitteeAddress,
    log_index: LogIndex,
    base: AnchorOutput,
    // Prospective outputs, with the log index of the session that produced each, in production order.
    unconfirmed: Vec<(LogIndex, AnchorOutput)>,
}

impl CommitteeLog {
    /// Start a log at `log_index` on the confirmed `base`.
    pub fn new(committee: CommitteeAddress, log_index: LogIndex, base: AnchorOutput) -> Self {
        Self {
            committee,
            log_index,
            base,
            unconfirmed: Vec::new(),
        }
    }

    pub fn committee(&self) -> CommitteeAddress {
        self.committee
    }

    /// The log index of the session the committee works on.
    pub fn log_index(&self) -> LogIndex {
        self.log_index
    }

    pub fn base(&self) -> &AnchorOutput {
        &self.base
    }

    pub fn unconfirmed_count(&self) -> usize {
        self.unconfirmed.len()
    }

    /// The session to run next, unless `pipelining_limit` prospective outputs are already waiting for
    /// their confirmation.
    pub fn need_consensus(&self, pipelining_limit: usize) -> Option<(LogIndex, &AnchorOutput)> {
        if self.unconfirmed.len() < pipelining_limit {
            Some((self.log_index, &self.base))
        } else {
            None
        }
    }

    /// Take in an anchor output L1 confirmed for this committee.
    ///
    /// If the output is one this committee produced, it and every output produced before it are
    /// confirmed, and the log carries on undisturbed. Returns the log index that produced it.
    ///
    /// Otherwise the prospective outputs are abandoned: the log moves on to the next log index with
    /// the confirmed output as its base. Returns `None`.
    pub fn confirmed(&mut self, output: &AnchorOutput) -> Option<LogIndex> {
        let position = self
            .unconfirmed
            .iter()
            .position(|(_, unconfirmed)| unconfirmed == output);
        match position {
            Some(position) => {
                let (producer, _) = self.unconfirmed[position];
                self.unconfirmed.drain(..=position);
                Some(producer)
            }
            None => {
                self.rebase(output.clone());
                None
            }
        }
    }

    /// Take in the output of the session at `log_index`, which consumed `base` and produced
    /// `produced`.
    pub fn done(
        &mut self,
        log_index: LogIndex,
        base: &AnchorOutput,
        produced: AnchorOutput,
    ) -> Result<(), ChainManagerError> {
        self.check_log_index(log_index)?;
        if *base != self.base {
            return Err(ChainManagerError::StaleBase { log_index });
        }
        self.unconfirmed.push((log_index, produced.clone()));
        self.base = produced;
        self.log_index = self.log_index.next();
        Ok(())
    }

    /// Take in the session at `log_index` producing nothing.
    pub fn skip(&mut self, log_index: LogIndex) -> Result<(), ChainManagerError> {
        self.check_log_index(log_index)?;
        self.log_index = self.log_index.next();
        Ok(())
    }

    /// Abandon the prospective outputs from the one produced at `log_index` onwards and continue on
    /// `confirmed`. Returns whether `log_index` produced one of the prospective outputs.
    pub fn rejected(&mut self, log_index: LogIndex, confirmed: AnchorOutput) -> bool {
        if !self.unconfirmed.iter().any(|(li, _)| *li == log_index) {
            return false;
        }
        self.rebase(confirmed);
        true
    }

    fn rebase(&mut self, base: AnchorOutput) {
        self.unconfirmed.clear();
        self.base = base;
        self.log_index = self.log_index.next();
    }

    fn check_log_index(&self, log_index: LogIndex) -> Result<(), ChainManagerError> {
        if log_index == self.log_index {
            Ok(())
        } else {
            Err(ChainManagerError::UnexpectedLogIndex {
                expected: self.log_index,
                got: log_index,
            })
        }
    }
}
