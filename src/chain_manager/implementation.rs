/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The [`ChainManager`] automaton.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{mpsc::Sender, Arc},
    time::{Duration, Instant, SystemTime},
};

use crate::{
    consensus::collaborators::DKShare,
    events::{
        CommitteeRotationEvent, Event, NeedConsensusEvent, NeedPublishTXEvent,
        PublishTXResultEvent,
    },
    gpa::{Automaton, Never, OutMessages},
    types::{
        anchor_output::AnchorOutput,
        data_types::{CommitteeAddress, LogIndex, NodeID, TransactionID},
        transaction::SignedTransaction,
    },
};

use super::{
    committee_log::CommitteeLog,
    types::{
        ChainManagerConfiguration, ChainManagerError, ChainManagerInput, ChainManagerOutput,
        DKShareRegistry, NeedConsensus, NeedPublishTX,
    },
};

const STATUS_LOG_PERIOD: Duration = Duration::from_secs(10);

/// Tracks the anchor outputs of the chain, and decides which consensus session runs next and which
/// transactions have to be published.
///
/// Only the committee controlling the latest confirmed anchor output is active. Its
/// [`CommitteeLog`] moves forward on every session output, and builds on produced outputs before
/// they are confirmed, up to [`pipelining_limit`](ChainManagerConfiguration::pipelining_limit) of
/// them.
pub struct ChainManager {
    me: NodeID,
    config: ChainManagerConfiguration,
    dk_registry: Arc<dyn DKShareRegistry>,
    latest_confirmed: Option<AnchorOutput>,
    active: Option<CommitteeLog>,
    active_share: Option<Arc<dyn DKShare>>,
    // Last log index used by every committee that was ever active.
    last_log_indices: HashMap<CommitteeAddress, LogIndex>,
    need_publish_tx: BTreeMap<LogIndex, NeedPublishTX>,
    last_need_consensus: Option<(CommitteeAddress, LogIndex)>,
    last_status_log: Option<Instant>,
    event_publisher: Option<Sender<Event>>,
}

impl ChainManager {
    pub fn new(
        me: NodeID,
        config: ChainManagerConfiguration,
        dk_registry: Arc<dyn DKShareRegistry>,
        event_publisher: Option<Sender<Event>>,
    ) -> Self {
        Self {
            me,
            config,
            dk_registry,
            latest_confirmed: None,
            active: None,
            active_share: None,
            last_log_indices: HashMap::new(),
            need_publish_tx: BTreeMap::new(),
            last_need_consensus: None,
            last_status_log: None,
            event_publisher,
        }
    }

    pub fn latest_confirmed(&self) -> Option<&AnchorOutput> {
        self.latest_confirmed.as_ref()
    }

    pub fn active_log(&self) -> Option<&CommitteeLog> {
        self.active.as_ref()
    }

    /* ↓↓↓ Input handlers ↓↓↓ */

    fn on_anchor_output_confirmed(&mut self, output: AnchorOutput) {
        if let Some(latest) = &self.latest_confirmed {
            if output.state_index < latest.state_index {
                log::debug!(
                    "Ignoring {}, older than the latest confirmed {}.",
                    output,
                    latest
                );
                return;
            }
            if output.state_index == latest.state_index {
                if output == *latest {
                    return;
                }
                panic!(
                    "Two different anchor outputs confirmed at state index {}: {} and {}",
                    output.state_index, latest, output
                );
            }
        }
        self.latest_confirmed = Some(output.clone());

        let active_committee = self.active.as_ref().map(|log| log.committee());
        if active_committee != Some(output.committee) {
            self.rotate(active_committee, output);
            return;
        }

        // Safety: `active_committee` is `Some`, so `self.active` is too.
        let log = self.active.as_mut().unwrap();
        match log.confirmed(&output) {
            Some(producer) => {
                // Transactions producing confirmed outputs are published.
                self.need_publish_tx.retain(|li, _| *li > producer);
            }
            None => {
                log::info!(
                    "{} rebases the log of {} to log index {}.",
                    output,
                    output.committee,
                    log.log_index()
                );
                self.need_publish_tx.clear();
            }
        }
        self.last_log_indices.insert(log.committee(), log.log_index());
    }

    fn rotate(&mut self, from: Option<CommitteeAddress>, output: AnchorOutput) {
        let committee = output.committee;
        let log_index = self
            .last_log_indices
            .get(&committee)
            .map_or(LogIndex::new(1), |li| li.next());
        log::info!(
            "Committee rotation from {:?} to {} at {}, log index {}.",
            from,
            committee,
            output,
            log_index
        );
        self.active = Some(CommitteeLog::new(committee, log_index, output));
        self.active_share = self.dk_registry.dk_share(&committee);
        if self.active_share.is_none() {
            log::info!("{} holds no share of {}, running as an access node.", self.me, committee);
        }
        self.last_log_indices.insert(committee, log_index);
        self.need_publish_tx.clear();

        Event::publish(
            &self.event_publisher,
            Event::CommitteeRotation(CommitteeRotationEvent {
                timestamp: SystemTime::now(),
                from,
                to: committee,
            }),
        );
    }

    fn on_consensus_output_done(
        &mut self,
        committee: CommitteeAddress,
        log_index: LogIndex,
        base: AnchorOutput,
        transaction: SignedTransaction,
        produced: AnchorOutput,
    ) -> Result<(), ChainManagerError> {
        let log = self.active_log_of(committee)?;
        log.done(log_index, &base, produced.clone())?;
        let next = log.log_index();
        self.last_log_indices.insert(committee, next);

        let transaction_id = transaction.id();
        self.need_publish_tx.insert(
            log_index,
            NeedPublishTX {
                committee,
                log_index,
                transaction,
                base,
                produced,
            },
        );
        Event::publish(
            &self.event_publisher,
            Event::NeedPublishTX(NeedPublishTXEvent {
                timestamp: SystemTime::now(),
                committee,
                log_index,
                transaction: transaction_id,
            }),
        );
        Ok(())
    }

    fn on_consensus_output_skip(
        &mut self,
        committee: CommitteeAddress,
        log_index: LogIndex,
        base: AnchorOutput,
    ) -> Result<(), ChainManagerError> {
        let log = self.active_log_of(committee)?;
        log.skip(log_index)?;
        let next = log.log_index();
        log::debug!("Log index {} of {} skipped on {}.", log_index, committee, base);
        self.last_log_indices.insert(committee, next);
        Ok(())
    }

    fn on_chain_tx_publish_result(
        &mut self,
        committee: CommitteeAddress,
        log_index: LogIndex,
        transaction: TransactionID,
        confirmed: bool,
    ) {
        Event::publish(
            &self.event_publisher,
            Event::PublishTXResult(PublishTXResultEvent {
                timestamp: SystemTime::now(),
                transaction,
                confirmed,
            }),
        );
        let matches = self
            .need_publish_tx
            .get(&log_index)
            .map_or(false, |need| {
                need.committee == committee && need.transaction.id() == transaction
            });
        if !matches {
            log::debug!(
                "Publish result for an unknown transaction {} at log index {}.",
                transaction,
                log_index
            );
            return;
        }
        self.need_publish_tx.remove(&log_index);
        if confirmed {
            return;
        }

        log::warn!(
            "Transaction {} of {} at log index {} was rejected.",
            transaction,
            committee,
            log_index
        );
        // Everything built on the rejected output is abandoned, and work continues from the latest
        // confirmed output.
        let Some(latest) = self.latest_confirmed.clone() else {
            return;
        };
        if let Some(log) = self.active.as_mut() {
            if log.committee() == committee && log.rejected(log_index, latest) {
                self.need_publish_tx.retain(|li, _| *li < log_index);
                self.last_log_indices.insert(committee, log.log_index());
            }
        }
    }

    fn on_timer_tick(&mut self, now: Instant) {
        let due = self
            .last_status_log
            .map_or(true, |last| now.saturating_duration_since(last) >= STATUS_LOG_PERIOD);
        if due {
            self.last_status_log = Some(now);
            log::debug!("{}", self.status_string());
        }
    }

    /* ↓↓↓ Helpers ↓↓↓ */

    fn active_log_of(
        &mut self,
        committee: CommitteeAddress,
    ) -> Result<&mut CommitteeLog, ChainManagerError> {
        match self.active.as_mut() {
            Some(log) if log.committee() == committee => Ok(log),
            _ => Err(ChainManagerError::InactiveCommittee { committee }),
        }
    }

    fn need_consensus(&self) -> Option<NeedConsensus> {
        let log = self.active.as_ref()?;
        let dk_share = self.active_share.as_ref()?;
        let (log_index, base) = log.need_consensus(self.config.pipelining_limit)?;
        Some(NeedConsensus {
            committee: log.committee(),
            log_index,
            base: base.clone(),
            dk_share: Arc::clone(dk_share),
        })
    }

    // Publish an event if the needed session changed.
    fn publish_need_changes(&mut self) {
        let need = self.need_consensus();
        let current = need.as_ref().map(|need| (need.committee, need.log_index));
        if current == self.last_need_consensus {
            return;
        }
        self.last_need_consensus = current;
        if let Some(need) = need {
            log::debug!(
                "Need consensus for {} at log index {} on {}.",
                need.committee,
                need.log_index,
                need.base
            );
            Event::publish(
                &self.event_publisher,
                Event::NeedConsensus(NeedConsensusEvent {
                    timestamp: SystemTime::now(),
                    committee: need.committee,
                    log_index: need.log_index,
                    base_output: need.base.output_id,
                }),
            );
        }
    }
}

impl Automaton for ChainManager {
    type Input = ChainManagerInput;
    type Message = Never;
    type Output = ChainManagerOutput;

    fn input(&mut self, input: Self::Input) -> OutMessages<Self::Message> {
        let result = match input {
            ChainManagerInput::AnchorOutputConfirmed(output) => {
                self.on_anchor_output_confirmed(output);
                Ok(())
            }
            ChainManagerInput::ConsensusOutputDone {
                committee,
                log_index,
                base,
                transaction,
                produced,
            } => self.on_consensus_output_done(committee, log_index, base, transaction, produced),
            ChainManagerInput::ConsensusOutputSkip {
                committee,
                log_index,
                base,
            } => self.on_consensus_output_skip(committee, log_index, base),
            ChainManagerInput::ChainTxPublishResult {
                committee,
                log_index,
                transaction,
                confirmed,
            } => {
                self.on_chain_tx_publish_result(committee, log_index, transaction, confirmed);
                Ok(())
            }
            ChainManagerInput::TimerTick(now) => {
                self.on_timer_tick(now);
                Ok(())
            }
        };
        if let Err(err) = result {
            log::debug!("Ignoring a consensus output: {:?}", err);
        }
        self.publish_need_changes();
        OutMessages::new()
    }

    fn message(&mut self, _origin: NodeID, msg: Self::Message) -> OutMessages<Self::Message> {
        match msg {}
    }

    fn output(&self) -> Option<Self::Output> {
        Some(ChainManagerOutput {
            latest_confirmed: self.latest_confirmed.clone(),
            active_committee: self.active.as_ref().map(|log| log.committee()),
            need_consensus: self.need_consensus(),
            need_publish_tx: self.need_publish_tx.values().cloned().collect(),
        })
    }

    fn status_string(&self) -> String {
        match &self.active {
            Some(log) => format!(
                "{{ChainMgr: committee={}, LI={}, base={}, unconfirmed={}, publishing={}, share={}}}",
                log.committee(),
                log.log_index(),
                log.base(),
                log.unconfirmed_count(),
                self.need_publish_tx.len(),
                self.active_share.is_some()
            ),
            None => "{ChainMgr: no confirmed anchor output}".to_string(),
        }
    }
}
