/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The driver thread, which owns every automaton of a chain and feeds them.

use std::{
    collections::{BTreeMap, HashSet},
    sync::{
        mpsc::{Receiver, RecvTimeoutError, Sender, TryRecvError},
        Arc, RwLock,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant, SystemTime},
};

use crate::{
    chain_manager::{
        types::{ChainManagerInput, ChainManagerOutput, DKShareRegistry},
        ChainManager,
    },
    consensus::{
        collaborators::{DKShare, VirtualMachine, VMTask},
        types::{AgreementProposal, ConsensusConfiguration, SessionInput, SessionResult, SessionState},
        ConsensusSession,
    },
    events::{EndSessionEvent, Event, RestartSessionEvent, SessionOutcome, StartSessionEvent},
    gpa::{
        ack::{AckHandler, AckInput},
        Automaton, OutMessages, Respond,
    },
    mempool::{messages::DistSyncMessage, Mempool, MempoolInput},
    networking::{
        messages::{Message, SessionMessage},
        network::Network,
        sending::SenderHandle,
    },
    state_manager::{
        inputs::{StateDiff, StateManagerInput},
        messages::StateManagerMessage,
        StateManager,
    },
    store::Store,
    types::{
        anchor_output::AnchorOutput,
        block::StateDraft,
        cancellation::CancelToken,
        data_types::{CommitteeAddress, L1Commitment, LogIndex, NodeID, TransactionID},
        request::{Request, RequestRef},
    },
};

use super::{
    collaborators::{CommitteeAgreement, L1Client},
    status::NodeStatus,
};

// Longest the driver waits for an input before looking at the network again.
const MAX_INPUT_WAIT: Duration = Duration::from_millis(5);

/// Parameters of the driver that are not passed on to any automaton.
#[derive(Clone, Debug)]
pub struct DriverConfiguration {
    pub me: NodeID,
    pub server_nodes: Vec<NodeID>,
    pub access_nodes: Vec<NodeID>,
    pub timer_tick_period: Duration,
}

/// Everything that is fed back into the driver thread: callbacks of the collaborators, and answers
/// of the automatons to questions asked on behalf of consensus sessions.
pub(crate) enum DriverInput {
    AnchorOutputConfirmed(AnchorOutput),

    ReceiveRequests(Vec<Request>),

    PublishResult {
        committee: CommitteeAddress,
        log_index: LogIndex,
        transaction: TransactionID,
        confirmed: bool,
    },

    /// Input for the session `log_index` of `committee`. Ignored unless the session is still in its
    /// `attempt`th run.
    Session {
        committee: CommitteeAddress,
        log_index: LogIndex,
        attempt: u32,
        input: SessionInput,
    },

    ChainHead {
        l1_commitment: L1Commitment,
        diff: StateDiff,
    },
}

type SessionKey = (CommitteeAddress, LogIndex);

// One need of a session, handed to the component or worker that answers it.
enum SessionNeed {
    MempoolProposal(AnchorOutput),
    StateProposal(AnchorOutput),
    Agreement(AgreementProposal),
    MempoolRequests(Vec<RequestRef>),
    DecidedState(AnchorOutput),
    VMRun(VMTask),
    BlockSave(StateDraft),
    SignatureShare(Vec<u8>),
    Result(SessionResult),
}

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
enum NeedKind {
    MempoolProposal,
    StateProposal,
    Agreement,
    MempoolRequests,
    DecidedState,
    VMRun,
    BlockSave,
    SignatureShare,
    Result,
}

impl SessionNeed {
    fn kind(&self) -> NeedKind {
        match self {
            SessionNeed::MempoolProposal(_) => NeedKind::MempoolProposal,
            SessionNeed::StateProposal(_) => NeedKind::StateProposal,
            SessionNeed::Agreement(_) => NeedKind::Agreement,
            SessionNeed::MempoolRequests(_) => NeedKind::MempoolRequests,
            SessionNeed::DecidedState(_) => NeedKind::DecidedState,
            SessionNeed::VMRun(_) => NeedKind::VMRun,
            SessionNeed::BlockSave(_) => NeedKind::BlockSave,
            SessionNeed::SignatureShare(_) => NeedKind::SignatureShare,
            SessionNeed::Result(_) => NeedKind::Result,
        }
    }
}

// What is needed to route answers back to a session.
#[derive(Clone)]
struct SessionContext {
    committee: CommitteeAddress,
    log_index: LogIndex,
    attempt: u32,
    base: AnchorOutput,
    cancel: CancelToken,
    dk_share: Arc<dyn DKShare>,
}

struct SessionEntry {
    handler: AckHandler<ConsensusSession>,
    context: SessionContext,
    // Needs already handed out during the current attempt.
    dispatched: HashSet<NeedKind>,
    last_state: SessionState,
    last_progress: Instant,
}

pub(crate) struct Driver<S: Store, N: Network + 'static> {
    config: DriverConfiguration,
    consensus_config: ConsensusConfiguration,
    state_manager: StateManager<S>,
    mempool: Mempool,
    chain_manager: ChainManager,
    sessions: BTreeMap<SessionKey, SessionEntry>,
    dk_registry: Arc<dyn DKShareRegistry>,
    vm: Arc<dyn VirtualMachine>,
    agreement: Box<dyn CommitteeAgreement>,
    l1_client: Box<dyn L1Client>,
    sender: SenderHandle<N>,
    messages: Receiver<(NodeID, Message)>,
    inputs: Receiver<DriverInput>,
    to_self: Sender<DriverInput>,
    shutdown_signal: Receiver<()>,
    published: HashSet<TransactionID>,
    chain_head_fetch: Option<CancelToken>,
    committee_nodes: Vec<NodeID>,
    latest_confirmed: Option<AnchorOutput>,
    last_tick: Instant,
    status: Arc<RwLock<NodeStatus>>,
    event_publisher: Option<Sender<Event>>,
}

impl<S: Store + 'static, N: Network + 'static> Driver<S, N> {
    pub(crate) fn new(
        config: DriverConfiguration,
        consensus_config: ConsensusConfiguration,
        state_manager: StateManager<S>,
        mempool: Mempool,
        chain_manager: ChainManager,
        dk_registry: Arc<dyn DKShareRegistry>,
        vm: Arc<dyn VirtualMachine>,
        agreement: Box<dyn CommitteeAgreement>,
        l1_client: Box<dyn L1Client>,
        network: N,
        messages: Receiver<(NodeID, Message)>,
        inputs: (Sender<DriverInput>, Receiver<DriverInput>),
        shutdown_signal: Receiver<()>,
        status: Arc<RwLock<NodeStatus>>,
        event_publisher: Option<Sender<Event>>,
    ) -> Self {
        let (to_self, inputs) = inputs;
        Self {
            config,
            consensus_config,
            state_manager,
            mempool,
            chain_manager,
            sessions: BTreeMap::new(),
            dk_registry,
            vm,
            agreement,
            l1_client,
            sender: SenderHandle::new(network),
            messages,
            inputs,
            to_self,
            shutdown_signal,
            published: HashSet::new(),
            chain_head_fetch: None,
            committee_nodes: Vec::new(),
            latest_confirmed: None,
            last_tick: Instant::now(),
            status,
            event_publisher,
        }
    }

    pub(crate) fn start(mut self) -> JoinHandle<()> {
        thread::spawn(move || {
            self.update_peers();

            loop {
                match self.shutdown_signal.try_recv() {
                    Ok(()) => return,
                    Err(TryRecvError::Empty) => (),
                    Err(TryRecvError::Disconnected) => {
                        panic!("Driver thread disconnected from main thread")
                    }
                }

                // 1. Handle every message received from peers so far.
                while let Ok((origin, msg)) = self.messages.try_recv() {
                    self.on_message(origin, msg);
                }

                // 2. Handle the answers of the components and collaborators.
                let now = Instant::now();
                let next_tick = self.last_tick + self.config.timer_tick_period;
                let wait = next_tick
                    .saturating_duration_since(now)
                    .min(MAX_INPUT_WAIT);
                match self.inputs.recv_timeout(wait) {
                    Ok(input) => {
                        self.on_input(input);
                        while let Ok(input) = self.inputs.try_recv() {
                            self.on_input(input);
                        }
                    }
                    Err(RecvTimeoutError::Timeout) => (),
                    // Safety: the driver holds a sender of its own inputs.
                    Err(RecvTimeoutError::Disconnected) => unreachable!(),
                }

                // 3. Tick the timers.
                let now = Instant::now();
                if now.saturating_duration_since(self.last_tick) >= self.config.timer_tick_period {
                    self.last_tick = now;
                    self.on_tick(now);
                }
            }
        })
    }

    /* ↓↓↓ Network ↓↓↓ */

    fn on_message(&mut self, origin: NodeID, msg: Message) {
        match msg {
            Message::StateManager(msg) => {
                let out = self.state_manager.message(origin, msg);
                self.send_state_manager(out);
            }
            Message::DistSync(msg) => {
                let out = self.mempool.message(origin, msg);
                self.send_dist_sync(out);
            }
            Message::Session(SessionMessage {
                committee,
                log_index,
                message,
            }) => {
                let key = (committee, log_index);
                match self.sessions.get_mut(&key) {
                    Some(entry) => {
                        let out = entry.handler.message(origin, message);
                        self.send_session(key, out);
                        self.after_session(key);
                    }
                    // Left unacknowledged, so the sender delivers it again once the session runs here.
                    None => log::debug!(
                        "Dropping a message from {} for session {} of {}.",
                        origin,
                        log_index,
                        committee
                    ),
                }
            }
        }
    }

    fn send_state_manager(&mut self, out: OutMessages<StateManagerMessage>) {
        self.sender.send_all(out);
    }

    fn send_dist_sync(&mut self, out: OutMessages<DistSyncMessage>) {
        self.sender.send_all(out);
    }

    fn send_session(
        &mut self,
        (committee, log_index): SessionKey,
        out: OutMessages<<AckHandler<ConsensusSession> as Automaton>::Message>,
    ) {
        self.sender.send_all(out.map(|_, message| SessionMessage {
            committee,
            log_index,
            message,
        }));
    }

    /* ↓↓↓ Inputs ↓↓↓ */

    fn on_input(&mut self, input: DriverInput) {
        match input {
            DriverInput::AnchorOutputConfirmed(output) => {
                self.chain_manager_input(ChainManagerInput::AnchorOutputConfirmed(output));
            }
            DriverInput::ReceiveRequests(requests) => {
                let out = self.mempool.input(MempoolInput::ReceiveRequests(requests));
                self.send_dist_sync(out);
            }
            DriverInput::PublishResult {
                committee,
                log_index,
                transaction,
                confirmed,
            } => {
                self.chain_manager_input(ChainManagerInput::ChainTxPublishResult {
                    committee,
                    log_index,
                    transaction,
                    confirmed,
                });
                let key = (committee, log_index);
                if self.sessions.contains_key(&key) {
                    self.session_input(key, SessionInput::PublishAcknowledged { confirmed });
                }
            }
            DriverInput::Session {
                committee,
                log_index,
                attempt,
                input,
            } => {
                let key = (committee, log_index);
                let current = self
                    .sessions
                    .get(&key)
                    .map_or(false, |entry| entry.context.attempt == attempt);
                if !current {
                    return;
                }
                if let SessionInput::BlockSaved(block) = &input {
                    let out = self.mempool.input(MempoolInput::BlockApplied(block.clone()));
                    self.send_dist_sync(out);
                }
                self.session_input(key, input);
            }
            DriverInput::ChainHead {
                l1_commitment,
                diff,
            } => {
                let out = self.mempool.input(MempoolInput::ChainHead {
                    l1_commitment,
                    diff,
                });
                self.send_dist_sync(out);
            }
        }
    }

    /* ↓↓↓ Chain manager ↓↓↓ */

    fn chain_manager_input(&mut self, input: ChainManagerInput) {
        self.chain_manager.input(input);
        if let Some(output) = self.chain_manager.output() {
            self.after_chain_manager(output);
        }
    }

    fn after_chain_manager(&mut self, output: ChainManagerOutput) {
        // 1. Follow the latest confirmed anchor output.
        if output.latest_confirmed != self.latest_confirmed {
            let rotated = output.latest_confirmed.as_ref().map(|output| output.committee)
                != self.latest_confirmed.as_ref().map(|output| output.committee);
            self.latest_confirmed = output.latest_confirmed.clone();
            if let Some(latest) = output.latest_confirmed.clone() {
                if rotated {
                    self.committee_nodes = self
                        .dk_registry
                        .dk_share(&latest.committee)
                        .map(|dk_share| dk_share.committee_nodes())
                        .unwrap_or_default();
                    self.update_peers();
                }
                self.fetch_chain_head(latest);
            }
        }

        // 2. Cancel the sessions the chain manager moved away from.
        self.clean_sessions(&output);

        // 3. Start the needed session.
        if let Some(need) = output.need_consensus {
            let key = (need.committee, need.log_index);
            if !self.sessions.contains_key(&key) {
                self.start_session(need.committee, need.log_index, need.base, need.dk_share);
            }
        }

        // 4. Publish every transaction not handed to L1 yet.
        let mut needed = HashSet::new();
        for need in output.need_publish_tx {
            let transaction = need.transaction.id();
            needed.insert(transaction);
            if self.published.insert(transaction) {
                log::info!(
                    "Publishing transaction {} of log index {}.",
                    transaction,
                    need.log_index
                );
                let to_self = self.to_self.clone();
                let (committee, log_index) = (need.committee, need.log_index);
                self.l1_client.publish_tx(
                    need.transaction,
                    Box::new(move |confirmed| {
                        let _ = to_self.send(DriverInput::PublishResult {
                            committee,
                            log_index,
                            transaction,
                            confirmed,
                        });
                    }),
                );
            }
        }
        self.published.retain(|transaction| needed.contains(transaction));
    }

    // Ask the state manager how the store moves to the latest confirmed state, for the mempool.
    fn fetch_chain_head(&mut self, latest: AnchorOutput) {
        if let Some(cancel) = self.chain_head_fetch.take() {
            cancel.cancel();
        }
        let cancel = CancelToken::new();
        self.chain_head_fetch = Some(cancel.clone());

        let new = latest.l1_commitment;
        let old = self.mempool.chain_head().unwrap_or(new);
        let to_self = self.to_self.clone();
        let out = self
            .state_manager
            .input(StateManagerInput::ChainFetchStateDiff {
                old,
                new,
                cancel,
                respond: Box::new(move |diff| {
                    let _ = to_self.send(DriverInput::ChainHead {
                        l1_commitment: new,
                        diff,
                    });
                }),
            });
        self.send_state_manager(out);
    }

    fn update_peers(&mut self) {
        let server_nodes = union(&self.config.server_nodes, &self.committee_nodes);
        let access_nodes = union(&self.config.access_nodes, &self.committee_nodes);

        let out = self
            .state_manager
            .input(StateManagerInput::PeersUpdated(server_nodes.clone()));
        self.send_state_manager(out);

        let out = self.mempool.input(MempoolInput::ServerNodes {
            server_nodes: self.config.server_nodes.clone(),
            committee_nodes: self.committee_nodes.clone(),
        });
        self.send_dist_sync(out);
        let out = self.mempool.input(MempoolInput::AccessNodes {
            access_nodes: self.config.access_nodes.clone(),
            committee_nodes: self.committee_nodes.clone(),
        });
        self.send_dist_sync(out);

        self.sender.update_peers(union(&server_nodes, &access_nodes));
    }

    /* ↓↓↓ Sessions ↓↓↓ */

    fn start_session(
        &mut self,
        committee: CommitteeAddress,
        log_index: LogIndex,
        base: AnchorOutput,
        dk_share: Arc<dyn DKShare>,
    ) {
        log::info!(
            "Starting consensus session {} of {} on {}.",
            log_index,
            committee,
            base
        );
        let session = ConsensusSession::new(
            self.consensus_config.chain_id,
            self.config.me,
            log_index,
            Arc::clone(&dk_share),
        );
        let key = (committee, log_index);
        self.sessions.insert(
            key,
            SessionEntry {
                handler: AckHandler::new(session, self.consensus_config.redelivery_period),
                context: SessionContext {
                    committee,
                    log_index,
                    attempt: 0,
                    base: base.clone(),
                    cancel: CancelToken::new(),
                    dk_share,
                },
                dispatched: HashSet::new(),
                last_state: SessionState::Created,
                last_progress: Instant::now(),
            },
        );
        Event::publish(
            &self.event_publisher,
            Event::StartSession(StartSessionEvent {
                timestamp: SystemTime::now(),
                committee,
                log_index,
                base_output: base.output_id,
            }),
        );
        self.session_input(key, SessionInput::Proposal { base });
    }

    fn clean_sessions(&mut self, output: &ChainManagerOutput) {
        let need = output
            .need_consensus
            .as_ref()
            .map(|need| (need.committee, need.log_index));
        let publishing: HashSet<SessionKey> = output
            .need_publish_tx
            .iter()
            .map(|need| (need.committee, need.log_index))
            .collect();

        let superseded: Vec<SessionKey> = self
            .sessions
            .iter()
            .filter(|(key, entry)| {
                let (committee, log_index) = **key;
                if Some(committee) != output.active_committee {
                    return true;
                }
                match need {
                    Some((_, needed)) if log_index < needed => {
                        let state = entry.handler.inner().state();
                        !(state == SessionState::WaitPublishAcknowledged
                            && publishing.contains(*key))
                    }
                    _ => false,
                }
            })
            .map(|(key, _)| *key)
            .collect();

        for key in superseded {
            if let Some(entry) = self.sessions.remove(&key) {
                entry.context.cancel.cancel();
                match entry.handler.inner().state() {
                    // The transaction was handed over, and L1 moved past it.
                    SessionState::Completed | SessionState::WaitPublishAcknowledged => {
                        self.publish_end_session(key, SessionOutcome::Completed)
                    }
                    state if !state.is_terminal() => {
                        log::debug!("Cancelling consensus session {} of {}.", key.1, key.0);
                        self.publish_end_session(key, SessionOutcome::Cancelled);
                    }
                    _ => (),
                }
            }
        }
    }

    fn session_input(&mut self, key: SessionKey, input: SessionInput) {
        if let Some(entry) = self.sessions.get_mut(&key) {
            let out = entry.handler.input(AckInput::Inner(input));
            self.send_session(key, out);
            self.after_session(key);
        }
    }

    // Hand out the session's new needs, and take its result.
    fn after_session(&mut self, key: SessionKey) {
        let Some(entry) = self.sessions.get_mut(&key) else {
            return;
        };
        let Some(output) = entry.handler.output() else {
            return;
        };
        if output.state != entry.last_state {
            entry.last_state = output.state;
            entry.last_progress = Instant::now();
        }

        let needs = [
            output.need_mempool_proposal.map(SessionNeed::MempoolProposal),
            output.need_state_proposal.map(SessionNeed::StateProposal),
            output.need_agreement.map(SessionNeed::Agreement),
            output.need_mempool_requests.map(SessionNeed::MempoolRequests),
            output.need_decided_state.map(SessionNeed::DecidedState),
            output.need_vm_run.map(SessionNeed::VMRun),
            output.need_block_save.map(SessionNeed::BlockSave),
            output.need_signature_share.map(SessionNeed::SignatureShare),
            output.result.map(SessionNeed::Result),
        ];
        let mut to_dispatch = Vec::new();
        for need in needs.into_iter().flatten() {
            if entry.dispatched.insert(need.kind()) {
                to_dispatch.push(need);
            }
        }
        let context = entry.context.clone();

        for need in to_dispatch {
            self.dispatch(&context, need);
        }
    }

    // A callback that feeds its argument, converted by `wrap`, back into the session.
    fn respond_to_session<T: Send + 'static>(
        &self,
        context: &SessionContext,
        wrap: impl FnOnce(T) -> SessionInput + Send + 'static,
    ) -> Respond<T> {
        let to_self = self.to_self.clone();
        let (committee, log_index, attempt) =
            (context.committee, context.log_index, context.attempt);
        Box::new(move |value| {
            let _ = to_self.send(DriverInput::Session {
                committee,
                log_index,
                attempt,
                input: wrap(value),
            });
        })
    }

    fn dispatch(&mut self, context: &SessionContext, need: SessionNeed) {
        let cancel = context.cancel.clone();
        match need {
            SessionNeed::MempoolProposal(anchor_output) => {
                let respond = self.respond_to_session(context, SessionInput::MempoolProposal);
                let out = self.mempool.input(MempoolInput::ConsensusProposal {
                    anchor_output,
                    cancel,
                    respond,
                });
                self.send_dist_sync(out);
            }
            SessionNeed::StateProposal(anchor_output) => {
                let respond =
                    self.respond_to_session(context, |()| SessionInput::StateProposalConfirmed);
                let out = self
                    .state_manager
                    .input(StateManagerInput::ConsensusStateProposal {
                        anchor_output,
                        cancel,
                        respond,
                    });
                self.send_state_manager(out);
            }
            SessionNeed::Agreement(proposal) => {
                let decided = self.respond_to_session(context, |decided: AgreementProposal| {
                    SessionInput::AgreedBatch {
                        base: decided.base,
                        request_refs: decided.request_refs,
                    }
                });
                self.agreement.propose(
                    context.committee,
                    context.log_index,
                    proposal,
                    cancel,
                    decided,
                );
            }
            SessionNeed::MempoolRequests(request_refs) => {
                let respond = self.respond_to_session(context, SessionInput::MempoolRequests);
                let out = self.mempool.input(MempoolInput::ConsensusRequests {
                    request_refs,
                    cancel,
                    respond,
                });
                self.send_dist_sync(out);
            }
            SessionNeed::DecidedState(anchor_output) => {
                let respond = self.respond_to_session(context, SessionInput::DecidedState);
                let out = self
                    .state_manager
                    .input(StateManagerInput::ConsensusDecidedState {
                        anchor_output,
                        cancel,
                        respond,
                    });
                self.send_state_manager(out);
            }
            SessionNeed::VMRun(task) => {
                let respond = self.respond_to_session(context, SessionInput::VMResult);
                let vm = Arc::clone(&self.vm);
                thread::spawn(move || {
                    if !cancel.is_cancelled() {
                        respond(vm.run(task));
                    }
                });
            }
            SessionNeed::BlockSave(state_draft) => {
                let respond = self.respond_to_session(context, SessionInput::BlockSaved);
                let out = self
                    .state_manager
                    .input(StateManagerInput::ConsensusBlockProduced {
                        state_draft,
                        respond,
                    });
                self.send_state_manager(out);
            }
            SessionNeed::SignatureShare(payload) => {
                let respond = self.respond_to_session(context, SessionInput::SignatureShareProduced);
                let dk_share = Arc::clone(&context.dk_share);
                thread::spawn(move || {
                    if !cancel.is_cancelled() {
                        respond(dk_share.sign_partial(&payload));
                    }
                });
            }
            SessionNeed::Result(result) => self.on_session_result(context, result),
        }
    }

    fn on_session_result(&mut self, context: &SessionContext, result: SessionResult) {
        let key = (context.committee, context.log_index);
        match result {
            SessionResult::Done {
                base,
                block,
                transaction,
                produced,
            } => {
                log::info!(
                    "Session {} of {} produced block {} with transaction {}.",
                    context.log_index,
                    context.committee,
                    block.l1_commitment(),
                    transaction.id()
                );
                self.chain_manager_input(ChainManagerInput::ConsensusOutputDone {
                    committee: context.committee,
                    log_index: context.log_index,
                    base,
                    transaction,
                    produced,
                });
            }
            SessionResult::Skipped { base } => {
                self.publish_end_session(key, SessionOutcome::Skipped);
                self.chain_manager_input(ChainManagerInput::ConsensusOutputSkip {
                    committee: context.committee,
                    log_index: context.log_index,
                    base,
                });
            }
            SessionResult::Failed(err) => {
                log::warn!(
                    "Session {} of {} failed: {:?}",
                    context.log_index,
                    context.committee,
                    err
                );
                self.publish_end_session(
                    key,
                    SessionOutcome::Failed {
                        reason: format!("{:?}", err),
                    },
                );
            }
        }
    }

    fn publish_end_session(&self, (committee, log_index): SessionKey, outcome: SessionOutcome) {
        Event::publish(
            &self.event_publisher,
            Event::EndSession(EndSessionEvent {
                timestamp: SystemTime::now(),
                committee,
                log_index,
                outcome,
            }),
        );
    }

    /* ↓↓↓ Timers ↓↓↓ */

    fn on_tick(&mut self, now: Instant) {
        let out = self.state_manager.input(StateManagerInput::TimerTick(now));
        self.send_state_manager(out);
        let out = self.mempool.input(MempoolInput::TimerTick);
        self.send_dist_sync(out);
        self.chain_manager_input(ChainManagerInput::TimerTick(now));

        let keys: Vec<SessionKey> = self.sessions.keys().copied().collect();
        for key in keys {
            let Some(entry) = self.sessions.get_mut(&key) else {
                continue;
            };
            let out = entry.handler.input(AckInput::Tick(now));
            let state = entry.handler.inner().state();
            let stuck = !state.is_terminal()
                && state != SessionState::WaitPublishAcknowledged
                && now.saturating_duration_since(entry.last_progress)
                    >= self.consensus_config.recovery_timeout;
            self.send_session(key, out);
            if stuck {
                self.restart_session(key, now);
            } else if let Some(entry) = self.sessions.get(&key) {
                // Completed sessions are done with publication, and only kept while their last
                // messages may still need redelivery.
                if state == SessionState::Completed && entry.handler.unacked_count() == 0 {
                    self.sessions.remove(&key);
                    self.publish_end_session(key, SessionOutcome::Completed);
                }
            }
        }

        self.update_status();
    }

    fn restart_session(&mut self, key: SessionKey, now: Instant) {
        let Some(entry) = self.sessions.get_mut(&key) else {
            return;
        };
        entry.context.cancel.cancel();
        entry.context.cancel = CancelToken::new();
        entry.context.attempt += 1;
        entry.dispatched.clear();
        entry.handler.inner_mut().restart();
        entry.last_state = SessionState::Created;
        entry.last_progress = now;
        let base = entry.context.base.clone();

        Event::publish(
            &self.event_publisher,
            Event::RestartSession(RestartSessionEvent {
                timestamp: SystemTime::now(),
                committee: key.0,
                log_index: key.1,
            }),
        );
        self.session_input(key, SessionInput::Proposal { base });
    }

    fn update_status(&self) {
        let latest_block = match self.state_manager.store().latest_block() {
            Ok(block) => block.map(|block| block.l1_commitment()),
            Err(err) => {
                log::warn!("Could not read the latest block: {:?}", err);
                None
            }
        };
        let status = NodeStatus {
            latest_confirmed: self.latest_confirmed.clone(),
            latest_block,
            chain_manager: self.chain_manager.status_string(),
            state_manager: self.state_manager.status_string(),
            mempool: self.mempool.status_string(),
            sessions: self
                .sessions
                .values()
                .map(|entry| entry.handler.status_string())
                .collect(),
        };
        match self.status.write() {
            Ok(mut guard) => *guard = status,
            Err(poisoned) => *poisoned.into_inner() = status,
        }
    }
}

// `a` extended with every node of `b` it does not contain yet.
fn union(a: &[NodeID], b: &[NodeID]) -> Vec<NodeID> {
    let mut nodes = a.to_vec();
    for node in b {
        if !nodes.contains(node) {
            nodes.push(*node);
        }
    }
    nodes
}
