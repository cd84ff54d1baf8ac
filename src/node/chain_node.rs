/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

use std::{
    sync::{
        mpsc::{self, Sender},
        Arc, RwLock,
    },
    thread::JoinHandle,
};

use typed_builder::TypedBuilder;

use crate::{
    chain_manager::{types::DKShareRegistry, ChainManager},
    config::Configuration,
    consensus::collaborators::VirtualMachine,
    event_bus::*,
    events::*,
    mempool::Mempool,
    networking::{network::Network, receiving::start_polling},
    state_manager::StateManager,
    store::Store,
    types::{anchor_output::AnchorOutput, data_types::NodeID, request::Request},
};

use super::{
    collaborators::{CommitteeAgreement, L1Client},
    driver::{Driver, DriverInput},
    status::NodeStatus,
};

/// Stores all necessary parameters and trait implementations required to run a [`ChainNode`].
#[derive(TypedBuilder)]
#[builder(builder_method(doc = "
    Create a builder for building a [ChainNodeSpec]. On the builder call the following methods to construct a valid [ChainNodeSpec].

    Required:
    - `.network(...)`
    - `.store(...)`
    - `.l1_client(...)`
    - `.vm(...)`
    - `.agreement(...)`
    - `.dk_registry(...)`
    - `.configuration(...)`

    Optional:
    - `.on_need_consensus(...)`
    - `.on_need_publish_tx(...)`
    - `.on_publish_tx_result(...)`
    - `.on_committee_rotation(...)`
    - `.on_commit_block(...)`
    - `.on_request_block(...)`
    - `.on_receive_block(...)`
    - `.on_start_session(...)`
    - `.on_end_session(...)`
    - `.on_restart_session(...)`
    - `.on_share_request(...)`
    - `.on_receive_request(...)`
"))]
pub struct ChainNodeSpec<S: Store + 'static, N: Network + 'static> {
    // Required parameters
    #[builder(setter(doc = "Set the implementation of peer-to-peer networking. The argument must implement the [Network](crate::networking::network::Network) trait. Required."))]
    network: N,
    #[builder(setter(doc = "Set the store of blocks and states. It must already hold the origin block. Required."))]
    store: S,
    #[builder(setter(transform = |l1_client: impl L1Client + 'static| Box::new(l1_client) as Box<dyn L1Client>,
    doc = "Set the client of the L1 ledger the chain is anchored to. Required."))]
    l1_client: Box<dyn L1Client>,
    #[builder(setter(transform = |vm: impl VirtualMachine + 'static| Arc::new(vm) as Arc<dyn VirtualMachine>,
    doc = "Set the virtual machine that runs requests. Required."))]
    vm: Arc<dyn VirtualMachine>,
    #[builder(setter(transform = |agreement: impl CommitteeAgreement + 'static| Box::new(agreement) as Box<dyn CommitteeAgreement>,
    doc = "Set the implementation of the committee's agreement on batches. Required."))]
    agreement: Box<dyn CommitteeAgreement>,
    #[builder(setter(transform = |dk_registry: impl DKShareRegistry + 'static| Arc::new(dk_registry) as Arc<dyn DKShareRegistry>,
    doc = "Set the registry of this node's DK shares. Required."))]
    dk_registry: Arc<dyn DKShareRegistry>,
    #[builder(setter(doc = "Set the [configuration](Configuration), which contains the necessary parameters to run a node. Required."))]
    configuration: Configuration,
    // Optional parameters
    #[builder(default, setter(transform = |handler: impl Fn(&NeedConsensusEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<NeedConsensusEvent>),
    doc = "Register a handler closure to be invoked after the chain manager starts asking for a consensus session. Optional."))]
    on_need_consensus: Option<HandlerPtr<NeedConsensusEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&NeedPublishTXEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<NeedPublishTXEvent>),
    doc = "Register a handler closure to be invoked after a signed transaction is registered for publication. Optional."))]
    on_need_publish_tx: Option<HandlerPtr<NeedPublishTXEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&PublishTXResultEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<PublishTXResultEvent>),
    doc = "Register a handler closure to be invoked after L1 confirms or rejects a published transaction. Optional."))]
    on_publish_tx_result: Option<HandlerPtr<PublishTXResultEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&CommitteeRotationEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<CommitteeRotationEvent>),
    doc = "Register a handler closure to be invoked after the committee controlling the chain changes. Optional."))]
    on_committee_rotation: Option<HandlerPtr<CommitteeRotationEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&CommitBlockEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<CommitBlockEvent>),
    doc = "Register a handler closure to be invoked after a block is committed to the store. Optional."))]
    on_commit_block: Option<HandlerPtr<CommitBlockEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&RequestBlockEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<RequestBlockEvent>),
    doc = "Register a handler closure to be invoked after a missing block is requested from peers. Optional."))]
    on_request_block: Option<HandlerPtr<RequestBlockEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ReceiveBlockEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ReceiveBlockEvent>),
    doc = "Register a handler closure to be invoked after a missing block is received from a peer. Optional."))]
    on_receive_block: Option<HandlerPtr<ReceiveBlockEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&StartSessionEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<StartSessionEvent>),
    doc = "Register a handler closure to be invoked after a consensus session starts. Optional."))]
    on_start_session: Option<HandlerPtr<StartSessionEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&EndSessionEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<EndSessionEvent>),
    doc = "Register a handler closure to be invoked after a consensus session ends. Optional."))]
    on_end_session: Option<HandlerPtr<EndSessionEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&RestartSessionEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<RestartSessionEvent>),
    doc = "Register a handler closure to be invoked after a stuck consensus session is restarted. Optional."))]
    on_restart_session: Option<HandlerPtr<RestartSessionEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ShareRequestEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ShareRequestEvent>),
    doc = "Register a handler closure to be invoked after a request is shared with peers. Optional."))]
    on_share_request: Option<HandlerPtr<ShareRequestEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ReceiveRequestEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ReceiveRequestEvent>),
    doc = "Register a handler closure to be invoked after a request is received from a peer. Optional."))]
    on_receive_request: Option<HandlerPtr<ReceiveRequestEvent>>,
}

impl<S: Store + 'static, N: Network + 'static> ChainNodeSpec<S, N> {
    /// Starts all threads and channels associated with running a node, and returns the handles to
    /// them in a [`ChainNode`] struct.
    pub fn start(mut self) -> ChainNode {
        let log_events = self.configuration.log_events;
        let me = NodeID::from(self.configuration.me);
        let (
            state_manager_config,
            dist_sync_config,
            consensus_config,
            chain_manager_config,
            driver_config,
        ) = self.configuration.into();

        let (poller_shutdown, poller_shutdown_receiver) = mpsc::channel();
        let (poller, messages) = start_polling(self.network.clone(), poller_shutdown_receiver);

        let event_handlers = EventHandlers::new(
            log_events,
            self.on_need_consensus,
            self.on_need_publish_tx,
            self.on_publish_tx_result,
            self.on_committee_rotation,
            self.on_commit_block,
            self.on_request_block,
            self.on_receive_block,
            self.on_start_session,
            self.on_end_session,
            self.on_restart_session,
            self.on_share_request,
            self.on_receive_request,
        );

        let (event_publisher, event_subscriber) = if !event_handlers.is_empty() {
            Some(mpsc::channel()).unzip()
        } else {
            (None, None)
        };

        // 1. Route the L1 client's callbacks into the driver.
        let (to_driver, driver_inputs) = mpsc::channel();
        let on_request = to_driver.clone();
        let on_anchor_output = to_driver.clone();
        self.l1_client.attach(
            Box::new(move |request| {
                let _ = on_request.send(DriverInput::ReceiveRequests(vec![request]));
            }),
            Box::new(move |anchor_output| {
                let _ = on_anchor_output.send(DriverInput::AnchorOutputConfirmed(anchor_output));
            }),
        );

        // 2. Start the driver.
        let status = Arc::new(RwLock::new(NodeStatus::default()));
        let state_manager = StateManager::new(
            me,
            self.store,
            state_manager_config,
            event_publisher.clone(),
        );
        let mempool = Mempool::new(me, dist_sync_config, event_publisher.clone());
        let chain_manager = ChainManager::new(
            me,
            chain_manager_config,
            Arc::clone(&self.dk_registry),
            event_publisher.clone(),
        );
        let (driver_shutdown, driver_shutdown_receiver) = mpsc::channel();
        let driver = Driver::new(
            driver_config,
            consensus_config,
            state_manager,
            mempool,
            chain_manager,
            self.dk_registry,
            self.vm,
            self.agreement,
            self.l1_client,
            self.network,
            messages,
            (to_driver.clone(), driver_inputs),
            driver_shutdown_receiver,
            Arc::clone(&status),
            event_publisher,
        );
        let driver = driver.start();

        // 3. Start the event bus.
        let (event_bus_shutdown, event_bus_shutdown_receiver) = if !event_handlers.is_empty() {
            Some(mpsc::channel()).unzip()
        } else {
            (None, None)
        };

        let event_bus = match (event_subscriber, event_bus_shutdown_receiver) {
            (Some(event_subscriber), Some(shutdown_receiver)) => Some(start_event_bus(
                event_handlers,
                event_subscriber,
                shutdown_receiver,
            )),
            _ => None,
        };

        ChainNode {
            status,
            to_driver,
            poller: Some(poller),
            poller_shutdown,
            driver: Some(driver),
            driver_shutdown,
            event_bus,
            event_bus_shutdown,
        }
    }
}

/// A handle to the background threads of a chain node. When this value is dropped, all background
/// threads are gracefully shut down.
pub struct ChainNode {
    status: Arc<RwLock<NodeStatus>>,
    to_driver: Sender<DriverInput>,
    poller: Option<JoinHandle<()>>,
    poller_shutdown: Sender<()>,
    driver: Option<JoinHandle<()>>,
    driver_shutdown: Sender<()>,
    event_bus: Option<JoinHandle<()>>,
    event_bus_shutdown: Option<Sender<()>>,
}

impl ChainNode {
    /// Get what the driver last reported about the node.
    pub fn status(&self) -> NodeStatus {
        match self.status.read() {
            Ok(status) => status.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Hand requests submitted to this node, for example off-ledger requests, to the mempool.
    pub fn receive_requests(&self, requests: Vec<Request>) {
        let _ = self.to_driver.send(DriverInput::ReceiveRequests(requests));
    }

    /// Tell the node about an anchor output L1 confirmed, in addition to those its L1 client reports.
    pub fn anchor_output_confirmed(&self, anchor_output: AnchorOutput) {
        let _ = self
            .to_driver
            .send(DriverInput::AnchorOutputConfirmed(anchor_output));
    }
}

impl Drop for ChainNode {
    fn drop(&mut self) {
        // The driver receives messages from the poller, and assumes that the poller lives longer than
        // it, so the driver is shut down first.

        self.event_bus_shutdown
            .iter()
            .for_each(|shutdown| {
                let _ = shutdown.send(());
            });
        if let Some(event_bus) = self.event_bus.take() {
            let _ = event_bus.join();
        }

        let _ = self.driver_shutdown.send(());
        if let Some(driver) = self.driver.take() {
            let _ = driver.join();
        }

        let _ = self.poller_shutdown.send(());
        if let Some(poller) = self.poller.take() {
            let _ = poller.join();
        }
    }
}
