/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Gossip of pending requests between nodes.
//!
//! ## Sharing
//!
//! A request published by this node is sent to every committee node, or to every server node if the
//! committee is not known yet.
//!
//! ## Querying
//!
//! A request this node needs is first asked for from every committee node. Then, on every tick and
//! until it arrives, it is asked for from one more server node, picked by walking a fresh random
//! permutation of the server nodes.
//!
//! ## Relaying
//!
//! A node that has a request asked for answers with a [`ShareRequest`](DistSyncMessage::ShareRequest)
//! with a TTL of 0. A node receiving a `ShareRequest` with a TTL above 0 forwards it with a decreased
//! TTL to `F+1` random committee nodes, where `F` is the number of faulty nodes the committee
//! tolerates.

use std::{collections::HashMap, sync::mpsc::Sender, time::SystemTime};

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

use crate::{
    events::{Event, ReceiveRequestEvent, ShareRequestEvent},
    gpa::{Automaton, OutMessages},
    types::{
        data_types::NodeID,
        request::{Request, RequestRef, RequestRefKey},
    },
};

use super::{messages::DistSyncMessage, request_pool::RequestPool};

/// Highest TTL a received request is forwarded with.
pub const MAX_TTL: u8 = 1;

#[derive(Clone, Debug)]
pub struct DistSyncConfiguration {
    /// Upper bound on the number of queries sent on one tick.
    pub max_msgs_per_tick: usize,
}

impl Default for DistSyncConfiguration {
    fn default() -> Self {
        Self {
            max_msgs_per_tick: 100,
        }
    }
}

pub enum DistSyncInput {
    /// The server nodes, and the committee nodes, which are folded into the server nodes.
    ServerNodes {
        server_nodes: Vec<NodeID>,
        committee_nodes: Vec<NodeID>,
    },

    /// The access nodes, and the committee nodes, which are folded into the access nodes.
    AccessNodes {
        access_nodes: Vec<NodeID>,
        committee_nodes: Vec<NodeID>,
    },

    /// Share a request this node has.
    PublishRequest(Request),

    /// Start (`needed == true`) or stop looking for a request.
    RequestNeeded {
        request_ref: RequestRef,
        needed: bool,
    },

    TimeTick,
}

pub struct DistSync<P: RequestPool> {
    me: NodeID,
    config: DistSyncConfiguration,
    pool: P,
    server_nodes: Vec<NodeID>,
    access_nodes: Vec<NodeID>,
    committee_nodes: Vec<NodeID>,
    node_count_to_share: usize,
    needed: HashMap<RequestRefKey, RequestRef>,
    rng: StdRng,
    event_publisher: Option<Sender<Event>>,
}

impl<P: RequestPool> DistSync<P> {
    pub fn new(
        me: NodeID,
        pool: P,
        config: DistSyncConfiguration,
        event_publisher: Option<Sender<Event>>,
    ) -> Self {
        Self {
            me,
            config,
            pool,
            server_nodes: Vec::new(),
            access_nodes: Vec::new(),
            committee_nodes: Vec::new(),
            node_count_to_share: 0,
            needed: HashMap::new(),
            rng: StdRng::from_entropy(),
            event_publisher,
        }
    }

    pub fn pool(&self) -> &P {
        &self.pool
    }

    pub fn pool_mut(&mut self) -> &mut P {
        &mut self.pool
    }

    /// Number of committee nodes a received request is forwarded to.
    pub fn node_count_to_share(&self) -> usize {
        self.node_count_to_share
    }

    pub fn is_needed(&self, request_ref: &RequestRef) -> bool {
        self.needed.contains_key(&request_ref.key())
    }

    pub fn needed_count(&self) -> usize {
        self.needed.len()
    }

    /// The requests currently looked for.
    pub fn needed_refs(&self) -> Vec<RequestRef> {
        self.needed.values().copied().collect()
    }

    pub fn server_nodes(&self) -> &[NodeID] {
        &self.server_nodes
    }

    pub fn access_nodes(&self) -> &[NodeID] {
        &self.access_nodes
    }

    fn set_committee_nodes(&mut self, committee_nodes: Vec<NodeID>) {
        self.committee_nodes = committee_nodes;
        let committee_size = self.committee_nodes.len();
        self.node_count_to_share = (committee_size.saturating_sub(1) / 3 + 1)
            .max(2)
            .min(committee_size);
    }

    fn on_server_nodes(
        &mut self,
        server_nodes: Vec<NodeID>,
        committee_nodes: Vec<NodeID>,
    ) -> OutMessages<DistSyncMessage> {
        self.set_committee_nodes(committee_nodes);
        self.server_nodes = with_committee(server_nodes, &self.committee_nodes);
        self.on_time_tick()
    }

    fn on_access_nodes(
        &mut self,
        access_nodes: Vec<NodeID>,
        committee_nodes: Vec<NodeID>,
    ) -> OutMessages<DistSyncMessage> {
        self.set_committee_nodes(committee_nodes);
        self.access_nodes = with_committee(access_nodes, &self.committee_nodes);
        self.on_time_tick()
    }

    fn on_publish_request(&mut self, request: Request) -> OutMessages<DistSyncMessage> {
        let recipients: Vec<NodeID> = if self.committee_nodes.is_empty() {
            self.server_nodes.clone()
        } else {
            self.committee_nodes.clone()
        };
        let recipients: Vec<NodeID> = recipients
            .into_iter()
            .filter(|node| *node != self.me)
            .collect();

        let request_ref = request.reference();
        let mut out = OutMessages::new();
        out.broadcast(&recipients, DistSyncMessage::ShareRequest { request, ttl: 0 });
        self.publish_share(request_ref, recipients.len(), 0);

        // Having the request to publish means it is no longer needed.
        self.needed.remove(&request_ref.key());
        out
    }

    fn on_request_needed(
        &mut self,
        request_ref: RequestRef,
        needed: bool,
    ) -> OutMessages<DistSyncMessage> {
        if !needed {
            self.needed.remove(&request_ref.key());
            return OutMessages::new();
        }
        self.needed.insert(request_ref.key(), request_ref);
        let mut out = OutMessages::new();
        let me = self.me;
        out.broadcast(
            self.committee_nodes.iter().filter(|node| **node != me),
            DistSyncMessage::MissingRequest { request_ref },
        );
        out
    }

    fn on_time_tick(&mut self) -> OutMessages<DistSyncMessage> {
        let mut out = OutMessages::new();
        let me = self.me;
        let mut nodes: Vec<NodeID> = self
            .server_nodes
            .iter()
            .copied()
            .filter(|node| *node != me)
            .collect();
        if self.needed.is_empty() || nodes.is_empty() {
            return out;
        }
        nodes.shuffle(&mut self.rng);
        for (request_ref, node) in self
            .needed
            .values()
            .zip(nodes.iter().cycle())
            .take(self.config.max_msgs_per_tick)
        {
            out.add(
                *node,
                DistSyncMessage::MissingRequest {
                    request_ref: *request_ref,
                },
            );
        }
        out
    }

    fn on_missing_request(
        &mut self,
        origin: NodeID,
        request_ref: RequestRef,
    ) -> OutMessages<DistSyncMessage> {
        let mut out = OutMessages::new();
        if let Some(request) = self.pool.get(&request_ref) {
            out.add(origin, DistSyncMessage::ShareRequest { request, ttl: 0 });
            self.publish_share(request_ref, 1, 0);
        }
        out
    }

    fn on_share_request(
        &mut self,
        origin: NodeID,
        request: Request,
        ttl: u8,
    ) -> OutMessages<DistSyncMessage> {
        let request_ref = request.reference();
        Event::publish(
            &self.event_publisher,
            Event::ReceiveRequest(ReceiveRequestEvent {
                timestamp: SystemTime::now(),
                origin,
                request: request_ref,
            }),
        );
        self.needed.remove(&request_ref.key());

        let mut out = OutMessages::new();
        if ttl > 0 {
            let ttl = ttl.min(MAX_TTL) - 1;
            let me = self.me;
            let mut peers: Vec<NodeID> = self
                .committee_nodes
                .iter()
                .copied()
                .filter(|node| *node != me && *node != origin)
                .collect();
            peers.shuffle(&mut self.rng);
            peers.truncate(self.node_count_to_share);
            out.broadcast(
                &peers,
                DistSyncMessage::ShareRequest {
                    request: request.clone(),
                    ttl,
                },
            );
            self.publish_share(request_ref, peers.len(), ttl);
        }
        self.pool.receive(request);
        out
    }

    fn publish_share(&self, request: RequestRef, recipients: usize, ttl: u8) {
        Event::publish(
            &self.event_publisher,
            Event::ShareRequest(ShareRequestEvent {
                timestamp: SystemTime::now(),
                request,
                recipients,
                ttl,
            }),
        );
    }
}

impl<P: RequestPool> Automaton for DistSync<P> {
    type Input = DistSyncInput;
    type Message = DistSyncMessage;
    type Output = ();

    fn input(&mut self, input: Self::Input) -> OutMessages<Self::Message> {
        match input {
            DistSyncInput::ServerNodes {
                server_nodes,
                committee_nodes,
            } => self.on_server_nodes(server_nodes, committee_nodes),
            DistSyncInput::AccessNodes {
                access_nodes,
                committee_nodes,
            } => self.on_access_nodes(access_nodes, committee_nodes),
            DistSyncInput::PublishRequest(request) => self.on_publish_request(request),
            DistSyncInput::RequestNeeded {
                request_ref,
                needed,
            } => self.on_request_needed(request_ref, needed),
            DistSyncInput::TimeTick => self.on_time_tick(),
        }
    }

    fn message(&mut self, origin: NodeID, msg: Self::Message) -> OutMessages<Self::Message> {
        match msg {
            DistSyncMessage::MissingRequest { request_ref } => {
                self.on_missing_request(origin, request_ref)
            }
            DistSyncMessage::ShareRequest { request, ttl } => {
                self.on_share_request(origin, request, ttl)
            }
        }
    }

    fn output(&self) -> Option<Self::Output> {
        None
    }

    fn status_string(&self) -> String {
        format!(
            "{{DS: needed={}, nodeCountToShare={}}}",
            self.needed.len(),
            self.node_count_to_share
        )
    }
}

// `nodes` extended with every committee node it does not contain yet.
fn with_committee(mut nodes: Vec<NodeID>, committee_nodes: &[NodeID]) -> Vec<NodeID> {
    for node in committee_nodes {
        if !nodes.contains(node) {
            nodes.push(*node);
        }
    }
    nodes
}
