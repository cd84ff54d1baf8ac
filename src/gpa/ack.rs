/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Acknowledgement and redelivery on top of an unreliable transport.
//!
//! [`AckHandler`] is itself an [`Automaton`] that wraps another one:
//! 1. Every message the inner automaton sends is given a sequence number ([`MessageID`]) and kept
//!    until the recipient acknowledges it.
//! 2. On every [`AckInput::Tick`], messages that have not been acknowledged within the redelivery
//!    period are sent again.
//! 3. Every received message is acknowledged, including duplicates, but only the first copy is passed
//!    on to the inner automaton.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    time::{Duration, Instant},
};

use borsh::{BorshDeserialize, BorshSerialize};

use super::automaton::{Automaton, OutMessages};
use crate::types::data_types::NodeID;

/// Sequence number of a message sent by an [`AckHandler`]. Unique per sender.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshSerialize, BorshDeserialize,
)]
pub struct MessageID(u64);

impl MessageID {
    pub const fn int(&self) -> u64 {
        self.0
    }
}

/// Wire message of an [`AckHandler`]: an optional numbered payload, and acknowledgements of
/// payloads previously received from the recipient.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct AckMessage<M> {
    pub payload: Option<(MessageID, M)>,
    pub acks: Vec<MessageID>,
}

pub enum AckInput<I> {
    /// Input for the wrapped automaton.
    Inner(I),

    /// Periodic timer tick, used to redeliver unacknowledged messages.
    Tick(Instant),
}

struct Unacked<M> {
    message: M,
    sent_at: Instant,
}

pub struct AckHandler<A: Automaton> {
    inner: A,
    redelivery_period: Duration,
    next_id: u64,
    now: Instant,
    unacked: BTreeMap<(NodeID, MessageID), Unacked<A::Message>>,
    delivered: HashMap<NodeID, HashSet<MessageID>>,
}

impl<A: Automaton> AckHandler<A> {
    pub fn new(inner: A, redelivery_period: Duration) -> Self {
        Self {
            inner,
            redelivery_period,
            next_id: 0,
            now: Instant::now(),
            unacked: BTreeMap::new(),
            delivered: HashMap::new(),
        }
    }

    pub fn inner(&self) -> &A {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut A {
        &mut self.inner
    }

    /// Number of sent messages still waiting for an acknowledgement.
    pub fn unacked_count(&self) -> usize {
        self.unacked.len()
    }

    // Number and remember the inner automaton's messages.
    fn wrap(&mut self, msgs: OutMessages<A::Message>) -> OutMessages<AckMessage<A::Message>> {
        msgs.map(|recipient, message| {
            let id = MessageID(self.next_id);
            self.next_id += 1;
            self.unacked.insert(
                (recipient, id),
                Unacked {
                    message: message.clone(),
                    sent_at: self.now,
                },
            );
            AckMessage {
                payload: Some((id, message)),
                acks: Vec::new(),
            }
        })
    }

    fn redeliver(&mut self, now: Instant) -> OutMessages<AckMessage<A::Message>> {
        self.now = now;
        let mut out = OutMessages::new();
        for ((recipient, id), unacked) in self.unacked.iter_mut() {
            if now.saturating_duration_since(unacked.sent_at) >= self.redelivery_period {
                unacked.sent_at = now;
                out.add(
                    *recipient,
                    AckMessage {
                        payload: Some((*id, unacked.message.clone())),
                        acks: Vec::new(),
                    },
                );
            }
        }
        if !out.is_empty() {
            log::debug!("Redelivering {} unacknowledged messages.", out.len());
        }
        out
    }
}

impl<A: Automaton> Automaton for AckHandler<A> {
    type Input = AckInput<A::Input>;
    type Message = AckMessage<A::Message>;
    type Output = A::Output;

    fn input(&mut self, input: Self::Input) -> OutMessages<Self::Message> {
        match input {
            AckInput::Inner(input) => {
                let msgs = self.inner.input(input);
                self.wrap(msgs)
            }
            AckInput::Tick(now) => self.redeliver(now),
        }
    }

    fn message(&mut self, origin: NodeID, msg: Self::Message) -> OutMessages<Self::Message> {
        for id in msg.acks {
            self.unacked.remove(&(origin, id));
        }

        let mut out = OutMessages::new();
        if let Some((id, payload)) = msg.payload {
            out.add(
                origin,
                AckMessage {
                    payload: None,
                    acks: vec![id],
                },
            );
            if self.delivered.entry(origin).or_default().insert(id) {
                let msgs = self.inner.message(origin, payload);
                out.append(self.wrap(msgs));
            }
        }
        out
    }

    fn output(&self) -> Option<Self::Output> {
        self.inner.output()
    }

    fn status_string(&self) -> String {
        format!(
            "{{ACK: unacked={}, {}}}",
            self.unacked.len(),
            self.inner.status_string()
        )
    }
}
