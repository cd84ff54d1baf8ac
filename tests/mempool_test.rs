use std::{cell::Cell, collections::BTreeMap, rc::Rc, sync::mpsc};

use anchored_chain::{
    gpa::Automaton,
    mempool::{
        dist_sync::{DistSync, DistSyncConfiguration, DistSyncInput, MAX_TTL},
        messages::DistSyncMessage,
        request_pool::{RequestPool, RequestPools},
        Mempool, MempoolInput,
    },
    state_manager::inputs::StateDiff,
    store::Store,
    types::{
        cancellation::CancelToken,
        data_types::{NodeID, StateIndex},
        request::{processed_request_key, RequestRef},
        state::ChainState,
    },
};

mod common;

use common::{
    chain_factory::{anchor_output, committee_address, off_ledger_request, origin_store},
    test_context::TestContext,
};

fn nodes(count: u8) -> Vec<NodeID> {
    (0..count).map(|i| NodeID::new([i; 32])).collect()
}

fn mempools(nodes: &[NodeID]) -> Vec<Mempool> {
    nodes
        .iter()
        .map(|node| {
            let mut mempool = Mempool::new(*node, DistSyncConfiguration::default(), None);
            mempool.input(MempoolInput::ServerNodes {
                server_nodes: nodes.to_vec(),
                committee_nodes: nodes.to_vec(),
            });
            mempool
        })
        .collect()
}

/// Tests that a request received by one node of a committee of 4 reaches every other node.
#[test]
fn dissemination_test() {
    // 1. Set up a committee of 4 nodes, which tolerates 1 faulty node.
    let nodes = nodes(4);
    let mut context = TestContext::new(nodes.clone(), mempools(&nodes));
    assert!(context
        .automatons()
        .iter()
        .all(|mempool| mempool.dist_sync().node_count_to_share() == 2));

    // 2. Node 0 receives a request, and shares it with the 3 other nodes. Nobody forwards it further.
    let request = off_ledger_request(nodes[0], 1);
    context.input(0, MempoolInput::ReceiveRequests(vec![request.clone()]));
    assert_eq!(context.delivered(), 3);

    // 3. Every node has the request.
    for mempool in context.automatons() {
        assert!(mempool.pools().has(&request.reference()));
        assert_eq!(mempool.pools().get(&request.reference()), Some(request.clone()));
    }

    // 4. Receiving the same request again shares nothing.
    context.input(0, MempoolInput::ReceiveRequests(vec![request]));
    assert_eq!(context.delivered(), 3);
}

/// Tests that a node the initial share never reached still gets the request once it needs it.
#[test]
fn lossy_dissemination_test() {
    // 1. Everything node 0 sends to node 3 is lost.
    let nodes = nodes(4);
    let (from, to) = (nodes[0], nodes[3]);
    let mut context = TestContext::new(nodes.clone(), mempools(&nodes))
        .with_message_loss(move |sender, recipient| sender == from && recipient == to);

    // 2. Node 0 shares a request, which does not reach node 3.
    let request = off_ledger_request(nodes[0], 1);
    context.input(0, MempoolInput::ReceiveRequests(vec![request.clone()]));
    assert_eq!(context.dropped(), 1);
    assert!(!context.node(3).pools().has(&request.reference()));

    // 3. Node 3 needs it, and gets it from another committee node.
    let (requests_sender, requests) = mpsc::channel();
    context.input(
        3,
        MempoolInput::ConsensusRequests {
            request_refs: vec![request.reference()],
            cancel: CancelToken::new(),
            respond: Box::new(move |requests| requests_sender.send(requests).unwrap()),
        },
    );
    assert_eq!(requests.try_recv().unwrap(), vec![request.clone()]);
    assert!(context.node(3).pools().has(&request.reference()));
    assert!(!context.node(3).dist_sync().is_needed(&request.reference()));
}

/// Tests that a shared request with a positive TTL is forwarded to `F+1` other committee nodes with a
/// decreased TTL, and not forwarded at all with a TTL of 0.
#[test]
fn ttl_forwarding_test() {
    let nodes = nodes(4);
    let mut dist_sync = DistSync::new(
        nodes[0],
        RequestPools::new(),
        DistSyncConfiguration::default(),
        None,
    );
    dist_sync.input(DistSyncInput::ServerNodes {
        server_nodes: Vec::new(),
        committee_nodes: nodes.clone(),
    });

    // 1. A TTL above the maximum is capped.
    let request = off_ledger_request(nodes[1], 1);
    let out = dist_sync.message(
        nodes[1],
        DistSyncMessage::ShareRequest {
            request: request.clone(),
            ttl: MAX_TTL + 3,
        },
    );
    assert_eq!(out.len(), dist_sync.node_count_to_share());
    for msg in out {
        assert!(msg.recipient != nodes[0] && msg.recipient != nodes[1]);
        assert_eq!(
            msg.message,
            DistSyncMessage::ShareRequest {
                request: request.clone(),
                ttl: MAX_TTL - 1,
            }
        );
    }
    assert!(dist_sync.pool().get(&request.reference()).is_some());

    // 2. A TTL of 0 ends the relay.
    let other = off_ledger_request(nodes[2], 1);
    let out = dist_sync.message(
        nodes[2],
        DistSyncMessage::ShareRequest {
            request: other.clone(),
            ttl: 0,
        },
    );
    assert!(out.is_empty());
    assert!(dist_sync.pool().get(&other.reference()).is_some());
}

/// Tests that a needed request is asked for from the committee, then from one more server node on
/// every tick, until it arrives.
#[test]
fn request_needed_test() {
    let nodes = nodes(4);
    let mut dist_sync = DistSync::new(
        nodes[0],
        RequestPools::new(),
        DistSyncConfiguration::default(),
        None,
    );
    dist_sync.input(DistSyncInput::ServerNodes {
        server_nodes: nodes.clone(),
        committee_nodes: nodes[..3].to_vec(),
    });
    let request = off_ledger_request(nodes[3], 1);
    let request_ref = request.reference();

    // 1. The committee nodes other than this one are asked.
    let out = dist_sync.input(DistSyncInput::RequestNeeded {
        request_ref,
        needed: true,
    });
    assert_eq!(out.len(), 2);
    assert!(dist_sync.is_needed(&request_ref));

    // 2. A tick asks one more node.
    let out = dist_sync.input(DistSyncInput::TimeTick);
    assert_eq!(out.len(), 1);

    // 3. Once the request arrives, ticks ask nobody.
    dist_sync.message(nodes[3], DistSyncMessage::ShareRequest { request, ttl: 0 });
    assert!(!dist_sync.is_needed(&request_ref));
    assert!(dist_sync.input(DistSyncInput::TimeTick).is_empty());

    // 4. A request that is no longer needed is not asked for.
    let other = off_ledger_request(nodes[3], 2).reference();
    dist_sync.input(DistSyncInput::RequestNeeded {
        request_ref: other,
        needed: true,
    });
    dist_sync.input(DistSyncInput::RequestNeeded {
        request_ref: other,
        needed: false,
    });
    assert_eq!(dist_sync.needed_count(), 0);
}

/// Tests that a consensus proposal is answered only once there is a request to propose, and that
/// cancelled questions are never answered.
#[test]
fn parked_proposal_test() {
    let (_, origin) = origin_store();
    let me = NodeID::new([0; 32]);
    let mut mempool = Mempool::new(me, DistSyncConfiguration::default(), None);

    // 1. Ask for a proposal on an empty pool, twice, and cancel the second question.
    let (proposal_sender, proposals) = mpsc::channel::<Vec<RequestRef>>();
    let sender = proposal_sender.clone();
    mempool.input(MempoolInput::ConsensusProposal {
        anchor_output: anchor_output(committee_address(1), &origin, 1),
        cancel: CancelToken::new(),
        respond: Box::new(move |refs| sender.send(refs).unwrap()),
    });
    let cancel = CancelToken::new();
    let sender = proposal_sender;
    mempool.input(MempoolInput::ConsensusProposal {
        anchor_output: anchor_output(committee_address(2), &origin, 1),
        cancel: cancel.clone(),
        respond: Box::new(move |refs| sender.send(refs).unwrap()),
    });
    cancel.cancel();
    assert!(proposals.try_recv().is_err());

    // 2. A request arrives, and only the live question is answered.
    let request = off_ledger_request(me, 1);
    mempool.input(MempoolInput::ReceiveRequests(vec![request.clone()]));
    assert_eq!(proposals.try_recv().unwrap(), vec![request.reference()]);
    assert!(proposals.try_recv().is_err());
}

/// Tests that decided requests missing locally are fetched from peers before being handed to the
/// session.
#[test]
fn missing_decided_request_test() {
    let nodes = nodes(4);
    let partitioned = Rc::new(Cell::new(true));
    let lossy = Rc::clone(&partitioned);
    let mut context =
        TestContext::new(nodes.clone(), mempools(&nodes)).with_message_loss(move |_, _| lossy.get());

    // 1. Only node 1 has the request: the shares it sends out are lost.
    let request = off_ledger_request(nodes[1], 1);
    let request_ref = request.reference();
    context.input(1, MempoolInput::ReceiveRequests(vec![request.clone()]));
    assert_eq!(context.dropped(), 3);
    partitioned.set(false);

    // 2. Node 0 needs it, asks the committee, and node 1 answers.
    let (requests_sender, requests) = mpsc::channel();
    context.input(
        0,
        MempoolInput::ConsensusRequests {
            request_refs: vec![request_ref],
            cancel: CancelToken::new(),
            respond: Box::new(move |requests| requests_sender.send(requests).unwrap()),
        },
    );

    // 3. Node 0 hands the request over.
    assert_eq!(requests.try_recv().unwrap(), vec![request]);
    assert!(!context.node(0).dist_sync().is_needed(&request_ref));
}

/// Tests that requests processed on the chain head leave the pool, and that requests processed by
/// unconfirmed blocks stay in the pool but are not proposed.
#[test]
fn processed_requests_test() {
    let (mut store, origin) = origin_store();
    let me = NodeID::new([0; 32]);
    let mut mempool = Mempool::new(me, DistSyncConfiguration::default(), None);
    let first = off_ledger_request(me, 1);
    let second = off_ledger_request(me, 2);
    let third = off_ledger_request(me, 3);
    mempool.input(MempoolInput::ReceiveRequests(vec![
        first.clone(),
        second.clone(),
        third.clone(),
    ]));
    assert_eq!(mempool.pools().len(), 3);

    // 1. A block this node produced processes `second`.
    let mut draft = store.new_state_draft(&origin.l1_commitment()).unwrap();
    draft.set(processed_request_key(&second.id()), vec![1]);
    let block = store.commit(draft).unwrap();
    mempool.input(MempoolInput::BlockApplied(block));

    let (sender, proposals) = mpsc::channel::<Vec<RequestRef>>();
    mempool.input(MempoolInput::ConsensusProposal {
        anchor_output: anchor_output(committee_address(1), &origin, 1),
        cancel: CancelToken::new(),
        respond: Box::new(move |refs| sender.send(refs).unwrap()),
    });
    let proposal = proposals.try_recv().unwrap();
    assert_eq!(proposal.len(), 2);
    assert!(!proposal.contains(&second.reference()));
    assert_eq!(mempool.pools().len(), 3);

    // 2. The chain head moves to a state in which `first` is processed.
    let mut kvs = BTreeMap::new();
    kvs.insert(processed_request_key(&first.id()), vec![1]);
    let new_state = ChainState::new(StateIndex::new(1), kvs);
    mempool.input(MempoolInput::ChainHead {
        l1_commitment: origin.l1_commitment(),
        diff: StateDiff {
            new_state,
            added: Vec::new(),
            removed: Vec::new(),
        },
    });
    assert_eq!(mempool.pools().len(), 2);
    assert!(!mempool.pools().has(&first.reference()));
    assert_eq!(mempool.chain_head(), Some(origin.l1_commitment()));

    // 3. A processed request is not added again.
    let out = mempool.input(MempoolInput::ReceiveRequests(vec![first]));
    assert!(out.is_empty());
    assert_eq!(mempool.pools().len(), 2);
    assert!(mempool.pools().has(&third.reference()));
}

/// Tests that a request nobody waits for anymore is no longer asked for.
#[test]
fn abandoned_request_test() {
    let nodes = nodes(4);
    let mut mempools = mempools(&nodes);
    let request_ref = off_ledger_request(nodes[1], 1).reference();
    let other_ref = off_ledger_request(nodes[1], 2).reference();

    // 1. Two sessions wait for missing requests, one of them shared by both.
    let first_cancel = CancelToken::new();
    mempools[0].input(MempoolInput::ConsensusRequests {
        request_refs: vec![request_ref, other_ref],
        cancel: first_cancel.clone(),
        respond: Box::new(|_| {}),
    });
    let second_cancel = CancelToken::new();
    mempools[0].input(MempoolInput::ConsensusRequests {
        request_refs: vec![other_ref],
        cancel: second_cancel.clone(),
        respond: Box::new(|_| {}),
    });
    assert_eq!(mempools[0].dist_sync().needed_count(), 2);

    // 2. The first session is cancelled: only the request the second still waits for is looked for.
    first_cancel.cancel();
    mempools[0].input(MempoolInput::TimerTick);
    assert!(!mempools[0].dist_sync().is_needed(&request_ref));
    assert!(mempools[0].dist_sync().is_needed(&other_ref));

    // 3. The second session is cancelled too, and ticks stop asking anybody.
    second_cancel.cancel();
    mempools[0].input(MempoolInput::TimerTick);
    assert_eq!(mempools[0].dist_sync().needed_count(), 0);
    for _ in 0..10 {
        assert!(mempools[0].input(MempoolInput::TimerTick).is_empty());
    }
}

/// Tests that a request processed on the new chain head is no longer asked for.
#[test]
fn processed_needed_request_test() {
    let (_, origin) = origin_store();
    let nodes = nodes(4);
    let mut mempools = mempools(&nodes);
    let request_ref = off_ledger_request(nodes[1], 1).reference();

    // 1. A session waits for a request this node does not have.
    mempools[0].input(MempoolInput::ConsensusRequests {
        request_refs: vec![request_ref],
        cancel: CancelToken::new(),
        respond: Box::new(|_| {}),
    });
    assert!(mempools[0].dist_sync().is_needed(&request_ref));

    // 2. The chain head moves to a state recording it as processed.
    let mut kvs = BTreeMap::new();
    kvs.insert(processed_request_key(&request_ref.id), vec![1]);
    let new_state = ChainState::new(StateIndex::new(1), kvs);
    mempools[0].input(MempoolInput::ChainHead {
        l1_commitment: origin.l1_commitment(),
        diff: StateDiff {
            new_state,
            removed: Vec::new(),
            added: Vec::new(),
        },
    });
    assert!(!mempools[0].dist_sync().is_needed(&request_ref));
}
