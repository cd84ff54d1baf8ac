use std::sync::Arc;

use ed25519_dalek::SigningKey;

use anchored_chain::{
    consensus::{
        collaborators::{DKShare, VirtualMachine},
        messages::ConsensusMessage,
        types::{AgreementProposal, SessionInput, SessionOutput, SessionResult, SessionState},
        ConsensusSession,
    },
    gpa::{Automaton, OutMessages},
    store::{BlockStore, Store},
    types::{
        anchor_output::AnchorOutput,
        block::Block,
        data_types::{LogIndex, NodeID, StateIndex},
        request::{processed_request_key, Request},
    },
};

mod common;

use common::{
    chain_factory::{
        anchor_output, committee_address, extend_chain, off_ledger_request, origin_store, CHAIN_ID,
    },
    collaborators::CounterVM,
    dk_share::{committee_shares, MockDKShare},
    mem_db::MemDB,
};

fn signing_keys(count: u8) -> Vec<SigningKey> {
    (1..=count).map(|i| SigningKey::from_bytes(&[i; 32])).collect()
}

fn new_session(share: &Arc<MockDKShare>) -> ConsensusSession {
    let me = share.committee_nodes()[share.share_index() as usize];
    ConsensusSession::new(CHAIN_ID, me, LogIndex::new(1), Arc::clone(share) as Arc<dyn DKShare>)
}

fn output(session: &ConsensusSession) -> SessionOutput {
    // Safety: a session always has an output.
    session.output().unwrap()
}

// Drive `session` from its start on `base` until it needs its own signature share, answering every
// need the way the driver would. Returns the payload to sign.
fn produce_block(
    session: &mut ConsensusSession,
    store: &mut BlockStore<MemDB>,
    vm: &CounterVM,
    base: &AnchorOutput,
    requests: &[Request],
) -> Vec<u8> {
    let request_refs: Vec<_> = requests.iter().map(Request::reference).collect();

    // 1. The mempool and the state manager answer the proposal.
    session.input(SessionInput::Proposal { base: base.clone() });
    session.input(SessionInput::MempoolProposal(request_refs.clone()));
    session.input(SessionInput::StateProposalConfirmed);

    // 2. The committee agrees on the proposal.
    let proposal = output(session).need_agreement.unwrap();
    session.input(SessionInput::AgreedBatch {
        base: proposal.base,
        request_refs: proposal.request_refs,
    });

    // 3. The decided requests and state are provided, and the VM is run.
    session.input(SessionInput::MempoolRequests(requests.to_vec()));
    let state = store
        .state_by_trie_root(&base.l1_commitment.trie_root)
        .unwrap()
        .unwrap();
    session.input(SessionInput::DecidedState(state));
    let task = output(session).need_vm_run.unwrap();
    session.input(SessionInput::VMResult(vm.run(task)));

    // 4. The block is saved.
    let draft = output(session).need_block_save.unwrap();
    let block = store.commit(draft).unwrap();
    session.input(SessionInput::BlockSaved(block));

    let output = output(session);
    assert_eq!(output.state, SessionState::WaitSignaturesCollected);
    output.need_signature_share.unwrap()
}

fn done(session: &ConsensusSession) -> (AnchorOutput, Block, AnchorOutput) {
    match output(session).result {
        Some(SessionResult::Done {
            base,
            block,
            produced,
            ..
        }) => (base, block, produced),
        other => panic!("Session is not done: {:?}", other),
    }
}

/// Tests a committee of one producing a block, step by step.
#[test]
fn single_member_session_test() {
    let (mut store, origin) = origin_store();
    let committee = committee_address(1);
    let share = committee_shares(committee, &signing_keys(1), 1).remove(0);
    let mut session = new_session(&share);
    let base = anchor_output(committee, &origin, 1);
    let request = off_ledger_request(NodeID::new([9; 32]), 1);
    let vm = CounterVM::new();

    // 1. Before the proposal, the session needs nothing.
    let initial = output(&session);
    assert_eq!(initial.state, SessionState::Created);
    assert!(initial.need_mempool_proposal.is_none());

    // 2. The proposal asks the mempool and the state manager.
    session.input(SessionInput::Proposal { base: base.clone() });
    let after_proposal = output(&session);
    assert_eq!(after_proposal.state, SessionState::WaitInputsReady);
    assert_eq!(after_proposal.need_mempool_proposal, Some(base.clone()));
    assert_eq!(after_proposal.need_state_proposal, Some(base.clone()));

    // 3. Once both answer, the agreement is needed.
    session.input(SessionInput::MempoolProposal(vec![request.reference()]));
    assert_eq!(output(&session).state, SessionState::WaitProposal);
    session.input(SessionInput::StateProposalConfirmed);
    let after_inputs = output(&session);
    assert_eq!(after_inputs.state, SessionState::WaitAgreedBatch);
    assert_eq!(
        after_inputs.need_agreement,
        Some(AgreementProposal {
            base: base.clone(),
            request_refs: vec![request.reference()],
        })
    );

    // 4. The agreed batch asks for the requests and the state, and only then for a VM run.
    session.input(SessionInput::AgreedBatch {
        base: base.clone(),
        request_refs: vec![request.reference()],
    });
    let after_agreement = output(&session);
    assert_eq!(after_agreement.state, SessionState::WaitVMResult);
    assert_eq!(
        after_agreement.need_mempool_requests,
        Some(vec![request.reference()])
    );
    assert_eq!(after_agreement.need_decided_state, Some(base.clone()));
    assert!(after_agreement.need_vm_run.is_none());

    session.input(SessionInput::MempoolRequests(vec![request.clone()]));
    let state = store.state_by_trie_root(&origin.trie_root).unwrap().unwrap();
    session.input(SessionInput::DecidedState(state));
    let task = output(&session).need_vm_run.unwrap();
    assert_eq!(task.anchor_output, base);
    assert_eq!(task.requests, vec![request.clone()]);

    // 5. The VM result is turned into a block that records the request as processed.
    session.input(SessionInput::VMResult(vm.run(task)));
    assert!(output(&session).need_vm_run.is_none());
    let draft = output(&session).need_block_save.unwrap();
    assert!(draft.get(&processed_request_key(&request.id())).is_some());
    assert_eq!(draft.state_index(), StateIndex::new(1));
    let block = store.commit(draft).unwrap();
    session.input(SessionInput::BlockSaved(block.clone()));

    // 6. This node's share is enough to recover the full signature. Nobody else is sent it.
    let payload = output(&session).need_signature_share.unwrap();
    let out = session.input(SessionInput::SignatureShareProduced(share.sign_partial(&payload)));
    assert!(out.is_empty());
    let (done_base, done_block, produced) = done(&session);
    assert_eq!(done_base, base);
    assert_eq!(done_block, block);
    assert_eq!(produced.committee, committee);
    assert_eq!(produced.state_index, StateIndex::new(1));
    assert_eq!(produced.l1_commitment, block.l1_commitment());
    assert_eq!(output(&session).state, SessionState::WaitPublishAcknowledged);

    // 7. The session completes once the publication is acknowledged. Late inputs change nothing.
    session.input(SessionInput::PublishAcknowledged { confirmed: true });
    assert_eq!(output(&session).state, SessionState::Completed);
    session.input(SessionInput::MempoolProposal(Vec::new()));
    assert_eq!(output(&session).state, SessionState::Completed);
    assert_eq!(vm.runs(), 1);
}

/// Tests that an empty agreed batch, and a batch of requests that are all processed already, skip the
/// session without running the VM.
#[test]
fn skipped_session_test() {
    let (mut store, origin) = origin_store();
    let committee = committee_address(1);
    let share = committee_shares(committee, &signing_keys(1), 1).remove(0);
    let base = anchor_output(committee, &origin, 1);

    // 1. An empty batch.
    let mut session = new_session(&share);
    session.input(SessionInput::Proposal { base: base.clone() });
    session.input(SessionInput::MempoolProposal(Vec::new()));
    session.input(SessionInput::StateProposalConfirmed);
    assert_eq!(output(&session).state, SessionState::WaitAgreedBatch);
    session.input(SessionInput::AgreedBatch {
        base: base.clone(),
        request_refs: Vec::new(),
    });
    let skipped = output(&session);
    assert_eq!(skipped.state, SessionState::Skipped);
    assert!(skipped.need_vm_run.is_none());
    assert!(matches!(&skipped.result, Some(SessionResult::Skipped { base: b }) if *b == base));

    // 2. A batch of a request processed on the base already.
    let request = off_ledger_request(NodeID::new([9; 32]), 1);
    let mut draft = store.new_state_draft(&origin.l1_commitment()).unwrap();
    draft.set(processed_request_key(&request.id()), vec![1]);
    let processed = store.commit(draft).unwrap();
    let base = anchor_output(committee, &processed, 2);

    let mut session = new_session(&share);
    session.input(SessionInput::Proposal { base: base.clone() });
    session.input(SessionInput::AgreedBatch {
        base: base.clone(),
        request_refs: vec![request.reference()],
    });
    session.input(SessionInput::MempoolRequests(vec![request]));
    let state = store
        .state_by_trie_root(&processed.trie_root)
        .unwrap()
        .unwrap();
    session.input(SessionInput::DecidedState(state));
    let skipped = output(&session);
    assert_eq!(skipped.state, SessionState::Skipped);
    assert!(skipped.need_vm_run.is_none());
}

/// Tests that answers which do not match what was asked for are ignored.
#[test]
fn mismatched_answers_test() {
    let (mut store, origin) = origin_store();
    let committee = committee_address(1);
    let share = committee_shares(committee, &signing_keys(1), 1).remove(0);
    let base = anchor_output(committee, &origin, 1);
    let request = off_ledger_request(NodeID::new([9; 32]), 1);

    let mut session = new_session(&share);
    session.input(SessionInput::Proposal { base: base.clone() });
    session.input(SessionInput::AgreedBatch {
        base: base.clone(),
        request_refs: vec![request.reference()],
    });

    // 1. Requests other than the decided ones.
    session.input(SessionInput::MempoolRequests(vec![off_ledger_request(
        NodeID::new([9; 32]),
        2,
    )]));
    assert!(output(&session).need_mempool_requests.is_some());

    // 2. A state other than the base's.
    let other = extend_chain(&mut store, &origin, 1, 3).remove(0);
    let other_state = store.state_by_trie_root(&other.trie_root).unwrap().unwrap();
    session.input(SessionInput::DecidedState(other_state));
    assert!(output(&session).need_decided_state.is_some());
    assert!(output(&session).need_vm_run.is_none());

    // 3. A VM result on the wrong base fails the session.
    session.input(SessionInput::MempoolRequests(vec![request]));
    let state = store.state_by_trie_root(&origin.trie_root).unwrap().unwrap();
    session.input(SessionInput::DecidedState(state));
    let task = output(&session).need_vm_run.unwrap();
    let wrong = store.new_state_draft(&other.l1_commitment()).unwrap();
    assert_ne!(wrong.base_l1_commitment(), task.state_draft.base_l1_commitment());
    session.input(SessionInput::VMResult(Ok(wrong)));
    let failed = output(&session);
    assert_eq!(failed.state, SessionState::Failed);
    assert!(matches!(failed.result, Some(SessionResult::Failed(_))));
}

/// Tests two members of a 2-of-2 committee exchanging their signature shares, one of which arrives
/// before the receiver saved its block.
#[test]
fn share_exchange_test() {
    let (mut store, origin) = origin_store();
    let committee = committee_address(1);
    let shares = committee_shares(committee, &signing_keys(2), 2);
    let nodes = shares[0].committee_nodes();
    let mut first = new_session(&shares[0]);
    let mut second = new_session(&shares[1]);
    let base = anchor_output(committee, &origin, 1);
    let requests = vec![off_ledger_request(NodeID::new([9; 32]), 1)];
    let vm = CounterVM::new();

    // 1. The first member produces its block and its share.
    let payload = produce_block(&mut first, &mut store, &vm, &base, &requests);
    let out = first.input(SessionInput::SignatureShareProduced(
        shares[0].sign_partial(&payload),
    ));
    let sent: Vec<_> = out.into_iter().collect();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].recipient, nodes[1]);
    assert_eq!(output(&first).state, SessionState::WaitSignaturesCollected);

    // 2. The second member receives the share before it has a block.
    second.message(nodes[0], sent[0].message.clone());
    assert_eq!(output(&second).state, SessionState::WaitBaseAnchorOutput);

    // 3. A share not signed by the member it claims to be from is ignored.
    let forged = match &sent[0].message {
        ConsensusMessage::SignatureShare {
            transaction,
            partial,
        } => {
            let mut partial = partial.clone();
            partial.share_index = 1;
            ConsensusMessage::SignatureShare {
                transaction: *transaction,
                partial,
            }
        }
    };
    first.message(nodes[1], forged);
    assert_eq!(output(&first).state, SessionState::WaitSignaturesCollected);

    // 4. The second member produces the same block, and its own share completes its signature.
    let second_payload = produce_block(&mut second, &mut store, &vm, &base, &requests);
    assert_eq!(second_payload, payload);
    let out: OutMessages<ConsensusMessage> = second.input(SessionInput::SignatureShareProduced(
        shares[1].sign_partial(&second_payload),
    ));
    let (_, second_block, second_produced) = done(&second);

    // 5. The first member completes once it receives the second member's share.
    for msg in out {
        assert_eq!(msg.recipient, nodes[0]);
        first.message(nodes[1], msg.message);
    }
    let (_, first_block, first_produced) = done(&first);
    assert_eq!(first_block, second_block);
    assert_eq!(first_produced, second_produced);
    assert_eq!(vm.runs(), 2);
}

/// Tests that a restarted session keeps what holds for the same base, and asks again for the rest.
#[test]
fn restart_test() {
    let (store, origin) = origin_store();
    let committee = committee_address(1);
    let share = committee_shares(committee, &signing_keys(1), 1).remove(0);
    let base = anchor_output(committee, &origin, 1);
    let request = off_ledger_request(NodeID::new([9; 32]), 1);

    let mut session = new_session(&share);
    session.input(SessionInput::Proposal { base: base.clone() });
    session.input(SessionInput::StateProposalConfirmed);
    session.input(SessionInput::MempoolProposal(vec![request.reference()]));
    session.input(SessionInput::AgreedBatch {
        base: base.clone(),
        request_refs: vec![request.reference()],
    });
    let state = store.state_by_trie_root(&origin.trie_root).unwrap().unwrap();
    session.input(SessionInput::DecidedState(state));

    // 1. Restart, and propose on the same base again.
    session.restart();
    assert_eq!(output(&session).state, SessionState::Created);
    session.input(SessionInput::Proposal { base: base.clone() });

    // 2. The state manager is not asked again, the mempool is.
    let restarted = output(&session);
    assert!(restarted.need_state_proposal.is_none());
    assert_eq!(restarted.need_mempool_proposal, Some(base));
    assert!(restarted.need_decided_state.is_none());

    // 3. Terminal sessions do not restart.
    session.input(SessionInput::MempoolProposal(Vec::new()));
    let proposal = output(&session).need_agreement.unwrap();
    session.input(SessionInput::AgreedBatch {
        base: proposal.base,
        request_refs: proposal.request_refs,
    });
    assert_eq!(output(&session).state, SessionState::Skipped);
    session.restart();
    assert_eq!(output(&session).state, SessionState::Skipped);
}
