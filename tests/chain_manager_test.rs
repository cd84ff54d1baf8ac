use std::sync::{
    mpsc::{self, Receiver},
    Arc,
};

use ed25519_dalek::SigningKey;

use anchored_chain::{
    chain_manager::{
        types::{ChainManagerConfiguration, ChainManagerInput, ChainManagerOutput},
        ChainManager,
    },
    events::Event,
    gpa::Automaton,
    types::{
        anchor_output::AnchorOutput,
        block::Block,
        data_types::{CommitteeAddress, LogIndex, NodeID},
        transaction::{FullSignature, SignedTransaction, TransactionEssence},
    },
};

mod common;

use common::{
    chain_factory::{anchor_output, committee_address, extend_chain, origin_store, CHAIN_ID},
    dk_share::{committee_shares, MockDKRegistry},
};

fn chain_manager(
    member_of: &[CommitteeAddress],
    pipelining_limit: usize,
) -> (ChainManager, Receiver<Event>) {
    let signing_key = SigningKey::from_bytes(&[1; 32]);
    let me = NodeID::from(signing_key.verifying_key());
    let mut registry = MockDKRegistry::new();
    for committee in member_of {
        let share = committee_shares(*committee, &[signing_key.clone()], 1).remove(0);
        registry = registry.with(share);
    }
    let (event_publisher, events) = mpsc::channel();
    let chain_manager = ChainManager::new(
        me,
        ChainManagerConfiguration { pipelining_limit },
        Arc::new(registry),
        Some(event_publisher),
    );
    (chain_manager, events)
}

fn output(chain_manager: &ChainManager) -> ChainManagerOutput {
    // Safety: the chain manager always has an output.
    chain_manager.output().unwrap()
}

// The need for consensus as (committee, log index, base).
fn need(chain_manager: &ChainManager) -> Option<(CommitteeAddress, LogIndex, AnchorOutput)> {
    output(chain_manager)
        .need_consensus
        .map(|need| (need.committee, need.log_index, need.base))
}

// A transaction `committee` signed that consumes `base` and anchors `block`.
fn signed_transaction(
    committee: CommitteeAddress,
    base: &AnchorOutput,
    block: &Block,
) -> (SignedTransaction, AnchorOutput) {
    let essence = TransactionEssence {
        chain_id: CHAIN_ID,
        consumed: base.output_id,
        committee,
        next_state_index: block.state_index,
        l1_commitment: block.l1_commitment(),
    };
    let produced = essence.produced_anchor_output();
    (
        SignedTransaction {
            essence,
            signature: FullSignature(Vec::new()),
        },
        produced,
    )
}

fn done(
    chain_manager: &mut ChainManager,
    committee: CommitteeAddress,
    log_index: u32,
    base: &AnchorOutput,
    block: &Block,
) -> (SignedTransaction, AnchorOutput) {
    let (transaction, produced) = signed_transaction(committee, base, block);
    chain_manager.input(ChainManagerInput::ConsensusOutputDone {
        committee,
        log_index: LogIndex::new(log_index),
        base: base.clone(),
        transaction: transaction.clone(),
        produced: produced.clone(),
    });
    (transaction, produced)
}

fn rotations(events: &Receiver<Event>) -> Vec<(Option<CommitteeAddress>, CommitteeAddress)> {
    events
        .try_iter()
        .filter_map(|event| match event {
            Event::CommitteeRotation(rotation) => Some((rotation.from, rotation.to)),
            _ => None,
        })
        .collect()
}

/// Tests committees taking turns controlling the chain, including one coming back.
#[test]
fn committee_rotation_test() {
    let (mut store, origin) = origin_store();
    let blocks = extend_chain(&mut store, &origin, 2, 0);
    let (first, second) = (committee_address(1), committee_address(2));
    let (mut chain_manager, events) = chain_manager(&[first, second], 3);

    // 1. Nothing is needed before anything is confirmed.
    assert!(need(&chain_manager).is_none());
    assert!(output(&chain_manager).active_committee.is_none());

    // 2. The first committee's output starts its log at 1.
    let origin_output = anchor_output(first, &origin, 1);
    chain_manager.input(ChainManagerInput::AnchorOutputConfirmed(origin_output.clone()));
    assert_eq!(
        need(&chain_manager),
        Some((first, LogIndex::new(1), origin_output))
    );

    // 3. The chain moves to the second committee, which starts at 1 too.
    let second_output = anchor_output(second, &blocks[0], 2);
    chain_manager.input(ChainManagerInput::AnchorOutputConfirmed(second_output.clone()));
    assert_eq!(
        need(&chain_manager),
        Some((second, LogIndex::new(1), second_output))
    );

    // 4. The first committee comes back, and resumes after the last log index it used.
    let back_output = anchor_output(first, &blocks[1], 3);
    chain_manager.input(ChainManagerInput::AnchorOutputConfirmed(back_output.clone()));
    assert_eq!(
        need(&chain_manager),
        Some((first, LogIndex::new(2), back_output.clone()))
    );
    assert_eq!(output(&chain_manager).latest_confirmed, Some(back_output));

    assert_eq!(
        rotations(&events),
        vec![(None, first), (Some(first), second), (Some(second), first)]
    );
}

/// Tests that an output of another committee drops the outputs the active committee built ahead of
/// confirmation.
#[test]
fn rotation_drops_pipeline_test() {
    let (mut store, origin) = origin_store();
    let blocks = extend_chain(&mut store, &origin, 2, 0);
    let (first, second) = (committee_address(1), committee_address(2));
    let (mut chain_manager, _) = chain_manager(&[first, second], 3);
    let origin_output = anchor_output(first, &origin, 1);
    chain_manager.input(ChainManagerInput::AnchorOutputConfirmed(origin_output.clone()));

    // 1. The first committee produces state indices 1 and 2, neither confirmed.
    let (_, first_produced) = done(&mut chain_manager, first, 1, &origin_output, &blocks[0]);
    done(&mut chain_manager, first, 2, &first_produced, &blocks[1]);
    assert_eq!(output(&chain_manager).need_publish_tx.len(), 2);

    // 2. The second committee's output at state index 2 is confirmed instead.
    let rotated = anchor_output(second, &blocks[1], 2);
    chain_manager.input(ChainManagerInput::AnchorOutputConfirmed(rotated.clone()));
    let after = output(&chain_manager);
    assert!(after.need_publish_tx.is_empty());
    assert_eq!(after.active_committee, Some(second));
    assert_eq!(need(&chain_manager), Some((second, LogIndex::new(1), rotated)));
}

/// Tests that stale outputs are ignored, and that the same output confirmed twice changes nothing.
#[test]
fn stale_output_test() {
    let (mut store, origin) = origin_store();
    let blocks = extend_chain(&mut store, &origin, 1, 0);
    let committee = committee_address(1);
    let (mut chain_manager, _) = chain_manager(&[committee], 3);

    let latest = anchor_output(committee, &blocks[0], 2);
    chain_manager.input(ChainManagerInput::AnchorOutputConfirmed(latest.clone()));
    chain_manager.input(ChainManagerInput::AnchorOutputConfirmed(anchor_output(
        committee, &origin, 1,
    )));
    chain_manager.input(ChainManagerInput::AnchorOutputConfirmed(latest.clone()));
    assert_eq!(output(&chain_manager).latest_confirmed, Some(latest.clone()));
    assert_eq!(need(&chain_manager), Some((committee, LogIndex::new(1), latest)));
}

#[test]
#[should_panic]
fn conflicting_outputs_test() {
    let (_, origin) = origin_store();
    let committee = committee_address(1);
    let (mut chain_manager, _) = chain_manager(&[committee], 3);
    chain_manager.input(ChainManagerInput::AnchorOutputConfirmed(anchor_output(
        committee, &origin, 1,
    )));
    chain_manager.input(ChainManagerInput::AnchorOutputConfirmed(anchor_output(
        committee, &origin, 2,
    )));
}

/// Tests building on produced outputs ahead of their confirmation, up to the pipelining limit.
#[test]
fn pipelining_test() {
    let (mut store, origin) = origin_store();
    let blocks = extend_chain(&mut store, &origin, 3, 0);
    let committee = committee_address(1);
    let (mut chain_manager, _) = chain_manager(&[committee], 2);
    let origin_output = anchor_output(committee, &origin, 1);
    chain_manager.input(ChainManagerInput::AnchorOutputConfirmed(origin_output.clone()));

    // 1. The session at 1 signs a transaction, which has to be published. The session at 2 builds
    //    on the output it produces.
    let (first_tx, first_produced) = done(&mut chain_manager, committee, 1, &origin_output, &blocks[0]);
    let after_first = output(&chain_manager);
    assert_eq!(after_first.need_publish_tx.len(), 1);
    assert_eq!(after_first.need_publish_tx[0].transaction, first_tx);
    assert_eq!(
        need(&chain_manager),
        Some((committee, LogIndex::new(2), first_produced.clone()))
    );

    // 2. A second produced output reaches the limit.
    let (_, second_produced) = done(&mut chain_manager, committee, 2, &first_produced, &blocks[1]);
    assert!(need(&chain_manager).is_none());
    assert_eq!(output(&chain_manager).need_publish_tx.len(), 2);

    // 3. Outputs of log indices other than the current one are ignored.
    done(&mut chain_manager, committee, 2, &first_produced, &blocks[1]);
    assert_eq!(output(&chain_manager).need_publish_tx.len(), 2);

    // 4. The first output is confirmed, which frees a slot.
    chain_manager.input(ChainManagerInput::AnchorOutputConfirmed(first_produced));
    let after_confirm = output(&chain_manager);
    assert_eq!(after_confirm.need_publish_tx.len(), 1);
    assert_eq!(after_confirm.need_publish_tx[0].log_index, LogIndex::new(2));
    assert_eq!(
        need(&chain_manager),
        Some((committee, LogIndex::new(3), second_produced))
    );
}

/// Tests that a rejected transaction abandons everything built on it, and work resumes on the latest
/// confirmed output at a fresh log index.
#[test]
fn publish_rejection_test() {
    let (mut store, origin) = origin_store();
    let blocks = extend_chain(&mut store, &origin, 2, 0);
    let committee = committee_address(1);
    let (mut chain_manager, _) = chain_manager(&[committee], 3);
    let origin_output = anchor_output(committee, &origin, 1);
    chain_manager.input(ChainManagerInput::AnchorOutputConfirmed(origin_output.clone()));

    let (first_tx, first_produced) = done(&mut chain_manager, committee, 1, &origin_output, &blocks[0]);
    done(&mut chain_manager, committee, 2, &first_produced, &blocks[1]);

    // 1. A result for an unknown transaction changes nothing.
    chain_manager.input(ChainManagerInput::ChainTxPublishResult {
        committee,
        log_index: LogIndex::new(2),
        transaction: first_tx.id(),
        confirmed: false,
    });
    assert_eq!(output(&chain_manager).need_publish_tx.len(), 2);

    // 2. The first transaction is rejected.
    chain_manager.input(ChainManagerInput::ChainTxPublishResult {
        committee,
        log_index: LogIndex::new(1),
        transaction: first_tx.id(),
        confirmed: false,
    });
    assert!(output(&chain_manager).need_publish_tx.is_empty());
    assert_eq!(
        need(&chain_manager),
        Some((committee, LogIndex::new(4), origin_output))
    );
}

/// Tests that a confirmed output the committee did not produce abandons the produced ones.
#[test]
fn unexpected_confirmation_test() {
    let (mut store, origin) = origin_store();
    let blocks = extend_chain(&mut store, &origin, 1, 0);
    let fork = extend_chain(&mut store, &origin, 1, 1);
    let committee = committee_address(1);
    let (mut chain_manager, _) = chain_manager(&[committee], 3);
    let origin_output = anchor_output(committee, &origin, 1);
    chain_manager.input(ChainManagerInput::AnchorOutputConfirmed(origin_output.clone()));
    done(&mut chain_manager, committee, 1, &origin_output, &blocks[0]);

    let other = anchor_output(committee, &fork[0], 2);
    chain_manager.input(ChainManagerInput::AnchorOutputConfirmed(other.clone()));
    assert!(output(&chain_manager).need_publish_tx.is_empty());
    assert_eq!(need(&chain_manager), Some((committee, LogIndex::new(3), other)));
}

/// Tests skipped sessions, outputs of inactive committees, and nodes outside the committee.
#[test]
fn skip_and_access_node_test() {
    let (mut store, origin) = origin_store();
    let blocks = extend_chain(&mut store, &origin, 1, 0);
    let (member, foreign) = (committee_address(1), committee_address(2));
    let (mut chain_manager, _) = chain_manager(&[member], 3);
    let origin_output = anchor_output(member, &origin, 1);
    chain_manager.input(ChainManagerInput::AnchorOutputConfirmed(origin_output.clone()));

    // 1. A skipped session moves the log on the same base.
    chain_manager.input(ChainManagerInput::ConsensusOutputSkip {
        committee: member,
        log_index: LogIndex::new(1),
        base: origin_output.clone(),
    });
    assert_eq!(
        need(&chain_manager),
        Some((member, LogIndex::new(2), origin_output.clone()))
    );

    // 2. An output of another committee is ignored.
    done(&mut chain_manager, foreign, 2, &origin_output, &blocks[0]);
    assert!(output(&chain_manager).need_publish_tx.is_empty());

    // 3. A committee this node holds no share of is followed, but no session is needed.
    let foreign_output = anchor_output(foreign, &blocks[0], 2);
    chain_manager.input(ChainManagerInput::AnchorOutputConfirmed(foreign_output));
    let access = output(&chain_manager);
    assert_eq!(access.active_committee, Some(foreign));
    assert!(access.need_consensus.is_none());
}

/// Tests that successive needs for one committee always move to a higher log index, whatever moves
/// the log on.
#[test]
fn log_index_monotonicity_test() {
    let (mut store, origin) = origin_store();
    let blocks = extend_chain(&mut store, &origin, 3, 0);
    let committee = committee_address(1);
    let (mut chain_manager, _) = chain_manager(&[committee], 3);
    let mut log_indices = Vec::new();
    let mut record = |chain_manager: &ChainManager| {
        if let Some((_, log_index, _)) = need(chain_manager) {
            if log_indices.last() != Some(&log_index) {
                log_indices.push(log_index);
            }
        }
    };

    // 1. Confirmation of the origin.
    let origin_output = anchor_output(committee, &origin, 1);
    chain_manager.input(ChainManagerInput::AnchorOutputConfirmed(origin_output.clone()));
    record(&chain_manager);

    // 2. A skip, then a produced output.
    chain_manager.input(ChainManagerInput::ConsensusOutputSkip {
        committee,
        log_index: LogIndex::new(1),
        base: origin_output.clone(),
    });
    record(&chain_manager);
    let (_, first_produced) = done(&mut chain_manager, committee, 2, &origin_output, &blocks[0]);
    record(&chain_manager);

    // 3. The produced output is confirmed, and another one is rejected.
    chain_manager.input(ChainManagerInput::AnchorOutputConfirmed(first_produced.clone()));
    record(&chain_manager);
    let (second_tx, _) = done(&mut chain_manager, committee, 3, &first_produced, &blocks[1]);
    record(&chain_manager);
    chain_manager.input(ChainManagerInput::ChainTxPublishResult {
        committee,
        log_index: LogIndex::new(3),
        transaction: second_tx.id(),
        confirmed: false,
    });
    record(&chain_manager);

    assert!(log_indices.len() >= 4);
    assert!(log_indices.windows(2).all(|pair| pair[0] < pair[1]));
}
