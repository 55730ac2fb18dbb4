use std::{
    thread,
    time::{Duration, Instant},
};

use ed25519_dalek::SigningKey;
use log::LevelFilter;
use rand_core::OsRng;

use shard_bft::types::{signed_messages::Certificate, validator_set::ValidatorSet};

mod common;

use common::{
    logging::{log_with_context, setup_logger},
    network::mock_network,
    node::{Node, INITIAL_HEIGHT},
};

/// Tests that four honest validators decide the same values at consecutive heights of a shard.
///
/// Every replica is expected to store a correctly signed certificate for the same value at each height,
/// and to apply each decided value exactly once, in height order.
#[test]
fn consensus_test() {
    setup_logger(LevelFilter::Info);

    // 1. Initialize test components.

    // 1.1. Generate signing keys for 4 replicas.
    let mut csprg = OsRng {};
    let keypairs: Vec<SigningKey> = (0..4).map(|_| SigningKey::generate(&mut csprg)).collect();

    // 1.2. Create a mock network connecting the 4 replicas.
    let network_stubs = mock_network(keypairs.iter().map(|kp| kp.verifying_key()));

    // 1.3. Every replica is an equally weighted validator of the shard.
    let validator_set = ValidatorSet::equally_weighted(keypairs.iter().map(|kp| kp.verifying_key()));

    // 1.4. Start the 4 replicas.
    let nodes: Vec<Node> = keypairs
        .into_iter()
        .zip(network_stubs)
        .enumerate()
        .map(|(index, (keypair, network))| {
            Node::new(index as u8, keypair, network, validator_set.clone(), true)
        })
        .collect();

    // 2. Wait until every replica has committed 5 heights.
    let last_block_number = INITIAL_HEIGHT + 4;
    log_with_context(
        None,
        &format!("Waiting until every replica commits height {}.", last_block_number),
    );
    let deadline = Instant::now() + Duration::from_secs(120);
    while !nodes.iter().all(|node| node.has_committed(last_block_number)) {
        assert!(Instant::now() < deadline, "Replicas did not make progress in time");
        thread::sleep(Duration::from_millis(200));
    }

    // 3. Check that the replicas agree on every height.
    for block_number in INITIAL_HEIGHT..=last_block_number {
        let commits = nodes[0].commit(block_number).unwrap();
        assert!(commits.is_correctly_signed(&validator_set));
        let full_value = nodes[0].decided_value(block_number).unwrap();

        for node in &nodes[1..] {
            let other_commits = node.commit(block_number).unwrap();
            assert_eq!(other_commits.value, commits.value);
            assert!(other_commits.is_correctly_signed(&validator_set));
            assert_eq!(node.decided_value(block_number).unwrap(), full_value);
        }
    }

    // 4. Check that every replica applied the decided values in order, once each.
    for node in &nodes {
        let applied = node.applied();
        for (offset, (commits, counter_value)) in applied.iter().enumerate() {
            let block_number = INITIAL_HEIGHT + offset as u64;
            assert_eq!(commits.height.block_number(), block_number);
            assert_eq!(counter_value.height, commits.height);
        }
        assert!(applied.len() as u64 >= last_block_number - INITIAL_HEIGHT);
        assert!(node.votes_cast() > 0);
    }
}
