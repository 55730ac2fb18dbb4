use std::{
    thread,
    time::{Duration, Instant},
};

use ed25519_dalek::SigningKey;
use log::LevelFilter;
use rand_core::OsRng;

use shard_bft::types::validator_set::ValidatorSet;

mod common;

use common::{
    logging::{log_with_context, setup_logger},
    network::mock_network,
    node::{Node, INITIAL_HEIGHT},
};

/// Tests that a replica that does not vote follows the decisions of the validators of its shard.
#[test]
fn read_node_test() {
    setup_logger(LevelFilter::Info);

    // 1. Generate signing keys for 3 validators and 1 read node, and connect them all.
    let mut csprg = OsRng {};
    let mut keypairs: Vec<SigningKey> = (0..4).map(|_| SigningKey::generate(&mut csprg)).collect();
    let mut network_stubs = mock_network(keypairs.iter().map(|kp| kp.verifying_key()));

    let read_node_keypair = keypairs.split_off(3).remove(0);
    let read_node_network = network_stubs.split_off(3).remove(0);

    // 2. Only the first 3 replicas are validators.
    let validator_set = ValidatorSet::equally_weighted(keypairs.iter().map(|kp| kp.verifying_key()));

    let read_node = Node::new(
        3,
        read_node_keypair,
        read_node_network,
        validator_set.clone(),
        false,
    );
    let validators: Vec<Node> = keypairs
        .into_iter()
        .zip(network_stubs)
        .enumerate()
        .map(|(index, (keypair, network))| {
            Node::new(index as u8, keypair, network, validator_set.clone(), true)
        })
        .collect();

    // 3. Wait until the read node has seen 3 heights decided.
    let last_block_number = INITIAL_HEIGHT + 2;
    log_with_context(
        None,
        &format!("Waiting until the read node commits height {}.", last_block_number),
    );
    let deadline = Instant::now() + Duration::from_secs(120);
    while !read_node.has_committed(last_block_number)
        || !validators[0].has_committed(last_block_number)
    {
        assert!(Instant::now() < deadline, "Read node did not keep up in time");
        thread::sleep(Duration::from_millis(200));
    }

    // 4. The read node agrees with the validators, but never voted.
    for block_number in INITIAL_HEIGHT..=last_block_number {
        assert_eq!(
            read_node.commit(block_number).unwrap().value,
            validators[0].commit(block_number).unwrap().value
        );
    }
    assert!(read_node
        .applied()
        .iter()
        .all(|(commits, _)| commits.signatures.iter().all(|signature| signature.signer
            != read_node.verifying_key().to_bytes())));
    assert_eq!(read_node.votes_cast(), 0);
}
