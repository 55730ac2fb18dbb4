use std::{
    thread,
    time::{Duration, Instant},
};

use ed25519_dalek::SigningKey;
use log::LevelFilter;
use rand_core::OsRng;

use shard_bft::{
    networking::network::Network,
    types::{signed_messages::Certificate, validator_set::ValidatorSet},
};

mod common;

use common::{
    logging::{first_seven_base64_chars, log_with_context, setup_logger},
    network::mock_network,
    node::{Node, INITIAL_HEIGHT},
};

/// Tests catch-up.
///
/// Starts a network with three of four validators, makes progress with them, then starts the fourth (a
/// "lagging" replica) and confirms that it fetches every value it missed, each with a correct commit
/// certificate, and then keeps up with the others.
#[test]
fn sync_test() {
    setup_logger(LevelFilter::Info);

    // 1. Initialize test components.

    // 1.1. Generate signing keys for 4 replicas.
    let mut csprg = OsRng {};
    let mut keypairs: Vec<SigningKey> = (0..4).map(|_| SigningKey::generate(&mut csprg)).collect();

    // 1.2. Create a mock network connecting the 4 replicas.
    let mut network_stubs = mock_network(keypairs.iter().map(|kp| kp.verifying_key()));

    // 1.3. All 4 replicas are validators, so the first 3 make up a quorum on their own.
    let validator_set = ValidatorSet::equally_weighted(keypairs.iter().map(|kp| kp.verifying_key()));

    // 1.4. Split off the last keypair and network stub (these will be used to create the lagging replica
    // later on in the test).
    let lagging_replica_keypair = keypairs.split_off(3).remove(0);
    let mut lagging_replica_network = network_stubs.split_off(3).remove(0);

    // 1.5. Simultaneously start the first 3 replicas.
    let live_nodes: Vec<Node> = keypairs
        .into_iter()
        .zip(network_stubs)
        .enumerate()
        .map(|(index, (keypair, network))| {
            Node::new(index as u8, keypair, network, validator_set.clone(), true)
        })
        .collect();

    // 2. Make progress with the live replicas.
    let synced_block_number = INITIAL_HEIGHT + 3;
    log_with_context(
        None,
        &format!(
            "Waiting until the live replicas commit height {}.",
            synced_block_number
        ),
    );
    let deadline = Instant::now() + Duration::from_secs(120);
    while !live_nodes
        .iter()
        .all(|node| node.has_committed(synced_block_number))
    {
        assert!(Instant::now() < deadline, "Live replicas did not make progress in time");
        thread::sleep(Duration::from_millis(200));
    }

    // 3. Start the lagging replica and wait until it has caught up. Progress messages it missed while
    // offline are discarded first, so that it can only catch up through sync.
    while lagging_replica_network.recv().is_some() {}
    let lagging_node = Node::new(
        3,
        lagging_replica_keypair,
        lagging_replica_network,
        validator_set.clone(),
        true,
    );
    log_with_context(
        Some(&lagging_node.verifying_key().to_bytes()),
        &format!(
            "Started lagging replica {}, waiting until it commits height {}.",
            first_seven_base64_chars(&lagging_node.verifying_key().to_bytes()),
            synced_block_number
        ),
    );
    let deadline = Instant::now() + Duration::from_secs(120);
    while !lagging_node.has_committed(synced_block_number) {
        assert!(Instant::now() < deadline, "Lagging replica did not catch up in time");
        thread::sleep(Duration::from_millis(200));
    }

    // 4. The lagging replica must hold the values the live replicas decided, each certified by a quorum.
    for block_number in INITIAL_HEIGHT..=synced_block_number {
        let commits = lagging_node.commit(block_number).unwrap();
        assert!(commits.is_correctly_signed(&validator_set));
        assert_eq!(commits.value, live_nodes[0].commit(block_number).unwrap().value);
        assert_eq!(
            lagging_node.decided_value(block_number),
            live_nodes[0].decided_value(block_number)
        );
    }

    // 5. Every synced value was applied exactly once, in height order.
    let applied = lagging_node.applied();
    for (offset, (commits, _)) in applied.iter().enumerate() {
        assert_eq!(commits.height.block_number(), INITIAL_HEIGHT + offset as u64);
    }

    // 6. After catching up, the lagging replica keeps committing together with the others.
    let next_block_number = lagging_node.highest_committed_block_number().unwrap() + 2;
    log_with_context(
        None,
        &format!(
            "Waiting until every replica commits height {}.",
            next_block_number
        ),
    );
    let deadline = Instant::now() + Duration::from_secs(120);
    while !live_nodes
        .iter()
        .chain(std::iter::once(&lagging_node))
        .all(|node| node.has_committed(next_block_number))
    {
        assert!(Instant::now() < deadline, "Replicas did not make progress in time");
        thread::sleep(Duration::from_millis(200));
    }
    assert_eq!(
        lagging_node.commit(next_block_number).unwrap().value,
        live_nodes[0].commit(next_block_number).unwrap().value
    );

    // 7. The missed heights were fetched through sync rather than decided locally.
    assert!(lagging_node.values_synced() > 0);
}
