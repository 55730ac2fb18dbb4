/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Subprotocol that catches a lagging replica up with the decided heights of its shard.
//!
//! ## Status
//!
//! Every replica with a key runs a [sync server](server), which periodically broadcasts a
//! [`StatusMessage`](messages::StatusMessage) naming the range of heights whose commits it holds. The
//! [sync client](client) of every other replica remembers the latest status of each peer.
//!
//! ## Catch-up
//!
//! When some peer's committed height shows that the network has moved at least
//! `sync_trigger_min_height_difference` heights past the local replica, the algorithm thread stops
//! processing progress messages and hands control to the sync client. The client picks a random peer
//! able to serve the current height, and asks it for one height at a time with
//! [`SyncValueRequest`](messages::SyncValueRequest)s. Every response is checked before it is applied:
//! 1. It must be for the requested height.
//! 2. Its commit certificate must carry precommits from a quorum of the validator set of that height.
//! 3. The value source must accept its full value.
//!
//! A peer that fails any of these checks, or does not answer in time, is blacklisted for a while and
//! catch-up ends. It starts again with another peer if the replica is still behind.
//!
//! ## Vote set backfill
//!
//! A replica that is live but missing votes of its current height asks a peer for them with a
//! [`SyncVoteSetRequest`](messages::SyncVoteSetRequest). Both sides of this exchange are handled by the
//! algorithm thread, since answering and applying them reads and writes the vote aggregator.

pub mod messages;

pub(crate) mod client;

pub(crate) mod server;
