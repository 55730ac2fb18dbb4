/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Pluggable peer-to-peer (P2P) networking.
//!
//! Replicas reach each other by their verifying keys. The library user provides the transport by
//! implementing [`Network`](network::Network), and the crate's threads interact with it only through the
//! handles and stubs defined in [`sending`] and [`receiving`].

pub mod network;

pub mod messages;

pub(crate) mod receiving;

pub(crate) mod sending;
