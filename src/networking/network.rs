/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

use crate::types::{crypto_primitives::VerifyingKey, validator_set::ValidatorSet};

use super::messages::Message;

pub trait Network: Clone + Send {
    /// Inform the network provider of the validator set of the height the replica starts at.
    fn init_validator_set(&mut self, validator_set: ValidatorSet);

    /// Inform the network provider that a new height with `validator_set` has been entered.
    fn update_validator_set(&mut self, validator_set: ValidatorSet);

    /// Send a message to all peers (including read nodes) without blocking.
    fn broadcast(&mut self, message: Message);

    /// Send a message to the specified peer without blocking.
    fn send(&mut self, peer: VerifyingKey, message: Message);

    /// Receive a message from any peer. Returns immediately with a None if no message is available now.
    fn recv(&mut self) -> Option<(VerifyingKey, Message)>;
}

/// Handle for informing the network provider about the validator set of every height entered.
///
/// Validator sets may differ between heights, and the network provider may want to connect to
/// validators that have just joined.
#[derive(Clone)]
pub(crate) struct ValidatorSetUpdateHandle<N: Network> {
    network: N,
}

impl<N: Network> ValidatorSetUpdateHandle<N> {
    pub(crate) fn new(network: N) -> Self {
        Self { network }
    }

    pub(crate) fn update_validator_set(&mut self, validator_set: ValidatorSet) {
        self.network.update_validator_set(validator_set)
    }
}
