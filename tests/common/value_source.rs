//! [`CounterValueSource`], a simple implementation of [`ValueSource`] used in all of the integration
//! tests.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use borsh::{BorshDeserialize, BorshSerialize};
use shard_bft::{
    commits::types::Commits,
    types::{
        crypto_primitives::hash,
        data_types::{Height, ShardHash},
    },
    value_source::ValueSource,
};

/// The full content of every value that a [`CounterValueSource`] proposes.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub(crate) struct CounterValue {
    pub(crate) proposer: u8,
    pub(crate) height: Height,
    pub(crate) counter: u32,
}

/// A value source whose values name the replica that proposed them, the height they were proposed for,
/// and how many values the replica had proposed before.
///
/// Every applied value is appended to a shared log that tests can inspect through
/// [`applied`](CounterValueSource::applied).
pub(crate) struct CounterValueSource {
    proposer: u8,
    counter: u32,
    proposed: HashMap<ShardHash, Vec<u8>>,
    applied: Arc<Mutex<Vec<(Commits, CounterValue)>>>,
}

impl CounterValueSource {
    pub(crate) fn new(proposer: u8) -> Self {
        Self {
            proposer,
            counter: 0,
            proposed: HashMap::new(),
            applied: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Get a handle to the log of applied values, which stays readable after the value source is moved
    /// into a replica.
    pub(crate) fn applied(&self) -> Arc<Mutex<Vec<(Commits, CounterValue)>>> {
        self.applied.clone()
    }
}

pub(crate) fn value_of(height: Height, full_value: &[u8]) -> ShardHash {
    ShardHash::new(height.shard_index(), hash(full_value))
}

impl ValueSource for CounterValueSource {
    fn propose(&mut self, height: Height) -> (ShardHash, Vec<u8>) {
        let full_value = CounterValue {
            proposer: self.proposer,
            height,
            counter: self.counter,
        }
        .try_to_vec()
        .unwrap();
        self.counter += 1;

        let value = value_of(height, &full_value);
        self.proposed.insert(value, full_value.clone());
        (value, full_value)
    }

    fn validate(&mut self, height: Height, value: &ShardHash, full_value: &[u8]) -> bool {
        match CounterValue::deserialize(&mut &*full_value) {
            Ok(counter_value) => {
                counter_value.height == height && *value == value_of(height, full_value)
            }
            Err(_) => false,
        }
    }

    fn resolve(&self, value: &ShardHash) -> Option<Vec<u8>> {
        self.proposed.get(value).cloned()
    }

    fn apply(&mut self, commits: &Commits, full_value: &[u8]) {
        let counter_value = CounterValue::deserialize(&mut &*full_value).unwrap();
        self.applied
            .lock()
            .unwrap()
            .push((commits.clone(), counter_value));
    }
}
