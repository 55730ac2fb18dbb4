/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Traits for pluggable commit store persistence.

use std::fmt::Display;

use borsh::BorshDeserialize;

use crate::{commits::types::Commits, types::data_types::Height};

use super::variables::{self, concat};

pub trait KVStore: KVGet + Clone + Send + 'static {
    type WriteBatch: WriteBatch;
    type Snapshot<'a>: 'a + KVGet;

    fn write(&mut self, wb: Self::WriteBatch);
    fn snapshot<'b>(&'b self) -> Self::Snapshot<'_>;
}

pub trait KVGet {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>>;

    /* ↓↓↓ Commits ↓↓↓ */

    fn commits(&self, height: Height) -> Result<Option<Commits>, KVGetError> {
        if let Some(bytes) = self.get(&concat(&variables::COMMITS, &height.to_le_bytes())) {
            Ok(Some(Commits::deserialize(&mut &*bytes).map_err(|err| {
                KVGetError::DeserializeValueError {
                    key: Key::Commits { height },
                    source: err,
                }
            })?))
        } else {
            Ok(None)
        }
    }

    /* ↓↓↓ Decided Values ↓↓↓ */

    fn decided_value(&self, height: Height) -> Option<Vec<u8>> {
        self.get(&concat(&variables::DECIDED_VALUES, &height.to_le_bytes()))
    }

    /* ↓↓↓ Highest and Lowest Committed Height ↓↓↓ */

    fn highest_committed_height(&self, shard_index: u32) -> Result<Option<Height>, KVGetError> {
        if let Some(bytes) = self.get(&concat(
            &variables::HIGHEST_COMMITTED_HEIGHT,
            &shard_index.to_le_bytes(),
        )) {
            Ok(Some(Height::deserialize(&mut &*bytes).map_err(|err| {
                KVGetError::DeserializeValueError {
                    key: Key::HighestCommittedHeight { shard_index },
                    source: err,
                }
            })?))
        } else {
            Ok(None)
        }
    }

    fn lowest_committed_height(&self, shard_index: u32) -> Result<Option<Height>, KVGetError> {
        if let Some(bytes) = self.get(&concat(
            &variables::LOWEST_COMMITTED_HEIGHT,
            &shard_index.to_le_bytes(),
        )) {
            Ok(Some(Height::deserialize(&mut &*bytes).map_err(|err| {
                KVGetError::DeserializeValueError {
                    key: Key::LowestCommittedHeight { shard_index },
                    source: err,
                }
            })?))
        } else {
            Ok(None)
        }
    }
}

/// Error when trying to read a value corresponding to a given key from the [key value store][KVStore].
/// The error may arise in the following circumstances:
/// 1. The value corresponding to a given key cannot be deserialized into its expected type,
/// 2. The value corresponding to a given key cannot be found even though another variable implies that
///    it must exist.
#[derive(Debug)]
pub enum KVGetError {
    DeserializeValueError { key: Key, source: std::io::Error },
    ValueExpectedButNotFound { key: Key },
}

#[derive(Debug)]
pub enum Key {
    Commits { height: Height },
    DecidedValue { height: Height },
    HighestCommittedHeight { shard_index: u32 },
    LowestCommittedHeight { shard_index: u32 },
}

impl Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Key::Commits { height } => write!(f, "Commits at height {}", height),
            Key::DecidedValue { height } => write!(f, "Decided value at height {}", height),
            Key::HighestCommittedHeight { shard_index } => {
                write!(f, "Highest committed height of shard {}", shard_index)
            }
            Key::LowestCommittedHeight { shard_index } => {
                write!(f, "Lowest committed height of shard {}", shard_index)
            }
        }
    }
}

pub trait WriteBatch {
    fn new() -> Self;
    fn set(&mut self, key: &[u8], value: &[u8]);
    fn delete(&mut self, key: &[u8]);
}
