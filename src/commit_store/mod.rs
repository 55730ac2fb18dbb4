/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The persistent state of a replica: decided values and their commit certificates.
//!
//! # Pluggable persistence
//!
//! - The commit store is kept in persistent storage, most probably in the host's filesystem.
//! - Library users get to choose how exactly this is done.
//! - This crate merely requires that whatever the user provides as a persistence mechanism implements
//!   the abstract functionality of a key-value store with atomic, batched writes.
//! - This abstract functionality is made concrete by the traits defined in the [`pluggables`] module.
//!
//! The [`variables`] submodule lists everything the commit store persists, and where.
//!
//! # At most one commit per height
//!
//! [`CommitStore`] refuses to overwrite the commit of a height with a commit for a different value, and
//! treats rewriting the same commit as a no-op. This makes persisting a decision idempotent, so that
//! the same decision reached live and through catch-up is only applied once.

use borsh::BorshSerialize;

use crate::{commits::types::Commits, types::data_types::Height};

use self::{
    pluggables::{KVGet, KVGetError, KVStore, Key, WriteBatch},
    variables::{concat, COMMITS, DECIDED_VALUES, HIGHEST_COMMITTED_HEIGHT, LOWEST_COMMITTED_HEIGHT},
};

pub mod pluggables;

pub mod variables;

/// Typed read and write handle into the user-provided key-value store.
///
/// Only the algorithm thread writes through a `CommitStore`. The sync server holds a clone, which it
/// only reads from.
#[derive(Clone)]
pub struct CommitStore<K: KVStore>(K);

impl<K: KVStore> CommitStore<K> {
    pub fn new(kv_store: K) -> Self {
        CommitStore(kv_store)
    }

    /// Get the commit certificate of `height`, if a value was decided at that height.
    pub fn get_commit(&self, height: Height) -> Result<Option<Commits>, CommitStoreError> {
        Ok(self.0.commits(height)?)
    }

    /// Get the full bytes of the value decided at `height`.
    pub fn decided_value(&self, height: Height) -> Option<Vec<u8>> {
        self.0.decided_value(height)
    }

    /// Get both the commit certificate and the full bytes of the value decided at `height`, read from the
    /// same snapshot of the store.
    pub fn decided(&self, height: Height) -> Result<Option<(Commits, Vec<u8>)>, CommitStoreError> {
        let snapshot = self.0.snapshot();
        match snapshot.commits(height)? {
            None => Ok(None),
            Some(commits) => {
                let full_value = snapshot.decided_value(height).ok_or(
                    KVGetError::ValueExpectedButNotFound {
                        key: Key::DecidedValue { height },
                    },
                )?;
                Ok(Some((commits, full_value)))
            }
        }
    }

    pub fn highest_committed_height(
        &self,
        shard_index: u32,
    ) -> Result<Option<Height>, CommitStoreError> {
        Ok(self.0.highest_committed_height(shard_index)?)
    }

    pub fn lowest_committed_height(
        &self,
        shard_index: u32,
    ) -> Result<Option<Height>, CommitStoreError> {
        Ok(self.0.lowest_committed_height(shard_index)?)
    }

    /// Persist `commits` as the commit certificate of `height`.
    ///
    /// Returns `Ok(false)` without writing anything if the same certificate value is already stored at
    /// `height`, and `Ok(true)` if it was written.
    ///
    /// # Errors
    ///
    /// Returns [`CommitStoreError::ConflictingCommit`] if a commit for a different value is already
    /// stored at `height`, and [`CommitStoreError::MismatchedHeight`] if `commits` is not for `height`.
    pub fn put_commit(&mut self, height: Height, commits: &Commits) -> Result<bool, CommitStoreError> {
        self.put(height, commits, None)
    }

    /// Persist `commits` together with the `full_value` it certifies in a single atomic write.
    ///
    /// Has the same return values and errors as [`put_commit`](Self::put_commit).
    pub fn put_decided_value(
        &mut self,
        height: Height,
        commits: &Commits,
        full_value: &[u8],
    ) -> Result<bool, CommitStoreError> {
        self.put(height, commits, Some(full_value))
    }

    fn put(
        &mut self,
        height: Height,
        commits: &Commits,
        full_value: Option<&[u8]>,
    ) -> Result<bool, CommitStoreError> {
        if commits.height != height {
            return Err(CommitStoreError::MismatchedHeight {
                height,
                commits_height: commits.height,
            });
        }

        if let Some(existing) = self.0.commits(height)? {
            return if existing.value == commits.value {
                Ok(false)
            } else {
                Err(CommitStoreError::ConflictingCommit { height })
            };
        }

        let mut wb = CommitStoreWriteBatch::<K::WriteBatch>::new();
        wb.set_commits(height, commits);
        if let Some(full_value) = full_value {
            wb.set_decided_value(height, full_value);
        }

        let shard_index = height.shard_index();
        if self
            .0
            .highest_committed_height(shard_index)?
            .map_or(true, |highest| height > highest)
        {
            wb.set_highest_committed_height(height);
        }
        if self
            .0
            .lowest_committed_height(shard_index)?
            .map_or(true, |lowest| height < lowest)
        {
            wb.set_lowest_committed_height(height);
        }

        self.0.write(wb.0);
        Ok(true)
    }
}

/// Typed wrapper around the user-provided [`WriteBatch`] that forms the keys of commit store variables.
struct CommitStoreWriteBatch<W: WriteBatch>(W);

impl<W: WriteBatch> CommitStoreWriteBatch<W> {
    fn new() -> Self {
        CommitStoreWriteBatch(W::new())
    }

    fn set_commits(&mut self, height: Height, commits: &Commits) {
        self.0.set(
            &concat(&COMMITS, &height.to_le_bytes()),
            // Safety: Borsh serialization into memory does not fail.
            &commits.try_to_vec().unwrap(),
        );
    }

    fn set_decided_value(&mut self, height: Height, full_value: &[u8]) {
        self.0
            .set(&concat(&DECIDED_VALUES, &height.to_le_bytes()), full_value);
    }

    fn set_highest_committed_height(&mut self, height: Height) {
        self.0.set(
            &concat(&HIGHEST_COMMITTED_HEIGHT, &height.shard_index().to_le_bytes()),
            // Safety: Borsh serialization into memory does not fail.
            &height.try_to_vec().unwrap(),
        );
    }

    fn set_lowest_committed_height(&mut self, height: Height) {
        self.0.set(
            &concat(&LOWEST_COMMITTED_HEIGHT, &height.shard_index().to_le_bytes()),
            // Safety: Borsh serialization into memory does not fail.
            &height.try_to_vec().unwrap(),
        );
    }
}

/// Enumerates the different ways reading from or writing into a [`CommitStore`] can fail.
#[derive(Debug)]
pub enum CommitStoreError {
    /// See: [`KVGetError`].
    KVGetError(KVGetError),

    /// A different value than the one being written is already committed at `height`. Writing it would
    /// finalize two values at one height.
    ConflictingCommit { height: Height },

    /// The certificate being written is for `commits_height`, not for the `height` it was to be stored at.
    MismatchedHeight {
        height: Height,
        commits_height: Height,
    },
}

impl From<KVGetError> for CommitStoreError {
    fn from(value: KVGetError) -> Self {
        CommitStoreError::KVGetError(value)
    }
}
