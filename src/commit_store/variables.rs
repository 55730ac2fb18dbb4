/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Byte-prefixes that specify where each commit store variable is stored in the user-provided key-value
//! store.
//!
//! # List of variables
//!
//! |Variable|Type|Description|
//! |---|---|---|
//! |Commits|[`Height`](crate::types::data_types::Height) -> [`Commits`](crate::commits::types::Commits)|The quorum certificate of the value decided at each height.|
//! |Decided Values|[`Height`](crate::types::data_types::Height) -> `Vec<u8>`|The full bytes of the value decided at each height.|
//! |Highest Committed Height|`u32` -> [`Height`](crate::types::data_types::Height)|Per shard, the highest height that has a commit.|
//! |Lowest Committed Height|`u32` -> [`Height`](crate::types::data_types::Height)|Per shard, the lowest height that has a commit. Peers can only be served heights from here up.|
//!
//! # Persistence of variables
//!
//! Each variable is a mapping, stored as **Borsh-serialized values** at keys formed by concatenating the
//! variable's one-byte prefix with the key of the mapping:
//! - Mappings keyed by a `Height` use [`Height::to_le_bytes`](crate::types::data_types::Height::to_le_bytes).
//! - Mappings keyed by a shard index use `u32::to_le_bytes`.
//!
//! For example, the commit at height `h` is stored at `concat(&COMMITS, &h.to_le_bytes())`.

pub const COMMITS: [u8; 1] = [0];
pub const DECIDED_VALUES: [u8; 1] = [1];
pub const HIGHEST_COMMITTED_HEIGHT: [u8; 1] = [2];
pub const LOWEST_COMMITTED_HEIGHT: [u8; 1] = [3];

/// Concatenate two byteslices into one vector.
pub fn concat(a: &[u8], b: &[u8]) -> Vec<u8> {
    let mut res = Vec::with_capacity(a.len() + b.len());
    res.extend_from_slice(a);
    res.extend_from_slice(b);
    res
}
