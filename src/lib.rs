#![deny(missing_docs)]
//! Keyspace-wide major compaction for shard-per-core storage engines.
//!
//! A [`Sharded`](sharded::Sharded) runtime owns one thread per shard, each
//! holding its own [`Database`](replica::Database). Long-running operations are
//! modelled as tasks registered with a process-wide
//! [`TaskManager`](task::TaskManager) so they can be listed, observed and
//! aborted. [`force_keyspace_compaction`](compaction::force_keyspace_compaction)
//! starts a cluster-wide task that major-compacts a keyspace's tables on every
//! shard, smallest table first, skipping tables dropped along the way.

mod id;
mod observability;

/// Runtime configuration.
pub mod option;

/// Shard-per-core execution.
pub mod sharded;

/// Task registry, modules and handles.
pub mod task;

/// Shard-local tables and databases.
pub mod replica;

/// Major compaction orchestration.
pub mod compaction;

pub use crate::{
    compaction::{force_keyspace_compaction, CompactionError},
    option::ShardedOptions,
    sharded::{ShardId, Sharded},
    task::{TaskHandle, TaskManager},
};
