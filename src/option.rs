use std::{num::NonZeroUsize, thread};

/// Configuration for a [`Sharded`](crate::sharded::Sharded) runtime.
#[derive(Debug, Clone)]
pub struct ShardedOptions {
    pub(crate) shards: usize,
    pub(crate) thread_name: String,
    pub(crate) queue_capacity: usize,
}

impl Default for ShardedOptions {
    fn default() -> Self {
        ShardedOptions {
            shards: thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1),
            thread_name: "shard".to_string(),
            queue_capacity: 128,
        }
    }
}

impl ShardedOptions {
    /// Number of shards to start; clamped to at least one.
    pub fn shards(self, shards: usize) -> Self {
        ShardedOptions {
            shards: shards.max(1),
            ..self
        }
    }

    /// Prefix of the shard thread names; the shard index is appended.
    pub fn thread_name(self, thread_name: impl Into<String>) -> Self {
        ShardedOptions {
            thread_name: thread_name.into(),
            ..self
        }
    }

    /// Capacity of each shard's job queue.
    pub fn queue_capacity(self, queue_capacity: usize) -> Self {
        ShardedOptions {
            queue_capacity: queue_capacity.max(1),
            ..self
        }
    }

    /// Configured shard count.
    pub fn shard_count(&self) -> usize {
        self.shards
    }
}
