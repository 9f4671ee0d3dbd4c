use std::{io, sync::Arc};

use thiserror::Error;

use super::ShardId;

/// Errors raised while starting shards or submitting work to them.
#[derive(Debug, Clone, Error)]
pub enum ShardError {
    /// The addressed shard does not exist in this runtime.
    #[error("no such shard: {0}")]
    NoSuchShard(ShardId),
    /// The shard's job queue is closed; the shard has stopped.
    #[error("{0} has stopped")]
    Stopped(ShardId),
    /// The shard dropped the job before producing a result.
    #[error("{0} dropped the job before it completed")]
    Dropped(ShardId),
    /// Spawning the shard thread failed.
    #[error("failed to spawn shard thread: {0}")]
    Spawn(Arc<io::Error>),
    /// Building the shard's executor failed.
    #[error("failed to build runtime for {shard}: {source}")]
    Runtime {
        /// Shard whose runtime failed to start.
        shard: ShardId,
        /// Underlying runtime construction error.
        source: Arc<io::Error>,
    },
}
