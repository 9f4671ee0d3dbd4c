//! Shard-per-core execution.
//!
//! A [`Sharded`] runtime owns one thread per shard. Each shard builds its own
//! state on its own thread and only ever touches it from there; other threads
//! reach it by submitting closures with [`Sharded::invoke_on`] or
//! [`Sharded::invoke_on_all`].

mod error;
mod shard;

use std::{fmt, future::Future, rc::Rc, sync::Arc};

use futures_util::stream::{FuturesUnordered, StreamExt};

pub use self::error::ShardError;
use self::shard::{Job, Message, ShardHandle};
use crate::{
    observability::{log_debug, log_info},
    option::ShardedOptions,
};

/// Index of a shard within a [`Sharded`] runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ShardId(u32);

impl ShardId {
    /// Wrap a raw shard index.
    #[must_use]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Raw shard index.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Shard executing on the calling thread, or `None` off-shard.
    #[must_use]
    pub fn current() -> Option<Self> {
        shard::current()
    }

    fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "shard-{}", self.0)
    }
}

/// Handle to a set of shards, each owning an `S`.
///
/// Cloning is cheap; all clones address the same shards.
pub struct Sharded<S> {
    inner: Arc<Inner<S>>,
}

struct Inner<S> {
    shards: Vec<ShardHandle<S>>,
}

impl<S> Clone for Sharded<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S> fmt::Debug for Sharded<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sharded")
            .field("shards", &self.inner.shards.len())
            .finish()
    }
}

impl<S: 'static> Sharded<S> {
    /// Start one thread per configured shard and build each shard's state.
    ///
    /// `factory` runs on the shard's own thread, inside its executor, so the
    /// state it returns may hold `Rc`s and spawn local tasks. Blocks until every
    /// shard is ready.
    pub fn start<F>(options: ShardedOptions, factory: F) -> Result<Self, ShardError>
    where
        F: Fn(ShardId) -> S + Send + Sync + 'static,
    {
        let factory = Arc::new(factory);
        let mut shards = Vec::with_capacity(options.shards);
        let mut pending = Vec::with_capacity(options.shards);
        for index in 0..options.shards {
            let id = ShardId::new(index as u32);
            let (handle, ready) = shard::spawn(id, &options, Arc::clone(&factory))?;
            shards.push(handle);
            pending.push((id, ready));
        }
        for (id, ready) in pending {
            match ready.recv() {
                Ok(Ok(())) => {}
                Ok(Err(err)) => return Err(err),
                Err(_) => return Err(ShardError::Stopped(id)),
            }
        }
        log_info!(
            component = "sharded",
            event = "sharded_started",
            shards = shards.len(),
        );
        Ok(Self {
            inner: Arc::new(Inner { shards }),
        })
    }

    /// Number of shards.
    #[must_use]
    pub fn shard_count(&self) -> usize {
        self.inner.shards.len()
    }

    /// Shard ids in ascending order.
    pub fn shard_ids(&self) -> impl Iterator<Item = ShardId> + '_ {
        self.inner.shards.iter().map(|shard| shard.id)
    }

    /// Run `func` against the state of `shard` and return its result.
    pub async fn invoke_on<F, Fut, R>(&self, shard: ShardId, func: F) -> Result<R, ShardError>
    where
        F: FnOnce(Rc<S>) -> Fut + Send + 'static,
        Fut: Future<Output = R> + 'static,
        R: Send + 'static,
    {
        let handle = self
            .inner
            .shards
            .get(shard.index())
            .ok_or(ShardError::NoSuchShard(shard))?;
        let (reply, result) = tokio::sync::oneshot::channel();
        let job: Job<S> = Box::new(move |state| {
            Box::pin(async move {
                let _ = reply.send(func(state).await);
            })
        });
        handle
            .jobs
            .send_async(Message::Run(job))
            .await
            .map_err(|_| ShardError::Stopped(shard))?;
        result.await.map_err(|_| ShardError::Dropped(shard))
    }

    /// Run `func` on every shard concurrently.
    ///
    /// Resolves once every shard's future has resolved. When several shards
    /// fail, the first error observed is returned and the rest are logged.
    pub async fn invoke_on_all<F, Fut, E>(&self, func: F) -> Result<(), E>
    where
        F: FnOnce(Rc<S>) -> Fut + Clone + Send + 'static,
        Fut: Future<Output = Result<(), E>> + 'static,
        E: From<ShardError> + fmt::Display + Send + 'static,
    {
        let mut pending: FuturesUnordered<_> = self
            .shard_ids()
            .map(|shard| {
                let func = func.clone();
                async move { (shard, self.invoke_on(shard, func).await) }
            })
            .collect();

        let mut first_error = None;
        while let Some((shard, outcome)) = pending.next().await {
            let outcome = match outcome {
                Ok(inner) => inner,
                Err(err) => Err(E::from(err)),
            };
            if let Err(err) = outcome {
                log_debug!(
                    component = "sharded",
                    event = "shard_invocation_failed",
                    shard = %shard,
                    error = %err,
                );
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Stop every shard and wait for the threads to exit.
    ///
    /// Jobs still queued or running are dropped. Blocks the calling thread, so
    /// call it from outside the shards.
    pub fn shutdown(&self) {
        for shard in &self.inner.shards {
            shard.stop();
        }
        log_info!(component = "sharded", event = "sharded_stopped");
    }
}
