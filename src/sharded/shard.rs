//! A single shard: one OS thread running a current-thread Tokio runtime.
//!
//! Work arrives as boxed jobs over a bounded queue and is spawned onto the
//! shard's `LocalSet`, so neither the shard state nor the futures built from it
//! ever need to be `Send`.

use std::{
    cell::Cell,
    io,
    rc::Rc,
    sync::{Arc, Mutex},
    thread,
};

use futures_util::future::LocalBoxFuture;
use tokio::task::LocalSet;

use super::{error::ShardError, ShardId};
use crate::{
    observability::{log_debug, log_error},
    option::ShardedOptions,
};

thread_local! {
    static CURRENT_SHARD: Cell<Option<ShardId>> = const { Cell::new(None) };
}

/// Shard executing on the calling thread, if any.
pub(crate) fn current() -> Option<ShardId> {
    CURRENT_SHARD.with(Cell::get)
}

pub(crate) type Job<S> = Box<dyn FnOnce(Rc<S>) -> LocalBoxFuture<'static, ()> + Send>;

pub(crate) enum Message<S> {
    Run(Job<S>),
    Stop,
}

/// Submission side of a running shard.
pub(crate) struct ShardHandle<S> {
    pub(crate) id: ShardId,
    pub(crate) jobs: flume::Sender<Message<S>>,
    pub(crate) thread: Mutex<Option<thread::JoinHandle<()>>>,
}

impl<S> ShardHandle<S> {
    /// Ask the shard to stop and wait for its thread to exit.
    ///
    /// Joining is skipped when called from the shard's own thread.
    pub(crate) fn stop(&self) {
        let _ = self.jobs.send(Message::Stop);
        let handle = match self.thread.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let Some(handle) = handle else {
            return;
        };
        if handle.thread().id() == thread::current().id() {
            return;
        }
        if handle.join().is_err() {
            log_error!(
                component = "sharded",
                event = "shard_panicked",
                shard = %self.id,
            );
        }
    }
}

/// Spawn the thread backing `id`.
///
/// The returned receiver yields once the shard has built its runtime and state.
pub(crate) fn spawn<S, F>(
    id: ShardId,
    options: &ShardedOptions,
    factory: Arc<F>,
) -> Result<(ShardHandle<S>, flume::Receiver<Result<(), ShardError>>), ShardError>
where
    S: 'static,
    F: Fn(ShardId) -> S + Send + Sync + 'static,
{
    let (jobs_tx, jobs_rx) = flume::bounded(options.queue_capacity);
    let (ready_tx, ready_rx) = flume::bounded(1);
    let thread = thread::Builder::new()
        .name(format!("{}-{}", options.thread_name, id.get()))
        .spawn(move || run(id, factory, jobs_rx, ready_tx))
        .map_err(|err| ShardError::Spawn(Arc::new(err)))?;
    Ok((
        ShardHandle {
            id,
            jobs: jobs_tx,
            thread: Mutex::new(Some(thread)),
        },
        ready_rx,
    ))
}

fn run<S, F>(
    id: ShardId,
    factory: Arc<F>,
    jobs: flume::Receiver<Message<S>>,
    ready: flume::Sender<Result<(), ShardError>>,
) where
    S: 'static,
    F: Fn(ShardId) -> S,
{
    CURRENT_SHARD.with(|current| current.set(Some(id)));
    let runtime = match build_runtime() {
        Ok(runtime) => runtime,
        Err(err) => {
            let _ = ready.send(Err(ShardError::Runtime {
                shard: id,
                source: Arc::new(err),
            }));
            return;
        }
    };
    let local = LocalSet::new();
    local.block_on(&runtime, async move {
        let state = Rc::new(factory(id));
        drop(factory);
        if ready.send(Ok(())).is_err() {
            return;
        }
        log_debug!(component = "sharded", event = "shard_started", shard = %id);
        while let Ok(message) = jobs.recv_async().await {
            match message {
                Message::Run(job) => {
                    tokio::task::spawn_local(job(Rc::clone(&state)));
                }
                Message::Stop => break,
            }
        }
        log_debug!(component = "sharded", event = "shard_stopped", shard = %id);
    });
}

fn build_runtime() -> io::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
}
