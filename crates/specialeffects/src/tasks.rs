//! Registry of background sections spawned during a run.
//!
//! Sections that repeat forever are not awaited by their parent. They are
//! spawned here instead, and `play` joins whatever is registered before it
//! reports completion. Handles are cancellable, which is the only way such a
//! run ends.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Notify;
use tokio::task::{AbortHandle, JoinError, JoinHandle};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Error, Result};

type Joined = BoxFuture<'static, (Uuid, Option<String>, std::result::Result<Result<()>, JoinError>)>;

/// Shared handle to the background tasks of a show.
///
/// Cloning is cheap; every clone sees the same registry.
#[derive(Clone, Default)]
pub struct BackgroundTasks {
    inner: Arc<Shared>,
}

#[derive(Default)]
struct Shared {
    registry: Mutex<Registry>,
    /// Handles being joined, polled in completion order.
    running: tokio::sync::Mutex<FuturesUnordered<Joined>>,
    spawned: Notify,
}

#[derive(Default)]
struct Registry {
    pending: VecDeque<BackgroundTask>,
    live: Vec<(Uuid, AbortHandle)>,
    cancelled: bool,
}

struct BackgroundTask {
    id: Uuid,
    name: Option<String>,
    handle: JoinHandle<Result<()>>,
}

impl BackgroundTask {
    fn joined(self) -> Joined {
        let Self { id, name, handle } = self;
        Box::pin(async move { (id, name, handle.await) })
    }
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `task` on the current runtime and track it for joining.
    ///
    /// If the registry was cancelled during this run, the task is aborted
    /// right away.
    pub fn spawn<F>(&self, name: Option<String>, task: F) -> Uuid
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let id = Uuid::new_v4();
        let handle = tokio::spawn(task);

        {
            let mut registry = self.lock();
            if registry.cancelled {
                handle.abort();
            }
            debug!(%id, name = name.as_deref(), "spawned background section");
            registry.live.push((id, handle.abort_handle()));
            registry.pending.push_back(BackgroundTask { id, name, handle });
        }
        self.inner.spawned.notify_one();
        id
    }

    /// Number of tasks that have not been joined yet.
    pub fn len(&self) -> usize {
        self.lock().live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cancel one task. Returns `false` if it is unknown or already joined.
    pub fn cancel(&self, id: Uuid) -> bool {
        let registry = self.lock();
        match registry.live.iter().find(|(live, _)| *live == id) {
            Some((_, abort)) => {
                abort.abort();
                true
            }
            None => false,
        }
    }

    /// Cancel every task, including any spawned later in the same run.
    pub fn cancel_all(&self) {
        let mut registry = self.lock();
        registry.cancelled = true;
        for (_, abort) in &registry.live {
            abort.abort();
        }
        debug!(count = registry.live.len(), "cancelled background sections");
    }

    /// Prepare for a new run: forget cancellation and abort leftovers.
    pub(crate) fn reset(&self) {
        let mut registry = self.lock();
        for (_, abort) in registry.live.drain(..) {
            abort.abort();
        }
        registry.pending.clear();
        registry.cancelled = false;
        if let Ok(mut running) = self.inner.running.try_lock() {
            running.clear();
        }
    }

    /// Wait for every registered task, including tasks spawned while waiting.
    ///
    /// Tasks are joined as they finish, and cancelled tasks count as
    /// finished. The first failure cancels the remaining tasks and is
    /// returned once they have stopped.
    pub(crate) async fn join_all(&self) -> Result<()> {
        match self.watch(true).await {
            None => Ok(()),
            Some(failure) => {
                self.shutdown().await;
                Err(failure)
            }
        }
    }

    /// Resolve with the first failure of any task. Never resolves while the
    /// tasks keep succeeding, so it is meant to be raced against other work.
    ///
    /// The failed task is joined; the rest keep running until
    /// [`shutdown`](Self::shutdown).
    pub(crate) async fn first_failure(&self) -> Error {
        match self.watch(false).await {
            Some(failure) => failure,
            None => std::future::pending().await,
        }
    }

    /// Cancel everything and wait until all tasks have stopped.
    pub(crate) async fn shutdown(&self) {
        self.cancel_all();
        let mut running = self.inner.running.lock().await;
        running.extend(self.drain().into_iter().map(BackgroundTask::joined));
        while let Some((id, _, _)) = running.next().await {
            self.forget(id);
        }
    }

    /// Join tasks in completion order until one fails. With `until_idle`
    /// set, returns `None` once nothing is left to join; otherwise waits for
    /// new spawns.
    async fn watch(&self, until_idle: bool) -> Option<Error> {
        let mut running = self.inner.running.lock().await;
        loop {
            running.extend(self.drain().into_iter().map(BackgroundTask::joined));
            if running.is_empty() {
                if until_idle {
                    return None;
                }
                self.inner.spawned.notified().await;
                continue;
            }

            let (id, name, outcome) = tokio::select! {
                Some(finished) = running.next() => finished,
                () = self.inner.spawned.notified() => continue,
            };
            self.forget(id);

            let failure = match outcome {
                Ok(Ok(())) => continue,
                Err(err) if err.is_cancelled() => {
                    debug!(%id, name = name.as_deref(), "background section cancelled");
                    continue;
                }
                Ok(Err(err)) => err,
                Err(err) => panicked(err),
            };

            warn!(
                %id,
                name = name.as_deref(),
                error = %failure,
                "background section failed, cancelling the rest"
            );
            return Some(failure);
        }
    }

    fn drain(&self) -> Vec<BackgroundTask> {
        self.lock().pending.drain(..).collect()
    }

    fn forget(&self, id: Uuid) {
        self.lock().live.retain(|(live, _)| *live != id);
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.inner
            .registry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub(crate) fn panicked(err: JoinError) -> Error {
    let message = match err.try_into_panic() {
        Ok(payload) => payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string()),
        Err(err) => err.to_string(),
    };
    Error::TaskPanicked(message)
}

/// Execution context handed to every effect of a run.
#[derive(Clone, Default)]
pub struct PlayContext {
    tasks: BackgroundTasks,
}

impl PlayContext {
    pub fn new(tasks: BackgroundTasks) -> Self {
        Self { tasks }
    }

    pub fn tasks(&self) -> &BackgroundTasks {
        &self.tasks
    }
}
