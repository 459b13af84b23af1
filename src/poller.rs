//! Periodic snapshot polling.
//!
//! A [`Poller`] owns the snapshot of one remote resource. [`Poller::start`] launches the
//! recurring fetch loop and returns a [`PollHandle`]; the loop stops when the handle is
//! cancelled or dropped, whichever comes first, and only once.
//!
//! Ticks never wait for fetches: every fetch runs as its own task, so fetches may overlap.
//! Each fetch takes a sequence number when issued and its result is applied only if nothing
//! newer has been applied yet, so a slow response can never overwrite fresher data.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use crate::config::MIN_POLL_INTERVAL;
use crate::error::ApiResult;

/// A remote resource that can be fetched as a whole.
pub trait Source<T>: Send + Sync + 'static {
    /// Short label used in logs.
    fn name(&self) -> &str;

    fn fetch(&self) -> BoxFuture<'_, ApiResult<T>>;
}

/// Latest known state of a polled resource.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot<T> {
    pub data: T,
    pub loading: bool,
    pub error: Option<String>,
    /// Sequence number of the fetch that produced the current state (0 = none yet).
    pub sequence: u64,
    pub updated_at: Option<DateTime<Utc>>,
}

impl<T: Default> Default for Snapshot<T> {
    fn default() -> Self {
        Self {
            data: T::default(),
            loading: true,
            error: None,
            sequence: 0,
            updated_at: None,
        }
    }
}

struct PollerInner<T> {
    source: Box<dyn Source<T>>,
    state: watch::Sender<Snapshot<T>>,
    issued: AtomicU64,
    closed: AtomicBool,
}

pub struct Poller<T> {
    inner: Arc<PollerInner<T>>,
}

impl<T> Clone for Poller<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: 'static> fmt::Debug for Poller<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Poller")
            .field("source", &self.inner.source.name())
            .field("issued", &self.inner.issued.load(Ordering::SeqCst))
            .finish()
    }
}

impl<T> Poller<T>
where
    T: Clone + Default + Send + Sync + 'static,
{
    pub fn new<S: Source<T>>(source: S) -> Self {
        let (state, _) = watch::channel(Snapshot::default());
        Self {
            inner: Arc::new(PollerInner {
                source: Box::new(source),
                state,
                issued: AtomicU64::new(0),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn name(&self) -> &str {
        self.inner.source.name()
    }

    pub fn snapshot(&self) -> Snapshot<T> {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot<T>> {
        self.inner.state.subscribe()
    }

    /// Starts the recurring fetch loop: one fetch right away, then one per `every`.
    ///
    /// Must be called inside a tokio runtime.
    pub fn start(&self, every: Duration) -> PollHandle {
        let every = every.max(MIN_POLL_INTERVAL);
        let active = Arc::new(AtomicBool::new(true));
        let (cancel_tx, mut cancel_rx) = oneshot::channel::<()>();

        let poller = self.clone();
        let loop_active = Arc::clone(&active);
        let name = self.name().to_string();

        let task = tokio::spawn(async move {
            tracing::info!("[POLL:{}] started (every {:?})", name, every);
            let mut interval = time::interval(every);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = &mut cancel_rx => break,
                    _ = interval.tick() => {
                        let poller = poller.clone();
                        let active = Arc::clone(&loop_active);
                        tokio::spawn(async move {
                            let fetch = poller.inner.source.fetch();
                            poller.run_fetch(fetch, FetchMode::Background, Some(&*active)).await;
                        });
                    }
                }
            }

            tracing::info!("[POLL:{}] stopped", name);
        });

        PollHandle {
            name: self.name().to_string(),
            cancel: Some(cancel_tx),
            active,
            task,
        }
    }

    /// User-requested fetch: raises `loading`, then applies the result.
    pub async fn refresh(&self) {
        let fetch = self.inner.source.fetch();
        self.run_fetch(fetch, FetchMode::Manual, None).await;
    }

    /// Runs an alternative fetch (e.g. an active scan) whose result replaces the snapshot
    /// exactly like a normal fetch. Raises `loading` and clears the error first.
    ///
    /// Returns `false` when the result was dropped because something newer had already been
    /// applied (or the poller was shut down).
    pub async fn replace_with<F>(&self, fetch: F) -> bool
    where
        F: Future<Output = ApiResult<T>>,
    {
        self.run_fetch(fetch, FetchMode::Replace, None).await
    }

    /// Local edit of the current data, bypassing the remote.
    ///
    /// The edit counts as the newest state: fetches issued before it are discarded.
    pub fn modify<F>(&self, f: F)
    where
        F: FnOnce(&mut T),
    {
        let issued = &self.inner.issued;
        self.inner.state.send_modify(|snapshot| {
            snapshot.sequence = issued.fetch_add(1, Ordering::SeqCst) + 1;
            f(&mut snapshot.data);
        });
    }

    /// Discards every result that resolves from now on.
    pub fn shutdown(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    async fn run_fetch<F>(&self, fetch: F, mode: FetchMode, guard: Option<&AtomicBool>) -> bool
    where
        F: Future<Output = ApiResult<T>>,
    {
        let sequence = self.inner.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let name = self.name();

        match mode {
            FetchMode::Background => {}
            FetchMode::Manual => self.inner.state.send_modify(|s| s.loading = true),
            FetchMode::Replace => self.inner.state.send_modify(|s| {
                s.loading = true;
                s.error = None;
            }),
        }

        tracing::debug!("[POLL:{}] fetch #{} issued", name, sequence);
        let result = fetch.await;

        if self.is_shut_down() || guard.is_some_and(|g| !g.load(Ordering::SeqCst)) {
            tracing::debug!("[POLL:{}] fetch #{} resolved after teardown, dropped", name, sequence);
            return false;
        }

        self.apply(sequence, result)
    }

    fn apply(&self, sequence: u64, result: ApiResult<T>) -> bool {
        let name = self.name();
        self.inner.state.send_if_modified(|snapshot| {
            if sequence <= snapshot.sequence {
                tracing::debug!(
                    "[POLL:{}] fetch #{} is older than applied #{}, dropped",
                    name,
                    sequence,
                    snapshot.sequence
                );
                return false;
            }

            match result {
                Ok(data) => {
                    snapshot.data = data;
                    snapshot.error = None;
                    snapshot.updated_at = Some(Utc::now());
                }
                Err(e) => {
                    // Keep the last good data on screen.
                    tracing::warn!("[POLL:{}] fetch #{} failed: {}", name, sequence, e);
                    snapshot.error = Some(e.to_string());
                }
            }
            snapshot.loading = false;
            snapshot.sequence = sequence;
            true
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchMode {
    Background,
    Manual,
    Replace,
}

/// Owner of a running poll loop.
///
/// The loop is cancelled exactly once: by [`PollHandle::cancel`] or, failing that, on drop.
/// Fetches already in flight are not aborted, but their results are discarded.
pub struct PollHandle {
    name: String,
    cancel: Option<oneshot::Sender<()>>,
    active: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl PollHandle {
    pub fn cancel(mut self) {
        self.cancel_once();
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst) && !self.task.is_finished()
    }

    fn cancel_once(&mut self) {
        if let Some(tx) = self.cancel.take() {
            self.active.store(false, Ordering::SeqCst);
            // The loop may already be gone (runtime shutdown); nothing left to stop then.
            let _ = tx.send(());
            tracing::debug!("[POLL:{}] cancelled", self.name);
        }
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.cancel_once();
    }
}
