//! Shutdown coordination: job admission, drain, and ordered cleanup.
//!
//! A [`Coordinator`] tracks how many jobs are in flight, gates new ones once
//! shutdown begins, waits for the in-flight count to reach zero, and then
//! runs every registered handler exactly once before releasing the callers
//! blocked in [`Coordinator::wait_for_shutdown`].
//!
//! ```text
//! Running ──trigger──▶ Draining ──jobs == 0──▶ RunningHandlers ──▶ Complete
//! ```
//!
//! All mutable state sits behind one mutex. The drain wait is the only
//! operation that blocks while releasing it.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

use crate::completion::Completion;
use crate::error::Error;
use crate::job::JobGuard;
use crate::signal::{RepeatSignal, SignalBridge};

/// Cleanup callback executed once during shutdown, after all jobs drain.
pub type Handler = Box<dyn FnOnce() + Send + 'static>;

/// Shutdown lifecycle phase. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    /// Jobs are admitted; no shutdown requested yet.
    Running,
    /// Shutdown requested; waiting for in-flight jobs to finish.
    Draining,
    /// All jobs drained; handlers are executing.
    RunningHandlers,
    /// Handlers done and completion fired.
    Complete,
}

struct State {
    active_jobs: usize,
    phase: Phase,
    handlers: Vec<Handler>,
}

struct Inner {
    state: Mutex<State>,
    drained: Condvar,
    completion: Completion,
    initialized: AtomicBool,
    shutdown_token: CancellationToken,
}

/// Handle to a shared shutdown coordinator.
///
/// Cloning is cheap; every clone refers to the same state.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("Coordinator")
            .field("phase", &state.phase)
            .field("active_jobs", &state.active_jobs)
            .field("handlers", &state.handlers.len())
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl Coordinator {
    /// Creates an idle coordinator with no jobs and no handlers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    active_jobs: 0,
                    phase: Phase::Running,
                    handlers: Vec::new(),
                }),
                drained: Condvar::new(),
                completion: Completion::new(),
                initialized: AtomicBool::new(false),
                shutdown_token: CancellationToken::new(),
            }),
        }
    }

    // State is only mutated in short sections that cannot panic midway, so a
    // poisoned lock still guards consistent data.
    fn state(&self) -> MutexGuard<'_, State> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Arms the OS signal bridge (SIGINT/SIGTERM, Ctrl+C on Windows).
    ///
    /// Idempotent: once initialized, further calls return `Ok(())` without
    /// doing anything, including after shutdown has completed. Does not block.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoRuntime`] outside a tokio runtime and
    /// [`Error::Signal`] if signal registration fails.
    pub fn initialize(&self) -> Result<(), Error> {
        self.initialize_with_repeat(RepeatSignal::default())
    }

    /// Like [`initialize`](Self::initialize), choosing what a second signal does.
    ///
    /// # Errors
    ///
    /// See [`initialize`](Self::initialize).
    pub fn initialize_with_repeat(&self, repeat: RepeatSignal) -> Result<(), Error> {
        let handle = Handle::try_current().map_err(|_| Error::NoRuntime)?;
        if !self.claim_initialization() {
            return Ok(());
        }
        match SignalBridge::try_new(repeat) {
            Ok(bridge) => {
                self.arm(&handle, bridge);
                Ok(())
            }
            Err(err) => {
                self.inner.initialized.store(false, Ordering::Release);
                Err(err.into())
            }
        }
    }

    /// Arms the coordinator with an already constructed [`SignalBridge`].
    ///
    /// The bridge's notification triggers shutdown exactly once. A second
    /// call is a no-op and drops `bridge`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoRuntime`] outside a tokio runtime.
    pub fn initialize_with(&self, bridge: SignalBridge) -> Result<(), Error> {
        let handle = Handle::try_current().map_err(|_| Error::NoRuntime)?;
        if self.claim_initialization() {
            self.arm(&handle, bridge);
        }
        Ok(())
    }

    // Only the caller that flips the flag may build and arm a bridge.
    fn claim_initialization(&self) -> bool {
        let claimed = !self.inner.initialized.swap(true, Ordering::AcqRel);
        if !claimed {
            tracing::debug!("coordinator already initialized");
        }
        claimed
    }

    fn arm(&self, handle: &Handle, bridge: SignalBridge) {
        let coordinator = self.clone();
        handle.spawn(async move {
            let shutdown_token = coordinator.shutdown_token();
            tokio::select! {
                () = bridge.recv() => {
                    tracing::info!("shutdown requested by signal bridge");
                    coordinator.trigger_shutdown_async().await;
                }
                // Triggered directly; nothing left to bridge.
                () = shutdown_token.cancelled() => {}
            }
        });
        tracing::debug!("coordinator initialized");
    }

    /// Whether [`initialize`](Self::initialize) (or a variant) has run.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.inner.initialized.load(Ordering::Acquire)
    }

    /// Registers `handler` to run once during shutdown, after all jobs drain.
    ///
    /// Handlers run in registration order. A handler registered after the
    /// handler list has been taken for execution is dropped without running.
    pub fn on_shutdown<F>(&self, handler: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.state();
        if state.phase >= Phase::RunningHandlers {
            let phase = state.phase;
            drop(state);
            tracing::debug!(?phase, "handler registered too late, dropping it");
            drop(handler);
            return;
        }
        state.handlers.push(Box::new(handler));
    }

    /// Admits a job unless shutdown has begun.
    ///
    /// Returns `false`, with no side effects, once shutdown has been
    /// triggered; the caller must then abandon the unit of work. Every `true`
    /// must be paired with exactly one [`finish_job`](Self::finish_job).
    #[must_use]
    pub fn try_start_job(&self) -> bool {
        let mut state = self.state();
        if state.phase != Phase::Running {
            return false;
        }
        state.active_jobs += 1;
        true
    }

    /// Admits a job and returns a guard that finishes it when dropped.
    #[must_use]
    pub fn start_job(&self) -> Option<JobGuard> {
        self.try_start_job().then(|| JobGuard::new(self.clone()))
    }

    /// Marks an admitted job as finished.
    ///
    /// # Panics
    ///
    /// Panics if no job is active, i.e. the call has no matching successful
    /// [`try_start_job`](Self::try_start_job).
    #[allow(clippy::panic)]
    pub fn finish_job(&self) {
        let mut state = self.state();
        let Some(remaining) = state.active_jobs.checked_sub(1) else {
            drop(state);
            panic!("finish_job called without a matching try_start_job");
        };
        state.active_jobs = remaining;
        if remaining == 0 {
            self.inner.drained.notify_all();
        }
    }

    /// Number of jobs currently admitted and not yet finished.
    #[must_use]
    pub fn active_jobs(&self) -> usize {
        self.state().active_jobs
    }

    /// Whether shutdown has been triggered. Never reverts to `false`.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.state().phase != Phase::Running
    }

    /// Current lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.state().phase
    }

    /// Token cancelled the moment shutdown begins, before jobs drain.
    ///
    /// Hand it to subsystems that should stop accepting new work early, such
    /// as a server's graceful-shutdown future.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.inner.shutdown_token.clone()
    }

    /// Runs the shutdown sequence on the calling thread.
    ///
    /// Only the first call does anything: it stops admissions, blocks until
    /// every in-flight job has finished, runs the handlers in registration
    /// order, and fires completion. Concurrent and later calls return
    /// immediately.
    ///
    /// # Deadlocks
    ///
    /// The drain waits for every admitted job, so calling this while the
    /// same thread holds a [`JobGuard`] (or an unfinished
    /// [`try_start_job`](Self::try_start_job)) never returns. Handlers run on
    /// the triggering thread: a handler that calls
    /// [`wait_for_shutdown`](Self::wait_for_shutdown) blocks forever.
    pub fn trigger_shutdown(&self) {
        let mut state = self.state();
        if state.phase != Phase::Running {
            tracing::debug!(phase = ?state.phase, "shutdown already in progress");
            return;
        }
        state.phase = Phase::Draining;
        self.inner.shutdown_token.cancel();
        tracing::info!(active_jobs = state.active_jobs, "shutdown started, draining jobs");

        let mut state = self
            .inner
            .drained
            .wait_while(state, |state| state.active_jobs > 0)
            .unwrap_or_else(PoisonError::into_inner);

        state.phase = Phase::RunningHandlers;
        let handlers = std::mem::take(&mut state.handlers);
        drop(state);

        tracing::info!(handlers = handlers.len(), "jobs drained, running shutdown handlers");
        run_handlers(handlers);

        self.state().phase = Phase::Complete;
        self.inner.completion.fire();
        tracing::info!("shutdown complete");
    }

    /// Runs [`trigger_shutdown`](Self::trigger_shutdown) on the blocking pool.
    pub async fn trigger_shutdown_async(&self) {
        let coordinator = self.clone();
        if let Err(err) = tokio::task::spawn_blocking(move || coordinator.trigger_shutdown()).await
        {
            tracing::error!(?err, "shutdown task failed");
        }
    }

    /// Blocks the calling thread until shutdown has completed.
    ///
    /// Must not be called from a shutdown handler; see
    /// [`trigger_shutdown`](Self::trigger_shutdown).
    ///
    /// # Panics
    ///
    /// Panics if the coordinator was never initialized; without an armed
    /// trigger this would otherwise hang forever.
    pub fn wait_for_shutdown(&self) {
        self.assert_initialized();
        self.inner.completion.wait();
    }

    /// Waits asynchronously until shutdown has completed.
    ///
    /// # Panics
    ///
    /// Panics if the coordinator was never initialized.
    pub async fn wait_for_shutdown_async(&self) {
        self.assert_initialized();
        self.inner.completion.wait_async().await;
    }

    fn assert_initialized(&self) {
        assert!(
            self.is_initialized(),
            "wait_for_shutdown called before the coordinator was initialized"
        );
    }
}

fn run_handlers(handlers: Vec<Handler>) {
    for (index, handler) in handlers.into_iter().enumerate() {
        tracing::debug!(index, "running shutdown handler");
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(handler)) {
            let reason = payload
                .downcast_ref::<&str>()
                .map(ToString::to_string)
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_owned());
            tracing::error!(index, %reason, "shutdown handler panicked");
        }
    }
}
