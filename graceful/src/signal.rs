//! Signal bridge between the OS and the shutdown coordinator.
//!
//! [`SignalBridge`] listens for SIGTERM/SIGINT on Unix (Ctrl+C on Windows)
//! and turns the first delivery into a single notification, a cancelled
//! [`CancellationToken`]. The coordinator waits on that token and runs its
//! trigger once; the bridge itself never touches coordinator state.

#[cfg(unix)]
use tokio::signal::unix::SignalKind;
#[cfg(unix)]
use tokio::signal::unix::signal;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use serde::{Deserialize, Serialize};

/// What a second termination signal does once shutdown is under way.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RepeatSignal {
    /// Stop listening after the first signal.
    Ignore,
    /// Exit the process immediately with `128 + signo`.
    #[default]
    ForceExit,
}

#[cfg(unix)]
const EXIT_INTERRUPT: i32 = 130;
#[cfg(unix)]
const EXIT_TERMINATE: i32 = 143;

/// Delivers one "shutdown requested" notification.
#[derive(Debug)]
pub struct SignalBridge {
    task_tracker: TaskTracker,
    notifier: CancellationToken,
    repeat: RepeatSignal,
}

impl SignalBridge {
    /// Registers the termination signals and spawns the background listener.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an [`std::io::Error`] if signal registration fails.
    #[allow(clippy::unnecessary_wraps)]
    pub fn try_new(repeat: RepeatSignal) -> Result<Self, std::io::Error> {
        let inner = CancellationToken::new();
        let outer = inner.clone();
        let task_tracker = TaskTracker::new();

        #[cfg(unix)]
        {
            let mut sigterm = signal(SignalKind::terminate())?;
            let mut sigint = signal(SignalKind::interrupt())?;
            task_tracker.spawn(async move {
                tokio::select! {
                    _ = sigterm.recv() => tracing::info!(signal = "SIGTERM", "termination signal received"),
                    _ = sigint.recv() => tracing::info!(signal = "SIGINT", "termination signal received"),
                }
                inner.cancel();

                if repeat == RepeatSignal::ForceExit {
                    let code = tokio::select! {
                        _ = sigterm.recv() => EXIT_TERMINATE,
                        _ = sigint.recv() => EXIT_INTERRUPT,
                    };
                    tracing::warn!(code, "repeated termination signal, forcing exit");
                    std::process::exit(code);
                }
            });
        }

        #[cfg(windows)]
        {
            task_tracker.spawn(async move {
                if tokio::signal::ctrl_c().await.is_err() {
                    return;
                }
                tracing::info!(signal = "ctrl-c", "termination signal received");
                inner.cancel();

                if repeat == RepeatSignal::ForceExit && tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("repeated termination signal, forcing exit");
                    std::process::exit(130);
                }
            });
        }

        task_tracker.close();
        Ok(Self {
            task_tracker,
            notifier: outer,
            repeat,
        })
    }

    /// Uses a caller-owned token as the notification instead of OS signals.
    ///
    /// Cancelling `token` has the same effect as a termination signal.
    #[must_use]
    pub fn from_token(token: CancellationToken) -> Self {
        let task_tracker = TaskTracker::new();
        task_tracker.close();
        Self {
            task_tracker,
            notifier: token,
            repeat: RepeatSignal::Ignore,
        }
    }

    /// Returns a clone of the notification token.
    #[must_use]
    pub fn notifier(&self) -> CancellationToken {
        self.notifier.clone()
    }

    /// Waits for the notification and for the listener task to hand it off.
    ///
    /// With [`RepeatSignal::ForceExit`] the listener stays armed after the
    /// first signal, so only the notification itself is awaited.
    pub async fn recv(&self) {
        self.notifier.cancelled().await;
        if self.repeat == RepeatSignal::Ignore {
            self.task_tracker.wait().await;
        }
    }
}
