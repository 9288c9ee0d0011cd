//! One-shot completion gate.
//!
//! [`Completion`] is a latch that fires exactly once and releases every
//! waiter, blocking or async, when it does. Waiters arriving after the
//! firing return immediately.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;

/// Settable-once broadcast gate.
#[derive(Debug, Default)]
pub struct Completion {
    fired: Mutex<bool>,
    released: Condvar,
    token: CancellationToken,
}

impl Completion {
    /// Creates an unfired gate.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn fired(&self) -> MutexGuard<'_, bool> {
        self.fired.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fires the gate, waking every waiter.
    ///
    /// Returns `false` if the gate had already fired; the second call has no
    /// other effect.
    pub fn fire(&self) -> bool {
        let mut fired = self.fired();
        if *fired {
            return false;
        }
        *fired = true;
        drop(fired);
        self.released.notify_all();
        self.token.cancel();
        true
    }

    /// Whether [`fire`](Self::fire) has been called.
    #[must_use]
    pub fn is_fired(&self) -> bool {
        *self.fired()
    }

    /// Blocks the calling thread until the gate fires.
    pub fn wait(&self) {
        let fired = self.fired();
        let _fired = self
            .released
            .wait_while(fired, |fired| !*fired)
            .unwrap_or_else(PoisonError::into_inner);
    }

    /// Waits asynchronously until the gate fires.
    pub async fn wait_async(&self) {
        self.token.cancelled().await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn fires_once() {
        let completion = Completion::new();
        assert!(!completion.is_fired());
        assert!(completion.fire());
        assert!(!completion.fire());
        assert!(completion.is_fired());
    }

    #[test]
    fn releases_all_blocking_waiters() {
        let completion = Arc::new(Completion::new());
        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let completion = Arc::clone(&completion);
                thread::spawn(move || completion.wait())
            })
            .collect();

        completion.fire();
        for waiter in waiters {
            waiter.join().expect("waiter thread panicked");
        }
    }

    #[test]
    fn late_waiter_returns_immediately() {
        let completion = Completion::new();
        completion.fire();
        completion.wait();
    }

    #[tokio::test]
    async fn releases_async_waiters() {
        let completion = Arc::new(Completion::new());
        let waiter = {
            let completion = Arc::clone(&completion);
            tokio::spawn(async move { completion.wait_async().await })
        };

        completion.fire();
        waiter.await.expect("waiter task panicked");
        completion.wait_async().await;
    }
}
