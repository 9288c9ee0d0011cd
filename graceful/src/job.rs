//! RAII job admission.

use crate::coordinator::Coordinator;

/// Keeps one job admitted for as long as it lives.
///
/// Obtained from [`Coordinator::start_job`]. Dropping the guard, including
/// during unwinding, calls [`Coordinator::finish_job`] exactly once.
#[derive(Debug)]
#[must_use = "dropping the guard immediately finishes the job"]
pub struct JobGuard {
    coordinator: Coordinator,
}

impl JobGuard {
    pub(crate) const fn new(coordinator: Coordinator) -> Self {
        Self { coordinator }
    }
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        self.coordinator.finish_job();
    }
}

#[cfg(test)]
mod tests {
    use crate::coordinator::Coordinator;

    #[test]
    fn drop_finishes_job() {
        let coordinator = Coordinator::new();
        let guard = coordinator.start_job().expect("admitted before shutdown");
        assert_eq!(coordinator.active_jobs(), 1);
        drop(guard);
        assert_eq!(coordinator.active_jobs(), 0);
    }

    #[test]
    fn unwinding_finishes_job() {
        let coordinator = Coordinator::new();
        let worker = coordinator.clone();
        let result = std::thread::spawn(move || {
            let _job = worker.start_job().expect("admitted before shutdown");
            panic!("job failed");
        })
        .join();

        assert!(result.is_err());
        assert_eq!(coordinator.active_jobs(), 0);
    }

    #[test]
    fn no_guard_after_shutdown() {
        let coordinator = Coordinator::new();
        coordinator.trigger_shutdown();
        assert!(coordinator.start_job().is_none());
    }
}
