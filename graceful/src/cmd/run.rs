//! `graceful run` command - drive a simulated workload through shutdown.
//!
//! Worker threads loop over short jobs admitted by the [`Coordinator`]. On
//! SIGINT/SIGTERM (or after `trigger_after_ms`) admission closes, in-flight
//! jobs finish, the cleanup handlers report, and the command returns.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};

use dotenvy::dotenv;
use graceful::Coordinator;

use crate::config::{Workload, load_config};
use crate::telemetry::Telemetry;

/// Job counts shared between workers and the cleanup handlers.
#[derive(Debug, Default)]
struct WorkloadStats {
    started: AtomicUsize,
    completed: AtomicUsize,
}

impl WorkloadStats {
    fn snapshot(&self) -> (usize, usize) {
        (
            self.started.load(Ordering::SeqCst),
            self.completed.load(Ordering::SeqCst),
        )
    }
}

/// Execute the `run` command.
///
/// # Errors
///
/// Returns an error if configuration loading, signal registration, or
/// worker spawning fails, or if shutdown misses its deadline.
pub async fn run(config_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    let config = load_config(config_path)?;
    let _telemetry = Telemetry::new()
        .with_name(env!("CARGO_PKG_NAME"))
        .with_version(env!("CARGO_PKG_VERSION"))
        .with_log_level(config.log_level())
        .register();

    let coordinator = Coordinator::new();
    let stats = Arc::new(WorkloadStats::default());
    register_handlers(&coordinator, &stats);
    coordinator.initialize_with_repeat(config.repeat_signal())?;

    let workers = spawn_workers(&coordinator, config.workload(), &stats)?;
    tracing::info!(
        workers = workers.len(),
        "workload running, send SIGINT or SIGTERM to shut down"
    );

    if let Some(delay) = config.workload().trigger_after() {
        let coordinator = coordinator.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            tracing::info!(?delay, "trigger delay elapsed, requesting shutdown");
            coordinator.trigger_shutdown_async().await;
        });
    }

    if let Some(deadline) = config.shutdown_timeout() {
        coordinator.shutdown_token().cancelled().await;
        if tokio::time::timeout(deadline, coordinator.wait_for_shutdown_async())
            .await
            .is_err()
        {
            let (started, completed) = stats.snapshot();
            tracing::error!(?deadline, started, completed, "shutdown deadline exceeded");
            return Err(format!("shutdown did not complete within {deadline:?}").into());
        }
    } else {
        coordinator.wait_for_shutdown_async().await;
    }

    tokio::task::spawn_blocking(move || {
        for worker in workers {
            if worker.join().is_err() {
                tracing::error!("worker thread panicked");
            }
        }
    })
    .await?;

    let (started, completed) = stats.snapshot();
    tracing::info!(started, completed, "all workers stopped");
    Ok(())
}

fn register_handlers(coordinator: &Coordinator, stats: &Arc<WorkloadStats>) {
    let report = Arc::clone(stats);
    coordinator.on_shutdown(move || {
        let (started, completed) = report.snapshot();
        tracing::info!(started, completed, "workload drained");
    });

    let probe = coordinator.clone();
    coordinator.on_shutdown(move || {
        tracing::info!(
            active_jobs = probe.active_jobs(),
            phase = ?probe.phase(),
            "releasing workload resources"
        );
    });
}

fn spawn_workers(
    coordinator: &Coordinator,
    workload: &Workload,
    stats: &Arc<WorkloadStats>,
) -> std::io::Result<Vec<JoinHandle<()>>> {
    (0..workload.workers())
        .map(|id| {
            let coordinator = coordinator.clone();
            let stats = Arc::clone(stats);
            let job_duration = workload.job_duration();
            let idle = workload.idle();
            thread::Builder::new()
                .name(format!("worker-{id}"))
                .spawn(move || {
                    while let Some(job) = coordinator.start_job() {
                        stats.started.fetch_add(1, Ordering::SeqCst);
                        tracing::debug!(worker = id, "job started");
                        thread::sleep(job_duration);
                        stats.completed.fetch_add(1, Ordering::SeqCst);
                        drop(job);
                        thread::sleep(idle);
                    }
                    tracing::debug!(worker = id, "admission closed, worker exiting");
                })
        })
        .collect()
}
