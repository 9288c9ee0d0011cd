//! OS signal path: SIGTERM delivered to this process drives the coordinator.
//!
//! Kept to a single test so no other test shares the signalled process.
#![cfg(unix)]

use std::process::Command;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use graceful::{Coordinator, Phase, RepeatSignal};

const DEADLINE: Duration = Duration::from_secs(10);

fn send_sigterm() {
    let status = Command::new("kill")
        .args(["-TERM", &std::process::id().to_string()])
        .status()
        .expect("kill runs");
    assert!(status.success());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sigterm_drains_jobs_before_handlers() {
    let coordinator = Coordinator::new();
    coordinator
        .initialize_with_repeat(RepeatSignal::Ignore)
        .expect("signals registered");
    let runs = Arc::new(AtomicUsize::new(0));
    {
        let runs = Arc::clone(&runs);
        coordinator.on_shutdown(move || {
            runs.fetch_add(1, Ordering::SeqCst);
        });
    }
    let job = coordinator.start_job().expect("admitted before shutdown");

    send_sigterm();
    tokio::time::timeout(DEADLINE, coordinator.shutdown_token().cancelled())
        .await
        .expect("SIGTERM starts shutdown");
    assert!(!coordinator.try_start_job());

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(coordinator.phase(), Phase::Draining);
    assert_eq!(runs.load(Ordering::SeqCst), 0);

    drop(job);
    tokio::time::timeout(DEADLINE, coordinator.wait_for_shutdown_async())
        .await
        .expect("shutdown completes once the job finishes");
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    // With `Ignore` a repeated signal neither kills the process nor reruns anything.
    send_sigterm();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(coordinator.phase(), Phase::Complete);
}
