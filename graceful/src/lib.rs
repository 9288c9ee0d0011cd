//! Graceful shutdown coordination.
//!
//! On a termination signal, or an explicit trigger, a [`Coordinator`] stops
//! admitting new jobs, waits for the in-flight ones to finish, runs the
//! registered cleanup handlers in order, and then releases everything
//! blocked on [`Coordinator::wait_for_shutdown`].
//!
//! ```no_run
//! # #[tokio::main]
//! # async fn main() -> Result<(), graceful::Error> {
//! let coordinator = graceful::Coordinator::new();
//! coordinator.initialize()?;
//! coordinator.on_shutdown(|| tracing::info!("flushing caches"));
//!
//! let worker = coordinator.clone();
//! std::thread::spawn(move || {
//!     while let Some(_job) = worker.start_job() {
//!         // one unit of work
//!     }
//! });
//!
//! coordinator.wait_for_shutdown_async().await;
//! # Ok(())
//! # }
//! ```

mod completion;
mod coordinator;
mod error;
mod job;
mod signal;

pub use completion::Completion;
pub use coordinator::{Coordinator, Handler, Phase};
pub use error::Error;
pub use job::JobGuard;
pub use signal::{RepeatSignal, SignalBridge};
