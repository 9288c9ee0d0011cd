//! Configuration loading and default template generation.
//!
//! This module provides:
//!
//! - [`Config`]: Demo runner settings: logging, signal policy, shutdown
//!   deadline, and the simulated [`Workload`].
//! - [`load_config`]: Reads and parses a TOML configuration file.
//! - [`generate_default_config`]: Produces a commented TOML template.
//!
//! # Configuration File Format
//!
//! ```toml
//! log_level = "info"
//! repeat_signal = "force-exit"
//! shutdown_timeout_ms = 30000
//!
//! [workload]
//! workers = 3
//! job_duration_ms = 500
//! idle_ms = 100
//! trigger_after_ms = 2000
//! ```

use std::path::Path;
use std::time::Duration;

use graceful::{Error, RepeatSignal};
use serde::{Deserialize, Serialize};

/// Runner configuration. Missing fields fall back to their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    log_level: String,
    repeat_signal: RepeatSignal,
    shutdown_timeout_ms: u64,
    workload: Workload,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            repeat_signal: RepeatSignal::default(),
            shutdown_timeout_ms: 30_000,
            workload: Workload::default(),
        }
    }
}

impl Config {
    /// Log filter used when `RUST_LOG` is not set.
    #[must_use]
    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    /// What a second termination signal does.
    #[must_use]
    pub const fn repeat_signal(&self) -> RepeatSignal {
        self.repeat_signal
    }

    /// How long shutdown may take once it has begun; `None` waits forever.
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Option<Duration> {
        match self.shutdown_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    /// Simulated workload settings.
    #[must_use]
    pub const fn workload(&self) -> &Workload {
        &self.workload
    }
}

/// Simulated workload: worker threads looping over short jobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Workload {
    workers: usize,
    job_duration_ms: u64,
    idle_ms: u64,
    trigger_after_ms: Option<u64>,
}

impl Default for Workload {
    fn default() -> Self {
        Self {
            workers: 3,
            job_duration_ms: 500,
            idle_ms: 100,
            trigger_after_ms: None,
        }
    }
}

impl Workload {
    /// Number of worker threads.
    #[must_use]
    pub const fn workers(&self) -> usize {
        self.workers
    }

    /// Time each job holds its admission.
    #[must_use]
    pub const fn job_duration(&self) -> Duration {
        Duration::from_millis(self.job_duration_ms)
    }

    /// Pause between jobs on the same worker.
    #[must_use]
    pub const fn idle(&self) -> Duration {
        Duration::from_millis(self.idle_ms)
    }

    /// Delay after which the runner triggers shutdown itself, if set.
    #[must_use]
    pub const fn trigger_after(&self) -> Option<Duration> {
        match self.trigger_after_ms {
            Some(ms) => Some(Duration::from_millis(ms)),
            None => None,
        }
    }
}

/// Load configuration from a TOML file at the given path.
///
/// # Errors
///
/// Returns [`Error::Config`] if the file cannot be resolved, read, or parsed.
pub fn load_config(path: &Path) -> Result<Config, Error> {
    let config_path = path.canonicalize().map_err(|e| {
        Error::config_with(format!("failed to resolve config path '{}'", path.display()), e)
    })?;
    let content = std::fs::read_to_string(&config_path).map_err(|e| {
        Error::config_with(
            format!("failed to read config file '{}'", config_path.display()),
            e,
        )
    })?;
    parse_config(&content).map_err(|e| {
        Error::config_with(
            format!("failed to parse TOML config '{}'", config_path.display()),
            e,
        )
    })
}

fn parse_config(content: &str) -> Result<Config, toml::de::Error> {
    toml::from_str(content)
}

/// Generate a default TOML configuration template.
#[must_use]
pub fn generate_default_config() -> String {
    String::from(
        r#"# graceful runner configuration

# Log filter used when RUST_LOG is not set.
log_level = "info"

# What a second SIGINT/SIGTERM does while shutdown is running:
# "force-exit" exits immediately with 128 + signo, "ignore" does nothing.
repeat_signal = "force-exit"

# Deadline for shutdown once it has begun, in milliseconds (0 = no limit).
shutdown_timeout_ms = 30000

# ── Simulated workload ──────────────────────────────────────────────
[workload]
workers = 3
job_duration_ms = 500
idle_ms = 100

# Trigger shutdown automatically after this many milliseconds.
# trigger_after_ms = 2000
"#,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_template_matches_defaults() {
        let parsed = parse_config(&generate_default_config()).expect("template parses");
        assert_eq!(parsed, Config::default());
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let parsed = parse_config(
            r#"
            repeat_signal = "ignore"
            shutdown_timeout_ms = 0

            [workload]
            trigger_after_ms = 250
            "#,
        )
        .expect("valid config");

        assert_eq!(parsed.repeat_signal(), RepeatSignal::Ignore);
        assert_eq!(parsed.shutdown_timeout(), None);
        assert_eq!(parsed.workload().workers(), 3);
        assert_eq!(
            parsed.workload().trigger_after(),
            Some(Duration::from_millis(250))
        );
    }

    #[test]
    fn rejects_unknown_signal_policy() {
        assert!(parse_config(r#"repeat_signal = "restart""#).is_err());
    }

    #[test]
    fn missing_file_is_config_error() {
        let err = load_config(Path::new("/nonexistent/graceful.toml")).expect_err("missing file");
        assert!(matches!(err, Error::Config(_)));
    }
}
