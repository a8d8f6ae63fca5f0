//! Convergence polling
//!
//! Replication is eventually consistent, so a reader on another instance
//! waits for data with bounded retries. Running out of time is reported as
//! [`ConvergenceError::TimedOut`], never as an absent value.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::time::sleep;
use tracing::debug;

/// Poll schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollConfig {
    pub timeout_ms: u64,
    pub initial_interval_ms: u64,
    pub max_interval_ms: u64,
    pub backoff_factor: f64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5_000,
            initial_interval_ms: 10,
            max_interval_ms: 250,
            backoff_factor: 2.0,
        }
    }
}

impl PollConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    fn next_interval(&self, current: Duration) -> Duration {
        let factor = self.backoff_factor.max(1.0);
        Duration::from_secs_f64(current.as_secs_f64() * factor)
            .min(Duration::from_millis(self.max_interval_ms.max(1)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConvergenceError {
    #[error("Timed out after {waited:?} ({attempts} attempts)")]
    TimedOut { waited: Duration, attempts: u32 },
}

/// Call `check` until it yields a value or the timeout elapses.
///
/// The check always runs at least once, and once more at the deadline.
pub async fn wait_for<T, F>(config: &PollConfig, mut check: F) -> Result<T, ConvergenceError>
where
    F: FnMut() -> Option<T>,
{
    try_wait_for(config, || Ok(check())).await
}

/// Like [`wait_for`], for checks that can fail. An error from `check` ends the wait
/// immediately and is returned as is.
pub async fn try_wait_for<T, E, F>(config: &PollConfig, mut check: F) -> Result<T, E>
where
    F: FnMut() -> Result<Option<T>, E>,
    E: From<ConvergenceError>,
{
    let started = Instant::now();
    let deadline = started + config.timeout();
    let mut interval = Duration::from_millis(config.initial_interval_ms.max(1));
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        if let Some(value) = check()? {
            debug!(attempts, elapsed_ms = started.elapsed().as_millis() as u64, "Converged");
            return Ok(value);
        }
        let now = Instant::now();
        if now >= deadline {
            return Err(ConvergenceError::TimedOut {
                waited: started.elapsed(),
                attempts,
            }
            .into());
        }
        sleep(interval.min(deadline - now)).await;
        interval = config.next_interval(interval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_returns_once_check_succeeds() {
        let mut calls = 0;
        let value = wait_for(&PollConfig::default(), || {
            calls += 1;
            (calls >= 3).then_some(calls)
        })
        .await
        .unwrap();
        assert_eq!(value, 3);
    }

    #[tokio::test]
    async fn test_times_out_with_distinct_error() {
        let config = PollConfig::default().with_timeout(Duration::from_millis(30));
        let result: Result<(), _> = wait_for(&config, || None).await;
        match result {
            Err(ConvergenceError::TimedOut { waited, attempts }) => {
                assert!(waited >= Duration::from_millis(30));
                assert!(attempts >= 2);
            }
            Ok(_) => panic!("expected timeout"),
        }
    }

    #[derive(Debug, PartialEq)]
    enum CheckFailure {
        Broken,
        Waited,
    }

    impl From<ConvergenceError> for CheckFailure {
        fn from(_: ConvergenceError) -> Self {
            CheckFailure::Waited
        }
    }

    #[tokio::test]
    async fn test_check_error_ends_wait() {
        let mut calls = 0;
        let result: Result<(), CheckFailure> = try_wait_for(&PollConfig::default(), || {
            calls += 1;
            if calls == 2 {
                Err(CheckFailure::Broken)
            } else {
                Ok(None)
            }
        })
        .await;
        assert_eq!(result, Err(CheckFailure::Broken));
        assert_eq!(calls, 2);
    }
}
