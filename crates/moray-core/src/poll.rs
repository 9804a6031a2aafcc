//! Fixed-interval polling with a wall-clock timeout.
//!
//! Every wait in the harness (primary election, mongos readiness,
//! backup drain, container health) goes through [`poll_until`]. There is
//! deliberately no exponential backoff and no cancellation: the loops are
//! short-lived and bounded by the timeout, and the only operations that
//! honor an external stop signal are the long-running fault-injection
//! holds, which implement their own wait on top of this.

use std::future::Future;
use std::time::{Duration, Instant};

use crate::error::PollError;

/// Interval and timeout for a polling loop.
#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    /// Time to sleep between probes.
    pub interval: Duration,

    /// Wall-clock budget for the whole loop.
    pub timeout: Duration,
}

impl PollConfig {
    /// Creates a new polling configuration.
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }
}

/// One observation from a polling probe.
#[derive(Debug)]
pub enum PollStatus<T> {
    /// The awaited condition holds; polling stops with this value.
    Ready(T),

    /// Not yet; the string describes the observed state and is surfaced
    /// in the timeout error.
    Pending(String),
}

/// Polls `probe` on a fixed interval until it reports ready, fails, or
/// the wall-clock timeout elapses.
///
/// The probe always runs at least once. A probe error is fatal and stops
/// the loop immediately; retry decisions belong inside the probe, which
/// can map a retryable failure to [`PollStatus::Pending`]. On timeout the
/// error carries `condition` and the last observed state.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use moray_core::poll::{poll_until, PollConfig, PollStatus};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let mut calls = 0;
/// let result: Result<u32, _> = poll_until(
///     PollConfig::new(Duration::from_millis(1), Duration::from_secs(1)),
///     "three probes",
///     || {
///         calls += 1;
///         let current = calls;
///         async move {
///             if current >= 3 {
///                 Ok::<_, std::io::Error>(PollStatus::Ready(current))
///             } else {
///                 Ok(PollStatus::Pending(format!("call {current}")))
///             }
///         }
///     },
/// )
/// .await;
/// assert_eq!(result.unwrap(), 3);
/// # }
/// ```
pub async fn poll_until<T, E, F, Fut>(
    config: PollConfig,
    condition: &str,
    mut probe: F,
) -> Result<T, PollError<E>>
where
    E: std::error::Error,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<PollStatus<T>, E>>,
{
    let deadline = Instant::now() + config.timeout;
    let mut last_state = String::from("not yet observed");

    loop {
        match probe().await {
            Ok(PollStatus::Ready(value)) => return Ok(value),
            Ok(PollStatus::Pending(state)) => last_state = state,
            Err(err) => return Err(PollError::Fatal(err)),
        }

        if Instant::now() >= deadline {
            return Err(PollError::TimedOut {
                condition: condition.to_string(),
                last_state,
            });
        }

        tokio::time::sleep(config.interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> PollConfig {
        PollConfig::new(Duration::from_millis(1), Duration::from_millis(50))
    }

    #[tokio::test]
    async fn test_ready_on_first_probe() {
        let result: Result<&str, PollError<std::io::Error>> =
            poll_until(fast_config(), "immediate", || async {
                Ok(PollStatus::Ready("done"))
            })
            .await;

        assert_eq!(result.unwrap(), "done");
    }

    #[tokio::test]
    async fn test_ready_after_pending() {
        let mut calls = 0u32;
        let result: Result<u32, PollError<std::io::Error>> =
            poll_until(fast_config(), "third call", || {
                calls += 1;
                let current = calls;
                async move {
                    if current >= 3 {
                        Ok(PollStatus::Ready(current))
                    } else {
                        Ok(PollStatus::Pending(format!("call {current}")))
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_timeout_surfaces_last_state() {
        let result: Result<(), PollError<std::io::Error>> = poll_until(
            PollConfig::new(Duration::from_millis(1), Duration::from_millis(5)),
            "never ready",
            || async { Ok(PollStatus::Pending("still SECONDARY".to_string())) },
        )
        .await;

        match result {
            Err(PollError::TimedOut {
                condition,
                last_state,
            }) => {
                assert_eq!(condition, "never ready");
                assert_eq!(last_state, "still SECONDARY");
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_probe_error_is_fatal() {
        let mut calls = 0u32;
        let result: Result<(), PollError<std::io::Error>> =
            poll_until(fast_config(), "fatal probe", || {
                calls += 1;
                async move {
                    Err(std::io::Error::new(
                        std::io::ErrorKind::Other,
                        "server error",
                    ))
                }
            })
            .await;

        assert!(matches!(result, Err(PollError::Fatal(_))));
        // No retry past a fatal error.
        assert_eq!(calls, 1);
    }
}
