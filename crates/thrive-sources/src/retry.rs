//! Retry logic with configurable backoff policies for source fetches.

use std::time::Duration;

use rand::Rng;

use thrive_types::{RawObservation, ThriveError};

/// Floor for the rate-limit wait, scaled by attempt number.
const RATE_LIMIT_BASE_MS: u64 = 1500;

/// Backoff policy controlling the delay between fetch attempts.
#[derive(Debug, Clone)]
pub enum BackoffPolicy {
    /// Fixed delay between retries.
    Fixed(Duration),
    /// Linear backoff: base * attempt, plus up to `jitter` of random slack.
    Linear { base: Duration, jitter: Duration },
    /// Exponential backoff: base * 2^(attempt-1), capped at max.
    Exponential { base: Duration, max: Duration },
    /// No delay between retries.
    None,
}

impl BackoffPolicy {
    /// Compute the delay after a failed attempt (1-indexed).
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let attempt = attempt.max(1) as u64;
        match self {
            BackoffPolicy::Fixed(d) => *d,
            BackoffPolicy::Linear { base, jitter } => {
                let slack_ms = jitter.as_millis() as u64;
                let slack = if slack_ms == 0 {
                    0
                } else {
                    rand::thread_rng().gen_range(0..=slack_ms)
                };
                Duration::from_millis(base.as_millis() as u64 * attempt + slack)
            }
            BackoffPolicy::Exponential { base, max } => {
                let millis =
                    base.as_millis() as u64 * 2u64.saturating_pow(attempt as u32 - 1);
                Duration::from_millis(millis).min(*max)
            }
            BackoffPolicy::None => Duration::ZERO,
        }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        BackoffPolicy::Linear {
            base: Duration::from_millis(500),
            jitter: Duration::from_millis(250),
        }
    }
}

/// The wait after a rate-limit rejection (attempt is 1-indexed).
///
/// Whichever is longer wins: the attempt-scaled floor or the server's own
/// retry hint. This wait applies regardless of the configured policy.
pub fn rate_limit_delay(attempt: usize, retry_after_ms: u64) -> Duration {
    let floor = RATE_LIMIT_BASE_MS * attempt.max(1) as u64;
    Duration::from_millis(floor.max(retry_after_ms))
}

/// Execute a fetch with retry logic.
///
/// The closure `f` is called up to `max_attempts` times (first try included).
/// Retries occur only when the error satisfies
/// [`thrive_types::ThriveError::is_retryable`]; anything else is returned
/// immediately. Rate-limited errors wait per [`rate_limit_delay`], all other
/// retryable errors wait per `policy`. Exhaustion returns
/// [`ThriveError::RetriesExhausted`] carrying the final underlying cause.
pub async fn execute_with_retry<F, Fut>(
    f: F,
    max_attempts: usize,
    policy: &BackoffPolicy,
    measure: &str,
) -> thrive_types::Result<Vec<RawObservation>>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = thrive_types::Result<Vec<RawObservation>>>,
{
    let max_attempts = max_attempts.max(1);
    let mut last_err = None;
    for attempt in 1..=max_attempts {
        match f().await {
            Ok(rows) => return Ok(rows),
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                let delay = match &e {
                    ThriveError::RateLimited { retry_after_ms, .. } => {
                        rate_limit_delay(attempt, *retry_after_ms)
                    }
                    _ => policy.delay_for_attempt(attempt),
                };
                tracing::warn!(
                    measure,
                    attempt,
                    delay_ms = %delay.as_millis(),
                    error = %e,
                    "Retryable fetch error, backing off"
                );
                tokio::time::sleep(delay).await;
                last_err = Some(e);
            }
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) => {
                last_err = Some(e);
            }
        }
    }
    Err(ThriveError::RetriesExhausted {
        measure: measure.to_string(),
        attempts: max_attempts,
        cause: last_err
            .map(|e| e.to_string())
            .unwrap_or_else(|| "unknown".into()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn retryable_error() -> ThriveError {
        ThriveError::SourceError {
            source: "test".into(),
            status: 500,
            message: "server error".into(),
            retryable: true,
        }
    }

    fn sample_rows() -> Vec<RawObservation> {
        vec![RawObservation::new("01001", 2022).with_value("value", serde_json::json!(3.4))]
    }

    // 1. No retries needed, success on first try
    #[tokio::test]
    async fn success_on_first_try() {
        let result = execute_with_retry(
            || async { Ok(sample_rows()) },
            5,
            &BackoffPolicy::None,
            "poverty_rate",
        )
        .await;

        let rows = result.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].geo_key, "01001");
    }

    // 2. Retry on retryable error succeeds on second try
    #[tokio::test]
    async fn retry_on_retryable_error_succeeds() {
        let call_count = Arc::new(AtomicUsize::new(0));
        let cc = call_count.clone();

        let result = execute_with_retry(
            move || {
                let cc = cc.clone();
                async move {
                    let n = cc.fetch_add(1, Ordering::SeqCst);
                    if n == 0 {
                        Err(retryable_error())
                    } else {
                        Ok(sample_rows())
                    }
                }
            },
            5,
            &BackoffPolicy::None,
            "poverty_rate",
        )
        .await;

        assert!(result.is_ok());
        assert_eq!(call_count.load(Ordering::SeqCst), 2);
    }

    // 3. Exhaustion wraps the final cause and reports the attempt count
    #[tokio::test]
    async fn exhaustion_wraps_final_cause() {
        let call_count = Arc::new(AtomicUsize::new(0));
        let cc = call_count.clone();

        let result = execute_with_retry(
            move || {
                let cc = cc.clone();
                async move {
                    cc.fetch_add(1, Ordering::SeqCst);
                    Err::<Vec<RawObservation>, _>(retryable_error())
                }
            },
            3,
            &BackoffPolicy::None,
            "poverty_rate",
        )
        .await;

        assert_eq!(call_count.load(Ordering::SeqCst), 3);
        let err = result.unwrap_err();
        match &err {
            ThriveError::RetriesExhausted {
                measure, attempts, cause,
            } => {
                assert_eq!(measure, "poverty_rate");
                assert_eq!(*attempts, 3);
                assert!(cause.contains("HTTP 500"));
            }
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
    }

    // 4. Non-retryable error is returned immediately without retrying
    #[tokio::test]
    async fn non_retryable_error_no_retry() {
        let call_count = Arc::new(AtomicUsize::new(0));
        let cc = call_count.clone();

        let result = execute_with_retry(
            move || {
                let cc = cc.clone();
                async move {
                    cc.fetch_add(1, Ordering::SeqCst);
                    Err::<Vec<RawObservation>, _>(ThriveError::AuthError {
                        source: "test".into(),
                    })
                }
            },
            5,
            &BackoffPolicy::None,
            "poverty_rate",
        )
        .await;

        assert!(matches!(result.unwrap_err(), ThriveError::AuthError { .. }));
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }

    // 5. Linear backoff scales with attempt and stays within jitter bounds
    #[test]
    fn linear_backoff_within_jitter_bounds() {
        let policy = BackoffPolicy::Linear {
            base: Duration::from_millis(100),
            jitter: Duration::from_millis(50),
        };
        for attempt in 1..=4 {
            let floor = Duration::from_millis(100 * attempt as u64);
            let ceiling = floor + Duration::from_millis(50);
            let delay = policy.delay_for_attempt(attempt);
            assert!(delay >= floor, "attempt {attempt}: {delay:?} < {floor:?}");
            assert!(delay <= ceiling, "attempt {attempt}: {delay:?} > {ceiling:?}");
        }
    }

    // 6. Exponential backoff doubles correctly and respects max
    #[test]
    fn exponential_backoff_doubles_and_caps() {
        let policy = BackoffPolicy::Exponential {
            base: Duration::from_millis(100),
            max: Duration::from_millis(500),
        };
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(400));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_millis(500));
        assert_eq!(policy.delay_for_attempt(10), Duration::from_millis(500));
    }

    // 7. Fixed backoff returns constant delay
    #[test]
    fn fixed_backoff_constant_delay() {
        let policy = BackoffPolicy::Fixed(Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(5), Duration::from_millis(200));
    }

    // 8. BackoffPolicy::None returns zero duration
    #[test]
    fn none_backoff_zero_delay() {
        let policy = BackoffPolicy::None;
        assert_eq!(policy.delay_for_attempt(1), Duration::ZERO);
        assert_eq!(policy.delay_for_attempt(99), Duration::ZERO);
    }

    // 9. Default backoff is linear with expected base and jitter
    #[test]
    fn default_backoff_is_linear() {
        let policy = BackoffPolicy::default();
        let delay = policy.delay_for_attempt(2);
        assert!(delay >= Duration::from_millis(1000));
        assert!(delay <= Duration::from_millis(1250));
    }

    // 10. Rate-limit delay takes the larger of the floor and the server hint
    #[test]
    fn rate_limit_delay_honors_server_hint() {
        assert_eq!(rate_limit_delay(1, 0), Duration::from_millis(1500));
        assert_eq!(rate_limit_delay(2, 0), Duration::from_millis(3000));
        assert_eq!(rate_limit_delay(1, 5000), Duration::from_millis(5000));
        assert_eq!(rate_limit_delay(3, 4000), Duration::from_millis(4500));
    }

    // 11. A zero attempt budget still runs the fetch once
    #[tokio::test]
    async fn zero_attempts_treated_as_one() {
        let call_count = Arc::new(AtomicUsize::new(0));
        let cc = call_count.clone();

        let result = execute_with_retry(
            move || {
                let cc = cc.clone();
                async move {
                    cc.fetch_add(1, Ordering::SeqCst);
                    Ok(sample_rows())
                }
            },
            0,
            &BackoffPolicy::None,
            "poverty_rate",
        )
        .await;

        assert!(result.is_ok());
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }
}
