use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand::Rng;
use tracing::{debug, error, warn};

use crate::{GithubApiError, Result};

/// Longest wait the engine will accept before a retry.
///
/// A rate-limit reset or `retry-after` value beyond this ceiling aborts the
/// operation instead of sleeping.
pub const MAX_WAITING_TIME: Duration = Duration::from_secs(900);

/// Injectable delay primitive used between retry attempts.
#[async_trait::async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Default sleeper backed by `tokio::time::sleep`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioSleeper;

#[async_trait::async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Tuning parameters for [`execute_with_retry`].
///
/// Immutable for the duration of one engine invocation.
#[derive(Clone)]
pub struct RetryConfig {
    /// Maximum number of operation invocations, including the first.
    pub max_retries: u32,
    /// Wait applied to server errors and failures without a usable response.
    pub default_delay: Duration,
    /// Base wait for secondary rate limits; up to 50% jitter is added on top.
    pub secondary_rate_limit_delay_base: Duration,
    /// Delay primitive; swapped for a recording stub in tests.
    pub sleeper: Arc<dyn Sleeper>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            default_delay: Duration::from_secs(5),
            secondary_rate_limit_delay_base: Duration::from_secs(60),
            sleeper: Arc::new(TokioSleeper),
        }
    }
}

impl fmt::Debug for RetryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryConfig")
            .field("max_retries", &self.max_retries)
            .field("default_delay", &self.default_delay)
            .field(
                "secondary_rate_limit_delay_base",
                &self.secondary_rate_limit_delay_base,
            )
            .field("sleeper", &"<sleeper>")
            .finish()
    }
}

/// Outcome of classifying one failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Try again after waiting this long.
    Retry(Duration),
    /// Give up and propagate the error unmodified.
    Abort(AbortReason),
}

/// Why a failure is not worth retrying.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AbortReason {
    /// 4xx response with no rate-limit escape hatch.
    ClientError,
    /// The server asked for a wait longer than [`MAX_WAITING_TIME`].
    ExcessiveWait,
}

/// Classifies a failed API call into a retry decision.
///
/// This is the single classification point: [`execute_with_retry`] consults it
/// on every failure, and batch callers reuse it to tell a terminal
/// excessive-wait error apart from one that is safe to skip.
pub fn classify(config: &RetryConfig, error: &GithubApiError) -> RetryDecision {
    classify_at(config, error, unix_now())
}

fn classify_at(config: &RetryConfig, error: &GithubApiError, now_unix: u64) -> RetryDecision {
    let Some(response) = error.response() else {
        debug!(error = %error, "no response attached, treating as unknown error");
        return RetryDecision::Retry(config.default_delay);
    };

    let status = response.status;
    if status == 403 {
        if response.rate_limit_remaining() == Some("0") {
            let reset = response.rate_limit_reset().unwrap_or(0);
            let wait = Duration::from_secs(reset.saturating_sub(now_unix));
            if wait > MAX_WAITING_TIME {
                error!(
                    wait_secs = wait.as_secs(),
                    "rate limit reset exceeds the waiting ceiling"
                );
                return RetryDecision::Abort(AbortReason::ExcessiveWait);
            }
            warn!(wait_secs = wait.as_secs(), "rate limit exceeded");
            return RetryDecision::Retry(wait);
        }

        if let Some(secs) = response.retry_after_secs() {
            if Duration::from_secs(secs) > MAX_WAITING_TIME {
                error!(
                    retry_after_secs = secs,
                    "retry-after exceeds the waiting ceiling"
                );
                return RetryDecision::Abort(AbortReason::ExcessiveWait);
            }
        }

        if response.message.contains("secondary rate limit") {
            let base = config.secondary_rate_limit_delay_base;
            let wait = base + base.mul_f64(rand::thread_rng().gen_range(0.0..0.5));
            warn!(wait_secs = wait.as_secs(), "secondary rate limit exceeded");
            return RetryDecision::Retry(wait);
        }

        // A 403 that reaches this point is a throttle without a usable
        // retry-after value; fall back to the default delay rather than
        // sleeping for an undefined duration.
        let wait = response
            .retry_after_secs()
            .map(Duration::from_secs)
            .unwrap_or(config.default_delay);
        warn!(wait_secs = wait.as_secs(), "rate limit exceeded");
        return RetryDecision::Retry(wait);
    }

    if status >= 500 {
        warn!(status, "server error");
        return RetryDecision::Retry(config.default_delay);
    }

    if status >= 400 {
        error!(status, "client error");
        return RetryDecision::Abort(AbortReason::ClientError);
    }

    debug!(status, "unexpected error status, treating as unknown error");
    RetryDecision::Retry(config.default_delay)
}

/// Executes `operation` until it succeeds, a failure classifies as an abort,
/// or `config.max_retries` attempts are exhausted.
///
/// The operation runs at most `max_retries` times and the sleeper is invoked
/// at most `max_retries - 1` times; the final failure is returned without a
/// wait. Abort and exhaustion both yield the original error value with its
/// response attached, so callers can inspect what the server sent.
pub async fn execute_with_retry<T, Op, Fut>(config: &RetryConfig, mut operation: Op) -> Result<T>
where
    Op: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = config.max_retries.max(1);

    for attempt in 1..=max_attempts {
        let error = match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };
        warn!(attempt, error = %error, "api call failed");

        let wait = match classify(config, &error) {
            RetryDecision::Abort(reason) => {
                debug!(?reason, "operation aborted");
                return Err(error);
            }
            RetryDecision::Retry(wait) => wait,
        };

        if attempt == max_attempts {
            warn!(attempts = max_attempts, "retries exhausted");
            return Err(error);
        }

        debug!(attempt, wait_ms = wait.as_millis() as u64, "retrying after wait");
        config.sleeper.sleep(wait).await;
    }

    unreachable!("retry loop returns on success, abort, or exhaustion")
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    use super::*;
    use crate::ApiErrorResponse;

    /// Records requested durations instead of sleeping.
    #[derive(Default)]
    struct RecordingSleeper {
        slept: Mutex<Vec<Duration>>,
    }

    #[async_trait::async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.slept
                .lock()
                .expect("sleep log mutex must not be poisoned")
                .push(duration);
        }
    }

    impl RecordingSleeper {
        fn slept(&self) -> Vec<Duration> {
            self.slept
                .lock()
                .expect("sleep log mutex must not be poisoned")
                .clone()
        }
    }

    fn config_with(sleeper: &Arc<RecordingSleeper>) -> RetryConfig {
        RetryConfig {
            sleeper: Arc::clone(sleeper) as Arc<dyn Sleeper>,
            ..RetryConfig::default()
        }
    }

    fn api_error(status: u16, headers: &[(&str, &str)], message: &str) -> GithubApiError {
        GithubApiError::Api(ApiErrorResponse {
            status,
            headers: headers
                .iter()
                .map(|(name, value)| ((*name).to_owned(), (*value).to_owned()))
                .collect(),
            message: message.to_owned(),
        })
    }

    #[tokio::test]
    async fn first_attempt_success_never_sleeps() {
        let sleeper = Arc::new(RecordingSleeper::default());
        let config = config_with(&sleeper);
        let calls = AtomicU32::new(0);

        let result = execute_with_retry(&config, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(42) }
        })
        .await
        .expect("operation must succeed");

        assert_eq!(result, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(sleeper.slept().is_empty());
    }

    #[tokio::test]
    async fn transient_failures_sleep_once_per_failure() {
        let sleeper = Arc::new(RecordingSleeper::default());
        let config = config_with(&sleeper);
        let calls = AtomicU32::new(0);

        let result = execute_with_retry(&config, || {
            let attempt = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 2 {
                    Err(api_error(500, &[], "boom"))
                } else {
                    Ok("done")
                }
            }
        })
        .await
        .expect("operation must succeed after retries");

        assert_eq!(result, "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(sleeper.slept().len(), 2);
    }

    #[tokio::test]
    async fn permanent_failure_exhausts_attempts() {
        let sleeper = Arc::new(RecordingSleeper::default());
        let config = config_with(&sleeper);
        let calls = AtomicU32::new(0);

        let error = execute_with_retry::<(), _, _>(&config, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(api_error(502, &[], "bad gateway")) }
        })
        .await
        .expect_err("operation must fail");

        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert_eq!(sleeper.slept().len(), 4);
        let response = error.response().expect("final error must keep its response");
        assert_eq!(response.status, 502);
    }

    #[tokio::test]
    async fn rate_limit_reset_drives_the_wait() {
        let sleeper = Arc::new(RecordingSleeper::default());
        let config = config_with(&sleeper);
        let reset = (unix_now() + 2).to_string();
        let calls = AtomicU32::new(0);

        let result = execute_with_retry(&config, || {
            let attempt = calls.fetch_add(1, Ordering::SeqCst);
            let reset = reset.clone();
            async move {
                if attempt == 0 {
                    Err(api_error(
                        403,
                        &[("x-ratelimit-remaining", "0"), ("x-ratelimit-reset", &reset)],
                        "API rate limit exceeded",
                    ))
                } else {
                    Ok(())
                }
            }
        })
        .await;

        assert!(result.is_ok());
        let slept = sleeper.slept();
        assert_eq!(slept.len(), 1);
        // The clock may tick between building the header and classifying.
        assert!(slept[0] >= Duration::from_secs(1) && slept[0] <= Duration::from_secs(2));
    }

    #[tokio::test]
    async fn retry_after_above_ceiling_aborts_immediately() {
        let sleeper = Arc::new(RecordingSleeper::default());
        let config = config_with(&sleeper);
        let calls = AtomicU32::new(0);

        let error = execute_with_retry::<(), _, _>(&config, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(api_error(403, &[("retry-after", "901")], "Forbidden")) }
        })
        .await
        .expect_err("operation must abort");

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(sleeper.slept().is_empty());
        assert_eq!(error.response().map(|r| r.status), Some(403));
    }

    #[tokio::test]
    async fn rate_limit_reset_above_ceiling_aborts_immediately() {
        let sleeper = Arc::new(RecordingSleeper::default());
        let config = config_with(&sleeper);
        let reset = (unix_now() + 3_600).to_string();
        let calls = AtomicU32::new(0);

        let result = execute_with_retry::<(), _, _>(&config, || {
            calls.fetch_add(1, Ordering::SeqCst);
            let reset = reset.clone();
            async move {
                Err(api_error(
                    403,
                    &[("x-ratelimit-remaining", "0"), ("x-ratelimit-reset", &reset)],
                    "API rate limit exceeded",
                ))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(sleeper.slept().is_empty());
    }

    #[tokio::test]
    async fn secondary_rate_limit_waits_base_plus_jitter() {
        let sleeper = Arc::new(RecordingSleeper::default());
        let config = config_with(&sleeper);
        let calls = AtomicU32::new(0);

        let _ = execute_with_retry::<(), _, _>(&config, || {
            let attempt = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt == 0 {
                    Err(api_error(
                        403,
                        &[],
                        "You have exceeded a secondary rate limit",
                    ))
                } else {
                    Ok(())
                }
            }
        })
        .await;

        let slept = sleeper.slept();
        assert_eq!(slept.len(), 1);
        assert!(slept[0] >= Duration::from_secs(60), "slept {:?}", slept[0]);
        assert!(slept[0] < Duration::from_secs(90), "slept {:?}", slept[0]);
    }

    #[tokio::test]
    async fn server_error_waits_the_default_delay() {
        let sleeper = Arc::new(RecordingSleeper::default());
        let config = config_with(&sleeper);
        let calls = AtomicU32::new(0);

        let _ = execute_with_retry::<(), _, _>(&config, || {
            let attempt = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt == 0 {
                    Err(api_error(500, &[], "server exploded"))
                } else {
                    Ok(())
                }
            }
        })
        .await;

        assert_eq!(sleeper.slept(), vec![Duration::from_secs(5)]);
    }

    #[tokio::test]
    async fn client_error_aborts_without_retry() {
        let sleeper = Arc::new(RecordingSleeper::default());
        let config = config_with(&sleeper);
        let calls = AtomicU32::new(0);

        let error = execute_with_retry::<(), _, _>(&config, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(api_error(400, &[], "Bad Request")) }
        })
        .await
        .expect_err("operation must abort");

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(sleeper.slept().is_empty());
        assert!(matches!(error, GithubApiError::Api(_)));
    }

    #[test]
    fn classify_403_with_bounded_retry_after_uses_the_header() {
        let config = RetryConfig::default();
        let error = api_error(403, &[("retry-after", "30")], "Forbidden");
        assert_eq!(
            classify_at(&config, &error, 1_000),
            RetryDecision::Retry(Duration::from_secs(30))
        );
    }

    #[test]
    fn classify_403_without_retry_after_falls_back_to_default() {
        let config = RetryConfig::default();
        let error = api_error(403, &[], "Forbidden");
        assert_eq!(
            classify_at(&config, &error, 1_000),
            RetryDecision::Retry(config.default_delay)
        );
    }

    #[test]
    fn classify_403_with_unparsable_retry_after_falls_back_to_default() {
        let config = RetryConfig::default();
        let error = api_error(403, &[("retry-after", "soon")], "Forbidden");
        assert_eq!(
            classify_at(&config, &error, 1_000),
            RetryDecision::Retry(config.default_delay)
        );
    }

    #[test]
    fn classify_elapsed_rate_limit_reset_retries_immediately() {
        let config = RetryConfig::default();
        let error = api_error(
            403,
            &[("x-ratelimit-remaining", "0"), ("x-ratelimit-reset", "500")],
            "API rate limit exceeded",
        );
        assert_eq!(
            classify_at(&config, &error, 1_000),
            RetryDecision::Retry(Duration::ZERO)
        );
    }

    #[test]
    fn classify_exhausted_rate_limit_outranks_retry_after() {
        let config = RetryConfig::default();
        let error = api_error(
            403,
            &[
                ("retry-after", "5"),
                ("x-ratelimit-remaining", "0"),
                ("x-ratelimit-reset", "1002"),
            ],
            "Rate limit exceeded",
        );
        assert_eq!(
            classify_at(&config, &error, 1_000),
            RetryDecision::Retry(Duration::from_secs(2))
        );
    }

    #[test]
    fn classify_excessive_retry_after_outranks_secondary_message() {
        let config = RetryConfig::default();
        let error = api_error(
            403,
            &[("retry-after", "1200")],
            "You have exceeded a secondary rate limit",
        );
        assert_eq!(
            classify_at(&config, &error, 1_000),
            RetryDecision::Abort(AbortReason::ExcessiveWait)
        );
    }

    #[test]
    fn classify_unexpected_status_uses_the_default_delay() {
        let config = RetryConfig::default();
        let error = api_error(302, &[], "Found");
        assert_eq!(
            classify_at(&config, &error, 1_000),
            RetryDecision::Retry(config.default_delay)
        );
    }

    #[test]
    fn classify_decode_error_uses_the_default_delay() {
        let config = RetryConfig::default();
        let error = GithubApiError::Decode("truncated body".to_owned());
        assert_eq!(
            classify_at(&config, &error, 1_000),
            RetryDecision::Retry(config.default_delay)
        );
    }

    #[test]
    fn classify_404_aborts_as_client_error() {
        let config = RetryConfig::default();
        let error = api_error(404, &[], "Not Found");
        assert_eq!(
            classify_at(&config, &error, 1_000),
            RetryDecision::Abort(AbortReason::ClientError)
        );
    }
}
