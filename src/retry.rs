use std::sync::OnceLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use regex::Regex;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::Deserialize;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::config::RunOptions;
use crate::error::TranslateError;

/// Pause applied after a 429 that carries no usable retry hint.
pub const DEFAULT_RATE_LIMIT_DELAY: Duration = Duration::from_secs(65);

/// Added on top of a provider-supplied retry hint.
pub const RATE_LIMIT_BUFFER: Duration = Duration::from_secs(5);

/// Upper bound on any provider-supplied retry hint.
pub const MAX_RETRY_HINT: Duration = Duration::from_secs(60 * 60);

/// Retry behaviour for one run's outbound requests
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt (attempts = max_retries + 1)
    pub max_retries: u32,
    /// Backoff after the first failed attempt
    pub initial_delay: Duration,
    /// Maximum backoff between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff (2.0 doubles the delay each time)
    pub backoff_multiplier: f64,
    /// Pause used when a 429 carries no retry hint
    pub rate_limit_delay: Duration,
    /// Added to a parsed retry hint
    pub rate_limit_buffer: Duration,
    /// How often a paused worker re-checks the shared pause and cancellation
    pub poll_interval: Duration,
    /// Overrides the provider's per-call timeout when set
    pub request_timeout: Option<Duration>,
}

impl RetryPolicy {
    /// Create a policy with `max_retries` retries and the standard backoff (1s, 2s, 4s, ...)
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            rate_limit_delay: DEFAULT_RATE_LIMIT_DELAY,
            rate_limit_buffer: RATE_LIMIT_BUFFER,
            poll_interval: Duration::from_millis(250),
            request_timeout: None,
        }
    }

    /// Policy derived from a run's options
    pub fn for_run(options: &RunOptions) -> Self {
        let mut policy = Self::new(options.max_retries);
        policy.request_timeout = options.request_timeout;
        policy
    }

    /// Set the initial backoff delay
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the maximum delay between retries
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Set the backoff multiplier
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Set the fallback rate-limit pause and the buffer added to parsed hints
    pub fn with_rate_limit_delay(mut self, fallback: Duration, buffer: Duration) -> Self {
        self.rate_limit_delay = fallback;
        self.rate_limit_buffer = buffer;
        self
    }

    /// Set the pause polling interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the per-call timeout override
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Backoff to wait after failed attempt `attempt` (0-indexed): initial * multiplier^attempt
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let delay_ms = self.initial_delay.as_millis() as f64
            * self.backoff_multiplier.powi(attempt.min(i32::MAX as u32) as i32);

        let delay = Duration::from_millis(delay_ms.min(u64::MAX as f64) as u64);
        delay.min(self.max_delay)
    }

    /// Pause window for a 429: the hint plus the buffer, or the fallback delay
    pub fn rate_limit_pause(&self, hint: Option<Duration>) -> Duration {
        match hint {
            Some(hint) => hint.saturating_add(self.rate_limit_buffer),
            None => self.rate_limit_delay,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    details: Vec<serde_json::Value>,
}

static RETRY_PHRASE_REGEX: OnceLock<Regex> = OnceLock::new();

/// Extract a provider-supplied retry delay from a 429 response.
///
/// Checked in order: a structured `RetryInfo` detail (`"retryDelay": "30s"`),
/// a "retry after/in N seconds" phrase in the error message, and the
/// `Retry-After` header (seconds or HTTP date). Hints are capped at
/// [`MAX_RETRY_HINT`].
pub fn parse_retry_hint(headers: &HeaderMap, body: &str) -> Option<Duration> {
    find_retry_hint(headers, body).map(|hint| hint.min(MAX_RETRY_HINT))
}

fn find_retry_hint(headers: &HeaderMap, body: &str) -> Option<Duration> {
    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
        let structured = parsed.error.details.iter().find_map(|detail| {
            let is_retry_info = detail
                .get("@type")
                .and_then(|t| t.as_str())
                .map_or(true, |t| t.ends_with("RetryInfo"));
            if !is_retry_info {
                return None;
            }
            detail
                .get("retryDelay")
                .and_then(|d| d.as_str())
                .and_then(parse_seconds)
        });
        if structured.is_some() {
            return structured;
        }

        if let Some(message) = parsed.error.message.as_deref() {
            if let Some(delay) = parse_retry_phrase(message) {
                return Some(delay);
            }
        }
    }

    headers
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_retry_after_header)
}

fn parse_retry_phrase(message: &str) -> Option<Duration> {
    let regex = RETRY_PHRASE_REGEX.get_or_init(|| {
        Regex::new(r"(?i)retry (?:after|in)\s+(\d+(?:\.\d+)?)\s*(?:s|sec|secs|seconds)\b")
            .expect("retry phrase regex is valid")
    });
    regex
        .captures(message)
        .and_then(|cap| cap.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
}

/// Parse durations such as `"30s"`, `"1.5s"` or `"12"`.
fn parse_seconds(value: &str) -> Option<Duration> {
    let trimmed = value.trim().trim_end_matches('s');
    trimmed
        .parse::<f64>()
        .ok()
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
}

fn parse_retry_after_header(value: &str) -> Option<Duration> {
    if let Ok(secs) = value.trim().parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let date = DateTime::parse_from_rfc2822(value.trim()).ok()?;
    let delta = date.with_timezone(&Utc) - Utc::now();
    delta.to_std().ok()
}

/// Sleep for `duration` unless `cancel` fires first.
pub(crate) async fn sleep_or_cancel(
    duration: Duration,
    cancel: &CancellationToken,
) -> Result<(), TranslateError> {
    if duration.is_zero() {
        return if cancel.is_cancelled() {
            Err(TranslateError::Cancelled)
        } else {
            Ok(())
        };
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(TranslateError::Cancelled),
        _ = sleep(duration) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    // ==================== Policy Tests ====================

    #[test]
    fn test_retry_policy_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.initial_delay, Duration::from_secs(1));
        assert_eq!(policy.rate_limit_delay, Duration::from_secs(65));
        assert!(policy.request_timeout.is_none());
    }

    #[test]
    fn test_backoff_doubles_per_attempt() {
        let policy = RetryPolicy::new(4);

        assert_eq!(policy.backoff_for_attempt(0), Duration::from_secs(1));
        assert_eq!(policy.backoff_for_attempt(1), Duration::from_secs(2));
        assert_eq!(policy.backoff_for_attempt(2), Duration::from_secs(4));
        assert_eq!(policy.backoff_for_attempt(3), Duration::from_secs(8));
    }

    #[test]
    fn test_backoff_respects_max() {
        let policy = RetryPolicy::new(10)
            .with_max_delay(Duration::from_secs(3))
            .with_backoff_multiplier(2.0);

        assert_eq!(policy.backoff_for_attempt(4), Duration::from_secs(3));
    }

    #[test]
    fn test_backoff_huge_attempt_saturates() {
        let policy = RetryPolicy::new(3);
        assert_eq!(policy.backoff_for_attempt(u32::MAX), policy.max_delay);
    }

    #[test]
    fn test_rate_limit_pause_adds_buffer_to_hint() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.rate_limit_pause(Some(Duration::from_secs(30))),
            Duration::from_secs(30) + RATE_LIMIT_BUFFER
        );
        assert_eq!(policy.rate_limit_pause(None), DEFAULT_RATE_LIMIT_DELAY);
    }

    #[test]
    fn test_rate_limit_pause_saturates() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.rate_limit_pause(Some(Duration::MAX)), Duration::MAX);
    }

    // ==================== Retry Hint Tests ====================

    #[test]
    fn test_parse_structured_retry_info() {
        let body = r#"{
            "error": {
                "code": 429,
                "message": "Resource has been exhausted",
                "status": "RESOURCE_EXHAUSTED",
                "details": [
                    {"@type": "type.googleapis.com/google.rpc.QuotaFailure", "violations": []},
                    {"@type": "type.googleapis.com/google.rpc.RetryInfo", "retryDelay": "30s"}
                ]
            }
        }"#;

        let hint = parse_retry_hint(&HeaderMap::new(), body);
        assert_eq!(hint, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_parse_fractional_retry_delay() {
        let body = r#"{"error": {"details": [{"@type": "x.RetryInfo", "retryDelay": "1.5s"}]}}"#;
        let hint = parse_retry_hint(&HeaderMap::new(), body);
        assert_eq!(hint, Some(Duration::from_millis(1500)));
    }

    #[test]
    fn test_parse_retry_phrase_in_message() {
        let body = r#"{"error": {"message": "Rate limit reached. Please retry after 12 seconds."}}"#;
        let hint = parse_retry_hint(&HeaderMap::new(), body);
        assert_eq!(hint, Some(Duration::from_secs(12)));
    }

    #[test]
    fn test_parse_retry_after_header_seconds() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("7"));
        let hint = parse_retry_hint(&headers, "too many requests");
        assert_eq!(hint, Some(Duration::from_secs(7)));
    }

    #[test]
    fn test_huge_retry_after_header_is_capped() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("18446744073709551615"));
        assert_eq!(parse_retry_hint(&headers, ""), Some(MAX_RETRY_HINT));
    }

    #[test]
    fn test_huge_retry_delay_is_capped() {
        let body = r#"{"error": {"details": [{"@type": "x.RetryInfo", "retryDelay": "999999999999s"}]}}"#;
        assert_eq!(parse_retry_hint(&HeaderMap::new(), body), Some(MAX_RETRY_HINT));
    }

    #[test]
    fn test_parse_retry_after_header_past_date_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert_eq!(parse_retry_hint(&headers, ""), None);
    }

    #[test]
    fn test_no_hint_returns_none() {
        let body = r#"{"error": {"message": "slow down"}}"#;
        assert_eq!(parse_retry_hint(&HeaderMap::new(), body), None);
    }

    // ==================== Cancellable Sleep Tests ====================

    #[tokio::test(start_paused = true)]
    async fn test_sleep_or_cancel_completes() {
        let cancel = CancellationToken::new();
        let result = sleep_or_cancel(Duration::from_secs(5), &cancel).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_sleep_or_cancel_observes_cancellation() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let start = std::time::Instant::now();
        let result = sleep_or_cancel(Duration::from_secs(30), &cancel).await;
        assert!(matches!(result, Err(TranslateError::Cancelled)));
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
