//! Retry strategies, predicates, and `Retry-After` hints.
//!
//! The strategy decides *how long* to wait before a given retry; the
//! predicate decides *whether* an error is worth retrying at all. Both are
//! injectable on the client builder. A server-provided `Retry-After` header
//! takes precedence over the computed backoff, capped at the strategy's
//! maximum delay.

use crate::Error;
use http::HeaderMap;
use rand::Rng;
use std::time::{Duration, SystemTime};

/// Defines how long to wait before each retry.
///
/// Attempt numbers are 0-based: attempt 0 is the first retry, after the
/// initial try failed. A strategy with `max_retries = N` allows at most N
/// retries, so N + 1 total tries.
///
/// # Examples
///
/// ```
/// use coalesce::RetryStrategy;
/// use std::time::Duration;
///
/// // 100ms, 200ms, 400ms, ... capped at 10s
/// let backoff = RetryStrategy::ExponentialBackoff {
///     base_delay: Duration::from_millis(100),
///     max_delay: Duration::from_secs(10),
///     max_retries: 3,
///     jitter: false,
/// };
/// assert_eq!(backoff.delay_for_attempt(0), Some(Duration::from_millis(100)));
/// assert_eq!(backoff.delay_for_attempt(2), Some(Duration::from_millis(400)));
/// assert_eq!(backoff.delay_for_attempt(3), None);
/// ```
#[derive(Debug, Clone, Default)]
pub enum RetryStrategy {
    /// Never retry.
    #[default]
    None,

    /// Exponentially increasing delays: `min(base_delay * 2^attempt, max_delay)`.
    ExponentialBackoff {
        /// Delay before the first retry.
        base_delay: Duration,
        /// Upper bound on any delay (also caps `Retry-After` hints).
        max_delay: Duration,
        /// Maximum number of retries.
        max_retries: u32,
        /// Randomize each delay to 50-100% of its value.
        jitter: bool,
    },

    /// The same delay before every retry.
    Fixed {
        /// Delay between attempts.
        delay: Duration,
        /// Maximum number of retries.
        max_retries: u32,
    },
}

impl RetryStrategy {
    /// Returns the delay before retry `attempt` (0-based), or `None` once
    /// the retry budget is exhausted.
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        match self {
            RetryStrategy::None => None,
            RetryStrategy::ExponentialBackoff {
                base_delay,
                max_delay,
                max_retries,
                jitter,
            } => {
                if attempt >= *max_retries {
                    return None;
                }
                let multiplier = 2u64.saturating_pow(attempt);
                let base = base_delay.saturating_mul(multiplier.try_into().unwrap_or(u32::MAX));
                let delay = base.min(*max_delay);
                if *jitter {
                    let factor = rand::thread_rng().gen_range(0.5..=1.0);
                    Some(delay.mul_f64(factor))
                } else {
                    Some(delay)
                }
            }
            RetryStrategy::Fixed { delay, max_retries } => {
                if attempt >= *max_retries {
                    None
                } else {
                    Some(*delay)
                }
            }
        }
    }

    /// The retry budget of this strategy.
    pub fn max_retries(&self) -> u32 {
        match self {
            RetryStrategy::None => 0,
            RetryStrategy::ExponentialBackoff { max_retries, .. }
            | RetryStrategy::Fixed { max_retries, .. } => *max_retries,
        }
    }

    /// The cap applied to server `Retry-After` hints.
    pub(crate) fn delay_cap(&self) -> Option<Duration> {
        match self {
            RetryStrategy::None => None,
            RetryStrategy::ExponentialBackoff { max_delay, .. } => Some(*max_delay),
            RetryStrategy::Fixed { delay, .. } => Some(*delay),
        }
    }
}

/// Decides whether a failed request should be retried.
///
/// # Examples
///
/// ```
/// use coalesce::{Error, RetryPredicate};
///
/// struct RetryOnServerOnly;
///
/// impl RetryPredicate for RetryOnServerOnly {
///     fn should_retry(&self, error: &Error, _attempt: u32) -> bool {
///         matches!(error, Error::Server { .. })
///     }
/// }
/// ```
pub trait RetryPredicate: Send + Sync {
    /// Returns `true` if the request should be retried.
    ///
    /// `attempt` is the 0-based index of the retry being considered.
    fn should_retry(&self, error: &Error, attempt: u32) -> bool;
}

/// Retry every transient error: network failures, timeouts, 5xx, 408, 429.
///
/// This is the default predicate; it never retries business errors or
/// other 4xx responses.
#[derive(Debug, Clone, Copy)]
pub struct TransientErrors;

impl RetryPredicate for TransientErrors {
    fn should_retry(&self, error: &Error, _attempt: u32) -> bool {
        error.is_transient()
    }
}

/// Combine predicates with OR logic: retries if any of them would.
pub struct OrPredicate {
    predicates: Vec<Box<dyn RetryPredicate>>,
}

impl OrPredicate {
    /// Creates a predicate that retries when any member does.
    pub fn new(predicates: Vec<Box<dyn RetryPredicate>>) -> Self {
        Self { predicates }
    }
}

impl RetryPredicate for OrPredicate {
    fn should_retry(&self, error: &Error, attempt: u32) -> bool {
        self.predicates.iter().any(|p| p.should_retry(error, attempt))
    }
}

/// Parses a `Retry-After` response header into a wait duration.
///
/// Supports both delay-seconds and HTTP-date forms.
pub(crate) fn retry_after_hint(headers: &HeaderMap) -> Option<Duration> {
    let header = headers.get("retry-after")?.to_str().ok()?;

    if let Ok(seconds) = header.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    if let Ok(at) = httpdate::parse_http_date(header) {
        if let Ok(until) = at.duration_since(SystemTime::now()) {
            return Some(until);
        }
    }

    None
}
