//! # Configuration
//!
//! Retry policy and finality settings, loaded from environment variables.

use crate::domain::MessageFinalityError;
use std::env;
use std::time::Duration;

/// Delay between failed attempts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DelayStrategy {
    /// Retry immediately.
    None,
    /// Same delay after every attempt.
    Fixed(Duration),
    /// `base * 2^(attempt - 1)`, capped at `max`.
    Exponential {
        /// Delay after the first attempt.
        base: Duration,
        /// Upper bound.
        max: Duration,
    },
}

impl DelayStrategy {
    /// Delay after the 1-based `attempt`.
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Self::None => Duration::ZERO,
            Self::Fixed(d) => d,
            Self::Exponential { base, max } => {
                let shift = attempt.saturating_sub(1).min(31);
                base.saturating_mul(1u32 << shift).min(max)
            }
        }
    }
}

/// Decides which errors are retried.
pub type ErrorFilter = fn(&MessageFinalityError) -> bool;

/// Retry policy for finality polling.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    /// Maximum number of attempts (at least 1).
    pub max_attempts: u32,
    /// Delay between attempts after a non-finality failure.
    pub delay: DelayStrategy,
    /// Errors for which this returns `false` are surfaced immediately.
    pub error_filter: ErrorFilter,
}

impl RetryPolicy {
    /// Policy with `max_attempts` and the default delay and filter.
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    /// Replace the delay strategy.
    pub fn delay(mut self, delay: DelayStrategy) -> Self {
        self.delay = delay;
        self
    }

    /// Replace the error filter.
    pub fn error_filter(mut self, filter: ErrorFilter) -> Self {
        self.error_filter = filter;
        self
    }

    /// Attempt budget, never zero.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Check if `err` should be retried.
    pub fn should_retry(&self, err: &MessageFinalityError) -> bool {
        (self.error_filter)(err)
    }

    /// Delay to sleep after a failed attempt.
    ///
    /// `NotYetFinalized` attempts have already slept for their computed wait.
    pub fn delay_after(&self, attempt: u32, err: &MessageFinalityError) -> Duration {
        match err {
            MessageFinalityError::NotYetFinalized { .. } => Duration::ZERO,
            _ => self.delay.delay(attempt),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: DelayStrategy::Exponential {
                base: Duration::from_millis(400),
                max: Duration::from_secs(30),
            },
            error_filter: MessageFinalityError::is_retryable,
        }
    }
}

/// What to do when the message sits in a later revision than the
/// finalized header.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RevisionMismatchPolicy {
    /// Keep polling with a flat wait of one average block time.
    #[default]
    FlatWait,
    /// Fail with `RevisionMismatch` after this many consecutive observations.
    FailAfter(u32),
}

/// Message finality configuration.
#[derive(Clone, Debug)]
pub struct FinalityConfig {
    /// Average block time, used to size waits.
    pub average_block_time: Duration,
    /// Retry policy for finality polling.
    pub retry: RetryPolicy,
    /// Revision boundary handling.
    pub revision_mismatch: RevisionMismatchPolicy,
}

impl Default for FinalityConfig {
    fn default() -> Self {
        Self {
            average_block_time: Duration::from_secs(6),
            retry: RetryPolicy::default(),
            revision_mismatch: RevisionMismatchPolicy::FlatWait,
        }
    }
}

impl FinalityConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `QC_AVERAGE_BLOCK_TIME_MS`: Average block time (default: 6000)
    /// - `QC_FINALITY_MAX_ATTEMPTS`: Attempt budget (default: 5)
    /// - `QC_FINALITY_RETRY_DELAY_MS`: Base retry delay (default: 400)
    /// - `QC_FINALITY_RETRY_MAX_DELAY_MS`: Retry delay cap (default: 30000)
    /// - `QC_REVISION_MISMATCH_LIMIT`: Fail after n cross-revision polls (default: unset)
    pub fn from_env() -> Self {
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup. Missing or unparseable values
    /// fall back to the defaults.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let parse_u64 = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());
        let defaults = Self::default();

        let average_block_time = parse_u64("QC_AVERAGE_BLOCK_TIME_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.average_block_time);

        let max_attempts = parse_u64("QC_FINALITY_MAX_ATTEMPTS")
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(defaults.retry.max_attempts);

        let (default_base, default_max) = match defaults.retry.delay {
            DelayStrategy::Exponential { base, max } => (base, max),
            _ => (Duration::from_millis(400), Duration::from_secs(30)),
        };
        let base = parse_u64("QC_FINALITY_RETRY_DELAY_MS")
            .map(Duration::from_millis)
            .unwrap_or(default_base);
        let max = parse_u64("QC_FINALITY_RETRY_MAX_DELAY_MS")
            .map(Duration::from_millis)
            .unwrap_or(default_max)
            .max(base);

        let revision_mismatch = parse_u64("QC_REVISION_MISMATCH_LIMIT")
            .and_then(|v| u32::try_from(v).ok())
            .filter(|n| *n > 0)
            .map(RevisionMismatchPolicy::FailAfter)
            .unwrap_or_default();

        Self {
            average_block_time,
            retry: RetryPolicy {
                max_attempts,
                delay: DelayStrategy::Exponential { base, max },
                error_filter: defaults.retry.error_filter,
            },
            revision_mismatch,
        }
    }
}
