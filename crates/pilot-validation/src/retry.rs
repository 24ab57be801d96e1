//! Bounded retry around "produce a candidate, then validate it"
//!
//! The executor knows nothing about oracles or JSON. It asks the producer for
//! a candidate, hands it to the validator and either returns the validated
//! value or tries again. When the budget runs out it returns the caller's
//! default; callers that need to tell the two apart wrap the value themselves
//! (e.g. `Option`).

use pilot_core::ValidationResult;
use std::convert::Infallible;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Delay inserted between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backoff {
    /// Retry immediately
    #[default]
    None,
    /// Wait `step * attempt` after each failed attempt
    Linear(Duration),
    /// Wait `base * 2^(attempt-1)`, capped at `max`
    Exponential { base: Duration, max: Duration },
}

impl Backoff {
    /// Delay after the given failed attempt (1-based)
    pub fn delay_after(&self, attempt: usize) -> Duration {
        let attempt = attempt.max(1) as u32;
        match *self {
            Backoff::None => Duration::ZERO,
            Backoff::Linear(step) => step.saturating_mul(attempt),
            Backoff::Exponential { base, max } => base
                .saturating_mul(2u32.saturating_pow(attempt - 1))
                .min(max),
        }
    }
}

/// Runs producer/validator pairs with a bounded attempt budget
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    backoff: Backoff,
    label: String,
}

impl RetryExecutor {
    pub fn new(backoff: Backoff) -> Self {
        Self {
            backoff,
            label: "retry".to_string(),
        }
    }

    /// Name used in log lines
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Produce and validate until a candidate is valid or the budget is spent
    ///
    /// `max_retries` is the total number of attempts (at least one is always
    /// made). The first valid value is returned immediately; after the last
    /// invalid candidate `default_value` is returned.
    pub async fn execute_with_retry<P, Fut, C, V, T>(
        &self,
        mut producer: P,
        validator: V,
        max_retries: usize,
        default_value: T,
    ) -> T
    where
        P: FnMut() -> Fut,
        Fut: Future<Output = C>,
        V: FnMut(C) -> ValidationResult<T>,
    {
        let result = self
            .try_execute_with_retry(
                || {
                    let candidate = producer();
                    async move { Ok::<C, Infallible>(candidate.await) }
                },
                validator,
                max_retries,
                default_value,
            )
            .await;

        match result {
            Ok(value) => value,
            Err(never) => match never {},
        }
    }

    /// Like [`execute_with_retry`](Self::execute_with_retry) for fallible producers
    ///
    /// A producer error is not a bad candidate; it stops the loop at once and
    /// is returned to the caller untouched.
    pub async fn try_execute_with_retry<P, Fut, C, E, V, T>(
        &self,
        mut producer: P,
        mut validator: V,
        max_retries: usize,
        default_value: T,
    ) -> Result<T, E>
    where
        P: FnMut() -> Fut,
        Fut: Future<Output = Result<C, E>>,
        V: FnMut(C) -> ValidationResult<T>,
    {
        let attempts = max_retries.max(1);

        for attempt in 1..=attempts {
            let candidate = producer().await?;
            match validator(candidate).into_result() {
                Ok(value) => {
                    debug!("{}: attempt {}/{} valid", self.label, attempt, attempts);
                    return Ok(value);
                }
                Err(reason) => warn!(
                    "{}: attempt {}/{} invalid: {}",
                    self.label, attempt, attempts, reason
                ),
            }

            if attempt < attempts {
                let delay = self.backoff.delay_after(attempt);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
        }

        warn!(
            "{}: no valid result after {} attempts, using fallback",
            self.label, attempts
        );
        Ok(default_value)
    }
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::new(Backoff::None)
    }
}
