//! Bounded retry around a fallible async action
//!
//! Every failure is retried until the attempt budget runs out. Cancellation is
//! never retried.

use std::{fmt, future::Future, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Position of one attempt within the budget, 1-based
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attempt {
    pub number: u32,
    pub max_attempts: u32,
}

impl Attempt {
    pub fn is_last(&self) -> bool {
        self.number >= self.max_attempts
    }
}

impl fmt::Display for Attempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "attempt {} of {}", self.number, self.max_attempts)
    }
}

/// What a single successful call of the action produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempted<T> {
    Done(T),
    /// The action observed cancellation and stopped
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome<T, E> {
    Done(T),
    Cancelled,
    /// Every attempt failed; holds the last error
    Fatal(E),
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS)
    }
}

impl RetryPolicy {
    /// A budget of zero is treated as a single attempt.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay: Duration::ZERO,
        }
    }

    /// Pause between attempts. Cancellation cuts the pause short.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Run `action` until it succeeds, is cancelled or exhausts the budget.
    ///
    /// `on_each_failure` runs after every failed attempt. `on_fatal` runs once,
    /// after the last failed attempt, and never on cancellation.
    pub async fn execute<T, E, A, Fut, F, G>(
        &self,
        cancel: &CancellationToken,
        mut action: A,
        mut on_each_failure: F,
        on_fatal: G,
    ) -> RetryOutcome<T, E>
    where
        A: FnMut(Attempt) -> Fut,
        Fut: Future<Output = Result<Attempted<T>, E>>,
        F: FnMut(Attempt, &E),
        G: FnOnce(Attempt, &E),
        E: fmt::Display,
    {
        let mut number = 1;

        loop {
            if cancel.is_cancelled() {
                return RetryOutcome::Cancelled;
            }

            let attempt = Attempt {
                number,
                max_attempts: self.max_attempts,
            };
            if number > 1 {
                info!(%attempt, "Retrying");
            }

            let error = match action(attempt).await {
                Ok(Attempted::Done(value)) => return RetryOutcome::Done(value),
                Ok(Attempted::Cancelled) => return RetryOutcome::Cancelled,
                // a failure caused by teardown is not worth retrying
                Err(_) if cancel.is_cancelled() => return RetryOutcome::Cancelled,
                Err(e) => e,
            };

            on_each_failure(attempt, &error);

            if attempt.is_last() {
                error!(error = %error, attempts = number, "Giving up after final attempt");
                on_fatal(attempt, &error);
                return RetryOutcome::Fatal(error);
            }

            warn!(error = %error, %attempt, "Attempt failed, will retry");

            if !self.delay.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => return RetryOutcome::Cancelled,
                    _ = tokio::time::sleep(self.delay) => {}
                }
            }

            number += 1;
        }
    }
}
