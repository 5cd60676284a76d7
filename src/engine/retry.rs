use std::{fmt, future::Future, time::Duration};

use tokio_util::sync::CancellationToken;

use crate::logging::SharedLogger;

/// Delay unit for linear backoff: attempt `i` waits `i * RETRY_STEP`.
pub const RETRY_STEP: Duration = Duration::from_millis(400);

/// Failure of a retried operation.
#[derive(Debug)]
pub enum RetryError<E> {
    /// The cancellation signal fired before or between attempts.
    Cancelled,
    /// Every attempt failed; carries the last failure.
    Failed(E),
}

impl<E> RetryError<E> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RetryError::Cancelled)
    }

    pub fn into_inner(self) -> Option<E> {
        match self {
            RetryError::Cancelled => None,
            RetryError::Failed(e) => Some(e),
        }
    }
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryError::Cancelled => write!(f, "operation cancelled"),
            RetryError::Failed(e) => write!(f, "{}", e),
        }
    }
}

impl<E> std::error::Error for RetryError<E>
where
    E: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RetryError::Cancelled => None,
            RetryError::Failed(e) => Some(e),
        }
    }
}

/// Bounded, cancellable retry with linear backoff.
///
/// Attempts never overlap; cancellation is checked before every attempt
/// (including the first) and during every backoff wait.
#[derive(Clone)]
pub struct RetryPolicy {
    attempts: u32,
    step: Duration,
    logger: Option<SharedLogger>,
}

impl RetryPolicy {
    /// Creates a policy with the default 400 ms backoff unit and no logger.
    ///
    /// # Arguments
    ///
    /// * `attempts` - Total number of attempts, including the first. Values
    ///   below one are coerced to one.
    ///
    /// # Example
    ///
    /// ```
    /// use msrcli::engine::RetryPolicy;
    ///
    /// let policy = RetryPolicy::new(0);
    /// assert_eq!(policy.attempts(), 1);
    /// ```
    pub fn new(attempts: u32) -> Self {
        Self {
            attempts: attempts.max(1),
            step: RETRY_STEP,
            logger: None,
        }
    }

    /// Override the backoff unit.
    pub fn with_step(mut self, step: Duration) -> Self {
        self.step = step;
        self
    }

    /// Log a warning for every failed attempt that will be retried.
    pub fn with_logger(mut self, logger: SharedLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Total number of attempts `run` makes before giving up.
    ///
    /// # Returns
    ///
    /// The coerced attempt count, always at least one.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Wait before the attempt following attempt number `attempt` (1-based).
    ///
    /// # Example
    ///
    /// ```
    /// use msrcli::engine::RetryPolicy;
    /// use std::time::Duration;
    ///
    /// let policy = RetryPolicy::new(3);
    /// assert_eq!(policy.delay_after(2), Duration::from_millis(800));
    /// ```
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.step.saturating_mul(attempt)
    }

    /// Runs `op` until it succeeds, the attempts are exhausted, or `cancel` fires.
    ///
    /// # Arguments
    ///
    /// * `cancel` - Checked before every attempt and raced against every wait
    /// * `what` - Names the operation in retry warnings
    /// * `op` - Produces a fresh attempt each time it is called
    ///
    /// # Returns
    ///
    /// The first successful value.
    ///
    /// # Errors
    ///
    /// `RetryError::Cancelled` if the token fired before an attempt or during a
    /// wait, otherwise `RetryError::Failed` with the last attempt's error.
    pub async fn run<T, E, F, Fut>(
        &self,
        cancel: &CancellationToken,
        what: &str,
        mut op: F,
    ) -> Result<T, RetryError<E>>
    where
        E: fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 1;
        loop {
            if cancel.is_cancelled() {
                return Err(RetryError::Cancelled);
            }

            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if attempt >= self.attempts {
                return Err(RetryError::Failed(err));
            }

            let delay = self.delay_after(attempt);
            if let Some(logger) = &self.logger {
                logger.warn(&format!(
                    "{} failed (attempt {}/{}): {}; retrying in {}ms",
                    what,
                    attempt,
                    self.attempts,
                    err,
                    delay.as_millis()
                ));
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("attempts", &self.attempts)
            .field("step", &self.step)
            .finish()
    }
}
