//! Bounded exponential backoff around transient failures.

use crate::config::RetryConfig;
use crate::error::{SyncError, SyncResult};
use std::future::Future;
use std::time::Duration;

/// Blocking pause used by the blocking loop for idle waits and backoff.
pub trait Sleeper: Send + Sync {
    /// Blocks the calling thread for `duration`.
    fn sleep(&self, duration: Duration);
}

/// Sleeps with [`std::thread::sleep`].
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Attempt bookkeeping shared by the blocking and async retry loops.
pub(crate) struct Backoff<'a> {
    config: &'a RetryConfig,
    max_attempts: u32,
    attempt: u32,
}

impl<'a> Backoff<'a> {
    pub(crate) fn new(config: &'a RetryConfig) -> Self {
        Self {
            config,
            max_attempts: config.max_attempts.max(1),
            attempt: 0,
        }
    }

    /// Delay to wait before the next attempt; `None` before the first.
    pub(crate) fn pause(&self) -> Option<Duration> {
        (self.attempt > 0).then(|| self.config.delay_for_attempt(self.attempt))
    }

    /// Records a failed attempt. `Ok` means try again.
    pub(crate) fn failed(&mut self, error: SyncError) -> SyncResult<()> {
        if !error.is_transient() {
            return Err(error);
        }

        self.attempt += 1;
        if self.attempt >= self.max_attempts {
            tracing::error!(attempts = self.attempt, error = %error, "giving up after repeated transient errors");
            return Err(SyncError::RetriesExhausted {
                attempts: self.attempt,
                last: Box::new(error),
            });
        }

        tracing::warn!(
            attempt = self.attempt,
            max_attempts = self.max_attempts,
            error = %error,
            "transient error, backing off"
        );
        Ok(())
    }
}

/// Runs `op`, retrying transient errors with exponential delay.
///
/// At most `config.max_attempts` attempts are made. Non-transient errors are
/// returned at once; running out of attempts returns
/// [`SyncError::RetriesExhausted`].
///
/// # Errors
///
/// See above.
pub fn retry_blocking<T>(
    config: &RetryConfig,
    sleeper: &dyn Sleeper,
    mut op: impl FnMut() -> SyncResult<T>,
) -> SyncResult<T> {
    let mut backoff = Backoff::new(config);
    loop {
        if let Some(delay) = backoff.pause() {
            sleeper.sleep(delay);
        }
        match op() {
            Ok(value) => return Ok(value),
            Err(e) => backoff.failed(e)?,
        }
    }
}

/// Async counterpart of [`retry_blocking`]; delays suspend on the tokio
/// timer instead of blocking.
///
/// # Errors
///
/// See [`retry_blocking`].
pub async fn retry_async<T, F, Fut>(config: &RetryConfig, mut op: F) -> SyncResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = SyncResult<T>>,
{
    let mut backoff = Backoff::new(config);
    loop {
        if let Some(delay) = backoff.pause() {
            tokio::time::sleep(delay).await;
        }
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => backoff.failed(e)?,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingSleeper {
        sleeps: Mutex<Vec<Duration>>,
    }

    impl Sleeper for RecordingSleeper {
        fn sleep(&self, duration: Duration) {
            self.sleeps.lock().push(duration);
        }
    }

    fn config() -> RetryConfig {
        RetryConfig::new(8)
            .with_initial_delay(Duration::from_millis(10))
            .with_jitter(false)
    }

    #[test]
    fn first_success_does_not_sleep() {
        let sleeper = RecordingSleeper::default();
        let result = retry_blocking(&config(), &sleeper, || Ok(5));

        assert_eq!(result.unwrap(), 5);
        assert!(sleeper.sleeps.lock().is_empty());
    }

    #[test]
    fn recovers_after_transient_errors() {
        let sleeper = RecordingSleeper::default();
        let mut calls = 0;
        let result = retry_blocking(&config(), &sleeper, || {
            calls += 1;
            if calls < 3 {
                Err(SyncError::source_retryable("busy"))
            } else {
                Ok(calls)
            }
        });

        assert_eq!(result.unwrap(), 3);
        assert_eq!(
            *sleeper.sleeps.lock(),
            vec![Duration::from_millis(10), Duration::from_millis(20)]
        );
    }

    #[test]
    fn gives_up_after_max_attempts_with_growing_delays() {
        let sleeper = RecordingSleeper::default();
        let mut calls = 0u32;
        let err = retry_blocking(&config(), &sleeper, || -> SyncResult<()> {
            calls += 1;
            Err(SyncError::source_retryable("locked"))
        })
        .unwrap_err();

        assert_eq!(calls, 8);
        assert!(matches!(err, SyncError::RetriesExhausted { attempts: 8, .. }));

        let sleeps = sleeper.sleeps.lock();
        assert_eq!(sleeps.len(), 7);
        assert!(sleeps.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn fatal_errors_are_not_retried() {
        let sleeper = RecordingSleeper::default();
        let mut calls = 0;
        let err = retry_blocking(&config(), &sleeper, || -> SyncResult<()> {
            calls += 1;
            Err(SyncError::Config("bad".into()))
        })
        .unwrap_err();

        assert_eq!(calls, 1);
        assert!(matches!(err, SyncError::Config(_)));
        assert!(sleeper.sleeps.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn async_retry_waits_on_timer() {
        let started = tokio::time::Instant::now();
        let mut calls = 0;
        let result = retry_async(&config(), || {
            calls += 1;
            let outcome = if calls < 3 {
                Err(SyncError::source_retryable("busy"))
            } else {
                Ok(calls)
            };
            async move { outcome }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(started.elapsed(), Duration::from_millis(30));
    }

    #[tokio::test(start_paused = true)]
    async fn async_retry_is_bounded() {
        let mut calls = 0u32;
        let err = retry_async(&RetryConfig::new(3).with_jitter(false), || {
            calls += 1;
            async { Err::<(), _>(SyncError::source_retryable("busy")) }
        })
        .await
        .unwrap_err();

        assert_eq!(calls, 3);
        assert!(matches!(err, SyncError::RetriesExhausted { attempts: 3, .. }));
    }
}
