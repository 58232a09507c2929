//! Retry/timeout envelope for one perception-or-action step.
//!
//! All cooperative-cancellation checks live here: no other component needs
//! to know about the token. Cancellation is observed only at the defined
//! checkpoints (before each attempt), never by interrupting in-flight work.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use crate::errors::AutomationError;

/// Shared abort flag, set by the user-facing cancel trigger and polled at
/// step checkpoints. Never used to interrupt a thread forcibly.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clear the flag at the start of a fresh procedure run.
    pub(crate) fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// One retryable unit of work.
#[derive(Debug, Clone)]
pub struct StepSpec {
    pub name: String,
    pub max_attempts: u32,
    pub attempt_interval: Duration,
}

impl StepSpec {
    pub fn new(name: impl Into<String>, max_attempts: u32, attempt_interval: Duration) -> Self {
        Self {
            name: name.into(),
            max_attempts: max_attempts.max(1),
            attempt_interval,
        }
    }
}

/// `Pending → Attempting → {Succeeded | Backoff → Attempting | Exhausted |
/// Cancelled}`. Kept explicit so the terminal causes stay distinguishable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepState {
    Attempting,
    Backoff,
}

/// Runs step attempts under a retry/backoff/timeout policy.
///
/// An attempt returns `Ok(Some(value))` on success, `Ok(None)` when the
/// success predicate did not hold (a transient failure that only
/// accumulates toward the timeout), or `Err` for real faults. Fatal faults
/// abort immediately; non-fatal ones are treated as transient.
///
/// A failing step's worst-case wall time is `max_attempts *
/// attempt_interval` plus the cost of the attempts themselves: the interval
/// is slept after every failed attempt, including the last.
#[derive(Clone)]
pub struct StepExecutor {
    token: CancellationToken,
}

impl StepExecutor {
    pub fn new(token: CancellationToken) -> Self {
        Self { token }
    }

    pub async fn run<T, F, Fut>(
        &self,
        spec: &StepSpec,
        mut attempt: F,
    ) -> Result<T, AutomationError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<Option<T>, AutomationError>>,
    {
        let started = Instant::now();
        let mut attempts = 0u32;
        let mut state = StepState::Attempting;

        loop {
            match state {
                StepState::Attempting => {
                    // Cancellation checkpoint: observed before the attempt
                    // is consumed.
                    if self.token.is_cancelled() {
                        debug!(step = %spec.name, attempts, "cancelled at checkpoint");
                        return Err(AutomationError::Interrupted);
                    }
                    attempts += 1;
                    match attempt(attempts).await {
                        Ok(Some(value)) => {
                            debug!(step = %spec.name, attempts, "step succeeded");
                            return Ok(value);
                        }
                        Ok(None) => {
                            debug!(step = %spec.name, attempts, "predicate not satisfied");
                        }
                        Err(e) if matches!(e, AutomationError::Interrupted) || e.is_fatal() => {
                            return Err(e);
                        }
                        Err(e) => {
                            warn!(step = %spec.name, attempts, "attempt failed: {e}");
                        }
                    }
                    state = StepState::Backoff;
                }
                StepState::Backoff => {
                    sleep(spec.attempt_interval).await;
                    if attempts >= spec.max_attempts {
                        let elapsed = started.elapsed();
                        warn!(step = %spec.name, attempts, ?elapsed, "attempt budget exhausted");
                        return Err(AutomationError::StepTimeout {
                            step: spec.name.clone(),
                            attempts,
                            elapsed,
                        });
                    }
                    state = StepState::Attempting;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn spec(max_attempts: u32, interval_ms: u64) -> StepSpec {
        StepSpec::new("test-step", max_attempts, Duration::from_millis(interval_ms))
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_takes_exactly_attempts_times_interval() {
        let executor = StepExecutor::new(CancellationToken::new());
        let started = Instant::now();
        let err = executor
            .run::<(), _, _>(&spec(3, 200), |_| async { Ok(None) })
            .await
            .unwrap_err();

        let wall = started.elapsed();
        assert!(wall >= Duration::from_millis(600), "wall = {wall:?}");
        assert!(wall < Duration::from_millis(650), "wall = {wall:?}");
        match err {
            AutomationError::StepTimeout {
                step,
                attempts,
                elapsed,
            } => {
                assert_eq!(step, "test-step");
                assert_eq!(attempts, 3);
                assert!(elapsed >= Duration::from_millis(600));
            }
            other => panic!("expected StepTimeout, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn success_returns_immediately_without_extra_delay() {
        let executor = StepExecutor::new(CancellationToken::new());
        let started = Instant::now();
        let value = executor
            .run(&spec(5, 200), |attempt| async move {
                Ok((attempt == 2).then_some("found"))
            })
            .await
            .unwrap();
        assert_eq!(value, "found");
        // One backoff between attempts 1 and 2, nothing after success.
        assert_eq!(started.elapsed(), Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_before_first_attempt_starts_nothing() {
        let token = CancellationToken::new();
        token.cancel();
        let executor = StepExecutor::new(token);
        let ran = Arc::new(AtomicU32::new(0));
        let ran2 = ran.clone();
        let err = executor
            .run::<(), _, _>(&spec(3, 100), move |_| {
                let ran = ran2.clone();
                async move {
                    ran.fetch_add(1, Ordering::SeqCst);
                    Ok(None)
                }
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AutomationError::Interrupted));
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_during_backoff_prevents_the_next_attempt() {
        let token = CancellationToken::new();
        let executor = StepExecutor::new(token.clone());
        let ran = Arc::new(AtomicU32::new(0));
        let ran2 = ran.clone();
        let err = executor
            .run::<(), _, _>(&spec(10, 100), move |attempt| {
                let token = token.clone();
                let ran = ran2.clone();
                async move {
                    ran.fetch_add(1, Ordering::SeqCst);
                    if attempt == 2 {
                        token.cancel();
                    }
                    Ok(None)
                }
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AutomationError::Interrupted));
        assert_eq!(ran.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_errors_bypass_the_retry_envelope() {
        let executor = StepExecutor::new(CancellationToken::new());
        let started = Instant::now();
        let err = executor
            .run::<(), _, _>(&spec(5, 200), |_| async {
                Err(AutomationError::CaptureFailed("no display".to_string()))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AutomationError::CaptureFailed(_)));
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn momentary_window_loss_recovers_within_the_envelope() {
        let executor = StepExecutor::new(CancellationToken::new());
        let value = executor
            .run(&spec(5, 100), |attempt| async move {
                // The tracked window drops out of the enumeration for two
                // attempts, then comes back.
                if attempt < 3 {
                    return Err(AutomationError::WindowNotFound("app.exe".to_string()));
                }
                Ok(Some("recovered"))
            })
            .await
            .unwrap();
        assert_eq!(value, "recovered");
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_accumulate_toward_timeout() {
        let executor = StepExecutor::new(CancellationToken::new());
        let err = executor
            .run::<(), _, _>(&spec(2, 50), |_| async {
                Err(AutomationError::WindowNotFound("app.exe".to_string()))
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AutomationError::StepTimeout { attempts: 2, .. }
        ));
    }
}
