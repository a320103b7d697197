//! Shared rate-limit pause for every worker of one run.
//!
//! When any request is answered with 429 the executor sets a pause deadline
//! here. Every worker consults the coordinator before each attempt and blocks
//! until the deadline has passed, so one rate-limit response backs off the
//! whole run rather than a single worker.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::TranslateError;
use crate::retry::MAX_RETRY_HINT;

/// Pause state shared by reference across the workers of one run.
///
/// The `paused` flag is read lock-free; the deadline and every transition of
/// the flag go through the mutex.
#[derive(Debug, Default)]
pub struct RateLimitCoordinator {
    paused: AtomicBool,
    pause_until: Mutex<Option<Instant>>,
}

impl RateLimitCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether workers must currently hold off.
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// Current pause deadline, if paused.
    pub fn pause_deadline(&self) -> Option<Instant> {
        *self.deadline()
    }

    /// Pause every worker for `delay` from now.
    ///
    /// A later deadline set by another worker is never shortened. Returns the
    /// effective deadline.
    pub fn pause_for(&self, delay: Duration) -> Instant {
        let now = Instant::now();
        let requested = now
            .checked_add(delay)
            .unwrap_or_else(|| now + MAX_RETRY_HINT);
        let mut deadline = self.deadline();
        let effective = match *deadline {
            Some(existing) if self.is_paused() && existing > requested => existing,
            _ => requested,
        };
        *deadline = Some(effective);
        self.paused.store(true, Ordering::Release);
        info!(
            "Rate limited: pausing all workers for {:?}",
            effective.saturating_duration_since(Instant::now())
        );
        effective
    }

    /// Clear the pause if its deadline has passed.
    ///
    /// Returns `true` only for the single caller that performed the clear.
    pub fn try_resume(&self) -> bool {
        let mut deadline = self.deadline();
        if !self.is_paused() {
            return false;
        }
        match *deadline {
            Some(until) if Instant::now() < until => false,
            _ => {
                *deadline = None;
                self.paused.store(false, Ordering::Release);
                debug!("Rate-limit pause elapsed, resuming");
                true
            }
        }
    }

    /// Block while paused, polling every `poll` so cancellation is seen promptly.
    pub async fn wait_until_resumed(
        &self,
        poll: Duration,
        cancel: &CancellationToken,
    ) -> Result<(), TranslateError> {
        while self.is_paused() {
            if cancel.is_cancelled() {
                return Err(TranslateError::Cancelled);
            }
            if self.try_resume() {
                break;
            }
            let remaining = self
                .pause_deadline()
                .map(|until| until.saturating_duration_since(Instant::now()))
                .unwrap_or_default();
            let step = remaining.min(poll).max(Duration::from_millis(1));
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(TranslateError::Cancelled),
                _ = sleep(step) => {}
            }
        }
        Ok(())
    }

    fn deadline(&self) -> MutexGuard<'_, Option<Instant>> {
        self.pause_until
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
