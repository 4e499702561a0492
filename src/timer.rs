//! Periodic callback scheduler.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

const MIN_PERIOD: Duration = Duration::from_millis(1);

type Callback = Arc<dyn Fn() + Send + Sync>;

/// Invokes a callback every `period` while started.
///
/// The first tick fires one full period after [`IntervalTimer::start`]. The
/// background task is cancelled by [`IntervalTimer::finish`] and when the
/// timer is dropped.
pub struct IntervalTimer {
    period: Duration,
    callback: Callback,
    token: Mutex<Option<CancellationToken>>,
}

impl fmt::Debug for IntervalTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntervalTimer")
            .field("period", &self.period)
            .field("started", &self.is_started())
            .finish_non_exhaustive()
    }
}

impl IntervalTimer {
    pub fn new<F>(period: Duration, callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            period: period.max(MIN_PERIOD),
            callback: Arc::new(callback),
            token: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Start ticking. Returns `false` if already started or if there is no
    /// tokio runtime to run on.
    pub fn start(&self) -> bool {
        let mut guard = self.token.lock().unwrap_or_else(PoisonError::into_inner);
        if guard.as_ref().is_some_and(|token| !token.is_cancelled()) {
            return false;
        }

        let Ok(runtime) = Handle::try_current() else {
            #[cfg(feature = "tracing")]
            tracing::warn!("no tokio runtime available, interval timer not started");
            return false;
        };

        let token = CancellationToken::new();
        let token_clone = token.clone();
        let callback = Arc::clone(&self.callback);
        let period = self.period;

        runtime.spawn(async move {
            let mut ticker = time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                tokio::select! {
                    () = token_clone.cancelled() => break,
                    _ = ticker.tick() => callback(),
                }
            }
        });

        *guard = Some(token);
        true
    }

    /// Stop ticking. No-op when not started.
    pub fn finish(&self) {
        if let Some(token) = self
            .token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            token.cancel();
        }
    }

    #[must_use]
    pub fn is_started(&self) -> bool {
        self.token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|token| !token.is_cancelled())
    }
}

impl Drop for IntervalTimer {
    fn drop(&mut self) {
        self.finish();
    }
}
