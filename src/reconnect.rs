//! Polling reconnection supervisor.

use std::time::Duration;

use crate::state::ConnectionState;
use crate::timer::IntervalTimer;

/// Whether and how often to poll for reconnection.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub enabled: bool,
    pub poll_interval: Duration,
}

impl ReconnectPolicy {
    #[must_use]
    pub const fn new(enabled: bool, poll_interval: Duration) -> Self {
        Self {
            enabled,
            poll_interval,
        }
    }

    #[must_use]
    pub const fn disabled() -> Self {
        Self::new(false, crate::config::DEFAULT_RECONNECT_CHECK_INTERVAL)
    }

    /// Whether a poll tick observing `state` should start a connect attempt.
    ///
    /// A tick during an in-flight attempt is a no-op, so ticks never race an
    /// attempt that is already running.
    #[must_use]
    pub const fn should_attempt(&self, state: ConnectionState, connect_available: bool) -> bool {
        self.enabled && !state.is_connecting && connect_available
    }
}

/// Starts polling when the connection closes and stops it when it opens.
#[derive(Debug)]
pub struct Supervisor {
    policy: ReconnectPolicy,
    timer: IntervalTimer,
}

impl Supervisor {
    /// `tick` runs on every poll; it is expected to consult
    /// [`ReconnectPolicy::should_attempt`] before connecting.
    pub fn new<F>(policy: ReconnectPolicy, tick: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            policy,
            timer: IntervalTimer::new(policy.poll_interval, tick),
        }
    }

    #[must_use]
    pub fn policy(&self) -> ReconnectPolicy {
        self.policy
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.timer.is_started()
    }

    /// Start polling if enabled and not already polling.
    pub fn on_close(&self) {
        if !self.policy.enabled || self.timer.is_started() {
            return;
        }

        if self.timer.start() {
            #[cfg(feature = "tracing")]
            tracing::debug!(
                interval = ?self.policy.poll_interval,
                "connection closed, polling for reconnection"
            );
        }
    }

    /// Stop polling if running.
    pub fn on_open(&self) {
        if self.timer.is_started() {
            self.timer.finish();

            #[cfg(feature = "tracing")]
            tracing::debug!("connection open, reconnection polling stopped");
        }
    }

    pub fn stop(&self) {
        self.timer.finish();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::state::Action;

    fn supervisor(enabled: bool) -> (Supervisor, Arc<AtomicUsize>) {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);
        let supervisor = Supervisor::new(
            ReconnectPolicy::new(enabled, Duration::from_millis(100)),
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
            },
        );
        (supervisor, ticks)
    }

    #[test]
    fn should_attempt_requires_enabled_idle_and_available() {
        let policy = ReconnectPolicy::new(true, Duration::from_secs(5));
        let idle = ConnectionState::INITIAL;
        let connecting = idle.apply(Action::SetConnecting(true));

        assert!(policy.should_attempt(idle, true));
        assert!(!policy.should_attempt(connecting, true));
        assert!(!policy.should_attempt(idle, false));
        assert!(!ReconnectPolicy::disabled().should_attempt(idle, true));
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_policy_never_starts() {
        let (supervisor, ticks) = supervisor(false);

        for _ in 0..10 {
            supervisor.on_close();
            assert!(!supervisor.is_running());
        }
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(ticks.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_closes_keep_one_poller() {
        let (supervisor, ticks) = supervisor(true);

        supervisor.on_close();
        supervisor.on_close();
        supervisor.on_close();
        tokio::time::sleep(Duration::from_millis(250)).await;

        assert!(supervisor.is_running());
        assert_eq!(ticks.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn open_cancels_polling() {
        let (supervisor, ticks) = supervisor(true);

        supervisor.on_close();
        tokio::time::sleep(Duration::from_millis(150)).await;
        supervisor.on_open();
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert!(!supervisor.is_running());
        assert_eq!(ticks.load(Ordering::SeqCst), 1);
    }
}
