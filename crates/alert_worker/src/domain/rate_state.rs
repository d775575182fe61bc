use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::time::Instant;

/// Throttling limits of the notification queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Sends allowed per sliding `window`
    pub max_sends: usize,
    pub window: Duration,
    /// Minimum spacing between two deliveries to the same recipient
    pub suppression: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_sends: 10,
            window: Duration::from_secs(60),
            suppression: Duration::from_secs(60),
        }
    }
}

/// Margin added to a rate-limit wait so the oldest send has left the window on wake-up
pub(crate) const RATE_LIMIT_EPSILON: Duration = Duration::from_millis(10);

/// Send history owned by the queue processor
#[derive(Debug)]
pub(crate) struct RateState {
    config: RateLimitConfig,
    send_timestamps: VecDeque<Instant>,
    last_sent: HashMap<String, Instant>,
}

impl RateState {
    pub(crate) fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            send_timestamps: VecDeque::new(),
            last_sent: HashMap::new(),
        }
    }

    fn prune(&mut self, now: Instant) {
        while let Some(oldest) = self.send_timestamps.front() {
            if now.duration_since(*oldest) >= self.config.window {
                self.send_timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    /// How long to wait before the next send is allowed, if at all
    pub(crate) fn wait_time(&mut self, now: Instant) -> Option<Duration> {
        self.prune(now);

        if self.send_timestamps.len() < self.config.max_sends {
            return None;
        }

        let oldest = self.send_timestamps.front()?;
        let elapsed = now.duration_since(*oldest);
        Some(self.config.window.saturating_sub(elapsed) + RATE_LIMIT_EPSILON)
    }

    pub(crate) fn is_suppressed(&self, recipient: &str, now: Instant) -> bool {
        self.last_sent
            .get(recipient)
            .is_some_and(|last| now.duration_since(*last) < self.config.suppression)
    }

    /// Record a successful send to `recipients`
    pub(crate) fn record(&mut self, recipients: &[String], now: Instant) {
        self.send_timestamps.push_back(now);

        let suppression = self.config.suppression;
        self.last_sent
            .retain(|_, last| now.duration_since(*last) < suppression);
        for recipient in recipients {
            self.last_sent.insert(recipient.clone(), now);
        }
    }

    pub(crate) fn sends_in_window(&self) -> usize {
        self.send_timestamps.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RateLimitConfig {
        RateLimitConfig {
            max_sends: 2,
            window: Duration::from_secs(60),
            suppression: Duration::from_secs(30),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_time_after_limit_reached() {
        let mut state = RateState::new(config());
        let start = Instant::now();

        state.record(&["a".to_string()], start);
        assert_eq!(state.wait_time(start), None);

        state.record(&["b".to_string()], start + Duration::from_secs(10));
        let wait = state.wait_time(start + Duration::from_secs(20));

        assert_eq!(wait, Some(Duration::from_secs(40) + RATE_LIMIT_EPSILON));
    }

    #[tokio::test(start_paused = true)]
    async fn test_old_sends_leave_the_window() {
        let mut state = RateState::new(config());
        let start = Instant::now();
        state.record(&["a".to_string()], start);
        state.record(&["b".to_string()], start);

        assert_eq!(state.wait_time(start + Duration::from_secs(60)), None);
        assert_eq!(state.sends_in_window(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recipient_suppression_expires() {
        let mut state = RateState::new(config());
        let start = Instant::now();
        state.record(&["ops@example.com".to_string()], start);

        assert!(state.is_suppressed("ops@example.com", start + Duration::from_secs(29)));
        assert!(!state.is_suppressed("ops@example.com", start + Duration::from_secs(30)));
        assert!(!state.is_suppressed("field@example.com", start));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_suppression_never_suppresses() {
        let mut state = RateState::new(RateLimitConfig {
            suppression: Duration::ZERO,
            ..config()
        });
        let start = Instant::now();
        state.record(&["ops@example.com".to_string()], start);

        assert!(!state.is_suppressed("ops@example.com", start));
    }
}
