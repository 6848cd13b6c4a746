use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Healthy,
    /// Sends are suppressed until a probe succeeds.
    Degraded,
}

/// Consecutive-failure tracking for the actuator link.
#[derive(Debug)]
pub struct ChannelHealth {
    threshold: u32,
    probe_interval: Duration,
    consecutive_failures: u32,
    state: LinkState,
    last_probe: Option<Instant>,
}

impl ChannelHealth {
    pub fn new(threshold: u32, probe_interval: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            probe_interval,
            consecutive_failures: 0,
            state: LinkState::Healthy,
            last_probe: None,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn is_degraded(&self) -> bool {
        self.state == LinkState::Degraded
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
    }

    /// Returns `true` when this failure tips the link into `Degraded`.
    pub fn record_failure(&mut self, now: Instant) -> bool {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);

        if self.state == LinkState::Healthy && self.consecutive_failures >= self.threshold {
            self.state = LinkState::Degraded;
            self.last_probe = Some(now);
            return true;
        }
        false
    }

    pub fn probe_due(&self, now: Instant) -> bool {
        self.is_degraded()
            && self
                .last_probe
                .map_or(true, |at| now.saturating_duration_since(at) >= self.probe_interval)
    }

    /// Returns `true` when a successful probe restores the link.
    pub fn record_probe(&mut self, now: Instant, succeeded: bool) -> bool {
        self.last_probe = Some(now);
        if succeeded && self.is_degraded() {
            self.state = LinkState::Healthy;
            self.consecutive_failures = 0;
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degrades_at_threshold_only_once() {
        let now = Instant::now();
        let mut health = ChannelHealth::new(3, Duration::from_secs(5));

        assert!(!health.record_failure(now));
        assert!(!health.record_failure(now));
        assert!(health.record_failure(now));
        assert!(health.is_degraded());
        assert!(!health.record_failure(now));
    }

    #[test]
    fn success_resets_the_streak() {
        let now = Instant::now();
        let mut health = ChannelHealth::new(2, Duration::ZERO);

        health.record_failure(now);
        health.record_success();
        assert!(!health.record_failure(now));
        assert_eq!(health.state(), LinkState::Healthy);
    }

    #[test]
    fn probes_wait_for_the_interval() {
        let start = Instant::now();
        let mut health = ChannelHealth::new(1, Duration::from_secs(5));
        assert!(!health.probe_due(start));

        health.record_failure(start);
        assert!(!health.probe_due(start + Duration::from_secs(1)));
        assert!(health.probe_due(start + Duration::from_secs(5)));

        assert!(!health.record_probe(start + Duration::from_secs(5), false));
        assert!(!health.probe_due(start + Duration::from_secs(6)));
        assert!(health.record_probe(start + Duration::from_secs(10), true));
        assert_eq!(health.state(), LinkState::Healthy);
        assert_eq!(health.consecutive_failures(), 0);
    }
}
