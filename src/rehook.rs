//! Periodic re-hook schedule.
//!
//! Windows calls low-level hooks most-recently-installed first, so any
//! program that hooks the keyboard after us sees keystrokes before we can
//! swallow them. Reinstalling on a fixed cadence puts our hook back at the
//! head of the chain.
//!
//! The schedule is a pure function of `Instant`s; the daemon loop feeds it
//! the current time and performs the actual re-hook on its own thread, never
//! from inside the hook callback.

use std::time::{Duration, Instant};

use crate::config::RehookConfig;

#[derive(Debug, Clone)]
pub struct RehookSchedule {
    enabled: bool,
    interval: Duration,
    startup_delay: Duration,
    started: Instant,
    last: Option<Instant>,
}

impl RehookSchedule {
    pub fn new(config: &RehookConfig, now: Instant) -> Self {
        Self {
            enabled: config.enabled,
            interval: config.interval(),
            startup_delay: config.startup_delay(),
            started: now,
            last: None,
        }
    }

    /// True until the start-up delay has elapsed.
    pub fn in_grace_period(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.started) < self.startup_delay
    }

    fn next_due(&self) -> Instant {
        match self.last {
            Some(t) => t + self.interval,
            // First re-hook one interval after the grace period ends.
            None => self.started + self.startup_delay + self.interval,
        }
    }

    /// Returns true, and records the re-hook, when one should run now.
    ///
    /// Nothing is due while disabled, during the grace period, or while
    /// protection is off.
    pub fn due(&mut self, now: Instant, protection_enabled: bool) -> bool {
        if !self.enabled || !protection_enabled || self.in_grace_period(now) {
            return false;
        }
        if now < self.next_due() {
            return false;
        }
        self.last = Some(now);
        true
    }

    /// How long the caller may sleep before `due` could next return true.
    pub fn until_due(&self, now: Instant) -> Duration {
        if !self.enabled {
            return self.interval;
        }
        self.next_due()
            .saturating_duration_since(now)
            .min(self.interval)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn config(interval_ms: u64, startup_delay_ms: u64) -> RehookConfig {
        RehookConfig {
            enabled: true,
            interval_ms,
            startup_delay_ms,
        }
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn nothing_due_during_grace_period() {
        let t0 = Instant::now();
        let mut s = RehookSchedule::new(&config(1000, 4000), t0);
        assert!(s.in_grace_period(t0 + ms(3999)));
        assert!(!s.due(t0 + ms(3999), true));
        assert!(!s.in_grace_period(t0 + ms(4000)));
    }

    #[test]
    fn first_rehook_one_interval_after_grace() {
        let t0 = Instant::now();
        let mut s = RehookSchedule::new(&config(1000, 4000), t0);
        assert!(!s.due(t0 + ms(4500), true));
        assert!(s.due(t0 + ms(5000), true));
    }

    #[test]
    fn rehooks_repeat_every_interval() {
        let t0 = Instant::now();
        let mut s = RehookSchedule::new(&config(1000, 0), t0);
        assert!(s.due(t0 + ms(1000), true));
        assert!(!s.due(t0 + ms(1500), true));
        assert!(s.due(t0 + ms(2000), true));
        // A late wake-up re-anchors the cadence.
        assert!(s.due(t0 + ms(3700), true));
        assert!(!s.due(t0 + ms(4000), true));
        assert!(s.due(t0 + ms(4700), true));
    }

    #[test]
    fn protection_off_suppresses_rehook() {
        let t0 = Instant::now();
        let mut s = RehookSchedule::new(&config(1000, 0), t0);
        assert!(!s.due(t0 + ms(5000), false));
        assert!(s.due(t0 + ms(5000), true));
    }

    #[test]
    fn disabled_schedule_never_fires() {
        let t0 = Instant::now();
        let mut cfg = config(1000, 0);
        cfg.enabled = false;
        let mut s = RehookSchedule::new(&cfg, t0);
        assert!(!s.due(t0 + ms(60_000), true));
        assert_eq!(s.until_due(t0), ms(1000));
    }

    #[test]
    fn until_due_counts_down_and_is_capped() {
        let t0 = Instant::now();
        let mut s = RehookSchedule::new(&config(1000, 4000), t0);
        // Capped at one interval so the loop stays responsive during grace.
        assert_eq!(s.until_due(t0), ms(1000));
        assert_eq!(s.until_due(t0 + ms(4600)), ms(400));
        assert!(s.due(t0 + ms(5000), true));
        assert_eq!(s.until_due(t0 + ms(5250)), ms(750));
        assert_eq!(s.until_due(t0 + ms(9000)), Duration::ZERO);
    }
}
