//! Restartable wall-clock countdown.
//!
//! Remaining time is always recomputed from `now − started_at`, never
//! from a decrementing counter, so a burst of delayed ticks (tab
//! throttling, a stalled event loop) cannot make the countdown drift.
//! Every method takes an explicit [`Instant`] so tests inject time.

use std::time::{Duration, Instant};

/// A one-shot countdown used for both the pre-game countdown and
/// per-question time limits. The two uses never overlap: phase
/// transitions stop and re-arm the same instance.
#[derive(Debug, Clone, Default)]
pub struct Countdown {
    duration: Duration,
    started_at: Option<Instant>,
    /// Remaining time frozen by `pause`; `None` while running or idle.
    paused_remaining: Option<Duration>,
}

impl Countdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm (or re-arm) the countdown for `duration` starting at `now`.
    pub fn start(&mut self, duration: Duration, now: Instant) {
        self.duration = duration;
        self.started_at = Some(now);
        self.paused_remaining = None;
    }

    /// Disarm without firing.
    pub fn stop(&mut self) {
        self.started_at = None;
        self.paused_remaining = None;
    }

    /// Whether the countdown is armed (running or paused).
    pub fn is_armed(&self) -> bool {
        self.started_at.is_some() || self.paused_remaining.is_some()
    }

    /// Freeze the remaining time. No-op unless running.
    pub fn pause(&mut self, now: Instant) {
        if self.started_at.is_some() && self.paused_remaining.is_none() {
            self.paused_remaining = Some(self.remaining(now));
            self.started_at = None;
        }
    }

    /// Resume from a pause; the remaining time is unaffected by how long
    /// the pause lasted. No-op unless paused.
    pub fn resume(&mut self, now: Instant) {
        if let Some(remaining) = self.paused_remaining.take() {
            self.duration = remaining;
            self.started_at = Some(now);
        }
    }

    /// Time left, saturating at zero.
    pub fn remaining(&self, now: Instant) -> Duration {
        if let Some(frozen) = self.paused_remaining {
            return frozen;
        }
        match self.started_at {
            Some(start) => self.duration.saturating_sub(now.saturating_duration_since(start)),
            None => Duration::ZERO,
        }
    }

    /// Whole seconds left, rounded up for display (a countdown showing
    /// "1" for the whole final second, "0" only at expiry).
    pub fn remaining_secs(&self, now: Instant) -> u64 {
        let remaining = self.remaining(now);
        remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0)
    }

    /// Advance the countdown. Returns `true` exactly once, when a
    /// running countdown's remaining time reaches zero; the countdown
    /// then disarms itself.
    pub fn tick(&mut self, now: Instant) -> bool {
        if self.started_at.is_none() || self.paused_remaining.is_some() {
            return false;
        }
        if self.remaining(now).is_zero() {
            self.started_at = None;
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn remaining_is_derived_from_wall_clock() {
        let t0 = Instant::now();
        let mut timer = Countdown::new();
        timer.start(secs(5), t0);

        assert_eq!(timer.remaining(t0), secs(5));
        assert_eq!(timer.remaining(t0 + secs(1)), secs(4));
        // A delayed observation sees the true remaining time, not one
        // tick's worth of decrement.
        assert_eq!(timer.remaining(t0 + secs(4)), secs(1));
        assert_eq!(timer.remaining(t0 + secs(9)), Duration::ZERO);
    }

    #[test]
    fn remaining_never_increases() {
        let t0 = Instant::now();
        let mut timer = Countdown::new();
        timer.start(secs(10), t0);

        let mut last = timer.remaining(t0);
        for ms in (0..12_000).step_by(333) {
            let now = t0 + Duration::from_millis(ms);
            let remaining = timer.remaining(now);
            assert!(remaining <= last);
            last = remaining;
        }
    }

    #[test]
    fn display_seconds_round_up() {
        let t0 = Instant::now();
        let mut timer = Countdown::new();
        timer.start(secs(5), t0);

        assert_eq!(timer.remaining_secs(t0), 5);
        assert_eq!(timer.remaining_secs(t0 + Duration::from_millis(2_500)), 3);
        assert_eq!(timer.remaining_secs(t0 + Duration::from_millis(4_001)), 1);
        assert_eq!(timer.remaining_secs(t0 + secs(5)), 0);
    }

    #[test]
    fn fires_exactly_once_at_zero() {
        let t0 = Instant::now();
        let mut timer = Countdown::new();
        timer.start(secs(5), t0);

        assert!(!timer.tick(t0 + Duration::from_millis(4_999)));
        assert_eq!(timer.remaining(t0 + secs(5)), Duration::ZERO);
        assert!(timer.tick(t0 + secs(5)));
        assert!(!timer.tick(t0 + secs(6)));
        assert!(!timer.is_armed());
    }

    #[test]
    fn restart_rearms_at_full_duration() {
        let t0 = Instant::now();
        let mut timer = Countdown::new();
        timer.start(secs(15), t0);

        // Re-armed mid-flight: the new deadline replaces the old one.
        timer.start(secs(15), t0 + secs(5));
        assert!(!timer.tick(t0 + secs(15)));
        assert_eq!(timer.remaining(t0 + secs(15)), secs(5));
        assert!(timer.tick(t0 + secs(20)));
    }

    #[test]
    fn stop_prevents_firing() {
        let t0 = Instant::now();
        let mut timer = Countdown::new();
        timer.start(secs(5), t0);
        timer.stop();
        assert!(!timer.tick(t0 + secs(10)));
        assert_eq!(timer.remaining(t0 + secs(10)), Duration::ZERO);
    }

    #[test]
    fn pause_freezes_and_resume_restores_remaining() {
        let t0 = Instant::now();
        let mut timer = Countdown::new();
        timer.start(secs(10), t0);

        timer.pause(t0 + secs(3));
        // Remaining is unaffected by how long the pause lasts.
        assert_eq!(timer.remaining(t0 + secs(60)), secs(7));
        assert!(!timer.tick(t0 + secs(60)));

        timer.resume(t0 + secs(60));
        assert_eq!(timer.remaining(t0 + secs(63)), secs(4));
        assert!(!timer.tick(t0 + secs(66)));
        assert!(timer.tick(t0 + secs(67)));
    }

    #[test]
    fn pause_and_resume_out_of_order_are_noops() {
        let t0 = Instant::now();
        let mut timer = Countdown::new();

        timer.pause(t0);
        timer.resume(t0);
        assert!(!timer.is_armed());

        timer.start(secs(5), t0);
        timer.resume(t0 + secs(1)); // not paused
        assert_eq!(timer.remaining(t0 + secs(1)), secs(4));

        timer.pause(t0 + secs(2));
        timer.pause(t0 + secs(3)); // already paused
        assert_eq!(timer.remaining(t0 + secs(3)), secs(3));
    }
}
