//! Wall-clock to sim-time stepping.
//!
//! The sim advances in whole simulated seconds. Each update converts the
//! real time since the previous update into simulated time (scaled by the
//! sim rate), runs as many one-second steps as fit, and carries the
//! fractional remainder into the next update so no time is lost.
//!
//! # Design Principles
//!
//! - Wall-clock time is a [`tokio::time::Instant`] so tests can pause and
//!   advance it deterministically.
//! - Simulated time lives in [`State::sim_time`] and is never derived from
//!   the wall clock directly; only the step count is.
//! - A non-finite or negative rate yields zero steps rather than panicking.
//!
//! [`State::sim_time`]: crate::state::State::sim_time

use std::time::Duration;

use tokio::time::Instant;

/// Tracks the wall-clock time of the last update and the leftover
/// sub-second simulated time.
#[derive(Debug, Clone, Copy)]
pub struct UpdateClock {
    /// Wall-clock time of the last update (or reset).
    last_update: Instant,
    /// Simulated time carried over from the previous update; always
    /// under one second.
    slop: Duration,
}

impl UpdateClock {
    /// A clock whose last update is `now`, with no carried time.
    pub const fn new(now: Instant) -> Self {
        Self {
            last_update: now,
            slop: Duration::ZERO,
        }
    }

    /// Forget any real time that passed since the last update.
    ///
    /// Used when the sim resumes (unpause, primary sign-on) so the next
    /// update does not try to catch up on the time it was stopped.
    pub const fn reset(&mut self, now: Instant) {
        self.last_update = now;
    }

    /// Real time since the last update.
    pub fn idle_time(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_update)
    }

    /// Wall-clock time of the last update.
    pub const fn last_update(&self) -> Instant {
        self.last_update
    }

    /// Carried sub-second simulated time.
    pub const fn slop(&self) -> Duration {
        self.slop
    }

    /// Convert the real time since the last update into whole simulated
    /// seconds, keeping the remainder as slop and recording `now` as the
    /// last update.
    pub fn advance(&mut self, now: Instant, rate: f32) -> u64 {
        let real = now.saturating_duration_since(self.last_update);
        let scaled = Duration::try_from_secs_f64(real.as_secs_f64() * f64::from(rate))
            .unwrap_or_default();
        let elapsed = scaled.saturating_add(self.slop);

        let steps = elapsed.as_secs();
        self.slop = elapsed.saturating_sub(Duration::from_secs(steps));
        self.last_update = now;
        steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn whole_seconds_step_and_slop_carries() {
        let start = Instant::now();
        let mut clock = UpdateClock::new(start);

        tokio::time::advance(Duration::from_millis(1500)).await;
        assert_eq!(clock.advance(Instant::now(), 1.0), 1);
        assert_eq!(clock.slop(), Duration::from_millis(500));

        tokio::time::advance(Duration::from_millis(600)).await;
        assert_eq!(clock.advance(Instant::now(), 1.0), 1);
        assert_eq!(clock.slop(), Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn rate_scales_elapsed_time() {
        let mut clock = UpdateClock::new(Instant::now());
        tokio::time::advance(Duration::from_millis(1000)).await;
        assert_eq!(clock.advance(Instant::now(), 4.0), 4);
        assert_eq!(clock.slop(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn sub_second_update_only_accumulates() {
        let mut clock = UpdateClock::new(Instant::now());
        tokio::time::advance(Duration::from_millis(100)).await;
        assert_eq!(clock.advance(Instant::now(), 1.0), 0);
        assert_eq!(clock.slop(), Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn reset_discards_stopped_time() {
        let mut clock = UpdateClock::new(Instant::now());
        tokio::time::advance(Duration::from_secs(30)).await;
        clock.reset(Instant::now());
        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(clock.advance(Instant::now(), 1.0), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn bad_rate_yields_no_steps() {
        let mut clock = UpdateClock::new(Instant::now());
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(clock.advance(Instant::now(), -1.0), 0);
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(clock.advance(Instant::now(), f32::NAN), 0);
    }
}
