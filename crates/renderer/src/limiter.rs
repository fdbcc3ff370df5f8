use std::time::{Duration, Instant};

/// Below this much remaining time the limiter stops sleeping and spins.
const SPIN_THRESHOLD: Duration = Duration::from_millis(2);
/// Slack left after a coarse sleep to absorb OS timer granularity.
const SLEEP_MARGIN: Duration = Duration::from_millis(1);

/// Holds the render loop to a target frame interval.
///
/// Each cycle is `start_frame` → render → `end_frame` → `wait_for_next_frame`.
/// Waiting sleeps coarsely while the deadline is far away, then busy-waits
/// the last couple of milliseconds for sub-millisecond precision.
#[derive(Debug)]
pub struct FrameLimiter {
    target_interval: Option<Duration>,
    frame_start: Option<Instant>,
    deadline: Option<Instant>,
    high_precision: bool,
}

impl FrameLimiter {
    /// `target_fps == 0` disables pacing.
    pub fn new(target_fps: u32) -> Self {
        let target_interval = if target_fps > 0 {
            Some(Duration::from_secs_f64(1.0 / f64::from(target_fps)))
        } else {
            None
        };
        Self {
            target_interval,
            frame_start: None,
            deadline: None,
            high_precision: false,
        }
    }

    pub fn target_interval(&self) -> Option<Duration> {
        self.target_interval
    }

    pub fn start_frame(&mut self) {
        self.frame_start = Some(Instant::now());
    }

    pub fn end_frame(&mut self) {
        self.end_frame_at(Instant::now());
    }

    /// Computes the deadline for the frame started by [`Self::start_frame`].
    ///
    /// A frame that overran its budget gets a deadline of `end`, so the next
    /// wait returns immediately instead of trying to catch up.
    pub(crate) fn end_frame_at(&mut self, end: Instant) {
        self.deadline = match (self.frame_start, self.target_interval) {
            (Some(start), Some(interval)) => Some((start + interval).max(end)),
            _ => None,
        };
    }

    pub(crate) fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Blocks until the current frame's deadline.
    pub fn wait_for_next_frame(&self) {
        let Some(deadline) = self.deadline else {
            return;
        };
        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let remaining = deadline - now;
            if remaining > SPIN_THRESHOLD {
                std::thread::sleep(remaining - SLEEP_MARGIN);
            } else {
                std::hint::spin_loop();
            }
        }
    }

    /// Requests or releases a 1 ms OS timer resolution.
    ///
    /// Returns `true` when the state changed; repeating the current value is a
    /// no-op. Platforms whose sleep granularity is already fine-grained only
    /// track the flag.
    pub fn set_high_precision_timing(&mut self, enabled: bool) -> bool {
        if self.high_precision == enabled {
            return false;
        }
        if let Err(code) = timer_resolution::apply(enabled) {
            tracing::warn!(enabled, code, "failed to change OS timer resolution");
            return false;
        }
        self.high_precision = enabled;
        tracing::debug!(enabled, "high precision timing");
        true
    }

    pub fn high_precision_timing(&self) -> bool {
        self.high_precision
    }
}

impl Drop for FrameLimiter {
    fn drop(&mut self) {
        self.set_high_precision_timing(false);
    }
}

#[cfg(windows)]
mod timer_resolution {
    use windows_sys::Win32::Media::{timeBeginPeriod, timeEndPeriod};

    const PERIOD_MS: u32 = 1;
    const TIMERR_NOERROR: u32 = 0;

    /// Each successful begin must be paired with exactly one end.
    pub(super) fn apply(enabled: bool) -> Result<(), u32> {
        // SAFETY: plain winmm calls with no pointer arguments.
        let code = unsafe {
            if enabled {
                timeBeginPeriod(PERIOD_MS)
            } else {
                timeEndPeriod(PERIOD_MS)
            }
        };
        if code == TIMERR_NOERROR {
            Ok(())
        } else {
            Err(code)
        }
    }
}

#[cfg(not(windows))]
mod timer_resolution {
    pub(super) fn apply(_enabled: bool) -> Result<(), u32> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_fps_is_uncapped() {
        let mut limiter = FrameLimiter::new(0);
        assert!(limiter.target_interval().is_none());
        limiter.start_frame();
        limiter.end_frame();
        assert!(limiter.deadline().is_none());
        let before = Instant::now();
        limiter.wait_for_next_frame();
        assert!(before.elapsed() < Duration::from_millis(5));
    }

    #[test]
    fn slow_frames_clamp_deadline_forward() {
        let mut limiter = FrameLimiter::new(60);
        limiter.frame_start = Some(Instant::now());
        let late_end = Instant::now() + Duration::from_millis(100);
        limiter.end_frame_at(late_end);
        assert_eq!(limiter.deadline(), Some(late_end));
    }

    #[test]
    fn wait_returns_immediately_for_past_deadline() {
        let mut limiter = FrameLimiter::new(60);
        limiter.frame_start = Some(Instant::now() - Duration::from_millis(50));
        limiter.end_frame();
        let before = Instant::now();
        limiter.wait_for_next_frame();
        assert!(before.elapsed() < Duration::from_millis(5));
    }

    #[test]
    fn paces_near_zero_cost_frames_to_target() {
        let mut limiter = FrameLimiter::new(60);
        let nominal = limiter.target_interval().expect("interval");
        let mut intervals = Vec::new();
        for _ in 0..6 {
            let started = Instant::now();
            limiter.start_frame();
            limiter.end_frame();
            limiter.wait_for_next_frame();
            intervals.push(started.elapsed());
        }
        for interval in &intervals {
            assert!(*interval >= nominal, "interval {interval:?} shorter than {nominal:?}");
        }
        let mean = intervals.iter().sum::<Duration>() / intervals.len() as u32;
        assert!(
            mean < nominal + Duration::from_millis(15),
            "mean interval {mean:?} too far above {nominal:?}"
        );
    }

    #[test]
    fn high_precision_toggle_is_idempotent() {
        let mut limiter = FrameLimiter::new(60);
        assert!(limiter.set_high_precision_timing(true));
        assert!(!limiter.set_high_precision_timing(true));
        assert!(limiter.high_precision_timing());
        assert!(limiter.set_high_precision_timing(false));
        assert!(!limiter.set_high_precision_timing(false));
    }

    #[test]
    fn timer_resolution_requests_are_balanced() {
        let mut held = FrameLimiter::new(60);
        let mut released = FrameLimiter::new(60);
        assert!(held.set_high_precision_timing(true));
        assert!(released.set_high_precision_timing(true));
        assert!(released.set_high_precision_timing(false));
        // Releasing one limiter leaves the other's request in place.
        assert!(held.high_precision_timing());
        assert!(!released.high_precision_timing());
        drop(held);
        drop(released);

        let mut fresh = FrameLimiter::new(60);
        assert!(fresh.set_high_precision_timing(true));
        assert!(fresh.set_high_precision_timing(false));
    }
}
