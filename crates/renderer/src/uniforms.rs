use std::time::Instant;

use chrono::{DateTime, Datelike, Local, Timelike};

/// Per-frame values shared unchanged by every pass and the main program.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameUniforms {
    /// Seconds since the graph started.
    pub time: f32,
    /// Seconds since the previous frame.
    pub time_delta: f32,
    pub frame_rate: f32,
    pub frame: i32,
    /// Year, month, day, seconds since midnight.
    pub date: [f32; 4],
}

impl FrameUniforms {
    pub fn date_from(local: &DateTime<Local>) -> [f32; 4] {
        let seconds_since_midnight = local.num_seconds_from_midnight() as f32
            + local.nanosecond() as f32 / 1_000_000_000.0;
        [
            local.year() as f32,
            local.month() as f32,
            local.day() as f32,
            seconds_since_midnight,
        ]
    }
}

/// Start time, previous frame time and frame counter.
#[derive(Debug, Clone)]
pub struct FrameClock {
    start: Instant,
    last_frame: Instant,
    frame_count: u32,
}

impl FrameClock {
    pub fn new(start: Instant) -> Self {
        Self {
            start,
            last_frame: start,
            frame_count: 0,
        }
    }

    pub fn frame_count(&self) -> u32 {
        self.frame_count
    }

    /// Produces this frame's uniforms and advances the counter.
    pub fn tick(&mut self, now: Instant) -> FrameUniforms {
        self.tick_with_date(now, FrameUniforms::date_from(&Local::now()))
    }

    pub(crate) fn tick_with_date(&mut self, now: Instant, date: [f32; 4]) -> FrameUniforms {
        let elapsed = now.saturating_duration_since(self.start).as_secs_f32();
        let delta = if self.frame_count == 0 {
            0.0
        } else {
            now.saturating_duration_since(self.last_frame).as_secs_f32()
        };
        let frame_rate = if delta > 0.0 { 1.0 / delta } else { 0.0 };
        let frame = self.frame_count.min(i32::MAX as u32) as i32;

        self.last_frame = now;
        self.frame_count = self.frame_count.saturating_add(1);

        FrameUniforms {
            time: elapsed,
            time_delta: delta,
            frame_rate,
            frame,
            date,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::time::Duration;

    #[test]
    fn first_frame_has_zero_delta() {
        let start = Instant::now();
        let mut clock = FrameClock::new(start);
        let first = clock.tick_with_date(start + Duration::from_millis(5), [0.0; 4]);
        assert_eq!(first.frame, 0);
        assert_eq!(first.time_delta, 0.0);
        assert_eq!(first.frame_rate, 0.0);
        assert!((first.time - 0.005).abs() < 1e-4);
    }

    #[test]
    fn delta_and_rate_follow_previous_frame() {
        let start = Instant::now();
        let mut clock = FrameClock::new(start);
        clock.tick_with_date(start, [0.0; 4]);
        let second = clock.tick_with_date(start + Duration::from_millis(20), [0.0; 4]);
        assert_eq!(second.frame, 1);
        assert!((second.time_delta - 0.020).abs() < 1e-4);
        assert!((second.frame_rate - 50.0).abs() < 0.5);
        assert_eq!(clock.frame_count(), 2);
    }

    #[test]
    fn date_is_decomposed() {
        let local = Local
            .with_ymd_and_hms(2024, 3, 9, 1, 2, 3)
            .single()
            .expect("unambiguous local time");
        let date = FrameUniforms::date_from(&local);
        assert_eq!(date[0], 2024.0);
        assert_eq!(date[1], 3.0);
        assert_eq!(date[2], 9.0);
        assert_eq!(date[3], 3723.0);
    }
}
