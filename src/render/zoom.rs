use std::time::{Duration, Instant};

/// Duration of the programmatic zoom-in/zoom-out transition.
pub const ZOOM_STEP_DURATION: Duration = Duration::from_millis(250);
/// Duration of the reset-to-identity transition.
pub const RESET_DURATION: Duration = Duration::from_millis(150);

#[derive(Clone, Debug, PartialEq)]
pub struct ZoomAnimation {
    pub from: f32,
    pub to: f32,
    pub start_time: Instant,
    pub duration: Duration,
}

impl ZoomAnimation {
    pub fn new(from: f32, to: f32, start_time: Instant, duration: Duration) -> Self {
        Self {
            from,
            to,
            start_time,
            duration,
        }
    }

    pub fn linear_progress(&self, now: Instant) -> f32 {
        if self.duration.is_zero() {
            return 1.0;
        }
        let elapsed = now.saturating_duration_since(self.start_time);
        (elapsed.as_secs_f32() / self.duration.as_secs_f32()).clamp(0.0, 1.0)
    }

    pub fn eased_progress<F>(&self, now: Instant, easing: F) -> f32
    where
        F: Fn(f32) -> f32,
    {
        easing(self.linear_progress(now))
    }

    /// Scale at `now`, eased in and out.
    pub fn scale_at(&self, now: Instant) -> f32 {
        let t = self.eased_progress(now, ease_in_out_cubic);
        self.from + (self.to - self.from) * t
    }

    pub fn is_finished(&self, now: Instant) -> bool {
        self.linear_progress(now) >= 1.0
    }
}

pub fn ease_in_out_cubic(t: f32) -> f32 {
    if t < 0.5 {
        4.0 * t * t * t
    } else {
        1.0 - (-2.0 * t + 2.0).powi(3) / 2.0
    }
}
