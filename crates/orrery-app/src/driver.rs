//! Fixed-timestep driver ("Fix Your Timestep").
//!
//! Wall-clock frame time feeds an accumulator that is drained in fixed
//! steps, so simulation results do not depend on the render rate.

use std::time::Instant;

use tracing::warn;

/// Longest frame the accumulator accepts. Slower frames are clamped and the
/// simulation falls behind wall time instead of spiralling.
pub const MAX_FRAME_TIME: f64 = 0.25;

/// Accumulator state. `update` runs zero or more times per frame.
pub struct FixedStepDriver {
    fixed_dt: f64,
    previous_time: Instant,
    accumulator: f64,
    elapsed: f64,
    frame_count: u64,
    step_count: u64,
}

impl FixedStepDriver {
    /// Non-positive or non-finite steps fall back to 60 Hz.
    pub fn new(fixed_dt: f64) -> Self {
        let fixed_dt = if fixed_dt.is_finite() && fixed_dt > 0.0 {
            fixed_dt
        } else {
            1.0 / 60.0
        };
        Self {
            fixed_dt,
            previous_time: Instant::now(),
            accumulator: 0.0,
            elapsed: 0.0,
            frame_count: 0,
            step_count: 0,
        }
    }

    /// Measure the wall time since the previous call and run the steps it
    /// covers. Returns the interpolation alpha in `[0, 1)`.
    pub fn tick(&mut self, update: impl FnMut(f64)) -> f64 {
        let now = Instant::now();
        let frame_time = now.duration_since(self.previous_time).as_secs_f64();
        self.previous_time = now;
        self.advance(frame_time, update)
    }

    /// Same as [`tick`](Self::tick) with an explicit frame time.
    pub fn advance(&mut self, frame_time: f64, mut update: impl FnMut(f64)) -> f64 {
        let mut frame_time = frame_time.max(0.0);
        if frame_time > MAX_FRAME_TIME {
            warn!(
                "Frame time {:.1}ms exceeds maximum, clamping to {:.1}ms",
                frame_time * 1000.0,
                MAX_FRAME_TIME * 1000.0
            );
            frame_time = MAX_FRAME_TIME;
        }

        self.accumulator += frame_time;
        while self.accumulator >= self.fixed_dt {
            update(self.fixed_dt);
            self.elapsed += self.fixed_dt;
            self.accumulator -= self.fixed_dt;
            self.step_count += 1;
        }
        self.frame_count += 1;
        self.alpha()
    }

    pub fn alpha(&self) -> f64 {
        self.accumulator / self.fixed_dt
    }

    pub fn fixed_dt(&self) -> f64 {
        self.fixed_dt
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    /// Wall seconds consumed by fixed steps.
    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }
}
