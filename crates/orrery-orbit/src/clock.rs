//! Accumulated simulation time, decoupled from the render cadence.

/// Scalar simulation time advanced by `dt * time_scale` each tick.
///
/// Pausing stops accumulation only; callers keep ticking so camera and
/// overlays stay live.
#[derive(Clone, Debug, PartialEq)]
pub struct SimulationClock {
    time: f64,
    time_scale: f64,
    paused: bool,
    ticks: u64,
}

impl Default for SimulationClock {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl SimulationClock {
    /// A clock at `t = 0` running at `time_scale` simulation units per second.
    pub fn new(time_scale: f64) -> Self {
        Self {
            time: 0.0,
            time_scale,
            paused: false,
            ticks: 0,
        }
    }

    /// Advance by one tick of `dt` wall seconds. Returns the scaled step that
    /// was applied (zero while paused).
    pub fn advance(&mut self, dt: f64) -> f64 {
        self.ticks += 1;
        if self.paused {
            return 0.0;
        }
        let step = dt * self.time_scale;
        self.time += step;
        step
    }

    /// Current simulation time.
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Jump to an absolute simulation time.
    pub fn set_time(&mut self, time: f64) {
        self.time = time;
    }

    /// Simulation units per wall second.
    pub fn time_scale(&self) -> f64 {
        self.time_scale
    }

    /// Change the time-scale multiplier. Negative values run time backwards.
    pub fn set_time_scale(&mut self, scale: f64) {
        self.time_scale = scale;
    }

    /// Whether accumulation is frozen.
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Freeze or resume accumulation.
    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    /// Flip the paused state and return the new value.
    pub fn toggle_pause(&mut self) -> bool {
        self.paused = !self.paused;
        self.paused
    }

    /// Number of ticks seen, paused or not.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }
}
