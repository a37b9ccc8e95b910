/// Femtoseconds per nanosecond. Simulation time is kept in femtoseconds; statistics
/// are reported per nanosecond.
pub const FS_IN_NS: f64 = 1.0e6;

/// Time source owned by the external stepper.
pub trait SimulationClock {
    /// Current simulation time, in femtoseconds.
    fn current_time(&self) -> f64;

    /// Largest time step the stepper takes, in femtoseconds.
    fn maximum_time_step(&self) -> f64;

    fn current_time_ns(&self) -> f64 {
        self.current_time() / FS_IN_NS
    }
}

/// A clock advanced explicitly by its owner.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ManualClock {
    pub time: f64,
    pub time_step: f64,
}

impl ManualClock {
    pub fn new(time_step: f64) -> Self {
        Self {
            time: 0.0,
            time_step,
        }
    }

    /// Advances the clock by one time step.
    pub fn tick(&mut self) {
        self.time += self.time_step;
    }

    pub fn set_time(&mut self, time: f64) {
        self.time = time;
    }
}

impl SimulationClock for ManualClock {
    fn current_time(&self) -> f64 {
        self.time
    }

    fn maximum_time_step(&self) -> f64 {
        self.time_step
    }
}
