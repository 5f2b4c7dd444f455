//! Exploration schedules for epsilon-greedy action selection

/// Default starting exploration probability
pub const DEFAULT_EPSILON_INITIAL: f64 = 1.0;

/// Default exploration floor
pub const DEFAULT_EPSILON_FLOOR: f64 = 0.1;

/// Default multiplicative decay applied per `value()` call
pub const DEFAULT_EPSILON_DECAY: f64 = 0.995;

/// Monotonically non-increasing exploration probability
///
/// `value()` advances the schedule; there is no rollback.
pub trait ExplorationSchedule: Send + Sync {
    /// Value before any decay
    fn initial(&self) -> f64;

    /// Advance one step and return the decayed value
    fn value(&mut self) -> f64;

    /// Lowest value the schedule will ever return
    fn floor(&self) -> f64;
}

/// Exponential decay from `initial` toward `floor`
#[derive(Debug, Clone)]
pub struct DecaySchedule {
    initial: f64,
    floor: f64,
    rate: f64,
    current: f64,
}

impl DecaySchedule {
    /// Build a schedule; inputs are clamped into [0, 1] and `floor <= initial`
    pub fn new(initial: f64, floor: f64, rate: f64) -> Self {
        let initial = initial.clamp(0.0, 1.0);
        let floor = floor.clamp(0.0, initial);
        Self {
            initial,
            floor,
            rate: rate.clamp(0.0, 1.0),
            current: initial,
        }
    }

    /// Current value without advancing
    pub fn current(&self) -> f64 {
        self.current
    }
}

impl Default for DecaySchedule {
    fn default() -> Self {
        Self::new(
            DEFAULT_EPSILON_INITIAL,
            DEFAULT_EPSILON_FLOOR,
            DEFAULT_EPSILON_DECAY,
        )
    }
}

impl ExplorationSchedule for DecaySchedule {
    fn initial(&self) -> f64 {
        self.initial
    }

    fn value(&mut self) -> f64 {
        self.current = (self.current * self.rate).max(self.floor);
        self.current
    }

    fn floor(&self) -> f64 {
        self.floor
    }
}

/// Fixed exploration probability
#[derive(Debug, Clone, Copy)]
pub struct ConstantSchedule(pub f64);

impl ExplorationSchedule for ConstantSchedule {
    fn initial(&self) -> f64 {
        self.0
    }

    fn value(&mut self) -> f64 {
        self.0
    }

    fn floor(&self) -> f64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decay_is_non_increasing_and_floored() {
        let mut schedule = DecaySchedule::new(1.0, 0.2, 0.9);
        assert_eq!(schedule.initial(), 1.0);

        let mut previous = schedule.initial();
        for _ in 0..500 {
            let value = schedule.value();
            assert!(value <= previous);
            assert!(value >= 0.2);
            previous = value;
        }
        assert_eq!(previous, 0.2);
    }

    #[test]
    fn test_first_value_decays_once() {
        let mut schedule = DecaySchedule::new(0.5, 0.0, 0.5);
        assert_eq!(schedule.value(), 0.25);
        assert_eq!(schedule.current(), 0.25);
    }

    #[test]
    fn test_inputs_are_clamped() {
        let schedule = DecaySchedule::new(3.0, 2.0, 1.5);
        assert_eq!(schedule.initial(), 1.0);
        assert_eq!(schedule.floor(), 1.0);

        let schedule = DecaySchedule::new(0.3, 0.8, 0.9);
        assert_eq!(schedule.floor(), 0.3);
    }

    #[test]
    fn test_default_schedule() {
        let schedule = DecaySchedule::default();
        assert_eq!(schedule.initial(), DEFAULT_EPSILON_INITIAL);
        assert_eq!(schedule.floor(), DEFAULT_EPSILON_FLOOR);
    }

    #[test]
    fn test_constant_schedule() {
        let mut schedule = ConstantSchedule(0.0);
        assert_eq!(schedule.initial(), 0.0);
        assert_eq!(schedule.value(), 0.0);
    }
}
