//! Drive lifecycle state.

use crate::params::Direction;

/// The lifecycle phase of the drive. Exactly one is active at a time.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Phase {
    Stopped,
    /// Pre-energizing the high-side gate bootstrap capacitors.
    Precharge,
    /// Sensorless open-loop spin-up.
    Startup,
    Run,
    /// Decelerating to zero, then stopping (possibly via DC braking).
    Stopping,
    /// Decelerating to zero, then running the other way.
    Reversing,
    /// DC injection braking after a stop (induction only).
    Braking,
}

/// Direction plus phase. The direction is only meaningful while not
/// stopped; `Reversing` keeps the *current* rotation direction until the
/// output reaches zero.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct DriveState {
    pub phase: Phase,
    pub direction: Direction,
}

impl DriveState {
    pub const STOPPED: DriveState = DriveState {
        phase: Phase::Stopped,
        direction: Direction::Forward,
    };

    /// In one of the states that ramp the output (run, stopping,
    /// reversing).
    pub fn is_ramping(&self) -> bool {
        matches!(
            self.phase,
            Phase::Run | Phase::Stopping | Phase::Reversing
        )
    }

    /// Running in the not-stopped sense: anything but `Stopped` counts,
    /// including precharge and braking.
    pub fn is_running(&self) -> bool {
        self.phase != Phase::Stopped
    }

    pub fn is_reverse(&self) -> bool {
        self.direction == Direction::Backward
    }
}

/// Operator-visible motor status, recomputed every tick; purely
/// informational.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum MotorStatus {
    Stopped,
    Accelerating,
    Running,
    Decelerating,
}
