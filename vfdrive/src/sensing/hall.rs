//! Digital hall sensor decoding and edge-timing speed measurement.

use super::edge_filter::{EdgeTimer, SpeedFilter};
use crate::SYSTEM_CLOCK;

/// An invalid hall code used to guarantee the first real snapshot is seen
/// as a change (the trapezoid kick-start relies on this).
pub const HALL_INVALID: u8 = 8;

/// Decoded state of the three digital hall inputs plus the edge-timing
/// speed estimate. Speed is measured between rising edges of hall A, one
/// per electrical revolution.
pub struct HallSensor {
    timer: EdgeTimer,
    filter: SpeedFilter,
    value: u8,
    last_value: u8,
    edge_seen: bool,
}

impl HallSensor {
    pub fn new() -> HallSensor {
        HallSensor {
            timer: EdgeTimer::new(),
            filter: SpeedFilter::default(),
            value: 0,
            last_value: HALL_INVALID,
            edge_seen: false,
        }
    }

    /// Processes a hall edge interrupt. `raw` is the 3-bit pin snapshot
    /// taken at interrupt time, `now` a SYSTEM_CLOCK timestamp. Returns the
    /// decoded hall value for commutation.
    pub fn edge(
        &mut self,
        raw: u8,
        now: u32,
        invert: bool,
        pole_pairs: u32,
        max_speed: u32,
    ) -> u8 {
        let value = if invert { raw ^ 0x07 } else { raw } & 0x07;
        self.edge_seen = true;

        // Rising edge of hall A marks one electrical revolution.
        if (self.last_value & 1) == 0 && (value & 1) == 1 {
            if let Some(elapsed) = self.timer.interval(now) {
                let rpm = (SYSTEM_CLOCK as u64 * 60 / (elapsed as u64 * pole_pairs as u64)) as u32;
                self.filter.update(rpm, max_speed);
            }
        }

        self.last_value = value;
        self.value = value;
        value
    }

    /// Housekeeping-rate tick: forces the speed to zero when no edge has
    /// arrived for a fifth of a second and re-arms the first-edge skip.
    pub fn tick(&mut self, now: u32) {
        if self.edge_seen {
            self.edge_seen = false;
            return;
        }
        if now.wrapping_sub(self.timer.previous()) > SYSTEM_CLOCK / 5 {
            self.filter.force_zero();
            self.timer.rearm();
        }
    }

    /// Invalidates the remembered hall state so the next edge (or a
    /// synthetic one) always commutates. Called when the drive starts.
    pub fn invalidate(&mut self) {
        self.last_value = HALL_INVALID;
        self.timer.rearm();
        self.filter.force_zero();
    }

    pub fn value(&self) -> u8 {
        self.value
    }

    pub fn speed(&self) -> u32 {
        self.filter.speed()
    }
}

impl Default for HallSensor {
    fn default() -> HallSensor {
        HallSensor::new()
    }
}
