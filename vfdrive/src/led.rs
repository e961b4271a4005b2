//! Run and fault indicator blink patterns.
//!
//! Each indicator runs a period/on-time counter ticked at the
//! housekeeping rate; the patterns themselves encode drive status the way
//! the operator learns to read them (slow heartbeat = stopped, mostly-on =
//! running, fast = braking or faulted, solid = catastrophic).

use crate::drive::state::Phase;

pub trait IndicatorLed {
    fn set(&mut self, on: bool);
}

/// One period/on-time blink pattern, in housekeeping ticks. `(0, 0)` is
/// off, `(1, 1)` is solid on.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct BlinkRate {
    pub period: u32,
    pub on: u32,
}

impl BlinkRate {
    pub const OFF: BlinkRate = BlinkRate { period: 0, on: 0 };
    pub const SOLID: BlinkRate = BlinkRate { period: 1, on: 1 };
    /// Stopped: short flash on a long period.
    pub const STOPPED: BlinkRate = BlinkRate { period: 200, on: 25 };
    /// Running: long flash on the same period.
    pub const RUNNING: BlinkRate = BlinkRate { period: 200, on: 175 };
    /// Braking or faulted: fast blink.
    pub const FAST: BlinkRate = BlinkRate { period: 20, on: 10 };
}

pub struct Blinker {
    rate: BlinkRate,
    count: u32,
}

impl Blinker {
    pub fn new(rate: BlinkRate) -> Blinker {
        Blinker { rate, count: 0 }
    }

    pub fn set_rate(&mut self, rate: BlinkRate) {
        if self.rate != rate {
            self.rate = rate;
            self.count = 0;
        }
    }

    /// Advances one housekeeping tick and drives the pin.
    pub fn tick(&mut self, led: &mut impl IndicatorLed) {
        if self.rate.period == 0 {
            led.set(false);
            return;
        }
        self.count += 1;
        if self.count >= self.rate.period {
            self.count = 0;
        }
        led.set(self.count < self.rate.on);
    }
}

/// The run indicator pattern for a drive phase.
pub fn run_led_rate(phase: Phase) -> BlinkRate {
    match phase {
        Phase::Stopped => BlinkRate::STOPPED,
        Phase::Braking => BlinkRate::FAST,
        _ => BlinkRate::RUNNING,
    }
}

/// The fault indicator pattern for a fault bitset.
pub fn fault_led_rate(fault_bits: u16) -> BlinkRate {
    if fault_bits != 0 {
        BlinkRate::FAST
    } else {
        BlinkRate::OFF
    }
}
