//! Dynamic (resistor) brake control.
//!
//! When regeneration pushes the bus voltage past the on-threshold the
//! braking resistor is switched across the bus, with a maximum engagement
//! time and a cool-down period so the resistor survives a descending load.

use crate::params::DynBrakeConfig;

/// The brake resistor switch, an open-drain pin on the real hardware.
pub trait BrakeResistor {
    fn engage(&mut self);
    fn release(&mut self);
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum BrakeState {
    Off,
    On,
    /// Released to cool; the on-time account drains before it may
    /// re-engage.
    Cooling,
}

pub struct DynamicBrake {
    state: BrakeState,
    /// Engagement-time account in ticks: charges while on, drains while
    /// off.
    count: u32,
}

impl DynamicBrake {
    pub fn new() -> DynamicBrake {
        DynamicBrake {
            state: BrakeState::Off,
            count: 0,
        }
    }

    /// Millisecond tick; runs regardless of drive state since regeneration
    /// can also come from an external load spinning the motor.
    pub fn tick(&mut self, bus_mv: u32, config: &DynBrakeConfig, pin: &mut impl BrakeResistor) {
        if bus_mv >= config.on_mv {
            if self.state == BrakeState::Off && config.enabled {
                pin.engage();
                self.state = BrakeState::On;
            }
        } else if bus_mv < config.off_mv && self.state == BrakeState::On {
            pin.release();
            self.state = BrakeState::Off;
        }

        if self.state == BrakeState::On {
            self.count += 1;
            if self.count == config.max_ms {
                // On too long; force a cool-down before any re-engage.
                pin.release();
                self.state = BrakeState::Cooling;
            }
        } else if self.count != 0 {
            self.count -= 1;
            if self.state == BrakeState::Cooling && self.count == config.cool_ms {
                if bus_mv >= config.on_mv {
                    pin.engage();
                    self.state = BrakeState::On;
                } else {
                    self.state = BrakeState::Off;
                }
            }
        }
    }
}

impl Default for DynamicBrake {
    fn default() -> DynamicBrake {
        DynamicBrake::new()
    }
}
