//! Mock peripherals and helpers for exercising the drive engine on the
//! host.

use vfdrive::drive::brake::BrakeResistor;
use vfdrive::drive::{CommutationTimer, MotorDrive, PwmControl};
use vfdrive::modulation::PhaseEnable;
use vfdrive::params::{DecayMode, PwmFrequency};
use vfdrive::sensing::Measurements;

/// What the mock bridge was last told to do.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum OutputState {
    Off,
    On,
    Precharge,
    DcBrake { duty: u32 },
    Trapezoid { drive: PhaseEnable, decay: DecayMode },
}

pub struct MockPwm {
    pub duty: [u32; 3],
    pub output: OutputState,
    pub frequency: PwmFrequency,
    pub dead_band: (u8, u8),
    pub update_rate: u8,
    pub period_count: u32,
    pub duty_writes: u32,
    pub commutations: Vec<PhaseEnable>,
}

impl MockPwm {
    pub fn new() -> MockPwm {
        MockPwm {
            duty: [0; 3],
            output: OutputState::Off,
            frequency: PwmFrequency::Hz20k,
            dead_band: (0, 0),
            update_rate: 0,
            period_count: 0,
            duty_writes: 0,
            commutations: Vec::new(),
        }
    }
}

impl Default for MockPwm {
    fn default() -> MockPwm {
        MockPwm::new()
    }
}

impl PwmControl for MockPwm {
    fn set_duty_cycle(&mut self, duty_u: u32, duty_v: u32, duty_w: u32) {
        self.duty = [duty_u, duty_v, duty_w];
        self.duty_writes += 1;
    }

    fn set_frequency(&mut self, frequency: PwmFrequency) {
        self.frequency = frequency;
    }

    fn set_dead_band(&mut self, dead_time: u8, min_pulse: u8) {
        self.dead_band = (dead_time, min_pulse);
    }

    fn set_update_rate(&mut self, rate: u8) {
        self.update_rate = rate;
    }

    fn output_on(&mut self) {
        self.output = OutputState::On;
    }

    fn output_off(&mut self) {
        self.output = OutputState::Off;
    }

    fn output_precharge(&mut self) {
        self.output = OutputState::Precharge;
    }

    fn output_dc_brake(&mut self, duty: u32) {
        self.output = OutputState::DcBrake { duty };
    }

    fn output_trapezoid(&mut self, drive: PhaseEnable, decay: DecayMode) {
        self.output = OutputState::Trapezoid { drive, decay };
        self.commutations.push(drive);
    }

    fn period_count(&self) -> u32 {
        self.period_count
    }

    fn reduce_period_count(&mut self, count: u32) {
        self.period_count -= count;
    }
}

#[derive(Default)]
pub struct MockTimer {
    pub scheduled: Vec<u32>,
}

impl CommutationTimer for MockTimer {
    fn schedule(&mut self, ticks: u32) {
        self.scheduled.push(ticks);
    }
}

#[derive(Default)]
pub struct MockBrake {
    pub engaged: bool,
    pub toggles: u32,
}

impl BrakeResistor for MockBrake {
    fn engage(&mut self) {
        self.engaged = true;
        self.toggles += 1;
    }

    fn release(&mut self) {
        self.engaged = false;
        self.toggles += 1;
    }
}

/// A healthy 24 V measurement batch for BLDC scenarios.
pub fn bldc_measurements() -> Measurements {
    Measurements {
        bus_mv: 24_000,
        temperature_c: 25,
        motor_ma: 500,
        ..Measurements::ZERO
    }
}

/// A healthy 325 V measurement batch for induction scenarios.
pub fn induction_measurements() -> Measurements {
    Measurements {
        bus_mv: 325_000,
        temperature_c: 25,
        motor_ma: 500,
        ..Measurements::ZERO
    }
}

/// Runs `ticks` millisecond ticks with a constant measurement batch.
pub fn run_ticks(
    drive: &mut MotorDrive,
    measurements: &Measurements,
    pwm: &mut MockPwm,
    brake: &mut MockBrake,
    ticks: u32,
) {
    for _ in 0..ticks {
        drive.millisecond_tick(measurements, pwm, brake);
    }
}
