//! The motor drive engine: lifecycle state machine, per-millisecond
//! control, and per-PWM-period waveform generation.
//!
//! All mutable drive state lives in `MotorDrive`; the interrupt shims
//! sample hardware, call into it, and apply what it asks for through the
//! `PwmControl`/`CommutationTimer` contracts. That keeps the whole state
//! machine drivable from host tests with mock peripherals.

pub mod brake;
pub mod faults;
pub mod ramp;
pub mod startup;
pub mod state;

use crate::fixed_point::Angle;
use crate::modulation::{sine, space_vector, Modulation, PhaseEnable};
use crate::params::{
    ControlMode, DcBrakeConfig, DecayMode, Direction, DriveParameters, LoopMode, MotorType,
    ParamId, PwmFrequency, SensorType,
};
use crate::pi_controller::PiController;
use crate::sensing::encoder::Encoder;
use crate::sensing::hall::{HallSensor, HALL_INVALID};
use crate::sensing::Measurements;

use brake::{BrakeResistor, DynamicBrake};
use faults::{Fault, FaultFlags, STALL_TICKS};
use ramp::{Ramp, RampLimits, RampStep};
use startup::StartupState;
use state::{DriveState, MotorStatus, Phase};

/// The PWM module contract. Duty cycles are 16.16 with 65536 == 100%; the
/// implementation clamps pulses to the configured minimum width.
pub trait PwmControl {
    fn set_duty_cycle(&mut self, duty_u: u32, duty_v: u32, duty_w: u32);
    fn set_frequency(&mut self, frequency: PwmFrequency);
    fn set_dead_band(&mut self, dead_time: u8, min_pulse: u8);
    /// Waveform updates run every `rate + 1` PWM periods.
    fn set_update_rate(&mut self, rate: u8);
    /// All outputs switching.
    fn output_on(&mut self);
    /// All outputs off (coast).
    fn output_off(&mut self);
    /// High sides off, low sides on, charging the bootstrap capacitors.
    fn output_precharge(&mut self);
    /// Fixed duty across the windings for DC injection braking.
    fn output_dc_brake(&mut self, duty: u32);
    /// Six-step drive pattern selection.
    fn output_trapezoid(&mut self, drive: PhaseEnable, decay: DecayMode);
    /// Elapsed PWM periods since the last reduction.
    fn period_count(&self) -> u32;
    fn reduce_period_count(&mut self, count: u32);
}

/// One-shot hardware timer for scheduling the next commutation event.
pub trait CommutationTimer {
    fn schedule(&mut self, ticks: u32);
}

/// Side effects the interrupt glue must apply after a millisecond tick.
#[derive(Clone, Copy, Default)]
pub struct TickEffects {
    /// Re-deliver the current hall pin state as a synthetic edge (the
    /// trapezoid kick-start out of precharge).
    pub kick_start_hall: bool,
    /// Fire the commutation timer handler immediately (sensorless startup
    /// entering open-loop stepping).
    pub kick_start_commutation: bool,
}

/// Hall angles for re-synchronizing the sine drive angle on a sensor edge,
/// degrees, indexed by hall value.
static HALL_TO_ANGLE: [u32; 8] = [0, 270, 30, 330, 150, 210, 90, 0];

pub struct MotorDrive {
    pub params: DriveParameters,
    pub(crate) state: DriveState,
    pub(crate) status: MotorStatus,
    pub(crate) faults: FaultFlags,
    /// Primary controlled quantity: 16.16 Hz for induction, 18.14 RPM for
    /// BLDC.
    pub(crate) ramp: Ramp,
    /// BLDC power quantity, 18.14 mW.
    pub(crate) power_ramp: Ramp,
    freq_pi: PiController,
    pub(crate) speed_pi: PiController,
    pub(crate) power_pi: PiController,
    angle: Angle,
    angle_delta: u32,
    /// Milliseconds remaining in the current timed state.
    pub(crate) state_count: u32,
    pub(crate) startup: StartupState,
    stall_count: u32,
    /// Present drive duty cycle, 16.16.
    pub(crate) duty_cycle: u32,
    pub(crate) hall: HallSensor,
    pub(crate) encoder: Encoder,
    /// Hall value at the previous waveform update, for sine re-sync.
    hall_previous: u8,
    /// Unheld ramp target, for the sine re-sync gate.
    sine_target: u32,
    dyn_brake: DynamicBrake,
    measured_speed: u32,
    pub(crate) measurements: Measurements,
    /// Decay mode saved across the sensorless startup (startup always
    /// runs slow decay).
    pub(crate) saved_decay: DecayMode,
    pub(crate) decay_mode: DecayMode,
}

impl MotorDrive {
    pub fn new(params: DriveParameters) -> MotorDrive {
        let max_frequency_q16 = (params.max_frequency as u32 * 65536) / 10;
        let freq_output_max = (params.max_frequency as i32 * 64) / 10;
        let freq_i = params.freq_i.to_bits();
        let freq_integ_max = if freq_i == 0 {
            0
        } else {
            (((max_frequency_q16 as i32) * 64) / freq_i) as i32
        };

        let decay = params.decay_mode;
        MotorDrive {
            freq_pi: PiController::new(
                params.freq_p.to_bits(),
                freq_i,
                freq_integ_max,
                freq_output_max,
            ),
            speed_pi: PiController::new(
                params.speed_p.to_bits(),
                params.speed_i.to_bits(),
                65536 * 100,
                65536,
            ),
            power_pi: PiController::new(
                params.power_p.to_bits(),
                params.power_i.to_bits(),
                65536 * 100,
                65536,
            ),
            ramp: Ramp::new(if params.motor_type.is_induction() { 16 } else { 14 }),
            power_ramp: Ramp::new(14),
            state: DriveState::STOPPED,
            status: MotorStatus::Stopped,
            faults: FaultFlags::new(),
            angle: Angle::ZERO,
            angle_delta: 0,
            state_count: 0,
            startup: StartupState::new(),
            stall_count: 0,
            duty_cycle: 0,
            hall: HallSensor::new(),
            encoder: Encoder::new(),
            hall_previous: HALL_INVALID,
            sine_target: 0,
            dyn_brake: DynamicBrake::new(),
            measured_speed: 0,
            measurements: Measurements::default(),
            saved_decay: decay,
            decay_mode: decay,
            params,
        }
    }

    // ------------------------------------------------------------------
    // Read-only surface.

    pub fn state(&self) -> DriveState {
        self.state
    }

    pub fn status(&self) -> MotorStatus {
        self.status
    }

    pub fn faults(&self) -> &FaultFlags {
        &self.faults
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    pub fn measured_speed(&self) -> u32 {
        self.measured_speed
    }

    /// The measurement batch the last millisecond tick ran against.
    pub fn measurements(&self) -> &Measurements {
        &self.measurements
    }

    /// Present output value in its native fixed-point format.
    pub fn output(&self) -> u32 {
        self.ramp.value()
    }

    pub fn duty_cycle(&self) -> u32 {
        self.duty_cycle
    }

    pub fn angle(&self) -> Angle {
        self.angle
    }

    fn pwm_hz(&self) -> u32 {
        self.params.pwm.frequency.hertz()
    }

    // ------------------------------------------------------------------
    // Command surface. Callers mask the update interrupts around these.

    /// Starts the drive. A latched fault, or (sensorless) a rotor that is
    /// still visibly generating back-EMF, rejects the request outright.
    pub fn run(&mut self, pwm: &mut impl PwmControl) {
        if self.faults.any() {
            return;
        }

        match self.state.phase {
            Phase::Stopped => {
                let startup = &self.params.startup;
                if self.params.modulation == Modulation::Sensorless
                    && startup.restart_threshold_mv != 0
                    && self.measurements.bemf_mv > startup.restart_threshold_mv
                {
                    return;
                }

                self.hall.invalidate();
                self.encoder.invalidate();
                self.stall_count = 0;

                let (limits, power_limits) = (self.primary_limits(), self.power_limits());
                self.ramp.reset_rates(&limits);
                self.power_ramp.reset_rates(&power_limits);

                pwm.output_precharge();
                self.state_count = self.params.precharge_ms + 1;
                self.state = DriveState {
                    phase: Phase::Precharge,
                    direction: self.params.direction,
                };
            }
            // A stop in progress is simply cancelled.
            Phase::Stopping => self.state.phase = Phase::Run,
            _ => {}
        }
    }

    /// Begins a normal deceleration to a stop. A sensorless drive still in
    /// open-loop startup cannot decelerate gracefully and stops outright.
    pub fn stop(&mut self, pwm: &mut impl PwmControl) {
        match self.state.phase {
            Phase::Run => {
                if self.status != MotorStatus::Decelerating {
                    let limits = self.primary_limits();
                    self.ramp.reset_decel_rate(&limits);
                    let power_limits = self.power_limits();
                    self.power_ramp.reset_decel_rate(&power_limits);
                }
                self.state.phase = Phase::Stopping;
            }
            Phase::Startup => {
                self.state = DriveState {
                    phase: Phase::Stopped,
                    direction: self.state.direction,
                };
                self.status = MotorStatus::Stopped;
                pwm.output_off();
            }
            _ => {}
        }
    }

    /// Emergency stop: outputs off now, everything zeroed, state machine
    /// forced to `Stopped`. Does not latch a fault by itself; fault paths
    /// latch their own bit after calling this.
    pub fn emergency_stop(&mut self, pwm: &mut impl PwmControl) {
        pwm.output_off();
        self.duty_cycle = 0;
        pwm.set_duty_cycle(0, 0, 0);

        self.state = DriveState {
            phase: Phase::Stopped,
            direction: self.state.direction,
        };
        self.status = MotorStatus::Stopped;

        self.ramp.reset();
        self.power_ramp.reset();
        let (limits, power_limits) = (self.primary_limits(), self.power_limits());
        self.ramp.reset_rates(&limits);
        self.power_ramp.reset_rates(&power_limits);
        self.angle = Angle::ZERO;
        self.angle_delta = 0;
        self.stall_count = 0;
        self.freq_pi.reset();
        self.speed_pi.reset();
        self.power_pi.reset();
        self.measured_speed = 0;
    }

    /// Requests a rotation direction. While running this starts a
    /// decelerate-to-zero reversal; a reversal back to the present
    /// direction is cancelled.
    pub fn set_direction(&mut self, forward: bool) {
        let requested = if forward {
            Direction::Forward
        } else {
            Direction::Backward
        };
        self.params.direction = requested;

        match self.state.phase {
            Phase::Run if self.state.direction != requested => {
                if self.status != MotorStatus::Decelerating {
                    let limits = self.primary_limits();
                    self.ramp.reset_decel_rate(&limits);
                }
                self.state.phase = Phase::Reversing;
            }
            Phase::Reversing if self.state.direction == requested => {
                // Asked to reverse back before zero was reached; keep
                // running in the current direction.
                self.state.phase = Phase::Run;
            }
            _ => {}
        }
    }

    pub fn clear_faults(&mut self) {
        self.faults.clear_all();
    }

    /// Clamps and stores a new target frequency, tenths of a hertz.
    pub fn set_target_frequency(&mut self, tenth_hz: u16) {
        self.params.target_frequency = tenth_hz
            .max(self.params.min_frequency)
            .min(self.params.max_frequency);
    }

    /// Clamps and stores a new target speed, RPM.
    pub fn set_target_speed(&mut self, rpm: u32) {
        let mut rpm = rpm.max(self.params.min_speed_rpm);
        if self.params.modulation == Modulation::Sensorless {
            rpm = rpm.max(self.params.startup.end_rpm);
        }
        self.params.target_speed_rpm = rpm.min(self.params.max_speed_rpm);
    }

    /// Clamps and stores a new target power, mW.
    pub fn set_target_power(&mut self, mw: u32) {
        self.params.target_power_mw = mw
            .max(self.params.min_power_mw)
            .min(self.params.max_power_mw);
    }

    /// Propagates a parameter change into derived state; the single match
    /// that replaced the per-parameter callback table.
    pub fn apply_parameter_change(&mut self, id: ParamId, pwm: &mut impl PwmControl) {
        match id {
            ParamId::PwmFrequency => {
                pwm.set_frequency(self.params.pwm.frequency);
                self.recompute_angle_delta();
            }
            ParamId::DeadTime | ParamId::MinPulseWidth => {
                pwm.set_dead_band(self.params.pwm.dead_time, self.params.pwm.min_pulse);
            }
            ParamId::UpdateRate => pwm.set_update_rate(self.params.pwm.update_rate),
            ParamId::TargetFrequency => self.set_target_frequency(self.params.target_frequency),
            ParamId::TargetSpeed => self.set_target_speed(self.params.target_speed_rpm),
            ParamId::TargetPower => self.set_target_power(self.params.target_power_mw),
            ParamId::Direction => {
                self.set_direction(self.params.direction == Direction::Forward)
            }
            ParamId::FreqIGain => {
                let gain = self.params.freq_i.to_bits();
                let max_frequency_q16 = (self.params.max_frequency as u32 * 65536) / 10;
                let integ_max = if gain == 0 {
                    0
                } else {
                    ((max_frequency_q16 as i32) * 64) / gain
                };
                self.freq_pi.set_i_gain(gain, integ_max);
            }
            ParamId::SpeedIGain => {
                self.speed_pi
                    .set_i_gain(self.params.speed_i.to_bits(), 65536 * 100);
            }
            ParamId::PowerIGain => {
                self.power_pi
                    .set_i_gain(self.params.power_i.to_bits(), 65536 * 100);
            }
            ParamId::MaxFrequency => {
                let max_frequency_q16 = (self.params.max_frequency as u32 * 65536) / 10;
                let gain = self.params.freq_i.to_bits();
                let integ_max = if gain == 0 {
                    0
                } else {
                    ((max_frequency_q16 as i32) * 64) / gain
                };
                self.freq_pi
                    .set_output_max((self.params.max_frequency as i32 * 64) / 10, integ_max);
            }
        }
    }

    // ------------------------------------------------------------------
    // Sensor entry points (interrupt shims call these).

    /// A hall edge with the raw 3-bit pin snapshot at `now` (system clock
    /// timestamp). Commutates immediately in trapezoid mode.
    pub fn hall_edge(&mut self, raw: u8, now: u32, pwm: &mut impl PwmControl) {
        let invert = self.params.sensor.polarity == crate::params::SensorPolarity::ActiveLow;
        let value = self.hall.edge(
            raw,
            now,
            invert,
            self.params.pole_pairs as u32,
            self.params.max_speed_rpm,
        );
        if self.params.modulation == Modulation::Trapezoid && self.state.is_running() {
            self.trap_modulate(value, pwm);
        }
    }

    /// Housekeeping-rate upkeep: speed-to-zero timeouts that need a clock
    /// rather than an edge.
    pub fn housekeeping_tick(&mut self, now: u32) {
        self.hall.tick(now);
    }

    /// An encoder edge (edge-timing mode). Returns true when the shim
    /// should mask the edge interrupt and switch to window counting.
    pub fn encoder_edge(&mut self, now: u32) -> bool {
        self.encoder.edge(
            now,
            self.params.sensor.encoder_lines as u32,
            self.params.max_speed_rpm,
        )
    }

    /// An encoder velocity-window expiry. Returns true when the shim
    /// should unmask the edge interrupt.
    pub fn encoder_window(&mut self, count: u32) -> bool {
        self.encoder.window(
            count,
            self.params.sensor.encoder_lines as u32,
            self.params.max_speed_rpm,
        )
    }

    /// The one-shot commutation timer fired. During open-loop startup this
    /// steps the synthetic hall sequence and re-arms; in closed-loop
    /// sensorless run it applies the commutation the BEMF estimator
    /// scheduled.
    pub fn commutation_tick(
        &mut self,
        next_hall: u8,
        pwm: &mut impl PwmControl,
        timer: &mut impl CommutationTimer,
    ) {
        if self.params.modulation != Modulation::Sensorless {
            return;
        }
        match self.state.phase {
            Phase::Startup => {
                let hall =
                    crate::modulation::trapezoid::STARTUP_SEQUENCE[self.startup.hall_index];
                self.trap_modulate(hall, pwm);
                self.startup.advance_hall(self.state.direction);
                timer.schedule(self.startup.period_ticks);
            }
            Phase::Run | Phase::Stopping | Phase::Reversing => {
                self.trap_modulate(next_hall, pwm);
            }
            _ => {}
        }
    }

    /// Applies the six-step drive pattern for a hall value, honoring
    /// sensor spacing and rotation direction.
    pub(crate) fn trap_modulate(&mut self, hall: u8, pwm: &mut impl PwmControl) {
        let sixty = matches!(
            self.params.sensor.sensor_type,
            SensorType::DigitalHall60 | SensorType::LinearHall60
        ) && self.params.modulation == Modulation::Trapezoid;
        let drive = if sixty {
            PhaseEnable::for_hall_60(hall)
        } else {
            PhaseEnable::for_hall(hall)
        };
        if let Some(drive) = drive {
            let drive = if self.state.is_reverse() {
                drive.reversed()
            } else {
                drive
            };
            pwm.output_trapezoid(drive, self.decay_mode);
        }
    }

    // ------------------------------------------------------------------
    // Millisecond tick.

    /// The millisecond update: dynamic brake, fault scan, then the state
    /// dispatch that ramps the output and recomputes the angle delta.
    pub fn millisecond_tick(
        &mut self,
        measurements: &Measurements,
        pwm: &mut impl PwmControl,
        brake_pin: &mut impl BrakeResistor,
    ) -> TickEffects {
        self.measurements = *measurements;
        let mut effects = TickEffects::default();

        let brake_config = self.params.dyn_brake;
        self.dyn_brake.tick(measurements.bus_mv, &brake_config, brake_pin);
        self.check_faults(pwm);

        if self.state.phase == Phase::Stopped {
            self.measured_speed = 0;
            return effects;
        }
        self.measured_speed = self.select_measured_speed();

        match self.state.phase {
            Phase::Braking => self.dc_brake_tick(pwm),
            Phase::Precharge => self.precharge_tick(pwm, &mut effects),
            Phase::Startup => self.startup_tick(pwm, &mut effects),
            _ => self.run_tick(pwm),
        }
        effects
    }

    fn select_measured_speed(&self) -> u32 {
        if self.params.modulation == Modulation::Sensorless {
            return self.measurements.bemf_rpm;
        }
        if self.params.sensor.encoder_present {
            return self.encoder.speed();
        }
        match self.params.sensor.sensor_type {
            SensorType::DigitalHall | SensorType::DigitalHall60 => self.hall.speed(),
            SensorType::LinearHall | SensorType::LinearHall60 => self.measurements.linear_rpm,
        }
    }

    fn precharge_tick(&mut self, pwm: &mut impl PwmControl, effects: &mut TickEffects) {
        self.state_count -= 1;
        if self.state_count != 0 {
            return;
        }

        if self.params.modulation == Modulation::Sensorless {
            self.startup.reset();
            self.state.phase = Phase::Startup;
            return;
        }

        self.duty_cycle = 0;
        pwm.set_duty_cycle(0, 0, 0);

        // Trapezoid drive kick-starts from the sensors' current position;
        // everything else just enables the bridge.
        if self.params.modulation == Modulation::Trapezoid {
            effects.kick_start_hall = true;
        } else {
            pwm.output_on();
        }

        self.state.phase = Phase::Run;
        self.ramp.reset();
        self.power_ramp.reset();
        self.freq_pi.reset();
        self.speed_pi.reset();
        self.power_pi.reset();
        self.angle = Angle::ZERO;
    }

    fn dc_brake_tick(&mut self, pwm: &mut impl PwmControl) {
        self.state_count -= 1;
        if self.state_count != 0 {
            return;
        }
        pwm.output_off();
        self.state.phase = Phase::Stopped;
        self.status = MotorStatus::Stopped;
    }

    fn run_tick(&mut self, pwm: &mut impl PwmControl) {
        let stopping = matches!(self.state.phase, Phase::Stopping | Phase::Reversing);

        if self.params.motor_type.is_induction() {
            self.induction_run_tick(pwm, stopping);
        } else {
            self.brushless_run_tick(pwm, stopping);
        }
    }

    fn induction_run_tick(&mut self, pwm: &mut impl PwmControl, stopping: bool) {
        let target = if stopping {
            0
        } else if self.params.loop_mode == LoopMode::Closed {
            self.frequency_controller()
        } else {
            (self.params.target_frequency as u32 * 65536) / 10
        };

        let limits = self.primary_limits();
        let step = self.ramp.step(
            target,
            &limits,
            self.measurements.motor_ma,
            self.measurements.bus_mv,
            0,
        );
        self.apply_ramp_step(step, pwm, true);
        self.recompute_angle_delta();
    }

    fn brushless_run_tick(&mut self, pwm: &mut impl PwmControl, stopping: bool) {
        let speed_mode = self.params.control_mode == ControlMode::Speed;
        let mut target = if stopping {
            0
        } else if speed_mode {
            self.params.target_speed_rpm << 14
        } else {
            self.params.target_power_mw << 14
        };
        self.sine_target = target;

        // Hold the setpoint through the post-startup stabilization window
        // so the fresh closed loop is not asked to slew at the same time.
        if self.params.modulation == Modulation::Sensorless && self.state_count > 0 {
            self.state_count -= 1;
            if !stopping {
                target = if speed_mode {
                    self.ramp.value()
                } else {
                    self.power_ramp.value()
                };
            }
            if self.state_count == 1 {
                self.decay_mode = self.saved_decay;
            }
        }

        let zero_floor = if self.params.modulation == Modulation::Sensorless {
            self.params.startup.end_rpm
        } else {
            0
        };

        let step = if speed_mode {
            let limits = self.primary_limits();
            self.ramp.step(
                target,
                &limits,
                self.measurements.motor_ma,
                self.measurements.bus_mv,
                zero_floor,
            )
        } else {
            let limits = self.power_limits();
            self.power_ramp.step(
                target,
                &limits,
                self.measurements.motor_ma,
                self.measurements.bus_mv,
                0,
            )
        };
        self.apply_ramp_step(step, pwm, false);

        if self.state.phase == Phase::Stopped {
            return;
        }
        self.recompute_angle_delta();

        // Duty cycle from the PI controller, unless the winding current has
        // exceeded the target-current parameter, in which case the duty is
        // trimmed proportionally to pull the current back.
        let target_ma = self.params.target_current_ma;
        if target_ma != 0 && self.measurements.motor_ma > target_ma {
            let over = (self.measurements.motor_ma - target_ma) as u32;
            let over_q16 = (over * 65536) / target_ma as u32;
            let trim = (over_q16 * self.duty_cycle) / 65536;
            self.duty_cycle = self.duty_cycle.saturating_sub(trim);
        } else if speed_mode {
            let error = (self.ramp.value() >> 14) as i32 - self.measured_speed as i32;
            self.duty_cycle = self.speed_pi.update(error) as u32;
        } else {
            let error =
                (self.power_ramp.value() >> 14) as i32 - self.measurements.motor_mw as i32;
            self.duty_cycle = self.power_pi.update(error) as u32;
        }

        if self.params.modulation != Modulation::Sine {
            pwm.set_duty_cycle(self.duty_cycle, self.duty_cycle, self.duty_cycle);
        }
    }

    /// Folds a ramp step result into the state machine: status updates,
    /// and the transitions taken when the output decays to zero.
    fn apply_ramp_step(&mut self, step: RampStep, pwm: &mut impl PwmControl, induction: bool) {
        if let Some(status) = step.status() {
            self.status = status;
        }
        if step != RampStep::ReachedZero {
            return;
        }

        match self.state.phase {
            Phase::Stopping => {
                let DcBrakeConfig { enabled, .. } = self.params.dc_brake;
                if induction && enabled {
                    // Hold the windings at a fixed DC level to stop the
                    // rotor, then finish stopping on the brake timer.
                    let duty = self.dc_brake_duty();
                    pwm.output_dc_brake(duty);
                    self.state_count = self.params.dc_brake.time_ms;
                    self.state.phase = Phase::Braking;
                } else {
                    pwm.output_off();
                    self.state.phase = Phase::Stopped;
                    self.status = MotorStatus::Stopped;
                }
            }
            Phase::Reversing => {
                self.state = DriveState {
                    phase: Phase::Run,
                    direction: self.state.direction.opposite(),
                };
            }
            _ => {}
        }
    }

    fn dc_brake_duty(&self) -> u32 {
        let bus = self.measurements.bus_mv.max(1);
        (((self.params.dc_brake.voltage_mv as u64) << 16) / bus as u64) as u32
    }

    /// The induction closed-loop controller: trims the drive frequency so
    /// the measured rotor frequency (always below the drive frequency by
    /// the slip) converges on the operator's target.
    fn frequency_controller(&mut self) -> u32 {
        let target_q16 = (self.params.target_frequency as u32 * 65536) / 10;
        let rotor_tenth_hz = self.rotor_frequency_tenth_hz();
        let error = (target_q16 / 256) as i32 - ((rotor_tenth_hz * 256) / 10) as i32;
        let output = self.freq_pi.update(error);
        (output as u32) * 1024
    }

    /// Rotor electrical frequency in tenths of a hertz, from the encoder.
    fn rotor_frequency_tenth_hz(&self) -> u32 {
        (self.encoder.speed() * self.params.pole_pairs as u32) / 6
    }

    fn recompute_angle_delta(&mut self) {
        self.angle_delta = if self.params.motor_type.is_induction() {
            Angle::delta_from_frequency(self.ramp.value(), self.pwm_hz())
        } else {
            Angle::delta_from_speed(
                self.ramp.value(),
                self.pwm_hz(),
                self.params.pole_pairs as u32,
            )
        };
    }

    // ------------------------------------------------------------------
    // Fault scan.

    fn check_faults(&mut self, pwm: &mut impl PwmControl) {
        let m = self.measurements;

        // The watchdog latches its bit from its own handler; here it only
        // needs the stop enforced.
        if self.faults.is_set(Fault::Watchdog) && self.state.is_running() {
            self.emergency_stop(pwm);
        }

        if m.temperature_c > self.params.max_temperature_c {
            self.emergency_stop(pwm);
            self.faults.latch(Fault::TemperatureHigh);
        }

        if m.bus_mv < self.params.min_bus_mv {
            self.emergency_stop(pwm);
            self.faults.latch(Fault::VbusLow);
        }
        if m.bus_mv > self.params.max_bus_mv {
            self.emergency_stop(pwm);
            self.faults.latch(Fault::VbusHigh);
        }

        // Undercurrent only means anything while the motor is actually
        // being driven at a speed where current must flow.
        if self.params.min_current_ma != 0
            && m.motor_ma < self.params.min_current_ma
            && self.state.is_running()
            && self.at_or_above_minimum_output()
        {
            self.emergency_stop(pwm);
            self.faults.latch(Fault::CurrentLow);
        }

        if self.params.max_current_ma != 0 && m.motor_ma > self.params.max_current_ma {
            self.emergency_stop(pwm);
            self.faults.latch(Fault::CurrentHigh);
        }

        if self.state.is_ramping() {
            if self.measured_speed == 0 {
                self.stall_count += 1;
                if self.stall_count >= STALL_TICKS {
                    self.emergency_stop(pwm);
                    self.faults.latch(Fault::Stall);
                }
            } else {
                self.stall_count = 0;
            }
        } else {
            self.stall_count = 0;
        }
    }

    fn at_or_above_minimum_output(&self) -> bool {
        if self.params.motor_type.is_induction() {
            let current_tenth_hz = (self.ramp.value() * 10) >> 16;
            current_tenth_hz >= self.params.min_frequency as u32
        } else {
            (self.ramp.value() >> 14) >= self.params.min_speed_rpm
        }
    }

    /// Latches a fault after forcing the drive down; the entry point used
    /// by external fault sources (watchdog, power module, operator estop).
    pub fn fault_stop(&mut self, fault: Fault, pwm: &mut impl PwmControl) {
        self.emergency_stop(pwm);
        self.faults.latch(fault);
    }

    // ------------------------------------------------------------------
    // Waveform update.

    /// The waveform update handler, run every `update_rate + 1` PWM
    /// periods. Drains *all* pending periods before returning so a late
    /// update never drops angle accumulation, preserving long-run average
    /// frequency.
    pub fn waveform_tick(&mut self, pwm: &mut impl PwmControl) {
        let update = self.params.pwm.update_rate as u32 + 1;

        let idle = !matches!(
            self.state.phase,
            Phase::Run | Phase::Stopping | Phase::Reversing | Phase::Startup
        );
        if idle || self.params.modulation.is_six_step() {
            // Not synthesizing waveforms; just retire the elapsed periods.
            pwm.reduce_period_count((pwm.period_count() / update) * update);
            return;
        }

        let mut duty_cycles = [0u32; 3];
        while pwm.period_count() >= update {
            let pending = pwm.period_count() / update;
            match self.state.direction {
                Direction::Forward => self.angle.advance(self.angle_delta, update * pending),
                Direction::Backward => self.angle.retreat(self.angle_delta, update * pending),
            }
            pwm.reduce_period_count(pending * update);

            let amplitude = self.waveform_amplitude();
            match (self.params.motor_type, self.params.modulation) {
                (MotorType::InductionSinglePhase, _) => {
                    sine::modulate_single_phase(self.angle, amplitude, &mut duty_cycles)
                }
                (_, Modulation::SpaceVector) => {
                    space_vector::modulate(self.angle, amplitude, &mut duty_cycles)
                }
                _ => sine::modulate(self.angle, amplitude, &mut duty_cycles),
            }

            // Reverse BLDC sine drive flips the waveform rather than the
            // phase order.
            if !self.params.motor_type.is_induction() && self.state.is_reverse() {
                for duty in duty_cycles.iter_mut() {
                    *duty = 65536 - *duty;
                }
            }

            pwm.set_duty_cycle(duty_cycles[0], duty_cycles[1], duty_cycles[2]);
        }
    }

    fn waveform_amplitude(&mut self) -> u32 {
        if self.params.motor_type.is_induction() {
            let mut amplitude = self.params.vf_curve.amplitude(self.ramp.value());
            if self.params.bus_comp {
                amplitude = sine::bus_compensate(
                    amplitude,
                    self.measurements.bus_mv,
                    self.params.nominal_bus_mv,
                    self.params.bus_comp_floor_mv,
                );
            }
            amplitude
        } else {
            // Sensored BLDC sine drive: re-align the synthesized angle to
            // the rotor whenever the sensors step, except at speed where
            // the once-per-revolution correction (hall code 5) suffices.
            let hall = self.hall.value();
            if self.hall_previous != hall
                && (self.sine_target != self.ramp.value() || hall == 5)
            {
                let mut degrees = HALL_TO_ANGLE[(hall & 7) as usize];
                if self.state.is_reverse() {
                    degrees = (degrees + 60) % 360;
                }
                self.angle = Angle::from_degrees(degrees);
            }
            self.hall_previous = hall;
            self.duty_cycle
        }
    }

    // ------------------------------------------------------------------
    // Ramp limit tables.

    fn primary_limits(&self) -> RampLimits {
        if self.params.motor_type.is_induction() {
            RampLimits {
                nominal_accel: self.params.accel,
                nominal_decel: self.params.decel,
                accel_current_ma: self.params.accel_current_ma,
                decel_volts: self.params.decel_voltage_mv / 1000,
                recovery: 65536 / 4,
            }
        } else {
            RampLimits {
                nominal_accel: self.params.accel,
                nominal_decel: self.params.decel,
                accel_current_ma: self.params.accel_current_ma,
                decel_volts: self.params.decel_voltage_mv / 1000,
                recovery: 15 << 16,
            }
        }
    }

    fn power_limits(&self) -> RampLimits {
        RampLimits {
            nominal_accel: self.params.accel_power,
            nominal_decel: self.params.decel_power,
            accel_current_ma: self.params.accel_current_ma,
            decel_volts: self.params.decel_voltage_mv / 1000,
            recovery: 15 << 16,
        }
    }
}
