//! The drive parameter record and its change-propagation surface.
//!
//! Everything is a named, typed field — no packed flag words — and every
//! parameter whose change has side effects routes through
//! `MotorDrive::apply_parameter_change` dispatching on `ParamId`, rather
//! than a per-parameter callback table.

use crate::fixed_point::Gain;
use crate::modulation::Modulation;
use crate::vf_curve::VfCurve;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum MotorType {
    InductionThreePhase,
    InductionSinglePhase,
    Brushless,
}

impl MotorType {
    pub fn is_induction(self) -> bool {
        !matches!(self, MotorType::Brushless)
    }
}

/// Which quantity the BLDC closed loop regulates.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ControlMode {
    Speed,
    Power,
}

/// Open or closed loop for the induction drive.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum LoopMode {
    Open,
    Closed,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Direction {
    Forward,
    Backward,
}

impl Direction {
    pub fn opposite(self) -> Direction {
        match self {
            Direction::Forward => Direction::Backward,
            Direction::Backward => Direction::Forward,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SensorType {
    /// Digital hall sensors, 120 degree spacing.
    DigitalHall,
    /// Digital hall sensors, 60 degree spacing.
    DigitalHall60,
    /// Linear (analog) hall sensors.
    LinearHall,
    /// Linear hall sensors, 60 degree spacing.
    LinearHall60,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SensorPolarity {
    ActiveHigh,
    ActiveLow,
}

/// Winding current decay path while six-step modulating.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DecayMode {
    Fast,
    Slow,
}

/// The supported PWM carrier frequencies.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PwmFrequency {
    Hz8k,
    Hz12k5,
    Hz16k,
    Hz20k,
}

impl PwmFrequency {
    pub fn hertz(self) -> u32 {
        match self {
            PwmFrequency::Hz8k => 8_000,
            PwmFrequency::Hz12k5 => 12_500,
            PwmFrequency::Hz16k => 16_000,
            PwmFrequency::Hz20k => 20_000,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct PwmConfig {
    pub frequency: PwmFrequency,
    /// Dead-band insertion, timer ticks.
    pub dead_time: u8,
    /// Waveform updates happen every `update_rate + 1` PWM periods.
    pub update_rate: u8,
    /// Minimum output pulse width, units of 100 ns.
    pub min_pulse: u8,
}

#[derive(Clone, Copy, Debug)]
pub struct SensorConfig {
    pub sensor_type: SensorType,
    pub polarity: SensorPolarity,
    pub encoder_present: bool,
    /// Encoder line count minus one, matching the stored-parameter
    /// convention.
    pub encoder_lines: u16,
}

/// Sensorless open-loop startup tuning. Runtime parameters rather than
/// compile-time constants so per-motor tuning does not need a rebuild.
#[derive(Clone, Copy, Debug)]
pub struct StartupConfig {
    /// Effective phase voltage at the start of the alignment ramp, mV.
    pub start_voltage_mv: u32,
    /// Effective phase voltage at the open-loop handoff, mV.
    pub end_voltage_mv: u32,
    /// Open-loop commutation speed at the start of the ramp, RPM.
    pub start_rpm: u32,
    /// Open-loop speed at which closed loop takes over, RPM.
    pub end_rpm: u32,
    /// Milliseconds for the voltage/speed ramp.
    pub ramp_ms: u32,
    /// Milliseconds of rotor alignment (also the voltage pre-ramp length).
    pub align_ms: u32,
    /// ADC samples ignored after each commutation before looking for a
    /// zero crossing.
    pub bemf_skip_count: u8,
    /// Refuse a run request while the idle back-EMF envelope exceeds this
    /// (the rotor is still spinning), mV. Zero disables the check.
    pub restart_threshold_mv: u32,
}

#[derive(Clone, Copy, Debug)]
pub struct DcBrakeConfig {
    pub enabled: bool,
    /// Injection voltage, mV.
    pub voltage_mv: u32,
    /// Injection time, ms.
    pub time_ms: u32,
}

/// Dynamic (resistor) brake thresholds.
#[derive(Clone, Copy, Debug)]
pub struct DynBrakeConfig {
    pub enabled: bool,
    /// Bus voltage that engages the resistor, mV.
    pub on_mv: u32,
    /// Bus voltage that releases it, mV.
    pub off_mv: u32,
    /// Longest continuous engagement, ms.
    pub max_ms: u32,
    /// Cool-down accounting threshold, ms.
    pub cool_ms: u32,
}

#[derive(Clone, Debug)]
pub struct DriveParameters {
    pub motor_type: MotorType,
    pub modulation: Modulation,
    pub control_mode: ControlMode,
    pub loop_mode: LoopMode,
    pub direction: Direction,
    pub decay_mode: DecayMode,
    pub sensor: SensorConfig,
    pub pwm: PwmConfig,
    /// Motor pole pairs (electrical revolutions per mechanical).
    pub pole_pairs: u8,

    // Setpoints.
    /// Induction target frequency, tenths of a hertz.
    pub target_frequency: u16,
    pub target_speed_rpm: u32,
    pub target_power_mw: u32,

    // Operating envelope.
    /// Tenths of a hertz.
    pub min_frequency: u16,
    pub max_frequency: u16,
    pub min_speed_rpm: u32,
    pub max_speed_rpm: u32,
    pub min_power_mw: u32,
    pub max_power_mw: u32,

    // Ramp rates: per-second in the unit of the controlled quantity.
    pub accel: u32,
    pub decel: u32,
    pub accel_power: u32,
    pub decel_power: u32,
    /// Motor current above which acceleration is throttled, mA.
    pub accel_current_ma: i32,
    /// Bus voltage above which deceleration is throttled, mV.
    pub decel_voltage_mv: u32,

    // Protection limits.
    pub min_current_ma: i32,
    pub max_current_ma: i32,
    /// Current above which the duty cycle is trimmed directly, mA. Zero
    /// disables the override.
    pub target_current_ma: i32,
    pub min_bus_mv: u32,
    pub max_bus_mv: u32,
    pub max_temperature_c: i16,

    // Controller gains, 16.16.
    pub freq_p: Gain,
    pub freq_i: Gain,
    pub speed_p: Gain,
    pub speed_i: Gain,
    pub power_p: Gain,
    pub power_i: Gain,

    // Bus compensation for sine amplitude.
    pub bus_comp: bool,
    pub nominal_bus_mv: u32,
    pub bus_comp_floor_mv: u32,

    pub precharge_ms: u32,
    pub dc_brake: DcBrakeConfig,
    pub dyn_brake: DynBrakeConfig,
    pub startup: StartupConfig,
    pub vf_curve: VfCurve,
}

impl DriveParameters {
    /// Defaults for a 230 V AC induction drive, V/f sine modulated.
    pub fn induction_defaults() -> DriveParameters {
        DriveParameters {
            motor_type: MotorType::InductionThreePhase,
            modulation: Modulation::Sine,
            control_mode: ControlMode::Speed,
            loop_mode: LoopMode::Open,
            direction: Direction::Forward,
            decay_mode: DecayMode::Slow,
            sensor: SensorConfig {
                sensor_type: SensorType::DigitalHall,
                polarity: SensorPolarity::ActiveHigh,
                encoder_present: true,
                encoder_lines: 999,
            },
            pwm: PwmConfig {
                frequency: PwmFrequency::Hz16k,
                dead_time: 85,
                update_rate: 0,
                min_pulse: 5,
            },
            pole_pairs: 1,
            target_frequency: 0,
            target_speed_rpm: 0,
            target_power_mw: 0,
            min_frequency: 10,
            max_frequency: 600,
            min_speed_rpm: 0,
            max_speed_rpm: 3600,
            min_power_mw: 0,
            max_power_mw: 0,
            accel: 10,
            decel: 10,
            accel_power: 0,
            decel_power: 0,
            accel_current_ma: 2_000,
            decel_voltage_mv: 380_000,
            min_current_ma: 0,
            max_current_ma: 3_000,
            target_current_ma: 0,
            min_bus_mv: 100_000,
            max_bus_mv: 400_000,
            max_temperature_c: 85,
            freq_p: Gain::from_bits(32768),
            freq_i: Gain::from_bits(256),
            speed_p: Gain::from_bits(0),
            speed_i: Gain::from_bits(0),
            power_p: Gain::from_bits(0),
            power_i: Gain::from_bits(0),
            bus_comp: true,
            nominal_bus_mv: 325_000,
            bus_comp_floor_mv: 260_000,
            precharge_ms: 3,
            dc_brake: DcBrakeConfig {
                enabled: false,
                voltage_mv: 20_000,
                time_ms: 2_000,
            },
            dyn_brake: DynBrakeConfig {
                enabled: false,
                on_mv: 380_000,
                off_mv: 360_000,
                max_ms: 60_000,
                cool_ms: 55_000,
            },
            startup: StartupConfig {
                start_voltage_mv: 0,
                end_voltage_mv: 0,
                start_rpm: 0,
                end_rpm: 0,
                ramp_ms: 1,
                align_ms: 1,
                bemf_skip_count: 3,
                restart_threshold_mv: 0,
            },
            vf_curve: VfCurve::linear(600 * 65536 / 10),
        }
    }

    /// Defaults for a 24 V sensorless BLDC drive.
    pub fn bldc_defaults() -> DriveParameters {
        let mut params = DriveParameters::induction_defaults();
        params.motor_type = MotorType::Brushless;
        params.modulation = Modulation::Sensorless;
        params.pole_pairs = 2;
        params.pwm.frequency = PwmFrequency::Hz20k;
        params.pwm.dead_time = 34;
        params.min_speed_rpm = 500;
        params.max_speed_rpm = 10_000;
        params.max_power_mw = 100_000;
        params.accel = 1_000;
        params.decel = 1_000;
        params.accel_power = 10_000;
        params.decel_power = 10_000;
        params.accel_current_ma = 4_000;
        params.decel_voltage_mv = 36_000;
        params.max_current_ma = 5_000;
        params.min_bus_mv = 10_000;
        params.max_bus_mv = 40_000;
        params.nominal_bus_mv = 24_000;
        params.bus_comp_floor_mv = 20_000;
        params.bus_comp = false;
        // 0.01 per unit error; the integrator clamp of 100 full-scale
        // units reaches exactly full duty at this I gain.
        params.speed_p = Gain::from_bits(655);
        params.speed_i = Gain::from_bits(655);
        params.power_p = Gain::from_bits(66);
        params.power_i = Gain::from_bits(655);
        params.startup = StartupConfig {
            start_voltage_mv: 1_200,
            end_voltage_mv: 4_800,
            start_rpm: 600,
            end_rpm: 2_400,
            ramp_ms: 1_000,
            align_ms: 500,
            bemf_skip_count: 3,
            restart_threshold_mv: 500,
        };
        params
    }
}

impl Default for DriveParameters {
    fn default() -> DriveParameters {
        DriveParameters::induction_defaults()
    }
}

/// Identifies a parameter whose change has side effects beyond the stored
/// value. One match arm per former update callback.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ParamId {
    PwmFrequency,
    DeadTime,
    MinPulseWidth,
    UpdateRate,
    TargetFrequency,
    TargetSpeed,
    TargetPower,
    Direction,
    FreqIGain,
    SpeedIGain,
    PowerIGain,
    MaxFrequency,
}

/// External persistence collaborator for the parameter record (a flash
/// parameter block on the real hardware).
pub trait ParamStore {
    type Error;

    fn load(&mut self) -> Result<DriveParameters, Self::Error>;
    fn save(&mut self, params: &DriveParameters) -> Result<(), Self::Error>;
}

/// RAM-backed store. The flash parameter-block driver lives with the UI
/// layer; the core only needs the load/save contract.
pub struct RamParamStore {
    saved: Option<DriveParameters>,
}

#[derive(Debug)]
pub struct NoSavedParams;

impl RamParamStore {
    pub fn new() -> RamParamStore {
        RamParamStore { saved: None }
    }
}

impl Default for RamParamStore {
    fn default() -> RamParamStore {
        RamParamStore::new()
    }
}

impl ParamStore for RamParamStore {
    type Error = NoSavedParams;

    fn load(&mut self) -> Result<DriveParameters, NoSavedParams> {
        self.saved.clone().ok_or(NoSavedParams)
    }

    fn save(&mut self, params: &DriveParameters) -> Result<(), NoSavedParams> {
        self.saved = Some(params.clone());
        Ok(())
    }
}
