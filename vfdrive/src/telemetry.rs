//! Read-only drive telemetry for the UI/host layers.

use crate::drive::state::MotorStatus;
use crate::drive::MotorDrive;
use crate::params::Direction;

/// One coherent snapshot of everything the operator surface reads.
/// Captured at housekeeping priority under the drive lock, then published
/// through a double-buffered cell so readers never contend with the
/// control interrupts.
#[derive(Clone, Copy, Debug)]
pub struct TelemetrySnapshot {
    pub status: MotorStatus,
    pub direction: Direction,
    pub fault_bits: u16,
    pub bus_mv: u32,
    pub temperature_c: i16,
    pub motor_ma: i32,
    pub phase_ma: [i32; 3],
    pub motor_mw: u32,
    /// Measured rotor speed, RPM.
    pub measured_rpm: u32,
    /// Present output in its native fixed-point format (16.16 Hz or
    /// 18.14 RPM/mW).
    pub output: u32,
    /// Present drive duty cycle, 16.16.
    pub duty_cycle: u32,
}

impl TelemetrySnapshot {
    pub fn capture(drive: &MotorDrive) -> TelemetrySnapshot {
        let m = drive.measurements();
        TelemetrySnapshot {
            status: drive.status(),
            direction: drive.state().direction,
            fault_bits: drive.faults().bits(),
            bus_mv: m.bus_mv,
            temperature_c: m.temperature_c,
            motor_ma: m.motor_ma,
            phase_ma: m.phase_ma,
            motor_mw: m.motor_mw,
            measured_rpm: drive.measured_speed(),
            output: drive.output(),
            duty_cycle: drive.duty_cycle(),
        }
    }
}

impl TelemetrySnapshot {
    /// Const-context initial value for the static published cell.
    pub const INIT: TelemetrySnapshot = TelemetrySnapshot {
        status: MotorStatus::Stopped,
        direction: Direction::Forward,
        fault_bits: 0,
        bus_mv: 0,
        temperature_c: 0,
        motor_ma: 0,
        phase_ma: [0; 3],
        motor_mw: 0,
        measured_rpm: 0,
        output: 0,
        duty_cycle: 0,
    };
}

impl Default for TelemetrySnapshot {
    fn default() -> TelemetrySnapshot {
        TelemetrySnapshot::INIT
    }
}
