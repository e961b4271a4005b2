//! The command surface exposed to the UI/host layers.
//!
//! Commands arrive from interrupt context (serial, button) and are queued
//! through a ring buffer, then drained and dispatched at housekeeping
//! priority with the update interrupts masked. Invalid commands (run while
//! faulted, load while running) are silently dropped; callers observe the
//! effect through telemetry.

use ringbuffer::ConstGenericRingBuffer;

use crate::drive::faults::Fault;
use crate::drive::{MotorDrive, PwmControl};
use crate::params::ParamStore;

pub const QUEUE_DEPTH: usize = 8;

pub type CommandQueue = ConstGenericRingBuffer<Command, QUEUE_DEPTH>;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Command {
    Run,
    Stop,
    EmergencyStop,
    SetDirection { forward: bool },
    /// Tenths of a hertz.
    SetTargetFrequency(u16),
    /// RPM.
    SetTargetSpeed(u32),
    /// Milliwatts.
    SetTargetPower(u32),
    ClearFaults,
    LoadParams,
    SaveParams,
}

/// Applies one command to the drive. The caller holds the drive lock with
/// the update interrupts already masked.
pub fn dispatch<S: ParamStore>(
    command: Command,
    drive: &mut MotorDrive,
    pwm: &mut impl PwmControl,
    store: &mut S,
) {
    match command {
        Command::Run => drive.run(pwm),
        Command::Stop => drive.stop(pwm),
        Command::EmergencyStop => drive.fault_stop(Fault::EmergencyStop, pwm),
        Command::SetDirection { forward } => drive.set_direction(forward),
        Command::SetTargetFrequency(tenth_hz) => drive.set_target_frequency(tenth_hz),
        Command::SetTargetSpeed(rpm) => drive.set_target_speed(rpm),
        Command::SetTargetPower(mw) => drive.set_target_power(mw),
        Command::ClearFaults => drive.clear_faults(),
        Command::LoadParams => {
            // Restoring a parameter record under a live drive would yank
            // PI gains and limits out from under the control loop.
            if drive.is_running() {
                return;
            }
            if let Ok(params) = store.load() {
                drive.params = params;
            }
        }
        Command::SaveParams => {
            let _ = store.save(&drive.params);
        }
    }
}
