//! Interrupt handlers and the state they share.
//!
//! Priority order (high to low): TIM1 update (PWM period) > ADC
//! end-of-sequence > hall/encoder EXTI and the commutation timer > the
//! waveform software interrupt > the millisecond software interrupt >
//! SysTick housekeeping > watchdog early wakeup. The two software
//! interrupts are pended from the TIM1 update handler, giving the state
//! machine deterministic latency relative to the PWM carrier.
//!
//! State is partitioned by writer: `DRIVE_VARS` belongs to the control
//! handlers (each one masking exactly the peers that could race it),
//! `ADC_VARS` only ever runs at ADC priority, and everything crossing
//! between the two goes through atomics or the double-buffered
//! measurement cell.

use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};

use ringbuffer::{RingBufferRead, RingBufferWrite};
use stm32g4::stm32g474::{self as device, interrupt};

use crate::command::{self, Command, CommandQueue};
use crate::drive::faults::Fault;
use crate::drive::state::Phase;
use crate::drive::MotorDrive;
use crate::hw;
use crate::hw::adc::{AdcMode, AdcSequencer};
use crate::hw::commutation_timer::CommutationTimerHandle;
use crate::hw::encoder_counter::EncoderCounter;
use crate::hw::gpio::{BrakePin, FaultLed, RunLed};
use crate::hw::pwm::{self, PwmDriver};
use crate::led::{fault_led_rate, run_led_rate, Blinker};
use crate::params::RamParamStore;
use crate::sensing::bemf::{BemfAction, BemfEstimator};
use crate::sensing::current::{BusSense, CurrentSense, TempSense};
use crate::sensing::linear_hall::LinearHall;
use crate::sensing::Measurements;
use crate::telemetry::TelemetrySnapshot;
use crate::util::buffered_state::BufferedState;
use crate::util::interrupts::{block_interrupts, clear_pending_irq, disable_irq, enable_irq, pend_irq};
use crate::util::spin_lock::{acquire, SpinLock};

/// Software interrupt line for the waveform update handler.
pub const WAVEFORM_IRQ: device::Interrupt = device::Interrupt::FMAC;
/// Software interrupt line for the millisecond tick handler.
pub const MILLISECOND_IRQ: device::Interrupt = device::Interrupt::CRS;

/// Every interrupt that touches `DRIVE_VARS`, highest priority first.
/// A toucher masks the entries above its own priority before locking.
const DRIVE_TOUCHERS: [device::Interrupt; 5] = [
    device::Interrupt::EXTI4,
    device::Interrupt::EXTI9_5,
    device::Interrupt::TIM2,
    WAVEFORM_IRQ,
    MILLISECOND_IRQ,
];

pub struct DriveVars {
    pub drive: MotorDrive,
    pub pwm: PwmDriver,
    pub brake_pin: BrakePin,
    pub timer: CommutationTimerHandle,
    pub store: RamParamStore,
}

pub struct AdcVars {
    pub seq: AdcSequencer,
    pub current: CurrentSense,
    pub bus: BusSense,
    pub temp: TempSense,
    pub bemf: BemfEstimator,
    pub linear: LinearHall,
    pub timer: CommutationTimerHandle,
    /// The PWM enable mask the sequence is currently pointed at.
    pub last_enable: u8,
    /// Drive running state at the previous batch, to re-arm the
    /// first-edge skip flags across a stop.
    pub last_running: bool,
    /// Drive angle at the previous batch, for the sine half-cycle window.
    pub prev_angle: u32,
    pub bemf_skip_reload: u8,
    pub pole_pairs: u32,
    pub single_phase: bool,
}

pub struct HousekeepingVars {
    pub run_led: Blinker,
    pub fault_led: Blinker,
    pub encoder_counter: EncoderCounter,
    pub window_divider: u8,
}

pub static DRIVE_VARS: SpinLock<Option<DriveVars>> = SpinLock::new(None);
pub static ADC_VARS: SpinLock<Option<AdcVars>> = SpinLock::new(None);
pub static HOUSEKEEPING: SpinLock<Option<HousekeepingVars>> = SpinLock::new(None);
pub static COMMAND_QUEUE: SpinLock<Option<CommandQueue>> = SpinLock::new(None);

/// Last committed measurement batch, ADC writer, everyone else reads.
pub static MEASUREMENTS: BufferedState<Measurements> = BufferedState::new(Measurements::ZERO);
/// Operator-facing snapshot, housekeeping writer.
pub static TELEMETRY: BufferedState<TelemetrySnapshot> =
    BufferedState::new(TelemetrySnapshot::INIT);

/// The hall value the next commutation-timer expiry applies.
static NEXT_COMMUTATION: AtomicU8 = AtomicU8::new(0);
/// Mirror of the drive phase for the ADC path (no lock crossing).
static DRIVE_PHASE: AtomicU8 = AtomicU8::new(0);
static DRIVE_REVERSE: AtomicBool = AtomicBool::new(false);
/// Mirror of the drive duty cycle for the power estimate.
static DUTY_Q16: AtomicU32 = AtomicU32::new(0);
/// Drive angle published by the waveform handler for the ADC current
/// windows.
static ANGLE_Q32: AtomicU32 = AtomicU32::new(0);

/// Queues a command from any context; the housekeeping tick drains and
/// dispatches.
pub fn submit(command: Command) {
    cortex_m::interrupt::free(|_| {
        acquire(&COMMAND_QUEUE, |queue| queue.push(command));
    });
}

/// Runs `f` against the drive with every control interrupt masked; the
/// thread-context equivalent of a command dispatch.
pub fn with_drive<R>(f: impl FnOnce(&mut MotorDrive, &mut PwmDriver) -> R) -> R {
    block_interrupts(&DRIVE_TOUCHERS, &DRIVE_VARS, |vars| {
        let DriveVars {
            ref mut drive,
            ref mut pwm,
            ..
        } = *vars;
        let result = f(drive, pwm);
        publish_drive_state(drive);
        result
    })
}

fn publish_drive_state(drive: &MotorDrive) {
    let phase = match drive.state().phase {
        Phase::Stopped => 0,
        Phase::Precharge => 1,
        Phase::Startup => 2,
        Phase::Run => 3,
        Phase::Stopping => 4,
        Phase::Reversing => 5,
        Phase::Braking => 6,
    };
    DRIVE_PHASE.store(phase, Ordering::Relaxed);
    DRIVE_REVERSE.store(drive.state().is_reverse(), Ordering::Relaxed);
    DUTY_Q16.store(drive.duty_cycle(), Ordering::Relaxed);
}

// ---------------------------------------------------------------------
// PWM period interrupt: the clock everything else derives from.

#[interrupt]
fn TIM1_UP_TIM16() {
    PwmDriver::clear_update_flag();
    clear_pending_irq(device::Interrupt::TIM1_UP_TIM16);

    let events = pwm::period_elapsed();
    if events.waveform_update {
        pend_irq(WAVEFORM_IRQ);
    }
    if events.millisecond {
        pend_irq(MILLISECOND_IRQ);
    }
}

// ---------------------------------------------------------------------
// ADC end-of-sequence: estimator updates and commutation scheduling.

#[interrupt]
fn ADC1_2() {
    clear_pending_irq(device::Interrupt::ADC1_2);
    let now = hw::timestamp();

    acquire(&ADC_VARS, |vars| {
        let phase = DRIVE_PHASE.load(Ordering::Relaxed);
        let running = phase != 0;
        let reverse = DRIVE_REVERSE.load(Ordering::Relaxed);

        // Coming out of a stop the previous edge timestamps mean nothing;
        // every estimator discards its first interval.
        if running != vars.last_running {
            vars.last_running = running;
            if running {
                vars.bemf.invalidate();
                vars.linear.invalidate();
            }
        }

        // A commutation since the last batch re-points the six-step
        // sequence; the interrupted sample period is skipped.
        if vars.seq.mode() == AdcMode::SixStep {
            let enable = pwm::phase_enable_mask();
            if enable != vars.last_enable {
                vars.last_enable = enable;
                if has_floating_phase(enable) {
                    let floating =
                        vars.bemf.phase_change(enable, reverse, vars.bemf_skip_reload);
                    vars.current.select_phase(enable);
                    vars.seq.set_commutation_window(floating, current_phase(enable));
                }
                return;
            }
        }

        let batch = match vars.seq.read_batch() {
            Ok(batch) => batch,
            // Overrun already recovered by flush and re-arm.
            Err(_) => return,
        };

        let mut measurements = MEASUREMENTS.read();
        match vars.seq.mode() {
            AdcMode::Induction => {
                measurements.bus_mv = vars.bus.update(batch[3]);
                measurements.temperature_c = vars.temp.update(batch[4]);

                if running {
                    vars.current.sample_phases(&[batch[0], batch[1], batch[2]]);
                    let angle = ANGLE_Q32.load(Ordering::Relaxed);
                    if vars.current.angle_rollover(angle, vars.prev_angle) {
                        vars.current.half_cycle_rollover(vars.single_phase);
                    }
                    vars.prev_angle = angle;
                } else {
                    vars.current.clear();
                }
            }
            AdcMode::SixStep => {
                measurements.bus_mv = vars.bus.update(batch[2]);
                measurements.temperature_c = vars.temp.update(batch[3]);

                if running {
                    let duty = DUTY_Q16.load(Ordering::Relaxed);
                    vars.current.rollover(measurements.bus_mv, duty);
                    vars.current.sample(batch[1]);

                    // Precharge and startup observe crossings for speed but
                    // leave commutation to the open-loop timer.
                    let closed_loop = phase >= 3;
                    match vars.bemf.sample(
                        batch[0],
                        vars.bus.count(),
                        now,
                        closed_loop,
                        vars.pole_pairs,
                        pwm::pwm_period_ticks(),
                    ) {
                        BemfAction::Schedule { ticks } => {
                            NEXT_COMMUTATION.store(vars.bemf.next_hall(), Ordering::Relaxed);
                            vars.timer.schedule(ticks);
                        }
                        BemfAction::None => {
                            NEXT_COMMUTATION.store(vars.bemf.next_hall(), Ordering::Relaxed);
                        }
                    }
                } else {
                    vars.current.clear();
                    vars.bemf.idle_sample(batch[0]);
                }
            }
            AdcMode::LinearHall => {
                measurements.bus_mv = vars.bus.update(batch[4]);
                measurements.temperature_c = vars.temp.update(batch[5]);

                if running {
                    let duty = DUTY_Q16.load(Ordering::Relaxed);
                    vars.current.rollover(measurements.bus_mv, duty);
                    vars.current.sample(batch[0]);

                    let linear_raw = [batch[1], batch[2], batch[3]];
                    if let Some(hall) = vars.linear.process(&linear_raw, now, vars.pole_pairs)
                    {
                        NEXT_COMMUTATION.store(hall, Ordering::Relaxed);
                        vars.timer.schedule(1);
                    }
                } else {
                    vars.current.clear();
                }
            }
        }

        measurements.motor_ma = vars.current.motor_ma();
        measurements.motor_mw = vars.current.motor_mw();
        measurements.phase_ma = vars.current.phase_ma();
        measurements.bemf_rpm = vars.bemf.speed();
        measurements.linear_rpm = vars.linear.speed();
        measurements.bemf_mv = vars.bemf.bemf_mv();
        MEASUREMENTS.publish(measurements);
    });
}

/// Whether a six-step enable mask leaves exactly one phase floating.
fn has_floating_phase(enable: u8) -> bool {
    (enable & 0x03 == 0) as u8 + (enable & 0x0C == 0) as u8 + (enable & 0x30 == 0) as u8 == 1
}

/// Which phase's shunt carries measurable current for an enable mask.
fn current_phase(enable: u8) -> usize {
    if enable & 0x02 != 0 {
        0
    } else if enable & 0x08 != 0 {
        1
    } else {
        2
    }
}

// ---------------------------------------------------------------------
// Hall and encoder edges.

#[interrupt]
fn EXTI9_5() {
    hw::gpio::clear_hall_pending();
    clear_pending_irq(device::Interrupt::EXTI9_5);

    let raw = hw::gpio::read_hall();
    let now = hw::timestamp();
    acquire(&DRIVE_VARS, |vars| {
        vars.drive.hall_edge(raw, now, &mut vars.pwm);
    });
}

#[interrupt]
fn EXTI4() {
    hw::gpio::clear_encoder_pending();
    clear_pending_irq(device::Interrupt::EXTI4);

    let now = hw::timestamp();
    acquire(&DRIVE_VARS, |vars| {
        if vars.drive.encoder_edge(now) {
            // Too fast for per-edge interrupts; the hardware counter and
            // the velocity window take over.
            disable_irq(device::Interrupt::EXTI4);
        }
    });
}

// ---------------------------------------------------------------------
// Commutation timer expiry.

#[interrupt]
fn TIM2() {
    clear_pending_irq(device::Interrupt::TIM2);
    acquire(&DRIVE_VARS, |vars| {
        vars.timer.clear_expired();
        let next_hall = NEXT_COMMUTATION.load(Ordering::Relaxed);
        let DriveVars {
            ref mut drive,
            ref mut pwm,
            ref mut timer,
            ..
        } = *vars;
        drive.commutation_tick(next_hall, pwm, timer);
    });
}

// ---------------------------------------------------------------------
// Waveform update software interrupt.

#[interrupt]
fn FMAC() {
    clear_pending_irq(WAVEFORM_IRQ);
    block_interrupts(&DRIVE_TOUCHERS[..3], &DRIVE_VARS, |vars| {
        vars.drive.waveform_tick(&mut vars.pwm);
        ANGLE_Q32.store(vars.drive.angle().0, Ordering::Relaxed);
    });
}

// ---------------------------------------------------------------------
// Millisecond tick software interrupt.

#[interrupt]
fn CRS() {
    clear_pending_irq(MILLISECOND_IRQ);
    let measurements = MEASUREMENTS.read();

    block_interrupts(&DRIVE_TOUCHERS[..4], &DRIVE_VARS, |vars| {
        let effects =
            vars.drive
                .millisecond_tick(&measurements, &mut vars.pwm, &mut vars.brake_pin);

        if effects.kick_start_hall {
            let raw = hw::gpio::read_hall();
            vars.drive.hall_edge(raw, hw::timestamp(), &mut vars.pwm);
        }
        if effects.kick_start_commutation {
            let next_hall = NEXT_COMMUTATION.load(Ordering::Relaxed);
            let DriveVars {
                ref mut drive,
                ref mut pwm,
                ref mut timer,
                ..
            } = *vars;
            drive.commutation_tick(next_hall, pwm, timer);
        }

        publish_drive_state(&vars.drive);
    });

    hw::watchdog::punch();
}

// ---------------------------------------------------------------------
// Housekeeping.

#[cortex_m_rt::exception]
fn SysTick() {
    housekeeping_tick();
}

/// SysTick housekeeping at 1 kHz: command dispatch, indicator blinking,
/// sensor timeouts, the 50 Hz encoder velocity window, and telemetry
/// publication.
pub fn housekeeping_tick() {
    while let Some(command) =
        cortex_m::interrupt::free(|_| acquire(&COMMAND_QUEUE, |queue| queue.dequeue()))
    {
        block_interrupts(&DRIVE_TOUCHERS, &DRIVE_VARS, |vars| {
            let DriveVars {
                ref mut drive,
                ref mut pwm,
                ref mut store,
                ..
            } = *vars;
            command::dispatch(command, drive, pwm, store);
            publish_drive_state(drive);
        });
    }

    acquire(&HOUSEKEEPING, |house| {
        house.window_divider += 1;
        let window_expired = house.window_divider >= 20;
        if window_expired {
            house.window_divider = 0;
        }
        let window_count = if window_expired {
            Some(house.encoder_counter.take_window_count())
        } else {
            None
        };

        block_interrupts(&DRIVE_TOUCHERS, &DRIVE_VARS, |vars| {
            vars.drive.housekeeping_tick(hw::timestamp());
            if let Some(count) = window_count {
                if vars.drive.encoder_window(count) {
                    enable_irq(device::Interrupt::EXTI4);
                }
            }
            TELEMETRY.publish(TelemetrySnapshot::capture(&vars.drive));
            house
                .run_led
                .set_rate(run_led_rate(vars.drive.state().phase));
            house
                .fault_led
                .set_rate(fault_led_rate(vars.drive.faults().bits()));
        });

        house.run_led.tick(&mut RunLed);
        house.fault_led.tick(&mut FaultLed);
    });
}

// ---------------------------------------------------------------------
// Power module fault: the gate driver pulled the break input. Hardware
// has already disabled the outputs; this latches the sticky fault.

#[interrupt]
fn TIM1_BRK_TIM15() {
    PwmDriver::clear_break_flag();
    clear_pending_irq(device::Interrupt::TIM1_BRK_TIM15);

    block_interrupts(&DRIVE_TOUCHERS, &DRIVE_VARS, |vars| {
        vars.drive.fault_stop(Fault::PowerModule, &mut vars.pwm);
        publish_drive_state(&vars.drive);
    });
}

// ---------------------------------------------------------------------
// Watchdog early wakeup: latch the fault and kill the outputs before the
// reset lands.

#[interrupt]
fn WWDG() {
    hw::watchdog::clear_early_wakeup();
    clear_pending_irq(device::Interrupt::WWDG);

    hw::gpio::emergency_outputs_off();
    block_interrupts(&DRIVE_TOUCHERS, &DRIVE_VARS, |vars| {
        vars.drive.fault_stop(Fault::Watchdog, &mut vars.pwm);
        publish_drive_state(&vars.drive);
    });
}
