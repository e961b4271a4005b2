//! Three-phase PWM generation on TIM1.
//!
//! The timer runs center-aligned with a repetition count of one, so the
//! update interrupt fires once per full up/down carrier period. That
//! interrupt is the clock the rest of the control system derives from:
//! it counts periods for the waveform-update cadence and accumulates the
//! millisecond tick.

use core::sync::atomic::{AtomicU32, AtomicU8, Ordering};

use paste::paste;
use stm32g4::stm32g474 as device;

use crate::drive::PwmControl;
use crate::modulation::{PhaseDrive, PhaseEnable};
use crate::params::{DecayMode, PwmFrequency};
use crate::SYSTEM_CLOCK;

/// PWM periods elapsed since the waveform handler last drained them.
static PERIOD_COUNT: AtomicU32 = AtomicU32::new(0);
/// Accumulates 1000 per period; one millisecond when it reaches the PWM
/// frequency.
static MS_ACCUMULATOR: AtomicU32 = AtomicU32::new(0);
/// The active PWM carrier frequency in Hz.
static PWM_HZ: AtomicU32 = AtomicU32::new(20_000);
/// Waveform updates run every `UPDATE_RATE + 1` periods.
static UPDATE_RATE: AtomicU8 = AtomicU8::new(0);
/// The live phase-enable mask, (high, low) bit pairs per phase. Read from
/// the ADC path to track commutation windows.
static PHASE_ENABLE: AtomicU8 = AtomicU8::new(0);

/// What the period interrupt wants pended after bookkeeping.
pub struct PeriodEvents {
    pub waveform_update: bool,
    pub millisecond: bool,
}

/// Period-interrupt bookkeeping; called (only) from the TIM1 update ISR.
pub fn period_elapsed() -> PeriodEvents {
    let count = PERIOD_COUNT.fetch_add(1, Ordering::Relaxed) + 1;
    let update = UPDATE_RATE.load(Ordering::Relaxed) as u32 + 1;

    // 1000 per period means the accumulator crosses the PWM frequency
    // exactly once per millisecond, for any supported frequency.
    let hz = PWM_HZ.load(Ordering::Relaxed);
    let accumulated = MS_ACCUMULATOR.fetch_add(1000, Ordering::Relaxed) + 1000;
    let millisecond = accumulated >= hz;
    if millisecond {
        MS_ACCUMULATOR.fetch_sub(hz, Ordering::Relaxed);
    }

    PeriodEvents {
        waveform_update: count >= update,
        millisecond,
    }
}

/// The published phase-enable mask, for the ADC path.
pub fn phase_enable_mask() -> u8 {
    PHASE_ENABLE.load(Ordering::Relaxed)
}

pub fn pwm_period_ticks() -> u32 {
    SYSTEM_CLOCK / PWM_HZ.load(Ordering::Relaxed)
}

fn store_update_rate(rate: u8) {
    UPDATE_RATE.store(rate, Ordering::Relaxed);
}

pub struct PwmDriver {
    tim1: device::TIM1,
    arr: u16,
    min_pulse_ticks: u32,
}

/// Writes one phase's compare register with the pulse width clamped to
/// the minimum width: a too-short high pulse pins the output low, a
/// too-short low pulse pins it high.
macro_rules! write_compare {
    ($self:ident, $channel:literal, $duty:expr) => {
        paste! {
            let mut width = (($duty as u64 * $self.arr as u64) >> 16) as u32;
            if width > $self.arr as u32 {
                width = $self.arr as u32;
            }
            if width < $self.min_pulse_ticks {
                width = $self.min_pulse_ticks;
            }
            if ($self.arr as u32 - width) < $self.min_pulse_ticks {
                width = $self.arr as u32 - $self.min_pulse_ticks;
            }
            $self.tim1.[<ccr $channel>].write(|w| w.[<ccr $channel>]().bits(width as u16));
        }
    };
}

impl PwmDriver {
    pub fn new(tim1: device::TIM1) -> PwmDriver {
        let mut driver = PwmDriver {
            tim1,
            arr: 0,
            min_pulse_ticks: 1,
        };
        driver.configure();
        driver
    }

    fn configure(&mut self) {
        let tim1 = &self.tim1;
        tim1.cr1.modify(|_, w| w.cen().clear_bit());

        // Center-aligned, interrupts on the up count only; the repetition
        // counter makes the update event fire once per full carrier
        // period.
        tim1.cr1
            .modify(|_, w| w.dir().up().cms().center_aligned2().ckd().div1());
        // Safety: upstream SVD carries no range for REP; 16-bit value.
        tim1.rcr.write(|w| unsafe { w.rep().bits(1) });

        // All three channels PWM mode 1, preloaded compare so duty updates
        // land on period boundaries.
        tim1.ccmr1_output().modify(|_, w| {
            w.cc1s()
                .output()
                .oc1m()
                .pwm_mode1()
                .oc1pe()
                .set_bit()
                .cc2s()
                .output()
                .oc2m()
                .pwm_mode1()
                .oc2pe()
                .set_bit()
        });
        tim1.ccmr2_output().modify(|_, w| {
            w.cc3s().output().oc3m().pwm_mode1().oc3pe().set_bit()
        });

        // Outputs idle low on both sides of the bridge.
        tim1.cr2.modify(|_, w| {
            w.ois1()
                .clear_bit()
                .ois1n()
                .clear_bit()
                .ois2()
                .clear_bit()
                .ois2n()
                .clear_bit()
                .ois3()
                .clear_bit()
                .ois3n()
                .clear_bit()
        });

        tim1.ccr1.write(|w| w.ccr1().bits(0));
        tim1.ccr2.write(|w| w.ccr2().bits(0));
        tim1.ccr3.write(|w| w.ccr3().bits(0));

        // The gate driver's fault line feeds the break input: hardware
        // kills the outputs, the break interrupt latches the fault.
        tim1.bdtr.modify(|_, w| w.bke().set_bit());
        tim1.dier.modify(|_, w| w.uie().set_bit().bie().set_bit());
        tim1.cr1.modify(|_, w| w.cen().set_bit());
    }

    /// Acknowledges a break event; called from the TIM1 break ISR.
    pub fn clear_break_flag() {
        // Safety: read-modify-write, other flags left pending.
        unsafe { (*device::TIM1::ptr()).sr.modify(|_, w| w.bif().clear_bit()) };
    }

    /// Acknowledges the update interrupt; called from the TIM1 update ISR
    /// through the raw pointer since the driver is owned elsewhere.
    pub fn clear_update_flag() {
        // Safety: read-modify-write of the status register; other flags
        // are rc_w0 and writing them back as one leaves them pending.
        unsafe { (*device::TIM1::ptr()).sr.modify(|_, w| w.uif().clear_bit()) };
    }

    /// Per-phase channel enables for a six-step pattern. A `High` phase
    /// carries PWM (complementary in fast decay), a `Low` phase holds its
    /// low-side switch on by forcing the main output inactive, a floating
    /// phase is disconnected.
    fn apply_trapezoid(&mut self, drive: PhaseEnable, decay: DecayMode) {
        let tim1 = &self.tim1;
        let complementary = decay == DecayMode::Fast;

        let mode = |phase: PhaseDrive| match phase {
            // (main enable, complement enable, forced)
            PhaseDrive::High => (true, complementary, false),
            PhaseDrive::Low => (false, true, true),
            PhaseDrive::Float => (false, false, false),
        };
        let (e1, n1, f1) = mode(drive.0[0]);
        let (e2, n2, f2) = mode(drive.0[1]);
        let (e3, n3, f3) = mode(drive.0[2]);

        tim1.ccmr1_output().modify(|_, w| {
            let w = if f1 {
                w.oc1m().force_inactive()
            } else {
                w.oc1m().pwm_mode1()
            };
            if f2 {
                w.oc2m().force_inactive()
            } else {
                w.oc2m().pwm_mode1()
            }
        });
        tim1.ccmr2_output().modify(|_, w| {
            if f3 {
                w.oc3m().force_inactive()
            } else {
                w.oc3m().pwm_mode1()
            }
        });
        tim1.ccer.modify(|_, w| {
            w.cc1e()
                .bit(e1 || f1)
                .cc1ne()
                .bit(n1)
                .cc2e()
                .bit(e2 || f2)
                .cc2ne()
                .bit(n2)
                .cc3e()
                .bit(e3 || f3)
                .cc3ne()
                .bit(n3)
        });
        tim1.bdtr.modify(|_, w| w.moe().set_bit());
    }

    fn enable_all_outputs(&mut self) {
        self.tim1.ccmr1_output().modify(|_, w| {
            w.oc1m().pwm_mode1().oc2m().pwm_mode1()
        });
        self.tim1
            .ccmr2_output()
            .modify(|_, w| w.oc3m().pwm_mode1());
        self.tim1.ccer.modify(|_, w| {
            w.cc1e()
                .set_bit()
                .cc1ne()
                .set_bit()
                .cc2e()
                .set_bit()
                .cc2ne()
                .set_bit()
                .cc3e()
                .set_bit()
                .cc3ne()
                .set_bit()
        });
        self.tim1.bdtr.modify(|_, w| w.moe().set_bit());
    }
}

impl PwmControl for PwmDriver {
    fn set_duty_cycle(&mut self, duty_u: u32, duty_v: u32, duty_w: u32) {
        write_compare!(self, 1, duty_u);
        write_compare!(self, 2, duty_v);
        write_compare!(self, 3, duty_w);
    }

    fn set_frequency(&mut self, frequency: PwmFrequency) {
        // Center-aligned counting halves the effective carrier rate.
        self.arr = (SYSTEM_CLOCK / (2 * frequency.hertz())) as u16;
        self.tim1.arr.write(|w| w.arr().bits(self.arr));
        PWM_HZ.store(frequency.hertz(), Ordering::Relaxed);
        MS_ACCUMULATOR.store(0, Ordering::Relaxed);
    }

    fn set_update_rate(&mut self, rate: u8) {
        store_update_rate(rate);
    }

    fn set_dead_band(&mut self, dead_time: u8, min_pulse: u8) {
        // Safety: DTG accepts the full 8-bit range.
        self.tim1
            .bdtr
            .modify(|_, w| unsafe { w.dtg().bits(dead_time) });

        // Minimum pulse in timer ticks: the dead band eats into every
        // pulse, and the configured floor is in 100 ns units.
        let ns_per_tick = 1_000 / (SYSTEM_CLOCK / 1_000_000);
        self.min_pulse_ticks =
            dead_time as u32 + (min_pulse as u32 * 100) / ns_per_tick + u32::from(min_pulse == 0);
    }

    fn output_on(&mut self) {
        self.enable_all_outputs();
        PHASE_ENABLE.store(0x3F, Ordering::Relaxed);
    }

    fn output_off(&mut self) {
        self.tim1.bdtr.modify(|_, w| w.moe().clear_bit());
        PHASE_ENABLE.store(0, Ordering::Relaxed);
    }

    fn output_precharge(&mut self) {
        // Force every main output inactive: the complementary outputs hold
        // all three low sides on, charging the bootstrap capacitors.
        self.apply_trapezoid(
            PhaseEnable([PhaseDrive::Low, PhaseDrive::Low, PhaseDrive::Low]),
            DecayMode::Slow,
        );
        PHASE_ENABLE.store(0x2A, Ordering::Relaxed);
    }

    fn output_dc_brake(&mut self, duty: u32) {
        self.enable_all_outputs();
        self.set_duty_cycle(duty, 0, 0);
        PHASE_ENABLE.store(0x3F, Ordering::Relaxed);
    }

    fn output_trapezoid(&mut self, drive: PhaseEnable, decay: DecayMode) {
        self.apply_trapezoid(drive, decay);
        PHASE_ENABLE.store(drive.enable_mask(), Ordering::Relaxed);
    }

    fn period_count(&self) -> u32 {
        PERIOD_COUNT.load(Ordering::Relaxed)
    }

    fn reduce_period_count(&mut self, count: u32) {
        PERIOD_COUNT.fetch_sub(count, Ordering::Relaxed);
    }
}
