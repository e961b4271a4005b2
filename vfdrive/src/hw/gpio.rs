//! GPIO assignments: hall inputs, encoder input, the brake resistor
//! switch, and the two indicator LEDs.
//!
//! Digital pin map (analog pins are listed in `hw::adc`):
//!   PB3  - RUN LED
//!   PB4  - ENC_A (EXTI4 for edge timing, TIM3_CH1/AF2 for edge counting)
//!   PB5  - FAULT LED
//!   PB6  - HALL_A (EXTI6)
//!   PB7  - HALL_B (EXTI7)
//!   PB8  - HALL_C (EXTI8)
//!   PC6  - BRAKE resistor switch (open drain, low = engaged)

use stm32g4::stm32g474 as device;

use crate::drive::brake::BrakeResistor;
use crate::led::IndicatorLed;

/// Configures the digital pins and the EXTI routing: both edges on the
/// hall lines, rising edges on the encoder input.
pub fn configure(
    gpiob: &device::GPIOB,
    gpioc: &device::GPIOC,
    exti: &device::EXTI,
    syscfg: &device::SYSCFG,
) {
    gpiob.moder.modify(|_, w| {
        w.moder3()
            .output()
            .moder4()
            .alternate()
            .moder5()
            .output()
            .moder6()
            .input()
            .moder7()
            .input()
            .moder8()
            .input()
    });
    // Encoder input doubles as the TIM3 external clock.
    gpiob.afrl.modify(|_, w| w.afrl4().af2());
    gpiob.pupdr.modify(|_, w| {
        w.pupdr4()
            .floating()
            .pupdr6()
            .pull_up()
            .pupdr7()
            .pull_up()
            .pupdr8()
            .pull_up()
    });

    gpioc.moder.modify(|_, w| w.moder6().output());
    gpioc.otyper.modify(|_, w| w.ot6().open_drain());
    // Brake released (open drain high) until told otherwise.
    gpioc.bsrr.write(|w| w.bs6().set_bit());

    // EXTI lines 4 and 6..8 come from port B: 0b001 in the matching
    // EXTICR nibbles (EXTI4 in CR2[3:0], EXTI6/7 in CR2[11:8]/[15:12],
    // EXTI8 in CR3[3:0]).
    // Safety: direct field composition of the documented nibble layout.
    syscfg
        .exticr2
        .modify(|r, w| unsafe { w.bits(r.bits() | 0x0000_1101) });
    syscfg
        .exticr3
        .modify(|r, w| unsafe { w.bits(r.bits() | 0x0000_0001) });

    // Rising edges on all four lines, falling edges on the halls too.
    // Safety: plain set-bit composition on lines 4 and 6..8.
    exti.rtsr1
        .modify(|r, w| unsafe { w.bits(r.bits() | HALL_LINES | ENCODER_LINE) });
    exti.ftsr1
        .modify(|r, w| unsafe { w.bits(r.bits() | HALL_LINES) });
    exti.imr1
        .modify(|r, w| unsafe { w.bits(r.bits() | HALL_LINES | ENCODER_LINE) });
}

/// EXTI line masks for the hall inputs (6..8) and the encoder input (4).
const HALL_LINES: u32 = (1 << 6) | (1 << 7) | (1 << 8);
const ENCODER_LINE: u32 = 1 << 4;

/// A clean 3-bit hall snapshot (A in bit 0) at interrupt time.
pub fn read_hall() -> u8 {
    // Safety: read-only input data register.
    let idr = unsafe { (*device::GPIOB::ptr()).idr.read().bits() };
    ((idr >> 6) & 0x07) as u8
}

/// Clears the pending EXTI lines for the hall inputs. Write-one-to-clear,
/// so only the named lines are affected.
pub fn clear_hall_pending() {
    // Safety: single atomic write to a w1c register.
    unsafe { (*device::EXTI::ptr()).pr1.write(|w| w.bits(HALL_LINES)) };
}

/// Clears the pending EXTI line for the encoder input.
pub fn clear_encoder_pending() {
    unsafe { (*device::EXTI::ptr()).pr1.write(|w| w.bits(ENCODER_LINE)) };
}

pub struct BrakePin {
    _private: (),
}

impl BrakePin {
    pub fn new() -> BrakePin {
        BrakePin { _private: () }
    }
}

impl BrakeResistor for BrakePin {
    fn engage(&mut self) {
        // Safety: BSRR is write-only and atomic.
        unsafe { (*device::GPIOC::ptr()).bsrr.write(|w| w.br6().set_bit()) };
    }

    fn release(&mut self) {
        unsafe { (*device::GPIOC::ptr()).bsrr.write(|w| w.bs6().set_bit()) };
    }
}

pub struct RunLed;
pub struct FaultLed;

impl IndicatorLed for RunLed {
    fn set(&mut self, on: bool) {
        unsafe {
            (*device::GPIOB::ptr()).bsrr.write(|w| match on {
                true => w.bs3().set_bit(),
                false => w.br3().set_bit(),
            })
        };
    }
}

impl IndicatorLed for FaultLed {
    fn set(&mut self, on: bool) {
        unsafe {
            (*device::GPIOB::ptr()).bsrr.write(|w| match on {
                true => w.bs5().set_bit(),
                false => w.br5().set_bit(),
            })
        };
    }
}

/// Forces every drive output off from a catastrophic-fault context, where
/// no lock can be taken. Clearing MOE is a single atomic write.
pub fn emergency_outputs_off() {
    unsafe {
        (*device::TIM1::ptr()).bdtr.modify(|_, w| w.moe().clear_bit());
    }
}
