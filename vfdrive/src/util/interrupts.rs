//! Interrupt-masking critical sections.
//!
//! The concurrency rule is "mask exactly the interrupt sources that can
//! race with you, never a global lock": each shared cell lists the IRQs
//! that touch it, and any other context masks those around its access.

use cortex_m::interrupt::InterruptNumber;
use cortex_m::peripheral::NVIC;

use super::spin_lock::SpinLock;

pub fn disable_irq<I: InterruptNumber>(irq: I) {
    NVIC::mask(irq);
}

pub fn enable_irq<I: InterruptNumber>(irq: I) {
    // Safety: unmasking is only unsound inside a mask-based critical
    // section; all call sites are plain init or restore paths.
    unsafe { NVIC::unmask(irq) };
}

pub fn clear_pending_irq<I: InterruptNumber>(irq: I) {
    NVIC::unpend(irq);
}

/// Pends an interrupt in software: how the PWM period handler synthesizes
/// the waveform-update and millisecond interrupts.
pub fn pend_irq<I: InterruptNumber>(irq: I) {
    NVIC::pend(irq);
}

/// Runs `f` with `irq` masked, restoring its previous enable state after.
pub fn masked<I: InterruptNumber + Copy, R>(irq: I, f: impl FnOnce() -> R) -> R {
    let was_enabled = NVIC::is_enabled(irq);
    NVIC::mask(irq);
    cortex_m::asm::dsb();
    let result = f();
    if was_enabled {
        unsafe { NVIC::unmask(irq) };
    }
    result
}

/// Runs `f` with every IRQ in `irqs` masked.
pub fn masked_all<I: InterruptNumber + Copy, R>(irqs: &[I], f: impl FnOnce() -> R) -> R {
    let mut enabled = [false; 8];
    for (index, irq) in irqs.iter().enumerate() {
        enabled[index] = NVIC::is_enabled(*irq);
        NVIC::mask(*irq);
    }
    cortex_m::asm::dsb();
    let result = f();
    for (index, irq) in irqs.iter().enumerate() {
        if enabled[index] {
            unsafe { NVIC::unmask(*irq) };
        }
    }
    result
}

/// Locks state shared with a single interrupt handler: masks the IRQ,
/// takes the (necessarily uncontended) lock, and restores on the way out.
pub fn block_interrupt<I: InterruptNumber + Copy, T, R>(
    irq: I,
    lock: &SpinLock<Option<T>>,
    f: impl FnOnce(&mut T) -> R,
) -> R {
    masked(irq, || super::spin_lock::acquire(lock, f))
}

/// The same for state touched from several interrupt levels.
pub fn block_interrupts<I: InterruptNumber + Copy, T, R>(
    irqs: &[I],
    lock: &SpinLock<Option<T>>,
    f: impl FnOnce(&mut T) -> R,
) -> R {
    masked_all(irqs, || super::spin_lock::acquire(lock, f))
}
