//! Windowed watchdog, punched from the millisecond control path.
//!
//! The early-wakeup interrupt fires one count before the reset boundary;
//! its handler kills the outputs and latches the watchdog fault so the
//! failure is visible after the (likely) reset that follows.

use stm32g4::stm32g474 as device;

const RELOAD: u8 = 0x7F;

pub fn init(rcc: &device::RCC, wwdg: &device::WWDG) {
    rcc.apb1enr1.modify(|_, w| w.wwdgen().set_bit());

    // Slowest tick (PCLK/4096/128) stretches the window as far as the
    // hardware allows; the millisecond punch has margin either way.
    // Safety: WDGTB/T/W fields take the full programmed ranges.
    wwdg.cfr
        .modify(|_, w| unsafe { w.wdgtb().bits(0b111).w().bits(RELOAD) });
    wwdg.cfr.modify(|_, w| w.ewi().set_bit());
    wwdg.cr
        .modify(|_, w| unsafe { w.wdga().set_bit().t().bits(RELOAD) });
}

/// Reloads the counter; called once per millisecond tick while the
/// control loop is alive.
pub fn punch() {
    // Safety: single atomic register write.
    unsafe {
        (*device::WWDG::ptr()).cr.modify(|_, w| w.t().bits(RELOAD));
    }
}

/// Acknowledges the early-wakeup interrupt.
pub fn clear_early_wakeup() {
    unsafe {
        (*device::WWDG::ptr()).sr.modify(|_, w| w.ewif().clear_bit());
    }
}
