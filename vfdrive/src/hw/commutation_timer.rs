//! One-shot commutation timer on TIM2.
//!
//! Both the ADC path (scheduling the next BEMF-derived commutation) and
//! the timer's own handler (re-arming the open-loop startup step) program
//! the delay, from different interrupt levels. The handle therefore works
//! through the fixed register block rather than an owned peripheral;
//! individual register writes are atomic and the two writers are
//! serialized by the NVIC.

use stm32g4::stm32g474 as device;

use crate::drive::CommutationTimer;

#[derive(Clone, Copy)]
pub struct CommutationTimerHandle {
    _private: (),
}

/// Configures TIM2 as a one-pulse down-counting timer and returns the
/// first handle. Consumes the peripheral so nothing else re-configures it.
pub fn take(tim2: device::TIM2) -> CommutationTimerHandle {
    tim2.cr1.modify(|_, w| w.cen().clear_bit());
    // One-pulse mode, update interrupt only on overflow, not on arming.
    tim2.cr1.modify(|_, w| w.opm().set_bit().urs().set_bit());
    tim2.psc.write(|w| w.psc().bits(0));
    tim2.dier.modify(|_, w| w.uie().set_bit());
    CommutationTimerHandle { _private: () }
}

impl CommutationTimerHandle {
    fn tim2(&self) -> &device::tim2::RegisterBlock {
        // Safety: `take` configured the block; handles only touch ARR,
        // CNT, CR1 and SR, each a single atomic register access.
        unsafe { &*device::TIM2::ptr() }
    }

    /// Acknowledges the one-shot expiry; called from the TIM2 ISR.
    pub fn clear_expired(&self) {
        self.tim2().sr.modify(|_, w| w.uif().clear_bit());
    }
}

impl CommutationTimer for CommutationTimerHandle {
    /// Arms (or re-arms) the one-shot for `ticks` system clocks from now.
    fn schedule(&mut self, ticks: u32) {
        let tim2 = self.tim2();
        tim2.cr1.modify(|_, w| w.cen().clear_bit());
        // Safety: TIM2 is a full 32-bit timer; any tick count is valid.
        tim2.arr.write(|w| unsafe { w.bits(ticks.max(1)) });
        tim2.cnt.write(|w| unsafe { w.bits(0) });
        tim2.cr1.modify(|_, w| w.cen().set_bit());
    }
}
