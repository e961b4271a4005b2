//! Hardware edge counting for the encoder's high-speed mode.
//!
//! TIM3 clocks from the encoder input's edge detector (both edges), so
//! reading and resetting the counter every velocity window yields the
//! edge count without an interrupt per edge.

use stm32g4::stm32g474 as device;

pub struct EncoderCounter {
    tim3: device::TIM3,
}

impl EncoderCounter {
    pub fn new(tim3: device::TIM3) -> EncoderCounter {
        tim3.cr1.modify(|_, w| w.cen().clear_bit());
        // External clock mode 1 from the TI1 edge detector: both signal
        // edges increment the counter.
        // Safety: SMS 0b111 is external clock mode 1, TS 0b100 is TI1F_ED.
        tim3.smcr
            .modify(|_, w| unsafe { w.sms().bits(0b111).ts().bits(0b100) });
        // Safety: full-range 16-bit reload.
        tim3.arr.write(|w| unsafe { w.bits(0xFFFF) });
        tim3.cr1.modify(|_, w| w.cen().set_bit());
        EncoderCounter { tim3 }
    }

    /// Reads and clears the edge count for the window just ended.
    pub fn take_window_count(&mut self) -> u32 {
        let count = self.tim3.cnt.read().bits() & 0xFFFF;
        // Safety: plain counter write.
        self.tim3.cnt.write(|w| unsafe { w.bits(0) });
        count
    }
}
