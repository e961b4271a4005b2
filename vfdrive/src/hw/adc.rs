//! ADC sequencing for the feedback signals.
//!
//! ADC1 runs a hardware-triggered regular sequence off the TIM1 update
//! event, DMA'd into a small buffer, with the end-of-sequence interrupt
//! driving the estimators. Which physical channels the sequence reads
//! depends on the drive mode, and for six-step drive the back-EMF and
//! shunt entries are re-pointed every commutation.
//!
//! Analog pin assignment:
//!   PA0 - ADC1_IN1  - IPHASE_A (shunt amplifier A)
//!   PA1 - ADC1_IN2  - IPHASE_B
//!   PA2 - ADC1_IN3  - IPHASE_C
//!   PA3 - ADC1_IN4  - VBEMF_A / LINEAR_A
//!   PB14 - ADC1_IN5 - VBEMF_B / LINEAR_B
//!   PB12 - ADC1_IN11 - VBEMF_C / LINEAR_C
//!   PB1 - ADC1_IN12 - VBUS divider
//!   (internal)      - temperature sensor

use stm32g4::stm32g474 as device;

use crate::block_while;

const CH_IPHASE: [u8; 3] = [1, 2, 3];
const CH_BEMF: [u8; 3] = [4, 5, 11];
const CH_VBUS: u8 = 12;
/// Internal temperature sensor channel on ADC1.
const CH_TEMP: u8 = 16;

/// DMA destination for the regular sequence.
static mut SAMPLE_BUF: [u16; 8] = [0; 8];

/// How the sequence is laid out for the active drive mode.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum AdcMode {
    /// Three phase currents, bus, temperature.
    Induction,
    /// Floating-phase BEMF, active-phase shunt, bus, temperature.
    SixStep,
    /// Shunt, three linear hall channels, bus, temperature.
    LinearHall,
}

impl AdcMode {
    fn length(self) -> u8 {
        match self {
            AdcMode::Induction => 5,
            AdcMode::SixStep => 4,
            AdcMode::LinearHall => 6,
        }
    }
}

/// A recoverable sequence fault: DMA or ADC overrun, handled by flushing
/// and re-arming; the sample period is simply skipped.
pub struct Overrun;

pub struct AdcSequencer {
    adc1: device::ADC1,
    dma1: device::DMA1,
    mode: AdcMode,
}

impl AdcSequencer {
    pub fn new(
        common: &device::ADC12_COMMON,
        adc1: device::ADC1,
        dma1: device::DMA1,
        dmamux: &device::DMAMUX,
        mode: AdcMode,
    ) -> AdcSequencer {
        // 170 MHz AHB / 4 keeps the ADC inside its rated clock; the
        // internal temperature sensor rides along on ADC1.
        common
            .ccr
            .modify(|_, w| w.ckmode().sync_div4().vsensesel().set_bit());

        // Power-up: out of deep power down, regulator on, then calibrate
        // before the first enable.
        adc1.cr.modify(|_, w| {
            w.adcal()
                .clear_bit()
                .aden()
                .clear_bit()
                .adstart()
                .clear_bit()
                .deeppwd()
                .clear_bit()
        });
        adc1.cr.modify(|_, w| w.advregen().set_bit());
        cortex_m::asm::delay(170 * 30); // regulator warm-up, ~30 us
        adc1.cr.modify(|_, w| w.adcal().set_bit());
        block_while! { adc1.cr.read().adcal().bit_is_set() }

        adc1.isr.modify(|_, w| w.adrdy().set_bit());
        adc1.cr.modify(|_, w| w.aden().set_bit());
        block_while! { adc1.isr.read().adrdy().bit_is_clear() }

        // DMA1 channel 1 <- ADC1, circular, 16-bit transfers.
        // Safety: request line 5 is ADC1 per the DMAMUX table.
        dmamux.c0cr.modify(|_, w| unsafe { w.dmareq_id().bits(5) });
        let ch1 = &dma1.ch1;
        ch1.cr.modify(|_, w| w.en().clear_bit());
        // Safety: peripheral and memory addresses are fixed and valid for
        // the life of the device; 0x40 is the ADC data register offset.
        unsafe {
            ch1.par
                .write(|w| w.bits(device::ADC1::ptr() as usize as u32 + 0x40));
            ch1.mar
                .write(|w| w.bits(core::ptr::addr_of!(SAMPLE_BUF) as usize as u32));
        }
        // Safety: 0b01 is the 16-bit transfer size for both sides.
        ch1.cr.modify(|_, w| unsafe {
            w.dir()
                .clear_bit()
                .circ()
                .set_bit()
                .minc()
                .set_bit()
                .psize()
                .bits(0b01)
                .msize()
                .bits(0b01)
        });

        let mut sequencer = AdcSequencer { adc1, dma1, mode };
        sequencer.configure(mode);
        sequencer
    }

    /// Programs the regular sequence for a drive mode and arms it against
    /// the TIM1 update trigger.
    pub fn configure(&mut self, mode: AdcMode) {
        self.mode = mode;
        let adc1 = &self.adc1;

        adc1.cr.modify(|_, w| w.adstart().clear_bit());

        let sequence: [u8; 6] = match mode {
            AdcMode::Induction => [
                CH_IPHASE[0],
                CH_IPHASE[1],
                CH_IPHASE[2],
                CH_VBUS,
                CH_TEMP,
                0,
            ],
            AdcMode::SixStep => [CH_BEMF[0], CH_IPHASE[0], CH_VBUS, CH_TEMP, 0, 0],
            AdcMode::LinearHall => [
                CH_IPHASE[0],
                CH_BEMF[0],
                CH_BEMF[1],
                CH_BEMF[2],
                CH_VBUS,
                CH_TEMP,
            ],
        };
        self.write_sequence(&sequence, mode.length());

        let ch1 = &self.dma1.ch1;
        ch1.cr.modify(|_, w| w.en().clear_bit());
        // Safety: transfer count matches the sequence length.
        ch1.ndtr
            .write(|w| unsafe { w.bits(mode.length() as u32) });
        ch1.cr.modify(|_, w| w.en().set_bit());

        // Hardware trigger: TIM1 TRGO on the rising edge, DMA in circular
        // mode, end-of-sequence interrupt on.
        // Safety: EXT9 is TIM1_TRGO per the reference manual; 0b01 is
        // rising-edge triggering.
        adc1.cfgr.modify(|_, w| unsafe {
            w.extsel()
                .bits(9)
                .exten()
                .bits(0b01)
                .dmaen()
                .set_bit()
                .dmacfg()
                .set_bit()
                .ovrmod()
                .set_bit()
        });
        adc1.ier.modify(|_, w| w.eosie().set_bit());
        adc1.cr.modify(|_, w| w.adstart().set_bit());
    }

    fn write_sequence(&self, channels: &[u8; 6], length: u8) {
        // Safety: channel numbers are within the 0..=18 SVD range.
        self.adc1.sqr1.write(|w| unsafe {
            w.l()
                .bits(length - 1)
                .sq1()
                .bits(channels[0])
                .sq2()
                .bits(channels[1])
                .sq3()
                .bits(channels[2])
                .sq4()
                .bits(channels[3])
        });
        self.adc1
            .sqr2
            .write(|w| unsafe { w.sq5().bits(channels[4]).sq6().bits(channels[5]) });
    }

    /// Re-points the six-step sequence at the newly floating phase and the
    /// newly measurable shunt.
    pub fn set_commutation_window(&mut self, bemf_phase: usize, current_phase: usize) {
        // Safety: both indices are 0..3 so the channels are in range.
        self.adc1.sqr1.modify(|_, w| unsafe {
            w.sq1()
                .bits(CH_BEMF[bemf_phase])
                .sq2()
                .bits(CH_IPHASE[current_phase])
        });
    }

    /// Acknowledges end-of-sequence and copies out the sample batch. An
    /// overrun flushes and re-arms the sequence instead, and the caller
    /// skips this sample period.
    pub fn read_batch(&mut self) -> Result<[u16; 6], Overrun> {
        let isr = self.adc1.isr.read();
        self.adc1.isr.write(|w| w.eos().set_bit());

        if isr.ovr().bit_is_set() {
            self.recover();
            return Err(Overrun);
        }

        let mut batch = [0u16; 6];
        for (index, slot) in batch.iter_mut().enumerate() {
            // Safety: the DMA writes these halfwords between sequences;
            // volatile reads at EOS see the completed batch.
            *slot = unsafe {
                core::ptr::read_volatile(core::ptr::addr_of!(SAMPLE_BUF[index]))
            };
        }
        Ok(batch)
    }

    /// Flush-and-re-arm recovery for an overrun: stop the sequence, clear
    /// the flag, reset the DMA transfer, restart. Never escalates to a
    /// drive fault.
    fn recover(&mut self) {
        let adc1 = &self.adc1;
        adc1.cr.modify(|_, w| w.adstp().set_bit());
        block_while! { adc1.cr.read().adstp().bit_is_set() }
        adc1.isr.write(|w| w.ovr().set_bit());

        let ch1 = &self.dma1.ch1;
        ch1.cr.modify(|_, w| w.en().clear_bit());
        // Safety: same fixed transfer count as `configure`.
        ch1.ndtr
            .write(|w| unsafe { w.bits(self.mode.length() as u32) });
        ch1.cr.modify(|_, w| w.en().set_bit());

        adc1.cr.modify(|_, w| w.adstart().set_bit());
    }

    pub fn mode(&self) -> AdcMode {
        self.mode
    }
}
