//! Core clock bring-up: 170 MHz from the external crystal via the PLL.

use stm32g4::stm32g474 as device;

use crate::{block_until, block_while};

/// PLL and bus-divider selection for the G4.
pub struct ClockConfig {
    pub crystal_hz: u32,
    pub crystal_divisor: device::rcc::pllcfgr::PLLM_A,
    pub vco_multiplier: device::rcc::pllcfgr::PLLN_A,
    pub core_divisor: device::rcc::pllcfgr::PLLR_A,
    pub ahb_divisor: device::rcc::cfgr::HPRE_A,
    pub apb1_divisor: device::rcc::cfgr::PPRE1_A,
    pub apb2_divisor: device::rcc::cfgr::PPRE2_A,
}

/// 24 MHz crystal / 6 * 85 / 2 = 170 MHz core.
pub static CLOCK_170MHZ: ClockConfig = ClockConfig {
    crystal_hz: 24_000_000,
    crystal_divisor: device::rcc::pllcfgr::PLLM_A::DIV6,
    vco_multiplier: device::rcc::pllcfgr::PLLN_A::DIV85,
    core_divisor: device::rcc::pllcfgr::PLLR_A::DIV2,
    ahb_divisor: device::rcc::cfgr::HPRE_A::DIV1,
    apb1_divisor: device::rcc::cfgr::PPRE1_A::DIV1,
    apb2_divisor: device::rcc::cfgr::PPRE2_A::DIV1,
};

/// Steps the core from the 16 MHz boot HSI up to the PLL, raising flash
/// wait states and bus dividers in the order the reference manual
/// requires. The processor runs in boost mode for 170 MHz operation.
pub fn setup(pwr: &device::PWR, rcc: &device::RCC, flash: &device::FLASH, cfg: &ClockConfig) {
    rcc.apb1enr1.modify(|_, w| w.pwren().set_bit());
    rcc.apb2enr.modify(|_, w| w.syscfgen().set_bit());

    // Boost the core voltage for high-frequency operation.
    pwr.cr5.modify(|_, w| w.r1mode().clear_bit());

    // External oscillator on, internal off once the PLL retargets.
    rcc.cr.modify(|_, w| w.hseon().set_bit());
    block_while! { rcc.cr.read().hserdy().bit_is_clear() }

    rcc.cr.modify(|_, w| w.pllon().clear_bit());
    block_while! { rcc.cr.read().pllrdy().bit_is_set() }
    {
        use device::rcc::pllcfgr as v;
        rcc.pllcfgr.write(|w| {
            w.pllsrc()
                .variant(v::PLLSRC_A::HSE)
                .pllm()
                .variant(cfg.crystal_divisor)
                .plln()
                .variant(cfg.vco_multiplier)
                .pllr()
                .variant(cfg.core_divisor)
        });
    }
    rcc.cr.modify(|_, w| w.pllon().set_bit());
    block_until! { rcc.cr.read().pllrdy().bit_is_set() }
    rcc.pllcfgr.modify(|_, w| w.pllren().set_bit());

    // The jump to 170 MHz goes through a half-rate intermediate state so
    // the AHB domain can keep up while the flash latency changes.
    rcc.cfgr
        .modify(|_, w| w.hpre().variant(device::rcc::cfgr::HPRE_A::DIV2));
    rcc.cfgr.modify(|_, w| {
        w.ppre1()
            .variant(device::rcc::cfgr::PPRE1_A::DIV16)
            .ppre2()
            .variant(device::rcc::cfgr::PPRE2_A::DIV16)
    });
    rcc.cfgr
        .modify(|_, w| w.sw().variant(device::rcc::cfgr::SW_A::PLL));
    block_until! {
        rcc.cfgr.read().sws().variant() == device::rcc::cfgr::SWS_A::PLL
    }

    // Four wait states for 170 MHz per RM0440, plus caches and prefetch.
    flash.acr.modify(|_, w| {
        w.latency()
            .variant(device::flash::acr::LATENCY_A::FOUR)
            .dcen()
            .enabled()
            .icen()
            .enabled()
            .prften()
            .enabled()
    });

    rcc.cfgr.modify(|_, w| w.hpre().variant(cfg.ahb_divisor));
    rcc.cfgr.modify(|_, w| {
        w.ppre1()
            .variant(cfg.apb1_divisor)
            .ppre2()
            .variant(cfg.apb2_divisor)
    });
}

/// Disable the USB-C dead-battery pull-downs; they load the PWM pins
/// otherwise.
pub fn disable_dead_battery_pd(pwr: &device::PWR) {
    pwr.cr3.modify(|_, w| w.ucpd1_dbdis().bit(true));
}
