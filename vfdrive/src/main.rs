#![cfg_attr(not(feature = "host"), no_std)]
#![cfg_attr(not(feature = "host"), no_main)]

// The firmware image only makes sense for the target; under the `host`
// feature this binary collapses to a stub so host tooling can still build
// the whole workspace.
#[cfg(feature = "host")]
fn main() {}

#[cfg(not(feature = "host"))]
mod firmware {
    use cortex_m_rt::ExceptionFrame;
    use cortex_m_semihosting::hprintln;

    use vfdrive::hw;
    use vfdrive::led::IndicatorLed;
    use vfdrive::params::DriveParameters;

    #[cfg(feature = "panic-halt")]
    use panic_halt as _;
    #[cfg(feature = "panic-itm")]
    use panic_itm as _;

    #[cortex_m_rt::entry]
    fn main() -> ! {
        // All the real work happens in interrupt handlers; `run` parks the
        // processor in sleep once the bus is up.
        hw::take_hardware()
            .configure_peripherals(DriveParameters::bldc_defaults())
            .run();
    }

    /// Catastrophic faults are not recoverable in firmware: outputs off,
    /// solid fault indicator, park for the debugger or the watchdog reset.
    fn halt_with_outputs_off() -> ! {
        hw::gpio::emergency_outputs_off();
        let mut fault_led = hw::gpio::FaultLed;
        fault_led.set(true);
        loop {
            cortex_m::asm::nop();
        }
    }

    #[cortex_m_rt::exception]
    fn HardFault(frame: &ExceptionFrame) -> ! {
        let _ = hprintln!("hard fault: {:?}", frame);
        halt_with_outputs_off();
    }

    #[cortex_m_rt::exception]
    fn DefaultHandler(irqn: i16) {
        let _ = hprintln!("unexpected interrupt: {}", irqn);
        halt_with_outputs_off();
    }
}
