//! Register-level peripheral glue and board bring-up.
//!
//! Everything below `hw` implements the narrow contracts the drive engine
//! is written against (`PwmControl`, `CommutationTimer`, the ADC batch,
//! pin reads); the engine itself never touches a register.

pub mod adc;
pub mod clocks;
pub mod commutation_timer;
pub mod encoder_counter;
pub mod gpio;
pub mod pwm;
pub mod watchdog;

use cortex_m::peripheral as cm;
use cortex_m::peripheral::scb::SystemHandler;
use cortex_m::peripheral::syst::SystClkSource;
use stm32g4::stm32g474 as device;

use crate::command::CommandQueue;
use crate::drive::{MotorDrive, PwmControl};
use crate::interrupt::{
    AdcVars, DriveVars, HousekeepingVars, ADC_VARS, COMMAND_QUEUE, DRIVE_VARS, HOUSEKEEPING,
    MEASUREMENTS, MILLISECOND_IRQ, WAVEFORM_IRQ,
};
use crate::led::{Blinker, BlinkRate};
use crate::modulation::Modulation;
use crate::params::{DriveParameters, MotorType, RamParamStore, SensorType};
use crate::sensing::bemf::BemfEstimator;
use crate::sensing::current::{BusSense, CurrentCalibration, CurrentSense, TempSense};
use crate::sensing::linear_hall::LinearHall;
use crate::util::interrupts::{disable_irq, enable_irq};
use crate::{block_until, SYSTEM_CLOCK};

/// Free-running timestamp for edge timing: the DWT cycle counter on the
/// core clock.
pub fn timestamp() -> u32 {
    cm::DWT::cycle_count()
}

pub struct Driver<S> {
    mode_state: S,
}

pub struct Init {
    cp: cm::Peripherals,
    p: device::Peripherals,
}

pub struct Ready {
    min_bus_mv: u32,
}

pub fn take_hardware() -> Driver<Init> {
    let cp = cm::Peripherals::take().unwrap();
    let p = device::Peripherals::take().unwrap();
    Driver {
        mode_state: Init { cp, p },
    }
}

fn adc_mode_for(params: &DriveParameters) -> adc::AdcMode {
    if params.motor_type.is_induction() {
        return adc::AdcMode::Induction;
    }
    match params.modulation {
        Modulation::Sensorless => adc::AdcMode::SixStep,
        Modulation::Trapezoid => match params.sensor.sensor_type {
            SensorType::LinearHall | SensorType::LinearHall60 => adc::AdcMode::LinearHall,
            _ => adc::AdcMode::SixStep,
        },
        _ => adc::AdcMode::Induction,
    }
}

impl Driver<Init> {
    pub fn configure_peripherals(self, params: DriveParameters) -> Driver<Ready> {
        let Init { mut cp, p } = self.mode_state;

        clocks::disable_dead_battery_pd(&p.PWR);

        // No interrupts until every handler's state has been donated.
        disable_irq(device::Interrupt::TIM1_UP_TIM16);
        disable_irq(device::Interrupt::ADC1_2);
        disable_irq(device::Interrupt::EXTI4);
        disable_irq(device::Interrupt::EXTI9_5);
        disable_irq(device::Interrupt::TIM2);
        disable_irq(WAVEFORM_IRQ);
        disable_irq(MILLISECOND_IRQ);
        disable_irq(device::Interrupt::TIM1_BRK_TIM15);
        disable_irq(device::Interrupt::WWDG);

        clocks::setup(&p.PWR, &p.RCC, &p.FLASH, &clocks::CLOCK_170MHZ);

        // Peripheral clocks.
        p.RCC
            .ahb1enr
            .modify(|_, w| w.dma1en().set_bit().dmamuxen().set_bit());
        p.RCC.ahb2enr.modify(|_, w| {
            w.gpioaen()
                .set_bit()
                .gpioben()
                .set_bit()
                .gpiocen()
                .set_bit()
                .adc12en()
                .set_bit()
        });
        p.RCC
            .apb1enr1
            .modify(|_, w| w.tim2en().set_bit().tim3en().set_bit());
        p.RCC
            .apb2enr
            .modify(|_, w| w.tim1en().set_bit().syscfgen().set_bit());

        // Analog inputs (see `hw::adc` for the channel map).
        p.GPIOA.moder.modify(|_, w| {
            w.moder0()
                .analog()
                .moder1()
                .analog()
                .moder2()
                .analog()
                .moder3()
                .analog()
        });
        p.GPIOB
            .moder
            .modify(|_, w| w.moder1().analog().moder12().analog().moder14().analog());
        // TIM1 PWM outputs: PA8/9/10 high sides, PB13/PB15/PA12 handled by
        // the complementary channels.
        p.GPIOA.moder.modify(|_, w| {
            w.moder8()
                .alternate()
                .moder9()
                .alternate()
                .moder10()
                .alternate()
        });
        p.GPIOA
            .afrh
            .modify(|_, w| w.afrh8().af6().afrh9().af6().afrh10().af6());

        gpio::configure(&p.GPIOB, &p.GPIOC, &p.EXTI, &p.SYSCFG);

        // Cycle counter for edge timestamps.
        cp.DCB.enable_trace();
        cp.DWT.enable_cycle_counter();

        // Static priority order; the control loop's clock sits on top.
        // Safety: all handled interrupts are masked above.
        unsafe {
            cp.NVIC
                .set_priority(device::Interrupt::TIM1_UP_TIM16, 0x00);
            cp.NVIC.set_priority(device::Interrupt::ADC1_2, 0x10);
            cp.NVIC.set_priority(device::Interrupt::EXTI4, 0x20);
            cp.NVIC.set_priority(device::Interrupt::EXTI9_5, 0x20);
            cp.NVIC.set_priority(device::Interrupt::TIM2, 0x20);
            cp.NVIC.set_priority(WAVEFORM_IRQ, 0x40);
            cp.NVIC.set_priority(MILLISECOND_IRQ, 0x50);
            // Housekeeping, the break latch and the watchdog early wakeup
            // share the bottom priority so none can preempt another
            // mid-update (the break's output kill is done in hardware).
            cp.NVIC
                .set_priority(device::Interrupt::TIM1_BRK_TIM15, 0xE0);
            cp.NVIC.set_priority(device::Interrupt::WWDG, 0xE0);
            cp.SCB.set_priority(SystemHandler::SysTick, 0xE0);
        }

        // SysTick housekeeping at 1 kHz; counting starts only after the
        // handler state has been donated below.
        cp.SYST.set_clock_source(SystClkSource::Core);
        cp.SYST.set_reload(SYSTEM_CLOCK / 1000 - 1);
        cp.SYST.clear_current();

        let mut pwm_driver = pwm::PwmDriver::new(p.TIM1);
        pwm_driver.set_frequency(params.pwm.frequency);
        pwm_driver.set_dead_band(params.pwm.dead_time, params.pwm.min_pulse);
        pwm_driver.set_update_rate(params.pwm.update_rate);

        let timer = commutation_timer::take(p.TIM2);
        let encoder_counter = encoder_counter::EncoderCounter::new(p.TIM3);
        let sequencer = adc::AdcSequencer::new(
            &p.ADC12_COMMON,
            p.ADC1,
            p.DMA1,
            &p.DMAMUX,
            adc_mode_for(&params),
        );
        watchdog::init(&p.RCC, &p.WWDG);

        let min_bus_mv = params.min_bus_mv;
        let bemf_skip_reload = params.startup.bemf_skip_count;
        let pole_pairs = params.pole_pairs as u32;
        let single_phase = params.motor_type == MotorType::InductionSinglePhase;

        *DRIVE_VARS.try_lock().unwrap() = Some(DriveVars {
            drive: MotorDrive::new(params),
            pwm: pwm_driver,
            brake_pin: gpio::BrakePin::new(),
            timer,
            store: RamParamStore::new(),
        });
        *ADC_VARS.try_lock().unwrap() = Some(AdcVars {
            seq: sequencer,
            current: CurrentSense::new(CurrentCalibration::default()),
            bus: BusSense::default(),
            temp: TempSense::default(),
            bemf: BemfEstimator::new(),
            linear: LinearHall::new(),
            timer,
            last_enable: 0,
            last_running: false,
            prev_angle: 0,
            bemf_skip_reload,
            pole_pairs,
            single_phase,
        });
        *HOUSEKEEPING.try_lock().unwrap() = Some(HousekeepingVars {
            run_led: Blinker::new(BlinkRate::STOPPED),
            fault_led: Blinker::new(BlinkRate::OFF),
            encoder_counter,
            window_divider: 0,
        });
        *COMMAND_QUEUE.try_lock().unwrap() = Some(CommandQueue::new());

        enable_irq(device::Interrupt::TIM1_UP_TIM16);
        enable_irq(device::Interrupt::ADC1_2);
        enable_irq(device::Interrupt::EXTI4);
        enable_irq(device::Interrupt::EXTI9_5);
        enable_irq(device::Interrupt::TIM2);
        enable_irq(WAVEFORM_IRQ);
        enable_irq(MILLISECOND_IRQ);
        enable_irq(device::Interrupt::TIM1_BRK_TIM15);
        enable_irq(device::Interrupt::WWDG);
        cp.SYST.enable_counter();
        cp.SYST.enable_interrupt();

        Driver {
            mode_state: Ready { min_bus_mv },
        }
    }
}

impl Driver<Ready> {
    /// Waits out the in-rush limiter, drops any faults latched against
    /// warm-up readings, then parks: all the real work happens in
    /// interrupt handlers.
    pub fn run(self) -> ! {
        block_until! { MEASUREMENTS.read().bus_mv >= self.mode_state.min_bus_mv }

        crate::interrupt::with_drive(|drive, _pwm| drive.clear_faults());

        loop {
            cortex_m::asm::wfi();
        }
    }
}
