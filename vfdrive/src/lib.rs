#![no_std]

pub mod util;

pub mod command;
pub mod drive;
pub mod fixed_point;
pub mod led;
pub mod modulation;
pub mod params;
pub mod pi_controller;
pub mod sensing;
pub mod telemetry;
pub mod vf_curve;

#[cfg(not(feature = "host"))]
pub mod hw;
#[cfg(not(feature = "host"))]
pub mod interrupt;

/// AHB/core clock the timing math is derived from. Edge timestamps are DWT
/// cycle counts on this clock.
pub const SYSTEM_CLOCK: u32 = 170_000_000;
