//! Latched fault conditions and the per-tick monitor.

use core::sync::atomic::{AtomicU16, Ordering};

/// One latched fault kind. Once set, a bit stays set until an explicit
/// `clear_faults`; a nonzero set vetoes run requests.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Fault {
    /// Emergency stop was commanded (or implied by another fault path).
    EmergencyStop = 1 << 0,
    /// DC bus under-voltage.
    VbusLow = 1 << 1,
    /// DC bus over-voltage.
    VbusHigh = 1 << 2,
    /// Motor under-current (broken wire / lost phase).
    CurrentLow = 1 << 3,
    /// Motor over-current.
    CurrentHigh = 1 << 4,
    /// Ambient over-temperature.
    TemperatureHigh = 1 << 5,
    /// Rotor stalled while being driven.
    Stall = 1 << 6,
    /// Watchdog expired.
    Watchdog = 1 << 7,
    /// The power module reported a gate fault.
    PowerModule = 1 << 8,
}

/// The latched fault bitset. Individual bits are set from several
/// interrupt levels (the watchdog latches from its own handler), so the
/// storage is atomic; latching is set-only and clearing is whole-set.
#[derive(Default)]
pub struct FaultFlags {
    bits: AtomicU16,
}

impl FaultFlags {
    pub const fn new() -> FaultFlags {
        FaultFlags {
            bits: AtomicU16::new(0),
        }
    }

    pub fn latch(&self, fault: Fault) {
        self.bits.fetch_or(fault as u16, Ordering::Relaxed);
    }

    pub fn clear_all(&self) {
        self.bits.store(0, Ordering::Relaxed);
    }

    pub fn is_set(&self, fault: Fault) -> bool {
        self.bits.load(Ordering::Relaxed) & (fault as u16) != 0
    }

    pub fn any(&self) -> bool {
        self.bits.load(Ordering::Relaxed) != 0
    }

    pub fn bits(&self) -> u16 {
        self.bits.load(Ordering::Relaxed)
    }
}

/// Consecutive zero-speed ticks in a run state before a stall trips.
pub const STALL_TICKS: u32 = 1500;
