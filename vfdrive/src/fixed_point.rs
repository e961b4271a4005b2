//! Fixed-point arithmetic helpers.
//!
//! Drive frequency is carried as 16.16 (one unit = 1 Hz), BLDC speed and
//! power as 18.14 (one unit = 1 RPM / 1 mW), and the drive angle as a 0.32
//! fraction of an electrical revolution that wraps naturally on unsigned
//! overflow. The multiply goes through a full 64-bit product so the
//! fractional bits survive; overflow of the integer portion is the caller's
//! responsibility.

use fixed::types::{I16F16, U16F16};

/// PI gains and other signed 16.16 quantities at the API boundary.
pub type Gain = I16F16;
/// Duty cycles and amplitudes: unsigned 16.16, 65536 == 100%.
pub type Duty = U16F16;

/// One in 16.16.
pub const Q16_ONE: u32 = 65536;
/// Fractional bits of the 16.16 format.
pub const Q16_SHIFT: u32 = 16;
/// Fractional bits of the 18.14 format.
pub const Q14_SHIFT: u32 = 14;

/// Multiplies two 16.16 values, returning 16.16. The full 64-bit product
/// is arithmetic-shifted right by 16 (an smull/shift pair on the target),
/// so results floor toward negative infinity, never round.
#[inline(always)]
pub fn lmul(x: i32, y: i32) -> i32 {
    (((x as i64) * (y as i64)) >> 16) as i32
}

/// Combines a whole part and a milli-unit fraction (0..999) into a
/// fixed-point value with `shift` fractional bits.
#[inline]
pub fn from_whole_milli(whole: u32, milli: u32, shift: u32) -> u32 {
    (whole << shift) + ((milli << shift) / 1000)
}

/// Splits a fixed-point value with `shift` fractional bits back into a
/// whole part and milli-unit fraction. Inverse of `from_whole_milli` up to
/// the usual truncation.
#[inline]
pub fn to_whole_milli(value: u32, shift: u32) -> (u32, u32) {
    let mask = (1u32 << shift) - 1;
    (value >> shift, ((value & mask) * 1000) >> shift)
}

/// Drive output angle: a 0.32 fixed-point fraction of one electrical
/// revolution. All arithmetic wraps; a full revolution is exactly 2^32.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct Angle(pub u32);

impl Angle {
    pub const ZERO: Angle = Angle(0);

    /// Builds an angle from whole degrees.
    pub fn from_degrees(degrees: u32) -> Angle {
        // (degrees << 16) / 360 << 16 keeps the intermediate in range for
        // 0..=359.
        Angle((((degrees % 360) << 16) / 360) << 16)
    }

    /// Advances by `delta` for `periods` elapsed PWM periods.
    #[inline]
    pub fn advance(&mut self, delta: u32, periods: u32) {
        self.0 = self.0.wrapping_add(delta.wrapping_mul(periods));
    }

    /// Retreats by `delta` for `periods` elapsed PWM periods (reverse
    /// rotation).
    #[inline]
    pub fn retreat(&mut self, delta: u32, periods: u32) {
        self.0 = self.0.wrapping_sub(delta.wrapping_mul(periods));
    }

    /// The per-PWM-period angle delta for a drive frequency in 16.16 Hz.
    /// Staged multiply (×128 then ×512) to avoid overflowing the 32-bit
    /// intermediate at high frequency.
    pub fn delta_from_frequency(frequency: u32, pwm_hz: u32) -> u32 {
        ((frequency * 128) / pwm_hz) * 512
    }

    /// The per-PWM-period angle delta for a rotor speed in 18.14 RPM and a
    /// motor with `pole_pairs` electrical revolutions per mechanical one.
    pub fn delta_from_speed(speed: u32, pwm_hz: u32, pole_pairs: u32) -> u32 {
        ((((speed / 60) << 9) / pwm_hz) << 9) * pole_pairs
    }
}
