//! Linear (analog) hall sensor decoding.
//!
//! The three analog channels are normalized against a tracked min/max
//! envelope and thresholded with hysteresis into the same 3-bit code the
//! digital sensors produce, so the trapezoid tables apply unchanged.

use super::edge_filter::{filter_8, EdgeTimer};
use crate::SYSTEM_CLOCK;

/// Upper hysteresis threshold on the normalized 10-bit reading (60%).
const THRESHOLD_HIGH: u16 = 614;
/// Lower hysteresis threshold (40%).
const THRESHOLD_LOW: u16 = 410;

pub struct LinearHall {
    min: [u16; 3],
    max: [u16; 3],
    value: u8,
    last_value: u8,
    timer: EdgeTimer,
    speed: u32,
}

impl LinearHall {
    pub fn new() -> LinearHall {
        LinearHall {
            min: [0; 3],
            max: [1023; 3],
            value: 0,
            last_value: 0,
            timer: EdgeTimer::new(),
            speed: 0,
        }
    }

    /// Processes one batch of raw channel readings at timestamp `now`.
    /// Returns the new hall code when it changed (the caller commutates on
    /// that).
    pub fn process(&mut self, raw: &[u16; 3], now: u32, pole_pairs: u32) -> Option<u8> {
        for (index, &sample) in raw.iter().enumerate() {
            // Track the envelope, then normalize to full 10-bit scale.
            if sample < self.min[index] {
                self.min[index] = sample;
            }
            if sample > self.max[index] {
                self.max[index] = sample;
            }
            let mut range = self.max[index] - self.min[index];
            if range == 0 {
                range = 1;
            }
            let normalized =
                (((sample - self.min[index]) as u32 * 1023) / range as u32) as u16;

            let bit = 1u8 << index;
            if normalized > THRESHOLD_HIGH {
                self.value |= bit;
            } else if normalized < THRESHOLD_LOW {
                self.value &= !bit;
            }
        }

        if self.value == self.last_value {
            return None;
        }
        self.last_value = self.value;

        // One full electrical revolution per return to code 5.
        if self.value == 5 {
            if let Some(elapsed) = self.timer.interval(now) {
                let rpm =
                    (SYSTEM_CLOCK as u64 * 60 / (elapsed as u64 * pole_pairs as u64)) as u32;
                self.speed = filter_8(self.speed, rpm);
            }
        }
        Some(self.value)
    }

    pub fn invalidate(&mut self) {
        self.timer.rearm();
        self.speed = 0;
    }

    pub fn value(&self) -> u8 {
        self.value
    }

    pub fn speed(&self) -> u32 {
        self.speed
    }
}

impl Default for LinearHall {
    fn default() -> LinearHall {
        LinearHall::new()
    }
}
