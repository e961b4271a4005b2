//! Optical encoder speed sensing.
//!
//! At low speed the time between encoder edges is measured (edge timing
//! mode); at high speed the number of edges in a fixed window is counted
//! (edge count mode). The changeover point carries hysteresis so a rotor
//! sitting near it does not bounce between modes, and each changeover
//! re-arms the skip flag since the first measurement in the new mode has no
//! valid predecessor.

use super::edge_filter::{EdgeTimer, SpeedFilter};
use crate::SYSTEM_CLOCK;

/// Rate of the velocity-window interrupt, in windows per second.
pub const WINDOW_RATE: u32 = 50;

/// Edges per second above which edge counting takes over.
const MAX_EDGE_COUNT: u32 = 2000;

/// Hysteresis applied to `MAX_EDGE_COUNT` at the changeover.
const EDGE_DELTA: u32 = 50;

pub struct Encoder {
    timer: EdgeTimer,
    filter: SpeedFilter,
    /// True when edge counting mode is active (edge interrupts off).
    counting: bool,
    /// Edge count observed in the previous window, for two-window
    /// averaging.
    previous_count: u32,
    /// Discard the next counting-mode window (no predecessor to average
    /// with).
    skip_window: bool,
    edge_seen: bool,
}

impl Encoder {
    pub fn new() -> Encoder {
        Encoder {
            timer: EdgeTimer::new(),
            filter: SpeedFilter::default(),
            counting: false,
            previous_count: 0,
            skip_window: false,
            edge_seen: false,
        }
    }

    /// Processes an encoder edge interrupt (edge timing mode only).
    /// Returns true if the glue should switch off the edge interrupt and
    /// rely on counting from here.
    pub fn edge(&mut self, now: u32, lines: u32, max_speed: u32) -> bool {
        let elapsed = match self.timer.interval(now) {
            Some(t) => t,
            None => return false,
        };
        self.edge_seen = true;

        let rpm = (SYSTEM_CLOCK as u64 * 60 / (elapsed as u64 * (lines as u64 + 1))) as u32;
        self.filter.update(rpm, max_speed);

        // Too many edges per second for timing mode.
        if elapsed < SYSTEM_CLOCK / (MAX_EDGE_COUNT + EDGE_DELTA) {
            self.counting = true;
            self.skip_window = true;
            return true;
        }
        false
    }

    /// Processes a velocity window expiry with the hardware edge count for
    /// that window. Returns true if the glue should re-enable the edge
    /// interrupt (timing mode resumes).
    pub fn window(&mut self, count: u32, lines: u32, max_speed: u32) -> bool {
        if !self.counting {
            // Timing mode: a window with no edges pins the speed at zero.
            if !self.edge_seen {
                self.filter.force_zero();
                self.timer.rearm();
            } else {
                self.edge_seen = false;
            }
            return false;
        }

        let previous = self.previous_count;
        self.previous_count = count;
        if self.skip_window {
            // First window after the changeover has no valid predecessor.
            self.skip_window = false;
            return false;
        }

        // Both signal edges are counted, so a revolution is twice the line
        // count; averaging two windows steadies the estimate.
        let average = (previous + count) / 2;
        let rpm = (average * WINDOW_RATE * 30) / (lines + 1);
        self.filter.update(rpm, max_speed);

        // Too few edges per window for counting mode.
        if average < ((MAX_EDGE_COUNT - EDGE_DELTA) * 2) / WINDOW_RATE {
            self.counting = false;
            self.timer.rearm();
            return true;
        }
        false
    }

    pub fn counting_mode(&self) -> bool {
        self.counting
    }

    pub fn invalidate(&mut self) {
        self.timer.rearm();
        self.filter.force_zero();
        self.edge_seen = false;
    }

    pub fn speed(&self) -> u32 {
        self.filter.speed()
    }
}

impl Default for Encoder {
    fn default() -> Encoder {
        Encoder::new()
    }
}
