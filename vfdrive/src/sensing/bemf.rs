//! Sensorless rotor position from back-EMF zero crossings.
//!
//! While two phases are driven the third floats; its voltage crosses half
//! the bus voltage at the midpoint of the commutation interval. Twelve
//! sub-states (six forward, six reverse) determine which phase to watch and
//! in which direction the crossing goes. A detected crossing schedules a
//! one-shot timer so the actual commutation lands at the projected next
//! step boundary rather than at detection time.

use super::edge_filter::{filter_8, EdgeTimer};
use crate::SYSTEM_CLOCK;

/// Next synthetic hall value to commutate to, indexed by sub-state
/// (0..5 forward, 6..11 reverse).
static NEXT_HALL: [u8; 12] = [5, 2, 3, 4, 6, 1, 1, 6, 2, 5, 4, 3];

/// ADC sample-to-interrupt latency, nanoseconds.
const ADC_LATENCY_NS: u32 = 3500;
/// Interrupt entry to timer programming, system clocks.
const IRQ_LATENCY_TICKS: u32 = 350;

/// What the estimator wants done after a processed sample.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BemfAction {
    None,
    /// Program the one-shot commutation timer for `ticks` system clocks.
    Schedule { ticks: u32 },
}

pub struct BemfEstimator {
    /// Commutation sub-state, 0..11.
    state: u8,
    /// ADC samples left to ignore after a commutation; the switching
    /// transient on the floating phase reads as a false crossing.
    skip_count: u8,
    /// Crossing already found for this commutation interval.
    edge_found: bool,
    /// Timestamp of the previous crossing, any sub-state.
    edge_previous: u32,
    /// Full-revolution edge timing for the speed estimate.
    speed_timer: EdgeTimer,
    rotor_rpm: u32,
    /// Jitter-smoothed average commutation period, system clocks.
    period_avg: u32,
    next_hall: u8,
    // Idle-time amplitude envelope, raw ADC counts.
    envelope_min: u16,
    envelope_max: u16,
    envelope_decay: u8,
    bemf_mv: u32,
}

impl BemfEstimator {
    pub fn new() -> BemfEstimator {
        BemfEstimator {
            state: 0,
            skip_count: 0,
            edge_found: false,
            edge_previous: 0,
            speed_timer: EdgeTimer::new(),
            rotor_rpm: 0,
            period_avg: 0,
            next_hall: 0,
            envelope_min: 1023,
            envelope_max: 0,
            envelope_decay: 0,
            bemf_mv: 0,
        }
    }

    /// Re-derives the sub-state after the PWM drive pattern changed.
    /// `enable_mask` uses the (high, low) bit-pair layout from
    /// `PhaseEnable::enable_mask`. Returns the index of the floating phase
    /// so the ADC sequence can be pointed at it.
    pub fn phase_change(&mut self, enable_mask: u8, reverse: bool, skip_count: u8) -> usize {
        let (floating, state) = if enable_mask & 0x03 == 0 {
            // Phase A floats; B-/C+ is the rising-A state.
            (0, if enable_mask & 0x08 != 0 { 1 } else { 0 })
        } else if enable_mask & 0x0C == 0 {
            (1, if enable_mask & 0x02 != 0 { 2 } else { 3 })
        } else {
            (2, if enable_mask & 0x02 != 0 { 5 } else { 4 })
        };
        self.state = state + if reverse { 6 } else { 0 };
        self.edge_found = false;
        self.skip_count = skip_count;
        floating
    }

    /// Processes one floating-phase sample while the drive is running.
    /// `closed_loop` is false during open-loop startup, when crossings are
    /// observed (for speed) but commutation stays on the startup timer.
    pub fn sample(
        &mut self,
        bemf_count: u16,
        bus_count: u16,
        now: u32,
        closed_loop: bool,
        pole_pairs: u32,
        pwm_period_ticks: u32,
    ) -> BemfAction {
        if self.edge_found {
            return BemfAction::None;
        }
        if self.skip_count > 0 {
            self.skip_count -= 1;
            return BemfAction::None;
        }

        // Crossing direction alternates with the sub-state: odd forward
        // states and even reverse states rise, the others fall.
        let crossed = match self.state {
            0 | 2 | 4 | 7 | 9 | 11 => bemf_count < bus_count / 2,
            _ => bemf_count > bus_count / 2,
        };
        if !crossed {
            return BemfAction::None;
        }
        self.edge_found = true;
        self.next_hall = NEXT_HALL[self.state as usize];

        let mut action = BemfAction::None;
        if closed_loop {
            let elapsed = now.wrapping_sub(self.edge_previous);

            // Jitter compensation: weight the smoothed period against the
            // interval just measured, then halve since the crossing sits at
            // the midpoint of the commutation interval.
            let mut delay = (3 * self.period_avg).saturating_sub(elapsed) / 2 / 2;

            // Remove the measurement latency and allow the crossing to have
            // happened anywhere in the previous PWM period.
            delay = delay
                .saturating_sub(ADC_LATENCY_NS / (1000 / (SYSTEM_CLOCK / 1_000_000)))
                .saturating_sub(IRQ_LATENCY_TICKS)
                .saturating_sub(pwm_period_ticks / 2)
                .max(1);
            action = BemfAction::Schedule { ticks: delay };
        }
        self.edge_previous = now;

        // Full electrical revolution boundary: states 0 and 11 close the
        // cycle in their respective directions.
        if self.state == 0 || self.state == 11 {
            if let Some(elapsed) = self.speed_timer.interval(now) {
                let rpm =
                    (SYSTEM_CLOCK as u64 * 60 / (elapsed as u64 * pole_pairs as u64)) as u32;
                self.rotor_rpm = filter_8(self.rotor_rpm, rpm);
                self.period_avg = ((self.period_avg * 3) + (elapsed / 6)) / 4;
            }
        }
        action
    }

    /// Processes a floating-phase sample while the drive is stopped: tracks
    /// the amplitude envelope so a still-spinning rotor can be recognized
    /// before a restart.
    pub fn idle_sample(&mut self, bemf_count: u16) {
        if bemf_count < self.envelope_min {
            self.envelope_min = bemf_count;
        }
        if bemf_count > self.envelope_max {
            self.envelope_max = bemf_count;
        }

        // Periodically decay the envelope so it follows a slowing rotor
        // down instead of latching the largest swing ever seen.
        self.envelope_decay = (self.envelope_decay + 1) % 10;
        if self.envelope_decay == 0 {
            self.envelope_max = self.envelope_max.saturating_sub(1);
            self.envelope_min = self.envelope_min.saturating_add(1);
        }
        if self.envelope_max <= self.envelope_min {
            self.envelope_max = self.envelope_min + 1;
        }

        let swing_mv = ((self.envelope_max - self.envelope_min) as u32 * 120_000) / 1024;
        self.bemf_mv = ((self.bemf_mv * 7) + swing_mv) / 8;
        self.period_avg = 0;
    }

    /// Resets the edge history when the motor stops or starts.
    pub fn invalidate(&mut self) {
        self.speed_timer.rearm();
        self.rotor_rpm = 0;
        self.edge_found = false;
    }

    pub fn next_hall(&self) -> u8 {
        self.next_hall
    }

    pub fn speed(&self) -> u32 {
        self.rotor_rpm
    }

    pub fn bemf_mv(&self) -> u32 {
        self.bemf_mv
    }
}

impl Default for BemfEstimator {
    fn default() -> BemfEstimator {
        BemfEstimator::new()
    }
}
