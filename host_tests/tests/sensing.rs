#[cfg(test)]
mod tests {
    use vfdrive::sensing::bemf::{BemfAction, BemfEstimator};
    use vfdrive::sensing::current::{BusSense, CurrentCalibration, CurrentSense, TempSense};
    use vfdrive::sensing::edge_filter::{EdgeTimer, SpeedFilter};
    use vfdrive::sensing::encoder::Encoder;
    use vfdrive::sensing::hall::HallSensor;
    use vfdrive::sensing::linear_hall::LinearHall;
    use vfdrive::SYSTEM_CLOCK;

    /// Edge spacing that works out to `rpm` at one pole pair.
    fn ticks_for_rpm(rpm: u32) -> u32 {
        (SYSTEM_CLOCK as u64 * 60 / rpm as u64) as u32
    }

    #[test]
    fn edge_timer_skips_the_first_edge_after_arming() {
        let mut timer = EdgeTimer::new();
        assert_eq!(timer.interval(1000), None);
        assert_eq!(timer.interval(3000), Some(2000));
        timer.rearm();
        assert_eq!(timer.interval(10_000), None);
        assert_eq!(timer.interval(11_000), Some(1000));
    }

    #[test]
    fn speed_filter_rejects_wild_samples() {
        let mut filter = SpeedFilter::default();
        filter.update(1000, 10_000);
        assert_eq!(filter.speed(), 250); // (0*3 + 1000) / 4

        // A sample more than half max-speed away is noise.
        filter.update(9000, 10_000);
        assert_eq!(filter.speed(), 250);

        filter.update(1000, 10_000);
        assert!(filter.speed() > 250);
    }

    #[test]
    fn hall_speed_needs_two_rising_edges_of_a() {
        let mut hall = HallSensor::new();
        let gap = ticks_for_rpm(4000);

        // First rising edge of A only arms the measurement.
        hall.edge(0b101, 0, false, 1, 10_000);
        assert_eq!(hall.speed(), 0);
        // Intermediate states without an A rising edge don't measure.
        hall.edge(0b100, gap / 2, false, 1, 10_000);
        // Second rising edge of A closes the revolution.
        hall.edge(0b101, gap, false, 1, 10_000);
        assert_eq!(hall.speed(), 1000); // 4000 through the 3:1 filter

        // Polarity inversion flips the decoded value.
        let value = hall.edge(0b010, gap * 2, true, 1, 10_000);
        assert_eq!(value, 0b101);
    }

    #[test]
    fn hall_timeout_zeroes_speed_and_rearms() {
        let mut hall = HallSensor::new();
        let gap = ticks_for_rpm(4000);
        hall.edge(0b101, 0, false, 1, 10_000);
        hall.edge(0b101, gap, false, 1, 10_000);
        assert!(hall.speed() > 0);

        // First tick consumes the edge-seen flag; a second, stale tick far
        // in the future declares the rotor stopped.
        hall.tick(gap);
        hall.tick(gap + SYSTEM_CLOCK);
        assert_eq!(hall.speed(), 0);
    }

    #[test]
    fn encoder_switches_to_counting_mode_when_edges_crowd() {
        let mut encoder = Encoder::new();
        let lines = 999;

        // Slow edges: timing mode, no switch.
        assert!(!encoder.edge(ticks_for_rpm(60), lines, 10_000));
        // A very fast edge (above 2050 edges/s) requests the switch.
        let fast_gap = SYSTEM_CLOCK / 2100;
        assert!(encoder.edge(ticks_for_rpm(60) + fast_gap, lines, 10_000));
        assert!(encoder.counting_mode());

        // The first window after the changeover is discarded, then counting
        // works; a sparse window (under 78 edges) requests timing mode
        // back.
        assert!(!encoder.window(100, lines, 10_000));
        assert!(!encoder.window(100, lines, 10_000));
        assert!(encoder.window(20, lines, 10_000));
        assert!(!encoder.counting_mode());
    }

    #[test]
    fn bemf_detects_the_crossing_for_its_substate() {
        let mut bemf = BemfEstimator::new();

        // Hall 4 pattern (B+ C-) floats phase A going into substate 0,
        // whose crossing is a fall through half bus.
        let floating = bemf.phase_change(0x24, false, 2);
        assert_eq!(floating, 0);

        // The skip count swallows the commutation transient.
        assert_eq!(bemf.sample(100, 1000, 0, true, 2, 8500), BemfAction::None);
        assert_eq!(bemf.sample(100, 1000, 10, true, 2, 8500), BemfAction::None);

        // Above half bus: no crossing yet.
        assert_eq!(bemf.sample(700, 1000, 20, true, 2, 8500), BemfAction::None);
        // Falls through 500: crossing detected, commutation scheduled and
        // the synthetic next-hall published.
        match bemf.sample(400, 1000, 30, true, 2, 8500) {
            BemfAction::Schedule { ticks } => assert!(ticks >= 1),
            action => panic!("expected a scheduled commutation, got {action:?}"),
        }
        assert_eq!(bemf.next_hall(), 5);

        // Further samples in the same interval are ignored.
        assert_eq!(bemf.sample(100, 1000, 40, true, 2, 8500), BemfAction::None);
    }

    #[test]
    fn bemf_idle_envelope_sees_a_spinning_rotor() {
        let mut bemf = BemfEstimator::new();
        // A swinging floating phase while stopped means the rotor is still
        // turning.
        for cycle in 0..200u32 {
            let sample = if cycle % 2 == 0 { 200 } else { 800 };
            bemf.idle_sample(sample);
        }
        assert!(bemf.bemf_mv() > 10_000);

        // A flat phase voltage decays the envelope back toward zero.
        for _ in 0..5000 {
            bemf.idle_sample(500);
        }
        assert!(bemf.bemf_mv() < 1_000);
    }

    #[test]
    fn linear_hall_thresholds_with_hysteresis() {
        let mut linear = LinearHall::new();

        // All three channels low: code 0, no change reported from 0.
        assert_eq!(linear.process(&[100, 100, 100], 0, 1), None);
        // Channel A swings high: code becomes 1.
        assert_eq!(linear.process(&[900, 100, 100], 10, 1), Some(1));
        // Mid-band readings hold the previous code (hysteresis).
        assert_eq!(linear.process(&[500, 500, 500], 20, 1), None);
        assert_eq!(linear.value(), 1);
        // A and C high: code 5.
        assert_eq!(linear.process(&[900, 100, 900], 30, 1), Some(5));
    }

    #[test]
    fn six_step_current_windows_average_per_phase() {
        let mut current = CurrentSense::new(CurrentCalibration::default());

        // Phase A window accumulates a peak.
        current.select_phase(0x06); // A low side active
        current.sample(400);
        current.sample(450);
        current.sample(420);

        // Commutating to a B window closes the A measurement.
        current.select_phase(0x18);
        current.rollover(24_000, 32_768);
        let first = current.motor_ma();
        assert!(first > 0);
        assert!(current.motor_mw() > 0);

        // No phase change, no new conversion.
        current.rollover(24_000, 32_768);
        assert_eq!(current.motor_ma(), first);
    }

    #[test]
    fn bus_and_temperature_calibrations_settle() {
        let mut bus = BusSense::default();
        // 205 counts is about 24 V through the divider; the 7:1 filter
        // needs a few samples to get there.
        let mut millivolts = 0;
        for _ in 0..100 {
            millivolts = bus.update(205);
        }
        assert!(millivolts.abs_diff(24_000) < 500, "bus {millivolts}");

        let mut temp = TempSense::default();
        let mut celsius = 0;
        for _ in 0..100 {
            celsius = temp.update(500);
        }
        // The count filter settles at 499: (59960 - 49900) / 356.
        assert_eq!(celsius, 28);
    }
}
