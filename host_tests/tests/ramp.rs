#[cfg(test)]
mod tests {
    use vfdrive::drive::ramp::{Ramp, RampLimits, RampStep};

    fn limits() -> RampLimits {
        RampLimits {
            nominal_accel: 100,
            nominal_decel: 100,
            accel_current_ma: 10_000,
            decel_volts: 400,
            recovery: 65536 / 4,
        }
    }

    fn fresh_ramp() -> Ramp {
        let mut ramp = Ramp::new(16);
        ramp.reset_rates(&limits());
        ramp
    }

    #[test]
    fn accelerates_and_clamps_exactly_to_target() {
        let mut ramp = fresh_ramp();
        let target = 10 << 16;

        // 100 milli-units per tick reaches 10.0 in exactly 100 ticks.
        for tick in 1..100 {
            let step = ramp.step(target, &limits(), 0, 0, 0);
            assert_eq!(step, RampStep::Accelerating, "tick {tick}");
            assert!(ramp.value() < target);
        }
        assert_eq!(ramp.step(target, &limits(), 0, 0, 0), RampStep::ReachedTarget);
        assert_eq!(ramp.value(), target);
    }

    #[test]
    fn holding_at_target_is_idempotent() {
        let mut ramp = fresh_ramp();
        let target = 5 << 16;
        while ramp.step(target, &limits(), 0, 0, 0) != RampStep::ReachedTarget {}

        for _ in 0..1000 {
            assert_eq!(ramp.step(target, &limits(), 0, 0, 0), RampStep::AtTarget);
            assert_eq!(ramp.value(), target);
        }
    }

    #[test]
    fn decelerates_to_zero_through_the_borrow_arithmetic() {
        let mut ramp = fresh_ramp();
        ramp.sync_to(2 << 16);

        let mut reached = false;
        for _ in 0..2100 {
            match ramp.step(0, &limits(), 0, 0, 0) {
                RampStep::Decelerating => {}
                RampStep::ReachedZero => {
                    reached = true;
                    break;
                }
                step => panic!("unexpected {step:?}"),
            }
        }
        assert!(reached);
        assert_eq!(ramp.value(), 0);
        assert_eq!(ramp.whole(), 0);
    }

    #[test]
    fn deceleration_clamps_to_a_nonzero_target() {
        let mut ramp = fresh_ramp();
        ramp.sync_to(3 << 16);
        let target = 2 << 16;

        loop {
            match ramp.step(target, &limits(), 0, 0, 0) {
                RampStep::Decelerating => {}
                RampStep::ReachedTarget => break,
                step => panic!("unexpected {step:?}"),
            }
        }
        assert_eq!(ramp.value(), target);
    }

    #[test]
    fn zero_floor_snaps_a_sensorless_ramp_down() {
        let mut ramp = Ramp::new(14);
        ramp.reset_rates(&limits());
        ramp.sync_to(2500 << 14);

        // With a floor at 2400 the output snaps to zero as soon as the
        // whole part dips below it, well before a natural zero.
        let mut steps = 0;
        loop {
            steps += 1;
            if ramp.step(0, &limits(), 0, 0, 2400) == RampStep::ReachedZero {
                break;
            }
            assert!(steps < 5000, "never hit the floor");
        }
        assert_eq!(ramp.value(), 0);
    }

    #[test]
    fn over_current_throttles_acceleration_then_recovers() {
        let mut throttled = fresh_ramp();
        let mut free = fresh_ramp();
        let target = 100 << 16;

        // 500 mA over the threshold (inside the proportional window).
        for _ in 0..100 {
            throttled.step(target, &limits(), 10_100, 0, 0);
            free.step(target, &limits(), 0, 0, 0);
        }
        assert!(
            throttled.value() < free.value(),
            "throttled ramp kept up with the unthrottled one"
        );

        // Current back to normal: the rate recovers and progress resumes
        // at full speed eventually.
        let before = throttled.value();
        for _ in 0..2000 {
            throttled.step(target, &limits(), 0, 0, 0);
        }
        assert!(throttled.value() > before);
    }

    #[test]
    fn high_bus_voltage_throttles_deceleration() {
        let mut throttled = fresh_ramp();
        let mut free = fresh_ramp();
        throttled.sync_to(50 << 16);
        free.sync_to(50 << 16);

        // 30 V over the regeneration threshold (inside the 63 V window).
        for _ in 0..100 {
            throttled.step(0, &limits(), 0, 430_000, 0);
            free.step(0, &limits(), 0, 0, 0);
        }
        assert!(
            throttled.value() > free.value(),
            "regeneration-limited ramp fell as fast as the free one"
        );
    }
}
