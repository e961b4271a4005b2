#[cfg(test)]
mod tests {
    use host_tests::MockBrake;
    use vfdrive::drive::brake::DynamicBrake;
    use vfdrive::params::DynBrakeConfig;

    fn config() -> DynBrakeConfig {
        DynBrakeConfig {
            enabled: true,
            on_mv: 380_000,
            off_mv: 360_000,
            max_ms: 100,
            cool_ms: 50,
        }
    }

    #[test]
    fn engages_above_on_threshold_and_releases_below_off() {
        let mut brake = DynamicBrake::new();
        let mut pin = MockBrake::default();
        let config = config();

        brake.tick(350_000, &config, &mut pin);
        assert!(!pin.engaged);

        brake.tick(385_000, &config, &mut pin);
        assert!(pin.engaged);

        // Hysteresis: between the thresholds it stays on.
        brake.tick(370_000, &config, &mut pin);
        assert!(pin.engaged);

        brake.tick(355_000, &config, &mut pin);
        assert!(!pin.engaged);
    }

    #[test]
    fn disabled_config_never_engages() {
        let mut brake = DynamicBrake::new();
        let mut pin = MockBrake::default();
        let mut config = config();
        config.enabled = false;

        for _ in 0..100 {
            brake.tick(400_000, &config, &mut pin);
        }
        assert!(!pin.engaged);
    }

    #[test]
    fn overlong_engagement_forces_a_cool_down() {
        let mut brake = DynamicBrake::new();
        let mut pin = MockBrake::default();
        let config = config();

        // Pinned-high bus: the brake holds until its maximum on-time.
        for _ in 0..config.max_ms {
            brake.tick(400_000, &config, &mut pin);
        }
        assert!(!pin.engaged, "brake exceeded its maximum on-time");

        // Still cooling: the bus being high must not re-engage it yet.
        for _ in 0..(config.max_ms - config.cool_ms - 1) {
            brake.tick(400_000, &config, &mut pin);
            assert!(!pin.engaged);
        }

        // Cooled enough and the bus is still high: back on.
        brake.tick(400_000, &config, &mut pin);
        assert!(pin.engaged);
    }
}
