#[cfg(test)]
mod tests {
    use vfdrive::fixed_point::{from_whole_milli, lmul, to_whole_milli, Angle, Q16_SHIFT};

    #[test]
    fn lmul_is_a_floored_64_bit_product() {
        // 1.5 * 0.5 = 0.75
        assert_eq!(lmul(0x0001_8000, 0x0000_8000), 0x0000_C000);
        assert_eq!(lmul(-65536, 3), -3);
        // The shift floors toward negative infinity, not toward zero.
        assert_eq!(lmul(-1, 1), -1);
        assert_eq!(lmul(1, 1), 0);
    }

    #[test]
    fn whole_milli_round_trips() {
        let value = from_whole_milli(42, 500, Q16_SHIFT);
        assert_eq!(value, (42 << 16) + 32768);
        assert_eq!(to_whole_milli(value, Q16_SHIFT), (42, 500));
    }

    #[test]
    fn angle_advance_wraps_mod_2_to_32() {
        // Advancing N times by D lands exactly where one advance of N*D
        // does, wrap included.
        let delta = 0x1234_5678;
        let steps = 1000;

        let mut stepped = Angle(0xFFFF_0000);
        for _ in 0..steps {
            stepped.advance(delta, 1);
        }
        let mut jumped = Angle(0xFFFF_0000);
        jumped.advance(delta, steps);

        assert_eq!(stepped, jumped);
        assert_eq!(
            stepped.0,
            0xFFFF_0000u32.wrapping_add(delta.wrapping_mul(steps))
        );
    }

    #[test]
    fn angle_delta_matches_drive_math() {
        // 60.0 Hz at a 20 kHz carrier: 1/333.3 of a revolution per period.
        let delta = Angle::delta_from_frequency(60 << 16, 20_000);
        let expected = ((60u64 << 32) / 20_000) as u32;
        let diff = delta.abs_diff(expected);
        assert!(diff < 1024, "delta {delta} expected {expected}");

        // 3000 RPM, 2 pole pairs: 100 electrical Hz.
        let delta = Angle::delta_from_speed(3000 << 14, 20_000, 2);
        let expected = ((100u64 << 32) / 20_000) as u32;
        let diff = delta.abs_diff(expected);
        assert!(diff < (1 << 20), "delta {delta} expected {expected}");
    }

    #[test]
    fn degrees_cover_the_circle() {
        assert_eq!(Angle::from_degrees(0), Angle(0));
        // Quarter and half revolutions land within the staged-divide
        // granularity.
        let quarter = Angle::from_degrees(90).0;
        assert!(quarter.abs_diff(0x4000_0000) < 0x0010_0000);
        let half = Angle::from_degrees(180).0;
        assert!(half.abs_diff(0x8000_0000) < 0x0010_0000);
    }
}
