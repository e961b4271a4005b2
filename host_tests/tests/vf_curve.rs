#[cfg(test)]
mod tests {
    use vfdrive::vf_curve::{VfCurve, VF_TABLE_LEN};

    #[test]
    fn linear_curve_interpolates_between_points() {
        let max = 60 << 16;
        let curve = VfCurve::linear(max);

        assert_eq!(curve.amplitude(0), 0);
        assert_eq!(curve.amplitude(max), 65536);
        // Past the table the last entry holds.
        assert_eq!(curve.amplitude(max * 2), 65536);
        // Halfway lands within interpolation rounding of half amplitude.
        let mid = curve.amplitude(max / 2);
        assert!(mid.abs_diff(32768) <= 2, "midpoint {mid}");
    }

    #[test]
    fn custom_tables_interpolate_per_segment() {
        let max = 100 << 16;
        let mut curve = VfCurve::linear(max);
        // A boost curve: constant 50% over the first quarter of the span.
        for entry in curve.table.iter_mut().take(VF_TABLE_LEN / 4) {
            *entry = 32768;
        }

        assert_eq!(curve.amplitude(0), 32768);
        let span = max / (VF_TABLE_LEN as u32 - 1);
        // Inside the flat region interpolation holds the boost level.
        assert_eq!(curve.amplitude(span / 2), 32768);
        // And the top of the curve is unchanged.
        assert_eq!(curve.amplitude(max), 65536);
    }
}
