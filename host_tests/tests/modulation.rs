#[cfg(test)]
mod tests {
    use vfdrive::fixed_point::Angle;
    use vfdrive::modulation::sine::{bus_compensate, modulate, modulate_single_phase, sine};
    use vfdrive::modulation::space_vector;
    use vfdrive::modulation::trapezoid::{PhaseDrive, PhaseEnable, STARTUP_SEQUENCE};

    #[test]
    fn sine_hits_the_cardinal_points() {
        assert_eq!(sine(Angle(0)), 0);
        assert_eq!(sine(Angle(0x4000_0000)), 65536);
        assert_eq!(sine(Angle(0x8000_0000)), 0);
        assert_eq!(sine(Angle(0xC000_0000)), -65536);
    }

    #[test]
    fn sine_is_monotonic_in_the_first_quadrant() {
        let mut previous = -1;
        for step in 0..=256u32 {
            let value = sine(Angle(step << 22));
            assert!(value >= previous, "sine dipped at step {step}");
            previous = value;
        }
    }

    #[test]
    fn three_phase_duties_sum_to_a_constant_at_full_amplitude() {
        // The three-phase identity: sin(θ) + sin(θ+120°) + sin(θ-120°) = 0,
        // so the duty cycles must sum to 1.5 at every angle, give or take
        // table interpolation.
        let mut duty_cycles = [0u32; 3];
        for step in 0..4096u32 {
            let angle = Angle(step << 20);
            modulate(angle, 65536, &mut duty_cycles);
            let sum: u32 = duty_cycles.iter().sum();
            assert!(
                sum.abs_diff(3 * 32768) <= 32,
                "duty sum {sum} at step {step}"
            );
        }
    }

    #[test]
    fn over_modulation_clips_instead_of_wrapping() {
        let mut duty_cycles = [0u32; 3];
        // 125% amplitude: the peaks must clip exactly to the rails.
        modulate(Angle(0x4000_0000), (65536 * 5) / 4, &mut duty_cycles);
        assert_eq!(duty_cycles[0], 65536);
        for &duty in &duty_cycles {
            assert!(duty <= 65536);
        }
    }

    #[test]
    fn single_phase_drives_two_windings_in_antiphase() {
        let mut duty_cycles = [0u32; 3];
        modulate_single_phase(Angle(0x4000_0000), 65536, &mut duty_cycles);
        assert_eq!(duty_cycles[0], 65536);
        assert_eq!(duty_cycles[1], 0);
        assert_eq!(duty_cycles[2], 0);
    }

    #[test]
    fn bus_compensation_caps_and_floors() {
        // Sagging bus boosts the amplitude, clamped below the floor
        // voltage and capped at 125%.
        assert_eq!(bus_compensate(65536, 200_000, 325_000, 260_000), 81_920);
        // High bus pulls the amplitude down.
        let reduced = bus_compensate(65536, 400_000, 325_000, 260_000);
        assert!(reduced < 65536);
        assert_eq!(reduced, (65536u64 * 325_000 / 400_000) as u32);
        // Nominal bus is unity.
        assert_eq!(bus_compensate(65536, 325_000, 325_000, 260_000), 65536);
    }

    #[test]
    fn space_vector_duties_stay_in_range() {
        let mut duty_cycles = [0u32; 3];
        for step in 0..4096u32 {
            space_vector::modulate(Angle(step << 20), 65536, &mut duty_cycles);
            for &duty in &duty_cycles {
                assert!(duty <= 65536, "duty {duty} out of range at step {step}");
            }
        }
        // Zero amplitude splits the whole period between the null vectors.
        space_vector::modulate(Angle(0x2000_0000), 0, &mut duty_cycles);
        assert_eq!(duty_cycles, [32768; 3]);
    }

    #[test]
    fn every_valid_hall_state_drives_one_pair() {
        for hall in 1..=6u8 {
            let drive = PhaseEnable::for_hall(hall).unwrap();
            let highs = drive.0.iter().filter(|&&d| d == PhaseDrive::High).count();
            let lows = drive.0.iter().filter(|&&d| d == PhaseDrive::Low).count();
            let floats = drive.0.iter().filter(|&&d| d == PhaseDrive::Float).count();
            assert_eq!((highs, lows, floats), (1, 1, 1), "hall {hall}");
        }
        assert!(PhaseEnable::for_hall(0).is_none());
        assert!(PhaseEnable::for_hall(7).is_none());
    }

    #[test]
    fn reverse_swaps_roles_within_the_pair() {
        for hall in 1..=6u8 {
            let forward = PhaseEnable::for_hall(hall).unwrap();
            let reverse = forward.reversed();
            for phase in 0..3 {
                match forward.0[phase] {
                    PhaseDrive::High => assert_eq!(reverse.0[phase], PhaseDrive::Low),
                    PhaseDrive::Low => assert_eq!(reverse.0[phase], PhaseDrive::High),
                    PhaseDrive::Float => assert_eq!(reverse.0[phase], PhaseDrive::Float),
                }
            }
            // Double reversal is the identity.
            assert_eq!(reverse.reversed(), forward);
        }
    }

    #[test]
    fn enable_mask_uses_high_low_bit_pairs() {
        // Hall 5 drives B+ A- (the sensorless alignment pattern).
        let drive = PhaseEnable::for_hall(5).unwrap();
        assert_eq!(drive.0[0], PhaseDrive::Low);
        assert_eq!(drive.0[1], PhaseDrive::High);
        assert_eq!(drive.0[2], PhaseDrive::Float);
        assert_eq!(drive.enable_mask(), 0x06);
        assert_eq!(drive.floating_phase(), Some(2));
    }

    #[test]
    fn sixty_degree_codes_translate_to_valid_patterns() {
        for hall in [0u8, 1, 3, 4, 6, 7] {
            assert!(
                PhaseEnable::for_hall_60(hall).is_some(),
                "60-degree code {hall} has no drive pattern"
            );
        }
    }

    #[test]
    fn startup_sequence_walks_all_six_steps() {
        let mut seen = [false; 7];
        for &hall in STARTUP_SEQUENCE.iter() {
            assert!(PhaseEnable::for_hall(hall).is_some());
            seen[hall as usize] = true;
        }
        assert_eq!(seen[1..], [true; 6]);
    }
}
