#[cfg(test)]
mod tests {
    use host_tests::{
        bldc_measurements, induction_measurements, run_ticks, MockBrake, MockPwm, MockTimer,
        OutputState,
    };
    use vfdrive::drive::faults::Fault;
    use vfdrive::drive::state::{MotorStatus, Phase};
    use vfdrive::drive::MotorDrive;
    use vfdrive::modulation::PhaseEnable;
    use vfdrive::params::{Direction, DriveParameters};
    use vfdrive::sensing::Measurements;

    fn induction_drive() -> (MotorDrive, MockPwm, MockBrake) {
        let mut drive = MotorDrive::new(DriveParameters::induction_defaults());
        drive.set_target_frequency(300); // 30.0 Hz
        (drive, MockPwm::new(), MockBrake::default())
    }

    fn bldc_drive() -> (MotorDrive, MockPwm, MockBrake) {
        let mut drive = MotorDrive::new(DriveParameters::bldc_defaults());
        drive.set_target_speed(3000);
        (drive, MockPwm::new(), MockBrake::default())
    }

    /// Ticks until the sensorless drive reaches closed-loop run, servicing
    /// the startup effects the way the interrupt glue would.
    fn run_sensorless_to_handoff(
        drive: &mut MotorDrive,
        pwm: &mut MockPwm,
        brake: &mut MockBrake,
        timer: &mut MockTimer,
        measurements: &Measurements,
    ) -> u32 {
        drive.run(pwm);
        assert_eq!(drive.state().phase, Phase::Precharge);

        let mut ticks = 0;
        while drive.state().phase != Phase::Run {
            let effects = drive.millisecond_tick(measurements, pwm, brake);
            if effects.kick_start_commutation {
                drive.commutation_tick(0, pwm, timer);
            }
            ticks += 1;
            assert!(ticks < 20_000, "startup never finished");
            assert!(
                matches!(
                    drive.state().phase,
                    Phase::Precharge | Phase::Startup | Phase::Run
                ),
                "unexpected phase {:?}",
                drive.state().phase
            );
        }
        ticks
    }

    #[test]
    fn induction_cold_start_reaches_run_and_ramps() {
        let (mut drive, mut pwm, mut brake) = induction_drive();
        let measurements = induction_measurements();

        drive.run(&mut pwm);
        assert_eq!(drive.state().phase, Phase::Precharge);
        assert_eq!(drive.state().direction, Direction::Forward);
        assert_eq!(pwm.output, OutputState::Precharge);

        // Precharge runs its timer out, then the bridge comes up with the
        // output at zero.
        run_ticks(&mut drive, &measurements, &mut pwm, &mut brake, 4);
        assert_eq!(drive.state().phase, Phase::Run);
        assert_eq!(pwm.output, OutputState::On);
        assert_eq!(drive.output(), 0);

        // The frequency ramps toward the 30 Hz target at the configured
        // accel rate and the status reads accelerating.
        run_ticks(&mut drive, &measurements, &mut pwm, &mut brake, 100);
        assert_eq!(drive.status(), MotorStatus::Accelerating);
        let early = drive.output();
        assert!(early > 0);

        run_ticks(&mut drive, &measurements, &mut pwm, &mut brake, 100);
        assert!(drive.output() > early);
    }

    #[test]
    fn waveform_updates_honor_the_update_rate() {
        let (mut drive, mut pwm, mut brake) = induction_drive();
        let measurements = induction_measurements();
        drive.run(&mut pwm);
        run_ticks(&mut drive, &measurements, &mut pwm, &mut brake, 200);

        // One pending period at update rate 0: exactly one duty write.
        pwm.period_count = 1;
        let writes_before = pwm.duty_writes;
        drive.waveform_tick(&mut pwm);
        assert_eq!(pwm.duty_writes, writes_before + 1);
        assert_eq!(pwm.period_count, 0);

        // Three pending periods are drained in one call, never dropped.
        pwm.period_count = 3;
        drive.waveform_tick(&mut pwm);
        assert_eq!(pwm.period_count, 0);
    }

    #[test]
    fn waveform_idles_while_stopped_but_retires_periods() {
        let (mut drive, mut pwm, _) = induction_drive();
        pwm.period_count = 7;
        drive.waveform_tick(&mut pwm);
        assert_eq!(pwm.duty_writes, 0);
        assert_eq!(pwm.period_count, 0);
    }

    #[test]
    fn overcurrent_trips_within_one_tick_and_latches() {
        let (mut drive, mut pwm, mut brake) = bldc_drive();
        let mut measurements = bldc_measurements();
        // Sensored sine so the test does not need the startup dance.
        drive.params.modulation = vfdrive::modulation::Modulation::Sine;

        drive.run(&mut pwm);
        run_ticks(&mut drive, &measurements, &mut pwm, &mut brake, 10);
        assert_eq!(drive.state().phase, Phase::Run);

        // One tick with the current above the limit shuts everything off.
        measurements.motor_ma = drive.params.max_current_ma + 1;
        drive.millisecond_tick(&measurements, &mut pwm, &mut brake);
        assert_eq!(drive.state().phase, Phase::Stopped);
        assert_eq!(pwm.output, OutputState::Off);
        assert!(drive.faults().is_set(Fault::CurrentHigh));

        // Run requests are vetoed while the fault is latched.
        drive.run(&mut pwm);
        assert_eq!(drive.state().phase, Phase::Stopped);
        assert_eq!(pwm.output, OutputState::Off);

        // Clearing helps only until the next monitor tick re-latches the
        // still-present condition.
        drive.clear_faults();
        assert!(!drive.faults().is_set(Fault::CurrentHigh));
        drive.millisecond_tick(&measurements, &mut pwm, &mut brake);
        assert!(drive.faults().is_set(Fault::CurrentHigh));

        // With the condition gone and the fault cleared, running works
        // again.
        measurements.motor_ma = 500;
        drive.clear_faults();
        drive.run(&mut pwm);
        assert_eq!(drive.state().phase, Phase::Precharge);
    }

    #[test]
    fn stall_faults_on_exactly_the_configured_tick() {
        let (mut drive, mut pwm, mut brake) = induction_drive();
        let measurements = induction_measurements();

        drive.run(&mut pwm);
        run_ticks(&mut drive, &measurements, &mut pwm, &mut brake, 4);
        assert_eq!(drive.state().phase, Phase::Run);

        // Measured speed is pinned at zero (no encoder edges ever arrive).
        run_ticks(&mut drive, &measurements, &mut pwm, &mut brake, 1499);
        assert!(
            !drive.faults().is_set(Fault::Stall),
            "stall tripped a tick early"
        );

        drive.millisecond_tick(&measurements, &mut pwm, &mut brake);
        assert!(drive.faults().is_set(Fault::Stall));
        assert_eq!(drive.state().phase, Phase::Stopped);
        assert_eq!(pwm.output, OutputState::Off);
    }

    #[test]
    fn reversal_decays_to_zero_then_swaps_direction() {
        let (mut drive, mut pwm, mut brake) = induction_drive();
        let measurements = induction_measurements();
        drive.set_target_frequency(20); // 2.0 Hz, to keep the test quick

        drive.run(&mut pwm);
        run_ticks(&mut drive, &measurements, &mut pwm, &mut brake, 4);
        while drive.status() != MotorStatus::Running {
            run_ticks(&mut drive, &measurements, &mut pwm, &mut brake, 1);
        }
        assert_eq!(drive.state().direction, Direction::Forward);

        // The reversal request keeps the current rotation direction while
        // the output decays toward zero.
        drive.set_direction(false);
        assert_eq!(drive.state().phase, Phase::Reversing);
        assert_eq!(drive.state().direction, Direction::Forward);

        let mut ticks = 0;
        while drive.state().phase == Phase::Reversing {
            run_ticks(&mut drive, &measurements, &mut pwm, &mut brake, 1);
            ticks += 1;
            assert!(ticks < 5000, "reversal never completed");
        }
        assert_eq!(drive.state().phase, Phase::Run);
        assert_eq!(drive.state().direction, Direction::Backward);
        assert_eq!(drive.output(), 0);

        // And the output climbs again toward the (unchanged) target.
        run_ticks(&mut drive, &measurements, &mut pwm, &mut brake, 200);
        assert!(drive.output() > 0);

        // A reversal abandoned mid-decay resumes the current direction.
        drive.set_direction(true);
        assert_eq!(drive.state().phase, Phase::Reversing);
        drive.set_direction(false);
        assert_eq!(drive.state().phase, Phase::Run);
        assert_eq!(drive.state().direction, Direction::Backward);
    }

    #[test]
    fn sensorless_startup_hands_off_without_discontinuity() {
        let (mut drive, mut pwm, mut brake) = bldc_drive();
        let mut timer = MockTimer::default();
        let mut measurements = bldc_measurements();
        // Rotor spinning at the open-loop rate by the time the handoff
        // window closes.
        measurements.bemf_rpm = drive.params.startup.end_rpm;

        let ticks = run_sensorless_to_handoff(
            &mut drive,
            &mut pwm,
            &mut brake,
            &mut timer,
            &measurements,
        );
        assert!(ticks > drive.params.precharge_ms);

        // The alignment step drove the B+ A- pattern first.
        assert_eq!(pwm.commutations[0], PhaseEnable::for_hall(5).unwrap());
        // The open-loop stepper armed the commutation timer.
        assert!(!timer.scheduled.is_empty());

        // Across the handoff the output (open-loop speed) carries straight
        // into closed loop and the duty cycle does not step.
        let handoff_speed = drive.output() >> 14;
        assert!(handoff_speed >= drive.params.startup.end_rpm);
        let handoff_duty = drive.duty_cycle();
        assert!(handoff_duty > 0);

        drive.millisecond_tick(&measurements, &mut pwm, &mut brake);
        assert_eq!(drive.state().phase, Phase::Run);
        assert!((drive.output() >> 14) >= drive.params.startup.end_rpm);
        let duty_after = drive.duty_cycle();
        assert!(
            handoff_duty.abs_diff(duty_after) < handoff_duty / 10 + 200,
            "duty jumped from {handoff_duty} to {duty_after} at handoff"
        );
    }

    #[test]
    fn sensorless_restart_waits_for_the_rotor() {
        let (mut drive, mut pwm, mut brake) = bldc_drive();
        let mut measurements = bldc_measurements();

        // A rotor still generating back-EMF above the threshold refuses to
        // start.
        measurements.bemf_mv = drive.params.startup.restart_threshold_mv + 100;
        run_ticks(&mut drive, &measurements, &mut pwm, &mut brake, 2);
        drive.run(&mut pwm);
        assert_eq!(drive.state().phase, Phase::Stopped);

        // Once it winds down the start goes through.
        measurements.bemf_mv = 0;
        run_ticks(&mut drive, &measurements, &mut pwm, &mut brake, 2);
        drive.run(&mut pwm);
        assert_eq!(drive.state().phase, Phase::Precharge);
    }

    #[test]
    fn dc_injection_braking_runs_its_timer_then_stops() {
        let (mut drive, mut pwm, mut brake) = induction_drive();
        let measurements = induction_measurements();
        drive.params.dc_brake.enabled = true;
        drive.params.dc_brake.time_ms = 50;
        drive.set_target_frequency(20);

        drive.run(&mut pwm);
        run_ticks(&mut drive, &measurements, &mut pwm, &mut brake, 4);
        while drive.status() != MotorStatus::Running {
            run_ticks(&mut drive, &measurements, &mut pwm, &mut brake, 1);
        }

        drive.stop(&mut pwm);
        assert_eq!(drive.state().phase, Phase::Stopping);

        let mut ticks = 0;
        while drive.state().phase == Phase::Stopping {
            run_ticks(&mut drive, &measurements, &mut pwm, &mut brake, 1);
            ticks += 1;
            assert!(ticks < 5000);
        }
        // Zero output starts DC injection rather than stopping outright.
        assert_eq!(drive.state().phase, Phase::Braking);
        assert!(matches!(pwm.output, OutputState::DcBrake { .. }));

        run_ticks(&mut drive, &measurements, &mut pwm, &mut brake, 50);
        assert_eq!(drive.state().phase, Phase::Stopped);
        assert_eq!(pwm.output, OutputState::Off);
    }

    #[test]
    fn run_resumes_a_stop_in_progress() {
        let (mut drive, mut pwm, mut brake) = induction_drive();
        let measurements = induction_measurements();

        drive.run(&mut pwm);
        run_ticks(&mut drive, &measurements, &mut pwm, &mut brake, 50);
        drive.stop(&mut pwm);
        assert_eq!(drive.state().phase, Phase::Stopping);

        drive.run(&mut pwm);
        assert_eq!(drive.state().phase, Phase::Run);
    }

    #[test]
    fn emergency_stop_zeroes_everything_immediately() {
        let (mut drive, mut pwm, mut brake) = induction_drive();
        let measurements = induction_measurements();

        drive.run(&mut pwm);
        run_ticks(&mut drive, &measurements, &mut pwm, &mut brake, 500);
        assert!(drive.output() > 0);

        drive.fault_stop(Fault::EmergencyStop, &mut pwm);
        assert_eq!(drive.state().phase, Phase::Stopped);
        assert_eq!(drive.output(), 0);
        assert_eq!(drive.duty_cycle(), 0);
        assert_eq!(pwm.output, OutputState::Off);
        assert_eq!(pwm.duty, [0, 0, 0]);
        assert!(drive.faults().is_set(Fault::EmergencyStop));
    }
}
