//! Rotor and electrical feedback estimation.
//!
//! Every estimator here is pure state-plus-arithmetic: the interrupt glue
//! feeds in timestamped samples and applies whatever the estimator asks for
//! (a commutation, a timer program) to the peripherals.

pub mod bemf;
pub mod current;
pub mod edge_filter;
pub mod encoder;
pub mod hall;
pub mod linear_hall;

/// Measurements produced on the ADC interrupt path and consumed by the
/// millisecond tick and the telemetry surface. Published through a
/// double-buffered cell; readers always see a consistent committed batch.
#[derive(Clone, Copy, Debug, Default)]
pub struct Measurements {
    /// Filtered DC bus voltage in millivolts.
    pub bus_mv: u32,
    /// Filtered ambient temperature in degrees Celsius.
    pub temperature_c: i16,
    /// Filtered motor winding current in milliamps.
    pub motor_ma: i32,
    /// Filtered electrical power estimate in milliwatts.
    pub motor_mw: u32,
    /// Last computed per-phase currents in milliamps.
    pub phase_ma: [i32; 3],
    /// Rotor speed from back-EMF zero crossings, RPM.
    pub bemf_rpm: u32,
    /// Rotor speed from the linear hall decoder, RPM.
    pub linear_rpm: u32,
    /// Idle-time back-EMF amplitude envelope in millivolts; nonzero while
    /// the unpowered rotor is still turning.
    pub bemf_mv: u32,
}

impl Measurements {
    /// Const-context zero value for static buffered cells.
    pub const ZERO: Measurements = Measurements {
        bus_mv: 0,
        temperature_c: 0,
        motor_ma: 0,
        motor_mw: 0,
        phase_ma: [0; 3],
        bemf_rpm: 0,
        linear_rpm: 0,
        bemf_mv: 0,
    };
}
