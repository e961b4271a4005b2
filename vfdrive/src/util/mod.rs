pub mod buffered_state;
pub mod spin_lock;

#[cfg(not(feature = "host"))]
pub mod interrupts;

/// Busy-wait until a condition holds. Only used during initialization,
/// before any control loop is active.
#[macro_export]
macro_rules! block_while {
    ($condition:expr) => {
        while $condition {}
    };
}

#[macro_export]
macro_rules! block_until {
    ($condition:expr) => {
        $crate::block_while!(!$condition)
    };
}
