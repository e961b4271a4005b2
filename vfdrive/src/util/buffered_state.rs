//! Double-buffered publication of `Copy` state across interrupt levels.
//!
//! The writer fills the inactive slot and flips the index, so a reader at
//! any lower priority always copies out the last committed value without
//! taking a lock the writer could be blocked on. Single-writer only; the
//! reader can tolerate preemption by one publish during its copy (it gets
//! the older committed batch), which is the consistency the measurement
//! path needs.

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicUsize, Ordering};

pub struct BufferedState<T: Copy> {
    current: AtomicUsize,
    slots: UnsafeCell<[T; 2]>,
}

// Safety: writes go to the slot the index does not select; the index flip
// is the commit point.
unsafe impl<T: Copy + Send> Sync for BufferedState<T> {}

impl<T: Copy> BufferedState<T> {
    pub const fn new(initial: T) -> BufferedState<T> {
        BufferedState {
            current: AtomicUsize::new(0),
            slots: UnsafeCell::new([initial; 2]),
        }
    }

    /// Commits a new value. Must only be called from the single writer
    /// context.
    pub fn publish(&self, value: T) {
        let target = 1 - self.current.load(Ordering::Relaxed);
        // Safety: single-writer discipline; readers never touch the
        // inactive slot.
        unsafe {
            (*self.slots.get())[target] = value;
        }
        self.current.store(target, Ordering::Release);
    }

    /// Copies out the last committed value.
    pub fn read(&self) -> T {
        let index = self.current.load(Ordering::Acquire);
        // Safety: the selected slot is not written until after the next
        // publish flips away from it.
        unsafe { (*self.slots.get())[index] }
    }
}
