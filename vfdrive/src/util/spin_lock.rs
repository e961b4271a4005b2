//! A minimal spin lock for loaning state to interrupt handlers.
//!
//! Contention here is a design error rather than something to wait out:
//! every lock site either runs with the competing interrupt masked or is
//! the highest-priority toucher of the data. `acquire` therefore panics on
//! a held lock instead of spinning, which catches priority mistakes in
//! development instead of deadlocking silently.

use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, Ordering};

pub struct SpinLock<T> {
    held: AtomicBool,
    value: UnsafeCell<T>,
}

// Safety: the lock hands out at most one guard at a time.
unsafe impl<T: Send> Sync for SpinLock<T> {}

impl<T> SpinLock<T> {
    pub const fn new(value: T) -> SpinLock<T> {
        SpinLock {
            held: AtomicBool::new(false),
            value: UnsafeCell::new(value),
        }
    }

    pub fn try_lock(&self) -> Option<SpinLockGuard<'_, T>> {
        if self
            .held
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            Some(SpinLockGuard { lock: self })
        } else {
            None
        }
    }
}

pub struct SpinLockGuard<'a, T> {
    lock: &'a SpinLock<T>,
}

impl<'a, T> Deref for SpinLockGuard<'a, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Safety: guard existence implies exclusive hold.
        unsafe { &*self.lock.value.get() }
    }
}

impl<'a, T> DerefMut for SpinLockGuard<'a, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.value.get() }
    }
}

impl<'a, T> Drop for SpinLockGuard<'a, T> {
    fn drop(&mut self) {
        self.lock.held.store(false, Ordering::Release);
    }
}

/// Acquires hardware state loaned to an ISR through a
/// `SpinLock<Option<T>>`. Panics if the lock is held (an interrupt
/// priority error) or the state was never donated (an init ordering
/// error).
pub fn acquire<T, R>(lock: &SpinLock<Option<T>>, f: impl FnOnce(&mut T) -> R) -> R {
    let mut guard = lock.try_lock().expect("lock held at ISR entry");
    f(guard.as_mut().expect("ISR fired before init donated state"))
}
