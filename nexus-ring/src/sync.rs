//! Switches between `std` and `loom` primitives.
//!
//! Build with `RUSTFLAGS="--cfg loom"` to run the model-checking tests. The
//! `UnsafeCell` wrapper exposes loom's closure-based API under `std` too, so
//! the queue code is written once.

#![allow(unused_imports)]

#[cfg(loom)]
pub(crate) use loom::cell::UnsafeCell;
#[cfg(loom)]
pub(crate) use loom::sync::Arc;
#[cfg(loom)]
pub(crate) use loom::sync::atomic::{AtomicUsize, Ordering};

#[cfg(not(loom))]
pub(crate) use std::sync::Arc;
#[cfg(not(loom))]
pub(crate) use std::sync::atomic::{AtomicUsize, Ordering};

#[cfg(not(loom))]
#[derive(Debug)]
#[repr(transparent)]
pub(crate) struct UnsafeCell<T>(std::cell::UnsafeCell<T>);

#[cfg(not(loom))]
impl<T> UnsafeCell<T> {
    #[inline(always)]
    pub(crate) const fn new(data: T) -> Self {
        Self(std::cell::UnsafeCell::new(data))
    }

    #[inline(always)]
    pub(crate) fn with<R>(&self, f: impl FnOnce(*const T) -> R) -> R {
        f(self.0.get())
    }

    #[inline(always)]
    pub(crate) fn with_mut<R>(&self, f: impl FnOnce(*mut T) -> R) -> R {
        f(self.0.get())
    }
}

/// Backs off between CAS retries.
///
/// Under loom this is a scheduling point so the model can run the thread
/// that would let the retry succeed.
#[cfg(not(loom))]
#[inline(always)]
pub(crate) fn spin(backoff: &crossbeam_utils::Backoff) {
    backoff.spin();
}

#[cfg(loom)]
#[inline(always)]
pub(crate) fn spin(_backoff: &crossbeam_utils::Backoff) {
    loom::hint::spin_loop();
}
