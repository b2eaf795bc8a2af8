//! Error types shared by every queue variant.

use std::fmt;

use crate::ring::MAX_CAPACITY;

/// Returned by `try_push` when the queue has no free slot.
///
/// Capacity pressure is an expected condition, so the rejected value is
/// handed back rather than dropped.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Full<T>(pub T);

impl<T> Full<T> {
    /// Returns the value that couldn't be pushed.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> fmt::Display for Full<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "queue is full")
    }
}

impl<T> fmt::Debug for Full<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Full").finish_non_exhaustive()
    }
}

impl<T> std::error::Error for Full<T> {}

/// The requested capacity cannot be rounded up to a power of two that fits
/// in a `usize`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error(
    "requested capacity {requested} exceeds the maximum ring capacity of {max}",
    max = MAX_CAPACITY
)]
pub struct CapacityError {
    requested: usize,
}

impl CapacityError {
    pub(crate) const fn new(requested: usize) -> Self {
        Self { requested }
    }

    /// The capacity that was asked for.
    pub const fn requested(&self) -> usize {
        self.requested
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_returns_value() {
        let err = Full(String::from("payload"));
        assert_eq!(err.to_string(), "queue is full");
        assert_eq!(err.into_inner(), "payload");
    }

    #[test]
    fn full_debug_does_not_need_debug_payload() {
        struct Opaque;
        assert_eq!(format!("{:?}", Full(Opaque)), "Full(..)");
    }

    #[test]
    fn capacity_error_message() {
        let err = CapacityError::new(usize::MAX);
        assert_eq!(err.requested(), usize::MAX);
        assert!(err.to_string().contains(&MAX_CAPACITY.to_string()));
    }
}
