//! Variant-agnostic producer and consumer traits.
//!
//! Every producer handle implements [`Enqueue`] and every consumer handle
//! implements [`Dequeue`]; [`MpmcQueue`](crate::MpmcQueue) implements both.
//! Code that only needs "somewhere to put items" can be written once and
//! handed whichever variant fits its thread topology.
//!
//! ```
//! use nexus_ring::{Dequeue, Enqueue, mpsc, spsc};
//!
//! fn fill(tx: &impl Enqueue<u32>, n: u32) -> u32 {
//!     (0..n).filter(|&i| tx.push(i)).count() as u32
//! }
//!
//! let (tx, rx) = spsc::channel(4);
//! assert_eq!(fill(&tx, 10), 4);
//! assert_eq!(rx.pop(), Some(0));
//!
//! let (tx, _rx) = mpsc::channel(8);
//! assert_eq!(fill(&tx, 10), 8);
//! ```

use std::sync::Arc;

use crate::error::Full;

/// The producing side of a bounded queue.
pub trait Enqueue<T> {
    /// Attempts to enqueue `value` without blocking.
    ///
    /// # Errors
    ///
    /// Returns [`Full`] carrying `value` if there is no free slot.
    fn try_push(&self, value: T) -> Result<(), Full<T>>;

    /// Enqueues `value`, returning `false` if the queue was full.
    ///
    /// A rejected value is dropped.
    #[inline]
    fn push(&self, value: T) -> bool {
        self.try_push(value).is_ok()
    }

    /// The realized capacity of the queue.
    fn capacity(&self) -> usize;
}

/// The consuming side of a bounded queue.
pub trait Dequeue<T> {
    /// Dequeues the next available item, or `None` if there is nothing to take
    /// right now.
    fn pop(&self) -> Option<T>;
}

impl<T, Q: Enqueue<T> + ?Sized> Enqueue<T> for &Q {
    #[inline]
    fn try_push(&self, value: T) -> Result<(), Full<T>> {
        (**self).try_push(value)
    }

    #[inline]
    fn capacity(&self) -> usize {
        (**self).capacity()
    }
}

impl<T, Q: Dequeue<T> + ?Sized> Dequeue<T> for &Q {
    #[inline]
    fn pop(&self) -> Option<T> {
        (**self).pop()
    }
}

impl<T, Q: Enqueue<T> + ?Sized> Enqueue<T> for Arc<Q> {
    #[inline]
    fn try_push(&self, value: T) -> Result<(), Full<T>> {
        (**self).try_push(value)
    }

    #[inline]
    fn capacity(&self) -> usize {
        (**self).capacity()
    }
}

impl<T, Q: Dequeue<T> + ?Sized> Dequeue<T> for Arc<Q> {
    #[inline]
    fn pop(&self) -> Option<T> {
        (**self).pop()
    }
}
