//! Single-producer single-consumer (SPSC) bounded queue.
//!
//! Each cursor has exactly one writer, so the protocol needs no
//! read-modify-write operations at all:
//!
//! - The producer writes the slot at `tail`, then publishes `tail + 1` with
//!   `Release`. The consumer loads `tail` with `Acquire` before reading.
//! - The consumer moves the value out of the slot at `head`, then publishes
//!   `head + 1` with `Release`. The producer loads `head` with `Acquire`
//!   before reusing the slot.
//!
//! Each side also caches the other side's cursor and only reloads it when
//! the cached value says the queue is full (producer) or empty (consumer).
//!
//! # Example
//!
//! ```
//! use nexus_ring::spsc;
//!
//! let (tx, rx) = spsc::channel::<u64>(4);
//!
//! for i in 1..=3 {
//!     tx.try_push(i).unwrap();
//! }
//!
//! assert_eq!(rx.pop(), Some(1));
//! assert_eq!(rx.pop(), Some(2));
//! assert_eq!(rx.pop(), Some(3));
//! assert_eq!(rx.pop(), None);
//! ```
//!
//! Neither handle can be cloned or shared between threads:
//!
//! ```compile_fail
//! let (tx, _rx) = nexus_ring::spsc::channel::<u64>(4);
//! let tx2 = tx.clone();
//! ```

use std::cell::Cell;
use std::fmt;

use crate::endpoint::{Dequeue, Enqueue};
use crate::error::{CapacityError, Full};
use crate::ring::{Cursors, Ring, Slot};
use crate::sync::{Arc, Ordering};

/// Creates a new SPSC queue and returns its two endpoints.
///
/// The capacity is rounded up to the next power of two (minimum 2); the
/// realized value is available from either handle's `capacity()`.
///
/// # Panics
///
/// Panics if `capacity` exceeds [`MAX_CAPACITY`](crate::ring::MAX_CAPACITY).
///
/// # Example
///
/// ```
/// use nexus_ring::spsc;
///
/// let (tx, rx) = spsc::channel::<String>(100);
/// assert_eq!(tx.capacity(), 128);
/// assert_eq!(rx.capacity(), 128);
/// ```
pub fn channel<T>(capacity: usize) -> (Producer<T>, Consumer<T>) {
    match try_channel(capacity) {
        Ok(pair) => pair,
        Err(err) => panic!("{err}"),
    }
}

/// Fallible form of [`channel`].
///
/// # Errors
///
/// Returns [`CapacityError`] if `capacity` exceeds
/// [`MAX_CAPACITY`](crate::ring::MAX_CAPACITY).
pub fn try_channel<T>(capacity: usize) -> Result<(Producer<T>, Consumer<T>), CapacityError> {
    let shared = Arc::new(Shared {
        cursors: Cursors::new(),
        ring: Ring::plain(capacity)?,
    });
    let capacity = shared.ring.capacity();

    Ok((
        Producer {
            shared: Arc::clone(&shared),
            capacity,
            local_tail: Cell::new(0),
            cached_head: Cell::new(0),
        },
        Consumer {
            shared,
            local_head: Cell::new(0),
            cached_tail: Cell::new(0),
        },
    ))
}

struct Shared<T> {
    cursors: Cursors,
    ring: Ring<Slot<T>>,
}

impl<T> Drop for Shared<T> {
    fn drop(&mut self) {
        let (head, tail) = self.cursors.settled();
        // Safety: both handles are gone; [head, tail) is exactly what was
        // published and not consumed.
        unsafe { self.ring.drop_range(head, tail) };
    }
}

/// The producing half of an SPSC queue.
///
/// Can be moved to another thread but not shared (`Send`, not `Sync`).
pub struct Producer<T> {
    shared: Arc<Shared<T>>,
    capacity: usize,
    /// Our write position; only we advance `tail`.
    local_tail: Cell<usize>,
    /// Last observed consumer position, refreshed only when we look full.
    cached_head: Cell<usize>,
}

impl<T> Producer<T> {
    /// Attempts to enqueue `value` without blocking.
    ///
    /// # Errors
    ///
    /// Returns [`Full`] carrying `value` if all slots are occupied.
    ///
    /// # Example
    ///
    /// ```
    /// use nexus_ring::{Full, spsc};
    ///
    /// let (tx, _rx) = spsc::channel::<u32>(2);
    /// assert!(tx.try_push(1).is_ok());
    /// assert!(tx.try_push(2).is_ok());
    /// assert_eq!(tx.try_push(3), Err(Full(3)));
    /// ```
    #[inline]
    pub fn try_push(&self, value: T) -> Result<(), Full<T>> {
        let tail = self.local_tail.get();

        if tail.wrapping_sub(self.cached_head.get()) >= self.capacity {
            let head = self.shared.cursors.head.load(Ordering::Acquire);
            self.cached_head.set(head);

            if tail.wrapping_sub(head) >= self.capacity {
                return Err(Full(value));
            }
        }

        // Safety: the slot at `tail` was last read at `tail - capacity`, which
        // the consumer released before publishing a head past it.
        unsafe { self.shared.ring.slot(tail).write(value) };

        let next = tail.wrapping_add(1);
        self.shared.cursors.tail.store(next, Ordering::Release);
        self.local_tail.set(next);
        Ok(())
    }

    /// Enqueues `value`, returning `false` (and dropping it) if the queue was
    /// full.
    #[inline]
    pub fn push(&self, value: T) -> bool {
        self.try_push(value).is_ok()
    }

    /// Returns the realized capacity of the queue.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of items currently queued.
    ///
    /// Exact from the producer's point of view only until the consumer moves.
    #[inline]
    pub fn len(&self) -> usize {
        self.shared.cursors.len(self.capacity)
    }

    /// Returns `true` if the queue currently holds no items.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Enqueue<T> for Producer<T> {
    #[inline]
    fn try_push(&self, value: T) -> Result<(), Full<T>> {
        Self::try_push(self, value)
    }

    #[inline]
    fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T> fmt::Debug for Producer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Producer")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

/// The consuming half of an SPSC queue.
///
/// Can be moved to another thread but not shared (`Send`, not `Sync`).
pub struct Consumer<T> {
    shared: Arc<Shared<T>>,
    /// Our read position; only we advance `head`.
    local_head: Cell<usize>,
    /// Last observed producer position, refreshed only when we look empty.
    cached_tail: Cell<usize>,
}

impl<T> Consumer<T> {
    /// Dequeues the oldest item, or returns `None` if the queue is empty.
    #[inline]
    pub fn pop(&self) -> Option<T> {
        let head = self.local_head.get();

        if head == self.cached_tail.get() {
            let tail = self.shared.cursors.tail.load(Ordering::Acquire);
            self.cached_tail.set(tail);

            if head == tail {
                return None;
            }
        }

        // Safety: `head < tail`, and the Acquire load of `tail` that proved it
        // synchronizes with the producer's write of this slot.
        let value = unsafe { self.shared.ring.slot(head).read() };

        let next = head.wrapping_add(1);
        self.shared.cursors.head.store(next, Ordering::Release);
        self.local_head.set(next);
        Some(value)
    }

    /// Returns the realized capacity of the queue.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.shared.ring.capacity()
    }

    /// Returns the number of items currently queued.
    #[inline]
    pub fn len(&self) -> usize {
        self.shared.cursors.len(self.capacity())
    }

    /// Returns `true` if the queue currently holds no items.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Dequeue<T> for Consumer<T> {
    #[inline]
    fn pop(&self) -> Option<T> {
        Self::pop(self)
    }
}

impl<T> fmt::Debug for Consumer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumer")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}
