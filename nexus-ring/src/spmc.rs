//! Single-producer multi-consumer (SPMC) bounded queue.
//!
//! The mirror image of [`mpsc`](crate::mpsc): the producer owns the write
//! cursor outright and consumers race for the read cursor.
//!
//! # Protocol
//!
//! Push (the producer):
//!
//! 1. If `tail - head == capacity` (head loaded with `Acquire`) the queue is
//!    full.
//! 2. If the slot's sequence (loaded with `Acquire`) is not `tail`, the
//!    consumer that claimed the previous occupant is still moving it out;
//!    report full for now.
//! 3. Write the slot, then publish `tail + 1` with `Release`.
//!
//! Pop (any consumer):
//!
//! 1. Load `head` with `Acquire`, then `tail` with `Acquire`. If equal the
//!    queue is empty.
//! 2. CAS `head -> head + 1`. Exactly one consumer claims each position; the
//!    losers reload and retry.
//! 3. The winner moves the value out and releases the slot by storing
//!    `sequence = head + capacity` with `Release`.
//!
//! # Example
//!
//! ```
//! use nexus_ring::spmc;
//! use std::sync::atomic::{AtomicU64, Ordering};
//! use std::sync::Arc;
//! use std::thread;
//!
//! let (tx, rx) = spmc::channel::<u64>(64);
//! let total = Arc::new(AtomicU64::new(0));
//!
//! for i in 1..=50 {
//!     tx.try_push(i).unwrap();
//! }
//!
//! let handles: Vec<_> = (0..4)
//!     .map(|_| {
//!         let rx = rx.clone();
//!         let total = Arc::clone(&total);
//!         thread::spawn(move || {
//!             while let Some(v) = rx.pop() {
//!                 total.fetch_add(v, Ordering::Relaxed);
//!             }
//!         })
//!     })
//!     .collect();
//!
//! for h in handles {
//!     h.join().unwrap();
//! }
//! assert_eq!(total.load(Ordering::Relaxed), 1275);
//! ```

use std::cell::Cell;
use std::fmt;

use crossbeam_utils::Backoff;

use crate::endpoint::{Dequeue, Enqueue};
use crate::error::{CapacityError, Full};
use crate::ring::{Cursors, Ring, Sequenced};
use crate::sync::{self, Arc, Ordering};

/// Creates a new SPMC queue and returns its two endpoints.
///
/// Clone the [`Consumer`] to add consumers. The capacity is rounded up to
/// the next power of two (minimum 2).
///
/// # Panics
///
/// Panics if `capacity` exceeds [`MAX_CAPACITY`](crate::ring::MAX_CAPACITY).
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
        ring: Ring::sequenced(capacity)?,
    });
    let capacity = shared.ring.capacity();

    Ok((
        Producer {
            shared: Arc::clone(&shared),
            capacity,
            local_tail: Cell::new(0),
            cached_head: Cell::new(0),
        },
        Consumer { shared, capacity },
    ))
}

struct Shared<T> {
    cursors: Cursors,
    ring: Ring<Sequenced<T>>,
}

impl<T> Drop for Shared<T> {
    fn drop(&mut self) {
        let (head, tail) = self.cursors.settled();
        // Safety: every handle is gone, so every claimed value has been moved
        // out and [head, tail) is exactly the unclaimed published range.
        unsafe { self.ring.drop_published(head, tail) };
    }
}

/// The producing half of an SPMC queue.
///
/// There is only one; it can be moved to another thread but not shared.
pub struct Producer<T> {
    shared: Arc<Shared<T>>,
    capacity: usize,
    /// Our write position; only we advance `tail`.
    local_tail: Cell<usize>,
    /// Last observed claim cursor, refreshed only when we look full.
    cached_head: Cell<usize>,
}

impl<T> Producer<T> {
    /// Attempts to enqueue `value` without blocking.
    ///
    /// # Errors
    ///
    /// Returns [`Full`] carrying `value` if all slots are occupied, including
    /// the case where the oldest slot has been claimed but its consumer has
    /// not finished taking the value out.
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

        let cell = self.shared.ring.slot(tail);
        if cell.sequence.load(Ordering::Acquire) != tail {
            return Err(Full(value));
        }

        // Safety: the sequence says the consumer of `tail - capacity` released
        // this slot, and we are the only producer.
        unsafe { cell.slot.write(value) };
        // Consumers synchronize on `tail`, not on this store.
        cell.sequence
            .store(tail.wrapping_add(1), Ordering::Relaxed);

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

    /// Returns the number of published items not yet claimed.
    #[inline]
    pub fn len(&self) -> usize {
        self.shared.cursors.len(self.capacity)
    }

    /// Returns `true` if no item is waiting to be claimed.
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

/// The consuming half of an SPMC queue.
///
/// Cloneable and shareable; every clone drains the same producer.
pub struct Consumer<T> {
    shared: Arc<Shared<T>>,
    capacity: usize,
}

impl<T> Consumer<T> {
    /// Claims and dequeues the oldest unclaimed item, or returns `None` if
    /// there is none.
    ///
    /// Only retries internally while losing the claim race to other
    /// consumers; never waits for the producer.
    #[inline]
    pub fn pop(&self) -> Option<T> {
        let cursors = &self.shared.cursors;
        let backoff = Backoff::new();

        loop {
            let head = cursors.head.load(Ordering::Acquire);
            let tail = cursors.tail.load(Ordering::Acquire);
            let available = tail.wrapping_sub(head);

            if available == 0 {
                return None;
            }

            if available > self.capacity {
                sync::spin(&backoff);
                continue;
            }

            if cursors
                .head
                .compare_exchange_weak(
                    head,
                    head.wrapping_add(1),
                    Ordering::AcqRel,
                    Ordering::Relaxed,
                )
                .is_ok()
            {
                let cell = self.shared.ring.slot(head);
                // Safety: the CAS made position `head` ours alone, and the
                // Acquire load of `tail > head` synchronizes with the
                // producer's write of it.
                let value = unsafe { cell.slot.read() };
                cell.sequence
                    .store(head.wrapping_add(self.capacity), Ordering::Release);
                return Some(value);
            }

            sync::spin(&backoff);
        }
    }

    /// Returns the realized capacity of the queue.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of published items not yet claimed.
    #[inline]
    pub fn len(&self) -> usize {
        self.shared.cursors.len(self.capacity)
    }

    /// Returns `true` if no item is waiting to be claimed.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Clone for Consumer<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            capacity: self.capacity,
        }
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
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}
