//! Multi-producer single-consumer (MPSC) bounded queue.
//!
//! Producers race for the write cursor; the single consumer owns the read
//! cursor outright.
//!
//! # Protocol
//!
//! Push (any producer):
//!
//! 1. Load `tail`, then `head` with `Acquire`.
//! 2. If `tail - head == capacity` the queue is full.
//! 3. CAS `tail -> tail + 1`. Exactly one producer wins each position; the
//!    losers reload and retry.
//! 4. The winner writes its slot and publishes it by storing
//!    `sequence = tail + 1` with `Release`.
//!
//! Pop (the consumer):
//!
//! 1. If `head == tail` (tail loaded with `Acquire`) the queue is empty.
//! 2. If the slot's sequence (loaded with `Acquire`) is not `head + 1`, a
//!    producer has reserved the position but not finished writing; report
//!    empty for now.
//! 3. Move the value out, mark the slot `head + capacity`, publish
//!    `head + 1` with `Release` so producers see the freed space.
//!
//! Which producer wins a given race is unspecified; items from a single
//! producer are dequeued in the order that producer pushed them.
//!
//! # Example
//!
//! ```
//! use nexus_ring::mpsc;
//! use std::thread;
//!
//! let (tx, rx) = mpsc::channel::<u64>(64);
//!
//! let handles: Vec<_> = (0..4)
//!     .map(|id| {
//!         let tx = tx.clone();
//!         thread::spawn(move || {
//!             for i in 0..100 {
//!                 while tx.try_push(id * 1000 + i).is_err() {
//!                     std::hint::spin_loop();
//!                 }
//!             }
//!         })
//!     })
//!     .collect();
//!
//! let mut received = 0;
//! while received < 400 {
//!     if rx.pop().is_some() {
//!         received += 1;
//!     }
//! }
//!
//! for h in handles {
//!     h.join().unwrap();
//! }
//! ```

use std::cell::Cell;
use std::fmt;

use crossbeam_utils::Backoff;

use crate::endpoint::{Dequeue, Enqueue};
use crate::error::{CapacityError, Full};
use crate::ring::{Cursors, Ring, Sequenced};
use crate::sync::{self, Arc, Ordering};

/// Creates a new MPSC queue and returns its two endpoints.
///
/// Clone the [`Producer`] to add producers. The capacity is rounded up to
/// the next power of two (minimum 2).
///
/// # Panics
///
/// Panics if `capacity` exceeds [`MAX_CAPACITY`](crate::ring::MAX_CAPACITY).
///
/// # Example
///
/// ```
/// use nexus_ring::mpsc;
///
/// let (tx, rx) = mpsc::channel::<String>(100);
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
        ring: Ring::sequenced(capacity)?,
    });
    let capacity = shared.ring.capacity();

    Ok((
        Producer {
            shared: Arc::clone(&shared),
            capacity,
        },
        Consumer {
            shared,
            capacity,
            local_head: Cell::new(0),
            cached_tail: Cell::new(0),
        },
    ))
}

struct Shared<T> {
    cursors: Cursors,
    ring: Ring<Sequenced<T>>,
}

impl<T> Drop for Shared<T> {
    fn drop(&mut self) {
        let (head, tail) = self.cursors.settled();
        // Safety: every handle is gone, so no write is in flight.
        unsafe { self.ring.drop_published(head, tail) };
    }
}

/// The producing half of an MPSC queue.
///
/// Cloneable and shareable; every clone feeds the same consumer.
pub struct Producer<T> {
    shared: Arc<Shared<T>>,
    capacity: usize,
}

impl<T> Producer<T> {
    /// Attempts to enqueue `value` without blocking.
    ///
    /// Only retries internally while losing the reservation race to other
    /// producers; never waits for the consumer.
    ///
    /// # Errors
    ///
    /// Returns [`Full`] carrying `value` if all slots are occupied.
    #[inline]
    pub fn try_push(&self, value: T) -> Result<(), Full<T>> {
        let cursors = &self.shared.cursors;
        let backoff = Backoff::new();

        loop {
            let tail = cursors.tail.load(Ordering::Relaxed);
            let head = cursors.head.load(Ordering::Acquire);
            let used = tail.wrapping_sub(head);

            if used == self.capacity {
                return Err(Full(value));
            }

            // A stale `tail` paired with a fresher `head`; the CAS below would
            // fail anyway.
            if used > self.capacity {
                sync::spin(&backoff);
                continue;
            }

            if cursors
                .tail
                .compare_exchange_weak(
                    tail,
                    tail.wrapping_add(1),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                )
                .is_ok()
            {
                let cell = self.shared.ring.slot(tail);
                // Safety: the CAS made position `tail` ours alone, and the
                // Acquire load of `head > tail - capacity` proves the consumer
                // is done with this slot's previous occupant.
                unsafe { cell.slot.write(value) };
                cell.sequence.store(tail.wrapping_add(1), Ordering::Release);
                return Ok(());
            }

            sync::spin(&backoff);
        }
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

    /// Returns the number of reserved positions not yet consumed.
    ///
    /// Includes positions a producer has claimed but not finished writing.
    #[inline]
    pub fn len(&self) -> usize {
        self.shared.cursors.len(self.capacity)
    }

    /// Returns `true` if no position is currently reserved.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Clone for Producer<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            capacity: self.capacity,
        }
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

/// The consuming half of an MPSC queue.
///
/// There is only one; it can be moved to another thread but not shared.
pub struct Consumer<T> {
    shared: Arc<Shared<T>>,
    capacity: usize,
    /// Our read position; only we advance `head`.
    local_head: Cell<usize>,
    /// Last observed reservation cursor, refreshed only when we look empty.
    cached_tail: Cell<usize>,
}

impl<T> Consumer<T> {
    /// Dequeues the oldest published item.
    ///
    /// Returns `None` if the queue is empty, or if the oldest position has been
    /// reserved by a producer that has not finished writing it yet.
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

        let cell = self.shared.ring.slot(head);
        if cell.sequence.load(Ordering::Acquire) != head.wrapping_add(1) {
            return None;
        }

        // Safety: the sequence says the producer of `head` finished its write,
        // and we are the only consumer.
        let value = unsafe { cell.slot.read() };
        cell.sequence
            .store(head.wrapping_add(self.capacity), Ordering::Relaxed);

        let next = head.wrapping_add(1);
        self.shared.cursors.head.store(next, Ordering::Release);
        self.local_head.set(next);
        Some(value)
    }

    /// Returns the realized capacity of the queue.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of reserved positions not yet consumed.
    #[inline]
    pub fn len(&self) -> usize {
        self.shared.cursors.len(self.capacity)
    }

    /// Returns `true` if no position is currently reserved.
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
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}
