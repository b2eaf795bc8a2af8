//! Multi-producer multi-consumer (MPMC) bounded queue.
//!
//! Neither side owns a cursor, so a cursor comparison can't tell a thread
//! whether the slot in front of it is safe to touch. Each slot's sequence
//! answers that instead:
//!
//! ```text
//! push at pos:  diff = seq - pos
//!   diff == 0   slot free for this lap -> CAS tail, write, seq = pos + 1
//!   diff <  0   previous lap not consumed yet -> full
//!   diff >  0   another producer took pos -> reload tail
//!
//! pop at pos:   diff = seq - (pos + 1)
//!   diff == 0   value ready for this lap -> CAS head, read, seq = pos + capacity
//!   diff <  0   nothing produced at pos yet -> empty
//!   diff >  0   another consumer took pos -> reload head
//! ```
//!
//! The sequence stores are `Release` and the loads `Acquire`, so the payload
//! handoff synchronizes through the slot itself; the cursors only arbitrate
//! which thread owns a position and are accessed `Relaxed`.
//!
//! The queue is lock-free but not wait-free: a thread that keeps losing its
//! CAS retries for as long as its competitors keep winning.
//!
//! # Example
//!
//! ```
//! use nexus_ring::MpmcQueue;
//! use std::sync::Arc;
//! use std::thread;
//!
//! let queue = Arc::new(MpmcQueue::<u64>::new(64));
//!
//! let producers: Vec<_> = (0..2)
//!     .map(|id| {
//!         let queue = Arc::clone(&queue);
//!         thread::spawn(move || {
//!             for i in 0..100 {
//!                 while queue.try_push(id * 1000 + i).is_err() {
//!                     std::hint::spin_loop();
//!                 }
//!             }
//!         })
//!     })
//!     .collect();
//!
//! let consumers: Vec<_> = (0..2)
//!     .map(|_| {
//!         let queue = Arc::clone(&queue);
//!         thread::spawn(move || {
//!             let mut taken = 0;
//!             while taken < 100 {
//!                 if queue.pop().is_some() {
//!                     taken += 1;
//!                 }
//!             }
//!         })
//!     })
//!     .collect();
//!
//! for h in producers.into_iter().chain(consumers) {
//!     h.join().unwrap();
//! }
//! assert!(queue.is_empty());
//! ```

use std::cmp;
use std::fmt;

use crossbeam_utils::Backoff;

use crate::endpoint::{Dequeue, Enqueue};
use crate::error::{CapacityError, Full};
use crate::ring::{Cursors, Ring, Sequenced};
use crate::sync::{self, Ordering};

/// A bounded queue any number of threads may push to and pop from.
///
/// Share it by reference or behind an [`Arc`](std::sync::Arc).
pub struct MpmcQueue<T> {
    cursors: Cursors,
    ring: Ring<Sequenced<T>>,
}

impl<T> MpmcQueue<T> {
    /// Creates a queue holding at least `capacity` items.
    ///
    /// The capacity is rounded up to the next power of two (minimum 2).
    ///
    /// # Panics
    ///
    /// Panics if `capacity` exceeds [`MAX_CAPACITY`](crate::ring::MAX_CAPACITY).
    ///
    /// # Example
    ///
    /// ```
    /// use nexus_ring::MpmcQueue;
    ///
    /// let queue = MpmcQueue::<i32>::new(10);
    /// assert_eq!(queue.capacity(), 16);
    /// ```
    pub fn new(capacity: usize) -> Self {
        match Self::try_new(capacity) {
            Ok(queue) => queue,
            Err(err) => panic!("{err}"),
        }
    }

    /// Fallible form of [`MpmcQueue::new`].
    ///
    /// # Errors
    ///
    /// Returns [`CapacityError`] if `capacity` exceeds
    /// [`MAX_CAPACITY`](crate::ring::MAX_CAPACITY).
    pub fn try_new(capacity: usize) -> Result<Self, CapacityError> {
        Ok(Self {
            cursors: Cursors::new(),
            ring: Ring::sequenced(capacity)?,
        })
    }

    /// Attempts to enqueue `value` without blocking.
    ///
    /// # Errors
    ///
    /// Returns [`Full`] carrying `value` if the slot at the write cursor has
    /// not been released by its previous consumer.
    ///
    /// # Example
    ///
    /// ```
    /// use nexus_ring::{Full, MpmcQueue};
    ///
    /// let queue = MpmcQueue::new(2);
    /// queue.try_push('a').unwrap();
    /// queue.try_push('b').unwrap();
    /// assert_eq!(queue.try_push('c'), Err(Full('c')));
    /// ```
    #[inline]
    pub fn try_push(&self, value: T) -> Result<(), Full<T>> {
        let backoff = Backoff::new();
        let mut pos = self.cursors.tail.load(Ordering::Relaxed);

        loop {
            let cell = self.ring.slot(pos);
            let seq = cell.sequence.load(Ordering::Acquire);
            let diff = seq.wrapping_sub(pos) as isize;

            match diff.cmp(&0) {
                cmp::Ordering::Equal => {
                    match self.cursors.tail.compare_exchange_weak(
                        pos,
                        pos.wrapping_add(1),
                        Ordering::Relaxed,
                        Ordering::Relaxed,
                    ) {
                        Ok(_) => {
                            // Safety: the CAS made `pos` ours, and `seq == pos`
                            // (Acquire) means its last consumer is done.
                            unsafe { cell.slot.write(value) };
                            cell.sequence.store(pos.wrapping_add(1), Ordering::Release);
                            return Ok(());
                        }
                        Err(current) => {
                            pos = current;
                            sync::spin(&backoff);
                        }
                    }
                }
                cmp::Ordering::Less => return Err(Full(value)),
                cmp::Ordering::Greater => {
                    sync::spin(&backoff);
                    pos = self.cursors.tail.load(Ordering::Relaxed);
                }
            }
        }
    }

    /// Enqueues `value`, returning `false` (and dropping it) if the queue was
    /// full.
    #[inline]
    pub fn push(&self, value: T) -> bool {
        self.try_push(value).is_ok()
    }

    /// Dequeues the oldest ready item, or returns `None` if the slot at the
    /// read cursor has not been produced yet.
    #[inline]
    pub fn pop(&self) -> Option<T> {
        let backoff = Backoff::new();
        let capacity = self.ring.capacity();
        let mut pos = self.cursors.head.load(Ordering::Relaxed);

        loop {
            let cell = self.ring.slot(pos);
            let seq = cell.sequence.load(Ordering::Acquire);
            let diff = seq.wrapping_sub(pos.wrapping_add(1)) as isize;

            match diff.cmp(&0) {
                cmp::Ordering::Equal => {
                    match self.cursors.head.compare_exchange_weak(
                        pos,
                        pos.wrapping_add(1),
                        Ordering::Relaxed,
                        Ordering::Relaxed,
                    ) {
                        Ok(_) => {
                            // Safety: the CAS made `pos` ours, and
                            // `seq == pos + 1` (Acquire) means its producer is
                            // done.
                            let value = unsafe { cell.slot.read() };
                            cell.sequence
                                .store(pos.wrapping_add(capacity), Ordering::Release);
                            return Some(value);
                        }
                        Err(current) => {
                            pos = current;
                            sync::spin(&backoff);
                        }
                    }
                }
                cmp::Ordering::Less => return None,
                cmp::Ordering::Greater => {
                    sync::spin(&backoff);
                    pos = self.cursors.head.load(Ordering::Relaxed);
                }
            }
        }
    }

    /// Returns the realized capacity of the queue.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    /// Returns the number of claimed-for-write positions not yet claimed for
    /// read. A snapshot only while other threads are operating.
    #[inline]
    pub fn len(&self) -> usize {
        self.cursors.len(self.capacity())
    }

    /// Returns `true` if the queue currently holds no items.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Drop for MpmcQueue<T> {
    fn drop(&mut self) {
        let (head, tail) = self.cursors.settled();
        // Safety: `&mut self` rules out any operation in flight.
        unsafe { self.ring.drop_published(head, tail) };
    }
}

impl<T> Enqueue<T> for MpmcQueue<T> {
    #[inline]
    fn try_push(&self, value: T) -> Result<(), Full<T>> {
        Self::try_push(self, value)
    }

    #[inline]
    fn capacity(&self) -> usize {
        Self::capacity(self)
    }
}

impl<T> Dequeue<T> for MpmcQueue<T> {
    #[inline]
    fn pop(&self) -> Option<T> {
        Self::pop(self)
    }
}

impl<T> fmt::Debug for MpmcQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MpmcQueue")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use std::sync::{Arc, Mutex};
    use std::thread;

    #[test]
    fn basic_push_pop() {
        let queue = MpmcQueue::new(4);

        assert!(queue.push(1));
        assert!(queue.push(2));
        assert!(queue.push(3));

        assert_eq!(queue.pop(), Some(1));
        assert_eq!(queue.pop(), Some(2));
        assert_eq!(queue.pop(), Some(3));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn full_and_empty_boundaries() {
        let queue = MpmcQueue::new(2);

        assert!(queue.push(1));
        assert!(queue.push(2));
        assert_eq!(queue.try_push(3), Err(Full(3)));
        assert_eq!(queue.len(), 2);

        assert_eq!(queue.pop(), Some(1));
        assert_eq!(queue.pop(), Some(2));
        assert_eq!(queue.pop(), None);
        assert!(queue.is_empty());
    }

    #[test]
    fn capacity_rounds_to_power_of_two() {
        assert_eq!(MpmcQueue::<u8>::new(0).capacity(), 2);
        assert_eq!(MpmcQueue::<u8>::new(1).capacity(), 2);
        assert_eq!(MpmcQueue::<u8>::new(3).capacity(), 4);
        assert_eq!(MpmcQueue::<u8>::new(64).capacity(), 64);
        assert!(MpmcQueue::<u8>::try_new(usize::MAX).is_err());
    }

    #[test]
    fn sequences_follow_the_slot_cycle() {
        let queue = MpmcQueue::new(4);
        let cell = queue.ring.slot(0);

        assert_eq!(cell.sequence.load(Ordering::Relaxed), 0);
        queue.push(10);
        assert_eq!(cell.sequence.load(Ordering::Relaxed), 1);
        queue.pop();
        assert_eq!(cell.sequence.load(Ordering::Relaxed), 4);
    }

    #[test]
    fn wraps_many_laps() {
        let queue = MpmcQueue::new(4);

        for lap in 0..1_000u64 {
            for i in 0..4 {
                assert!(queue.push(lap * 4 + i));
            }
            assert!(!queue.push(u64::MAX));
            for i in 0..4 {
                assert_eq!(queue.pop(), Some(lap * 4 + i));
            }
            assert_eq!(queue.pop(), None);
        }
    }

    #[test]
    fn remaining_items_dropped_with_queue() {
        static DROPS: AtomicUsize = AtomicUsize::new(0);

        struct DropCounter;
        impl Drop for DropCounter {
            fn drop(&mut self) {
                DROPS.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            }
        }

        let queue = MpmcQueue::new(8);
        for _ in 0..6 {
            assert!(queue.push(DropCounter));
        }
        drop(queue.pop());
        drop(queue.pop());
        assert_eq!(DROPS.load(std::sync::atomic::Ordering::SeqCst), 2);

        drop(queue);
        assert_eq!(DROPS.load(std::sync::atomic::Ordering::SeqCst), 6);
    }

    #[test]
    fn no_loss_no_duplication() {
        const PRODUCERS: usize = 4;
        const CONSUMERS: usize = 4;
        const PER_PRODUCER: usize = 10_000;
        const TOTAL: usize = PRODUCERS * PER_PRODUCER;

        let queue = Arc::new(MpmcQueue::<(usize, usize)>::new(16));
        let taken = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(Mutex::new(HashMap::new()));

        let producers: Vec<_> = (0..PRODUCERS)
            .map(|id| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    for i in 0..PER_PRODUCER {
                        while queue.try_push((id, i)).is_err() {
                            std::hint::spin_loop();
                        }
                    }
                })
            })
            .collect();

        let consumers: Vec<_> = (0..CONSUMERS)
            .map(|_| {
                let queue = Arc::clone(&queue);
                let taken = Arc::clone(&taken);
                let seen = Arc::clone(&seen);
                thread::spawn(move || {
                    let mut local = Vec::new();
                    while taken.load(std::sync::atomic::Ordering::Acquire) < TOTAL {
                        if let Some(tag) = queue.pop() {
                            local.push(tag);
                            taken.fetch_add(1, std::sync::atomic::Ordering::AcqRel);
                        } else {
                            std::hint::spin_loop();
                        }
                    }
                    let mut seen = seen.lock().unwrap();
                    for tag in local {
                        *seen.entry(tag).or_insert(0usize) += 1;
                    }
                })
            })
            .collect();

        for handle in producers.into_iter().chain(consumers) {
            handle.join().unwrap();
        }

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), TOTAL);
        assert!(seen.values().all(|&count| count == 1));
        assert!(queue.is_empty());
    }

    #[test]
    fn slot_sequences_only_move_forward() {
        const THREADS: usize = 4;
        const PER_THREAD: usize = 20_000;

        let queue = MpmcQueue::<usize>::new(8);
        let capacity = queue.capacity();
        let done = AtomicBool::new(false);
        let popped = AtomicUsize::new(0);

        thread::scope(|s| {
            s.spawn(|| {
                let mut previous = queue.ring.sequences();
                while !done.load(std::sync::atomic::Ordering::Relaxed) {
                    let current = queue.ring.sequences();
                    crate::ring::assert_sequences_advance(&previous, &current, capacity);
                    previous = current;
                }
            });

            let workers: Vec<_> = (0..THREADS)
                .map(|id| {
                    let queue = &queue;
                    let popped = &popped;
                    s.spawn(move || {
                        for i in 0..PER_THREAD {
                            while queue.try_push(id * PER_THREAD + i).is_err() {
                                if queue.pop().is_some() {
                                    popped.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                                }
                            }
                        }
                    })
                })
                .collect();

            for worker in workers {
                worker.join().unwrap();
            }
            done.store(true, std::sync::atomic::Ordering::Relaxed);
        });

        let drained = std::iter::from_fn(|| queue.pop()).count();
        assert_eq!(
            popped.load(std::sync::atomic::Ordering::Relaxed) + drained,
            THREADS * PER_THREAD
        );
    }

    #[test]
    fn cursors_wrap_past_usize_max() {
        use crate::ring::{NEAR_WRAP, assert_fifo_batches};

        let queue = MpmcQueue::<usize>::new(4);
        queue.cursors.rebase(NEAR_WRAP);
        queue.ring.rebase(NEAR_WRAP);

        let advanced = assert_fifo_batches(&queue, &queue, 16);
        let tail = queue.cursors.tail.load(Ordering::Relaxed);
        assert_eq!(tail, NEAR_WRAP.wrapping_add(advanced));
        assert!(tail < NEAR_WRAP, "tail never wrapped");
        assert!(queue.is_empty());
    }

    #[test]
    fn items_straddling_the_wrap_are_dropped_once() {
        let marker = Arc::new(());
        let queue = MpmcQueue::new(8);
        queue.cursors.rebase(crate::ring::NEAR_WRAP);
        queue.ring.rebase(crate::ring::NEAR_WRAP);

        for _ in 0..8 {
            assert!(queue.push(Arc::clone(&marker)));
        }
        drop(queue.pop());
        assert_eq!(Arc::strong_count(&marker), 8);

        drop(queue);
        assert_eq!(Arc::strong_count(&marker), 1);
    }
}
