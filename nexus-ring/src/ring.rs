//! Ring storage shared by every queue variant.
//!
//! A ring is a boxed slice of `capacity` slots where `capacity` is a power
//! of two. Cursors are unbounded wrapping counters; `cursor & mask` maps a
//! cursor to its slot, so wraparound costs a single AND.
//!
//! Two slot layouts exist:
//!
//! - `Slot`: just the value. Used by SPSC, where each cursor has one writer
//!   and the cursors alone decide who may touch a slot.
//! - `Sequenced`: the value plus a sequence counter. Used wherever a shared
//!   cursor can advance before the slot's value has been written or moved out.
//!
//! The sequence of the slot at index `i` walks through one cycle per lap:
//!
//! ```text
//! seq == pos             writable for the producer at `pos`
//! seq == pos + 1         readable for the consumer at `pos`
//! seq == pos + capacity  writable for the producer one lap later
//! ```
//!
//! Initially `seq == i`, the writable state for position `i`.

use std::mem::MaybeUninit;

use crossbeam_utils::CachePadded;

use crate::error::CapacityError;
use crate::sync::{AtomicUsize, Ordering, UnsafeCell};
use crate::trace::{debug, trace};

/// Smallest capacity a ring is ever built with.
pub const MIN_CAPACITY: usize = 2;

/// Largest power of two representable in a `usize`.
pub const MAX_CAPACITY: usize = 1 << (usize::BITS - 1);

/// Rounds `requested` up to the capacity a ring would actually be built with.
///
/// The result is the smallest power of two `>= max(requested, 2)`.
///
/// # Errors
///
/// Returns [`CapacityError`] if `requested > MAX_CAPACITY`.
///
/// # Example
///
/// ```
/// use nexus_ring::ring;
///
/// assert_eq!(ring::checked_capacity(0), Ok(2));
/// assert_eq!(ring::checked_capacity(100), Ok(128));
/// assert!(ring::checked_capacity(usize::MAX).is_err());
/// ```
pub const fn checked_capacity(requested: usize) -> Result<usize, CapacityError> {
    let floor = if requested < MIN_CAPACITY {
        MIN_CAPACITY
    } else {
        requested
    };

    match floor.checked_next_power_of_two() {
        Some(capacity) => Ok(capacity),
        None => Err(CapacityError::new(requested)),
    }
}

/// Infallible form of [`checked_capacity`].
///
/// # Panics
///
/// Panics if `requested > MAX_CAPACITY`.
pub fn round_capacity(requested: usize) -> usize {
    match checked_capacity(requested) {
        Ok(capacity) => capacity,
        Err(err) => panic!("{err}"),
    }
}

/// Uninitialized-or-occupied storage for one item.
pub(crate) struct Slot<T> {
    value: UnsafeCell<MaybeUninit<T>>,
}

// Safety: access to the value is serialized by the owning queue's protocol.
unsafe impl<T: Send> Send for Slot<T> {}
unsafe impl<T: Send> Sync for Slot<T> {}

impl<T> Slot<T> {
    fn new() -> Self {
        Self {
            value: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }

    /// Moves `value` into the slot.
    ///
    /// # Safety
    ///
    /// The caller must own this slot occurrence exclusively and the slot must
    /// not hold a live value.
    #[inline]
    pub(crate) unsafe fn write(&self, value: T) {
        self.value.with_mut(|ptr| unsafe {
            (*ptr).write(value);
        });
    }

    /// Moves the value out of the slot, leaving it logically empty.
    ///
    /// # Safety
    ///
    /// The caller must own this slot occurrence exclusively and the slot must
    /// hold a value whose write happens-before this call.
    #[inline]
    pub(crate) unsafe fn read(&self) -> T {
        self.value.with(|ptr| unsafe { (*ptr).assume_init_read() })
    }

    /// # Safety
    ///
    /// Same as [`Slot::read`].
    unsafe fn drop_value(&self) {
        self.value.with_mut(|ptr| unsafe { (*ptr).assume_init_drop() });
    }
}

/// A slot guarded by a per-slot sequence counter.
pub(crate) struct Sequenced<T> {
    pub(crate) sequence: AtomicUsize,
    pub(crate) slot: Slot<T>,
}

impl<T> Sequenced<T> {
    fn new(sequence: usize) -> Self {
        Self {
            sequence: AtomicUsize::new(sequence),
            slot: Slot::new(),
        }
    }
}

/// The two cursors of a ring, each on its own cache line.
///
/// Both only ever move forward (wrapping at `usize::MAX`), and
/// `tail - head` is the number of positions handed out to producers but not
/// yet taken by consumers.
pub(crate) struct Cursors {
    /// Next position to consume from.
    pub(crate) head: CachePadded<AtomicUsize>,
    /// Next position to produce into.
    pub(crate) tail: CachePadded<AtomicUsize>,
}

impl Cursors {
    pub(crate) fn new() -> Self {
        Self {
            head: CachePadded::new(AtomicUsize::new(0)),
            tail: CachePadded::new(AtomicUsize::new(0)),
        }
    }

    /// Racy occupancy snapshot, clamped to `capacity`.
    ///
    /// `head` is loaded first: it never passes `tail`, so a later load of
    /// `tail` cannot observe a smaller value.
    #[inline]
    pub(crate) fn len(&self, capacity: usize) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        tail.wrapping_sub(head).min(capacity)
    }

    /// Cursor values for teardown, when no other thread can be running.
    pub(crate) fn settled(&self) -> (usize, usize) {
        (
            self.head.load(Ordering::Relaxed),
            self.tail.load(Ordering::Relaxed),
        )
    }
}

/// Fixed array of slots with a power-of-two length.
pub(crate) struct Ring<S> {
    slots: Box<[S]>,
    mask: usize,
}

impl<S> Ring<S> {
    fn build(requested: usize, init: impl FnMut(usize) -> S) -> Result<Self, CapacityError> {
        let capacity = checked_capacity(requested)?;
        debug_assert!(capacity.is_power_of_two());

        if capacity != requested {
            debug!(requested, capacity, "ring capacity rounded up to a power of two");
        }

        let slots: Box<[S]> = (0..capacity).map(init).collect();
        trace!(
            capacity,
            slot_size = std::mem::size_of::<S>(),
            "ring allocated"
        );

        Ok(Self {
            slots,
            mask: capacity - 1,
        })
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Returns the slot a cursor maps to.
    #[inline(always)]
    pub(crate) fn slot(&self, pos: usize) -> &S {
        &self.slots[pos & self.mask]
    }
}

impl<T> Ring<Slot<T>> {
    pub(crate) fn plain(requested: usize) -> Result<Self, CapacityError> {
        Self::build(requested, |_| Slot::new())
    }

    /// Drops every value in `[head, tail)`.
    ///
    /// # Safety
    ///
    /// Must only be called with exclusive access, with `[head, tail)` being
    /// exactly the occupied range.
    pub(crate) unsafe fn drop_range(&mut self, head: usize, tail: usize) {
        let remaining = tail.wrapping_sub(head);
        if remaining != 0 {
            trace!(remaining, "dropping undelivered items");
        }

        let mut pos = head;
        while pos != tail {
            unsafe { self.slot(pos).drop_value() };
            pos = pos.wrapping_add(1);
        }
    }
}

impl<T> Ring<Sequenced<T>> {
    pub(crate) fn sequenced(requested: usize) -> Result<Self, CapacityError> {
        Self::build(requested, Sequenced::new)
    }

    /// Drops every published value in `[head, tail)`.
    ///
    /// A position counts as published when its slot's sequence reads
    /// `pos + 1`.
    ///
    /// # Safety
    ///
    /// Must only be called with exclusive access to the ring.
    pub(crate) unsafe fn drop_published(&mut self, head: usize, tail: usize) {
        let mut dropped = 0usize;
        let mut pos = head;

        while pos != tail {
            let cell = self.slot(pos);
            if cell.sequence.load(Ordering::Relaxed) == pos.wrapping_add(1) {
                unsafe { cell.slot.drop_value() };
                dropped += 1;
            }
            pos = pos.wrapping_add(1);
        }

        if dropped != 0 {
            trace!(dropped, "dropping undelivered items");
        }
    }
}

/// Snapshot of every slot's sequence, for exclusivity checks in tests.
#[cfg(all(test, not(loom)))]
impl<T> Ring<Sequenced<T>> {
    pub(crate) fn sequences(&self) -> Vec<usize> {
        self.slots
            .iter()
            .map(|cell| cell.sequence.load(Ordering::Acquire))
            .collect()
    }
}

#[cfg(all(test, not(loom)))]
impl<T> Ring<Sequenced<T>> {
    /// Re-stamps an empty ring as if `start` positions had already passed
    /// through it.
    pub(crate) fn rebase(&self, start: usize) {
        for offset in 0..self.capacity() {
            let pos = start.wrapping_add(offset);
            self.slot(pos).sequence.store(pos, Ordering::Relaxed);
        }
    }
}

#[cfg(all(test, not(loom)))]
impl Cursors {
    /// Moves both cursors of an empty ring to `start`.
    pub(crate) fn rebase(&self, start: usize) {
        self.head.store(start, Ordering::Relaxed);
        self.tail.store(start, Ordering::Relaxed);
    }
}

/// Cursor start a few positions short of `usize::MAX`, so the wrap happens
/// within the first lap.
#[cfg(all(test, not(loom)))]
pub(crate) const NEAR_WRAP: usize = usize::MAX - 5;

/// Pushes and pops batches of every size from 1 to `capacity`, checking FIFO
/// order and the full/empty boundaries on each batch. Returns how many
/// positions the cursors advanced.
#[cfg(all(test, not(loom)))]
pub(crate) fn assert_fifo_batches(
    tx: &impl crate::Enqueue<usize>,
    rx: &impl crate::Dequeue<usize>,
    rounds: usize,
) -> usize {
    let capacity = tx.capacity();
    let mut next = 0;

    for round in 0..rounds {
        let batch = round % capacity + 1;
        for i in 0..batch {
            assert_eq!(tx.try_push(next + i), Ok(()), "round {round}");
        }
        if batch == capacity {
            assert!(!tx.push(usize::MAX), "round {round}: accepted past capacity");
        }
        for i in 0..batch {
            assert_eq!(rx.pop(), Some(next + i), "round {round}");
        }
        assert_eq!(rx.pop(), None, "round {round}");
        next += batch;
    }

    next
}

/// Asserts that no slot's sequence moved backwards between two snapshots and
/// that every sequence is in the writable or readable state for its index.
#[cfg(all(test, not(loom)))]
pub(crate) fn assert_sequences_advance(previous: &[usize], current: &[usize], capacity: usize) {
    let mask = capacity - 1;

    for (index, (&before, &after)) in previous.iter().zip(current).enumerate() {
        assert!(
            (after.wrapping_sub(before) as isize) >= 0,
            "slot {index} sequence went backwards: {before} -> {after}"
        );

        let phase = after.wrapping_sub(index) & mask;
        assert!(
            phase == 0 || phase == 1,
            "slot {index} sequence {after} is not in a valid state"
        );
    }
}
