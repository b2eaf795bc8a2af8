//! # nexus-ring
//!
//! Fixed-capacity, array-backed lock-free queues for handing items between
//! threads without a global lock.
//!
//! ## Variants
//!
//! | Module | Producers | Consumers | Coordination |
//! |--------|-----------|-----------|--------------|
//! | [`spsc`] | 1 | 1 | ordered loads/stores of two cursors, no CAS |
//! | [`mpsc`] | N | 1 | CAS on the write cursor, per-slot publish stamp |
//! | [`spmc`] | 1 | N | CAS on the read cursor, per-slot release stamp |
//! | [`mpmc`] | N | N | per-slot sequence arbitrates both sides |
//!
//! All four share the same [`ring`] substrate: a power-of-two array of slots
//! indexed by unbounded cursors masked down to a slot index.
//!
//! ## Design Goals
//!
//! - Never block: every `push`/`pop` returns immediately
//! - No allocations after construction
//! - Cache-line isolation of the two cursors
//! - Single-sided roles enforced by the type system (`!Sync` / `!Clone` handles)
//!
//! ## Example
//!
//! ```
//! use nexus_ring::spsc;
//!
//! // Capacity is rounded up to the next power of two.
//! let (tx, rx) = spsc::channel::<u64>(1000);
//! assert_eq!(tx.capacity(), 1024);
//!
//! tx.try_push(42).unwrap();
//! assert_eq!(rx.pop(), Some(42));
//! assert_eq!(rx.pop(), None);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod endpoint;
mod error;
mod sync;

pub mod mpmc;
pub mod mpsc;
pub mod ring;
pub mod spmc;
pub mod spsc;
pub mod trace;


pub use endpoint::{Dequeue, Enqueue};
pub use error::{CapacityError, Full};
pub use mpmc::MpmcQueue;
pub use trace::init_tracing;
