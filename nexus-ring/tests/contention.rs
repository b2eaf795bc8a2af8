//! Multi-threaded stress tests across all queue variants.
//!
//! Every item is tagged `(thread, sequence)` so the consumers' combined
//! output can be checked for loss, duplication and per-producer ordering.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use nexus_ring::{Dequeue, Enqueue, MpmcQueue, mpsc, spmc, spsc};

type Tag = (usize, usize);

fn push_spin<Q: Enqueue<Tag>>(queue: &Q, mut tag: Tag) {
    loop {
        match queue.try_push(tag) {
            Ok(()) => return,
            Err(full) => tag = full.into_inner(),
        }
        std::hint::spin_loop();
    }
}

/// Pops until `taken` reaches `total`, returning what this thread saw.
fn drain_until<Q: Dequeue<Tag>>(queue: &Q, taken: &AtomicUsize, total: usize) -> Vec<Tag> {
    let mut local = Vec::new();
    while taken.load(Ordering::Acquire) < total {
        match queue.pop() {
            Some(tag) => {
                local.push(tag);
                taken.fetch_add(1, Ordering::AcqRel);
            }
            None => std::hint::spin_loop(),
        }
    }
    local
}

/// Asserts every `(producer, i)` for `i < per_producer` was seen exactly once.
fn assert_exactly_once(batches: Vec<Vec<Tag>>, producers: usize, per_producer: usize) {
    let mut counts: HashMap<Tag, usize> = HashMap::new();
    for tag in batches.into_iter().flatten() {
        *counts.entry(tag).or_default() += 1;
    }

    assert_eq!(counts.len(), producers * per_producer, "items lost");
    for p in 0..producers {
        for i in 0..per_producer {
            assert_eq!(counts.get(&(p, i)), Some(&1), "item {p}:{i}");
        }
    }
}

/// Within one consumer's batch, each producer's items appear in order.
fn assert_per_producer_order(batch: &[Tag]) {
    let mut last: HashMap<usize, usize> = HashMap::new();
    for &(p, i) in batch {
        if let Some(&prev) = last.get(&p) {
            assert!(i > prev, "producer {p}: {i} after {prev}");
        }
        last.insert(p, i);
    }
}

#[test]
fn spsc_no_loss_no_duplication() {
    nexus_ring::init_tracing();
    const COUNT: usize = 200_000;

    let (tx, rx) = spsc::channel::<Tag>(64);
    let producer = thread::spawn(move || {
        for i in 0..COUNT {
            push_spin(&tx, (0, i));
        }
    });

    let taken = AtomicUsize::new(0);
    let batch = drain_until(&rx, &taken, COUNT);
    producer.join().unwrap();

    assert_per_producer_order(&batch);
    assert_exactly_once(vec![batch], 1, COUNT);
}

#[test]
fn mpsc_no_loss_no_duplication() {
    nexus_ring::init_tracing();
    const PRODUCERS: usize = 6;
    const PER_PRODUCER: usize = 20_000;

    let (tx, rx) = mpsc::channel::<Tag>(32);
    let producers: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let tx = tx.clone();
            thread::spawn(move || {
                for i in 0..PER_PRODUCER {
                    push_spin(&tx, (p, i));
                }
            })
        })
        .collect();
    drop(tx);

    let taken = AtomicUsize::new(0);
    let batch = drain_until(&rx, &taken, PRODUCERS * PER_PRODUCER);
    for h in producers {
        h.join().unwrap();
    }

    assert_per_producer_order(&batch);
    assert_exactly_once(vec![batch], PRODUCERS, PER_PRODUCER);
    assert!(rx.is_empty());
}

#[test]
fn spmc_no_loss_no_duplication() {
    nexus_ring::init_tracing();
    const CONSUMERS: usize = 6;
    const COUNT: usize = 120_000;

    let (tx, rx) = spmc::channel::<Tag>(32);
    let taken = Arc::new(AtomicUsize::new(0));

    let consumers: Vec<_> = (0..CONSUMERS)
        .map(|_| {
            let rx = rx.clone();
            let taken = Arc::clone(&taken);
            thread::spawn(move || drain_until(&rx, &taken, COUNT))
        })
        .collect();
    drop(rx);

    for i in 0..COUNT {
        push_spin(&tx, (0, i));
    }

    let batches: Vec<_> = consumers.into_iter().map(|h| h.join().unwrap()).collect();
    for batch in &batches {
        assert_per_producer_order(batch);
    }
    assert_exactly_once(batches, 1, COUNT);
    assert!(tx.is_empty());
}

#[test]
fn mpmc_no_loss_no_duplication() {
    nexus_ring::init_tracing();
    const PRODUCERS: usize = 4;
    const CONSUMERS: usize = 4;
    const PER_PRODUCER: usize = 25_000;
    const TOTAL: usize = PRODUCERS * PER_PRODUCER;

    let queue = Arc::new(MpmcQueue::<Tag>::new(64));
    let taken = Arc::new(AtomicUsize::new(0));

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                for i in 0..PER_PRODUCER {
                    push_spin(&queue, (p, i));
                }
            })
        })
        .collect();
    let consumers: Vec<_> = (0..CONSUMERS)
        .map(|_| {
            let queue = Arc::clone(&queue);
            let taken = Arc::clone(&taken);
            thread::spawn(move || drain_until(&queue, &taken, TOTAL))
        })
        .collect();

    for h in producers {
        h.join().unwrap();
    }
    let batches: Vec<_> = consumers.into_iter().map(|h| h.join().unwrap()).collect();
    for batch in &batches {
        assert_per_producer_order(batch);
    }
    assert_exactly_once(batches, PRODUCERS, PER_PRODUCER);
    assert!(queue.is_empty());
}

/// Many threads hammering the smallest possible queue must all finish.
#[test]
fn mpmc_capacity_two_terminates_under_heavy_contention() {
    nexus_ring::init_tracing();
    const PAIRS: usize = 8;
    const PER_THREAD: usize = 5_000;

    let queue = Arc::new(MpmcQueue::<Tag>::new(2));
    assert_eq!(queue.capacity(), 2);
    let taken = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for p in 0..PAIRS {
        let queue = Arc::clone(&queue);
        handles.push(thread::spawn(move || {
            for i in 0..PER_THREAD {
                push_spin(&queue, (p, i));
            }
            Vec::new()
        }));
    }
    for _ in 0..PAIRS {
        let queue = Arc::clone(&queue);
        let taken = Arc::clone(&taken);
        handles.push(thread::spawn(move || {
            drain_until(&queue, &taken, PAIRS * PER_THREAD)
        }));
    }

    let batches: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_exactly_once(batches, PAIRS, PER_THREAD);
}

/// Cursors pass `capacity * 10^6` without any item going astray.
#[test]
fn cursors_wrap_far_past_capacity() {
    nexus_ring::init_tracing();
    const ROUNDS: usize = 1_000_000;

    let (stx, srx) = spsc::channel::<usize>(2);
    let (mtx, mrx) = mpsc::channel::<usize>(2);
    let (ptx, prx) = spmc::channel::<usize>(2);
    let queue = MpmcQueue::<usize>::new(2);

    for round in 0..ROUNDS {
        let a = round * 2;
        let b = a + 1;

        assert!(stx.push(a) && stx.push(b));
        assert!(mtx.push(a) && mtx.push(b));
        assert!(ptx.push(a) && ptx.push(b));
        assert!(queue.push(a) && queue.push(b));

        assert!(!stx.push(0));
        assert!(!mtx.push(0));
        assert!(!ptx.push(0));
        assert!(!queue.push(0));

        assert_eq!((srx.pop(), srx.pop()), (Some(a), Some(b)));
        assert_eq!((mrx.pop(), mrx.pop()), (Some(a), Some(b)));
        assert_eq!((prx.pop(), prx.pop()), (Some(a), Some(b)));
        assert_eq!((queue.pop(), queue.pop()), (Some(a), Some(b)));
    }

    assert!(srx.pop().is_none());
    assert!(mrx.pop().is_none());
    assert!(prx.pop().is_none());
    assert!(queue.pop().is_none());
}

#[test]
fn spsc_threaded_wrap_keeps_fifo() {
    nexus_ring::init_tracing();
    const COUNT: usize = 2_000_000;

    let (tx, rx) = spsc::channel::<usize>(2);
    let producer = thread::spawn(move || {
        let mut i = 0;
        while i < COUNT {
            if tx.try_push(i).is_ok() {
                i += 1;
            }
        }
    });

    let mut expected = 0;
    while expected < COUNT {
        if let Some(v) = rx.pop() {
            assert_eq!(v, expected);
            expected += 1;
        }
    }
    producer.join().unwrap();
}

#[test]
fn undelivered_items_are_dropped_once() {
    let marker = Arc::new(());

    {
        let queue = MpmcQueue::new(8);
        let (stx, _srx) = spsc::channel(8);
        let (mtx, _mrx) = mpsc::channel(8);
        let (ptx, _prx) = spmc::channel(8);

        for _ in 0..3 {
            assert!(queue.push(Arc::clone(&marker)));
            assert!(stx.push(Arc::clone(&marker)));
            assert!(mtx.push(Arc::clone(&marker)));
            assert!(ptx.push(Arc::clone(&marker)));
        }
        assert_eq!(Arc::strong_count(&marker), 13);
    }

    assert_eq!(Arc::strong_count(&marker), 1);
}
