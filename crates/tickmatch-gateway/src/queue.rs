//! Bounded single-producer/single-consumer envelope queue.
//!
//! A fixed, power-of-two ring with no locks on the hot path. Producer
//! and consumer positions live on separate cache lines so the two
//! threads never false-share. The endpoints are move-only handles:
//! holding a [`Producer`] is the only way to push and holding a
//! [`Consumer`] the only way to pop, which pins the one-writer /
//! one-reader discipline at the type level.
//!
//! `push` reports back-pressure instead of blocking; `pop` reports
//! empty instead of blocking. Callers pick their own policy (ingress
//! spin-yields, consumers nap briefly).

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_utils::CachePadded;

/// Default queue capacity; must be a power of two.
pub const DEFAULT_QUEUE_CAPACITY: usize = 16_384;

struct Ring<T> {
    slots: Box<[UnsafeCell<MaybeUninit<T>>]>,
    mask: usize,

    /// Next slot the consumer will read.
    head: CachePadded<AtomicUsize>,

    /// Next slot the producer will write.
    tail: CachePadded<AtomicUsize>,
}

// The ring moves `T` values across exactly one producer thread and one
// consumer thread; each slot is touched by one side at a time, fenced
// by the acquire/release pair on head and tail.
unsafe impl<T: Send> Send for Ring<T> {}
unsafe impl<T: Send> Sync for Ring<T> {}

impl<T> Drop for Ring<T> {
    fn drop(&mut self) {
        let mut head = *self.head.get_mut();
        let tail = *self.tail.get_mut();
        while head != tail {
            unsafe {
                (*self.slots[head & self.mask].get()).assume_init_drop();
            }
            head = head.wrapping_add(1);
        }
    }
}

/// The writing endpoint of a queue. Not cloneable.
pub struct Producer<T> {
    ring: Arc<Ring<T>>,
}

/// The reading endpoint of a queue. Not cloneable.
pub struct Consumer<T> {
    ring: Arc<Ring<T>>,
}

/// Create a bounded SPSC queue with the given capacity.
///
/// # Panics
///
/// Panics if `capacity` is zero or not a power of two.
pub fn spsc<T>(capacity: usize) -> (Producer<T>, Consumer<T>) {
    assert!(
        capacity.is_power_of_two() && capacity > 0,
        "queue capacity must be a power of two"
    );

    let slots = (0..capacity)
        .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
        .collect::<Vec<_>>()
        .into_boxed_slice();

    let ring = Arc::new(Ring {
        slots,
        mask: capacity - 1,
        head: CachePadded::new(AtomicUsize::new(0)),
        tail: CachePadded::new(AtomicUsize::new(0)),
    });

    (
        Producer { ring: ring.clone() },
        Consumer { ring },
    )
}

impl<T> Producer<T> {
    /// Enqueue `value`, or hand it back when the queue is full.
    pub fn push(&self, value: T) -> Result<(), T> {
        let ring = &*self.ring;
        let tail = ring.tail.load(Ordering::Relaxed);
        let head = ring.head.load(Ordering::Acquire);

        if tail.wrapping_sub(head) > ring.mask {
            return Err(value);
        }

        unsafe {
            (*ring.slots[tail & ring.mask].get()).write(value);
        }
        ring.tail.store(tail.wrapping_add(1), Ordering::Release);
        Ok(())
    }

    /// Number of envelopes currently queued (approximate under
    /// concurrency, exact from the producer side).
    pub fn len(&self) -> usize {
        let ring = &*self.ring;
        ring.tail
            .load(Ordering::Relaxed)
            .wrapping_sub(ring.head.load(Ordering::Acquire))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.ring.mask + 1
    }
}

impl<T> Consumer<T> {
    /// Dequeue the oldest envelope, or `None` when the queue is empty.
    pub fn pop(&self) -> Option<T> {
        let ring = &*self.ring;
        let head = ring.head.load(Ordering::Relaxed);
        let tail = ring.tail.load(Ordering::Acquire);

        if head == tail {
            return None;
        }

        let value = unsafe { (*ring.slots[head & ring.mask].get()).assume_init_read() };
        ring.head.store(head.wrapping_add(1), Ordering::Release);
        Some(value)
    }

    pub fn len(&self) -> usize {
        let ring = &*self.ring;
        ring.tail
            .load(Ordering::Acquire)
            .wrapping_sub(ring.head.load(Ordering::Relaxed))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Push with the standard back-pressure policy: spin-yield until the
/// consumer makes room, giving up only when `shutdown` is raised.
/// Returns `false` when the value was abandoned to shutdown.
pub fn push_or_yield<T>(producer: &Producer<T>, value: T, shutdown: &AtomicBool) -> bool {
    let mut value = value;
    loop {
        match producer.push(value) {
            Ok(()) => return true,
            Err(back) => {
                if shutdown.load(Ordering::Relaxed) {
                    return false;
                }
                value = back;
                thread::yield_now();
            }
        }
    }
}
