//! Time-ordered concurrent queue used to find the oldest pool entries

use crate::errors::{PoolError, PoolResult};

use crossbeam::utils::Backoff;
use parking_lot::{Mutex, MutexGuard};
use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Items stored in an [`OrderedEvictionQueue`] expose the key they are ordered by
pub trait QueueKey {
    type Key: Ord + Copy;

    fn queue_key(&self) -> Self::Key;
}

impl<K: Ord + Copy, V> QueueKey for (K, V) {
    type Key = K;

    fn queue_key(&self) -> K {
        self.0
    }
}

impl<T: QueueKey + ?Sized> QueueKey for Arc<T> {
    type Key = T::Key;

    fn queue_key(&self) -> T::Key {
        (**self).queue_key()
    }
}

struct Slot<T: QueueKey> {
    key: T::Key,
    seq: u64,
    item: T,
}

// BinaryHeap is a max-heap; reversing the comparison keeps the smallest key
// (and, for equal keys, the earliest insertion) on top.
impl<T: QueueKey> Ord for Slot<T> {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .key
            .cmp(&self.key)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl<T: QueueKey> PartialOrd for Slot<T> {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl<T: QueueKey> PartialEq for Slot<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == CmpOrdering::Equal
    }
}

impl<T: QueueKey> Eq for Slot<T> {}

/// Concurrent min-queue ordered by [`QueueKey`]
///
/// Inserts are optimistic: [`enqueue`](Self::enqueue) hands the item back
/// instead of blocking when another thread is restructuring the heap, and the
/// caller retries. Items with equal keys come out in insertion order.
///
/// # Examples
///
/// ```
/// use esox_invokerpool::OrderedEvictionQueue;
///
/// let queue = OrderedEvictionQueue::new();
/// queue.enqueue_with_backoff((30u64, "c"));
/// queue.enqueue_with_backoff((10u64, "a"));
/// queue.enqueue_with_backoff((20u64, "b"));
///
/// assert_eq!(queue.count(), 3);
/// assert_eq!(queue.peek().unwrap(), (10, "a"));
/// assert_eq!(queue.dequeue().unwrap(), (10, "a"));
/// assert_eq!(queue.dequeue().unwrap(), (20, "b"));
/// ```
pub struct OrderedEvictionQueue<T: QueueKey> {
    heap: Mutex<BinaryHeap<Slot<T>>>,
    len: AtomicUsize,
    sequence: AtomicU64,
}

impl<T: QueueKey> OrderedEvictionQueue<T> {
    pub fn new() -> Self {
        Self {
            heap: Mutex::new(BinaryHeap::new()),
            len: AtomicUsize::new(0),
            sequence: AtomicU64::new(0),
        }
    }

    /// Try to insert `item` without waiting
    ///
    /// Returns the item back in `Err` if a concurrent writer holds the heap.
    /// A rejected item was not inserted; an accepted one is never lost.
    pub fn enqueue(&self, item: T) -> Result<(), T> {
        match self.heap.try_lock() {
            Some(heap) => {
                self.push_locked(heap, item);
                Ok(())
            }
            None => Err(item),
        }
    }

    /// Insert `item`, retrying [`enqueue`](Self::enqueue) under contention
    ///
    /// Retries spin and then yield; once the backoff is exhausted the insert
    /// waits for the lock, so the number of optimistic attempts is bounded.
    pub fn enqueue_with_backoff(&self, mut item: T) {
        let backoff = Backoff::new();
        loop {
            match self.enqueue(item) {
                Ok(()) => return,
                Err(rejected) => item = rejected,
            }
            if backoff.is_completed() {
                tracing::trace!("eviction queue contended, falling back to blocking insert");
                self.push_locked(self.heap.lock(), item);
                return;
            }
            backoff.snooze();
        }
    }

    fn push_locked(&self, mut heap: MutexGuard<'_, BinaryHeap<Slot<T>>>, item: T) {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        heap.push(Slot {
            key: item.queue_key(),
            seq,
            item,
        });
        self.len.store(heap.len(), Ordering::Release);
    }

    /// Remove and return the smallest-key item
    pub fn dequeue(&self) -> PoolResult<T> {
        let mut heap = self.heap.lock();
        let slot = heap.pop().ok_or(PoolError::QueueEmpty)?;
        self.len.store(heap.len(), Ordering::Release);
        Ok(slot.item)
    }

    /// Remove the smallest-key item only if `predicate` accepts it
    ///
    /// The check and the removal happen under the same lock, so the item
    /// returned is exactly the one the predicate saw.
    pub fn dequeue_if<P>(&self, predicate: P) -> Option<T>
    where
        P: FnOnce(&T) -> bool,
    {
        let mut heap = self.heap.lock();
        if !predicate(&heap.peek()?.item) {
            return None;
        }
        let slot = heap.pop()?;
        self.len.store(heap.len(), Ordering::Release);
        Some(slot.item)
    }

    /// Number of items currently queued
    pub fn count(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Remove every item
    pub fn clear(&self) {
        drop(self.drain());
    }

    /// Remove every item, returning them smallest key first
    pub fn drain(&self) -> Vec<T> {
        let mut heap = self.heap.lock();
        let slots = std::mem::take(&mut *heap);
        self.len.store(0, Ordering::Release);
        drop(heap);

        // Ascending in heap order means largest key first.
        slots
            .into_sorted_vec()
            .into_iter()
            .rev()
            .map(|slot| slot.item)
            .collect()
    }
}

impl<T: QueueKey + Clone> OrderedEvictionQueue<T> {
    /// Return a copy of the smallest-key item without removing it
    pub fn peek(&self) -> PoolResult<T> {
        self.heap
            .lock()
            .peek()
            .map(|slot| slot.item.clone())
            .ok_or(PoolError::QueueEmpty)
    }
}

impl<T: QueueKey> Default for OrderedEvictionQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
