//! Bookkeeping for one pooled transport

use crate::queue::QueueKey;
use crate::transport::Transport;

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// What happened to an entry when it was expired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Expiry {
    /// Unreferenced: the transport was disposed by this call
    Disposed,
    /// Still rented: disposal is left to the last release
    Deferred,
    /// Already expired earlier; nothing changed
    Unchanged,
}

/// What happened to an entry when an owner released it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Release {
    Retained,
    Disposed,
}

#[derive(Debug, Default)]
struct EntryState {
    ref_count: usize,
    expired: bool,
    disposed: bool,
}

/// One transport shared by every owner of a fingerprint
///
/// `ref_count`, `expired` and `disposed` change together under one lock, so
/// an entry can never be acquired after it has been expired and the transport
/// is disposed exactly once, only when nobody holds it.
pub(crate) struct PoolEntry<T: Transport> {
    transport: T,
    created_at: Instant,
    state: Mutex<EntryState>,
}

impl<T: Transport> PoolEntry<T> {
    /// Create an entry already rented by its creator
    pub fn rented(transport: T) -> Self {
        Self {
            transport,
            created_at: Instant::now(),
            state: Mutex::new(EntryState {
                ref_count: 1,
                ..EntryState::default()
            }),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    pub fn ref_count(&self) -> usize {
        self.state.lock().ref_count
    }

    pub fn is_expired(&self) -> bool {
        self.state.lock().expired
    }

    #[cfg(test)]
    pub fn is_disposed(&self) -> bool {
        self.state.lock().disposed
    }

    /// Take a reference unless the entry has been expired
    pub fn try_acquire(&self) -> bool {
        let mut state = self.state.lock();
        if state.expired {
            return false;
        }
        state.ref_count += 1;
        true
    }

    /// Drop one reference, disposing the transport if it was the last one of an expired entry
    pub fn release(&self) -> Release {
        let mut state = self.state.lock();
        state.ref_count = state.ref_count.saturating_sub(1);
        if state.ref_count == 0 && state.expired && !state.disposed {
            state.disposed = true;
            drop(state);
            self.transport.dispose();
            return Release::Disposed;
        }
        Release::Retained
    }

    /// Retire the entry from further rentals
    pub fn expire(&self) -> Expiry {
        let mut state = self.state.lock();
        let newly_expired = !state.expired;
        state.expired = true;
        if state.ref_count == 0 && !state.disposed {
            state.disposed = true;
            drop(state);
            self.transport.dispose();
            return Expiry::Disposed;
        }
        if newly_expired {
            Expiry::Deferred
        } else {
            Expiry::Unchanged
        }
    }

    /// Dispose an entry that was never published to the pool
    pub fn discard(&self) {
        let mut state = self.state.lock();
        state.expired = true;
        state.ref_count = 0;
        if !state.disposed {
            state.disposed = true;
            drop(state);
            self.transport.dispose();
        }
    }
}

/// An entry as it sits in the eviction queue, keyed by creation time
pub(crate) struct QueuedEntry<K, T: Transport> {
    pub fingerprint: K,
    pub entry: Arc<PoolEntry<T>>,
}

impl<K: Clone, T: Transport> Clone for QueuedEntry<K, T> {
    fn clone(&self) -> Self {
        Self {
            fingerprint: self.fingerprint.clone(),
            entry: Arc::clone(&self.entry),
        }
    }
}

impl<K, T: Transport> QueueKey for QueuedEntry<K, T> {
    type Key = Instant;

    fn queue_key(&self) -> Instant {
        self.entry.created_at()
    }
}
