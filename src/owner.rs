//! Scoped rental handle for a pooled transport

use crate::entry::PoolEntry;
use crate::transport::Transport;

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

pub(crate) type ReleaseFn<T> = Arc<dyn Fn(&Arc<PoolEntry<T>>) + Send + Sync>;

/// A rented transport that is released back to its pool when dropped
///
/// Every owner holds exactly one reference on its pool entry. Dropping the
/// owner (or calling [`release`](Owner::release)) gives that reference back
/// once; if the entry expired in the meantime and this was the last
/// reference, the transport is disposed right here.
///
/// # Examples
///
/// ```no_run
/// use esox_invokerpool::{HttpInvokerFactory, PoolConfiguration, RequestConfig, TransportPool};
///
/// let pool = TransportPool::new(HttpInvokerFactory, PoolConfiguration::default());
/// let config = RequestConfig::default();
/// {
///     let invoker = pool.rent(&config).unwrap();
///     println!("invoker age: {:?}", invoker.age());
///     // Released when `invoker` goes out of scope
/// }
/// ```
pub struct Owner<T: Transport> {
    entry: Option<Arc<PoolEntry<T>>>,
    release_fn: ReleaseFn<T>,
}

impl<T: Transport> Owner<T> {
    pub(crate) fn new(entry: Arc<PoolEntry<T>>, release_fn: ReleaseFn<T>) -> Self {
        Self {
            entry: Some(entry),
            release_fn,
        }
    }

    fn entry(&self) -> &Arc<PoolEntry<T>> {
        // Only `None` while `release`/`drop` run, which consume the owner.
        self.entry.as_ref().expect("owner already released")
    }

    /// The rented transport
    pub fn value(&self) -> &T {
        self.entry().transport()
    }

    /// How long ago the backing transport was created
    pub fn age(&self) -> Duration {
        self.entry().age()
    }

    /// Whether the pool has retired the backing transport from new rentals
    pub fn is_expired(&self) -> bool {
        self.entry().is_expired()
    }

    /// Give the transport back to the pool now
    pub fn release(mut self) {
        self.release_once();
    }

    fn release_once(&mut self) {
        if let Some(entry) = self.entry.take() {
            (self.release_fn)(&entry);
        }
    }

    #[cfg(test)]
    pub(crate) fn entry_arc(&self) -> Arc<PoolEntry<T>> {
        Arc::clone(self.entry())
    }
}

impl<T: Transport> Deref for Owner<T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.value()
    }
}

impl<T: Transport> Drop for Owner<T> {
    fn drop(&mut self) {
        self.release_once();
    }
}

impl<T: Transport> fmt::Debug for Owner<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Owner");
        if let Some(entry) = &self.entry {
            s.field("age", &entry.age())
                .field("ref_count", &entry.ref_count())
                .field("expired", &entry.is_expired());
        }
        s.finish()
    }
}
