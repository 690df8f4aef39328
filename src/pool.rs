//! Fingerprint-keyed transport pool

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerState};
use crate::config::PoolConfiguration;
use crate::entry::{Expiry, PoolEntry, QueuedEntry, Release};
use crate::errors::{PoolError, PoolResult};
use crate::eviction::{self, Sweeper};
use crate::health::HealthStatus;
use crate::metrics::{MetricsExporter, MetricsTracker, PoolGauges, PoolMetrics};
use crate::owner::{Owner, ReleaseFn};
use crate::queue::OrderedEvictionQueue;
use crate::transport::{Fingerprinted, TransportFactory};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, trace, warn};

pub(crate) type FingerprintOf<F> = <<F as TransportFactory>::Config as Fingerprinted>::Fingerprint;
pub(crate) type TransportOf<F> = <F as TransportFactory>::Transport;
pub(crate) type Queued<F> = QueuedEntry<FingerprintOf<F>, TransportOf<F>>;

/// State shared between the pool handle, its owners, and the sweeper thread
pub(crate) struct PoolShared<F: TransportFactory> {
    factory: F,
    pub(crate) config: PoolConfiguration,
    entries: DashMap<FingerprintOf<F>, Arc<PoolEntry<TransportOf<F>>>>,
    pub(crate) queue: OrderedEvictionQueue<Queued<F>>,
    metrics: MetricsTracker,
    circuit_breaker: Option<CircuitBreaker>,
    disposed: AtomicBool,
    outstanding: AtomicUsize,
}

impl<F: TransportFactory> PoolShared<F> {
    fn rent(self: &Arc<Self>, config: &F::Config) -> PoolResult<Owner<TransportOf<F>>> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(PoolError::PoolDisposed);
        }

        let fingerprint = config.fingerprint();
        if let Some(entry) = self.acquire_live(&fingerprint) {
            trace!(?fingerprint, "reusing pooled transport");
            MetricsTracker::incr(&self.metrics.entries_reused);
            return Ok(self.make_owner(fingerprint, entry));
        }

        let fresh = Arc::new(PoolEntry::rented(self.create_transport(config)?));

        let entry = match self.entries.entry(fingerprint.clone()) {
            Entry::Occupied(mut slot) => {
                if slot.get().try_acquire() {
                    // Another renter published a live entry while the factory ran.
                    let winner = Arc::clone(slot.get());
                    drop(slot);
                    fresh.discard();
                    MetricsTracker::incr(&self.metrics.transports_disposed);
                    MetricsTracker::incr(&self.metrics.entries_reused);
                    return Ok(self.make_owner(fingerprint, winner));
                }
                slot.insert(Arc::clone(&fresh));
                fresh
            }
            Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&fresh));
                fresh
            }
        };

        self.queue.enqueue_with_backoff(QueuedEntry {
            fingerprint: fingerprint.clone(),
            entry: Arc::clone(&entry),
        });
        MetricsTracker::incr(&self.metrics.entries_created);
        debug!(?fingerprint, "created pooled transport");

        if self.disposed.load(Ordering::Acquire) {
            // Lost a race with dispose(): the entry must not outlive the pool,
            // and dispose() may already have drained the queue.
            self.clear();
            if entry.release() == Release::Disposed {
                self.unmap(&fingerprint, &entry);
                MetricsTracker::incr(&self.metrics.transports_disposed);
            }
            return Err(PoolError::PoolDisposed);
        }

        self.enforce_max_size(&entry);
        Ok(self.make_owner(fingerprint, entry))
    }

    fn acquire_live(&self, fingerprint: &FingerprintOf<F>) -> Option<Arc<PoolEntry<TransportOf<F>>>> {
        let entry = self.entries.get(fingerprint).map(|slot| Arc::clone(slot.value()))?;
        entry.try_acquire().then_some(entry)
    }

    fn create_transport(&self, config: &F::Config) -> PoolResult<TransportOf<F>> {
        if let Some(cb) = &self.circuit_breaker {
            if !cb.allow_request() {
                return Err(PoolError::CircuitBreakerOpen);
            }
        }

        match self.factory.create(config) {
            Ok(transport) => {
                if let Some(cb) = &self.circuit_breaker {
                    cb.record_success();
                }
                Ok(transport)
            }
            Err(err) => {
                warn!(error = %err, "transport factory failed");
                MetricsTracker::incr(&self.metrics.factory_failures);
                if let Some(cb) = &self.circuit_breaker {
                    cb.record_failure();
                }
                Err(PoolError::factory(err))
            }
        }
    }

    /// Retire the oldest entries while the pool holds more than the configured bound
    fn enforce_max_size(&self, newest: &Arc<PoolEntry<TransportOf<F>>>) {
        let Some(max) = self.config.max_pool_size else {
            return;
        };
        while self.queue.count() > max {
            let oldest = self
                .queue
                .dequeue_if(|head| !Arc::ptr_eq(&head.entry, newest));
            match oldest {
                Some(oldest) => {
                    debug!(fingerprint = ?oldest.fingerprint, max, "pool full, retiring oldest transport");
                    self.retire(oldest);
                }
                None => break,
            }
        }
    }

    fn make_owner(
        self: &Arc<Self>,
        fingerprint: FingerprintOf<F>,
        entry: Arc<PoolEntry<TransportOf<F>>>,
    ) -> Owner<TransportOf<F>> {
        self.outstanding.fetch_add(1, Ordering::AcqRel);
        MetricsTracker::incr(&self.metrics.total_rented);
        Owner::new(entry, self.make_release_fn(fingerprint))
    }

    fn make_release_fn(self: &Arc<Self>, fingerprint: FingerprintOf<F>) -> ReleaseFn<TransportOf<F>> {
        let shared = Arc::clone(self);

        Arc::new(move |entry: &Arc<PoolEntry<TransportOf<F>>>| {
            if entry.release() == Release::Disposed {
                debug!(fingerprint = ?fingerprint, "disposed expired transport on last release");
                shared.unmap(&fingerprint, entry);
                MetricsTracker::incr(&shared.metrics.transports_disposed);
            }
            shared.outstanding.fetch_sub(1, Ordering::AcqRel);
            MetricsTracker::incr(&shared.metrics.total_released);
        })
    }

    /// Expire an entry that has left the queue, disposing it now if nobody holds it
    pub(crate) fn retire(&self, queued: Queued<F>) -> Expiry {
        let expiry = queued.entry.expire();
        match expiry {
            Expiry::Disposed => {
                self.unmap(&queued.fingerprint, &queued.entry);
                MetricsTracker::incr(&self.metrics.entries_expired);
                MetricsTracker::incr(&self.metrics.transports_disposed);
            }
            Expiry::Deferred => {
                trace!(fingerprint = ?queued.fingerprint, "transport still rented, deferring disposal");
                MetricsTracker::incr(&self.metrics.entries_expired);
                MetricsTracker::incr(&self.metrics.deferred_disposals);
            }
            Expiry::Unchanged => {}
        }
        expiry
    }

    /// Remove the map slot only if it still points at `entry`
    fn unmap(&self, fingerprint: &FingerprintOf<F>, entry: &Arc<PoolEntry<TransportOf<F>>>) {
        self.entries
            .remove_if(fingerprint, |_, current| Arc::ptr_eq(current, entry));
    }

    fn clear(&self) -> usize {
        let mut disposed = 0;
        for queued in self.queue.drain() {
            if self.retire(queued) == Expiry::Disposed {
                disposed += 1;
            }
        }

        // Entries can be in the map without being queued: retired-but-rented
        // ones, or ones whose creator has not enqueued them yet.
        let remaining: Vec<Queued<F>> = self
            .entries
            .iter()
            .map(|slot| QueuedEntry {
                fingerprint: slot.key().clone(),
                entry: Arc::clone(slot.value()),
            })
            .collect();
        for queued in remaining {
            if self.retire(queued) == Expiry::Disposed {
                disposed += 1;
            }
        }

        // A renter may have enqueued between the first drain and the map pass.
        for queued in self.queue.drain() {
            if self.retire(queued) == Expiry::Disposed {
                disposed += 1;
            }
        }
        disposed
    }

    fn gauges(&self) -> PoolGauges {
        let retired_entries = self
            .entries
            .iter()
            .filter(|slot| slot.value().is_expired())
            .count();
        PoolGauges {
            mapped_entries: self.entries.len(),
            retired_entries,
            queued_entries: self.queue.count(),
            outstanding_owners: self.outstanding.load(Ordering::Acquire),
            max_pool_size: self.config.max_pool_size,
        }
    }
}

/// Thread-safe pool of shared transports keyed by request fingerprint
///
/// Requests whose configurations share a fingerprint share one transport.
/// Entries older than the configured time-to-live are retired by a
/// background sweeper; a retired transport is disposed as soon as its last
/// [`Owner`] is released.
///
/// # Examples
///
/// ```no_run
/// use esox_invokerpool::{HttpInvokerFactory, PoolConfiguration, RequestConfig, TransportPool};
/// use std::time::Duration;
///
/// let config = PoolConfiguration::new().with_ttl(Duration::from_secs(60));
/// let pool = TransportPool::new(HttpInvokerFactory, config);
///
/// let a = pool.rent(&RequestConfig::default()).unwrap();
/// let b = pool.rent(&RequestConfig::default().with_timeout(Duration::from_secs(5))).unwrap();
/// // Timeouts are per request, so both rentals share one transport.
/// assert_eq!(pool.entry_count(), 1);
/// ```
pub struct TransportPool<F: TransportFactory> {
    pub(crate) shared: Arc<PoolShared<F>>,
    sweeper: Mutex<Option<Sweeper>>,
}

impl<F: TransportFactory> TransportPool<F> {
    /// Create a pool and start its background sweeper
    pub fn new(factory: F, config: PoolConfiguration) -> Self {
        let pool = Self::without_sweeper(factory, config);
        match Sweeper::start(Arc::clone(&pool.shared)) {
            Ok(sweeper) => *pool.sweeper.lock() = Some(sweeper),
            Err(err) => {
                warn!(error = %err, "could not start sweeper thread; call evict_expired() to reclaim entries")
            }
        }
        pool
    }

    /// Create a pool whose entries are only reclaimed by `evict_expired`, `clear` and the size bound
    pub(crate) fn without_sweeper(factory: F, config: PoolConfiguration) -> Self {
        let circuit_breaker = config.enable_circuit_breaker.then(|| {
            CircuitBreaker::new(config.circuit_breaker_threshold, config.circuit_breaker_timeout)
        });

        let shared = Arc::new(PoolShared {
            factory,
            config,
            entries: DashMap::new(),
            queue: OrderedEvictionQueue::new(),
            metrics: MetricsTracker::default(),
            circuit_breaker,
            disposed: AtomicBool::new(false),
            outstanding: AtomicUsize::new(0),
        });

        Self {
            shared,
            sweeper: Mutex::new(None),
        }
    }

    /// Rent the transport for `config`, creating one if no live entry exists
    pub fn rent(&self, config: &F::Config) -> PoolResult<Owner<TransportOf<F>>> {
        self.shared.rent(config)
    }

    /// Rent on tokio's blocking pool so a slow factory does not stall the executor
    pub async fn rent_async(&self, config: F::Config) -> PoolResult<Owner<TransportOf<F>>>
    where
        F::Config: Send + 'static,
    {
        let shared = Arc::clone(&self.shared);
        tokio::task::spawn_blocking(move || shared.rent(&config))
            .await
            .map_err(|_| PoolError::Cancelled)?
    }

    /// Run one sweep pass now, returning the number of entries expired
    pub fn evict_expired(&self) -> usize {
        eviction::sweep_expired(&self.shared).expired
    }

    /// Expire every entry, disposing the ones nobody is renting
    ///
    /// Rented entries are disposed when their last owner releases them.
    /// Returns the number of transports disposed immediately.
    pub fn clear(&self) -> usize {
        let disposed = self.shared.clear();
        debug!(disposed, "cleared invoker pool");
        disposed
    }

    /// Stop the sweeper and clear the pool; later rentals fail
    pub fn dispose(&self) {
        if self.shared.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(sweeper) = self.sweeper.lock().take() {
            sweeper.stop();
        }
        self.clear();

        let outstanding = self.outstanding_owners();
        if outstanding > 0 {
            warn!(outstanding, "invoker pool disposed with owners still outstanding");
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.disposed.load(Ordering::Acquire)
    }

    /// Entries in the fingerprint map, including expired ones still rented
    pub fn entry_count(&self) -> usize {
        self.shared.entries.len()
    }

    /// Entries waiting in the eviction queue
    pub fn queued_count(&self) -> usize {
        self.shared.queue.count()
    }

    /// Owners handed out and not yet released
    pub fn outstanding_owners(&self) -> usize {
        self.shared.outstanding.load(Ordering::Acquire)
    }

    /// Get pool metrics
    pub fn get_metrics(&self) -> PoolMetrics {
        self.shared.metrics.snapshot(self.shared.gauges())
    }

    /// Export metrics
    pub fn export_metrics(&self) -> HashMap<String, String> {
        self.get_metrics().export()
    }

    /// Export metrics in Prometheus format
    pub fn export_metrics_prometheus(
        &self,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> String {
        MetricsExporter::export_prometheus(&self.get_metrics(), pool_name, tags)
    }

    /// Get health status
    pub fn get_health_status(&self) -> HealthStatus {
        HealthStatus::from_metrics(&self.get_metrics(), self.circuit_breaker_state())
    }

    pub fn circuit_breaker_state(&self) -> Option<CircuitBreakerState> {
        self.shared.circuit_breaker.as_ref().map(CircuitBreaker::state)
    }
}

impl<F: TransportFactory> Drop for TransportPool<F> {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::tests::CountingTransport;
    use crate::transport::Transport;
    use crossbeam::channel;
    use std::fmt;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Barrier;
    use std::thread;
    use std::time::Duration;

    #[derive(Debug, Clone)]
    struct Route(&'static str);

    impl Fingerprinted for Route {
        type Fingerprint = &'static str;

        fn fingerprint(&self) -> &'static str {
            self.0
        }
    }

    #[derive(Debug)]
    struct Refused;

    impl fmt::Display for Refused {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "refused")
        }
    }

    impl std::error::Error for Refused {}

    type Hook = Box<dyn Fn() + Send + Sync>;

    /// Factory that hands out counting transports, failing for the "down" route
    struct CountingFactory {
        created: Arc<AtomicUsize>,
        disposals: Arc<AtomicUsize>,
        /// Runs inside `create`, before the transport is built
        hook: Hook,
    }

    impl TransportFactory for CountingFactory {
        type Config = Route;
        type Transport = CountingTransport;
        type Error = Refused;

        fn create(&self, config: &Route) -> Result<CountingTransport, Refused> {
            if config.0 == "down" {
                return Err(Refused);
            }
            (self.hook)();
            let id = self.created.fetch_add(1, Ordering::SeqCst);
            Ok(CountingTransport::new(id, Arc::clone(&self.disposals)))
        }
    }

    struct Harness {
        pool: TransportPool<CountingFactory>,
        created: Arc<AtomicUsize>,
        disposals: Arc<AtomicUsize>,
    }

    impl Harness {
        fn created(&self) -> usize {
            self.created.load(Ordering::SeqCst)
        }

        fn disposed(&self) -> usize {
            self.disposals.load(Ordering::SeqCst)
        }
    }

    fn build(config: PoolConfiguration, hook: Hook, sweep: bool) -> Harness {
        let created = Arc::new(AtomicUsize::new(0));
        let disposals = Arc::new(AtomicUsize::new(0));
        let factory = CountingFactory {
            created: Arc::clone(&created),
            disposals: Arc::clone(&disposals),
            hook,
        };
        let pool = if sweep {
            TransportPool::new(factory, config)
        } else {
            TransportPool::without_sweeper(factory, config)
        };
        Harness {
            pool,
            created,
            disposals,
        }
    }

    /// Pool reclaimed only by explicit sweeps, so timing-based tests stay deterministic
    fn harness(config: PoolConfiguration) -> Harness {
        build(config, Box::new(|| {}), false)
    }

    fn hooked_harness(hook: impl Fn() + Send + Sync + 'static) -> Harness {
        build(long_lived(), Box::new(hook), false)
    }

    fn long_lived() -> PoolConfiguration {
        PoolConfiguration::new().with_ttl(Duration::from_secs(3600))
    }

    #[test]
    fn test_same_fingerprint_shares_transport() {
        let h = harness(long_lived());
        let a = h.pool.rent(&Route("api")).unwrap();
        let b = h.pool.rent(&Route("api")).unwrap();
        let c = h.pool.rent(&Route("cdn")).unwrap();

        assert_eq!(a.id, b.id);
        assert_ne!(a.id, c.id);
        assert_eq!(h.created(), 2);
        assert_eq!(h.pool.entry_count(), 2);
        assert_eq!(h.pool.queued_count(), 2);
        assert_eq!(h.pool.outstanding_owners(), 3);
    }

    #[test]
    fn test_release_keeps_live_entry() {
        let h = harness(long_lived());
        let owner = h.pool.rent(&Route("api")).unwrap();
        let entry = owner.entry_arc();
        drop(owner);

        assert_eq!(entry.ref_count(), 0);
        assert_eq!(h.pool.entry_count(), 1);
        assert_eq!(h.disposed(), 0);

        let again = h.pool.rent(&Route("api")).unwrap();
        assert!(Arc::ptr_eq(&again.entry_arc(), &entry));
        assert_eq!(h.created(), 1);
    }

    #[test]
    fn test_concurrent_renters_balance_ref_count() {
        let h = harness(long_lived());
        let renters = 32;

        let owners: Vec<_> = thread::scope(|scope| {
            let handles: Vec<_> = (0..renters)
                .map(|_| scope.spawn(|| h.pool.rent(&Route("api")).unwrap()))
                .collect();
            handles.into_iter().map(|handle| handle.join().unwrap()).collect()
        });

        let entry = h.pool.shared.entries.get("api").map(|slot| Arc::clone(slot.value())).unwrap();
        assert_eq!(entry.ref_count(), renters);
        // Racing creators may each build a transport, but only one is published.
        assert_eq!(h.created() - h.disposed(), 1);

        thread::scope(|scope| {
            for owner in owners {
                scope.spawn(move || drop(owner));
            }
        });

        assert_eq!(entry.ref_count(), 0);
        assert!(!entry.is_disposed());
        assert_eq!(h.pool.entry_count(), 1);
        assert_eq!(h.pool.outstanding_owners(), 0);
    }

    #[test]
    fn test_expired_concurrent_renters_dispose_once() {
        let h = harness(PoolConfiguration::new().with_ttl(Duration::from_millis(20)));
        let owners: Vec<_> = (0..16).map(|_| h.pool.rent(&Route("api")).unwrap()).collect();
        let entry = owners[0].entry_arc();

        thread::sleep(Duration::from_millis(40));
        h.pool.evict_expired();
        assert!(entry.is_expired());
        assert_eq!(h.disposed(), 0);

        thread::scope(|scope| {
            for owner in owners {
                scope.spawn(move || drop(owner));
            }
        });

        assert_eq!(entry.ref_count(), 0);
        assert_eq!(h.disposed(), 1);
        assert_eq!(h.pool.entry_count(), 0);
    }

    #[tokio::test]
    async fn test_rented_transport_outlives_ttl() {
        let h = harness(PoolConfiguration::new().with_ttl(Duration::from_millis(20)));
        let owner = h.pool.rent(&Route("api")).unwrap();

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(h.pool.evict_expired(), 1);
        assert!(owner.is_expired());
        assert_eq!(owner.send("still usable").await.unwrap(), "0:still usable");

        // New rentals never receive the retired transport.
        let fresh = h.pool.rent(&Route("api")).unwrap();
        assert_ne!(fresh.id, owner.id);
        assert_eq!(h.pool.entry_count(), 1);

        drop(owner);
        assert_eq!(h.disposed(), 1);
        // The fresh entry replaced the retired one in the map and survives its disposal.
        assert_eq!(h.pool.entry_count(), 1);
        assert_eq!(fresh.send("ok").await.unwrap(), "1:ok");
    }

    #[test]
    fn test_clear_disposes_idle_entries_once() {
        let h = harness(long_lived());
        for route in ["a", "b", "c"] {
            h.pool.rent(&Route(route)).unwrap();
        }

        assert_eq!(h.pool.clear(), 3);
        assert_eq!(h.pool.entry_count(), 0);
        assert_eq!(h.pool.queued_count(), 0);
        assert_eq!(h.disposed(), 3);

        assert_eq!(h.pool.clear(), 0);
        assert_eq!(h.disposed(), 3);
    }

    #[test]
    fn test_clear_defers_rented_entries() {
        let h = harness(long_lived());
        let held = h.pool.rent(&Route("held")).unwrap();
        h.pool.rent(&Route("idle")).unwrap();

        assert_eq!(h.pool.clear(), 1);
        assert_eq!(h.pool.entry_count(), 1);
        assert!(held.is_expired());

        drop(held);
        assert_eq!(h.disposed(), 2);
        assert_eq!(h.pool.entry_count(), 0);
    }

    #[test]
    fn test_factory_failure_registers_nothing() {
        let h = harness(long_lived());
        let err = h.pool.rent(&Route("down")).unwrap_err();
        assert!(matches!(err, PoolError::Factory(_)));
        assert_eq!(err.to_string(), "Transport factory failed: refused");
        assert_eq!(h.pool.entry_count(), 0);
        assert_eq!(h.pool.queued_count(), 0);
        assert_eq!(h.pool.outstanding_owners(), 0);
        assert_eq!(h.pool.get_metrics().factory_failures, 1);
    }

    #[test]
    fn test_circuit_breaker_opens_on_factory_failures() {
        let h = harness(long_lived().with_circuit_breaker(2, Duration::from_secs(60)));
        assert!(matches!(h.pool.rent(&Route("down")), Err(PoolError::Factory(_))));
        assert!(matches!(h.pool.rent(&Route("down")), Err(PoolError::Factory(_))));
        assert!(matches!(h.pool.rent(&Route("api")), Err(PoolError::CircuitBreakerOpen)));
        assert_eq!(h.pool.circuit_breaker_state(), Some(CircuitBreakerState::Open));
        assert!(!h.pool.get_health_status().is_healthy());
    }

    #[test]
    fn test_max_pool_size_retires_oldest() {
        let h = harness(long_lived().with_max_pool_size(2));
        let first = h.pool.rent(&Route("a")).unwrap().entry_arc();
        thread::sleep(Duration::from_millis(2));
        let held = h.pool.rent(&Route("b")).unwrap();
        thread::sleep(Duration::from_millis(2));
        h.pool.rent(&Route("c")).unwrap();

        assert!(first.is_expired());
        assert_eq!(h.disposed(), 1);
        assert_eq!(h.pool.queued_count(), 2);

        h.pool.rent(&Route("d")).unwrap();
        assert!(held.is_expired());
        assert_eq!(h.disposed(), 1);
        assert_eq!(h.pool.get_metrics().deferred_disposals, 1);
        drop(held);
        assert_eq!(h.disposed(), 2);
    }

    #[test]
    fn test_rent_after_dispose_fails() {
        let h = harness(long_lived());
        let outstanding = h.pool.rent(&Route("api")).unwrap();
        h.pool.dispose();

        assert!(h.pool.is_disposed());
        assert!(matches!(h.pool.rent(&Route("api")), Err(PoolError::PoolDisposed)));
        assert_eq!(h.disposed(), 0);

        drop(outstanding);
        assert_eq!(h.disposed(), 1);
        assert_eq!(h.pool.outstanding_owners(), 0);
    }

    #[test]
    fn test_dropping_pool_disposes_idle_transports() {
        let h = harness(long_lived());
        h.pool.rent(&Route("a")).unwrap();
        h.pool.rent(&Route("b")).unwrap();
        let disposals = Arc::clone(&h.disposals);
        drop(h);
        assert_eq!(disposals.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_background_sweeper_reclaims_idle_entries() {
        let config = PoolConfiguration::new()
            .with_ttl(Duration::from_millis(20))
            .with_sweep_interval(Duration::from_millis(5));
        let h = build(config, Box::new(|| {}), true);
        h.pool.rent(&Route("api")).unwrap();

        let mut waited = Duration::ZERO;
        while h.disposed() == 0 && waited < Duration::from_secs(5) {
            thread::sleep(Duration::from_millis(10));
            waited += Duration::from_millis(10);
        }
        assert_eq!(h.disposed(), 1);
        assert_eq!(h.pool.entry_count(), 0);
        assert_eq!(h.pool.queued_count(), 0);
    }

    #[test]
    fn test_racing_creators_share_published_entry() {
        let barrier = Arc::new(Barrier::new(2));
        let gate = Arc::clone(&barrier);
        // Both renters are inside the factory before either publishes.
        let h = hooked_harness(move || {
            gate.wait();
        });

        let (a, b) = thread::scope(|scope| {
            let a = scope.spawn(|| h.pool.rent(&Route("api")).unwrap());
            let b = scope.spawn(|| h.pool.rent(&Route("api")).unwrap());
            (a.join().unwrap(), b.join().unwrap())
        });

        assert_eq!(a.id, b.id);
        assert!(Arc::ptr_eq(&a.entry_arc(), &b.entry_arc()));
        assert_eq!(a.entry_arc().ref_count(), 2);
        assert_eq!(h.created(), 2);
        assert_eq!(h.disposed(), 1);
        assert_eq!(h.pool.entry_count(), 1);
        assert_eq!(h.pool.queued_count(), 1);
        assert_eq!(h.pool.get_metrics().entries_created, 1);
    }

    #[test]
    fn test_rent_racing_dispose_leaves_pool_empty() {
        let (entered_tx, entered_rx) = channel::bounded::<()>(1);
        let (open_tx, open_rx) = channel::bounded::<()>(1);
        let h = hooked_harness(move || {
            let _ = entered_tx.send(());
            let _ = open_rx.recv();
        });

        thread::scope(|scope| {
            let renter = scope.spawn(|| h.pool.rent(&Route("api")));
            entered_rx.recv().unwrap();
            h.pool.dispose();
            open_tx.send(()).unwrap();
            assert!(matches!(renter.join().unwrap(), Err(PoolError::PoolDisposed)));
        });

        assert_eq!(h.pool.entry_count(), 0);
        assert_eq!(h.pool.queued_count(), 0);
        assert_eq!(h.pool.outstanding_owners(), 0);
        assert_eq!(h.created(), 1);
        assert_eq!(h.disposed(), 1);
    }

    #[test]
    fn test_clear_during_factory_call_keeps_new_entry() {
        let (entered_tx, entered_rx) = channel::bounded::<()>(1);
        let (open_tx, open_rx) = channel::bounded::<()>(1);
        let h = hooked_harness(move || {
            let _ = entered_tx.send(());
            let _ = open_rx.recv();
        });

        let owner = thread::scope(|scope| {
            let renter = scope.spawn(|| h.pool.rent(&Route("api")).unwrap());
            entered_rx.recv().unwrap();
            h.pool.clear();
            open_tx.send(()).unwrap();
            renter.join().unwrap()
        });

        // Created after the clear, so it is a normal live entry.
        assert!(!owner.is_expired());
        assert_eq!(h.pool.queued_count(), 1);
        drop(owner);

        assert_eq!(h.pool.clear(), 1);
        assert_eq!(h.pool.entry_count(), 0);
        assert_eq!(h.pool.queued_count(), 0);
        assert_eq!(h.disposed(), 1);
    }

    #[test]
    fn test_zeroed_sweep_interval_still_reclaims() {
        let mut config = PoolConfiguration::new().with_ttl(Duration::from_millis(10));
        config.sweep_interval = Duration::ZERO;
        let h = build(config, Box::new(|| {}), true);
        h.pool.rent(&Route("api")).unwrap();

        let mut waited = Duration::ZERO;
        while h.disposed() == 0 && waited < Duration::from_secs(5) {
            thread::sleep(Duration::from_millis(10));
            waited += Duration::from_millis(10);
        }
        assert_eq!(h.disposed(), 1);
        assert_eq!(h.pool.queued_count(), 0);
    }

    #[tokio::test]
    async fn test_rent_async() {
        let h = harness(long_lived());
        let owner = h.pool.rent_async(Route("api")).await.unwrap();
        assert_eq!(owner.send("hi").await.unwrap(), "0:hi");
        drop(owner);

        let metrics = h.pool.get_metrics();
        assert_eq!(metrics.total_rented, 1);
        assert_eq!(metrics.total_released, 1);
        assert_eq!(metrics.live_entries, 1);
        assert!(h.pool.export_metrics_prometheus("test", None).contains("pool=\"test\""));
    }
}
