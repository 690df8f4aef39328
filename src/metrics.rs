//! Metrics collection and export for invoker pools

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Point-in-time metrics for a pool
///
/// # Examples
///
/// ```no_run
/// use esox_invokerpool::{HttpInvokerFactory, PoolConfiguration, RequestConfig, TransportPool};
///
/// let pool = TransportPool::new(HttpInvokerFactory, PoolConfiguration::default());
/// {
///     let _invoker = pool.rent(&RequestConfig::default()).unwrap();
///     let metrics = pool.get_metrics();
///     assert_eq!(metrics.total_rented, 1);
///     assert_eq!(metrics.outstanding_owners, 1);
/// }
/// ```
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PoolMetrics {
    /// Total successful rentals
    pub total_rented: usize,

    /// Total owners released
    pub total_released: usize,

    /// Rentals served by an existing entry
    pub entries_reused: usize,

    /// Entries created through the factory
    pub entries_created: usize,

    /// Entries retired by sweep, clear, or size bound
    pub entries_expired: usize,

    /// Transports disposed
    pub transports_disposed: usize,

    /// Expirations that had to wait for owners to release
    pub deferred_disposals: usize,

    /// Factory calls that failed
    pub factory_failures: usize,

    /// Entries in the fingerprint map that can still be rented
    pub live_entries: usize,

    /// Entries in the map that are expired but still rented
    pub retired_entries: usize,

    /// Entries waiting in the eviction queue
    pub queued_entries: usize,

    /// Owners not yet released
    pub outstanding_owners: usize,

    /// Share of the size bound in use (0.0 to 1.0), zero when unbounded
    pub utilization: f64,

    /// Configured size bound, zero when unbounded
    pub max_pool_size: usize,
}

impl PoolMetrics {
    /// Export metrics as a HashMap
    pub fn export(&self) -> HashMap<String, String> {
        let pairs = [
            ("total_rented", self.total_rented.to_string()),
            ("total_released", self.total_released.to_string()),
            ("entries_reused", self.entries_reused.to_string()),
            ("entries_created", self.entries_created.to_string()),
            ("entries_expired", self.entries_expired.to_string()),
            ("transports_disposed", self.transports_disposed.to_string()),
            ("deferred_disposals", self.deferred_disposals.to_string()),
            ("factory_failures", self.factory_failures.to_string()),
            ("live_entries", self.live_entries.to_string()),
            ("retired_entries", self.retired_entries.to_string()),
            ("queued_entries", self.queued_entries.to_string()),
            ("outstanding_owners", self.outstanding_owners.to_string()),
            ("utilization", format!("{:.2}", self.utilization)),
            ("max_pool_size", self.max_pool_size.to_string()),
        ];
        pairs
            .into_iter()
            .map(|(key, value)| (key.to_string(), value))
            .collect()
    }
}

/// Metrics exporter for Prometheus format
pub struct MetricsExporter;

impl MetricsExporter {
    /// Export metrics in Prometheus exposition format
    ///
    /// # Examples
    ///
    /// ```
    /// use esox_invokerpool::{MetricsExporter, PoolMetrics};
    /// use std::collections::HashMap;
    ///
    /// let mut tags = HashMap::new();
    /// tags.insert("service".to_string(), "api".to_string());
    ///
    /// let output = MetricsExporter::export_prometheus(&PoolMetrics::default(), "invokers", Some(&tags));
    /// assert!(output.contains("invokerpool_entries_live"));
    /// assert!(output.contains("service=\"api\""));
    /// ```
    pub fn export_prometheus(
        metrics: &PoolMetrics,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> String {
        let labels = Self::format_labels(pool_name, tags);
        let mut output = String::new();

        let gauges = [
            ("invokerpool_entries_live", "Entries that can still be rented", metrics.live_entries as f64),
            ("invokerpool_entries_retired", "Expired entries still rented", metrics.retired_entries as f64),
            ("invokerpool_entries_queued", "Entries awaiting eviction", metrics.queued_entries as f64),
            ("invokerpool_owners_outstanding", "Owners not yet released", metrics.outstanding_owners as f64),
            ("invokerpool_utilization", "Share of the size bound in use", metrics.utilization),
        ];
        for (name, help, value) in gauges {
            Self::write_metric(&mut output, name, help, "gauge", &labels, value);
        }

        let counters = [
            ("invokerpool_rentals_total", "Successful rentals", metrics.total_rented),
            ("invokerpool_releases_total", "Owners released", metrics.total_released),
            ("invokerpool_entries_created_total", "Entries created", metrics.entries_created),
            ("invokerpool_entries_expired_total", "Entries expired", metrics.entries_expired),
            ("invokerpool_transports_disposed_total", "Transports disposed", metrics.transports_disposed),
            ("invokerpool_factory_failures_total", "Factory failures", metrics.factory_failures),
        ];
        for (name, help, value) in counters {
            Self::write_metric(&mut output, name, help, "counter", &labels, value as f64);
        }

        output
    }

    fn write_metric(output: &mut String, name: &str, help: &str, kind: &str, labels: &str, value: f64) {
        output.push_str(&format!("# HELP {} {}\n", name, help));
        output.push_str(&format!("# TYPE {} {}\n", name, kind));
        if kind == "gauge" && value.fract() != 0.0 {
            output.push_str(&format!("{}{{{}}} {:.2}\n", name, labels, value));
        } else {
            output.push_str(&format!("{}{{{}}} {}\n", name, labels, value as u64));
        }
    }

    fn format_labels(pool_name: &str, tags: Option<&HashMap<String, String>>) -> String {
        let mut labels = vec![format!("pool=\"{}\"", pool_name)];

        if let Some(tags) = tags {
            let mut sorted: Vec<_> = tags.iter().collect();
            sorted.sort();
            for (key, value) in sorted {
                labels.push(format!("{}=\"{}\"", key, value));
            }
        }

        labels.join(",")
    }
}

/// Internal counters updated by the pool
#[derive(Default)]
pub(crate) struct MetricsTracker {
    pub total_rented: AtomicUsize,
    pub total_released: AtomicUsize,
    pub entries_reused: AtomicUsize,
    pub entries_created: AtomicUsize,
    pub entries_expired: AtomicUsize,
    pub transports_disposed: AtomicUsize,
    pub deferred_disposals: AtomicUsize,
    pub factory_failures: AtomicUsize,
}

/// Gauges the pool reads from its own structures when a snapshot is taken
pub(crate) struct PoolGauges {
    /// Every entry in the fingerprint map, retired ones included
    pub mapped_entries: usize,
    pub retired_entries: usize,
    pub queued_entries: usize,
    pub outstanding_owners: usize,
    pub max_pool_size: Option<usize>,
}

impl MetricsTracker {
    pub fn incr(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, gauges: PoolGauges) -> PoolMetrics {
        let live = gauges.mapped_entries.saturating_sub(gauges.retired_entries);
        let utilization = match gauges.max_pool_size {
            Some(max) if max > 0 => (live as f64 / max as f64).min(1.0),
            _ => 0.0,
        };

        PoolMetrics {
            total_rented: self.total_rented.load(Ordering::Relaxed),
            total_released: self.total_released.load(Ordering::Relaxed),
            entries_reused: self.entries_reused.load(Ordering::Relaxed),
            entries_created: self.entries_created.load(Ordering::Relaxed),
            entries_expired: self.entries_expired.load(Ordering::Relaxed),
            transports_disposed: self.transports_disposed.load(Ordering::Relaxed),
            deferred_disposals: self.deferred_disposals.load(Ordering::Relaxed),
            factory_failures: self.factory_failures.load(Ordering::Relaxed),
            live_entries: live,
            retired_entries: gauges.retired_entries,
            queued_entries: gauges.queued_entries,
            outstanding_owners: gauges.outstanding_owners,
            utilization,
            max_pool_size: gauges.max_pool_size.unwrap_or(0),
        }
    }
}
