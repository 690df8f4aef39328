//! Health monitoring for invoker pools

use crate::circuit_breaker::CircuitBreakerState;
use crate::metrics::PoolMetrics;

/// Health status of an invoker pool
///
/// # Examples
///
/// ```
/// use esox_invokerpool::{HealthStatus, PoolMetrics};
///
/// let health = HealthStatus::from_metrics(&PoolMetrics::default(), None);
/// assert!(health.is_healthy());
/// assert_eq!(health.warning_count, 0);
/// ```
#[derive(Debug, Clone)]
pub struct HealthStatus {
    /// Whether the pool is healthy
    pub is_healthy: bool,

    /// Number of warnings detected
    pub warning_count: usize,

    /// Share of the size bound in use (0.0 to 1.0)
    pub utilization: f64,

    /// Entries that can still be rented
    pub live_entries: usize,

    /// Expired entries waiting for their owners
    pub retired_entries: usize,

    /// Owners not yet released
    pub outstanding_owners: usize,

    /// Warning messages
    pub warnings: Vec<String>,
}

impl HealthStatus {
    /// Derive health from a metrics snapshot and the factory breaker state
    pub fn from_metrics(metrics: &PoolMetrics, breaker: Option<CircuitBreakerState>) -> Self {
        let mut warnings = Vec::new();
        let mut is_healthy = true;
        let live = metrics.live_entries;

        if metrics.utilization > 0.9 {
            warnings.push(format!("High utilization: {:.1}%", metrics.utilization * 100.0));
            is_healthy = false;
        }

        if breaker == Some(CircuitBreakerState::Open) {
            warnings.push("Transport factory circuit breaker is open".to_string());
            is_healthy = false;
        }

        // Retired entries outnumbering live ones means owners are holding on too long.
        if metrics.retired_entries > 0 && metrics.retired_entries >= live {
            warnings.push(format!(
                "{} expired transports still rented",
                metrics.retired_entries
            ));
        }

        Self {
            is_healthy,
            warning_count: warnings.len(),
            utilization: metrics.utilization,
            live_entries: live,
            retired_entries: metrics.retired_entries,
            outstanding_owners: metrics.outstanding_owners,
            warnings,
        }
    }

    /// Check if the pool is healthy
    pub fn is_healthy(&self) -> bool {
        self.is_healthy
    }
}
