//! Pool configuration options

use std::time::Duration;

/// Shortest wait the sweeper accepts between passes
pub(crate) const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(1);

/// Configuration for invoker pool behavior
///
/// # Examples
///
/// ```
/// use esox_invokerpool::PoolConfiguration;
/// use std::time::Duration;
///
/// let config = PoolConfiguration::new()
///     .with_ttl(Duration::from_secs(120))
///     .with_sweep_interval(Duration::from_secs(5))
///     .with_max_pool_size(16);
///
/// assert_eq!(config.time_to_live, Duration::from_secs(120));
/// assert_eq!(config.max_pool_size, Some(16));
/// ```
#[derive(Debug, Clone)]
pub struct PoolConfiguration {
    /// Age after which an entry stops being handed out and becomes eligible for disposal
    pub time_to_live: Duration,

    /// Upper bound on how long the sweeper sleeps between passes
    pub sweep_interval: Duration,

    /// Maximum number of live entries; the oldest is retired when exceeded
    pub max_pool_size: Option<usize>,

    /// Enable circuit breaker protection around the transport factory
    pub enable_circuit_breaker: bool,

    /// Circuit breaker failure threshold
    pub circuit_breaker_threshold: usize,

    /// Circuit breaker reset timeout
    pub circuit_breaker_timeout: Duration,
}

impl Default for PoolConfiguration {
    fn default() -> Self {
        Self {
            time_to_live: Duration::from_secs(120),
            sweep_interval: Duration::from_secs(10),
            max_pool_size: None,
            enable_circuit_breaker: false,
            circuit_breaker_threshold: 5,
            circuit_breaker_timeout: Duration::from_secs(60),
        }
    }
}

impl PoolConfiguration {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set time-to-live for pool entries
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.time_to_live = ttl;
        self
    }

    /// Set the sweep poll interval
    ///
    /// A zero interval would make the sweeper spin, so it is raised to one millisecond.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval.max(MIN_SWEEP_INTERVAL);
        self
    }

    /// Bound the number of live entries
    ///
    /// # Examples
    ///
    /// ```
    /// use esox_invokerpool::PoolConfiguration;
    ///
    /// let config = PoolConfiguration::new().with_max_pool_size(0);
    /// assert_eq!(config.max_pool_size, Some(1));
    /// ```
    pub fn with_max_pool_size(mut self, size: usize) -> Self {
        self.max_pool_size = Some(size.max(1));
        self
    }

    /// Enable circuit breaker
    ///
    /// # Examples
    ///
    /// ```
    /// use esox_invokerpool::PoolConfiguration;
    /// use std::time::Duration;
    ///
    /// let config = PoolConfiguration::new()
    ///     .with_circuit_breaker(5, Duration::from_secs(60));
    ///
    /// assert!(config.enable_circuit_breaker);
    /// assert_eq!(config.circuit_breaker_threshold, 5);
    /// ```
    pub fn with_circuit_breaker(mut self, threshold: usize, timeout: Duration) -> Self {
        self.enable_circuit_breaker = true;
        self.circuit_breaker_threshold = threshold;
        self.circuit_breaker_timeout = timeout;
        self
    }
}
