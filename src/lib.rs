//! # EsoxSolutions.InvokerPool (Rust Port)
//!
//! Pooled HTTP invoker manager for Rust: shares expensive transports between
//! concurrent callers, retires them after a time-to-live, and never disposes
//! one while it is still rented.
//!
//! ## Features
//!
//! - One shared transport per request fingerprint (proxy, protocol version,
//!   redirect policy)
//! - Reference-counted rentals released automatically via RAII (Drop trait)
//! - Time-ordered eviction queue with optimistic, retrying inserts
//! - Background sweep that retires expired entries, deferring disposal of
//!   rented ones to their last owner
//! - Optional pool size bound retiring the oldest entry
//! - Circuit breaker around transport creation
//! - Health monitoring and metrics, with Prometheus export
//! - `reqwest`-backed HTTP invoker with header-only or buffered completion
//!
//! ## Quick Start
//!
//! ```no_run
//! use esox_invokerpool::{HttpInvokerFactory, PoolConfiguration, RequestConfig, Transport, TransportPool};
//!
//! # async fn run() -> Result<(), esox_invokerpool::InvokeError> {
//! let pool = TransportPool::new(HttpInvokerFactory, PoolConfiguration::default());
//! let config = RequestConfig::default();
//! {
//!     let invoker = pool.rent(&config)?;
//!     let request = reqwest::Request::new(reqwest::Method::GET, "https://example.com/".parse().unwrap());
//!     let response = invoker.send(config.prepare(request)).await?;
//!     println!("Got: {}", response.status());
//!     // Invoker automatically released when `invoker` goes out of scope
//! }
//! # Ok(())
//! # }
//! ```

mod pool;
mod config;
mod metrics;
mod health;
mod eviction;
mod circuit_breaker;
mod errors;
mod queue;
mod entry;
mod owner;
mod transport;
mod invoker;

pub use pool::TransportPool;
pub use config::PoolConfiguration;
pub use metrics::{PoolMetrics, MetricsExporter};
pub use health::HealthStatus;
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerState};
pub use errors::{PoolError, PoolResult, InvokeError};
pub use queue::{OrderedEvictionQueue, QueueKey};
pub use owner::Owner;
pub use transport::{Fingerprinted, FnFactory, Transport, TransportFactory};
pub use invoker::{
    CompletionOption, HttpInvoker, HttpInvokerFactory, HttpVersion, InvokerFingerprint,
    InvokerRequest, InvokerResponse, RedirectPolicy, RequestConfig,
};
