//! Error types for the invoker pool

use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum PoolError {
    #[error("Eviction queue is empty")]
    QueueEmpty,

    #[error("Pool has been disposed - no further rentals are possible")]
    PoolDisposed,

    #[error("Transport factory failed: {0}")]
    Factory(Arc<dyn std::error::Error + Send + Sync>),

    #[error("Circuit breaker is open - too many factory failures")]
    CircuitBreakerOpen,

    #[error("Rental was cancelled")]
    Cancelled,
}

impl PoolError {
    pub(crate) fn factory<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        PoolError::Factory(Arc::new(err))
    }
}

pub type PoolResult<T> = Result<T, PoolError>;

/// Errors raised while sending a request through a pooled invoker
#[derive(Error, Debug)]
pub enum InvokeError {
    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid proxy address {0:?}")]
    InvalidProxy(String),

    #[error("Invoker has already been disposed")]
    Disposed,
}
