//! Contracts between the pool and the code that builds transports

use crate::errors::InvokeError;

use async_trait::async_trait;
use std::fmt::Debug;
use std::hash::Hash;

/// Request configuration that can be reduced to a pooling key
///
/// Configurations with equal fingerprints share one pooled transport.
pub trait Fingerprinted {
    type Fingerprint: Hash + Eq + Clone + Debug + Send + Sync + 'static;

    fn fingerprint(&self) -> Self::Fingerprint;
}

/// A shared, disposable handle capable of sending requests
///
/// One transport is used concurrently by every owner renting it, so it must be
/// safe to call [`send`](Transport::send) from several tasks at once.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    type Request: Send;
    type Response: Send;

    async fn send(&self, request: Self::Request) -> Result<Self::Response, InvokeError>;

    /// Release the underlying connection resources
    ///
    /// The pool calls this exactly once, after the last owner has released the
    /// transport.
    fn dispose(&self);
}

/// Creates transports for the pool
pub trait TransportFactory: Send + Sync + 'static {
    type Config: Fingerprinted;
    type Transport: Transport;
    type Error: std::error::Error + Send + Sync + 'static;

    fn create(&self, config: &Self::Config) -> Result<Self::Transport, Self::Error>;
}

/// Adapts a closure into a [`TransportFactory`]
///
/// # Examples
///
/// ```
/// use esox_invokerpool::{FnFactory, HttpInvoker, RequestConfig};
///
/// let factory = FnFactory::new(|config: &RequestConfig| HttpInvoker::build(config));
/// # let _ = factory;
/// ```
pub struct FnFactory<C, T, E, F> {
    create_fn: F,
    _marker: std::marker::PhantomData<fn(&C) -> Result<T, E>>,
}

impl<C, T, E, F> FnFactory<C, T, E, F>
where
    F: Fn(&C) -> Result<T, E>,
{
    pub fn new(create_fn: F) -> Self {
        Self {
            create_fn,
            _marker: std::marker::PhantomData,
        }
    }
}

impl<C, T, E, F> TransportFactory for FnFactory<C, T, E, F>
where
    C: Fingerprinted + 'static,
    T: Transport,
    E: std::error::Error + Send + Sync + 'static,
    F: Fn(&C) -> Result<T, E> + Send + Sync + 'static,
{
    type Config = C;
    type Transport = T;
    type Error = E;

    fn create(&self, config: &C) -> Result<T, E> {
        (self.create_fn)(config)
    }
}
