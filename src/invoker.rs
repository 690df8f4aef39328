//! HTTP invokers backed by `reqwest`
//!
//! A [`RequestConfig`] describes how one outbound request should be sent.
//! Only the connection-level settings (proxy, protocol version, redirect
//! policy) make up its [`InvokerFingerprint`]; per-request settings such as
//! the timeout and the completion mode travel with the request instead, so
//! they never split the pool.

use crate::errors::InvokeError;
use crate::transport::{Fingerprinted, Transport, TransportFactory};

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{redirect, Client, Proxy, StatusCode};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::debug;

/// HTTP protocol version an invoker speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HttpVersion {
    /// Let ALPN pick HTTP/1.1 or HTTP/2
    #[default]
    Negotiate,
    Http1Only,
    /// Speak HTTP/2 without an upgrade handshake
    Http2PriorKnowledge,
}

/// How an invoker follows redirects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RedirectPolicy {
    None,
    Limited(usize),
}

impl Default for RedirectPolicy {
    fn default() -> Self {
        RedirectPolicy::Limited(10)
    }
}

/// When `send` completes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompletionOption {
    /// After the whole body has been read
    #[default]
    ContentRead,
    /// As soon as the response headers arrive; the body is streamed by the caller
    HeadersRead,
}

/// Settings for one outbound request
///
/// # Examples
///
/// ```
/// use esox_invokerpool::{Fingerprinted, HttpVersion, RequestConfig};
/// use std::time::Duration;
///
/// let a = RequestConfig::new().with_http_version(HttpVersion::Http1Only);
/// let b = a.clone().with_timeout(Duration::from_secs(3));
/// let c = a.clone().with_proxy("http://127.0.0.1:8080");
///
/// assert_eq!(a.fingerprint(), b.fingerprint());
/// assert_ne!(a.fingerprint(), c.fingerprint());
/// ```
#[derive(Debug, Clone, Default)]
pub struct RequestConfig {
    pub proxy: Option<String>,
    pub http_version: HttpVersion,
    pub redirect: RedirectPolicy,
    pub disable_proxy: bool,
    pub timeout: Option<Duration>,
    pub completion: CompletionOption,
}

impl RequestConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route requests through `proxy`
    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    /// Ignore every proxy, including system proxy settings
    pub fn without_proxy(mut self) -> Self {
        self.disable_proxy = true;
        self
    }

    pub fn with_http_version(mut self, version: HttpVersion) -> Self {
        self.http_version = version;
        self
    }

    pub fn with_redirect(mut self, policy: RedirectPolicy) -> Self {
        self.redirect = policy;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_completion(mut self, completion: CompletionOption) -> Self {
        self.completion = completion;
        self
    }

    /// Attach this config's per-request settings to `request`
    pub fn prepare(&self, mut request: reqwest::Request) -> InvokerRequest {
        if let Some(timeout) = self.timeout {
            request.timeout_mut().get_or_insert(timeout);
        }
        InvokerRequest {
            request,
            completion: self.completion,
        }
    }
}

/// Connection-level part of a [`RequestConfig`]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InvokerFingerprint {
    /// `None` when proxies are disabled, so a stale proxy string cannot split the pool
    pub proxy: Option<String>,
    pub http_version: HttpVersion,
    pub redirect: RedirectPolicy,
    pub disable_proxy: bool,
}

impl Fingerprinted for RequestConfig {
    type Fingerprint = InvokerFingerprint;

    fn fingerprint(&self) -> InvokerFingerprint {
        InvokerFingerprint {
            proxy: if self.disable_proxy {
                None
            } else {
                self.proxy.clone()
            },
            http_version: self.http_version,
            redirect: self.redirect,
            disable_proxy: self.disable_proxy,
        }
    }
}

/// A request ready to go through an [`HttpInvoker`]
#[derive(Debug)]
pub struct InvokerRequest {
    pub request: reqwest::Request,
    pub completion: CompletionOption,
}

/// Response from an [`HttpInvoker`]
#[derive(Debug)]
pub enum InvokerResponse {
    /// Headers received; the body has not been read yet
    Streaming(reqwest::Response),
    /// Body fully read
    Buffered {
        status: StatusCode,
        headers: HeaderMap,
        body: Vec<u8>,
    },
}

impl InvokerResponse {
    pub fn status(&self) -> StatusCode {
        match self {
            InvokerResponse::Streaming(response) => response.status(),
            InvokerResponse::Buffered { status, .. } => *status,
        }
    }

    pub fn headers(&self) -> &HeaderMap {
        match self {
            InvokerResponse::Streaming(response) => response.headers(),
            InvokerResponse::Buffered { headers, .. } => headers,
        }
    }

    /// Read the remaining body, streaming it in if necessary
    pub async fn into_body(self) -> Result<Vec<u8>, InvokeError> {
        match self {
            InvokerResponse::Streaming(response) => Ok(response.bytes().await?.to_vec()),
            InvokerResponse::Buffered { body, .. } => Ok(body),
        }
    }
}

/// Shared HTTP client built for one [`InvokerFingerprint`]
#[derive(Debug)]
pub struct HttpInvoker {
    client: Client,
    disposed: AtomicBool,
}

impl HttpInvoker {
    /// Build a client wired for `config`'s proxy, redirect and protocol settings
    pub fn build(config: &RequestConfig) -> Result<Self, InvokeError> {
        let policy = match config.redirect {
            RedirectPolicy::None => redirect::Policy::none(),
            RedirectPolicy::Limited(max) => redirect::Policy::limited(max),
        };
        let mut builder = Client::builder().redirect(policy);

        if config.disable_proxy {
            builder = builder.no_proxy();
        } else if let Some(proxy) = &config.proxy {
            let proxy = Proxy::all(proxy.as_str())
                .map_err(|_| InvokeError::InvalidProxy(proxy.clone()))?;
            builder = builder.proxy(proxy);
        }

        builder = match config.http_version {
            HttpVersion::Negotiate => builder,
            HttpVersion::Http1Only => builder.http1_only(),
            HttpVersion::Http2PriorKnowledge => builder.http2_prior_knowledge(),
        };

        Ok(Self {
            client: builder.build()?,
            disposed: AtomicBool::new(false),
        })
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

#[async_trait]
impl Transport for HttpInvoker {
    type Request = InvokerRequest;
    type Response = InvokerResponse;

    async fn send(&self, request: InvokerRequest) -> Result<InvokerResponse, InvokeError> {
        if self.is_disposed() {
            return Err(InvokeError::Disposed);
        }

        let response = self.client.execute(request.request).await?;
        match request.completion {
            CompletionOption::HeadersRead => Ok(InvokerResponse::Streaming(response)),
            CompletionOption::ContentRead => {
                let status = response.status();
                let headers = response.headers().clone();
                let body = response.bytes().await?.to_vec();
                Ok(InvokerResponse::Buffered {
                    status,
                    headers,
                    body,
                })
            }
        }
    }

    fn dispose(&self) {
        // Idle connections close once the last clone of the client is dropped
        // with the pool entry; from here on no new request may start.
        self.disposed.store(true, Ordering::Release);
        debug!("http invoker disposed");
    }
}

/// Factory building one [`HttpInvoker`] per fingerprint
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpInvokerFactory;

impl TransportFactory for HttpInvokerFactory {
    type Config = RequestConfig;
    type Transport = HttpInvoker;
    type Error = InvokeError;

    fn create(&self, config: &RequestConfig) -> Result<HttpInvoker, InvokeError> {
        HttpInvoker::build(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PoolConfiguration, PoolError, TransportPool};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve `count` canned HTTP/1.1 responses on a loopback port
    async fn serve(count: usize) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            for _ in 0..count {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut buf = vec![0u8; 4096];
                let mut read = 0;
                while !buf[..read].windows(4).any(|w| w == b"\r\n\r\n") {
                    let n = socket.read(&mut buf[read..]).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    read += n;
                }
                socket
                    .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 5\r\nx-pool: yes\r\nconnection: close\r\n\r\nhello")
                    .await
                    .unwrap();
            }
        });
        format!("http://{}/", addr)
    }

    fn get(url: &str) -> reqwest::Request {
        reqwest::Request::new(reqwest::Method::GET, url.parse().unwrap())
    }

    #[test]
    fn test_fingerprint_ignores_per_request_settings() {
        let base = RequestConfig::new();
        let tuned = base
            .clone()
            .with_timeout(Duration::from_secs(1))
            .with_completion(CompletionOption::HeadersRead);
        assert_eq!(base.fingerprint(), tuned.fingerprint());

        let no_redirects = base.clone().with_redirect(RedirectPolicy::None);
        assert_ne!(base.fingerprint(), no_redirects.fingerprint());
    }

    #[test]
    fn test_disabled_proxy_drops_proxy_from_fingerprint() {
        let a = RequestConfig::new().with_proxy("http://10.0.0.1:3128").without_proxy();
        let b = RequestConfig::new().without_proxy();
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_prepare_keeps_explicit_request_timeout() {
        let config = RequestConfig::new().with_timeout(Duration::from_secs(9));
        let mut request = get("http://localhost/");
        *request.timeout_mut() = Some(Duration::from_secs(1));

        let prepared = config.prepare(request);
        assert_eq!(prepared.request.timeout(), Some(&Duration::from_secs(1)));

        let prepared = config.prepare(get("http://localhost/"));
        assert_eq!(prepared.request.timeout(), Some(&Duration::from_secs(9)));
    }

    #[test]
    fn test_invalid_proxy_fails_creation() {
        let config = RequestConfig::new().with_proxy("http://exa mple.com:80");
        assert!(matches!(
            HttpInvokerFactory.create(&config),
            Err(InvokeError::InvalidProxy(_))
        ));
    }

    #[test]
    fn test_pool_propagates_factory_error() {
        let pool = TransportPool::new(HttpInvokerFactory, PoolConfiguration::default());
        let config = RequestConfig::new().with_proxy("http://exa mple.com:80");
        assert!(matches!(pool.rent(&config), Err(PoolError::Factory(_))));
        assert_eq!(pool.entry_count(), 0);
    }

    #[tokio::test]
    async fn test_content_read_buffers_body() {
        let url = serve(1).await;
        let config = RequestConfig::new().with_http_version(HttpVersion::Http1Only);
        let invoker = HttpInvoker::build(&config).unwrap();

        let response = invoker.send(config.prepare(get(&url))).await.unwrap();
        assert!(matches!(response, InvokerResponse::Buffered { .. }));
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-pool"], "yes");
        assert_eq!(response.into_body().await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_headers_read_streams_body() {
        let url = serve(1).await;
        let config = RequestConfig::new().with_completion(CompletionOption::HeadersRead);
        let pool = TransportPool::new(HttpInvokerFactory, PoolConfiguration::default());

        let invoker = pool.rent_async(config.clone()).await.unwrap();
        let response = invoker.send(config.prepare(get(&url))).await.unwrap();
        assert!(matches!(response, InvokerResponse::Streaming(_)));
        assert_eq!(response.into_body().await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_disposed_invoker_refuses_requests() {
        let invoker = HttpInvoker::build(&RequestConfig::new()).unwrap();
        invoker.dispose();
        assert!(invoker.is_disposed());

        let err = invoker
            .send(RequestConfig::new().prepare(get("http://127.0.0.1:9/")))
            .await
            .unwrap_err();
        assert!(matches!(err, InvokeError::Disposed));
    }
}
