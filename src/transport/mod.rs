//! HTTP transport boundary.
//!
//! The dispatcher only sees [`Transport`] (builds one client per host) and
//! [`TransportClient`] (sends one request). The bundled implementation,
//! [`client::FingerprintTransport`], speaks HTTP/1.1 over BoringSSL with the
//! profile's TLS fingerprint.

pub mod client;
pub mod connector;
pub mod h1;
pub mod proxy;
pub mod tcp;

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::Method;
use url::Url;

use crate::cookie::Cookie;
use crate::error::Result;

pub use client::FingerprintTransport;

/// Boxed future used at the trait boundary.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Pending response body. Resolves once the whole body is read.
pub type BodyFuture = BoxFuture<'static, Result<Bytes>>;

/// Fingerprint, user agent and cookies a client presents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportProfile {
    /// Profile identifier or JA3 string.
    pub fingerprint: String,
    pub user_agent: String,
    pub cookies: Vec<Cookie>,
}

/// Everything needed to construct a client for one destination host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub profile: TransportProfile,
    /// Total deadline per request.
    pub timeout: Duration,
    pub follow_redirects: bool,
    pub proxy: Option<String>,
}

/// A request ready for the wire: headers already in transmission order.
#[derive(Debug, Clone)]
pub struct WireRequest {
    pub method: Method,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    /// Pseudo-header order for protocols that use them.
    pub pseudo_header_order: [&'static str; 4],
    pub body: Bytes,
}

/// Response head plus a body that has not been read yet.
pub struct RawResponse {
    pub status: u16,
    /// Headers in arrival order, repeated names kept.
    pub headers: Vec<(String, String)>,
    /// URL that produced this response (differs from the request after redirects).
    pub url: Url,
    pub body: BodyFuture,
}

impl fmt::Debug for RawResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("url", &self.url.as_str())
            .finish_non_exhaustive()
    }
}

/// A configured, long-lived client.
pub trait TransportClient: Send + Sync {
    /// Send a request and return once response headers are in.
    ///
    /// Errors here are transport failures. Body read failures surface from
    /// [`RawResponse::body`].
    fn send(&self, request: WireRequest) -> BoxFuture<'_, Result<RawResponse>>;
}

/// Factory for transport clients.
pub trait Transport: Send + Sync {
    /// Build a client. Invalid configuration is a `ClientConstruction` error.
    fn build_client(&self, config: &ClientConfig) -> Result<Arc<dyn TransportClient>>;
}
