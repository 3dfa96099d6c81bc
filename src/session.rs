//! Public entry point.
//!
//! A [`Session`] owns the client cache and, optionally, a worker pool. The
//! synchronous path ([`Session::send`]) and the pool share the same cache,
//! so both reuse one client per host.

use std::sync::Arc;

use crate::client_cache::ClientCache;
use crate::dispatcher::dispatch;
use crate::error::{Error, Result};
use crate::pool::{PoolConfig, WorkerPool};
use crate::request::{RequestBuilder, RequestOptions};
use crate::response::Response;
use crate::timeouts::Timeouts;
use crate::transport::{FingerprintTransport, Transport};

/// Builder for [`Session`].
#[derive(Default)]
pub struct SessionBuilder {
    worker_pool: bool,
    pool: PoolConfig,
    timeouts: Timeouts,
    transport: Option<Arc<dyn Transport>>,
    root_certs: Vec<Vec<u8>>,
}

impl SessionBuilder {
    /// Start a worker pool for [`Session::queue`].
    pub fn worker_pool(mut self, enabled: bool) -> Self {
        self.worker_pool = enabled;
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.pool = self.pool.workers(workers);
        self
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.pool = self.pool.queue_capacity(capacity);
        self
    }

    pub fn timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Use a custom transport instead of the BoringSSL one.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Trust an extra root certificate (DER or PEM). Ignored with a custom transport.
    pub fn add_root_certificate(mut self, cert: impl Into<Vec<u8>>) -> Self {
        self.root_certs.push(cert.into());
        self
    }

    /// Build the session. With a worker pool this must run inside a Tokio runtime.
    pub fn build(self) -> Session {
        let transport = self.transport.unwrap_or_else(|| {
            Arc::new(
                FingerprintTransport::new(self.timeouts.clone())
                    .with_root_certificates(self.root_certs),
            )
        });
        let cache = Arc::new(ClientCache::new(transport));

        Session {
            builder: RequestBuilder::new(cache, self.timeouts.request),
            pool: self.worker_pool.then(|| WorkerPool::start(self.pool)),
        }
    }
}

/// Dispatcher handle.
pub struct Session {
    builder: RequestBuilder,
    pool: Option<WorkerPool>,
}

impl Session {
    /// Session with default settings, with or without a worker pool.
    pub fn init(use_worker_pool: bool) -> Self {
        Self::builder().worker_pool(use_worker_pool).build()
    }

    pub fn builder() -> SessionBuilder {
        SessionBuilder::default()
    }

    /// Send a request and wait for its response.
    ///
    /// Transport failures come back as `Ok` with a synthesized status. `Err`
    /// means the request could not be built or its body could not be read.
    pub async fn send(&self, url: &str, options: RequestOptions, method: &str) -> Result<Response> {
        let built = self.builder.build(with_target(options, url, method)).await?;
        dispatch(built).await
    }

    /// Submit a request to the worker pool and return its correlation id.
    pub async fn queue(&self, url: &str, options: RequestOptions, method: &str) -> Result<String> {
        let pool = self.pool.as_ref().ok_or(Error::PoolUnavailable)?;
        let built = self.builder.build(with_target(options, url, method)).await?;
        let id = built.id.clone();
        pool.submit(built).await?;
        Ok(id)
    }

    /// Next pooled result. `None` without a pool or once the pool has stopped.
    pub async fn recv(&self) -> Option<Response> {
        match &self.pool {
            Some(pool) => pool.recv().await,
            None => None,
        }
    }

    /// Whether a worker pool is running.
    pub fn has_worker_pool(&self) -> bool {
        self.pool.is_some()
    }

    pub fn cache(&self) -> &Arc<ClientCache> {
        self.builder.cache()
    }

    /// Stop the worker pool.
    pub async fn close(self) -> Result<()> {
        let pool = self.pool.ok_or(Error::PoolUnavailable)?;
        pool.close().await;
        Ok(())
    }
}

fn with_target(mut options: RequestOptions, url: &str, method: &str) -> RequestOptions {
    if !url.is_empty() {
        options.url = url.to_string();
    }
    if !method.is_empty() {
        options.method = method.to_string();
    }
    options
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_queue_without_pool() {
        let session = Session::init(false);
        assert!(!session.has_worker_pool());
        let err = session
            .queue("http://example.com", RequestOptions::default(), "GET")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PoolUnavailable));
        assert!(session.recv().await.is_none());
        assert!(matches!(session.close().await, Err(Error::PoolUnavailable)));
    }

    #[tokio::test]
    async fn test_invalid_url_is_returned_not_synthesized() {
        let session = Session::init(false);
        let err = session
            .send("::not a url::", RequestOptions::default(), "GET")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidUrl { .. }));
        assert!(session.cache().is_empty());
    }

    #[test]
    fn test_target_overrides_options() {
        let options = RequestOptions::new("http://old.example").method("POST");
        let options = with_target(options, "http://new.example", "put");
        assert_eq!(options.url, "http://new.example");
        assert_eq!(options.method, "put");
        let kept = with_target(options, "", "");
        assert_eq!(kept.url, "http://new.example");
    }
}
