//! Fingerprinting HTTP/1.1 transport.
//!
//! One [`FingerprintClient`] exists per destination host. It owns a
//! BoringSSL connector configured for the client's profile and a small pool
//! of idle keep-alive connections.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use http::Method;
use tokio::time::Instant;
use url::Url;

use crate::cookie::{merge_cookie_header, Cookie};
use crate::error::{Error, Result};
use crate::fingerprint::FingerprintProfile;
use crate::headers::{find_header, remove_header, set_header};
use crate::timeouts::Timeouts;
use crate::transport::connector::BoringConnector;
use crate::transport::h1::{authority, H1Connection, ResponseHead};
use crate::transport::proxy::ProxyConfig;
use crate::transport::{
    BoxFuture, ClientConfig, RawResponse, Transport, TransportClient, WireRequest,
};

/// Maximum number of redirects followed for one request.
pub const MAX_REDIRECTS: u32 = 10;

/// Idle connections kept per origin.
const MAX_IDLE_PER_ORIGIN: usize = 8;

/// Builds [`FingerprintClient`]s.
#[derive(Debug, Clone, Default)]
pub struct FingerprintTransport {
    timeouts: Timeouts,
    root_certs: Vec<Vec<u8>>,
}

impl FingerprintTransport {
    pub fn new(timeouts: Timeouts) -> Self {
        Self {
            timeouts,
            root_certs: Vec::new(),
        }
    }

    /// Trust additional root certificates (DER or PEM).
    pub fn with_root_certificates(mut self, certs: Vec<Vec<u8>>) -> Self {
        self.root_certs = certs;
        self
    }
}

impl Transport for FingerprintTransport {
    fn build_client(&self, config: &ClientConfig) -> Result<Arc<dyn TransportClient>> {
        let profile = FingerprintProfile::from_identifier(&config.profile.fingerprint)?;
        let proxy = config
            .proxy
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(ProxyConfig::parse)
            .transpose()?;

        let connector =
            BoringConnector::new(&profile, proxy, &self.root_certs, self.timeouts.connect)?;

        let user_agent = if config.profile.user_agent.is_empty() {
            profile.user_agent().to_string()
        } else {
            config.profile.user_agent.clone()
        };

        tracing::debug!(
            profile = ?profile,
            proxied = config.proxy.is_some(),
            follow_redirects = config.follow_redirects,
            "Built transport client"
        );

        Ok(Arc::new(FingerprintClient {
            connector,
            user_agent,
            cookies: config.profile.cookies.clone(),
            timeout: config.timeout,
            follow_redirects: config.follow_redirects,
            read_idle: self.timeouts.read_idle,
            pool: Arc::new(IdlePool::new(self.timeouts.keep_alive)),
        }))
    }
}

/// HTTP/1.1 client bound to one profile and proxy.
pub struct FingerprintClient {
    connector: BoringConnector,
    user_agent: String,
    cookies: Vec<Cookie>,
    timeout: Duration,
    follow_redirects: bool,
    read_idle: Option<Duration>,
    pool: Arc<IdlePool>,
}

impl TransportClient for FingerprintClient {
    fn send(&self, request: WireRequest) -> BoxFuture<'_, Result<RawResponse>> {
        Box::pin(async move {
            let deadline = Instant::now() + self.timeout;
            match tokio::time::timeout_at(deadline, self.execute(request, deadline)).await {
                Ok(result) => result,
                Err(_) => Err(Error::TotalTimeout(self.timeout)),
            }
        })
    }
}

impl FingerprintClient {
    async fn execute(&self, mut request: WireRequest, deadline: Instant) -> Result<RawResponse> {
        if find_header(&request.headers, "user-agent").is_none() && !self.user_agent.is_empty() {
            request
                .headers
                .push(("User-Agent".to_string(), self.user_agent.clone()));
        }
        merge_cookie_header(&mut request.headers, &self.cookies);

        let mut redirects = 0u32;
        loop {
            let (mut conn, head) = self.round_trip(&request).await?;

            let location = if self.follow_redirects && is_redirect(head.status) {
                find_header(&head.headers, "location").map(str::to_string)
            } else {
                None
            };

            let Some(location) = location else {
                return Ok(self.into_raw_response(conn, head, request.url, deadline));
            };

            if redirects >= MAX_REDIRECTS {
                return Err(Error::RedirectLimit { count: redirects });
            }
            let next = request
                .url
                .join(&location)
                .map_err(|e| Error::InvalidRedirectUrl(format!("{}: {}", location, e)))?;
            if !matches!(next.scheme(), "http" | "https") {
                return Err(Error::InvalidRedirectUrl(location));
            }

            // Drain the redirect body so the connection can go back to the pool.
            if conn.read_body(head.framing).await.is_ok() && conn.is_reusable() {
                self.pool.checkin(PoolKey::from_url(&request.url), conn);
            }

            tracing::debug!(status = head.status, from = %request.url, to = %next, "Following redirect");
            rewrite_for_redirect(&mut request, head.status, next);
            redirects += 1;
        }
    }

    /// Send on a pooled connection if one is idle, else on a fresh one.
    ///
    /// A pooled connection that fails is assumed stale. The request is
    /// retried once on a new connection if the write failed, or if the
    /// method is idempotent. A non-idempotent request that was fully
    /// written is never sent twice.
    async fn round_trip(&self, request: &WireRequest) -> Result<(H1Connection, ResponseHead)> {
        let key = PoolKey::from_url(&request.url);

        if let Some(mut conn) = self.pool.checkout(&key) {
            match conn.write_request(request).await {
                Ok(()) => match conn.read_head(&request.method).await {
                    Ok(head) => return Ok((conn, head)),
                    Err(e) if is_replayable(&request.method) => {
                        tracing::debug!(origin = ?key, error = %e, "Pooled connection closed, retrying")
                    }
                    Err(e) => return Err(e),
                },
                Err(e) => {
                    tracing::debug!(origin = ?key, error = %e, "Pooled connection stale, reconnecting")
                }
            }
        }

        let stream = self.connector.connect(&request.url).await?;
        tracing::debug!(origin = ?key, tls = stream.is_tls(), "Opened connection");
        let mut conn = H1Connection::new(stream, self.read_idle);
        conn.write_request(request).await?;
        let head = conn.read_head(&request.method).await?;
        Ok((conn, head))
    }

    fn into_raw_response(
        &self,
        mut conn: H1Connection,
        head: ResponseHead,
        url: Url,
        deadline: Instant,
    ) -> RawResponse {
        let pool = Arc::clone(&self.pool);
        let key = PoolKey::from_url(&url);
        let timeout = self.timeout;
        let framing = head.framing;

        let body = Box::pin(async move {
            let bytes = tokio::time::timeout_at(deadline, conn.read_body(framing))
                .await
                .map_err(|_| {
                    Error::body_read(format!("Total request deadline exceeded after {:?}", timeout))
                })?
                .map_err(|e| Error::body_read(e.to_string()))?;
            if conn.is_reusable() {
                pool.checkin(key, conn);
            }
            Ok::<Bytes, Error>(bytes)
        });

        RawResponse {
            status: head.status,
            headers: head.headers,
            url,
            body,
        }
    }
}

/// Idempotent methods (RFC 9110 Section 9.2.2) may be resent after a lost response.
fn is_replayable(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE | Method::PUT | Method::DELETE
    )
}

fn is_redirect(status: u16) -> bool {
    matches!(status, 301 | 302 | 303 | 307 | 308)
}

/// Apply RFC 9110 Section 15.4 method rewriting and retarget the request.
fn rewrite_for_redirect(request: &mut WireRequest, status: u16, next: Url) {
    let to_get = match status {
        303 => request.method != Method::HEAD,
        301 | 302 => request.method == Method::POST,
        _ => false,
    };
    if to_get {
        request.method = Method::GET;
        request.body = Bytes::new();
        remove_header(&mut request.headers, "content-type");
        remove_header(&mut request.headers, "content-length");
        remove_header(&mut request.headers, "transfer-encoding");
    }

    let same_origin = next.origin() == request.url.origin();
    if !same_origin {
        remove_header(&mut request.headers, "authorization");
    }
    if find_header(&request.headers, "host").is_some() {
        set_header(&mut request.headers, "Host", authority(&next));
    }
    request.url = next;
}

/// Connection pool key identifying a unique scheme/host/port combination.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
struct PoolKey {
    host: String,
    port: u16,
    is_https: bool,
}

impl PoolKey {
    fn from_url(url: &Url) -> Self {
        Self {
            host: url.host_str().unwrap_or_default().to_ascii_lowercase(),
            port: url.port_or_known_default().unwrap_or_default(),
            is_https: url.scheme() == "https",
        }
    }
}

struct IdleConnection {
    conn: H1Connection,
    idle_since: Instant,
}

/// Idle keep-alive connections by origin.
struct IdlePool {
    keep_alive: Duration,
    idle: Mutex<HashMap<PoolKey, Vec<IdleConnection>>>,
}

impl IdlePool {
    fn new(keep_alive: Duration) -> Self {
        Self {
            keep_alive,
            idle: Mutex::new(HashMap::new()),
        }
    }

    /// Most recently used live connection for `key`, if any.
    fn checkout(&self, key: &PoolKey) -> Option<H1Connection> {
        let mut idle = self.idle.lock().unwrap_or_else(|e| e.into_inner());
        let entries = idle.get_mut(key)?;
        entries.retain(|entry| entry.idle_since.elapsed() < self.keep_alive);
        let found = entries.pop().map(|entry| entry.conn);
        if entries.is_empty() {
            idle.remove(key);
        }
        found
    }

    fn checkin(&self, key: PoolKey, conn: H1Connection) {
        let mut idle = self.idle.lock().unwrap_or_else(|e| e.into_inner());
        let entries = idle.entry(key).or_default();
        if entries.len() >= MAX_IDLE_PER_ORIGIN {
            entries.remove(0);
        }
        entries.push(IdleConnection {
            conn,
            idle_since: Instant::now(),
        });
    }
}
