//! Timeout configuration shared by every client a session builds.
//!
//! # Timeout Types
//!
//! - **connect**: TCP + proxy handshake + TLS handshake
//! - **request**: absolute deadline for one request, redirects and body included.
//!   Used when `RequestOptions::timeout` is unset.
//! - **read_idle**: maximum time between received bytes (resets on each chunk)
//! - **keep_alive**: how long an idle connection stays reusable

use std::time::Duration;

/// Timeout configuration for a session.
///
/// # Timeout Semantics
///
/// - **connect**: Does NOT reset. Deadline for establishing the transport connection.
/// - **request**: Does NOT reset. Caps connect + request + response.
/// - **read_idle**: RESETS on each chunk received. Detects hung streams.
/// - **keep_alive**: Idle connections older than this are discarded instead of reused.
#[derive(Clone, Debug)]
pub struct Timeouts {
    /// Timeout for establishing connection (DNS + TCP + proxy + TLS).
    ///
    /// Default: 10s
    pub connect: Option<Duration>,

    /// Default total deadline per request.
    ///
    /// Default: 15s
    pub request: Duration,

    /// Read idle timeout: maximum time waiting for the next chunk of the response.
    ///
    /// Default: 30s
    pub read_idle: Option<Duration>,

    /// Idle connection lifetime.
    ///
    /// Default: 30s
    pub keep_alive: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Some(Duration::from_secs(10)),
            request: Duration::from_secs(15),
            read_idle: Some(Duration::from_secs(30)),
            keep_alive: Duration::from_secs(30),
        }
    }
}

impl Timeouts {
    /// Set connect timeout.
    pub fn connect(mut self, timeout: Duration) -> Self {
        self.connect = Some(timeout);
        self
    }

    /// Set the default request deadline.
    pub fn request(mut self, timeout: Duration) -> Self {
        self.request = timeout;
        self
    }

    /// Set read idle timeout.
    pub fn read_idle(mut self, timeout: Duration) -> Self {
        self.read_idle = Some(timeout);
        self
    }

    /// Set idle connection lifetime.
    pub fn keep_alive(mut self, lifetime: Duration) -> Self {
        self.keep_alive = lifetime;
        self
    }

    /// Disable connect timeout.
    pub fn no_connect_timeout(mut self) -> Self {
        self.connect = None;
        self
    }

    /// Disable read idle timeout.
    pub fn no_read_idle_timeout(mut self) -> Self {
        self.read_idle = None;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let t = Timeouts::default();
        assert_eq!(t.connect, Some(Duration::from_secs(10)));
        assert_eq!(t.request, Duration::from_secs(15));
        assert_eq!(t.read_idle, Some(Duration::from_secs(30)));
        assert_eq!(t.keep_alive, Duration::from_secs(30));
    }

    #[test]
    fn test_builder_pattern() {
        let t = Timeouts::default()
            .connect(Duration::from_secs(5))
            .request(Duration::from_secs(60))
            .no_read_idle_timeout();

        assert_eq!(t.connect, Some(Duration::from_secs(5)));
        assert_eq!(t.request, Duration::from_secs(60));
        assert_eq!(t.read_idle, None);
    }

    #[test]
    fn test_disable_connect_timeout() {
        let t = Timeouts::default().no_connect_timeout();
        assert_eq!(t.connect, None);
        assert_eq!(t.read_idle, Some(Duration::from_secs(30)));

        let t = t.connect(Duration::from_secs(2));
        assert_eq!(t.connect, Some(Duration::from_secs(2)));
    }
}
