//! Error types for wraith crate.
//!
//! Transport-level failures never reach callers of the dispatch path as
//! errors. They are classified into a synthesized status and message by
//! [`classify`]. Only body read failures and caller mistakes (bad URL, bad
//! proxy, bad method) surface as `Err`.

use std::io;
use std::time::Duration;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building, dispatching or normalizing requests.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Target URL could not be parsed or is not an http(s) URL with a host.
    #[error("Invalid URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// HTTP method is not a valid token.
    #[error("Invalid HTTP method: {0:?}")]
    InvalidMethod(String),

    /// Transport client could not be built (bad proxy, bad fingerprint, TLS setup).
    #[error("Client construction failed: {0}")]
    ClientConstruction(String),

    /// Host name resolution failed.
    #[error("DNS resolution failed for {host}: {message}")]
    Dns { host: String, message: String },

    /// Resolution succeeded but yielded nothing usable.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// TCP connect failed at the socket level.
    #[error("Failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// Proxy handshake (CONNECT or SOCKS5) failed.
    #[error("Proxy error: {0}")]
    Proxy(String),

    /// TLS/SSL error.
    #[error("TLS error: {0}")]
    Tls(String),

    /// HTTP protocol error before response headers were complete.
    #[error("HTTP protocol error: {0}")]
    HttpProtocol(String),

    /// Connect timeout (TCP + proxy + TLS handshake).
    #[error("Connect timeout after {0:?}")]
    ConnectTimeout(Duration),

    /// Total request deadline exceeded.
    #[error("Total request deadline exceeded after {0:?}")]
    TotalTimeout(Duration),

    /// Read idle timeout (no data received within duration).
    #[error("Read idle timeout after {0:?} - stream may be hung")]
    ReadIdleTimeout(Duration),

    /// Redirect limit exceeded.
    #[error("Redirect limit exceeded ({count} redirects)")]
    RedirectLimit { count: u32 },

    /// Invalid redirect URL.
    #[error("Invalid redirect URL: {0}")]
    InvalidRedirectUrl(String),

    /// Response body could not be read after headers were received.
    #[error("Failed to read response body: {0}")]
    BodyRead(String),

    /// Content-Encoding unsupported or body corrupt.
    #[error("Decompression error: {0}")]
    Decode(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Queue or close was called on a session without a worker pool.
    #[error("Worker pool is not running")]
    PoolUnavailable,

    /// The worker pool stopped accepting submissions.
    #[error("Worker pool is closed")]
    PoolClosed,
}

impl Error {
    /// Create an invalid URL error.
    pub fn invalid_url(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Create a client construction error.
    pub fn client_construction(message: impl Into<String>) -> Self {
        Self::ClientConstruction(message.into())
    }

    /// Create an HTTP protocol error.
    pub fn http_protocol(message: impl Into<String>) -> Self {
        Self::HttpProtocol(message.into())
    }

    /// Create a TLS error.
    pub fn tls(message: impl Into<String>) -> Self {
        Self::Tls(message.into())
    }

    /// Create a proxy error.
    pub fn proxy(message: impl Into<String>) -> Self {
        Self::Proxy(message.into())
    }

    /// Create a body read error.
    pub fn body_read(message: impl Into<String>) -> Self {
        Self::BodyRead(message.into())
    }

    /// Whether this error is a timeout of any phase.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::ConnectTimeout(_) | Self::TotalTimeout(_) | Self::ReadIdleTimeout(_) => true,
            Self::Connect { source, .. } | Self::Io(source) => {
                source.kind() == io::ErrorKind::TimedOut
            }
            _ => false,
        }
    }
}

/// Status code and text a transport failure is reported as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorClass {
    pub status: u16,
    pub message: &'static str,
}

impl ErrorClass {
    pub const TIMEOUT: Self = Self::new(408, "Request timed out");
    pub const SYSCALL: Self = Self::new(401, "Request returned a Syscall Error");
    pub const ADDRESS: Self = Self::new(405, "Request returned an Address Error");
    pub const DNS: Self = Self::new(421, "Request returned a DNS Error");
    pub const TLS: Self = Self::new(421, "Request returned a TLS Error");
    pub const PROXY: Self = Self::new(421, "Request returned a Proxy Error");
    pub const BODY: Self = Self::new(502, "Response body could not be read");
    pub const CONNECTION: Self = Self::new(421, "Request returned a Connection Error");

    const fn new(status: u16, message: &'static str) -> Self {
        Self { status, message }
    }

    /// Message carried by a synthesized response: classification text plus raw error.
    pub fn describe(&self, err: &Error) -> String {
        format!("{} -> {}", self.message, err)
    }
}

/// Map an error to the status/text pair used for synthesized responses.
///
/// Every error maps to a non-zero status.
pub fn classify(err: &Error) -> ErrorClass {
    if err.is_timeout() {
        return ErrorClass::TIMEOUT;
    }
    match err {
        Error::Connect { .. } => ErrorClass::SYSCALL,
        Error::Io(e) if is_syscall_kind(e.kind()) => ErrorClass::SYSCALL,
        Error::InvalidAddress(_) => ErrorClass::ADDRESS,
        Error::Dns { .. } => ErrorClass::DNS,
        Error::Tls(_) => ErrorClass::TLS,
        Error::Proxy(_) => ErrorClass::PROXY,
        Error::BodyRead(_) => ErrorClass::BODY,
        _ => ErrorClass::CONNECTION,
    }
}

fn is_syscall_kind(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::AddrNotAvailable
            | io::ErrorKind::PermissionDenied
    )
}
