//! # Wraith
//!
//! Concurrent HTTP dispatcher with TLS fingerprint and header order control.
//!
//! Requests are built from [`RequestOptions`], bound to a per-host client
//! from the [`ClientCache`], and either sent directly ([`Session::send`]) or
//! through a bounded worker pool ([`Session::queue`] / [`Session::recv`]).
//! Every request yields a [`Response`]: transport failures are classified
//! into a synthesized status instead of an error.
//!
//! ```no_run
//! use wraith::{RequestOptions, Session};
//!
//! # async fn run() -> wraith::Result<()> {
//! let session = Session::init(false);
//! let options = RequestOptions::default()
//!     .header("Accept", "text/html")
//!     .fingerprint("chrome");
//! let response = session.send("https://example.com", options, "GET").await?;
//! println!("{} {}", response.status, response.body.len());
//! # Ok(())
//! # }
//! ```

pub mod client_cache;
pub mod cookie;
pub mod dispatcher;
pub mod error;
pub mod headers;
pub mod pool;
pub mod request;
pub mod response;
pub mod session;
pub mod timeouts;

// Fingerprinting
pub mod fingerprint;

// Transport layer
pub mod transport;

// Re-exports
pub use client_cache::ClientCache;
pub use cookie::Cookie;
pub use dispatcher::{dispatch, dispatch_or_synthesize};
pub use error::{classify, Error, ErrorClass, Result};
pub use fingerprint::{FingerprintProfile, TlsFingerprint};
pub use headers::{HeaderOrder, DEFAULT_HEADER_ORDER, PSEUDO_HEADER_ORDER};
pub use pool::{PoolConfig, WorkerPool};
pub use request::{BuiltRequest, RequestBuilder, RequestOptions};
pub use response::{Response, SET_COOKIE_SEPARATOR};
pub use session::{Session, SessionBuilder};
pub use timeouts::Timeouts;
pub use transport::{ClientConfig, FingerprintTransport, Transport, TransportClient, TransportProfile};
