//! TLS and TCP fingerprinting configuration.

pub mod profiles;
pub mod tls;

pub use profiles::FingerprintProfile;
pub use tls::{CertCompression, TlsFingerprint};
