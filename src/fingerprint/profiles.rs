//! Browser fingerprint profiles.

use super::tls::TlsFingerprint;
use crate::error::{Error, Result};
use crate::transport::tcp::TcpFingerprint;

const CHROME_131_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Browser fingerprint profile for impersonation.
///
/// Note: Chrome randomizes TLS extension order since v110, so a static JA3
/// never matches real Chrome exactly.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FingerprintProfile {
    /// Chrome 131 on macOS.
    #[default]
    Chrome131,
    /// Caller-supplied JA3 string.
    Ja3(TlsFingerprint),
    /// No fingerprinting - use default TLS settings.
    None,
}

impl FingerprintProfile {
    /// Resolve a profile identifier.
    ///
    /// - `""`, `chrome`, `chrome131`: Chrome 131
    /// - `none`: library defaults
    /// - anything containing a comma: a JA3 string
    pub fn from_identifier(id: &str) -> Result<Self> {
        let id = id.trim();
        if id.contains(',') {
            return TlsFingerprint::from_ja3(id).map(Self::Ja3);
        }
        match id.to_ascii_lowercase().as_str() {
            "" | "chrome" | "chrome131" | "chrome_131" => Ok(Self::Chrome131),
            "none" => Ok(Self::None),
            other => Err(Error::client_construction(format!(
                "Unknown fingerprint profile: {:?}",
                other
            ))),
        }
    }

    /// Get the User-Agent string for this profile.
    pub fn user_agent(&self) -> &'static str {
        match self {
            Self::Chrome131 | Self::Ja3(_) => CHROME_131_USER_AGENT,
            Self::None => concat!("wraith/", env!("CARGO_PKG_VERSION")),
        }
    }

    /// Get the TLS fingerprint for this profile, if any.
    pub fn tls_fingerprint(&self) -> Option<TlsFingerprint> {
        match self {
            Self::Chrome131 => Some(TlsFingerprint::chrome_131()),
            Self::Ja3(fp) => Some(fp.clone()),
            Self::None => None,
        }
    }

    /// Get the TCP fingerprint for this profile, if any.
    pub fn tcp_fingerprint(&self) -> Option<TcpFingerprint> {
        match self {
            Self::Chrome131 | Self::Ja3(_) => Some(TcpFingerprint::chrome()),
            Self::None => None,
        }
    }
}
