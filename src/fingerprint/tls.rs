//! TLS fingerprint configuration (JA3).

use crate::error::{Error, Result};

/// Chrome 131 cipher suites in exact order.
pub const CHROME_131_CIPHER_SUITES: &[&str] = &[
    "TLS_AES_128_GCM_SHA256",
    "TLS_AES_256_GCM_SHA384",
    "TLS_CHACHA20_POLY1305_SHA256",
    "TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256",
    "TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256",
    "TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384",
    "TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384",
    "TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256",
    "TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256",
    "TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA",
    "TLS_ECDHE_RSA_WITH_AES_256_CBC_SHA",
    "TLS_RSA_WITH_AES_128_GCM_SHA256",
    "TLS_RSA_WITH_AES_256_GCM_SHA384",
    "TLS_RSA_WITH_AES_128_CBC_SHA",
    "TLS_RSA_WITH_AES_256_CBC_SHA",
];

/// Chrome 131 signature algorithms.
pub const CHROME_131_SIGNATURE_ALGORITHMS: &[&str] = &[
    "ecdsa_secp256r1_sha256",
    "rsa_pss_rsae_sha256",
    "rsa_pkcs1_sha256",
    "ecdsa_secp384r1_sha384",
    "rsa_pss_rsae_sha384",
    "rsa_pkcs1_sha384",
    "rsa_pss_rsae_sha512",
    "rsa_pkcs1_sha512",
];

/// Chrome 131 supported curves.
pub const CHROME_131_CURVES: &[&str] = &["X25519", "P-256", "P-384"];

/// Chrome 131 extension IDs in exact order.
pub const CHROME_131_EXTENSION_IDS: &[u16] =
    &[0, 23, 65281, 10, 11, 35, 16, 5, 13, 18, 51, 45, 43, 27, 21];

/// JA3 version field for TLS 1.2 / 1.3.
const TLS1_2: u16 = 771;
const TLS1_3: u16 = 772;

/// compress_certificate extension.
const EXT_COMPRESS_CERTIFICATE: u16 = 27;

/// supported_versions extension.
const EXT_SUPPORTED_VERSIONS: u16 = 43;

/// Certificate compression algorithm advertised in the ClientHello.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CertCompression {
    /// Chrome.
    Brotli,
    #[default]
    None,
}

/// TLS fingerprint configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsFingerprint {
    /// Cipher suites in order (IANA names).
    pub cipher_list: Vec<&'static str>,
    /// Signature algorithms.
    pub sigalgs: Vec<&'static str>,
    /// Supported curves/groups.
    pub curves: Vec<&'static str>,
    /// Extension order (JA3 reference; BoringSSL permutes the real order).
    pub extension_order: Vec<u16>,
    /// Highest protocol version offered, as the JA3 version number.
    pub max_version: u16,
    /// Enable GREASE values.
    pub grease: bool,
    pub cert_compression: CertCompression,
}

impl Default for TlsFingerprint {
    fn default() -> Self {
        Self {
            cipher_list: vec![],
            sigalgs: vec![],
            curves: vec![],
            extension_order: vec![],
            max_version: TLS1_3,
            grease: true,
            cert_compression: CertCompression::None,
        }
    }
}

impl TlsFingerprint {
    /// Create a TLS fingerprint for Chrome 131.
    pub fn chrome_131() -> Self {
        Self {
            cipher_list: CHROME_131_CIPHER_SUITES.to_vec(),
            sigalgs: CHROME_131_SIGNATURE_ALGORITHMS.to_vec(),
            curves: CHROME_131_CURVES.to_vec(),
            extension_order: CHROME_131_EXTENSION_IDS.to_vec(),
            max_version: TLS1_3,
            grease: true,
            cert_compression: CertCompression::Brotli,
        }
    }

    /// Parse a JA3 string: `version,ciphers,extensions,curves,point_formats`.
    ///
    /// Cipher and curve ids without a BoringSSL counterpart are skipped.
    /// GREASE ids switch GREASE on and are dropped from the lists.
    /// Signature algorithms are not part of JA3, so Chrome's are used.
    pub fn from_ja3(ja3: &str) -> Result<Self> {
        let fields: Vec<&str> = ja3.trim().split(',').collect();
        if fields.len() != 5 {
            return Err(Error::client_construction(format!(
                "JA3 string must have 5 fields, got {}",
                fields.len()
            )));
        }

        let max_version: u16 = fields[0].trim().parse().map_err(|_| {
            Error::client_construction(format!("Invalid JA3 TLS version: {:?}", fields[0]))
        })?;
        if max_version != TLS1_2 && max_version != TLS1_3 {
            return Err(Error::client_construction(format!(
                "Unsupported JA3 TLS version: {}",
                max_version
            )));
        }

        let ciphers = parse_id_list(fields[1])?;
        let extensions = parse_id_list(fields[2])?;
        let curves = parse_id_list(fields[3])?;
        // Point formats are always uncompressed in BoringSSL; validate only.
        parse_id_list(fields[4])?;

        let grease = ciphers
            .iter()
            .chain(&extensions)
            .chain(&curves)
            .any(|&id| is_grease(id));

        let cipher_list: Vec<&'static str> = ciphers
            .iter()
            .filter(|&&id| !is_grease(id))
            .filter_map(|&id| {
                let name = cipher_name(id);
                if name.is_none() {
                    tracing::debug!("JA3 cipher 0x{:04x} has no BoringSSL equivalent, skipped", id);
                }
                name
            })
            .collect();
        if cipher_list.is_empty() {
            return Err(Error::client_construction(
                "JA3 string contains no supported cipher suites",
            ));
        }

        let curves = curves
            .iter()
            .filter(|&&id| !is_grease(id))
            .filter_map(|&id| curve_name(id))
            .collect();

        let extension_order: Vec<u16> = extensions.into_iter().filter(|&id| !is_grease(id)).collect();
        let cert_compression = if extension_order.contains(&EXT_COMPRESS_CERTIFICATE) {
            CertCompression::Brotli
        } else {
            CertCompression::None
        };

        Ok(Self {
            cipher_list,
            sigalgs: CHROME_131_SIGNATURE_ALGORITHMS.to_vec(),
            curves,
            extension_order,
            max_version,
            grease,
            cert_compression,
        })
    }

    /// Cipher string for BoringSSL. TLS 1.3 suites are fixed in BoringSSL and left out.
    pub fn tls12_cipher_string(&self) -> String {
        self.cipher_list
            .iter()
            .filter(|name| !is_tls13_suite(name))
            .copied()
            .collect::<Vec<_>>()
            .join(":")
    }

    /// Whether TLS 1.3 is offered.
    ///
    /// Browsers put 771 in the JA3 version field and signal TLS 1.3 through
    /// the supported_versions extension.
    pub fn offers_tls13(&self) -> bool {
        self.max_version >= TLS1_3 || self.extension_order.contains(&EXT_SUPPORTED_VERSIONS)
    }
}

fn parse_id_list(field: &str) -> Result<Vec<u16>> {
    let field = field.trim();
    if field.is_empty() {
        return Ok(Vec::new());
    }
    field
        .split('-')
        .map(|id| {
            id.trim().parse::<u16>().map_err(|_| {
                Error::client_construction(format!("Invalid JA3 id {:?}", id))
            })
        })
        .collect()
}

/// GREASE values are 0x?a?a with both bytes equal (RFC 8701).
fn is_grease(id: u16) -> bool {
    id & 0x0f0f == 0x0a0a && (id >> 8) == (id & 0xff)
}

fn is_tls13_suite(name: &str) -> bool {
    matches!(
        name,
        "TLS_AES_128_GCM_SHA256" | "TLS_AES_256_GCM_SHA384" | "TLS_CHACHA20_POLY1305_SHA256"
    )
}

fn cipher_name(id: u16) -> Option<&'static str> {
    Some(match id {
        0x1301 => "TLS_AES_128_GCM_SHA256",
        0x1302 => "TLS_AES_256_GCM_SHA384",
        0x1303 => "TLS_CHACHA20_POLY1305_SHA256",
        0xc02b => "TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256",
        0xc02f => "TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256",
        0xc02c => "TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384",
        0xc030 => "TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384",
        0xcca9 => "TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256",
        0xcca8 => "TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256",
        0xc009 => "TLS_ECDHE_ECDSA_WITH_AES_128_CBC_SHA",
        0xc00a => "TLS_ECDHE_ECDSA_WITH_AES_256_CBC_SHA",
        0xc013 => "TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA",
        0xc014 => "TLS_ECDHE_RSA_WITH_AES_256_CBC_SHA",
        0x009c => "TLS_RSA_WITH_AES_128_GCM_SHA256",
        0x009d => "TLS_RSA_WITH_AES_256_GCM_SHA384",
        0x002f => "TLS_RSA_WITH_AES_128_CBC_SHA",
        0x0035 => "TLS_RSA_WITH_AES_256_CBC_SHA",
        0x000a => "TLS_RSA_WITH_3DES_EDE_CBC_SHA",
        _ => return None,
    })
}

fn curve_name(id: u16) -> Option<&'static str> {
    Some(match id {
        29 => "X25519",
        23 => "P-256",
        24 => "P-384",
        25 => "P-521",
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHROME_JA3: &str = "771,4865-4866-4867-49195-49199-49196-49200-52393-52392-49171-49172-156-157-47-53,0-23-65281-10-11-35-16-5-13-18-51-45-43-27-17513-21,29-23-24,0";

    #[test]
    fn test_parse_chrome_ja3() {
        let fp = TlsFingerprint::from_ja3(CHROME_JA3).unwrap();
        assert_eq!(fp.cipher_list, CHROME_131_CIPHER_SUITES.to_vec());
        assert_eq!(fp.curves, vec!["X25519", "P-256", "P-384"]);
        assert_eq!(fp.max_version, TLS1_2);
        assert!(!fp.grease);
        assert_eq!(fp.cert_compression, CertCompression::Brotli);
        assert!(fp.extension_order.contains(&17513));
        assert!(fp.offers_tls13());

        let tls12_only = TlsFingerprint::from_ja3("771,49195-49199,0-10-11-13,29-23,0").unwrap();
        assert!(!tls12_only.offers_tls13());
    }

    #[test]
    fn test_grease_detected_and_filtered() {
        let fp = TlsFingerprint::from_ja3("772,2570-4865-49195,2570-0-23,6682-29,0").unwrap();
        assert!(fp.grease);
        assert_eq!(
            fp.cipher_list,
            vec!["TLS_AES_128_GCM_SHA256", "TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256"]
        );
        assert_eq!(fp.extension_order, vec![0, 23]);
        assert_eq!(fp.curves, vec!["X25519"]);
        assert!(fp.offers_tls13());
    }

    #[test]
    fn test_malformed_ja3_rejected() {
        assert!(TlsFingerprint::from_ja3("771,4865").is_err());
        assert!(TlsFingerprint::from_ja3("abc,4865,0,29,0").is_err());
        assert!(TlsFingerprint::from_ja3("769,4865,0,29,0").is_err());
        assert!(TlsFingerprint::from_ja3("771,4865-x,0,29,0").is_err());
        // Only unknown ciphers
        assert!(TlsFingerprint::from_ja3("771,65000,0,29,0").is_err());
    }

    #[test]
    fn test_tls12_cipher_string_skips_tls13() {
        let s = TlsFingerprint::chrome_131().tls12_cipher_string();
        assert!(!s.contains("TLS_AES_128_GCM_SHA256"));
        assert!(s.starts_with("TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256:"));
    }

    #[test]
    fn test_is_grease() {
        assert!(is_grease(0x0a0a));
        assert!(is_grease(0xfafa));
        assert!(!is_grease(0x0a1a));
        assert!(!is_grease(4865));
    }
}
