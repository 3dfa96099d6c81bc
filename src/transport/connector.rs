//! BoringSSL TLS connector.

use boring::ssl::{SslConnector, SslMethod, SslSessionCacheMode, SslVersion};
use boring::x509::X509;
use std::io;
use std::io::Read;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{lookup_host, TcpStream};
use tokio_boring::SslStream;
use url::Url;

use crate::error::{Error, Result};
use crate::fingerprint::{CertCompression, FingerprintProfile, TlsFingerprint};
use crate::transport::proxy::{ProxyConfig, ProxyScheme};
use crate::transport::tcp::TcpFingerprint;

// FFI bindings for BoringSSL extension control
use boring_sys::{CRYPTO_BUFFER, SSL, SSL_CTX};
use std::os::raw::c_int;

extern "C" {
    /// Enable GREASE (Generate Random Extensions And Sustain Extensibility)
    pub fn SSL_CTX_set_grease_enabled(ctx: *mut SSL_CTX, enabled: c_int) -> c_int;
    /// Enable extension order permutation (Chrome 110+ behavior)
    pub fn SSL_CTX_set_permute_extensions(ctx: *mut SSL_CTX, enabled: c_int) -> c_int;
}

/// Brotli certificate decompression callback for BoringSSL.
///
/// Called when the server sends a Brotli-compressed certificate chain.
unsafe extern "C" fn decompress_brotli_cert(
    _ssl: *mut SSL,
    out: *mut *mut CRYPTO_BUFFER,
    uncompressed_len: usize,
    in_: *const u8,
    in_len: usize,
) -> c_int {
    let compressed = std::slice::from_raw_parts(in_, in_len);

    let mut decompressed = Vec::with_capacity(uncompressed_len);
    let mut decoder = brotli::Decompressor::new(compressed, uncompressed_len);
    match decoder.read_to_end(&mut decompressed) {
        Ok(_) if decompressed.len() == uncompressed_len => {
            // CRYPTO_BUFFER_new copies the data
            let buffer = boring_sys::CRYPTO_BUFFER_new(
                decompressed.as_ptr(),
                decompressed.len(),
                std::ptr::null_mut(),
            );
            if buffer.is_null() {
                return 0;
            }
            *out = buffer;
            1
        }
        _ => 0,
    }
}

/// Opens TCP (optionally through a proxy) and TLS connections with a
/// profile's fingerprint applied.
///
/// The SSL context is built once per connector, so every connection from
/// one client shares the session cache.
#[derive(Clone)]
pub struct BoringConnector {
    ssl: SslConnector,
    tcp_fingerprint: Option<TcpFingerprint>,
    proxy: Option<ProxyConfig>,
    connect_timeout: Option<Duration>,
}

impl BoringConnector {
    /// Build a connector for `profile`. TLS setup failures are construction errors.
    pub fn new(
        profile: &FingerprintProfile,
        proxy: Option<ProxyConfig>,
        root_certs: &[Vec<u8>],
        connect_timeout: Option<Duration>,
    ) -> Result<Self> {
        let ssl = configure_ssl(profile.tls_fingerprint().as_ref(), root_certs)?;
        Ok(Self {
            ssl,
            tcp_fingerprint: profile.tcp_fingerprint(),
            proxy,
            connect_timeout,
        })
    }

    /// Connect to the origin of `url`, returning either a plain TCP or TLS stream.
    ///
    /// DNS, TCP, proxy and TLS handshakes all count against the connect timeout.
    pub async fn connect(&self, url: &Url) -> Result<MaybeHttpsStream> {
        let host = url
            .host_str()
            .ok_or_else(|| Error::invalid_url(url.as_str(), "missing host"))?
            .trim_start_matches('[')
            .trim_end_matches(']');
        let port = url.port_or_known_default().unwrap_or(80);
        let https = url.scheme() == "https";

        let connect = self.establish(host, port, https);
        match self.connect_timeout {
            Some(limit) => tokio::time::timeout(limit, connect)
                .await
                .map_err(|_| Error::ConnectTimeout(limit))?,
            None => connect.await,
        }
    }

    async fn establish(&self, host: &str, port: u16, https: bool) -> Result<MaybeHttpsStream> {
        let tcp_stream = match &self.proxy {
            Some(proxy) => {
                let (proxy_host, proxy_port) = proxy.address();
                let mut stream = self.connect_tcp(&proxy_host, proxy_port).await?;

                // socks5:// resolves locally, socks5h:// and http:// let the proxy resolve
                let target = match proxy.scheme {
                    ProxyScheme::Socks5 { remote_dns: false } => {
                        resolve(host, port).await?[0].ip().to_string()
                    }
                    _ => host.to_string(),
                };
                proxy.tunnel(&mut stream, &target, port).await?;
                tracing::debug!(proxy = %proxy_host, target = %host, "Proxy tunnel established");
                stream
            }
            None => self.connect_tcp(host, port).await?,
        };

        if !https {
            return Ok(MaybeHttpsStream::Http(tcp_stream));
        }

        let ssl_config = self
            .ssl
            .configure()
            .map_err(|e| Error::tls(format!("Failed to configure SSL: {}", e)))?;

        let ssl_stream = tokio_boring::connect(ssl_config, host, tcp_stream)
            .await
            .map_err(|e| Error::tls(format!("TLS handshake with {} failed: {}", host, e)))?;

        tracing::debug!(
            host = %host,
            version = ssl_stream.ssl().version_str(),
            "TLS handshake complete"
        );
        Ok(MaybeHttpsStream::Https(ssl_stream))
    }

    /// Resolve and connect, trying each address in turn.
    async fn connect_tcp(&self, host: &str, port: u16) -> Result<TcpStream> {
        let mut last_err = Error::InvalidAddress(format!("No addresses found for {}:{}", host, port));

        for addr in resolve(host, port).await? {
            let attempt = match &self.tcp_fingerprint {
                Some(fp) => fp.connect(addr).await,
                None => TcpStream::connect(addr).await,
            };
            match attempt {
                Ok(stream) => return Ok(stream),
                Err(source) => {
                    tracing::debug!(addr = %addr, error = %source, "TCP connect attempt failed");
                    last_err = Error::Connect {
                        addr: addr.to_string(),
                        source,
                    };
                }
            }
        }
        Err(last_err)
    }
}

async fn resolve(host: &str, port: u16) -> Result<Vec<SocketAddr>> {
    let addrs: Vec<SocketAddr> = lookup_host((host, port))
        .await
        .map_err(|e| Error::Dns {
            host: host.to_string(),
            message: e.to_string(),
        })?
        .collect();
    if addrs.is_empty() {
        return Err(Error::InvalidAddress(format!(
            "No addresses found for {}:{}",
            host, port
        )));
    }
    Ok(addrs)
}

fn configure_ssl(fp: Option<&TlsFingerprint>, root_certs: &[Vec<u8>]) -> Result<SslConnector> {
    let mut builder = SslConnector::builder(SslMethod::tls_client())
        .map_err(|e| Error::client_construction(format!("Failed to create SSL connector: {}", e)))?;

    for cert_bytes in root_certs {
        let cert = X509::from_der(cert_bytes).or_else(|_| X509::from_pem(cert_bytes));
        match cert {
            Ok(cert) => {
                if let Err(e) = builder.cert_store_mut().add_cert(cert) {
                    tracing::warn!(error = %e, "Failed to add root certificate");
                }
            }
            Err(e) => tracing::warn!(error = %e, "Ignoring unparseable root certificate"),
        }
    }

    let mut max_version = SslVersion::TLS1_3;

    if let Some(fp) = fp {
        let cipher_str = fp.tls12_cipher_string();
        if !cipher_str.is_empty() {
            builder
                .set_cipher_list(&cipher_str)
                .map_err(|e| Error::client_construction(format!("Failed to set cipher list: {}", e)))?;
        }

        if !fp.curves.is_empty() {
            builder
                .set_curves_list(&fp.curves.join(":"))
                .map_err(|e| Error::client_construction(format!("Failed to set curves: {}", e)))?;
        }

        if !fp.sigalgs.is_empty() {
            builder.set_sigalgs_list(&fp.sigalgs.join(":")).map_err(|e| {
                Error::client_construction(format!("Failed to set signature algorithms: {}", e))
            })?;
        }

        if !fp.offers_tls13() {
            max_version = SslVersion::TLS1_2;
        }

        // Chrome permutes extension order since v110; GREASE follows the fingerprint.
        unsafe {
            let ctx = builder.as_ptr() as *mut SSL_CTX;
            SSL_CTX_set_grease_enabled(ctx, fp.grease as c_int);
            SSL_CTX_set_permute_extensions(ctx, 1);

            // Client only decompresses; it never sends compressed certificates.
            if fp.cert_compression == CertCompression::Brotli {
                let _ = boring_sys::SSL_CTX_add_cert_compression_alg(
                    ctx,
                    boring_sys::TLSEXT_cert_compression_brotli as u16,
                    None,
                    Some(decompress_brotli_cert),
                );
            }
        }
    }

    builder
        .set_min_proto_version(Some(SslVersion::TLS1_2))
        .map_err(|e| Error::client_construction(format!("Failed to set min TLS version: {}", e)))?;
    builder
        .set_max_proto_version(Some(max_version))
        .map_err(|e| Error::client_construction(format!("Failed to set max TLS version: {}", e)))?;

    // Session tickets and IDs are cached like a browser does
    builder.set_session_cache_mode(SslSessionCacheMode::CLIENT);

    // Only HTTP/1.1 is spoken on these connections
    builder
        .set_alpn_protos(b"\x08http/1.1")
        .map_err(|e| Error::client_construction(format!("Failed to set ALPN: {}", e)))?;

    Ok(builder.build())
}

/// Stream that can be either HTTP (plain TCP) or HTTPS (TLS).
#[derive(Debug)]
pub enum MaybeHttpsStream {
    /// Plain TCP stream for HTTP.
    Http(TcpStream),
    /// TLS-wrapped stream for HTTPS.
    Https(SslStream<TcpStream>),
}

impl MaybeHttpsStream {
    pub fn is_tls(&self) -> bool {
        matches!(self, MaybeHttpsStream::Https(_))
    }
}

impl AsyncRead for MaybeHttpsStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match &mut *self {
            MaybeHttpsStream::Http(stream) => Pin::new(stream).poll_read(cx, buf),
            MaybeHttpsStream::Https(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for MaybeHttpsStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match &mut *self {
            MaybeHttpsStream::Http(stream) => Pin::new(stream).poll_write(cx, buf),
            MaybeHttpsStream::Https(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut *self {
            MaybeHttpsStream::Http(stream) => Pin::new(stream).poll_flush(cx),
            MaybeHttpsStream::Https(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut *self {
            MaybeHttpsStream::Http(stream) => Pin::new(stream).poll_shutdown(cx),
            MaybeHttpsStream::Https(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}
