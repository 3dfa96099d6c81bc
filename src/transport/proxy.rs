//! Proxy support: HTTP CONNECT tunnels and SOCKS5.

use std::net::IpAddr;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use percent_encoding::percent_decode_str;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use url::Url;

use crate::error::{Error, Result};

/// Maximum CONNECT response head we are willing to buffer.
const MAX_CONNECT_RESPONSE: usize = 8 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyScheme {
    /// HTTP proxy, tunnelled with CONNECT.
    Http,
    /// SOCKS5; `remote_dns` is true for `socks5h`.
    Socks5 { remote_dns: bool },
}

/// Parsed proxy URL.
#[derive(Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    pub scheme: ProxyScheme,
    pub host: String,
    pub port: u16,
    pub credentials: Option<(String, String)>,
}

impl std::fmt::Debug for ProxyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyConfig")
            .field("scheme", &self.scheme)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("credentials", &self.credentials.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl ProxyConfig {
    /// Parse `http://[user:pass@]host:port`, `socks5://...` or `socks5h://...`.
    pub fn parse(raw: &str) -> Result<Self> {
        let url = Url::parse(raw.trim())
            .map_err(|e| Error::client_construction(format!("Invalid proxy URL: {}", e)))?;

        let (scheme, default_port) = match url.scheme() {
            "http" => (ProxyScheme::Http, 80),
            "socks5" => (ProxyScheme::Socks5 { remote_dns: false }, 1080),
            "socks5h" => (ProxyScheme::Socks5 { remote_dns: true }, 1080),
            other => {
                return Err(Error::client_construction(format!(
                    "Unsupported proxy scheme: {}",
                    other
                )))
            }
        };

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| Error::client_construction("Proxy URL has no host"))?
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();

        let credentials = if url.username().is_empty() {
            None
        } else {
            Some((
                percent_decode(url.username()),
                percent_decode(url.password().unwrap_or("")),
            ))
        };

        Ok(Self {
            scheme,
            host,
            port: url.port().unwrap_or(default_port),
            credentials,
        })
    }

    /// `host:port` of the proxy itself.
    pub fn address(&self) -> (String, u16) {
        (self.host.clone(), self.port)
    }

    /// Establish a tunnel to `target_host:target_port` over a connected proxy stream.
    pub async fn tunnel(
        &self,
        stream: &mut TcpStream,
        target_host: &str,
        target_port: u16,
    ) -> Result<()> {
        match self.scheme {
            ProxyScheme::Http => self.http_connect(stream, target_host, target_port).await,
            ProxyScheme::Socks5 { .. } => self.socks5_connect(stream, target_host, target_port).await,
        }
    }

    async fn http_connect(
        &self,
        stream: &mut TcpStream,
        target_host: &str,
        target_port: u16,
    ) -> Result<()> {
        let authority = format_authority(target_host, target_port);
        let mut request = format!("CONNECT {authority} HTTP/1.1\r\nHost: {authority}\r\n");
        if let Some((user, pass)) = &self.credentials {
            let token = BASE64.encode(format!("{}:{}", user, pass));
            request.push_str(&format!("Proxy-Authorization: Basic {}\r\n", token));
        }
        request.push_str("\r\n");

        stream
            .write_all(request.as_bytes())
            .await
            .map_err(|e| Error::proxy(format!("Failed to send CONNECT request: {}", e)))?;

        // Read the response head byte-wise so no tunnel bytes are consumed.
        let mut head = Vec::with_capacity(256);
        let mut byte = [0u8; 1];
        while !head.ends_with(b"\r\n\r\n") {
            if head.len() >= MAX_CONNECT_RESPONSE {
                return Err(Error::proxy("CONNECT response too large"));
            }
            let n = stream
                .read(&mut byte)
                .await
                .map_err(|e| Error::proxy(format!("Failed to read CONNECT response: {}", e)))?;
            if n == 0 {
                return Err(Error::proxy("Proxy closed connection during CONNECT"));
            }
            head.push(byte[0]);
        }

        let mut headers = [httparse::EMPTY_HEADER; 32];
        let mut response = httparse::Response::new(&mut headers);
        response
            .parse(&head)
            .map_err(|e| Error::proxy(format!("Malformed CONNECT response: {}", e)))?;
        match response.code {
            Some(code) if (200..300).contains(&code) => Ok(()),
            Some(code) => Err(Error::proxy(format!(
                "CONNECT to {} rejected with status {}",
                authority, code
            ))),
            None => Err(Error::proxy("CONNECT response missing status")),
        }
    }

    async fn socks5_connect(
        &self,
        stream: &mut TcpStream,
        target_host: &str,
        target_port: u16,
    ) -> Result<()> {
        // Greeting: offer no-auth, plus username/password when we have credentials.
        let greeting: &[u8] = if self.credentials.is_some() {
            &[0x05, 0x02, 0x00, 0x02]
        } else {
            &[0x05, 0x01, 0x00]
        };
        write(stream, greeting, "greeting").await?;

        let mut choice = [0u8; 2];
        read_exact(stream, &mut choice, "method selection").await?;
        if choice[0] != 0x05 {
            return Err(Error::proxy(format!("Not a SOCKS5 proxy (version {})", choice[0])));
        }
        match (choice[1], &self.credentials) {
            (0x00, _) => {}
            (0x02, Some((user, pass))) => self.socks5_authenticate(stream, user, pass).await?,
            (method, _) => {
                return Err(Error::proxy(format!(
                    "SOCKS5 proxy selected unsupported auth method 0x{:02x}",
                    method
                )))
            }
        }

        let mut request = vec![0x05, 0x01, 0x00];
        match target_host.parse::<IpAddr>() {
            Ok(IpAddr::V4(ip)) => {
                request.push(0x01);
                request.extend_from_slice(&ip.octets());
            }
            Ok(IpAddr::V6(ip)) => {
                request.push(0x04);
                request.extend_from_slice(&ip.octets());
            }
            Err(_) => {
                let len = u8::try_from(target_host.len())
                    .map_err(|_| Error::proxy("Target host name too long for SOCKS5"))?;
                request.push(0x03);
                request.push(len);
                request.extend_from_slice(target_host.as_bytes());
            }
        }
        request.extend_from_slice(&target_port.to_be_bytes());
        write(stream, &request, "connect request").await?;

        let mut reply = [0u8; 4];
        read_exact(stream, &mut reply, "connect reply").await?;
        if reply[1] != 0x00 {
            return Err(Error::proxy(format!(
                "SOCKS5 connect rejected: {}",
                socks5_reply_text(reply[1])
            )));
        }

        // Skip the bound address.
        let skip = match reply[3] {
            0x01 => 4 + 2,
            0x04 => 16 + 2,
            0x03 => {
                let mut len = [0u8; 1];
                read_exact(stream, &mut len, "bound address").await?;
                len[0] as usize + 2
            }
            other => {
                return Err(Error::proxy(format!(
                    "Invalid SOCKS5 address type 0x{:02x}",
                    other
                )))
            }
        };
        let mut bound = vec![0u8; skip];
        read_exact(stream, &mut bound, "bound address").await
    }

    async fn socks5_authenticate(&self, stream: &mut TcpStream, user: &str, pass: &str) -> Result<()> {
        let user_len = u8::try_from(user.len()).map_err(|_| Error::proxy("SOCKS5 username too long"))?;
        let pass_len = u8::try_from(pass.len()).map_err(|_| Error::proxy("SOCKS5 password too long"))?;

        let mut auth = vec![0x01, user_len];
        auth.extend_from_slice(user.as_bytes());
        auth.push(pass_len);
        auth.extend_from_slice(pass.as_bytes());
        write(stream, &auth, "authentication").await?;

        let mut status = [0u8; 2];
        read_exact(stream, &mut status, "authentication reply").await?;
        if status[1] != 0x00 {
            return Err(Error::proxy("SOCKS5 authentication failed"));
        }
        Ok(())
    }
}

async fn write(stream: &mut TcpStream, bytes: &[u8], what: &str) -> Result<()> {
    stream
        .write_all(bytes)
        .await
        .map_err(|e| Error::proxy(format!("Failed to send SOCKS5 {}: {}", what, e)))
}

async fn read_exact(stream: &mut TcpStream, buf: &mut [u8], what: &str) -> Result<()> {
    stream
        .read_exact(buf)
        .await
        .map(|_| ())
        .map_err(|e| Error::proxy(format!("Failed to read SOCKS5 {}: {}", what, e)))
}

fn socks5_reply_text(code: u8) -> &'static str {
    match code {
        0x01 => "general failure",
        0x02 => "connection not allowed by ruleset",
        0x03 => "network unreachable",
        0x04 => "host unreachable",
        0x05 => "connection refused",
        0x06 => "TTL expired",
        0x07 => "command not supported",
        0x08 => "address type not supported",
        _ => "unknown error",
    }
}

fn format_authority(host: &str, port: u16) -> String {
    if host.contains(':') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

fn percent_decode(s: &str) -> String {
    percent_decode_str(s).decode_utf8_lossy().into_owned()
}
