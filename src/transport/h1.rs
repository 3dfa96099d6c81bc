//! RFC 9110/9112 compliant HTTP/1.1 client implementation.
//!
//! Uses httparse for response parsing and raw I/O for full control over
//! request formatting and header order. Headers go on the wire exactly in
//! the order they are given; nothing is injected between them.
//!
//! Reading is split in two so callers can hand back the head before the
//! body arrives: [`H1Connection::read_head`] then [`H1Connection::read_body`].

use std::time::Duration;

use bytes::Bytes;
use http::Method;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::{Error, Result};
use crate::headers::find_header;
use crate::transport::connector::MaybeHttpsStream;
use crate::transport::WireRequest;

/// Maximum response header size (64KB).
const MAX_HEADERS_SIZE: usize = 64 * 1024;

/// Maximum number of headers to parse.
const MAX_HEADERS_COUNT: usize = 100;

const READ_CHUNK: usize = 8192;

/// Largest chunk accepted in a chunked body (16MB).
const MAX_CHUNK_SIZE: usize = 16 * 1024 * 1024;

/// How the response body is delimited (RFC 9112 Section 6.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyFraming {
    /// HEAD, 204, 304.
    None,
    Length(usize),
    Chunked,
    /// Delimited by connection close.
    UntilClose,
}

/// Status line and headers of a final response.
#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub status: u16,
    /// Headers in arrival order, names as sent by the server.
    pub headers: Vec<(String, String)>,
    pub framing: BodyFraming,
}

/// HTTP/1.1 connection for sending requests.
pub struct H1Connection {
    stream: MaybeHttpsStream,
    /// Bytes read past the end of the last parsed element.
    buffer: Vec<u8>,
    read_idle: Option<Duration>,
    /// Whether the connection should be closed after the current response.
    should_close: bool,
}

impl H1Connection {
    /// Create a new HTTP/1.1 connection from an existing stream.
    pub fn new(stream: MaybeHttpsStream, read_idle: Option<Duration>) -> Self {
        Self {
            stream,
            buffer: Vec::with_capacity(READ_CHUNK),
            read_idle,
            should_close: false,
        }
    }

    /// Whether another request may be sent on this connection.
    pub fn is_reusable(&self) -> bool {
        !self.should_close && self.buffer.is_empty()
    }

    /// Serialize and send a request, body included.
    pub async fn write_request(&mut self, request: &WireRequest) -> Result<()> {
        let head = encode_request(request)?;
        self.stream
            .write_all(&head)
            .await
            .map_err(|e| Error::http_protocol(format!("Failed to write request: {}", e)))?;

        if !request.body.is_empty() {
            self.stream
                .write_all(&request.body)
                .await
                .map_err(|e| Error::http_protocol(format!("Failed to write body: {}", e)))?;
        }

        self.stream
            .flush()
            .await
            .map_err(|e| Error::http_protocol(format!("Failed to flush: {}", e)))
    }

    /// Read the status line and headers of the final response.
    ///
    /// Per RFC 9112 Section 6, 1xx informational responses are consumed
    /// until a final (2xx-5xx) response is received.
    pub async fn read_head(&mut self, method: &Method) -> Result<ResponseHead> {
        loop {
            let header_end = loop {
                if let Some(end) = find_header_end(&self.buffer) {
                    break end;
                }
                if self.buffer.len() >= MAX_HEADERS_SIZE {
                    return Err(Error::http_protocol("Response headers too large"));
                }
                if self.fill("response").await? == 0 {
                    return Err(Error::http_protocol(
                        "Connection closed before response complete",
                    ));
                }
            };

            let (status, version, headers) = parse_head(&self.buffer[..header_end])?;
            self.buffer.drain(..header_end);

            if (100..200).contains(&status) {
                continue;
            }

            let connection = find_header(&headers, "connection").map(|v| v.to_ascii_lowercase());
            let keep_alive = match connection.as_deref() {
                Some(v) if v.contains("close") => false,
                Some(v) if v.contains("keep-alive") => true,
                _ => version >= 1,
            };
            if !keep_alive {
                self.should_close = true;
            }

            let framing = body_framing(status, method, &headers)?;
            if framing == BodyFraming::UntilClose {
                self.should_close = true;
            }

            return Ok(ResponseHead {
                status,
                headers,
                framing,
            });
        }
    }

    /// Read the body that follows a head returned by [`read_head`](Self::read_head).
    pub async fn read_body(&mut self, framing: BodyFraming) -> Result<Bytes> {
        match framing {
            BodyFraming::None => Ok(Bytes::new()),
            BodyFraming::Length(len) => self.read_fixed_body(len).await,
            BodyFraming::Chunked => self.read_chunked_body().await,
            BodyFraming::UntilClose => self.read_until_close().await,
        }
    }

    /// Read more bytes into the buffer, honoring the idle timeout.
    async fn fill(&mut self, what: &str) -> Result<usize> {
        let mut chunk = [0u8; READ_CHUNK];
        let idle = self.read_idle;
        let read = self.stream.read(&mut chunk);
        let result = match idle {
            Some(limit) => tokio::time::timeout(limit, read)
                .await
                .map_err(|_| Error::ReadIdleTimeout(limit))?,
            None => read.await,
        };
        let n = result.map_err(|e| Error::http_protocol(format!("Failed to read {}: {}", what, e)))?;
        self.buffer.extend_from_slice(&chunk[..n]);
        Ok(n)
    }

    /// Read body until connection close (EOF).
    async fn read_until_close(&mut self) -> Result<Bytes> {
        while self.fill("body (close-delimited)").await? > 0 {}
        self.should_close = true;
        Ok(Bytes::from(std::mem::take(&mut self.buffer)))
    }

    /// Read a fixed-length body.
    ///
    /// Per RFC 9112: If the connection closes before the indicated number
    /// of bytes is received, this is an incomplete message and an error.
    async fn read_fixed_body(&mut self, content_length: usize) -> Result<Bytes> {
        while self.buffer.len() < content_length {
            if self.fill("body").await? == 0 {
                self.should_close = true;
                return Err(Error::http_protocol(format!(
                    "Connection closed before receiving full body (got {} of {} bytes)",
                    self.buffer.len(),
                    content_length
                )));
            }
        }
        Ok(Bytes::from(self.buffer.drain(..content_length).collect::<Vec<u8>>()))
    }

    /// Read a chunked transfer-encoded body.
    ///
    /// Per RFC 9112 Section 7.1:
    /// chunked-body = *chunk last-chunk trailer-section CRLF
    async fn read_chunked_body(&mut self) -> Result<Bytes> {
        let mut body = Vec::new();

        loop {
            let (chunk_size, line_end) = loop {
                if let Some(found) = find_chunk_size(&self.buffer) {
                    break found;
                }
                if find_crlf(&self.buffer).is_some() {
                    self.should_close = true;
                    return Err(Error::http_protocol("Invalid chunk size line"));
                }
                if self.fill("chunk size").await? == 0 {
                    self.should_close = true;
                    return Err(Error::http_protocol(
                        "Connection closed while reading chunk size",
                    ));
                }
            };
            self.buffer.drain(..line_end);

            if chunk_size == 0 {
                self.consume_trailers().await?;
                break;
            }

            // data + \r\n
            let chunk_end = match chunk_size.checked_add(2) {
                Some(end) if chunk_size <= MAX_CHUNK_SIZE => end,
                _ => {
                    self.should_close = true;
                    return Err(Error::http_protocol(format!(
                        "Invalid chunk size: {:#x}",
                        chunk_size
                    )));
                }
            };
            while self.buffer.len() < chunk_end {
                if self.fill("chunk data").await? == 0 {
                    self.should_close = true;
                    return Err(Error::http_protocol(
                        "Connection closed while reading chunk data",
                    ));
                }
            }

            body.extend_from_slice(&self.buffer[..chunk_size]);
            self.buffer.drain(..chunk_end);
        }

        Ok(Bytes::from(body))
    }

    /// Consume trailer fields after the last chunk.
    ///
    /// Per RFC 9112 Section 7.1.2: trailer-section = *( field-line CRLF ),
    /// terminated by an empty line.
    async fn consume_trailers(&mut self) -> Result<()> {
        loop {
            if let Some(pos) = find_crlf(&self.buffer) {
                self.buffer.drain(..pos + 2);
                if pos == 0 {
                    return Ok(());
                }
                continue;
            }

            if self.fill("trailers").await? == 0 {
                // Trailers may be absent; the connection is done either way.
                self.should_close = true;
                return Ok(());
            }
        }
    }
}

/// Serialize the request line and headers.
///
/// Headers are written in the given order. `Host` is prepended only when
/// absent; `Content-Length` is appended when there is a body (or the method
/// expects one) and neither it nor `Transfer-Encoding` was supplied.
pub fn encode_request(request: &WireRequest) -> Result<Vec<u8>> {
    for (name, value) in &request.headers {
        validate_header_name(name)?;
        validate_header_value(value)?;
    }

    let mut out = Vec::with_capacity(1024);

    // origin-form: /path?query
    let target = &request.url[url::Position::BeforePath..url::Position::AfterQuery];
    out.extend_from_slice(request.method.as_str().as_bytes());
    out.push(b' ');
    out.extend_from_slice(if target.is_empty() { "/" } else { target }.as_bytes());
    out.extend_from_slice(b" HTTP/1.1\r\n");

    if find_header(&request.headers, "host").is_none() {
        out.extend_from_slice(b"Host: ");
        out.extend_from_slice(authority(&request.url).as_bytes());
        out.extend_from_slice(b"\r\n");
    }

    for (name, value) in &request.headers {
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(b"\r\n");
    }

    // Per RFC 9112: MUST NOT send Content-Length when Transfer-Encoding is present
    let framed = find_header(&request.headers, "content-length").is_some()
        || find_header(&request.headers, "transfer-encoding").is_some();
    let expects_body = matches!(request.method, Method::POST | Method::PUT | Method::PATCH);
    if !framed && (!request.body.is_empty() || expects_body) {
        out.extend_from_slice(b"Content-Length: ");
        out.extend_from_slice(request.body.len().to_string().as_bytes());
        out.extend_from_slice(b"\r\n");
    }

    out.extend_from_slice(b"\r\n");
    Ok(out)
}

/// `host[:port]` with the port only when it is not the scheme default.
pub fn authority(url: &url::Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    }
}

fn parse_head(buffer: &[u8]) -> Result<(u16, u8, Vec<(String, String)>)> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS_COUNT];
    let mut response = httparse::Response::new(&mut headers);

    match response
        .parse(buffer)
        .map_err(|e| Error::http_protocol(format!("Failed to parse response: {}", e)))?
    {
        httparse::Status::Complete(_) => {}
        httparse::Status::Partial => {
            return Err(Error::http_protocol("Incomplete response headers"));
        }
    }

    let status = response
        .code
        .ok_or_else(|| Error::http_protocol("Missing status code"))?;
    let version = response.version.unwrap_or(1);
    let headers = response
        .headers
        .iter()
        .filter(|h| !h.name.is_empty())
        .map(|h| {
            (
                h.name.to_string(),
                String::from_utf8_lossy(h.value).into_owned(),
            )
        })
        .collect();

    Ok((status, version, headers))
}

/// Per RFC 9112 Section 6.3. Transfer-Encoding overrides Content-Length.
fn body_framing(status: u16, method: &Method, headers: &[(String, String)]) -> Result<BodyFraming> {
    if matches!(status, 100..=199 | 204 | 304) || *method == Method::HEAD {
        return Ok(BodyFraming::None);
    }

    if let Some(te) = find_header(headers, "transfer-encoding") {
        // chunked must be the final transfer coding
        let chunked = te
            .split(',')
            .next_back()
            .map(|s| s.trim().eq_ignore_ascii_case("chunked"))
            .unwrap_or(false);
        return Ok(if chunked {
            BodyFraming::Chunked
        } else {
            BodyFraming::UntilClose
        });
    }

    match find_header(headers, "content-length") {
        Some(cl) => parse_content_length(cl).map(BodyFraming::Length),
        None => Ok(BodyFraming::UntilClose),
    }
}

/// Find the end of HTTP headers (\r\n\r\n).
fn find_header_end(buffer: &[u8]) -> Option<usize> {
    buffer
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|i| i + 4)
}

/// Parse a chunk size from the buffer, returning (size, end_of_line_position).
fn find_chunk_size(buffer: &[u8]) -> Option<(usize, usize)> {
    let i = find_crlf(buffer)?;
    // chunk extensions after ';' are ignored
    let line = String::from_utf8_lossy(&buffer[..i]);
    let size_part = line.split(';').next()?;
    let size = usize::from_str_radix(size_part.trim(), 16).ok()?;
    Some((size, i + 2))
}

/// Find the first CRLF in a buffer, returning its position.
fn find_crlf(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|w| w == b"\r\n")
}

/// Validate a header name per RFC 9110 Section 5.1.
///
/// Header names must be tokens: 1*tchar where tchar excludes
/// delimiters, control characters, and whitespace.
fn validate_header_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::http_protocol("Empty header name"));
    }
    if !name.bytes().all(is_tchar) {
        return Err(Error::http_protocol(format!(
            "Invalid character in header name: {:?}",
            name
        )));
    }
    Ok(())
}

/// Check if a byte is a valid token character per RFC 9110.
fn is_tchar(b: u8) -> bool {
    matches!(b,
        b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*' | b'+' | b'-' | b'.' |
        b'^' | b'_' | b'`' | b'|' | b'~' | b'0'..=b'9' | b'A'..=b'Z' | b'a'..=b'z'
    )
}

/// Validate a header value per RFC 9110 Section 5.5.
///
/// Header values must not contain NUL, CR, or LF (prevents header injection).
fn validate_header_value(value: &str) -> Result<()> {
    if value.bytes().any(|b| b == 0 || b == b'\r' || b == b'\n') {
        return Err(Error::http_protocol(
            "Invalid character in header value (CR/LF/NUL not allowed)",
        ));
    }
    Ok(())
}

/// Parse and validate Content-Length header value per RFC 9112 Section 6.2.
///
/// Content-Length must be a non-negative integer. If multiple values are
/// present (comma-separated), they must all be identical.
fn parse_content_length(value: &str) -> Result<usize> {
    let mut parts = value.split(',').map(|s| s.trim());
    let invalid = || Error::http_protocol(format!("Invalid Content-Length: {}", value));

    let first = parts
        .next()
        .ok_or_else(invalid)?
        .parse::<usize>()
        .map_err(|_| invalid())?;

    for part in parts {
        let val = part.parse::<usize>().map_err(|_| invalid())?;
        if val != first {
            return Err(Error::http_protocol(format!(
                "Conflicting Content-Length values: {}",
                value
            )));
        }
    }

    Ok(first)
}
