//! Normalized responses with explicit decompression.
//!
//! A [`Response`] is what callers see for every dispatched request, including
//! transport failures, which arrive as synthesized responses carrying a
//! classification status. Headers are flattened to one value per name.

use std::collections::HashMap;
use std::io::Read;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::cookie::Cookie;
use crate::error::{Error, ErrorClass, Result};
use crate::headers::canonical_header_name;

/// Separator used when several `Set-Cookie` headers are flattened into one value.
pub const SET_COOKIE_SEPARATOR: &str = "/,/";

/// Normalized response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub request_id: String,
    pub status: u16,
    /// Decoded body, or the raw body when decoding failed.
    pub body: String,
    /// Canonical header name to value.
    pub headers: HashMap<String, String>,
    /// Set when `Content-Encoding` was unknown or the body was corrupt.
    #[serde(default)]
    pub decode_failed: bool,
}

impl Response {
    /// Build a response from the raw status, headers in arrival order and body bytes.
    pub fn normalize(
        request_id: impl Into<String>,
        status: u16,
        raw_headers: &[(String, String)],
        body: &[u8],
    ) -> Self {
        let headers = flatten_headers(raw_headers);
        let encoding = headers
            .get("Content-Encoding")
            .map(String::as_str)
            .unwrap_or("");

        let (body, decode_failed) = match decode_body(encoding, body) {
            Ok(decoded) => (String::from_utf8_lossy(&decoded).into_owned(), false),
            Err(e) => {
                tracing::warn!(encoding = %encoding, error = %e, "Returning raw body after decode failure");
                (String::from_utf8_lossy(body).into_owned(), true)
            }
        };

        Self {
            request_id: request_id.into(),
            status,
            body,
            headers,
            decode_failed,
        }
    }

    /// Synthesized response for a request that never produced one.
    pub fn failure(request_id: impl Into<String>, class: ErrorClass, err: &Error) -> Self {
        Self {
            request_id: request_id.into(),
            status: class.status,
            body: class.describe(err),
            headers: HashMap::new(),
            decode_failed: false,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Header value by name, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&canonical_header_name(name))
            .or_else(|| {
                self.headers
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(name))
                    .map(|(_, v)| v)
            })
            .map(String::as_str)
    }

    /// Cookies set by this response.
    pub fn cookies(&self) -> Vec<Cookie> {
        self.header("Set-Cookie")
            .map(|joined| {
                joined
                    .split(SET_COOKIE_SEPARATOR)
                    .filter_map(Cookie::parse_set_cookie)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Deserialize the body as JSON.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.body).map_err(Error::from)
    }
}

/// Flatten headers: `Set-Cookie` values are joined, any other repeated name keeps its last value.
fn flatten_headers(raw: &[(String, String)]) -> HashMap<String, String> {
    let mut headers: HashMap<String, String> = HashMap::with_capacity(raw.len());
    for (name, value) in raw {
        let name = canonical_header_name(name);
        if name == "Set-Cookie" {
            if let Some(existing) = headers.get_mut(&name) {
                existing.push_str(SET_COOKIE_SEPARATOR);
                existing.push_str(value);
                continue;
            }
        }
        headers.insert(name, value.clone());
    }
    headers
}

/// Undo a `Content-Encoding` (possibly a comma-separated chain, applied left to right).
///
/// An empty value or `identity` returns the input unchanged. No sniffing of
/// magic bytes is done: an undeclared encoding is passed through.
pub fn decode_body(content_encoding: &str, data: &[u8]) -> Result<Bytes> {
    let codings: Vec<String> = content_encoding
        .split(',')
        .map(|c| c.trim().to_ascii_lowercase())
        .filter(|c| !c.is_empty())
        .collect();

    let mut body = Bytes::copy_from_slice(data);
    for coding in codings.iter().rev() {
        body = match coding.as_str() {
            "identity" => body,
            "gzip" | "x-gzip" => decode_gzip(&body)?,
            "deflate" => decode_deflate(&body)?,
            "br" => decode_brotli(&body)?,
            "zstd" => decode_zstd(&body)?,
            other => return Err(Error::Decode(format!("unsupported encoding {:?}", other))),
        };
    }
    Ok(body)
}

fn decode_gzip(data: &[u8]) -> Result<Bytes> {
    let mut decoder = flate2::read::GzDecoder::new(data);
    let mut decoded = Vec::new();
    decoder
        .read_to_end(&mut decoded)
        .map_err(|e| Error::Decode(format!("gzip: {}", e)))?;
    Ok(Bytes::from(decoded))
}

/// zlib-wrapped per RFC 9110, but raw deflate is common enough to accept.
fn decode_deflate(data: &[u8]) -> Result<Bytes> {
    let mut decoded = Vec::new();
    if flate2::read::ZlibDecoder::new(data)
        .read_to_end(&mut decoded)
        .is_ok()
    {
        return Ok(Bytes::from(decoded));
    }
    decoded.clear();
    flate2::read::DeflateDecoder::new(data)
        .read_to_end(&mut decoded)
        .map_err(|e| Error::Decode(format!("deflate: {}", e)))?;
    Ok(Bytes::from(decoded))
}

fn decode_brotli(data: &[u8]) -> Result<Bytes> {
    let mut decoder = brotli::Decompressor::new(data, 4096);
    let mut decoded = Vec::new();
    decoder
        .read_to_end(&mut decoded)
        .map_err(|e| Error::Decode(format!("brotli: {}", e)))?;
    Ok(Bytes::from(decoded))
}

fn decode_zstd(data: &[u8]) -> Result<Bytes> {
    zstd::stream::decode_all(data)
        .map(Bytes::from)
        .map_err(|e| Error::Decode(format!("zstd: {}", e)))
}
