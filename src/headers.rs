//! Request header ordering.
//!
//! Browsers send headers in a stable, recognizable order. `HeaderOrder`
//! reproduces that order for an arbitrary header set: names found in the
//! precedence list go first, in list order, and everything else follows in
//! the caller's insertion order.

use std::collections::HashMap;

/// Pseudo-header order. Emitted ahead of all named headers.
pub const PSEUDO_HEADER_ORDER: [&str; 4] = [":method", ":authority", ":scheme", ":path"];

/// Chrome header order for page navigation.
///
/// Sites with custom headers should extend this list with the position
/// Chrome uses for them.
pub const DEFAULT_HEADER_ORDER: &[&str] = &[
    "host",
    "connection",
    "cache-control",
    "device-memory",
    "viewport-width",
    "rtt",
    "downlink",
    "ect",
    "sec-ch-ua",
    "sec-ch-ua-mobile",
    "sec-ch-ua-full-version",
    "sec-ch-ua-arch",
    "sec-ch-ua-platform",
    "sec-ch-ua-platform-version",
    "sec-ch-ua-model",
    "upgrade-insecure-requests",
    "user-agent",
    "accept",
    "sec-fetch-site",
    "sec-fetch-mode",
    "sec-fetch-user",
    "sec-fetch-dest",
    "referer",
    "accept-encoding",
    "accept-language",
    "cookie",
];

/// Header precedence list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderOrder {
    precedence: Vec<String>,
}

impl Default for HeaderOrder {
    fn default() -> Self {
        Self {
            precedence: DEFAULT_HEADER_ORDER.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl HeaderOrder {
    /// Build from a caller-supplied list. An empty list selects the browser default.
    pub fn new<S: AsRef<str>>(order: &[S]) -> Self {
        if order.is_empty() {
            return Self::default();
        }
        Self {
            precedence: order.iter().map(|s| s.as_ref().to_ascii_lowercase()).collect(),
        }
    }

    /// Lowercased precedence list.
    pub fn precedence(&self) -> &[String] {
        &self.precedence
    }

    /// Pseudo-header order for this request.
    pub fn pseudo_headers(&self) -> [&'static str; 4] {
        PSEUDO_HEADER_ORDER
    }

    /// Lowercased names of the headers that appear in both `headers` and the
    /// precedence list, in precedence order.
    pub fn ordered_names(&self, headers: &[(String, String)]) -> Vec<String> {
        let index = name_index(headers);
        self.precedence
            .iter()
            .filter(|name| index.contains_key(name.as_str()))
            .cloned()
            .collect()
    }

    /// Full transmission order: precedence matches first, then the rest in input order.
    pub fn apply(&self, headers: Vec<(String, String)>) -> Vec<(String, String)> {
        let index = name_index(&headers);
        let mut slots: Vec<Option<(String, String)>> = headers.into_iter().map(Some).collect();
        let mut ordered = Vec::with_capacity(slots.len());

        for name in &self.precedence {
            if let Some(&pos) = index.get(name.as_str()) {
                if let Some(header) = slots[pos].take() {
                    ordered.push(header);
                }
            }
        }
        ordered.extend(slots.into_iter().flatten());
        ordered
    }
}

/// Lowercase name -> position. Later duplicates win.
fn name_index(headers: &[(String, String)]) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(i, (name, _))| (name.to_ascii_lowercase(), i))
        .collect()
}

/// Set a header, replacing any existing value with the same name (case-insensitive).
///
/// The replaced header keeps its position.
pub fn set_header(headers: &mut Vec<(String, String)>, name: &str, value: impl Into<String>) {
    let value = value.into();
    match headers.iter().position(|(k, _)| k.eq_ignore_ascii_case(name)) {
        Some(pos) => {
            headers[pos].1 = value;
            let mut seen = false;
            headers.retain(|(k, _)| {
                if !k.eq_ignore_ascii_case(name) {
                    return true;
                }
                let keep = !seen;
                seen = true;
                keep
            });
        }
        None => headers.push((name.to_string(), value)),
    }
}

/// Remove every header with the given name (case-insensitive).
pub fn remove_header(headers: &mut Vec<(String, String)>, name: &str) {
    headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
}

/// Find a header value by name (case-insensitive).
pub fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Canonical MIME header form: `content-type` -> `Content-Type`.
pub fn canonical_header_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = true;
    for c in name.chars() {
        if upper {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push(c.to_ascii_lowercase());
        }
        upper = c == '-';
    }
    out
}
