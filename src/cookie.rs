//! Cookies passed through to the transport.
//!
//! No cookie engine: request cookies are sent as given, response cookies are
//! reported as given. Domain/path matching is the caller's business.

use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Cookie with the standard RFC 6265 attributes.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    pub expires: Option<DateTime<Utc>>,
    pub max_age: Option<i64>,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: Option<String>,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            path: "/".to_string(),
            ..Self::default()
        }
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = normalize_domain(&domain.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Parse a `Set-Cookie` header value. Returns `None` when there is no `name=value` pair.
    pub fn parse_set_cookie(header: &str) -> Option<Self> {
        let mut parts = header.split(';').map(str::trim);
        let (name, value) = parts.next()?.split_once('=')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }

        let mut cookie = Cookie::new(name, value.trim());
        for attr in parts {
            if attr.eq_ignore_ascii_case("secure") {
                cookie.secure = true;
            } else if attr.eq_ignore_ascii_case("httponly") {
                cookie.http_only = true;
            } else if let Some((key, val)) = attr.split_once('=') {
                let val = val.trim();
                match key.trim().to_ascii_lowercase().as_str() {
                    "domain" => cookie.domain = normalize_domain(val),
                    "path" => cookie.path = val.to_string(),
                    "expires" => cookie.expires = parse_cookie_date(val),
                    "max-age" => cookie.max_age = val.parse().ok(),
                    "samesite" => cookie.same_site = Some(val.to_string()),
                    _ => {}
                }
            }
        }
        Some(cookie)
    }
}

impl fmt::Display for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)
    }
}

/// `Cookie` header value for a cookie list, or `None` when the list is empty.
pub fn cookie_header(cookies: &[Cookie]) -> Option<String> {
    if cookies.is_empty() {
        return None;
    }
    Some(
        cookies
            .iter()
            .map(Cookie::to_string)
            .collect::<Vec<_>>()
            .join("; "),
    )
}

/// Fold cookies into the request's `Cookie` header, appending to an existing one.
pub fn merge_cookie_header(headers: &mut Vec<(String, String)>, cookies: &[Cookie]) {
    let Some(extra) = cookie_header(cookies) else {
        return;
    };
    match headers
        .iter_mut()
        .find(|(k, _)| k.eq_ignore_ascii_case("cookie"))
    {
        Some((_, existing)) if !existing.is_empty() => {
            existing.push_str("; ");
            existing.push_str(&extra);
        }
        Some((_, existing)) => *existing = extra,
        None => headers.push(("Cookie".to_string(), extra)),
    }
}

fn normalize_domain(domain: &str) -> String {
    domain.strip_prefix('.').unwrap_or(domain).to_lowercase()
}

fn parse_cookie_date(date_str: &str) -> Option<DateTime<Utc>> {
    for fmt in ["%a, %d %b %Y %H:%M:%S GMT", "%a, %d-%b-%y %H:%M:%S GMT"] {
        if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(date_str, fmt) {
            return Some(Utc.from_utc_datetime(&dt));
        }
    }
    DateTime::parse_from_rfc3339(date_str)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cookie_header_joins_pairs() {
        let cookies = vec![Cookie::new("a", "1"), Cookie::new("b", "2")];
        assert_eq!(cookie_header(&cookies).as_deref(), Some("a=1; b=2"));
        assert_eq!(cookie_header(&[]), None);
    }

    #[test]
    fn test_builder_attributes_stay_off_the_wire() {
        let cookie = Cookie::new("sid", "abc")
            .with_domain(".Shop.Example.com")
            .with_path("/cart")
            .with_secure(true);
        assert_eq!(cookie.domain, "shop.example.com");
        assert_eq!(cookie.path, "/cart");
        assert!(cookie.secure);
        assert_eq!(cookie_header(&[cookie]).as_deref(), Some("sid=abc"));
    }

    #[test]
    fn test_merge_appends_to_existing_header() {
        let mut headers = vec![("cookie".to_string(), "session=x".to_string())];
        merge_cookie_header(&mut headers, &[Cookie::new("a", "1")]);
        assert_eq!(headers, vec![("cookie".to_string(), "session=x; a=1".to_string())]);

        let mut headers = vec![("Accept".to_string(), "*/*".to_string())];
        merge_cookie_header(&mut headers, &[Cookie::new("a", "1")]);
        assert_eq!(headers[1], ("Cookie".to_string(), "a=1".to_string()));
    }

    #[test]
    fn test_parse_set_cookie_attributes() {
        let cookie = Cookie::parse_set_cookie(
            "sid=abc123; Domain=.Example.com; Path=/app; Secure; HttpOnly; SameSite=Lax; Max-Age=60; Expires=Wed, 21 Oct 2026 07:28:00 GMT",
        )
        .unwrap();
        assert_eq!(cookie.name, "sid");
        assert_eq!(cookie.value, "abc123");
        assert_eq!(cookie.domain, "example.com");
        assert_eq!(cookie.path, "/app");
        assert!(cookie.secure);
        assert!(cookie.http_only);
        assert_eq!(cookie.same_site.as_deref(), Some("Lax"));
        assert_eq!(cookie.max_age, Some(60));
        assert_eq!(
            cookie.expires,
            Some(Utc.with_ymd_and_hms(2026, 10, 21, 7, 28, 0).unwrap())
        );
    }

    #[test]
    fn test_parse_set_cookie_rejects_garbage() {
        assert!(Cookie::parse_set_cookie("no-equals-sign").is_none());
        assert!(Cookie::parse_set_cookie("=value").is_none());
    }

    #[test]
    fn test_deserialize_from_options_json() {
        let cookie: Cookie = serde_json::from_str(
            r#"{"name":"a","value":"b","httpOnly":true,"expires":"2030-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(cookie.name, "a");
        assert!(cookie.http_only);
        assert!(cookie.expires.is_some());
        assert_eq!(cookie.path, "");
    }
}
