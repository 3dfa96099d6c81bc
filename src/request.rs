//! Request options and construction of wire-ready requests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use http::Method;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::client_cache::ClientCache;
use crate::cookie::Cookie;
use crate::error::{Error, Result};
use crate::fingerprint::FingerprintProfile;
use crate::headers::{remove_header, set_header, HeaderOrder};
use crate::transport::h1::authority;
use crate::transport::{ClientConfig, TransportClient, TransportProfile, WireRequest};

/// Per-request options.
///
/// Deserializes from the JSON shape
/// `{"url", "method", "headers", "body", "ja3", "userAgent", "proxy", "cookies",
/// "timeout", "disableRedirect", "headerOrder", "orderAsProvided", "requestId"}`.
/// `timeout` is whole seconds; 0 or absent selects the session default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RequestOptions {
    pub request_id: Option<String>,
    pub url: String,
    pub method: String,
    /// Header pairs in insertion order.
    #[serde(with = "ordered_headers")]
    pub headers: Vec<(String, String)>,
    pub body: String,
    /// Fingerprint profile identifier or JA3 string.
    #[serde(rename = "ja3")]
    pub fingerprint: String,
    pub user_agent: String,
    /// Proxy URL; empty for a direct connection.
    pub proxy: String,
    pub cookies: Vec<Cookie>,
    #[serde(with = "timeout_secs")]
    pub timeout: Option<Duration>,
    pub disable_redirect: bool,
    pub header_order: Vec<String>,
    pub order_as_provided: bool,
}

impl RequestOptions {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Parse the JSON options shape.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    /// Set a header. An existing header with the same name (any case) is replaced in place.
    pub fn header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        set_header(&mut self.headers, name.as_ref(), value);
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.fingerprint = fingerprint.into();
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = proxy.into();
        self
    }

    pub fn cookie(mut self, cookie: Cookie) -> Self {
        self.cookies.push(cookie);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn disable_redirect(mut self, disable: bool) -> Self {
        self.disable_redirect = disable;
        self
    }

    pub fn header_order<S: Into<String>>(mut self, order: impl IntoIterator<Item = S>) -> Self {
        self.header_order = order.into_iter().map(Into::into).collect();
        self
    }

    pub fn order_as_provided(mut self, as_provided: bool) -> Self {
        self.order_as_provided = as_provided;
        self
    }

    pub fn request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }
}

/// A request bound to its transport client. Consumed by dispatch.
pub struct BuiltRequest {
    /// Correlation id echoed in the response.
    pub id: String,
    pub request: WireRequest,
    pub client: Arc<dyn TransportClient>,
}

impl std::fmt::Debug for BuiltRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuiltRequest")
            .field("id", &self.id)
            .field("request", &self.request)
            .finish_non_exhaustive()
    }
}

/// Turns [`RequestOptions`] into [`BuiltRequest`]s, creating clients through the cache.
#[derive(Clone)]
pub struct RequestBuilder {
    cache: Arc<ClientCache>,
    default_timeout: Duration,
}

impl RequestBuilder {
    pub fn new(cache: Arc<ClientCache>, default_timeout: Duration) -> Self {
        Self {
            cache,
            default_timeout,
        }
    }

    pub fn cache(&self) -> &Arc<ClientCache> {
        &self.cache
    }

    /// Validate options, obtain the host's client and lay out the headers.
    pub async fn build(&self, options: RequestOptions) -> Result<BuiltRequest> {
        let url = parse_target(&options.url)?;
        let method = parse_method(&options.method)?;
        let host = authority(&url);

        let config = ClientConfig {
            profile: TransportProfile {
                fingerprint: options.fingerprint.clone(),
                user_agent: options.user_agent.clone(),
                cookies: options.cookies.clone(),
            },
            timeout: options
                .timeout
                .filter(|t| !t.is_zero())
                .unwrap_or(self.default_timeout),
            follow_redirects: !options.disable_redirect,
            proxy: Some(options.proxy.trim())
                .filter(|p| !p.is_empty())
                .map(str::to_string),
        };
        let client = self.cache.get_or_create(&host, &config).await?;

        let user_agent = if options.user_agent.is_empty() {
            FingerprintProfile::from_identifier(&options.fingerprint)
                .unwrap_or_default()
                .user_agent()
                .to_string()
        } else {
            options.user_agent.clone()
        };

        let mut headers = options.headers;
        remove_header(&mut headers, "content-length");
        set_header(&mut headers, "Host", host);
        set_header(&mut headers, "User-Agent", user_agent);

        let order = HeaderOrder::new(&options.header_order);
        let headers = if options.order_as_provided {
            headers
        } else {
            order.apply(headers)
        };

        let id = options
            .request_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(new_request_id);

        Ok(BuiltRequest {
            id,
            request: WireRequest {
                method,
                url,
                headers,
                pseudo_header_order: order.pseudo_headers(),
                body: Bytes::from(options.body),
            },
            client,
        })
    }
}

fn parse_target(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim()).map_err(|e| Error::invalid_url(raw, e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(Error::invalid_url(
            raw,
            format!("unsupported scheme {:?}", url.scheme()),
        ));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(Error::invalid_url(raw, "missing host"));
    }
    Ok(url)
}

fn parse_method(raw: &str) -> Result<Method> {
    let method = raw.trim();
    if method.is_empty() {
        return Ok(Method::GET);
    }
    Method::from_bytes(method.to_ascii_uppercase().as_bytes())
        .map_err(|_| Error::InvalidMethod(raw.to_string()))
}

/// Random 128-bit id, hex encoded.
fn new_request_id() -> String {
    let mut bytes = [0u8; 16];
    match getrandom::fill(&mut bytes) {
        Ok(()) => hex::encode(bytes),
        Err(e) => {
            // No entropy source; fall back to time + counter, still unique per process.
            static COUNTER: AtomicU64 = AtomicU64::new(0);
            tracing::warn!(error = %e, "getrandom failed, using counter request id");
            let nanos = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_nanos() as u64)
                .unwrap_or_default();
            format!("{:016x}{:016x}", nanos, COUNTER.fetch_add(1, Ordering::Relaxed))
        }
    }
}

/// Headers as a JSON object whose key order is the insertion order.
mod ordered_headers {
    use std::fmt;

    use serde::de::{MapAccess, Visitor};
    use serde::ser::SerializeMap;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        headers: &[(String, String)],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(headers.len()))?;
        for (name, value) in headers {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<(String, String)>, D::Error> {
        struct OrderedVisitor;

        impl<'de> Visitor<'de> for OrderedVisitor {
            type Value = Vec<(String, String)>;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of header names to values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut headers: Vec<(String, String)> =
                    Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((name, value)) = access.next_entry::<String, String>()? {
                    super::set_header(&mut headers, &name, value);
                }
                Ok(headers)
            }
        }

        deserializer.deserialize_map(OrderedVisitor)
    }
}

/// `Option<Duration>` as whole seconds; 0 means unset.
mod timeout_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(timeout: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(timeout.map(|t| t.as_secs()).unwrap_or(0))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        let secs = Option::<u64>::deserialize(deserializer)?.unwrap_or(0);
        Ok((secs > 0).then(|| Duration::from_secs(secs)))
    }
}
