//! Request construction for connection attempts
//!
//! A `RequestSpec` is an immutable description of one outbound request:
//! method, target URL, headers, optional body, timeouts, and proxy. The base
//! spec is built once from configuration and never mutates; a fresh
//! per-attempt spec is derived from it with the current `Last-Event-ID`
//! stamped in, so building a request is repeatable and retries never exhaust
//! a body.

use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CACHE_CONTROL};
use reqwest::{Method, Url};
use tracing::warn;

use crate::error::{Error, Result};

/// Default connect timeout
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Default read timeout. Generous because a healthy SSE stream can be idle
/// between events; servers are expected to send keepalive comments.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(300_000);

/// Default write timeout
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_millis(5_000);

/// Header carrying the resumption token on reconnect
pub const LAST_EVENT_ID_HEADER: &str = "last-event-id";

/// Connect/read/write timeout triple, each independently overridable.
/// The write timeout is part of the request contract for transports that
/// can honor it; the default HTTP transport applies connect and read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub connect: Duration,
    pub read: Duration,
    pub write: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: DEFAULT_CONNECT_TIMEOUT,
            read: DEFAULT_READ_TIMEOUT,
            write: DEFAULT_WRITE_TIMEOUT,
        }
    }
}

/// Request body paired with its content type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestBody {
    pub content_type: String,
    pub content: Bytes,
}

impl RequestBody {
    pub fn new(content_type: impl Into<String>, content: impl Into<Bytes>) -> Self {
        Self {
            content_type: content_type.into(),
            content: content.into(),
        }
    }
}

/// Proxy configuration: a host/port pair or a fully custom proxy object
/// passed through to the transport unchanged
#[derive(Debug, Clone)]
pub enum ProxySpec {
    HostPort { host: String, port: u16 },
    Custom(reqwest::Proxy),
}

impl ProxySpec {
    /// The proxy address for host/port configuration
    pub fn address(&self) -> Option<String> {
        match self {
            ProxySpec::HostPort { host, port } => Some(format!("{host}:{port}")),
            ProxySpec::Custom(_) => None,
        }
    }

    /// Resolve to a transport proxy
    pub fn to_proxy(&self) -> Result<reqwest::Proxy> {
        match self {
            ProxySpec::HostPort { host, port } => reqwest::Proxy::all(format!("{host}:{port}"))
                .map_err(|e| Error::Config(format!("invalid proxy {host}:{port}: {e}"))),
            ProxySpec::Custom(proxy) => Ok(proxy.clone()),
        }
    }
}

impl fmt::Display for ProxySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxySpec::HostPort { host, port } => write!(f, "{host}:{port}"),
            ProxySpec::Custom(_) => write!(f, "custom"),
        }
    }
}

/// Immutable description of one connection attempt
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<RequestBody>,
    pub timeouts: Timeouts,
    pub proxy: Option<ProxySpec>,
}

impl RequestSpec {
    /// Create a spec with the default method (GET, no body) and the
    /// standard SSE request headers
    pub fn new(url: Url) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        Self {
            method: Method::GET,
            url,
            headers,
            body: None,
            timeouts: Timeouts::default(),
            proxy: None,
        }
    }

    /// Parse and set a custom method, uppercased per HTTP convention
    pub fn set_method(&mut self, method: &str) -> Result<()> {
        self.method = Method::from_bytes(method.to_uppercase().as_bytes())
            .map_err(|e| Error::Config(format!("invalid method {method:?}: {e}")))?;
        Ok(())
    }

    /// Add a header, validating name and value
    pub fn set_header(&mut self, name: &str, value: &str) -> Result<()> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| Error::Config(format!("invalid header name {name:?}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| Error::Config(format!("invalid header value for {name}: {e}")))?;
        self.headers.insert(name, value);
        Ok(())
    }

    /// Derive the spec for the next attempt. When a last event ID is known,
    /// the `Last-Event-ID` header is added, replacing any existing one; the
    /// base spec itself is never mutated.
    pub fn with_last_event_id(&self, id: Option<&str>) -> RequestSpec {
        let mut spec = self.clone();
        if let Some(id) = id {
            match HeaderValue::from_str(id) {
                Ok(value) => {
                    spec.headers
                        .insert(HeaderName::from_static(LAST_EVENT_ID_HEADER), value);
                }
                Err(_) => warn!(id, "last event ID is not a valid header value, omitting"),
            }
        }
        spec
    }
}
