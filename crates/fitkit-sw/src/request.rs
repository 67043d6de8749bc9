//! Request and response types seen by the worker.

use bytes::Bytes;
use hashbrown::HashMap;
use http::Method;
use serde::Serialize;
use url::Url;

use crate::Result;

// ==================== Request ====================

/// What the request is for (`Request.destination`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Destination {
    /// fetch() / XHR.
    #[default]
    Empty,
    Document,
    Script,
    Style,
    Image,
    Font,
    Manifest,
    Other,
}

impl Destination {
    /// Static subresources served cache-first.
    pub fn is_static_asset(&self) -> bool {
        matches!(
            self,
            Destination::Script | Destination::Style | Destination::Image | Destination::Font
        )
    }
}

/// Request mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestMode {
    /// Top-level document load.
    Navigate,
    #[default]
    SameOrigin,
    Cors,
    NoCors,
}

/// An intercepted outbound request.
#[derive(Debug, Clone)]
pub struct Request {
    /// Request URL.
    pub url: Url,

    /// Request method.
    pub method: Method,

    /// Declared resource type.
    pub destination: Destination,

    /// Request mode.
    pub mode: RequestMode,
}

impl Request {
    /// Create a GET request.
    pub fn get(url: Url) -> Self {
        Self {
            url,
            method: Method::GET,
            destination: Destination::Empty,
            mode: RequestMode::SameOrigin,
        }
    }

    /// Create a top-level navigation.
    pub fn navigate(url: Url) -> Self {
        Self {
            url,
            method: Method::GET,
            destination: Destination::Document,
            mode: RequestMode::Navigate,
        }
    }

    /// Set the method.
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Set the destination.
    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = destination;
        self
    }

    /// Whether this is a top-level document load.
    pub fn is_navigation(&self) -> bool {
        self.mode == RequestMode::Navigate
    }

    /// URL path.
    pub fn path(&self) -> &str {
        self.url.path()
    }

    /// Cache key: the URL without its fragment.
    pub fn cache_key(&self) -> String {
        cache_key(&self.url)
    }
}

/// Canonical cache key for a URL.
pub fn cache_key(url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);
    url.into()
}

// ==================== Response ====================

/// A response returned to the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Status code.
    pub status: u16,

    /// Status text.
    pub status_text: String,

    /// Response headers (lower-case names).
    pub headers: HashMap<String, String>,

    /// Response body.
    pub body: Bytes,
}

impl Response {
    /// Create a response.
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            status_text: status_text(status).to_string(),
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    /// Create a JSON response.
    pub fn json<T: Serialize + ?Sized>(status: u16, value: &T) -> Result<Self> {
        let body = serde_json::to_vec(value)?;
        Ok(Self::new(status, body).with_header("content-type", "application/json"))
    }

    /// Add a header.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    /// Get a header value.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(|v| v.as_str())
    }

    /// Only exactly-200 responses are cacheable.
    pub fn is_cacheable(&self) -> bool {
        self.status == 200
    }

    /// Body as text.
    pub fn text(&self) -> std::result::Result<String, std::string::FromUtf8Error> {
        String::from_utf8(self.body.to_vec())
    }

    /// Body parsed as JSON.
    pub fn json_body<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

fn status_text(status: u16) -> &'static str {
    http::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("")
}
