//! # FitKit Net
//!
//! HTTP implementation of the service worker's network seam.
//!
//! ## Design Goals
//!
//! 1. **Async HTTP**: non-blocking fetches through `reqwest`
//! 2. **Connectivity switch**: simulate going offline without tearing down the client
//! 3. **Seam fidelity**: any HTTP status is a resolved fetch; only transport
//!    failures reject

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use fitkit_sw::{Network, Request, Response, ServiceWorkerError};
use mime::Mime;
use reqwest::Client;
use thiserror::Error;
use tracing::{debug, info, trace};

/// Errors that can occur in networking.
#[derive(Error, Debug)]
pub enum NetError {
    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Offline")]
    Offline,

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
}

impl From<NetError> for ServiceWorkerError {
    fn from(e: NetError) -> Self {
        match e {
            NetError::Timeout(after) => ServiceWorkerError::Timeout(after),
            NetError::InvalidUrl(url) => ServiceWorkerError::InvalidUrl(url),
            other => ServiceWorkerError::NetworkError(other.to_string()),
        }
    }
}

/// HTTP client configuration.
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// User agent string.
    pub user_agent: String,
    /// Accept-Language header.
    pub accept_language: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Maximum redirects.
    pub max_redirects: usize,
    /// Enable cookies.
    pub cookies_enabled: bool,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            user_agent: concat!("FitKit-SW/", env!("CARGO_PKG_VERSION")).to_string(),
            accept_language: "en-US,en;q=0.9".to_string(),
            timeout: Duration::from_secs(30),
            max_redirects: 10,
            cookies_enabled: true,
        }
    }
}

/// Shared online/offline flag. Cloning shares the flag.
#[derive(Debug, Clone)]
pub struct Connectivity(Arc<AtomicBool>);

impl Connectivity {
    pub fn online() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_online(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn set_online(&self, online: bool) {
        let was = self.0.swap(online, Ordering::SeqCst);
        if was != online {
            info!(online, "Connectivity changed");
        }
    }
}

impl Default for Connectivity {
    fn default() -> Self {
        Self::online()
    }
}

/// `reqwest`-backed network for the service worker.
pub struct HttpFetcher {
    client: Client,
    config: FetcherConfig,
    connectivity: Connectivity,
    requests: AtomicU64,
}

impl HttpFetcher {
    /// Create a new fetcher.
    pub fn new(config: FetcherConfig) -> Result<Self, NetError> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .cookie_store(config.cookies_enabled)
            .build()
            .map_err(|e| NetError::RequestFailed(e.to_string()))?;

        info!(user_agent = %config.user_agent, "HttpFetcher initialized");

        Ok(Self {
            client,
            config,
            connectivity: Connectivity::online(),
            requests: AtomicU64::new(0),
        })
    }

    /// Handle to the online/offline flag.
    pub fn connectivity(&self) -> Connectivity {
        self.connectivity.clone()
    }

    /// Configuration in use.
    pub fn config(&self) -> &FetcherConfig {
        &self.config
    }

    /// Requests that reached the wire.
    pub fn request_count(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    /// Send a request.
    pub async fn send(&self, request: &Request) -> Result<Response, NetError> {
        if !self.connectivity.is_online() {
            debug!(url = %request.url, "Offline, not sending");
            return Err(NetError::Offline);
        }
        if !matches!(request.url.scheme(), "http" | "https") {
            return Err(NetError::InvalidUrl(request.url.to_string()));
        }

        debug!(url = %request.url, method = %request.method, "Fetching resource");
        self.requests.fetch_add(1, Ordering::Relaxed);

        let response = self
            .client
            .request(request.method.clone(), request.url.clone())
            .header("Accept-Language", &self.config.accept_language)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        let headers = response.headers().clone();
        let content_type = headers
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<Mime>().ok());

        let body = response.bytes().await.map_err(|e| self.classify(e))?;

        trace!(
            url = %request.url,
            status = %status,
            content_type = ?content_type,
            body_len = body.len(),
            "Response received"
        );

        let mut converted = Response::new(status.as_u16(), body);
        if let Some(reason) = status.canonical_reason() {
            converted.status_text = reason.to_string();
        }
        for (name, value) in headers.iter() {
            if let Ok(value) = value.to_str() {
                converted = converted.with_header(name.as_str(), value);
            }
        }
        Ok(converted)
    }

    fn classify(&self, e: reqwest::Error) -> NetError {
        if e.is_timeout() {
            NetError::Timeout(self.config.timeout)
        } else {
            NetError::HttpError(e)
        }
    }
}

impl Network for HttpFetcher {
    async fn fetch(&self, request: &Request) -> fitkit_sw::Result<Response> {
        self.send(request).await.map_err(ServiceWorkerError::from)
    }
}
