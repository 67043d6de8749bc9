//! Request classification.

use std::sync::Arc;

use http::Method;

use crate::config::WorkerConfig;
use crate::request::Request;

/// Fetch strategy chosen for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Not intercepted; the host performs the fetch itself.
    PassThrough,
    /// Static subresources: cache, then network.
    CacheFirst,
    /// API calls: network, then cache, then synthetic payload.
    Api,
    /// Document loads: network, then cached shell.
    Navigation,
    /// Everything else: network, then cache.
    Default,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::PassThrough => "pass-through",
            Strategy::CacheFirst => "cache-first",
            Strategy::Api => "api",
            Strategy::Navigation => "navigation",
            Strategy::Default => "network-first",
        }
    }
}

/// Assigns exactly one strategy to every request.
#[derive(Debug, Clone)]
pub struct Router {
    config: Arc<WorkerConfig>,
}

impl Router {
    /// Create a router.
    pub fn new(config: Arc<WorkerConfig>) -> Self {
        Self { config }
    }

    /// Classify a request. The first matching rule wins.
    pub fn route(&self, request: &Request) -> Strategy {
        if request.method != Method::GET {
            Strategy::PassThrough
        } else if self.config.is_api_path(request.path()) {
            Strategy::Api
        } else if request.destination.is_static_asset() {
            Strategy::CacheFirst
        } else if request.is_navigation() {
            Strategy::Navigation
        } else {
            Strategy::Default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Destination;
    use url::Url;

    fn router() -> Router {
        Router::new(Arc::new(WorkerConfig::default()))
    }

    fn url(path: &str) -> Url {
        Url::parse("http://localhost:3000/").unwrap().join(path).unwrap()
    }

    #[test]
    fn test_non_get_passes_through() {
        let request = Request::get(url("/api/drills")).with_method(Method::POST);
        assert_eq!(router().route(&request), Strategy::PassThrough);

        let request = Request::navigate(url("/")).with_method(Method::HEAD);
        assert_eq!(router().route(&request), Strategy::PassThrough);
    }

    #[test]
    fn test_api_beats_destination() {
        let request = Request::get(url("/api/drills")).with_destination(Destination::Script);
        assert_eq!(router().route(&request), Strategy::Api);
    }

    #[test]
    fn test_static_assets_are_cache_first() {
        for destination in [
            Destination::Script,
            Destination::Style,
            Destination::Image,
            Destination::Font,
        ] {
            let request = Request::get(url("/static/app.bin")).with_destination(destination);
            assert_eq!(router().route(&request), Strategy::CacheFirst);
        }
    }

    #[test]
    fn test_navigation() {
        let request = Request::navigate(url("/drills/42"));
        assert_eq!(router().route(&request), Strategy::Navigation);
    }

    #[test]
    fn test_default() {
        let request = Request::get(url("/manifest.json")).with_destination(Destination::Manifest);
        assert_eq!(router().route(&request), Strategy::Default);

        let request = Request::get(url("/apiary"));
        assert_eq!(router().route(&request), Strategy::Default);
    }
}
