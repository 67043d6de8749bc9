//! Fetch strategies.
//!
//! Each request moves `PENDING -> {cache | network | synthetic} -> DONE`.
//! Responses headed for the dynamic cache are copied before they are handed
//! back, so the page and the cache never share a body.

use std::sync::Arc;

use fitkit_common::with_timeout;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::cache::{CacheHandle, CacheStore};
use crate::config::WorkerConfig;
use crate::network::Network;
use crate::offline::{placeholder_script, OfflinePayload};
use crate::request::{cache_key, Destination, Request, Response};
use crate::router::Strategy;
use crate::{Result, ServiceWorkerError};

/// Where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Cache,
    Network,
    Synthetic,
}

impl ResponseSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseSource::Cache => "cache",
            ResponseSource::Network => "network",
            ResponseSource::Synthetic => "synthetic",
        }
    }
}

/// Background work the host should let finish before tearing the worker down.
#[derive(Debug, Default)]
pub struct WaitUntil {
    tasks: Vec<JoinHandle<()>>,
}

impl WaitUntil {
    /// Nothing pending.
    pub fn none() -> Self {
        Self::default()
    }

    /// Track a spawned task.
    pub fn push(&mut self, task: JoinHandle<()>) {
        self.tasks.push(task);
    }

    /// Whether any work is pending.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Wait for every tracked task.
    pub async fn settle(self) {
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Background task did not finish");
            }
        }
    }
}

impl From<JoinHandle<()>> for WaitUntil {
    fn from(task: JoinHandle<()>) -> Self {
        Self { tasks: vec![task] }
    }
}

/// The result of an intercepted fetch.
#[derive(Debug)]
pub struct FetchOutcome {
    /// Response handed to the page.
    pub response: Response,

    /// Where it came from.
    pub source: ResponseSource,

    /// Strategy that produced it.
    pub strategy: Strategy,

    /// Cache writes still in flight.
    pub wait_until: WaitUntil,
}

impl FetchOutcome {
    fn new(response: Response, source: ResponseSource, strategy: Strategy) -> Self {
        Self {
            response,
            source,
            strategy,
            wait_until: WaitUntil::none(),
        }
    }
}

/// Runs strategies against the cache store and the network.
pub struct Fetcher<N> {
    config: Arc<WorkerConfig>,
    caches: CacheStore,
    network: Arc<N>,
}

impl<N: Network> Fetcher<N> {
    /// Create a fetcher.
    pub fn new(config: Arc<WorkerConfig>, caches: CacheStore, network: Arc<N>) -> Self {
        Self {
            config,
            caches,
            network,
        }
    }

    /// One network attempt, bounded by the configured timeout if any.
    pub async fn fetch_network(&self, request: &Request) -> Result<Response> {
        match self.config.network_timeout() {
            Some(timeout) => match with_timeout(timeout, || self.network.fetch(request)).await {
                Ok(result) => result,
                Err(_) => Err(ServiceWorkerError::Timeout(timeout)),
            },
            None => self.network.fetch(request).await,
        }
    }

    /// Run the given strategy.
    pub async fn execute(&self, strategy: Strategy, request: &Request) -> Result<FetchOutcome> {
        match strategy {
            Strategy::CacheFirst => self.cache_first(request).await,
            Strategy::Api => self.api(request).await,
            Strategy::Navigation => self.navigation(request).await,
            Strategy::Default => self.network_first(request).await,
            Strategy::PassThrough => Err(ServiceWorkerError::StateError(format!(
                "{} {} is not intercepted",
                request.method, request.url
            ))),
        }
    }

    /// Cache, then network. The cache write is awaited before returning.
    pub async fn cache_first(&self, request: &Request) -> Result<FetchOutcome> {
        let key = request.cache_key();

        if let Some(cached) = self.caches.match_request(&key).await {
            debug!(url = %request.url, "Serving from cache");
            return Ok(FetchOutcome::new(cached, ResponseSource::Cache, Strategy::CacheFirst));
        }

        match self.fetch_network(request).await {
            Ok(response) => {
                if response.is_cacheable() {
                    if let Err(e) = self.dynamic().await.put(&key, &response).await {
                        warn!(url = %request.url, error = %e, "Cache write failed");
                    }
                }
                Ok(FetchOutcome::new(response, ResponseSource::Network, Strategy::CacheFirst))
            }
            Err(e) if request.destination == Destination::Script => {
                warn!(url = %request.url, error = %e, "Script unavailable, serving placeholder");
                Ok(FetchOutcome::new(
                    placeholder_script(),
                    ResponseSource::Synthetic,
                    Strategy::CacheFirst,
                ))
            }
            Err(e) => Err(e),
        }
    }

    /// Network, then cache, then a synthetic offline envelope.
    pub async fn api(&self, request: &Request) -> Result<FetchOutcome> {
        let key = request.cache_key();

        match self.fetch_network(request).await {
            Ok(response) => Ok(self.from_network(&key, response, Strategy::Api).await),
            Err(e) => {
                debug!(url = %request.url, error = %e, "API unreachable, trying cache");
                if let Some(cached) = self.caches.match_request(&key).await {
                    return Ok(FetchOutcome::new(cached, ResponseSource::Cache, Strategy::Api));
                }

                let payload = if self.config.is_offline_collection(request.path()) {
                    OfflinePayload::empty_collection()
                } else {
                    OfflinePayload::unavailable()
                };
                Ok(FetchOutcome::new(
                    payload.into_response()?,
                    ResponseSource::Synthetic,
                    Strategy::Api,
                ))
            }
        }
    }

    /// Network, then the cached index document, then the cached root.
    pub async fn navigation(&self, request: &Request) -> Result<FetchOutcome> {
        match self.fetch_network(request).await {
            Ok(response) => Ok(self
                .from_network(&request.cache_key(), response, Strategy::Navigation)
                .await),
            Err(e) => {
                for document in [&self.config.index_document, &self.config.root_document] {
                    let key = cache_key(&self.config.resolve(document)?);
                    if let Some(cached) = self.caches.match_request(&key).await {
                        debug!(url = %request.url, fallback = %document, "Offline navigation");
                        return Ok(FetchOutcome::new(
                            cached,
                            ResponseSource::Cache,
                            Strategy::Navigation,
                        ));
                    }
                }
                Err(e)
            }
        }
    }

    /// Network, then cache. A miss on both is an error for the page.
    pub async fn network_first(&self, request: &Request) -> Result<FetchOutcome> {
        let key = request.cache_key();

        match self.fetch_network(request).await {
            Ok(response) => Ok(self.from_network(&key, response, Strategy::Default).await),
            Err(e) => match self.caches.match_request(&key).await {
                Some(cached) => Ok(FetchOutcome::new(cached, ResponseSource::Cache, Strategy::Default)),
                None => Err(e),
            },
        }
    }

    /// Hand the live response back and write a copy behind it.
    async fn from_network(&self, key: &str, response: Response, strategy: Strategy) -> FetchOutcome {
        let mut outcome = FetchOutcome::new(response, ResponseSource::Network, strategy);
        if outcome.response.is_cacheable() {
            let task = self
                .dynamic()
                .await
                .spawn_put(key.to_string(), outcome.response.clone());
            outcome.wait_until.push(task);
        }
        outcome
    }

    pub(crate) async fn dynamic(&self) -> CacheHandle {
        self.caches
            .open(&self.config.cache_names().dynamic)
            .await
            .with_limit(self.config.dynamic_cache_limit)
    }
}
