//! Worker configuration.
//!
//! Everything that would otherwise be worker-global (cache names, the static
//! manifest, API routing prefixes) lives here and is handed to each component
//! at construction, so several generations can coexist in one process.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::{Result, ServiceWorkerError};

/// Default origin the worker is scoped to.
const DEFAULT_ORIGIN: &str = "http://localhost:3000/";

/// Worker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Origin (and scope) the worker controls.
    pub origin: Url,

    /// Cache name prefix shared by every generation.
    pub cache_prefix: String,

    /// Release tag appended to every cache name.
    pub version: String,

    /// App shell assets precached at install.
    pub static_assets: Vec<String>,

    /// Path prefix that marks API requests.
    pub api_prefix: String,

    /// API collections that degrade to an empty list when offline.
    pub offline_collections: Vec<String>,

    /// API paths that `CACHE_DATA` bundles are stored under.
    pub data_paths: DataPaths,

    /// Document served to offline navigations.
    pub index_document: String,

    /// Fallback when the index document is not cached.
    pub root_document: String,

    /// Background sync tag handled by the coordinator.
    pub sync_tag: String,

    /// Pause between `SYNC_STARTED` and `SYNC_COMPLETE`.
    pub sync_settle_delay_ms: u64,

    /// Optional bound on each network attempt. `None` waits indefinitely.
    pub network_timeout_ms: Option<u64>,

    /// Optional entry quota for the dynamic cache.
    pub dynamic_cache_limit: Option<usize>,

    /// Defaults for push notifications.
    pub notification: NotificationTemplate,
}

/// API paths for app data pushed in over `CACHE_DATA`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataPaths {
    pub drills: String,
    pub exercises: String,
    pub stretches: String,
}

/// Default notification content, overridden field-by-field by push payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationTemplate {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    /// Click target.
    pub url: String,
}

/// Names of the cache generations belonging to one release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheNames {
    /// Combined cache name from earlier releases. Never current.
    pub legacy: String,
    /// App shell generation.
    pub static_cache: String,
    /// Runtime generation.
    pub dynamic: String,
}

impl CacheNames {
    /// Whether `name` belongs to the current release.
    pub fn is_current(&self, name: &str) -> bool {
        name == self.static_cache || name == self.dynamic
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            origin: Url::parse(DEFAULT_ORIGIN).expect("default origin is a valid URL"),
            cache_prefix: "fitkit".to_string(),
            version: "v1".to_string(),
            static_assets: vec![
                "/".to_string(),
                "/index.html".to_string(),
                "/manifest.json".to_string(),
                "/favicon.ico".to_string(),
                "/static/js/bundle.js".to_string(),
                "/static/css/main.css".to_string(),
            ],
            api_prefix: "/api/".to_string(),
            offline_collections: vec!["drills".to_string(), "exercises".to_string()],
            data_paths: DataPaths::default(),
            index_document: "/index.html".to_string(),
            root_document: "/".to_string(),
            sync_tag: "background-sync".to_string(),
            sync_settle_delay_ms: 2000,
            network_timeout_ms: None,
            dynamic_cache_limit: None,
            notification: NotificationTemplate::default(),
        }
    }
}

impl Default for DataPaths {
    fn default() -> Self {
        Self {
            drills: "/api/drills".to_string(),
            exercises: "/api/exercises".to_string(),
            stretches: "/api/stretches".to_string(),
        }
    }
}

impl Default for NotificationTemplate {
    fn default() -> Self {
        Self {
            title: "FitKit".to_string(),
            body: "Time for your training session!".to_string(),
            icon: "/icons/icon-192.png".to_string(),
            badge: "/icons/badge-72.png".to_string(),
            url: "/".to_string(),
        }
    }
}

impl WorkerConfig {
    /// Create a config for an origin with everything else defaulted.
    pub fn new(origin: Url) -> Self {
        Self {
            origin,
            ..Default::default()
        }
    }

    /// Set the release tag.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Replace the static asset manifest.
    pub fn with_static_assets<I, S>(mut self, assets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.static_assets = assets.into_iter().map(Into::into).collect();
        self
    }

    /// Set the sync settle delay.
    pub fn with_sync_settle_delay(mut self, delay: Duration) -> Self {
        self.sync_settle_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Bound every network attempt.
    pub fn with_network_timeout(mut self, timeout: Duration) -> Self {
        self.network_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// Cap the dynamic cache.
    pub fn with_dynamic_cache_limit(mut self, limit: usize) -> Self {
        self.dynamic_cache_limit = Some(limit);
        self
    }

    /// Parse and validate a JSON config.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON config file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| ServiceWorkerError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&json)
    }

    /// Check invariants the rest of the worker relies on.
    pub fn validate(&self) -> Result<()> {
        if self.cache_prefix.trim().is_empty() {
            return Err(ServiceWorkerError::Config("cache_prefix is empty".to_string()));
        }
        if self.version.trim().is_empty() {
            return Err(ServiceWorkerError::Config("version is empty".to_string()));
        }
        if !self.api_prefix.starts_with('/') {
            return Err(ServiceWorkerError::Config(format!(
                "api_prefix must start with '/': {}",
                self.api_prefix
            )));
        }
        for asset in &self.static_assets {
            self.resolve(asset)?;
        }
        Ok(())
    }

    /// Cache generation names for this release.
    pub fn cache_names(&self) -> CacheNames {
        CacheNames {
            legacy: format!("{}-{}", self.cache_prefix, self.version),
            static_cache: format!("{}-static-{}", self.cache_prefix, self.version),
            dynamic: format!("{}-dynamic-{}", self.cache_prefix, self.version),
        }
    }

    /// Resolve a path against the origin.
    pub fn resolve(&self, path: &str) -> Result<Url> {
        self.origin
            .join(path)
            .map_err(|e| ServiceWorkerError::InvalidUrl(format!("{}: {}", path, e)))
    }

    /// Whether a path is an API call.
    pub fn is_api_path(&self, path: &str) -> bool {
        path.starts_with(&self.api_prefix)
    }

    /// Whether an API path lists a collection that degrades to an empty list.
    pub fn is_offline_collection(&self, path: &str) -> bool {
        path.split('/')
            .any(|segment| self.offline_collections.iter().any(|c| c == segment))
    }

    /// Sync settle delay.
    pub fn sync_settle_delay(&self) -> Duration {
        Duration::from_millis(self.sync_settle_delay_ms)
    }

    /// Network timeout, if bounded.
    pub fn network_timeout(&self) -> Option<Duration> {
        self.network_timeout_ms.map(Duration::from_millis)
    }
}
