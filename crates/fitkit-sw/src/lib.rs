//! # FitKit Service Worker
//!
//! Offline layer for the FitKit training companion: named cache generations,
//! request routing, fetch strategies, lifecycle management, background sync,
//! push notifications, and the page/worker message channel.
//!
//! ## Features
//!
//! - **Cache store**: static + dynamic generations, byte-exact snapshots
//! - **Routing**: method / API prefix / destination / navigation precedence
//! - **Strategies**: cache-first, network-first API, navigation, default
//! - **Lifecycle**: all-or-nothing precache, stale generation cleanup, claim
//! - **Sync, push, messaging**: fan-out to client contexts
//!
//! ## Architecture
//!
//! ```text
//! Host (browser runtime)
//!     │  HostEvent                         WorkerEvent
//!     ▼                                        ▲
//! ServiceWorker::dispatch ─────────────────────┘
//!     ├── Router ──► Fetcher (strategies) ──► Network
//!     │                  │
//!     │                  └──► CacheStore
//!     │                          ├── {prefix}-static-{version}
//!     │                          └── {prefix}-dynamic-{version}
//!     ├── Lifecycle (install / activate)
//!     ├── Clients (registration set)
//!     └── Notifications
//! ```

use thiserror::Error;

pub mod cache;
pub mod clients;
pub mod config;
pub mod lifecycle;
pub mod messaging;
pub mod network;
pub mod offline;
pub mod push;
pub mod request;
pub mod router;
pub mod strategy;
pub mod sync;
pub mod worker;

#[cfg(test)]
mod testing;

pub use cache::{Cache, CacheEntry, CacheHandle, CacheStorage, CacheStore};
pub use clients::{Client, ClientMatchOptions, ClientType, Clients};
pub use config::{CacheNames, DataPaths, NotificationTemplate, WorkerConfig};
pub use lifecycle::{Lifecycle, WorkerState};
pub use messaging::{CacheDataBundle, ClientMessage, InboundMessage, ReplyPort, VersionReply};
pub use network::Network;
pub use offline::OfflinePayload;
pub use push::{Notification, NotificationId, Notifications, PushEvent};
pub use request::{Destination, Request, RequestMode, Response};
pub use router::{Router, Strategy};
pub use strategy::{FetchOutcome, Fetcher, ResponseSource, WaitUntil};
pub use worker::{DispatchOutcome, HostEvent, ServiceWorker, WorkerEvent};

// ==================== Errors ====================

/// Errors that can occur in service worker operations.
#[derive(Error, Debug, Clone)]
pub enum ServiceWorkerError {
    #[error("Install failed: {0}")]
    InstallFailed(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Network attempt timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Cache error: {0}")]
    CacheError(String),

    #[error("Cache {cache} is full ({limit} entries)")]
    QuotaExceeded { cache: String, limit: usize },

    #[error("State error: {0}")]
    StateError(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl ServiceWorkerError {
    /// Whether this error means the network could not produce a response.
    pub fn is_network_failure(&self) -> bool {
        matches!(
            self,
            ServiceWorkerError::NetworkError(_) | ServiceWorkerError::Timeout(_)
        )
    }
}

impl From<serde_json::Error> for ServiceWorkerError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<url::ParseError> for ServiceWorkerError {
    fn from(e: url::ParseError) -> Self {
        Self::InvalidUrl(e.to_string())
    }
}

/// Result type alias for service worker operations.
pub type Result<T> = std::result::Result<T, ServiceWorkerError>;
