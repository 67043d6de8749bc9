//! Page <-> worker messages.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::config::DataPaths;
use crate::lifecycle::WorkerState;
use crate::network::Network;
use crate::request::{cache_key, Response};
use crate::worker::ServiceWorker;
use crate::{Result, ServiceWorkerError};

/// Reply channel handed over with a message.
pub type ReplyPort = oneshot::Sender<Value>;

const INBOUND_TYPES: [&str; 3] = ["SKIP_WAITING", "GET_VERSION", "CACHE_DATA"];

/// Messages pages send to the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InboundMessage {
    SkipWaiting,
    GetVersion,
    CacheData {
        #[serde(default)]
        data: CacheDataBundle,
    },
}

/// App data pushed in for offline use.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheDataBundle {
    pub drills: Option<Value>,
    pub exercises: Option<Value>,
    pub stretches: Option<Value>,
}

impl CacheDataBundle {
    /// Collections present as JSON arrays, paired with the API path they
    /// are stored under. Anything else is skipped.
    pub fn entries<'a>(&'a self, paths: &'a DataPaths) -> Vec<(&'a str, &'a Value)> {
        [
            (paths.drills.as_str(), &self.drills),
            (paths.exercises.as_str(), &self.exercises),
            (paths.stretches.as_str(), &self.stretches),
        ]
        .into_iter()
        .filter_map(|(path, value)| match value {
            Some(value) if value.is_array() => Some((path, value)),
            _ => None,
        })
        .collect()
    }
}

/// Messages the worker sends to pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    SyncStarted { message: String },
    SyncComplete { message: String },
    Navigate { url: String },
}

/// Reply to `GET_VERSION`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionReply {
    pub version: String,
}

impl<N: Network> ServiceWorker<N> {
    /// Handle a `postMessage` from a page.
    ///
    /// Unknown message types are ignored. A known type with a malformed body
    /// is an `InvalidMessage` error.
    pub async fn handle_message(&self, data: Value, port: Option<ReplyPort>) -> Result<()> {
        let kind = data
            .get("type")
            .and_then(Value::as_str)
            .map(str::to_string);

        let message = match serde_json::from_value::<InboundMessage>(data) {
            Ok(message) => message,
            Err(e) => {
                return match kind.as_deref() {
                    Some(kind) if INBOUND_TYPES.contains(&kind) => {
                        Err(ServiceWorkerError::InvalidMessage(format!("{}: {}", kind, e)))
                    }
                    _ => {
                        debug!(kind = ?kind, "Ignoring unrecognized message");
                        Ok(())
                    }
                };
            }
        };

        match message {
            InboundMessage::SkipWaiting => self.skip_waiting().await,
            InboundMessage::GetVersion => {
                let reply = serde_json::to_value(VersionReply {
                    version: self.version(),
                })?;
                match port {
                    Some(port) => {
                        if port.send(reply).is_err() {
                            debug!("Version requester went away before the reply");
                        }
                    }
                    None => warn!("GET_VERSION without a reply port"),
                }
                Ok(())
            }
            InboundMessage::CacheData { data } => self.cache_data(&data).await,
        }
    }

    /// Store pushed collections as synthetic 200 responses in the dynamic
    /// generation, so later offline API requests find them.
    ///
    /// A redundant worker owns no generation and rejects the bundle.
    async fn cache_data(&self, bundle: &CacheDataBundle) -> Result<()> {
        if self.state().await == WorkerState::Redundant {
            return Err(ServiceWorkerError::StateError(
                "Redundant worker cannot cache app data".to_string(),
            ));
        }

        let dynamic = self.fetcher.dynamic().await;
        for (path, items) in bundle.entries(&self.config.data_paths) {
            let url = self.config.resolve(path)?;
            let response = Response::json(200, items)?;
            match dynamic.put(&cache_key(&url), &response).await {
                Ok(_) => debug!(url = %url, "Cached app data"),
                Err(e) => warn!(url = %url, error = %e, "Could not cache app data"),
            }
        }
        Ok(())
    }
}
