//! Synthetic responses for when neither network nor cache can answer.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::request::Response;
use crate::Result;

/// Body served when an empty-list collection is unreachable.
pub const OFFLINE_DATA_MESSAGE: &str = "Offline mode - no cached data yet";

/// Body served when any other API path is unreachable.
pub const OFFLINE_UNAVAILABLE_MESSAGE: &str = "You are offline and this data is not cached";

/// Placeholder body for scripts that could not be loaded.
const PLACEHOLDER_SCRIPT: &str = "/* offline: script unavailable */\n";

/// Offline API envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OfflinePayload {
    /// `{message, data}` served with 200.
    Data { message: String, data: Vec<Value> },
    /// `{message, offline: true}` served with 503.
    Unavailable { message: String, offline: bool },
}

impl OfflinePayload {
    /// Empty collection envelope.
    pub fn empty_collection() -> Self {
        Self::Data {
            message: OFFLINE_DATA_MESSAGE.to_string(),
            data: Vec::new(),
        }
    }

    /// Unavailable envelope.
    pub fn unavailable() -> Self {
        Self::Unavailable {
            message: OFFLINE_UNAVAILABLE_MESSAGE.to_string(),
            offline: true,
        }
    }

    /// Status code the envelope is served with.
    pub fn status(&self) -> u16 {
        match self {
            Self::Data { .. } => 200,
            Self::Unavailable { .. } => 503,
        }
    }

    /// Build the response.
    pub fn into_response(self) -> Result<Response> {
        Response::json(self.status(), &self)
    }
}

/// Inert script served instead of a broken page.
pub fn placeholder_script() -> Response {
    Response::new(200, PLACEHOLDER_SCRIPT).with_header("content-type", "application/javascript")
}
