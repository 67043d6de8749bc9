//! Push messages and notifications.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::clients::ClientMatchOptions;
use crate::config::NotificationTemplate;
use crate::messaging::ClientMessage;
use crate::network::Network;
use crate::worker::{ServiceWorker, WorkerEvent};
use crate::{Result, ServiceWorkerError};

/// Unique identifier for a displayed notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NotificationId(u64);

impl NotificationId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        NotificationId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "notification-{}", self.0)
    }
}

/// A push message as delivered by the host.
#[derive(Debug, Clone, Default)]
pub struct PushEvent {
    pub data: Option<Bytes>,
}

impl PushEvent {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: Some(data.into()),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }
}

/// A displayed notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub id: NotificationId,
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    /// Where a click should take the user.
    pub url: String,
}

/// Fields a push payload may override.
#[derive(Debug, Default, Deserialize)]
struct PushPayload {
    title: Option<String>,
    body: Option<String>,
    icon: Option<String>,
    badge: Option<String>,
    url: Option<String>,
}

/// Merge a push payload over the template. An absent, non-JSON or non-object
/// payload leaves the template untouched.
pub fn notification_content(
    template: &NotificationTemplate,
    data: Option<&[u8]>,
) -> NotificationTemplate {
    let payload = match data {
        Some(bytes) => match serde_json::from_slice::<PushPayload>(bytes) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Push payload is not a JSON object; using defaults");
                PushPayload::default()
            }
        },
        None => PushPayload::default(),
    };

    NotificationTemplate {
        title: payload.title.unwrap_or_else(|| template.title.clone()),
        body: payload.body.unwrap_or_else(|| template.body.clone()),
        icon: payload.icon.unwrap_or_else(|| template.icon.clone()),
        badge: payload.badge.unwrap_or_else(|| template.badge.clone()),
        url: payload.url.unwrap_or_else(|| template.url.clone()),
    }
}

/// Notifications currently on screen.
#[derive(Debug, Default)]
pub struct Notifications {
    shown: Vec<Notification>,
}

impl Notifications {
    pub fn new() -> Self {
        Self::default()
    }

    /// Display a notification with the given content.
    pub fn show(&mut self, content: NotificationTemplate) -> Notification {
        let notification = Notification {
            id: NotificationId::new(),
            title: content.title,
            body: content.body,
            icon: content.icon,
            badge: content.badge,
            url: content.url,
        };
        self.shown.push(notification.clone());
        notification
    }

    pub fn get(&self, id: NotificationId) -> Option<&Notification> {
        self.shown.iter().find(|n| n.id == id)
    }

    /// Remove a notification from the screen.
    pub fn close(&mut self, id: NotificationId) -> Option<Notification> {
        let index = self.shown.iter().position(|n| n.id == id)?;
        Some(self.shown.remove(index))
    }

    pub fn len(&self) -> usize {
        self.shown.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shown.is_empty()
    }
}

impl<N: Network> ServiceWorker<N> {
    /// Show a notification for a push message.
    pub async fn handle_push(&self, event: PushEvent) -> NotificationId {
        let content = notification_content(&self.config.notification, event.data.as_deref());
        let notification = self.notifications.write().await.show(content);
        info!(id = %notification.id, title = %notification.title, "Showing notification");

        let id = notification.id;
        self.emit(WorkerEvent::ShowNotification { notification });
        id
    }

    /// The user dismissed a notification without clicking it. Unknown ids
    /// are ignored; the host may report a close for a notification it already
    /// removed.
    pub async fn handle_notification_close(&self, id: NotificationId) {
        match self.notifications.write().await.close(id) {
            Some(_) => debug!(id = %id, "Notification dismissed"),
            None => debug!(id = %id, "Dismissed notification was not registered"),
        }
    }

    /// Close the notification, then bring the app forward: focus the first
    /// open window and tell it where to go, or open a new window at the root.
    ///
    /// An id this worker never showed, or one already clicked or dismissed,
    /// is `NotFound` and nothing is focused or opened.
    pub async fn handle_notification_click(&self, id: NotificationId) -> Result<()> {
        let notification = self
            .notifications
            .write()
            .await
            .close(id)
            .ok_or_else(|| ServiceWorkerError::NotFound(id.to_string()))?;
        self.emit(WorkerEvent::CloseNotification { id });

        let mut clients = self.clients.write().await;
        let target = clients
            .match_all(ClientMatchOptions::all_windows())
            .first()
            .map(|c| c.id.clone());

        match target {
            Some(client_id) => {
                clients.focus(&client_id)?;
                drop(clients);
                debug!(client_id = %client_id, url = %notification.url, "Focusing existing window");
                self.emit(WorkerEvent::Focus {
                    client_id: client_id.clone(),
                });
                self.post_to(&client_id, ClientMessage::Navigate {
                    url: notification.url,
                });
            }
            None => {
                let root = self.config.resolve(&self.config.root_document)?;
                let client = clients.open_window(root);
                drop(clients);
                debug!(client_id = %client.id, url = %client.url, "Opening new window");
                self.emit(WorkerEvent::OpenWindow {
                    client_id: client.id,
                    url: client.url,
                });
            }
        }
        Ok(())
    }
}
