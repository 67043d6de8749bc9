//! The service worker and its event dispatcher.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, trace};
use url::Url;

use crate::cache::CacheStore;
use crate::clients::{Client, ClientMatchOptions, ClientType, Clients};
use crate::config::WorkerConfig;
use crate::lifecycle::{Lifecycle, WorkerState};
use crate::messaging::{ClientMessage, ReplyPort};
use crate::network::Network;
use crate::push::{Notification, NotificationId, Notifications, PushEvent};
use crate::request::Request;
use crate::router::{Router, Strategy};
use crate::strategy::{FetchOutcome, Fetcher};
use crate::Result;

// ==================== Events ====================

/// Events the host delivers to the worker.
#[derive(Debug)]
pub enum HostEvent {
    /// Install this version.
    Install,
    /// Activate this version.
    Activate,
    /// An outbound request from a controlled page.
    Fetch(Request),
    /// Connectivity restored for a registered sync.
    Sync { tag: String },
    /// Push message received.
    Push(PushEvent),
    /// User clicked a notification.
    NotificationClick(NotificationId),
    /// User dismissed a notification.
    NotificationClose(NotificationId),
    /// `postMessage` from a page, with an optional reply port.
    Message {
        data: Value,
        port: Option<ReplyPort>,
    },
}

/// What the host should do after dispatching an event.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// Handler finished; nothing to hand back.
    Completed,
    /// Not intercepted; the host performs the fetch itself.
    PassThrough,
    /// Respond to the page with this outcome.
    Respond(FetchOutcome),
    /// A notification was displayed.
    Notified(NotificationId),
}

/// Events the worker emits to the host.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    /// Lifecycle state changed.
    StateChange { version: String, state: WorkerState },
    /// The worker took control of a page.
    ControllerChange { client_id: String },
    /// Message for a page.
    PostMessage {
        client_id: String,
        message: ClientMessage,
    },
    /// Focus a window.
    Focus { client_id: String },
    /// A new window was opened.
    OpenWindow { client_id: String, url: Url },
    /// Display a notification.
    ShowNotification { notification: Notification },
    /// Remove a displayed notification.
    CloseNotification { id: NotificationId },
}

// ==================== Service Worker ====================

/// One version of the offline worker.
pub struct ServiceWorker<N> {
    /// Configuration for this version.
    pub(crate) config: Arc<WorkerConfig>,

    /// Cache storage, shared across versions.
    pub(crate) caches: CacheStore,

    /// Request classifier.
    router: Router,

    /// Strategy runner.
    pub(crate) fetcher: Fetcher<N>,

    /// Lifecycle state.
    pub(crate) lifecycle: RwLock<Lifecycle>,

    /// Held for the duration of install or activate.
    pub(crate) phase: Mutex<()>,

    /// Attached pages.
    pub(crate) clients: RwLock<Clients>,

    /// Displayed notifications.
    pub(crate) notifications: RwLock<Notifications>,

    /// Event sender to the host.
    event_tx: mpsc::UnboundedSender<WorkerEvent>,
}

impl<N: Network> ServiceWorker<N> {
    /// Create a worker with a fresh cache store.
    pub fn new(
        config: WorkerConfig,
        network: N,
    ) -> (Self, mpsc::UnboundedReceiver<WorkerEvent>) {
        Self::with_caches(config, network, CacheStore::new())
    }

    /// Create a worker on top of an existing cache store (e.g. one left by an
    /// earlier version).
    pub fn with_caches(
        config: WorkerConfig,
        network: N,
        caches: CacheStore,
    ) -> (Self, mpsc::UnboundedReceiver<WorkerEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let config = Arc::new(config);
        let network = Arc::new(network);

        let worker = Self {
            router: Router::new(Arc::clone(&config)),
            fetcher: Fetcher::new(Arc::clone(&config), caches.clone(), network),
            config,
            caches,
            lifecycle: RwLock::new(Lifecycle::new()),
            phase: Mutex::new(()),
            clients: RwLock::new(Clients::new()),
            notifications: RwLock::new(Notifications::new()),
            event_tx,
        };

        (worker, event_rx)
    }

    /// Worker configuration.
    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Cache store.
    pub fn caches(&self) -> &CacheStore {
        &self.caches
    }

    /// Version identifier: the static cache generation name.
    pub fn version(&self) -> String {
        self.config.cache_names().static_cache
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> WorkerState {
        self.lifecycle.read().await.state()
    }

    /// Attach an open page.
    pub async fn attach_client(&self, url: Url) -> String {
        let id = self.clients.write().await.attach(url, ClientType::Window);
        debug!(client_id = %id, "Client attached");
        id
    }

    /// Detach a closed page.
    pub async fn detach_client(&self, id: &str) -> Option<Client> {
        self.clients.write().await.detach(id)
    }

    /// Snapshot of the attached clients.
    pub async fn clients(&self, options: ClientMatchOptions) -> Vec<Client> {
        self.clients
            .read()
            .await
            .match_all(options)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Route and serve an intercepted request. `None` means pass-through.
    ///
    /// Only an activated worker controls pages; in any other state the host
    /// performs the fetch itself and no cache is touched.
    pub async fn handle_fetch(&self, request: &Request) -> Result<Option<FetchOutcome>> {
        let state = self.state().await;
        if state != WorkerState::Activated {
            trace!(url = %request.url, ?state, "Worker not active; passing request through");
            return Ok(None);
        }

        let strategy = self.router.route(request);
        trace!(url = %request.url, method = %request.method, ?strategy, "Routing request");

        if strategy == Strategy::PassThrough {
            return Ok(None);
        }

        self.fetcher.execute(strategy, request).await.map(Some)
    }

    /// Dispatch a host event to its handler.
    pub async fn dispatch(&self, event: HostEvent) -> Result<DispatchOutcome> {
        match event {
            HostEvent::Install => {
                self.install().await?;
                Ok(DispatchOutcome::Completed)
            }
            HostEvent::Activate => {
                self.activate().await?;
                Ok(DispatchOutcome::Completed)
            }
            HostEvent::Fetch(request) => Ok(match self.handle_fetch(&request).await? {
                Some(outcome) => DispatchOutcome::Respond(outcome),
                None => DispatchOutcome::PassThrough,
            }),
            HostEvent::Sync { tag } => {
                self.handle_sync(&tag).await;
                Ok(DispatchOutcome::Completed)
            }
            HostEvent::Push(event) => Ok(DispatchOutcome::Notified(self.handle_push(event).await)),
            HostEvent::NotificationClick(id) => {
                self.handle_notification_click(id).await?;
                Ok(DispatchOutcome::Completed)
            }
            HostEvent::NotificationClose(id) => {
                self.handle_notification_close(id).await;
                Ok(DispatchOutcome::Completed)
            }
            HostEvent::Message { data, port } => {
                self.handle_message(data, port).await?;
                Ok(DispatchOutcome::Completed)
            }
        }
    }

    /// Post a message to every open client. Returns how many were reached.
    pub async fn broadcast(&self, message: ClientMessage) -> usize {
        let targets: Vec<String> = {
            let clients = self.clients.read().await;
            clients
                .match_all(ClientMatchOptions::everyone())
                .into_iter()
                .map(|c| c.id.clone())
                .collect()
        };

        for client_id in &targets {
            self.post_to(client_id, message.clone());
        }
        targets.len()
    }

    pub(crate) fn post_to(&self, client_id: &str, message: ClientMessage) {
        self.emit(WorkerEvent::PostMessage {
            client_id: client_id.to_string(),
            message,
        });
    }

    pub(crate) fn emit(&self, event: WorkerEvent) {
        let _ = self.event_tx.send(event);
    }

    pub(crate) fn emit_state(&self, state: WorkerState) {
        self.emit(WorkerEvent::StateChange {
            version: self.version(),
            state,
        });
    }
}
