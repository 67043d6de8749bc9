//! Background sync.

use tracing::{debug, error, info, warn};
use url::Url;

use crate::messaging::ClientMessage;
use crate::network::Network;
use crate::request::Request;
use crate::worker::ServiceWorker;
use crate::Result;

pub const SYNC_STARTED_MESSAGE: &str = "Syncing your training data";
pub const SYNC_COMPLETE_MESSAGE: &str = "Your training data is up to date";

impl<N: Network> ServiceWorker<N> {
    /// Handle a connectivity-restored sync. Only the configured tag is acted
    /// on. Clients always see started then complete, even if refreshing fails.
    pub async fn handle_sync(&self, tag: &str) {
        if tag != self.config.sync_tag {
            debug!(tag, "Ignoring unknown sync tag");
            return;
        }

        info!(tag, "Background sync started");
        self.broadcast(ClientMessage::SyncStarted {
            message: SYNC_STARTED_MESSAGE.to_string(),
        })
        .await;

        match self.refresh_cached_api().await {
            Ok(refreshed) => info!(refreshed, "Background sync refreshed cached data"),
            Err(e) => error!(error = %e, "Background sync failed"),
        }

        let delay = self.config.sync_settle_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        self.broadcast(ClientMessage::SyncComplete {
            message: SYNC_COMPLETE_MESSAGE.to_string(),
        })
        .await;
    }

    /// Re-fetch every API entry held in the dynamic generation. Entries are
    /// replaced only by a fresh 200; failures keep the old snapshot.
    async fn refresh_cached_api(&self) -> Result<usize> {
        let keys = self
            .caches
            .entry_keys(&self.config.cache_names().dynamic)
            .await;
        if keys.is_empty() {
            return Ok(0);
        }

        let dynamic = self.fetcher.dynamic().await;
        let mut refreshed = 0;
        for key in keys {
            let url = Url::parse(&key)?;
            if !self.config.is_api_path(url.path()) {
                continue;
            }

            match self.fetcher.fetch_network(&Request::get(url)).await {
                Ok(response) if response.is_cacheable() => {
                    match dynamic.put(&key, &response).await {
                        Ok(_) => refreshed += 1,
                        Err(e) => warn!(key = %key, error = %e, "Could not store refreshed entry"),
                    }
                }
                Ok(response) => {
                    debug!(key = %key, status = response.status, "Keeping cached snapshot")
                }
                Err(e) => warn!(key = %key, error = %e, "Could not refresh cached entry"),
            }
        }
        Ok(refreshed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkerConfig;
    use crate::request::Response;
    use crate::testing::{ScriptedNetwork, ORIGIN};
    use crate::worker::WorkerEvent;
    use std::time::Duration;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn messages(rx: &mut UnboundedReceiver<WorkerEvent>) -> Vec<ClientMessage> {
        let mut messages = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let WorkerEvent::PostMessage { message, .. } = event {
                messages.push(message);
            }
        }
        messages
    }

    fn config() -> WorkerConfig {
        WorkerConfig::default().with_sync_settle_delay(Duration::ZERO)
    }

    fn page() -> Url {
        Url::parse(ORIGIN).unwrap()
    }

    #[tokio::test]
    async fn test_sync_broadcasts_started_then_complete() {
        let (worker, mut rx) = ServiceWorker::new(config(), ScriptedNetwork::new());
        worker.attach_client(page()).await;

        worker.handle_sync("background-sync").await;

        assert_eq!(
            messages(&mut rx),
            vec![
                ClientMessage::SyncStarted {
                    message: SYNC_STARTED_MESSAGE.to_string()
                },
                ClientMessage::SyncComplete {
                    message: SYNC_COMPLETE_MESSAGE.to_string()
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_unknown_tag_is_ignored() {
        let (worker, mut rx) = ServiceWorker::new(config(), ScriptedNetwork::new());
        worker.attach_client(page()).await;

        worker.handle_sync("something-else").await;
        assert!(messages(&mut rx).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sync_waits_settle_delay() {
        let config = WorkerConfig::default().with_sync_settle_delay(Duration::from_secs(2));
        let (worker, _rx) = ServiceWorker::new(config, ScriptedNetwork::new());

        let start = tokio::time::Instant::now();
        worker.handle_sync("background-sync").await;
        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_sync_refreshes_cached_api_entries() {
        let network = ScriptedNetwork::new();
        network.route("/api/drills", Response::new(200, "[\"fresh\"]"));
        let (worker, _rx) = ServiceWorker::new(config(), network);

        let dynamic = worker.caches().open("fitkit-dynamic-v1").await;
        let drills = format!("{}api/drills", ORIGIN);
        let exercises = format!("{}api/exercises", ORIGIN);
        let page = format!("{}about", ORIGIN);
        dynamic.put(&drills, &Response::new(200, "[\"stale\"]")).await.unwrap();
        dynamic.put(&exercises, &Response::new(200, "[\"kept\"]")).await.unwrap();
        dynamic.put(&page, &Response::new(200, "about")).await.unwrap();

        worker.handle_sync("background-sync").await;

        assert_eq!(dynamic.match_request(&drills).await.unwrap().body, "[\"fresh\"]");
        // Unreachable: old snapshot survives.
        assert_eq!(dynamic.match_request(&exercises).await.unwrap().body, "[\"kept\"]");
        assert_eq!(dynamic.match_request(&page).await.unwrap().body, "about");
    }

    #[tokio::test]
    async fn test_sync_completes_while_offline() {
        let network = ScriptedNetwork::new();
        network.set_online(false);
        let (worker, mut rx) = ServiceWorker::new(config(), network);
        worker.attach_client(page()).await;

        let dynamic = worker.caches().open("fitkit-dynamic-v1").await;
        let drills = format!("{}api/drills", ORIGIN);
        dynamic.put(&drills, &Response::new(200, "[1]")).await.unwrap();

        worker.handle_sync("background-sync").await;

        assert_eq!(messages(&mut rx).len(), 2);
        assert_eq!(dynamic.match_request(&drills).await.unwrap().body, "[1]");
    }
}
