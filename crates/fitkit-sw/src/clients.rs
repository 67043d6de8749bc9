//! The client registration set: pages attached to the worker.

use std::sync::atomic::{AtomicU64, Ordering};

use url::Url;

use crate::{Result, ServiceWorkerError};

/// Client type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClientType {
    #[default]
    Window,
    Worker,
    SharedWorker,
}

/// A page context (tab/window) attached to the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Client {
    /// Client ID.
    pub id: String,

    /// Client URL.
    pub url: Url,

    /// Client type.
    pub client_type: ClientType,

    /// Whether focused.
    pub focused: bool,

    /// Whether this worker controls the client.
    pub controlled: bool,
}

/// Options for `Clients::match_all`. The default matches controlled clients
/// of any type.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClientMatchOptions {
    pub include_uncontrolled: bool,
    /// `None` matches every type.
    pub client_type: Option<ClientType>,
}

impl ClientMatchOptions {
    /// Every window, controlled or not.
    pub fn all_windows() -> Self {
        Self {
            include_uncontrolled: true,
            client_type: Some(ClientType::Window),
        }
    }

    /// Every attached client.
    pub fn everyone() -> Self {
        Self {
            include_uncontrolled: true,
            client_type: None,
        }
    }
}

/// Clients API. Keeps attach order.
#[derive(Debug, Default)]
pub struct Clients {
    clients: Vec<Client>,
}

impl Clients {
    /// Create new clients manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a page. New pages start uncontrolled.
    pub fn attach(&mut self, url: Url, client_type: ClientType) -> String {
        let id = next_client_id();
        self.clients.push(Client {
            id: id.clone(),
            url,
            client_type,
            focused: false,
            controlled: false,
        });
        id
    }

    /// Detach a closed page.
    pub fn detach(&mut self, id: &str) -> Option<Client> {
        let index = self.clients.iter().position(|c| c.id == id)?;
        Some(self.clients.remove(index))
    }

    /// Get a client by ID.
    pub fn get(&self, id: &str) -> Option<&Client> {
        self.clients.iter().find(|c| c.id == id)
    }

    /// Match all clients.
    pub fn match_all(&self, options: ClientMatchOptions) -> Vec<&Client> {
        self.clients
            .iter()
            .filter(|c| options.include_uncontrolled || c.controlled)
            .filter(|c| options.client_type.map_or(true, |t| c.client_type == t))
            .collect()
    }

    /// Focus a window client.
    pub fn focus(&mut self, id: &str) -> Result<&Client> {
        let index = self
            .clients
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| ServiceWorkerError::NotFound(format!("client {}", id)))?;

        if self.clients[index].client_type != ClientType::Window {
            return Err(ServiceWorkerError::StateError(
                "Can only focus window clients".to_string(),
            ));
        }

        for client in self.clients.iter_mut() {
            client.focused = false;
        }
        self.clients[index].focused = true;
        Ok(&self.clients[index])
    }

    /// Open a window. The new window is focused and controlled.
    pub fn open_window(&mut self, url: Url) -> Client {
        for client in self.clients.iter_mut() {
            client.focused = false;
        }
        let client = Client {
            id: next_client_id(),
            url,
            client_type: ClientType::Window,
            focused: true,
            controlled: true,
        };
        self.clients.push(client.clone());
        client
    }

    /// Take control of every uncontrolled client. Returns the newly claimed IDs.
    pub fn claim(&mut self) -> Vec<String> {
        self.clients
            .iter_mut()
            .filter(|c| !c.controlled)
            .map(|c| {
                c.controlled = true;
                c.id.clone()
            })
            .collect()
    }

    /// Number of attached clients.
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Whether no clients are attached.
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

fn next_client_id() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    format!("client-{}", COUNTER.fetch_add(1, Ordering::Relaxed))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(path: &str) -> Url {
        Url::parse("http://localhost:3000/").unwrap().join(path).unwrap()
    }

    #[test]
    fn test_attach_and_detach() {
        let mut clients = Clients::new();
        let a = clients.attach(page("/"), ClientType::Window);
        let b = clients.attach(page("/drills"), ClientType::Window);
        assert_ne!(a, b);
        assert_eq!(clients.len(), 2);

        assert_eq!(clients.detach(&a).unwrap().url, page("/"));
        assert!(clients.get(&a).is_none());
        assert!(clients.detach(&a).is_none());
    }

    #[test]
    fn test_match_all_respects_control() {
        let mut clients = Clients::new();
        clients.attach(page("/"), ClientType::Window);
        clients.attach(page("/sw-helper.js"), ClientType::Worker);

        let controlled_windows = ClientMatchOptions {
            include_uncontrolled: false,
            client_type: Some(ClientType::Window),
        };
        assert!(clients.match_all(controlled_windows).is_empty());
        assert!(clients.match_all(ClientMatchOptions::default()).is_empty());
        assert_eq!(clients.match_all(ClientMatchOptions::all_windows()).len(), 1);
        assert_eq!(clients.match_all(ClientMatchOptions::everyone()).len(), 2);

        clients.claim();
        assert_eq!(clients.match_all(controlled_windows).len(), 1);
        assert_eq!(clients.match_all(ClientMatchOptions::default()).len(), 2);
    }

    #[test]
    fn test_claim_is_idempotent() {
        let mut clients = Clients::new();
        let a = clients.attach(page("/"), ClientType::Window);
        assert_eq!(clients.claim(), vec![a]);
        assert!(clients.claim().is_empty());
    }

    #[test]
    fn test_focus() {
        let mut clients = Clients::new();
        let a = clients.attach(page("/"), ClientType::Window);
        let w = clients.attach(page("/w.js"), ClientType::Worker);

        assert!(clients.focus(&a).unwrap().focused);
        assert!(matches!(clients.focus(&w), Err(ServiceWorkerError::StateError(_))));
        assert!(matches!(clients.focus("nope"), Err(ServiceWorkerError::NotFound(_))));
    }

    #[test]
    fn test_open_window() {
        let mut clients = Clients::new();
        let a = clients.attach(page("/"), ClientType::Window);
        clients.focus(&a).unwrap();

        let opened = clients.open_window(page("/"));
        assert!(opened.focused);
        assert!(opened.controlled);
        assert!(!clients.get(&a).unwrap().focused);
    }
}
