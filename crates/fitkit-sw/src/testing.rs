//! In-memory network for unit tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use hashbrown::HashMap;

use crate::network::Network;
use crate::request::{Request, Response};
use crate::{Result, ServiceWorkerError};

pub const ORIGIN: &str = "http://localhost:3000/";

/// Serves canned responses by URL; unknown URLs fail like an unreachable host.
pub struct ScriptedNetwork {
    routes: Mutex<HashMap<String, Response>>,
    online: AtomicBool,
    calls: Mutex<Vec<String>>,
}

impl ScriptedNetwork {
    pub fn new() -> Self {
        Self {
            routes: Mutex::new(HashMap::new()),
            online: AtomicBool::new(true),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn route(&self, path: &str, response: Response) {
        let url = url::Url::parse(ORIGIN).unwrap().join(path).unwrap();
        self.routes.lock().unwrap().insert(url.to_string(), response);
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl Network for ScriptedNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response> {
        let key = request.cache_key();
        self.calls.lock().unwrap().push(key.clone());
        if !self.online.load(Ordering::SeqCst) {
            return Err(ServiceWorkerError::NetworkError("offline".to_string()));
        }
        self.routes
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .ok_or_else(|| ServiceWorkerError::NetworkError(format!("unreachable: {}", key)))
    }
}
