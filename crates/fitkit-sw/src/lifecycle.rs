//! Worker lifecycle: install, activate, skip-waiting.

use std::time::Instant;

use futures::future::try_join_all;
use tracing::{debug, error, info, warn};

use crate::cache::Cache;
use crate::network::Network;
use crate::request::Request;
use crate::worker::{ServiceWorker, WorkerEvent};
use crate::{Result, ServiceWorkerError};

/// Service worker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkerState {
    /// Script parsed, nothing run yet.
    #[default]
    Parsed,
    /// Precaching the app shell.
    Installing,
    /// Installed, waiting to activate.
    Installed,
    /// Cleaning up old generations.
    Activating,
    /// Serving fetches.
    Activated,
    /// Install failed or replaced.
    Redundant,
}

/// Lifecycle bookkeeping for one worker version.
#[derive(Debug)]
pub struct Lifecycle {
    state: WorkerState,
    skip_waiting: bool,
    state_changed_at: Instant,
    last_error: Option<String>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: WorkerState::Parsed,
            skip_waiting: false,
            state_changed_at: Instant::now(),
            last_error: None,
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// When the current state was entered.
    pub fn state_changed_at(&self) -> Instant {
        self.state_changed_at
    }

    /// Why install failed, if it did.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn skip_waiting_requested(&self) -> bool {
        self.skip_waiting
    }

    pub fn request_skip_waiting(&mut self) {
        self.skip_waiting = true;
    }

    pub fn begin_install(&mut self) -> Result<()> {
        match self.state {
            WorkerState::Parsed => {
                self.set(WorkerState::Installing);
                Ok(())
            }
            other => Err(ServiceWorkerError::StateError(format!(
                "cannot install from {:?}",
                other
            ))),
        }
    }

    pub fn install_complete(&mut self) {
        self.set(WorkerState::Installed);
    }

    pub fn install_failed(&mut self, reason: &str) {
        self.last_error = Some(reason.to_string());
        self.set(WorkerState::Redundant);
    }

    /// Activation may be re-run once activated.
    pub fn begin_activate(&mut self) -> Result<()> {
        match self.state {
            WorkerState::Installed | WorkerState::Activated => {
                self.set(WorkerState::Activating);
                Ok(())
            }
            other => Err(ServiceWorkerError::StateError(format!(
                "cannot activate from {:?}",
                other
            ))),
        }
    }

    pub fn activate_complete(&mut self) {
        self.set(WorkerState::Activated);
    }

    fn set(&mut self, state: WorkerState) {
        self.state = state;
        self.state_changed_at = Instant::now();
    }
}

// ==================== Phases ====================

impl<N: Network> ServiceWorker<N> {
    /// Precache the app shell into this version's static generation.
    ///
    /// All-or-nothing: if any asset fails to load, no static generation is
    /// written and the worker becomes redundant.
    pub async fn install(&self) -> Result<()> {
        let _phase = self.phase.try_lock().map_err(|_| {
            ServiceWorkerError::StateError("another lifecycle phase is in flight".to_string())
        })?;

        self.lifecycle.write().await.begin_install()?;
        self.emit_state(WorkerState::Installing);

        let names = self.config.cache_names();
        info!(
            cache = %names.static_cache,
            assets = self.config.static_assets.len(),
            "Installing service worker"
        );

        match self.precache(&names.static_cache).await {
            Ok(cache) => {
                self.caches.insert(cache).await;
                self.lifecycle.write().await.install_complete();
                self.emit_state(WorkerState::Installed);
            }
            Err(e) => {
                error!(error = %e, "Install failed");
                let reason = match e {
                    ServiceWorkerError::InstallFailed(reason) => reason,
                    other => other.to_string(),
                };
                self.lifecycle.write().await.install_failed(&reason);
                self.emit_state(WorkerState::Redundant);
                return Err(ServiceWorkerError::InstallFailed(reason));
            }
        }

        if self.lifecycle.read().await.skip_waiting_requested() {
            debug!("Skip-waiting requested; activating immediately");
            self.activate_locked().await?;
        }
        Ok(())
    }

    /// Delete stale cache generations and claim open pages.
    pub async fn activate(&self) -> Result<()> {
        let _phase = self.phase.try_lock().map_err(|_| {
            ServiceWorkerError::StateError("another lifecycle phase is in flight".to_string())
        })?;
        self.activate_locked().await
    }

    /// Ask to activate without waiting. Applies now if already installed,
    /// otherwise right after install completes.
    pub async fn skip_waiting(&self) -> Result<()> {
        let installed = {
            let mut lifecycle = self.lifecycle.write().await;
            lifecycle.request_skip_waiting();
            lifecycle.state() == WorkerState::Installed
        };
        if !installed {
            return Ok(());
        }

        let _phase = self.phase.lock().await;
        if self.state().await != WorkerState::Installed {
            return Ok(());
        }
        self.activate_locked().await
    }

    async fn precache(&self, name: &str) -> Result<Cache> {
        let requests = self
            .config
            .static_assets
            .iter()
            .map(|asset| self.config.resolve(asset).map(Request::get))
            .collect::<Result<Vec<_>>>()?;

        let fetched = try_join_all(requests.iter().map(|request| async move {
            let response = self.fetcher.fetch_network(request).await?;
            if !response.is_cacheable() {
                return Err(ServiceWorkerError::InstallFailed(format!(
                    "{} responded with {}",
                    request.url, response.status
                )));
            }
            Ok::<_, ServiceWorkerError>((request.cache_key(), response))
        }))
        .await?;

        let mut cache = Cache::new(name);
        for (key, response) in &fetched {
            cache.put(key, response)?;
        }
        Ok(cache)
    }

    async fn activate_locked(&self) -> Result<()> {
        self.lifecycle.write().await.begin_activate()?;
        self.emit_state(WorkerState::Activating);

        let names = self.config.cache_names();
        for name in self.caches.keys().await {
            if names.is_current(&name) {
                continue;
            }
            if self.caches.delete(&name).await {
                info!(cache = %name, "Deleted stale cache generation");
            } else {
                warn!(cache = %name, "Stale cache generation was already gone");
            }
        }

        let claimed = self.clients.write().await.claim();
        for client_id in claimed {
            self.emit(WorkerEvent::ControllerChange { client_id });
        }

        self.lifecycle.write().await.activate_complete();
        self.emit_state(WorkerState::Activated);
        info!(version = %names.static_cache, "Service worker activated");
        Ok(())
    }
}
