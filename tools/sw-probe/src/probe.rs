//! Probe runs: build a worker, install it, fetch paths through it.

use std::path::Path;
use std::time::Duration;

use fitkit_common::{FitKitError, OptionExt};
use fitkit_net::{FetcherConfig, HttpFetcher};
use fitkit_sw::{
    Destination, DispatchOutcome, HostEvent, Network, Request, ServiceWorker, WorkerConfig,
    WorkerEvent,
};
use serde::Serialize;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};
use url::Url;

/// One line of probe output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeReport {
    pub path: String,
    pub url: String,
    pub strategy: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProbeReport {
    fn new(path: &str, request: &Request) -> Self {
        Self {
            path: path.to_string(),
            url: request.url.to_string(),
            strategy: "pass-through",
            status: None,
            source: None,
            bytes: None,
            error: None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Load the worker configuration. `--origin` wins over the file.
pub fn load_config(path: Option<&Path>, origin: Option<Url>) -> Result<WorkerConfig, FitKitError> {
    let config = match path {
        Some(path) => WorkerConfig::from_path(path)
            .map_err(|e| FitKitError::config_with_source(format!("loading {}", path.display()), e))?,
        None => WorkerConfig::default(),
    };

    let config = match origin {
        Some(origin) => WorkerConfig { origin, ..config },
        None => config,
    };
    config
        .validate()
        .map_err(|e| FitKitError::config_with_source("invalid worker configuration", e))?;
    Ok(config)
}

/// Build the request a page would issue for `path`.
pub fn request_for(config: &WorkerConfig, path: &str) -> Result<Request, FitKitError> {
    let url = config
        .resolve(path)
        .map_err(|e| FitKitError::InvalidArgument(format!("{}: {}", path, e)))?;

    if config.is_api_path(url.path()) {
        return Ok(Request::get(url));
    }

    let file_name = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or_default()
        .to_string();
    if !file_name.contains('.') {
        return Ok(Request::navigate(url));
    }

    let destination = match mime_guess::from_path(&file_name).first() {
        Some(_) if file_name.ends_with(".webmanifest") || file_name == "manifest.json" => {
            Destination::Manifest
        }
        Some(mime) => match (mime.type_().as_str(), mime.subtype().as_str()) {
            (_, "javascript") => Destination::Script,
            ("text", "css") => Destination::Style,
            ("image", _) => Destination::Image,
            ("font", _) => Destination::Font,
            (_, subtype) if subtype.starts_with("font-") => Destination::Font,
            _ => Destination::Other,
        },
        None => Destination::Other,
    };
    Ok(Request::get(url).with_destination(destination))
}

/// Fetch one path through the worker.
pub async fn probe_path<N: Network>(worker: &ServiceWorker<N>, path: &str) -> ProbeReport {
    let request = match request_for(worker.config(), path) {
        Ok(request) => request,
        Err(e) => {
            return ProbeReport {
                path: path.to_string(),
                url: String::new(),
                strategy: "pass-through",
                status: None,
                source: None,
                bytes: None,
                error: Some(e.to_string()),
            }
        }
    };

    let mut report = ProbeReport::new(path, &request);
    match worker.dispatch(HostEvent::Fetch(request)).await {
        Ok(DispatchOutcome::Respond(outcome)) => {
            report.strategy = outcome.strategy.as_str();
            report.status = Some(outcome.response.status);
            report.source = Some(outcome.source.as_str());
            report.bytes = Some(outcome.response.body.len());
            outcome.wait_until.settle().await;
        }
        Ok(_) => {}
        Err(e) => report.error = Some(e.to_string()),
    }
    report
}

/// Probe options.
#[derive(Debug, Clone)]
pub struct ProbeOptions {
    pub offline: bool,
    pub timeout: Option<Duration>,
}

/// Install + activate, optionally go offline, then probe every path.
pub async fn run(
    config: WorkerConfig,
    options: ProbeOptions,
    paths: &[String],
) -> Result<Vec<ProbeReport>, FitKitError> {
    let mut fetcher_config = FetcherConfig::default();
    if let Some(timeout) = options.timeout {
        fetcher_config.timeout = timeout;
    }
    let fetcher = HttpFetcher::new(fetcher_config)
        .map_err(|e| FitKitError::network_with_source("building HTTP client", e))?;
    let connectivity = fetcher.connectivity();

    info!(origin = %config.origin, version = %config.version, "Starting probe");
    let (worker, mut events) = ServiceWorker::new(config, fetcher);

    worker
        .dispatch(HostEvent::Install)
        .await
        .map_err(|e| FitKitError::worker_with_source("install", e))?;
    worker
        .dispatch(HostEvent::Activate)
        .await
        .map_err(|e| FitKitError::worker_with_source("activate", e))?;
    log_events(&mut events);

    let precached = worker
        .caches()
        .entry_keys(&worker.version())
        .await
        .len();
    info!(precached, "Worker active");

    if options.offline {
        connectivity.set_online(false);
    }

    let mut reports = Vec::with_capacity(paths.len());
    for path in paths {
        reports.push(probe_path(&worker, path).await);
    }
    log_events(&mut events);

    let last = reports.last().ok_or_not_found("probe paths")?;
    debug!(last = %last.path, "Probe finished");
    Ok(reports)
}

fn log_events(events: &mut UnboundedReceiver<WorkerEvent>) {
    while let Ok(event) = events.try_recv() {
        match event {
            WorkerEvent::StateChange { version, state } => {
                debug!(version = %version, state = ?state, "Worker state")
            }
            other => warn!(event = ?other, "Unexpected worker event"),
        }
    }
}
