//! End-to-end offline scenarios driven through the dispatcher.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use fitkit_sw::{
    CacheStore, Destination, DispatchOutcome, FetchOutcome, HostEvent, Network, PushEvent,
    Request, Response, ResponseSource, ServiceWorker, ServiceWorkerError, Strategy,
    WorkerConfig, WorkerEvent, WorkerState,
};
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};
use url::Url;

const ORIGIN: &str = "http://localhost:3000/";

#[derive(Default)]
struct Origin {
    pages: Mutex<Vec<(String, Response)>>,
    offline: AtomicBool,
    calls: AtomicUsize,
}

impl Origin {
    fn serve(&self, path: &str, response: Response) {
        let key = url(path).to_string();
        let mut pages = self.pages.lock().unwrap();
        pages.retain(|(k, _)| *k != key);
        pages.push((key, response));
    }

    fn go_offline(&self) {
        self.offline.store(true, Ordering::SeqCst);
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Network for Origin {
    async fn fetch(&self, request: &Request) -> Result<Response, ServiceWorkerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(ServiceWorkerError::NetworkError("offline".into()));
        }
        let key = request.cache_key();
        self.pages
            .lock()
            .unwrap()
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, r)| r.clone())
            .ok_or_else(|| ServiceWorkerError::NetworkError(format!("no route to {}", key)))
    }
}

fn url(path: &str) -> Url {
    Url::parse(ORIGIN).unwrap().join(path).unwrap()
}

fn config() -> WorkerConfig {
    WorkerConfig::default().with_sync_settle_delay(Duration::ZERO)
}

fn origin_with_shell(config: &WorkerConfig) -> Arc<Origin> {
    let origin = Arc::new(Origin::default());
    for asset in &config.static_assets {
        origin.serve(asset, Response::new(200, format!("shell {}", asset)));
    }
    origin
}

async fn installed(
    config: WorkerConfig,
    origin: Arc<Origin>,
) -> (ServiceWorker<Arc<Origin>>, mpsc::UnboundedReceiver<WorkerEvent>) {
    let (worker, rx) = ServiceWorker::new(config, origin);
    worker.dispatch(HostEvent::Install).await.unwrap();
    worker.dispatch(HostEvent::Activate).await.unwrap();
    (worker, rx)
}

async fn fetch(worker: &ServiceWorker<Arc<Origin>>, request: Request) -> FetchOutcome {
    match worker.dispatch(HostEvent::Fetch(request)).await.unwrap() {
        DispatchOutcome::Respond(outcome) => outcome,
        other => panic!("expected a response, got {:?}", other),
    }
}

#[tokio::test]
async fn test_static_assets_are_served_from_cache_after_install() {
    let config = config();
    let origin = origin_with_shell(&config);
    let (worker, _rx) = installed(config, Arc::clone(&origin)).await;
    let calls = origin.calls();

    let request = Request::get(url("/static/css/main.css")).with_destination(Destination::Style);
    let outcome = fetch(&worker, request).await;

    assert_eq!(outcome.source, ResponseSource::Cache);
    assert_eq!(outcome.strategy, Strategy::CacheFirst);
    assert_eq!(outcome.response.body, "shell /static/css/main.css");
    assert_eq!(origin.calls(), calls);
}

#[tokio::test]
async fn test_api_success_is_cached_byte_for_byte() {
    let config = config();
    let origin = origin_with_shell(&config);
    origin.serve("/api/stretches?level=2", Response::json(200, &json!([{"id": 7}])).unwrap());
    let (worker, _rx) = installed(config, Arc::clone(&origin)).await;

    let outcome = fetch(&worker, Request::get(url("/api/stretches?level=2"))).await;
    assert_eq!(outcome.source, ResponseSource::Network);
    let served = outcome.response.clone();
    outcome.wait_until.settle().await;

    let cached = worker
        .caches()
        .match_request(&url("/api/stretches?level=2").to_string())
        .await
        .unwrap();
    assert_eq!(cached.body, served.body);
    assert_eq!(cached.status, 200);
}

#[tokio::test]
async fn test_offline_collections_get_empty_envelope() {
    let config = config();
    let origin = origin_with_shell(&config);
    let (worker, _rx) = installed(config, Arc::clone(&origin)).await;
    origin.go_offline();

    for path in ["/api/drills", "/api/exercises"] {
        let outcome = fetch(&worker, Request::get(url(path))).await;
        assert_eq!(outcome.source, ResponseSource::Synthetic);
        assert_eq!(outcome.response.status, 200);
        let body: Value = outcome.response.json_body().unwrap();
        assert_eq!(body["data"], json!([]));
        assert!(body["message"].is_string());
    }
}

#[tokio::test]
async fn test_other_api_paths_get_unavailable_envelope() {
    let config = config();
    let origin = origin_with_shell(&config);
    let (worker, _rx) = installed(config, Arc::clone(&origin)).await;
    origin.go_offline();

    let outcome = fetch(&worker, Request::get(url("/api/videos/search?q=squat"))).await;
    assert_eq!(outcome.response.status, 503);
    let body: Value = outcome.response.json_body().unwrap();
    assert_eq!(body["offline"], json!(true));
    assert!(body["message"].is_string());
}

#[tokio::test]
async fn test_activation_leaves_exactly_current_generations() {
    let caches = CacheStore::new();
    caches.open("fitkit-v1").await;
    caches.open("fitkit-static-v0").await;
    caches.open("some-other-cache").await;

    let config = config();
    let origin = origin_with_shell(&config);
    origin.serve("/api/drills", Response::new(200, "[]"));
    let (worker, _rx) = ServiceWorker::with_caches(config, origin, caches);
    worker.dispatch(HostEvent::Install).await.unwrap();
    worker.dispatch(HostEvent::Activate).await.unwrap();

    // The API write-behind creates the dynamic generation.
    let outcome = fetch(&worker, Request::get(url("/api/drills"))).await;
    outcome.wait_until.settle().await;

    let mut names = worker.caches().keys().await;
    names.sort();
    let expected = vec!["fitkit-dynamic-v1".to_string(), "fitkit-static-v1".to_string()];
    assert_eq!(names, expected);

    worker.dispatch(HostEvent::Activate).await.unwrap();
    let mut again = worker.caches().keys().await;
    again.sort();
    assert_eq!(again, expected);
}

#[tokio::test]
async fn test_get_version_replies_with_static_generation() {
    let config = config();
    let origin = origin_with_shell(&config);
    let (worker, _rx) = installed(config, origin).await;

    let (port, reply) = oneshot::channel();
    worker
        .dispatch(HostEvent::Message {
            data: json!({"type": "GET_VERSION"}),
            port: Some(port),
        })
        .await
        .unwrap();

    let reply = reply.await.unwrap();
    let version = reply["version"].as_str().unwrap();
    assert!(!version.is_empty());
    assert_eq!(version, worker.version());
    assert_eq!(version, "fitkit-static-v1");
}

#[tokio::test]
async fn test_failed_install_leaves_no_generation() {
    let config = config().with_static_assets(["/", "/index.html"]);
    let origin = Arc::new(Origin::default());
    origin.serve("/", Response::new(200, "root"));
    let (worker, mut rx) = ServiceWorker::new(config, origin);

    let err = worker.dispatch(HostEvent::Install).await.unwrap_err();
    assert!(matches!(err, ServiceWorkerError::InstallFailed(_)));
    assert!(!worker.caches().has("fitkit-static-v1").await);
    assert!(worker.caches().match_request(ORIGIN).await.is_none());
    assert_eq!(worker.state().await, WorkerState::Redundant);

    let mut last_state = None;
    while let Ok(event) = rx.try_recv() {
        if let WorkerEvent::StateChange { state, .. } = event {
            last_state = Some(state);
        }
    }
    assert_eq!(last_state, Some(WorkerState::Redundant));
}

#[tokio::test]
async fn test_failed_worker_never_controls_pages() {
    let config = config().with_static_assets(["/", "/index.html"]);
    let origin = Arc::new(Origin::default());
    origin.serve("/", Response::new(200, "root"));
    origin.serve("/api/drills", Response::new(200, "[]"));
    let (worker, _rx) = ServiceWorker::new(config, Arc::clone(&origin));
    assert!(worker.dispatch(HostEvent::Install).await.is_err());
    let calls = origin.calls();

    let outcome = worker
        .dispatch(HostEvent::Fetch(Request::get(url("/api/drills"))))
        .await
        .unwrap();
    assert!(matches!(outcome, DispatchOutcome::PassThrough));
    assert_eq!(origin.calls(), calls);

    let err = worker
        .dispatch(HostEvent::Message {
            data: json!({"type": "CACHE_DATA", "data": {"drills": [{"id": 1}]}}),
            port: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceWorkerError::StateError(_)));

    assert!(worker.caches().keys().await.is_empty());
    assert!(worker.caches().match_request(&url("/api/drills").to_string()).await.is_none());
}

#[tokio::test]
async fn test_offline_navigation_serves_cached_index() {
    let config = config().with_static_assets(["/manifest.json"]);
    let origin = origin_with_shell(&config);
    let (worker, _rx) = installed(config, Arc::clone(&origin)).await;

    let dynamic = worker.caches().open("fitkit-dynamic-v1").await;
    let index = Response::new(200, "<html>cached index</html>")
        .with_header("content-type", "text/html");
    dynamic.put(&url("/index.html").to_string(), &index).await.unwrap();
    origin.go_offline();

    let outcome = fetch(&worker, Request::navigate(url("/workouts/today"))).await;
    assert_eq!(outcome.strategy, Strategy::Navigation);
    assert_eq!(outcome.source, ResponseSource::Cache);
    assert_eq!(outcome.response, index);
}

#[tokio::test]
async fn test_pushed_app_data_is_served_offline() {
    let config = config();
    let origin = origin_with_shell(&config);
    let (worker, _rx) = installed(config, Arc::clone(&origin)).await;
    origin.go_offline();

    worker
        .dispatch(HostEvent::Message {
            data: json!({"type": "CACHE_DATA", "data": {"drills": [{"id": 1}]}}),
            port: None,
        })
        .await
        .unwrap();

    let outcome = fetch(&worker, Request::get(url("/api/drills"))).await;
    assert_eq!(outcome.source, ResponseSource::Cache);
    assert_eq!(outcome.response.status, 200);
    let body: Value = outcome.response.json_body().unwrap();
    assert_eq!(body, json!([{"id": 1}]));
}

#[tokio::test]
async fn test_skip_waiting_message_promotes_installed_worker() {
    let config = config();
    let origin = origin_with_shell(&config);
    let (worker, _rx) = ServiceWorker::new(config, origin);
    worker.dispatch(HostEvent::Install).await.unwrap();
    assert_eq!(worker.state().await, WorkerState::Installed);

    worker
        .dispatch(HostEvent::Message {
            data: json!({"type": "SKIP_WAITING"}),
            port: None,
        })
        .await
        .unwrap();
    assert_eq!(worker.state().await, WorkerState::Activated);
}

#[tokio::test]
async fn test_sync_and_push_reach_open_pages() {
    let config = config();
    let origin = origin_with_shell(&config);
    let (worker, mut rx) = installed(config, origin).await;
    let page = worker.attach_client(url("/")).await;
    while rx.try_recv().is_ok() {}

    worker
        .dispatch(HostEvent::Sync {
            tag: "background-sync".into(),
        })
        .await
        .unwrap();

    let mut kinds = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let WorkerEvent::PostMessage { client_id, message } = event {
            assert_eq!(client_id, page);
            kinds.push(serde_json::to_value(&message).unwrap()["type"].clone());
        }
    }
    assert_eq!(kinds, vec![json!("SYNC_STARTED"), json!("SYNC_COMPLETE")]);

    let id = match worker
        .dispatch(HostEvent::Push(PushEvent::new("{\"url\": \"/drills\"}")))
        .await
        .unwrap()
    {
        DispatchOutcome::Notified(id) => id,
        other => panic!("expected a notification, got {:?}", other),
    };
    worker.dispatch(HostEvent::NotificationClick(id)).await.unwrap();

    let mut navigated = None;
    while let Ok(event) = rx.try_recv() {
        if let WorkerEvent::PostMessage { message, .. } = event {
            navigated = Some(serde_json::to_value(&message).unwrap());
        }
    }
    assert_eq!(navigated, Some(json!({"type": "NAVIGATE", "url": "/drills"})));
}
