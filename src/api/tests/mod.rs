use super::*;
use crate::downloader::test_helpers::{CATALOG, MockFetcher, downloader_with, test_config};
use axum::body::Body;
use axum::extract::connect_info::MockConnectInfo;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::response::Response;
use serde_json::{Value, json};
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

mod batches;

/// Peer address every test request appears to come from
const PEER: ([u8; 4], u16) = ([198, 51, 100, 20], 40_000);

struct TestApp {
    router: Router,
    downloader: Arc<CatalogDownloader>,
    _dir: TempDir,
}

impl TestApp {
    /// App over a mock fetcher with rate limiting off
    async fn new(fetcher: MockFetcher) -> Self {
        Self::with_config(fetcher, |config| {
            config.server.api.rate_limit.enabled = false;
        })
        .await
    }

    async fn with_config(fetcher: MockFetcher, configure: impl FnOnce(&mut Config)) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        configure(&mut config);

        let downloader = Arc::new(downloader_with(config.clone(), Arc::new(fetcher), true).await);
        let router = create_router(downloader.clone(), Arc::new(config))
            .layer(MockConnectInfo(SocketAddr::from(PEER)));

        Self {
            router,
            downloader,
            _dir: dir,
        }
    }

    async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    async fn get(&self, uri: &str) -> Response {
        self.send(Request::get(uri).body(Body::empty()).unwrap())
            .await
    }

    async fn post_json(&self, uri: &str, body: Value) -> Response {
        self.send(
            Request::post(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    /// Poll `uri` until its JSON `field` satisfies `done`
    async fn poll_until(&self, uri: &str, done: impl Fn(&Value) -> bool) -> Value {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        loop {
            let body = json_body(self.get(uri).await).await;
            if done(&body) {
                return body;
            }
            assert!(tokio::time::Instant::now() < deadline, "{uri} never settled: {body}");
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }
}

async fn body_bytes(response: Response) -> axum::body::Bytes {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
}

async fn json_body(response: Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers.get(name).unwrap().to_str().unwrap()
}

fn is_terminal(job: &Value) -> bool {
    matches!(job["status"].as_str(), Some("completed" | "failed"))
}

#[tokio::test]
async fn api_server_stops_on_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.server.api.bind_address = "127.0.0.1:0".parse().unwrap();
    let downloader = Arc::new(
        downloader_with(config, Arc::new(MockFetcher::with_pages(1)), true).await,
    );

    let handle = downloader.spawn_api_server();
    tokio::time::sleep(Duration::from_millis(100)).await;

    downloader.shutdown().await.unwrap();
    let served = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
    assert!(served.is_ok());
}

#[tokio::test]
async fn cors_headers_are_added() {
    let app = TestApp::new(MockFetcher::with_pages(1)).await;

    let response = app
        .send(
            Request::get("/health")
                .header("Origin", "http://localhost:3000")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("access-control-allow-origin"));
}

#[tokio::test]
async fn cors_can_be_disabled() {
    let app = TestApp::with_config(MockFetcher::with_pages(1), |config| {
        config.server.api.cors_enabled = false;
    })
    .await;

    let response = app
        .send(
            Request::get("/health")
                .header("Origin", "http://localhost:3000")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert!(!response.headers().contains_key("access-control-allow-origin"));
}

#[tokio::test]
async fn unknown_route_is_not_found() {
    let app = TestApp::new(MockFetcher::with_pages(1)).await;

    let response = app.get("/downloads").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
