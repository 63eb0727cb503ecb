//! SIGHUP reload against a running gateway
//!
//! Kept in its own binary: the signal goes to the whole test process.

#![cfg(unix)]

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use axum::{Router, http::header, response::Html, routing::get};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use token_analyzer::{config::Config, gateway::Gateway};

struct Running {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl Running {
    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = tokio::time::timeout(Duration::from_secs(5), self.handle).await;
    }
}

async fn spawn_origin(addr: SocketAddr) -> Running {
    let app = Router::new()
        .route("/", get(|| async { Html("<h1>Token Analyzer</h1>") }))
        .route("/styles.css", get(|| async { ([(header::CONTENT_TYPE, "text/css")], "body{}") }))
        .route("/offline.html", get(|| async { Html("<h1>offline</h1>") }));

    let listener = TcpListener::bind(addr).await.unwrap();
    let (tx, rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = rx.await;
            })
            .await
            .unwrap();
    });

    Running {
        addr,
        shutdown: Some(tx),
        handle,
    }
}

fn write_config(path: &Path, origin: SocketAddr, version: &str) {
    let yaml = format!(
        "upstream:\n  url: http://{origin}\n  timeout: 2s\noffline:\n  version: {version}\n  manifest:\n    - /\n    - /styles.css\n    - /offline.html\n"
    );
    std::fs::write(path, yaml).unwrap();
}

fn send_sighup() {
    let status = std::process::Command::new("kill")
        .args(["-HUP", &std::process::id().to_string()])
        .status()
        .unwrap();
    assert!(status.success());
}

async fn worker_status(client: &Client, gateway: &Running) -> Value {
    client
        .get(gateway.url("/__worker/status"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

/// Poll the status endpoint until `check` holds, for up to five seconds
async fn wait_for_status(client: &Client, gateway: &Running, check: impl Fn(&Value) -> bool) -> Value {
    let mut status = Value::Null;
    for _ in 0..100 {
        status = worker_status(client, gateway).await;
        if check(&status) {
            return status;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("status never matched: {status}");
}

#[tokio::test]
async fn test_sighup_recovers_failed_install_and_rolls_out_new_version() {
    // Reserve a port for an origin that is down at startup
    let origin_addr = TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap()
        .local_addr()
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("gateway.yaml");
    write_config(&path, origin_addr, "reload-v1");

    let config = Config::load(Some(&path)).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let gateway = Gateway::new(config, Some(path.clone())).await.unwrap();
    let (tx, rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(async move {
        gateway
            .serve(listener, async move {
                let _ = rx.await;
            })
            .await
            .unwrap();
    });
    let gateway = Running {
        addr,
        shutdown: Some(tx),
        handle,
    };
    let client = Client::new();

    // Startup install failed: the gateway runs without a worker
    let status = worker_status(&client, &gateway).await;
    assert!(status["active"].is_null(), "{status}");
    assert_eq!(status["buckets"], serde_json::json!([]));

    // Same config, origin now up: the reload installs it
    let origin = spawn_origin(origin_addr).await;
    send_sighup();
    let status = wait_for_status(&client, &gateway, |s| s["active"]["version"] == "reload-v1").await;
    assert_eq!(status["active"]["state"], "activated");
    assert_eq!(status["buckets"], serde_json::json!(["reload-v1"]));

    // Version bump replaces the bucket
    write_config(&path, origin_addr, "reload-v2");
    send_sighup();
    let status = wait_for_status(&client, &gateway, |s| {
        s["active"]["version"] == "reload-v2" && s["buckets"] == serde_json::json!(["reload-v2"])
    })
    .await;
    assert!(status["waiting"].is_null(), "{status}");

    // The precached assets outlive the origin
    origin.stop().await;
    let response = client.get(gateway.url("/styles.css")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "body{}");

    gateway.stop().await;
}
