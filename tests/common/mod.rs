//! Shared utilities for integration tests.
//!
//! Every backend and gateway binds to port 0 so tests can run in parallel.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use api_gateway::auth::authenticator_from_config;
use api_gateway::config::parse_config;
use api_gateway::discovery::discovery_from_config;
use api_gateway::{Gateway, GatewayConfig, HttpServer, Shutdown};
use axum::body::Body;
use axum::http::{HeaderMap, Request};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// One request as seen by a recording backend.
#[derive(Debug, Clone)]
pub struct Seen {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
}

/// Handle onto a recording backend.
#[derive(Clone, Default)]
pub struct Recorder {
    seen: Arc<Mutex<Vec<Seen>>>,
    calls: Arc<AtomicUsize>,
}

impl Recorder {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last(&self) -> Seen {
        self.seen.lock().unwrap().last().cloned().expect("backend saw no request")
    }
}

/// Start an HTTP backend that records every request and echoes its path as JSON.
pub async fn start_recorder(name: &'static str) -> (SocketAddr, Recorder) {
    let recorder = Recorder::default();
    let state = recorder.clone();
    let app = Router::new().fallback(move |request: Request<Body>| {
        let state = state.clone();
        async move {
            state.calls.fetch_add(1, Ordering::SeqCst);
            let seen = Seen {
                method: request.method().to_string(),
                path: request.uri().path().to_string(),
                query: request.uri().query().map(str::to_string),
                headers: request.headers().clone(),
            };
            let body = json!({ "backend": name, "path": seen.path, "query": seen.query });
            state.seen.lock().unwrap().push(seen);
            ([("x-backend", name)], Json(body))
        }
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, recorder)
}

/// Start a raw TCP backend whose (status, body) comes from `f`.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let f = f.clone();
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let (status, body) = f().await;
                let status_text = match status {
                    200 => "200 OK",
                    404 => "404 Not Found",
                    500 => "500 Internal Server Error",
                    503 => "503 Service Unavailable",
                    _ => "200 OK",
                };
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status_text,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    addr
}

/// Backend that waits `delay` before answering 200.
pub async fn start_slow_backend(delay: Duration) -> SocketAddr {
    start_programmable_backend(move || async move {
        tokio::time::sleep(delay).await;
        (200, "slow".into())
    })
    .await
}

/// Backend that accepts, reads the request and then closes without answering.
pub async fn start_dropping_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            drop(socket);
        }
    });
    addr
}

/// An address with nothing listening on it.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// A running gateway; dropping it does not stop the server, call `stop`.
pub struct TestGateway {
    pub addr: SocketAddr,
    shutdown: Shutdown,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn stop(&self) {
        self.shutdown.trigger();
    }
}

/// Parse `config`, build the gateway and serve it on an ephemeral port.
pub async fn start_gateway(config: &str) -> TestGateway {
    let config = parse_config(config).expect("test config is valid");
    serve(HttpServer::new(config).expect("gateway builds")).await
}

/// Serve `config` without semantic validation, for settings the loader rejects.
pub async fn start_gateway_unchecked(config: &str) -> TestGateway {
    let config: GatewayConfig = toml::from_str(config).expect("test config parses");
    let gateway = Gateway::with_collaborators(
        &config,
        authenticator_from_config(&config.auth),
        discovery_from_config(&config).discovery,
    )
    .expect("gateway builds");
    serve(HttpServer::from_gateway(gateway, config)).await
}

async fn serve(server: HttpServer) -> TestGateway {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let rx = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, rx).await;
    });
    TestGateway { addr, shutdown }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

pub async fn json_body(response: reqwest::Response) -> Value {
    response.json().await.unwrap()
}

/// HTTP backend answering every request with a fixed status and JSON body.
pub async fn start_json_backend(status: u16, body: &'static str) -> SocketAddr {
    let app = Router::new().fallback(move || async move {
        (
            axum::http::StatusCode::from_u16(status).unwrap(),
            [(axum::http::header::CONTENT_TYPE, "application/json")],
            body,
        )
    });
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Backend that never answers and counts connections still open.
pub async fn start_hold_backend() -> (SocketAddr, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let open = Arc::new(AtomicUsize::new(0));
    let counter = open.clone();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let counter = counter.clone();
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                loop {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(_) => {}
                    }
                }
                counter.fetch_sub(1, Ordering::SeqCst);
            });
        }
    });
    (addr, open)
}

/// Backend that promises a 100 byte body, sends a few bytes and then stalls.
pub async fn start_stalling_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let _ = socket
                    .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\npartial")
                    .await;
                tokio::time::sleep(Duration::from_secs(30)).await;
                drop(socket);
            });
        }
    });
    addr
}
