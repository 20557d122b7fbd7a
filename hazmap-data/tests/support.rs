//! Local catalog service used to exercise the HTTP remote source.
//!
//! Responses are canned per request path; every request is recorded so
//! tests can inspect query strings, headers and bodies.

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri, header};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

/// Path prefix the fixture service is mounted under.
pub const API_PREFIX: &str = "/api";

/// A request seen by the fixture service.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub authorization: Option<String>,
    pub body: String,
}

#[derive(Debug, Clone)]
struct Canned {
    status: StatusCode,
    body: String,
    delay: Duration,
}

#[derive(Default)]
struct Routes {
    canned: Mutex<HashMap<String, Canned>>,
    requests: Mutex<Vec<Recorded>>,
}

/// Catalog service bound to a random localhost port.
pub struct CatalogServer {
    base_url: String,
    routes: Arc<Routes>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl CatalogServer {
    pub fn start() -> Self {
        let routes = Arc::new(Routes::default());
        let app = Router::new()
            .fallback(respond)
            .with_state(Arc::clone(&routes));
        let (addr_tx, addr_rx) = std::sync::mpsc::channel::<SocketAddr>();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        std::thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("catalog server runtime");
            runtime.block_on(async move {
                let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
                    .await
                    .expect("bind catalog server");
                let addr = listener.local_addr().expect("catalog server address");
                addr_tx.send(addr).expect("report catalog server address");
                axum::serve(listener, app)
                    .with_graceful_shutdown(async move {
                        shutdown_rx.await.ok();
                    })
                    .await
                    .expect("catalog server error");
            });
        });
        let addr = addr_rx.recv().expect("catalog server should start");
        Self {
            base_url: format!("http://{addr}{API_PREFIX}"),
            routes,
            shutdown: Some(shutdown_tx),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Answer `path` (relative to the API prefix) with `status` and `body`.
    pub fn respond(&self, path: &str, status: u16, body: impl Into<String>) {
        self.respond_after(path, status, body, Duration::ZERO);
    }

    /// Answer `path` with a JSON document.
    pub fn respond_json(&self, path: &str, body: &serde_json::Value) {
        self.respond(path, 200, body.to_string());
    }

    /// Answer `path` after waiting `delay`.
    pub fn respond_after(&self, path: &str, status: u16, body: impl Into<String>, delay: Duration) {
        let canned = Canned {
            status: StatusCode::from_u16(status).expect("valid status code"),
            body: body.into(),
            delay,
        };
        self.routes
            .canned
            .lock()
            .expect("routes lock")
            .insert(format!("{API_PREFIX}/{path}"), canned);
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.routes.requests.lock().expect("requests lock").clone()
    }
}

impl Drop for CatalogServer {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            shutdown.send(()).ok();
        }
    }
}

async fn respond(
    State(routes): State<Arc<Routes>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, [(header::HeaderName, &'static str); 1], String) {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);
    routes.requests.lock().expect("requests lock").push(Recorded {
        method,
        path: uri.path().to_owned(),
        query: uri.query().map(str::to_owned),
        authorization,
        body,
    });
    let canned = routes
        .canned
        .lock()
        .expect("routes lock")
        .get(uri.path())
        .cloned();
    let json = [(header::CONTENT_TYPE, "application/json")];
    match canned {
        Some(canned) => {
            if !canned.delay.is_zero() {
                tokio::time::sleep(canned.delay).await;
            }
            (canned.status, json, canned.body)
        }
        None => (StatusCode::NOT_FOUND, json, r#"{"error":"not found"}"#.to_owned()),
    }
}
