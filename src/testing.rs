//! In-process stand-in for the remote providers, used by unit tests.

use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use parking_lot::Mutex;
use serde_json::Value;
use std::{collections::HashMap, sync::Arc, time::Duration};

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub path: String,
    pub authorization: Option<String>,
    pub body: Value,
}

#[derive(Clone)]
struct Canned {
    status: StatusCode,
    content_type: &'static str,
    body: Bytes,
    delay: Option<Duration>,
}

#[derive(Clone, Default)]
struct Shared {
    routes: Arc<HashMap<String, Canned>>,
    log: Arc<Mutex<Vec<RecordedRequest>>>,
}

#[derive(Default)]
pub struct UpstreamBuilder {
    routes: HashMap<String, Canned>,
}

impl UpstreamBuilder {
    pub fn respond(self, path: &str, status: StatusCode, body: Value) -> Self {
        self.canned(path, status, "application/json", Bytes::from(body.to_string()))
    }

    pub fn respond_raw(self, path: &str, status: StatusCode, body: &str) -> Self {
        self.canned(path, status, "text/plain", Bytes::from(body.to_string()))
    }

    pub fn respond_bytes(
        self,
        path: &str,
        content_type: &'static str,
        body: &'static [u8],
    ) -> Self {
        self.canned(path, StatusCode::OK, content_type, Bytes::from_static(body))
    }

    pub fn delay(mut self, path: &str, delay: Duration) -> Self {
        if let Some(route) = self.routes.get_mut(path) {
            route.delay = Some(delay);
        }
        self
    }

    fn canned(
        mut self,
        path: &str,
        status: StatusCode,
        content_type: &'static str,
        body: Bytes,
    ) -> Self {
        self.routes.insert(
            path.to_string(),
            Canned {
                status,
                content_type,
                body,
                delay: None,
            },
        );
        self
    }

    pub async fn spawn(self) -> Upstream {
        let shared = Shared {
            routes: Arc::new(self.routes),
            log: Arc::default(),
        };
        let app = Router::new().fallback(handle).with_state(shared.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind upstream");
        let addr = listener.local_addr().expect("upstream addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Upstream {
            base: format!("http://{addr}"),
            log: shared.log,
        }
    }
}

pub struct Upstream {
    base: String,
    log: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl Upstream {
    pub fn start() -> UpstreamBuilder {
        UpstreamBuilder::default()
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    pub fn hits(&self, path: &str) -> usize {
        self.log.lock().iter().filter(|r| r.path == path).count()
    }

    pub fn last_request(&self, path: &str) -> Option<RecordedRequest> {
        self.log
            .lock()
            .iter()
            .rev()
            .find(|r| r.path == path)
            .cloned()
    }
}

async fn handle(
    State(shared): State<Shared>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = uri.path().to_string();
    shared.log.lock().push(RecordedRequest {
        path: path.clone(),
        authorization: headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body: serde_json::from_slice(&body).unwrap_or(Value::Null),
    });

    let Some(route) = shared.routes.get(&path).cloned() else {
        return StatusCode::NOT_FOUND.into_response();
    };
    if let Some(delay) = route.delay {
        tokio::time::sleep(delay).await;
    }
    (
        route.status,
        [(header::CONTENT_TYPE, route.content_type)],
        route.body,
    )
        .into_response()
}

/// URL on a port nothing listens on.
pub async fn closed_port_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind probe");
    let addr = listener.local_addr().expect("probe addr");
    drop(listener);
    format!("http://{addr}/closed")
}
