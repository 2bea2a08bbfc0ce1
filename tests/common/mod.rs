//! Shared helpers for integration tests: a fake GEOGLOWS API and an
//! in-process registry connection.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::{header, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use rmcp::ServiceExt;
use serde_json::Value;
use tokio::task::JoinHandle;

use geoglows_mcp::client::GeoglowsClient;
use geoglows_mcp::config::Config;
use geoglows_mcp::service::Geoglows;
use geoglows_mcp::transport::RegistrySession;

/// What the fake upstream answers to every request.
#[derive(Clone)]
pub enum Reply {
    Json(Value),
    Status(u16),
    Body(&'static str),
    Slow(Duration, Value),
}

/// A request the fake upstream received.
#[derive(Debug, Clone)]
pub struct Hit {
    pub path: String,
    pub query: String,
}

impl Hit {
    pub fn param(&self, name: &str) -> Option<String> {
        self.query.split('&').find_map(|pair| {
            let (k, v) = pair.split_once('=')?;
            (k == name).then(|| v.to_string())
        })
    }
}

#[derive(Clone)]
struct Shared {
    reply: Reply,
    hits: Arc<Mutex<Vec<Hit>>>,
}

pub struct FakeUpstream {
    pub base_url: String,
    hits: Arc<Mutex<Vec<Hit>>>,
}

async fn handle(State(shared): State<Shared>, uri: Uri) -> Response {
    shared.hits.lock().unwrap().push(Hit {
        path: uri.path().to_string(),
        query: uri.query().unwrap_or_default().to_string(),
    });

    match shared.reply {
        Reply::Json(body) => json_response(&body),
        Reply::Status(code) => StatusCode::from_u16(code).unwrap().into_response(),
        Reply::Body(body) => {
            (StatusCode::OK, [(header::CONTENT_TYPE, "application/json")], body).into_response()
        }
        Reply::Slow(delay, body) => {
            tokio::time::sleep(delay).await;
            json_response(&body)
        }
    }
}

fn json_response(body: &Value) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
        .into_response()
}

impl FakeUpstream {
    pub async fn start(reply: Reply) -> Self {
        let hits = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new().fallback(handle).with_state(Shared {
            reply,
            hits: hits.clone(),
        });

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            hits,
        }
    }

    pub fn hits(&self) -> Vec<Hit> {
        self.hits.lock().unwrap().clone()
    }

    pub fn config(&self) -> Config {
        Config::default().with_api_base(&self.base_url)
    }

    pub fn client(&self) -> GeoglowsClient {
        GeoglowsClient::new(&self.config()).unwrap()
    }
}

/// Connects a registry session to an in-process server over a duplex pipe.
///
/// Aborting the returned handle kills the server side of the channel.
pub async fn connect(upstream: &FakeUpstream) -> (RegistrySession, JoinHandle<()>) {
    let (server_io, client_io) = tokio::io::duplex(64 * 1024);
    let server = Geoglows::new(upstream.client());

    let handle = tokio::spawn(async move {
        if let Ok(running) = server.serve(server_io).await {
            let _ = running.waiting().await;
        }
    });

    let client = ().serve(client_io).await.unwrap();
    (RegistrySession::from_service(client), handle)
}
