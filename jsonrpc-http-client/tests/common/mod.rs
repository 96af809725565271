//! Shared helpers for end-to-end tests against a local axum server.

#![allow(dead_code)]

use std::io::Write;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use flate2::Compression;
use flate2::write::GzEncoder;
use http::{HeaderMap, StatusCode, Uri, header};
use jsonrpc_http_client::{LogTracer, Span, TraceContext, Tracer};
use serde_json::{Value, json};
use tokio::net::TcpListener;

/// One request as the server saw it.
#[derive(Clone, Debug)]
pub struct Captured {
    pub path: String,
    pub headers: HeaderMap,
    pub body: Value,
}

#[derive(Clone, Default)]
pub struct Recorder(Arc<Mutex<Vec<Captured>>>);

impl Recorder {
    pub fn requests(&self) -> Vec<Captured> {
        self.0.lock().unwrap().clone()
    }

    pub fn last(&self) -> Captured {
        self.requests().pop().expect("no request captured")
    }

    fn push(&self, captured: Captured) {
        self.0.lock().unwrap().push(captured);
    }
}

/// Bind an ephemeral loopback port and serve `router` on it.
pub async fn serve(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// A server that records every request and answers with `respond(path, request)`.
pub async fn scripted<F>(respond: F) -> (SocketAddr, Recorder)
where
    F: Fn(&str, &Value) -> Response + Clone + Send + Sync + 'static,
{
    let recorder = Recorder::default();
    let captured = recorder.clone();
    let router = Router::new().fallback(move |uri: Uri, headers: HeaderMap, body: Bytes| {
        let recorder = captured.clone();
        let respond = respond.clone();
        async move {
            let request: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
            let response = respond(uri.path(), &request);
            recorder.push(Captured {
                path: uri.path().to_string(),
                headers,
                body: request,
            });
            response
        }
    });
    (serve(router).await, recorder)
}

/// A server that answers `add` with the sum of `a` and `b`.
pub async fn calculator() -> (SocketAddr, Recorder) {
    scripted(|_, request| json_rpc(StatusCode::OK, add_result(request))).await
}

pub fn add_result(request: &Value) -> Value {
    let a = request["params"]["a"].as_i64().unwrap_or_default();
    let b = request["params"]["b"].as_i64().unwrap_or_default();
    json!({"jsonrpc": "2.0", "id": request["id"], "result": a + b})
}

pub fn json_rpc(status: StatusCode, body: Value) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, "application/json-rpc")],
        body.to_string(),
    )
        .into_response()
}

pub fn raw(status: StatusCode, body: &'static [u8]) -> Response {
    (status, body).into_response()
}

pub fn gzipped(status: StatusCode, body: &[u8]) -> Response {
    (status, [(header::CONTENT_ENCODING, "gzip")], gzip(body)).into_response()
}

pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// A tracer that keeps every closed span.
#[derive(Clone, Default)]
pub struct RecordingTracer {
    inner: LogTracer,
    closed: Arc<Mutex<Vec<Span>>>,
}

impl RecordingTracer {
    pub fn with_process_id(process_id: &str) -> Self {
        Self {
            inner: LogTracer::new().process_id(process_id),
            closed: Arc::default(),
        }
    }

    pub fn closed(&self) -> Vec<Span> {
        self.closed.lock().unwrap().clone()
    }
}

impl Tracer for RecordingTracer {
    fn start_span(&self, name: &str, parent: Option<&TraceContext>) -> Span {
        self.inner.start_span(name, parent)
    }

    fn close_span(&self, span: Span) {
        self.closed.lock().unwrap().push(span);
    }
}

/// Route client logs to the test output. Safe to call from every test.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing_subscriber::filter::LevelFilter::DEBUG)
        .with_test_writer()
        .try_init();
}

pub fn url(addr: SocketAddr, path: &str) -> String {
    format!("http://{addr}{path}")
}
