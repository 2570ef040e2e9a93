//! Shared fixtures for the integration tests: an in-process mock provider
//! built on axum, a renderer that needs no pdfium, and settings pointed at
//! the mock.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use pdf2md_queue::{
    AppSettings, PageRenderer, Pdf2MdError, ProgressHandle, RenderedPage, ServiceDraft,
    ServiceKind, SourceFile,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const MOCK_KEY: &str = "test-key";
pub const MOCK_MODEL: &str = "mock-vision";

// ── Mock provider ────────────────────────────────────────────────────────────

/// What the mock answers with.
#[derive(Debug, Clone)]
pub enum Reply {
    /// A 200 with this JSON body.
    Json(Value),
    /// A 200 `text/event-stream` with these `data:` payloads.
    Sse(Vec<String>),
    /// A bare status with a plain-text body.
    Status(u16, String),
}

/// Recorded state of the mock; handlers pop replies in order and fall back
/// to `default` once the script runs out.
pub struct MockProvider {
    script: Mutex<Vec<Reply>>,
    default: Reply,
    pub requests: Mutex<Vec<Value>>,
    pub auth_headers: Mutex<Vec<Option<String>>>,
    pub calls: AtomicUsize,
}

impl MockProvider {
    pub fn new(default: Reply) -> Arc<Self> {
        Self::scripted(Vec::new(), default)
    }

    pub fn scripted(script: Vec<Reply>, default: Reply) -> Arc<Self> {
        let mut script = script;
        script.reverse();
        Arc::new(Self {
            script: Mutex::new(script),
            default,
            requests: Mutex::new(Vec::new()),
            auth_headers: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<Value> {
        self.requests.lock().unwrap().last().cloned()
    }

    fn next_reply(&self) -> Reply {
        self.script
            .lock()
            .unwrap()
            .pop()
            .unwrap_or_else(|| self.default.clone())
    }

    fn record(&self, headers: &axum::http::HeaderMap, body: Value) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let auth = headers
            .get(header::AUTHORIZATION)
            .or_else(|| headers.get("x-goog-api-key"))
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        self.auth_headers.lock().unwrap().push(auth);
        self.requests.lock().unwrap().push(body);
    }
}

fn render_reply(reply: Reply) -> Response {
    match reply {
        Reply::Json(body) => (StatusCode::OK, Json(body)).into_response(),
        Reply::Sse(events) => {
            let body: String = events.iter().map(|e| format!("data: {e}\n\n")).collect();
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "text/event-stream")],
                body,
            )
                .into_response()
        }
        Reply::Status(code, text) => {
            let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, text).into_response()
        }
    }
}

async fn completion(
    State(mock): State<Arc<MockProvider>>,
    headers: axum::http::HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    mock.record(&headers, body);
    render_reply(mock.next_reply())
}

async fn openai_models(State(mock): State<Arc<MockProvider>>) -> Response {
    mock.calls.fetch_add(1, Ordering::SeqCst);
    Json(json!({
        "object": "list",
        "data": [{ "id": "gpt-4o" }, { "id": MOCK_MODEL }]
    }))
    .into_response()
}

async fn gemini_models(State(mock): State<Arc<MockProvider>>) -> Response {
    mock.calls.fetch_add(1, Ordering::SeqCst);
    Json(json!({
        "models": [
            { "name": "models/gemini-2.5-flash" },
            { "name": "models/gemini-2.5-pro" }
        ]
    }))
    .into_response()
}

/// Serve `mock` on an ephemeral port and return its base URL.
///
/// Routes:
/// - `POST /v1/chat/completions`, `GET /v1/models` (OpenAI format, base `…/v1`)
/// - `POST /v1beta/models/*`, `GET /v1beta/models` (Gemini format, bare base)
pub async fn serve(mock: Arc<MockProvider>) -> String {
    let app = Router::new()
        .route("/v1/chat/completions", post(completion))
        .route("/v1/models", get(openai_models))
        .route("/v1beta/models", get(gemini_models))
        .route("/v1beta/models/{*rest}", post(completion))
        .with_state(mock);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock provider");
    let addr = listener.local_addr().expect("mock provider address");
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    format!("http://{addr}")
}

/// Serve a `GET /v1/models` that only answers after `delay`.
pub async fn serve_slow(delay: std::time::Duration) -> String {
    async fn slow(State(delay): State<std::time::Duration>) -> &'static str {
        tokio::time::sleep(delay).await;
        "{}"
    }
    let app = Router::new()
        .route("/v1/models", get(slow))
        .with_state(delay);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind slow server");
    let addr = listener.local_addr().expect("slow server address");
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    format!("http://{addr}")
}

// ── Canned provider bodies ───────────────────────────────────────────────────

pub fn openai_completion(content: &str) -> Reply {
    Reply::Json(json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop"
        }]
    }))
}

/// SSE events that spell out `pieces`, then `[DONE]`.
pub fn openai_stream(pieces: &[&str]) -> Reply {
    let mut events: Vec<String> = pieces
        .iter()
        .map(|p| json!({ "choices": [{ "index": 0, "delta": { "content": p } }] }).to_string())
        .collect();
    events.push("[DONE]".to_string());
    Reply::Sse(events)
}

pub fn gemini_reply(text: &str) -> Reply {
    Reply::Json(json!({
        "candidates": [{
            "content": { "role": "model", "parts": [{ "text": text }] },
            "finishReason": "STOP"
        }]
    }))
}

// ── Renderer ─────────────────────────────────────────────────────────────────

/// Produces `pages` fake pages without touching pdfium.
pub struct FakeRenderer {
    pages: usize,
    fail_with: Option<fn() -> Pdf2MdError>,
    pub calls: AtomicUsize,
}

impl FakeRenderer {
    pub fn pages(pages: usize) -> Arc<Self> {
        Arc::new(Self {
            pages,
            fail_with: None,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing(error: fn() -> Pdf2MdError) -> Arc<Self> {
        Arc::new(Self {
            pages: 0,
            fail_with: Some(error),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageRenderer for FakeRenderer {
    async fn render(
        &self,
        _filename: &str,
        _pdf: Arc<[u8]>,
        progress: ProgressHandle,
    ) -> Result<Vec<RenderedPage>, Pdf2MdError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.fail_with {
            return Err(error());
        }
        let pages = (1..=self.pages)
            .map(|n| {
                progress.on_fraction(n, self.pages);
                RenderedPage {
                    page_num: n,
                    png_base64: format!("UEFHRS{n}"),
                    width: 1240,
                    height: 1754,
                }
            })
            .collect();
        Ok(pages)
    }
}

// ── Settings & inputs ────────────────────────────────────────────────────────

/// Settings whose active service is a custom entry at `base_url`.
pub fn settings_for(base_url: &str, kind: ServiceKind) -> AppSettings {
    let mut settings = AppSettings::default();
    let id = settings
        .add_custom_service(ServiceDraft {
            name: "Mock".into(),
            kind: Some(kind),
            base_url: base_url.into(),
            api_key: MOCK_KEY.into(),
            models: vec![MOCK_MODEL.into()],
            ..Default::default()
        })
        .expect("add mock service");
    settings.switch_active_service(&id).expect("activate mock service");
    settings
}

/// OpenAI-format settings against the mock, streaming off.
pub fn openai_settings(base_url: &str) -> AppSettings {
    let mut settings = settings_for(&format!("{base_url}/v1"), ServiceKind::OpenAi);
    settings.stream = false;
    settings
}

pub fn pdf(name: &str) -> SourceFile {
    SourceFile::from_bytes(name, b"%PDF-1.7\n%fake\n".to_vec())
}

/// A progress sink that remembers every value it is given.
pub fn recording_sink() -> (ProgressHandle, Arc<Mutex<Vec<u8>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink_seen = Arc::clone(&seen);
    let sink: ProgressHandle = Arc::new(move |pct: u8| sink_seen.lock().unwrap().push(pct));
    (sink, seen)
}
