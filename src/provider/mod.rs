//! Provider adapter: one call to a vision LLM, normalised.
//!
//! Callers build a [`ProviderRequest`] (system prompt, ordered content parts,
//! generation settings) and hand it to a [`ProviderAdapter`] picked from the
//! active service's [`ServiceKind`]. Two wire formats are spoken:
//!
//! * [`openai`] — `POST {base}/chat/completions`, either a single JSON reply
//!   or a server-sent-event stream of deltas;
//! * [`gemini`] — `POST {base}/v1beta/models/{model}:generateContent`.
//!
//! Whatever the format, the adapter reports progress through the same
//! milestones: [`PROGRESS_START`] before the request is built,
//! [`PROGRESS_SENT`] once it is on the wire, [`PROGRESS_PARSED`] when the
//! reply has been decoded and 100 on success. Streaming replies fill the
//! 30–95 band from the received character count; Gemini replies fill it
//! with small synthetic steps while the request is in flight.
//!
//! No retries and no timeouts are applied here: a failure is returned once
//! and the queue turns it into a job error.

pub mod gemini;
pub mod openai;
pub mod connection;
pub mod sse;

use crate::config::PipelineConfig;
use crate::error::Pdf2MdError;
use crate::progress::ProgressHandle;
use crate::services::{LlmService, ServiceKind};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{info, warn};

pub use gemini::GeminiAdapter;
pub use openai::OpenAiAdapter;
pub use connection::{test_connection, ConnectionReport};

pub const PROGRESS_START: u8 = 10;
pub const PROGRESS_SENT: u8 = 30;
pub const PROGRESS_RECEIVED: u8 = 80;
pub const PROGRESS_PARSED: u8 = 95;

/// One element of the user turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContentPart {
    Text {
        text: String,
    },
    /// `data` is either bare base64 or a complete `data:` URL.
    Image {
        mime_type: String,
        data: String,
        detail: String,
    },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text { text: text.into() }
    }

    /// A base64 PNG page image at high detail.
    pub fn png(base64: impl Into<String>) -> Self {
        ContentPart::Image {
            mime_type: "image/png".to_string(),
            data: base64.into(),
            detail: "high".to_string(),
        }
    }

    /// The image as a `data:` URL; `None` for text parts.
    pub fn data_url(&self) -> Option<String> {
        match self {
            ContentPart::Text { .. } => None,
            ContentPart::Image { mime_type, data, .. } => Some(if data.starts_with("data:") {
                data.clone()
            } else {
                format!("data:{mime_type};base64,{data}")
            }),
        }
    }
}

/// Split `data:<mime>;base64,<payload>` into its mime type and payload.
pub fn split_data_url(url: &str) -> Option<(&str, &str)> {
    let rest = url.strip_prefix("data:")?;
    let (header, payload) = rest.split_once(',')?;
    let mime = header.strip_suffix(";base64").unwrap_or(header);
    Some((mime, payload))
}

/// Model parameters for one call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationSettings {
    pub model: String,
    pub temperature: f32,
    /// Maximum output tokens; also the denominator for streaming progress.
    pub output_length: u32,
    pub stream: bool,
}

/// A complete provider call.
#[derive(Debug, Clone, Copy)]
pub struct ProviderRequest<'a> {
    pub system_prompt: &'a str,
    pub parts: &'a [ContentPart],
    pub settings: &'a GenerationSettings,
}

/// Adapter selected from a service's wire format.
#[derive(Debug, Clone)]
pub enum ProviderAdapter {
    OpenAi(OpenAiAdapter),
    Gemini(GeminiAdapter),
}

impl ProviderAdapter {
    /// Build the adapter for `service`. Custom services speak OpenAI format.
    pub fn for_service(
        client: reqwest::Client,
        service: &LlmService,
        config: &PipelineConfig,
    ) -> Self {
        match service.kind {
            ServiceKind::Gemini => ProviderAdapter::Gemini(GeminiAdapter::new(
                client,
                service.endpoint_base(),
                &service.api_key,
                Duration::from_millis(config.progress_tick_ms),
            )),
            ServiceKind::OpenAi | ServiceKind::Custom => ProviderAdapter::OpenAi(OpenAiAdapter::new(
                client,
                service.endpoint_base(),
                &service.api_key,
            )),
        }
    }

    /// Human-readable provider name used in error messages.
    pub fn name(&self) -> &'static str {
        match self {
            ProviderAdapter::OpenAi(_) => openai::PROVIDER,
            ProviderAdapter::Gemini(_) => gemini::PROVIDER,
        }
    }

    /// Send `request` and return the raw text of the model's reply.
    pub async fn call(
        &self,
        request: &ProviderRequest<'_>,
        progress: ProgressHandle,
    ) -> Result<String, Pdf2MdError> {
        let start = Instant::now();
        progress.on_progress(PROGRESS_START);

        let result = match self {
            ProviderAdapter::OpenAi(adapter) => adapter.call(request, &progress).await,
            ProviderAdapter::Gemini(adapter) => adapter.call(request, &progress).await,
        };

        match &result {
            Ok(text) => {
                progress.on_progress(100);
                info!(
                    "{} call done: model={} chars={} {}ms",
                    self.name(),
                    request.settings.model,
                    text.chars().count(),
                    start.elapsed().as_millis()
                );
            }
            Err(e) => warn!(
                "{} call failed after {}ms: {}",
                self.name(),
                start.elapsed().as_millis(),
                e
            ),
        }
        result
    }
}

pub(crate) fn transport_error(
    provider: &str,
    e: reqwest::Error,
    timeout: Option<Duration>,
) -> Pdf2MdError {
    match timeout {
        Some(limit) if e.is_timeout() => Pdf2MdError::Timeout { secs: limit.as_secs() },
        _ => Pdf2MdError::Transport {
            provider: provider.to_string(),
            detail: e.to_string(),
        },
    }
}

pub(crate) fn http_status_error(provider: &str, status: StatusCode, body: String) -> Pdf2MdError {
    Pdf2MdError::HttpStatus {
        provider: provider.to_string(),
        status: status.as_u16(),
        status_text: status.canonical_reason().unwrap_or("").to_string(),
        body,
    }
}

/// Read the body of a failed response into an [`Pdf2MdError::HttpStatus`].
pub(crate) async fn read_failure(provider: &str, response: reqwest::Response) -> Pdf2MdError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    http_status_error(provider, status, body)
}

pub(crate) fn malformed(provider: &str) -> Pdf2MdError {
    Pdf2MdError::MalformedResponse {
        provider: provider.to_string(),
    }
}
