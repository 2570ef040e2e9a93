//! Google Gemini `generateContent` adapter.
//!
//! Gemini is called without streaming, so while the request is in flight the
//! adapter emits small randomised progress steps from [`PROGRESS_SENT`]
//! towards [`SYNTHETIC_CEILING`]. The ticker stops the moment the exchange
//! resolves, whether it succeeded or not.

use super::{
    http_status_error, malformed, split_data_url, transport_error, ContentPart, ProviderRequest,
    PROGRESS_PARSED, PROGRESS_SENT,
};
use crate::error::Pdf2MdError;
use crate::progress::ProgressHandle;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::future::Future;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

pub const PROVIDER: &str = "Gemini";

/// Synthetic progress never passes this value.
pub const SYNTHETIC_CEILING: u8 = 90;

// ── Wire types ───────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GenerateContentRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent<'a> {
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum GeminiPart<'a> {
    Text {
        text: Cow<'a, str>,
    },
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData<'a>,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData<'a> {
    mime_type: Cow<'a, str>,
    data: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

/// Build the request body. The system prompt is sent as the first text part
/// of the single user turn.
pub(crate) fn build_request_body<'a>(request: &ProviderRequest<'a>) -> GenerateContentRequest<'a> {
    let mut parts = Vec::with_capacity(request.parts.len() + 1);
    parts.push(GeminiPart::Text {
        text: Cow::Owned(format!("{}\n\n", request.system_prompt)),
    });

    for part in request.parts {
        match part {
            ContentPart::Text { text } => parts.push(GeminiPart::Text {
                text: Cow::Borrowed(text),
            }),
            ContentPart::Image { mime_type, data, .. } => {
                let inline = if data.starts_with("data:") {
                    match split_data_url(data) {
                        Some((mime, payload)) => InlineData {
                            mime_type: Cow::Borrowed(mime),
                            data: payload,
                        },
                        None => {
                            warn!("Dropping image part with malformed data URL");
                            continue;
                        }
                    }
                } else {
                    InlineData {
                        mime_type: Cow::Borrowed(mime_type.as_str()),
                        data,
                    }
                };
                parts.push(GeminiPart::Inline { inline_data: inline });
            }
        }
    }

    GenerateContentRequest {
        contents: vec![GeminiContent { parts }],
        generation_config: GenerationConfig {
            temperature: request.settings.temperature,
            max_output_tokens: request.settings.output_length,
        },
    }
}

/// Concatenate the non-empty text parts of the first candidate.
pub(crate) fn parse_response(body: &str) -> Result<String, Pdf2MdError> {
    let texts: Vec<String> = serde_json::from_str::<GenerateContentResponse>(body)
        .ok()
        .and_then(|r| r.candidates.into_iter().next())
        .and_then(|c| c.content)
        .map(|c| {
            c.parts
                .into_iter()
                .filter_map(|p| p.text)
                .filter(|t| !t.is_empty())
                .collect()
        })
        .unwrap_or_default();

    if texts.is_empty() {
        return Err(malformed(PROVIDER));
    }
    Ok(texts.concat())
}

/// Drive `exchange` to completion, emitting synthetic progress every `tick`.
pub(crate) async fn with_synthetic_progress<F: Future>(
    exchange: F,
    progress: &ProgressHandle,
    tick: Duration,
) -> F::Output {
    tokio::pin!(exchange);
    let mut ticker = tokio::time::interval(tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // First tick completes immediately.
    ticker.tick().await;

    let mut current = PROGRESS_SENT;
    loop {
        tokio::select! {
            out = &mut exchange => return out,
            _ = ticker.tick() => {
                let step = 1 + rand::random::<u8>() % 5;
                current = current.saturating_add(step).min(SYNTHETIC_CEILING);
                progress.on_progress(current);
            }
        }
    }
}

// ── Adapter ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct GeminiAdapter {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    tick: Duration,
}

impl GeminiAdapter {
    pub fn new(client: reqwest::Client, base_url: &str, api_key: &str, tick: Duration) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            tick: tick.max(Duration::from_millis(1)),
        }
    }

    pub fn endpoint(&self, model: &str) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, model)
    }

    pub(crate) async fn call(
        &self,
        request: &ProviderRequest<'_>,
        progress: &ProgressHandle,
    ) -> Result<String, Pdf2MdError> {
        let body = build_request_body(request);
        let url = self.endpoint(&request.settings.model);
        debug!("POST {} parts={}", url, request.parts.len());

        let exchange = async {
            let response = self
                .client
                .post(&url)
                .header("x-goog-api-key", &self.api_key)
                .json(&body)
                .send()
                .await?;
            let status = response.status();
            let text = response.text().await?;
            Ok::<_, reqwest::Error>((status, text))
        };

        progress.on_progress(PROGRESS_SENT);
        let (status, text) = with_synthetic_progress(exchange, progress, self.tick)
            .await
            .map_err(|e| transport_error(PROVIDER, e, None))?;

        if !status.is_success() {
            return Err(http_status_error(PROVIDER, status, text));
        }

        let markdown = parse_response(&text)?;
        progress.on_progress(PROGRESS_PARSED);
        Ok(markdown)
    }
}
