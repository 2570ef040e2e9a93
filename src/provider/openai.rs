//! OpenAI chat-completions adapter (also used by OpenRouter and custom
//! OpenAI-compatible endpoints).

use super::sse::{SseDecoder, DONE};
use super::{
    malformed, read_failure, transport_error, ContentPart, ProviderRequest, PROGRESS_PARSED,
    PROGRESS_RECEIVED, PROGRESS_SENT,
};
use crate::error::Pdf2MdError;
use crate::progress::ProgressHandle;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const PROVIDER: &str = "OpenAI-compatible";

// ── Wire types ───────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub(crate) struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
enum Message<'a> {
    System { content: &'a str },
    User { content: Vec<UserPart<'a>> },
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum UserPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl<'a> },
}

#[derive(Debug, Serialize)]
struct ImageUrl<'a> {
    url: String,
    detail: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: Option<Delta>,
}

#[derive(Debug, Deserialize)]
struct Delta {
    content: Option<String>,
}

pub(crate) fn build_request_body<'a>(request: &ProviderRequest<'a>) -> ChatRequest<'a> {
    let content = request
        .parts
        .iter()
        .map(|part| match part {
            ContentPart::Text { text } => UserPart::Text { text },
            ContentPart::Image { detail, .. } => UserPart::ImageUrl {
                image_url: ImageUrl {
                    url: part.data_url().unwrap_or_default(),
                    detail,
                },
            },
        })
        .collect();

    ChatRequest {
        model: &request.settings.model,
        messages: vec![
            Message::System {
                content: request.system_prompt,
            },
            Message::User { content },
        ],
        temperature: request.settings.temperature,
        max_tokens: request.settings.output_length,
        stream: request.settings.stream,
    }
}

/// Extract `choices[0].message.content` from a complete reply body.
pub(crate) fn parse_completion(body: &str) -> Result<String, Pdf2MdError> {
    serde_json::from_str::<ChatCompletion>(body)
        .ok()
        .and_then(|c| c.choices.into_iter().next())
        .and_then(|c| c.message)
        .and_then(|m| m.content)
        .ok_or_else(|| malformed(PROVIDER))
}

/// Accumulates streamed deltas and estimates progress from their length.
#[derive(Debug)]
pub(crate) struct StreamAccumulator {
    text: String,
    chars: u64,
    budget: u64,
    saw_delta: bool,
}

impl StreamAccumulator {
    pub(crate) fn new(output_length: u32) -> Self {
        Self {
            text: String::new(),
            chars: 0,
            budget: u64::from(output_length.max(1)),
            saw_delta: false,
        }
    }

    /// Consume one `data:` payload; returns a progress estimate when text
    /// was appended.
    pub(crate) fn accept(&mut self, payload: &str) -> Option<u8> {
        let payload = payload.trim();
        if payload.is_empty() || payload == DONE {
            return None;
        }
        let chunk: StreamChunk = match serde_json::from_str(payload) {
            Ok(chunk) => chunk,
            Err(e) => {
                debug!("Skipping unparseable stream event: {}", e);
                return None;
            }
        };
        let delta = chunk
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.delta)
            .and_then(|d| d.content)?;

        self.saw_delta = true;
        self.chars += delta.chars().count() as u64;
        self.text.push_str(&delta);

        let band = u64::from(PROGRESS_PARSED - PROGRESS_SENT);
        let step = (self.chars * band / self.budget).min(band);
        Some(PROGRESS_SENT + step as u8)
    }

    pub(crate) fn finish(self) -> Result<String, Pdf2MdError> {
        if self.saw_delta {
            Ok(self.text)
        } else {
            Err(malformed(PROVIDER))
        }
    }
}

// ── Adapter ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct OpenAiAdapter {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OpenAiAdapter {
    pub fn new(client: reqwest::Client, base_url: &str, api_key: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    pub(crate) async fn call(
        &self,
        request: &ProviderRequest<'_>,
        progress: &ProgressHandle,
    ) -> Result<String, Pdf2MdError> {
        let body = build_request_body(request);
        let mut http = self.client.post(self.endpoint()).json(&body);
        if !self.api_key.is_empty() {
            http = http.bearer_auth(&self.api_key);
        }

        debug!(
            "POST {} model={} parts={} stream={}",
            self.endpoint(),
            request.settings.model,
            request.parts.len(),
            request.settings.stream
        );
        progress.on_progress(PROGRESS_SENT);
        let response = http
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, e, None))?;

        if !response.status().is_success() {
            return Err(read_failure(PROVIDER, response).await);
        }

        if request.settings.stream {
            return read_stream(response, request.settings.output_length, progress).await;
        }

        let text = response
            .text()
            .await
            .map_err(|e| transport_error(PROVIDER, e, None))?;
        progress.on_progress(PROGRESS_RECEIVED);
        let content = parse_completion(&text)?;
        progress.on_progress(PROGRESS_PARSED);
        Ok(content)
    }
}

async fn read_stream(
    response: reqwest::Response,
    output_length: u32,
    progress: &ProgressHandle,
) -> Result<String, Pdf2MdError> {
    let mut decoder = SseDecoder::new();
    let mut acc = StreamAccumulator::new(output_length);
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| transport_error(PROVIDER, e, None))?;
        for payload in decoder.push(&chunk) {
            if let Some(pct) = acc.accept(&payload) {
                progress.on_progress(pct);
            }
        }
    }
    if let Some(payload) = decoder.finish() {
        if let Some(pct) = acc.accept(&payload) {
            progress.on_progress(pct);
        }
    }

    let text = acc.finish()?;
    progress.on_progress(PROGRESS_PARSED);
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::GenerationSettings;
    use serde_json::json;

    fn settings(stream: bool) -> GenerationSettings {
        GenerationSettings {
            model: "gpt-4o".into(),
            temperature: 0.5,
            output_length: 100,
            stream,
        }
    }

    #[test]
    fn request_body_shape() {
        let parts = vec![ContentPart::text("Pages follow"), ContentPart::png("AAAA")];
        let gen = settings(true);
        let req = ProviderRequest {
            system_prompt: "SYS",
            parts: &parts,
            settings: &gen,
        };
        let value = serde_json::to_value(build_request_body(&req)).unwrap();
        assert_eq!(
            value,
            json!({
                "model": "gpt-4o",
                "messages": [
                    { "role": "system", "content": "SYS" },
                    { "role": "user", "content": [
                        { "type": "text", "text": "Pages follow" },
                        { "type": "image_url", "image_url": {
                            "url": "data:image/png;base64,AAAA", "detail": "high"
                        }}
                    ]}
                ],
                "temperature": 0.5,
                "max_tokens": 100,
                "stream": true
            })
        );
    }

    #[test]
    fn parse_completion_reads_first_choice() {
        let body = r##"{"choices":[{"message":{"role":"assistant","content":"# Hi"}}]}"##;
        assert_eq!(parse_completion(body).unwrap(), "# Hi");
    }

    #[test]
    fn parse_completion_rejects_missing_content() {
        for body in [
            r#"{"choices":[]}"#,
            r#"{"id":"x"}"#,
            "not json",
            r#"{"choices":[{"message":{}}]}"#,
        ] {
            assert!(
                matches!(parse_completion(body), Err(Pdf2MdError::MalformedResponse { .. })),
                "{body}"
            );
        }
    }

    #[test]
    fn accumulator_joins_deltas_and_caps_progress() {
        let mut acc = StreamAccumulator::new(10);
        let ev = |s: &str| json!({"choices":[{"delta":{"content": s}}]}).to_string();

        // 5 of 10 chars: 30 + 32
        assert_eq!(acc.accept(&ev("# Hel")), Some(62));
        assert_eq!(acc.accept(r#"{"choices":[{"delta":{}}]}"#), None);
        assert_eq!(acc.accept("garbage"), None);
        assert_eq!(acc.accept(&ev("lo world, long tail")), Some(95));
        assert_eq!(acc.accept(DONE), None);
        assert_eq!(acc.finish().unwrap(), "# Hello world, long tail");
    }

    #[test]
    fn stream_without_deltas_is_malformed() {
        let mut acc = StreamAccumulator::new(10);
        acc.accept(DONE);
        assert!(matches!(acc.finish(), Err(Pdf2MdError::MalformedResponse { .. })));
    }
}
