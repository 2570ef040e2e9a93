//! Manual connectivity check: list a service's models within a timeout.

use super::{http_status_error, transport_error};
use crate::error::Pdf2MdError;
use crate::services::{LlmService, ServiceKind};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Outcome of [`test_connection`].
#[derive(Debug)]
pub struct ConnectionReport {
    pub latency_ms: u64,
    /// Model ids on success.
    pub outcome: Result<Vec<String>, Pdf2MdError>,
}

impl ConnectionReport {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn models(&self) -> &[String] {
        match &self.outcome {
            Ok(models) => models,
            Err(_) => &[],
        }
    }

    pub fn error(&self) -> Option<&Pdf2MdError> {
        self.outcome.as_ref().err()
    }
}

#[derive(Debug, Deserialize)]
struct OpenAiModels {
    #[serde(default)]
    data: Vec<OpenAiModel>,
}

#[derive(Debug, Deserialize)]
struct OpenAiModel {
    id: String,
}

#[derive(Debug, Deserialize)]
struct GeminiModels {
    #[serde(default)]
    models: Vec<GeminiModel>,
}

#[derive(Debug, Deserialize)]
struct GeminiModel {
    name: String,
}

/// Test `service` by listing its models. Never panics; every failure is
/// reported in [`ConnectionReport::outcome`].
pub async fn test_connection(
    client: &reqwest::Client,
    service: &LlmService,
    timeout: Duration,
) -> ConnectionReport {
    let start = Instant::now();
    let outcome = list_models(client, service, timeout).await;
    let latency_ms = start.elapsed().as_millis() as u64;

    match &outcome {
        Ok(models) => info!(
            "{} reachable in {}ms ({} models)",
            service.id,
            latency_ms,
            models.len()
        ),
        Err(e) => info!("{} connection test failed in {}ms: {}", service.id, latency_ms, e),
    }
    ConnectionReport { latency_ms, outcome }
}

async fn list_models(
    client: &reqwest::Client,
    service: &LlmService,
    timeout: Duration,
) -> Result<Vec<String>, Pdf2MdError> {
    let provider = service.name.as_str();
    let base = service.endpoint_base();

    let request = match service.kind {
        ServiceKind::Gemini => client
            .get(format!("{base}/v1beta/models"))
            .header("x-goog-api-key", &service.api_key),
        ServiceKind::OpenAi | ServiceKind::Custom => {
            let request = client.get(format!("{base}/models"));
            if service.has_credential() {
                request.bearer_auth(&service.api_key)
            } else {
                request
            }
        }
    };
    debug!("Probing {}", service.id);

    let response = request
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| transport_error(provider, e, Some(timeout)))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| transport_error(provider, e, Some(timeout)))?;
    if !status.is_success() {
        return Err(http_status_error(provider, status, body));
    }

    parse_models(service.kind, &body).ok_or_else(|| Pdf2MdError::MalformedResponse {
        provider: provider.to_string(),
    })
}

fn parse_models(kind: ServiceKind, body: &str) -> Option<Vec<String>> {
    match kind {
        ServiceKind::Gemini => serde_json::from_str::<GeminiModels>(body).ok().map(|list| {
            list.models
                .into_iter()
                .map(|m| m.name.strip_prefix("models/").unwrap_or(&m.name).to_string())
                .collect()
        }),
        ServiceKind::OpenAi | ServiceKind::Custom => serde_json::from_str::<OpenAiModels>(body)
            .ok()
            .map(|list| list.data.into_iter().map(|m| m.id).collect()),
    }
}
