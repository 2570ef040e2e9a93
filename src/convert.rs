//! Conversion pipeline: one PDF in, one Markdown document out.
//!
//! ## Steps and progress bands
//!
//! | Step                         | Progress |
//! |------------------------------|----------|
//! | resolve service + credential | –        |
//! | load bytes                   | –        |
//! | render every page            | 0–40     |
//! | build content parts          | –        |
//! | provider call                | 40–100   |
//! | extract Markdown             | –        |
//!
//! The service and its credential are checked before anything is rendered,
//! so a missing API key fails in milliseconds instead of after a long
//! rasterisation. The whole document goes to the model in a single call:
//! page-level context (running headers, tables that span pages) is only
//! visible to a model that sees every page at once.

use crate::config::PipelineConfig;
use crate::error::Pdf2MdError;
use crate::pipeline::content::build_content_parts;
use crate::pipeline::input;
use crate::pipeline::postprocess::extract_markdown;
use crate::pipeline::render::{PageRenderer, PdfiumRenderer};
use crate::progress::{banded, monotonic, noop, ProgressHandle};
use crate::provider::{ConnectionReport, ProviderAdapter, ProviderRequest};
use crate::queue::SourceFile;
use crate::services::LlmService;
use crate::settings::AppSettings;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Anything that can turn a source file into Markdown. The queue depends on
/// this trait, not on the concrete pipeline.
#[async_trait]
pub trait Converter: Send + Sync {
    async fn convert(
        &self,
        file: &SourceFile,
        settings: &AppSettings,
        progress: ProgressHandle,
    ) -> Result<String, Pdf2MdError>;
}

/// The active service, provided it exists and has a credential.
pub fn resolve_service(settings: &AppSettings) -> Result<&LlmService, Pdf2MdError> {
    let service = settings.active_service().ok_or(Pdf2MdError::NoActiveService)?;
    if !service.has_credential() {
        return Err(Pdf2MdError::MissingCredential {
            service: service.id.clone(),
        });
    }
    Ok(service)
}

/// Render → provider → extract.
#[derive(Clone)]
pub struct ConversionPipeline {
    client: reqwest::Client,
    renderer: Arc<dyn PageRenderer>,
    config: PipelineConfig,
}

impl ConversionPipeline {
    /// Pipeline using pdfium at `config.render_scale`.
    pub fn new(config: PipelineConfig) -> Self {
        let renderer = Arc::new(PdfiumRenderer::new(config.render_scale));
        Self::with_renderer(config, renderer)
    }

    pub fn with_renderer(config: PipelineConfig, renderer: Arc<dyn PageRenderer>) -> Self {
        Self {
            client: reqwest::Client::new(),
            renderer,
            config,
        }
    }

    /// Replace the HTTP client (proxies, custom TLS roots).
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// List `service`'s models with this pipeline's client, bounded by
    /// [`PipelineConfig::connection_timeout`].
    pub async fn test_connection(&self, service: &LlmService) -> ConnectionReport {
        crate::provider::test_connection(&self.client, service, self.config.connection_timeout())
            .await
    }
}

impl Default for ConversionPipeline {
    fn default() -> Self {
        Self::new(PipelineConfig::default())
    }
}

#[async_trait]
impl Converter for ConversionPipeline {
    async fn convert(
        &self,
        file: &SourceFile,
        settings: &AppSettings,
        progress: ProgressHandle,
    ) -> Result<String, Pdf2MdError> {
        let total_start = Instant::now();
        let progress = monotonic(progress);

        // ── Step 1: Resolve service ──────────────────────────────────────
        let service = resolve_service(settings)?;
        let generation = settings.generation_settings(service);
        info!(
            "Converting {} ({} bytes) with {} / {}",
            file.name, file.size, service.id, generation.model
        );

        // ── Step 2: Load bytes ───────────────────────────────────────────
        let bytes = file.load_bytes().await?;

        // ── Step 3: Render pages ─────────────────────────────────────────
        let render_start = Instant::now();
        let pages = self
            .renderer
            .render(&file.name, bytes, banded(&progress, 0, 40))
            .await
            .map_err(|e| match e {
                Pdf2MdError::RenderFailed { .. } => e,
                other => Pdf2MdError::RenderFailed {
                    detail: other.to_string(),
                },
            })?;
        if pages.is_empty() {
            return Err(Pdf2MdError::RenderFailed {
                detail: format!("'{}' has no pages", file.name),
            });
        }
        debug!(
            "Rendered {} page(s) in {}ms",
            pages.len(),
            render_start.elapsed().as_millis()
        );

        // ── Step 4: Content parts ────────────────────────────────────────
        let parts = build_content_parts(&self.config.page_intro_for(pages.len()), &pages);

        // ── Step 5: Provider call ────────────────────────────────────────
        let adapter = ProviderAdapter::for_service(self.client.clone(), service, &self.config);
        let request = ProviderRequest {
            system_prompt: &settings.system_prompt,
            parts: &parts,
            settings: &generation,
        };
        let raw = adapter.call(&request, banded(&progress, 40, 100)).await?;

        // ── Step 6: Extract ──────────────────────────────────────────────
        let markdown = extract_markdown(&raw);
        info!(
            "Converted {}: {} page(s) → {} chars in {}ms",
            file.name,
            pages.len(),
            markdown.len(),
            total_start.elapsed().as_millis()
        );
        Ok(markdown)
    }
}

/// One-shot conversion of a file on disk with the default pipeline.
///
/// ```rust,no_run
/// use pdf2md_queue::{convert_file, AppSettings};
///
/// # async fn run() -> Result<(), pdf2md_queue::Pdf2MdError> {
/// let mut settings = AppSettings::default();
/// settings.update_service("openai", pdf2md_queue::ServicePatch {
///     api_key: Some(std::env::var("OPENAI_API_KEY").unwrap_or_default()),
///     ..Default::default()
/// })?;
/// let markdown = convert_file("paper.pdf", &settings).await?;
/// println!("{markdown}");
/// # Ok(())
/// # }
/// ```
pub async fn convert_file(
    path: impl AsRef<Path>,
    settings: &AppSettings,
) -> Result<String, Pdf2MdError> {
    let file = input::read_pdf(path).await?;
    ConversionPipeline::default().convert(&file, settings, noop()).await
}
