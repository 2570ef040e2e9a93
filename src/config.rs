//! Configuration for the conversion pipeline.
//!
//! User-facing choices (which service, which model, prompt, temperature,
//! output length) live in [`crate::settings::AppSettings`] because they are
//! persisted and edited at runtime. [`PipelineConfig`] holds the remaining
//! process-level knobs that are fixed for the lifetime of a
//! [`crate::convert::ConversionPipeline`].

use crate::error::Pdf2MdError;
use crate::prompts::DEFAULT_PAGE_INTRO;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Process-level settings for a conversion pipeline.
///
/// Built via [`PipelineConfig::builder()`] or [`PipelineConfig::default()`].
///
/// # Example
/// ```rust
/// use pdf2md_queue::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .render_scale(2.0)
///     .connection_timeout_secs(5)
///     .build()
///     .unwrap();
/// assert_eq!(config.connection_timeout_secs, 5);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Upscale factor applied to each page's natural size when rasterising.
    /// Range: 0.5–4.0. Default: 2.0.
    ///
    /// At 1× a typical A4 page renders at roughly 600 × 840 px, which is too
    /// small for footnotes and subscripts to survive the model's image tiling.
    pub render_scale: f32,

    /// Timeout for the manual connection test, in seconds. Default: 10.
    ///
    /// Conversion requests themselves have no explicit timeout.
    pub connection_timeout_secs: u64,

    /// Interval between synthetic progress steps while waiting on a
    /// non-streaming provider, in milliseconds. Default: 700.
    pub progress_tick_ms: u64,

    /// Leading text part sent before the page images. `{pages}` is replaced
    /// with the page count.
    pub page_intro: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            render_scale: 2.0,
            connection_timeout_secs: 10,
            progress_tick_ms: 700,
            page_intro: DEFAULT_PAGE_INTRO.to_string(),
        }
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }

    /// Render the leading text part for a document with `pages` pages.
    pub fn page_intro_for(&self, pages: usize) -> String {
        self.page_intro.replace("{pages}", &pages.to_string())
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn render_scale(mut self, scale: f32) -> Self {
        self.config.render_scale = scale.clamp(0.5, 4.0);
        self
    }

    pub fn connection_timeout_secs(mut self, secs: u64) -> Self {
        self.config.connection_timeout_secs = secs;
        self
    }

    pub fn progress_tick_ms(mut self, ms: u64) -> Self {
        self.config.progress_tick_ms = ms;
        self
    }

    pub fn page_intro(mut self, template: impl Into<String>) -> Self {
        self.config.page_intro = template.into();
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, Pdf2MdError> {
        let c = &self.config;
        if !(0.5..=4.0).contains(&c.render_scale) {
            return Err(Pdf2MdError::InvalidConfig(format!(
                "render scale must be 0.5–4.0, got {}",
                c.render_scale
            )));
        }
        if c.connection_timeout_secs == 0 {
            return Err(Pdf2MdError::InvalidConfig(
                "connection timeout must be ≥ 1s".into(),
            ));
        }
        if c.progress_tick_ms == 0 {
            return Err(Pdf2MdError::InvalidConfig(
                "progress tick must be ≥ 1ms".into(),
            ));
        }
        Ok(self.config)
    }
}
