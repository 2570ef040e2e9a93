//! PDF rasterisation: every page to a base64 PNG.
//!
//! The renderer is a trait so the pipeline can be driven without a native
//! pdfium library (tests, or embedders with their own rasteriser).
//! [`PdfiumRenderer`] is the production implementation.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which keeps thread-local
//! state and is CPU-bound. Rendering runs on the blocking pool so Tokio
//! worker threads keep serving the provider streams and the ticker.
//!
//! ## Binding
//!
//! `PDFIUM_LIB_PATH` (a library file or the directory holding it) wins;
//! otherwise the library is looked up next to the working directory and
//! finally in the system library path.

use super::encode::encode_png_base64;
use crate::error::Pdf2MdError;
use crate::progress::{ProgressHandle, ProgressSink};
use async_trait::async_trait;
use pdfium_render::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// One rendered page.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedPage {
    /// 1-based page number.
    pub page_num: usize,
    pub png_base64: String,
    pub width: u32,
    pub height: u32,
}

/// Turns PDF bytes into page images, reporting `pages done / total` on
/// `progress`.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render(
        &self,
        filename: &str,
        pdf: Arc<[u8]>,
        progress: ProgressHandle,
    ) -> Result<Vec<RenderedPage>, Pdf2MdError>;
}

/// pdfium-backed renderer.
#[derive(Debug, Clone)]
pub struct PdfiumRenderer {
    scale: f32,
}

impl PdfiumRenderer {
    /// `scale` multiplies each page's natural size.
    pub fn new(scale: f32) -> Self {
        Self { scale }
    }
}

impl Default for PdfiumRenderer {
    fn default() -> Self {
        Self::new(2.0)
    }
}

#[async_trait]
impl PageRenderer for PdfiumRenderer {
    async fn render(
        &self,
        filename: &str,
        pdf: Arc<[u8]>,
        progress: ProgressHandle,
    ) -> Result<Vec<RenderedPage>, Pdf2MdError> {
        let name = filename.to_string();
        let scale = self.scale;

        tokio::task::spawn_blocking(move || render_blocking(&name, &pdf, scale, progress.as_ref()))
            .await
            .map_err(|e| Pdf2MdError::Internal(format!("Render task panicked: {}", e)))?
    }
}

fn bind_pdfium() -> Result<Pdfium, Pdf2MdError> {
    let bindings = match std::env::var_os("PDFIUM_LIB_PATH").filter(|p| !p.is_empty()) {
        Some(configured) => {
            let configured = PathBuf::from(configured);
            let library = if configured.is_dir() {
                PathBuf::from(Pdfium::pdfium_platform_library_name_at_path(&configured))
            } else {
                configured
            };
            Pdfium::bind_to_library(library)
        }
        None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| Pdf2MdError::PdfiumBindingFailed(format!("{:?}", e)))?;

    Ok(Pdfium::new(bindings))
}

fn classify_load_error(filename: &str, e: PdfiumError) -> Pdf2MdError {
    let detail = format!("{:?}", e);
    if detail.contains("Password") || detail.contains("password") {
        Pdf2MdError::PasswordRequired {
            filename: filename.to_string(),
        }
    } else {
        Pdf2MdError::CorruptPdf {
            filename: filename.to_string(),
            detail,
        }
    }
}

fn render_blocking(
    filename: &str,
    pdf: &[u8],
    scale: f32,
    progress: &dyn ProgressSink,
) -> Result<Vec<RenderedPage>, Pdf2MdError> {
    let pdfium = bind_pdfium()?;
    let document = pdfium
        .load_pdf_from_byte_slice(pdf, None)
        .map_err(|e| classify_load_error(filename, e))?;

    let pages = document.pages();
    let total = pages.len() as usize;
    info!("{}: {} page(s) at {}x", filename, total, scale);

    let render_config = PdfRenderConfig::new().scale_page_by_factor(scale);
    let mut rendered = Vec::with_capacity(total);

    for (idx, page) in pages.iter().enumerate() {
        let page_num = idx + 1;
        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| Pdf2MdError::RenderFailed {
                detail: format!("page {}: {:?}", page_num, e),
            })?;

        let image = bitmap.as_image();
        let png_base64 = encode_png_base64(&image).map_err(|e| Pdf2MdError::RenderFailed {
            detail: format!("page {} PNG encoding: {}", page_num, e),
        })?;
        debug!("Rendered page {} → {}x{} px", page_num, image.width(), image.height());

        rendered.push(RenderedPage {
            page_num,
            png_base64,
            width: image.width(),
            height: image.height(),
        });
        progress.on_fraction(page_num, total);
    }

    Ok(rendered)
}
