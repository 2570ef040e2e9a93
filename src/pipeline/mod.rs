//! Pipeline stages for PDF-to-Markdown conversion.
//!
//! Each submodule implements one step; [`crate::convert::ConversionPipeline`]
//! strings them together and owns the progress bands.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ encode ──▶ content ──▶ provider ──▶ postprocess
//! (bytes)   (pdfium)   (base64)   (parts)    (LLM call)   (extract)
//! ```
//!
//! 1. [`input`]   — read a PDF from disk and check its magic bytes
//! 2. [`render`]  — rasterise every page; runs in `spawn_blocking`
//! 3. [`encode`]  — PNG-encode and base64-wrap each page image
//! 4. [`content`] — one intro text part followed by the pages in order
//! 5. [`crate::provider`] — a single call to the active service
//! 6. [`postprocess`] — pull the Markdown out of the model's reply

pub mod content;
pub mod encode;
pub mod input;
pub mod postprocess;
pub mod render;
