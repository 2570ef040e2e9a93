//! # pdf2md-queue
//!
//! Batch-convert PDF documents to Markdown with vision LLMs.
//!
//! Every page of a PDF is rasterised to PNG, the whole set is sent to the
//! active LLM service in a single request, and the Markdown is pulled back
//! out of the reply. Files are queued as jobs and converted one at a time;
//! the queue survives restarts.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Resolve  active service + API key (fail fast)
//!  ├─ 2. Render   every page via pdfium (spawn_blocking)      0–40 %
//!  ├─ 3. Encode   PNG → base64, intro text + pages in order
//!  ├─ 4. Call     OpenAI chat-completions (SSE) or Gemini     40–100 %
//!  └─ 5. Extract  unwrap ```markdown fences, collapse blank runs
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf2md_queue::{
//!     ConversionPipeline, DrainOutcome, FileStore, JobQueue, SettingsStore,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(FileStore::new("./pdf2md-data"));
//!     let settings = SettingsStore::new(store.clone()).load();
//!
//!     let queue = JobQueue::open(store, Arc::new(ConversionPipeline::default()));
//!     queue.add_files(vec![pdf2md_queue::read_pdf("paper.pdf").await?]);
//!
//!     if let DrainOutcome::Drained(report) = queue.process_queue(&settings).await {
//!         eprintln!("{} completed, {} failed", report.completed, report.failed);
//!     }
//!     for job in queue.jobs() {
//!         println!("{}: {}", job.filename, job.status());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2md` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! pdf2md-queue = { version = "0.3", default-features = false }
//! ```
//!
//! ## Native dependency
//!
//! Rendering needs the pdfium shared library at run time. Point
//! `PDFIUM_LIB_PATH` at the library (or its directory), or install it
//! system-wide.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod provider;
pub mod queue;
pub mod services;
pub mod settings;
pub mod storage;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{PipelineConfig, PipelineConfigBuilder};
pub use convert::{convert_file, resolve_service, ConversionPipeline, Converter};
pub use error::Pdf2MdError;
pub use output::{
    combined_download, format_duration, job_download, markdown_file_name, write_markdown,
    MarkdownFile,
};
pub use pipeline::input::read_pdf;
pub use pipeline::postprocess::extract_markdown;
pub use pipeline::render::{PageRenderer, PdfiumRenderer, RenderedPage};
pub use progress::{ProgressHandle, ProgressSink};
pub use provider::{
    test_connection, ConnectionReport, ContentPart, GenerationSettings, ProviderAdapter,
    ProviderRequest,
};
pub use queue::{DrainOutcome, DrainReport, Job, JobQueue, JobStatus, QueueObserver, SourceFile};
pub use services::{LlmService, ServiceDraft, ServiceKind, ServicePatch};
pub use settings::{AppSettings, SettingsStore, SystemPromptPreset};
pub use storage::{FileStore, KeyValueStore, MemoryStore};
