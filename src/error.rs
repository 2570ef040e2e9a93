//! Error type for the pdf2md-queue library.
//!
//! Every failure in the crate is a [`Pdf2MdError`]. The provider adapter and
//! the conversion pipeline never panic and never let a failure escape other
//! than as `Err(Pdf2MdError)`; the job queue turns any such error into a
//! terminal `error` status for that one job and moves on to the next.
//!
//! Variants are grouped by where they originate:
//!
//! | Group      | Raised by                        | Surfaced as            |
//! |------------|----------------------------------|------------------------|
//! | Input      | [`crate::pipeline::input`]       | CLI error              |
//! | Rendering  | [`crate::pipeline::render`]      | job error              |
//! | Config     | [`crate::services`], pipeline    | job error / CLI error  |
//! | Transport  | [`crate::provider`]              | job error              |
//! | Queue      | [`crate::queue`]                 | caller error           |
//! | Storage    | [`crate::storage`], output       | logged / CLI error     |

use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the pdf2md-queue library.
#[derive(Debug, Error)]
pub enum Pdf2MdError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── Rendering errors ──────────────────────────────────────────────────
    /// The page renderer failed; no page images were produced.
    #[error("Failed to render PDF pages to images: {detail}")]
    RenderFailed { detail: String },

    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{filename}' is corrupt: {detail}")]
    CorruptPdf { filename: String, detail: String },

    /// PDF requires a password; encrypted documents are not supported.
    #[error("PDF '{filename}' is encrypted and requires a password.")]
    PasswordRequired { filename: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium (file or directory) or install pdfium system-wide."
    )]
    PdfiumBindingFailed(String),

    // ── Configuration errors ──────────────────────────────────────────────
    /// No service is marked active in the settings.
    #[error("No LLM service is active.\nSelect one with `pdf2md services use <id>`.")]
    NoActiveService,

    /// The active service has no API key configured.
    #[error("LLM service '{service}' has no API key configured.\nSet one with `pdf2md services key {service} <KEY>`.")]
    MissingCredential { service: String },

    /// No service with this id exists in the registry.
    #[error("Unknown LLM service '{id}'")]
    ServiceNotFound { id: String },

    /// The operation is not allowed on a built-in service.
    #[error("Service '{id}' is built in: {reason}")]
    BuiltInService { id: String, reason: String },

    /// No system-prompt preset with this id exists.
    #[error("Unknown system prompt preset '{id}'")]
    PresetNotFound { id: String },

    /// Builder or settings validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Transport errors ──────────────────────────────────────────────────
    /// The provider answered with a non-2xx status.
    #[error("{provider} API request failed: {status} {status_text}\n{body}")]
    HttpStatus {
        provider: String,
        status: u16,
        status_text: String,
        body: String,
    },

    /// The request never produced an HTTP response (DNS, TLS, reset, …).
    #[error("{provider} request failed: {detail}")]
    Transport { provider: String, detail: String },

    /// The request exceeded its timeout and was aborted.
    #[error("Connection timed out after {secs}s, check the API address and network")]
    Timeout { secs: u64 },

    /// The provider answered 2xx but not with the expected JSON shape.
    #[error("{provider} API returned a malformed response")]
    MalformedResponse { provider: String },

    // ── Queue errors ──────────────────────────────────────────────────────
    /// No job with this id is in the queue.
    #[error("Unknown job '{id}'")]
    JobNotFound { id: String },

    /// A job state change that the lifecycle does not allow.
    #[error("Job '{id}' cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: &'static str,
        to: &'static str,
    },

    // ── Storage errors ────────────────────────────────────────────────────
    /// Reading or writing a persisted record failed.
    #[error("Storage error for '{key}': {detail}")]
    Storage { key: String, detail: String },

    /// Could not create or write an output Markdown file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Pdf2MdError {
    /// `true` for failures detected before any network traffic happened.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Pdf2MdError::NoActiveService
                | Pdf2MdError::MissingCredential { .. }
                | Pdf2MdError::ServiceNotFound { .. }
                | Pdf2MdError::InvalidConfig(_)
        )
    }
}
