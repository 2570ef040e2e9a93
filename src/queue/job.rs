//! Conversion jobs and their lifecycle.
//!
//! ```text
//!            begin            complete
//!  pending ─────────▶ processing ─────────▶ completed
//!                         │
//!                         │ fail
//!                         ▼
//!                       error
//! ```
//!
//! `completed` and `error` are terminal. A job is only ever moved by the
//! queue's drain loop; anything else is rejected with
//! [`Pdf2MdError::InvalidTransition`].

use crate::error::Pdf2MdError;
use crate::pipeline::input::{check_magic, PDF_MIME};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Error,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Error)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// The PDF a job converts.
///
/// Bytes are shared, so cloning a job for observers is cheap. A file
/// reconstructed from a persisted snapshot has empty bytes and is re-read
/// from `path` when its job runs.
#[derive(Clone)]
pub struct SourceFile {
    pub name: String,
    pub mime_type: String,
    pub size: u64,
    pub path: Option<PathBuf>,
    bytes: Arc<[u8]>,
}

impl fmt::Debug for SourceFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceFile")
            .field("name", &self.name)
            .field("mime_type", &self.mime_type)
            .field("size", &self.size)
            .field("path", &self.path)
            .field("loaded", &!self.bytes.is_empty())
            .finish()
    }
}

impl SourceFile {
    pub fn from_bytes(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        let bytes = bytes.into();
        Self {
            name: name.into(),
            mime_type: PDF_MIME.to_string(),
            size: bytes.len() as u64,
            path: None,
            bytes,
        }
    }

    /// Metadata-only stand-in for a file whose bytes were not persisted.
    pub fn placeholder(
        name: impl Into<String>,
        size: u64,
        mime_type: impl Into<String>,
        path: Option<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            size,
            path,
            bytes: Arc::from(Vec::new()),
        }
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn is_placeholder(&self) -> bool {
        self.bytes.is_empty()
    }

    /// The file's bytes, re-reading a placeholder from its source path.
    pub async fn load_bytes(&self) -> Result<Arc<[u8]>, Pdf2MdError> {
        if !self.is_placeholder() {
            return Ok(Arc::clone(&self.bytes));
        }
        let Some(path) = &self.path else {
            return Err(Pdf2MdError::RenderFailed {
                detail: format!(
                    "the contents of '{}' were not kept across restarts; add the file again",
                    self.name
                ),
            });
        };
        debug!("Re-reading {} from {}", self.name, path.display());
        let bytes = tokio::fs::read(path).await.map_err(|e| Pdf2MdError::RenderFailed {
            detail: format!("cannot re-read '{}': {}", path.display(), e),
        })?;
        check_magic(path, &bytes)?;
        Ok(Arc::from(bytes))
    }
}

/// One PDF queued for conversion.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: String,
    pub filename: String,
    pub file: SourceFile,
    pub(crate) status: JobStatus,
    pub(crate) progress: u8,
    pub(crate) result: Option<String>,
    pub(crate) error: Option<String>,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) last_updated: DateTime<Utc>,
    pub(crate) start_time: Option<DateTime<Utc>>,
    pub(crate) end_time: Option<DateTime<Utc>>,
    pub(crate) duration_ms: Option<u64>,
}

impl Job {
    /// A fresh pending job with a new id.
    pub fn new(file: SourceFile) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            filename: file.name.clone(),
            file,
            status: JobStatus::Pending,
            progress: 0,
            result: None,
            error: None,
            created_at: now,
            last_updated: now,
            start_time: None,
            end_time: None,
            duration_ms: None,
        }
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    /// Markdown; present iff completed.
    pub fn result(&self) -> Option<&str> {
        self.result.as_deref()
    }

    /// Failure message; present iff errored.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.start_time
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    pub fn duration_ms(&self) -> Option<u64> {
        self.duration_ms
    }

    fn transition_error(&self, to: JobStatus) -> Pdf2MdError {
        Pdf2MdError::InvalidTransition {
            id: self.id.clone(),
            from: self.status.as_str(),
            to: to.as_str(),
        }
    }

    pub(crate) fn begin(&mut self, now: DateTime<Utc>) -> Result<(), Pdf2MdError> {
        if self.status != JobStatus::Pending {
            return Err(self.transition_error(JobStatus::Processing));
        }
        self.status = JobStatus::Processing;
        self.progress = 0;
        self.result = None;
        self.error = None;
        self.start_time = Some(now);
        self.end_time = None;
        self.duration_ms = None;
        self.last_updated = now;
        Ok(())
    }

    /// Raise progress. Returns `false` (and changes nothing) unless the job
    /// is processing and `percent` is higher than the current value.
    pub(crate) fn set_progress(&mut self, percent: u8) -> bool {
        let percent = percent.min(100);
        if self.status != JobStatus::Processing || percent <= self.progress {
            return false;
        }
        self.progress = percent;
        self.last_updated = Utc::now();
        true
    }

    pub(crate) fn complete(
        &mut self,
        markdown: String,
        now: DateTime<Utc>,
    ) -> Result<(), Pdf2MdError> {
        if self.status != JobStatus::Processing {
            return Err(self.transition_error(JobStatus::Completed));
        }
        self.status = JobStatus::Completed;
        self.progress = 100;
        self.result = Some(markdown);
        self.error = None;
        self.finish_timing(now);
        Ok(())
    }

    pub(crate) fn fail(&mut self, message: String, now: DateTime<Utc>) -> Result<(), Pdf2MdError> {
        if self.status != JobStatus::Processing {
            return Err(self.transition_error(JobStatus::Error));
        }
        self.status = JobStatus::Error;
        self.progress = 0;
        self.result = None;
        self.error = Some(message);
        self.finish_timing(now);
        Ok(())
    }

    fn finish_timing(&mut self, now: DateTime<Utc>) {
        self.end_time = Some(now);
        self.duration_ms = self
            .start_time
            .map(|start| (now - start).num_milliseconds().max(0) as u64);
        self.last_updated = now;
    }

    /// Turn an interrupted job back into a pending one.
    pub(crate) fn reset_interrupted(&mut self) {
        if self.status == JobStatus::Processing {
            self.status = JobStatus::Pending;
            self.progress = 0;
            self.start_time = None;
        }
    }
}
