//! Queue snapshots: the job list minus file bytes, under [`QUEUE_KEY`].
//!
//! File contents are never persisted. A reloaded job carries a placeholder
//! [`SourceFile`] with the original name, size and type, plus the source
//! path when the file came from disk.

use super::job::{Job, JobStatus, SourceFile};
use crate::error::Pdf2MdError;
use crate::storage::KeyValueStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const QUEUE_KEY: &str = "pdf2md-queue";

/// Serialisable form of a [`Job`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedJob {
    pub id: String,
    pub filename: String,
    pub status: JobStatus,
    #[serde(default)]
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    #[serde(default)]
    pub file_size: u64,
    #[serde(default)]
    pub file_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_path: Option<PathBuf>,
}

impl From<&Job> for PersistedJob {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id.clone(),
            filename: job.filename.clone(),
            status: job.status,
            progress: job.progress,
            result: job.result.clone(),
            error: job.error.clone(),
            created_at: job.created_at,
            last_updated: job.last_updated,
            start_time: job.start_time,
            end_time: job.end_time,
            duration: job.duration_ms,
            file_size: job.file.size,
            file_type: job.file.mime_type.clone(),
            source_path: job.file.path.clone(),
        }
    }
}

impl PersistedJob {
    /// Rebuild a job. An interrupted (`processing`) job comes back as
    /// pending at 0%, and fields that contradict the status are dropped.
    pub fn into_job(self) -> Job {
        let file = SourceFile::placeholder(
            self.filename.clone(),
            self.file_size,
            self.file_type,
            self.source_path,
        );
        let mut job = Job {
            id: self.id,
            filename: self.filename,
            file,
            status: self.status,
            progress: self.progress.min(100),
            result: self.result,
            error: self.error,
            created_at: self.created_at,
            last_updated: self.last_updated,
            start_time: self.start_time,
            end_time: self.end_time,
            duration_ms: self.duration,
        };
        job.reset_interrupted();
        match job.status {
            JobStatus::Pending => {
                job.result = None;
                job.error = None;
                job.progress = 0;
            }
            JobStatus::Completed => {
                job.error = None;
                job.progress = 100;
            }
            JobStatus::Error => {
                job.result = None;
                job.progress = 0;
            }
            JobStatus::Processing => {}
        }
        job
    }
}

/// Write the whole job list, or erase the snapshot when it is empty.
pub fn save_jobs(store: &dyn KeyValueStore, jobs: &[Job]) -> Result<(), Pdf2MdError> {
    if jobs.is_empty() {
        return store.remove(QUEUE_KEY);
    }
    let snapshot: Vec<PersistedJob> = jobs.iter().map(PersistedJob::from).collect();
    let value = serde_json::to_value(&snapshot).map_err(|e| Pdf2MdError::Storage {
        key: QUEUE_KEY.to_string(),
        detail: e.to_string(),
    })?;
    store.set(QUEUE_KEY, &value)
}

/// Read the snapshot, normalising interrupted jobs. Missing → empty.
pub fn load_jobs(store: &dyn KeyValueStore) -> Result<Vec<Job>, Pdf2MdError> {
    let Some(value) = store.get(QUEUE_KEY)? else {
        return Ok(Vec::new());
    };
    let snapshot: Vec<PersistedJob> =
        serde_json::from_value(value).map_err(|e| Pdf2MdError::Storage {
            key: QUEUE_KEY.to_string(),
            detail: e.to_string(),
        })?;
    Ok(snapshot.into_iter().map(PersistedJob::into_job).collect())
}
