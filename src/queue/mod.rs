//! Job queue: ordered conversion jobs, drained one at a time.
//!
//! ## Draining
//!
//! [`JobQueue::process_queue`] takes the ids of every pending job at the
//! moment it starts and converts them in insertion order, strictly one at a
//! time. A second call while a drain is running returns
//! [`DrainOutcome::AlreadyRunning`] without touching any job. Jobs added
//! during a drain wait for the next call.
//!
//! A failing job never stops the drain: its error message is recorded and
//! the next job starts.
//!
//! ## Persistence
//!
//! Every mutation except a progress tick writes a snapshot of the whole list
//! (without file bytes) through the [`KeyValueStore`]. On [`JobQueue::open`] an existing snapshot
//! is turned into a *recovery offer*: interrupted jobs come back as pending,
//! and the offer is kept only if it contains pending or completed jobs. The
//! caller decides with [`JobQueue::accept_recovery`] or
//! [`JobQueue::discard_recovery`]. Storage failures are logged and never
//! interrupt the queue.

mod job;
mod persist;

pub use job::{Job, JobStatus, SourceFile};
pub use persist::{load_jobs, save_jobs, PersistedJob, QUEUE_KEY};

use crate::convert::Converter;
use crate::error::Pdf2MdError;
use crate::progress::{monotonic, ProgressSink};
use crate::settings::AppSettings;
use crate::storage::KeyValueStore;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Callbacks for UIs that mirror the queue.
///
/// Called after the change is applied and persisted, outside the queue's
/// lock, so implementations may read the queue back.
pub trait QueueObserver: Send + Sync {
    fn on_job_updated(&self, job: &Job) {
        let _ = job;
    }

    fn on_job_removed(&self, id: &str) {
        let _ = id;
    }

    fn on_drain_started(&self, pending: usize) {
        let _ = pending;
    }

    fn on_drain_finished(&self, report: &DrainReport) {
        let _ = report;
    }
}

/// Counts for one drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub completed: usize,
    pub failed: usize,
    /// Jobs removed or no longer pending by the time their turn came.
    pub skipped: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Another drain holds the queue; nothing was done.
    AlreadyRunning,
    Drained(DrainReport),
}

struct QueueState {
    jobs: Mutex<Vec<Job>>,
    store: Arc<dyn KeyValueStore>,
    observer: Option<Arc<dyn QueueObserver>>,
}

impl QueueState {
    fn persist(&self, jobs: &[Job]) {
        if let Err(e) = save_jobs(self.store.as_ref(), jobs) {
            warn!("Could not persist queue: {}", e);
        }
    }

    /// Apply `f` to job `id`. `f` returns `None` for "nothing changed", in
    /// which case nothing is persisted or announced.
    fn update<R>(&self, id: &str, f: impl FnOnce(&mut Job) -> Option<R>) -> Option<R> {
        self.apply(id, true, f)
    }

    /// [`Self::update`] without the snapshot write. Only for changes a
    /// reload would discard anyway.
    fn update_unsaved<R>(&self, id: &str, f: impl FnOnce(&mut Job) -> Option<R>) -> Option<R> {
        self.apply(id, false, f)
    }

    fn apply<R>(
        &self,
        id: &str,
        persist: bool,
        f: impl FnOnce(&mut Job) -> Option<R>,
    ) -> Option<R> {
        let (out, snapshot) = {
            let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
            let job = jobs.iter_mut().find(|j| j.id == id)?;
            let out = f(job)?;
            let snapshot = job.clone();
            if persist {
                self.persist(&jobs);
            }
            (out, snapshot)
        };
        if let Some(observer) = &self.observer {
            observer.on_job_updated(&snapshot);
        }
        Some(out)
    }

    fn with_jobs<R>(&self, f: impl FnOnce(&mut Vec<Job>) -> R) -> R {
        let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut jobs)
    }

    fn announce_removed(&self, ids: &[String]) {
        if let Some(observer) = &self.observer {
            for id in ids {
                observer.on_job_removed(id);
            }
        }
    }

    fn announce_updated(&self, jobs: &[Job]) {
        if let Some(observer) = &self.observer {
            for job in jobs {
                observer.on_job_updated(job);
            }
        }
    }
}

/// Reports a running job's progress into the queue.
struct JobProgress {
    state: Arc<QueueState>,
    job_id: String,
}

/// Progress is announced but not persisted: an interrupted job reloads as
/// pending at 0% whatever was stored.
impl ProgressSink for JobProgress {
    fn on_progress(&self, percent: u8) {
        self.state
            .update_unsaved(&self.job_id, |job| job.set_progress(percent).then_some(()));
    }
}

struct DrainGuard<'a>(&'a AtomicBool);

impl<'a> DrainGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| DrainGuard(flag))
    }
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// The conversion queue.
pub struct JobQueue {
    state: Arc<QueueState>,
    converter: Arc<dyn Converter>,
    draining: AtomicBool,
    recovery: Mutex<Option<Vec<Job>>>,
}

impl JobQueue {
    /// Open the queue over `store`, preparing a recovery offer from any
    /// previous snapshot. The live queue starts empty.
    pub fn open(store: Arc<dyn KeyValueStore>, converter: Arc<dyn Converter>) -> Self {
        Self::open_with_observer(store, converter, None)
    }

    pub fn open_with_observer(
        store: Arc<dyn KeyValueStore>,
        converter: Arc<dyn Converter>,
        observer: Option<Arc<dyn QueueObserver>>,
    ) -> Self {
        let previous = match load_jobs(store.as_ref()) {
            Ok(jobs) => jobs,
            Err(e) => {
                warn!("Ignoring unreadable queue snapshot: {}", e);
                Vec::new()
            }
        };
        let recoverable: Vec<Job> = previous
            .into_iter()
            .filter(|j| matches!(j.status(), JobStatus::Pending | JobStatus::Completed))
            .collect();
        let recovery = if recoverable.is_empty() {
            None
        } else {
            info!("{} job(s) can be recovered from the last session", recoverable.len());
            Some(recoverable)
        };

        Self {
            state: Arc::new(QueueState {
                jobs: Mutex::new(Vec::new()),
                store,
                observer,
            }),
            converter,
            draining: AtomicBool::new(false),
            recovery: Mutex::new(recovery),
        }
    }

    // ── Recovery ─────────────────────────────────────────────────────────

    /// Whether an unanswered recovery offer exists.
    pub fn has_recoverable(&self) -> bool {
        self.recovery
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// The jobs a recovery would restore.
    pub fn recoverable_jobs(&self) -> Vec<Job> {
        self.recovery
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .unwrap_or_default()
    }

    /// Replace the live queue with the recovered jobs. Returns how many were
    /// restored; 0 when there was no offer.
    pub fn accept_recovery(&self) -> usize {
        let Some(recovered) = self
            .recovery
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        else {
            return 0;
        };

        let count = recovered.len();
        let snapshot = self.state.with_jobs(|jobs| {
            *jobs = recovered;
            self.state.persist(jobs);
            jobs.clone()
        });
        self.state.announce_updated(&snapshot);
        info!("Recovered {} job(s)", count);
        count
    }

    /// Drop the offer and erase the stored snapshot. Returns `false` when
    /// there was no offer.
    pub fn discard_recovery(&self) -> bool {
        if self
            .recovery
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .is_none()
        {
            return false;
        }
        self.state.with_jobs(|jobs| self.state.persist(jobs));
        info!("Discarded previous session's jobs");
        true
    }

    // ── Mutations ────────────────────────────────────────────────────────

    /// Append one pending job per file; returns their ids in order.
    pub fn add_files(&self, files: Vec<SourceFile>) -> Vec<String> {
        let added: Vec<Job> = files.into_iter().map(Job::new).collect();
        let ids = added.iter().map(|j| j.id.clone()).collect();
        self.state.with_jobs(|jobs| {
            jobs.extend(added.iter().cloned());
            self.state.persist(jobs);
        });
        debug!("Queued {} file(s)", added.len());
        self.state.announce_updated(&added);
        ids
    }

    /// Remove one job in any state.
    pub fn remove_job(&self, id: &str) -> Result<Job, Pdf2MdError> {
        let removed = self.state.with_jobs(|jobs| {
            let index = jobs.iter().position(|j| j.id == id)?;
            let removed = jobs.remove(index);
            self.state.persist(jobs);
            Some(removed)
        });
        let removed = removed.ok_or_else(|| Pdf2MdError::JobNotFound { id: id.to_string() })?;
        self.state.announce_removed(&[removed.id.clone()]);
        Ok(removed)
    }

    /// Remove every completed job; returns how many went.
    pub fn clear_completed(&self) -> usize {
        self.remove_where(|j| j.status() == JobStatus::Completed)
    }

    /// Empty the queue and erase the snapshot.
    pub fn clear_all(&self) -> usize {
        self.remove_where(|_| true)
    }

    fn remove_where(&self, predicate: impl Fn(&Job) -> bool) -> usize {
        let removed: Vec<String> = self.state.with_jobs(|jobs| {
            let (gone, kept): (Vec<Job>, Vec<Job>) = jobs.drain(..).partition(|j| predicate(j));
            *jobs = kept;
            self.state.persist(jobs);
            gone.into_iter().map(|j| j.id).collect()
        });
        self.state.announce_removed(&removed);
        removed.len()
    }

    // ── Queries ──────────────────────────────────────────────────────────

    /// All jobs in insertion order.
    pub fn jobs(&self) -> Vec<Job> {
        self.state.with_jobs(|jobs| jobs.clone())
    }

    pub fn job(&self, id: &str) -> Option<Job> {
        self.state
            .with_jobs(|jobs| jobs.iter().find(|j| j.id == id).cloned())
    }

    pub fn count(&self, status: JobStatus) -> usize {
        self.state
            .with_jobs(|jobs| jobs.iter().filter(|j| j.status() == status).count())
    }

    /// Whether a drain is running.
    pub fn is_processing(&self) -> bool {
        self.draining.load(Ordering::Acquire)
    }

    /// Whether any job is mid-conversion. Hosts use this to warn before
    /// quitting.
    pub fn has_active_job(&self) -> bool {
        self.count(JobStatus::Processing) > 0
    }

    // ── Drain ────────────────────────────────────────────────────────────

    /// Convert every job that is pending right now, one at a time.
    pub async fn process_queue(&self, settings: &AppSettings) -> DrainOutcome {
        let Some(_guard) = DrainGuard::acquire(&self.draining) else {
            debug!("Drain already running");
            return DrainOutcome::AlreadyRunning;
        };

        let pending: Vec<String> = self.state.with_jobs(|jobs| {
            jobs.iter()
                .filter(|j| j.status() == JobStatus::Pending)
                .map(|j| j.id.clone())
                .collect()
        });
        info!("Draining {} pending job(s)", pending.len());
        if let Some(observer) = &self.state.observer {
            observer.on_drain_started(pending.len());
        }

        let mut report = DrainReport::default();
        for id in pending {
            let started = self
                .state
                .update(&id, |job| job.begin(Utc::now()).ok().map(|_| job.file.clone()));
            let Some(file) = started else {
                debug!("Skipping {}: removed or no longer pending", id);
                report.skipped += 1;
                continue;
            };

            let sink = monotonic(Arc::new(JobProgress {
                state: Arc::clone(&self.state),
                job_id: id.clone(),
            }));
            let outcome = self.converter.convert(&file, settings, sink).await;

            let now = Utc::now();
            match outcome {
                Ok(markdown) => {
                    self.state.update(&id, |job| job.complete(markdown, now).ok());
                    report.completed += 1;
                }
                Err(e) => {
                    warn!("{} failed: {}", file.name, e);
                    self.state.update(&id, |job| job.fail(e.to_string(), now).ok());
                    report.failed += 1;
                }
            }
        }

        info!(
            "Drain finished: {} completed, {} failed, {} skipped",
            report.completed, report.failed, report.skipped
        );
        if let Some(observer) = &self.state.observer {
            observer.on_drain_finished(&report);
        }
        DrainOutcome::Drained(report)
    }
}
