use std::{collections::HashMap, path::PathBuf, sync::Arc, time::Duration};

use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{JobRecord, JobState};

/// In-memory source of truth for job records. Cheap to clone; every
/// operation takes the lock once, so readers never observe a
/// half-updated record. Nothing survives a restart, by design.
#[derive(Clone, Default)]
pub struct JobStore {
    inner: Arc<RwLock<HashMap<String, JobRecord>>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a fresh `queued` record. The id is generated here, so the
    /// per-job input path is derived from it via `input_path_for`.
    pub async fn create<F>(&self, filename: String, ttl: Duration, input_path_for: F) -> JobRecord
    where
        F: FnOnce(&str) -> PathBuf,
    {
        let now = Utc::now();
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::hours(24));
        let id = Uuid::new_v4().to_string();
        let input_path = input_path_for(&id);
        let record = JobRecord {
            id,
            status: JobState::Queued,
            progress: 0,
            filename,
            created_at: now,
            expires_at: now + ttl,
            vocals_url: None,
            instrumental_url: None,
            error: None,
            input_path,
        };

        let mut jobs = self.inner.write().await;
        jobs.insert(record.id.clone(), record.clone());
        record
    }

    pub async fn get(&self, id: &str) -> Option<JobRecord> {
        self.inner.read().await.get(id).cloned()
    }

    pub async fn remove(&self, id: &str) -> Option<JobRecord> {
        self.inner.write().await.remove(id)
    }

    /// Point-in-time copy for the sweeper; never iterate the live map
    /// while deleting from it.
    pub async fn snapshot(&self) -> Vec<JobRecord> {
        self.inner.read().await.values().cloned().collect()
    }

    /// `queued` → `processing` with the early progress marker. Returns
    /// the input path the worker should consume, or `None` when the
    /// record is gone or has already left `queued`.
    pub async fn begin_processing(&self, id: &str) -> Option<PathBuf> {
        let mut jobs = self.inner.write().await;
        let job = jobs.get_mut(id)?;
        if job.status != JobState::Queued {
            return None;
        }
        job.status = JobState::Processing;
        job.progress = 10;
        Some(job.input_path.clone())
    }

    /// Records the latest reported percentage. A no-op once the job is
    /// terminal, so a stale in-flight update can never overwrite a
    /// finished record.
    pub async fn set_progress(&self, id: &str, progress: u8) -> bool {
        let mut jobs = self.inner.write().await;
        let Some(job) = jobs.get_mut(id) else {
            return false;
        };
        if job.status.is_terminal() {
            return false;
        }
        job.progress = progress.min(100);
        true
    }

    /// `processing` → `done`. Returns false when the record vanished
    /// (deleted or swept mid-flight) or is already terminal; the caller
    /// then owns cleaning up any orphaned artifacts.
    pub async fn complete(&self, id: &str, vocals_url: String, instrumental_url: String) -> bool {
        let mut jobs = self.inner.write().await;
        let Some(job) = jobs.get_mut(id) else {
            return false;
        };
        if job.status.is_terminal() {
            return false;
        }
        job.status = JobState::Done;
        job.progress = 100;
        job.vocals_url = Some(vocals_url);
        job.instrumental_url = Some(instrumental_url);
        job.error = None;
        true
    }

    /// Any failure lands here: `error`, progress reset to 0, message
    /// surfaced on subsequent status polls. No retry.
    pub async fn fail(&self, id: &str, message: String) -> bool {
        let mut jobs = self.inner.write().await;
        let Some(job) = jobs.get_mut(id) else {
            return false;
        };
        if job.status.is_terminal() {
            return false;
        }
        job.status = JobState::Error;
        job.progress = 0;
        job.error = Some(message);
        job.vocals_url = None;
        job.instrumental_url = None;
        true
    }
}
