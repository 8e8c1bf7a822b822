// =====================================================
// JOB REGISTRY MODULE
// In-memory job records, cooperative cancellation, and retention purge
// =====================================================

use super::models::{
    JobKind, JobOutcome, JobPhase, JobRecord, JobStatus, JobStatusView, LoadPhase, RunningJob,
    TransferPhase,
};
use crate::error::{LoaderError, LoaderResult};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;

pub const MAX_JOB_ID_ATTEMPTS: usize = 20;
const JOB_ID_LEN: usize = 12;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelOutcome {
    Accepted,
    Ignored(JobStatus),
}

pub fn generate_job_id() -> String {
    let mut token = uuid::Uuid::new_v4().simple().to_string();
    token.truncate(JOB_ID_LEN);
    token
}

/// Whether a job is old enough to drop. Processing jobs are always kept.
pub fn is_purgeable(record: &JobRecord, now: DateTime<Utc>, retention: Duration) -> bool {
    if !record.status().is_terminal() {
        return false;
    }
    match record.finished_at {
        None => true,
        Some(finished_at) => now - finished_at > retention,
    }
}

#[derive(Default)]
pub struct JobRegistry {
    jobs: Mutex<HashMap<String, JobRecord>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create(
        &self,
        kind: JobKind,
        label: String,
        filename: Option<String>,
    ) -> LoaderResult<String> {
        self.create_with_ids(kind, label, filename, generate_job_id)
            .await
    }

    pub(crate) async fn create_with_ids<F>(
        &self,
        kind: JobKind,
        label: String,
        filename: Option<String>,
        mut next_id: F,
    ) -> LoaderResult<String>
    where
        F: FnMut() -> String,
    {
        let mut jobs = self.jobs.lock().await;
        for _ in 0..MAX_JOB_ID_ATTEMPTS {
            let id = next_id();
            if jobs.contains_key(&id) {
                continue;
            }
            jobs.insert(id.clone(), JobRecord::new(id.clone(), kind, label, filename));
            return Ok(id);
        }
        Err(LoaderError::Configuration(
            "Failed to generate unique job id".to_string(),
        ))
    }

    #[cfg(test)]
    pub(crate) async fn insert_record(&self, record: JobRecord) {
        self.jobs.lock().await.insert(record.id.clone(), record);
    }

    pub async fn get(&self, id: &str) -> Option<JobStatusView> {
        self.jobs.lock().await.get(id).map(JobRecord::to_status)
    }

    /// Apply `updater` to a processing job and stamp `updated_at`.
    /// Terminal jobs are left untouched.
    async fn update<F>(&self, id: &str, updater: F) -> Option<JobStatusView>
    where
        F: FnOnce(&mut JobRecord),
    {
        let mut jobs = self.jobs.lock().await;
        let job = jobs.get_mut(id)?;
        if job.status().is_terminal() {
            return None;
        }
        updater(job);
        job.updated_at = Utc::now();
        Some(job.to_status())
    }

    pub async fn record_transfer_progress(
        &self,
        id: &str,
        rows_processed: u64,
        rows_inserted: u64,
    ) -> bool {
        self.update(id, |job| {
            if let JobPhase::Transfer(TransferPhase::Processing(progress)) = &mut job.phase {
                progress.rows_processed = rows_processed;
                progress.rows_inserted = rows_inserted;
            }
        })
        .await
        .is_some()
    }

    /// Returns `None` when the job is unknown.
    pub async fn request_cancel(&self, id: &str) -> Option<CancelOutcome> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs.get_mut(id)?;
        let status = job.status();
        if status.is_terminal() || job.kind() != JobKind::Transfer {
            return Some(CancelOutcome::Ignored(status));
        }
        job.cancel_requested = true;
        job.updated_at = Utc::now();
        Some(CancelOutcome::Accepted)
    }

    /// Unknown jobs read as cancelled so an orphaned worker stops.
    pub async fn is_cancel_requested(&self, id: &str) -> bool {
        self.jobs
            .lock()
            .await
            .get(id)
            .map(|job| job.cancel_requested)
            .unwrap_or(true)
    }

    /// Translate an engine result into the job's terminal phase.
    pub async fn settle(
        &self,
        id: &str,
        result: Result<JobOutcome, LoaderError>,
    ) -> Option<JobStatusView> {
        self.update(id, |job| {
            job.phase = terminal_phase(&job.phase, result);
            job.finished_at = Some(Utc::now());
        })
        .await
    }

    pub async fn purge(&self, retention: Duration) -> usize {
        self.purge_at(Utc::now(), retention).await
    }

    pub async fn purge_at(&self, now: DateTime<Utc>, retention: Duration) -> usize {
        let mut jobs = self.jobs.lock().await;
        let before = jobs.len();
        jobs.retain(|_, job| !is_purgeable(job, now, retention));
        before - jobs.len()
    }

    pub async fn list_running(&self) -> Vec<RunningJob> {
        let jobs = self.jobs.lock().await;
        let mut running = jobs
            .values()
            .filter(|job| job.status() == JobStatus::Processing)
            .map(|job| (job.created_at, job.id.clone()))
            .collect::<Vec<_>>();
        running.sort();
        running
            .into_iter()
            .map(|(_, job_id)| RunningJob {
                job_id,
                status: JobStatus::Processing,
            })
            .collect()
    }

    /// Every tracked job, most recently updated first.
    pub async fn list_recent(&self) -> Vec<JobStatusView> {
        let jobs = self.jobs.lock().await;
        let mut statuses = jobs.values().map(JobRecord::to_status).collect::<Vec<_>>();
        statuses.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        statuses
    }
}

fn terminal_phase(phase: &JobPhase, result: Result<JobOutcome, LoaderError>) -> JobPhase {
    match (phase, result) {
        (JobPhase::Load(_), Ok(JobOutcome::Loaded(counts))) => {
            JobPhase::Load(LoadPhase::Completed(counts))
        }
        (JobPhase::Load(_), Err(err)) => JobPhase::Load(LoadPhase::Failed {
            error: err.to_string(),
        }),
        (JobPhase::Transfer(_), Ok(JobOutcome::Transferred(progress))) => {
            JobPhase::Transfer(TransferPhase::Completed(progress))
        }
        (JobPhase::Transfer(_), Err(err)) => {
            let progress = phase.transfer_progress().unwrap_or_default();
            if err.is_cancellation() {
                JobPhase::Transfer(TransferPhase::Canceled(progress))
            } else {
                JobPhase::Transfer(TransferPhase::Failed {
                    error: err.to_string(),
                    progress,
                })
            }
        }
        (JobPhase::Load(_), Ok(other)) | (JobPhase::Transfer(_), Ok(other)) => {
            log::error!("Job outcome {:?} does not match job kind", other);
            let error = "Job outcome does not match job kind".to_string();
            match phase.kind() {
                JobKind::Load => JobPhase::Load(LoadPhase::Failed { error }),
                JobKind::Transfer => JobPhase::Transfer(TransferPhase::Failed {
                    error,
                    progress: phase.transfer_progress().unwrap_or_default(),
                }),
            }
        }
    }
}
