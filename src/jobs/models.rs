use chrono::{DateTime, Utc};
use serde::Serialize;

// =====================================================
// ENUMS
// =====================================================

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Load,
    Transfer,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Processing,
    Completed,
    Failed,
    Canceled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Processing)
    }
}

// =====================================================
// COUNTERS
// =====================================================

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoadCounts {
    pub rows_total: u64,
    pub rows_inserted: u64,
    pub rows_skipped: u64,
}

impl LoadCounts {
    pub fn new(rows_total: u64, rows_inserted: u64) -> Self {
        Self {
            rows_total,
            rows_inserted,
            rows_skipped: rows_total.saturating_sub(rows_inserted),
        }
    }
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransferProgress {
    pub rows_processed: u64,
    pub rows_inserted: u64,
}

impl TransferProgress {
    pub fn add_chunk(&mut self, processed: u64, inserted: u64) {
        self.rows_processed += processed;
        self.rows_inserted += inserted;
    }

    pub fn rows_skipped(&self) -> u64 {
        self.rows_processed.saturating_sub(self.rows_inserted)
    }
}

// =====================================================
// PHASES
// =====================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadPhase {
    Processing,
    Completed(LoadCounts),
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferPhase {
    Processing(TransferProgress),
    Completed(TransferProgress),
    Canceled(TransferProgress),
    Failed {
        error: String,
        progress: TransferProgress,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobPhase {
    Load(LoadPhase),
    Transfer(TransferPhase),
}

impl JobPhase {
    pub fn started(kind: JobKind) -> Self {
        match kind {
            JobKind::Load => JobPhase::Load(LoadPhase::Processing),
            JobKind::Transfer => JobPhase::Transfer(TransferPhase::Processing(
                TransferProgress::default(),
            )),
        }
    }

    pub fn kind(&self) -> JobKind {
        match self {
            JobPhase::Load(_) => JobKind::Load,
            JobPhase::Transfer(_) => JobKind::Transfer,
        }
    }

    pub fn status(&self) -> JobStatus {
        match self {
            JobPhase::Load(LoadPhase::Processing)
            | JobPhase::Transfer(TransferPhase::Processing(_)) => JobStatus::Processing,
            JobPhase::Load(LoadPhase::Completed(_))
            | JobPhase::Transfer(TransferPhase::Completed(_)) => JobStatus::Completed,
            JobPhase::Load(LoadPhase::Failed { .. })
            | JobPhase::Transfer(TransferPhase::Failed { .. }) => JobStatus::Failed,
            JobPhase::Transfer(TransferPhase::Canceled(_)) => JobStatus::Canceled,
        }
    }

    pub fn transfer_progress(&self) -> Option<TransferProgress> {
        match self {
            JobPhase::Transfer(
                TransferPhase::Processing(progress)
                | TransferPhase::Completed(progress)
                | TransferPhase::Canceled(progress)
                | TransferPhase::Failed { progress, .. },
            ) => Some(*progress),
            JobPhase::Load(_) => None,
        }
    }
}

/// Successful result handed to the registry by an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Loaded(LoadCounts),
    Transferred(TransferProgress),
}

// =====================================================
// RECORD AND PUBLIC VIEW
// =====================================================

#[derive(Debug, Clone)]
pub struct JobRecord {
    pub id: String,
    pub label: String,
    pub filename: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub cancel_requested: bool,
    pub phase: JobPhase,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct JobStatusView {
    pub job_id: String,
    pub kind: JobKind,
    pub status: JobStatus,
    pub filename: Option<String>,
    pub label: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub rows_total: Option<u64>,
    pub rows_inserted: Option<u64>,
    pub rows_skipped: Option<u64>,
    pub rows_processed: Option<u64>,
    pub error: Option<String>,
    pub progress: Option<u8>,
    pub cancel_requested: bool,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct RunningJob {
    pub job_id: String,
    pub status: JobStatus,
}

impl JobRecord {
    pub fn new(id: String, kind: JobKind, label: String, filename: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            label,
            filename,
            created_at: now,
            updated_at: now,
            finished_at: None,
            cancel_requested: false,
            phase: JobPhase::started(kind),
        }
    }

    pub fn kind(&self) -> JobKind {
        self.phase.kind()
    }

    pub fn status(&self) -> JobStatus {
        self.phase.status()
    }

    pub fn to_status(&self) -> JobStatusView {
        let mut view = JobStatusView {
            job_id: self.id.clone(),
            kind: self.kind(),
            status: self.status(),
            filename: self.filename.clone(),
            label: self.label.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            finished_at: self.finished_at,
            rows_total: None,
            rows_inserted: None,
            rows_skipped: None,
            rows_processed: None,
            error: None,
            progress: None,
            cancel_requested: self.cancel_requested,
        };

        match &self.phase {
            JobPhase::Load(LoadPhase::Processing) => {
                view.progress = Some(0);
            }
            JobPhase::Load(LoadPhase::Completed(counts)) => {
                view.rows_total = Some(counts.rows_total);
                view.rows_inserted = Some(counts.rows_inserted);
                view.rows_skipped = Some(counts.rows_skipped);
                view.progress = Some(100);
            }
            JobPhase::Load(LoadPhase::Failed { error }) => {
                view.error = Some(error.clone());
                view.progress = Some(0);
            }
            JobPhase::Transfer(TransferPhase::Processing(progress)) => {
                view.rows_processed = Some(progress.rows_processed);
                view.rows_inserted = Some(progress.rows_inserted);
            }
            JobPhase::Transfer(TransferPhase::Completed(progress)) => {
                view.rows_total = Some(progress.rows_processed);
                view.rows_processed = Some(progress.rows_processed);
                view.rows_inserted = Some(progress.rows_inserted);
                view.rows_skipped = Some(progress.rows_skipped());
                view.progress = Some(100);
            }
            JobPhase::Transfer(TransferPhase::Canceled(progress)) => {
                view.rows_processed = Some(progress.rows_processed);
                view.rows_inserted = Some(progress.rows_inserted);
                view.error = Some(crate::error::CANCELED_ERROR.to_string());
            }
            JobPhase::Transfer(TransferPhase::Failed { error, progress }) => {
                view.rows_processed = Some(progress.rows_processed);
                view.rows_inserted = Some(progress.rows_inserted);
                view.error = Some(error.clone());
            }
        }

        view
    }
}
