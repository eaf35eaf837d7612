//! In-process ingest-job registry. A single write-coalescing task owns the
//! `ingest_jobs` row; concurrent extraction workers send progress updates
//! over a channel instead of racing each other on direct writes.

use paperforge_common::db::Repository;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
enum ProgressUpdate {
    PaperProcessed { job_id: Uuid, paper_id: Uuid },
    ReliabilitySummary { job_id: Uuid, summary: serde_json::Value },
}

/// Cheap to clone; every clone shares the same writer task.
#[derive(Clone)]
pub struct JobRegistry {
    sender: mpsc::Sender<ProgressUpdate>,
}

impl JobRegistry {
    /// Spawns the writer task and returns a handle. The task exits once every
    /// `JobRegistry` clone has been dropped and the channel closes.
    pub fn spawn(repo: Arc<Repository>) -> Self {
        let (sender, mut receiver) = mpsc::channel(256);

        tokio::spawn(async move {
            while let Some(update) = receiver.recv().await {
                let result = match update {
                    ProgressUpdate::PaperProcessed { job_id, paper_id } => {
                        repo.record_paper_processed(job_id, paper_id).await
                    }
                    ProgressUpdate::ReliabilitySummary { job_id, summary } => {
                        repo.update_reliability_summary(job_id, summary).await
                    }
                };
                if let Err(e) = result {
                    error!(error = %e, "ingest job registry write failed");
                }
            }
            warn!("ingest job registry writer task exiting");
        });

        Self { sender }
    }

    pub async fn paper_processed(&self, job_id: Uuid, paper_id: Uuid) {
        if self.sender.send(ProgressUpdate::PaperProcessed { job_id, paper_id }).await.is_err() {
            error!("ingest job registry channel closed, dropping paper-processed update");
        }
    }

    pub async fn reliability_summary(&self, job_id: Uuid, summary: serde_json::Value) {
        if self
            .sender
            .send(ProgressUpdate::ReliabilitySummary { job_id, summary })
            .await
            .is_err()
        {
            error!("ingest job registry channel closed, dropping reliability-summary update");
        }
    }
}
