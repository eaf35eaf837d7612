//! Ingest job: tracks progress of a single `start_ingest` call. On process
//! restart, any job found `running` is marked `interrupted`; its checkpoint
//! (`processed_paper_ids`) is preserved so `resume_ingest` can skip finished papers.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Closed set of ingest job states.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Interrupted,
}

impl From<String> for JobStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "pending" => JobStatus::Pending,
            "running" => JobStatus::Running,
            "completed" => JobStatus::Completed,
            "failed" => JobStatus::Failed,
            "interrupted" => JobStatus::Interrupted,
            _ => JobStatus::Pending,
        }
    }
}

impl From<JobStatus> for String {
    fn from(status: JobStatus) -> Self {
        match status {
            JobStatus::Pending => "pending".to_string(),
            JobStatus::Running => "running".to_string(),
            JobStatus::Completed => "completed".to_string(),
            JobStatus::Failed => "failed".to_string(),
            JobStatus::Interrupted => "interrupted".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "ingest_jobs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub project_id: Uuid,

    #[sea_orm(column_type = "Text")]
    pub status: String,

    pub papers_total: i32,
    pub papers_processed: i32,

    /// Paper ids completed so far; resume skips these.
    #[sea_orm(column_type = "JsonBinary")]
    pub processed_paper_ids: serde_json::Value,

    #[sea_orm(column_type = "Text", nullable)]
    pub error_message: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub idempotency_key: Option<String>,

    /// Per-ingest reliability summary: canonicalization_rate, evidence_coverage,
    /// low_trust_edge_count, llm_merge_review stats, potential_false_merge samples.
    #[sea_orm(column_type = "JsonBinary")]
    pub reliability_summary: serde_json::Value,

    pub created_at: DateTimeWithTimeZone,
    pub started_at: Option<DateTimeWithTimeZone>,
    pub completed_at: Option<DateTimeWithTimeZone>,
}

impl Model {
    pub fn job_status(&self) -> JobStatus {
        JobStatus::from(self.status.clone())
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.job_status(),
            JobStatus::Completed | JobStatus::Failed | JobStatus::Interrupted
        )
    }

    /// Progress in `[0, 1]`, monotone non-decreasing across the job's life,
    /// reaching exactly 1.0 on completion.
    pub fn progress(&self) -> f64 {
        if self.papers_total == 0 {
            if self.job_status() == JobStatus::Completed {
                1.0
            } else {
                0.0
            }
        } else {
            (self.papers_processed as f64 / self.papers_total as f64).min(1.0)
        }
    }

    pub fn processed_paper_ids_vec(&self) -> Vec<Uuid> {
        serde_json::from_value(self.processed_paper_ids.clone()).unwrap_or_default()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::project::Entity",
        from = "Column::ProjectId",
        to = "super::project::Column::Id",
        on_delete = "Cascade"
    )]
    Project,
}

impl Related<super::project::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Project.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
