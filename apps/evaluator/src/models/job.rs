use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Lifecycle of an evaluation job: `queued -> processing -> {completed | failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status '{other}'")),
        }
    }
}

/// The five result fields of a completed evaluation. Persisted as one unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    /// 0.0 – 1.0, rescaled from the weighted 1–5 CV score.
    pub cv_match_rate: f64,
    pub cv_feedback: String,
    /// 1.0 – 5.0, left on the native rubric scale.
    pub project_score: f64,
    pub project_feedback: String,
    pub overall_summary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationJob {
    pub id: Uuid,
    pub job_title: String,
    pub cv_document_id: Uuid,
    pub project_document_id: Uuid,
    pub status: JobStatus,
    /// Present if and only if `status == Completed`.
    pub result: Option<EvaluationResult>,
    /// Present if and only if `status == Failed`.
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl EvaluationJob {
    pub fn new(job_title: &str, cv_document_id: Uuid, project_document_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_title: job_title.to_string(),
            cv_document_id,
            project_document_id,
            status: JobStatus::Queued,
            result: None,
            error_message: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct EvaluationJobRow {
    pub id: Uuid,
    pub job_title: String,
    pub cv_document_id: Uuid,
    pub project_document_id: Uuid,
    pub status: String,
    pub cv_match_rate: Option<f64>,
    pub cv_feedback: Option<String>,
    pub project_score: Option<f64>,
    pub project_feedback: Option<String>,
    pub overall_summary: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<EvaluationJobRow> for EvaluationJob {
    type Error = String;

    fn try_from(row: EvaluationJobRow) -> Result<Self, Self::Error> {
        let status: JobStatus = row.status.parse()?;

        let result = match (
            row.cv_match_rate,
            row.cv_feedback,
            row.project_score,
            row.project_feedback,
            row.overall_summary,
        ) {
            (
                Some(cv_match_rate),
                Some(cv_feedback),
                Some(project_score),
                Some(project_feedback),
                Some(overall_summary),
            ) if status == JobStatus::Completed => {
                Some(EvaluationResult {
                    cv_match_rate,
                    cv_feedback,
                    project_score,
                    project_feedback,
                    overall_summary,
                })
            }
            _ if status == JobStatus::Completed => {
                return Err(format!("job {} is completed but has missing result fields", row.id));
            }
            _ => None,
        };

        Ok(EvaluationJob {
            id: row.id,
            job_title: row.job_title,
            cv_document_id: row.cv_document_id,
            project_document_id: row.project_document_id,
            status,
            result,
            error_message: row.error_message.filter(|_| status == JobStatus::Failed),
            created_at: row.created_at,
            completed_at: row.completed_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(status: &str) -> EvaluationJobRow {
        EvaluationJobRow {
            id: Uuid::new_v4(),
            job_title: "Backend Engineer".to_string(),
            cv_document_id: Uuid::new_v4(),
            project_document_id: Uuid::new_v4(),
            status: status.to_string(),
            cv_match_rate: None,
            cv_feedback: None,
            project_score: None,
            project_feedback: None,
            overall_summary: None,
            error_message: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [
            JobStatus::Queued,
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
        assert!("done".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_completed_row_with_all_fields_has_result() {
        let mut r = row("completed");
        r.cv_match_rate = Some(0.75);
        r.cv_feedback = Some("Solid backend profile".to_string());
        r.project_score = Some(4.2);
        r.project_feedback = Some("Good resilience".to_string());
        r.overall_summary = Some("Recommend".to_string());

        let job = EvaluationJob::try_from(r).unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.result.unwrap().project_score, 4.2);
    }

    #[test]
    fn test_completed_row_missing_a_field_is_rejected() {
        let mut r = row("completed");
        r.cv_match_rate = Some(0.75);
        assert!(EvaluationJob::try_from(r).is_err());
    }

    #[test]
    fn test_error_message_only_surfaces_on_failed() {
        let mut r = row("processing");
        r.error_message = Some("stale".to_string());
        let job = EvaluationJob::try_from(r).unwrap();
        assert!(job.error_message.is_none());
        assert!(job.result.is_none());
    }
}
