use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

/// Category of a grading reference document stored in the retrieval index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceCategory {
    JobDescription,
    CvRubric,
    CaseStudyBrief,
    ProjectRubric,
}

impl ReferenceCategory {
    pub const ALL: [ReferenceCategory; 4] = [
        ReferenceCategory::JobDescription,
        ReferenceCategory::CvRubric,
        ReferenceCategory::CaseStudyBrief,
        ReferenceCategory::ProjectRubric,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceCategory::JobDescription => "job_description",
            ReferenceCategory::CvRubric => "cv_rubric",
            ReferenceCategory::CaseStudyBrief => "case_study_brief",
            ReferenceCategory::ProjectRubric => "project_rubric",
        }
    }
}

impl fmt::Display for ReferenceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReferenceCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ReferenceCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown reference category '{s}'"))
    }
}

/// Source row for bulk ingestion into the retrieval index.
#[derive(Debug, Clone, FromRow)]
pub struct ReferenceDocument {
    pub id: Uuid,
    pub document_type: String,
    pub title: String,
    pub content: String,
    pub metadata: Option<Value>,
}
