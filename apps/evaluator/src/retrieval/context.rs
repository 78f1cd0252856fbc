//! Grading context assembled from the reference index for the scoring stages.

use super::{ReferenceIndex, RetrievalError, RetrievedChunk};
use crate::models::ReferenceCategory;

pub const CV_CONTEXT_CATEGORIES: [ReferenceCategory; 2] =
    [ReferenceCategory::JobDescription, ReferenceCategory::CvRubric];

pub const PROJECT_CONTEXT_CATEGORIES: [ReferenceCategory; 2] = [
    ReferenceCategory::CaseStudyBrief,
    ReferenceCategory::ProjectRubric,
];

pub fn cv_context_query(job_title: &str) -> String {
    format!(
        "Evaluate CV for {job_title} position. Technical skills, experience level, \
         achievements, cultural fit."
    )
}

pub const PROJECT_CONTEXT_QUERY: &str = "Evaluate project report. Correctness, code quality, \
     resilience, error handling, documentation, creativity.";

/// Job description and CV rubric excerpts relevant to `job_title`.
pub async fn cv_grading_context(
    index: &ReferenceIndex,
    job_title: &str,
    top_k: usize,
) -> Result<String, RetrievalError> {
    let chunks = index
        .query(&cv_context_query(job_title), &CV_CONTEXT_CATEGORIES, top_k)
        .await?;
    Ok(render_context(&chunks))
}

/// Case study brief and project rubric excerpts.
pub async fn project_grading_context(
    index: &ReferenceIndex,
    top_k: usize,
) -> Result<String, RetrievalError> {
    let chunks = index
        .query(PROJECT_CONTEXT_QUERY, &PROJECT_CONTEXT_CATEGORIES, top_k)
        .await?;
    Ok(render_context(&chunks))
}

/// Renders each chunk as `[CATEGORY - title]` followed by its text.
pub fn render_context(chunks: &[RetrievedChunk]) -> String {
    chunks
        .iter()
        .map(|chunk| {
            format!(
                "[{} - {}]\n{}\n",
                chunk.metadata.document_type.as_str().to_uppercase(),
                chunk.metadata.title,
                chunk.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::ChunkMetadata;

    fn chunk(category: ReferenceCategory, title: &str, text: &str) -> RetrievedChunk {
        RetrievedChunk {
            text: text.to_string(),
            metadata: ChunkMetadata {
                document_id: "d".to_string(),
                document_type: category,
                title: title.to_string(),
                chunk_index: 0,
                total_chunks: 1,
                extra: Default::default(),
            },
            distance: 0.1,
        }
    }

    #[test]
    fn test_render_context_labels_chunks() {
        let rendered = render_context(&[
            chunk(ReferenceCategory::JobDescription, "Backend Engineer", "Python, AWS"),
            chunk(ReferenceCategory::CvRubric, "CV Rubric", "Skills 40%"),
        ]);
        assert_eq!(
            rendered,
            "[JOB_DESCRIPTION - Backend Engineer]\nPython, AWS\n\n[CV_RUBRIC - CV Rubric]\nSkills 40%\n"
        );
    }

    #[test]
    fn test_cv_query_mentions_title() {
        assert!(cv_context_query("Backend Engineer").starts_with("Evaluate CV for Backend Engineer position."));
    }

    #[tokio::test]
    async fn test_contexts_only_draw_from_their_categories() {
        let index = ReferenceIndex::in_memory(&Default::default());
        index
            .ingest("jd", ReferenceCategory::JobDescription, "JD", "Python backend role", None)
            .await
            .unwrap();
        index
            .ingest("pr", ReferenceCategory::ProjectRubric, "PR", "Resilience and retries", None)
            .await
            .unwrap();

        let cv = cv_grading_context(&index, "Backend Engineer", 5).await.unwrap();
        let project = project_grading_context(&index, 5).await.unwrap();

        assert!(cv.contains("[JOB_DESCRIPTION - JD]"));
        assert!(!cv.contains("PROJECT_RUBRIC"));
        assert!(project.contains("[PROJECT_RUBRIC - PR]"));
        assert!(!project.contains("JOB_DESCRIPTION"));
    }
}
