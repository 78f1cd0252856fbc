//! The five model-backed evaluation operations.
//!
//! Each operation issues exactly one `LlmClient::invoke` call. Replies that do
//! not match the expected JSON shape degrade to documented fallback values
//! and set `used_fallback` instead of failing the stage.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::evaluation::profiles::{CvProfile, ProjectProfile, Structured};
use crate::evaluation::prompts::*;
use crate::evaluation::scoring::{
    match_rate, ScoreCard, CV_CRITERIA, FALLBACK_MATCH_RATE, FALLBACK_PROJECT_SCORE,
    PROJECT_CRITERIA,
};
use crate::llm_client::prompts::json_system;
use crate::llm_client::{
    parse_json, LlmClient, ModelInvocationError, ModelResponse, ResponseFormat,
};
use crate::models::PipelineStep;

const DEFAULT_FEEDBACK: &str = "Evaluation completed.";

// ────────────────────────────────────────────────────────────────────────────
// Stage outputs
// ────────────────────────────────────────────────────────────────────────────

/// Token and latency telemetry for one model call, written to the step log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelUsage {
    pub provider: String,
    pub model: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    pub latency_ms: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepOutput<T> {
    pub value: T,
    pub usage: ModelUsage,
    /// The reply did not match the expected shape and a default was used.
    pub used_fallback: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CvEvaluation {
    /// 0–1.
    pub match_rate: f64,
    pub feedback: String,
    pub scores: Option<ScoreCard>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectEvaluation {
    /// 1–5.
    pub project_score: f64,
    pub feedback: String,
    pub scores: Option<ScoreCard>,
}

// ────────────────────────────────────────────────────────────────────────────
// Evaluator
// ────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct Evaluator {
    llm: LlmClient,
}

impl Evaluator {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }

    pub fn llm(&self) -> &LlmClient {
        &self.llm
    }

    /// Stage 1: CV text to a structured profile.
    pub async fn structure_cv(
        &self,
        cv_text: &str,
    ) -> Result<StepOutput<Structured<CvProfile>>, ModelInvocationError> {
        let prompt = CV_PARSE_PROMPT_TEMPLATE.replace("{cv_text}", cv_text);
        self.structure(PipelineStep::CvParsing, CV_PARSE_SYSTEM, &prompt)
            .await
    }

    /// Stage 2: weighted CV scores against the retrieved job context.
    pub async fn score_cv(
        &self,
        profile: &Structured<CvProfile>,
        job_title: &str,
        context: &str,
    ) -> Result<StepOutput<CvEvaluation>, ModelInvocationError> {
        let prompt = CV_SCORE_PROMPT_TEMPLATE
            .replace("{job_title}", job_title)
            .replace("{cv_data}", &to_pretty_json(profile))
            .replace("{context}", context);

        let response = self
            .invoke_json(PipelineStep::CvEvaluation, CV_SCORE_SYSTEM, &prompt)
            .await?;
        let card = parse_json::<Value>(&response.content)
            .ok()
            .and_then(|reply| ScoreCard::from_reply(&CV_CRITERIA, &reply));

        let (value, used_fallback) = match card {
            Some(card) => (
                CvEvaluation {
                    match_rate: match_rate(card.weighted_average),
                    feedback: card
                        .feedback
                        .clone()
                        .unwrap_or_else(|| DEFAULT_FEEDBACK.to_string()),
                    scores: Some(card),
                },
                false,
            ),
            None => {
                warn!("cv_evaluation reply did not match the score schema; using fallback match rate");
                (
                    CvEvaluation {
                        match_rate: FALLBACK_MATCH_RATE,
                        feedback: fallback_feedback(&response.content),
                        scores: None,
                    },
                    true,
                )
            }
        };

        Ok(self.output(value, &response, used_fallback))
    }

    /// Stage 3: project report text to a structured profile.
    pub async fn structure_project(
        &self,
        project_text: &str,
    ) -> Result<StepOutput<Structured<ProjectProfile>>, ModelInvocationError> {
        let prompt = PROJECT_PARSE_PROMPT_TEMPLATE.replace("{project_text}", project_text);
        self.structure(PipelineStep::ProjectParsing, PROJECT_PARSE_SYSTEM, &prompt)
            .await
    }

    /// Stage 4: weighted project scores against the case study context.
    pub async fn score_project(
        &self,
        profile: &Structured<ProjectProfile>,
        context: &str,
    ) -> Result<StepOutput<ProjectEvaluation>, ModelInvocationError> {
        let prompt = PROJECT_SCORE_PROMPT_TEMPLATE
            .replace("{project_data}", &to_pretty_json(profile))
            .replace("{context}", context);

        let response = self
            .invoke_json(PipelineStep::ProjectEvaluation, PROJECT_SCORE_SYSTEM, &prompt)
            .await?;
        let card = parse_json::<Value>(&response.content)
            .ok()
            .and_then(|reply| ScoreCard::from_reply(&PROJECT_CRITERIA, &reply));

        let (value, used_fallback) = match card {
            Some(card) => (
                ProjectEvaluation {
                    project_score: card.weighted_average,
                    feedback: card
                        .feedback
                        .clone()
                        .unwrap_or_else(|| DEFAULT_FEEDBACK.to_string()),
                    scores: Some(card),
                },
                false,
            ),
            None => {
                warn!("project_evaluation reply did not match the score schema; using fallback score");
                (
                    ProjectEvaluation {
                        project_score: FALLBACK_PROJECT_SCORE,
                        feedback: fallback_feedback(&response.content),
                        scores: None,
                    },
                    true,
                )
            }
        };

        Ok(self.output(value, &response, used_fallback))
    }

    /// Stage 5: narrative recommendation from both evaluations.
    pub async fn synthesize_summary(
        &self,
        cv: &CvEvaluation,
        project: &ProjectEvaluation,
        job_title: &str,
    ) -> Result<StepOutput<String>, ModelInvocationError> {
        let prompt = SUMMARY_PROMPT_TEMPLATE
            .replace("{job_title}", job_title)
            .replace("{match_rate}", &format!("{:.2}", cv.match_rate))
            .replace("{cv_feedback}", &cv.feedback)
            .replace("{project_score}", &format!("{:.2}", project.project_score))
            .replace("{project_feedback}", &project.feedback);

        let response = self
            .llm
            .invoke(
                PipelineStep::FinalAnalysis.as_str(),
                SUMMARY_SYSTEM,
                &prompt,
                Some(SUMMARY_TEMPERATURE),
                None,
            )
            .await?;

        let summary = response.content.trim().to_string();
        Ok(self.output(summary, &response, false))
    }

    async fn structure<T: DeserializeOwned>(
        &self,
        step: PipelineStep,
        system: &str,
        prompt: &str,
    ) -> Result<StepOutput<Structured<T>>, ModelInvocationError> {
        let response = self
            .llm
            .invoke(
                step.as_str(),
                &json_system(system),
                prompt,
                Some(STRUCTURING_TEMPERATURE),
                Some(ResponseFormat::JsonObject),
            )
            .await?;

        let (value, used_fallback) = match parse_json::<T>(&response.content) {
            Ok(parsed) => (Structured::Parsed(parsed), false),
            Err(e) => {
                warn!("{step} reply was not valid JSON ({e}); keeping raw content");
                (
                    Structured::Raw {
                        raw_content: response.content.clone(),
                    },
                    true,
                )
            }
        };

        Ok(self.output(value, &response, used_fallback))
    }

    async fn invoke_json(
        &self,
        step: PipelineStep,
        system: &str,
        prompt: &str,
    ) -> Result<ModelResponse, ModelInvocationError> {
        self.llm
            .invoke(
                step.as_str(),
                &json_system(system),
                prompt,
                Some(SCORING_TEMPERATURE),
                Some(ResponseFormat::JsonObject),
            )
            .await
    }

    fn output<T>(&self, value: T, response: &ModelResponse, used_fallback: bool) -> StepOutput<T> {
        StepOutput {
            value,
            usage: ModelUsage {
                provider: self.llm.provider().to_string(),
                model: response.model.clone(),
                prompt_tokens: response.prompt_tokens,
                completion_tokens: response.completion_tokens,
                total_tokens: response.total_tokens,
                latency_ms: response.latency_ms,
            },
            used_fallback,
        }
    }
}

fn to_pretty_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
}

fn fallback_feedback(content: &str) -> String {
    let content = content.trim();
    if content.is_empty() {
        DEFAULT_FEEDBACK.to_string()
    } else {
        content.to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::LlmConfig;
    use crate::testing::{completion, ScriptedTransport};

    fn evaluator(replies: Vec<&str>) -> (Evaluator, Arc<ScriptedTransport>) {
        let transport = Arc::new(ScriptedTransport::new(
            replies.into_iter().map(|r| Ok(completion(r))).collect(),
        ));
        let llm = LlmClient::new(transport.clone(), &LlmConfig::default());
        (Evaluator::new(llm), transport)
    }

    #[tokio::test]
    async fn test_structure_cv_extracts_skills() {
        let (evaluator, transport) = evaluator(vec![
            r#"{"name": "Candidate", "technical_skills": ["Python", "AWS"], "achievements": ["led team of 4"]}"#,
        ]);

        let output = evaluator
            .structure_cv("5 years Python, AWS, led team of 4")
            .await
            .unwrap();

        let profile = output.value.parsed().unwrap();
        assert!(profile.has_skill("Python"));
        assert!(!output.used_fallback);
        assert_eq!(output.usage.prompt_tokens, 100);

        let request = &transport.requests()[0];
        assert_eq!(request.temperature, STRUCTURING_TEMPERATURE);
        assert!(request.user.contains("5 years Python, AWS, led team of 4"));
        assert_eq!(request.response_format, Some(ResponseFormat::JsonObject));
    }

    #[tokio::test]
    async fn test_cv_is_structured_then_scored_between_extremes() {
        let (evaluator, transport) = evaluator(vec![
            r#"{"name": "Candidate", "technical_skills": ["Python", "AWS"],
                "experience": [{"company": "Acme", "role": "Lead", "duration": "5 years",
                                "responsibilities": ["led team of 4"]}]}"#,
            r#"{"technical_skills_score": 4, "experience_level_score": 3,
                "achievements_score": 3, "cultural_fit_score": 4,
                "overall_feedback": "Good Python and AWS depth."}"#,
        ]);

        let structured = evaluator
            .structure_cv("5 years Python, AWS, led team of 4")
            .await
            .unwrap();
        let profile = structured.value.parsed().unwrap();
        assert!(profile.technical_skills.iter().any(|s| s == "Python"));

        let scored = evaluator
            .score_cv(&structured.value, "Backend Engineer", "")
            .await
            .unwrap();
        let rate = scored.value.match_rate;
        assert!(rate > 0.0 && rate < 1.0, "match rate {rate} is not strictly inside (0, 1)");
        assert!(!scored.used_fallback);

        // The scoring prompt carries the structured profile, not the raw text.
        assert!(transport.requests()[1].user.contains("\"Python\""));
    }

    #[tokio::test]
    async fn test_structure_falls_back_to_raw_content() {
        let (evaluator, _) = evaluator(vec!["Sorry, here is the CV: Python developer"]);
        let output = evaluator.structure_cv("cv").await.unwrap();

        assert!(output.used_fallback);
        assert_eq!(
            output.value,
            Structured::Raw {
                raw_content: "Sorry, here is the CV: Python developer".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_score_cv_derives_match_rate_from_weights() {
        let (evaluator, transport) = evaluator(vec![
            r#"{"technical_skills_score": 4, "experience_level_score": 4,
                "achievements_score": 3, "cultural_fit_score": 3,
                "match_rate": 0.99, "overall_feedback": "Solid."}"#,
        ]);
        let profile = Structured::Parsed(CvProfile::default());

        let output = evaluator
            .score_cv(&profile, "Backend Engineer", "[JOB_DESCRIPTION - JD]\nPython\n")
            .await
            .unwrap();

        // 0.4*4 + 0.25*4 + 0.2*3 + 0.15*3 = 3.65 -> (3.65 - 1) / 4
        assert!((output.value.match_rate - 0.6625).abs() < 1e-9);
        assert!(output.value.match_rate > 0.0 && output.value.match_rate < 1.0);
        assert_eq!(output.value.feedback, "Solid.");
        assert!(!output.used_fallback);

        let request = &transport.requests()[0];
        assert_eq!(request.temperature, SCORING_TEMPERATURE);
        assert!(request.user.contains("Backend Engineer"));
        assert!(request.user.contains("[JOB_DESCRIPTION - JD]"));
    }

    #[tokio::test]
    async fn test_score_cv_fallback_is_neutral_and_flagged() {
        let (evaluator, _) = evaluator(vec!["The candidate looks decent overall."]);
        let output = evaluator
            .score_cv(&Structured::Parsed(CvProfile::default()), "Backend Engineer", "")
            .await
            .unwrap();

        assert!(output.used_fallback);
        assert_eq!(output.value.match_rate, FALLBACK_MATCH_RATE);
        assert_eq!(output.value.feedback, "The candidate looks decent overall.");
        assert!(output.value.scores.is_none());
    }

    #[tokio::test]
    async fn test_score_project_keeps_native_scale() {
        let (evaluator, _) = evaluator(vec![
            r#"{"correctness_score": 5, "code_quality_score": 4, "resilience_score": 4,
                "documentation_score": 3, "creativity_score": 2}"#,
        ]);
        let output = evaluator
            .score_project(&Structured::Parsed(ProjectProfile::default()), "")
            .await
            .unwrap();

        // 1.5 + 1.0 + 0.8 + 0.45 + 0.2 = 3.95
        assert!((output.value.project_score - 3.95).abs() < 1e-9);
        assert_eq!(output.value.feedback, DEFAULT_FEEDBACK);
    }

    #[tokio::test]
    async fn test_score_project_fallback() {
        let (evaluator, _) = evaluator(vec!["```json\n{\"correctness_score\": 4}\n```"]);
        let output = evaluator
            .score_project(&Structured::Parsed(ProjectProfile::default()), "")
            .await
            .unwrap();

        assert!(output.used_fallback);
        assert_eq!(output.value.project_score, FALLBACK_PROJECT_SCORE);
    }

    #[tokio::test]
    async fn test_summary_formats_scores() {
        let (evaluator, transport) = evaluator(vec!["  Recommend for interview.  "]);
        let cv = CvEvaluation {
            match_rate: 0.6625,
            feedback: "Solid.".to_string(),
            scores: None,
        };
        let project = ProjectEvaluation {
            project_score: 3.95,
            feedback: "Good retries.".to_string(),
            scores: None,
        };

        let output = evaluator
            .synthesize_summary(&cv, &project, "Backend Engineer")
            .await
            .unwrap();

        assert_eq!(output.value, "Recommend for interview.");
        let request = &transport.requests()[0];
        assert!(request.user.contains("Match Rate: 0.66"));
        assert!(request.user.contains("Score: 3.95/5.00"));
        assert_eq!(request.temperature, SUMMARY_TEMPERATURE);
        assert_eq!(request.response_format, None);
    }
}
