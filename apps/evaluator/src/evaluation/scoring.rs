//! Weighted rubric scoring.
//!
//! The model only supplies per-criterion scores on a 1–5 scale. Weighted
//! averages and the CV match rate are computed here so the published numbers
//! always follow the rubric formulas, whatever arithmetic the model attempts.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const MIN_SCORE: f64 = 1.0;
pub const MAX_SCORE: f64 = 5.0;

/// Neutral match rate used when the CV scoring reply cannot be parsed.
pub const FALLBACK_MATCH_RATE: f64 = 0.5;
/// Neutral project score used when the project scoring reply cannot be parsed.
pub const FALLBACK_PROJECT_SCORE: f64 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Criterion {
    /// Prefix of the `<key>_score` / `<key>_reasoning` fields in the reply.
    pub key: &'static str,
    pub label: &'static str,
    pub weight: f64,
}

pub const CV_CRITERIA: [Criterion; 4] = [
    Criterion {
        key: "technical_skills",
        label: "Technical Skills Match",
        weight: 0.40,
    },
    Criterion {
        key: "experience_level",
        label: "Experience Level",
        weight: 0.25,
    },
    Criterion {
        key: "achievements",
        label: "Relevant Achievements",
        weight: 0.20,
    },
    Criterion {
        key: "cultural_fit",
        label: "Cultural/Collaboration Fit",
        weight: 0.15,
    },
];

pub const PROJECT_CRITERIA: [Criterion; 5] = [
    Criterion {
        key: "correctness",
        label: "Correctness",
        weight: 0.30,
    },
    Criterion {
        key: "code_quality",
        label: "Code Quality",
        weight: 0.25,
    },
    Criterion {
        key: "resilience",
        label: "Resilience",
        weight: 0.20,
    },
    Criterion {
        key: "documentation",
        label: "Documentation",
        weight: 0.15,
    },
    Criterion {
        key: "creativity",
        label: "Creativity",
        weight: 0.10,
    },
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionScore {
    pub key: String,
    pub weight: f64,
    /// Clamped to 1–5.
    pub score: f64,
    pub reasoning: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreCard {
    pub criteria: Vec<CriterionScore>,
    pub weighted_average: f64,
    pub feedback: Option<String>,
}

impl ScoreCard {
    /// Reads every criterion's score from a model reply. Returns `None` if the
    /// reply is not an object or any score is missing or non-numeric.
    pub fn from_reply(criteria: &[Criterion], reply: &Value) -> Option<Self> {
        let object = reply.as_object()?;

        let scores = criteria
            .iter()
            .map(|c| {
                let score = object.get(&format!("{}_score", c.key)).and_then(as_number)?;
                let reasoning = object
                    .get(&format!("{}_reasoning", c.key))
                    .and_then(Value::as_str)
                    .map(str::to_string);
                Some(CriterionScore {
                    key: c.key.to_string(),
                    weight: c.weight,
                    score: clamp_score(score),
                    reasoning,
                })
            })
            .collect::<Option<Vec<_>>>()?;

        let feedback = object
            .get("overall_feedback")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        Some(Self {
            weighted_average: weighted_average(&scores),
            criteria: scores,
            feedback,
        })
    }
}

/// Accepts numbers and numeric strings ("4", "3.5").
fn as_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|n| n.is_finite())
}

pub fn clamp_score(score: f64) -> f64 {
    score.clamp(MIN_SCORE, MAX_SCORE)
}

/// Σ(weight × score) / Σ(weight), on the 1–5 scale.
pub fn weighted_average(scores: &[CriterionScore]) -> f64 {
    let total_weight: f64 = scores.iter().map(|s| s.weight).sum();
    if total_weight <= 0.0 {
        return MIN_SCORE;
    }
    let weighted: f64 = scores.iter().map(|s| s.weight * clamp_score(s.score)).sum();
    clamp_score(weighted / total_weight)
}

/// Maps a 1–5 weighted average onto 0–1: `(avg - 1) / 4`.
pub fn match_rate(weighted_average: f64) -> f64 {
    ((weighted_average - MIN_SCORE) / (MAX_SCORE - MIN_SCORE)).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_weights_sum_to_one() {
        let cv: f64 = CV_CRITERIA.iter().map(|c| c.weight).sum();
        let project: f64 = PROJECT_CRITERIA.iter().map(|c| c.weight).sum();
        assert!((cv - 1.0).abs() < 1e-9);
        assert!((project - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_cv_weighted_average_and_match_rate() {
        let reply = json!({
            "technical_skills_score": 5,
            "experience_level_score": 4,
            "achievements_score": 3,
            "cultural_fit_score": 2,
            "overall_feedback": "Strong technically."
        });
        let card = ScoreCard::from_reply(&CV_CRITERIA, &reply).unwrap();

        // 0.4*5 + 0.25*4 + 0.2*3 + 0.15*2 = 3.9
        assert!((card.weighted_average - 3.9).abs() < 1e-9);
        assert!((match_rate(card.weighted_average) - 0.725).abs() < 1e-9);
        assert_eq!(card.feedback.as_deref(), Some("Strong technically."));
    }

    #[test]
    fn test_extremal_scores_hit_the_bounds() {
        assert_eq!(match_rate(1.0), 0.0);
        assert_eq!(match_rate(5.0), 1.0);
    }

    #[test]
    fn test_out_of_range_scores_are_clamped() {
        let reply = json!({
            "correctness_score": 9,
            "code_quality_score": "4.5",
            "resilience_score": 0,
            "documentation_score": 3,
            "creativity_score": 3
        });
        let card = ScoreCard::from_reply(&PROJECT_CRITERIA, &reply).unwrap();

        assert_eq!(card.criteria[0].score, 5.0);
        assert_eq!(card.criteria[1].score, 4.5);
        assert_eq!(card.criteria[2].score, 1.0);
        assert!(card.weighted_average >= MIN_SCORE && card.weighted_average <= MAX_SCORE);
        assert!(card.feedback.is_none());
    }

    #[test]
    fn test_missing_score_rejects_reply() {
        let reply = json!({
            "technical_skills_score": 4,
            "experience_level_score": 4,
            "achievements_score": 4
        });
        assert!(ScoreCard::from_reply(&CV_CRITERIA, &reply).is_none());
        assert!(ScoreCard::from_reply(&CV_CRITERIA, &json!(["not", "an", "object"])).is_none());
    }
}
