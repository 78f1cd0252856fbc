use serde::{Deserialize, Serialize};

/// Output of a structuring stage. `Raw` keeps the model's reply verbatim when
/// it could not be parsed, so later stages still see the content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Structured<T> {
    Parsed(T),
    Raw { raw_content: String },
}

impl<T> Structured<T> {
    pub fn parsed(&self) -> Option<&T> {
        match self {
            Structured::Parsed(value) => Some(value),
            Structured::Raw { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Contact {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub linkedin: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Experience {
    pub company: String,
    pub role: String,
    pub duration: String,
    pub responsibilities: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Education {
    pub degree: String,
    pub institution: String,
    pub year: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectEntry {
    pub name: String,
    pub description: String,
    pub technologies: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CvProfile {
    pub name: Option<String>,
    pub contact: Contact,
    pub technical_skills: Vec<String>,
    pub experience: Vec<Experience>,
    pub education: Vec<Education>,
    pub projects: Vec<ProjectEntry>,
    pub achievements: Vec<String>,
}

impl CvProfile {
    pub fn has_skill(&self, skill: &str) -> bool {
        self.technical_skills
            .iter()
            .any(|s| s.eq_ignore_ascii_case(skill))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectProfile {
    pub project_overview: String,
    pub technologies_used: Vec<String>,
    pub architecture: String,
    pub key_features: Vec<String>,
    pub error_handling: String,
    pub documentation_quality: String,
    pub bonus_features: Vec<String>,
    pub code_quality_indicators: Vec<String>,
}
