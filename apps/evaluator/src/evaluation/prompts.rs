// Prompt constants for the five evaluation stages.
// Templates use `{placeholder}` markers filled with `str::replace`.

/// Stage 1 system prompt: CV structuring.
pub const CV_PARSE_SYSTEM: &str = "You are an expert CV parser. \
    Extract structured information from a candidate's CV: personal information, \
    technical skills (languages, frameworks, tools, databases, cloud platforms), \
    work experience, education, projects and achievements.";

/// Replace `{cv_text}` before sending.
pub const CV_PARSE_PROMPT_TEMPLATE: &str = r#"Parse the following CV and extract structured information.

CV CONTENT:
{cv_text}

Return a JSON object with this schema:
{
  "name": "candidate name",
  "contact": {"email": "", "phone": "", "linkedin": ""},
  "technical_skills": ["skill1", "skill2"],
  "experience": [
    {"company": "", "role": "", "duration": "", "responsibilities": ["resp1", "resp2"]}
  ],
  "education": [
    {"degree": "", "institution": "", "year": ""}
  ],
  "projects": [
    {"name": "", "description": "", "technologies": ["tech1", "tech2"]}
  ],
  "achievements": ["achievement1", "achievement2"]
}"#;

/// Stage 2 system prompt: CV scoring against the job description and rubric.
pub const CV_SCORE_SYSTEM: &str = "You are an expert technical recruiter evaluating \
    candidates for backend engineering positions. Score the candidate's CV against \
    the job requirements and the scoring rubric.

Evaluation criteria, each scored 1-5:
1. Technical Skills Match (40%): backend, databases, APIs, cloud, AI/LLM exposure.
2. Experience Level (25%): years of experience and project complexity.
3. Relevant Achievements (20%): impact, scale, measurable outcomes.
4. Cultural/Collaboration Fit (15%): communication, learning attitude, teamwork.

Give detailed, constructive feedback.";

/// Replace `{job_title}`, `{cv_data}` and `{context}` before sending.
pub const CV_SCORE_PROMPT_TEMPLATE: &str = r#"Evaluate this candidate for the position: {job_title}

CANDIDATE CV DATA:
{cv_data}

RELEVANT JOB REQUIREMENTS AND RUBRIC:
{context}

Return a JSON object with this schema:
{
  "technical_skills_score": <1-5>,
  "technical_skills_reasoning": "explanation",
  "experience_level_score": <1-5>,
  "experience_level_reasoning": "explanation",
  "achievements_score": <1-5>,
  "achievements_reasoning": "explanation",
  "cultural_fit_score": <1-5>,
  "cultural_fit_reasoning": "explanation",
  "overall_feedback": "3-5 sentences highlighting strengths and areas for improvement"
}"#;

/// Stage 3 system prompt: project report structuring.
pub const PROJECT_PARSE_SYSTEM: &str = "You are an expert code reviewer analysing \
    project reports. Extract the project overview, architecture, implementation \
    details, error handling and resilience measures, documentation quality and \
    any bonus features.";

/// Replace `{project_text}` before sending.
pub const PROJECT_PARSE_PROMPT_TEMPLATE: &str = r#"Parse the following project report and extract structured information.

PROJECT REPORT:
{project_text}

Return a JSON object with this schema:
{
  "project_overview": "summary of objective and approach",
  "technologies_used": ["tech1", "tech2"],
  "architecture": "description of system design",
  "key_features": ["feature1", "feature2"],
  "error_handling": "description of resilience measures",
  "documentation_quality": "assessment of documentation",
  "bonus_features": ["bonus1", "bonus2"],
  "code_quality_indicators": ["indicator1", "indicator2"]
}"#;

/// Stage 4 system prompt: project scoring against the case study brief.
pub const PROJECT_SCORE_SYSTEM: &str = "You are an expert technical evaluator \
    assessing project deliverables against a case study brief and rubric.

Evaluation criteria, each scored 1-5:
1. Correctness (30%): prompt design, LLM chaining, RAG implementation.
2. Code Quality (25%): clean, modular, tested.
3. Resilience (20%): error handling, retries, edge cases.
4. Documentation (15%): README, explanations, setup instructions.
5. Creativity (10%): bonus features and extras.";

/// Replace `{project_data}` and `{context}` before sending.
pub const PROJECT_SCORE_PROMPT_TEMPLATE: &str = r#"Evaluate this project report against the case study requirements.

PROJECT DATA:
{project_data}

CASE STUDY REQUIREMENTS AND RUBRIC:
{context}

Return a JSON object with this schema:
{
  "correctness_score": <1-5>,
  "correctness_reasoning": "explanation",
  "code_quality_score": <1-5>,
  "code_quality_reasoning": "explanation",
  "resilience_score": <1-5>,
  "resilience_reasoning": "explanation",
  "documentation_score": <1-5>,
  "documentation_reasoning": "explanation",
  "creativity_score": <1-5>,
  "creativity_reasoning": "explanation",
  "overall_feedback": "3-5 sentences on strengths and improvements"
}"#;

/// Stage 5 system prompt: final synthesis. Reply is plain prose.
pub const SUMMARY_SYSTEM: &str = "You are a senior technical hiring manager making \
    final candidate assessments. Synthesise the CV and project evaluations into a \
    concise overall summary that highlights two or three key strengths, names one or \
    two gaps, and ends with a clear hiring recommendation. Write 3-5 professional, \
    constructive sentences.";

/// Replace `{job_title}`, `{match_rate}`, `{cv_feedback}`, `{project_score}` and
/// `{project_feedback}` before sending.
pub const SUMMARY_PROMPT_TEMPLATE: &str = r#"Create an overall candidate assessment for: {job_title}

CV EVALUATION:
- Match Rate: {match_rate}
- Feedback: {cv_feedback}

PROJECT EVALUATION:
- Score: {project_score}/5.00
- Feedback: {project_feedback}

Provide a concise overall summary (3-5 sentences) that synthesises both evaluations and gives a clear recommendation."#;

pub const STRUCTURING_TEMPERATURE: f32 = 0.1;
pub const SCORING_TEMPERATURE: f32 = 0.3;
pub const SUMMARY_TEMPERATURE: f32 = 0.4;
