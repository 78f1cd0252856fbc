// Cross-cutting prompt fragments. Stage-specific prompts live in
// `evaluation::prompts`.

/// Appended to every system prompt whose reply is parsed as JSON.
pub const JSON_ONLY_SYSTEM: &str = "You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// Joins a stage system prompt with the JSON-only instruction.
pub fn json_system(stage_prompt: &str) -> String {
    format!("{stage_prompt}\n\n{JSON_ONLY_SYSTEM}")
}
