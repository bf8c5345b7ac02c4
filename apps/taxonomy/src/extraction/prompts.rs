// Prompt constants for skill extraction.
// Reuses cross-cutting fragments from llm_client::prompts.

/// System prompt for skill extraction. Enforces JSON-only output.
pub const SKILL_EXTRACTION_SYSTEM: &str =
    "You are an expert technical recruiter who catalogues the skills a job posting asks for. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// Skill extraction prompt template. Replace `{title}`, `{posting_text}` and
/// `{grounding}` before sending.
pub const SKILL_EXTRACTION_PROMPT_TEMPLATE: &str = r#"Extract every skill the following job posting asks for.

Return a JSON object with this EXACT schema (no extra fields):
{
  "skills": [
    {
      "name": "PostgreSQL",
      "category": "database",
      "confidence": 0.9,
      "required": true,
      "proficiency_level": "advanced"
    }
  ]
}

Rules:

NAME: the skill as written in the posting, without version numbers or years of experience.
One entry per distinct skill. Split lists ("AWS/GCP") into separate entries.

CATEGORY (pick exactly one):
language, framework, tool, platform, database, methodology, domain, soft, certification, other

CONFIDENCE: 0.0 – 1.0, how sure you are that the posting asks for this skill.

REQUIRED: true for must-haves ("required", "must have", minimum years),
false for nice-to-haves ("preferred", "bonus", "a plus").

PROFICIENCY LEVEL (pick exactly one):
beginner, intermediate, advanced, expert, unspecified

{grounding}

Job title: {title}

Job posting:
{posting_text}"#;
