// Shared prompt constants.
// Each service that needs LLM calls defines its own prompts.rs alongside it.
// This file contains cross-cutting prompt fragments.

/// Keeps extraction anchored in the posting text.
pub const GROUNDING_INSTRUCTION: &str = "\
    CRITICAL: Only report skills that are explicitly stated or unambiguously implied \
    by the posting text. Do NOT infer skills from the company, industry or job title alone. \
    Use the skill name exactly as written in the posting.";
