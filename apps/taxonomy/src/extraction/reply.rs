//! Boundary validation for model replies.
//!
//! The model's JSON is untrusted. It is parsed into loose `Raw*` shapes, then
//! validated into `SkillMention`s. Nothing downstream ever sees an unvalidated
//! mention: a reply is either a clean mention list or a typed failure.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

use crate::models::{ProficiencyLevel, SkillCategory, SkillMention};
use crate::taxonomy::normalize::{clean_surface_form, normalize_skill_name};

/// Skill names longer than this are sentences the model failed to split.
const MAX_SKILL_NAME_CHARS: usize = 80;
/// Used when the model omits a confidence score.
const DEFAULT_CONFIDENCE: f32 = 0.5;

/// Result of one extraction attempt for one document.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionOutcome {
    Extracted(Vec<SkillMention>),
    Failed(ExtractionFailure),
}

/// Why an extraction attempt produced no mentions.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionFailure {
    /// The call exceeded its per-call timeout.
    Timeout,
    RateLimited(String),
    /// 5xx / 408 from the provider.
    Upstream { status: u16, message: String },
    /// Connection-level failure before a response arrived.
    Transport(String),
    /// The reply was not the JSON shape we asked for.
    Malformed(String),
    /// The provider refused the request (4xx other than 408/429). Retrying will not help.
    Rejected(String),
}

impl ExtractionFailure {
    pub fn is_transient(&self) -> bool {
        !matches!(self, ExtractionFailure::Rejected(_))
    }

    pub fn describe(&self) -> String {
        match self {
            ExtractionFailure::Timeout => "timeout".to_string(),
            ExtractionFailure::RateLimited(m) => format!("rate limited: {m}"),
            ExtractionFailure::Upstream { status, message } => {
                format!("upstream {status}: {message}")
            }
            ExtractionFailure::Transport(m) => format!("transport: {m}"),
            ExtractionFailure::Malformed(m) => format!("malformed reply: {m}"),
            ExtractionFailure::Rejected(m) => format!("rejected: {m}"),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawReply {
    Wrapped { skills: Vec<RawSkill> },
    Bare(Vec<RawSkill>),
}

#[derive(Debug, Deserialize)]
struct RawSkill {
    #[serde(alias = "skill", alias = "raw_name")]
    name: Option<String>,
    category: Option<String>,
    confidence: Option<Value>,
    required: Option<Value>,
    #[serde(alias = "proficiency", alias = "level")]
    proficiency_level: Option<String>,
}

/// Parses and validates the text of a model reply.
pub fn parse_reply(text: &str, min_confidence: f32) -> ExtractionOutcome {
    let raw: RawReply = match serde_json::from_str(text) {
        Ok(raw) => raw,
        Err(e) => return ExtractionOutcome::Failed(ExtractionFailure::Malformed(e.to_string())),
    };
    let skills = match raw {
        RawReply::Wrapped { skills } => skills,
        RawReply::Bare(skills) => skills,
    };

    let mentions = skills
        .into_iter()
        .filter_map(validate_skill)
        .filter(|m| m.confidence >= min_confidence)
        .collect();

    ExtractionOutcome::Extracted(merge_mentions(mentions))
}

fn validate_skill(raw: RawSkill) -> Option<SkillMention> {
    let raw_name = clean_surface_form(raw.name.as_deref()?);
    if raw_name.is_empty() || raw_name.chars().count() > MAX_SKILL_NAME_CHARS {
        return None;
    }

    let confidence = match raw.confidence {
        None | Some(Value::Null) => DEFAULT_CONFIDENCE,
        Some(Value::Number(n)) => n.as_f64()? as f32,
        Some(Value::String(s)) => s.trim().parse::<f32>().ok()?,
        Some(_) => return None,
    };
    if !confidence.is_finite() {
        return None;
    }

    let required = match raw.required {
        Some(Value::Bool(b)) => b,
        Some(Value::String(s)) => matches!(s.trim().to_lowercase().as_str(), "true" | "yes" | "required"),
        _ => false,
    };

    Some(SkillMention {
        raw_name,
        category: raw
            .category
            .as_deref()
            .map(SkillCategory::parse)
            .unwrap_or_default(),
        confidence: confidence.clamp(0.0, 1.0),
        required,
        proficiency_level: raw
            .proficiency_level
            .as_deref()
            .map(ProficiencyLevel::parse)
            .unwrap_or_default(),
    })
}

/// Collapses mentions of one document that normalize to the same name.
///
/// The surviving mention keeps the surface form, category and level of the most
/// confident occurrence; `required` is true if any occurrence was required.
/// First-seen order is preserved.
pub fn merge_mentions(mentions: Vec<SkillMention>) -> Vec<SkillMention> {
    let mut order: Vec<String> = Vec::new();
    let mut merged: HashMap<String, SkillMention> = HashMap::new();

    for mention in mentions {
        let key = normalize_skill_name(&mention.raw_name);
        match merged.get_mut(&key) {
            Some(existing) => {
                let required = existing.required || mention.required;
                if mention.confidence > existing.confidence {
                    *existing = mention;
                }
                existing.required = required;
            }
            None => {
                order.push(key.clone());
                merged.insert(key, mention);
            }
        }
    }

    order
        .into_iter()
        .filter_map(|key| merged.remove(&key))
        .collect()
}
