use async_trait::async_trait;

use crate::extraction::prompts::{SKILL_EXTRACTION_PROMPT_TEMPLATE, SKILL_EXTRACTION_SYSTEM};
use crate::extraction::reply::{parse_reply, ExtractionFailure, ExtractionOutcome};
use crate::llm_client::prompts::GROUNDING_INSTRUCTION;
use crate::llm_client::{LlmClient, LlmError};
use crate::models::Document;

/// Postings longer than this are truncated before prompting.
const MAX_POSTING_CHARS: usize = 24_000;

/// One skill-extraction attempt for one document.
///
/// Implementations never return errors: every failure is folded into
/// `ExtractionOutcome::Failed` so the coordinator can decide whether to retry.
#[async_trait]
pub trait SkillExtractor: Send + Sync {
    async fn extract(&self, document: &Document) -> ExtractionOutcome;
}

/// Extracts skills by prompting Claude through the shared `LlmClient`.
pub struct LlmSkillExtractor {
    llm: LlmClient,
    min_confidence: f32,
}

impl LlmSkillExtractor {
    pub fn new(llm: LlmClient, min_confidence: f32) -> Self {
        Self {
            llm,
            min_confidence,
        }
    }
}

#[async_trait]
impl SkillExtractor for LlmSkillExtractor {
    async fn extract(&self, document: &Document) -> ExtractionOutcome {
        let prompt = build_prompt(document);
        match self.llm.call_text(&prompt, SKILL_EXTRACTION_SYSTEM).await {
            Ok(text) => parse_reply(&text, self.min_confidence),
            Err(e) => ExtractionOutcome::Failed(classify_llm_error(e)),
        }
    }
}

fn build_prompt(document: &Document) -> String {
    let text: String = document.raw_text.chars().take(MAX_POSTING_CHARS).collect();
    SKILL_EXTRACTION_PROMPT_TEMPLATE
        .replace("{grounding}", GROUNDING_INSTRUCTION)
        .replace("{title}", &document.title)
        .replace("{posting_text}", &text)
}

fn classify_llm_error(error: LlmError) -> ExtractionFailure {
    match error {
        LlmError::Http(e) if e.is_timeout() => ExtractionFailure::Timeout,
        LlmError::RateLimited(m) => ExtractionFailure::RateLimited(m),
        LlmError::Api { status, message } if status == 408 || status >= 500 => {
            ExtractionFailure::Upstream { status, message }
        }
        LlmError::Api { status, message } => {
            ExtractionFailure::Rejected(format!("status {status}: {message}"))
        }
        LlmError::Http(e) => ExtractionFailure::Transport(e.to_string()),
        LlmError::EmptyContent => ExtractionFailure::Malformed("empty reply".to_string()),
    }
}
