// Skill extraction: documents in, validated mentions out.
// All model calls go through llm_client; no direct Anthropic calls here.

pub mod cache;
pub mod checkpoint;
pub mod coordinator;
pub mod extractor;
pub mod prompts;
pub mod reply;

pub use cache::{ExtractionCache, MemoryExtractionCache, RedisExtractionCache};
pub use checkpoint::CheckpointStore;
pub use coordinator::{
    ExtractOptions, ExtractionCoordinator, ExtractionReport, ExtractionSettings, ExtractionSummary,
};
pub use extractor::{LlmSkillExtractor, SkillExtractor};
