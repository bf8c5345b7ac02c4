// Pipeline orchestration: one run drives every stage from documents to the
// resolution snapshot. Runs are admitted one at a time.

pub mod artifacts;
pub mod handlers;
pub mod run;

pub use artifacts::ArtifactExporter;
pub use run::{Pipeline, RunRegistry, RunSummary};
