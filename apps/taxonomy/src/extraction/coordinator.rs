//! Extraction coordinator: drives skill extraction over a document collection.
//!
//! Flow per run: load checkpoint → skip processed documents → for each batch:
//! extract with at most `concurrency_limit` calls in flight → append mentions to
//! the log → commit checkpoint. The checkpoint is only written after every
//! document of a batch has finished, so a crash loses at most one batch.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::errors::AppError;
use crate::extraction::cache::{ContentHash, ExtractionCache};
use crate::extraction::checkpoint::{Checkpoint, CheckpointStore};
use crate::extraction::extractor::SkillExtractor;
use crate::extraction::reply::{ExtractionFailure, ExtractionOutcome};
use crate::models::{Document, ExtractedMention, SkillMention};

#[derive(Debug, Clone)]
pub struct ExtractionSettings {
    pub concurrency_limit: usize,
    pub batch_size: usize,
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
    pub call_timeout: Duration,
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self {
            concurrency_limit: 8,
            batch_size: 32,
            max_attempts: 4,
            backoff_base: Duration::from_millis(1000),
            backoff_cap: Duration::from_secs(30),
            call_timeout: Duration::from_secs(60),
        }
    }
}

impl ExtractionSettings {
    /// Delay before the attempt following `attempt` (1-based): base, 2×base, 4×base… capped.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.backoff_base
            .checked_mul(factor)
            .unwrap_or(self.backoff_cap)
            .min(self.backoff_cap)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractOptions {
    /// Discard the checkpoint and mention log before starting.
    pub fresh: bool,
    /// Re-attempt documents a previous run marked failed.
    pub retry_failed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentFailure {
    pub document_id: String,
    pub reason: String,
    pub attempts: u32,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ExtractionSummary {
    pub total_documents: usize,
    /// Documents skipped because an earlier run already checkpointed them.
    pub resumed_documents: usize,
    pub extracted_documents: usize,
    pub cache_hits: usize,
    pub failed_documents: usize,
    pub batches: usize,
    pub mentions: usize,
    pub failures: Vec<DocumentFailure>,
}

#[derive(Debug, Clone)]
pub struct ExtractionReport {
    /// Mentions of every successfully processed document, including those
    /// recovered from earlier runs.
    pub mentions: Vec<ExtractedMention>,
    pub summary: ExtractionSummary,
}

enum DocumentResult {
    Extracted {
        mentions: Vec<SkillMention>,
        from_cache: bool,
    },
    Failed {
        failure: ExtractionFailure,
        attempts: u32,
    },
}

pub struct ExtractionCoordinator {
    extractor: Arc<dyn SkillExtractor>,
    cache: Arc<dyn ExtractionCache>,
    checkpoints: CheckpointStore,
    settings: ExtractionSettings,
}

impl ExtractionCoordinator {
    pub fn new(
        extractor: Arc<dyn SkillExtractor>,
        cache: Arc<dyn ExtractionCache>,
        checkpoints: CheckpointStore,
        settings: ExtractionSettings,
    ) -> Self {
        Self {
            extractor,
            cache,
            checkpoints,
            settings,
        }
    }

    /// Extracts mentions from every document not already covered by the checkpoint.
    ///
    /// Per-document failures never fail the run. Errors are limited to the
    /// checkpoint itself being unreadable or unwritable.
    pub async fn extract(
        &self,
        documents: Vec<Document>,
        options: ExtractOptions,
    ) -> Result<ExtractionReport, AppError> {
        if options.fresh {
            info!("Fresh extraction run: resetting checkpoint in {}", self.checkpoints.dir().display());
            self.checkpoints.reset()?;
        }

        let mut checkpoint = self.checkpoints.load()?;
        if options.retry_failed && !checkpoint.failed_document_ids.is_empty() {
            info!(
                "Re-attempting {} previously failed documents",
                checkpoint.failed_document_ids.len()
            );
            let failed = std::mem::take(&mut checkpoint.failed_document_ids);
            checkpoint
                .processed_document_ids
                .retain(|id| !failed.contains(id));
        }

        let mut seen = HashSet::new();
        let documents: Vec<Document> = documents
            .into_iter()
            .filter(|d| seen.insert(d.id.clone()))
            .collect();

        let mut summary = ExtractionSummary {
            total_documents: documents.len(),
            ..Default::default()
        };

        let pending: Vec<Document> = documents
            .into_iter()
            .filter(|d| !checkpoint.is_processed(&d.id))
            .collect();
        summary.resumed_documents = summary.total_documents - pending.len();
        if summary.resumed_documents > 0 {
            info!(
                "Resuming extraction: {} documents already checkpointed, {} pending",
                summary.resumed_documents,
                pending.len()
            );
        }
        checkpoint.pending_batch_cursor = 0;

        let batch_size = self.settings.batch_size.max(1);
        for (batch_index, batch) in pending.chunks(batch_size).enumerate() {
            self.run_batch(batch, &mut checkpoint, &mut summary).await?;
            info!(
                "Batch {} complete: {}/{} pending documents processed",
                batch_index + 1,
                checkpoint.pending_batch_cursor,
                pending.len()
            );
        }

        let mentions = self.checkpoints.load_mentions(&checkpoint)?;
        summary.mentions = mentions.len();
        info!(
            "Extraction finished: {} documents, {} extracted ({} from cache), {} failed, {} mentions",
            summary.total_documents,
            summary.extracted_documents,
            summary.cache_hits,
            summary.failed_documents,
            summary.mentions
        );

        Ok(ExtractionReport { mentions, summary })
    }

    async fn run_batch(
        &self,
        batch: &[Document],
        checkpoint: &mut Checkpoint,
        summary: &mut ExtractionSummary,
    ) -> Result<(), AppError> {
        let mut results: Vec<(usize, DocumentResult)> = stream::iter(batch.iter().cloned().enumerate())
            .map(|(i, doc)| async move { (i, self.process_document(&doc).await) })
            .buffer_unordered(self.settings.concurrency_limit.max(1))
            .collect()
            .await;
        results.sort_by_key(|(i, _)| *i);

        let mut batch_mentions = Vec::new();
        for (i, result) in results {
            let doc = &batch[i];
            match result {
                DocumentResult::Extracted {
                    mentions,
                    from_cache,
                } => {
                    summary.extracted_documents += 1;
                    if from_cache {
                        summary.cache_hits += 1;
                    }
                    checkpoint.failed_document_ids.remove(&doc.id);
                    batch_mentions.extend(mentions.into_iter().map(|m| m.into_extracted(&doc.id)));
                }
                DocumentResult::Failed { failure, attempts } => {
                    warn!(
                        "Document {} failed after {attempts} attempt(s): {}",
                        doc.id,
                        failure.describe()
                    );
                    summary.failed_documents += 1;
                    summary.failures.push(DocumentFailure {
                        document_id: doc.id.clone(),
                        reason: failure.describe(),
                        attempts,
                    });
                    checkpoint.failed_document_ids.insert(doc.id.clone());
                }
            }
            checkpoint.processed_document_ids.insert(doc.id.clone());
        }

        // Log first, then checkpoint: the checkpoint must never cover unlogged mentions.
        self.checkpoints.append_mentions(&batch_mentions)?;
        checkpoint.pending_batch_cursor += batch.len();
        checkpoint.batches_committed += 1;
        checkpoint.updated_at = Some(Utc::now());
        self.checkpoints.commit(checkpoint)?;
        summary.batches += 1;
        Ok(())
    }

    async fn process_document(&self, document: &Document) -> DocumentResult {
        if document.raw_text.trim().is_empty() {
            debug!("Document {} has no text; nothing to extract", document.id);
            return DocumentResult::Extracted {
                mentions: Vec::new(),
                from_cache: false,
            };
        }

        let key = ContentHash::of_text(&document.raw_text);
        if let Some(mentions) = self.cache.get(&key).await {
            debug!("Cache hit for document {}", document.id);
            return DocumentResult::Extracted {
                mentions,
                from_cache: true,
            };
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            let outcome = match tokio::time::timeout(
                self.settings.call_timeout,
                self.extractor.extract(document),
            )
            .await
            {
                Ok(outcome) => outcome,
                Err(_) => ExtractionOutcome::Failed(ExtractionFailure::Timeout),
            };

            match outcome {
                ExtractionOutcome::Extracted(mentions) => {
                    self.cache.put(&key, &mentions).await;
                    return DocumentResult::Extracted {
                        mentions,
                        from_cache: false,
                    };
                }
                ExtractionOutcome::Failed(failure)
                    if failure.is_transient() && attempt < self.settings.max_attempts =>
                {
                    let delay = self.settings.backoff_for(attempt);
                    warn!(
                        "Extraction attempt {attempt} for {} failed ({}), retrying after {}ms...",
                        document.id,
                        failure.describe(),
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                }
                ExtractionOutcome::Failed(failure) => {
                    return DocumentResult::Failed {
                        failure,
                        attempts: attempt,
                    };
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::extraction::cache::MemoryExtractionCache;
    use crate::models::{ProficiencyLevel, SkillCategory};

    /// Replays scripted outcomes per document; unscripted documents yield
    /// one mention per comma-separated word of their text.
    #[derive(Default)]
    pub(crate) struct ScriptedExtractor {
        scripts: Mutex<HashMap<String, VecDeque<ExtractionOutcome>>>,
        pub calls: Mutex<Vec<String>>,
        in_flight: AtomicUsize,
        pub max_in_flight: AtomicUsize,
        pub latency: Duration,
    }

    impl ScriptedExtractor {
        pub(crate) fn with_latency(latency: Duration) -> Self {
            Self {
                latency,
                ..Default::default()
            }
        }

        pub(crate) fn script(&self, doc: &str, outcomes: Vec<ExtractionOutcome>) {
            self.scripts
                .lock()
                .unwrap()
                .insert(doc.to_string(), outcomes.into());
        }

        pub(crate) fn calls_for(&self, doc: &str) -> usize {
            self.calls.lock().unwrap().iter().filter(|d| *d == doc).count()
        }
    }

    pub(crate) fn skill(name: &str) -> SkillMention {
        SkillMention {
            raw_name: name.to_string(),
            category: SkillCategory::Other,
            confidence: 0.9,
            required: true,
            proficiency_level: ProficiencyLevel::Unspecified,
        }
    }

    #[async_trait]
    impl SkillExtractor for ScriptedExtractor {
        async fn extract(&self, document: &Document) -> ExtractionOutcome {
            self.calls.lock().unwrap().push(document.id.clone());
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let scripted = self
                .scripts
                .lock()
                .unwrap()
                .get_mut(&document.id)
                .and_then(|q| q.pop_front());
            scripted.unwrap_or_else(|| {
                ExtractionOutcome::Extracted(
                    document
                        .raw_text
                        .split(',')
                        .map(|s| skill(s.trim()))
                        .collect(),
                )
            })
        }
    }

    fn settings(batch_size: usize, concurrency_limit: usize) -> ExtractionSettings {
        ExtractionSettings {
            concurrency_limit,
            batch_size,
            max_attempts: 3,
            backoff_base: Duration::from_millis(100),
            backoff_cap: Duration::from_secs(1),
            call_timeout: Duration::from_secs(5),
        }
    }

    fn coordinator(
        extractor: Arc<ScriptedExtractor>,
        dir: &std::path::Path,
        settings: ExtractionSettings,
    ) -> ExtractionCoordinator {
        ExtractionCoordinator::new(
            extractor,
            Arc::new(MemoryExtractionCache::new()),
            CheckpointStore::new(dir),
            settings,
        )
    }

    fn docs(n: usize) -> Vec<Document> {
        (0..n)
            .map(|i| Document::new(format!("doc-{i}"), "Engineer", format!("Rust, Skill{i}")))
            .collect()
    }

    fn sorted(mut mentions: Vec<ExtractedMention>) -> Vec<(String, String)> {
        mentions.sort_by(|a, b| (&a.document_id, &a.raw_name).cmp(&(&b.document_id, &b.raw_name)));
        mentions
            .into_iter()
            .map(|m| (m.document_id, m.raw_name))
            .collect()
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let s = settings(1, 1);
        assert_eq!(s.backoff_for(1), Duration::from_millis(100));
        assert_eq!(s.backoff_for(2), Duration::from_millis(200));
        assert_eq!(s.backoff_for(3), Duration::from_millis(400));
        assert_eq!(s.backoff_for(10), Duration::from_secs(1));
        assert_eq!(s.backoff_for(40), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_extracts_all_documents_in_batches() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = Arc::new(ScriptedExtractor::default());
        let coord = coordinator(extractor.clone(), dir.path(), settings(2, 2));

        let report = coord.extract(docs(5), ExtractOptions::default()).await.unwrap();
        assert_eq!(report.summary.batches, 3);
        assert_eq!(report.summary.extracted_documents, 5);
        assert_eq!(report.mentions.len(), 10);
        assert!(report.mentions.iter().any(|m| m.document_id == "doc-3" && m.raw_name == "Skill3"));

        let cp = CheckpointStore::new(dir.path()).load().unwrap();
        assert_eq!(cp.processed_document_ids.len(), 5);
        assert_eq!(cp.pending_batch_cursor, 5);
        assert_eq!(cp.batches_committed, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_limit_holds_under_large_batches() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = Arc::new(ScriptedExtractor::with_latency(Duration::from_millis(50)));
        let coord = coordinator(extractor.clone(), dir.path(), settings(12, 3));

        coord.extract(docs(12), ExtractOptions::default()).await.unwrap();
        let max = extractor.max_in_flight.load(Ordering::SeqCst);
        assert!(max <= 3, "max in flight was {max}");
        assert!(max > 1, "calls never overlapped");
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_are_retried() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = Arc::new(ScriptedExtractor::default());
        extractor.script(
            "doc-0",
            vec![
                ExtractionOutcome::Failed(ExtractionFailure::RateLimited("429".into())),
                ExtractionOutcome::Failed(ExtractionFailure::Malformed("prose".into())),
            ],
        );
        let coord = coordinator(extractor.clone(), dir.path(), settings(4, 4));

        let report = coord.extract(docs(1), ExtractOptions::default()).await.unwrap();
        assert_eq!(extractor.calls_for("doc-0"), 3);
        assert_eq!(report.summary.failed_documents, 0);
        assert_eq!(report.mentions.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_mark_document_failed_and_run_completes() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = Arc::new(ScriptedExtractor::default());
        let timeout = || ExtractionOutcome::Failed(ExtractionFailure::Timeout);
        extractor.script("doc-1", vec![timeout(), timeout(), timeout()]);
        let coord = coordinator(extractor.clone(), dir.path(), settings(4, 4));

        let report = coord.extract(docs(3), ExtractOptions::default()).await.unwrap();
        assert_eq!(extractor.calls_for("doc-1"), 3);
        assert_eq!(report.summary.failed_documents, 1);
        assert_eq!(report.summary.failures[0].document_id, "doc-1");
        assert!(report.mentions.iter().all(|m| m.document_id != "doc-1"));

        let cp = CheckpointStore::new(dir.path()).load().unwrap();
        assert!(cp.is_processed("doc-1"));
        assert!(cp.failed_document_ids.contains("doc-1"));
    }

    #[tokio::test]
    async fn test_rejected_request_is_not_retried() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = Arc::new(ScriptedExtractor::default());
        extractor.script(
            "doc-0",
            vec![ExtractionOutcome::Failed(ExtractionFailure::Rejected("401".into()))],
        );
        let coord = coordinator(extractor.clone(), dir.path(), settings(4, 4));

        let report = coord.extract(docs(1), ExtractOptions::default()).await.unwrap();
        assert_eq!(extractor.calls_for("doc-0"), 1);
        assert_eq!(report.summary.failures[0].attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_calls_time_out_and_retry() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = Arc::new(ScriptedExtractor::with_latency(Duration::from_secs(10)));
        let coord = coordinator(extractor.clone(), dir.path(), settings(1, 1));

        let report = coord.extract(docs(1), ExtractOptions::default()).await.unwrap();
        assert_eq!(extractor.calls_for("doc-0"), 3);
        assert_eq!(report.summary.failed_documents, 1);
        assert!(report.summary.failures[0].reason.contains("timeout"));
    }

    #[tokio::test]
    async fn test_duplicate_text_hits_cache() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = Arc::new(ScriptedExtractor::default());
        let coord = coordinator(extractor.clone(), dir.path(), settings(1, 1));
        let documents = vec![
            Document::new("a", "t", "Rust, Go"),
            Document::new("b", "t", "Rust,  Go"),
        ];

        let report = coord.extract(documents, ExtractOptions::default()).await.unwrap();
        assert_eq!(extractor.calls.lock().unwrap().len(), 1);
        assert_eq!(report.summary.cache_hits, 1);
        assert_eq!(report.mentions.iter().filter(|m| m.document_id == "b").count(), 2);
    }

    #[tokio::test]
    async fn test_resumed_run_matches_full_run() {
        let all = docs(7);

        let full_dir = tempfile::tempdir().unwrap();
        let full = coordinator(Arc::new(ScriptedExtractor::default()), full_dir.path(), settings(3, 2))
            .extract(all.clone(), ExtractOptions::default())
            .await
            .unwrap();

        // Interrupted run: only the first batch made it before the crash.
        let dir = tempfile::tempdir().unwrap();
        let first = Arc::new(ScriptedExtractor::default());
        coordinator(first, dir.path(), settings(3, 2))
            .extract(all[..3].to_vec(), ExtractOptions::default())
            .await
            .unwrap();

        let second = Arc::new(ScriptedExtractor::default());
        let resumed = coordinator(second.clone(), dir.path(), settings(3, 2))
            .extract(all.clone(), ExtractOptions::default())
            .await
            .unwrap();

        assert_eq!(resumed.summary.resumed_documents, 3);
        assert_eq!(second.calls_for("doc-0"), 0);
        assert_eq!(second.calls.lock().unwrap().len(), 4);
        assert_eq!(sorted(resumed.mentions), sorted(full.mentions));
    }

    #[tokio::test]
    async fn test_fresh_run_discards_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = Arc::new(ScriptedExtractor::default());
        let coord = coordinator(extractor.clone(), dir.path(), settings(2, 2));
        coord.extract(docs(2), ExtractOptions::default()).await.unwrap();

        let again = coord.extract(docs(2), ExtractOptions::default()).await.unwrap();
        assert_eq!(again.summary.resumed_documents, 2);

        let fresh = coord
            .extract(
                docs(2),
                ExtractOptions {
                    fresh: true,
                    retry_failed: false,
                },
            )
            .await
            .unwrap();
        assert_eq!(fresh.summary.resumed_documents, 0);
        assert_eq!(fresh.summary.extracted_documents, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_failed_reattempts_only_failures() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = Arc::new(ScriptedExtractor::default());
        let rejected = || ExtractionOutcome::Failed(ExtractionFailure::Rejected("400".into()));
        extractor.script("doc-0", vec![rejected()]);
        let coord = coordinator(extractor.clone(), dir.path(), settings(4, 4));

        let first = coord.extract(docs(2), ExtractOptions::default()).await.unwrap();
        assert_eq!(first.summary.failed_documents, 1);

        let second = coord
            .extract(
                docs(2),
                ExtractOptions {
                    fresh: false,
                    retry_failed: true,
                },
            )
            .await
            .unwrap();
        assert_eq!(second.summary.resumed_documents, 1);
        assert_eq!(second.summary.failed_documents, 0);
        assert_eq!(extractor.calls_for("doc-0"), 2);
        assert!(second.mentions.iter().any(|m| m.document_id == "doc-0"));
    }
}
