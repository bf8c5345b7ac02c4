//! Crash-resumable extraction state.
//!
//! Two files live in the checkpoint directory:
//! - `checkpoint.json`: the processed/failed document id sets and batch cursor,
//!   replaced atomically (temp file + rename) after every completed batch.
//! - `mentions.jsonl`: an append-only log of the mentions each batch produced,
//!   written before the checkpoint that covers them.
//!
//! A crash between the two writes leaves log lines for documents the checkpoint
//! does not list; those documents are redone on resume and their newer lines
//! supersede the old ones.

use std::collections::{BTreeSet, HashMap};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::ExtractedMention;

const CHECKPOINT_FILE: &str = "checkpoint.json";
const MENTION_LOG_FILE: &str = "mentions.jsonl";

/// Persisted progress marker for one extraction pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Every document that has been attempted, including failures.
    pub processed_document_ids: BTreeSet<String>,
    /// Subset of `processed_document_ids` whose extraction exhausted its retries.
    #[serde(default)]
    pub failed_document_ids: BTreeSet<String>,
    /// Offset into the pending document sequence where the next batch starts.
    pub pending_batch_cursor: usize,
    #[serde(default)]
    pub batches_committed: u64,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Checkpoint {
    pub fn is_processed(&self, document_id: &str) -> bool {
        self.processed_document_ids.contains(document_id)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct MentionLogLine {
    batch_id: Uuid,
    mention: ExtractedMention,
}

/// File-backed checkpoint storage rooted at one directory.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn checkpoint_path(&self) -> PathBuf {
        self.dir.join(CHECKPOINT_FILE)
    }

    fn log_path(&self) -> PathBuf {
        self.dir.join(MENTION_LOG_FILE)
    }

    /// Loads the checkpoint. A missing file is an empty checkpoint; an
    /// unreadable or undecodable one aborts the run.
    pub fn load(&self) -> Result<Checkpoint, AppError> {
        let raw = match fs::read_to_string(self.checkpoint_path()) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Checkpoint::default()),
            Err(e) => {
                return Err(AppError::Checkpoint(format!(
                    "cannot read {}: {e}",
                    self.checkpoint_path().display()
                )))
            }
        };
        serde_json::from_str(&raw).map_err(|e| {
            AppError::Checkpoint(format!(
                "corrupt checkpoint {}: {e}",
                self.checkpoint_path().display()
            ))
        })
    }

    /// Replaces the checkpoint atomically.
    pub fn commit(&self, checkpoint: &Checkpoint) -> Result<(), AppError> {
        fs::create_dir_all(&self.dir).map_err(checkpoint_io)?;
        let payload = serde_json::to_vec_pretty(checkpoint)
            .map_err(|e| AppError::Checkpoint(format!("cannot encode checkpoint: {e}")))?;

        let mut tmp = NamedTempFile::new_in(&self.dir).map_err(checkpoint_io)?;
        tmp.write_all(&payload).map_err(checkpoint_io)?;
        tmp.as_file().sync_all().map_err(checkpoint_io)?;
        tmp.persist(self.checkpoint_path())
            .map_err(|e| AppError::Checkpoint(format!("cannot persist checkpoint: {e}")))?;
        Ok(())
    }

    /// Appends one batch's mentions to the log.
    pub fn append_mentions(&self, mentions: &[ExtractedMention]) -> Result<(), AppError> {
        if mentions.is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.dir).map_err(checkpoint_io)?;

        let batch_id = Uuid::new_v4();
        let mut buf = Vec::new();
        for mention in mentions {
            let line = MentionLogLine {
                batch_id,
                mention: mention.clone(),
            };
            serde_json::to_writer(&mut buf, &line)
                .map_err(|e| AppError::Checkpoint(format!("cannot encode mention: {e}")))?;
            buf.push(b'\n');
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path())
            .map_err(checkpoint_io)?;
        file.write_all(&buf).map_err(checkpoint_io)?;
        file.sync_data().map_err(checkpoint_io)?;
        Ok(())
    }

    /// Loads the logged mentions of successfully processed documents.
    ///
    /// For each document only the lines from its most recent batch are kept.
    pub fn load_mentions(&self, checkpoint: &Checkpoint) -> Result<Vec<ExtractedMention>, AppError> {
        let raw = match fs::read_to_string(self.log_path()) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(checkpoint_io(e)),
        };

        let ends_cleanly = raw.ends_with('\n');
        let lines: Vec<&str> = raw.lines().filter(|l| !l.trim().is_empty()).collect();
        let mut parsed = Vec::with_capacity(lines.len());
        for (i, line) in lines.iter().enumerate() {
            match serde_json::from_str::<MentionLogLine>(line) {
                Ok(entry) => parsed.push(entry),
                Err(e) if i + 1 == lines.len() && !ends_cleanly => {
                    warn!("Ignoring truncated trailing mention log line: {e}");
                }
                Err(e) => {
                    return Err(AppError::Checkpoint(format!(
                        "corrupt mention log {} line {}: {e}",
                        self.log_path().display(),
                        i + 1
                    )))
                }
            }
        }

        let mut latest_batch: HashMap<&str, Uuid> = HashMap::new();
        for entry in &parsed {
            latest_batch.insert(entry.mention.document_id.as_str(), entry.batch_id);
        }

        let mentions: Vec<ExtractedMention> = parsed
            .iter()
            .filter(|entry| {
                let doc = entry.mention.document_id.as_str();
                checkpoint.is_processed(doc)
                    && !checkpoint.failed_document_ids.contains(doc)
                    && latest_batch.get(doc) == Some(&entry.batch_id)
            })
            .map(|entry| entry.mention.clone())
            .collect();

        Ok(mentions)
    }

    /// Deletes all checkpoint state. Only called for an explicit fresh run.
    pub fn reset(&self) -> Result<(), AppError> {
        for path in [self.checkpoint_path(), self.log_path()] {
            match fs::remove_file(&path) {
                Ok(()) => info!("Removed {}", path.display()),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(checkpoint_io(e)),
            }
        }
        Ok(())
    }
}

fn checkpoint_io(e: std::io::Error) -> AppError {
    AppError::Checkpoint(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ProficiencyLevel, SkillCategory};

    fn mention(doc: &str, name: &str) -> ExtractedMention {
        ExtractedMention {
            document_id: doc.into(),
            raw_name: name.into(),
            category: SkillCategory::Other,
            confidence: 0.9,
            required: true,
            proficiency_level: ProficiencyLevel::Unspecified,
        }
    }

    fn processed(ids: &[&str]) -> Checkpoint {
        Checkpoint {
            processed_document_ids: ids.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_missing_checkpoint_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("nested"));
        assert_eq!(store.load().unwrap(), Checkpoint::default());
        assert!(store.load_mentions(&Checkpoint::default()).unwrap().is_empty());
    }

    #[test]
    fn test_commit_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        let mut cp = processed(&["a", "b"]);
        cp.failed_document_ids.insert("b".into());
        cp.pending_batch_cursor = 2;
        cp.batches_committed = 1;
        store.commit(&cp).unwrap();
        assert_eq!(store.load().unwrap(), cp);
    }

    #[test]
    fn test_corrupt_checkpoint_aborts() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CHECKPOINT_FILE), "{not json").unwrap();
        let store = CheckpointStore::new(dir.path());
        assert!(matches!(store.load(), Err(AppError::Checkpoint(_))));
    }

    #[test]
    fn test_unprocessed_and_failed_documents_are_filtered() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        store
            .append_mentions(&[mention("a", "Rust"), mention("b", "Go"), mention("c", "Java")])
            .unwrap();
        let mut cp = processed(&["a", "b"]);
        cp.failed_document_ids.insert("b".into());

        let loaded = store.load_mentions(&cp).unwrap();
        assert_eq!(loaded, vec![mention("a", "Rust")]);
    }

    #[test]
    fn test_redone_batch_supersedes_older_lines() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        store
            .append_mentions(&[mention("a", "Rust"), mention("a", "Tokio")])
            .unwrap();
        store.append_mentions(&[mention("a", "Rust")]).unwrap();

        let loaded = store.load_mentions(&processed(&["a"])).unwrap();
        assert_eq!(loaded, vec![mention("a", "Rust")]);
    }

    #[test]
    fn test_truncated_tail_is_ignored_but_corruption_is_not() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        store.append_mentions(&[mention("a", "Rust")]).unwrap();

        let log = dir.path().join(MENTION_LOG_FILE);
        let mut content = fs::read_to_string(&log).unwrap();
        content.push_str("{\"batch_id\":\"trunc");
        fs::write(&log, &content).unwrap();
        assert_eq!(store.load_mentions(&processed(&["a"])).unwrap().len(), 1);

        content.push('\n');
        fs::write(&log, &content).unwrap();
        assert!(matches!(
            store.load_mentions(&processed(&["a"])),
            Err(AppError::Checkpoint(_))
        ));
    }

    #[test]
    fn test_reset_removes_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        store.commit(&processed(&["a"])).unwrap();
        store.append_mentions(&[mention("a", "Rust")]).unwrap();
        store.reset().unwrap();
        assert_eq!(store.load().unwrap(), Checkpoint::default());
        store.reset().unwrap();
    }
}
