//! Free-text skill strings → canonical skills.
//!
//! Each input is tried against the exact tier, then the alias tier, then the
//! semantic tier; the first hit wins. Resolution only reads the snapshot.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::embedding::{embed_all, Embedder};
use crate::taxonomy::index::NameMatch;
use crate::taxonomy::normalize::normalize_skill_name;
use crate::taxonomy::snapshot::TaxonomySnapshot;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResolutionReport {
    /// Canonical names hit by the exact tier, deduplicated, in input order.
    pub validated: Vec<String>,
    pub alias_matches: BTreeMap<String, String>,
    pub semantic_matches: BTreeMap<String, String>,
    pub unmatched: Vec<String>,
    /// Resolved inputs / all inputs; 0.0 for an empty request.
    pub coverage: f32,
}

pub struct Resolver {
    embedder: Arc<dyn Embedder>,
    threshold: f32,
    embed_concurrency: usize,
}

impl Resolver {
    pub fn new(embedder: Arc<dyn Embedder>, threshold: f32, embed_concurrency: usize) -> Self {
        Self {
            embedder,
            threshold,
            embed_concurrency,
        }
    }

    pub async fn resolve(&self, snapshot: &TaxonomySnapshot, inputs: &[String]) -> ResolutionReport {
        let mut report = ResolutionReport::default();
        if inputs.is_empty() {
            return report;
        }

        let mut seen_validated = BTreeSet::new();
        let mut resolved = 0usize;
        let mut pending: Vec<&String> = Vec::new();

        for raw in inputs {
            if normalize_skill_name(raw).is_empty() {
                report.unmatched.push(raw.clone());
                continue;
            }
            match snapshot.index().lookup(raw) {
                Some((canonical, NameMatch::Canonical)) => {
                    resolved += 1;
                    if seen_validated.insert(canonical.to_string()) {
                        report.validated.push(canonical.to_string());
                    }
                }
                Some((canonical, NameMatch::Alias)) => {
                    resolved += 1;
                    report
                        .alias_matches
                        .insert(raw.clone(), canonical.to_string());
                }
                None => pending.push(raw),
            }
        }

        if !pending.is_empty() {
            resolved += self.semantic_tier(snapshot, &pending, &mut report).await;
        }

        report.coverage = resolved as f32 / inputs.len() as f32;
        debug!(
            "Resolved {resolved}/{} skill strings (coverage {:.2})",
            inputs.len(),
            report.coverage
        );
        report
    }

    /// Returns how many of `pending` matched; the rest go to `unmatched`.
    async fn semantic_tier(
        &self,
        snapshot: &TaxonomySnapshot,
        pending: &[&String],
        report: &mut ResolutionReport,
    ) -> usize {
        let unmatched = |report: &mut ResolutionReport| {
            report.unmatched.extend(pending.iter().map(|s| s.to_string()));
            0
        };
        if snapshot.is_empty() {
            return unmatched(report);
        }

        let keys: Vec<String> = pending.iter().map(|s| normalize_skill_name(s)).collect();
        let vectors = match embed_all(self.embedder.as_ref(), &keys, self.embed_concurrency).await {
            Ok(v) => v,
            Err(e) => {
                warn!("Semantic tier unavailable, {} inputs left unmatched: {e}", pending.len());
                return unmatched(report);
            }
        };

        let mut matched = 0;
        for (raw, vector) in pending.iter().zip(&vectors) {
            match snapshot.nearest(vector) {
                Some((skill, score)) if score >= self.threshold => {
                    debug!("'{raw}' ~ '{}' (cosine {score:.3})", skill.canonical_name);
                    report
                        .semantic_matches
                        .insert(raw.to_string(), skill.canonical_name.clone());
                    matched += 1;
                }
                _ => report.unmatched.push(raw.to_string()),
            }
        }
        matched
    }
}
