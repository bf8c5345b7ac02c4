//! Mentions → canonical skills.
//!
//! Every distinct normalized mention name is one clustering point. The point's
//! display form is its most common surface spelling. Each cluster becomes a
//! canonical skill labelled by its most mentioned point; the other points'
//! display forms become aliases.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::info;

use crate::embedding::{centroid, embed_all, Embedder, EmbeddingError};
use crate::models::{CanonicalSkill, ExtractedMention, SkillCategory};
use crate::taxonomy::dbscan::{dbscan, DbscanParams};
use crate::taxonomy::normalize::{clean_surface_form, normalize_skill_name};

#[derive(Debug, Clone, Copy)]
pub struct CanonicalizeSettings {
    pub dbscan: DbscanParams,
    pub embed_concurrency: usize,
}

impl Default for CanonicalizeSettings {
    fn default() -> Self {
        Self {
            dbscan: DbscanParams::default(),
            embed_concurrency: 4,
        }
    }
}

#[derive(Debug, Default)]
struct NameStats {
    mentions: usize,
    surfaces: BTreeMap<String, usize>,
    categories: BTreeMap<SkillCategory, usize>,
}

impl NameStats {
    /// Most frequent surface spelling; ties go to the smallest string.
    fn display(&self) -> &str {
        self.surfaces
            .iter()
            .max_by_key(|(surface, count)| (**count, Reverse(*surface)))
            .map(|(surface, _)| surface.as_str())
            .unwrap_or_default()
    }
}

pub struct Canonicalizer {
    embedder: Arc<dyn Embedder>,
    settings: CanonicalizeSettings,
}

impl Canonicalizer {
    pub fn new(embedder: Arc<dyn Embedder>, settings: CanonicalizeSettings) -> Self {
        Self { embedder, settings }
    }

    /// Clusters the mention set into canonical skills, sorted by name.
    ///
    /// An empty mention set yields an empty result.
    pub async fn canonicalize(
        &self,
        mentions: &[ExtractedMention],
    ) -> Result<Vec<CanonicalSkill>, EmbeddingError> {
        let stats = collect_stats(mentions);
        if stats.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = stats.keys().cloned().collect();
        let vectors = embed_all(
            self.embedder.as_ref(),
            &keys,
            self.settings.embed_concurrency,
        )
        .await?;
        let labels = dbscan(&vectors, self.settings.dbscan);

        let skills = build_skills(&keys, &stats, &vectors, &labels);
        info!(
            "Canonicalized {} mentions ({} distinct names) into {} skills",
            mentions.len(),
            keys.len(),
            skills.len()
        );
        Ok(skills)
    }
}

fn collect_stats(mentions: &[ExtractedMention]) -> BTreeMap<String, NameStats> {
    let mut stats: BTreeMap<String, NameStats> = BTreeMap::new();
    for mention in mentions {
        let key = normalize_skill_name(&mention.raw_name);
        if key.is_empty() {
            continue;
        }
        let entry = stats.entry(key).or_default();
        entry.mentions += 1;
        *entry
            .surfaces
            .entry(clean_surface_form(&mention.raw_name))
            .or_default() += 1;
        *entry.categories.entry(mention.category).or_default() += 1;
    }
    stats
}

fn build_skills(
    keys: &[String],
    stats: &BTreeMap<String, NameStats>,
    vectors: &[Vec<f32>],
    labels: &[usize],
) -> Vec<CanonicalSkill> {
    let mut clusters: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (point, label) in labels.iter().enumerate() {
        clusters.entry(*label).or_default().push(point);
    }

    let mut skills: Vec<CanonicalSkill> = clusters
        .into_values()
        .filter_map(|members| {
            let label = *members
                .iter()
                .max_by_key(|&&i| (stats[&keys[i]].mentions, Reverse(keys[i].as_str())))?;
            let canonical_name = stats[&keys[label]].display().to_string();
            let canonical_key = normalize_skill_name(&canonical_name);

            let aliases: BTreeSet<String> = members
                .iter()
                .filter(|&&i| i != label)
                .map(|&i| stats[&keys[i]].display().to_string())
                .filter(|alias| normalize_skill_name(alias) != canonical_key)
                .collect();

            let mut categories: BTreeMap<SkillCategory, usize> = BTreeMap::new();
            for &i in &members {
                for (category, count) in &stats[&keys[i]].categories {
                    *categories.entry(*category).or_default() += count;
                }
            }

            Some(CanonicalSkill {
                canonical_name,
                category: dominant_category(&categories),
                aliases,
                embedding: centroid(members.iter().map(|&i| vectors[i].as_slice())),
            })
        })
        .collect();

    skills.sort_by(|a, b| a.canonical_name.cmp(&b.canonical_name));
    skills
}

/// Most frequent specific category, falling back to `Other`.
fn dominant_category(counts: &BTreeMap<SkillCategory, usize>) -> SkillCategory {
    counts
        .iter()
        .filter(|(category, _)| **category != SkillCategory::Other)
        .max_by_key(|(category, count)| (**count, Reverse(**category)))
        .map(|(category, _)| *category)
        .unwrap_or(SkillCategory::Other)
}
