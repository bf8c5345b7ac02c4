use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::models::{ExtractedMention, RequirementEdge};
use crate::taxonomy::index::NameIndex;

/// Maps every mention to its canonical skill through the alias index.
///
/// Mentions of one document that land on the same skill merge: highest
/// confidence wins, `required` if any mention was required, and the
/// proficiency level of the most confident mention. Output is sorted by
/// (document, skill).
pub fn derive_requirements(mentions: &[ExtractedMention], index: &NameIndex) -> Vec<RequirementEdge> {
    let mut merged: BTreeMap<(String, String), RequirementEdge> = BTreeMap::new();
    let mut unresolved = 0usize;

    for mention in mentions {
        let Some(canonical) = index.resolve(&mention.raw_name) else {
            unresolved += 1;
            debug!("No canonical skill for mention '{}'", mention.raw_name);
            continue;
        };
        let key = (mention.document_id.clone(), canonical.to_string());
        match merged.get_mut(&key) {
            Some(edge) => {
                edge.required |= mention.required;
                if mention.confidence > edge.confidence {
                    edge.confidence = mention.confidence;
                    edge.proficiency_level = mention.proficiency_level;
                }
            }
            None => {
                merged.insert(
                    key,
                    RequirementEdge {
                        document_id: mention.document_id.clone(),
                        canonical_name: canonical.to_string(),
                        confidence: mention.confidence,
                        required: mention.required,
                        proficiency_level: mention.proficiency_level,
                    },
                );
            }
        }
    }

    if unresolved > 0 {
        warn!("{unresolved} mentions did not resolve to a canonical skill");
    }
    merged.into_values().collect()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::models::{CanonicalSkill, ProficiencyLevel, SkillCategory};

    fn index() -> NameIndex {
        NameIndex::build(&[CanonicalSkill {
            canonical_name: "React".into(),
            category: SkillCategory::Framework,
            aliases: BTreeSet::from(["ReactJS".to_string()]),
            embedding: Vec::new(),
        }])
    }

    fn mention(doc: &str, name: &str, confidence: f32, required: bool, level: ProficiencyLevel) -> ExtractedMention {
        ExtractedMention {
            document_id: doc.into(),
            raw_name: name.into(),
            category: SkillCategory::Framework,
            confidence,
            required,
            proficiency_level: level,
        }
    }

    #[test]
    fn test_alias_mentions_merge_onto_one_edge() {
        let edges = derive_requirements(
            &[
                mention("d1", "React", 0.6, true, ProficiencyLevel::Beginner),
                mention("d1", "reactjs", 0.9, false, ProficiencyLevel::Expert),
                mention("d2", "ReactJS", 0.7, false, ProficiencyLevel::Unspecified),
            ],
            &index(),
        );
        assert_eq!(edges.len(), 2);
        assert_eq!(edges[0].document_id, "d1");
        assert_eq!(edges[0].canonical_name, "React");
        assert!(edges[0].required);
        assert!((edges[0].confidence - 0.9).abs() < f32::EPSILON);
        assert_eq!(edges[0].proficiency_level, ProficiencyLevel::Expert);
        assert!(!edges[1].required);
    }

    #[test]
    fn test_unresolved_mentions_are_skipped() {
        let edges = derive_requirements(
            &[mention("d1", "Cobol", 0.9, true, ProficiencyLevel::Unspecified)],
            &index(),
        );
        assert!(edges.is_empty());
    }
}
