use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Broad bucket a skill belongs to. The model is asked for one of these;
/// anything it invents lands in `Other`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkillCategory {
    Language,
    Framework,
    Tool,
    Platform,
    Database,
    Methodology,
    Domain,
    Soft,
    Certification,
    #[default]
    Other,
}

impl SkillCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkillCategory::Language => "language",
            SkillCategory::Framework => "framework",
            SkillCategory::Tool => "tool",
            SkillCategory::Platform => "platform",
            SkillCategory::Database => "database",
            SkillCategory::Methodology => "methodology",
            SkillCategory::Domain => "domain",
            SkillCategory::Soft => "soft",
            SkillCategory::Certification => "certification",
            SkillCategory::Other => "other",
        }
    }

    /// Lenient parse: accepts the snake_case names plus the spellings models
    /// tend to produce ("Programming Language", "soft skill", "library").
    pub fn parse(value: &str) -> Self {
        let v = value.trim().to_lowercase().replace(['-', '_'], " ");
        match v.as_str() {
            "language" | "programming language" => SkillCategory::Language,
            "framework" | "library" | "framework/library" => SkillCategory::Framework,
            "tool" | "tooling" | "software" => SkillCategory::Tool,
            "platform" | "cloud" | "cloud platform" => SkillCategory::Platform,
            "database" | "datastore" => SkillCategory::Database,
            "methodology" | "practice" | "process" => SkillCategory::Methodology,
            "domain" | "domain knowledge" | "concept" => SkillCategory::Domain,
            "soft" | "soft skill" | "interpersonal" => SkillCategory::Soft,
            "certification" | "certificate" => SkillCategory::Certification,
            _ => SkillCategory::Other,
        }
    }
}

impl fmt::Display for SkillCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for SkillCategory {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.as_deref().map(SkillCategory::parse).unwrap_or_default())
    }
}

/// Expected proficiency for a requirement. Ordered from least to most demanding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProficiencyLevel {
    #[default]
    Unspecified,
    Beginner,
    Intermediate,
    Advanced,
    Expert,
}

impl ProficiencyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProficiencyLevel::Unspecified => "unspecified",
            ProficiencyLevel::Beginner => "beginner",
            ProficiencyLevel::Intermediate => "intermediate",
            ProficiencyLevel::Advanced => "advanced",
            ProficiencyLevel::Expert => "expert",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "beginner" | "basic" | "entry" | "junior" | "familiar" => ProficiencyLevel::Beginner,
            "intermediate" | "working" | "mid" | "proficient" => ProficiencyLevel::Intermediate,
            "advanced" | "senior" | "strong" => ProficiencyLevel::Advanced,
            "expert" | "deep" | "mastery" => ProficiencyLevel::Expert,
            _ => ProficiencyLevel::Unspecified,
        }
    }
}

impl fmt::Display for ProficiencyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ProficiencyLevel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.as_deref().map(ProficiencyLevel::parse).unwrap_or_default())
    }
}

/// A validated skill mention, not yet bound to a document.
/// This is the unit stored in the extraction cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillMention {
    pub raw_name: String,
    pub category: SkillCategory,
    pub confidence: f32,
    pub required: bool,
    pub proficiency_level: ProficiencyLevel,
}

impl SkillMention {
    pub fn into_extracted(self, document_id: &str) -> ExtractedMention {
        ExtractedMention {
            document_id: document_id.to_string(),
            raw_name: self.raw_name,
            category: self.category,
            confidence: self.confidence,
            required: self.required,
            proficiency_level: self.proficiency_level,
        }
    }
}

/// One occurrence of a skill name in one document. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedMention {
    pub document_id: String,
    pub raw_name: String,
    pub category: SkillCategory,
    pub confidence: f32,
    pub required: bool,
    pub proficiency_level: ProficiencyLevel,
}

/// A controlled-vocabulary skill: the label of one embedding cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalSkill {
    pub canonical_name: String,
    pub category: SkillCategory,
    pub aliases: BTreeSet<String>,
    pub embedding: Vec<f32>,
}

/// Which inference strategy produced a hierarchy edge, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HierarchyStrategy {
    KnownHierarchy,
    TokenContainment,
    NamingPattern,
}

impl HierarchyStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            HierarchyStrategy::KnownHierarchy => "known_hierarchy",
            HierarchyStrategy::TokenContainment => "token_containment",
            HierarchyStrategy::NamingPattern => "naming_pattern",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "known_hierarchy" => Some(HierarchyStrategy::KnownHierarchy),
            "token_containment" => Some(HierarchyStrategy::TokenContainment),
            "naming_pattern" => Some(HierarchyStrategy::NamingPattern),
            _ => None,
        }
    }
}

/// Directed parent → child edge. The edge set is acyclic.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HierarchyEdge {
    pub parent_canonical_name: String,
    pub child_canonical_name: String,
    pub strategy: HierarchyStrategy,
}

/// "Document requires skill", keyed on (document_id, canonical_name).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequirementEdge {
    pub document_id: String,
    pub canonical_name: String,
    pub confidence: f32,
    pub required: bool,
    pub proficiency_level: ProficiencyLevel,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_parse_is_lenient() {
        assert_eq!(SkillCategory::parse("Programming Language"), SkillCategory::Language);
        assert_eq!(SkillCategory::parse("soft_skill"), SkillCategory::Soft);
        assert_eq!(SkillCategory::parse("library"), SkillCategory::Framework);
        assert_eq!(SkillCategory::parse("something new"), SkillCategory::Other);
    }

    #[test]
    fn test_category_deserializes_null_as_other() {
        let cat: SkillCategory = serde_json::from_str("null").unwrap();
        assert_eq!(cat, SkillCategory::Other);
        let cat: SkillCategory = serde_json::from_str(r#""database""#).unwrap();
        assert_eq!(cat, SkillCategory::Database);
    }

    #[test]
    fn test_category_serializes_snake_case() {
        let json = serde_json::to_string(&SkillCategory::Certification).unwrap();
        assert_eq!(json, r#""certification""#);
    }

    #[test]
    fn test_proficiency_ordering() {
        assert!(ProficiencyLevel::Expert > ProficiencyLevel::Advanced);
        assert!(ProficiencyLevel::Beginner > ProficiencyLevel::Unspecified);
        assert_eq!(ProficiencyLevel::parse("Senior"), ProficiencyLevel::Advanced);
    }

    #[test]
    fn test_strategy_round_trips_through_str() {
        for s in [
            HierarchyStrategy::KnownHierarchy,
            HierarchyStrategy::TokenContainment,
            HierarchyStrategy::NamingPattern,
        ] {
            assert_eq!(HierarchyStrategy::parse(s.as_str()), Some(s));
        }
    }
}
