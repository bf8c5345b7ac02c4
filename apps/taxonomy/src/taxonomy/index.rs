use std::collections::HashMap;

use tracing::warn;

use crate::models::CanonicalSkill;
use crate::taxonomy::normalize::normalize_skill_name;

/// Which lookup table answered a name query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameMatch {
    Canonical,
    Alias,
}

/// Normalized-name lookup over a canonical skill set.
///
/// Canonical names shadow aliases: an alias whose key equals some canonical
/// name is never consulted. An alias claimed by two skills stays with the
/// first one in canonical-name order.
#[derive(Debug, Clone, Default)]
pub struct NameIndex {
    canonical: HashMap<String, String>,
    aliases: HashMap<String, String>,
}

impl NameIndex {
    pub fn build(skills: &[CanonicalSkill]) -> Self {
        let mut ordered: Vec<&CanonicalSkill> = skills.iter().collect();
        ordered.sort_by(|a, b| a.canonical_name.cmp(&b.canonical_name));

        let mut index = Self::default();
        for skill in &ordered {
            index.canonical.insert(
                normalize_skill_name(&skill.canonical_name),
                skill.canonical_name.clone(),
            );
        }
        for skill in &ordered {
            for alias in &skill.aliases {
                let key = normalize_skill_name(alias);
                if index.canonical.contains_key(&key) {
                    continue;
                }
                match index.aliases.get(&key) {
                    Some(owner) if owner != &skill.canonical_name => {
                        warn!(
                            "Alias '{alias}' claimed by both '{owner}' and '{}'; keeping '{owner}'",
                            skill.canonical_name
                        );
                    }
                    Some(_) => {}
                    None => {
                        index.aliases.insert(key, skill.canonical_name.clone());
                    }
                }
            }
        }
        index
    }

    pub fn exact(&self, name: &str) -> Option<&str> {
        self.canonical
            .get(&normalize_skill_name(name))
            .map(String::as_str)
    }

    pub fn alias(&self, name: &str) -> Option<&str> {
        self.aliases
            .get(&normalize_skill_name(name))
            .map(String::as_str)
    }

    /// Exact match first, then alias.
    pub fn lookup(&self, name: &str) -> Option<(&str, NameMatch)> {
        self.exact(name)
            .map(|c| (c, NameMatch::Canonical))
            .or_else(|| self.alias(name).map(|c| (c, NameMatch::Alias)))
    }

    pub fn resolve(&self, name: &str) -> Option<&str> {
        self.lookup(name).map(|(c, _)| c)
    }

    pub fn insert_canonical(&mut self, canonical_name: &str) {
        let key = normalize_skill_name(canonical_name);
        self.aliases.remove(&key);
        self.canonical.insert(key, canonical_name.to_string());
    }
}
