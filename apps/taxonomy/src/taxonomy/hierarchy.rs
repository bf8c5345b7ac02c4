//! Parent → child inference between canonical skills.
//!
//! Strategies in priority order:
//! 1. the known-hierarchy table (`rules.rs`);
//! 2. token containment: a skill whose tokens are a strict subset of another's
//!    is its parent ("Spring" → "Spring Boot");
//! 3. naming patterns: "<X> Developer", "<X> Engineering" and similar depend on "<X>".
//!
//! A child takes parents only from the highest-priority strategy that proposed
//! any. Edges are accepted in a fixed order and an edge that would close a
//! cycle is dropped and reported.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::models::{CanonicalSkill, HierarchyEdge, HierarchyStrategy, SkillCategory};
use crate::taxonomy::index::NameIndex;
use crate::taxonomy::normalize::{normalize_skill_name, skill_tokens};
use crate::taxonomy::rules::{KnownHierarchy, KNOWN_HIERARCHIES};

const ROLE_SUFFIXES: &[&str] = &[
    " developer",
    " development",
    " engineer",
    " engineering",
    " programming",
    " administrator",
    " administration",
    " framework",
];

/// An edge proposal rejected during inference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DroppedEdge {
    pub parent: String,
    pub child: String,
    pub strategy: HierarchyStrategy,
    pub reason: String,
}

/// A parent named by the known-hierarchy table that no cluster produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImpliedSkill {
    pub name: String,
    pub category: SkillCategory,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct HierarchyInference {
    pub edges: Vec<HierarchyEdge>,
    pub dropped: Vec<DroppedEdge>,
    /// Must be added to the canonical set before the edges are persisted.
    pub implied_skills: Vec<ImpliedSkill>,
}

pub fn infer_hierarchy(skills: &[CanonicalSkill]) -> HierarchyInference {
    infer_hierarchy_with(skills, KNOWN_HIERARCHIES)
}

pub fn infer_hierarchy_with(skills: &[CanonicalSkill], rules: &[KnownHierarchy]) -> HierarchyInference {
    if skills.is_empty() {
        return HierarchyInference::default();
    }

    let mut index = NameIndex::build(skills);
    let mut names: BTreeSet<String> = skills.iter().map(|s| s.canonical_name.clone()).collect();

    let (known, implied_skills) = propose_known(rules, &mut index, &mut names);
    let mut proposals: Vec<HierarchyEdge> = known;
    proposals.extend(propose_containment(&names));
    proposals.extend(propose_patterns(&names, &index));

    // Conflict policy: the best strategy per child wins outright.
    let mut best: HashMap<&str, HierarchyStrategy> = HashMap::new();
    for p in &proposals {
        best.entry(p.child_canonical_name.as_str())
            .and_modify(|s| *s = (*s).min(p.strategy))
            .or_insert(p.strategy);
    }
    let mut winning: Vec<HierarchyEdge> = proposals
        .iter()
        .filter(|p| best.get(p.child_canonical_name.as_str()) == Some(&p.strategy))
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    winning.sort_by(|a, b| {
        (a.strategy, &a.child_canonical_name, &a.parent_canonical_name).cmp(&(
            b.strategy,
            &b.child_canonical_name,
            &b.parent_canonical_name,
        ))
    });
    debug!(
        "{} hierarchy proposals, {} after strategy priority",
        proposals.len(),
        winning.len()
    );

    let mut children: HashMap<String, Vec<String>> = HashMap::new();
    let mut edges = Vec::new();
    let mut dropped = Vec::new();
    for edge in winning {
        let parent = &edge.parent_canonical_name;
        let child = &edge.child_canonical_name;
        let reason = if parent == child {
            Some("self-loop")
        } else if reaches(&children, child, parent) {
            Some("parent is already a descendant of child")
        } else {
            None
        };

        match reason {
            Some(reason) => {
                warn!(
                    "Dropping cyclic hierarchy edge {parent} -> {child} ({}): {reason}",
                    edge.strategy.as_str()
                );
                dropped.push(DroppedEdge {
                    parent: parent.clone(),
                    child: child.clone(),
                    strategy: edge.strategy,
                    reason: reason.to_string(),
                });
            }
            None => {
                children.entry(parent.clone()).or_default().push(child.clone());
                edges.push(edge);
            }
        }
    }

    edges.sort();
    info!(
        "Inferred {} hierarchy edges ({} dropped, {} implied parents)",
        edges.len(),
        dropped.len(),
        implied_skills.len()
    );
    HierarchyInference {
        edges,
        dropped,
        implied_skills,
    }
}

/// Applies the rule table until no new edge appears, creating missing parents
/// as it goes so chains like ML → Deep Learning → PyTorch complete.
fn propose_known(
    rules: &[KnownHierarchy],
    index: &mut NameIndex,
    names: &mut BTreeSet<String>,
) -> (Vec<HierarchyEdge>, Vec<ImpliedSkill>) {
    let mut pairs: BTreeSet<(String, String)> = BTreeSet::new();
    let mut implied = Vec::new();

    loop {
        let mut changed = false;
        for rule in rules {
            for child in rule.children {
                let Some(child) = index.resolve(child).map(str::to_string) else {
                    continue;
                };
                let parent = match index.resolve(rule.parent) {
                    Some(p) => p.to_string(),
                    None => {
                        debug!("Creating implied parent skill '{}'", rule.parent);
                        index.insert_canonical(rule.parent);
                        names.insert(rule.parent.to_string());
                        implied.push(ImpliedSkill {
                            name: rule.parent.to_string(),
                            category: rule.category,
                        });
                        changed = true;
                        rule.parent.to_string()
                    }
                };
                changed |= pairs.insert((parent, child));
            }
        }
        if !changed {
            break;
        }
    }

    let edges = pairs
        .into_iter()
        .map(|(parent, child)| HierarchyEdge {
            parent_canonical_name: parent,
            child_canonical_name: child,
            strategy: HierarchyStrategy::KnownHierarchy,
        })
        .collect();
    (edges, implied)
}

/// Each skill's parents are the maximal skills whose token set it strictly contains.
fn propose_containment(names: &BTreeSet<String>) -> Vec<HierarchyEdge> {
    let tokens: BTreeMap<&str, BTreeSet<String>> = names
        .iter()
        .map(|n| (n.as_str(), skill_tokens(n).into_iter().collect()))
        .filter(|(_, t): &(&str, BTreeSet<String>)| !t.is_empty())
        .collect();

    let mut edges = Vec::new();
    for (child, child_tokens) in &tokens {
        let candidates: Vec<(&str, &BTreeSet<String>)> = tokens
            .iter()
            .filter(|(_, t)| t.len() < child_tokens.len() && t.is_subset(child_tokens))
            .map(|(n, t)| (*n, t))
            .collect();

        for (parent, parent_tokens) in &candidates {
            let maximal = candidates.iter().all(|(_, other)| {
                !(parent_tokens.len() < other.len() && parent_tokens.is_subset(other))
            });
            if maximal {
                edges.push(HierarchyEdge {
                    parent_canonical_name: parent.to_string(),
                    child_canonical_name: child.to_string(),
                    strategy: HierarchyStrategy::TokenContainment,
                });
            }
        }
    }
    edges
}

fn propose_patterns(names: &BTreeSet<String>, index: &NameIndex) -> Vec<HierarchyEdge> {
    let mut edges = Vec::new();
    for child in names {
        let key = normalize_skill_name(child);
        for suffix in ROLE_SUFFIXES {
            let Some(stem) = key.strip_suffix(suffix) else {
                continue;
            };
            let stem = stem.trim();
            if stem.is_empty() {
                continue;
            }
            if let Some(parent) = index.resolve(stem) {
                if parent != child.as_str() {
                    edges.push(HierarchyEdge {
                        parent_canonical_name: parent.to_string(),
                        child_canonical_name: child.clone(),
                        strategy: HierarchyStrategy::NamingPattern,
                    });
                }
            }
        }
    }
    edges
}

/// Whether `to` is reachable from `from` following parent → child edges.
fn reaches(children: &HashMap<String, Vec<String>>, from: &str, to: &str) -> bool {
    let mut stack = vec![from];
    let mut seen: BTreeSet<&str> = BTreeSet::new();
    while let Some(node) = stack.pop() {
        if node == to {
            return true;
        }
        if !seen.insert(node) {
            continue;
        }
        if let Some(next) = children.get(node) {
            stack.extend(next.iter().map(String::as_str));
        }
    }
    false
}
