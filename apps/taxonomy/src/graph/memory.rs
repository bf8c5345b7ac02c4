//! In-process store with the same merge semantics as the Postgres store.
//! Backs the test suite.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{
    rank_neighbours, DescendantSkill, DocumentMatch, SkillAssociation, SkillNeighbour,
    TaxonomyCounts, TaxonomyStore,
};
use crate::errors::AppError;
use crate::models::{CanonicalSkill, Document, HierarchyEdge, RequirementEdge, SkillCategory};
use crate::taxonomy::normalize::normalize_skill_name;

#[derive(Debug, Clone)]
struct SkillNode {
    canonical_name: String,
    category: SkillCategory,
    embedding: Vec<f32>,
}

#[derive(Default)]
struct Graph {
    documents: BTreeMap<String, Document>,
    /// Keyed by normalized name.
    skills: BTreeMap<String, SkillNode>,
    /// alias key → (alias, canonical name)
    aliases: BTreeMap<String, (String, String)>,
    requirements: BTreeMap<(String, String), RequirementEdge>,
    hierarchy: BTreeMap<(String, String), HierarchyEdge>,
}

impl Graph {
    fn has_skill(&self, canonical_name: &str) -> bool {
        self.skills
            .get(&normalize_skill_name(canonical_name))
            .is_some_and(|s| s.canonical_name == canonical_name)
    }

    /// Mirrors `ON UPDATE CASCADE` when a skill's display name changes.
    fn rename_skill(&mut self, from: &str, to: &str) {
        for (_, owner) in self.aliases.values_mut() {
            if owner == from {
                *owner = to.to_string();
            }
        }
        self.requirements = std::mem::take(&mut self.requirements)
            .into_values()
            .map(|mut edge| {
                if edge.canonical_name == from {
                    edge.canonical_name = to.to_string();
                }
                ((edge.document_id.clone(), edge.canonical_name.clone()), edge)
            })
            .collect();
        self.hierarchy = std::mem::take(&mut self.hierarchy)
            .into_values()
            .map(|mut edge| {
                if edge.parent_canonical_name == from {
                    edge.parent_canonical_name = to.to_string();
                }
                if edge.child_canonical_name == from {
                    edge.child_canonical_name = to.to_string();
                }
                (
                    (
                        edge.parent_canonical_name.clone(),
                        edge.child_canonical_name.clone(),
                    ),
                    edge,
                )
            })
            .collect();
    }

    /// Removes the skill stored under `key`, handing its requirement edges to
    /// `owner` first. Mirrors `ON DELETE CASCADE` for everything else.
    fn retire_skill(&mut self, key: &str, owner: &str) {
        let Some(retired) = self.skills.remove(key) else {
            return;
        };
        let from = retired.canonical_name;
        let moved: Vec<RequirementEdge> = self
            .requirements
            .values()
            .filter(|edge| edge.canonical_name == from)
            .cloned()
            .collect();
        self.requirements.retain(|(_, skill), _| *skill != from);
        for mut edge in moved {
            edge.canonical_name = owner.to_string();
            self.requirements
                .entry((edge.document_id.clone(), edge.canonical_name.clone()))
                .or_insert(edge);
        }
        self.aliases.retain(|_, (_, o)| *o != from);
        self.hierarchy
            .retain(|(parent, child), _| *parent != from && *child != from);
    }

    fn children_of(&self, parent: &str) -> Vec<&str> {
        self.hierarchy
            .range((parent.to_string(), String::new())..)
            .take_while(|((p, _), _)| p == parent)
            .map(|((_, c), _)| c.as_str())
            .collect()
    }

    fn descendants(&self, root: &str) -> Vec<DescendantSkill> {
        let mut depth_of: BTreeMap<&str, i32> = BTreeMap::new();
        let mut queue: VecDeque<(&str, i32)> = VecDeque::from([(root, 0)]);
        while let Some((node, depth)) = queue.pop_front() {
            for child in self.children_of(node) {
                if child != root && !depth_of.contains_key(child) {
                    depth_of.insert(child, depth + 1);
                    queue.push_back((child, depth + 1));
                }
            }
        }
        let mut out: Vec<DescendantSkill> = depth_of
            .into_iter()
            .map(|(name, depth)| DescendantSkill {
                canonical_name: name.to_string(),
                depth,
            })
            .collect();
        out.sort_by(|a, b| (a.depth, &a.canonical_name).cmp(&(b.depth, &b.canonical_name)));
        out
    }
}

#[derive(Default)]
pub struct MemoryTaxonomyStore {
    graph: RwLock<Graph>,
}

impl MemoryTaxonomyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn requirement_edges(&self) -> Vec<RequirementEdge> {
        self.graph.read().await.requirements.values().cloned().collect()
    }
}

#[async_trait]
impl TaxonomyStore for MemoryTaxonomyStore {
    async fn upsert_documents(&self, documents: &[Document]) -> Result<(), AppError> {
        let mut graph = self.graph.write().await;
        for doc in documents {
            graph.documents.insert(doc.id.clone(), doc.clone());
        }
        Ok(())
    }

    async fn upsert_skills(&self, skills: &[CanonicalSkill]) -> Result<(), AppError> {
        let mut graph = self.graph.write().await;
        let mut written: BTreeSet<String> = BTreeSet::new();
        for skill in skills {
            let key = normalize_skill_name(&skill.canonical_name);
            let previous = graph.skills.insert(
                key.clone(),
                SkillNode {
                    canonical_name: skill.canonical_name.clone(),
                    category: skill.category,
                    embedding: skill.embedding.clone(),
                },
            );
            if let Some(previous) = previous {
                if previous.canonical_name != skill.canonical_name {
                    graph.rename_skill(&previous.canonical_name, &skill.canonical_name);
                }
            }
            written.insert(key);
        }

        let aliases: BTreeMap<String, (String, String)> = skills
            .iter()
            .flat_map(|s| {
                s.aliases.iter().map(move |a| {
                    (
                        normalize_skill_name(a),
                        (a.clone(), s.canonical_name.clone()),
                    )
                })
            })
            .filter(|(key, _)| !written.contains(key))
            .collect();

        // A skill that is now an alias of another one is folded into its owner.
        for (key, (_, owner)) in &aliases {
            if graph.skills.contains_key(key) {
                graph.retire_skill(key, owner);
            }
        }
        graph.aliases.retain(|key, _| !written.contains(key));
        graph.aliases.extend(aliases);
        Ok(())
    }

    async fn replace_requirements(
        &self,
        document_ids: &[String],
        edges: &[RequirementEdge],
    ) -> Result<(), AppError> {
        let mut graph = self.graph.write().await;
        for edge in edges {
            if !graph.documents.contains_key(&edge.document_id) {
                return Err(AppError::Validation(format!(
                    "requirement references unknown document '{}'",
                    edge.document_id
                )));
            }
            if !graph.has_skill(&edge.canonical_name) {
                return Err(AppError::Validation(format!(
                    "requirement references unknown skill '{}'",
                    edge.canonical_name
                )));
            }
        }

        let replaced: BTreeSet<&String> = document_ids.iter().collect();
        graph.requirements.retain(|(doc, _), _| !replaced.contains(doc));
        for edge in edges {
            graph.requirements.insert(
                (edge.document_id.clone(), edge.canonical_name.clone()),
                edge.clone(),
            );
        }
        Ok(())
    }

    async fn replace_hierarchy(&self, edges: &[HierarchyEdge]) -> Result<(), AppError> {
        let mut graph = self.graph.write().await;
        for edge in edges {
            for name in [&edge.parent_canonical_name, &edge.child_canonical_name] {
                if !graph.has_skill(name) {
                    return Err(AppError::Validation(format!(
                        "hierarchy edge references unknown skill '{name}'"
                    )));
                }
            }
        }
        graph.hierarchy = edges
            .iter()
            .map(|e| {
                (
                    (
                        e.parent_canonical_name.clone(),
                        e.child_canonical_name.clone(),
                    ),
                    e.clone(),
                )
            })
            .collect();
        Ok(())
    }

    async fn load_skills(&self) -> Result<Vec<CanonicalSkill>, AppError> {
        let graph = self.graph.read().await;
        let mut skills: Vec<CanonicalSkill> = graph
            .skills
            .values()
            .map(|node| CanonicalSkill {
                canonical_name: node.canonical_name.clone(),
                category: node.category,
                aliases: graph
                    .aliases
                    .values()
                    .filter(|(_, owner)| owner == &node.canonical_name)
                    .map(|(alias, _)| alias.clone())
                    .collect(),
                embedding: node.embedding.clone(),
            })
            .collect();
        skills.sort_by(|a, b| a.canonical_name.cmp(&b.canonical_name));
        Ok(skills)
    }

    async fn documents_requiring(
        &self,
        skills: &[String],
        include_descendants: bool,
        require_all: bool,
    ) -> Result<Vec<DocumentMatch>, AppError> {
        let graph = self.graph.read().await;
        let roots: BTreeSet<&String> = skills.iter().collect();

        // expanded skill name → queried roots it satisfies
        let mut satisfies: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for root in &roots {
            if !graph.has_skill(root) {
                continue;
            }
            satisfies
                .entry(root.to_string())
                .or_default()
                .insert(root.to_string());
            if include_descendants {
                for d in graph.descendants(root) {
                    satisfies
                        .entry(d.canonical_name)
                        .or_default()
                        .insert(root.to_string());
                }
            }
        }

        let mut matched: BTreeMap<&str, BTreeSet<String>> = BTreeMap::new();
        for (doc, skill) in graph.requirements.keys() {
            if let Some(hit) = satisfies.get(skill) {
                matched.entry(doc.as_str()).or_default().extend(hit.iter().cloned());
            }
        }

        Ok(matched
            .into_iter()
            .filter(|(_, hit)| !require_all || hit.len() == roots.len())
            .filter_map(|(doc, hit)| {
                let document = graph.documents.get(doc)?;
                Some(DocumentMatch {
                    document_id: doc.to_string(),
                    title: document.title.clone(),
                    matched_skills: hit.into_iter().collect(),
                })
            })
            .collect())
    }

    async fn skills_for_title(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SkillAssociation>, AppError> {
        let graph = self.graph.read().await;
        let needle = query.to_lowercase();
        let docs: BTreeSet<&str> = graph
            .documents
            .values()
            .filter(|d| d.title.to_lowercase().contains(&needle))
            .map(|d| d.id.as_str())
            .collect();
        if docs.is_empty() {
            return Ok(Vec::new());
        }

        let mut counts: BTreeMap<&str, i64> = BTreeMap::new();
        for (doc, skill) in graph.requirements.keys() {
            if docs.contains(doc.as_str()) {
                *counts.entry(skill.as_str()).or_default() += 1;
            }
        }
        let mut ranked: Vec<SkillAssociation> = counts
            .into_iter()
            .map(|(name, count)| SkillAssociation {
                canonical_name: name.to_string(),
                document_count: count,
                share: count as f64 / docs.len() as f64,
            })
            .collect();
        ranked.sort_by(|a, b| {
            b.document_count
                .cmp(&a.document_count)
                .then_with(|| a.canonical_name.cmp(&b.canonical_name))
        });
        ranked.truncate(limit);
        Ok(ranked)
    }

    async fn nearest_skills(
        &self,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<SkillNeighbour>, AppError> {
        let graph = self.graph.read().await;
        Ok(rank_neighbours(
            vector,
            graph
                .skills
                .values()
                .map(|s| (s.canonical_name.as_str(), s.embedding.as_slice())),
            k,
        ))
    }

    async fn descendants(&self, canonical_name: &str) -> Result<Vec<DescendantSkill>, AppError> {
        Ok(self.graph.read().await.descendants(canonical_name))
    }

    async fn counts(&self) -> Result<TaxonomyCounts, AppError> {
        let graph = self.graph.read().await;
        Ok(TaxonomyCounts {
            documents: graph.documents.len() as i64,
            canonical_skills: graph.skills.len() as i64,
            aliases: graph.aliases.len() as i64,
            requirement_edges: graph.requirements.len() as i64,
            hierarchy_edges: graph.hierarchy.len() as i64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{HierarchyStrategy, ProficiencyLevel};

    fn skill(name: &str, aliases: &[&str], embedding: Vec<f32>) -> CanonicalSkill {
        CanonicalSkill {
            canonical_name: name.into(),
            category: SkillCategory::Framework,
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
            embedding,
        }
    }

    fn requires(doc: &str, skill: &str) -> RequirementEdge {
        RequirementEdge {
            document_id: doc.into(),
            canonical_name: skill.into(),
            confidence: 0.9,
            required: true,
            proficiency_level: ProficiencyLevel::Unspecified,
        }
    }

    fn edge(parent: &str, child: &str) -> HierarchyEdge {
        HierarchyEdge {
            parent_canonical_name: parent.into(),
            child_canonical_name: child.into(),
            strategy: HierarchyStrategy::KnownHierarchy,
        }
    }

    async fn load(store: &MemoryTaxonomyStore) {
        store
            .upsert_documents(&[
                Document::new("d1", "Senior Django Developer", "Django, REST"),
                Document::new("d2", "Python Data Engineer", "Python, Airflow"),
                Document::new("d3", "Frontend Developer", "React"),
            ])
            .await
            .unwrap();
        store
            .upsert_skills(&[
                skill("Python", &[], vec![1.0, 0.0]),
                skill("Django", &["django framework"], vec![0.9, 0.1]),
                skill("React", &["ReactJS"], vec![0.0, 1.0]),
            ])
            .await
            .unwrap();
        let docs: Vec<String> = vec!["d1".into(), "d2".into(), "d3".into()];
        store
            .replace_requirements(
                &docs,
                &[requires("d1", "Django"), requires("d2", "Python"), requires("d3", "React")],
            )
            .await
            .unwrap();
        store.replace_hierarchy(&[edge("Python", "Django")]).await.unwrap();
    }

    #[tokio::test]
    async fn test_loading_twice_is_idempotent() {
        let store = MemoryTaxonomyStore::new();
        load(&store).await;
        let once = store.counts().await.unwrap();
        let skills_once = store.load_skills().await.unwrap();
        load(&store).await;
        assert_eq!(store.counts().await.unwrap(), once);
        assert_eq!(store.load_skills().await.unwrap(), skills_once);
        assert_eq!(
            once,
            TaxonomyCounts {
                documents: 3,
                canonical_skills: 3,
                aliases: 2,
                requirement_edges: 3,
                hierarchy_edges: 1,
            }
        );
    }

    #[tokio::test]
    async fn test_descendant_query_finds_child_only_documents() {
        let store = MemoryTaxonomyStore::new();
        load(&store).await;

        let direct = store
            .documents_requiring(&["Python".into()], false, false)
            .await
            .unwrap();
        assert_eq!(direct.iter().map(|d| d.document_id.as_str()).collect::<Vec<_>>(), vec!["d2"]);

        let expanded = store
            .documents_requiring(&["Python".into()], true, false)
            .await
            .unwrap();
        assert_eq!(
            expanded.iter().map(|d| d.document_id.as_str()).collect::<Vec<_>>(),
            vec!["d1", "d2"]
        );
        assert_eq!(expanded[0].matched_skills, vec!["Python".to_string()]);
    }

    #[tokio::test]
    async fn test_require_all() {
        let store = MemoryTaxonomyStore::new();
        load(&store).await;
        let both = store
            .documents_requiring(&["Python".into(), "React".into()], true, true)
            .await
            .unwrap();
        assert!(both.is_empty());
        let any = store
            .documents_requiring(&["Python".into(), "React".into()], true, false)
            .await
            .unwrap();
        assert_eq!(any.len(), 3);
    }

    #[tokio::test]
    async fn test_requirements_for_a_document_are_replaced() {
        let store = MemoryTaxonomyStore::new();
        load(&store).await;
        store
            .replace_requirements(&["d1".into()], &[requires("d1", "Python")])
            .await
            .unwrap();
        let hits = store
            .documents_requiring(&["Django".into()], false, false)
            .await
            .unwrap();
        assert!(hits.is_empty());
        assert_eq!(store.counts().await.unwrap().requirement_edges, 3);
    }

    #[tokio::test]
    async fn test_unknown_skill_reference_is_rejected() {
        let store = MemoryTaxonomyStore::new();
        load(&store).await;
        let err = store.replace_hierarchy(&[edge("Rust", "Tokio")]).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_skill_demoted_to_alias_is_folded_into_new_owner() {
        let store = MemoryTaxonomyStore::new();
        load(&store).await;
        store
            .upsert_skills(&[skill("ReactJS", &["React"], vec![0.0, 1.0])])
            .await
            .unwrap();

        let skills = store.load_skills().await.unwrap();
        let names: Vec<&str> = skills.iter().map(|s| s.canonical_name.as_str()).collect();
        assert_eq!(names, vec!["Django", "Python", "ReactJS"]);
        let react = skills.iter().find(|s| s.canonical_name == "ReactJS").unwrap();
        assert_eq!(react.aliases.iter().collect::<Vec<_>>(), vec!["React"]);

        let hits = store
            .documents_requiring(&["ReactJS".into()], false, false)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document_id, "d3");
        assert_eq!(store.counts().await.unwrap().aliases, 2);
    }

    #[tokio::test]
    async fn test_renamed_skill_keeps_its_edges() {
        let store = MemoryTaxonomyStore::new();
        load(&store).await;
        store
            .upsert_skills(&[skill("DJANGO", &[], vec![0.9, 0.1])])
            .await
            .unwrap();
        let descendants = store.descendants("Python").await.unwrap();
        assert_eq!(descendants[0].canonical_name, "DJANGO");
        assert_eq!(store.counts().await.unwrap().canonical_skills, 3);
    }

    #[tokio::test]
    async fn test_title_association_and_neighbours() {
        let store = MemoryTaxonomyStore::new();
        load(&store).await;
        let assoc = store.skills_for_title("developer", 10).await.unwrap();
        assert_eq!(assoc.len(), 2);
        assert!((assoc[0].share - 0.5).abs() < 1e-9);

        let near = store.nearest_skills(&[1.0, 0.0], 2).await.unwrap();
        assert_eq!(near[0].canonical_name, "Python");
        assert_eq!(near[1].canonical_name, "Django");
    }
}
