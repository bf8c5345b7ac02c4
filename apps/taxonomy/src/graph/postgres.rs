//! Postgres-backed skill graph: adjacency tables plus recursive CTE traversal.
//!
//! Writes are multi-row `INSERT .. ON CONFLICT` statements of at most
//! `WRITE_CHUNK` rows, each logical write in one transaction. Inputs are
//! deduplicated on their conflict key first; Postgres refuses to update the
//! same row twice in one statement.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use tracing::{debug, info};

use super::{
    rank_neighbours, DescendantSkill, DocumentMatch, SkillAssociation, SkillNeighbour,
    TaxonomyCounts, TaxonomyStore, WRITE_CHUNK,
};
use crate::errors::AppError;
use crate::models::{CanonicalSkill, Document, HierarchyEdge, RequirementEdge, SkillCategory};
use crate::taxonomy::normalize::normalize_skill_name;

#[derive(FromRow)]
struct SkillRow {
    canonical_name: String,
    category: String,
    embedding: Vec<f32>,
    aliases: Vec<String>,
}

#[derive(FromRow)]
struct DocumentMatchRow {
    document_id: String,
    title: String,
    matched_skills: Vec<String>,
}

#[derive(FromRow)]
struct AssociationRow {
    canonical_name: String,
    document_count: i64,
    share: f64,
}

#[derive(FromRow)]
struct DescendantRow {
    name: String,
    depth: i32,
}

#[derive(Clone)]
pub struct PgTaxonomyStore {
    pool: PgPool,
}

impl PgTaxonomyStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// `ILIKE` pattern matching `query` as a literal substring.
fn contains_pattern(query: &str) -> String {
    let escaped = query
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

#[async_trait]
impl TaxonomyStore for PgTaxonomyStore {
    async fn upsert_documents(&self, documents: &[Document]) -> Result<(), AppError> {
        let unique: BTreeMap<&str, &Document> =
            documents.iter().map(|d| (d.id.as_str(), d)).collect();
        let rows: Vec<&Document> = unique.into_values().collect();

        let mut tx = self.pool.begin().await?;
        for chunk in rows.chunks(WRITE_CHUNK) {
            let mut qb: QueryBuilder<Postgres> =
                QueryBuilder::new("INSERT INTO documents (id, title, raw_text) ");
            qb.push_values(chunk, |mut b, doc| {
                b.push_bind(&doc.id)
                    .push_bind(&doc.title)
                    .push_bind(&doc.raw_text);
            });
            qb.push(
                " ON CONFLICT (id) DO UPDATE SET title = EXCLUDED.title, \
                 raw_text = EXCLUDED.raw_text, updated_at = now()",
            );
            qb.build().execute(&mut *tx).await?;
        }
        tx.commit().await?;

        debug!("Upserted {} documents", rows.len());
        Ok(())
    }

    async fn upsert_skills(&self, skills: &[CanonicalSkill]) -> Result<(), AppError> {
        let unique: BTreeMap<String, &CanonicalSkill> = skills
            .iter()
            .map(|s| (normalize_skill_name(&s.canonical_name), s))
            .collect();
        let rows: Vec<(String, &CanonicalSkill)> = unique.into_iter().collect();

        let written_keys: BTreeSet<&str> = rows.iter().map(|(key, _)| key.as_str()).collect();
        let aliases: BTreeMap<String, (&str, &str)> = rows
            .iter()
            .flat_map(|(_, s)| {
                s.aliases.iter().map(move |a| {
                    (
                        normalize_skill_name(a),
                        (a.as_str(), s.canonical_name.as_str()),
                    )
                })
            })
            .filter(|(key, _)| !written_keys.contains(key.as_str()))
            .collect();
        let alias_rows: Vec<(String, (&str, &str))> = aliases.into_iter().collect();
        let alias_keys: Vec<&str> = alias_rows.iter().map(|(key, _)| key.as_str()).collect();
        let alias_owners: Vec<&str> = alias_rows.iter().map(|(_, (_, owner))| *owner).collect();

        let mut tx = self.pool.begin().await?;
        for chunk in rows.chunks(WRITE_CHUNK) {
            let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO canonical_skills (name_key, canonical_name, category, embedding) ",
            );
            qb.push_values(chunk, |mut b, (key, skill)| {
                b.push_bind(key)
                    .push_bind(&skill.canonical_name)
                    .push_bind(skill.category.as_str())
                    .push_bind(&skill.embedding);
            });
            qb.push(
                " ON CONFLICT (name_key) DO UPDATE SET canonical_name = EXCLUDED.canonical_name, \
                 category = EXCLUDED.category, embedding = EXCLUDED.embedding, updated_at = now()",
            );
            qb.build().execute(&mut *tx).await?;
        }

        // A stored skill whose key is now an alias of a written skill is folded
        // into that owner: its requirement edges move, then the row goes and the
        // cascade removes its aliases and hierarchy edges.
        let moved = sqlx::query(
            r#"
            INSERT INTO requirement_edges
                (document_id, canonical_name, confidence, required, proficiency_level)
            SELECT r.document_id, x.owner, r.confidence, r.required, r.proficiency_level
            FROM UNNEST($1::text[], $2::text[]) AS x(alias_key, owner)
            JOIN canonical_skills s ON s.name_key = x.alias_key
            JOIN requirement_edges r ON r.canonical_name = s.canonical_name
            ON CONFLICT (document_id, canonical_name) DO NOTHING
            "#,
        )
        .bind(&alias_keys)
        .bind(&alias_owners)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        let retired = sqlx::query("DELETE FROM canonical_skills WHERE name_key = ANY($1)")
            .bind(&alias_keys)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if retired > 0 {
            info!("Folded {retired} skills into their new owners ({moved} requirement edges moved)");
        }
        sqlx::query("DELETE FROM skill_aliases WHERE alias_key = ANY($1)")
            .bind(written_keys.iter().copied().collect::<Vec<&str>>())
            .execute(&mut *tx)
            .await?;

        for chunk in alias_rows.chunks(WRITE_CHUNK) {
            let mut qb: QueryBuilder<Postgres> =
                QueryBuilder::new("INSERT INTO skill_aliases (alias_key, alias, canonical_name) ");
            qb.push_values(chunk, |mut b, (key, (alias, owner))| {
                b.push_bind(key).push_bind(*alias).push_bind(*owner);
            });
            qb.push(
                " ON CONFLICT (alias_key) DO UPDATE SET alias = EXCLUDED.alias, \
                 canonical_name = EXCLUDED.canonical_name",
            );
            qb.build().execute(&mut *tx).await?;
        }
        tx.commit().await?;

        info!(
            "Upserted {} canonical skills and {} aliases",
            rows.len(),
            alias_rows.len()
        );
        Ok(())
    }

    async fn replace_requirements(
        &self,
        document_ids: &[String],
        edges: &[RequirementEdge],
    ) -> Result<(), AppError> {
        let unique: BTreeMap<(&str, &str), &RequirementEdge> = edges
            .iter()
            .map(|e| ((e.document_id.as_str(), e.canonical_name.as_str()), e))
            .collect();
        let rows: Vec<&RequirementEdge> = unique.into_values().collect();

        let mut tx = self.pool.begin().await?;
        let removed = sqlx::query("DELETE FROM requirement_edges WHERE document_id = ANY($1)")
            .bind(document_ids)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        for chunk in rows.chunks(WRITE_CHUNK) {
            let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO requirement_edges \
                 (document_id, canonical_name, confidence, required, proficiency_level) ",
            );
            qb.push_values(chunk, |mut b, edge| {
                b.push_bind(&edge.document_id)
                    .push_bind(&edge.canonical_name)
                    .push_bind(edge.confidence)
                    .push_bind(edge.required)
                    .push_bind(edge.proficiency_level.as_str());
            });
            qb.push(
                " ON CONFLICT (document_id, canonical_name) DO UPDATE SET \
                 confidence = EXCLUDED.confidence, required = EXCLUDED.required, \
                 proficiency_level = EXCLUDED.proficiency_level",
            );
            qb.build().execute(&mut *tx).await?;
        }
        tx.commit().await?;

        info!(
            "Replaced requirement edges for {} documents ({removed} removed, {} written)",
            document_ids.len(),
            rows.len()
        );
        Ok(())
    }

    async fn replace_hierarchy(&self, edges: &[HierarchyEdge]) -> Result<(), AppError> {
        let unique: BTreeSet<(&str, &str, &str)> = edges
            .iter()
            .map(|e| {
                (
                    e.parent_canonical_name.as_str(),
                    e.child_canonical_name.as_str(),
                    e.strategy.as_str(),
                )
            })
            .collect();
        let rows: Vec<(&str, &str, &str)> = unique.into_iter().collect();

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM hierarchy_edges")
            .execute(&mut *tx)
            .await?;
        for chunk in rows.chunks(WRITE_CHUNK) {
            let mut qb: QueryBuilder<Postgres> =
                QueryBuilder::new("INSERT INTO hierarchy_edges (parent_name, child_name, strategy) ");
            qb.push_values(chunk, |mut b, (parent, child, strategy)| {
                b.push_bind(*parent).push_bind(*child).push_bind(*strategy);
            });
            qb.push(" ON CONFLICT (parent_name, child_name) DO UPDATE SET strategy = EXCLUDED.strategy");
            qb.build().execute(&mut *tx).await?;
        }
        tx.commit().await?;

        info!("Replaced hierarchy with {} edges", rows.len());
        Ok(())
    }

    async fn load_skills(&self) -> Result<Vec<CanonicalSkill>, AppError> {
        let rows = sqlx::query_as::<_, SkillRow>(
            r#"
            SELECT s.canonical_name, s.category, s.embedding,
                   COALESCE(
                       array_agg(a.alias ORDER BY a.alias) FILTER (WHERE a.alias IS NOT NULL),
                       '{}'::text[]
                   ) AS aliases
            FROM canonical_skills s
            LEFT JOIN skill_aliases a ON a.canonical_name = s.canonical_name
            GROUP BY s.name_key
            ORDER BY s.canonical_name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| CanonicalSkill {
                canonical_name: row.canonical_name,
                category: SkillCategory::parse(&row.category),
                aliases: row.aliases.into_iter().collect(),
                embedding: row.embedding,
            })
            .collect())
    }

    async fn documents_requiring(
        &self,
        skills: &[String],
        include_descendants: bool,
        require_all: bool,
    ) -> Result<Vec<DocumentMatch>, AppError> {
        let roots: Vec<String> = skills
            .iter()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if roots.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, DocumentMatchRow>(
            r#"
            WITH RECURSIVE targets(root, name) AS (
                SELECT canonical_name, canonical_name
                FROM canonical_skills
                WHERE canonical_name = ANY($1)
                UNION
                SELECT t.root, h.child_name
                FROM targets t
                JOIN hierarchy_edges h ON h.parent_name = t.name
                WHERE $2
            )
            SELECT d.id AS document_id, d.title,
                   array_agg(DISTINCT t.root ORDER BY t.root) AS matched_skills
            FROM requirement_edges r
            JOIN targets t ON t.name = r.canonical_name
            JOIN documents d ON d.id = r.document_id
            GROUP BY d.id, d.title
            HAVING NOT $3 OR COUNT(DISTINCT t.root) = $4
            ORDER BY d.id
            "#,
        )
        .bind(&roots)
        .bind(include_descendants)
        .bind(require_all)
        .bind(roots.len() as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| DocumentMatch {
                document_id: row.document_id,
                title: row.title,
                matched_skills: row.matched_skills,
            })
            .collect())
    }

    async fn skills_for_title(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SkillAssociation>, AppError> {
        let rows = sqlx::query_as::<_, AssociationRow>(
            r#"
            WITH matched AS (
                SELECT id FROM documents WHERE title ILIKE $1 ESCAPE '\'
            )
            SELECT r.canonical_name,
                   COUNT(*) AS document_count,
                   COUNT(*)::float8 / (SELECT COUNT(*) FROM matched) AS share
            FROM requirement_edges r
            JOIN matched m ON m.id = r.document_id
            GROUP BY r.canonical_name
            ORDER BY document_count DESC, r.canonical_name
            LIMIT $2
            "#,
        )
        .bind(contains_pattern(query))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| SkillAssociation {
                canonical_name: row.canonical_name,
                document_count: row.document_count,
                share: row.share,
            })
            .collect())
    }

    async fn nearest_skills(
        &self,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<SkillNeighbour>, AppError> {
        let rows: Vec<(String, Vec<f32>)> = sqlx::query_as(
            "SELECT canonical_name, embedding FROM canonical_skills WHERE cardinality(embedding) = $1",
        )
        .bind(vector.len() as i32)
        .fetch_all(&self.pool)
        .await?;

        Ok(rank_neighbours(
            vector,
            rows.iter().map(|(name, e)| (name.as_str(), e.as_slice())),
            k,
        ))
    }

    async fn descendants(&self, canonical_name: &str) -> Result<Vec<DescendantSkill>, AppError> {
        let rows = sqlx::query_as::<_, DescendantRow>(
            r#"
            WITH RECURSIVE descendants(name, depth) AS (
                SELECT child_name, 1
                FROM hierarchy_edges
                WHERE parent_name = $1
                UNION
                SELECT h.child_name, d.depth + 1
                FROM hierarchy_edges h
                JOIN descendants d ON h.parent_name = d.name
            )
            SELECT name, MIN(depth) AS depth
            FROM descendants
            GROUP BY name
            ORDER BY depth, name
            "#,
        )
        .bind(canonical_name)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| DescendantSkill {
                canonical_name: row.name,
                depth: row.depth,
            })
            .collect())
    }

    async fn counts(&self) -> Result<TaxonomyCounts, AppError> {
        let (documents, canonical_skills, aliases, requirement_edges, hierarchy_edges): (
            i64,
            i64,
            i64,
            i64,
            i64,
        ) = sqlx::query_as(
            r#"
            SELECT (SELECT COUNT(*) FROM documents),
                   (SELECT COUNT(*) FROM canonical_skills),
                   (SELECT COUNT(*) FROM skill_aliases),
                   (SELECT COUNT(*) FROM requirement_edges),
                   (SELECT COUNT(*) FROM hierarchy_edges)
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(TaxonomyCounts {
            documents,
            canonical_skills,
            aliases,
            requirement_edges,
            hierarchy_edges,
        })
    }
}
