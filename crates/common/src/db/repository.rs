//! Repository pattern for all graph-store data access: typed CRUD, batch
//! upsert, vector + text search, and the ingest-job lifecycle. All mutations
//! are scoped to the operation that needs them; batch inserts use multi-row
//! raw SQL so pgvector columns can be written without a SeaORM vector type.

use crate::db::models::*;
use crate::db::DbPool;
use crate::errors::{AppError, Result};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbBackend, EntityTrait,
    QueryFilter, QueryOrder, Set, Statement,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A scored match against either an entity or a chunk, unified for the
/// retrieval engine's ranking and fusion logic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkResult {
    pub chunk_id: Uuid,
    pub paper_id: Uuid,
    pub text: String,
    pub section_type: String,
    pub sequence_order: i32,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityResult {
    pub entity_id: Uuid,
    pub display_name: String,
    pub entity_type: String,
    pub score: f64,
}

/// RRF smoothing constant for hybrid rank fusion.
const RRF_K: f64 = 60.0;

fn to_pgvector_literal(embedding: &[f32]) -> String {
    format!(
        "[{}]",
        embedding
            .iter()
            .map(|f| f.to_string())
            .collect::<Vec<_>>()
            .join(",")
    )
}

/// Escapes `%`, `_`, and `\` so a user-supplied substring is safe inside a
/// `LIKE`/`ILIKE` pattern.
pub fn escape_like_pattern(raw: &str) -> String {
    raw.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn read_conn(&self) -> &DatabaseConnection {
        self.pool.read()
    }

    fn write_conn(&self) -> &DatabaseConnection {
        self.pool.write()
    }

    pub async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }

    // ------------------------------------------------------------------
    // Project operations
    // ------------------------------------------------------------------

    pub async fn create_project(&self, name: String, settings: serde_json::Value) -> Result<Project> {
        let now = chrono::Utc::now();
        let project = ProjectActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name),
            settings: Set(settings),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };
        project.insert(self.write_conn()).await.map_err(Into::into)
    }

    pub async fn find_project_by_id(&self, id: Uuid) -> Result<Option<Project>> {
        ProjectEntity::find_by_id(id)
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Deletes a project and everything it owns (entities, relationships,
    /// chunks, clusters, gaps, ingest jobs), via `ON DELETE CASCADE`.
    pub async fn delete_project(&self, id: Uuid) -> Result<bool> {
        let result = ProjectEntity::delete_by_id(id).exec(self.write_conn()).await?;
        Ok(result.rows_affected > 0)
    }

    // ------------------------------------------------------------------
    // Entity operations
    // ------------------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    pub async fn upsert_entity(
        &self,
        project_id: Uuid,
        entity_type: &str,
        display_name: &str,
        normalized_name: &str,
        definition: Option<String>,
        properties: serde_json::Value,
        embedding: Option<&[f32]>,
        extraction_section: Option<String>,
        evidence_spans: Vec<String>,
        source_chunk_ids: Vec<Uuid>,
    ) -> Result<EntityRow> {
        let id = Uuid::new_v4();
        let now = chrono::Utc::now();
        let embedding_literal = embedding.map(to_pgvector_literal);

        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            INSERT INTO entities (
                id, project_id, entity_type, display_name, normalized_name, definition,
                properties, embedding, degree_centrality, betweenness_centrality, pagerank,
                cluster_id, visualized, first_seen_year, last_seen_year, extraction_section,
                evidence_spans, source_chunk_ids, aliases, created_at, updated_at
            )
            VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8::vector, NULL, NULL, NULL,
                NULL, true, NULL, NULL, $9, $10, $11, $12, $13, $13
            )
            ON CONFLICT (project_id, entity_type, normalized_name) DO UPDATE SET
                source_chunk_ids = entities.source_chunk_ids || EXCLUDED.source_chunk_ids,
                updated_at = EXCLUDED.updated_at
            RETURNING *
            "#,
            vec![
                id.into(),
                project_id.into(),
                entity_type.into(),
                display_name.into(),
                normalized_name.into(),
                definition.into(),
                properties.into(),
                embedding_literal.into(),
                extraction_section.into(),
                serde_json::to_value(&evidence_spans).unwrap_or_default().into(),
                serde_json::to_value(&source_chunk_ids).unwrap_or_default().into(),
                serde_json::Value::Array(vec![]).into(),
                now.into(),
            ],
        );

        let row = self
            .write_conn()
            .query_one(stmt)
            .await?
            .ok_or_else(|| AppError::Internal {
                message: "upsert_entity returned no row".to_string(),
            })?;

        row_to_entity(&row)
    }

    pub async fn find_entity_by_id(&self, id: Uuid) -> Result<Option<EntityRow>> {
        EntityEntity::find_by_id(id)
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    pub async fn find_entity_by_normalized_name(
        &self,
        project_id: Uuid,
        entity_type: &str,
        normalized_name: &str,
    ) -> Result<Option<EntityRow>> {
        EntityEntity::find()
            .filter(EntityColumn::ProjectId.eq(project_id))
            .filter(EntityColumn::EntityType.eq(entity_type))
            .filter(EntityColumn::NormalizedName.eq(normalized_name))
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    pub async fn list_entities_by_project(
        &self,
        project_id: Uuid,
        entity_type: Option<&str>,
    ) -> Result<Vec<EntityRow>> {
        let mut query = EntityEntity::find().filter(EntityColumn::ProjectId.eq(project_id));
        if let Some(t) = entity_type {
            query = query.filter(EntityColumn::EntityType.eq(t));
        }
        query.all(self.read_conn()).await.map_err(Into::into)
    }

    /// Deletes a duplicate entity after the resolver has merged it into a
    /// canonical. Callers must rewrite relationships first.
    pub async fn delete_entity(&self, id: Uuid) -> Result<bool> {
        let result = EntityEntity::delete_by_id(id).exec(self.write_conn()).await?;
        Ok(result.rows_affected > 0)
    }

    /// Appends alias surface forms to the canonical entity's alias list and
    /// accumulates the duplicate's source-chunk ids — called by the resolver
    /// before deleting the duplicate.
    pub async fn absorb_into_canonical(
        &self,
        canonical_id: Uuid,
        duplicate_alias: &str,
        duplicate_source_chunk_ids: Vec<Uuid>,
    ) -> Result<()> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            UPDATE entities SET
                aliases = (
                    SELECT jsonb_agg(DISTINCT value) FROM jsonb_array_elements(aliases || $2::jsonb)
                ),
                source_chunk_ids = (
                    SELECT jsonb_agg(DISTINCT value) FROM jsonb_array_elements(source_chunk_ids || $3::jsonb)
                ),
                updated_at = NOW()
            WHERE id = $1
            "#,
            vec![
                canonical_id.into(),
                serde_json::Value::Array(vec![serde_json::Value::String(duplicate_alias.to_string())])
                    .into(),
                serde_json::to_value(&duplicate_source_chunk_ids).unwrap_or_default().into(),
            ],
        );
        self.write_conn().execute(stmt).await?;
        Ok(())
    }

    pub async fn update_entity_centrality(
        &self,
        id: Uuid,
        degree: f32,
        betweenness: f32,
        pagerank: f32,
        cluster_id: Option<Uuid>,
    ) -> Result<()> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            UPDATE entities SET
                degree_centrality = $2, betweenness_centrality = $3, pagerank = $4,
                cluster_id = $5, updated_at = NOW()
            WHERE id = $1
            "#,
            vec![id.into(), degree.into(), betweenness.into(), pagerank.into(), cluster_id.into()],
        );
        self.write_conn().execute(stmt).await?;
        Ok(())
    }

    /// Nearest-neighbor cosine search over entity embeddings within a project.
    pub async fn entity_vector_search(
        &self,
        project_id: Uuid,
        embedding: &[f32],
        entity_type: Option<&str>,
        limit: usize,
    ) -> Result<Vec<EntityResult>> {
        let embedding_literal = to_pgvector_literal(embedding);
        let type_filter = entity_type.map(|_| "AND entity_type = $4").unwrap_or("");

        let sql = format!(
            r#"
            SELECT id, display_name, entity_type, 1 - (embedding <=> $1::vector) as score
            FROM entities
            WHERE project_id = $2 AND embedding IS NOT NULL {type_filter}
            ORDER BY embedding <=> $1::vector
            LIMIT $3
            "#
        );

        let mut values: Vec<sea_orm::Value> = vec![
            embedding_literal.into(),
            project_id.into(),
            (limit as i64).into(),
        ];
        if let Some(t) = entity_type {
            values.push(t.into());
        }

        let stmt = Statement::from_sql_and_values(DbBackend::Postgres, &sql, values);
        let rows = self.read_conn().query_all(stmt).await?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                Some(EntityResult {
                    entity_id: row.try_get_by_index::<Uuid>(0).ok()?,
                    display_name: row.try_get_by_index::<String>(1).ok()?,
                    entity_type: row.try_get_by_index::<String>(2).ok()?,
                    score: row.try_get_by_index::<f64>(3).ok()?,
                })
            })
            .collect())
    }

    /// Trigram substring search over entity display names, with user input
    /// escaped before it reaches `LIKE`.
    pub async fn entity_substring_search(
        &self,
        project_id: Uuid,
        substring: &str,
        limit: usize,
    ) -> Result<Vec<EntityResult>> {
        let escaped = escape_like_pattern(substring);
        let pattern = format!("%{escaped}%");

        let sql = r#"
            SELECT id, display_name, entity_type,
                   similarity(display_name, $2) as score
            FROM entities
            WHERE project_id = $1 AND display_name ILIKE $4 ESCAPE '\'
            ORDER BY score DESC
            LIMIT $3
        "#;

        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            sql,
            vec![
                project_id.into(),
                substring.into(),
                (limit as i64).into(),
                pattern.into(),
            ],
        );

        let rows = self.read_conn().query_all(stmt).await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| {
                Some(EntityResult {
                    entity_id: row.try_get_by_index::<Uuid>(0).ok()?,
                    display_name: row.try_get_by_index::<String>(1).ok()?,
                    entity_type: row.try_get_by_index::<String>(2).ok()?,
                    score: row.try_get_by_index::<f64>(3).ok()?,
                })
            })
            .collect())
    }

    // ------------------------------------------------------------------
    // Relationship operations
    // ------------------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    pub async fn upsert_relationship(
        &self,
        project_id: Uuid,
        source_id: Uuid,
        target_id: Uuid,
        relationship_type: &str,
        weight: f32,
        properties: serde_json::Value,
        evidence_spans: Vec<String>,
        evidence_chunk_ids: Vec<Uuid>,
        first_seen_year: Option<i32>,
    ) -> Result<RelationshipRow> {
        let id = Uuid::new_v4();
        let now = chrono::Utc::now();
        let clamped = weight.clamp(0.0, 1.0);

        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            INSERT INTO relationships (
                id, project_id, source_id, target_id, relationship_type, weight,
                properties, evidence_spans, evidence_chunk_ids, first_seen_year, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (source_id, target_id, relationship_type) DO UPDATE SET
                weight = GREATEST(relationships.weight, EXCLUDED.weight)
            RETURNING *
            "#,
            vec![
                id.into(),
                project_id.into(),
                source_id.into(),
                target_id.into(),
                relationship_type.into(),
                clamped.into(),
                properties.into(),
                serde_json::to_value(&evidence_spans).unwrap_or_default().into(),
                serde_json::to_value(&evidence_chunk_ids).unwrap_or_default().into(),
                first_seen_year.into(),
                now.into(),
            ],
        );

        let row = self
            .write_conn()
            .query_one(stmt)
            .await?
            .ok_or_else(|| AppError::Internal {
                message: "upsert_relationship returned no row".to_string(),
            })?;

        row_to_relationship(&row)
    }

    /// Rewrites every relationship pointing at `duplicate_id` to point at
    /// `canonical_id` instead, dropping rows that would violate the
    /// `(source, target, type)` uniqueness constraint after rewriting.
    pub async fn rewrite_relationship_endpoints(
        &self,
        duplicate_id: Uuid,
        canonical_id: Uuid,
    ) -> Result<()> {
        let dedupe_then_rewrite = [
            (
                "DELETE FROM relationships r USING relationships r2
                 WHERE r.source_id = $1 AND r2.source_id = $2
                   AND r.target_id = r2.target_id AND r.relationship_type = r2.relationship_type",
            ),
            (
                "DELETE FROM relationships r USING relationships r2
                 WHERE r.target_id = $1 AND r2.target_id = $2
                   AND r.source_id = r2.source_id AND r.relationship_type = r2.relationship_type",
            ),
        ];

        for sql in dedupe_then_rewrite {
            let stmt = Statement::from_sql_and_values(
                DbBackend::Postgres,
                sql,
                vec![duplicate_id.into(), canonical_id.into()],
            );
            self.write_conn().execute(stmt).await?;
        }

        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            "UPDATE relationships SET source_id = $2 WHERE source_id = $1",
            vec![duplicate_id.into(), canonical_id.into()],
        );
        self.write_conn().execute(stmt).await?;

        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            "UPDATE relationships SET target_id = $2 WHERE target_id = $1",
            vec![duplicate_id.into(), canonical_id.into()],
        );
        self.write_conn().execute(stmt).await?;

        Ok(())
    }

    pub async fn relationships_for_entity(
        &self,
        entity_id: Uuid,
    ) -> Result<(Vec<RelationshipRow>, Vec<RelationshipRow>)> {
        let outgoing = RelationshipEntity::find()
            .filter(RelationshipColumn::SourceId.eq(entity_id))
            .all(self.read_conn())
            .await?;
        let incoming = RelationshipEntity::find()
            .filter(RelationshipColumn::TargetId.eq(entity_id))
            .all(self.read_conn())
            .await?;
        Ok((outgoing, incoming))
    }

    pub async fn relationships_by_project(&self, project_id: Uuid) -> Result<Vec<RelationshipRow>> {
        RelationshipEntity::find()
            .filter(RelationshipColumn::ProjectId.eq(project_id))
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    pub async fn same_as_edges(&self, project_id: Uuid) -> Result<Vec<RelationshipRow>> {
        RelationshipEntity::find()
            .filter(RelationshipColumn::ProjectId.eq(project_id))
            .filter(RelationshipColumn::RelationshipType.eq("SAME_AS"))
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    // ------------------------------------------------------------------
    // Chunk operations
    // ------------------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    pub async fn create_chunk(
        &self,
        paper_id: Uuid,
        project_id: Uuid,
        text: &str,
        section_type: &str,
        level: i16,
        parent_chunk_id: Option<Uuid>,
        sequence_order: i32,
        token_count: i32,
        start_line: Option<i32>,
        end_line: Option<i32>,
        embedding: Option<&[f32]>,
    ) -> Result<Uuid> {
        let chunk_id = Uuid::new_v4();
        let embedding_literal = embedding.map(to_pgvector_literal);

        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            INSERT INTO chunks (
                id, paper_id, project_id, text, summary, section_type, level,
                parent_chunk_id, sequence_order, token_count, start_line, end_line,
                embedding, created_at
            )
            VALUES ($1, $2, $3, $4, NULL, $5, $6, $7, $8, $9, $10, $11, $12::vector, NOW())
            "#,
            vec![
                chunk_id.into(),
                paper_id.into(),
                project_id.into(),
                text.into(),
                section_type.into(),
                level.into(),
                parent_chunk_id.into(),
                sequence_order.into(),
                token_count.into(),
                start_line.into(),
                end_line.into(),
                embedding_literal.into(),
            ],
        );

        self.write_conn().execute(stmt).await?;
        Ok(chunk_id)
    }

    pub async fn get_chunks_by_paper(&self, paper_id: Uuid) -> Result<Vec<Chunk>> {
        ChunkEntity::find()
            .filter(ChunkColumn::PaperId.eq(paper_id))
            .order_by_asc(ChunkColumn::SequenceOrder)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    pub async fn chunk_vector_search(
        &self,
        project_id: Uuid,
        embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<ChunkResult>> {
        let embedding_literal = to_pgvector_literal(embedding);
        let sql = r#"
            SELECT id, paper_id, text, section_type, sequence_order,
                   1 - (embedding <=> $1::vector) as score
            FROM chunks
            WHERE project_id = $2 AND embedding IS NOT NULL
            ORDER BY embedding <=> $1::vector
            LIMIT $3
        "#;

        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            sql,
            vec![embedding_literal.into(), project_id.into(), (limit as i64).into()],
        );

        let rows = self.read_conn().query_all(stmt).await?;
        Ok(rows.into_iter().filter_map(row_to_chunk_result).collect())
    }

    pub async fn chunk_text_search(
        &self,
        project_id: Uuid,
        query: &str,
        limit: usize,
    ) -> Result<Vec<ChunkResult>> {
        let sql = r#"
            SELECT id, paper_id, text, section_type, sequence_order,
                   ts_rank_cd(to_tsvector('english', text), plainto_tsquery('english', $1)) as score
            FROM chunks
            WHERE project_id = $2 AND to_tsvector('english', text) @@ plainto_tsquery('english', $1)
            ORDER BY score DESC
            LIMIT $3
        "#;

        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            sql,
            vec![query.into(), project_id.into(), (limit as i64).into()],
        );

        let rows = self.read_conn().query_all(stmt).await?;
        Ok(rows.into_iter().filter_map(row_to_chunk_result).collect())
    }

    /// Substring search over chunk text with safe `LIKE` escaping — tier 3 of
    /// the retrieval engine's evidence cascade.
    pub async fn chunk_substring_search(
        &self,
        project_id: Uuid,
        substring: &str,
        limit: usize,
    ) -> Result<Vec<ChunkResult>> {
        let escaped = escape_like_pattern(substring);
        let pattern = format!("%{escaped}%");

        let sql = r#"
            SELECT id, paper_id, text, section_type, sequence_order, 1.0 as score
            FROM chunks
            WHERE project_id = $1 AND text ILIKE $2 ESCAPE '\'
            LIMIT $3
        "#;

        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            sql,
            vec![project_id.into(), pattern.into(), (limit as i64).into()],
        );

        let rows = self.read_conn().query_all(stmt).await?;
        Ok(rows.into_iter().filter_map(row_to_chunk_result).collect())
    }

    /// Hybrid search: vector top-K union text-search top-K, fused via
    /// Reciprocal Rank Fusion before the caller applies the final weighted
    /// re-rank against the query embedding.
    pub async fn hybrid_chunk_search(
        &self,
        project_id: Uuid,
        query: &str,
        embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<ChunkResult>> {
        use std::collections::HashMap;

        let vector_results = self.chunk_vector_search(project_id, embedding, limit * 2).await?;
        let text_results = self.chunk_text_search(project_id, query, limit * 2).await?;

        let mut fused: HashMap<Uuid, (ChunkResult, f64)> = HashMap::new();

        for (rank, result) in vector_results.into_iter().enumerate() {
            let rrf = 1.0 / (RRF_K + (rank + 1) as f64);
            fused
                .entry(result.chunk_id)
                .and_modify(|(_, score)| *score += rrf)
                .or_insert((result, rrf));
        }

        for (rank, result) in text_results.into_iter().enumerate() {
            let rrf = 1.0 / (RRF_K + (rank + 1) as f64);
            fused
                .entry(result.chunk_id)
                .and_modify(|(_, score)| *score += rrf)
                .or_insert((result, rrf));
        }

        let mut results: Vec<_> = fused
            .into_values()
            .map(|(mut result, score)| {
                result.score = score;
                result
            })
            .collect();

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap());
        results.truncate(limit);
        Ok(results)
    }

    // ------------------------------------------------------------------
    // Cluster operations
    // ------------------------------------------------------------------

    /// Replaces every cluster for a project in one transaction-scoped pass,
    /// matching the clusterer's idempotent-recompute contract.
    pub async fn replace_clusters(&self, project_id: Uuid, clusters: Vec<Cluster>) -> Result<()> {
        let delete_stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            "DELETE FROM clusters WHERE project_id = $1",
            vec![project_id.into()],
        );
        self.write_conn().execute(delete_stmt).await?;

        for cluster in clusters {
            let model = ClusterActiveModel {
                id: Set(cluster.id),
                project_id: Set(project_id),
                keywords: Set(cluster.keywords),
                concept_ids: Set(cluster.concept_ids),
                size: Set(cluster.size),
                density: Set(cluster.density),
                label: Set(cluster.label),
                centroid: Set(cluster.centroid),
                detection_method: Set(cluster.detection_method),
                level: Set(cluster.level),
                created_at: Set(cluster.created_at),
            };
            model.insert(self.write_conn()).await?;
        }

        Ok(())
    }

    pub async fn clusters_by_project(&self, project_id: Uuid) -> Result<Vec<Cluster>> {
        ClusterEntity::find()
            .filter(ClusterColumn::ProjectId.eq(project_id))
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    // ------------------------------------------------------------------
    // Gap operations
    // ------------------------------------------------------------------

    /// Replaces every gap for a project — the gap detector is idempotent and
    /// previous gaps are replaced, never appended.
    pub async fn replace_gaps(&self, project_id: Uuid, gaps: Vec<Gap>) -> Result<()> {
        let delete_stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            "DELETE FROM gaps WHERE project_id = $1",
            vec![project_id.into()],
        );
        self.write_conn().execute(delete_stmt).await?;

        for gap in gaps {
            let model = GapActiveModel {
                id: Set(gap.id),
                project_id: Set(project_id),
                cluster_a_id: Set(gap.cluster_a_id),
                cluster_b_id: Set(gap.cluster_b_id),
                concept_ids_a: Set(gap.concept_ids_a),
                concept_ids_b: Set(gap.concept_ids_b),
                gap_strength: Set(gap.gap_strength),
                semantic_distance: Set(gap.semantic_distance),
                bridge_candidates: Set(gap.bridge_candidates),
                research_questions: Set(gap.research_questions),
                ghost_edges: Set(gap.ghost_edges),
                status: Set(gap.status),
                created_at: Set(gap.created_at),
            };
            model.insert(self.write_conn()).await?;
        }

        Ok(())
    }

    pub async fn gaps_by_project(&self, project_id: Uuid, min_strength: Option<f32>) -> Result<Vec<Gap>> {
        let mut query = GapEntity::find().filter(GapColumn::ProjectId.eq(project_id));
        if let Some(min) = min_strength {
            query = query.filter(GapColumn::GapStrength.gte(min));
        }
        query.all(self.read_conn()).await.map_err(Into::into)
    }

    // ------------------------------------------------------------------
    // Ingest job operations
    // ------------------------------------------------------------------

    pub async fn create_job(
        &self,
        project_id: Uuid,
        papers_total: i32,
        idempotency_key: Option<String>,
    ) -> Result<IngestJob> {
        let now = chrono::Utc::now();
        let job = IngestJobActiveModel {
            id: Set(Uuid::new_v4()),
            project_id: Set(project_id),
            status: Set(String::from(JobStatus::Pending)),
            papers_total: Set(papers_total),
            papers_processed: Set(0),
            processed_paper_ids: Set(serde_json::Value::Array(vec![])),
            error_message: Set(None),
            idempotency_key: Set(idempotency_key),
            reliability_summary: Set(serde_json::Value::Object(Default::default())),
            created_at: Set(now.into()),
            started_at: Set(None),
            completed_at: Set(None),
        };
        job.insert(self.write_conn()).await.map_err(Into::into)
    }

    pub async fn find_job_by_id(&self, id: Uuid) -> Result<Option<IngestJob>> {
        IngestJobEntity::find_by_id(id)
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    pub async fn find_job_by_idempotency_key(
        &self,
        project_id: Uuid,
        key: &str,
    ) -> Result<Option<IngestJob>> {
        IngestJobEntity::find()
            .filter(IngestJobColumn::ProjectId.eq(project_id))
            .filter(IngestJobColumn::IdempotencyKey.eq(key))
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    pub async fn update_job_status(
        &self,
        job_id: Uuid,
        status: JobStatus,
        error_message: Option<String>,
    ) -> Result<IngestJob> {
        let now = chrono::Utc::now();

        let mut job: IngestJobActiveModel = IngestJobEntity::find_by_id(job_id)
            .one(self.write_conn())
            .await?
            .ok_or_else(|| AppError::JobNotFound { id: job_id.to_string() })?
            .into();

        job.status = Set(String::from(status));

        if let Some(err) = error_message {
            job.error_message = Set(Some(err));
        }

        match status {
            JobStatus::Running => {
                if job.started_at.is_not_set() {
                    job.started_at = Set(Some(now.into()));
                }
            }
            JobStatus::Completed | JobStatus::Failed | JobStatus::Interrupted => {
                job.completed_at = Set(Some(now.into()));
            }
            JobStatus::Pending => {}
        }

        job.update(self.write_conn()).await.map_err(Into::into)
    }

    /// Records one more completed paper. Called from the job registry's
    /// single write-coalescing task, never directly from the ingest loop.
    pub async fn record_paper_processed(&self, job_id: Uuid, paper_id: Uuid) -> Result<()> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            UPDATE ingest_jobs SET
                papers_processed = papers_processed + 1,
                processed_paper_ids = processed_paper_ids || $2::jsonb
            WHERE id = $1
            "#,
            vec![
                job_id.into(),
                serde_json::Value::Array(vec![serde_json::to_value(paper_id).unwrap()]).into(),
            ],
        );
        self.write_conn().execute(stmt).await?;
        Ok(())
    }

    pub async fn update_reliability_summary(
        &self,
        job_id: Uuid,
        summary: serde_json::Value,
    ) -> Result<()> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            "UPDATE ingest_jobs SET reliability_summary = $2 WHERE id = $1",
            vec![job_id.into(), summary.into()],
        );
        self.write_conn().execute(stmt).await?;
        Ok(())
    }

    /// Marks every job left `running` at process start as `interrupted`,
    /// preserving its checkpoint for resume.
    pub async fn mark_running_jobs_interrupted(&self) -> Result<u64> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            &format!(
                "UPDATE ingest_jobs SET status = '{}', completed_at = NOW() WHERE status = '{}'",
                String::from(JobStatus::Interrupted),
                String::from(JobStatus::Running),
            ),
            vec![],
        );
        let result = self.write_conn().execute(stmt).await?;
        Ok(result.rows_affected())
    }
}

fn row_to_chunk_result(row: sea_orm::QueryResult) -> Option<ChunkResult> {
    Some(ChunkResult {
        chunk_id: row.try_get_by_index::<Uuid>(0).ok()?,
        paper_id: row.try_get_by_index::<Uuid>(1).ok()?,
        text: row.try_get_by_index::<String>(2).ok()?,
        section_type: row.try_get_by_index::<String>(3).ok()?,
        sequence_order: row.try_get_by_index::<i32>(4).ok()?,
        score: row.try_get_by_index::<f64>(5).ok()?,
    })
}

fn row_to_entity(row: &sea_orm::QueryResult) -> Result<EntityRow> {
    Ok(EntityRow {
        id: row.try_get_by_index(0)?,
        project_id: row.try_get_by_index(1)?,
        entity_type: row.try_get_by_index(2)?,
        display_name: row.try_get_by_index(3)?,
        normalized_name: row.try_get_by_index(4)?,
        definition: row.try_get_by_index(5)?,
        properties: row.try_get_by_index(6)?,
        embedding: row.try_get_by_index(7)?,
        degree_centrality: row.try_get_by_index(8)?,
        betweenness_centrality: row.try_get_by_index(9)?,
        pagerank: row.try_get_by_index(10)?,
        cluster_id: row.try_get_by_index(11)?,
        visualized: row.try_get_by_index(12)?,
        first_seen_year: row.try_get_by_index(13)?,
        last_seen_year: row.try_get_by_index(14)?,
        extraction_section: row.try_get_by_index(15)?,
        evidence_spans: row.try_get_by_index(16)?,
        source_chunk_ids: row.try_get_by_index(17)?,
        aliases: row.try_get_by_index(18)?,
        created_at: row.try_get_by_index(19)?,
        updated_at: row.try_get_by_index(20)?,
    })
}

fn row_to_relationship(row: &sea_orm::QueryResult) -> Result<RelationshipRow> {
    Ok(RelationshipRow {
        id: row.try_get_by_index(0)?,
        project_id: row.try_get_by_index(1)?,
        source_id: row.try_get_by_index(2)?,
        target_id: row.try_get_by_index(3)?,
        relationship_type: row.try_get_by_index(4)?,
        weight: row.try_get_by_index(5)?,
        properties: row.try_get_by_index(6)?,
        evidence_spans: row.try_get_by_index(7)?,
        evidence_chunk_ids: row.try_get_by_index(8)?,
        first_seen_year: row.try_get_by_index(9)?,
        created_at: row.try_get_by_index(10)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_like_pattern_neutralizes_wildcards() {
        let escaped = escape_like_pattern("100%_done\\now");
        assert_eq!(escaped, "100\\%\\_done\\\\now");
    }

    #[test]
    fn pgvector_literal_formats_as_bracketed_csv() {
        assert_eq!(to_pgvector_literal(&[1.0, 2.5, -3.0]), "[1,2.5,-3]");
    }
}
