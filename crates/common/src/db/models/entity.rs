//! Typed knowledge-graph node. `(project_id, entity_type, normalized_name)` is
//! unique once resolution has run; `id` is the durable 128-bit identity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "entities")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub project_id: Uuid,

    #[sea_orm(column_type = "Text")]
    pub entity_type: String,

    #[sea_orm(column_type = "Text")]
    pub display_name: String,

    #[sea_orm(column_type = "Text")]
    pub normalized_name: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub definition: Option<String>,

    #[sea_orm(column_type = "JsonBinary")]
    pub properties: serde_json::Value,

    /// pgvector embedding stored as text for SeaORM compatibility; vector
    /// operations (cosine search) run through raw SQL against this column.
    #[sea_orm(column_type = "Text", nullable)]
    pub embedding: Option<String>,

    pub degree_centrality: Option<f32>,
    pub betweenness_centrality: Option<f32>,
    pub pagerank: Option<f32>,

    pub cluster_id: Option<Uuid>,

    pub visualized: bool,

    pub first_seen_year: Option<i32>,
    pub last_seen_year: Option<i32>,

    #[sea_orm(column_type = "Text", nullable)]
    pub extraction_section: Option<String>,

    #[sea_orm(column_type = "JsonBinary")]
    pub evidence_spans: serde_json::Value,

    #[sea_orm(column_type = "JsonBinary")]
    pub source_chunk_ids: serde_json::Value,

    #[sea_orm(column_type = "JsonBinary")]
    pub aliases: serde_json::Value,

    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::project::Entity",
        from = "Column::ProjectId",
        to = "super::project::Column::Id",
        on_delete = "Cascade"
    )]
    Project,

    #[sea_orm(
        belongs_to = "super::cluster::Entity",
        from = "Column::ClusterId",
        to = "super::cluster::Column::Id"
    )]
    Cluster,
}

impl Related<super::project::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Project.def()
    }
}

impl Related<super::cluster::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Cluster.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Parses the text-encoded pgvector column back into a dense vector.
    pub fn parse_embedding(&self) -> Option<Vec<f32>> {
        self.embedding.as_ref().and_then(|s| {
            let inner = s.trim_start_matches('[').trim_end_matches(']');
            inner
                .split(',')
                .map(|v| v.trim().parse::<f32>().ok())
                .collect()
        })
    }

    pub fn source_chunk_ids_vec(&self) -> Vec<Uuid> {
        serde_json::from_value(self.source_chunk_ids.clone()).unwrap_or_default()
    }
}
