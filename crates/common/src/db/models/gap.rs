//! Structural gap: a weakly connected pair of concept clusters, interpreted as
//! a research opportunity. `(project_id, min(cluster_a, cluster_b),
//! max(cluster_a, cluster_b))` is unique.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "gaps")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub project_id: Uuid,

    pub cluster_a_id: Uuid,
    pub cluster_b_id: Uuid,

    #[sea_orm(column_type = "JsonBinary")]
    pub concept_ids_a: serde_json::Value,

    #[sea_orm(column_type = "JsonBinary")]
    pub concept_ids_b: serde_json::Value,

    pub gap_strength: f32,
    pub semantic_distance: f32,

    #[sea_orm(column_type = "JsonBinary")]
    pub bridge_candidates: serde_json::Value,

    #[sea_orm(column_type = "JsonBinary")]
    pub research_questions: serde_json::Value,

    #[sea_orm(column_type = "JsonBinary")]
    pub ghost_edges: serde_json::Value,

    #[sea_orm(column_type = "Text")]
    pub status: String,

    pub created_at: DateTimeWithTimeZone,
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
}

impl Related<super::project::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Project.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
