//! Directed typed edge between two entities. `(source_id, target_id,
//! relationship_type)` is unique; weight defaults to 1.0 and is clamped to [0, 1].

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "relationships")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub project_id: Uuid,

    pub source_id: Uuid,
    pub target_id: Uuid,

    #[sea_orm(column_type = "Text")]
    pub relationship_type: String,

    pub weight: f32,

    #[sea_orm(column_type = "JsonBinary")]
    pub properties: serde_json::Value,

    #[sea_orm(column_type = "JsonBinary")]
    pub evidence_spans: serde_json::Value,

    #[sea_orm(column_type = "JsonBinary")]
    pub evidence_chunk_ids: serde_json::Value,

    pub first_seen_year: Option<i32>,

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
