//! A group of Concept entities sharing a cluster id, produced by the clusterer.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "clusters")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub project_id: Uuid,

    #[sea_orm(column_type = "JsonBinary")]
    pub keywords: serde_json::Value,

    #[sea_orm(column_type = "JsonBinary")]
    pub concept_ids: serde_json::Value,

    pub size: i32,

    pub density: f32,

    #[sea_orm(column_type = "Text")]
    pub label: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub centroid: Option<String>,

    #[sea_orm(column_type = "Text")]
    pub detection_method: String,

    pub level: i16,

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

impl Model {
    pub fn keywords_vec(&self) -> Vec<String> {
        serde_json::from_value(self.keywords.clone()).unwrap_or_default()
    }
}
