//! Project: the scoping boundary for every entity, relationship, chunk, cluster,
//! and gap. Deleting a project cascades to everything it owns.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "projects")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(column_type = "Text")]
    pub name: String,

    #[sea_orm(column_type = "JsonBinary")]
    pub settings: serde_json::Value,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::entity::Entity")]
    Entities,

    #[sea_orm(has_many = "super::ingest_job::Entity")]
    IngestJobs,
}

impl Related<super::entity::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Entities.def()
    }
}

impl Related<super::ingest_job::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::IngestJobs.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
