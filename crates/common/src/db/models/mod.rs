//! SeaORM entity models for the knowledge-graph subsystem.

mod chunk;
mod cluster;
mod entity;
mod gap;
mod ingest_job;
mod project;
mod relationship;

pub use project::{
    ActiveModel as ProjectActiveModel, Column as ProjectColumn, Entity as ProjectEntity,
    Model as Project,
};

pub use entity::{
    ActiveModel as EntityActiveModel, Column as EntityColumn, Entity as EntityEntity,
    Model as EntityRow,
};

pub use relationship::{
    ActiveModel as RelationshipActiveModel, Column as RelationshipColumn,
    Entity as RelationshipEntity, Model as RelationshipRow,
};

pub use chunk::{
    ActiveModel as ChunkActiveModel, Column as ChunkColumn, Entity as ChunkEntity, Model as Chunk,
};

pub use cluster::{
    ActiveModel as ClusterActiveModel, Column as ClusterColumn, Entity as ClusterEntity,
    Model as Cluster,
};

pub use gap::{ActiveModel as GapActiveModel, Column as GapColumn, Entity as GapEntity, Model as Gap};

pub use ingest_job::{
    ActiveModel as IngestJobActiveModel, Column as IngestJobColumn, Entity as IngestJobEntity,
    JobStatus, Model as IngestJob,
};
