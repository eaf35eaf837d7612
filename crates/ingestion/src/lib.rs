//! Paper ingestion: PDF text extraction, semantic chunking, entity/relationship
//! extraction, and the pipeline driver that ties them to storage and resolution.

pub mod chunker;
pub mod errors;
pub mod extractor;
pub mod pdf;
pub mod pipeline;
pub mod registry;

pub use errors::IngestionError;
pub use pipeline::{IngestOptions, IngestPipeline, PaperInput};
