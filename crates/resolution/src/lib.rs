//! Entity resolution: deduplicates extracted entities within a project via a
//! deterministic → embedding → LLM cascade, then links cross-paper survivors
//! of the same real-world referent with `SameAs` relationships.

pub mod homonym;
pub mod normalize;
pub mod resolver;

pub use resolver::{AuditedPair, EntityResolver, MergeDecision, MergeStage, ResolutionOutcome, ResolutionStats};
