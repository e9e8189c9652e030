pub mod embedding;
pub mod job;
pub mod listing;
pub mod ranking;

pub use embedding::{EmbeddingMeta, EmbeddingRecord, ResumeEmbedding};
pub use job::JobRecord;
pub use listing::RawListing;
pub use ranking::{RankedResult, RankedRow};
