pub mod answer;
pub mod corpus;
pub mod expander;
pub mod ingest;
pub mod ranker;

pub use answer::{answer, build_context};
pub use corpus::BookCorpus;
pub use expander::{QueryAnalysis, QueryExpander};
pub use ingest::{IngestInput, IngestionPipeline, PipelineState};
pub use ranker::{HybridRanker, RankedChunk};
