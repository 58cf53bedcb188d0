pub mod bm25;
pub mod embedding;
pub mod fusion;
pub mod ppr;
pub mod store;

pub use bm25::{Bm25Index, Bm25Params};
pub use embedding::{CachedEmbedder, EmbeddingProvider, LocalDeterministicProvider, RemoteSemanticProvider, TieredEmbedder};
pub use fusion::{reciprocal_rank_fusion, RRF_K};
pub use ppr::personalized_pagerank;
pub use store::{filter_ghost_points, point_id_for, ScoredPoint, VectorPoint, VectorStoreClient};
