//! Embedding pipeline: extract one dense vector per image and retrieve
//! visually similar photos by vector similarity.

pub mod model;
pub mod similarity;
pub mod table;

pub use model::{ImageEncoder, EMBEDDING_DIM};
pub use similarity::{
    cosine_similarity, find_similar, find_similar_with, update_similar_images, LinearScanIndex,
    Method, NearestNeighborIndex, Neighbor, Query, SimilarMatch,
};
pub use table::{EmbeddingRecord, EmbeddingTable};
