//! Error taxonomy for the geo-inference and similarity pipelines.
//!
//! Per-photo failures (`NoLocationMatch`, `CorruptImage`, `EmbeddingNotFound`)
//! are caught at the batch loop and reported with filename context; pipeline
//! failures (`MissingTimestamp`, unreadable tables) abort the run.

use chrono::NaiveDateTime;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Fatal to a grouping pass: records cannot be ordered without a timestamp.
    #[error("{filename}: no capture timestamp, records cannot be ordered for grouping")]
    MissingTimestamp { filename: String },

    /// A place group whose members all lack GPS has no average to report.
    #[error("group starting at {start} has no GPS-bearing photos to average")]
    NoCoordinatesInGroup { start: NaiveDateTime },

    /// No location window contains the photo's timestamp. The photo is skipped
    /// and left untouched; the batch continues.
    #[error("{filename}: no location window contains {timestamp}")]
    NoLocationMatch {
        filename: String,
        timestamp: NaiveDateTime,
    },

    /// Unreadable or undecodable image. Skipped; the batch continues.
    #[error("{path}: cannot read image: {reason}")]
    CorruptImage { path: String, reason: String },

    /// Similarity query for a filepath that was never embedded. Never resolved
    /// by fuzzy matching.
    #[error("no embedding stored for '{filepath}'")]
    EmbeddingNotFound { filepath: String },

    #[error("query index {index} out of range for table of {len} embeddings")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("invalid DMS angle '{value}'")]
    InvalidDms { value: String },

    #[error("invalid timestamp '{value}', expected YYYY:MM:DD HH:MM:SS")]
    InvalidTimestamp { value: String },

    /// A mapping-table row with `start` after `end` aborts the run.
    #[error("invalid location window: start {start} is after end {end}")]
    InvalidWindow {
        start: NaiveDateTime,
        end: NaiveDateTime,
    },

    #[error("location mapping table {path}: {reason}")]
    MappingTable { path: String, reason: String },

    #[error("vision encoder: {reason}")]
    Encoder { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("EXIF encoding failed: {0}")]
    Exif(#[from] exif::Error),

    #[error("image container rewrite failed: {0}")]
    ImageParts(#[from] img_parts::Error),

    #[error("embedding inference failed: {0}")]
    Inference(#[from] ort::Error),
}
