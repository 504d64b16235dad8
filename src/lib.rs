//! Organize a personal photo collection.
//!
//! Two independent pipelines:
//!
//! - **Geo inference**: read EXIF timestamps and GPS from geotagged photos,
//!   group them into place visits by time and distance proximity, reduce each
//!   visit to a durable location-mapping row, and write inferred GPS/time
//!   back onto photos that lack them.
//! - **Similarity**: embed each image with a pretrained vision encoder and
//!   retrieve the most similar photos per image by vector similarity.
//!
//! Both pipelines are single-threaded, synchronous and batch-oriented; the
//! mapping table and embedding table are plain CSV files, read fully into
//! memory and rewritten fully on update.

pub mod config;
pub mod embed;
pub mod error;
pub mod geo;
pub mod logging;
pub mod scanner;

pub use config::Config;
pub use error::{Error, Result};
