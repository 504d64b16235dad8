//! The durable embedding table: one dense vector per distinct filepath.

use std::collections::HashMap;
use std::path::Path;

use crate::embed::model::ImageEncoder;
use crate::error::{Error, Result};

/// One row of the embedding table. `similar_images` and `threshold` are
/// filled in by a batch similarity update.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingRecord {
    pub filepath: String,
    pub embedding: Vec<f32>,
    pub similar_images: Option<Vec<String>>,
    pub threshold: Option<f32>,
}

/// In-memory embedding table, keyed by filepath. Mutated only by appending
/// new unique filepaths; read fully and rewritten fully on update.
#[derive(Debug, Default)]
pub struct EmbeddingTable {
    records: Vec<EmbeddingRecord>,
    by_path: HashMap<String, usize>,
}

impl EmbeddingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[EmbeddingRecord] {
        &self.records
    }

    pub fn records_mut(&mut self) -> &mut [EmbeddingRecord] {
        &mut self.records
    }

    pub fn get(&self, filepath: &str) -> Option<&EmbeddingRecord> {
        self.by_path.get(filepath).map(|&i| &self.records[i])
    }

    /// Table index of a filepath, in insertion order.
    pub fn position(&self, filepath: &str) -> Option<usize> {
        self.by_path.get(filepath).copied()
    }

    /// Append a new row. A filepath already present is left untouched; the
    /// table never holds duplicate rows.
    pub fn insert(&mut self, filepath: String, embedding: Vec<f32>) -> bool {
        if self.by_path.contains_key(&filepath) {
            return false;
        }
        self.by_path.insert(filepath.clone(), self.records.len());
        self.records.push(EmbeddingRecord {
            filepath,
            embedding,
            similar_images: None,
            threshold: None,
        });
        true
    }

    /// Embed one image, caching by filepath: a path already in the table
    /// returns the stored vector without touching the encoder or adding a
    /// duplicate row.
    pub fn embed_file(&mut self, encoder: &ImageEncoder, path: &Path) -> Result<Vec<f32>> {
        let key = path.display().to_string();

        if let Some(record) = self.get(&key) {
            tracing::debug!(file = %key, "embedding already cached");
            return Ok(record.embedding.clone());
        }

        let embedding = encoder.embed_file(path)?;
        self.insert(key, embedding.clone());
        Ok(embedding)
    }

    /// Load a table previously written by [`EmbeddingTable::save`].
    pub fn load(path: &Path) -> Result<Self> {
        let mut rdr = csv::Reader::from_path(path)?;
        let mut table = Self::new();

        for result in rdr.records() {
            let row = result?;
            let filepath = row
                .get(0)
                .ok_or_else(|| Error::MappingTable {
                    path: path.display().to_string(),
                    reason: "missing filepath column".to_string(),
                })?
                .to_string();
            let embedding: Vec<f32> = serde_json::from_str(row.get(1).unwrap_or("[]"))?;

            let similar_images = match row.get(2) {
                Some("") | None => None,
                Some(raw) => Some(serde_json::from_str(raw)?),
            };
            let threshold = match row.get(3) {
                Some("") | None => None,
                Some(raw) => raw.parse::<f32>().ok(),
            };

            if table.insert(filepath.clone(), embedding) {
                let idx = table.records.len() - 1;
                table.records[idx].similar_images = similar_images;
                table.records[idx].threshold = threshold;
            } else {
                tracing::warn!(file = %filepath, "duplicate filepath in embedding table, keeping first");
            }
        }

        tracing::info!(rows = table.len(), path = %path.display(), "embedding table loaded");
        Ok(table)
    }

    /// Load the table at `path`, or start an empty one when no table exists
    /// yet.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::new())
        }
    }

    /// Serialize every row to `path`, overwriting any prior table.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut wtr = csv::Writer::from_path(path)?;

        wtr.write_record(["filepath", "embedding", "similar_images", "threshold"])?;
        for record in &self.records {
            let similar = match &record.similar_images {
                Some(paths) => serde_json::to_string(paths)?,
                None => String::new(),
            };
            let threshold = record.threshold.map(|t| t.to_string()).unwrap_or_default();
            wtr.write_record([
                record.filepath.clone(),
                serde_json::to_string(&record.embedding)?,
                similar,
                threshold,
            ])?;
        }

        wtr.flush()?;
        tracing::info!(rows = self.len(), path = %path.display(), "embedding table written");
        Ok(())
    }
}
