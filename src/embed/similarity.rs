//! Similarity retrieval over the embedding table.
//!
//! Exact cosine ranking is the default for small and medium collections. The
//! nearest-neighbor mode goes through [`NearestNeighborIndex`] so an indexed
//! structure can replace the linear scan for large collections without
//! changing the retrieval contract. The two modes rank by different metrics
//! and may disagree on borderline results.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::embed::table::EmbeddingTable;
use crate::error::{Error, Result};

/// Retrieval method.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Method {
    /// Exact cosine similarity against every other vector.
    #[default]
    Cosine,
    /// Nearest neighbors by Euclidean distance, scored as `1 - distance`.
    NearestNeighbors,
}

/// A similarity query: a table index or an exact filepath. An unknown
/// filepath is an error, never a fuzzy match.
#[derive(Debug, Clone, Copy)]
pub enum Query<'a> {
    Index(usize),
    Path(&'a str),
}

/// One retrieved match.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarMatch {
    pub filepath: String,
    pub similarity: f32,
    pub embedding: Vec<f32>,
}

/// Calculate cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

/// A neighbor by index and distance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub index: usize,
    pub distance: f32,
}

/// Nearest-neighbor retrieval seam. The distance must be convertible to a
/// similarity score as `1 - distance`.
pub trait NearestNeighborIndex {
    /// The `n` nearest table rows to `query`, closest first.
    fn nearest(&self, query: &[f32], n: usize) -> Vec<Neighbor>;
}

/// Full-scan nearest neighbors, the in-memory default.
pub struct LinearScanIndex<'a> {
    table: &'a EmbeddingTable,
}

impl<'a> LinearScanIndex<'a> {
    pub fn new(table: &'a EmbeddingTable) -> Self {
        Self { table }
    }
}

impl NearestNeighborIndex for LinearScanIndex<'_> {
    fn nearest(&self, query: &[f32], n: usize) -> Vec<Neighbor> {
        let mut neighbors: Vec<Neighbor> = self
            .table
            .records()
            .iter()
            .enumerate()
            .map(|(index, record)| Neighbor {
                index,
                distance: euclidean_distance(query, &record.embedding),
            })
            .collect();

        neighbors.sort_by(|a, b| a.distance.partial_cmp(&b.distance).unwrap_or(Ordering::Equal));
        neighbors.truncate(n);
        neighbors
    }
}

fn resolve_index(table: &EmbeddingTable, query: Query) -> Result<usize> {
    match query {
        Query::Index(index) if index < table.len() => Ok(index),
        Query::Index(index) => Err(Error::IndexOutOfRange {
            index,
            len: table.len(),
        }),
        Query::Path(path) => table.position(path).ok_or_else(|| Error::EmbeddingNotFound {
            filepath: path.to_string(),
        }),
    }
}

/// Retrieve up to `n` matches for `query` with similarity at or above
/// `threshold`, best first. The query row itself is never returned.
pub fn find_similar(
    table: &EmbeddingTable,
    query: Query,
    method: Method,
    n: usize,
    threshold: f32,
) -> Result<Vec<SimilarMatch>> {
    match method {
        Method::Cosine => find_similar_cosine(table, query, n, threshold),
        Method::NearestNeighbors => {
            find_similar_with(table, &LinearScanIndex::new(table), query, n, threshold)
        }
    }
}

fn find_similar_cosine(
    table: &EmbeddingTable,
    query: Query,
    n: usize,
    threshold: f32,
) -> Result<Vec<SimilarMatch>> {
    let query_index = resolve_index(table, query)?;
    let query_embedding = &table.records()[query_index].embedding;

    let mut scored: Vec<(usize, f32)> = table
        .records()
        .iter()
        .enumerate()
        .filter(|(index, _)| *index != query_index)
        .map(|(index, record)| (index, cosine_similarity(query_embedding, &record.embedding)))
        .collect();

    // stable sort keeps table order between equal scores
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

    Ok(scored
        .into_iter()
        .filter(|(_, similarity)| *similarity >= threshold)
        .take(n)
        .map(|(index, similarity)| to_match(table, index, similarity))
        .collect())
}

/// Nearest-neighbor retrieval through an explicit index implementation.
pub fn find_similar_with(
    table: &EmbeddingTable,
    index: &dyn NearestNeighborIndex,
    query: Query,
    n: usize,
    threshold: f32,
) -> Result<Vec<SimilarMatch>> {
    let query_index = resolve_index(table, query)?;
    let query_embedding = &table.records()[query_index].embedding;

    // one extra so the query row can be dropped from its own neighborhood
    Ok(index
        .nearest(query_embedding, n + 1)
        .into_iter()
        .filter(|neighbor| neighbor.index != query_index)
        .map(|neighbor| (neighbor.index, 1.0 - neighbor.distance))
        .filter(|(_, similarity)| *similarity >= threshold)
        .take(n)
        .map(|(index, similarity)| to_match(table, index, similarity))
        .collect())
}

fn to_match(table: &EmbeddingTable, index: usize, similarity: f32) -> SimilarMatch {
    let record = &table.records()[index];
    SimilarMatch {
        filepath: record.filepath.clone(),
        similarity,
        embedding: record.embedding.clone(),
    }
}

/// Compute the similar-image list for every row and store it on the table
/// (paths only, plus the threshold used). Per-row failures are logged and
/// skipped; the batch continues.
pub fn update_similar_images(table: &mut EmbeddingTable, method: Method, n: usize, threshold: f32) {
    let mut lists: Vec<Option<Vec<String>>> = Vec::with_capacity(table.len());

    for index in 0..table.len() {
        match find_similar(table, Query::Index(index), method, n, threshold) {
            Ok(matches) => {
                lists.push(Some(matches.into_iter().map(|m| m.filepath).collect()));
            }
            Err(e) => {
                tracing::warn!(
                    file = %table.records()[index].filepath,
                    error = %e,
                    "similarity lookup failed, skipping row"
                );
                lists.push(None);
            }
        }
    }

    for (record, list) in table.records_mut().iter_mut().zip(lists) {
        if let Some(paths) = list {
            record.similar_images = Some(paths);
            record.threshold = Some(threshold);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(angle_degrees: f32) -> Vec<f32> {
        let rad = angle_degrees.to_radians();
        vec![rad.cos(), rad.sin()]
    }

    fn table_with(rows: &[(&str, Vec<f32>)]) -> EmbeddingTable {
        let mut table = EmbeddingTable::new();
        for (path, embedding) in rows {
            table.insert(path.to_string(), embedding.clone());
        }
        table
    }

    #[test]
    fn test_cosine_similarity_basics() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 0.0001);

        let c = vec![0.0, 1.0, 0.0];
        assert!((cosine_similarity(&a, &c) - 0.0).abs() < 0.0001);

        let d = vec![-1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &d) - (-1.0)).abs() < 0.0001);
    }

    #[test]
    fn test_cosine_similarity_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_threshold_keeps_only_close_matches() {
        // of five vectors, exactly two others clear 0.9 similarity
        let table = table_with(&[
            ("query.jpg", unit(0.0)),
            ("far1.jpg", unit(60.0)),
            ("near1.jpg", unit(20.0)),
            ("near2.jpg", unit(10.0)),
            ("far2.jpg", unit(90.0)),
        ]);

        let matches = find_similar(&table, Query::Path("query.jpg"), Method::Cosine, 3, 0.9).unwrap();

        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].filepath, "near2.jpg");
        assert_eq!(matches[1].filepath, "near1.jpg");
        assert!(matches[0].similarity >= matches[1].similarity);
        assert!(matches.iter().all(|m| m.similarity >= 0.9));
    }

    #[test]
    fn test_self_is_excluded() {
        let table = table_with(&[
            ("a.jpg", unit(0.0)),
            ("b.jpg", unit(0.0)),
        ]);

        let matches = find_similar(&table, Query::Index(0), Method::Cosine, 5, 0.0).unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].filepath, "b.jpg");
    }

    #[test]
    fn test_truncates_to_n() {
        let table = table_with(&[
            ("q.jpg", unit(0.0)),
            ("a.jpg", unit(1.0)),
            ("b.jpg", unit(2.0)),
            ("c.jpg", unit(3.0)),
        ]);

        let matches = find_similar(&table, Query::Index(0), Method::Cosine, 2, 0.0).unwrap();
        assert_eq!(matches.len(), 2);
    }

    #[test]
    fn test_equal_scores_keep_table_order() {
        let table = table_with(&[
            ("q.jpg", unit(0.0)),
            ("twin1.jpg", unit(5.0)),
            ("twin2.jpg", unit(5.0)),
        ]);

        let matches = find_similar(&table, Query::Index(0), Method::Cosine, 5, 0.0).unwrap();
        assert_eq!(matches[0].filepath, "twin1.jpg");
        assert_eq!(matches[1].filepath, "twin2.jpg");
    }

    #[test]
    fn test_unknown_path_is_an_error() {
        let table = table_with(&[("a.jpg", unit(0.0))]);

        let err = find_similar(&table, Query::Path("missing.jpg"), Method::Cosine, 3, 0.5)
            .unwrap_err();
        assert!(matches!(err, Error::EmbeddingNotFound { ref filepath } if filepath == "missing.jpg"));
    }

    #[test]
    fn test_index_out_of_range_is_an_error() {
        let table = table_with(&[("a.jpg", unit(0.0))]);

        let err = find_similar(&table, Query::Index(7), Method::Cosine, 3, 0.5).unwrap_err();
        assert!(matches!(err, Error::IndexOutOfRange { index: 7, len: 1 }));
    }

    #[test]
    fn test_nearest_neighbor_mode_scores_by_distance() {
        let table = table_with(&[
            ("q.jpg", unit(0.0)),
            ("close.jpg", unit(10.0)),
            ("far.jpg", unit(90.0)),
        ]);

        let matches =
            find_similar(&table, Query::Index(0), Method::NearestNeighbors, 2, 0.5).unwrap();

        // unit vectors 10 degrees apart are ~0.174 apart in euclidean space
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].filepath, "close.jpg");
        assert!((matches[0].similarity - (1.0 - 0.174)).abs() < 0.01);
    }

    #[test]
    fn test_update_similar_images_fills_every_row() {
        let mut table = table_with(&[
            ("a.jpg", unit(0.0)),
            ("b.jpg", unit(5.0)),
            ("c.jpg", unit(10.0)),
        ]);

        update_similar_images(&mut table, Method::Cosine, 2, 0.9);

        for record in table.records() {
            assert!(record.similar_images.is_some());
            assert_eq!(record.threshold, Some(0.9));
            // scores are dropped, only paths survive
            let similar = record.similar_images.as_ref().unwrap();
            assert!(!similar.contains(&record.filepath));
        }
        assert_eq!(
            table.records()[0].similar_images.as_ref().unwrap(),
            &vec!["b.jpg".to_string(), "c.jpg".to_string()]
        );
    }
}
