//! Brute-force cosine ranking over in-memory chunks.
//!
//! Every call scans all candidates (O(n·d)); there is no index structure.
//! Libraries are expected to stay in the thousands of chunks.

use crate::models::{Chunk, RetrievalResult};
use tracing::debug;

/// Cosine similarity of two vectors, or `0.0` when either is empty, their
/// lengths differ or either has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let mut dot = 0f64;
    let mut norm_a = 0f64;
    let mut norm_b = 0f64;
    for (left, right) in a.iter().zip(b) {
        let (left, right) = (f64::from(*left), f64::from(*right));
        dot += left * right;
        norm_a += left * left;
        norm_b += right * right;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    let score = dot / (norm_a.sqrt() * norm_b.sqrt());
    if score.is_finite() {
        score.clamp(-1.0, 1.0) as f32
    } else {
        0.0
    }
}

/// Ranks embedded chunks against `query` and keeps the best `top_k`.
///
/// Chunks without an embedding are skipped. Equal scores keep input order.
pub fn search_similar_chunks(query: &[f32], chunks: &[Chunk], top_k: usize) -> Vec<RetrievalResult> {
    let mut results: Vec<RetrievalResult> = chunks
        .iter()
        .filter_map(|chunk| {
            let embedding = chunk.embedding.as_deref().filter(|vector| !vector.is_empty())?;
            Some(RetrievalResult {
                chunk: chunk.clone(),
                score: cosine_similarity(query, embedding),
            })
        })
        .collect();

    let scored = results.len();
    // `sort_by` is stable, which keeps ties in input order.
    results.sort_by(|left, right| right.score.total_cmp(&left.score));
    results.truncate(top_k);

    debug!(
        candidates = chunks.len(),
        scored,
        returned = results.len(),
        best = ?results.first().map(|hit| hit.score),
        "ranked chunks"
    );
    results
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(index: u64, text: &str, embedding: Option<Vec<f32>>) -> Chunk {
        Chunk {
            chunk_index: index,
            text: text.to_string(),
            page_start: 1,
            page_end: 1,
            embedding,
        }
    }

    #[test]
    fn cosine_boundaries() {
        assert_eq!(cosine_similarity(&[], &[1.0, 2.0, 3.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 2.0], &[1.0, 2.0]) - 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0, 2.0, 3.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn unembedded_chunks_are_skipped_not_scored() {
        let chunks = vec![
            chunk(0, "no vector", None),
            chunk(1, "empty vector", Some(Vec::new())),
            chunk(2, "orthogonal", Some(vec![0.0, 1.0])),
        ];

        let results = search_similar_chunks(&[1.0, 0.0], &chunks, 10);

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.chunk_index, 2);
        assert_eq!(results[0].score, 0.0);
    }

    #[test]
    fn ties_keep_input_order() {
        let tie = vec![0.9, (1.0f32 - 0.81).sqrt()];
        let chunks = vec![
            chunk(2, "first tie", Some(tie.clone())),
            chunk(0, "second tie", Some(tie)),
            chunk(5, "weaker", Some(vec![0.5, 0.75f32.sqrt()])),
        ];

        let results = search_similar_chunks(&[1.0, 0.0], &chunks, 2);

        let order: Vec<u64> = results.iter().map(|hit| hit.chunk.chunk_index).collect();
        assert_eq!(order, vec![2, 0]);
        assert!((results[0].score - 0.9).abs() < 1e-5);
    }

    #[test]
    fn query_close_to_one_topic_ranks_it_first() {
        let chunks = vec![
            chunk(0, "neural networks", Some(vec![1.0, 0.0])),
            chunk(1, "climate models", Some(vec![0.0, 1.0])),
        ];

        let results = search_similar_chunks(&[0.9, 0.1], &chunks, 1);

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.text, "neural networks");
        assert!(results[0].score > 0.9);
    }

    #[test]
    fn zero_top_k_returns_nothing() {
        let chunks = vec![chunk(0, "a", Some(vec![1.0]))];
        assert!(search_similar_chunks(&[1.0], &chunks, 0).is_empty());
    }
}
