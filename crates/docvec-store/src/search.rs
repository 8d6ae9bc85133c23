//! Similarity ranking
//!
//! The store runs retrieval in two phases: a scan that reads only ids,
//! grouping keys and embeddings, then a hydrate step that fetches text for
//! the survivors alone. This module holds the pure part in between: the
//! cosine score and the floor / sort / top-k selection.

use std::cmp::Ordering;

/// Cosine similarity of two vectors.
///
/// Returns 0.0 when either norm is zero or the lengths differ. The result
/// is clamped into [-1, 1] to absorb rounding.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    let score = dot / (norm_a * norm_b);
    if score.is_finite() {
        score.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

/// Scan-phase result: everything but the text
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub id: i64,
    pub document_id: String,
    pub file_name: Option<String>,
    pub chunk_index: u32,
    pub similarity: f32,
}

/// Whether a score clears the floor (inclusive)
pub fn passes_floor(similarity: f32, min_similarity: f32) -> bool {
    similarity >= min_similarity
}

/// Sort by similarity descending, ties by ascending id
pub fn rank(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// Drop candidates below the floor, rank the rest and keep the best `top_k`
pub fn select_top_k(
    candidates: Vec<Candidate>,
    top_k: usize,
    min_similarity: f32,
) -> Vec<Candidate> {
    let mut kept: Vec<Candidate> = candidates
        .into_iter()
        .filter(|c| passes_floor(c.similarity, min_similarity))
        .collect();
    rank(&mut kept);
    kept.truncate(top_k);
    kept
}
