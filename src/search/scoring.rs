//! Candidate scoring: cosine similarity plus evidence, source and year boosts.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::cache_store::canonical_value_json;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreConfig {
    pub base_weight: f64,
    pub strict_weight: f64,
    pub source_weight: f64,
    pub year_weight: f64,
    pub year_tolerance: i64,
    pub source_cap: usize,
    /// Filled per query from the query text.
    pub year_target: Option<i64>,
}

impl Default for ScoreConfig {
    fn default() -> Self {
        Self {
            base_weight: 0.6,
            strict_weight: 0.4,
            source_weight: 0.05,
            year_weight: 0.05,
            year_tolerance: 10,
            source_cap: 5,
            year_target: None,
        }
    }
}

impl ScoreConfig {
    pub fn with_year_target(&self, year_target: Option<i64>) -> Self {
        Self {
            year_target,
            ..self.clone()
        }
    }

    /// sha256 of the canonical (sorted-key) JSON of this config.
    pub fn config_hash(&self) -> String {
        let value = serde_json::to_value(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(canonical_value_json(&value).as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// Per-candidate metadata feeding the boosts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidateMeta {
    pub sources_count: usize,
    pub year: Option<String>,
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// First whitespace token starting with four digits that form a plausible
/// release year.
pub fn parse_year(value: &str) -> Option<i64> {
    value.split_whitespace().find_map(|token| {
        let prefix = token.get(..4)?;
        if !prefix.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let year: i64 = prefix.parse().ok()?;
        (1900..=2100).contains(&year).then_some(year)
    })
}

pub fn year_similarity(track_year: Option<i64>, target_year: Option<i64>, tolerance: i64) -> f64 {
    let (Some(track), Some(target)) = (track_year, target_year) else {
        return 0.0;
    };
    if tolerance <= 0 {
        return 0.0;
    }
    let diff = (track - target).abs();
    if diff >= tolerance {
        return 0.0;
    }
    (1.0 - diff as f64 / tolerance as f64).max(0.0)
}

/// Scores every candidate against the query vector. Inputs are parallel
/// slices; a missing metadata entry contributes no boost.
pub fn score_candidates(
    query_vector: &[f32],
    candidate_vectors: &[Vec<f32>],
    strict_ratios: &[f64],
    metadata: &[CandidateMeta],
    config: &ScoreConfig,
) -> Vec<f64> {
    let source_cap = config.source_cap.max(1);
    candidate_vectors
        .iter()
        .enumerate()
        .map(|(idx, vector)| {
            let cosine = cosine_similarity(vector, query_vector);
            let strict_ratio = strict_ratios.get(idx).copied().unwrap_or(0.0);
            let mut score = config.base_weight * cosine + config.strict_weight * strict_ratio;
            if let Some(meta) = metadata.get(idx) {
                let source_norm = meta.sources_count.min(source_cap) as f64 / source_cap as f64;
                score += config.source_weight * source_norm;
                let track_year = meta.year.as_deref().and_then(parse_year);
                score += config.year_weight
                    * year_similarity(track_year, config.year_target, config.year_tolerance);
            }
            score
        })
        .collect()
}

/// Candidate indices by descending score; equal scores keep input order.
pub fn rank_scores(scores: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|a, b| scores[*b].total_cmp(&scores[*a]));
    order
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_handles_degenerate_vectors() {
        assert_eq!(cosine_similarity(&[], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-9);
        assert!((cosine_similarity(&[1.0, 0.0], &[0.0, 3.0])).abs() < 1e-9);
    }

    #[test]
    fn parses_years_from_dates_and_text() {
        assert_eq!(parse_year("1998-04-20"), Some(1998));
        assert_eq!(parse_year("released 2004"), Some(2004));
        assert_eq!(parse_year("1850"), None);
        assert_eq!(parse_year("abc"), None);
        assert_eq!(parse_year("199"), None);
    }

    #[test]
    fn year_similarity_falls_off_linearly() {
        assert_eq!(year_similarity(Some(1995), Some(1995), 10), 1.0);
        assert!((year_similarity(Some(1990), Some(1995), 10) - 0.5).abs() < 1e-9);
        assert_eq!(year_similarity(Some(1985), Some(1995), 10), 0.0);
        assert_eq!(year_similarity(Some(1995), None, 10), 0.0);
        assert_eq!(year_similarity(Some(1995), Some(1995), 0), 0.0);
    }

    #[test]
    fn strict_ratio_raises_score_monotonically() {
        let config = ScoreConfig::default();
        let query = vec![1.0, 0.0];
        let vectors = vec![vec![0.6, 0.8], vec![0.6, 0.8]];
        let scores = score_candidates(&query, &vectors, &[0.0, 1.0], &[], &config);
        assert!(scores[1] > scores[0]);
        assert!((scores[1] - scores[0] - 0.4).abs() < 1e-9);

        let flat = ScoreConfig {
            strict_weight: 0.0,
            ..ScoreConfig::default()
        };
        let scores = score_candidates(&query, &vectors, &[0.0, 1.0], &[], &flat);
        assert_eq!(scores[0], scores[1]);
    }

    #[test]
    fn metadata_boosts_are_additive() {
        let config = ScoreConfig {
            year_target: Some(1995),
            ..ScoreConfig::default()
        };
        let query = vec![1.0, 0.0];
        let vectors = vec![vec![1.0, 0.0]];
        let meta = vec![CandidateMeta {
            sources_count: 10,
            year: Some("1995".to_string()),
        }];
        let scores = score_candidates(&query, &vectors, &[1.0], &meta, &config);
        // 0.6 + 0.4 + 0.05 (capped sources) + 0.05 (exact year)
        assert!((scores[0] - 1.1).abs() < 1e-9);
    }

    #[test]
    fn ranking_is_stable_and_deterministic() {
        let scores = vec![0.5, 0.9, 0.5, 0.1];
        assert_eq!(rank_scores(&scores), vec![1, 0, 2, 3]);
        assert_eq!(rank_scores(&scores), rank_scores(&scores));
        assert!(rank_scores(&[]).is_empty());
    }

    #[test]
    fn config_hash_tracks_weights() {
        let a = ScoreConfig::default();
        assert_eq!(a.config_hash(), ScoreConfig::default().config_hash());
        assert_eq!(a.config_hash().len(), 64);
        assert_ne!(a.config_hash(), a.with_year_target(Some(1995)).config_hash());
    }
}
