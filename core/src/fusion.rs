//! Weighted reciprocal-rank fusion over per-strategy rankings.
//!
//! Each retrieval strategy produces an ordered hit list with raw scores. The
//! scores are min-max normalized within the strategy, then chunks are fused
//! by weighted RRF with the constant `K = 60`:
//!
//! ```text
//! score(c) = Σ_s  w_s · 1 / (K + rank_s(c))       (rank is 1-based)
//! ```
//!
//! Only strategies in which a chunk appears contribute to its score. The
//! output ordering is fully deterministic: ties break on the number of
//! contributing strategies, then the best normalized per-strategy score,
//! then chunk id ascending. Fusion is permutation-invariant in the order
//! strategies are supplied.

use std::collections::BTreeMap;

use crate::types::StrategyKind;

/// RRF rank constant.
pub const RRF_K: f64 = 60.0;

/// One strategy's ranked output entering fusion.
#[derive(Debug, Clone)]
pub struct StrategyRanking {
    /// Which strategy produced this list.
    pub kind: StrategyKind,
    /// Fusion weight from the query plan.
    pub weight: f32,
    /// Hits ordered best-first: `(chunk_id, raw_score)`.
    pub hits: Vec<(String, f32)>,
}

/// A fused chunk with provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct FusedHit {
    /// Chunk id.
    pub chunk_id: String,
    /// Weighted RRF score.
    pub score: f64,
    /// Strategies this chunk appeared in, sorted.
    pub strategies: Vec<StrategyKind>,
    /// Best normalized per-strategy score.
    pub max_component_score: f32,
}

/// Min-max normalize raw scores to `[0, 1]` over the returned set.
///
/// Degenerate sets (≤ 1 element or zero variance) fall back to the raw
/// scores clipped to `[0, 1]`.
pub fn min_max_normalize(scores: &[f32]) -> Vec<f32> {
    if scores.len() <= 1 {
        return scores.iter().map(|s| s.clamp(0.0, 1.0)).collect();
    }
    let min = scores.iter().copied().fold(f32::INFINITY, f32::min);
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    if (max - min).abs() < f32::EPSILON {
        return scores.iter().map(|s| s.clamp(0.0, 1.0)).collect();
    }
    scores.iter().map(|s| (s - min) / (max - min)).collect()
}

/// Fuse per-strategy rankings into a single ordered list, truncated to
/// `top_n`.
pub fn fuse(rankings: &[StrategyRanking], top_n: usize) -> Vec<FusedHit> {
    #[derive(Default)]
    struct Acc {
        score: f64,
        strategies: Vec<StrategyKind>,
        max_component_score: f32,
    }

    // BTreeMap keeps accumulation order independent of strategy order.
    let mut acc: BTreeMap<String, Acc> = BTreeMap::new();

    for ranking in rankings {
        let raw: Vec<f32> = ranking.hits.iter().map(|(_, s)| *s).collect();
        let normalized = min_max_normalize(&raw);
        for (rank0, ((chunk_id, _), norm)) in
            ranking.hits.iter().zip(normalized.iter()).enumerate()
        {
            let entry = acc.entry(chunk_id.clone()).or_default();
            entry.score += ranking.weight as f64 / (RRF_K + (rank0 + 1) as f64);
            entry.strategies.push(ranking.kind);
            entry.max_component_score = entry.max_component_score.max(*norm);
        }
    }

    let mut fused: Vec<FusedHit> = acc
        .into_iter()
        .map(|(chunk_id, mut a)| {
            a.strategies.sort();
            a.strategies.dedup();
            FusedHit {
                chunk_id,
                score: a.score,
                strategies: a.strategies,
                max_component_score: a.max_component_score,
            }
        })
        .collect();

    fused.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.strategies.len().cmp(&a.strategies.len()))
            .then_with(|| {
                b.max_component_score
                    .partial_cmp(&a.max_component_score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });
    fused.truncate(top_n);
    fused
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranking(kind: StrategyKind, weight: f32, hits: &[(&str, f32)]) -> StrategyRanking {
        StrategyRanking {
            kind,
            weight,
            hits: hits.iter().map(|(id, s)| (id.to_string(), *s)).collect(),
        }
    }

    #[test]
    fn test_min_max_normalize() {
        assert_eq!(min_max_normalize(&[2.0, 4.0, 6.0]), vec![0.0, 0.5, 1.0]);
    }

    #[test]
    fn test_min_max_normalize_degenerate_sets() {
        // Single element: raw clipped
        assert_eq!(min_max_normalize(&[1.7]), vec![1.0]);
        assert_eq!(min_max_normalize(&[0.4]), vec![0.4]);
        // Zero variance: raw clipped
        assert_eq!(min_max_normalize(&[0.5, 0.5]), vec![0.5, 0.5]);
        assert!(min_max_normalize(&[]).is_empty());
    }

    #[test]
    fn test_fuse_single_strategy_preserves_order() {
        let r = ranking(StrategyKind::Vector, 1.0, &[("a", 0.9), ("b", 0.5), ("c", 0.2)]);
        let fused = fuse(&[r], 10);
        let ids: Vec<&str> = fused.iter().map(|f| f.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert!((fused[0].score - 1.0 / 61.0).abs() < 1e-12);
    }

    #[test]
    fn test_fuse_is_permutation_invariant() {
        let v = ranking(StrategyKind::Vector, 0.6, &[("a", 0.9), ("b", 0.7), ("c", 0.1)]);
        let g = ranking(StrategyKind::Graph, 0.25, &[("b", 2.0), ("d", 1.0)]);
        let k = ranking(StrategyKind::Keyword, 0.15, &[("c", 3.0), ("a", 1.5)]);

        let forward = fuse(&[v.clone(), g.clone(), k.clone()], 10);
        let backward = fuse(&[k, g, v], 10);
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_fuse_multi_strategy_chunk_wins() {
        // "b" is rank 2 in vector and rank 1 in graph; with comparable
        // weights it must outrank "a" (rank 1 in vector only).
        let v = ranking(StrategyKind::Vector, 0.5, &[("a", 0.9), ("b", 0.8)]);
        let g = ranking(StrategyKind::Graph, 0.5, &[("b", 1.0)]);
        let fused = fuse(&[v, g], 10);
        assert_eq!(fused[0].chunk_id, "b");
        assert_eq!(fused[0].strategies, vec![StrategyKind::Vector, StrategyKind::Graph]);
    }

    #[test]
    fn test_fuse_tie_broken_by_strategy_count() {
        // Same fused score by construction: "x" appears once with weight 1.0
        // at rank 1; "y" appears twice with weight 0.5 at rank 1 each.
        let a = ranking(StrategyKind::Vector, 1.0, &[("x", 1.0)]);
        let b = ranking(StrategyKind::Graph, 0.5, &[("y", 1.0)]);
        let c = ranking(StrategyKind::Keyword, 0.5, &[("y", 1.0)]);
        let fused = fuse(&[a, b, c], 10);
        assert_eq!(fused.len(), 2);
        assert!((fused[0].score - fused[1].score).abs() < 1e-12);
        assert_eq!(fused[0].chunk_id, "y", "more strategies wins the tie");
    }

    #[test]
    fn test_fuse_tie_broken_by_chunk_id() {
        let a = ranking(StrategyKind::Vector, 1.0, &[("z", 1.0)]);
        let b = ranking(StrategyKind::Graph, 1.0, &[("m", 1.0)]);
        let fused = fuse(&[a, b], 10);
        assert!((fused[0].score - fused[1].score).abs() < 1e-12);
        assert_eq!(fused[0].chunk_id, "m", "id ascending wins the final tie");
    }

    #[test]
    fn test_fuse_truncates_to_top_n() {
        let r = ranking(
            StrategyKind::Vector,
            1.0,
            &[("a", 0.9), ("b", 0.8), ("c", 0.7), ("d", 0.6)],
        );
        assert_eq!(fuse(&[r], 2).len(), 2);
    }

    #[test]
    fn test_fuse_empty_input() {
        assert!(fuse(&[], 10).is_empty());
        let empty = ranking(StrategyKind::Vector, 1.0, &[]);
        assert!(fuse(&[empty], 10).is_empty());
    }

    #[test]
    fn test_fuse_records_max_component_score() {
        let v = ranking(StrategyKind::Vector, 0.5, &[("a", 2.0), ("b", 1.0), ("c", 0.0)]);
        let fused = fuse(&[v], 10);
        // normalized: a=1.0, b=0.5, c=0.0
        let by_id: BTreeMap<&str, f32> = fused
            .iter()
            .map(|f| (f.chunk_id.as_str(), f.max_component_score))
            .collect();
        assert_eq!(by_id["a"], 1.0);
        assert_eq!(by_id["b"], 0.5);
        assert_eq!(by_id["c"], 0.0);
    }
}
