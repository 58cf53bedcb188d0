use codegraph_core::ScopedId;
use std::collections::HashMap;

/// Reciprocal Rank Fusion with a fixed constant `k=60` (§4.6.3,
/// GLOSSARY "Hybrid retrieval"). Each input ranking contributes
/// `1 / (k + rank)` per id it contains (1-indexed rank); missing rankers
/// simply contribute nothing rather than a penalty, so skipping an
/// unavailable sub-ranker never zeroes out a candidate seen by the others.
pub const RRF_K: f64 = 60.0;

pub fn reciprocal_rank_fusion(rankings: &[Vec<ScopedId>], limit: usize) -> Vec<(ScopedId, f64)> {
    let mut scores: HashMap<ScopedId, f64> = HashMap::new();
    let mut order: Vec<ScopedId> = Vec::new();

    for ranking in rankings {
        for (rank, id) in ranking.iter().enumerate() {
            let contribution = 1.0 / (RRF_K + (rank + 1) as f64);
            let entry = scores.entry(id.clone()).or_insert_with(|| {
                order.push(id.clone());
                0.0
            });
            *entry += contribution;
        }
    }

    let mut fused: Vec<(ScopedId, f64)> = order.into_iter().map(|id| {
        let score = scores[&id];
        (id, score)
    }).collect();
    fused.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    fused.truncate(limit);
    fused
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_ranked_first_by_all_rankers_wins() {
        let a = ScopedId::from("ab12:function:a");
        let b = ScopedId::from("ab12:function:b");
        let c = ScopedId::from("ab12:function:c");
        let rankings = vec![vec![a.clone(), b.clone(), c.clone()], vec![a.clone(), c.clone(), b.clone()]];
        let fused = reciprocal_rank_fusion(&rankings, 10);
        assert_eq!(fused[0].0, a);
    }

    #[test]
    fn a_ranker_with_no_results_is_skipped_without_penalty() {
        let a = ScopedId::from("ab12:function:a");
        let rankings: Vec<Vec<ScopedId>> = vec![vec![a.clone()], vec![]];
        let fused = reciprocal_rank_fusion(&rankings, 10);
        assert_eq!(fused.len(), 1);
        assert_eq!(fused[0].0, a);
    }

    #[test]
    fn limit_truncates_result_set() {
        let ids: Vec<ScopedId> = (0..10).map(|i| ScopedId::from(format!("ab12:function:f{i}").as_str())).collect();
        let fused = reciprocal_rank_fusion(&[ids], 3);
        assert_eq!(fused.len(), 3);
    }
}
