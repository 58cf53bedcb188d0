use codegraph_core::ScopedId;
use std::collections::HashMap;

/// Personalized PageRank over a generic directed adjacency map, seeded at a
/// set of starting nodes (§4.6.3's third ranker). Decoupled from
/// `codegraph-graph`'s `GraphIndex` type on purpose: the caller (the query
/// layer, which already holds the index) flattens whichever edge kinds it
/// wants walked into a plain adjacency map, keeping this crate's dependency
/// graph one-directional (C5 has no reason to depend on C4).
pub fn personalized_pagerank(
    seeds: &[ScopedId],
    adjacency: &HashMap<ScopedId, Vec<ScopedId>>,
    damping: f64,
    iterations: usize,
) -> HashMap<ScopedId, f64> {
    if seeds.is_empty() {
        return HashMap::new();
    }

    // The node universe is every id mentioned as a source or target, plus the seeds.
    let mut universe: Vec<ScopedId> = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for (from, tos) in adjacency {
        if seen.insert(from.clone()) {
            universe.push(from.clone());
        }
        for to in tos {
            if seen.insert(to.clone()) {
                universe.push(to.clone());
            }
        }
    }
    for seed in seeds {
        if seen.insert(seed.clone()) {
            universe.push(seed.clone());
        }
    }

    let teleport_weight = 1.0 / seeds.len() as f64;
    let mut teleport: HashMap<ScopedId, f64> = HashMap::new();
    for seed in seeds {
        *teleport.entry(seed.clone()).or_insert(0.0) += teleport_weight;
    }

    let mut scores: HashMap<ScopedId, f64> = universe
        .iter()
        .map(|id| (id.clone(), teleport.get(id).copied().unwrap_or(0.0)))
        .collect();

    for _ in 0..iterations {
        let mut next: HashMap<ScopedId, f64> = universe.iter().map(|id| (id.clone(), 0.0)).collect();

        for node in &universe {
            let mass = scores.get(node).copied().unwrap_or(0.0);
            match adjacency.get(node) {
                Some(outs) if !outs.is_empty() => {
                    let share = mass * damping / outs.len() as f64;
                    for out in outs {
                        *next.entry(out.clone()).or_insert(0.0) += share;
                    }
                }
                _ => {
                    // Dangling node: redistribute its mass through the teleport vector
                    // rather than letting probability mass leak out of the walk.
                    for (seed, weight) in &teleport {
                        *next.entry(seed.clone()).or_insert(0.0) += mass * damping * weight;
                    }
                }
            }
        }

        for (seed, weight) in &teleport {
            *next.entry(seed.clone()).or_insert(0.0) += (1.0 - damping) * weight;
        }

        scores = next;
    }

    scores
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_node_outranks_unreachable_node() {
        let a = ScopedId::from("ab12:function:a");
        let b = ScopedId::from("ab12:function:b");
        let c = ScopedId::from("ab12:function:c");
        let mut adjacency = HashMap::new();
        adjacency.insert(a.clone(), vec![b.clone()]);

        let scores = personalized_pagerank(&[a.clone()], &adjacency, 0.85, 20);
        assert!(scores.get(&a).copied().unwrap_or(0.0) > scores.get(&c).copied().unwrap_or(0.0));
        assert!(scores.get(&b).copied().unwrap_or(0.0) > 0.0);
    }

    #[test]
    fn no_seeds_yields_empty_scores() {
        let scores = personalized_pagerank(&[], &HashMap::new(), 0.85, 10);
        assert!(scores.is_empty());
    }
}
