use codegraph_core::ScopedId;
use std::collections::HashMap;

/// Standard Okapi BM25 parameters. `k1` controls term-frequency saturation,
/// `b` controls document-length normalization — the same two knobs exposed
/// by every BM25 implementation in the pack (e.g. the OpenSearch/Elasticsearch
/// retrievers' `k1`/`b` fields).
#[derive(Debug, Clone, Copy)]
pub struct Bm25Params {
    pub k1: f64,
    pub b: f64,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: 1.5, b: 0.75 }
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

struct DocEntry {
    id: ScopedId,
    term_counts: HashMap<String, u32>,
    length: usize,
}

/// In-memory BM25 index over a fixed corpus of `(id, text)` pairs (§4.6.3
/// lexical ranker). Rebuilt per query scope rather than maintained
/// incrementally — the corpora involved (node name/description/path/heading
/// text) are cheap to re-tokenize compared to a graph rebuild.
pub struct Bm25Index {
    params: Bm25Params,
    docs: Vec<DocEntry>,
    doc_freq: HashMap<String, u32>,
    avg_len: f64,
}

impl Bm25Index {
    pub fn build(corpus: &[(ScopedId, String)]) -> Self {
        Self::build_with_params(corpus, Bm25Params::default())
    }

    pub fn build_with_params(corpus: &[(ScopedId, String)], params: Bm25Params) -> Self {
        let mut docs = Vec::with_capacity(corpus.len());
        let mut doc_freq: HashMap<String, u32> = HashMap::new();
        let mut total_len = 0usize;

        for (id, text) in corpus {
            let tokens = tokenize(text);
            total_len += tokens.len();
            let mut term_counts = HashMap::new();
            for token in &tokens {
                *term_counts.entry(token.clone()).or_insert(0) += 1;
            }
            for term in term_counts.keys() {
                *doc_freq.entry(term.clone()).or_insert(0) += 1;
            }
            docs.push(DocEntry { id: id.clone(), term_counts, length: tokens.len() });
        }

        let avg_len = if docs.is_empty() { 0.0 } else { total_len as f64 / docs.len() as f64 };
        Self { params, docs, doc_freq, avg_len }
    }

    /// Scores and ranks every document against `query`, highest first.
    /// Documents with zero overlapping terms are omitted.
    pub fn search(&self, query: &str, limit: usize) -> Vec<(ScopedId, f64)> {
        let query_terms = tokenize(query);
        if query_terms.is_empty() || self.docs.is_empty() {
            return Vec::new();
        }

        let n = self.docs.len() as f64;
        let mut scored: Vec<(ScopedId, f64)> = Vec::new();

        for doc in &self.docs {
            let mut score = 0.0;
            for term in &query_terms {
                let Some(&tf) = doc.term_counts.get(term) else { continue };
                let df = *self.doc_freq.get(term).unwrap_or(&0) as f64;
                // Standard BM25 idf, floored at 0 so common terms never
                // contribute a negative score.
                let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln().max(0.0);
                let tf = tf as f64;
                let norm = 1.0 - self.params.b + self.params.b * (doc.length as f64 / self.avg_len.max(1.0));
                score += idf * (tf * (self.params.k1 + 1.0)) / (tf + self.params.k1 * norm);
            }
            if score > 0.0 {
                scored.push((doc.id.clone(), score));
            }
        }

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        scored
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranks_exact_term_match_above_unrelated_document() {
        let corpus = vec![
            (ScopedId::from("ab12:function:a"), "parseExpression tokenizer".to_string()),
            (ScopedId::from("ab12:function:b"), "serializeResponse writer".to_string()),
        ];
        let index = Bm25Index::build(&corpus);
        let results = index.search("parse expression", 10);
        assert_eq!(results[0].0, ScopedId::from("ab12:function:a"));
    }

    #[test]
    fn empty_query_yields_no_results() {
        let corpus = vec![(ScopedId::from("ab12:function:a"), "anything".to_string())];
        let index = Bm25Index::build(&corpus);
        assert!(index.search("   ", 10).is_empty());
    }

    #[test]
    fn documents_with_no_overlap_are_excluded() {
        let corpus = vec![
            (ScopedId::from("ab12:function:a"), "alpha beta".to_string()),
            (ScopedId::from("ab12:function:b"), "gamma delta".to_string()),
        ];
        let index = Bm25Index::build(&corpus);
        let results = index.search("alpha", 10);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, ScopedId::from("ab12:function:a"));
    }
}
