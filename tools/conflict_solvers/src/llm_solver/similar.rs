//! Ranking of sibling methods by how close they are to the broken member.

use bump_core::llm::{TextEmbedding, cosine_similarity};
use std::sync::Arc;
use tracing::warn;

/// How candidates are scored against the query.
#[derive(Clone)]
pub enum Ranker {
    /// Cosine similarity of embeddings.
    Embedding(Arc<dyn TextEmbedding>),
    /// Normalized Levenshtein similarity of the texts.
    Levenshtein,
}

impl Ranker {
    fn scores(&self, query: &str, candidates: &[String]) -> Vec<f64> {
        if let Ranker::Embedding(embedding) = self {
            match embedding_scores(embedding.as_ref(), query, candidates) {
                Ok(scores) => return scores,
                Err(e) => warn!("embedding failed, ranking by edit distance: {e}"),
            }
        }
        candidates
            .iter()
            .map(|c| strsim::normalized_levenshtein(query, c))
            .collect()
    }

    /// The `limit` candidates most similar to `query`, best first. Ties keep their input order.
    pub fn rank(&self, query: &str, candidates: Vec<String>, limit: usize) -> Vec<String> {
        let scores = self.scores(query, &candidates);
        let mut scored: Vec<(f64, String)> = scores.into_iter().zip(candidates).collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        scored.into_iter().take(limit).map(|(_, c)| c).collect()
    }
}

fn embedding_scores(
    embedding: &dyn TextEmbedding,
    query: &str,
    candidates: &[String],
) -> Result<Vec<f64>, bump_core::CompletionError> {
    let query = embedding.embed(query)?;
    candidates
        .iter()
        .map(|c| Ok(cosine_similarity(&query, &embedding.embed(c)?) as f64))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bump_core::test_util::MockEmbedding;

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn edit_distance_ranking() {
        let ranked = Ranker::Levenshtein.rank("fetch(String)", names(&["close()", "fetchAll(String)", "fetch(String, int)"]), 2);
        assert_eq!(ranked, ["fetchAll(String)", "fetch(String, int)"]);
    }

    #[test]
    fn embedding_ranking() {
        let ranker = Ranker::Embedding(Arc::new(MockEmbedding));
        let ranked = ranker.rank("abc", names(&["xyz", "cab", "abx"]), 3);
        assert_eq!(ranked[0], "cab");
        assert_eq!(ranked[2], "xyz");
    }
}
