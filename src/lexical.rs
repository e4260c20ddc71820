/// Offline TF-IDF retriever.
///
/// Builds a joint unigram+bigram vocabulary over the bug report and all
/// chunks, weights terms with smoothed TF-IDF, L2-normalizes every vector
/// and ranks chunks by cosine similarity to the report. No model calls.
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::{debug, info};

use crate::corpus::CodeChunk;

/// Default vocabulary cap.
pub const DEFAULT_MAX_FEATURES: usize = 5000;

// \w is Unicode-aware and already covers Hangul syllables.
static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\w+").unwrap());

/// One ranked chunk, referring back to its position in the input slice.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LexicalMatch {
    pub chunk_index: usize,
    pub similarity: f64,
}

/// Sparse L2-normalized vector, sorted by vocabulary id so every sum runs
/// in the same order.
type SparseVec = Vec<(usize, f64)>;

/// Lowercased word tokens followed by their adjacent bigrams.
pub fn terms(text: &str) -> Vec<String> {
    let words: Vec<String> = TOKEN_RE
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .collect();
    let mut out = Vec::with_capacity(words.len() * 2);
    out.extend(words.iter().cloned());
    out.extend(words.windows(2).map(|w| format!("{} {}", w[0], w[1])));
    out
}

pub struct LexicalRetriever {
    max_features: usize,
}

impl Default for LexicalRetriever {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FEATURES)
    }
}

impl LexicalRetriever {
    #[must_use]
    pub fn new(max_features: usize) -> Self {
        Self {
            max_features: max_features.max(1),
        }
    }

    /// Rank every chunk against `report`, most similar first.
    ///
    /// Ties keep input order. An empty chunk slice yields an empty result.
    pub fn rank(&self, report: &str, chunks: &[CodeChunk]) -> Vec<LexicalMatch> {
        if chunks.is_empty() {
            return Vec::new();
        }

        let docs: Vec<Vec<String>> = std::iter::once(report)
            .chain(chunks.iter().map(|c| c.content.as_str()))
            .map(terms)
            .collect();

        let vocab = self.build_vocabulary(&docs);
        let idf = inverse_document_frequency(&docs, &vocab);
        let vectors: Vec<SparseVec> = docs.iter().map(|d| tfidf(d, &vocab, &idf)).collect();

        let query = &vectors[0];
        let mut matches: Vec<LexicalMatch> = vectors[1..]
            .iter()
            .enumerate()
            .map(|(chunk_index, v)| LexicalMatch {
                chunk_index,
                similarity: dot(query, v),
            })
            .collect();

        matches.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(Ordering::Equal)
        });

        if let Some(best) = matches.first() {
            info!(
                "Lexical ranking: {} chunks, vocabulary {}, best similarity {:.4}",
                chunks.len(),
                vocab.len(),
                best.similarity
            );
        }
        matches
    }

    /// Top `max_features` terms by total frequency, ties broken by term.
    fn build_vocabulary(&self, docs: &[Vec<String>]) -> HashMap<String, usize> {
        let mut freq: HashMap<&str, usize> = HashMap::new();
        for doc in docs {
            for term in doc {
                *freq.entry(term.as_str()).or_insert(0) += 1;
            }
        }

        let mut ranked: Vec<(&str, usize)> = freq.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked.truncate(self.max_features);
        debug!("Vocabulary capped at {} terms", ranked.len());

        ranked
            .into_iter()
            .enumerate()
            .map(|(id, (term, _))| (term.to_string(), id))
            .collect()
    }
}

/// Smoothed idf: `ln((1 + n) / (1 + df)) + 1`.
fn inverse_document_frequency(docs: &[Vec<String>], vocab: &HashMap<String, usize>) -> Vec<f64> {
    let mut df = vec![0usize; vocab.len()];
    for doc in docs {
        let mut seen = vec![false; vocab.len()];
        for term in doc {
            if let Some(&id) = vocab.get(term) {
                if !seen[id] {
                    seen[id] = true;
                    df[id] += 1;
                }
            }
        }
    }
    let n = docs.len() as f64;
    df.into_iter()
        .map(|d| ((1.0 + n) / (1.0 + d as f64)).ln() + 1.0)
        .collect()
}

fn tfidf(doc: &[String], vocab: &HashMap<String, usize>, idf: &[f64]) -> SparseVec {
    let mut counts: BTreeMap<usize, f64> = BTreeMap::new();
    for term in doc {
        if let Some(&id) = vocab.get(term) {
            *counts.entry(id).or_insert(0.0) += 1.0;
        }
    }
    let mut v: SparseVec = counts
        .into_iter()
        .map(|(id, tf)| (id, tf * idf[id]))
        .collect();
    let norm = v.iter().map(|(_, w)| w * w).sum::<f64>().sqrt();
    if norm > 0.0 {
        for (_, w) in &mut v {
            *w /= norm;
        }
    }
    v
}

/// Merge-join over two id-sorted vectors.
fn dot(a: &SparseVec, b: &SparseVec) -> f64 {
    let (mut i, mut j) = (0, 0);
    let mut sum = 0.0;
    while i < a.len() && j < b.len() {
        match a[i].0.cmp(&b[j].0) {
            Ordering::Less => i += 1,
            Ordering::Greater => j += 1,
            Ordering::Equal => {
                sum += a[i].1 * b[j].1;
                i += 1;
                j += 1;
            }
        }
    }
    sum
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(path: &str, content: &str) -> CodeChunk {
        CodeChunk {
            file_path: path.to_string(),
            start_line: 1,
            end_line: 1,
            content: content.to_string(),
        }
    }

    #[test]
    fn test_terms_include_bigrams() {
        let t = terms("Skill Use crash");
        assert_eq!(t, vec!["skill", "use", "crash", "skill use", "use crash"]);
    }

    #[test]
    fn test_terms_unicode() {
        let t = terms("스킬 사용");
        assert!(t.contains(&"스킬".to_string()));
        assert!(t.contains(&"스킬 사용".to_string()));
    }

    #[test]
    fn test_keyword_chunk_ranks_first() {
        let chunks = vec![
            chunk("b.cpp", "void Render() { draw_sprite(); }"),
            chunk("a.cpp", "void CSkillUse::Action() { enemy death crash }"),
            chunk("c.cpp", "int counter = 0; counter++;"),
        ];
        let report = "crash in CSkillUse Action on enemy death";
        let ranked = LexicalRetriever::default().rank(report, &chunks);

        assert_eq!(ranked.len(), 3);
        assert_eq!(ranked[0].chunk_index, 1);
        assert!(ranked[0].similarity > ranked[1].similarity);
        assert!(ranked[0].similarity > ranked[2].similarity);
    }

    #[test]
    fn test_empty_corpus() {
        assert!(LexicalRetriever::default().rank("anything", &[]).is_empty());
    }

    #[test]
    fn test_uniform_similarity_is_stable() {
        let chunks = vec![
            chunk("a.cpp", "alpha"),
            chunk("b.cpp", "beta"),
            chunk("c.cpp", "gamma"),
        ];
        let ranked = LexicalRetriever::default().rank("unrelated words", &chunks);
        let order: Vec<usize> = ranked.iter().map(|m| m.chunk_index).collect();
        assert_eq!(order, vec![0, 1, 2]);
        assert!(ranked.iter().all(|m| m.similarity == 0.0));
    }

    #[test]
    fn test_equal_nonzero_similarity_keeps_scan_order() {
        let text = "void CSkillUse::Action(CCharacter* target) { target->OnDeath(); skill crash }";
        let chunks: Vec<CodeChunk> = (0..40).map(|i| chunk(&format!("f{i}.cpp"), text)).collect();
        let retriever = LexicalRetriever::default();
        let expected: Vec<usize> = (0..40).collect();

        for _ in 0..20 {
            let ranked = retriever.rank("crash in CSkillUse Action on enemy death", &chunks);
            let order: Vec<usize> = ranked.iter().map(|m| m.chunk_index).collect();
            assert_eq!(order, expected);
            assert!(ranked[0].similarity > 0.0);
            assert!(ranked.iter().all(|m| m.similarity == ranked[0].similarity));
        }
    }

    #[test]
    fn test_dot_merge_join() {
        let a = vec![(0, 0.5), (2, 0.5), (7, 1.0)];
        let b = vec![(1, 3.0), (2, 2.0), (7, 0.25), (9, 4.0)];
        assert_eq!(dot(&a, &b), 1.25);
        assert_eq!(dot(&a, &Vec::new()), 0.0);
    }

    #[test]
    fn test_empty_report() {
        let chunks = vec![chunk("a.cpp", "alpha"), chunk("b.cpp", "beta")];
        let ranked = LexicalRetriever::default().rank("", &chunks);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].chunk_index, 0);
    }

    #[test]
    fn test_vocabulary_cap() {
        let chunks = vec![chunk("a.cpp", "one two three four five six")];
        let retriever = LexicalRetriever::new(3);
        let docs = vec![terms("one"), terms(&chunks[0].content)];
        assert_eq!(retriever.build_vocabulary(&docs).len(), 3);
        assert_eq!(retriever.rank("one", &chunks).len(), 1);
    }

    #[test]
    fn test_similarity_bounded() {
        let chunks = vec![chunk("a.cpp", "skill use"), chunk("b.cpp", "skill")];
        for m in LexicalRetriever::default().rank("skill use", &chunks) {
            assert!(m.similarity >= 0.0 && m.similarity <= 1.0 + 1e-9);
        }
    }
}
