//! In-process BM25 keyword index over chunk text.
//!
//! The lexical strategy needs no external store: the index is rebuilt from
//! the graph store's chunks at startup and kept in sync by ingestion and
//! deletion. Scoring uses BM25 with `k1 = 1.2`, `b = 0.75` and the
//! non-negative idf variant `ln(1 + (N − df + 0.5) / (df + 0.5))`.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::types::Chunk;

/// BM25 term saturation parameter.
pub const BM25_K1: f32 = 1.2;
/// BM25 length normalization parameter.
pub const BM25_B: f32 = 0.75;

/// Words ignored by tokenization, lexical matching, and keyword extraction.
pub const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "from", "has", "have", "how",
    "in", "is", "it", "its", "of", "on", "or", "that", "the", "their", "there", "this", "to",
    "was", "were", "what", "when", "where", "which", "who", "why", "will", "with",
];

/// Lowercase alphanumeric tokens of `text`, stopwords removed.
pub fn tokenize(text: &str) -> Vec<String> {
    let stop: HashSet<&str> = STOPWORDS.iter().copied().collect();
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .filter(|t| !stop.contains(t.as_str()))
        .collect()
}

#[derive(Debug, Clone)]
struct DocEntry {
    /// Term → frequency within the chunk.
    term_freqs: HashMap<String, u32>,
    /// Token count after stopword removal.
    length: u32,
    /// The indexed chunk. Keeping the full chunk makes the index double as
    /// an in-process read cache, so retrieval can materialize hits while a
    /// store is degraded.
    chunk: Chunk,
}

/// Incremental BM25 inverted index keyed by chunk id.
#[derive(Debug, Default)]
pub struct KeywordIndex {
    docs: BTreeMap<String, DocEntry>,
    /// Term → number of chunks containing it.
    doc_freqs: HashMap<String, u32>,
    total_length: u64,
}

impl KeywordIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of indexed chunks.
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    /// Whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Index a chunk. Re-inserting the same chunk id replaces its postings.
    pub fn insert(&mut self, chunk: &Chunk) {
        self.remove_chunk(&chunk.id);
        let tokens = tokenize(&chunk.text);
        let mut term_freqs: HashMap<String, u32> = HashMap::new();
        for token in &tokens {
            *term_freqs.entry(token.clone()).or_insert(0) += 1;
        }
        for term in term_freqs.keys() {
            *self.doc_freqs.entry(term.clone()).or_insert(0) += 1;
        }
        self.total_length += tokens.len() as u64;
        self.docs.insert(
            chunk.id.clone(),
            DocEntry {
                term_freqs,
                length: tokens.len() as u32,
                chunk: chunk.clone(),
            },
        );
    }

    /// Fetch an indexed chunk by id.
    pub fn get_chunk(&self, chunk_id: &str) -> Option<Chunk> {
        self.docs.get(chunk_id).map(|e| e.chunk.clone())
    }

    /// Remove one chunk from the index. Unknown ids are ignored.
    pub fn remove_chunk(&mut self, chunk_id: &str) {
        if let Some(entry) = self.docs.remove(chunk_id) {
            for term in entry.term_freqs.keys() {
                if let Some(df) = self.doc_freqs.get_mut(term) {
                    *df -= 1;
                    if *df == 0 {
                        self.doc_freqs.remove(term);
                    }
                }
            }
            self.total_length -= entry.length as u64;
        }
    }

    /// Remove every chunk belonging to a document.
    pub fn remove_document(&mut self, document_id: &str) {
        let ids: Vec<String> = self
            .docs
            .iter()
            .filter(|(_, e)| e.chunk.document_id == document_id)
            .map(|(id, _)| id.clone())
            .collect();
        for id in ids {
            self.remove_chunk(&id);
        }
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.docs.clear();
        self.doc_freqs.clear();
        self.total_length = 0;
    }

    /// Score chunks against the query terms and return the best `limit`
    /// as `(chunk_id, bm25_score)`, best first. Chunks with no overlapping
    /// term are omitted. Ordering is deterministic (ties by chunk id).
    pub fn search(&self, query: &str, limit: usize) -> Vec<(String, f32)> {
        if self.docs.is_empty() {
            return Vec::new();
        }
        let terms = tokenize(query);
        if terms.is_empty() {
            return Vec::new();
        }
        let n = self.docs.len() as f32;
        let avg_len = self.total_length as f32 / n;

        let mut scored: Vec<(String, f32)> = self
            .docs
            .iter()
            .filter_map(|(chunk_id, entry)| {
                let mut score = 0.0f32;
                for term in &terms {
                    let tf = *entry.term_freqs.get(term).unwrap_or(&0) as f32;
                    if tf == 0.0 {
                        continue;
                    }
                    let df = *self.doc_freqs.get(term).unwrap_or(&0) as f32;
                    let idf = (1.0 + (n - df + 0.5) / (df + 0.5)).ln();
                    let denom =
                        tf + BM25_K1 * (1.0 - BM25_B + BM25_B * entry.length as f32 / avg_len);
                    score += idf * tf * (BM25_K1 + 1.0) / denom;
                }
                (score > 0.0).then(|| (chunk_id.clone(), score))
            })
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        scored.truncate(limit);
        scored
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::chunk_id;

    fn chunk(document_id: &str, ordinal: u32, text: &str) -> Chunk {
        Chunk {
            id: chunk_id(document_id, ordinal),
            document_id: document_id.to_string(),
            ordinal,
            text: text.to_string(),
            section_path: vec![],
            page: None,
            domain: "general".to_string(),
            extra: Default::default(),
        }
    }

    #[test]
    fn test_tokenize_strips_stopwords_and_punctuation() {
        let tokens = tokenize("Where is the Acme headquarters, exactly?");
        assert_eq!(tokens, vec!["acme", "headquarters", "exactly"]);
    }

    #[test]
    fn test_search_ranks_matching_chunk_first() {
        let mut index = KeywordIndex::new();
        index.insert(&chunk("doc", 0, "Alice works for Acme."));
        index.insert(&chunk("doc", 1, "Acme is headquartered in Paris."));
        index.insert(&chunk("doc", 2, "Bob enjoys sailing."));

        let hits = index.search("Where is Acme located", 10);
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|(id, _)| id != "doc::2"));
    }

    #[test]
    fn test_search_prefers_rarer_terms() {
        let mut index = KeywordIndex::new();
        index.insert(&chunk("doc", 0, "engine engine engine"));
        index.insert(&chunk("doc", 1, "engine turbine"));
        index.insert(&chunk("doc", 2, "turbine blade"));

        // "turbine" appears in fewer chunks than "engine" overall, so the
        // chunk matching both should rank above single-term matches.
        let hits = index.search("engine turbine", 10);
        assert_eq!(hits[0].0, "doc::1");
    }

    #[test]
    fn test_search_empty_index_and_empty_query() {
        let mut index = KeywordIndex::new();
        assert!(index.search("anything", 5).is_empty());
        index.insert(&chunk("doc", 0, "some text"));
        assert!(index.search("", 5).is_empty());
        assert!(index.search("the and of", 5).is_empty(), "all-stopword query");
    }

    #[test]
    fn test_remove_document() {
        let mut index = KeywordIndex::new();
        index.insert(&chunk("a.txt", 0, "alpha beta"));
        index.insert(&chunk("a.txt", 1, "beta gamma"));
        index.insert(&chunk("b.txt", 0, "alpha delta"));
        assert_eq!(index.len(), 3);

        index.remove_document("a.txt");
        assert_eq!(index.len(), 1);
        let hits = index.search("beta", 10);
        assert!(hits.is_empty());
        let hits = index.search("alpha", 10);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, "b.txt::0");
    }

    #[test]
    fn test_reinsert_replaces_postings() {
        let mut index = KeywordIndex::new();
        let mut c = chunk("doc", 0, "original words here");
        index.insert(&c);
        c.text = "replacement tokens".to_string();
        index.insert(&c);
        assert_eq!(index.len(), 1);
        assert!(index.search("original", 5).is_empty());
        assert_eq!(index.search("replacement", 5).len(), 1);
    }

    #[test]
    fn test_clear_resets_state() {
        let mut index = KeywordIndex::new();
        index.insert(&chunk("doc", 0, "alpha"));
        index.clear();
        assert!(index.is_empty());
        assert!(index.search("alpha", 5).is_empty());
    }

    #[test]
    fn test_get_chunk_round_trip() {
        let mut index = KeywordIndex::new();
        let c = chunk("doc", 0, "alpha beta");
        index.insert(&c);
        assert_eq!(index.get_chunk("doc::0"), Some(c));
        assert_eq!(index.get_chunk("doc::9"), None);
    }

    #[test]
    fn test_scores_deterministic_order() {
        let mut index = KeywordIndex::new();
        index.insert(&chunk("doc", 0, "same text"));
        index.insert(&chunk("doc", 1, "same text"));
        let hits = index.search("same", 10);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0, "doc::0", "equal scores tie-break by chunk id");
        assert!((hits[0].1 - hits[1].1).abs() < 1e-6);
    }
}
