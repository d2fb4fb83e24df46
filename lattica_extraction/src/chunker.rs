//! Document chunking: structural and semantic strategies.
//!
//! The structural strategy splits on header hierarchy and groups sentences
//! under a soft token budget with a configurable sentence overlap. The
//! semantic strategy embeds sentences and starts a new chunk when the cosine
//! distance to the running centroid exceeds a threshold (or the budget is
//! reached); it degrades to structural chunking when the embedder fails,
//! logged once per document.
//!
//! Guarantees: chunks are non-empty, ordinals are dense from 0, the chunk
//! texts cover the input modulo whitespace, and overlaps never span section
//! boundaries. CSV and JSON inputs map one record to one chunk.

use std::collections::BTreeMap;

use tracing::warn;

use lattica_core::{chunk_id, Chunk, EngineError, EngineResult, ScalarValue};

use crate::Embedder;

/// Chunking strategy selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkStrategy {
    /// Header hierarchy + sentence grouping under the token budget.
    Structural,
    /// Sentence-embedding centroid distance, budget-bounded.
    Semantic,
}

/// Input format of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    /// Plain text (headers still recognized by heuristic).
    PlainText,
    /// Markdown with `#`-style headers.
    Markdown,
    /// One row per chunk.
    Csv,
    /// One record per chunk (top-level array) or one chunk (object).
    Json,
}

impl DocumentFormat {
    /// Detect the format from a file name extension; unknown extensions are
    /// treated as plain text.
    pub fn from_filename(name: &str) -> Self {
        match name.rsplit('.').next().map(|e| e.to_ascii_lowercase()).as_deref() {
            Some("md") | Some("markdown") => DocumentFormat::Markdown,
            Some("csv") => DocumentFormat::Csv,
            Some("json") => DocumentFormat::Json,
            _ => DocumentFormat::PlainText,
        }
    }

    /// Extensions accepted by the ingest surface.
    pub fn supported_extensions() -> &'static [&'static str] {
        &["txt", "md", "markdown", "csv", "json"]
    }
}

/// Chunker configuration.
#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    /// Strategy to use for prose formats.
    pub strategy: ChunkStrategy,
    /// Soft budget per chunk, in estimated tokens.
    pub token_budget: usize,
    /// Sentences repeated from the previous chunk (1–3), within a section.
    pub overlap_sentences: usize,
    /// Cosine distance to the running centroid that starts a new semantic
    /// chunk.
    pub semantic_threshold: f32,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            strategy: ChunkStrategy::Semantic,
            token_budget: 800,
            overlap_sentences: 2,
            semantic_threshold: 0.35,
        }
    }
}

/// Rough token estimate: one token per four characters.
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}

/// Split text into sentences on `.`, `!`, `?`, and newlines, keeping the
/// terminator with its sentence. Empty sentences are dropped.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\n' {
            if !current.trim().is_empty() {
                sentences.push(current.trim().to_string());
            }
            current.clear();
            continue;
        }
        current.push(ch);
        if matches!(ch, '.' | '!' | '?') {
            let boundary = chars.peek().is_none_or(|next| next.is_whitespace());
            if boundary && !current.trim().is_empty() {
                sentences.push(current.trim().to_string());
                current.clear();
            }
        }
    }
    if !current.trim().is_empty() {
        sentences.push(current.trim().to_string());
    }
    sentences
}

/// A contiguous section of the document under one header path.
#[derive(Debug, Clone)]
struct Section {
    path: Vec<String>,
    page: Option<u32>,
    sentences: Vec<String>,
}

/// Split text into sections on markdown-style headers and form-feed page
/// breaks. Text before the first header lands in an unlabeled root section.
fn split_sections(text: &str) -> Vec<Section> {
    let mut sections: Vec<Section> = Vec::new();
    let mut header_stack: Vec<(usize, String)> = Vec::new();
    let mut page: u32 = 1;
    let mut saw_page_break = false;
    let mut current = Section { path: Vec::new(), page: None, sentences: Vec::new() };

    let flush = |sections: &mut Vec<Section>, current: &mut Section| {
        if !current.sentences.is_empty() {
            sections.push(current.clone());
        }
        current.sentences.clear();
    };

    for raw_line in text.split('\n') {
        let mut line = raw_line;
        if line.contains('\u{c}') {
            saw_page_break = true;
            page += line.matches('\u{c}').count() as u32;
            // keep any text around the break
        }
        line = line.trim_end();
        let trimmed = line.trim_start();
        let hashes = trimmed.chars().take_while(|&c| c == '#').count();
        if hashes > 0 && trimmed.chars().nth(hashes) == Some(' ') {
            let title = trimmed[hashes + 1..].trim().to_string();
            flush(&mut sections, &mut current);
            header_stack.retain(|(level, _)| *level < hashes);
            header_stack.push((hashes, title));
            current.path = header_stack.iter().map(|(_, t)| t.clone()).collect();
            current.page = saw_page_break.then_some(page);
            continue;
        }
        let cleaned = trimmed.replace('\u{c}', " ");
        if !cleaned.trim().is_empty() {
            current.page = current.page.or(saw_page_break.then_some(page));
            current.sentences.extend(split_sentences(cleaned.trim()));
        }
    }
    flush(&mut sections, &mut current);
    sections
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

/// Document chunker.
pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    /// Create a chunker with the given configuration.
    pub fn new(config: ChunkerConfig) -> Self {
        Self { config }
    }

    /// Split a document into ordered chunks.
    ///
    /// `embedder` is consulted only by the semantic strategy; when it fails,
    /// the document degrades to structural chunking.
    pub async fn chunk(
        &self,
        document_id: &str,
        domain: &str,
        format: DocumentFormat,
        text: &str,
        embedder: Option<&dyn Embedder>,
    ) -> EngineResult<Vec<Chunk>> {
        if document_id.is_empty() {
            return Err(EngineError::InvalidInput("document_id must not be empty".into()));
        }
        let groups = match format {
            DocumentFormat::Csv => return Ok(self.chunk_csv(document_id, domain, text)),
            DocumentFormat::Json => return self.chunk_json(document_id, domain, text),
            DocumentFormat::PlainText | DocumentFormat::Markdown => {
                let sections = split_sections(text);
                match self.config.strategy {
                    ChunkStrategy::Structural => self.group_structural(&sections),
                    ChunkStrategy::Semantic => match embedder {
                        Some(embedder) => match self.group_semantic(&sections, embedder).await {
                            Ok(groups) => groups,
                            Err(err) => {
                                warn!(
                                    document_id,
                                    error = %err,
                                    "semantic chunking failed, degrading to structural"
                                );
                                self.group_structural(&sections)
                            }
                        },
                        None => self.group_structural(&sections),
                    },
                }
            }
        };

        Ok(self.materialize(document_id, domain, groups))
    }

    /// One chunk per non-empty CSV data row; the header is folded into each
    /// row's text so a row reads as `col: value` pairs.
    fn chunk_csv(&self, document_id: &str, domain: &str, text: &str) -> Vec<Chunk> {
        let mut lines = text.lines().filter(|l| !l.trim().is_empty());
        let Some(header_line) = lines.next() else { return Vec::new() };
        let headers: Vec<&str> = header_line.split(',').map(str::trim).collect();

        let mut chunks = Vec::new();
        for (row_index, line) in lines.enumerate() {
            let values: Vec<&str> = line.split(',').map(str::trim).collect();
            let mut parts = Vec::with_capacity(values.len());
            for (i, value) in values.iter().enumerate() {
                match headers.get(i) {
                    Some(h) if !h.is_empty() => parts.push(format!("{h}: {value}")),
                    _ => parts.push((*value).to_string()),
                }
            }
            let body = parts.join("; ");
            if body.is_empty() {
                continue;
            }
            let ordinal = chunks.len() as u32;
            let mut extra = BTreeMap::new();
            extra.insert("format".to_string(), ScalarValue::String("csv".to_string()));
            extra.insert("row".to_string(), ScalarValue::Integer(row_index as i64));
            chunks.push(Chunk {
                id: chunk_id(document_id, ordinal),
                document_id: document_id.to_string(),
                ordinal,
                text: body,
                section_path: Vec::new(),
                page: None,
                domain: domain.to_string(),
                extra,
            });
        }
        // A header-only file still produces one chunk from the header itself.
        if chunks.is_empty() && !header_line.trim().is_empty() {
            chunks.push(Chunk {
                id: chunk_id(document_id, 0),
                document_id: document_id.to_string(),
                ordinal: 0,
                text: header_line.trim().to_string(),
                section_path: Vec::new(),
                page: None,
                domain: domain.to_string(),
                extra: BTreeMap::from([(
                    "format".to_string(),
                    ScalarValue::String("csv".to_string()),
                )]),
            });
        }
        chunks
    }

    /// One chunk per top-level array element; non-array documents become a
    /// single chunk.
    fn chunk_json(&self, document_id: &str, domain: &str, text: &str) -> EngineResult<Vec<Chunk>> {
        let value: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| EngineError::InvalidInput(format!("invalid JSON document: {e}")))?;
        let records: Vec<serde_json::Value> = match value {
            serde_json::Value::Array(items) => items,
            other => vec![other],
        };
        let mut chunks = Vec::new();
        for (i, record) in records.into_iter().enumerate() {
            let body = json_record_text(&record);
            if body.is_empty() {
                continue;
            }
            let ordinal = chunks.len() as u32;
            let mut extra = BTreeMap::new();
            extra.insert("format".to_string(), ScalarValue::String("json".to_string()));
            extra.insert("record".to_string(), ScalarValue::Integer(i as i64));
            chunks.push(Chunk {
                id: chunk_id(document_id, ordinal),
                document_id: document_id.to_string(),
                ordinal,
                text: body,
                section_path: Vec::new(),
                page: None,
                domain: domain.to_string(),
                extra,
            });
        }
        Ok(chunks)
    }

    /// Group each section's sentences under the token budget with overlap.
    fn group_structural(&self, sections: &[Section]) -> Vec<SentenceGroup> {
        let mut groups = Vec::new();
        for section in sections {
            self.budget_group(section, None, &mut groups);
        }
        groups
    }

    /// Embed sentences per section and break on centroid distance or budget.
    async fn group_semantic(
        &self,
        sections: &[Section],
        embedder: &dyn Embedder,
    ) -> EngineResult<Vec<SentenceGroup>> {
        let mut groups = Vec::new();
        for section in sections {
            if section.sentences.len() <= 1 {
                self.budget_group(section, None, &mut groups);
                continue;
            }
            let vectors = embedder.embed(&section.sentences).await?;
            if vectors.len() != section.sentences.len() {
                return Err(EngineError::DataIntegrity(format!(
                    "embedder returned {} vectors for {} sentences",
                    vectors.len(),
                    section.sentences.len()
                )));
            }
            self.budget_group(section, Some(&vectors), &mut groups);
        }
        Ok(groups)
    }

    /// Shared grouping walk. With `vectors`, a semantic break is added when
    /// the next sentence drifts from the running centroid beyond the
    /// threshold; the token budget applies either way. Overlap sentences are
    /// taken from the previous group of the *same* section only.
    fn budget_group(
        &self,
        section: &Section,
        vectors: Option<&[Vec<f32>]>,
        groups: &mut Vec<SentenceGroup>,
    ) {
        let budget = self.config.token_budget.max(1);
        let mut start = 0usize;
        let mut tokens = 0usize;
        let mut centroid: Vec<f32> = Vec::new();
        let mut members = 0usize;

        let mut section_groups: Vec<(usize, usize)> = Vec::new(); // [start, end)
        for (i, sentence) in section.sentences.iter().enumerate() {
            let sentence_tokens = estimate_tokens(sentence);
            let mut brk = false;
            if i > start && tokens + sentence_tokens > budget {
                brk = true;
            }
            if let Some(vectors) = vectors {
                if i > start && !brk {
                    let distance = 1.0 - cosine(&centroid, &vectors[i]);
                    if distance > self.config.semantic_threshold {
                        brk = true;
                    }
                }
            }
            if brk {
                section_groups.push((start, i));
                start = i;
                tokens = 0;
                centroid.clear();
                members = 0;
            }
            tokens += sentence_tokens;
            if let Some(vectors) = vectors {
                if centroid.is_empty() {
                    centroid = vectors[i].clone();
                    members = 1;
                } else {
                    for (c, v) in centroid.iter_mut().zip(&vectors[i]) {
                        *c = (*c * members as f32 + v) / (members as f32 + 1.0);
                    }
                    members += 1;
                }
            }
        }
        if start < section.sentences.len() {
            section_groups.push((start, section.sentences.len()));
        }

        for (index, &(s, e)) in section_groups.iter().enumerate() {
            let overlap = if index > 0 { self.config.overlap_sentences.min(s) } else { 0 };
            let text = section.sentences[s - overlap..e].join(" ");
            groups.push(SentenceGroup {
                text,
                section_path: section.path.clone(),
                page: section.page,
            });
        }
    }

    fn materialize(&self, document_id: &str, domain: &str, groups: Vec<SentenceGroup>) -> Vec<Chunk> {
        groups
            .into_iter()
            .filter(|g| !g.text.trim().is_empty())
            .enumerate()
            .map(|(i, group)| Chunk {
                id: chunk_id(document_id, i as u32),
                document_id: document_id.to_string(),
                ordinal: i as u32,
                text: group.text,
                section_path: group.section_path,
                page: group.page,
                domain: domain.to_string(),
                extra: BTreeMap::new(),
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
struct SentenceGroup {
    text: String,
    section_path: Vec<String>,
    page: Option<u32>,
}

fn json_record_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Object(map) => map
            .iter()
            .map(|(k, v)| format!("{k}: {}", scalar_text(v)))
            .collect::<Vec<_>>()
            .join("; "),
        other => scalar_text(other),
    }
}

fn scalar_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use lattica_core::EngineResult;

    /// Embedder that maps the first word of a sentence to a one-hot topic
    /// vector, so sentences sharing a first word cluster together.
    struct TopicEmbedder;

    #[async_trait]
    impl Embedder for TopicEmbedder {
        fn dimension(&self) -> usize {
            4
        }
        async fn embed(&self, texts: &[String]) -> EngineResult<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    let first = t.split_whitespace().next().unwrap_or("");
                    let slot = (first.len() % 4) as usize;
                    let mut v = vec![0.0; 4];
                    v[slot] = 1.0;
                    v
                })
                .collect())
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        fn dimension(&self) -> usize {
            4
        }
        async fn embed(&self, _texts: &[String]) -> EngineResult<Vec<Vec<f32>>> {
            Err(lattica_core::EngineError::TransientDependency("embedder down".into()))
        }
    }

    fn structural_chunker() -> Chunker {
        Chunker::new(ChunkerConfig {
            strategy: ChunkStrategy::Structural,
            token_budget: 20,
            overlap_sentences: 1,
            semantic_threshold: 0.35,
        })
    }

    #[test]
    fn test_split_sentences() {
        let sentences = split_sentences("One sentence. Another one! A third? Last");
        assert_eq!(sentences.len(), 4);
        assert_eq!(sentences[0], "One sentence.");
        assert_eq!(sentences[3], "Last");
    }

    #[test]
    fn test_split_sentences_keeps_abbrev_less_aggressively() {
        // Terminator not followed by whitespace does not split.
        let sentences = split_sentences("Version 1.2 shipped. Done.");
        assert_eq!(sentences.len(), 2);
        assert_eq!(sentences[0], "Version 1.2 shipped.");
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(DocumentFormat::from_filename("a.md"), DocumentFormat::Markdown);
        assert_eq!(DocumentFormat::from_filename("b.CSV"), DocumentFormat::Csv);
        assert_eq!(DocumentFormat::from_filename("c.json"), DocumentFormat::Json);
        assert_eq!(DocumentFormat::from_filename("d.txt"), DocumentFormat::PlainText);
        assert_eq!(DocumentFormat::from_filename("noext"), DocumentFormat::PlainText);
    }

    #[tokio::test]
    async fn test_single_sentence_document_is_one_chunk() {
        let chunker = structural_chunker();
        let chunks = chunker
            .chunk("one.txt", "general", DocumentFormat::PlainText, "Just one sentence.", None)
            .await
            .unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].ordinal, 0);
        assert_eq!(chunks[0].text, "Just one sentence.");
    }

    #[tokio::test]
    async fn test_ordinals_dense_and_ids_stable() {
        let chunker = structural_chunker();
        let text = "First sentence is here. Second sentence follows now. Third one is longer \
                    than the others combined. Fourth closes the document.";
        let chunks = chunker
            .chunk("doc.txt", "general", DocumentFormat::PlainText, text, None)
            .await
            .unwrap();
        assert!(chunks.len() > 1);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.ordinal, i as u32);
            assert_eq!(chunk.id, format!("doc.txt::{i}"));
            assert!(!chunk.text.is_empty());
        }
    }

    #[tokio::test]
    async fn test_coverage_modulo_whitespace_and_overlap() {
        let chunker = structural_chunker();
        let text = "Alpha beta gamma delta. Epsilon zeta eta theta. Iota kappa lambda mu. \
                    Nu xi omicron pi.";
        let chunks = chunker
            .chunk("doc.txt", "general", DocumentFormat::PlainText, text, None)
            .await
            .unwrap();
        let mut combined = String::new();
        for chunk in &chunks {
            combined.push(' ');
            combined.push_str(&chunk.text);
        }
        // Every source sentence appears in the concatenation.
        for sentence in split_sentences(text) {
            assert!(combined.contains(&sentence), "missing sentence: {sentence}");
        }
    }

    #[tokio::test]
    async fn test_sections_respected_by_overlap() {
        let chunker = structural_chunker();
        let text = "# Intro\nIntro sentence one. Intro sentence two.\n# Body\nBody sentence one. Body sentence two.";
        let chunks = chunker
            .chunk("doc.md", "general", DocumentFormat::Markdown, text, None)
            .await
            .unwrap();
        // No chunk mixes Intro and Body text.
        for chunk in &chunks {
            let has_intro = chunk.text.contains("Intro sentence");
            let has_body = chunk.text.contains("Body sentence");
            assert!(!(has_intro && has_body), "overlap crossed a section: {}", chunk.text);
        }
        // Section paths recorded.
        assert!(chunks.iter().any(|c| c.section_path == vec!["Intro".to_string()]));
        assert!(chunks.iter().any(|c| c.section_path == vec!["Body".to_string()]));
    }

    #[tokio::test]
    async fn test_nested_headers_build_paths() {
        let chunker = structural_chunker();
        let text = "# Top\n## Inner\nDeep sentence here.";
        let chunks = chunker
            .chunk("doc.md", "general", DocumentFormat::Markdown, text, None)
            .await
            .unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].section_path, vec!["Top".to_string(), "Inner".to_string()]);
    }

    #[tokio::test]
    async fn test_csv_row_per_chunk() {
        let chunker = structural_chunker();
        let text = "name,city\nAlice,Paris\nBob,Berlin\n";
        let chunks = chunker
            .chunk("people.csv", "general", DocumentFormat::Csv, text, None)
            .await
            .unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "name: Alice; city: Paris");
        assert_eq!(chunks[1].text, "name: Bob; city: Berlin");
        assert_eq!(chunks[1].ordinal, 1);
    }

    #[tokio::test]
    async fn test_json_array_record_per_chunk() {
        let chunker = structural_chunker();
        let text = r#"[{"name": "Alice", "role": "engineer"}, {"name": "Bob"}]"#;
        let chunks = chunker
            .chunk("people.json", "general", DocumentFormat::Json, text, None)
            .await
            .unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "name: Alice; role: engineer");
    }

    #[tokio::test]
    async fn test_json_invalid_is_invalid_input() {
        let chunker = structural_chunker();
        let err = chunker
            .chunk("bad.json", "general", DocumentFormat::Json, "{not json", None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), lattica_core::ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn test_empty_document_yields_no_chunks() {
        let chunker = structural_chunker();
        let chunks = chunker
            .chunk("empty.txt", "general", DocumentFormat::PlainText, "   \n  ", None)
            .await
            .unwrap();
        assert!(chunks.is_empty());
    }

    #[tokio::test]
    async fn test_semantic_degrades_to_structural_on_embedder_failure() {
        let chunker = Chunker::new(ChunkerConfig {
            strategy: ChunkStrategy::Semantic,
            token_budget: 20,
            overlap_sentences: 1,
            semantic_threshold: 0.35,
        });
        let text = "First sentence is here. Second sentence follows now. Third one is longer \
                    than both of the others.";
        let chunks = chunker
            .chunk("doc.txt", "general", DocumentFormat::PlainText, text, Some(&FailingEmbedder))
            .await
            .unwrap();
        assert!(!chunks.is_empty(), "degraded output still chunks the document");
    }

    #[tokio::test]
    async fn test_semantic_breaks_on_topic_shift() {
        let chunker = Chunker::new(ChunkerConfig {
            strategy: ChunkStrategy::Semantic,
            token_budget: 10_000, // budget never binds
            overlap_sentences: 1,
            semantic_threshold: 0.35,
        });
        // First-word lengths: "Cats"(4), "Cats"(4) → same topic slot;
        // "Turbines"(8) → same slot mod 4 = 0... choose words with distinct
        // lengths mod 4: "Cats"=0, "Birds"=1.
        let text = "Cats sleep all day. Cats also purr. Birds sing at dawn. Birds migrate south.";
        let chunks = chunker
            .chunk("doc.txt", "general", DocumentFormat::PlainText, text, Some(&TopicEmbedder))
            .await
            .unwrap();
        assert!(chunks.len() >= 2, "topic shift must start a new chunk");
        assert!(chunks[0].text.contains("Cats"));
        assert!(chunks.last().unwrap().text.contains("Birds"));
    }

    #[tokio::test]
    async fn test_page_breaks_recorded() {
        let chunker = structural_chunker();
        let text = "Page one text here.\n\u{c}\nPage two text here.";
        let chunks = chunker
            .chunk("doc.txt", "general", DocumentFormat::PlainText, text, None)
            .await
            .unwrap();
        assert!(chunks.iter().any(|c| c.page == Some(2)), "second page recorded");
    }

    #[tokio::test]
    async fn test_empty_document_id_rejected() {
        let chunker = structural_chunker();
        let err = chunker
            .chunk("", "general", DocumentFormat::PlainText, "text", None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), lattica_core::ErrorKind::InvalidInput);
    }
}
