//! Named entity recognition collaborators.
//!
//! [`HttpNerCollaborator`] calls the configured NER service.
//! [`HeuristicNer`] is the offline fallback: capitalized-span detection with
//! light type guessing. It is deliberately conservative — precision over
//! recall — since every span it emits becomes a graph entity.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use lattica_core::{EngineError, EngineResult};

use crate::{NerCollaborator, NerSpan};

/// Words never treated as entity spans even when capitalized (sentence
/// starts, question words, common function words).
const NON_ENTITY_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "can", "compare", "could", "describe",
    "did", "do", "does", "explain", "find", "for", "from", "give", "has", "have", "how", "i",
    "if", "in", "is", "it", "its", "list", "of", "on", "or", "see", "show", "should", "tell",
    "that", "the", "their", "there", "these", "they", "this", "to", "was", "we", "were", "what", "when",
    "where", "which", "who", "why", "will", "with", "would", "you",
];

/// Heuristic fallback NER: consecutive capitalized tokens form a span.
///
/// Types are guessed from light suffix cues; everything else is labeled
/// `concept` with a modest confidence so downstream merging can still
/// upgrade it when a real NER collaborator later sees the same name.
#[derive(Debug, Default)]
pub struct HeuristicNer;

impl HeuristicNer {
    /// Create the heuristic NER.
    pub fn new() -> Self {
        Self
    }

    fn guess_label(text: &str) -> &'static str {
        let lowered = text.to_lowercase();
        if lowered.ends_with(" inc") || lowered.ends_with(" corp") || lowered.ends_with(" ltd")
            || lowered.ends_with(" gmbh") || lowered.ends_with(" llc")
        {
            "organization"
        } else if text.chars().all(|c| c.is_uppercase() || !c.is_alphabetic()) && text.len() <= 6 {
            // Short all-caps tokens read as acronyms.
            "organization"
        } else {
            "concept"
        }
    }
}

#[async_trait]
impl NerCollaborator for HeuristicNer {
    async fn extract_entities(&self, text: &str) -> EngineResult<Vec<NerSpan>> {
        let mut spans = Vec::new();
        let mut current: Option<(usize, usize)> = None; // byte range of the open span

        // Walk words with byte offsets so spans carry exact positions.
        let mut offset = 0usize;
        for word in text.split_inclusive(|c: char| c.is_whitespace()) {
            let trimmed = word.trim_end();
            let start = offset;
            offset += word.len();
            let clean = trimmed.trim_matches(|c: char| !c.is_alphanumeric());
            if clean.len() < 2 {
                close_span(text, &mut current, &mut spans);
                continue;
            }
            let first_upper = clean.chars().next().is_some_and(|c| c.is_uppercase());
            let is_common = NON_ENTITY_WORDS.contains(&clean.to_lowercase().as_str());
            if first_upper && !is_common {
                let lead = trimmed.find(clean).unwrap_or(0);
                let clean_start = start + lead;
                let clean_end = clean_start + clean.len();
                current = match current {
                    Some((s, _)) => Some((s, clean_end)),
                    None => Some((clean_start, clean_end)),
                };
                // Punctuation after the word ends the span: a capitalized
                // sentence opener must not glue onto the previous name.
                if trimmed.ends_with(['.', '!', '?', ',', ':', ';']) {
                    close_span(text, &mut current, &mut spans);
                }
            } else {
                close_span(text, &mut current, &mut spans);
            }
        }
        close_span(text, &mut current, &mut spans);
        Ok(spans)
    }
}

fn close_span(text: &str, current: &mut Option<(usize, usize)>, spans: &mut Vec<NerSpan>) {
    if let Some((start, end)) = current.take() {
        let span_text = &text[start..end];
        spans.push(NerSpan {
            text: span_text.to_string(),
            label: HeuristicNer::guess_label(span_text).to_string(),
            start,
            end,
            confidence: 0.5,
        });
    }
}

#[derive(Serialize)]
struct NerRequest<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct NerResponse {
    entities: Vec<NerWireSpan>,
}

#[derive(Deserialize)]
struct NerWireSpan {
    text: String,
    label: String,
    #[serde(default)]
    start: usize,
    #[serde(default)]
    end: usize,
    #[serde(default = "default_confidence")]
    confidence: f32,
}

fn default_confidence() -> f32 {
    0.8
}

/// HTTP client for an external NER collaborator.
///
/// POSTs `{"text": ...}` and expects
/// `{"entities": [{"text", "label", "start", "end", "confidence"}]}`.
pub struct HttpNerCollaborator {
    client: reqwest::Client,
    url: String,
}

impl HttpNerCollaborator {
    /// Create a client against the collaborator URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl NerCollaborator for HttpNerCollaborator {
    async fn extract_entities(&self, text: &str) -> EngineResult<Vec<NerSpan>> {
        let response = self
            .client
            .post(&self.url)
            .json(&NerRequest { text })
            .send()
            .await
            .map_err(|e| EngineError::TransientDependency(format!("ner collaborator: {e}")))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(EngineError::PermanentDependency(format!(
                "ner collaborator rejected credentials ({status})"
            )));
        }
        if !status.is_success() {
            return Err(EngineError::TransientDependency(format!(
                "ner collaborator returned {status}"
            )));
        }

        let body: NerResponse = response
            .json()
            .await
            .map_err(|e| EngineError::PermanentDependency(format!("ner response: {e}")))?;

        Ok(body
            .entities
            .into_iter()
            .map(|s| NerSpan {
                text: s.text,
                label: s.label,
                start: s.start,
                end: s.end,
                confidence: s.confidence.clamp(0.0, 1.0),
            })
            .collect())
    }
}
