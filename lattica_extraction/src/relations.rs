//! Relation extraction over detected entity spans.
//!
//! Two strategies:
//! - **Co-occurrence** (default fallback): relations from entity proximity
//!   and predicate cue patterns in the text between spans. Deterministic,
//!   no LLM calls.
//! - **LLM-based**: structured JSON relation extraction through the LLM
//!   collaborator, tolerant of prose and code fences around the array.
//!
//! Predicate patterns are checked in order; more specific phrases must come
//! before shorter generic ones.

use async_trait::async_trait;
use tracing::debug;

use lattica_core::{EngineError, EngineResult};

use crate::{ExtractedRelation, LlmCollaborator, NerSpan, RelationCollaborator};

// ─────────────────────────────────────────────────────────────────────
// Co-occurrence extractor
// ─────────────────────────────────────────────────────────────────────

/// Configuration for the co-occurrence relation extractor.
#[derive(Debug, Clone)]
pub struct CooccurrenceConfig {
    /// Maximum character distance between two spans to consider them related.
    pub max_distance: usize,
    /// Minimum confidence threshold for emitted relations.
    pub min_confidence: f32,
}

impl Default for CooccurrenceConfig {
    fn default() -> Self {
        Self {
            max_distance: 200,
            min_confidence: 0.3,
        }
    }
}

// (cue phrases, predicate label, confidence boost)
const PREDICATE_PATTERNS: &[(&[&str], &str, f32)] = &[
    // Causal (specific first; these feed the causal reasoning path)
    (&["results in", "resulting in"], "results_in", 0.3),
    (&["leads to", "led to", "leading to"], "leads_to", 0.3),
    (&["contributes to", "contributed to"], "contributes_to", 0.25),
    (&["causes", "caused by", "caused", "causing"], "causes", 0.3),
    // Location
    (&["headquartered in", "based in", "located in"], "headquartered_in", 0.3),
    (&["lives in", "resides in"], "lives_in", 0.3),
    (&["born in"], "born_in", 0.3),
    // Employment / affiliation
    (&["works for", "employed by"], "works_for", 0.3),
    (&["works at"], "works_at", 0.3),
    (&["founded by"], "founded_by", 0.3),
    (&["founded", "established", "created"], "founded", 0.25),
    (&["leads", "heads", "manages"], "leads", 0.25),
    (&["acquired", "bought"], "acquired", 0.3),
    // Composition / usage
    (&["part of", "belongs to"], "part_of", 0.25),
    (&["consists of", "contains", "includes"], "contains", 0.2),
    (&["uses", "relies on", "depends on"], "uses", 0.2),
    (&["produces", "manufactures", "makes"], "produces", 0.25),
];

/// Co-occurrence based relation extractor.
///
/// For each ordered pair of spans within `max_distance` characters:
/// 1. Compute proximity-based confidence (closer = higher).
/// 2. Scan the text between the spans for predicate cues.
/// 3. Emit a relation with the inferred predicate, or `related_to` when no
///    cue matched, provided confidence clears the threshold.
pub struct CooccurrenceRelationExtractor {
    config: CooccurrenceConfig,
}

impl CooccurrenceRelationExtractor {
    /// Create an extractor with the given config.
    pub fn new(config: CooccurrenceConfig) -> Self {
        Self { config }
    }

    /// Create an extractor with default config.
    pub fn with_defaults() -> Self {
        Self::new(CooccurrenceConfig::default())
    }
}

fn infer_predicate(between: &str) -> Option<(&'static str, f32)> {
    let lowered = between.to_lowercase();
    for (cues, predicate, boost) in PREDICATE_PATTERNS {
        if cues.iter().any(|cue| lowered.contains(cue)) {
            return Some((predicate, *boost));
        }
    }
    None
}

/// Short evidence snippet around two spans: the covering text, trimmed to a
/// sane length on char boundaries.
fn evidence_snippet(text: &str, start: usize, end: usize) -> String {
    let slice = text.get(start.min(text.len())..end.min(text.len())).unwrap_or(text);
    let mut snippet: String = slice.chars().take(160).collect();
    if slice.chars().count() > 160 {
        snippet.push('…');
    }
    snippet
}

#[async_trait]
impl RelationCollaborator for CooccurrenceRelationExtractor {
    async fn extract_relations(
        &self,
        text: &str,
        entities: &[NerSpan],
    ) -> EngineResult<Vec<ExtractedRelation>> {
        let mut relations = Vec::new();
        if entities.len() < 2 {
            return Ok(relations);
        }
        let mut ordered: Vec<&NerSpan> = entities.iter().collect();
        ordered.sort_by_key(|s| s.start);

        for (i, subject) in ordered.iter().enumerate() {
            for object in ordered.iter().skip(i + 1) {
                if subject.text.eq_ignore_ascii_case(&object.text) {
                    continue;
                }
                let gap_start = subject.end.min(text.len());
                let gap_end = object.start.min(text.len());
                if gap_end <= gap_start {
                    continue;
                }
                let distance = gap_end - gap_start;
                if distance > self.config.max_distance {
                    continue;
                }
                let Some(between) = text.get(gap_start..gap_end) else { continue };
                // Sentence boundaries between the spans break the pair.
                if between.contains('.') || between.contains('!') || between.contains('?') {
                    continue;
                }
                let proximity = 1.0 - distance as f32 / self.config.max_distance as f32;
                let (predicate, boost) = match infer_predicate(between) {
                    Some((predicate, boost)) => (predicate, boost),
                    None => ("related_to", 0.0),
                };
                let confidence = (0.3 + 0.3 * proximity + boost).min(0.95);
                if confidence < self.config.min_confidence {
                    continue;
                }
                relations.push(ExtractedRelation {
                    subject: subject.text.clone(),
                    predicate: predicate.to_string(),
                    object: object.text.clone(),
                    confidence,
                    evidence: evidence_snippet(text, subject.start, object.end),
                });
            }
        }
        debug!(count = relations.len(), "co-occurrence relations extracted");
        Ok(relations)
    }
}

// ─────────────────────────────────────────────────────────────────────
// LLM extractor
// ─────────────────────────────────────────────────────────────────────

const RELATION_SYSTEM_PROMPT: &str = "You extract typed relations between named entities. \
Respond with a JSON array only. Each element: {\"subject\": str, \"predicate\": str, \
\"object\": str, \"confidence\": float}. Subjects and objects must be copied verbatim \
from the entity list.";

/// LLM-backed relation extractor.
///
/// Builds a prompt listing the detected spans, asks the collaborator for a
/// JSON array of relations, and keeps only edges whose endpoints are in the
/// detected entity set.
pub struct LlmRelationExtractor {
    llm: std::sync::Arc<dyn LlmCollaborator>,
}

impl LlmRelationExtractor {
    /// Create an extractor over an LLM collaborator.
    pub fn new(llm: std::sync::Arc<dyn LlmCollaborator>) -> Self {
        Self { llm }
    }

    fn build_prompt(text: &str, entities: &[NerSpan]) -> String {
        let listed: Vec<String> = entities
            .iter()
            .map(|e| format!("- {} ({})", e.text, e.label))
            .collect();
        format!(
            "Text:\n{text}\n\nEntities:\n{}\n\nExtract the relations as a JSON array.",
            listed.join("\n")
        )
    }
}

/// Recover a JSON array of relations from raw model output.
///
/// Tolerates code fences and prose around the array: the first balanced
/// `[` … `]` region is parsed. Elements missing required fields are skipped.
pub fn parse_relations_json(raw: &str) -> EngineResult<Vec<ExtractedRelation>> {
    let cleaned = raw.replace("```json", "").replace("```", "");
    let Some(start) = cleaned.find('[') else {
        return Err(EngineError::PermanentDependency(
            "relation response contains no JSON array".into(),
        ));
    };
    let mut depth = 0usize;
    let mut end = None;
    for (i, ch) in cleaned[start..].char_indices() {
        match ch {
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    end = Some(start + i + 1);
                    break;
                }
            }
            _ => {}
        }
    }
    let Some(end) = end else {
        return Err(EngineError::PermanentDependency(
            "relation response JSON array is unbalanced".into(),
        ));
    };
    let parsed: Vec<serde_json::Value> = serde_json::from_str(&cleaned[start..end])
        .map_err(|e| EngineError::PermanentDependency(format!("relation response JSON: {e}")))?;

    let mut relations = Vec::new();
    for item in parsed {
        let (Some(subject), Some(predicate), Some(object)) = (
            item.get("subject").and_then(|v| v.as_str()),
            item.get("predicate").and_then(|v| v.as_str()),
            item.get("object").and_then(|v| v.as_str()),
        ) else {
            continue;
        };
        if subject.is_empty() || predicate.is_empty() || object.is_empty() {
            continue;
        }
        let confidence = item
            .get("confidence")
            .and_then(|v| v.as_f64())
            .unwrap_or(0.7)
            .clamp(0.0, 1.0) as f32;
        relations.push(ExtractedRelation {
            subject: subject.to_string(),
            predicate: predicate.to_lowercase().replace(' ', "_"),
            object: object.to_string(),
            confidence,
            evidence: String::new(),
        });
    }
    Ok(relations)
}

#[async_trait]
impl RelationCollaborator for LlmRelationExtractor {
    async fn extract_relations(
        &self,
        text: &str,
        entities: &[NerSpan],
    ) -> EngineResult<Vec<ExtractedRelation>> {
        if entities.len() < 2 {
            return Ok(Vec::new());
        }
        let prompt = Self::build_prompt(text, entities);
        let raw = self.llm.complete(RELATION_SYSTEM_PROMPT, &prompt).await?;
        let mut relations = parse_relations_json(&raw)?;

        // Keep only edges over the detected span set.
        let known: Vec<&str> = entities.iter().map(|e| e.text.as_str()).collect();
        relations.retain(|r| {
            known.iter().any(|k| k.eq_ignore_ascii_case(&r.subject))
                && known.iter().any(|k| k.eq_ignore_ascii_case(&r.object))
                && !r.subject.eq_ignore_ascii_case(&r.object)
        });
        for relation in &mut relations {
            if relation.evidence.is_empty() {
                relation.evidence = evidence_snippet(text, 0, text.len());
            }
        }
        Ok(relations)
    }
}
