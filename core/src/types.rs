//! Core data types for the Lattica retrieval engine.
//!
//! Defines the shared data model flowing through ingestion, retrieval, and
//! reasoning: chunks, entities, relations, mentions, embeddings, query plans,
//! and reasoning paths. Identifiers are deterministic so that re-ingesting the
//! same content is idempotent across stores.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use utoipa::ToSchema;

/// Flexible metadata value supporting common JSON-like scalars.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(untagged)]
pub enum ScalarValue {
    /// A string value.
    String(String),
    /// An integer value.
    Integer(i64),
    /// A floating-point value.
    Float(f64),
    /// A boolean value.
    Bool(bool),
}

/// A contiguous text unit emitted by the chunker, the atomic retrieval target.
///
/// Chunks are immutable after creation and are deleted only when their
/// document is deleted. `(document_id, ordinal)` is unique; the chunk id is
/// derived from it so the same document always produces the same ids.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct Chunk {
    /// Stable id, `"{document_id}::{ordinal}"`.
    pub id: String,
    /// Source document identifier (the uploaded file name).
    pub document_id: String,
    /// 0-based position within the document. Dense: no gaps.
    pub ordinal: u32,
    /// Chunk text. Never empty.
    pub text: String,
    /// Ordered section labels from the document structure (outermost first).
    #[serde(default)]
    pub section_path: Vec<String>,
    /// Source page, when the format carries page breaks.
    #[serde(default)]
    pub page: Option<u32>,
    /// Coarse corpus tag scoping ingestion and queries.
    pub domain: String,
    /// Small scalar metadata (format hints, row indices, …).
    #[serde(default)]
    pub extra: BTreeMap<String, ScalarValue>,
}

/// Derive the stable chunk id for `(document_id, ordinal)`.
pub fn chunk_id(document_id: &str, ordinal: u32) -> String {
    format!("{document_id}::{ordinal}")
}

/// A canonical named concept extracted from chunks.
///
/// The id is a deterministic function of `(normalized_name, entity_type)`:
/// merging observations of the same concept never changes its id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct Entity {
    /// Deterministic id, see [`entity_id`].
    pub id: String,
    /// Canonical surface form.
    pub name: String,
    /// Type tag from an open vocabulary (e.g. `person`, `organization`).
    #[serde(rename = "type")]
    pub entity_type: String,
    /// Short description accumulated from extraction.
    #[serde(default)]
    pub description: String,
    /// Alternative surface forms observed for this entity.
    #[serde(default)]
    pub aliases: BTreeSet<String>,
    /// Corpus domain the entity was extracted from.
    pub domain: String,
    /// Number of mention observations across the corpus. Always ≥ 1.
    pub occurrence: u64,
    /// Aggregated extraction confidence in `[0, 1]` (max of observations).
    pub confidence: f32,
}

/// Normalize an entity name for identity purposes: lowercase, fold
/// whitespace runs to single spaces, strip punctuation.
pub fn normalize_entity_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_space = false;
    for ch in name.chars() {
        if ch.is_whitespace() {
            pending_space = !out.is_empty();
        } else if ch.is_alphanumeric() {
            if pending_space {
                out.push(' ');
                pending_space = false;
            }
            out.extend(ch.to_lowercase());
        }
        // punctuation is dropped
    }
    out
}

/// Deterministic entity id: first 16 bytes of SHA-256 over the normalized
/// name and type, as lowercase hex.
pub fn entity_id(normalized_name: &str, entity_type: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalized_name.as_bytes());
    hasher.update([0x01]);
    hasher.update(entity_type.as_bytes());
    let digest = hasher.finalize();
    digest[..16].iter().map(|b| format!("{b:02x}")).collect()
}

/// A typed, directed edge between two entities with accumulated weight.
///
/// `(source_id, target_id, relation_type)` identifies the edge; repeated
/// observations merge into it, incrementing `weight` and appending evidence
/// up to [`Relation::EVIDENCE_CAP`] snippets.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct Relation {
    /// Source entity id.
    pub source_id: String,
    /// Target entity id.
    pub target_id: String,
    /// Relation type tag (e.g. `works_for`, `causes`).
    #[serde(rename = "type")]
    pub relation_type: String,
    /// Short text snippets evidencing the edge, capped.
    #[serde(default)]
    pub evidence: Vec<String>,
    /// Max confidence across observations, `[0, 1]`.
    pub confidence: f32,
    /// Accumulated co-occurrence count. Always ≥ 1.
    pub weight: u64,
    /// Corpus domain.
    pub domain: String,
}

impl Relation {
    /// Maximum number of evidence snippets kept per edge.
    pub const EVIDENCE_CAP: usize = 5;
}

/// Character span of a mention inside its chunk.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct OffsetSpan {
    /// Start byte offset.
    pub start: u32,
    /// End byte offset (exclusive).
    pub end: u32,
}

/// An occurrence link from an entity to a chunk, used for graph→chunk pivot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct Mention {
    /// Mentioned entity.
    pub entity_id: String,
    /// Chunk the mention occurs in.
    pub chunk_id: String,
    /// Where in the chunk, when the extractor reported a span.
    #[serde(default)]
    pub span: Option<OffsetSpan>,
}

/// Payload stored alongside each embedding in the vector store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct EmbeddingPayload {
    /// Owning document.
    pub document_id: String,
    /// Corpus domain, used for filtered k-NN.
    pub domain: String,
    /// Chunk ordinal within the document.
    pub ordinal: u32,
    /// Section labels of the chunk.
    #[serde(default)]
    pub section_path: Vec<String>,
}

/// One embedding per chunk; the vector dimension is constant per collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingRecord {
    /// Embedded chunk.
    pub chunk_id: String,
    /// Fixed-dimension vector.
    pub vector: Vec<f32>,
    /// Metadata payload.
    pub payload: EmbeddingPayload,
}

// ---------------------------------------------------------------------------
// Query planning
// ---------------------------------------------------------------------------

/// Classified intent of a natural-language query.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryIntent {
    /// Direct fact lookup ("where is…", "who wrote…").
    Factual,
    /// Comparison between two or more entities.
    Comparative,
    /// Cause/effect questions.
    Causal,
    /// Open-ended analysis or relationship exploration.
    Analytical,
    /// Time-anchored questions.
    Temporal,
    /// How-to / step-by-step questions.
    Procedural,
}

/// Query complexity classification driving traversal depth.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Low,
    Medium,
    High,
}

/// Retrieval strategy families the planner can activate.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    /// Dense-vector similarity over chunk embeddings.
    Vector,
    /// Knowledge-graph traversal from known query entities.
    Graph,
    /// Lexical BM25 match over chunk text.
    Keyword,
}

/// A strategy activated for a query together with its fusion weight.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct StrategyComponent {
    /// Strategy family.
    pub kind: StrategyKind,
    /// Fusion weight. Active component weights sum to 1.
    pub weight: f32,
}

/// Reasoning path families produced by the reasoning engine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReasoningKind {
    /// Shortest path between two known query entities.
    Direct,
    /// Path restricted to the configured causal edge types.
    Causal,
    /// Neighborhood-overlap comparison of two entities.
    Comparative,
    /// Beam-searched path over several hops.
    MultiHop,
}

/// An entity reference recognized in a query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct QueryEntity {
    /// Surface text as it appeared in the query.
    pub text: String,
    /// Matching knowledge-graph entity, when the text resolved to one.
    #[serde(default)]
    pub entity_id: Option<String>,
    /// Whether the entity is present in the knowledge graph.
    pub known: bool,
}

/// The planner's decision object for one query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct QueryPlan {
    /// Classified intent.
    pub intent: QueryIntent,
    /// Classified complexity.
    pub complexity: Complexity,
    /// Entities recognized in the query.
    pub entities: Vec<QueryEntity>,
    /// Stopword-filtered lexical terms for the keyword strategy.
    pub keywords: Vec<String>,
    /// Active strategies, ordered by weight descending.
    pub components: Vec<StrategyComponent>,
    /// Reasoning requested for this query, if any.
    #[serde(default)]
    pub reasoning: Option<ReasoningKind>,
    /// Maximum graph traversal depth (1–4).
    pub max_hops: u8,
    /// Classifier confidence in `[0, 1]`.
    pub confidence: f32,
}

impl QueryPlan {
    /// Stable fingerprint of the plan, used as a cache key component.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(format!("{:?}|{:?}|{}", self.intent, self.complexity, self.max_hops));
        for e in &self.entities {
            hasher.update(&e.text);
            hasher.update([0x1f]);
        }
        for c in &self.components {
            hasher.update(format!("{:?}:{:.3}", c.kind, c.weight));
        }
        let digest = hasher.finalize();
        digest[..8].iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Weight of the given strategy in this plan, 0 when inactive.
    pub fn weight_of(&self, kind: StrategyKind) -> f32 {
        self.components
            .iter()
            .find(|c| c.kind == kind)
            .map(|c| c.weight)
            .unwrap_or(0.0)
    }
}

// ---------------------------------------------------------------------------
// Reasoning paths
// ---------------------------------------------------------------------------

/// A traversed edge inside a reasoning path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct PathEdge {
    /// Source entity id.
    pub source_id: String,
    /// Target entity id.
    pub target_id: String,
    /// Relation type tag.
    #[serde(rename = "type")]
    pub relation_type: String,
    /// Edge confidence in `[0, 1]`.
    pub confidence: f32,
}

/// A path over the knowledge graph with accumulated confidence, used to
/// explain retrieval or drive comparative/causal answers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct ReasoningPath {
    /// Path family.
    pub kind: ReasoningKind,
    /// Ordered entity names along the path.
    pub entities: Vec<String>,
    /// Ordered edges along the path.
    pub edges: Vec<PathEdge>,
    /// Chunk ids evidencing the path.
    #[serde(default)]
    pub evidence_chunks: Vec<String>,
    /// Accumulated confidence in `[0, 1]`.
    pub confidence: f32,
}

// ---------------------------------------------------------------------------
// Document lifecycle
// ---------------------------------------------------------------------------

/// Lifecycle state of an ingested document.
///
/// ```text
/// received → chunked → indexed → deleting → absent
///    any failure → partial (retries may resume to indexed)
/// ```
/// Terminal states are `indexed` and `absent`. A `partial` document remains
/// retrievable but is flagged.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Received,
    Chunked,
    Indexed,
    Partial,
    Deleting,
    Absent,
}

// ---------------------------------------------------------------------------
// Retrieval output
// ---------------------------------------------------------------------------

/// A chunk in the fused ranking together with its provenance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct ScoredChunk {
    /// The retrieved chunk.
    pub chunk: Chunk,
    /// Fused score (weighted reciprocal-rank).
    pub score: f64,
    /// Strategies that surfaced this chunk.
    pub strategies: Vec<StrategyKind>,
    /// Best per-strategy normalized score.
    pub max_component_score: f32,
}

/// The hybrid retriever's ranked context for one query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct RankedContext {
    /// Fused top-N chunks, best first.
    pub chunks: Vec<ScoredChunk>,
    /// Entities that led to chunks via the graph strategy.
    pub entities: Vec<Entity>,
    /// Reasoning paths collected for the plan.
    pub paths: Vec<ReasoningPath>,
    /// Strategies that failed or timed out.
    pub degraded_strategies: Vec<StrategyKind>,
    /// True when at least one active strategy did not contribute.
    pub partial: bool,
    /// Planner confidence discounted by failed strategy weights.
    pub confidence: f32,
}

// ---------------------------------------------------------------------------
// Graph statistics
// ---------------------------------------------------------------------------

/// Node/edge counts and type histograms for the knowledge graph.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct GraphStats {
    /// Number of entities.
    pub entity_count: u64,
    /// Number of relations.
    pub relation_count: u64,
    /// Number of chunks.
    pub chunk_count: u64,
    /// Number of mention edges.
    pub mention_count: u64,
    /// Entity count per type tag.
    pub entity_types: BTreeMap<String, u64>,
    /// Relation count per type tag.
    pub relation_types: BTreeMap<String, u64>,
    /// Directed edge density: `relations / (entities × (entities − 1))`.
    pub density: f64,
}

impl GraphStats {
    /// Recompute density from the current counts.
    pub fn with_density(mut self) -> Self {
        let n = self.entity_count as f64;
        self.density = if self.entity_count > 1 {
            self.relation_count as f64 / (n * (n - 1.0))
        } else {
            0.0
        };
        self
    }
}
