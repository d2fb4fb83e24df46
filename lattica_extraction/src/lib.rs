//! # Lattica Extraction
//!
//! Ingestion and query pipelines for the Lattica retrieval engine.
//!
//! This crate provides:
//! - **Chunking** (structural + semantic) — [`chunker`]
//! - **Embedding** via an external collaborator, with a deterministic
//!   offline fallback — [`embeddings`]
//! - **Named entity recognition** via an external collaborator, with a
//!   heuristic fallback — [`ner`]
//! - **Relation extraction** via an LLM collaborator or co-occurrence
//!   analysis — [`relations`]
//! - **Entity resolution** (blocking + fuzzy merge) — [`resolution`]
//! - **Ingestion orchestration** (text → graph + vectors) — [`ingestion`]
//! - **Query planning** (intent, entities, strategy weights) — [`planner`]
//! - **Hybrid retrieval** (parallel strategies + RRF fusion) — [`retrieval`]
//! - **Reasoning paths** (direct/causal/comparative/multi-hop) — [`reasoning`]
//!
//! All collaborator boundaries are trait objects so production uses HTTP
//! clients while tests substitute lightweight mocks. Every pipeline has a
//! rule-based path that works with no collaborator configured.

pub mod chunker;
pub mod embeddings;
pub mod ingestion;
pub mod llm;
pub mod ner;
pub mod planner;
pub mod reasoning;
pub mod relations;
pub mod resolution;
pub mod retrieval;

use async_trait::async_trait;
use lattica_core::EngineResult;

/// Embedding collaborator contract: deterministic text → fixed-dim vector.
///
/// The dimension is fixed per collection; implementations must return one
/// vector per input text, in order.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// The fixed output dimension.
    fn dimension(&self) -> usize;

    /// Embed a batch of texts.
    async fn embed(&self, texts: &[String]) -> EngineResult<Vec<Vec<f32>>>;
}

/// A named span detected in text.
#[derive(Debug, Clone, PartialEq)]
pub struct NerSpan {
    /// The span text as it appears in the source.
    pub text: String,
    /// Entity label (open vocabulary, e.g. "person", "organization").
    pub label: String,
    /// Start byte offset in the source text.
    pub start: usize,
    /// End byte offset in the source text (exclusive).
    pub end: usize,
    /// Detection confidence (0.0–1.0).
    pub confidence: f32,
}

/// NER collaborator contract: named spans with type and confidence.
#[async_trait]
pub trait NerCollaborator: Send + Sync {
    /// Extract named spans from text.
    async fn extract_entities(&self, text: &str) -> EngineResult<Vec<NerSpan>>;
}

/// A relation extracted between two detected spans.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedRelation {
    /// Subject span text.
    pub subject: String,
    /// Predicate (relation type tag).
    pub predicate: String,
    /// Object span text.
    pub object: String,
    /// Extraction confidence (0.0–1.0).
    pub confidence: f32,
    /// Short text snippet evidencing the relation.
    pub evidence: String,
}

/// Relation collaborator contract: typed edges over detected entity spans.
#[async_trait]
pub trait RelationCollaborator: Send + Sync {
    /// Extract relations from text given pre-extracted spans.
    async fn extract_relations(
        &self,
        text: &str,
        entities: &[NerSpan],
    ) -> EngineResult<Vec<ExtractedRelation>>;
}

/// LLM collaborator contract, used for relation extraction, intent
/// classification fallback, and answer synthesis.
#[async_trait]
pub trait LlmCollaborator: Send + Sync {
    /// Complete a prompt and return the raw model text.
    async fn complete(&self, system: &str, prompt: &str) -> EngineResult<String>;
}
