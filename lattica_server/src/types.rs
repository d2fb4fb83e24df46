//! Request/response wire types for the REST API.
//!
//! Every response carries `status ∈ {success, partial, error}`; non-success
//! responses add a human-readable `reason`, and degradable subsystems carry
//! explicit `degraded` flags.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use lattica_core::{
    Complexity, DocumentStatus, Entity, GraphStats, QueryIntent, QueryPlan, Relation,
    ReasoningKind, ReasoningPath, ScoredChunk, StrategyComponent, StrategyKind,
};

/// Response status values.
pub const STATUS_SUCCESS: &str = "success";
/// Partial: some subsystem degraded but evidence was produced.
pub const STATUS_PARTIAL: &str = "partial";

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Basic hybrid search request.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SearchRequest {
    /// Natural-language query.
    pub query: String,
    /// Result count; defaults to the configured top_k.
    #[serde(default)]
    pub top_k: Option<usize>,
}

/// Strategy selector for advanced search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SearchType {
    Vector,
    Graph,
    Keyword,
    Hybrid,
}

/// Advanced search request with strategy selection and domain scoping.
#[derive(Debug, Deserialize, ToSchema)]
pub struct AdvancedSearchRequest {
    /// Natural-language query.
    pub query: String,
    /// Which strategy to run; `hybrid` fuses all of them.
    #[serde(default = "default_search_type")]
    pub search_type: SearchType,
    /// Result count; defaults to the configured top_k.
    #[serde(default)]
    pub top_k: Option<usize>,
    /// Restrict results to one domain.
    #[serde(default)]
    pub domain: Option<String>,
}

fn default_search_type() -> SearchType {
    SearchType::Hybrid
}

/// Single-query request body.
#[derive(Debug, Deserialize, ToSchema)]
pub struct QueryRequest {
    /// Natural-language query.
    pub query: String,
}

/// Multi-hop reasoning request.
#[derive(Debug, Deserialize, ToSchema)]
pub struct MultiHopRequest {
    /// Natural-language query.
    pub query: String,
    /// Traversal depth override (1–4).
    #[serde(default)]
    pub max_hops: Option<u8>,
}

/// Query parameters for document ingestion.
#[derive(Debug, Deserialize, IntoParams)]
pub struct IngestParams {
    /// Corpus domain tag. Default `general`.
    #[serde(default = "default_domain")]
    pub domain: String,
    /// Whether to extract entities/relations into the knowledge graph.
    #[serde(default = "default_true")]
    pub build_knowledge_graph: bool,
}

pub(crate) fn default_domain() -> String {
    "general".to_string()
}
fn default_true() -> bool {
    true
}

/// Query parameters for the knowledge-graph export.
#[derive(Debug, Deserialize, IntoParams)]
pub struct ExportParams {
    /// Export format; only `json` is supported.
    #[serde(default)]
    pub format: Option<String>,
    /// Restrict to one domain.
    #[serde(default)]
    pub domain: Option<String>,
    /// Entity cap.
    #[serde(default)]
    pub max_entities: Option<usize>,
    /// Relation cap.
    #[serde(default)]
    pub max_relations: Option<usize>,
    /// Minimum occurrence/weight.
    #[serde(default)]
    pub min_occurrence: Option<u64>,
}

/// Query parameters for top-entity listing.
#[derive(Debug, Deserialize, IntoParams)]
pub struct TopEntitiesParams {
    #[serde(default)]
    pub domain: Option<String>,
    /// Entity type filter.
    #[serde(default, rename = "type")]
    pub entity_type: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default = "default_min_occurrence")]
    pub min_occurrence: u64,
}

/// Query parameters for top-relation listing.
#[derive(Debug, Deserialize, IntoParams)]
pub struct TopRelationsParams {
    #[serde(default)]
    pub domain: Option<String>,
    /// Relation type filter.
    #[serde(default, rename = "type")]
    pub relation_type: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default = "default_min_occurrence")]
    pub min_weight: u64,
}

fn default_limit() -> usize {
    20
}
fn default_min_occurrence() -> u64 {
    1
}

/// Optional domain scope.
#[derive(Debug, Deserialize, IntoParams)]
pub struct DomainParam {
    #[serde(default)]
    pub domain: Option<String>,
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// Health probe response.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// `healthy` or `unhealthy`.
    pub status: String,
    /// Unix timestamp (seconds).
    pub timestamp: u64,
    /// Seconds since startup.
    pub uptime_secs: u64,
    /// Configured store mode.
    pub store_mode: String,
}

/// Per-file result of an ingest upload.
#[derive(Debug, Serialize, ToSchema)]
pub struct IngestFileReport {
    pub filename: String,
    pub status: DocumentStatus,
    pub chunks: usize,
    pub failed_chunks: usize,
    pub entities: usize,
    pub relations: usize,
    pub mentions: usize,
    pub embedded: bool,
}

/// Ingest upload response.
#[derive(Debug, Serialize, ToSchema)]
pub struct IngestResponse {
    pub status: String,
    pub domain: String,
    pub build_knowledge_graph: bool,
    pub documents: Vec<IngestFileReport>,
    pub total_chunks: usize,
    pub total_entities: usize,
    pub total_relations: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// One known document.
#[derive(Debug, Serialize, ToSchema)]
pub struct DocumentSummary {
    pub name: String,
    pub chunks: usize,
    pub domains: Vec<String>,
    pub in_vector_store: bool,
    pub in_knowledge_graph: bool,
}

/// Document inventory response.
#[derive(Debug, Serialize, ToSchema)]
pub struct DocumentListResponse {
    pub status: String,
    pub documents: Vec<DocumentSummary>,
    pub total_documents: usize,
    pub vector_store_documents: usize,
    pub knowledge_graph_documents: usize,
}

/// Document deletion response.
#[derive(Debug, Serialize, ToSchema)]
pub struct DeleteDocumentResponse {
    pub status: String,
    pub document: String,
    pub removed_chunks: usize,
    pub removed_mentions: usize,
    pub removed_entities: usize,
    pub removed_relations: usize,
    pub removed_vectors: usize,
}

/// Store wipe response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ClearAllResponse {
    pub status: String,
}

/// Knowledge-graph rebuild response.
#[derive(Debug, Serialize, ToSchema)]
pub struct RebuildResponse {
    pub status: String,
    pub domain: String,
    pub documents: usize,
    pub entities: usize,
    pub relations: usize,
    pub failed_chunks: usize,
}

/// One retrieved chunk on the wire.
#[derive(Debug, Serialize, ToSchema)]
pub struct SearchResultItem {
    pub chunk_id: String,
    pub document_id: String,
    pub ordinal: u32,
    pub text: String,
    pub section_path: Vec<String>,
    pub domain: String,
    pub score: f64,
    pub strategies: Vec<StrategyKind>,
}

impl From<&ScoredChunk> for SearchResultItem {
    fn from(scored: &ScoredChunk) -> Self {
        Self {
            chunk_id: scored.chunk.id.clone(),
            document_id: scored.chunk.document_id.clone(),
            ordinal: scored.chunk.ordinal,
            text: scored.chunk.text.clone(),
            section_path: scored.chunk.section_path.clone(),
            domain: scored.chunk.domain.clone(),
            score: scored.score,
            strategies: scored.strategies.clone(),
        }
    }
}

/// Planner output on the wire.
#[derive(Debug, Serialize, ToSchema)]
pub struct QueryAnalysis {
    pub intent: QueryIntent,
    pub complexity: Complexity,
    pub confidence: f32,
    pub entities: Vec<String>,
    pub known_entities: Vec<String>,
    pub keywords: Vec<String>,
    pub max_hops: u8,
}

impl From<&QueryPlan> for QueryAnalysis {
    fn from(plan: &QueryPlan) -> Self {
        Self {
            intent: plan.intent,
            complexity: plan.complexity,
            confidence: plan.confidence,
            entities: plan.entities.iter().map(|e| e.text.clone()).collect(),
            known_entities: plan
                .entities
                .iter()
                .filter(|e| e.known)
                .map(|e| e.text.clone())
                .collect(),
            keywords: plan.keywords.clone(),
            max_hops: plan.max_hops,
        }
    }
}

/// Search response shared by `/search` and `/search-advanced`.
#[derive(Debug, Serialize, ToSchema)]
pub struct SearchResponse {
    pub status: String,
    pub query: String,
    pub search_type: SearchType,
    pub results: Vec<SearchResultItem>,
    pub total: usize,
    pub query_analysis: QueryAnalysis,
    pub degraded_strategies: Vec<StrategyKind>,
    pub partial: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Enhanced query response: retrieval + reasoning + synthesized answer.
#[derive(Debug, Serialize, ToSchema)]
pub struct EnhancedQueryResponse {
    pub status: String,
    pub query: String,
    pub answer: String,
    /// True when answer synthesis fell back to the fused context.
    pub degraded: bool,
    pub confidence: f32,
    pub query_analysis: QueryAnalysis,
    pub results: Vec<SearchResultItem>,
    pub reasoning_paths: Vec<ReasoningPath>,
    pub degraded_strategies: Vec<StrategyKind>,
    pub partial: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Intent analysis response.
#[derive(Debug, Serialize, ToSchema)]
pub struct IntentAnalysisResponse {
    pub status: String,
    pub query: String,
    pub intent_type: QueryIntent,
    pub confidence: f32,
    pub entities: Vec<String>,
    pub known_entities: Vec<String>,
    pub keywords: Vec<String>,
    /// The intent's strategy profile (pre-adjustment table weights).
    pub strategy: Vec<StrategyComponent>,
    pub complexity: Complexity,
    pub max_hops: u8,
    pub reasoning_required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_type: Option<ReasoningKind>,
}

/// Reasoning endpoint response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ReasoningResponse {
    pub status: String,
    pub query: String,
    pub reasoning_type: ReasoningKind,
    pub paths: Vec<ReasoningPath>,
    pub count: usize,
    /// True when graph reasoning fell back to chunk co-occurrence.
    pub degraded: bool,
}

/// Bounded projection response (`/knowledge-graph/filtered` and export).
#[derive(Debug, Serialize, ToSchema)]
pub struct ProjectionResponse {
    pub status: String,
    pub entities: Vec<Entity>,
    pub relations: Vec<Relation>,
    pub totals_before_filter: lattica_core::ProjectionTotals,
    pub applied_filter: lattica_core::GraphFilter,
}

/// Top entities response.
#[derive(Debug, Serialize, ToSchema)]
pub struct TopEntitiesResponse {
    pub status: String,
    pub entities: Vec<Entity>,
    pub count: usize,
}

/// Top relations response.
#[derive(Debug, Serialize, ToSchema)]
pub struct TopRelationsResponse {
    pub status: String,
    pub relations: Vec<Relation>,
    pub count: usize,
}

/// Graph statistics response.
#[derive(Debug, Serialize, ToSchema)]
pub struct StatsResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    pub stats: GraphStats,
}

/// Domain listing response.
#[derive(Debug, Serialize, ToSchema)]
pub struct DomainsResponse {
    pub status: String,
    pub domains: Vec<String>,
    pub count: usize,
}

/// Per-domain statistics entry.
#[derive(Debug, Serialize, ToSchema)]
pub struct DomainStatsEntry {
    pub domain: String,
    pub entities: u64,
    pub relations: u64,
    pub chunks: u64,
}

/// Per-domain statistics response.
#[derive(Debug, Serialize, ToSchema)]
pub struct DomainStatsResponse {
    pub status: String,
    pub domains: Vec<DomainStatsEntry>,
    pub count: usize,
}

/// Accepted formats and feature flags.
#[derive(Debug, Serialize, ToSchema)]
pub struct SupportedFormatsResponse {
    pub status: String,
    pub formats: Vec<String>,
    pub features: FeatureFlags,
}

/// Feature availability flags.
#[derive(Debug, Serialize, ToSchema)]
pub struct FeatureFlags {
    pub knowledge_graph: bool,
    pub semantic_chunking: bool,
    pub llm_synthesis: bool,
    pub domains: bool,
}
