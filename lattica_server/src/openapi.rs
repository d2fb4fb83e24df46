//! OpenAPI documentation aggregation.

use utoipa::OpenApi;

use crate::handlers;

/// OpenAPI document for the Lattica REST API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Lattica API",
        description = "Hybrid graph + vector + keyword retrieval engine"
    ),
    paths(
        handlers::health,
        handlers::metrics_text,
        handlers::supported_formats,
        handlers::ingest_documents,
        handlers::list_documents,
        handlers::delete_document,
        handlers::clear_all,
        handlers::rebuild_knowledge_graph,
        handlers::search,
        handlers::search_advanced,
        handlers::enhanced_query,
        handlers::analyze_query_intent,
        handlers::advanced_reasoning,
        handlers::causal_reasoning,
        handlers::comparative_reasoning,
        handlers::multi_hop_reasoning,
        handlers::export_knowledge_graph,
        handlers::filtered_knowledge_graph,
        handlers::top_entities,
        handlers::top_relations,
        handlers::knowledge_graph_stats,
        handlers::knowledge_graph_domains,
        handlers::domain_stats,
    ),
    components(schemas(
        crate::error::ApiErrorBody,
        crate::types::SearchRequest,
        crate::types::AdvancedSearchRequest,
        crate::types::SearchType,
        crate::types::QueryRequest,
        crate::types::MultiHopRequest,
        crate::types::HealthResponse,
        crate::types::IngestResponse,
        crate::types::IngestFileReport,
        crate::types::DocumentListResponse,
        crate::types::DocumentSummary,
        crate::types::DeleteDocumentResponse,
        crate::types::ClearAllResponse,
        crate::types::RebuildResponse,
        crate::types::SearchResponse,
        crate::types::SearchResultItem,
        crate::types::QueryAnalysis,
        crate::types::EnhancedQueryResponse,
        crate::types::IntentAnalysisResponse,
        crate::types::ReasoningResponse,
        crate::types::ProjectionResponse,
        crate::types::TopEntitiesResponse,
        crate::types::TopRelationsResponse,
        crate::types::StatsResponse,
        crate::types::DomainsResponse,
        crate::types::DomainStatsResponse,
        crate::types::DomainStatsEntry,
        crate::types::SupportedFormatsResponse,
        crate::types::FeatureFlags,
        lattica_core::error::ErrorKind,
        lattica_core::types::Chunk,
        lattica_core::types::Entity,
        lattica_core::types::Relation,
        lattica_core::types::Mention,
        lattica_core::types::QueryIntent,
        lattica_core::types::Complexity,
        lattica_core::types::StrategyKind,
        lattica_core::types::StrategyComponent,
        lattica_core::types::ReasoningKind,
        lattica_core::types::ReasoningPath,
        lattica_core::types::PathEdge,
        lattica_core::types::DocumentStatus,
        lattica_core::types::GraphStats,
        lattica_core::projection::GraphFilter,
        lattica_core::projection::SortBy,
        lattica_core::projection::SortOrder,
        lattica_core::projection::ProjectionTotals,
    ))
)]
pub struct ApiDoc;
