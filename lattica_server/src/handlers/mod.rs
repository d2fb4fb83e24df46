//! Axum route handlers for the Lattica REST API.

use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use axum::extract::{Multipart, Path, Query, State};
use axum::Json;
use tracing::{info, warn};

use lattica_core::{
    DocumentStatus, EngineError, GraphFilter, GraphStore, QueryPlan, RankedContext,
    ReasoningKind, StrategyComponent, StrategyKind, VectorStore,
};
use lattica_extraction::chunker::DocumentFormat;
use lattica_extraction::planner::{base_components, strategy_profile};

use crate::cache::query_hash;
use crate::error::AppError;
use crate::state::AppState;
use crate::types::*;

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn status_of(context: &RankedContext) -> &'static str {
    if context.partial {
        STATUS_PARTIAL
    } else {
        STATUS_SUCCESS
    }
}

/// Plan, retrieve (through the cache), and return both.
///
/// `search_type` narrows the plan to a single strategy; `hybrid` keeps the
/// planner's weighted components.
async fn plan_and_retrieve(
    state: &AppState,
    query: &str,
    search_type: SearchType,
    top_k: usize,
    domain: Option<&str>,
) -> Result<(QueryPlan, RankedContext), AppError> {
    let mut plan = state.planner.plan(query).await?;
    if let Some(kind) = match search_type {
        SearchType::Vector => Some(StrategyKind::Vector),
        SearchType::Graph => Some(StrategyKind::Graph),
        SearchType::Keyword => Some(StrategyKind::Keyword),
        SearchType::Hybrid => None,
    } {
        plan.components = vec![StrategyComponent { kind, weight: 1.0 }];
    }

    let key = (
        query_hash(&format!("{search_type:?}|{query}"), top_k, domain),
        plan.fingerprint(),
        state.generation(),
    );
    if let Some(cached) = state.cache.get(&key) {
        state.metrics.cache_hits_total.inc();
        return Ok((plan, cached));
    }

    let context = state.retriever.retrieve(query, &plan, top_k, domain).await?;
    state.cache.put(key, context.clone());
    Ok((plan, context))
}

// ---------------------------------------------------------------------------
// Health, formats, metrics
// ---------------------------------------------------------------------------

/// Liveness and dependency probe.
#[utoipa::path(
    get,
    path = "/health",
    tag = "system",
    responses((status = 200, description = "Health status", body = HealthResponse))
)]
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    state.metrics.requests_total.inc();
    let graph_ok = state.registry.graph().domains().await.is_ok();
    let vector_ok = state.registry.vector().count().await.is_ok();
    Json(HealthResponse {
        status: if graph_ok && vector_ok { "healthy" } else { "unhealthy" }.to_string(),
        timestamp: unix_now(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        store_mode: state.config.stores.mode.clone(),
    })
}

/// Prometheus text exposition.
#[utoipa::path(
    get,
    path = "/metrics",
    tag = "system",
    responses((status = 200, description = "Prometheus metrics", body = String))
)]
pub async fn metrics_text(State(state): State<Arc<AppState>>) -> String {
    state.metrics.encode()
}

/// Accepted ingest formats and feature flags.
#[utoipa::path(
    get,
    path = "/supported-formats",
    tag = "system",
    responses((status = 200, description = "Formats and features", body = SupportedFormatsResponse))
)]
pub async fn supported_formats(State(state): State<Arc<AppState>>) -> Json<SupportedFormatsResponse> {
    state.metrics.requests_total.inc();
    Json(SupportedFormatsResponse {
        status: STATUS_SUCCESS.to_string(),
        formats: DocumentFormat::supported_extensions()
            .iter()
            .map(|e| e.to_string())
            .collect(),
        features: FeatureFlags {
            knowledge_graph: true,
            semantic_chunking: true,
            llm_synthesis: state.config.collaborators.llm_enabled(),
            domains: true,
        },
    })
}

// ---------------------------------------------------------------------------
// Ingestion & document lifecycle
// ---------------------------------------------------------------------------

/// Multipart document upload.
#[utoipa::path(
    post,
    path = "/ingest-documents",
    tag = "documents",
    params(IngestParams),
    responses((status = 200, description = "Per-file ingestion reports", body = IngestResponse))
)]
pub async fn ingest_documents(
    State(state): State<Arc<AppState>>,
    Query(params): Query<IngestParams>,
    mut multipart: Multipart,
) -> Result<Json<IngestResponse>, AppError> {
    state.metrics.requests_total.inc();
    let mut documents = Vec::new();
    let mut any_failed = false;
    let mut reason = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError(EngineError::InvalidInput(format!("multipart: {e}"))))?
    {
        let Some(filename) = field
            .file_name()
            .map(str::to_string)
            .or_else(|| field.name().map(str::to_string))
        else {
            continue;
        };
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError(EngineError::InvalidInput(format!("multipart body: {e}"))))?;
        let text = String::from_utf8_lossy(&data).to_string();
        let format = DocumentFormat::from_filename(&filename);

        match state
            .ingestion
            .ingest_document(&filename, &params.domain, format, &text, params.build_knowledge_graph)
            .await
        {
            Ok(report) => {
                state.metrics.ingestions_total.inc();
                state.index_document_keywords(&filename).await?;
                if report.status == DocumentStatus::Partial {
                    any_failed = true;
                }
                documents.push(IngestFileReport {
                    filename,
                    status: report.status,
                    chunks: report.chunks,
                    failed_chunks: report.failed_chunks,
                    entities: report.entities,
                    relations: report.relations,
                    mentions: report.mentions,
                    embedded: report.embedded,
                });
            }
            Err(err) => {
                warn!(filename = %filename, error = %err, "document ingestion failed");
                any_failed = true;
                reason = Some(err.to_string());
                documents.push(IngestFileReport {
                    filename,
                    status: DocumentStatus::Partial,
                    chunks: 0,
                    failed_chunks: 0,
                    entities: 0,
                    relations: 0,
                    mentions: 0,
                    embedded: false,
                });
            }
        }
    }
    if documents.is_empty() {
        return Err(AppError(EngineError::InvalidInput(
            "no files in multipart upload".into(),
        )));
    }
    state.bump_generation();

    Ok(Json(IngestResponse {
        status: if any_failed { STATUS_PARTIAL } else { STATUS_SUCCESS }.to_string(),
        domain: params.domain,
        build_knowledge_graph: params.build_knowledge_graph,
        total_chunks: documents.iter().map(|d| d.chunks).sum(),
        total_entities: documents.iter().map(|d| d.entities).sum(),
        total_relations: documents.iter().map(|d| d.relations).sum(),
        documents,
        reason,
    }))
}

/// Inventory of ingested documents across stores.
#[utoipa::path(
    get,
    path = "/documents/list",
    tag = "documents",
    responses((status = 200, description = "Document inventory", body = DocumentListResponse))
)]
pub async fn list_documents(
    State(state): State<Arc<AppState>>,
) -> Result<Json<DocumentListResponse>, AppError> {
    state.metrics.requests_total.inc();
    let graph_docs = state.registry.graph().document_ids().await?;
    let vector_docs = state.registry.vector().document_ids().await?;

    let mut names: Vec<String> = graph_docs.clone();
    for doc in &vector_docs {
        if !names.contains(doc) {
            names.push(doc.clone());
        }
    }
    names.sort();

    let mut documents = Vec::with_capacity(names.len());
    for name in &names {
        let chunks = state.registry.graph().chunks_for_document(name).await?;
        let mut domains: Vec<String> = chunks.iter().map(|c| c.domain.clone()).collect();
        domains.sort();
        domains.dedup();
        documents.push(DocumentSummary {
            name: name.clone(),
            chunks: chunks.len(),
            domains,
            in_vector_store: vector_docs.contains(name),
            in_knowledge_graph: graph_docs.contains(name),
        });
    }

    Ok(Json(DocumentListResponse {
        status: STATUS_SUCCESS.to_string(),
        total_documents: documents.len(),
        vector_store_documents: vector_docs.len(),
        knowledge_graph_documents: graph_docs.len(),
        documents,
    }))
}

/// Remove one document and all of its assets. Idempotent.
#[utoipa::path(
    delete,
    path = "/documents/{name}",
    tag = "documents",
    params(("name" = String, Path, description = "Document id (file name)")),
    responses((status = 200, description = "Deletion counts", body = DeleteDocumentResponse))
)]
pub async fn delete_document(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<DeleteDocumentResponse>, AppError> {
    state.metrics.requests_total.inc();
    let deletion = state.registry.graph().delete_document(&name).await?;
    let removed_vectors = state.registry.vector().delete_document(&name).await?;
    state.unindex_document_keywords(&name);
    state.bump_generation();
    info!(document = %name, chunks = deletion.chunks, "document deleted");

    Ok(Json(DeleteDocumentResponse {
        status: STATUS_SUCCESS.to_string(),
        document: name,
        removed_chunks: deletion.chunks,
        removed_mentions: deletion.mentions,
        removed_entities: deletion.entities,
        removed_relations: deletion.relations,
        removed_vectors,
    }))
}

/// Wipe every store. Idempotent.
#[utoipa::path(
    delete,
    path = "/clear-all",
    tag = "documents",
    responses((status = 200, description = "Stores wiped", body = ClearAllResponse))
)]
pub async fn clear_all(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ClearAllResponse>, AppError> {
    state.metrics.requests_total.inc();
    state.registry.graph().clear().await?;
    state.registry.vector().clear().await?;
    state
        .keyword
        .write()
        .unwrap_or_else(|e| e.into_inner())
        .clear();
    state.bump_generation();
    Ok(Json(ClearAllResponse { status: STATUS_SUCCESS.to_string() }))
}

/// Re-run extraction over stored chunks for a domain.
#[utoipa::path(
    post,
    path = "/rebuild-knowledge-graph",
    tag = "documents",
    params(DomainParam),
    responses((status = 200, description = "Rebuild report", body = RebuildResponse))
)]
pub async fn rebuild_knowledge_graph(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DomainParam>,
) -> Result<Json<RebuildResponse>, AppError> {
    state.metrics.requests_total.inc();
    let domain = params.domain.unwrap_or_else(default_domain);
    let mut documents = 0usize;
    let mut entities = 0usize;
    let mut relations = 0usize;
    let mut failed_chunks = 0usize;

    for document_id in state.registry.graph().document_ids().await? {
        let chunks: Vec<_> = state
            .registry
            .graph()
            .chunks_for_document(&document_id)
            .await?
            .into_iter()
            .filter(|c| c.domain == domain)
            .collect();
        if chunks.is_empty() {
            continue;
        }
        let report = state
            .ingestion
            .rebuild_from_chunks(&document_id, &domain, &chunks)
            .await?;
        documents += 1;
        entities += report.entities;
        relations += report.relations;
        failed_chunks += report.failed_chunks;
    }
    state.bump_generation();

    Ok(Json(RebuildResponse {
        status: if failed_chunks > 0 { STATUS_PARTIAL } else { STATUS_SUCCESS }.to_string(),
        domain,
        documents,
        entities,
        relations,
        failed_chunks,
    }))
}

// ---------------------------------------------------------------------------
// Search & query
// ---------------------------------------------------------------------------

/// Basic hybrid search.
#[utoipa::path(
    post,
    path = "/search",
    tag = "query",
    request_body = SearchRequest,
    responses((status = 200, description = "Fused results", body = SearchResponse))
)]
pub async fn search(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    run_search(
        state,
        AdvancedSearchRequest {
            query: request.query,
            search_type: SearchType::Hybrid,
            top_k: request.top_k,
            domain: None,
        },
    )
    .await
}

/// Strategy-selectable search.
#[utoipa::path(
    post,
    path = "/search-advanced",
    tag = "query",
    request_body = AdvancedSearchRequest,
    responses((status = 200, description = "Fused results", body = SearchResponse))
)]
pub async fn search_advanced(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AdvancedSearchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    run_search(state, request).await
}

async fn run_search(
    state: Arc<AppState>,
    request: AdvancedSearchRequest,
) -> Result<Json<SearchResponse>, AppError> {
    state.metrics.requests_total.inc();
    state.metrics.searches_total.inc();
    let started = Instant::now();
    let top_k = request.top_k.unwrap_or_else(|| state.retriever.default_top_k());
    let (plan, context) = plan_and_retrieve(
        &state,
        &request.query,
        request.search_type,
        top_k,
        request.domain.as_deref(),
    )
    .await?;
    state
        .metrics
        .search_latency_seconds
        .observe(started.elapsed().as_secs_f64());

    Ok(Json(SearchResponse {
        status: status_of(&context).to_string(),
        query: request.query,
        search_type: request.search_type,
        results: context.chunks.iter().map(SearchResultItem::from).collect(),
        total: context.chunks.len(),
        query_analysis: QueryAnalysis::from(&plan),
        reason: (!context.degraded_strategies.is_empty())
            .then(|| "one or more retrieval strategies degraded".to_string()),
        degraded_strategies: context.degraded_strategies,
        partial: context.partial,
    }))
}

/// Full pipeline: plan, retrieve, reason, synthesize an answer.
#[utoipa::path(
    post,
    path = "/enhanced-query",
    tag = "query",
    request_body = QueryRequest,
    responses((status = 200, description = "Answer with evidence", body = EnhancedQueryResponse))
)]
pub async fn enhanced_query(
    State(state): State<Arc<AppState>>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<EnhancedQueryResponse>, AppError> {
    state.metrics.requests_total.inc();
    state.metrics.searches_total.inc();
    let started = Instant::now();
    let top_k = state.retriever.default_top_k();
    let (plan, mut context) =
        plan_and_retrieve(&state, &request.query, SearchType::Hybrid, top_k, None).await?;

    let mut reasoning_degraded = false;
    if let Some(kind) = plan.reasoning {
        let outcome = state.reasoner.reason(kind, &plan, &context.chunks).await;
        reasoning_degraded = outcome.degraded;
        context.paths = outcome.paths;
    }

    let answer = state.synthesizer.synthesize(&request.query, &context).await;
    state
        .metrics
        .search_latency_seconds
        .observe(started.elapsed().as_secs_f64());

    let partial = context.partial || reasoning_degraded;
    Ok(Json(EnhancedQueryResponse {
        status: if partial { STATUS_PARTIAL } else { STATUS_SUCCESS }.to_string(),
        query: request.query,
        answer: answer.answer,
        degraded: answer.degraded,
        confidence: context.confidence,
        query_analysis: QueryAnalysis::from(&plan),
        results: context.chunks.iter().map(SearchResultItem::from).collect(),
        reasoning_paths: context.paths,
        reason: partial.then(|| "a subsystem degraded during query handling".to_string()),
        degraded_strategies: context.degraded_strategies,
        partial,
    }))
}

/// Planner introspection: intent, entities, strategy profile, complexity.
#[utoipa::path(
    post,
    path = "/analyze-query-intent",
    tag = "query",
    request_body = QueryRequest,
    responses((status = 200, description = "Intent analysis", body = IntentAnalysisResponse))
)]
pub async fn analyze_query_intent(
    State(state): State<Arc<AppState>>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<IntentAnalysisResponse>, AppError> {
    state.metrics.requests_total.inc();
    let plan = state.planner.plan(&request.query).await?;
    let (_, _, _, reasoning) = strategy_profile(plan.intent);
    Ok(Json(IntentAnalysisResponse {
        status: STATUS_SUCCESS.to_string(),
        query: request.query,
        intent_type: plan.intent,
        confidence: plan.confidence,
        entities: plan.entities.iter().map(|e| e.text.clone()).collect(),
        known_entities: plan
            .entities
            .iter()
            .filter(|e| e.known)
            .map(|e| e.text.clone())
            .collect(),
        keywords: plan.keywords.clone(),
        strategy: base_components(plan.intent),
        complexity: plan.complexity,
        max_hops: plan.max_hops,
        reasoning_required: reasoning.is_some(),
        reasoning_type: reasoning,
    }))
}

// ---------------------------------------------------------------------------
// Reasoning
// ---------------------------------------------------------------------------

async fn run_reasoning(
    state: Arc<AppState>,
    query: String,
    kind_override: Option<ReasoningKind>,
    max_hops_override: Option<u8>,
) -> Result<Json<ReasoningResponse>, AppError> {
    state.metrics.requests_total.inc();
    state.metrics.searches_total.inc();
    let mut plan = state.planner.plan(&query).await?;
    if let Some(hops) = max_hops_override {
        plan.max_hops = hops.clamp(1, 4);
    }
    let kind = kind_override
        .or(plan.reasoning)
        .unwrap_or(ReasoningKind::Direct);

    // Fused chunks feed path evidence and the chunk-only fallback.
    let top_k = state.retriever.default_top_k();
    let context = state
        .retriever
        .retrieve(&query, &plan, top_k, None)
        .await
        .unwrap_or_else(|_| RankedContext {
            chunks: vec![],
            entities: vec![],
            paths: vec![],
            degraded_strategies: vec![],
            partial: true,
            confidence: 0.0,
        });

    let outcome = state.reasoner.reason(kind, &plan, &context.chunks).await;
    Ok(Json(ReasoningResponse {
        status: if outcome.degraded { STATUS_PARTIAL } else { STATUS_SUCCESS }.to_string(),
        query,
        reasoning_type: kind,
        count: outcome.paths.len(),
        paths: outcome.paths,
        degraded: outcome.degraded,
    }))
}

/// Reasoning with the kind chosen by the planner.
#[utoipa::path(
    post,
    path = "/advanced-reasoning",
    tag = "reasoning",
    request_body = QueryRequest,
    responses((status = 200, description = "Reasoning paths", body = ReasoningResponse))
)]
pub async fn advanced_reasoning(
    State(state): State<Arc<AppState>>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<ReasoningResponse>, AppError> {
    run_reasoning(state, request.query, None, None).await
}

/// Causal chains over the configured causal edge set.
#[utoipa::path(
    post,
    path = "/causal-reasoning",
    tag = "reasoning",
    request_body = QueryRequest,
    responses((status = 200, description = "Causal chains", body = ReasoningResponse))
)]
pub async fn causal_reasoning(
    State(state): State<Arc<AppState>>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<ReasoningResponse>, AppError> {
    run_reasoning(state, request.query, Some(ReasoningKind::Causal), None).await
}

/// Neighborhood-overlap comparison between query entities.
#[utoipa::path(
    post,
    path = "/comparative-reasoning",
    tag = "reasoning",
    request_body = QueryRequest,
    responses((status = 200, description = "Comparative paths", body = ReasoningResponse))
)]
pub async fn comparative_reasoning(
    State(state): State<Arc<AppState>>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<ReasoningResponse>, AppError> {
    run_reasoning(state, request.query, Some(ReasoningKind::Comparative), None).await
}

/// Beam-searched multi-hop paths.
#[utoipa::path(
    post,
    path = "/multi-hop-reasoning",
    tag = "reasoning",
    request_body = MultiHopRequest,
    responses((status = 200, description = "Multi-hop paths", body = ReasoningResponse))
)]
pub async fn multi_hop_reasoning(
    State(state): State<Arc<AppState>>,
    Json(request): Json<MultiHopRequest>,
) -> Result<Json<ReasoningResponse>, AppError> {
    run_reasoning(
        state,
        request.query,
        Some(ReasoningKind::MultiHop),
        request.max_hops,
    )
    .await
}

// ---------------------------------------------------------------------------
// Knowledge graph views
// ---------------------------------------------------------------------------

/// Bounded JSON export of the graph.
#[utoipa::path(
    get,
    path = "/knowledge-graph/export",
    tag = "knowledge-graph",
    params(ExportParams),
    responses((status = 200, description = "Bounded dump", body = ProjectionResponse))
)]
pub async fn export_knowledge_graph(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ExportParams>,
) -> Result<Json<ProjectionResponse>, AppError> {
    state.metrics.requests_total.inc();
    if let Some(format) = &params.format {
        if format != "json" {
            return Err(AppError(EngineError::InvalidInput(format!(
                "unsupported export format {format:?}, only \"json\" is available"
            ))));
        }
    }
    let defaults = GraphFilter::default();
    let filter = GraphFilter {
        domain: params.domain,
        max_entities: params.max_entities.unwrap_or(defaults.max_entities),
        max_relations: params.max_relations.unwrap_or(defaults.max_relations),
        min_occurrence: params.min_occurrence.unwrap_or(defaults.min_occurrence),
        ..defaults
    };
    project(state, filter).await
}

/// Bounded projection with the full filter object.
#[utoipa::path(
    post,
    path = "/knowledge-graph/filtered",
    tag = "knowledge-graph",
    request_body = GraphFilter,
    responses((status = 200, description = "Bounded projection", body = ProjectionResponse))
)]
pub async fn filtered_knowledge_graph(
    State(state): State<Arc<AppState>>,
    Json(filter): Json<GraphFilter>,
) -> Result<Json<ProjectionResponse>, AppError> {
    state.metrics.requests_total.inc();
    project(state, filter).await
}

async fn project(
    state: Arc<AppState>,
    filter: GraphFilter,
) -> Result<Json<ProjectionResponse>, AppError> {
    let projection = state.registry.graph().filtered_projection(&filter).await?;
    Ok(Json(ProjectionResponse {
        status: STATUS_SUCCESS.to_string(),
        entities: projection.entities,
        relations: projection.relations,
        totals_before_filter: projection.totals_before_filter,
        applied_filter: projection.applied_filter,
    }))
}

/// Most frequent entities.
#[utoipa::path(
    get,
    path = "/knowledge-graph/top-entities",
    tag = "knowledge-graph",
    params(TopEntitiesParams),
    responses((status = 200, description = "Top entities", body = TopEntitiesResponse))
)]
pub async fn top_entities(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TopEntitiesParams>,
) -> Result<Json<TopEntitiesResponse>, AppError> {
    state.metrics.requests_total.inc();
    let entities = state
        .registry
        .graph()
        .top_entities(
            params.domain.as_deref(),
            params.entity_type.as_deref(),
            params.limit,
            params.min_occurrence,
        )
        .await?;
    Ok(Json(TopEntitiesResponse {
        status: STATUS_SUCCESS.to_string(),
        count: entities.len(),
        entities,
    }))
}

/// Heaviest relations.
#[utoipa::path(
    get,
    path = "/knowledge-graph/top-relations",
    tag = "knowledge-graph",
    params(TopRelationsParams),
    responses((status = 200, description = "Top relations", body = TopRelationsResponse))
)]
pub async fn top_relations(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TopRelationsParams>,
) -> Result<Json<TopRelationsResponse>, AppError> {
    state.metrics.requests_total.inc();
    let relations = state
        .registry
        .graph()
        .top_relations(
            params.domain.as_deref(),
            params.relation_type.as_deref(),
            params.limit,
            params.min_weight,
        )
        .await?;
    Ok(Json(TopRelationsResponse {
        status: STATUS_SUCCESS.to_string(),
        count: relations.len(),
        relations,
    }))
}

/// Node/edge counts, type histograms, density.
#[utoipa::path(
    get,
    path = "/knowledge-graph/stats",
    tag = "knowledge-graph",
    params(DomainParam),
    responses((status = 200, description = "Graph statistics", body = StatsResponse))
)]
pub async fn knowledge_graph_stats(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DomainParam>,
) -> Result<Json<StatsResponse>, AppError> {
    state.metrics.requests_total.inc();
    let stats = state.registry.graph().stats(params.domain.as_deref()).await?;
    Ok(Json(StatsResponse {
        status: STATUS_SUCCESS.to_string(),
        domain: params.domain,
        stats,
    }))
}

/// Distinct domains.
#[utoipa::path(
    get,
    path = "/knowledge-graph/domains",
    tag = "knowledge-graph",
    responses((status = 200, description = "Domains", body = DomainsResponse))
)]
pub async fn knowledge_graph_domains(
    State(state): State<Arc<AppState>>,
) -> Result<Json<DomainsResponse>, AppError> {
    state.metrics.requests_total.inc();
    let domains = state.registry.graph().domains().await?;
    Ok(Json(DomainsResponse {
        status: STATUS_SUCCESS.to_string(),
        count: domains.len(),
        domains,
    }))
}

/// Per-domain entity/relation/chunk counts.
#[utoipa::path(
    get,
    path = "/knowledge-graph/domain-stats",
    tag = "knowledge-graph",
    responses((status = 200, description = "Per-domain statistics", body = DomainStatsResponse))
)]
pub async fn domain_stats(
    State(state): State<Arc<AppState>>,
) -> Result<Json<DomainStatsResponse>, AppError> {
    state.metrics.requests_total.inc();
    let mut entries = Vec::new();
    for domain in state.registry.graph().domains().await? {
        let stats = state.registry.graph().stats(Some(&domain)).await?;
        entries.push(DomainStatsEntry {
            domain,
            entities: stats.entity_count,
            relations: stats.relation_count,
            chunks: stats.chunk_count,
        });
    }
    Ok(Json(DomainStatsResponse {
        status: STATUS_SUCCESS.to_string(),
        count: entries.len(),
        domains: entries,
    }))
}
