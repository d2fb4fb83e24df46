//! # Lattica Server
//!
//! REST API for the Lattica hybrid retrieval engine.
//!
//! Provides:
//! - Document ingestion (multipart upload) into the graph and vector stores
//! - Hybrid, single-strategy, and enhanced query endpoints
//! - Reasoning endpoints (causal, comparative, multi-hop)
//! - Bounded knowledge-graph projections, exports, and statistics
//! - Prometheus metrics at `/metrics` and Swagger UI at `/docs`
//!
//! # Configuration
//!
//! Set `LATTICA_CONFIG` to a TOML config file path, or use defaults.
//! The server binds to the configured `host:port` (default `0.0.0.0:8410`).

pub mod cache;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod openapi;
pub mod state;
pub mod synthesis;
pub mod types;

use std::sync::Arc;

use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use state::AppState;

/// Build the full application router over shared state.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics_text))
        .route("/supported-formats", get(handlers::supported_formats))
        .route("/ingest-documents", post(handlers::ingest_documents))
        .route("/documents/list", get(handlers::list_documents))
        .route("/documents/{name}", delete(handlers::delete_document))
        .route("/clear-all", delete(handlers::clear_all))
        .route("/rebuild-knowledge-graph", post(handlers::rebuild_knowledge_graph))
        .route("/search", post(handlers::search))
        .route("/search-advanced", post(handlers::search_advanced))
        .route("/enhanced-query", post(handlers::enhanced_query))
        .route("/analyze-query-intent", post(handlers::analyze_query_intent))
        .route("/advanced-reasoning", post(handlers::advanced_reasoning))
        .route("/causal-reasoning", post(handlers::causal_reasoning))
        .route("/comparative-reasoning", post(handlers::comparative_reasoning))
        .route("/multi-hop-reasoning", post(handlers::multi_hop_reasoning))
        .route("/knowledge-graph/export", get(handlers::export_knowledge_graph))
        .route("/knowledge-graph/filtered", post(handlers::filtered_knowledge_graph))
        .route("/knowledge-graph/top-entities", get(handlers::top_entities))
        .route("/knowledge-graph/top-relations", get(handlers::top_relations))
        .route("/knowledge-graph/stats", get(handlers::knowledge_graph_stats))
        .route("/knowledge-graph/domains", get(handlers::knowledge_graph_domains))
        .route("/knowledge-graph/domain-stats", get(handlers::domain_stats))
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", openapi::ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
