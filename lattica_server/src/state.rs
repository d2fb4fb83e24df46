//! Application state shared across all request handlers.
//!
//! The state is the process-wide service container: it is constructed once
//! at startup from configuration, health-checked, and passed to handlers
//! through Axum's `State` extractor. No component reaches for a global
//! client.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use lattica_config::LatticaConfig;
use lattica_core::{
    EngineResult, ExternalGraphStore, ExternalVectorStore, GraphStore, KeywordIndex,
    MemoryGraphStore, MemoryVectorStore, StoreRegistry, VectorStore,
};
use lattica_extraction::embeddings::{HashEmbedder, HttpEmbedder};
use lattica_extraction::ingestion::{IngestionConfig, IngestionPipeline};
use lattica_extraction::llm::HttpLlmCollaborator;
use lattica_extraction::ner::{HeuristicNer, HttpNerCollaborator};
use lattica_extraction::planner::QueryPlanner;
use lattica_extraction::reasoning::ReasoningEngine;
use lattica_extraction::relations::{CooccurrenceRelationExtractor, LlmRelationExtractor};
use lattica_extraction::retrieval::{HybridRetriever, RetrievalConfig};
use lattica_extraction::{Embedder, LlmCollaborator, NerCollaborator, RelationCollaborator};

use crate::cache::RetrievalCache;
use crate::metrics::EngineMetrics;
use crate::synthesis::AnswerSynthesizer;

/// Shared application state threaded through Axum handlers.
pub struct AppState {
    /// Storage backends (graph + vector).
    pub registry: StoreRegistry,
    /// Embedding collaborator (HTTP or deterministic fallback).
    pub embedder: Arc<dyn Embedder>,
    /// Ingestion pipeline.
    pub ingestion: IngestionPipeline,
    /// Query planner.
    pub planner: QueryPlanner,
    /// Hybrid retriever.
    pub retriever: HybridRetriever,
    /// Reasoning engine.
    pub reasoner: ReasoningEngine,
    /// Answer synthesizer.
    pub synthesizer: AnswerSynthesizer,
    /// In-process BM25 index, shared with the retriever.
    pub keyword: Arc<RwLock<KeywordIndex>>,
    /// Retrieval memoization.
    pub cache: RetrievalCache,
    /// Full configuration.
    pub config: LatticaConfig,
    /// Monotonic counter bumped by every write; retrieval reads it to decide
    /// whether cached results are current.
    pub store_generation: AtomicU64,
    /// Server start time (for uptime).
    pub start_time: Instant,
    /// Prometheus instruments.
    pub metrics: EngineMetrics,
}

impl AppState {
    /// Build the full service container from configuration.
    pub fn from_config(config: LatticaConfig) -> anyhow::Result<Self> {
        let dimension = config.stores.embedding_dimension;

        let (graph, vector): (Arc<dyn GraphStore>, Arc<dyn VectorStore>) =
            if config.stores.mode == "external" {
                let graph_url = config
                    .stores
                    .graph_url
                    .clone()
                    .ok_or_else(|| anyhow::anyhow!("stores.graph_url required in external mode"))?;
                let vector_url = config
                    .stores
                    .vector_url
                    .clone()
                    .ok_or_else(|| anyhow::anyhow!("stores.vector_url required in external mode"))?;
                (
                    Arc::new(ExternalGraphStore::new(graph_url)),
                    Arc::new(ExternalVectorStore::new(vector_url, dimension)),
                )
            } else {
                (
                    Arc::new(MemoryGraphStore::new()),
                    Arc::new(MemoryVectorStore::new(dimension)),
                )
            };
        let registry = StoreRegistry::new(graph.clone(), vector);

        let embedder: Arc<dyn Embedder> = match &config.collaborators.embedding_url {
            Some(url) => Arc::new(HttpEmbedder::new(url.clone(), dimension)),
            None => Arc::new(HashEmbedder::new(dimension)),
        };
        let ner: Arc<dyn NerCollaborator> = match &config.collaborators.ner_url {
            Some(url) => Arc::new(HttpNerCollaborator::new(url.clone())),
            None => Arc::new(HeuristicNer::new()),
        };
        let llm: Option<Arc<dyn LlmCollaborator>> = if config.collaborators.llm_enabled() {
            config.collaborators.llm_url.as_ref().map(|url| {
                Arc::new(HttpLlmCollaborator::new(
                    url.clone(),
                    config.collaborators.llm_api_key.clone(),
                )) as Arc<dyn LlmCollaborator>
            })
        } else {
            None
        };
        let relations: Arc<dyn RelationCollaborator> = match &llm {
            Some(llm) => Arc::new(LlmRelationExtractor::new(llm.clone())),
            None => Arc::new(CooccurrenceRelationExtractor::with_defaults()),
        };

        let keyword = Arc::new(RwLock::new(KeywordIndex::new()));
        let ingestion = IngestionPipeline::new(
            registry.clone(),
            embedder.clone(),
            ner.clone(),
            relations,
            IngestionConfig::from(&config.ingestion),
        );
        let planner = QueryPlanner::new(graph.clone(), ner, llm.clone());
        let retriever = HybridRetriever::new(
            registry.clone(),
            embedder.clone(),
            keyword.clone(),
            RetrievalConfig::from(&config.retrieval),
        );
        let reasoner = ReasoningEngine::new(graph, config.reasoning.clone());
        let synthesizer = AnswerSynthesizer::new(llm);
        let cache = RetrievalCache::new(
            config.cache.enabled,
            Duration::from_secs(config.cache.ttl_secs),
        );

        Ok(Self {
            registry,
            embedder,
            ingestion,
            planner,
            retriever,
            reasoner,
            synthesizer,
            keyword,
            cache,
            config,
            store_generation: AtomicU64::new(0),
            start_time: Instant::now(),
            metrics: EngineMetrics::new(),
        })
    }

    /// Rebuild the in-process keyword index from the graph store's chunks.
    /// Called at startup so a restarted server serves lexical search
    /// immediately.
    pub async fn rebuild_keyword_index(&self) -> EngineResult<()> {
        let chunks = self.registry.graph().all_chunks().await?;
        let mut index = self.keyword.write().unwrap_or_else(|e| e.into_inner());
        index.clear();
        for chunk in &chunks {
            index.insert(chunk);
        }
        Ok(())
    }

    /// Current store generation.
    pub fn generation(&self) -> u64 {
        self.store_generation.load(Ordering::SeqCst)
    }

    /// Bump the store generation after any write, invalidating cached
    /// retrievals.
    pub fn bump_generation(&self) {
        self.store_generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Add a document's chunks to the keyword index.
    pub async fn index_document_keywords(&self, document_id: &str) -> EngineResult<()> {
        let chunks = self.registry.graph().chunks_for_document(document_id).await?;
        let mut index = self.keyword.write().unwrap_or_else(|e| e.into_inner());
        index.remove_document(document_id);
        for chunk in &chunks {
            index.insert(chunk);
        }
        Ok(())
    }

    /// Drop a document from the keyword index.
    pub fn unindex_document_keywords(&self, document_id: &str) {
        self.keyword
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove_document(document_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_state_builds() {
        let state = AppState::from_config(LatticaConfig::default()).unwrap();
        assert_eq!(state.generation(), 0);
        state.bump_generation();
        assert_eq!(state.generation(), 1);
    }

    #[test]
    fn test_external_mode_requires_urls() {
        let mut config = LatticaConfig::default();
        config.stores.mode = "external".to_string();
        assert!(AppState::from_config(config).is_err());
    }
}
