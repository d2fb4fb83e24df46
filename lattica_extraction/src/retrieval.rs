//! Hybrid retrieval: parallel strategy execution, normalization, and
//! weighted reciprocal-rank fusion.
//!
//! Each active strategy from the query plan runs as its own task under a
//! hard per-strategy deadline, all inside a soft global deadline. Partial
//! results are acceptable: a strategy that fails or times out is reported in
//! `degraded_strategies` and fusion proceeds with the rest, discounting the
//! plan confidence by the failed strategy's weight. Given fixed store
//! contents, retrieval output is deterministic.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{debug, warn};

use lattica_config::RetrievalSettings;
use lattica_core::{
    fuse, Chunk, EngineError, EngineResult, Entity, GraphStore, KeywordIndex, QueryPlan,
    RankedContext, ScoredChunk, StoreRegistry, StrategyKind, StrategyRanking, VectorStore,
};

use crate::Embedder;

/// Retrieval tuning knobs.
#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    /// Default number of fused chunks returned.
    pub top_k: usize,
    /// Soft deadline over the whole retrieval.
    pub global_deadline: Duration,
    /// Hard deadline per strategy task.
    pub strategy_deadline: Duration,
    /// k-NN over-fetch multiplier.
    pub overfetch_factor: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 10,
            global_deadline: Duration::from_secs(3),
            strategy_deadline: Duration::from_secs(2),
            overfetch_factor: 4,
        }
    }
}

impl From<&RetrievalSettings> for RetrievalConfig {
    fn from(settings: &RetrievalSettings) -> Self {
        Self {
            top_k: settings.top_k.max(1),
            global_deadline: Duration::from_millis(settings.global_deadline_ms.max(1)),
            strategy_deadline: Duration::from_millis(settings.strategy_deadline_ms.max(1)),
            overfetch_factor: settings.overfetch_factor.max(1),
        }
    }
}

/// One strategy's result before fusion.
#[derive(Debug, Default)]
struct StrategyOutput {
    /// `(chunk_id, raw_score)` ordered best-first.
    hits: Vec<(String, f32)>,
    /// Entities that led to the hits (graph strategy only).
    entities: Vec<Entity>,
}

/// The hybrid retriever.
///
/// Holds the store registry, the embedder, and the in-process keyword
/// index; all shared and safe for concurrent use.
pub struct HybridRetriever {
    registry: StoreRegistry,
    embedder: Arc<dyn Embedder>,
    keyword: Arc<RwLock<KeywordIndex>>,
    config: RetrievalConfig,
}

impl HybridRetriever {
    /// Create a retriever.
    pub fn new(
        registry: StoreRegistry,
        embedder: Arc<dyn Embedder>,
        keyword: Arc<RwLock<KeywordIndex>>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            registry,
            embedder,
            keyword,
            config,
        }
    }

    /// Default result count.
    pub fn default_top_k(&self) -> usize {
        self.config.top_k
    }

    /// Execute the plan's strategies and fuse their rankings.
    pub async fn retrieve(
        &self,
        query: &str,
        plan: &QueryPlan,
        top_k: usize,
        domain: Option<&str>,
    ) -> EngineResult<RankedContext> {
        if query.trim().is_empty() {
            return Err(EngineError::InvalidInput("query must not be empty".into()));
        }
        let top_k = top_k.max(1);
        let fetch = top_k * self.config.overfetch_factor.max(1);

        let mut join_set: JoinSet<(StrategyKind, EngineResult<StrategyOutput>)> = JoinSet::new();
        for component in &plan.components {
            if component.weight <= 0.0 {
                continue;
            }
            let kind = component.kind;
            let deadline = self.config.strategy_deadline;
            let registry = self.registry.clone();
            let embedder = self.embedder.clone();
            let keyword = self.keyword.clone();
            let query = query.to_string();
            let domain = domain.map(str::to_string);
            let plan = plan.clone();
            join_set.spawn(async move {
                let run = async {
                    match kind {
                        StrategyKind::Vector => {
                            vector_strategy(&registry, embedder.as_ref(), &query, fetch, domain.as_deref())
                                .await
                        }
                        StrategyKind::Graph => {
                            graph_strategy(&registry, &keyword, &plan, fetch, domain.as_deref()).await
                        }
                        StrategyKind::Keyword => {
                            keyword_strategy(&keyword, &query, fetch, domain.as_deref())
                        }
                    }
                };
                let result = match tokio::time::timeout(deadline, run).await {
                    Ok(inner) => inner,
                    Err(_) => Err(EngineError::Timeout(deadline)),
                };
                (kind, result)
            });
        }

        // Harvest whatever completes before the soft global deadline.
        let mut outputs: HashMap<StrategyKind, EngineResult<StrategyOutput>> = HashMap::new();
        let global_deadline = tokio::time::Instant::now() + self.config.global_deadline;
        loop {
            match tokio::time::timeout_at(global_deadline, join_set.join_next()).await {
                Ok(Some(Ok((kind, result)))) => {
                    outputs.insert(kind, result);
                }
                Ok(Some(Err(join_err))) => {
                    warn!(error = %join_err, "retrieval strategy task aborted");
                }
                Ok(None) => break,
                Err(_) => {
                    warn!("global retrieval deadline hit, fusing partial results");
                    join_set.abort_all();
                    break;
                }
            }
        }

        // Fuse the surviving strategies.
        let mut rankings = Vec::new();
        let mut entities: Vec<Entity> = Vec::new();
        let mut degraded: Vec<StrategyKind> = Vec::new();
        let mut failed_weight = 0.0f32;
        for component in &plan.components {
            if component.weight <= 0.0 {
                continue;
            }
            match outputs.remove(&component.kind) {
                Some(Ok(output)) => {
                    if component.kind == StrategyKind::Graph {
                        entities = output.entities;
                    }
                    rankings.push(StrategyRanking {
                        kind: component.kind,
                        weight: component.weight,
                        hits: output.hits,
                    });
                }
                Some(Err(err)) => {
                    warn!(strategy = ?component.kind, error = %err, "strategy degraded");
                    degraded.push(component.kind);
                    failed_weight += component.weight;
                }
                None => {
                    degraded.push(component.kind);
                    failed_weight += component.weight;
                }
            }
        }

        let fused = fuse(&rankings, top_k);
        let mut chunks = Vec::with_capacity(fused.len());
        for hit in fused {
            let Some(chunk) = self.materialize(&hit.chunk_id).await else {
                continue;
            };
            if domain.is_some_and(|d| chunk.domain != d) {
                continue;
            }
            chunks.push(ScoredChunk {
                chunk,
                score: hit.score,
                strategies: hit.strategies,
                max_component_score: hit.max_component_score,
            });
        }

        let partial = !degraded.is_empty();
        let confidence = (plan.confidence * (1.0 - failed_weight)).clamp(0.0, 1.0);
        debug!(
            chunks = chunks.len(),
            degraded = degraded.len(),
            confidence,
            "retrieval fused"
        );
        Ok(RankedContext {
            chunks,
            entities,
            paths: Vec::new(),
            degraded_strategies: degraded,
            partial,
            confidence,
        })
    }

    /// Fetch a chunk, preferring the in-process index so results survive a
    /// degraded graph store.
    async fn materialize(&self, chunk_id: &str) -> Option<Chunk> {
        if let Some(chunk) = self.read_index().get_chunk(chunk_id) {
            return Some(chunk);
        }
        self.registry.graph().get_chunk(chunk_id).await.ok().flatten()
    }

    fn read_index(&self) -> std::sync::RwLockReadGuard<'_, KeywordIndex> {
        self.keyword.read().unwrap_or_else(|e| e.into_inner())
    }
}

/// Dense-vector strategy: embed the query and over-fetch k-NN hits.
async fn vector_strategy(
    registry: &StoreRegistry,
    embedder: &dyn Embedder,
    query: &str,
    fetch: usize,
    domain: Option<&str>,
) -> EngineResult<StrategyOutput> {
    let vectors = embedder.embed(&[query.to_string()]).await?;
    let vector = vectors
        .into_iter()
        .next()
        .ok_or_else(|| EngineError::DataIntegrity("embedder returned no vector".into()))?;
    let hits = registry.vector().query(&vector, fetch, domain).await?;
    Ok(StrategyOutput {
        hits: hits.into_iter().map(|h| (h.chunk_id, h.similarity)).collect(),
        entities: Vec::new(),
    })
}

/// Graph strategy: expand known query entities, pivot to chunks through
/// mentions, and score by hop-discounted edge confidence.
async fn graph_strategy(
    registry: &StoreRegistry,
    keyword: &Arc<RwLock<KeywordIndex>>,
    plan: &QueryPlan,
    fetch: usize,
    domain: Option<&str>,
) -> EngineResult<StrategyOutput> {
    let seeds: Vec<&str> = plan
        .entities
        .iter()
        .filter_map(|e| e.entity_id.as_deref())
        .collect();
    if seeds.is_empty() {
        return Ok(StrategyOutput::default());
    }

    // entity id → (min hop, edge confidence on arrival); seeds are hop 0.
    let mut reach: HashMap<String, (u8, f32)> = HashMap::new();
    let mut entities: Vec<Entity> = Vec::new();
    for seed in &seeds {
        if let Some(entity) = registry.graph().get_entity(seed).await? {
            if reach.insert(entity.id.clone(), (0, 1.0)).is_none() {
                entities.push(entity);
            }
        }
        for neighbor in registry.graph().neighbors(seed, plan.max_hops, None).await? {
            let entry = reach
                .entry(neighbor.entity.id.clone())
                .or_insert((neighbor.hop, neighbor.via.confidence));
            if neighbor.hop < entry.0 {
                *entry = (neighbor.hop, neighbor.via.confidence);
            }
            if !entities.iter().any(|e| e.id == neighbor.entity.id) {
                entities.push(neighbor.entity);
            }
        }
    }

    let ids: Vec<String> = reach.keys().cloned().collect();
    let mentions = registry.graph().mentions_for_entities(&ids).await?;
    let mut scores: HashMap<String, f32> = HashMap::new();
    for mention in mentions {
        let Some(&(hop, confidence)) = reach.get(&mention.entity_id) else { continue };
        if let Some(d) = domain {
            let in_domain = keyword
                .read()
                .unwrap_or_else(|e| e.into_inner())
                .get_chunk(&mention.chunk_id)
                .map(|c| c.domain == d);
            let in_domain = match in_domain {
                Some(v) => v,
                None => registry
                    .graph()
                    .get_chunk(&mention.chunk_id)
                    .await?
                    .map(|c| c.domain == d)
                    .unwrap_or(false),
            };
            if !in_domain {
                continue;
            }
        }
        *scores.entry(mention.chunk_id).or_insert(0.0) += confidence / (1.0 + hop as f32);
    }

    let mut hits: Vec<(String, f32)> = scores.into_iter().collect();
    hits.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    hits.truncate(fetch);

    entities.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(StrategyOutput { hits, entities })
}

/// Lexical strategy: BM25 over the in-process index.
fn keyword_strategy(
    keyword: &Arc<RwLock<KeywordIndex>>,
    query: &str,
    fetch: usize,
    domain: Option<&str>,
) -> EngineResult<StrategyOutput> {
    let index = keyword.read().unwrap_or_else(|e| e.into_inner());
    let mut hits = index.search(query, fetch * 2);
    if let Some(d) = domain {
        hits.retain(|(chunk_id, _)| {
            index.get_chunk(chunk_id).map(|c| c.domain == d).unwrap_or(false)
        });
    }
    hits.truncate(fetch);
    Ok(StrategyOutput { hits, entities: Vec::new() })
}
