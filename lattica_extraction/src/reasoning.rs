//! Reasoning paths over the knowledge graph.
//!
//! For plans that request reasoning, builds up to a configured number of
//! [`ReasoningPath`] values to accompany the retrieved chunks:
//!
//! - **Direct** — shortest path between pairs of known query entities.
//! - **Causal** — traversal restricted to the configured causal edge types.
//! - **Comparative** — hop-1 neighborhood overlap between entity pairs.
//! - **Multi-hop** — beam search scored by edge confidence and target
//!   occurrence.
//!
//! Graph store failures never fail the query: the engine falls back to
//! chunk-only reasoning derived from entity co-occurrence in the fused
//! chunks.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::warn;

use lattica_config::ReasoningSettings;
use lattica_core::{
    EngineResult, GraphStore, PathEdge, QueryPlan, ReasoningKind, ReasoningPath, ScoredChunk,
};

/// Reasoning paths plus whether the graph store had to be bypassed.
#[derive(Debug, Clone)]
pub struct ReasoningOutcome {
    /// Paths, ranked by confidence descending.
    pub paths: Vec<ReasoningPath>,
    /// True when graph reasoning failed and the paths come from chunk
    /// co-occurrence only.
    pub degraded: bool,
}

/// The reasoning engine. Read-only over the graph store.
pub struct ReasoningEngine {
    graph: Arc<dyn GraphStore>,
    settings: ReasoningSettings,
}

impl ReasoningEngine {
    /// Create an engine with the configured causal edge set and limits.
    pub fn new(graph: Arc<dyn GraphStore>, settings: ReasoningSettings) -> Self {
        Self { graph, settings }
    }

    /// Build reasoning paths of the requested kind. Never fails: graph
    /// errors degrade to co-occurrence over the fused chunks.
    pub async fn reason(
        &self,
        kind: ReasoningKind,
        plan: &QueryPlan,
        chunks: &[ScoredChunk],
    ) -> ReasoningOutcome {
        let result = match kind {
            ReasoningKind::Direct => self.direct_paths(plan).await,
            ReasoningKind::Causal => self.causal_paths(plan).await,
            ReasoningKind::Comparative => self.comparative_paths(plan).await,
            ReasoningKind::MultiHop => self.multi_hop_paths(plan).await,
        };
        match result {
            Ok(mut paths) => {
                paths.sort_by(|a, b| {
                    b.confidence
                        .partial_cmp(&a.confidence)
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then_with(|| a.entities.cmp(&b.entities))
                });
                paths.truncate(self.settings.max_paths);
                ReasoningOutcome { paths, degraded: false }
            }
            Err(err) => {
                warn!(error = %err, "graph reasoning failed, falling back to chunk co-occurrence");
                ReasoningOutcome {
                    paths: self.cooccurrence_fallback(kind, plan, chunks),
                    degraded: true,
                }
            }
        }
    }

    fn known_ids(plan: &QueryPlan) -> Vec<String> {
        plan.entities
            .iter()
            .filter_map(|e| e.entity_id.clone())
            .collect()
    }

    async fn entity_name(&self, cache: &mut HashMap<String, String>, id: &str) -> String {
        if let Some(name) = cache.get(id) {
            return name.clone();
        }
        let name = self
            .graph
            .get_entity(id)
            .await
            .ok()
            .flatten()
            .map(|e| e.name)
            .unwrap_or_else(|| id.to_string());
        cache.insert(id.to_string(), name.clone());
        name
    }

    /// Walk an edge list from `start`, returning the ordered entity ids.
    fn entities_along(start: &str, edges: &[PathEdge]) -> Vec<String> {
        let mut ids = vec![start.to_string()];
        let mut cursor = start.to_string();
        for edge in edges {
            cursor = if edge.source_id == cursor {
                edge.target_id.clone()
            } else {
                edge.source_id.clone()
            };
            ids.push(cursor.clone());
        }
        ids
    }

    fn path_confidence(edges: &[PathEdge]) -> f32 {
        let product: f32 = edges.iter().map(|e| e.confidence).product();
        product / edges.len().max(1) as f32
    }

    /// Chunk ids whose mentions include every entity in `ids`.
    async fn co_mention_chunks(&self, ids: &[String]) -> EngineResult<Vec<String>> {
        let mentions = self.graph.mentions_for_entities(ids).await?;
        let mut by_chunk: HashMap<String, HashSet<&str>> = HashMap::new();
        for mention in &mentions {
            by_chunk
                .entry(mention.chunk_id.clone())
                .or_default()
                .insert(mention.entity_id.as_str());
        }
        let mut chunks: Vec<String> = by_chunk
            .into_iter()
            .filter(|(_, seen)| ids.iter().all(|id| seen.contains(id.as_str())))
            .map(|(chunk_id, _)| chunk_id)
            .collect();
        chunks.sort();
        Ok(chunks)
    }

    async fn build_path(
        &self,
        kind: ReasoningKind,
        start: &str,
        edges: Vec<PathEdge>,
        evidence: Vec<String>,
        cache: &mut HashMap<String, String>,
    ) -> ReasoningPath {
        let ids = Self::entities_along(start, &edges);
        let mut names = Vec::with_capacity(ids.len());
        for id in &ids {
            names.push(self.entity_name(cache, id).await);
        }
        ReasoningPath {
            kind,
            confidence: Self::path_confidence(&edges),
            entities: names,
            edges,
            evidence_chunks: evidence,
        }
    }

    async fn direct_paths(&self, plan: &QueryPlan) -> EngineResult<Vec<ReasoningPath>> {
        let known = Self::known_ids(plan);
        let mut cache = HashMap::new();
        let mut paths = Vec::new();
        for (i, source) in known.iter().enumerate() {
            for target in known.iter().skip(i + 1) {
                let Some(edges) = self
                    .graph
                    .shortest_path(source, target, plan.max_hops, None)
                    .await?
                else {
                    continue;
                };
                if edges.is_empty() {
                    continue;
                }
                let evidence = self
                    .co_mention_chunks(&[source.clone(), target.clone()])
                    .await
                    .unwrap_or_default();
                paths.push(
                    self.build_path(ReasoningKind::Direct, source, edges, evidence, &mut cache)
                        .await,
                );
            }
        }
        Ok(paths)
    }

    async fn causal_paths(&self, plan: &QueryPlan) -> EngineResult<Vec<ReasoningPath>> {
        let causal = self.settings.causal_relation_types.clone();
        let known = Self::known_ids(plan);
        let mut cache = HashMap::new();
        let mut paths = Vec::new();
        let mut seen: HashSet<Vec<String>> = HashSet::new();

        // Chains between pairs of known entities.
        for (i, source) in known.iter().enumerate() {
            for target in known.iter().skip(i + 1) {
                if let Some(edges) = self
                    .graph
                    .shortest_path(source, target, plan.max_hops, Some(&causal))
                    .await?
                {
                    if !edges.is_empty() && seen.insert(Self::entities_along(source, &edges)) {
                        paths.push(
                            self.build_path(ReasoningKind::Causal, source, edges, Vec::new(), &mut cache)
                                .await,
                        );
                    }
                }
            }
        }

        // Causes reaching each known entity ("what causes X").
        for seed in &known {
            let neighbors = self.graph.neighbors(seed, plan.max_hops, Some(&causal)).await?;
            for neighbor in neighbors {
                let Some(edges) = self
                    .graph
                    .shortest_path(&neighbor.entity.id, seed, plan.max_hops, Some(&causal))
                    .await?
                else {
                    continue;
                };
                if edges.is_empty() {
                    continue;
                }
                let ids = Self::entities_along(&neighbor.entity.id, &edges);
                if !seen.insert(ids) {
                    continue;
                }
                paths.push(
                    self.build_path(
                        ReasoningKind::Causal,
                        &neighbor.entity.id,
                        edges,
                        Vec::new(),
                        &mut cache,
                    )
                    .await,
                );
            }
        }
        Ok(paths)
    }

    async fn comparative_paths(&self, plan: &QueryPlan) -> EngineResult<Vec<ReasoningPath>> {
        let known = Self::known_ids(plan);
        let mut cache = HashMap::new();
        let mut paths = Vec::new();
        for (i, a) in known.iter().enumerate() {
            for b in known.iter().skip(i + 1) {
                let a_neighbors = self.graph.neighbors(a, 1, None).await?;
                let b_neighbors = self.graph.neighbors(b, 1, None).await?;
                let a_ids: HashMap<&str, &PathEdge> = a_neighbors
                    .iter()
                    .map(|n| (n.entity.id.as_str(), &n.via))
                    .collect();
                let b_ids: HashMap<&str, &PathEdge> = b_neighbors
                    .iter()
                    .map(|n| (n.entity.id.as_str(), &n.via))
                    .collect();
                let shared: Vec<&str> = {
                    let mut shared: Vec<&str> = a_ids
                        .keys()
                        .filter(|id| b_ids.contains_key(**id))
                        .copied()
                        .collect();
                    shared.sort_unstable();
                    shared
                };
                let union = a_ids.len() + b_ids.len() - shared.len();
                let overlap = if union == 0 { 0.0 } else { shared.len() as f32 / union as f32 };

                let mut entities = vec![self.entity_name(&mut cache, a).await];
                let mut edges = Vec::new();
                for id in &shared {
                    entities.push(self.entity_name(&mut cache, id).await);
                    edges.push((*a_ids[id]).clone());
                    edges.push((*b_ids[id]).clone());
                }
                entities.push(self.entity_name(&mut cache, b).await);

                let evidence = self
                    .co_mention_chunks(&[a.clone(), b.clone()])
                    .await
                    .unwrap_or_default();
                paths.push(ReasoningPath {
                    kind: ReasoningKind::Comparative,
                    entities,
                    edges,
                    evidence_chunks: evidence,
                    confidence: (0.3 + 0.7 * overlap).clamp(0.0, 1.0),
                });
            }
        }
        Ok(paths)
    }

    async fn multi_hop_paths(&self, plan: &QueryPlan) -> EngineResult<Vec<ReasoningPath>> {
        #[derive(Clone)]
        struct Beam {
            ids: Vec<String>,
            edges: Vec<PathEdge>,
            score: f32,
        }

        let known = Self::known_ids(plan);
        let mut cache = HashMap::new();
        let mut candidates: Vec<Beam> = Vec::new();

        for seed in &known {
            let mut beams = vec![Beam { ids: vec![seed.clone()], edges: Vec::new(), score: 1.0 }];
            for _hop in 0..plan.max_hops {
                let mut extended: Vec<Beam> = Vec::new();
                for beam in &beams {
                    let Some(last) = beam.ids.last() else { continue };
                    let neighbors = self.graph.neighbors(last, 1, None).await?;
                    for neighbor in neighbors {
                        if beam.ids.contains(&neighbor.entity.id) {
                            continue;
                        }
                        let node_score = neighbor.via.confidence
                            * (neighbor.entity.occurrence.max(1) as f32).powf(0.25);
                        let mut ids = beam.ids.clone();
                        ids.push(neighbor.entity.id.clone());
                        let mut edges = beam.edges.clone();
                        edges.push(neighbor.via.clone());
                        extended.push(Beam { ids, edges, score: beam.score * node_score });
                    }
                }
                extended.sort_by(|a, b| {
                    b.score
                        .partial_cmp(&a.score)
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then_with(|| a.ids.cmp(&b.ids))
                });
                extended.truncate(self.settings.beam_width);
                candidates.extend(extended.iter().cloned());
                beams = extended;
                if beams.is_empty() {
                    break;
                }
            }
        }

        let mut seen: HashSet<Vec<String>> = HashSet::new();
        let mut paths = Vec::new();
        for beam in candidates {
            if beam.edges.is_empty() || !seen.insert(beam.ids.clone()) {
                continue;
            }
            let start = beam.ids[0].clone();
            paths.push(
                self.build_path(ReasoningKind::MultiHop, &start, beam.edges, Vec::new(), &mut cache)
                    .await,
            );
        }
        Ok(paths)
    }

    /// Chunk-only fallback: entity texts co-occurring in fused chunks.
    fn cooccurrence_fallback(
        &self,
        kind: ReasoningKind,
        plan: &QueryPlan,
        chunks: &[ScoredChunk],
    ) -> Vec<ReasoningPath> {
        let texts: Vec<&str> = plan.entities.iter().map(|e| e.text.as_str()).collect();
        let mut paths = Vec::new();
        for (i, a) in texts.iter().enumerate() {
            for b in texts.iter().skip(i + 1) {
                let evidence: Vec<String> = chunks
                    .iter()
                    .filter(|scored| {
                        let lowered = scored.chunk.text.to_lowercase();
                        lowered.contains(&a.to_lowercase()) && lowered.contains(&b.to_lowercase())
                    })
                    .map(|scored| scored.chunk.id.clone())
                    .collect();
                if evidence.is_empty() {
                    continue;
                }
                paths.push(ReasoningPath {
                    kind,
                    entities: vec![a.to_string(), b.to_string()],
                    edges: Vec::new(),
                    evidence_chunks: evidence,
                    confidence: 0.3,
                });
            }
        }
        paths.truncate(self.settings.max_paths);
        paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lattica_core::{
        entity_id, normalize_entity_name, Chunk, Complexity, Entity, MemoryGraphStore, Mention,
        QueryEntity, QueryIntent, QueryPlan, Relation,
    };

    async fn seed(graph: &MemoryGraphStore, name: &str, etype: &str, occurrence_hint: u64) -> String {
        let id = entity_id(&normalize_entity_name(name), etype);
        graph
            .upsert_entities(&[Entity {
                id: id.clone(),
                name: name.to_string(),
                entity_type: etype.to_string(),
                description: String::new(),
                aliases: Default::default(),
                domain: "general".to_string(),
                occurrence: occurrence_hint,
                confidence: 0.9,
            }])
            .await
            .unwrap();
        id
    }

    async fn connect(graph: &MemoryGraphStore, source: &str, target: &str, rtype: &str, conf: f32) {
        graph
            .upsert_relations(&[Relation {
                source_id: source.to_string(),
                target_id: target.to_string(),
                relation_type: rtype.to_string(),
                evidence: vec![],
                confidence: conf,
                weight: 1,
                domain: "general".to_string(),
            }])
            .await
            .unwrap();
    }

    fn plan_with(known: Vec<(String, String)>, max_hops: u8) -> QueryPlan {
        QueryPlan {
            intent: QueryIntent::Causal,
            complexity: Complexity::Medium,
            entities: known
                .into_iter()
                .map(|(text, id)| QueryEntity { text, entity_id: Some(id), known: true })
                .collect(),
            keywords: vec![],
            components: vec![],
            reasoning: None,
            max_hops,
            confidence: 0.9,
        }
    }

    fn engine(graph: Arc<MemoryGraphStore>) -> ReasoningEngine {
        ReasoningEngine::new(graph, ReasoningSettings::default())
    }

    #[tokio::test]
    async fn test_causal_chains_ranked_by_confidence() {
        let graph = Arc::new(MemoryGraphStore::new());
        let smoking = seed(&graph, "smoking", "factor", 5).await;
        let pollution = seed(&graph, "air pollution", "factor", 3).await;
        let cancer = seed(&graph, "lung cancer", "disease", 8).await;
        connect(&graph, &smoking, &cancer, "causes", 0.9).await;
        connect(&graph, &pollution, &cancer, "causes", 0.7).await;

        let plan = plan_with(vec![("lung cancer".to_string(), cancer.clone())], 2);
        let paths = engine(graph)
            .reason(ReasoningKind::Causal, &plan, &[])
            .await
            .paths;

        assert!(paths.len() >= 2, "both causal chains found");
        assert_eq!(paths[0].kind, ReasoningKind::Causal);
        assert!(
            paths[0].entities.contains(&"smoking".to_string()),
            "highest-confidence chain starts from smoking: {:?}",
            paths[0].entities
        );
        assert!(paths[0].confidence > paths[1].confidence);
    }

    #[tokio::test]
    async fn test_causal_ignores_non_causal_edges() {
        let graph = Arc::new(MemoryGraphStore::new());
        let a = seed(&graph, "alpha", "factor", 1).await;
        let b = seed(&graph, "beta", "disease", 1).await;
        connect(&graph, &a, &b, "related_to", 0.9).await;

        let plan = plan_with(vec![("beta".to_string(), b.clone())], 2);
        let paths = engine(graph).reason(ReasoningKind::Causal, &plan, &[]).await.paths;
        assert!(paths.is_empty(), "related_to is not in the causal set");
    }

    #[tokio::test]
    async fn test_direct_shortest_path_confidence() {
        let graph = Arc::new(MemoryGraphStore::new());
        let a = seed(&graph, "alice", "person", 1).await;
        let b = seed(&graph, "acme", "organization", 1).await;
        let c = seed(&graph, "paris", "location", 1).await;
        connect(&graph, &a, &b, "works_for", 0.8).await;
        connect(&graph, &b, &c, "headquartered_in", 0.9).await;

        let plan = plan_with(
            vec![("alice".to_string(), a.clone()), ("paris".to_string(), c.clone())],
            3,
        );
        let paths = engine(graph).reason(ReasoningKind::Direct, &plan, &[]).await.paths;
        assert_eq!(paths.len(), 1);
        let path = &paths[0];
        assert_eq!(path.entities, vec!["alice", "acme", "paris"]);
        assert_eq!(path.edges.len(), 2);
        let expected = 0.8 * 0.9 / 2.0;
        assert!((path.confidence - expected).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_comparative_overlap_and_evidence() {
        let graph = Arc::new(MemoryGraphStore::new());
        let a = seed(&graph, "supervised learning", "concept", 2).await;
        let b = seed(&graph, "unsupervised learning", "concept", 2).await;
        let shared = seed(&graph, "machine learning", "concept", 5).await;
        connect(&graph, &a, &shared, "part_of", 0.9).await;
        connect(&graph, &b, &shared, "part_of", 0.8).await;

        // A chunk mentioning both supports the comparison.
        graph
            .upsert_chunks(&[Chunk {
                id: "ml.txt::0".to_string(),
                document_id: "ml.txt".to_string(),
                ordinal: 0,
                text: "Supervised and unsupervised learning are both machine learning.".to_string(),
                section_path: vec![],
                page: None,
                domain: "general".to_string(),
                extra: Default::default(),
            }])
            .await
            .unwrap();
        graph
            .upsert_mentions(&[
                Mention { entity_id: a.clone(), chunk_id: "ml.txt::0".to_string(), span: None },
                Mention { entity_id: b.clone(), chunk_id: "ml.txt::0".to_string(), span: None },
            ])
            .await
            .unwrap();

        let plan = plan_with(
            vec![
                ("supervised learning".to_string(), a.clone()),
                ("unsupervised learning".to_string(), b.clone()),
            ],
            2,
        );
        let paths = engine(graph).reason(ReasoningKind::Comparative, &plan, &[]).await.paths;
        assert_eq!(paths.len(), 1);
        let path = &paths[0];
        assert!(path.entities.contains(&"machine learning".to_string()));
        assert!(path.confidence > 0.3, "shared neighborhood raises confidence");
        assert_eq!(path.evidence_chunks, vec!["ml.txt::0".to_string()]);
    }

    #[tokio::test]
    async fn test_multi_hop_beam_respects_limits() {
        let graph = Arc::new(MemoryGraphStore::new());
        let hub = seed(&graph, "hub", "concept", 10).await;
        // A star of 8 spokes, some chained one hop further.
        let mut spokes = Vec::new();
        for i in 0..8 {
            let spoke = seed(&graph, &format!("spoke {i}"), "concept", (i + 1) as u64).await;
            connect(&graph, &hub, &spoke, "related_to", 0.5 + 0.05 * i as f32).await;
            spokes.push(spoke);
        }
        let far = seed(&graph, "far node", "concept", 20).await;
        connect(&graph, &spokes[7], &far, "related_to", 0.9).await;

        let settings = ReasoningSettings::default();
        let plan = plan_with(vec![("hub".to_string(), hub.clone())], 2);
        let paths = engine(graph).reason(ReasoningKind::MultiHop, &plan, &[]).await.paths;

        assert!(!paths.is_empty());
        assert!(paths.len() <= settings.max_paths);
        for path in &paths {
            assert!(path.edges.len() <= 2, "paths bounded by max_hops");
            assert_eq!(path.kind, ReasoningKind::MultiHop);
        }
        // The strongest two-hop continuation is reachable through the beam.
        assert!(
            paths.iter().any(|p| p.entities.contains(&"far node".to_string())),
            "high-occurrence far node found via beam: {paths:?}"
        );
    }

    #[tokio::test]
    async fn test_fallback_on_graph_failure() {
        // External stub store fails every call.
        let graph: Arc<dyn GraphStore> = Arc::new(lattica_core::ExternalGraphStore::new("bolt://down"));
        let engine = ReasoningEngine::new(graph, ReasoningSettings::default());

        let chunk = Chunk {
            id: "d::0".to_string(),
            document_id: "d".to_string(),
            ordinal: 0,
            text: "Smoking causes lung cancer.".to_string(),
            section_path: vec![],
            page: None,
            domain: "general".to_string(),
            extra: Default::default(),
        };
        let fused = vec![ScoredChunk {
            chunk,
            score: 0.5,
            strategies: vec![],
            max_component_score: 0.5,
        }];
        let plan = QueryPlan {
            intent: QueryIntent::Causal,
            complexity: Complexity::Medium,
            entities: vec![
                QueryEntity { text: "smoking".to_string(), entity_id: None, known: false },
                QueryEntity { text: "lung cancer".to_string(), entity_id: None, known: false },
            ],
            keywords: vec![],
            components: vec![],
            reasoning: Some(ReasoningKind::Causal),
            max_hops: 2,
            confidence: 0.9,
        };
        let outcome = engine.reason(ReasoningKind::Causal, &plan, &fused).await;
        assert!(outcome.degraded);
        let paths = outcome.paths;
        assert_eq!(paths.len(), 1);
        assert!(paths[0].edges.is_empty(), "chunk-only path has no graph edges");
        assert_eq!(paths[0].evidence_chunks, vec!["d::0".to_string()]);
    }

    #[tokio::test]
    async fn test_no_known_entities_yields_no_paths() {
        let graph = Arc::new(MemoryGraphStore::new());
        let plan = plan_with(vec![], 2);
        for kind in [
            ReasoningKind::Direct,
            ReasoningKind::Causal,
            ReasoningKind::Comparative,
            ReasoningKind::MultiHop,
        ] {
            let paths = engine(graph.clone()).reason(kind, &plan, &[]).await.paths;
            assert!(paths.is_empty());
        }
    }
}
