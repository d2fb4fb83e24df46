//! Query planning: intent classification, entity recognition, and strategy
//! weighting.
//!
//! Classification is rule-first: a small pattern table per intent, with an
//! optional LLM fallback when the rules are unsure (confidence < 0.6) and a
//! collaborator is available. Planning is read-only — it consults the
//! knowledge graph to promote recognized entities to "known" but never
//! writes.
//!
//! Strategy weights start from a per-intent table and are adjusted by two
//! rules: two or more known graph entities shift 0.1 from vector to graph;
//! zero known entities drop the graph strategy and renormalize the rest.

use std::sync::Arc;

use tracing::{debug, warn};

use lattica_core::{
    normalize_entity_name, tokenize, Complexity, EngineError, EngineResult, GraphStore, QueryEntity,
    QueryIntent, QueryPlan, ReasoningKind, StrategyComponent, StrategyKind,
};

use crate::{LlmCollaborator, NerCollaborator};

/// Fuzzy similarity above which a query phrase matches a graph entity.
pub const KNOWN_ENTITY_THRESHOLD: f32 = 0.9;

const COMPARATIVE_PATTERNS: &[&str] = &[
    "compare", " vs ", " vs.", "versus", "difference between", "differences between",
    "similarities between", "better than", "worse than",
];
const CAUSAL_PATTERNS: &[&str] = &[
    "why", "cause", "caused", "causes", "because", "reason for", "reasons for", "lead to",
    "leads to", "led to", "result of", "results of", "effect of", "effects of", "affect",
];
const PROCEDURAL_PATTERNS: &[&str] = &[
    "how to", "how do i", "how can i", "step by step", "steps to", "procedure", "process for",
    "guide to", "instructions for",
];
const TEMPORAL_PATTERNS: &[&str] = &[
    "when", "before", "after", "timeline", "during", "history of", "chronology",
    "sequence of events", "first", "latest",
];
const ANALYTICAL_PATTERNS: &[&str] = &[
    "analyze", "analyse", "explain", "describe", "relationship between", "related to",
    "relate to", "connection between", "connections between", "what connects", "path from",
    "how does", "how are", "impact of",
];

/// Per-intent pattern table, in tie-break priority order.
const INTENT_TABLE: &[(QueryIntent, &[&str])] = &[
    (QueryIntent::Comparative, COMPARATIVE_PATTERNS),
    (QueryIntent::Causal, CAUSAL_PATTERNS),
    (QueryIntent::Procedural, PROCEDURAL_PATTERNS),
    (QueryIntent::Temporal, TEMPORAL_PATTERNS),
    (QueryIntent::Analytical, ANALYTICAL_PATTERNS),
];

/// Base strategy profile for an intent: `(vector, graph, keyword, reasoning)`.
pub fn strategy_profile(intent: QueryIntent) -> (f32, f32, f32, Option<ReasoningKind>) {
    match intent {
        QueryIntent::Factual => (0.6, 0.25, 0.15, None),
        QueryIntent::Comparative => (0.35, 0.45, 0.20, Some(ReasoningKind::Comparative)),
        QueryIntent::Causal => (0.25, 0.55, 0.20, Some(ReasoningKind::Causal)),
        QueryIntent::Analytical => (0.50, 0.35, 0.15, Some(ReasoningKind::MultiHop)),
        QueryIntent::Temporal => (0.40, 0.40, 0.20, Some(ReasoningKind::MultiHop)),
        QueryIntent::Procedural => (0.55, 0.25, 0.20, None),
    }
}

/// Base strategy components for an intent, ordered by weight descending.
pub fn base_components(intent: QueryIntent) -> Vec<StrategyComponent> {
    let (vector, graph, keyword, _) = strategy_profile(intent);
    let mut components = vec![
        StrategyComponent { kind: StrategyKind::Vector, weight: vector },
        StrategyComponent { kind: StrategyKind::Graph, weight: graph },
        StrategyComponent { kind: StrategyKind::Keyword, weight: keyword },
    ];
    components.sort_by(|a, b| {
        b.weight.partial_cmp(&a.weight).unwrap_or(std::cmp::Ordering::Equal)
    });
    components
}

/// Rule-based intent classification: `(intent, per-intent matches, total)`.
fn classify_by_rules(query: &str) -> (QueryIntent, Vec<(QueryIntent, usize)>, usize) {
    let lowered = query.to_lowercase();
    let mut counts: Vec<(QueryIntent, usize)> = Vec::new();
    let mut total = 0usize;
    for (intent, patterns) in INTENT_TABLE {
        let count = patterns.iter().filter(|p| lowered.contains(*p)).count();
        counts.push((*intent, count));
        total += count;
    }
    // Ties go to the earliest-listed intent, so replace only on a strictly
    // greater count.
    let mut best = QueryIntent::Factual;
    let mut best_count = 0usize;
    for (intent, count) in &counts {
        if *count > best_count {
            best = *intent;
            best_count = *count;
        }
    }
    (best, counts, total)
}

/// Extract candidate entity phrases from intent-specific query shapes
/// ("between X and Y", "compare X and Y", "what causes X", …).
fn phrase_candidates(query: &str) -> Vec<String> {
    let lowered = query.to_lowercase();
    let mut candidates = Vec::new();

    let tail_after = |marker: &str| -> Option<String> {
        lowered.find(marker).map(|at| {
            lowered[at + marker.len()..]
                .trim()
                .trim_end_matches(['?', '.', '!'])
                .to_string()
        })
    };

    for marker in ["between ", "compare "] {
        if let Some(tail) = tail_after(marker) {
            for part in tail.split(" and ").flat_map(|p| p.split(" vs ")) {
                candidates.push(part.trim().to_string());
            }
        }
    }
    if candidates.is_empty() {
        if let Some(at) = lowered.find(" vs ") {
            candidates.push(lowered[..at].trim().to_string());
            candidates.push(
                lowered[at + 4..].trim().trim_end_matches(['?', '.', '!']).to_string(),
            );
        }
    }
    for marker in ["what causes ", "causes of ", "what leads to ", "effects of ", "effect of "] {
        if let Some(tail) = tail_after(marker) {
            candidates.push(tail);
        }
    }

    candidates
        .into_iter()
        .map(|c| c.trim().to_string())
        .filter(|c| c.len() >= 3)
        .collect()
}

const CLASSIFY_SYSTEM_PROMPT: &str = "Classify the intent of a search query. Respond with \
exactly one word out of: FACTUAL, COMPARATIVE, CAUSAL, ANALYTICAL, TEMPORAL, PROCEDURAL.";

fn parse_intent_word(raw: &str) -> Option<QueryIntent> {
    match raw.trim().to_uppercase().split_whitespace().next()? {
        "FACTUAL" => Some(QueryIntent::Factual),
        "COMPARATIVE" => Some(QueryIntent::Comparative),
        "CAUSAL" => Some(QueryIntent::Causal),
        "ANALYTICAL" => Some(QueryIntent::Analytical),
        "TEMPORAL" => Some(QueryIntent::Temporal),
        "PROCEDURAL" => Some(QueryIntent::Procedural),
        _ => None,
    }
}

/// The query planner. Pure: same query + same graph vocabulary → same plan.
pub struct QueryPlanner {
    graph: Arc<dyn GraphStore>,
    ner: Arc<dyn NerCollaborator>,
    llm: Option<Arc<dyn LlmCollaborator>>,
}

impl QueryPlanner {
    /// Create a planner. Pass `llm: None` to disable the classification
    /// fallback (rules still work offline).
    pub fn new(
        graph: Arc<dyn GraphStore>,
        ner: Arc<dyn NerCollaborator>,
        llm: Option<Arc<dyn LlmCollaborator>>,
    ) -> Self {
        Self { graph, ner, llm }
    }

    /// Produce a [`QueryPlan`] for a query.
    pub async fn plan(&self, query: &str) -> EngineResult<QueryPlan> {
        if query.trim().is_empty() {
            return Err(EngineError::InvalidInput("query must not be empty".into()));
        }

        // ── Intent ────────────────────────────────────────────────────
        let (mut intent, counts, total_matches) = classify_by_rules(query);
        let mut confidence = match total_matches {
            0 => 0.5,
            1 => 0.75,
            _ => 0.9,
        };
        if confidence < 0.6 {
            if let Some(llm) = &self.llm {
                match llm.complete(CLASSIFY_SYSTEM_PROMPT, query).await {
                    Ok(raw) => {
                        if let Some(llm_intent) = parse_intent_word(&raw) {
                            intent = llm_intent;
                            confidence = 0.7;
                        }
                    }
                    Err(err) => {
                        warn!(error = %err, "llm intent fallback failed, keeping rule result");
                    }
                }
            }
        }

        // ── Entities ──────────────────────────────────────────────────
        let entities = self.recognize_entities(query).await;
        let known_count = entities.iter().filter(|e| e.known).count();

        // ── Strategy weights ──────────────────────────────────────────
        let mut components = base_components(intent);
        if known_count >= 2 {
            // Shift 0.1 from vector to graph.
            for component in &mut components {
                match component.kind {
                    StrategyKind::Vector => component.weight = (component.weight - 0.1).max(0.0),
                    StrategyKind::Graph => component.weight += 0.1,
                    StrategyKind::Keyword => {}
                }
            }
        }
        if known_count == 0 {
            components.retain(|c| c.kind != StrategyKind::Graph);
        }
        let sum: f32 = components.iter().map(|c| c.weight).sum();
        if sum > 0.0 {
            for component in &mut components {
                component.weight /= sum;
            }
        }
        components.sort_by(|a, b| {
            b.weight
                .partial_cmp(&a.weight)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.kind.cmp(&b.kind))
        });

        let (_, _, _, reasoning) = strategy_profile(intent);

        // ── Complexity ────────────────────────────────────────────────
        let causal_matched = counts
            .iter()
            .any(|(i, c)| *i == QueryIntent::Causal && *c > 0);
        let multi_hop_matched = counts
            .iter()
            .any(|(i, c)| *i == QueryIntent::Analytical && *c > 0);
        let complexity = if known_count >= 3 || (causal_matched && multi_hop_matched) {
            Complexity::High
        } else if known_count >= 1 || total_matches >= 2 {
            Complexity::Medium
        } else {
            Complexity::Low
        };
        let max_hops = match complexity {
            Complexity::Low => 1,
            Complexity::Medium => 2,
            Complexity::High => 3,
        };

        let keywords: Vec<String> = {
            let mut seen = std::collections::HashSet::new();
            tokenize(query)
                .into_iter()
                .filter(|t| t.len() > 3)
                .filter(|t| seen.insert(t.clone()))
                .collect()
        };

        let plan = QueryPlan {
            intent,
            complexity,
            entities,
            keywords,
            components,
            reasoning,
            max_hops,
            confidence,
        };
        debug!(
            intent = ?plan.intent,
            complexity = ?plan.complexity,
            known = known_count,
            components = plan.components.len(),
            "query planned"
        );
        Ok(plan)
    }

    /// Recognize query entities: NER spans plus phrase heuristics, then
    /// dedup against the knowledge graph (exact, then fuzzy ≥ 0.9).
    async fn recognize_entities(&self, query: &str) -> Vec<QueryEntity> {
        let mut candidates: Vec<String> = Vec::new();
        match self.ner.extract_entities(query).await {
            Ok(spans) => candidates.extend(spans.into_iter().map(|s| s.text)),
            Err(err) => warn!(error = %err, "query NER failed, using phrase heuristics only"),
        }
        candidates.extend(phrase_candidates(query));

        // Dedup by normalized form, preserving first-seen order.
        let mut seen = std::collections::HashSet::new();
        let mut entities = Vec::new();
        let vocabulary = self.graph.entity_names(None).await.unwrap_or_default();
        for candidate in candidates {
            let normalized = normalize_entity_name(&candidate);
            if normalized.len() < 3 || !seen.insert(normalized.clone()) {
                continue;
            }
            let exact = self
                .graph
                .find_entity(&normalized, None)
                .await
                .ok()
                .flatten()
                .map(|e| e.id);
            let matched = match exact {
                Some(id) => Some(id),
                None => vocabulary
                    .iter()
                    .filter(|(name, _)| {
                        crate::resolution::fuzzy_ratio(&normalized, name)
                            >= KNOWN_ENTITY_THRESHOLD
                    })
                    .map(|(_, id)| id.clone())
                    .next(),
            };
            entities.push(QueryEntity {
                text: candidate,
                known: matched.is_some(),
                entity_id: matched,
            });
        }
        entities
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use lattica_core::{Entity, MemoryGraphStore};

    use crate::ner::HeuristicNer;

    fn planner(graph: Arc<MemoryGraphStore>) -> QueryPlanner {
        QueryPlanner::new(graph, Arc::new(HeuristicNer::new()), None)
    }

    async fn seed_entity(graph: &MemoryGraphStore, name: &str, etype: &str) -> String {
        let normalized = normalize_entity_name(name);
        let id = lattica_core::entity_id(&normalized, etype);
        let entity = Entity {
            id: id.clone(),
            name: name.to_string(),
            entity_type: etype.to_string(),
            description: String::new(),
            aliases: Default::default(),
            domain: "general".to_string(),
            occurrence: 1,
            confidence: 0.9,
        };
        graph.upsert_entities(&[entity]).await.unwrap();
        id
    }

    #[tokio::test]
    async fn test_comparative_intent() {
        let graph = Arc::new(MemoryGraphStore::new());
        let plan = planner(graph)
            .plan("Compare supervised and unsupervised learning")
            .await
            .unwrap();
        assert_eq!(plan.intent, QueryIntent::Comparative);
        assert_eq!(plan.reasoning, Some(ReasoningKind::Comparative));
        let texts: Vec<&str> = plan.entities.iter().map(|e| e.text.as_str()).collect();
        assert!(texts.iter().any(|t| t.contains("supervised")));
        assert!(texts.iter().any(|t| t.contains("unsupervised")));
    }

    #[tokio::test]
    async fn test_tied_pattern_counts_prefer_priority_order() {
        let graph = Arc::new(MemoryGraphStore::new());
        // One causal cue ("why") and one comparative cue ("compare"):
        // comparative is listed first and must win the tie.
        let plan = planner(graph)
            .plan("Why compare apples and oranges?")
            .await
            .unwrap();
        assert_eq!(plan.intent, QueryIntent::Comparative);
    }

    #[tokio::test]
    async fn test_causal_intent() {
        let graph = Arc::new(MemoryGraphStore::new());
        let plan = planner(graph).plan("What causes lung cancer?").await.unwrap();
        assert_eq!(plan.intent, QueryIntent::Causal);
        assert_eq!(plan.reasoning, Some(ReasoningKind::Causal));
        assert!(plan.entities.iter().any(|e| e.text.contains("lung cancer")));
    }

    #[tokio::test]
    async fn test_procedural_and_temporal_intents() {
        let graph = Arc::new(MemoryGraphStore::new());
        let plan = planner(graph.clone())
            .plan("How to configure the ingestion pipeline step by step")
            .await
            .unwrap();
        assert_eq!(plan.intent, QueryIntent::Procedural);
        assert!(plan.reasoning.is_none());

        let plan = planner(graph)
            .plan("Show the timeline of releases")
            .await
            .unwrap();
        assert_eq!(plan.intent, QueryIntent::Temporal);
    }

    #[tokio::test]
    async fn test_default_factual() {
        let graph = Arc::new(MemoryGraphStore::new());
        let plan = planner(graph).plan("capital of France").await.unwrap();
        assert_eq!(plan.intent, QueryIntent::Factual);
        assert!(plan.confidence <= 0.6, "no pattern matched, low confidence");
    }

    #[tokio::test]
    async fn test_no_known_entities_drops_graph_and_renormalizes() {
        let graph = Arc::new(MemoryGraphStore::new());
        let plan = planner(graph).plan("Why does rust prevent data races?").await.unwrap();
        assert!(plan.components.iter().all(|c| c.kind != StrategyKind::Graph));
        let sum: f32 = plan.components.iter().map(|c| c.weight).sum();
        assert!((sum - 1.0).abs() < 1e-5, "weights renormalized to 1, got {sum}");
    }

    #[tokio::test]
    async fn test_two_known_entities_shift_weight_to_graph() {
        let graph = Arc::new(MemoryGraphStore::new());
        seed_entity(&graph, "Acme", "organization").await;
        seed_entity(&graph, "Paris", "location").await;
        let plan = planner(graph)
            .plan("Is Acme headquartered in Paris?")
            .await
            .unwrap();
        let known: usize = plan.entities.iter().filter(|e| e.known).count();
        assert_eq!(known, 2);
        // FACTUAL base is (0.6, 0.25, 0.15); the shift makes graph 0.35.
        assert!((plan.weight_of(StrategyKind::Graph) - 0.35).abs() < 1e-5);
        assert!((plan.weight_of(StrategyKind::Vector) - 0.5).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_known_entity_resolves_id() {
        let graph = Arc::new(MemoryGraphStore::new());
        let id = seed_entity(&graph, "Acme", "organization").await;
        let plan = planner(graph).plan("Where is Acme located?").await.unwrap();
        let acme = plan.entities.iter().find(|e| e.text == "Acme").unwrap();
        assert!(acme.known);
        assert_eq!(acme.entity_id.as_deref(), Some(id.as_str()));
    }

    #[tokio::test]
    async fn test_fuzzy_promotion_to_known() {
        let graph = Arc::new(MemoryGraphStore::new());
        seed_entity(&graph, "Kubernetes", "concept").await;
        // One trailing typo: distance 1 over 11 chars ≈ 0.91 similarity.
        let plan = planner(graph).plan("Tell me about Kubernetess").await.unwrap();
        assert!(plan.entities.iter().any(|e| e.known), "fuzzy match promotes to known");
    }

    #[tokio::test]
    async fn test_complexity_tiers_and_max_hops() {
        let graph = Arc::new(MemoryGraphStore::new());
        let low = planner(graph.clone()).plan("capital of France").await.unwrap();
        assert_eq!(low.complexity, Complexity::Low);
        assert_eq!(low.max_hops, 1);

        seed_entity(&graph, "Acme", "organization").await;
        let medium = planner(graph.clone())
            .plan("Where is Acme located?")
            .await
            .unwrap();
        assert_eq!(medium.complexity, Complexity::Medium);
        assert_eq!(medium.max_hops, 2);

        let high = planner(graph)
            .plan("Explain why Alice, Acme and Paris are related")
            .await
            .unwrap();
        assert_eq!(high.complexity, Complexity::High);
        assert_eq!(high.max_hops, 3);
    }

    #[tokio::test]
    async fn test_keywords_filtered() {
        let graph = Arc::new(MemoryGraphStore::new());
        let plan = planner(graph).plan("Where is the Acme factory located?").await.unwrap();
        assert!(plan.keywords.contains(&"acme".to_string()));
        assert!(plan.keywords.contains(&"factory".to_string()));
        assert!(plan.keywords.contains(&"located".to_string()));
        assert!(!plan.keywords.contains(&"the".to_string()));
        assert!(!plan.keywords.contains(&"where".to_string()));
    }

    #[tokio::test]
    async fn test_empty_query_invalid() {
        let graph = Arc::new(MemoryGraphStore::new());
        let err = planner(graph).plan("   ").await.unwrap_err();
        assert_eq!(err.kind(), lattica_core::ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn test_plan_is_deterministic() {
        let graph = Arc::new(MemoryGraphStore::new());
        seed_entity(&graph, "Acme", "organization").await;
        let planner = planner(graph);
        let a = planner.plan("Where is Acme located?").await.unwrap();
        let b = planner.plan("Where is Acme located?").await.unwrap();
        assert_eq!(a, b);
    }

    struct CannedLlm(&'static str);

    #[async_trait]
    impl LlmCollaborator for CannedLlm {
        async fn complete(&self, _system: &str, _prompt: &str) -> EngineResult<String> {
            Ok(self.0.to_string())
        }
    }

    #[tokio::test]
    async fn test_llm_fallback_on_low_confidence() {
        let graph = Arc::new(MemoryGraphStore::new());
        let planner = QueryPlanner::new(
            graph,
            Arc::new(HeuristicNer::new()),
            Some(Arc::new(CannedLlm("TEMPORAL"))),
        );
        // No rule pattern matches, so the LLM fallback decides.
        let plan = planner.plan("capital of France").await.unwrap();
        assert_eq!(plan.intent, QueryIntent::Temporal);
        assert!((plan.confidence - 0.7).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_llm_not_consulted_when_rules_are_confident() {
        let graph = Arc::new(MemoryGraphStore::new());
        let planner = QueryPlanner::new(
            graph,
            Arc::new(HeuristicNer::new()),
            Some(Arc::new(CannedLlm("TEMPORAL"))),
        );
        let plan = planner.plan("Compare apples and oranges").await.unwrap();
        assert_eq!(plan.intent, QueryIntent::Comparative, "rules win when confident");
    }

    #[test]
    fn test_strategy_profile_table() {
        let (v, g, k, r) = strategy_profile(QueryIntent::Causal);
        assert_eq!((v, g, k), (0.25, 0.55, 0.20));
        assert_eq!(r, Some(ReasoningKind::Causal));
        let (v, g, _, _) = strategy_profile(QueryIntent::Comparative);
        assert!(g >= v, "comparative weighs graph at least as much as vector");
        for intent in [
            QueryIntent::Factual,
            QueryIntent::Comparative,
            QueryIntent::Causal,
            QueryIntent::Analytical,
            QueryIntent::Temporal,
            QueryIntent::Procedural,
        ] {
            let (v, g, k, _) = strategy_profile(intent);
            assert!((v + g + k - 1.0).abs() < 1e-6, "weights sum to 1 for {intent:?}");
        }
    }
}
