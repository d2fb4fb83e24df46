//! Embedded in-memory store backends.
//!
//! These are the reference implementations of [`GraphStore`] and
//! [`VectorStore`]: the default backends in embedded mode and the semantics
//! every test runs against. State lives in `RwLock`-guarded maps with
//! deterministic (BTreeMap) iteration wherever ordering is observable.
//!
//! Occurrence accounting follows observed-once semantics: an entity's
//! occurrence is the number of distinct `(entity, chunk)` mention pairs the
//! store has seen. Re-submitting the same mention does not inflate it, and
//! deleting a document walks it back down, garbage-collecting entities that
//! reach zero.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crate::backends::{DocumentDeletion, GraphNeighbor, GraphStore, VectorHit, VectorStore};
use crate::error::{EngineError, EngineResult};
use crate::projection::{self, FilteredProjection, GraphFilter};
use crate::types::{
    Chunk, EmbeddingRecord, Entity, GraphStats, Mention, PathEdge, Relation,
};

#[derive(Default)]
struct GraphInner {
    chunks: BTreeMap<String, Chunk>,
    entities: BTreeMap<String, Entity>,
    /// Keyed by `(source_id, target_id, relation_type)`.
    relations: BTreeMap<(String, String, String), Relation>,
    /// Keyed by `(entity_id, chunk_id)` — observed once.
    mentions: BTreeMap<(String, String), Mention>,
}

/// Embedded graph store over in-memory maps.
#[derive(Default)]
pub struct MemoryGraphStore {
    inner: RwLock<GraphInner>,
}

impl MemoryGraphStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, GraphInner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, GraphInner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

fn type_matches(relation_type: &str, allowed: Option<&[String]>) -> bool {
    match allowed {
        None => true,
        Some(types) => types.iter().any(|t| t.eq_ignore_ascii_case(relation_type)),
    }
}

/// Undirected adjacency over the relation set: entity id → outgoing and
/// incoming edges, each keeping its original direction.
fn adjacency(inner: &GraphInner) -> HashMap<&str, Vec<&Relation>> {
    let mut adj: HashMap<&str, Vec<&Relation>> = HashMap::new();
    for rel in inner.relations.values() {
        adj.entry(rel.source_id.as_str()).or_default().push(rel);
        adj.entry(rel.target_id.as_str()).or_default().push(rel);
    }
    adj
}

fn edge_of(rel: &Relation) -> PathEdge {
    PathEdge {
        source_id: rel.source_id.clone(),
        target_id: rel.target_id.clone(),
        relation_type: rel.relation_type.clone(),
        confidence: rel.confidence,
    }
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    async fn upsert_chunks(&self, chunks: &[Chunk]) -> EngineResult<()> {
        for chunk in chunks {
            if chunk.text.is_empty() {
                return Err(EngineError::DataIntegrity(format!(
                    "chunk {} has empty text",
                    chunk.id
                )));
            }
        }
        let mut inner = self.write();
        for chunk in chunks {
            inner.chunks.insert(chunk.id.clone(), chunk.clone());
        }
        Ok(())
    }

    async fn get_chunk(&self, chunk_id: &str) -> EngineResult<Option<Chunk>> {
        Ok(self.read().chunks.get(chunk_id).cloned())
    }

    async fn chunks_for_document(&self, document_id: &str) -> EngineResult<Vec<Chunk>> {
        let mut chunks: Vec<Chunk> = self
            .read()
            .chunks
            .values()
            .filter(|c| c.document_id == document_id)
            .cloned()
            .collect();
        chunks.sort_by_key(|c| c.ordinal);
        Ok(chunks)
    }

    async fn all_chunks(&self) -> EngineResult<Vec<Chunk>> {
        Ok(self.read().chunks.values().cloned().collect())
    }

    async fn upsert_entities(&self, entities: &[Entity]) -> EngineResult<()> {
        let mut inner = self.write();
        for entity in entities {
            match inner.entities.get_mut(&entity.id) {
                Some(existing) => {
                    existing.aliases.extend(entity.aliases.iter().cloned());
                    if entity.name != existing.name {
                        existing.aliases.insert(entity.name.clone());
                    }
                    existing.confidence = existing.confidence.max(entity.confidence);
                    if entity.description.len() > existing.description.len() {
                        existing.description = entity.description.clone();
                    }
                }
                None => {
                    inner.entities.insert(entity.id.clone(), entity.clone());
                }
            }
        }
        Ok(())
    }

    async fn upsert_relations(&self, relations: &[Relation]) -> EngineResult<()> {
        for rel in relations {
            if rel.source_id == rel.target_id {
                return Err(EngineError::DataIntegrity(format!(
                    "self-referencing relation on entity {}",
                    rel.source_id
                )));
            }
        }
        let mut inner = self.write();
        for rel in relations {
            let key = (
                rel.source_id.clone(),
                rel.target_id.clone(),
                rel.relation_type.clone(),
            );
            match inner.relations.get_mut(&key) {
                Some(existing) => {
                    existing.weight += rel.weight.max(1);
                    existing.confidence = existing.confidence.max(rel.confidence);
                    for snippet in &rel.evidence {
                        if existing.evidence.len() >= Relation::EVIDENCE_CAP {
                            break;
                        }
                        if !existing.evidence.contains(snippet) {
                            existing.evidence.push(snippet.clone());
                        }
                    }
                }
                None => {
                    let mut fresh = rel.clone();
                    fresh.weight = fresh.weight.max(1);
                    fresh.evidence.truncate(Relation::EVIDENCE_CAP);
                    inner.relations.insert(key, fresh);
                }
            }
        }
        Ok(())
    }

    async fn upsert_mentions(&self, mentions: &[Mention]) -> EngineResult<()> {
        let mut inner = self.write();
        for mention in mentions {
            if !inner.entities.contains_key(&mention.entity_id) {
                return Err(EngineError::DataIntegrity(format!(
                    "mention references unknown entity {}",
                    mention.entity_id
                )));
            }
            let key = (mention.entity_id.clone(), mention.chunk_id.clone());
            if inner.mentions.contains_key(&key) {
                continue; // observed once
            }
            inner.mentions.insert(key, mention.clone());
            if let Some(entity) = inner.entities.get_mut(&mention.entity_id) {
                entity.occurrence += 1;
            }
        }
        Ok(())
    }

    async fn get_entity(&self, id: &str) -> EngineResult<Option<Entity>> {
        Ok(self.read().entities.get(id).cloned())
    }

    async fn find_entity(
        &self,
        normalized_name: &str,
        entity_type: Option<&str>,
    ) -> EngineResult<Option<Entity>> {
        let inner = self.read();
        Ok(inner
            .entities
            .values()
            .find(|e| {
                crate::types::normalize_entity_name(&e.name) == normalized_name
                    && entity_type.is_none_or(|t| e.entity_type == t)
            })
            .cloned())
    }

    async fn entity_names(&self, domain: Option<&str>) -> EngineResult<Vec<(String, String)>> {
        let inner = self.read();
        Ok(inner
            .entities
            .values()
            .filter(|e| domain.is_none_or(|d| e.domain == d))
            .map(|e| (crate::types::normalize_entity_name(&e.name), e.id.clone()))
            .collect())
    }

    async fn neighbors(
        &self,
        entity_id: &str,
        max_hops: u8,
        relation_types: Option<&[String]>,
    ) -> EngineResult<Vec<GraphNeighbor>> {
        let inner = self.read();
        if !inner.entities.contains_key(entity_id) {
            return Ok(Vec::new());
        }
        let adj = adjacency(&inner);
        let mut visited: HashSet<&str> = HashSet::from([entity_id]);
        let mut frontier: Vec<&str> = vec![entity_id];
        let mut found: Vec<GraphNeighbor> = Vec::new();

        for hop in 1..=max_hops {
            let mut next: Vec<&str> = Vec::new();
            for &node in &frontier {
                let Some(edges) = adj.get(node) else { continue };
                for rel in edges {
                    if !type_matches(&rel.relation_type, relation_types) {
                        continue;
                    }
                    let other = if rel.source_id == node {
                        rel.target_id.as_str()
                    } else {
                        rel.source_id.as_str()
                    };
                    if !visited.insert(other) {
                        continue;
                    }
                    if let Some(entity) = inner.entities.get(other) {
                        found.push(GraphNeighbor {
                            entity: entity.clone(),
                            hop,
                            via: edge_of(rel),
                        });
                        next.push(other);
                    }
                }
            }
            frontier = next;
            if frontier.is_empty() {
                break;
            }
        }
        Ok(found)
    }

    async fn shortest_path(
        &self,
        source_id: &str,
        target_id: &str,
        max_hops: u8,
        relation_types: Option<&[String]>,
    ) -> EngineResult<Option<Vec<PathEdge>>> {
        if source_id == target_id {
            return Ok(Some(Vec::new()));
        }
        let inner = self.read();
        if !inner.entities.contains_key(source_id) || !inner.entities.contains_key(target_id) {
            return Ok(None);
        }
        let adj = adjacency(&inner);
        let mut parents: HashMap<&str, (&str, &Relation)> = HashMap::new();
        let mut visited: HashSet<&str> = HashSet::from([source_id]);
        let mut queue: VecDeque<(&str, u8)> = VecDeque::from([(source_id, 0)]);

        while let Some((node, depth)) = queue.pop_front() {
            if depth >= max_hops {
                continue;
            }
            let Some(edges) = adj.get(node) else { continue };
            for rel in edges {
                if !type_matches(&rel.relation_type, relation_types) {
                    continue;
                }
                let other = if rel.source_id == node {
                    rel.target_id.as_str()
                } else {
                    rel.source_id.as_str()
                };
                if !visited.insert(other) {
                    continue;
                }
                parents.insert(other, (node, rel));
                if other == target_id {
                    // Walk back to the source.
                    let mut path = Vec::new();
                    let mut cursor = other;
                    while cursor != source_id {
                        let (prev, rel) = parents[cursor];
                        path.push(edge_of(rel));
                        cursor = prev;
                    }
                    path.reverse();
                    return Ok(Some(path));
                }
                queue.push_back((other, depth + 1));
            }
        }
        Ok(None)
    }

    async fn mentions_for_entities(&self, entity_ids: &[String]) -> EngineResult<Vec<Mention>> {
        let wanted: HashSet<&str> = entity_ids.iter().map(|s| s.as_str()).collect();
        Ok(self
            .read()
            .mentions
            .values()
            .filter(|m| wanted.contains(m.entity_id.as_str()))
            .cloned()
            .collect())
    }

    async fn top_entities(
        &self,
        domain: Option<&str>,
        entity_type: Option<&str>,
        limit: usize,
        min_occurrence: u64,
    ) -> EngineResult<Vec<Entity>> {
        let mut entities: Vec<Entity> = self
            .read()
            .entities
            .values()
            .filter(|e| domain.is_none_or(|d| e.domain == d))
            .filter(|e| entity_type.is_none_or(|t| e.entity_type == t))
            .filter(|e| e.occurrence >= min_occurrence)
            .cloned()
            .collect();
        entities.sort_by(|a, b| b.occurrence.cmp(&a.occurrence).then_with(|| a.name.cmp(&b.name)));
        entities.truncate(limit);
        Ok(entities)
    }

    async fn top_relations(
        &self,
        domain: Option<&str>,
        relation_type: Option<&str>,
        limit: usize,
        min_weight: u64,
    ) -> EngineResult<Vec<Relation>> {
        let mut relations: Vec<Relation> = self
            .read()
            .relations
            .values()
            .filter(|r| domain.is_none_or(|d| r.domain == d))
            .filter(|r| relation_type.is_none_or(|t| r.relation_type == t))
            .filter(|r| r.weight >= min_weight)
            .cloned()
            .collect();
        relations.sort_by(|a, b| {
            b.weight
                .cmp(&a.weight)
                .then_with(|| a.source_id.cmp(&b.source_id))
                .then_with(|| a.target_id.cmp(&b.target_id))
        });
        relations.truncate(limit);
        Ok(relations)
    }

    async fn filtered_projection(&self, filter: &GraphFilter) -> EngineResult<FilteredProjection> {
        let filter = filter.clone().validated()?;
        let (entities, relations) = {
            let inner = self.read();
            (
                inner.entities.values().cloned().collect::<Vec<_>>(),
                inner.relations.values().cloned().collect::<Vec<_>>(),
            )
        };
        Ok(projection::apply(entities, relations, &filter))
    }

    async fn delete_document(&self, document_id: &str) -> EngineResult<DocumentDeletion> {
        let mut inner = self.write();
        let chunk_ids: HashSet<String> = inner
            .chunks
            .values()
            .filter(|c| c.document_id == document_id)
            .map(|c| c.id.clone())
            .collect();
        if chunk_ids.is_empty() {
            return Ok(DocumentDeletion::default()); // idempotent
        }

        inner.chunks.retain(|id, _| !chunk_ids.contains(id));

        // Remove mentions into the deleted chunks, decrementing occurrences.
        let removed_mentions: Vec<(String, String)> = inner
            .mentions
            .keys()
            .filter(|(_, chunk_id)| chunk_ids.contains(chunk_id))
            .cloned()
            .collect();
        for key in &removed_mentions {
            inner.mentions.remove(key);
            if let Some(entity) = inner.entities.get_mut(&key.0) {
                entity.occurrence = entity.occurrence.saturating_sub(1);
            }
        }

        // Garbage-collect entities that no chunk mentions anymore.
        let dead: HashSet<String> = inner
            .entities
            .values()
            .filter(|e| e.occurrence == 0)
            .map(|e| e.id.clone())
            .collect();
        inner.entities.retain(|id, _| !dead.contains(id));
        let before = inner.relations.len();
        inner
            .relations
            .retain(|(src, tgt, _), _| !dead.contains(src) && !dead.contains(tgt));
        let removed_relations = before - inner.relations.len();

        Ok(DocumentDeletion {
            chunks: chunk_ids.len(),
            mentions: removed_mentions.len(),
            entities: dead.len(),
            relations: removed_relations,
        })
    }

    async fn stats(&self, domain: Option<&str>) -> EngineResult<GraphStats> {
        let inner = self.read();
        let mut stats = GraphStats::default();
        let domain_chunks: HashSet<&str> = inner
            .chunks
            .values()
            .filter(|c| domain.is_none_or(|d| c.domain == d))
            .map(|c| c.id.as_str())
            .collect();
        stats.chunk_count = domain_chunks.len() as u64;
        for entity in inner.entities.values() {
            if domain.is_none_or(|d| entity.domain == d) {
                stats.entity_count += 1;
                *stats.entity_types.entry(entity.entity_type.clone()).or_insert(0) += 1;
            }
        }
        for rel in inner.relations.values() {
            if domain.is_none_or(|d| rel.domain == d) {
                stats.relation_count += 1;
                *stats.relation_types.entry(rel.relation_type.clone()).or_insert(0) += 1;
            }
        }
        stats.mention_count = inner
            .mentions
            .values()
            .filter(|m| domain.is_none() || domain_chunks.contains(m.chunk_id.as_str()))
            .count() as u64;
        Ok(stats.with_density())
    }

    async fn domains(&self) -> EngineResult<Vec<String>> {
        let inner = self.read();
        let mut domains: BTreeSet<String> = inner.chunks.values().map(|c| c.domain.clone()).collect();
        domains.extend(inner.entities.values().map(|e| e.domain.clone()));
        Ok(domains.into_iter().collect())
    }

    async fn document_ids(&self) -> EngineResult<Vec<String>> {
        let docs: BTreeSet<String> = self
            .read()
            .chunks
            .values()
            .map(|c| c.document_id.clone())
            .collect();
        Ok(docs.into_iter().collect())
    }

    async fn clear(&self) -> EngineResult<()> {
        let mut inner = self.write();
        *inner = GraphInner::default();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Vector store
// ---------------------------------------------------------------------------

/// Embedded vector store with brute-force cosine k-NN.
pub struct MemoryVectorStore {
    dimension: usize,
    inner: RwLock<BTreeMap<String, EmbeddingRecord>>,
}

impl MemoryVectorStore {
    /// Create an empty collection with a fixed dimension.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            inner: RwLock::new(BTreeMap::new()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, EmbeddingRecord>> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, EmbeddingRecord>> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn upsert(&self, records: &[EmbeddingRecord]) -> EngineResult<()> {
        for record in records {
            if record.vector.len() != self.dimension {
                return Err(EngineError::DataIntegrity(format!(
                    "embedding dimension mismatch for chunk {}: expected {}, got {}",
                    record.chunk_id,
                    self.dimension,
                    record.vector.len()
                )));
            }
        }
        let mut inner = self.write();
        for record in records {
            inner.insert(record.chunk_id.clone(), record.clone());
        }
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        domain: Option<&str>,
    ) -> EngineResult<Vec<VectorHit>> {
        if vector.len() != self.dimension {
            return Err(EngineError::DataIntegrity(format!(
                "query dimension mismatch: expected {}, got {}",
                self.dimension,
                vector.len()
            )));
        }
        let mut hits: Vec<VectorHit> = self
            .read()
            .values()
            .filter(|r| domain.is_none_or(|d| r.payload.domain == d))
            .map(|r| VectorHit {
                chunk_id: r.chunk_id.clone(),
                // Map cosine [-1, 1] to the similarity contract [0, 1].
                similarity: ((cosine(vector, &r.vector) + 1.0) / 2.0).clamp(0.0, 1.0),
                payload: r.payload.clone(),
            })
            .collect();
        hits.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });
        hits.truncate(k);
        Ok(hits)
    }

    async fn delete_document(&self, document_id: &str) -> EngineResult<usize> {
        let mut inner = self.write();
        let before = inner.len();
        inner.retain(|_, r| r.payload.document_id != document_id);
        Ok(before - inner.len())
    }

    async fn count(&self) -> EngineResult<usize> {
        Ok(self.read().len())
    }

    async fn document_ids(&self) -> EngineResult<Vec<String>> {
        let docs: BTreeSet<String> = self
            .read()
            .values()
            .map(|r| r.payload.document_id.clone())
            .collect();
        Ok(docs.into_iter().collect())
    }

    async fn clear(&self) -> EngineResult<()> {
        self.write().clear();
        Ok(())
    }
}
