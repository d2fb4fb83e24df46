//! Pluggable store traits for the retrieval engine.
//!
//! Defines the [`GraphStore`] and [`VectorStore`] traits that decouple the
//! knowledge graph from vector search, enabling independent backend selection
//! via configuration. The [`StoreRegistry`] holds the instantiated backends
//! and is the single entry point for all storage operations.
//!
//! Two families of implementations exist:
//! - Embedded in-memory backends ([`crate::memory`]), the default and the
//!   reference semantics every test runs against.
//! - External stubs ([`ExternalGraphStore`], [`ExternalVectorStore`]) that
//!   carry the configured service URL and fail with `permanent_dependency`
//!   until wired to a real deployment.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{EngineError, EngineResult};
use crate::projection::{FilteredProjection, GraphFilter};
use crate::types::{
    Chunk, EmbeddingPayload, EmbeddingRecord, Entity, GraphStats, Mention, PathEdge, Relation,
};

/// An entity reached by graph expansion, with the hop distance and the edge
/// it was reached through.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphNeighbor {
    /// The reached entity.
    pub entity: Entity,
    /// Hop distance from the expansion seed (1-based).
    pub hop: u8,
    /// The edge traversed to reach it.
    pub via: PathEdge,
}

/// Counts removed by a document delete.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentDeletion {
    /// Chunks removed.
    pub chunks: usize,
    /// Mention edges removed.
    pub mentions: usize,
    /// Entities garbage-collected (occurrence reached zero).
    pub entities: usize,
    /// Relations removed along with collected entities.
    pub relations: usize,
}

/// A k-NN hit from the vector store.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    /// Matched chunk.
    pub chunk_id: String,
    /// Similarity in `[0, 1]`, higher is closer.
    pub similarity: f32,
    /// Stored payload.
    pub payload: EmbeddingPayload,
}

/// Store for the knowledge graph: labeled chunk/entity nodes, typed relation
/// edges, and mention edges linking entities to the chunks they occur in.
///
/// The graph store is the system of record for chunk text. All upserts are
/// idempotent and merging; all reads are safe for concurrent use.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Insert or replace chunks. Replacing an existing chunk id is a no-op
    /// for identical content (chunks are immutable once written).
    async fn upsert_chunks(&self, chunks: &[Chunk]) -> EngineResult<()>;

    /// Fetch a chunk by id.
    async fn get_chunk(&self, chunk_id: &str) -> EngineResult<Option<Chunk>>;

    /// All chunks of a document, ordered by ordinal.
    async fn chunks_for_document(&self, document_id: &str) -> EngineResult<Vec<Chunk>>;

    /// Every stored chunk. Used to rebuild in-process indexes at startup;
    /// expensive on large graphs.
    async fn all_chunks(&self) -> EngineResult<Vec<Chunk>>;

    /// Insert or merge entities. Merging an existing id unions aliases and
    /// keeps the max confidence; `occurrence` is never altered here — it is
    /// maintained exclusively by [`GraphStore::upsert_mentions`] observing
    /// each `(entity, chunk)` pair once.
    async fn upsert_entities(&self, entities: &[Entity]) -> EngineResult<()>;

    /// Insert or merge relations keyed by `(source, target, type)`. Merging
    /// adds weight, appends evidence up to the cap, and keeps max confidence.
    async fn upsert_relations(&self, relations: &[Relation]) -> EngineResult<()>;

    /// Record mention edges. A given `(entity, chunk)` pair is observed once;
    /// duplicates are ignored.
    async fn upsert_mentions(&self, mentions: &[Mention]) -> EngineResult<()>;

    /// Fetch an entity by id.
    async fn get_entity(&self, id: &str) -> EngineResult<Option<Entity>>;

    /// Look up an entity by normalized name, optionally constrained to a type.
    async fn find_entity(
        &self,
        normalized_name: &str,
        entity_type: Option<&str>,
    ) -> EngineResult<Option<Entity>>;

    /// `(normalized_name, id)` pairs for every entity, optionally scoped to a
    /// domain. Used by the planner's fuzzy known-entity match.
    async fn entity_names(&self, domain: Option<&str>) -> EngineResult<Vec<(String, String)>>;

    /// Entities reachable within `max_hops` of `entity_id`, traversing edges
    /// in both directions, optionally restricted to the given relation types.
    /// Each entity is reported once at its minimum hop distance.
    async fn neighbors(
        &self,
        entity_id: &str,
        max_hops: u8,
        relation_types: Option<&[String]>,
    ) -> EngineResult<Vec<GraphNeighbor>>;

    /// Shortest path between two entities, up to `max_hops` edges, optionally
    /// restricted to the given relation types. `None` when unreachable.
    async fn shortest_path(
        &self,
        source_id: &str,
        target_id: &str,
        max_hops: u8,
        relation_types: Option<&[String]>,
    ) -> EngineResult<Option<Vec<PathEdge>>>;

    /// Mention edges for the given entities (graph→chunk pivot).
    async fn mentions_for_entities(&self, entity_ids: &[String]) -> EngineResult<Vec<Mention>>;

    /// Top entities by occurrence, filtered by domain/type/min occurrence.
    async fn top_entities(
        &self,
        domain: Option<&str>,
        entity_type: Option<&str>,
        limit: usize,
        min_occurrence: u64,
    ) -> EngineResult<Vec<Entity>>;

    /// Top relations by weight, filtered by domain/type/min weight.
    async fn top_relations(
        &self,
        domain: Option<&str>,
        relation_type: Option<&str>,
        limit: usize,
        min_weight: u64,
    ) -> EngineResult<Vec<Relation>>;

    /// Bounded, filtered subgraph for export and UI loading.
    async fn filtered_projection(&self, filter: &GraphFilter) -> EngineResult<FilteredProjection>;

    /// Remove a document: its chunks and mentions go away, mentioned entities
    /// lose occurrence, and entities reaching zero are collected together
    /// with their relations. Idempotent.
    async fn delete_document(&self, document_id: &str) -> EngineResult<DocumentDeletion>;

    /// Counts, type histograms, and density, optionally scoped to a domain.
    async fn stats(&self, domain: Option<&str>) -> EngineResult<GraphStats>;

    /// Distinct domains present in the graph, sorted.
    async fn domains(&self) -> EngineResult<Vec<String>>;

    /// Distinct document ids present in the graph, sorted.
    async fn document_ids(&self) -> EngineResult<Vec<String>>;

    /// Remove everything. Idempotent.
    async fn clear(&self) -> EngineResult<()>;
}

/// Store for chunk embeddings with k-NN similarity search.
///
/// One embedding per chunk; the dimension is fixed at collection creation
/// and enforced on every write and query.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// The fixed embedding dimension of this collection.
    fn dimension(&self) -> usize;

    /// Insert or replace embeddings. Dimension mismatches abort with
    /// `data_integrity` before anything is written.
    async fn upsert(&self, records: &[EmbeddingRecord]) -> EngineResult<()>;

    /// k-NN query. Results are sorted by similarity descending, ties by
    /// chunk id ascending. `domain` filters on the stored payload.
    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        domain: Option<&str>,
    ) -> EngineResult<Vec<VectorHit>>;

    /// Remove all embeddings of a document; returns how many were removed.
    async fn delete_document(&self, document_id: &str) -> EngineResult<usize>;

    /// Number of stored embeddings.
    async fn count(&self) -> EngineResult<usize>;

    /// Distinct document ids present in the store, sorted.
    async fn document_ids(&self) -> EngineResult<Vec<String>>;

    /// Remove everything. Idempotent.
    async fn clear(&self) -> EngineResult<()>;
}

/// Holds the instantiated stores for the storage layer.
///
/// The registry is constructed once at startup from configuration and passed
/// through a request-scoped context; no component reaches for a global
/// client.
#[derive(Clone)]
pub struct StoreRegistry {
    graph: Arc<dyn GraphStore>,
    vector: Arc<dyn VectorStore>,
}

impl StoreRegistry {
    /// Create a registry from instantiated backends.
    pub fn new(graph: Arc<dyn GraphStore>, vector: Arc<dyn VectorStore>) -> Self {
        Self { graph, vector }
    }

    /// Access the graph store.
    pub fn graph(&self) -> &dyn GraphStore {
        self.graph.as_ref()
    }

    /// Access the vector store.
    pub fn vector(&self) -> &dyn VectorStore {
        self.vector.as_ref()
    }
}

// ---------------------------------------------------------------------------
// External service stubs
// ---------------------------------------------------------------------------

fn external_unavailable(url: &str) -> EngineError {
    EngineError::PermanentDependency(format!(
        "external store at {url} is not wired in this build — configure stores.mode = \"embedded\""
    ))
}

/// Stub for an external labeled-property graph service.
///
/// Carries the configured URL; every operation fails with
/// `permanent_dependency` until a real client is implemented.
pub struct ExternalGraphStore {
    /// Service URL (e.g. `bolt://localhost:7687`).
    pub url: String,
}

impl ExternalGraphStore {
    /// Create a new external graph store stub.
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl GraphStore for ExternalGraphStore {
    async fn upsert_chunks(&self, _chunks: &[Chunk]) -> EngineResult<()> {
        Err(external_unavailable(&self.url))
    }
    async fn get_chunk(&self, _chunk_id: &str) -> EngineResult<Option<Chunk>> {
        Err(external_unavailable(&self.url))
    }
    async fn chunks_for_document(&self, _document_id: &str) -> EngineResult<Vec<Chunk>> {
        Err(external_unavailable(&self.url))
    }
    async fn all_chunks(&self) -> EngineResult<Vec<Chunk>> {
        Err(external_unavailable(&self.url))
    }
    async fn upsert_entities(&self, _entities: &[Entity]) -> EngineResult<()> {
        Err(external_unavailable(&self.url))
    }
    async fn upsert_relations(&self, _relations: &[Relation]) -> EngineResult<()> {
        Err(external_unavailable(&self.url))
    }
    async fn upsert_mentions(&self, _mentions: &[Mention]) -> EngineResult<()> {
        Err(external_unavailable(&self.url))
    }
    async fn get_entity(&self, _id: &str) -> EngineResult<Option<Entity>> {
        Err(external_unavailable(&self.url))
    }
    async fn find_entity(
        &self,
        _normalized_name: &str,
        _entity_type: Option<&str>,
    ) -> EngineResult<Option<Entity>> {
        Err(external_unavailable(&self.url))
    }
    async fn entity_names(&self, _domain: Option<&str>) -> EngineResult<Vec<(String, String)>> {
        Err(external_unavailable(&self.url))
    }
    async fn neighbors(
        &self,
        _entity_id: &str,
        _max_hops: u8,
        _relation_types: Option<&[String]>,
    ) -> EngineResult<Vec<GraphNeighbor>> {
        Err(external_unavailable(&self.url))
    }
    async fn shortest_path(
        &self,
        _source_id: &str,
        _target_id: &str,
        _max_hops: u8,
        _relation_types: Option<&[String]>,
    ) -> EngineResult<Option<Vec<PathEdge>>> {
        Err(external_unavailable(&self.url))
    }
    async fn mentions_for_entities(&self, _entity_ids: &[String]) -> EngineResult<Vec<Mention>> {
        Err(external_unavailable(&self.url))
    }
    async fn top_entities(
        &self,
        _domain: Option<&str>,
        _entity_type: Option<&str>,
        _limit: usize,
        _min_occurrence: u64,
    ) -> EngineResult<Vec<Entity>> {
        Err(external_unavailable(&self.url))
    }
    async fn top_relations(
        &self,
        _domain: Option<&str>,
        _relation_type: Option<&str>,
        _limit: usize,
        _min_weight: u64,
    ) -> EngineResult<Vec<Relation>> {
        Err(external_unavailable(&self.url))
    }
    async fn filtered_projection(&self, _filter: &GraphFilter) -> EngineResult<FilteredProjection> {
        Err(external_unavailable(&self.url))
    }
    async fn delete_document(&self, _document_id: &str) -> EngineResult<DocumentDeletion> {
        Err(external_unavailable(&self.url))
    }
    async fn stats(&self, _domain: Option<&str>) -> EngineResult<GraphStats> {
        Err(external_unavailable(&self.url))
    }
    async fn domains(&self) -> EngineResult<Vec<String>> {
        Err(external_unavailable(&self.url))
    }
    async fn document_ids(&self) -> EngineResult<Vec<String>> {
        Err(external_unavailable(&self.url))
    }
    async fn clear(&self) -> EngineResult<()> {
        Err(external_unavailable(&self.url))
    }
}

/// Stub for an external k-NN vector service.
pub struct ExternalVectorStore {
    /// Service URL (e.g. `http://localhost:6333`).
    pub url: String,
    dimension: usize,
}

impl ExternalVectorStore {
    /// Create a new external vector store stub.
    pub fn new(url: impl Into<String>, dimension: usize) -> Self {
        Self { url: url.into(), dimension }
    }
}

#[async_trait]
impl VectorStore for ExternalVectorStore {
    fn dimension(&self) -> usize {
        self.dimension
    }
    async fn upsert(&self, _records: &[EmbeddingRecord]) -> EngineResult<()> {
        Err(external_unavailable(&self.url))
    }
    async fn query(
        &self,
        _vector: &[f32],
        _k: usize,
        _domain: Option<&str>,
    ) -> EngineResult<Vec<VectorHit>> {
        Err(external_unavailable(&self.url))
    }
    async fn delete_document(&self, _document_id: &str) -> EngineResult<usize> {
        Err(external_unavailable(&self.url))
    }
    async fn count(&self) -> EngineResult<usize> {
        Err(external_unavailable(&self.url))
    }
    async fn document_ids(&self) -> EngineResult<Vec<String>> {
        Err(external_unavailable(&self.url))
    }
    async fn clear(&self) -> EngineResult<()> {
        Err(external_unavailable(&self.url))
    }
}
