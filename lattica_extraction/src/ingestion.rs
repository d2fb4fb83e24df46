//! Ingestion flow orchestrator.
//!
//! Implements the document-to-stores pipeline:
//! 1. **Chunking** — structural or semantic split into ordered chunks
//! 2. **Chunk persistence** — graph store is the system of record for text
//! 3. **Embedding** — one vector per chunk into the vector store
//! 4. **Extraction** — per-chunk NER + relation extraction with bounded
//!    concurrency, a hard per-chunk deadline, and retry with backoff
//! 5. **Entity resolution** — canonical entities with deterministic ids
//! 6. **Graph update** — entities, relations, and observed-once mentions
//!
//! Failure of a single chunk never fails the document: the chunk is marked
//! failed and the document degrades to `partial`, which stays retrievable.
//! Writes to the graph and vector stores are independent and each retried;
//! there is no cross-store transaction.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use lattica_config::IngestionSettings;
use lattica_core::{
    with_retries, Chunk, DocumentStatus, EngineError, EngineResult, EmbeddingPayload,
    EmbeddingRecord, GraphStore, Relation, RetryPolicy, StoreRegistry, VectorStore,
};

use crate::chunker::{Chunker, ChunkerConfig, ChunkStrategy, DocumentFormat};
use crate::resolution::EntityResolver;
use crate::{Embedder, ExtractedRelation, NerCollaborator, NerSpan, RelationCollaborator};

/// Configuration for the ingestion pipeline.
#[derive(Debug, Clone)]
pub struct IngestionConfig {
    /// Chunker settings.
    pub chunker: ChunkerConfig,
    /// Concurrent chunk extractions per document.
    pub chunk_concurrency: usize,
    /// Concurrent documents across the process.
    pub document_concurrency: usize,
    /// Hard deadline per chunk extraction.
    pub extract_timeout: Duration,
    /// Retry policy for extraction and store writes.
    pub retry: RetryPolicy,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            chunker: ChunkerConfig::default(),
            chunk_concurrency: 8,
            document_concurrency: 32,
            extract_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

impl From<&IngestionSettings> for IngestionConfig {
    fn from(settings: &IngestionSettings) -> Self {
        Self {
            chunker: ChunkerConfig {
                strategy: if settings.chunk_strategy == "structural" {
                    ChunkStrategy::Structural
                } else {
                    ChunkStrategy::Semantic
                },
                token_budget: settings.chunk_token_budget,
                overlap_sentences: settings.chunk_overlap_sentences,
                semantic_threshold: settings.semantic_threshold,
            },
            chunk_concurrency: settings.chunk_concurrency.max(1),
            document_concurrency: settings.document_concurrency.max(1),
            extract_timeout: Duration::from_secs(settings.extract_timeout_secs.max(1)),
            retry: RetryPolicy {
                base: Duration::from_millis(settings.retry_base_ms.max(1)),
                max_attempts: settings.retry_attempts.max(1),
                ..RetryPolicy::default()
            },
        }
    }
}

/// Per-document result of an ingestion run.
#[derive(Debug, Clone)]
pub struct IngestionReport {
    /// Ingested document.
    pub document_id: String,
    /// Corpus domain.
    pub domain: String,
    /// Final lifecycle state (`indexed` or `partial`).
    pub status: DocumentStatus,
    /// Chunks produced.
    pub chunks: usize,
    /// Chunks whose extraction failed after retries.
    pub failed_chunks: usize,
    /// Distinct entities written.
    pub entities: usize,
    /// Relations written.
    pub relations: usize,
    /// Mention edges written.
    pub mentions: usize,
    /// Whether embeddings reached the vector store.
    pub embedded: bool,
    /// Wall-clock duration of the run.
    pub elapsed: Duration,
}

/// The ingestion orchestrator. Collaborators are trait objects so tests can
/// substitute mocks; a global semaphore bounds concurrent documents.
pub struct IngestionPipeline {
    registry: StoreRegistry,
    embedder: Arc<dyn Embedder>,
    ner: Arc<dyn NerCollaborator>,
    relations: Arc<dyn RelationCollaborator>,
    config: IngestionConfig,
    documents: Arc<Semaphore>,
}

impl IngestionPipeline {
    /// Create a pipeline over the given stores and collaborators.
    pub fn new(
        registry: StoreRegistry,
        embedder: Arc<dyn Embedder>,
        ner: Arc<dyn NerCollaborator>,
        relations: Arc<dyn RelationCollaborator>,
        config: IngestionConfig,
    ) -> Self {
        let documents = Arc::new(Semaphore::new(config.document_concurrency.max(1)));
        Self {
            registry,
            embedder,
            ner,
            relations,
            config,
            documents,
        }
    }

    /// Ingest one document end to end. Re-ingesting an existing document id
    /// replaces its previous assets.
    pub async fn ingest_document(
        &self,
        document_id: &str,
        domain: &str,
        format: DocumentFormat,
        text: &str,
        build_knowledge_graph: bool,
    ) -> EngineResult<IngestionReport> {
        let started = Instant::now();
        let _permit = self
            .documents
            .acquire()
            .await
            .map_err(|_| EngineError::TransientDependency("ingestion shutting down".into()))?;

        // Replace any previous content under the same document id.
        with_retries("graph.delete_document", &self.config.retry, || async {
            self.registry.graph().delete_document(document_id).await
        })
        .await?;
        with_retries("vector.delete_document", &self.config.retry, || async {
            self.registry.vector().delete_document(document_id).await
        })
        .await?;

        let chunker = Chunker::new(self.config.chunker.clone());
        let chunks = chunker
            .chunk(document_id, domain, format, text, Some(self.embedder.as_ref()))
            .await?;
        debug!(document_id, chunks = chunks.len(), "chunked document");
        if chunks.is_empty() {
            return Ok(IngestionReport {
                document_id: document_id.to_string(),
                domain: domain.to_string(),
                status: DocumentStatus::Indexed,
                chunks: 0,
                failed_chunks: 0,
                entities: 0,
                relations: 0,
                mentions: 0,
                embedded: true,
                elapsed: started.elapsed(),
            });
        }

        with_retries("graph.upsert_chunks", &self.config.retry, || async {
            self.registry.graph().upsert_chunks(&chunks).await
        })
        .await?;

        // Embedding failure degrades the document instead of failing it.
        let embedded = match self.embed_chunks(&chunks).await {
            Ok(()) => true,
            Err(err) => {
                warn!(document_id, error = %err, "embedding failed, document degrades to partial");
                false
            }
        };

        let (failed_chunks, entities, relations, mentions) = if build_knowledge_graph {
            self.extract_and_index(document_id, domain, &chunks).await?
        } else {
            (0, 0, 0, 0)
        };

        let status = if failed_chunks > 0 || !embedded {
            DocumentStatus::Partial
        } else {
            DocumentStatus::Indexed
        };
        let report = IngestionReport {
            document_id: document_id.to_string(),
            domain: domain.to_string(),
            status,
            chunks: chunks.len(),
            failed_chunks,
            entities,
            relations,
            mentions,
            embedded,
            elapsed: started.elapsed(),
        };
        info!(
            document_id,
            chunks = report.chunks,
            failed = report.failed_chunks,
            entities = report.entities,
            relations = report.relations,
            status = ?report.status,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "document ingested"
        );
        Ok(report)
    }

    /// Re-run extraction over chunks already in the graph store, used by the
    /// knowledge-graph rebuild operation.
    pub async fn rebuild_from_chunks(
        &self,
        document_id: &str,
        domain: &str,
        chunks: &[Chunk],
    ) -> EngineResult<IngestionReport> {
        let started = Instant::now();
        let (failed_chunks, entities, relations, mentions) =
            self.extract_and_index(document_id, domain, chunks).await?;
        Ok(IngestionReport {
            document_id: document_id.to_string(),
            domain: domain.to_string(),
            status: if failed_chunks > 0 { DocumentStatus::Partial } else { DocumentStatus::Indexed },
            chunks: chunks.len(),
            failed_chunks,
            entities,
            relations,
            mentions,
            embedded: true,
            elapsed: started.elapsed(),
        })
    }

    async fn embed_chunks(&self, chunks: &[Chunk]) -> EngineResult<()> {
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = with_retries("embed_chunks", &self.config.retry, || async {
            self.embedder.embed(&texts).await
        })
        .await?;
        if vectors.len() != chunks.len() {
            return Err(EngineError::DataIntegrity(format!(
                "embedder returned {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            )));
        }
        let records: Vec<EmbeddingRecord> = chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| EmbeddingRecord {
                chunk_id: chunk.id.clone(),
                vector,
                payload: EmbeddingPayload {
                    document_id: chunk.document_id.clone(),
                    domain: chunk.domain.clone(),
                    ordinal: chunk.ordinal,
                    section_path: chunk.section_path.clone(),
                },
            })
            .collect();
        with_retries("vector.upsert", &self.config.retry, || async {
            self.registry.vector().upsert(&records).await
        })
        .await
    }

    /// Per-chunk extraction with bounded concurrency and a hard deadline,
    /// then cross-chunk resolution and graph writes. Returns
    /// `(failed_chunks, entities, relations, mentions)`.
    async fn extract_and_index(
        &self,
        document_id: &str,
        domain: &str,
        chunks: &[Chunk],
    ) -> EngineResult<(usize, usize, usize, usize)> {
        let semaphore = Arc::new(Semaphore::new(self.config.chunk_concurrency.max(1)));
        let mut join_set: JoinSet<(usize, EngineResult<(Vec<NerSpan>, Vec<ExtractedRelation>)>)> =
            JoinSet::new();

        for (index, chunk) in chunks.iter().enumerate() {
            let semaphore = semaphore.clone();
            let ner = self.ner.clone();
            let relations = self.relations.clone();
            let retry = self.config.retry.clone();
            let deadline = self.config.extract_timeout;
            let text = chunk.text.clone();
            join_set.spawn(async move {
                let permit = semaphore.acquire_owned().await;
                if permit.is_err() {
                    return (
                        index,
                        Err(EngineError::TransientDependency("extraction pool closed".into())),
                    );
                }
                let result = with_retries("chunk_extraction", &retry, || {
                    let ner = ner.clone();
                    let relations = relations.clone();
                    let text = text.clone();
                    async move {
                        match tokio::time::timeout(deadline, async {
                            let spans = ner.extract_entities(&text).await?;
                            let extracted = if spans.len() >= 2 {
                                relations.extract_relations(&text, &spans).await?
                            } else {
                                Vec::new()
                            };
                            Ok::<_, EngineError>((spans, extracted))
                        })
                        .await
                        {
                            Ok(inner) => inner,
                            Err(_) => Err(EngineError::Timeout(deadline)),
                        }
                    }
                })
                .await;
                (index, result)
            });
        }

        let mut outcomes: Vec<Option<(Vec<NerSpan>, Vec<ExtractedRelation>)>> =
            vec![None; chunks.len()];
        let mut failed_chunks = 0usize;
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, Ok(outcome))) => outcomes[index] = Some(outcome),
                Ok((index, Err(err))) => {
                    failed_chunks += 1;
                    warn!(
                        document_id,
                        chunk = %chunks[index].id,
                        error = %err,
                        "chunk extraction failed, continuing"
                    );
                }
                Err(join_err) => {
                    failed_chunks += 1;
                    warn!(document_id, error = %join_err, "chunk extraction task aborted");
                }
            }
        }

        // Cross-chunk resolution, walked in ordinal order for determinism.
        let mut resolver = EntityResolver::new(domain);
        let mut relation_rows: Vec<Relation> = Vec::new();
        for (chunk, outcome) in chunks.iter().zip(&outcomes) {
            let Some((spans, extracted)) = outcome else { continue };
            for span in spans {
                resolver.observe(span, &chunk.id);
            }
            for relation in extracted {
                let (Some(source_id), Some(target_id)) =
                    (resolver.lookup(&relation.subject), resolver.lookup(&relation.object))
                else {
                    continue;
                };
                if source_id == target_id {
                    continue;
                }
                relation_rows.push(Relation {
                    source_id,
                    target_id,
                    relation_type: relation.predicate.clone(),
                    evidence: if relation.evidence.is_empty() {
                        Vec::new()
                    } else {
                        vec![relation.evidence.clone()]
                    },
                    confidence: relation.confidence,
                    weight: 1,
                    domain: domain.to_string(),
                });
            }
        }
        relation_rows.sort_by(|a, b| {
            (&a.source_id, &a.target_id, &a.relation_type)
                .cmp(&(&b.source_id, &b.target_id, &b.relation_type))
        });

        let (entities, mentions) = resolver.into_parts();
        with_retries("graph.upsert_entities", &self.config.retry, || async {
            self.registry.graph().upsert_entities(&entities).await
        })
        .await?;
        with_retries("graph.upsert_relations", &self.config.retry, || async {
            self.registry.graph().upsert_relations(&relation_rows).await
        })
        .await?;
        with_retries("graph.upsert_mentions", &self.config.retry, || async {
            self.registry.graph().upsert_mentions(&mentions).await
        })
        .await?;

        Ok((failed_chunks, entities.len(), relation_rows.len(), mentions.len()))
    }
}
