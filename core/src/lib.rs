//! # Lattica Core
//!
//! Core types and storage abstractions for the Lattica hybrid retrieval
//! engine.
//!
//! This crate defines the shared data model (chunks, entities, relations,
//! mentions, plans, reasoning paths), the enumerated error kinds, and the
//! pluggable [`GraphStore`](backends::GraphStore) /
//! [`VectorStore`](backends::VectorStore) traits that decouple knowledge-graph
//! storage from vector search. It also hosts the pure engine pieces shared by
//! ingestion and retrieval: weighted reciprocal-rank fusion, the BM25 keyword
//! index, the bounded graph projection engine, and the retry helper.

pub mod backends;
pub mod error;
pub mod fusion;
pub mod keyword;
pub mod memory;
pub mod projection;
pub mod retry;
pub mod types;

pub use backends::{
    DocumentDeletion, ExternalGraphStore, ExternalVectorStore, GraphNeighbor, GraphStore,
    StoreRegistry, VectorHit, VectorStore,
};
pub use error::{EngineError, EngineResult, ErrorKind};
pub use fusion::{fuse, min_max_normalize, FusedHit, StrategyRanking, RRF_K};
pub use keyword::{tokenize, KeywordIndex, BM25_B, BM25_K1, STOPWORDS};
pub use memory::{MemoryGraphStore, MemoryVectorStore};
pub use projection::{FilteredProjection, GraphFilter, ProjectionTotals, SortBy, SortOrder};
pub use retry::{with_retries, RetryPolicy};
pub use types::*;
