//! # omni-core
//!
//! Core indexing, search, and code intelligence engine for OmniContext.
//!
//! This crate provides the foundational components for building a semantic
//! code understanding engine. It is designed as a library with clear module
//! boundaries so that each subsystem can be developed, tested, and debugged
//! independently.
//!
//! ## Architecture
//!
//! The engine is split into decoupled subsystems:
//!
//! - **`config`** -- Configuration loading and validation
//! - **`discovery`** -- File-system walk, layered ignore rules, tier classification
//! - **`parser`** -- Tree-sitter AST parsing with per-language analyzers
//! - **`chunker`** -- AST-aware semantic code chunking
//! - **`embedder`** -- ONNX-based local embedding inference
//! - **`index`** -- SQLite metadata store (entities, relations, indexer state)
//! - **`bm25`** -- Lexical inverted index (k1/b-tunable BM25 scoring)
//! - **`vector`** -- Flat vector index with disk persistence
//! - **`graph`** -- Dependency graph construction and traversal (petgraph)
//! - **`reranker`** -- Cross-encoder reranking of fused candidates
//! - **`search`** -- Hybrid retrieval engine (RRF fusion + ranking)
//! - **`watcher`** -- File system watcher with debouncing
//! - **`pipeline`** -- Orchestrates the ingestion pipeline
//! - **`guardrail`** -- Plan-mode guardrail engine (rule catalog, auto-revision)
//! - **`hooks`** -- Hook execution framework (event records on stdin)
//! - **`tickets`** -- Ticket-tracker adapter (read-through cache)
//!
//! Each module exposes a public trait or struct that the pipeline wires together.
//! Modules communicate via well-defined types in the `types` module.

// Workspace lints are inherited from Cargo.toml

pub mod config;
pub mod error;
pub mod types;

// Core subsystems
pub mod discovery;
pub mod parser;
pub mod chunker;
pub mod embedder;
pub mod index;
pub mod bm25;
pub mod vector;
pub mod graph;
pub mod reranker;
pub mod search;
pub mod watcher;
pub mod pipeline;

// Plan-mode guardrail engine and hook execution framework
pub mod guardrail;
pub mod hooks;
pub mod tickets;

/// Re-export the primary engine interface.
pub use pipeline::Engine;
pub use config::Config;
pub use error::{OmniError, OmniResult};
pub use index::MetadataIndex;
pub use search::SearchMode;
pub use tickets::{Ticket, TicketQuery, TicketTracker};
pub use types::{
    Chunk, ChunkKind, Entity, EntityChunkKind, EntityMetadata, EntityType, Relation, RelationKind,
    SearchResult, Symbol,
};
