//! Error types for omni-core.
//!
//! Uses a hierarchical error enum so callers can pattern-match on
//! the subsystem that failed. Each subsystem also has its own error
//! type internally, which gets converted to `OmniError` at the boundary.

use std::path::PathBuf;

use thiserror::Error;

/// The error taxonomy bucket an [`OmniError`] belongs to, used by the
/// server/hooks layer to decide whether to retry, degrade, or surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Malformed config, unreadable file, parse failure. Local; skip and continue.
    Input,
    /// Embedding or store transient failure. Retry with backoff.
    Provider,
    /// Vector-store write-log failure. Halt writes, require `recreate`.
    Corruption,
    /// Token/latency/memory overrun. Truncate, reduce batch, downgrade.
    Budget,
    /// Plan-mode denial or hook block. Surface with a remediation hint.
    Policy,
    /// Unrecoverable invariant violation. Process should be restarted.
    Fatal,
}

/// Top-level error type for all omni-core operations.
#[derive(Debug, Error)]
pub enum OmniError {
    // ---- Input (local, skip and continue) ----
    /// A single file failed to parse. The rest of the index is fine.
    #[error("parse error for {path}: {message}")]
    Parse {
        /// Path to the file that failed to parse.
        path: PathBuf,
        /// Human-readable error description.
        message: String,
    },

    /// Requested file or symbol was not found in the index.
    #[error("not found: {entity}")]
    NotFound {
        /// Description of what was not found.
        entity: String,
    },

    /// Configuration is invalid or missing required fields.
    #[error("configuration error: {details}")]
    Config {
        /// What's wrong with the config.
        details: String,
    },

    // ---- Provider (transient, retry with backoff) ----
    /// Embedding inference failed for a chunk. Keyword search still works.
    #[error("embedding error for chunk {chunk_id}: {message}")]
    Embed {
        /// Database ID of the chunk that failed to embed.
        chunk_id: i64,
        /// Human-readable error description.
        message: String,
    },

    /// A provider (embedding model, vector store, ticket tracker) failed
    /// transiently; the caller should retry with backoff.
    #[error("provider error ({provider}): {message}")]
    ProviderTransient {
        /// Which provider failed.
        provider: String,
        /// Human-readable error description.
        message: String,
    },

    /// Embedding model is unavailable. System falls back to keyword-only search.
    #[error("embedding model unavailable: {reason}")]
    ModelUnavailable {
        /// Why the model couldn't be loaded.
        reason: String,
    },

    /// Vector index is unavailable. System falls back to keyword-only search.
    #[error("vector index unavailable: {reason}")]
    VectorUnavailable {
        /// Why the vector index couldn't be loaded.
        reason: String,
    },

    // ---- Corruption (halt writes on the collection) ----
    /// Database corruption detected. Requires reindex.
    #[error("database corruption: {details}")]
    DatabaseCorruption {
        /// Diagnostic details.
        details: String,
    },

    /// Vector store write-log corruption detected for a collection. Writes
    /// are refused until `recreate` is called.
    #[error("vector store corrupted for collection {collection}: {details}")]
    VectorStoreCorrupted {
        /// Affected collection.
        collection: String,
        /// Diagnostic details.
        details: String,
    },

    // ---- Budget (truncate, reduce, downgrade) ----
    /// A response exceeded its token budget and was truncated.
    #[error("token budget exceeded: {used} > {budget}")]
    TokenBudgetExceeded {
        /// Tokens that would have been used.
        used: u32,
        /// The configured budget.
        budget: u32,
    },

    /// The indexer's soft memory ceiling was exceeded.
    #[error("memory ceiling exceeded: {used_mb}MB > {ceiling_mb}MB")]
    MemoryCeilingExceeded {
        /// Measured resident memory in megabytes.
        used_mb: u64,
        /// Configured ceiling in megabytes.
        ceiling_mb: u64,
    },

    /// Not enough disk space to continue indexing.
    #[error("insufficient disk space: {available_mb}MB available, {required_mb}MB required")]
    InsufficientDisk {
        /// Available space in megabytes.
        available_mb: u64,
        /// Required space in megabytes.
        required_mb: u64,
    },

    // ---- Policy (surface with remediation hint) ----
    /// A write tool was called while plan-mode is active.
    #[error("plan mode denied tool {tool}: {hint}")]
    PlanModeDenied {
        /// Name of the blocked tool.
        tool: String,
        /// Remediation hint shown to the caller.
        hint: String,
    },

    /// A hook's fast quality-rule catalog blocked an operation.
    #[error("hook blocked: {reason}")]
    HookBlocked {
        /// Why the hook blocked the operation.
        reason: String,
    },

    // ---- Fatal (unrecoverable invariant violation) ----
    /// Two different content bodies mapped to the same entity id. Indicates
    /// a bug in id derivation or a hash collision; not recoverable in-process.
    #[error("id collision: {id} has conflicting content")]
    IdCollision {
        /// The colliding entity id.
        id: String,
    },

    // ---- Wrapped external errors ----
    /// SQLite error.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic internal error for unexpected conditions.
    #[error("internal error: {0}")]
    Internal(String),
}

impl OmniError {
    /// Which taxonomy bucket this error belongs to (§7 of the design docs).
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Parse { .. } | Self::NotFound { .. } | Self::Config { .. } => {
                ErrorCategory::Input
            }
            Self::Embed { .. }
            | Self::ProviderTransient { .. }
            | Self::ModelUnavailable { .. }
            | Self::VectorUnavailable { .. } => ErrorCategory::Provider,
            Self::DatabaseCorruption { .. } | Self::VectorStoreCorrupted { .. } => {
                ErrorCategory::Corruption
            }
            Self::TokenBudgetExceeded { .. }
            | Self::MemoryCeilingExceeded { .. }
            | Self::InsufficientDisk { .. } => ErrorCategory::Budget,
            Self::PlanModeDenied { .. } | Self::HookBlocked { .. } => ErrorCategory::Policy,
            Self::IdCollision { .. } => ErrorCategory::Fatal,
            Self::Database(_) | Self::Io(_) | Self::Serialization(_) | Self::Internal(_) => {
                ErrorCategory::Input
            }
        }
    }

    /// One-line remediation hint shown alongside the error (§7: "every
    /// surfaced error names the component, the failed operation, and a
    /// one-line remediation").
    pub fn remediation(&self) -> &'static str {
        match self {
            Self::Parse { .. } => "file was skipped; fix the syntax error or add it to ignore rules",
            Self::NotFound { .. } => "check the id/name and that the collection has been indexed",
            Self::Config { .. } => "check omnicontext config.toml for missing/invalid fields",
            Self::Embed { .. } => "chunk kept keyword-searchable; retry indexing to re-embed",
            Self::ProviderTransient { .. } => "transient provider failure; retrying with backoff",
            Self::ModelUnavailable { .. } => "falling back to keyword-only search",
            Self::VectorUnavailable { .. } => "falling back to keyword-only search",
            Self::DatabaseCorruption { .. } => "run a full reindex to rebuild the database",
            Self::VectorStoreCorrupted { .. } => "call recreate() on the collection, then reindex",
            Self::TokenBudgetExceeded { .. } => "response truncated; raise token_budget or narrow the query",
            Self::MemoryCeilingExceeded { .. } => "batch size halved; indexing will continue more slowly",
            Self::InsufficientDisk { .. } => "free disk space before continuing indexing",
            Self::PlanModeDenied { .. } => "call set_plan_mode(false) to allow write tools",
            Self::HookBlocked { .. } => "address the blocking finding before retrying",
            Self::IdCollision { .. } => "unrecoverable: restart the process and file a bug report",
            Self::Database(_) => "check the sqlite file isn't locked by another process",
            Self::Io(_) => "check file permissions and that the path exists",
            Self::Serialization(_) => "persisted state may be from an incompatible version",
            Self::Internal(_) => "unexpected internal error",
        }
    }
}

/// Convenience type alias for Results in omni-core.
pub type OmniResult<T> = Result<T, OmniError>;

/// Panic with full context on a detected fatal invariant violation (§7:
/// "Panic with full context; external supervisor restarts the process").
pub fn fatal_id_collision(id: &str, existing_content_hash: &str, new_content_hash: &str) -> ! {
    panic!(
        "fatal: id collision for entity {id} — existing content hash {existing_content_hash}, \
         new content hash {new_content_hash}; this indicates a bug in id derivation or a hash \
         collision and cannot be recovered in-process"
    );
}
