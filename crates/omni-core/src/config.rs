//! Configuration loading and validation.
//!
//! Configuration is resolved with the following precedence (highest wins):
//!
//! 1. CLI flags
//! 2. Environment variables (`OMNI_*`)
//! 3. Project config (`.omnicontext/config.toml`)
//! 4. User config (`~/.config/omnicontext/config.toml`)
//! 5. Compiled-in defaults

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{OmniError, OmniResult};

/// Top-level configuration for OmniContext.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Repository root path to index.
    pub repo_path: PathBuf,

    /// Indexing configuration.
    #[serde(default)]
    pub indexing: IndexingConfig,

    /// Search configuration.
    #[serde(default)]
    pub search: SearchConfig,

    /// Embedding configuration.
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Watcher configuration.
    #[serde(default)]
    pub watcher: WatcherConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// BM25 lexical index configuration.
    #[serde(default)]
    pub bm25: Bm25Config,

    /// Plan-mode guardrail engine configuration.
    #[serde(default)]
    pub guardrail: GuardrailConfig,

    /// Hook execution framework configuration.
    #[serde(default)]
    pub hooks: HooksConfig,

    /// Collection identifier for this repo. Derived from the repo folder
    /// name (sanitised) if not set explicitly.
    #[serde(default)]
    pub collection: Option<String>,

    /// Process-wide read-only flag. Can also be set via the `PLAN_MODE`
    /// environment variable (`true|1|yes|on`, case-insensitive).
    #[serde(default)]
    pub plan_mode: bool,
}

/// Indexing-specific settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
    /// File patterns to exclude from indexing (glob syntax).
    #[serde(default = "IndexingConfig::default_excludes")]
    pub exclude_patterns: Vec<String>,

    /// Maximum file size to index (in bytes). Files larger than this are skipped.
    #[serde(default = "IndexingConfig::default_max_file_size")]
    pub max_file_size: u64,

    /// Maximum number of concurrent parse tasks.
    #[serde(default = "IndexingConfig::default_parse_concurrency")]
    pub parse_concurrency: usize,

    /// Maximum chunk size in tokens.
    #[serde(default = "IndexingConfig::default_max_chunk_tokens")]
    pub max_chunk_tokens: u32,

    /// Whether to follow symbolic links.
    #[serde(default)]
    pub follow_symlinks: bool,

    /// Soft memory ceiling in megabytes. Polled once per batch; exceeding it
    /// halves the next batch size and forces a release pass.
    #[serde(default = "IndexingConfig::default_memory_ceiling_mb")]
    pub memory_ceiling_mb: u64,

    /// Starting batch size for adaptive batching (embed/upsert).
    #[serde(default = "IndexingConfig::default_initial_batch_size")]
    pub initial_batch_size: usize,

    /// Maximum batch size adaptive batching will ramp up to.
    #[serde(default = "IndexingConfig::default_max_batch_size")]
    pub max_batch_size: usize,

    /// Per-file parse timeout in seconds.
    #[serde(default = "IndexingConfig::default_parse_timeout_secs")]
    pub parse_timeout_secs: u64,

    /// Number of backward overlap lines to include before each chunk for CAST context.
    /// These lines provide surrounding context to prevent orphaned chunks.
    #[serde(default = "IndexingConfig::default_overlap_lines")]
    pub overlap_lines: usize,

    /// Target overlap in tokens for CAST context windowing.
    /// When set, takes precedence over `overlap_lines` for determining
    /// how much backward context to capture.
    #[serde(default = "IndexingConfig::default_overlap_tokens")]
    pub overlap_tokens: u32,

    /// Overlap fraction for intra-element splitting (0.0 - 0.5).
    /// Controls how much content is repeated between consecutive chunks
    /// when a single large element is split into multiple chunks.
    #[serde(default = "IndexingConfig::default_overlap_fraction")]
    pub overlap_fraction: f64,

    /// Whether to include module-level declarations (imports, top-level constants,
    /// type definitions) in each chunk's context header regardless of their distance.
    #[serde(default = "IndexingConfig::default_include_module_declarations")]
    pub include_module_declarations: bool,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            exclude_patterns: Self::default_excludes(),
            max_file_size: Self::default_max_file_size(),
            parse_concurrency: Self::default_parse_concurrency(),
            max_chunk_tokens: Self::default_max_chunk_tokens(),
            follow_symlinks: false,
            memory_ceiling_mb: Self::default_memory_ceiling_mb(),
            initial_batch_size: Self::default_initial_batch_size(),
            max_batch_size: Self::default_max_batch_size(),
            parse_timeout_secs: Self::default_parse_timeout_secs(),
            overlap_lines: Self::default_overlap_lines(),
            overlap_tokens: Self::default_overlap_tokens(),
            overlap_fraction: Self::default_overlap_fraction(),
            include_module_declarations: Self::default_include_module_declarations(),
        }
    }
}

impl IndexingConfig {
    fn default_excludes() -> Vec<String> {
        vec![
            ".git".into(),
            "node_modules".into(),
            "target".into(),
            "__pycache__".into(),
            ".venv".into(),
            "venv".into(),
            "dist".into(),
            "build".into(),
            ".next".into(),
            "*.lock".into(),
            "*.min.js".into(),
            "*.min.css".into(),
            "*.map".into(),
        ]
    }

    fn default_max_file_size() -> u64 {
        5 * 1024 * 1024 // 5MB
    }

    fn default_parse_concurrency() -> usize {
        2
    }

    fn default_max_chunk_tokens() -> u32 {
        512
    }

    fn default_memory_ceiling_mb() -> u64 { 2048 }
    fn default_initial_batch_size() -> usize { 5 }
    fn default_max_batch_size() -> usize { 25 }
    fn default_parse_timeout_secs() -> u64 { 30 }

    fn default_overlap_lines() -> usize { 10 }

    fn default_overlap_tokens() -> u32 { 150 }

    fn default_overlap_fraction() -> f64 { 0.12 }

    fn default_include_module_declarations() -> bool { true }
}

/// Search-specific settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Default number of results to return.
    #[serde(default = "SearchConfig::default_limit")]
    pub default_limit: usize,

    /// Maximum number of results to return.
    #[serde(default = "SearchConfig::default_max_limit")]
    pub max_limit: usize,

    /// RRF constant (k parameter). Documented in two places upstream as
    /// both 60 and a slightly different value; this config exposes it and
    /// defaults to 60 per the resolution in DESIGN.md.
    #[serde(default = "SearchConfig::default_rrf_k")]
    pub rrf_k: u32,

    /// Weight given to the semantic (dense-vector) ranking in hybrid fusion.
    #[serde(default = "SearchConfig::default_semantic_weight")]
    pub semantic_weight: f64,

    /// Weight given to the keyword (BM25) ranking in hybrid fusion.
    #[serde(default = "SearchConfig::default_keyword_weight")]
    pub keyword_weight: f64,

    /// Maximum dense-vector candidates considered before fusion (N1).
    #[serde(default = "SearchConfig::default_dense_candidates")]
    pub dense_candidates: usize,

    /// Maximum BM25 candidates considered before fusion (N2).
    #[serde(default = "SearchConfig::default_keyword_candidates")]
    pub keyword_candidates: usize,

    /// Default token budget for context building / retrieval responses.
    #[serde(default = "SearchConfig::default_token_budget")]
    pub token_budget: u32,

    /// Reranker configuration.
    #[serde(default)]
    pub reranker: RerankerConfig,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: Self::default_limit(),
            max_limit: Self::default_max_limit(),
            rrf_k: Self::default_rrf_k(),
            semantic_weight: Self::default_semantic_weight(),
            keyword_weight: Self::default_keyword_weight(),
            dense_candidates: Self::default_dense_candidates(),
            keyword_candidates: Self::default_keyword_candidates(),
            token_budget: Self::default_token_budget(),
            reranker: RerankerConfig::default(),
        }
    }
}

impl SearchConfig {
    fn default_limit() -> usize { 10 }
    fn default_max_limit() -> usize { 100 }
    fn default_rrf_k() -> u32 { 60 }
    fn default_semantic_weight() -> f64 { 0.7 }
    fn default_keyword_weight() -> f64 { 0.3 }
    fn default_dense_candidates() -> usize { 50 }
    fn default_keyword_candidates() -> usize { 50 }
    fn default_token_budget() -> u32 { 25_000 }
}

/// BM25 lexical index configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bm25Config {
    /// Term-frequency saturation parameter.
    #[serde(default = "Bm25Config::default_k1")]
    pub k1: f64,
    /// Length-normalisation parameter.
    #[serde(default = "Bm25Config::default_b")]
    pub b: f64,
}

impl Default for Bm25Config {
    fn default() -> Self {
        Self { k1: Self::default_k1(), b: Self::default_b() }
    }
}

impl Bm25Config {
    fn default_k1() -> f64 { 1.2 }
    fn default_b() -> f64 { 0.75 }
}

/// Plan-mode guardrail engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardrailConfig {
    /// Rule ids to disable (all catalog rules run by default).
    #[serde(default)]
    pub disabled_rules: Vec<String>,
    /// Run rules on a bounded worker pool instead of sequentially.
    #[serde(default)]
    pub parallel: bool,
    /// Worker pool size when `parallel` is true.
    #[serde(default = "GuardrailConfig::default_parallel_workers")]
    pub parallel_workers: usize,
    /// Per-rule timeout in milliseconds.
    #[serde(default = "GuardrailConfig::default_rule_timeout_ms")]
    pub rule_timeout_ms: u64,
    /// Skip a rule that errors (true) instead of halting validation (false).
    #[serde(default = "GuardrailConfig::default_continue_on_error")]
    pub continue_on_error: bool,
    /// Minimum confidence for a finding to be auto-revised.
    #[serde(default = "GuardrailConfig::default_auto_revise_threshold")]
    pub auto_revise_threshold: f64,
    /// Duplicate-detection similarity threshold.
    #[serde(default = "GuardrailConfig::default_duplicate_threshold")]
    pub duplicate_threshold: f64,
    /// Maximum auto-revision passes per validation call.
    #[serde(default = "GuardrailConfig::default_max_iterations")]
    pub max_iterations: usize,
    /// Maximum revisions applied to a single plan across all passes.
    #[serde(default = "GuardrailConfig::default_max_revisions_per_plan")]
    pub max_revisions_per_plan: usize,
}

impl Default for GuardrailConfig {
    fn default() -> Self {
        Self {
            disabled_rules: Vec::new(),
            parallel: false,
            parallel_workers: Self::default_parallel_workers(),
            rule_timeout_ms: Self::default_rule_timeout_ms(),
            continue_on_error: Self::default_continue_on_error(),
            auto_revise_threshold: Self::default_auto_revise_threshold(),
            duplicate_threshold: Self::default_duplicate_threshold(),
            max_iterations: Self::default_max_iterations(),
            max_revisions_per_plan: Self::default_max_revisions_per_plan(),
        }
    }
}

impl GuardrailConfig {
    fn default_parallel_workers() -> usize { 4 }
    fn default_rule_timeout_ms() -> u64 { 1_000 }
    fn default_continue_on_error() -> bool { true }
    fn default_auto_revise_threshold() -> f64 { 0.7 }
    fn default_duplicate_threshold() -> f64 { 0.70 }
    fn default_max_iterations() -> usize { 3 }
    fn default_max_revisions_per_plan() -> usize { 10 }
}

/// Hook execution framework configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HooksConfig {
    /// Deadline for `PreToolUse` in milliseconds.
    #[serde(default = "HooksConfig::default_pre_tool_use_budget_ms")]
    pub pre_tool_use_budget_ms: u64,
    /// Small epsilon added on top of a deadline before treating a hook as
    /// overrun, to absorb process-spawn scheduling jitter (fail-open either way).
    #[serde(default = "HooksConfig::default_deadline_epsilon_ms")]
    pub deadline_epsilon_ms: u64,
}

impl Default for HooksConfig {
    fn default() -> Self {
        Self {
            pre_tool_use_budget_ms: Self::default_pre_tool_use_budget_ms(),
            deadline_epsilon_ms: Self::default_deadline_epsilon_ms(),
        }
    }
}

impl HooksConfig {
    fn default_pre_tool_use_budget_ms() -> u64 { 300 }
    fn default_deadline_epsilon_ms() -> u64 { 50 }
}

/// Cross-encoder reranker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankerConfig {
    /// Weight given to the original RRF score when blending with reranker (0.0 - 1.0).
    /// The reranker weight is `1.0 - rrf_weight`.
    #[serde(default = "RerankerConfig::default_rrf_weight")]
    pub rrf_weight: f64,

    /// Maximum number of candidates to pass to the reranker.
    #[serde(default = "RerankerConfig::default_max_candidates")]
    pub max_candidates: usize,

    /// Batch size for reranker inference.
    #[serde(default = "RerankerConfig::default_batch_size")]
    pub batch_size: usize,

    /// Maximum sequence length for the reranker tokenizer.
    #[serde(default = "RerankerConfig::default_max_seq_length")]
    pub max_seq_length: usize,

    /// Demotion factor applied to items not scored by the reranker (0.0 - 1.0).
    /// Items beyond `max_candidates` have their score multiplied by this factor.
    #[serde(default = "RerankerConfig::default_unranked_demotion")]
    pub unranked_demotion: f64,
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self {
            rrf_weight: Self::default_rrf_weight(),
            max_candidates: Self::default_max_candidates(),
            batch_size: Self::default_batch_size(),
            max_seq_length: Self::default_max_seq_length(),
            unranked_demotion: Self::default_unranked_demotion(),
        }
    }
}

impl RerankerConfig {
    fn default_rrf_weight() -> f64 { 0.35 }
    fn default_max_candidates() -> usize { 100 }
    fn default_batch_size() -> usize { 16 }
    fn default_max_seq_length() -> usize { 512 }
    fn default_unranked_demotion() -> f64 { 0.5 }
}

/// Embedding model configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Path to the ONNX model file.
    #[serde(default = "EmbeddingConfig::default_model_path")]
    pub model_path: PathBuf,

    /// Output embedding dimensions.
    #[serde(default = "EmbeddingConfig::default_dimensions")]
    pub dimensions: usize,

    /// Batch size for embedding inference.
    #[serde(default = "EmbeddingConfig::default_batch_size")]
    pub batch_size: usize,

    /// Maximum sequence length for the tokenizer.
    #[serde(default = "EmbeddingConfig::default_max_seq_length")]
    pub max_seq_length: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model_path: Self::default_model_path(),
            dimensions: Self::default_dimensions(),
            batch_size: Self::default_batch_size(),
            max_seq_length: Self::default_max_seq_length(),
        }
    }
}

impl EmbeddingConfig {
    fn default_model_path() -> PathBuf {
        // Default: auto-download cache location for jina-embeddings-v2-base-code.
        // If the model isn't here yet, the embedder will auto-download it.
        // Users can override via config or OMNI_MODEL_PATH env var.
        crate::embedder::model_manager::model_path(&crate::embedder::model_manager::DEFAULT_MODEL)
    }
    fn default_dimensions() -> usize { 768 } // jina-code v2 output dimensions
    fn default_batch_size() -> usize { 32 }
    fn default_max_seq_length() -> usize { 512 } // practical limit for code chunks
}

/// File watcher configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
    /// Debounce interval in milliseconds.
    #[serde(default = "WatcherConfig::default_debounce_ms")]
    pub debounce_ms: u64,

    /// Interval between full scans (in seconds) for catching missed events.
    #[serde(default = "WatcherConfig::default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            debounce_ms: Self::default_debounce_ms(),
            poll_interval_secs: Self::default_poll_interval_secs(),
        }
    }
}

impl WatcherConfig {
    fn default_debounce_ms() -> u64 { 100 }
    fn default_poll_interval_secs() -> u64 { 300 }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "trace").
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,

    /// Whether to output logs as JSON.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            json: false,
        }
    }
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".into()
    }
}

impl Config {
    /// Load configuration from defaults, then overlay user config, then project config.
    pub fn load(repo_path: &Path) -> OmniResult<Self> {
        let mut config = Self::defaults(repo_path);

        // User config: ~/.config/omnicontext/config.toml
        if let Some(user_config_dir) = dirs::config_dir() {
            let user_config_path = user_config_dir.join("omnicontext").join("config.toml");
            if user_config_path.exists() {
                config.merge_from_file(&user_config_path)?;
            }
        }

        // Project config: <repo>/.omnicontext/config.toml
        let project_config_path = repo_path.join(".omnicontext").join("config.toml");
        if project_config_path.exists() {
            config.merge_from_file(&project_config_path)?;
        }

        // Environment overrides
        config.apply_env_overrides();

        Ok(config)
    }

    /// Create a default configuration for the given repo path.
    pub fn defaults(repo_path: &Path) -> Self {
        Self {
            repo_path: repo_path.to_path_buf(),
            indexing: IndexingConfig::default(),
            search: SearchConfig::default(),
            embedding: EmbeddingConfig::default(),
            watcher: WatcherConfig::default(),
            logging: LoggingConfig::default(),
            bm25: Bm25Config::default(),
            guardrail: GuardrailConfig::default(),
            hooks: HooksConfig::default(),
            collection: None,
            plan_mode: false,
        }
    }

    /// The collection identifier for this repo: explicit config value, or
    /// the sanitised repo folder name.
    pub fn collection_name(&self) -> String {
        if let Some(name) = &self.collection {
            return crate::types::sanitize_collection_name(name);
        }
        let folder = self
            .repo_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "default".to_string());
        crate::types::sanitize_collection_name(&folder)
    }

    /// Returns the data directory for this repo's index files.
    pub fn data_dir(&self) -> PathBuf {
        let hash = self.repo_hash();
        let base = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("omnicontext")
            .join("repos")
            .join(&hash);
        base
    }

    /// Merge values from a TOML config file (non-destructive overlay).
    fn merge_from_file(&mut self, path: &Path) -> OmniResult<()> {
        let content = std::fs::read_to_string(path)?;
        let overlay: toml::Value = toml::from_str(&content)
            .map_err(|e| OmniError::Config { details: format!("invalid TOML in {}: {e}", path.display()) })?;

        // Override individual sections if present
        if let Some(indexing) = overlay.get("indexing") {
            if let Ok(parsed) = indexing.clone().try_into::<IndexingConfig>() {
                self.indexing = parsed;
            }
        }
        if let Some(search) = overlay.get("search") {
            if let Ok(parsed) = search.clone().try_into::<SearchConfig>() {
                self.search = parsed;
            }
        }
        if let Some(embedding) = overlay.get("embedding") {
            if let Ok(parsed) = embedding.clone().try_into::<EmbeddingConfig>() {
                self.embedding = parsed;
            }
        }
        if let Some(watcher) = overlay.get("watcher") {
            if let Ok(parsed) = watcher.clone().try_into::<WatcherConfig>() {
                self.watcher = parsed;
            }
        }
        if let Some(logging) = overlay.get("logging") {
            if let Ok(parsed) = logging.clone().try_into::<LoggingConfig>() {
                self.logging = parsed;
            }
        }
        if let Some(bm25) = overlay.get("bm25") {
            if let Ok(parsed) = bm25.clone().try_into::<Bm25Config>() {
                self.bm25 = parsed;
            }
        }
        if let Some(guardrail) = overlay.get("guardrail") {
            if let Ok(parsed) = guardrail.clone().try_into::<GuardrailConfig>() {
                self.guardrail = parsed;
            }
        }
        if let Some(hooks) = overlay.get("hooks") {
            if let Ok(parsed) = hooks.clone().try_into::<HooksConfig>() {
                self.hooks = parsed;
            }
        }
        if let Some(collection) = overlay.get("collection").and_then(|v| v.as_str()) {
            self.collection = Some(collection.to_string());
        }
        if let Some(plan_mode) = overlay.get("plan_mode").and_then(|v| v.as_bool()) {
            self.plan_mode = plan_mode;
        }

        Ok(())
    }

    /// Apply environment variable overrides (`OMNI_*` prefix, plus the
    /// spec-mandated `PLAN_MODE` and `OMNICONTEXT_COLLECTION` variables).
    fn apply_env_overrides(&mut self) {
        if let Ok(level) = std::env::var("OMNI_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(model) = std::env::var("OMNI_MODEL_PATH") {
            self.embedding.model_path = PathBuf::from(model);
        }
        if let Ok(collection) = std::env::var("OMNICONTEXT_COLLECTION") {
            self.collection = Some(collection);
        }
        if let Ok(raw) = std::env::var("PLAN_MODE") {
            self.plan_mode = parse_bool_env(&raw);
        }
    }

    /// Compute a short hash of the repo path for the data directory name.
    ///
    /// Normalizes the path to avoid Windows `\\?\` extended path prefix
    /// causing different hashes for the same physical directory.
    fn repo_hash(&self) -> String {
        use sha2::{Sha256, Digest};
        let path_str = self.repo_path.to_string_lossy();
        // Strip Windows extended path prefix for consistent hashing
        let normalized = path_str
            .strip_prefix(r"\\?\")
            .unwrap_or(&path_str);
        let mut hasher = Sha256::new();
        hasher.update(normalized.as_bytes());
        let result = hasher.finalize();
        hex::encode(&result[..4])
    }
}

/// Parse a boolean environment variable accepting `true|1|yes|on`
/// case-insensitively, per §6 of the retrieval-server interface contract.
fn parse_bool_env(raw: &str) -> bool {
    matches!(raw.to_ascii_lowercase().as_str(), "true" | "1" | "yes" | "on")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::defaults(Path::new("/tmp/test-repo"));
        assert_eq!(config.indexing.max_file_size, 5 * 1024 * 1024);
        assert_eq!(config.search.default_limit, 10);
        assert_eq!(config.embedding.dimensions, 768);
        assert_eq!(config.watcher.debounce_ms, 100);
    }

    #[test]
    fn test_language_from_extension() {
        use crate::types::Language;
        assert_eq!(Language::from_extension("py"), Language::Python);
        assert_eq!(Language::from_extension("rs"), Language::Rust);
        assert_eq!(Language::from_extension("ts"), Language::TypeScript);
        assert_eq!(Language::from_extension("tsx"), Language::TypeScript);
        assert_eq!(Language::from_extension("go"), Language::Go);
        assert_eq!(Language::from_extension("xyz"), Language::Unknown);
    }

    #[test]
    fn test_chunk_kind_weights() {
        use crate::types::ChunkKind;
        assert!(ChunkKind::Class.default_weight() > ChunkKind::Test.default_weight());
        assert!(ChunkKind::Function.default_weight() > ChunkKind::TopLevel.default_weight());
    }

    #[test]
    fn test_fusion_weight_defaults() {
        let config = Config::defaults(Path::new("/tmp/test-repo"));
        assert_eq!(config.search.semantic_weight, 0.7);
        assert_eq!(config.search.keyword_weight, 0.3);
        assert_eq!(config.search.rrf_k, 60);
    }

    #[test]
    fn test_bm25_defaults() {
        let config = Config::defaults(Path::new("/tmp/test-repo"));
        assert_eq!(config.bm25.k1, 1.2);
        assert_eq!(config.bm25.b, 0.75);
    }

    #[test]
    fn test_parse_bool_env() {
        assert!(parse_bool_env("true"));
        assert!(parse_bool_env("TRUE"));
        assert!(parse_bool_env("1"));
        assert!(parse_bool_env("yes"));
        assert!(parse_bool_env("on"));
        assert!(!parse_bool_env("false"));
        assert!(!parse_bool_env("0"));
        assert!(!parse_bool_env(""));
    }

    #[test]
    fn test_collection_name_sanitizes_repo_folder() {
        let config = Config::defaults(Path::new("/tmp/My Cool Project!"));
        assert_eq!(config.collection_name(), "my-cool-project");
    }

    #[test]
    fn test_collection_name_explicit_override() {
        let mut config = Config::defaults(Path::new("/tmp/ignored"));
        config.collection = Some("Explicit Name".to_string());
        assert_eq!(config.collection_name(), "explicit-name");
    }
}
