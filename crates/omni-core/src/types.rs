//! Core domain types shared across all omni-core subsystems.
//!
//! These types form the API contract between modules. Changing them
//! requires updating all consumers, so they should be stable and minimal.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ---------------------------------------------------------------------------
// File-level types
// ---------------------------------------------------------------------------

/// Metadata about an indexed file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileInfo {
    /// Database ID.
    pub id: i64,
    /// Path relative to the repository root.
    pub path: PathBuf,
    /// Detected programming language.
    pub language: Language,
    /// SHA-256 hash of file content at time of indexing.
    pub content_hash: String,
    /// File size in bytes.
    pub size_bytes: u64,
}

/// Row counts across the metadata store, used by `Engine::status`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexStatistics {
    /// Number of indexed files.
    pub file_count: usize,
    /// Number of chunks across all files.
    pub chunk_count: usize,
    /// Number of symbols across all files.
    pub symbol_count: usize,
    /// Number of entities across all collections.
    pub entity_count: usize,
    /// Number of relations across all collections.
    pub relation_count: usize,
}

// ---------------------------------------------------------------------------
// Language
// ---------------------------------------------------------------------------

/// Supported programming languages and document formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// Python (.py)
    Python,
    /// TypeScript (.ts, .tsx)
    TypeScript,
    /// JavaScript (.js, .jsx)
    JavaScript,
    /// Rust (.rs)
    Rust,
    /// Go (.go)
    Go,
    /// Java (.java)
    Java,
    /// C (.c, .h)
    C,
    /// C++ (.cpp, .cc, .cxx, .hpp, .hxx)
    Cpp,
    /// C# (.cs)
    CSharp,
    /// CSS / SCSS (.css, .scss)
    Css,
    /// Ruby (.rb)
    Ruby,
    /// PHP (.php)
    Php,
    /// Swift (.swift)
    Swift,
    /// Kotlin (.kt, .kts)
    Kotlin,
    /// HTML (.html, .htm)
    Html,
    /// Shell / Bash (.sh, .bash, .zsh)
    Shell,
    /// Markdown (.md, .mdx)
    Markdown,
    /// TOML configuration (.toml)
    Toml,
    /// YAML configuration (.yml, .yaml)
    Yaml,
    /// JSON data (.json, .jsonc)
    Json,
    /// Unknown / unsupported
    Unknown,
}

impl Language {
    /// Detect language from file extension.
    pub fn from_extension(ext: &str) -> Self {
        match ext {
            "py" => Self::Python,
            "ts" | "tsx" => Self::TypeScript,
            "js" | "jsx" | "mjs" | "cjs" => Self::JavaScript,
            "rs" => Self::Rust,
            "go" => Self::Go,
            "java" => Self::Java,
            "c" | "h" => Self::C,
            "cpp" | "cc" | "cxx" | "hpp" | "hxx" | "hh" => Self::Cpp,
            "cs" => Self::CSharp,
            "css" | "scss" => Self::Css,
            "rb" => Self::Ruby,
            "php" => Self::Php,
            "swift" => Self::Swift,
            "kt" | "kts" => Self::Kotlin,
            "html" | "htm" => Self::Html,
            "sh" | "bash" | "zsh" => Self::Shell,
            "md" | "mdx" => Self::Markdown,
            "toml" => Self::Toml,
            "yml" | "yaml" => Self::Yaml,
            "json" | "jsonc" => Self::Json,
            _ => Self::Unknown,
        }
    }

    /// Returns the language identifier string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::TypeScript => "typescript",
            Self::JavaScript => "javascript",
            Self::Rust => "rust",
            Self::Go => "go",
            Self::Java => "java",
            Self::C => "c",
            Self::Cpp => "cpp",
            Self::CSharp => "csharp",
            Self::Css => "css",
            Self::Ruby => "ruby",
            Self::Php => "php",
            Self::Swift => "swift",
            Self::Kotlin => "kotlin",
            Self::Html => "html",
            Self::Shell => "shell",
            Self::Markdown => "markdown",
            Self::Toml => "toml",
            Self::Yaml => "yaml",
            Self::Json => "json",
            Self::Unknown => "unknown",
        }
    }

    /// Returns true if this is an AST-parseable programming language.
    pub fn is_code(&self) -> bool {
        matches!(
            self,
            Self::Python
                | Self::TypeScript
                | Self::JavaScript
                | Self::Rust
                | Self::Go
                | Self::Java
                | Self::C
                | Self::Cpp
                | Self::CSharp
                | Self::Css
                | Self::Ruby
                | Self::Php
                | Self::Swift
                | Self::Kotlin
        )
    }

    /// Returns true if this is a documentation or config format.
    pub fn is_document(&self) -> bool {
        matches!(
            self,
            Self::Markdown | Self::Toml | Self::Yaml | Self::Json | Self::Html | Self::Shell
        )
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Chunk types
// ---------------------------------------------------------------------------

/// The kind of code construct a chunk represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    /// Function or method definition.
    Function,
    /// Class, struct, or record definition.
    Class,
    /// Trait, interface, or protocol definition.
    Trait,
    /// Implementation block (Rust `impl`, Java anonymous class, etc.).
    Impl,
    /// Constant or static variable.
    Const,
    /// Type alias or definition.
    TypeDef,
    /// Module or namespace declaration.
    Module,
    /// Test function or test block.
    Test,
    /// Top-level statements that don't fit other categories.
    TopLevel,
}

impl ChunkKind {
    /// Returns the default structural importance weight for this kind.
    pub fn default_weight(&self) -> f64 {
        match self {
            Self::Function => 0.85,
            Self::Class => 0.95,
            Self::Trait => 0.95,
            Self::Impl => 0.85,
            Self::Const => 0.70,
            Self::TypeDef => 0.90,
            Self::Module => 0.60,
            Self::Test => 0.60,
            Self::TopLevel => 0.50,
        }
    }

    /// Convert to database string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Class => "class",
            Self::Trait => "trait",
            Self::Impl => "impl",
            Self::Const => "const",
            Self::TypeDef => "typedef",
            Self::Module => "module",
            Self::Test => "test",
            Self::TopLevel => "top_level",
        }
    }

    /// Parse from database string.
    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "function" => Self::Function,
            "class" => Self::Class,
            "trait" => Self::Trait,
            "impl" => Self::Impl,
            "const" => Self::Const,
            "typedef" => Self::TypeDef,
            "module" => Self::Module,
            "test" => Self::Test,
            _ => Self::TopLevel,
        }
    }
}

/// Visibility of a code symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// Accessible from outside the module/crate.
    Public,
    /// Accessible only within the current crate/package.
    Crate,
    /// Accessible from parent class or subclasses.
    Protected,
    /// Accessible only within the defining scope.
    Private,
}

impl Visibility {
    /// Convert to database string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Crate => "crate",
            Self::Protected => "protected",
            Self::Private => "private",
        }
    }

    /// Parse from database string.
    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "public" => Self::Public,
            "crate" => Self::Crate,
            "protected" => Self::Protected,
            "private" => Self::Private,
            _ => Self::Private,
        }
    }

    /// Returns a weight multiplier for public vs private apis.
    pub fn weight_multiplier(&self) -> f64 {
        match self {
            Self::Public => 1.0,
            Self::Crate => 0.9,
            Self::Protected => 0.85,
            Self::Private => 0.70,
        }
    }
}

/// A semantically meaningful chunk of code extracted from a file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Database ID (0 if not yet persisted).
    pub id: i64,
    /// ID of the parent file in the index.
    pub file_id: i64,
    /// Fully qualified symbol path (e.g., `crate::auth::middleware::validate_token`).
    pub symbol_path: String,
    /// What kind of code construct this is.
    pub kind: ChunkKind,
    /// Visibility of the symbol.
    pub visibility: Visibility,
    /// Starting line number (1-indexed).
    pub line_start: u32,
    /// Ending line number (1-indexed, inclusive).
    pub line_end: u32,
    /// The source code content of this chunk.
    pub content: String,
    /// Extracted doc comment, if any.
    pub doc_comment: Option<String>,
    /// Estimated token count for this chunk.
    pub token_count: u32,
    /// Structural importance weight (0.0 - 1.0).
    pub weight: f64,
    /// ID of the corresponding vector in usearch (None if not yet embedded).
    pub vector_id: Option<u64>,
}

// ---------------------------------------------------------------------------
// Symbol types
// ---------------------------------------------------------------------------

/// A resolved symbol in the codebase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Symbol {
    /// Database ID.
    pub id: i64,
    /// Short name (e.g., `validate_token`).
    pub name: String,
    /// Fully qualified name (e.g., `crate::auth::middleware::validate_token`).
    pub fqn: String,
    /// What kind of symbol this is.
    pub kind: ChunkKind,
    /// File this symbol is defined in.
    pub file_id: i64,
    /// Line number of definition.
    pub line: u32,
    /// Associated chunk ID, if the full definition was chunked.
    pub chunk_id: Option<i64>,
}

// ---------------------------------------------------------------------------
// Dependency edge types
// ---------------------------------------------------------------------------

/// The kind of dependency relationship between two symbols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyKind {
    /// File/module A imports module B.
    Imports,
    /// Function A calls function B.
    Calls,
    /// Class A extends/inherits from class B.
    Extends,
    /// Struct/class A implements trait/interface B.
    Implements,
    /// Function A uses type B as parameter or return type.
    UsesType,
    /// Function A creates an instance of struct/class B.
    Instantiates,
    /// Function A accesses a field of struct B.
    FieldAccess,
}

impl DependencyKind {
    /// Convert to database string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Imports => "imports",
            Self::Calls => "calls",
            Self::Extends => "extends",
            Self::Implements => "implements",
            Self::UsesType => "uses_type",
            Self::Instantiates => "instantiates",
            Self::FieldAccess => "field_access",
        }
    }

    /// Parse from database string.
    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "imports" => Self::Imports,
            "calls" => Self::Calls,
            "extends" => Self::Extends,
            "implements" => Self::Implements,
            "uses_type" => Self::UsesType,
            "instantiates" => Self::Instantiates,
            "field_access" => Self::FieldAccess,
            _ => Self::Calls, // fallback
        }
    }
}

/// A directed edge in the dependency graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyEdge {
    /// Source symbol ID.
    pub source_id: i64,
    /// Target symbol ID.
    pub target_id: i64,
    /// Kind of dependency.
    pub kind: DependencyKind,
}

/// An import statement extracted from source code.
///
/// Used for dependency graph construction. Each import is later resolved
/// to a target symbol in the index.
#[derive(Debug, Clone)]
pub struct ImportStatement {
    /// The raw import path (e.g., "os.path", "crate::config", "./utils").
    pub import_path: String,
    /// Optional specific names imported (e.g., ["Config", "load"]).
    pub imported_names: Vec<String>,
    /// Line number where the import appears.
    pub line: u32,
    /// Kind of dependency this import represents.
    pub kind: DependencyKind,
}

// ---------------------------------------------------------------------------
// Search types
// ---------------------------------------------------------------------------

/// A search result with scoring details.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// The matched chunk.
    pub chunk: Chunk,
    /// File path of the matched chunk.
    pub file_path: PathBuf,
    /// Overall relevance score (higher is better).
    pub score: f64,
    /// Breakdown of how the score was computed (for debugging).
    pub score_breakdown: ScoreBreakdown,
}

/// Detailed scoring breakdown for a search result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    /// Rank from semantic (vector) search (None if keyword-only match).
    pub semantic_rank: Option<u32>,
    /// Rank from keyword (FTS5) search (None if semantic-only match).
    pub keyword_rank: Option<u32>,
    /// RRF fusion score (before reranking).
    pub rrf_score: f64,
    /// Cross-encoder reranker score (None if not reranked).
    pub reranker_score: Option<f64>,
    /// Structural importance weight applied.
    pub structural_weight: f64,
    /// Dependency proximity boost applied.
    pub dependency_boost: f64,
    /// Recency boost applied.
    pub recency_boost: f64,
}

// ---------------------------------------------------------------------------
// Pipeline events
// ---------------------------------------------------------------------------

/// Events flowing through the indexing pipeline.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// A file was created or modified and needs (re-)indexing.
    FileChanged {
        /// Absolute path to the file.
        path: PathBuf,
    },
    /// A file was deleted and should be removed from the index.
    FileDeleted {
        /// Absolute path to the deleted file.
        path: PathBuf,
    },
    /// A full repository scan is requested.
    FullScan,
    /// Shutdown the pipeline gracefully.
    Shutdown,
}

// ---------------------------------------------------------------------------
// Context assembly types
// ---------------------------------------------------------------------------

/// Priority level for chunks in context assembly.
///
/// Used to pack maximum relevant context within token budget by
/// prioritizing critical chunks and compressing low-priority ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkPriority {
    /// Critical context: active file, cursor context, direct dependencies.
    /// Always included, never compressed.
    Critical = 4,
    /// High relevance: search results with score >0.8, test files.
    /// Included if space available, minimal compression.
    High = 3,
    /// Medium relevance: search results with score 0.5-0.8, related files.
    /// Included if space available, moderate compression.
    Medium = 2,
    /// Low relevance: architectural context, documentation, distant dependencies.
    /// Included only if space available, aggressive compression.
    Low = 1,
}

impl ChunkPriority {
    /// Determine priority from search score and context flags.
    pub fn from_score_and_context(
        score: f64,
        is_active_file: bool,
        is_test: bool,
        is_graph_neighbor: bool,
    ) -> Self {
        if is_active_file {
            return Self::Critical;
        }

        if is_test {
            return Self::High;
        }

        if is_graph_neighbor {
            return Self::Medium;
        }

        // Score-based priority
        if score >= 0.8 {
            Self::High
        } else if score >= 0.5 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    /// Compression factor for this priority (0.0 = no compression, 1.0 = maximum).
    pub fn compression_factor(&self) -> f64 {
        match self {
            Self::Critical => 0.0, // Never compress
            Self::High => 0.1,     // Minimal compression (10%)
            Self::Medium => 0.3,   // Moderate compression (30%)
            Self::Low => 0.6,      // Aggressive compression (60%)
        }
    }
}

/// A token-budget-aware context window assembled from search results.
///
/// Groups chunks by file and includes graph-neighbor chunks for
/// maximum relevant context within a fixed token budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextWindow {
    /// Ordered entries (highest score first).
    pub entries: Vec<ContextEntry>,
    /// Total tokens consumed.
    pub total_tokens: u32,
    /// Token budget this window was assembled for.
    pub token_budget: u32,
}

/// A single entry in a context window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextEntry {
    /// File path of this chunk.
    pub file_path: PathBuf,
    /// The code chunk.
    pub chunk: Chunk,
    /// Relevance score.
    pub score: f64,
    /// Whether this chunk was included via graph traversal (not direct search match).
    pub is_graph_neighbor: bool,
    /// Priority level for this chunk.
    #[serde(default)]
    pub priority: Option<ChunkPriority>,
}

impl ContextWindow {
    /// Render the context window as a single string suitable for LLM consumption.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let mut current_file: Option<&std::path::Path> = None;

        for entry in &self.entries {
            if current_file != Some(&entry.file_path) {
                if current_file.is_some() {
                    out.push_str("\n\n");
                }
                out.push_str(&format!("// === {} ===\n", entry.file_path.display()));
                current_file = Some(&entry.file_path);
            }
            out.push_str(&entry.chunk.content);
            out.push('\n');
        }

        out
    }

    /// Number of entries in this window.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the window is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Entity / Relation / Collection — storage-layer data model
// ---------------------------------------------------------------------------

/// What kind of indexable unit an [`Entity`] represents.
///
/// Broader than [`ChunkKind`]: code chunks are one source of entities, but
/// documentation, requirements, and hand-authored patterns/issues/ideas are
/// entities too.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    /// Function definition.
    Function,
    /// Class, struct, or record definition.
    Class,
    /// Method defined on a class/struct/trait impl.
    Method,
    /// Whole-file entity (used for light-tier files and markup/stylesheet files).
    File,
    /// A documentation section (Markdown heading, doc comment block).
    Documentation,
    /// An extracted requirement (RFC 2119 keyword, bracketed ID, numbered clause).
    Requirement,
    /// A specification document.
    Spec,
    /// A product-requirements document.
    Prd,
    /// A technical-design document.
    Tdd,
    /// An architecture decision record.
    Adr,
    /// A recorded debugging pattern (symptom -> root cause -> fix).
    DebuggingPattern,
    /// A recorded implementation pattern.
    ImplementationPattern,
    /// A recorded integration pattern (how two systems are wired together).
    IntegrationPattern,
    /// A recorded configuration pattern.
    ConfigurationPattern,
    /// A recorded architecture pattern.
    ArchitecturePattern,
    /// A recorded performance pattern or anti-pattern.
    PerformancePattern,
    /// A standalone knowledge insight not tied to a code location.
    KnowledgeInsight,
    /// An actively tracked issue.
    ActiveIssue,
    /// An idea or proposal not yet scheduled as work.
    Idea,
}

impl EntityType {
    /// Database/wire string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Class => "class",
            Self::Method => "method",
            Self::File => "file",
            Self::Documentation => "documentation",
            Self::Requirement => "requirement",
            Self::Spec => "spec",
            Self::Prd => "prd",
            Self::Tdd => "tdd",
            Self::Adr => "adr",
            Self::DebuggingPattern => "debugging_pattern",
            Self::ImplementationPattern => "implementation_pattern",
            Self::IntegrationPattern => "integration_pattern",
            Self::ConfigurationPattern => "configuration_pattern",
            Self::ArchitecturePattern => "architecture_pattern",
            Self::PerformancePattern => "performance_pattern",
            Self::KnowledgeInsight => "knowledge_insight",
            Self::ActiveIssue => "active_issue",
            Self::Idea => "idea",
        }
    }

    /// Parse from database string, defaulting to `KnowledgeInsight` for
    /// unrecognised values rather than failing a whole read.
    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "function" => Self::Function,
            "class" => Self::Class,
            "method" => Self::Method,
            "file" => Self::File,
            "documentation" => Self::Documentation,
            "requirement" => Self::Requirement,
            "spec" => Self::Spec,
            "prd" => Self::Prd,
            "tdd" => Self::Tdd,
            "adr" => Self::Adr,
            "debugging_pattern" => Self::DebuggingPattern,
            "implementation_pattern" => Self::ImplementationPattern,
            "integration_pattern" => Self::IntegrationPattern,
            "configuration_pattern" => Self::ConfigurationPattern,
            "architecture_pattern" => Self::ArchitecturePattern,
            "performance_pattern" => Self::PerformancePattern,
            "active_issue" => Self::ActiveIssue,
            "idea" => Self::Idea,
            _ => Self::KnowledgeInsight,
        }
    }

    /// Whether entities of this type are manually authored (as opposed to
    /// produced by the parser) and therefore mirrored to the JSON fallback.
    pub fn is_manual(&self) -> bool {
        matches!(
            self,
            Self::DebuggingPattern
                | Self::ImplementationPattern
                | Self::IntegrationPattern
                | Self::ConfigurationPattern
                | Self::ArchitecturePattern
                | Self::PerformancePattern
                | Self::KnowledgeInsight
                | Self::ActiveIssue
                | Self::Idea
        )
    }
}

/// The two granularities an entity can be chunked at for progressive
/// disclosure: retrieval prefers `Metadata`, and only expands to
/// `Implementation` on explicit request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityChunkKind {
    /// Name, signature, location, short observations (~300 tokens or less).
    Metadata,
    /// Full source body.
    Implementation,
}

impl EntityChunkKind {
    /// Database/wire string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Metadata => "metadata",
            Self::Implementation => "implementation",
        }
    }

    /// Parse from database string.
    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "implementation" => Self::Implementation,
            _ => Self::Metadata,
        }
    }
}

/// An opaque, typed metadata bag attached to an [`Entity`].
///
/// Thin wrapper over a JSON object so unknown fields round-trip, with
/// accessors for the well-known keys the search/context layers read.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct EntityMetadata(pub serde_json::Map<String, serde_json::Value>);

impl EntityMetadata {
    /// Build metadata from the well-known fields the indexer populates.
    pub fn for_code(language: Language, visibility: Visibility, complexity_tier: &str) -> Self {
        let mut map = serde_json::Map::new();
        map.insert("language".into(), serde_json::Value::from(language.as_str()));
        map.insert("visibility".into(), serde_json::Value::from(visibility.as_str()));
        map.insert("complexity_tier".into(), serde_json::Value::from(complexity_tier));
        Self(map)
    }

    /// The `language` field, if present.
    pub fn language(&self) -> Option<&str> {
        self.0.get("language").and_then(|v| v.as_str())
    }

    /// The `visibility` field, if present.
    pub fn visibility(&self) -> Option<&str> {
        self.0.get("visibility").and_then(|v| v.as_str())
    }

    /// The `complexity_tier` field, if present.
    pub fn complexity_tier(&self) -> Option<&str> {
        self.0.get("complexity_tier").and_then(|v| v.as_str())
    }
}

/// One indexable unit in the knowledge base: a function, class, file,
/// documentation section, requirement, manually-authored pattern, etc.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    /// Stable id derived from `{collection, source_path, qualified_name,
    /// entity_type, chunk_kind}`; deterministic across runs.
    pub id: String,
    /// Collection this entity belongs to.
    pub collection: String,
    /// What kind of indexable unit this is.
    pub entity_type: EntityType,
    /// Metadata vs. implementation granularity.
    pub chunk_kind: EntityChunkKind,
    /// Short name.
    pub name: String,
    /// Fully qualified name.
    pub qualified_name: String,
    /// Repository-relative source path (empty for entities with no file,
    /// e.g. a hand-authored idea).
    pub source_path: PathBuf,
    /// Starting line (1-indexed); 0 when not applicable.
    pub line_start: u32,
    /// Ending line (1-indexed, inclusive); 0 when not applicable.
    pub line_end: u32,
    /// Ordered short observations (docstring summary, tags, signals).
    pub observations: Vec<String>,
    /// Textual payload that gets embedded.
    pub content: String,
    /// Dense embedding of `content`; present only after embedding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector: Option<Vec<f32>>,
    /// Opaque metadata bag.
    #[serde(default)]
    pub metadata: EntityMetadata,
}

impl Entity {
    /// Derive the stable id for an entity from its identity fields.
    ///
    /// Re-indexing unchanged content MUST produce the same id, so this is a
    /// pure function of the identity fields, never of content or vector.
    pub fn derive_id(
        collection: &str,
        source_path: &std::path::Path,
        qualified_name: &str,
        entity_type: EntityType,
        chunk_kind: EntityChunkKind,
    ) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(collection.as_bytes());
        hasher.update(b"\0");
        hasher.update(source_path.to_string_lossy().as_bytes());
        hasher.update(b"\0");
        hasher.update(qualified_name.as_bytes());
        hasher.update(b"\0");
        hasher.update(entity_type.as_str().as_bytes());
        hasher.update(b"\0");
        hasher.update(chunk_kind.as_str().as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// The kind of directed relationship between two entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    /// A imports B.
    Imports,
    /// A calls B.
    Calls,
    /// A inherits from B.
    Inherits,
    /// A references B without calling or importing it.
    References,
    /// A is defined in B (symbol -> file).
    DefinedIn,
    /// A (documentation) documents B.
    Documents,
    /// A implements requirement B.
    ImplementsRequirement,
}

impl RelationKind {
    /// Database/wire string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Imports => "imports",
            Self::Calls => "calls",
            Self::Inherits => "inherits",
            Self::References => "references",
            Self::DefinedIn => "defined_in",
            Self::Documents => "documents",
            Self::ImplementsRequirement => "implements_requirement",
        }
    }

    /// Parse from database string.
    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "imports" => Self::Imports,
            "calls" => Self::Calls,
            "inherits" => Self::Inherits,
            "defined_in" => Self::DefinedIn,
            "documents" => Self::Documents,
            "implements_requirement" => Self::ImplementsRequirement,
            _ => Self::References,
        }
    }
}

/// A directed edge between two entities, stored alongside entities in the
/// same collection so graph traversals reuse the same retrieval primitives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relation {
    /// Source entity id.
    pub from_id: String,
    /// Target entity id.
    pub to_id: String,
    /// Kind of relationship.
    pub kind: RelationKind,
    /// Optional edge weight.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
}

/// Per-collection persistent record of a single file's last-indexed state.
///
/// Drives incremental updates: unchanged hash means skip, removed path
/// means delete `entity_ids`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerStateEntry {
    /// SHA-256 content hash at last successful index.
    pub content_hash: String,
    /// Unix timestamp (seconds) of last successful index.
    pub last_indexed_at: i64,
    /// Ids of every entity produced from this file.
    pub entity_ids: Vec<String>,
}

/// Sanitise a project name into a collection identifier: lowercase ASCII
/// plus hyphens, non-matching characters replaced with `-`, runs collapsed.
pub fn sanitize_collection_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_was_dash = false;
    for ch in name.to_ascii_lowercase().chars() {
        let mapped = if ch.is_ascii_alphanumeric() { Some(ch) } else { None };
        match mapped {
            Some(c) => {
                out.push(c);
                last_was_dash = false;
            }
            None => {
                if !last_was_dash && !out.is_empty() {
                    out.push('-');
                    last_was_dash = true;
                }
            }
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    if out.is_empty() {
        "default".to_string()
    } else {
        out
    }
}

// ---------------------------------------------------------------------------
// Plan-mode guardrail types
// ---------------------------------------------------------------------------

/// A unit of planned work validated by the guardrail engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    /// Stable task id (e.g. `TASK-001` or a UUID-derived string).
    pub id: String,
    /// Short title.
    pub title: String,
    /// Longer description.
    pub description: String,
    /// Affected file paths / area of the codebase.
    #[serde(default)]
    pub scope: Vec<String>,
    /// Relative priority (lower is more urgent), operator-defined scale.
    pub priority: u32,
    /// Rough effort estimate in the operator's own unit (story points, hours).
    pub effort: f64,
    /// Rough impact estimate, same convention.
    pub impact: f64,
    /// Acceptance criteria, one string per criterion.
    #[serde(default)]
    pub acceptance_criteria: Vec<String>,
    /// Ids of tasks this one depends on.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Free-form tags (e.g. `"testing"`, `"docs"`).
    #[serde(default)]
    pub tags: Vec<String>,
}

/// A plan under validation: an ordered set of tasks plus its revision
/// history.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ImplementationPlan {
    /// The tasks that make up this plan.
    pub tasks: Vec<Task>,
    /// Every revision the engine has applied, in application order.
    #[serde(default)]
    pub revision_history: Vec<AppliedRevision>,
}

/// Severity of a guardrail finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Informational; unlikely to need action.
    Low,
    /// Worth a look but not blocking.
    Medium,
    /// Should be addressed before proceeding.
    High,
    /// Must be addressed; indicates a serious gap.
    Critical,
}

/// The category a guardrail rule belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleCategory {
    /// Test/documentation coverage rules.
    Coverage,
    /// Internal plan consistency (duplicates, missing links).
    Consistency,
    /// Architectural convention rules.
    Architecture,
    /// Performance anti-pattern rules.
    Performance,
}

/// A problem the guardrail engine found in a plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanValidationFinding {
    /// Id of the rule that produced this finding.
    pub rule_id: String,
    /// Severity of the finding.
    pub severity: Severity,
    /// Human-readable summary.
    pub summary: String,
    /// Ids of tasks this finding concerns.
    pub affected_tasks: Vec<String>,
    /// Suggested remediation text (human-readable).
    pub suggestion: String,
    /// Confidence in [0.0, 1.0] that the finding is a true positive.
    pub confidence: f64,
    /// A machine-applicable revision, if the rule can propose one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_revision: Option<PlanRevision>,
}

/// The kind of mutation a [`PlanRevision`] performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevisionType {
    /// Insert a new task.
    AddTask,
    /// Change fields on an existing task.
    ModifyTask,
    /// Delete a task.
    RemoveTask,
    /// Add a dependency edge between two existing tasks.
    AddDependency,
    /// Change the relative ordering (priority) of tasks.
    ReorderTasks,
}

impl RevisionType {
    /// Fixed application order used when sorting findings within the same
    /// severity bucket: add_task, modify_task, add_dependency,
    /// reorder_tasks, remove_task.
    pub fn application_rank(&self) -> u8 {
        match self {
            Self::AddTask => 0,
            Self::ModifyTask => 1,
            Self::AddDependency => 2,
            Self::ReorderTasks => 3,
            Self::RemoveTask => 4,
        }
    }
}

/// A proposed mutation to a plan, produced by a rule's `suggest_revision`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanRevision {
    /// What kind of mutation this is.
    pub revision_type: RevisionType,
    /// Human-readable rationale, used in the audit trail.
    pub rationale: String,
    /// The task this revision targets (for modify/remove/add_dependency).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_task_id: Option<String>,
    /// A new task to insert (for `add_task`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_task: Option<Task>,
    /// Field-level modifications to apply (for `modify_task`): field name
    /// to new JSON value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modifications: Option<serde_json::Map<String, serde_json::Value>>,
    /// Dependency ids to add to `target_task_id` (for `add_dependency`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependency_additions: Option<Vec<String>>,
}

/// A revision the engine actually applied, recorded for audit purposes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppliedRevision {
    /// Id of the rule whose finding produced this revision.
    pub rule_id: String,
    /// Rationale copied from the revision.
    pub rationale: String,
    /// Human-readable snapshot of the plan state before the revision.
    pub before_snippet: String,
    /// Human-readable snapshot of the plan state after the revision.
    pub after_snippet: String,
    /// Confidence of the originating finding.
    pub confidence: f64,
}

/// Aggregated result of running the guardrail engine once.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PlanGuardrailResult {
    /// Every finding produced by every rule that ran.
    pub findings: Vec<PlanValidationFinding>,
    /// Per-rule wall-clock timings in milliseconds.
    pub timings: Vec<(String, u64)>,
    /// Rules that errored, with their error message.
    pub errors: Vec<(String, String)>,
    /// Revisions rejected during auto-revision, with the rejection reason.
    #[serde(default)]
    pub revisions_skipped: Vec<(PlanRevision, String)>,
}

/// Processing tier assigned to a discovered file.
///
/// Tiers trade parse depth for throughput: `Light` files get a metadata-only
/// pass, `Deep` files get full semantic enhancement, `Standard` is the
/// default.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FileTier {
    /// Generated files, minified bundles, declaration files: metadata only,
    /// no implementation chunks, no relations.
    Light,
    /// Everything that isn't explicitly light or deep.
    Standard,
    /// Core business logic (routes, state containers, auth): full parse plus
    /// language-specific semantic enhancement.
    Deep,
}

impl FileTier {
    /// Returns the tier identifier string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Standard => "standard",
            Self::Deep => "deep",
        }
    }
}

impl std::fmt::Display for FileTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single file yielded by discovery, paired with its assigned tier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiscoveredFile {
    /// Path relative to the collection root, `/`-separated.
    pub rel_path: String,
    /// Absolute path on disk.
    pub abs_path: std::path::PathBuf,
    /// Assigned processing tier.
    pub tier: FileTier,
}
