//! MCP tool definitions for OmniContext.
//!
//! Each tool is annotated with `#[tool]` and exposes a retrieval-server
//! capability to AI coding agents via the Model Context Protocol. Every tool
//! returns the same JSON envelope (see [`ToolEnvelope`]) serialised into a
//! single text content block, so callers get a uniform shape regardless of
//! which tool answered.
//!
//! ## Thread Safety
//!
//! `Engine` contains a `rusqlite::Connection` which is `!Sync`. We wrap it
//! in a `tokio::sync::Mutex` so that the MCP server can safely share it
//! across async tasks.

use std::path::PathBuf;
use std::sync::Arc;

use rmcp::{
    ErrorData as McpError,
    handler::server::tool::ToolRouter,
    handler::server::wrapper::Parameters,
    model::*,
    tool, tool_handler, tool_router,
    ServerHandler,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use omni_core::{
    Chunk, Engine, Entity, EntityChunkKind, EntityType, OmniError, Relation, RelationKind,
    SearchMode, SearchResult, Symbol, TicketQuery,
};

// -----------------------------------------------------------------------
// Retrieval envelope (spec §6 / §4.G)
// -----------------------------------------------------------------------

/// Every tool spends this many estimated tokens before it stops adding
/// results and sets `truncated = true`. Matches the byte-pair-style
/// estimate used elsewhere in the crate: roughly four bytes per token.
const DEFAULT_TOKEN_BUDGET: u32 = 25_000;

fn estimate_tokens(s: &str) -> u32 {
    (s.len() / 4).max(1) as u32
}

/// One retrieval result. `language`/`signature` are only populated for
/// implementation-scope results (`get_implementation`, `mode=raw`).
#[derive(Debug, Clone, Serialize)]
pub struct ResultItem {
    pub id: String,
    pub entity_type: String,
    pub name: String,
    pub source_path: String,
    pub line_start: u32,
    pub line_end: u32,
    pub score: f64,
    pub content: String,
    pub observations: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolEnvelope {
    pub results: Vec<ResultItem>,
    pub truncated: bool,
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorPayload>,
}

impl ToolEnvelope {
    fn empty() -> Self {
        Self {
            results: Vec::new(),
            truncated: false,
            warnings: Vec::new(),
            error: None,
        }
    }

    fn error(code: &str, message: impl Into<String>) -> Self {
        Self {
            results: Vec::new(),
            truncated: false,
            warnings: Vec::new(),
            error: Some(ErrorPayload {
                code: code.to_string(),
                message: message.into(),
                details: None,
            }),
        }
    }

    /// Build an envelope from candidates, stopping once `budget` estimated
    /// tokens have been spent (§4.G "Token budget").
    fn from_candidates(candidates: Vec<ResultItem>, warnings: Vec<String>, budget: u32) -> Self {
        let mut results = Vec::new();
        let mut spent = 0u32;
        let mut truncated = false;
        for item in candidates {
            let cost = estimate_tokens(&item.content);
            if spent + cost > budget && !results.is_empty() {
                truncated = true;
                break;
            }
            spent += cost;
            results.push(item);
        }
        Self {
            results,
            truncated,
            warnings,
            error: None,
        }
    }

    fn to_content(&self) -> Content {
        Content::text(serde_json::to_string(self).unwrap_or_else(|e| {
            format!(r#"{{"results":[],"truncated":false,"warnings":[],"error":{{"code":"SERIALIZATION_FAILED","message":"{e}"}}}}"#)
        }))
    }
}

/// Plan-mode denial shape (spec §4.G / §6 "Plan-Mode error"), distinct from
/// [`ToolEnvelope`] because it is returned by write tools instead of, not
/// inside, the normal results envelope.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct PlanModeDeniedResponse {
    error: &'static str,
    tool: String,
    plan_mode_active: bool,
    blocked_tools: Vec<&'static str>,
    hint: String,
}

/// Every write/relation-mutating tool name, reported verbatim in
/// `blockedTools` on a plan-mode denial.
const WRITE_TOOLS: &[&str] = &[
    "create_entities",
    "delete_entities",
    "add_observations",
    "delete_observations",
    "create_relations",
    "delete_relations",
];

fn plan_mode_denied(tool: &str, hint: String) -> Content {
    let payload = PlanModeDeniedResponse {
        error: "PLAN_MODE_ACCESS_DENIED",
        tool: tool.to_string(),
        plan_mode_active: true,
        blocked_tools: WRITE_TOOLS.to_vec(),
        hint,
    };
    Content::text(serde_json::to_string(&payload).unwrap_or_else(|e| {
        format!(r#"{{"error":"PLAN_MODE_ACCESS_DENIED","tool":"{tool}","planModeActive":true,"blockedTools":[],"hint":"{e}"}}"#)
    }))
}

/// Shared helper: every write tool calls this first and, on denial, returns
/// its structured JSON payload straight away instead of an `McpError` --
/// the caller needs to read `blockedTools`, not just see a protocol error.
fn check_write_allowed(engine: &Engine, tool: &str) -> Result<(), CallToolResult> {
    match engine.check_plan_mode(tool) {
        Ok(()) => Ok(()),
        Err(OmniError::PlanModeDenied { hint, .. }) => {
            Err(CallToolResult::success(vec![plan_mode_denied(tool, hint)]))
        }
        Err(e) => Err(CallToolResult::success(vec![ToolEnvelope::error(
            "INTERNAL",
            e.to_string(),
        )
        .to_content()])),
    }
}

// -----------------------------------------------------------------------
// Entity-type / chunk-kind translation
// -----------------------------------------------------------------------

/// Chunks come from the parser/chunker path and carry a [`ChunkKind`], not
/// an [`EntityType`]; map the narrower set onto the wider one so
/// `search_similar`/`get_implementation` results fit the same envelope as
/// entities from the storage layer. Lossy by nature -- several chunk kinds
/// (traits, impls, modules) don't have a dedicated entity type.
fn chunk_kind_to_entity_type(kind: omni_core::ChunkKind) -> EntityType {
    use omni_core::ChunkKind;
    match kind {
        ChunkKind::Function | ChunkKind::Test => EntityType::Function,
        ChunkKind::Class | ChunkKind::Trait | ChunkKind::Impl | ChunkKind::TypeDef => {
            EntityType::Class
        }
        ChunkKind::Const | ChunkKind::Module | ChunkKind::TopLevel => EntityType::File,
    }
}

/// Metadata-level summary of a chunk: signature line plus doc comment, never
/// the full body. Searches return this by default (§4.G "progressive
/// disclosure"); only `get_implementation` returns the full chunk content.
fn chunk_summary(chunk: &Chunk) -> String {
    let signature = chunk.content.lines().next().unwrap_or("").trim();
    match &chunk.doc_comment {
        Some(doc) => format!("{signature}\n{doc}"),
        None => signature.to_string(),
    }
}

fn chunk_result_item(result: &SearchResult) -> ResultItem {
    let entity_type = chunk_kind_to_entity_type(result.chunk.kind);
    ResultItem {
        id: format!("chunk:{}", result.chunk.id),
        entity_type: entity_type.as_str().to_string(),
        name: result.chunk.symbol_path.clone(),
        source_path: result.file_path.display().to_string(),
        line_start: result.chunk.line_start,
        line_end: result.chunk.line_end,
        score: result.score,
        content: chunk_summary(&result.chunk),
        observations: result.chunk.doc_comment.iter().cloned().collect(),
        language: None,
        signature: None,
    }
}

fn entity_result_item(entity: &Entity) -> ResultItem {
    ResultItem {
        id: entity.id.clone(),
        entity_type: entity.entity_type.as_str().to_string(),
        name: entity.name.clone(),
        source_path: entity.source_path.display().to_string(),
        line_start: entity.line_start,
        line_end: entity.line_end,
        score: 1.0,
        content: entity.content.clone(),
        observations: entity.observations.clone(),
        language: entity.metadata.language().map(str::to_string),
        signature: None,
    }
}

fn chunk_to_implementation_item(
    chunk: &Chunk,
    symbol: &Symbol,
    file_path: &str,
    language: Option<String>,
) -> ResultItem {
    let entity_type = chunk_kind_to_entity_type(chunk.kind);
    ResultItem {
        id: format!("chunk:{}", chunk.id),
        entity_type: entity_type.as_str().to_string(),
        name: symbol.fqn.clone(),
        source_path: file_path.to_string(),
        line_start: chunk.line_start,
        line_end: chunk.line_end,
        score: 1.0,
        content: chunk.content.clone(),
        observations: chunk.doc_comment.iter().cloned().collect(),
        language,
        signature: chunk.content.lines().next().map(str::trim).map(str::to_string),
    }
}

// -----------------------------------------------------------------------
// Parameter structs for each tool
// -----------------------------------------------------------------------

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct SearchSimilarParams {
    /// Natural-language or symbol-name query.
    pub query: String,
    /// Restrict results to these entity types (e.g. "function", "class").
    pub entity_types: Option<Vec<String>>,
    /// Maximum number of results to return (default: 10).
    pub limit: Option<usize>,
    /// Retrieval mode: "semantic", "keyword", or "hybrid" (default).
    pub mode: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ReadGraphParams {
    /// Entity id to center the traversal on. Omit for a collection-wide overview.
    pub entity: Option<String>,
    /// Traversal mode: "smart" (default), "entities", "relationships", or "raw".
    pub mode: Option<String>,
    /// Maximum number of results to return (default: 20).
    pub limit: Option<usize>,
    /// Restrict results to these entity types.
    pub entity_types: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct GetImplementationParams {
    /// Fully qualified (or short) symbol name.
    pub name: String,
    /// "minimal" (default), "logical", or "dependencies".
    pub scope: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct SearchDocsParams {
    /// Free-text query.
    pub query: String,
    /// Restrict to these documentation entity types (e.g. "adr", "spec").
    pub doc_types: Option<Vec<String>>,
    /// Maximum number of results to return (default: 10).
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct GetDocParams {
    /// Entity id of the documentation entity.
    pub doc_id: String,
    /// Markdown heading text to extract a single section, if present.
    pub section: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct SearchTicketsParams {
    /// Free-text query.
    pub query: String,
    /// Restrict to this status (tracker-specific, e.g. "open").
    pub status: Option<String>,
    /// Restrict to tickets carrying all of these labels.
    pub labels: Option<Vec<String>>,
    /// Restrict to this source tracker (e.g. "jira", "github").
    pub source: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct GetTicketParams {
    /// Tracker-assigned ticket id.
    pub id: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct EntityInput {
    /// Entity type (e.g. "knowledge_insight", "active_issue", "idea").
    pub entity_type: String,
    /// Short name.
    pub name: String,
    /// Fully qualified name; defaults to `name` if omitted.
    pub qualified_name: Option<String>,
    /// Repository-relative source path, if any.
    pub source_path: Option<String>,
    /// Starting line, if applicable.
    pub line_start: Option<u32>,
    /// Ending line, if applicable.
    pub line_end: Option<u32>,
    /// Initial observations.
    pub observations: Option<Vec<String>>,
    /// Textual payload.
    pub content: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct CreateEntitiesParams {
    pub entities: Vec<EntityInput>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct DeleteEntitiesParams {
    pub ids: Vec<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct AddObservationsParams {
    pub entity_id: String,
    pub observations: Vec<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct DeleteObservationsParams {
    pub entity_id: String,
    pub observations: Vec<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct RelationInput {
    pub from_id: String,
    pub to_id: String,
    /// Relation kind (e.g. "calls", "imports", "references").
    pub kind: String,
    pub weight: Option<f64>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct CreateRelationsParams {
    pub relations: Vec<RelationInput>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct DeleteRelationsParams {
    pub relations: Vec<RelationInput>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct SetPlanModeParams {
    /// Whether plan mode (read-only) should be active.
    pub enabled: bool,
}

// -----------------------------------------------------------------------
// MCP Server
// -----------------------------------------------------------------------

/// OmniContext MCP Server.
///
/// Exposes the retrieval-server tool surface to AI coding agents.
#[derive(Clone)]
pub struct OmniContextServer {
    engine: Arc<Mutex<Engine>>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl OmniContextServer {
    /// Create a new MCP server backed by the given engine.
    pub fn new(engine: Engine) -> Self {
        Self {
            engine: Arc::new(Mutex::new(engine)),
            tool_router: Self::tool_router(),
        }
    }

    #[tool(
        name = "search_similar",
        description = "Hybrid retrieval over the codebase: blends dense-vector and keyword (BM25) search via reciprocal-rank fusion. Returns metadata-level results by default; use get_implementation for full source. mode: semantic | keyword | hybrid (default)."
    )]
    async fn search_similar(
        &self,
        params: Parameters<SearchSimilarParams>,
    ) -> Result<CallToolResult, McpError> {
        let limit = params.0.limit.unwrap_or(10);
        let mode = match params.0.mode.as_deref() {
            Some("semantic") => SearchMode::Semantic,
            Some("keyword") => SearchMode::Keyword,
            _ => SearchMode::Hybrid,
        };
        let engine = self.engine.lock().await;

        match engine.search_with_mode(&params.0.query, limit, mode) {
            Ok((results, mut warnings)) => {
                let wanted: Option<Vec<EntityType>> = params.0.entity_types.as_ref().map(|types| {
                    types.iter().map(|t| EntityType::from_str_lossy(t)).collect()
                });

                let mut candidates: Vec<ResultItem> =
                    results.iter().map(chunk_result_item).collect();
                if let Some(wanted) = &wanted {
                    let wanted_strs: Vec<&str> = wanted.iter().map(|t| t.as_str()).collect();
                    candidates.retain(|item| wanted_strs.contains(&item.entity_type.as_str()));
                }
                if candidates.is_empty() && wanted.is_some() {
                    warnings.push("no results matched the requested entity_types".to_string());
                }

                let envelope = ToolEnvelope::from_candidates(candidates, warnings, DEFAULT_TOKEN_BUDGET);
                Ok(CallToolResult::success(vec![envelope.to_content()]))
            }
            Err(e) => Ok(CallToolResult::success(vec![
                ToolEnvelope::error("SEARCH_FAILED", e.to_string()).to_content(),
            ])),
        }
    }

    #[tool(
        name = "read_graph",
        description = "Traverse the entity/relation graph. mode=entities lists entities (optionally filtered by entity_types); mode=relationships/raw require `entity` and return its relations or full record; mode=smart (default) returns a summarised overview centered on `entity`, or across the collection if omitted."
    )]
    async fn read_graph(
        &self,
        params: Parameters<ReadGraphParams>,
    ) -> Result<CallToolResult, McpError> {
        let limit = params.0.limit.unwrap_or(20);
        let mode = params.0.mode.as_deref().unwrap_or("smart");
        let entity_type = params
            .0
            .entity_types
            .as_ref()
            .and_then(|types| types.first())
            .map(|t| EntityType::from_str_lossy(t));
        let engine = self.engine.lock().await;
        let index = engine.metadata_index();
        let collection = engine.collection_name();

        let mut warnings = Vec::new();

        let candidates: Vec<ResultItem> = match mode {
            "entities" => match index.list_entities(&collection, entity_type, limit) {
                Ok(entities) => entities.iter().map(entity_result_item).collect(),
                Err(e) => {
                    return Ok(CallToolResult::success(vec![
                        ToolEnvelope::error("GRAPH_READ_FAILED", e.to_string()).to_content(),
                    ]));
                }
            },
            "relationships" | "raw" => {
                let Some(entity_id) = params.0.entity.as_deref() else {
                    warnings.push(format!("mode={mode} requires `entity`; returning entity list instead"));
                    match index.list_entities(&collection, entity_type, limit) {
                        Ok(entities) => entities.iter().map(entity_result_item).collect(),
                        Err(e) => {
                            return Ok(CallToolResult::success(vec![
                                ToolEnvelope::error("GRAPH_READ_FAILED", e.to_string()).to_content(),
                            ]));
                        }
                    }
                } else if mode == "raw" {
                    match index.get_entity(entity_id) {
                        Ok(Some(entity)) => vec![entity_result_item(&entity)],
                        Ok(None) => {
                            return Ok(CallToolResult::success(vec![
                                ToolEnvelope::error("NOT_FOUND", format!("no entity `{entity_id}`"))
                                    .to_content(),
                            ]));
                        }
                        Err(e) => {
                            return Ok(CallToolResult::success(vec![
                                ToolEnvelope::error("GRAPH_READ_FAILED", e.to_string()).to_content(),
                            ]));
                        }
                    }
                } else {
                    match relation_neighbourhood(index, entity_id, limit) {
                        Ok(items) => items,
                        Err(e) => {
                            return Ok(CallToolResult::success(vec![
                                ToolEnvelope::error("GRAPH_READ_FAILED", e.to_string()).to_content(),
                            ]));
                        }
                    }
                }
            }
            _ => match params.0.entity.as_deref() {
                Some(entity_id) => match smart_overview(index, entity_id, limit) {
                    Ok(items) => items,
                    Err(e) => {
                        return Ok(CallToolResult::success(vec![
                            ToolEnvelope::error("GRAPH_READ_FAILED", e.to_string()).to_content(),
                        ]));
                    }
                },
                None => match index.list_entities(&collection, entity_type, limit) {
                    Ok(entities) => entities.iter().map(entity_result_item).collect(),
                    Err(e) => {
                        return Ok(CallToolResult::success(vec![
                            ToolEnvelope::error("GRAPH_READ_FAILED", e.to_string()).to_content(),
                        ]));
                    }
                },
            },
        };

        let envelope = ToolEnvelope::from_candidates(candidates, warnings, DEFAULT_TOKEN_BUDGET);
        Ok(CallToolResult::success(vec![envelope.to_content()]))
    }

    #[tool(
        name = "get_implementation",
        description = "Fetch the full implementation source for a symbol. scope=minimal (default) returns just the named symbol; logical adds directly-called helpers in the same file; dependencies additionally follows imports one hop."
    )]
    async fn get_implementation(
        &self,
        params: Parameters<GetImplementationParams>,
    ) -> Result<CallToolResult, McpError> {
        let scope = params.0.scope.as_deref().unwrap_or("minimal");
        let engine = self.engine.lock().await;
        let index = engine.metadata_index();

        let symbol = match index.get_symbol_by_fqn(&params.0.name) {
            Ok(Some(s)) => s,
            Ok(None) => match index.search_symbols_by_name(&params.0.name, 1) {
                Ok(mut matches) if !matches.is_empty() => matches.remove(0),
                Ok(_) => {
                    return Ok(CallToolResult::success(vec![
                        ToolEnvelope::error(
                            "NOT_FOUND",
                            format!("no symbol matching `{}`", params.0.name),
                        )
                        .to_content(),
                    ]));
                }
                Err(e) => {
                    return Ok(CallToolResult::success(vec![
                        ToolEnvelope::error("IMPLEMENTATION_LOOKUP_FAILED", e.to_string()).to_content(),
                    ]));
                }
            },
            Err(e) => {
                return Ok(CallToolResult::success(vec![
                    ToolEnvelope::error("IMPLEMENTATION_LOOKUP_FAILED", e.to_string()).to_content(),
                ]));
            }
        };

        match collect_implementation(&engine, &symbol, scope) {
            Ok(candidates) => {
                let envelope =
                    ToolEnvelope::from_candidates(candidates, Vec::new(), DEFAULT_TOKEN_BUDGET);
                Ok(CallToolResult::success(vec![envelope.to_content()]))
            }
            Err(e) => Ok(CallToolResult::success(vec![
                ToolEnvelope::error("IMPLEMENTATION_LOOKUP_FAILED", e.to_string()).to_content(),
            ])),
        }
    }

    #[tool(
        name = "search_docs",
        description = "Search documentation entities (spec, PRD, TDD, ADR, requirement, generic documentation sections)."
    )]
    async fn search_docs(
        &self,
        params: Parameters<SearchDocsParams>,
    ) -> Result<CallToolResult, McpError> {
        let limit = params.0.limit.unwrap_or(10);
        let doc_types: Vec<EntityType> = params
            .0
            .doc_types
            .as_ref()
            .map(|types| types.iter().map(|t| EntityType::from_str_lossy(t)).collect())
            .unwrap_or_else(|| {
                vec![
                    EntityType::Documentation,
                    EntityType::Spec,
                    EntityType::Prd,
                    EntityType::Tdd,
                    EntityType::Adr,
                    EntityType::Requirement,
                ]
            });

        let engine = self.engine.lock().await;
        let index = engine.metadata_index();
        let collection = engine.collection_name();
        let query_lower = params.0.query.to_lowercase();

        let mut scored: Vec<(f64, Entity)> = Vec::new();
        for doc_type in &doc_types {
            match index.list_entities(&collection, Some(*doc_type), 500) {
                Ok(entities) => {
                    for entity in entities {
                        let haystack = format!(
                            "{} {} {}",
                            entity.name,
                            entity.content,
                            entity.observations.join(" ")
                        )
                        .to_lowercase();
                        let hits = haystack.matches(&query_lower).count();
                        if hits > 0 || query_lower.is_empty() {
                            scored.push((hits as f64, entity));
                        }
                    }
                }
                Err(e) => {
                    return Ok(CallToolResult::success(vec![
                        ToolEnvelope::error("DOC_SEARCH_FAILED", e.to_string()).to_content(),
                    ]));
                }
            }
        }
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);

        let candidates: Vec<ResultItem> = scored
            .into_iter()
            .map(|(score, mut entity)| {
                entity.content = String::new(); // metadata granularity by default
                let mut item = entity_result_item(&entity);
                item.score = score.max(1.0);
                item
            })
            .collect();

        let envelope = ToolEnvelope::from_candidates(candidates, Vec::new(), DEFAULT_TOKEN_BUDGET);
        Ok(CallToolResult::success(vec![envelope.to_content()]))
    }

    #[tool(
        name = "get_doc",
        description = "Fetch a single documentation entity by id, optionally narrowed to one Markdown section."
    )]
    async fn get_doc(&self, params: Parameters<GetDocParams>) -> Result<CallToolResult, McpError> {
        let engine = self.engine.lock().await;
        let index = engine.metadata_index();

        match index.get_entity(&params.0.doc_id) {
            Ok(Some(mut entity)) => {
                if let Some(section) = params.0.section.as_deref() {
                    match extract_section(&entity.content, section) {
                        Some(body) => entity.content = body,
                        None => {
                            let envelope = ToolEnvelope {
                                results: vec![entity_result_item(&entity)],
                                truncated: false,
                                warnings: vec![format!("section `{section}` not found; returning full document")],
                                error: None,
                            };
                            return Ok(CallToolResult::success(vec![envelope.to_content()]));
                        }
                    }
                }
                let envelope = ToolEnvelope::from_candidates(
                    vec![entity_result_item(&entity)],
                    Vec::new(),
                    DEFAULT_TOKEN_BUDGET,
                );
                Ok(CallToolResult::success(vec![envelope.to_content()]))
            }
            Ok(None) => Ok(CallToolResult::success(vec![
                ToolEnvelope::error("NOT_FOUND", format!("no document `{}`", params.0.doc_id))
                    .to_content(),
            ])),
            Err(e) => Ok(CallToolResult::success(vec![
                ToolEnvelope::error("DOC_LOOKUP_FAILED", e.to_string()).to_content(),
            ])),
        }
    }

    #[tool(
        name = "search_tickets",
        description = "Search the configured external issue tracker (read-through cache). Returns an empty result set when no tracker is configured."
    )]
    async fn search_tickets(
        &self,
        params: Parameters<SearchTicketsParams>,
    ) -> Result<CallToolResult, McpError> {
        let engine = self.engine.lock().await;
        let query = TicketQuery {
            query: params.0.query,
            status: params.0.status,
            labels: params.0.labels.unwrap_or_default(),
            source: params.0.source,
        };

        match engine.ticket_tracker().search(&query) {
            Ok(tickets) => {
                let candidates: Vec<ResultItem> = tickets.iter().map(ticket_result_item).collect();
                let envelope =
                    ToolEnvelope::from_candidates(candidates, Vec::new(), DEFAULT_TOKEN_BUDGET);
                Ok(CallToolResult::success(vec![envelope.to_content()]))
            }
            Err(e) => Ok(CallToolResult::success(vec![
                ToolEnvelope::error("TICKET_SEARCH_FAILED", e.to_string()).to_content(),
            ])),
        }
    }

    #[tool(
        name = "get_ticket",
        description = "Fetch a single ticket by id from the configured external issue tracker."
    )]
    async fn get_ticket(
        &self,
        params: Parameters<GetTicketParams>,
    ) -> Result<CallToolResult, McpError> {
        let engine = self.engine.lock().await;
        match engine.ticket_tracker().get(&params.0.id) {
            Ok(Some(ticket)) => {
                let envelope = ToolEnvelope::from_candidates(
                    vec![ticket_result_item(&ticket)],
                    Vec::new(),
                    DEFAULT_TOKEN_BUDGET,
                );
                Ok(CallToolResult::success(vec![envelope.to_content()]))
            }
            Ok(None) => Ok(CallToolResult::success(vec![
                ToolEnvelope::error("NOT_FOUND", format!("no ticket `{}`", params.0.id)).to_content(),
            ])),
            Err(e) => Ok(CallToolResult::success(vec![
                ToolEnvelope::error("TICKET_LOOKUP_FAILED", e.to_string()).to_content(),
            ])),
        }
    }

    #[tool(
        name = "create_entities",
        description = "Create one or more entities in the store. Denied with PLAN_MODE_ACCESS_DENIED while plan mode is active."
    )]
    async fn create_entities(
        &self,
        params: Parameters<CreateEntitiesParams>,
    ) -> Result<CallToolResult, McpError> {
        let engine = self.engine.lock().await;
        if let Err(denied) = check_write_allowed(&engine, "create_entities") {
            return Ok(denied);
        }
        let index = engine.metadata_index();
        let collection = engine.collection_name();

        let mut created = Vec::new();
        for input in params.0.entities {
            let entity_type = EntityType::from_str_lossy(&input.entity_type);
            let qualified_name = input.qualified_name.unwrap_or_else(|| input.name.clone());
            let source_path = PathBuf::from(input.source_path.unwrap_or_default());
            let chunk_kind = EntityChunkKind::Metadata;
            let id = Entity::derive_id(&collection, &source_path, &qualified_name, entity_type, chunk_kind);
            let entity = Entity {
                id,
                collection: collection.clone(),
                entity_type,
                chunk_kind,
                name: input.name,
                qualified_name,
                source_path,
                line_start: input.line_start.unwrap_or(0),
                line_end: input.line_end.unwrap_or(0),
                observations: input.observations.unwrap_or_default(),
                content: input.content,
                vector: None,
                metadata: Default::default(),
            };
            if let Err(e) = index.upsert_entity(&entity) {
                return Ok(CallToolResult::success(vec![
                    ToolEnvelope::error("CREATE_ENTITIES_FAILED", e.to_string()).to_content(),
                ]));
            }
            created.push(entity_result_item(&entity));
        }

        let envelope = ToolEnvelope::from_candidates(created, Vec::new(), DEFAULT_TOKEN_BUDGET);
        Ok(CallToolResult::success(vec![envelope.to_content()]))
    }

    #[tool(
        name = "delete_entities",
        description = "Delete entities by id, cascading to any relations that reference them. Inverse of create_entities."
    )]
    async fn delete_entities(
        &self,
        params: Parameters<DeleteEntitiesParams>,
    ) -> Result<CallToolResult, McpError> {
        let engine = self.engine.lock().await;
        if let Err(denied) = check_write_allowed(&engine, "delete_entities") {
            return Ok(denied);
        }
        let index = engine.metadata_index();

        let mut removed = Vec::new();
        let mut warnings = Vec::new();
        for id in params.0.ids {
            match index.get_entity(&id) {
                Ok(Some(entity)) => {
                    if let Err(e) = index.delete_entity(&id) {
                        return Ok(CallToolResult::success(vec![
                            ToolEnvelope::error("DELETE_ENTITIES_FAILED", e.to_string()).to_content(),
                        ]));
                    }
                    removed.push(entity_result_item(&entity));
                }
                Ok(None) => warnings.push(format!("no entity `{id}`; skipped")),
                Err(e) => {
                    return Ok(CallToolResult::success(vec![
                        ToolEnvelope::error("DELETE_ENTITIES_FAILED", e.to_string()).to_content(),
                    ]));
                }
            }
        }

        let envelope = ToolEnvelope::from_candidates(removed, warnings, DEFAULT_TOKEN_BUDGET);
        Ok(CallToolResult::success(vec![envelope.to_content()]))
    }

    #[tool(
        name = "add_observations",
        description = "Append observations to an existing entity."
    )]
    async fn add_observations(
        &self,
        params: Parameters<AddObservationsParams>,
    ) -> Result<CallToolResult, McpError> {
        let engine = self.engine.lock().await;
        if let Err(denied) = check_write_allowed(&engine, "add_observations") {
            return Ok(denied);
        }
        let index = engine.metadata_index();

        match index.get_entity(&params.0.entity_id) {
            Ok(Some(mut entity)) => {
                for obs in params.0.observations {
                    if !entity.observations.contains(&obs) {
                        entity.observations.push(obs);
                    }
                }
                if let Err(e) = index.upsert_entity(&entity) {
                    return Ok(CallToolResult::success(vec![
                        ToolEnvelope::error("ADD_OBSERVATIONS_FAILED", e.to_string()).to_content(),
                    ]));
                }
                let envelope = ToolEnvelope::from_candidates(
                    vec![entity_result_item(&entity)],
                    Vec::new(),
                    DEFAULT_TOKEN_BUDGET,
                );
                Ok(CallToolResult::success(vec![envelope.to_content()]))
            }
            Ok(None) => Ok(CallToolResult::success(vec![
                ToolEnvelope::error("NOT_FOUND", format!("no entity `{}`", params.0.entity_id))
                    .to_content(),
            ])),
            Err(e) => Ok(CallToolResult::success(vec![
                ToolEnvelope::error("ADD_OBSERVATIONS_FAILED", e.to_string()).to_content(),
            ])),
        }
    }

    #[tool(
        name = "delete_observations",
        description = "Remove observations from an existing entity. Inverse of add_observations."
    )]
    async fn delete_observations(
        &self,
        params: Parameters<DeleteObservationsParams>,
    ) -> Result<CallToolResult, McpError> {
        let engine = self.engine.lock().await;
        if let Err(denied) = check_write_allowed(&engine, "delete_observations") {
            return Ok(denied);
        }
        let index = engine.metadata_index();

        match index.get_entity(&params.0.entity_id) {
            Ok(Some(mut entity)) => {
                entity.observations.retain(|o| !params.0.observations.contains(o));
                if let Err(e) = index.upsert_entity(&entity) {
                    return Ok(CallToolResult::success(vec![
                        ToolEnvelope::error("DELETE_OBSERVATIONS_FAILED", e.to_string()).to_content(),
                    ]));
                }
                let envelope = ToolEnvelope::from_candidates(
                    vec![entity_result_item(&entity)],
                    Vec::new(),
                    DEFAULT_TOKEN_BUDGET,
                );
                Ok(CallToolResult::success(vec![envelope.to_content()]))
            }
            Ok(None) => Ok(CallToolResult::success(vec![
                ToolEnvelope::error("NOT_FOUND", format!("no entity `{}`", params.0.entity_id))
                    .to_content(),
            ])),
            Err(e) => Ok(CallToolResult::success(vec![
                ToolEnvelope::error("DELETE_OBSERVATIONS_FAILED", e.to_string()).to_content(),
            ])),
        }
    }

    #[tool(
        name = "create_relations",
        description = "Create directed relations between existing entities (calls, imports, inherits, references, defined_in, documents, implements_requirement)."
    )]
    async fn create_relations(
        &self,
        params: Parameters<CreateRelationsParams>,
    ) -> Result<CallToolResult, McpError> {
        let engine = self.engine.lock().await;
        if let Err(denied) = check_write_allowed(&engine, "create_relations") {
            return Ok(denied);
        }
        let index = engine.metadata_index();

        let mut created = Vec::new();
        let mut warnings = Vec::new();
        for input in params.0.relations {
            if index.get_entity(&input.from_id).ok().flatten().is_none() {
                warnings.push(format!("no entity `{}`; relation skipped", input.from_id));
                continue;
            }
            if index.get_entity(&input.to_id).ok().flatten().is_none() {
                warnings.push(format!("no entity `{}`; relation skipped", input.to_id));
                continue;
            }
            let relation = Relation {
                from_id: input.from_id,
                to_id: input.to_id,
                kind: RelationKind::from_str_lossy(&input.kind),
                weight: input.weight,
            };
            if let Err(e) = index.insert_relation(&relation) {
                return Ok(CallToolResult::success(vec![
                    ToolEnvelope::error("CREATE_RELATIONS_FAILED", e.to_string()).to_content(),
                ]));
            }
            created.push(relation_result_item(&relation));
        }

        let envelope = ToolEnvelope::from_candidates(created, warnings, DEFAULT_TOKEN_BUDGET);
        Ok(CallToolResult::success(vec![envelope.to_content()]))
    }

    #[tool(
        name = "delete_relations",
        description = "Delete relations between entities. Inverse of create_relations."
    )]
    async fn delete_relations(
        &self,
        params: Parameters<DeleteRelationsParams>,
    ) -> Result<CallToolResult, McpError> {
        let engine = self.engine.lock().await;
        if let Err(denied) = check_write_allowed(&engine, "delete_relations") {
            return Ok(denied);
        }
        let index = engine.metadata_index();

        let mut removed = Vec::new();
        for input in params.0.relations {
            let kind = RelationKind::from_str_lossy(&input.kind);
            if let Err(e) = index.delete_relation(&input.from_id, &input.to_id, kind) {
                return Ok(CallToolResult::success(vec![
                    ToolEnvelope::error("DELETE_RELATIONS_FAILED", e.to_string()).to_content(),
                ]));
            }
            removed.push(relation_result_item(&Relation {
                from_id: input.from_id,
                to_id: input.to_id,
                kind,
                weight: input.weight,
            }));
        }

        let envelope = ToolEnvelope::from_candidates(removed, Vec::new(), DEFAULT_TOKEN_BUDGET);
        Ok(CallToolResult::success(vec![envelope.to_content()]))
    }

    #[tool(
        name = "set_plan_mode",
        description = "Toggle plan mode. While enabled, every write tool and relation-mutating tool is denied with a structured PLAN_MODE_ACCESS_DENIED error; read tools are unaffected."
    )]
    async fn set_plan_mode(
        &self,
        params: Parameters<SetPlanModeParams>,
    ) -> Result<CallToolResult, McpError> {
        let engine = self.engine.lock().await;
        let was_enabled = engine.set_plan_mode(params.0.enabled);
        Ok(CallToolResult::success(vec![Content::text(format!(
            "plan mode {} (was {})",
            if params.0.enabled { "enabled" } else { "disabled" },
            if was_enabled { "enabled" } else { "disabled" },
        ))]))
    }
}

// -----------------------------------------------------------------------
// Free functions backing the tool bodies above
// -----------------------------------------------------------------------

fn ticket_result_item(ticket: &omni_core::Ticket) -> ResultItem {
    let mut observations = vec![format!("status:{}", ticket.status)];
    observations.extend(ticket.labels.iter().cloned());
    ResultItem {
        id: format!("{}:{}", ticket.source, ticket.id),
        entity_type: EntityType::ActiveIssue.as_str().to_string(),
        name: ticket.title.clone(),
        source_path: String::new(),
        line_start: 0,
        line_end: 0,
        score: 1.0,
        content: ticket.body.clone(),
        observations,
        language: None,
        signature: None,
    }
}

fn relation_result_item(relation: &Relation) -> ResultItem {
    ResultItem {
        id: format!("{}->{}", relation.from_id, relation.to_id),
        entity_type: relation.kind.as_str().to_string(),
        name: format!("{} {} {}", relation.from_id, relation.kind.as_str(), relation.to_id),
        source_path: String::new(),
        line_start: 0,
        line_end: 0,
        score: relation.weight.unwrap_or(1.0),
        content: String::new(),
        observations: Vec::new(),
        language: None,
        signature: None,
    }
}

/// `read_graph(mode=relationships)`: every relation touching `entity_id`,
/// with endpoints resolved to the entities they point at/from.
fn relation_neighbourhood(
    index: &omni_core::MetadataIndex,
    entity_id: &str,
    limit: usize,
) -> omni_core::OmniResult<Vec<ResultItem>> {
    let mut items = Vec::new();
    for relation in index.relations_from(entity_id)? {
        items.push(relation_result_item(&relation));
        if let Some(entity) = index.get_entity(&relation.to_id)? {
            items.push(entity_result_item(&entity));
        }
        if items.len() >= limit {
            return Ok(items);
        }
    }
    for relation in index.relations_to(entity_id)? {
        items.push(relation_result_item(&relation));
        if let Some(entity) = index.get_entity(&relation.from_id)? {
            items.push(entity_result_item(&entity));
        }
        if items.len() >= limit {
            break;
        }
    }
    Ok(items)
}

/// `read_graph(mode=smart, entity=Some(..))`: the entity itself plus a
/// one-hop summary of what it relates to.
fn smart_overview(
    index: &omni_core::MetadataIndex,
    entity_id: &str,
    limit: usize,
) -> omni_core::OmniResult<Vec<ResultItem>> {
    let mut items = Vec::new();
    if let Some(entity) = index.get_entity(entity_id)? {
        items.push(entity_result_item(&entity));
    }
    items.extend(relation_neighbourhood(index, entity_id, limit.saturating_sub(items.len()))?);
    Ok(items)
}

/// `get_implementation`: resolve `scope` into a set of chunks, starting
/// from the named symbol.
fn collect_implementation(
    engine: &Engine,
    symbol: &Symbol,
    scope: &str,
) -> omni_core::OmniResult<Vec<ResultItem>> {
    let index = engine.metadata_index();
    let file_path = index
        .get_file_path_by_id(symbol.file_id)?
        .map(|p| p.display().to_string())
        .unwrap_or_default();
    let language = index
        .get_file_by_path(std::path::Path::new(&file_path))
        .ok()
        .flatten()
        .map(|f| f.language.as_str().to_string());

    let mut items = Vec::new();
    if let Some(chunk_id) = symbol.chunk_id {
        if let Some(chunk) = index.get_chunk_by_id(chunk_id)? {
            items.push(chunk_to_implementation_item(&chunk, symbol, &file_path, language.clone()));
        }
    }
    if scope == "minimal" {
        return Ok(items);
    }

    // `upstream` walks outgoing edges -- what this symbol depends on/calls --
    // which is exactly "directly-called helpers" for scope=logical.
    let same_file_depth = 1;
    for callee_id in engine.dep_graph().upstream(symbol.id, same_file_depth)? {
        if callee_id == symbol.id {
            continue;
        }
        if let Some(callee) = index.get_symbol_by_id(callee_id)? {
            if callee.file_id == symbol.file_id {
                if let Some(chunk_id) = callee.chunk_id {
                    if let Some(chunk) = index.get_chunk_by_id(chunk_id)? {
                        items.push(chunk_to_implementation_item(&chunk, &callee, &file_path, language.clone()));
                    }
                }
            }
        }
    }
    if scope == "logical" {
        return Ok(items);
    }

    // scope == "dependencies": one hop further, following into other files.
    for callee_id in engine.dep_graph().upstream(symbol.id, same_file_depth + 1)? {
        if callee_id == symbol.id {
            continue;
        }
        if let Some(callee) = index.get_symbol_by_id(callee_id)? {
            if callee.file_id != symbol.file_id {
                if let Some(chunk_id) = callee.chunk_id {
                    if let Some(chunk) = index.get_chunk_by_id(chunk_id)? {
                        let callee_path = index
                            .get_file_path_by_id(callee.file_id)?
                            .map(|p| p.display().to_string())
                            .unwrap_or_default();
                        items.push(chunk_to_implementation_item(&chunk, &callee, &callee_path, None));
                    }
                }
            }
        }
    }
    Ok(items)
}

/// Extract the body of a single Markdown section (from a `#`-prefixed
/// heading line containing `section` up to the next heading at the same or
/// shallower level).
fn extract_section(content: &str, section: &str) -> Option<String> {
    let lines: Vec<&str> = content.lines().collect();
    let section_lower = section.to_lowercase();
    let start = lines.iter().position(|l| {
        let trimmed = l.trim_start();
        trimmed.starts_with('#') && trimmed.to_lowercase().contains(&section_lower)
    })?;
    let start_level = lines[start].chars().take_while(|c| *c == '#').count();
    let end = lines[start + 1..]
        .iter()
        .position(|l| {
            let trimmed = l.trim_start();
            let level = trimmed.chars().take_while(|c| *c == '#').count();
            level > 0 && level <= start_level
        })
        .map(|i| start + 1 + i)
        .unwrap_or(lines.len());
    Some(lines[start..end].join("\n"))
}

#[tool_handler]
impl ServerHandler for OmniContextServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "OmniContext provides deep code intelligence for AI coding agents via hybrid \
                 (dense + keyword) retrieval with progressive disclosure. Use search_similar for \
                 general queries, get_implementation for full source, read_graph for entity \
                 relationships, search_docs/get_doc for documentation, and search_tickets/get_ticket \
                 for the configured issue tracker. Write tools (create_entities, add_observations, \
                 create_relations, and their inverses) are denied while plan mode is active."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .build(),
            server_info: Implementation::from_build_env(),
            ..Default::default()
        }
    }
}
