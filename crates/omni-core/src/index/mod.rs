//! SQLite metadata store and full-text search index.
//!
//! This module manages the persistent storage of file metadata, chunks,
//! symbols, and dependencies (the parser-level representation), plus the
//! coarser entity/relation storage model that retrieval, the guardrail
//! engine, and the MCP tool surface read and write.
//!
//! ## Concurrency
//!
//! SQLite is configured in WAL mode for concurrent reads during writes.
//! Only one writer is allowed at a time (SQLite constraint).

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{OmniError, OmniResult};
use crate::types::{
    Chunk, ChunkKind, DependencyEdge, DependencyKind, Entity, EntityChunkKind, EntityMetadata,
    EntityType, FileInfo, IndexStatistics, IndexerStateEntry, Language, Relation, RelationKind,
    Symbol, Visibility,
};

/// SQLite-backed metadata and full-text search index.
pub struct MetadataIndex {
    conn: Connection,
}

impl MetadataIndex {
    /// Open or create an index database at the given path.
    pub fn open(db_path: &Path) -> OmniResult<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(db_path)?;

        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "cache_size", "-64000")?; // 64MB cache
        conn.pragma_update(None, "foreign_keys", "ON")?;

        let index = Self { conn };
        index.ensure_schema()?;

        Ok(index)
    }

    fn ensure_schema(&self) -> OmniResult<()> {
        self.conn.execute_batch(include_str!("schema.sql"))?;
        Ok(())
    }

    /// Run an integrity check on the database.
    pub fn check_integrity(&self) -> OmniResult<bool> {
        let result: String = self
            .conn
            .query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        Ok(result == "ok")
    }

    /// Get the raw connection for advanced queries.
    /// Use sparingly -- prefer adding methods to this struct.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Ensure a collection row exists (idempotent).
    pub fn ensure_collection(&self, collection: &str) -> OmniResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO collections (name) VALUES (?1)",
            params![collection],
        )?;
        self.conn.execute(
            "INSERT OR IGNORE INTO bm25_collection_stats (collection, doc_count, total_length) VALUES (?1, 0, 0)",
            params![collection],
        )?;
        Ok(())
    }

    // -----------------------------------------------------------------
    // Parser-level: files
    // -----------------------------------------------------------------

    /// Insert or update a file row, returning its id.
    pub fn upsert_file(&self, file: &FileInfo) -> OmniResult<i64> {
        let path = file.path.to_string_lossy().replace('\\', "/");
        self.conn.execute(
            "INSERT INTO files (path, language, content_hash, size_bytes, updated_at)
             VALUES (?1, ?2, ?3, ?4, unixepoch())
             ON CONFLICT(path) DO UPDATE SET
                language = excluded.language,
                content_hash = excluded.content_hash,
                size_bytes = excluded.size_bytes,
                updated_at = excluded.updated_at",
            params![path, file.language.as_str(), file.content_hash, file.size_bytes as i64],
        )?;
        let id: i64 = self.conn.query_row(
            "SELECT id FROM files WHERE path = ?1",
            params![path],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    /// Delete a file and cascade-delete its chunks/symbols/dependencies.
    pub fn delete_file(&self, path: &Path) -> OmniResult<()> {
        let rel = path.to_string_lossy().replace('\\', "/");
        let file_id: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM files WHERE path = ?1",
                params![rel],
                |row| row.get(0),
            )
            .optional()?;

        if let Some(file_id) = file_id {
            let mut stmt = self.conn.prepare("SELECT id FROM chunks WHERE file_id = ?1")?;
            let chunk_ids = stmt
                .query_map(params![file_id], |row| row.get::<_, i64>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            for chunk_id in &chunk_ids {
                crate::bm25::delete_entity(&self.conn, "files", &chunk_id.to_string())?;
            }
        }

        self.conn
            .execute("DELETE FROM files WHERE path = ?1", params![rel])?;
        Ok(())
    }

    /// Look up a file's content hash, if indexed.
    pub fn get_file_hash(&self, path: &Path) -> OmniResult<Option<String>> {
        let rel = path.to_string_lossy().replace('\\', "/");
        let hash = self
            .conn
            .query_row(
                "SELECT content_hash FROM files WHERE path = ?1",
                params![rel],
                |row| row.get(0),
            )
            .optional()?;
        Ok(hash)
    }

    /// Look up a file row by path.
    pub fn get_file_by_path(&self, path: &Path) -> OmniResult<Option<FileInfo>> {
        let rel = path.to_string_lossy().replace('\\', "/");
        let info = self
            .conn
            .query_row(
                "SELECT id, path, language, content_hash, size_bytes FROM files WHERE path = ?1",
                params![rel],
                |row| {
                    let lang: String = row.get(2)?;
                    let path_str: String = row.get(1)?;
                    Ok(FileInfo {
                        id: row.get(0)?,
                        path: PathBuf::from(path_str),
                        language: language_from_str(&lang),
                        content_hash: row.get(3)?,
                        size_bytes: row.get::<_, i64>(4)? as u64,
                    })
                },
            )
            .optional()?;
        Ok(info)
    }

    /// Atomically replace a file's chunks and symbols with a fresh set.
    ///
    /// Returns the file id and the ids assigned to `chunks`, in the same
    /// order, so callers can map embeddings back to chunk rows.
    pub fn reindex_file(
        &mut self,
        file: &FileInfo,
        chunks: &[Chunk],
        symbols: &[Symbol],
    ) -> OmniResult<(i64, Vec<i64>)> {
        let path = file.path.to_string_lossy().replace('\\', "/");
        let tx = self.conn.transaction()?;

        tx.execute(
            "INSERT OR IGNORE INTO collections (name) VALUES ('files')",
            [],
        )?;
        tx.execute(
            "INSERT OR IGNORE INTO bm25_collection_stats (collection, doc_count, total_length) \
             VALUES ('files', 0, 0)",
            [],
        )?;

        tx.execute(
            "INSERT INTO files (path, language, content_hash, size_bytes, updated_at)
             VALUES (?1, ?2, ?3, ?4, unixepoch())
             ON CONFLICT(path) DO UPDATE SET
                language = excluded.language,
                content_hash = excluded.content_hash,
                size_bytes = excluded.size_bytes,
                updated_at = excluded.updated_at",
            params![path, file.language.as_str(), file.content_hash, file.size_bytes as i64],
        )?;
        let file_id: i64 = tx.query_row(
            "SELECT id FROM files WHERE path = ?1",
            params![path],
            |row| row.get(0),
        )?;

        let old_chunk_ids: Vec<i64> = {
            let mut stmt = tx.prepare("SELECT id FROM chunks WHERE file_id = ?1")?;
            let rows = stmt.query_map(params![file_id], |row| row.get::<_, i64>(0))?;
            rows.collect::<Result<Vec<_>, _>>()?
        };
        for old_chunk_id in &old_chunk_ids {
            crate::bm25::delete_entity(&tx, "files", &old_chunk_id.to_string())?;
        }

        tx.execute("DELETE FROM chunks WHERE file_id = ?1", params![file_id])?;
        tx.execute("DELETE FROM symbols WHERE file_id = ?1", params![file_id])?;

        let mut chunk_ids = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            tx.execute(
                "INSERT INTO chunks
                    (file_id, symbol_path, kind, visibility, line_start, line_end,
                     content, doc_comment, token_count, weight, vector_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    file_id,
                    chunk.symbol_path,
                    chunk_kind_str(chunk.kind),
                    chunk.visibility.as_str(),
                    chunk.line_start,
                    chunk.line_end,
                    chunk.content,
                    chunk.doc_comment,
                    chunk.token_count,
                    chunk.weight,
                    chunk.vector_id.map(|v| v as i64),
                ],
            )?;
            let new_chunk_id = tx.last_insert_rowid();
            let bm25_content = format!("{} {}", chunk.symbol_path, chunk.content);
            crate::bm25::index_entity(&tx, "files", &new_chunk_id.to_string(), &bm25_content)?;
            chunk_ids.push(new_chunk_id);
        }

        for (i, symbol) in symbols.iter().enumerate() {
            // Best-effort: associate a symbol with the chunk sharing its
            // position in the input slices when the caller built them in
            // lockstep (the pipeline does).
            let chunk_id = chunk_ids.get(i).copied();
            tx.execute(
                "INSERT INTO symbols (name, fqn, kind, file_id, line, chunk_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(fqn) DO UPDATE SET
                    name = excluded.name,
                    kind = excluded.kind,
                    file_id = excluded.file_id,
                    line = excluded.line,
                    chunk_id = excluded.chunk_id",
                params![
                    symbol.name,
                    symbol.fqn,
                    chunk_kind_str(symbol.kind),
                    file_id,
                    symbol.line,
                    chunk_id,
                ],
            )?;
        }

        tx.commit()?;
        Ok((file_id, chunk_ids))
    }

    /// Set the vector-store id for a chunk once it's been embedded.
    pub fn set_chunk_vector_id(&self, chunk_id: i64, vector_id: u64) -> OmniResult<()> {
        self.conn.execute(
            "UPDATE chunks SET vector_id = ?1 WHERE id = ?2",
            params![vector_id as i64, chunk_id],
        )?;
        Ok(())
    }

    /// Fetch every chunk belonging to a file.
    pub fn get_chunks_for_file(&self, file_id: i64) -> OmniResult<Vec<Chunk>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, file_id, symbol_path, kind, visibility, line_start, line_end,
                    content, doc_comment, token_count, weight, vector_id
             FROM chunks WHERE file_id = ?1 ORDER BY line_start",
        )?;
        let rows = stmt.query_map(params![file_id], row_to_chunk)?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(OmniError::from)
    }

    /// Fetch a single chunk by its vector-store id.
    pub fn get_chunk_by_vector_id(&self, vector_id: u64) -> OmniResult<Option<Chunk>> {
        self.conn
            .query_row(
                "SELECT id, file_id, symbol_path, kind, visibility, line_start, line_end,
                        content, doc_comment, token_count, weight, vector_id
                 FROM chunks WHERE vector_id = ?1",
                params![vector_id as i64],
                row_to_chunk,
            )
            .optional()
            .map_err(OmniError::from)
    }

    /// Fetch a single chunk by id.
    pub fn get_chunk_by_id(&self, chunk_id: i64) -> OmniResult<Option<Chunk>> {
        self.conn
            .query_row(
                "SELECT id, file_id, symbol_path, kind, visibility, line_start, line_end,
                        content, doc_comment, token_count, weight, vector_id
                 FROM chunks WHERE id = ?1",
                params![chunk_id],
                row_to_chunk,
            )
            .optional()
            .map_err(OmniError::from)
    }

    /// Look up a file's relative path by id.
    pub fn get_file_path_by_id(&self, file_id: i64) -> OmniResult<Option<PathBuf>> {
        let path: Option<String> = self
            .conn
            .query_row(
                "SELECT path FROM files WHERE id = ?1",
                params![file_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(path.map(PathBuf::from))
    }

    /// Look up a file's last-updated timestamp (unix seconds) by id.
    pub fn get_file_updated_at(&self, file_id: i64) -> OmniResult<Option<i64>> {
        self.conn
            .query_row(
                "SELECT updated_at FROM files WHERE id = ?1",
                params![file_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(OmniError::from)
    }

    // -----------------------------------------------------------------
    // Parser-level: symbols
    // -----------------------------------------------------------------

    /// Exact fully-qualified-name lookup.
    pub fn get_symbol_by_fqn(&self, fqn: &str) -> OmniResult<Option<Symbol>> {
        let symbol = self
            .conn
            .query_row(
                "SELECT id, name, fqn, kind, file_id, line, chunk_id FROM symbols WHERE fqn = ?1",
                params![fqn],
                row_to_symbol,
            )
            .optional()?;
        Ok(symbol)
    }

    /// Look up a symbol by its database id.
    pub fn get_symbol_by_id(&self, id: i64) -> OmniResult<Option<Symbol>> {
        self.conn
            .query_row(
                "SELECT id, name, fqn, kind, file_id, line, chunk_id FROM symbols WHERE id = ?1",
                params![id],
                row_to_symbol,
            )
            .optional()
            .map_err(OmniError::from)
    }

    /// Look up the symbol associated with a chunk, if any.
    pub fn get_symbol_for_chunk(&self, chunk_id: i64) -> OmniResult<Option<Symbol>> {
        self.conn
            .query_row(
                "SELECT id, name, fqn, kind, file_id, line, chunk_id FROM symbols
                 WHERE chunk_id = ?1",
                params![chunk_id],
                row_to_symbol,
            )
            .optional()
            .map_err(OmniError::from)
    }

    /// Fuzzy lookup by short name, most-recently-indexed first.
    pub fn search_symbols_by_name(&self, name: &str, limit: usize) -> OmniResult<Vec<Symbol>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, fqn, kind, file_id, line, chunk_id FROM symbols
             WHERE name = ?1 OR fqn LIKE ?2
             ORDER BY id DESC LIMIT ?3",
        )?;
        let like = format!("%{name}");
        let rows = stmt.query_map(params![name, like, limit as i64], row_to_symbol)?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(OmniError::from)
    }

    /// The first (lowest-id) symbol defined in a file, used as a stand-in
    /// source node for file-level import edges.
    pub fn get_first_symbol_for_file(&self, file_id: i64) -> OmniResult<Option<Symbol>> {
        let symbol = self
            .conn
            .query_row(
                "SELECT id, name, fqn, kind, file_id, line, chunk_id FROM symbols
                 WHERE file_id = ?1 ORDER BY id ASC LIMIT 1",
                params![file_id],
                row_to_symbol,
            )
            .optional()?;
        Ok(symbol)
    }

    // -----------------------------------------------------------------
    // Parser-level: dependencies
    // -----------------------------------------------------------------

    /// Insert a dependency edge (idempotent on the primary key).
    pub fn insert_dependency(&self, edge: &DependencyEdge) -> OmniResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO dependencies (source_id, target_id, kind) VALUES (?1, ?2, ?3)",
            params![edge.source_id, edge.target_id, edge.kind.as_str()],
        )?;
        Ok(())
    }

    /// Total number of dependency edges stored.
    pub fn dependency_count(&self) -> OmniResult<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM dependencies", [], |row| row.get(0))?;
        Ok(count)
    }

    /// All dependency edges, for rebuilding the in-memory graph at startup.
    pub fn all_dependencies(&self) -> OmniResult<Vec<DependencyEdge>> {
        let mut stmt = self
            .conn
            .prepare("SELECT source_id, target_id, kind FROM dependencies")?;
        let rows = stmt.query_map([], |row| {
            let kind: String = row.get(2)?;
            Ok(DependencyEdge {
                source_id: row.get(0)?,
                target_id: row.get(1)?,
                kind: DependencyKind::from_str_lossy(&kind),
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(OmniError::from)
    }

    /// Row counts across the metadata store.
    pub fn statistics(&self) -> OmniResult<IndexStatistics> {
        let file_count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))?;
        let chunk_count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?;
        let symbol_count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM symbols", [], |row| row.get(0))?;
        let entity_count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM entities", [], |row| row.get(0))?;
        let relation_count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM relations", [], |row| row.get(0))?;
        Ok(IndexStatistics {
            file_count: file_count as usize,
            chunk_count: chunk_count as usize,
            symbol_count: symbol_count as usize,
            entity_count: entity_count as usize,
            relation_count: relation_count as usize,
        })
    }

    // -----------------------------------------------------------------
    // Storage-layer: entities
    // -----------------------------------------------------------------

    /// Insert or replace an entity.
    pub fn upsert_entity(&self, entity: &Entity) -> OmniResult<()> {
        self.ensure_collection(&entity.collection)?;
        let observations = serde_json::to_string(&entity.observations)?;
        let metadata = serde_json::to_string(&entity.metadata.0)?;
        let source_path = entity.source_path.to_string_lossy().replace('\\', "/");
        self.conn.execute(
            "INSERT INTO entities
                (id, collection, entity_type, chunk_kind, name, qualified_name, source_path,
                 line_start, line_end, observations, content, metadata, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, unixepoch())
             ON CONFLICT(id) DO UPDATE SET
                entity_type = excluded.entity_type,
                chunk_kind = excluded.chunk_kind,
                name = excluded.name,
                qualified_name = excluded.qualified_name,
                source_path = excluded.source_path,
                line_start = excluded.line_start,
                line_end = excluded.line_end,
                observations = excluded.observations,
                content = excluded.content,
                metadata = excluded.metadata,
                updated_at = excluded.updated_at",
            params![
                entity.id,
                entity.collection,
                entity.entity_type.as_str(),
                entity.chunk_kind.as_str(),
                entity.name,
                entity.qualified_name,
                source_path,
                entity.line_start,
                entity.line_end,
                observations,
                entity.content,
                metadata,
            ],
        )?;
        Ok(())
    }

    /// Fetch a single entity by id.
    pub fn get_entity(&self, id: &str) -> OmniResult<Option<Entity>> {
        let entity = self
            .conn
            .query_row(
                "SELECT id, collection, entity_type, chunk_kind, name, qualified_name,
                        source_path, line_start, line_end, observations, content, metadata
                 FROM entities WHERE id = ?1",
                params![id],
                row_to_entity,
            )
            .optional()?;
        Ok(entity)
    }

    /// Delete a single entity by id (and, via `ON DELETE CASCADE`, every
    /// relation that references it). Used by the `delete_entities` write
    /// tool.
    pub fn delete_entity(&self, id: &str) -> OmniResult<()> {
        self.conn.execute("DELETE FROM entities WHERE id = ?1", params![id])?;
        Ok(())
    }

    /// Delete every entity produced from a given source path within a
    /// collection (used on re-index and on file deletion).
    pub fn delete_entities_for_path(&self, collection: &str, source_path: &str) -> OmniResult<()> {
        self.conn.execute(
            "DELETE FROM entities WHERE collection = ?1 AND source_path = ?2",
            params![collection, source_path],
        )?;
        Ok(())
    }

    /// List entities in a collection, optionally filtered by type.
    pub fn list_entities(
        &self,
        collection: &str,
        entity_type: Option<EntityType>,
        limit: usize,
    ) -> OmniResult<Vec<Entity>> {
        let mut stmt = if entity_type.is_some() {
            self.conn.prepare(
                "SELECT id, collection, entity_type, chunk_kind, name, qualified_name,
                        source_path, line_start, line_end, observations, content, metadata
                 FROM entities WHERE collection = ?1 AND entity_type = ?2
                 ORDER BY qualified_name LIMIT ?3",
            )?
        } else {
            self.conn.prepare(
                "SELECT id, collection, entity_type, chunk_kind, name, qualified_name,
                        source_path, line_start, line_end, observations, content, metadata
                 FROM entities WHERE collection = ?1
                 ORDER BY qualified_name LIMIT ?2",
            )?
        };

        let rows = if let Some(ty) = entity_type {
            stmt.query_map(params![collection, ty.as_str(), limit as i64], row_to_entity)?
        } else {
            stmt.query_map(params![collection, limit as i64], row_to_entity)?
        };
        rows.collect::<Result<Vec<_>, _>>().map_err(OmniError::from)
    }

    /// Clear every entity, relation and bm25 posting for a collection.
    pub fn clear_collection(&self, collection: &str) -> OmniResult<()> {
        self.conn
            .execute("DELETE FROM entities WHERE collection = ?1", params![collection])?;
        self.conn
            .execute("DELETE FROM bm25_postings WHERE collection = ?1", params![collection])?;
        self.conn.execute(
            "DELETE FROM bm25_doc_stats WHERE collection = ?1",
            params![collection],
        )?;
        self.conn.execute(
            "UPDATE bm25_collection_stats SET doc_count = 0, total_length = 0 WHERE collection = ?1",
            params![collection],
        )?;
        self.conn
            .execute("DELETE FROM indexer_state WHERE collection = ?1", params![collection])?;
        Ok(())
    }

    // -----------------------------------------------------------------
    // Storage-layer: relations
    // -----------------------------------------------------------------

    /// Insert a relation edge (idempotent on the primary key).
    pub fn insert_relation(&self, relation: &Relation) -> OmniResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO relations (from_id, to_id, kind, weight) VALUES (?1, ?2, ?3, ?4)",
            params![relation.from_id, relation.to_id, relation.kind.as_str(), relation.weight],
        )?;
        Ok(())
    }

    /// Remove a relation edge.
    pub fn delete_relation(&self, from_id: &str, to_id: &str, kind: RelationKind) -> OmniResult<()> {
        self.conn.execute(
            "DELETE FROM relations WHERE from_id = ?1 AND to_id = ?2 AND kind = ?3",
            params![from_id, to_id, kind.as_str()],
        )?;
        Ok(())
    }

    /// Every outgoing relation from an entity.
    pub fn relations_from(&self, entity_id: &str) -> OmniResult<Vec<Relation>> {
        let mut stmt = self
            .conn
            .prepare("SELECT from_id, to_id, kind, weight FROM relations WHERE from_id = ?1")?;
        let rows = stmt.query_map(params![entity_id], row_to_relation)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(OmniError::from)
    }

    /// Every incoming relation to an entity.
    pub fn relations_to(&self, entity_id: &str) -> OmniResult<Vec<Relation>> {
        let mut stmt = self
            .conn
            .prepare("SELECT from_id, to_id, kind, weight FROM relations WHERE to_id = ?1")?;
        let rows = stmt.query_map(params![entity_id], row_to_relation)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(OmniError::from)
    }

    // -----------------------------------------------------------------
    // Storage-layer: indexer state
    // -----------------------------------------------------------------

    /// Fetch the last-indexed state for a source path, if any.
    pub fn get_indexer_state(
        &self,
        collection: &str,
        source_path: &str,
    ) -> OmniResult<Option<IndexerStateEntry>> {
        let entry = self
            .conn
            .query_row(
                "SELECT content_hash, last_indexed_at, entity_ids FROM indexer_state
                 WHERE collection = ?1 AND source_path = ?2",
                params![collection, source_path],
                |row| {
                    let ids: String = row.get(2)?;
                    Ok(IndexerStateEntry {
                        content_hash: row.get(0)?,
                        last_indexed_at: row.get(1)?,
                        entity_ids: serde_json::from_str(&ids).unwrap_or_default(),
                    })
                },
            )
            .optional()?;
        Ok(entry)
    }

    /// Record (or replace) the last-indexed state for a source path.
    pub fn set_indexer_state(
        &self,
        collection: &str,
        source_path: &str,
        entry: &IndexerStateEntry,
    ) -> OmniResult<()> {
        self.ensure_collection(collection)?;
        let ids = serde_json::to_string(&entry.entity_ids)?;
        self.conn.execute(
            "INSERT INTO indexer_state (collection, source_path, content_hash, last_indexed_at, entity_ids)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(collection, source_path) DO UPDATE SET
                content_hash = excluded.content_hash,
                last_indexed_at = excluded.last_indexed_at,
                entity_ids = excluded.entity_ids",
            params![collection, source_path, entry.content_hash, entry.last_indexed_at, ids],
        )?;
        Ok(())
    }

    /// Remove the indexer-state row for a source path (on file deletion).
    pub fn delete_indexer_state(&self, collection: &str, source_path: &str) -> OmniResult<()> {
        self.conn.execute(
            "DELETE FROM indexer_state WHERE collection = ?1 AND source_path = ?2",
            params![collection, source_path],
        )?;
        Ok(())
    }
}

fn row_to_chunk(row: &rusqlite::Row<'_>) -> rusqlite::Result<Chunk> {
    let kind: String = row.get(3)?;
    let visibility: String = row.get(4)?;
    Ok(Chunk {
        id: row.get(0)?,
        file_id: row.get(1)?,
        symbol_path: row.get(2)?,
        kind: chunk_kind_from_str(&kind),
        visibility: visibility_from_str(&visibility),
        line_start: row.get(5)?,
        line_end: row.get(6)?,
        content: row.get(7)?,
        doc_comment: row.get(8)?,
        token_count: row.get(9)?,
        weight: row.get(10)?,
        vector_id: row.get::<_, Option<i64>>(11)?.map(|v| v as u64),
    })
}

fn row_to_symbol(row: &rusqlite::Row<'_>) -> rusqlite::Result<Symbol> {
    let kind: String = row.get(3)?;
    Ok(Symbol {
        id: row.get(0)?,
        name: row.get(1)?,
        fqn: row.get(2)?,
        kind: chunk_kind_from_str(&kind),
        file_id: row.get(4)?,
        line: row.get(5)?,
        chunk_id: row.get(6)?,
    })
}

fn row_to_entity(row: &rusqlite::Row<'_>) -> rusqlite::Result<Entity> {
    let entity_type: String = row.get(2)?;
    let chunk_kind: String = row.get(3)?;
    let source_path: String = row.get(6)?;
    let observations: String = row.get(9)?;
    let metadata: String = row.get(11)?;
    Ok(Entity {
        id: row.get(0)?,
        collection: row.get(1)?,
        entity_type: EntityType::from_str_lossy(&entity_type),
        chunk_kind: EntityChunkKind::from_str_lossy(&chunk_kind),
        name: row.get(4)?,
        qualified_name: row.get(5)?,
        source_path: PathBuf::from(source_path),
        line_start: row.get(7)?,
        line_end: row.get(8)?,
        observations: serde_json::from_str(&observations).unwrap_or_default(),
        content: row.get(10)?,
        vector: None,
        metadata: EntityMetadata(serde_json::from_str(&metadata).unwrap_or_default()),
    })
}

fn row_to_relation(row: &rusqlite::Row<'_>) -> rusqlite::Result<Relation> {
    let kind: String = row.get(2)?;
    Ok(Relation {
        from_id: row.get(0)?,
        to_id: row.get(1)?,
        kind: RelationKind::from_str_lossy(&kind),
        weight: row.get(3)?,
    })
}

fn chunk_kind_str(kind: ChunkKind) -> &'static str {
    match kind {
        ChunkKind::Function => "function",
        ChunkKind::Class => "class",
        ChunkKind::Trait => "trait",
        ChunkKind::Impl => "impl",
        ChunkKind::Const => "const",
        ChunkKind::TypeDef => "type_def",
        ChunkKind::Module => "module",
        ChunkKind::Test => "test",
        ChunkKind::TopLevel => "top_level",
    }
}

fn chunk_kind_from_str(s: &str) -> ChunkKind {
    match s {
        "function" => ChunkKind::Function,
        "class" => ChunkKind::Class,
        "trait" => ChunkKind::Trait,
        "impl" => ChunkKind::Impl,
        "const" => ChunkKind::Const,
        "type_def" => ChunkKind::TypeDef,
        "module" => ChunkKind::Module,
        "test" => ChunkKind::Test,
        _ => ChunkKind::TopLevel,
    }
}

fn visibility_from_str(s: &str) -> Visibility {
    match s {
        "public" => Visibility::Public,
        "crate" => Visibility::Crate,
        "protected" => Visibility::Protected,
        _ => Visibility::Private,
    }
}

fn language_from_str(s: &str) -> Language {
    Language::from_extension(match s {
        "python" => "py",
        "typescript" => "ts",
        "javascript" => "js",
        "rust" => "rs",
        "go" => "go",
        "java" => "java",
        "c" => "c",
        "cpp" => "cpp",
        "csharp" => "cs",
        "css" => "css",
        "ruby" => "rb",
        "php" => "php",
        "swift" => "swift",
        "kotlin" => "kt",
        "html" => "html",
        "shell" => "sh",
        "markdown" => "md",
        "toml" => "toml",
        "yaml" => "yaml",
        "json" => "json",
        _ => "",
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EntityMetadata;

    #[test]
    fn test_open_creates_database() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let db_path = dir.path().join("test.db");
        let index = MetadataIndex::open(&db_path).expect("open database");
        assert!(index.check_integrity().expect("check integrity"));
    }

    #[test]
    fn test_upsert_and_get_file() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let index = MetadataIndex::open(&dir.path().join("test.db")).expect("open database");
        let file = FileInfo {
            id: 0,
            path: PathBuf::from("src/main.rs"),
            language: Language::Rust,
            content_hash: "abc123".into(),
            size_bytes: 42,
        };
        let id = index.upsert_file(&file).expect("upsert");
        assert!(id > 0);
        let hash = index
            .get_file_hash(Path::new("src/main.rs"))
            .expect("get hash")
            .expect("present");
        assert_eq!(hash, "abc123");
    }

    #[test]
    fn test_entity_roundtrip() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let index = MetadataIndex::open(&dir.path().join("test.db")).expect("open database");
        let entity = Entity {
            id: "e1".into(),
            collection: "demo".into(),
            entity_type: EntityType::Function,
            chunk_kind: EntityChunkKind::Metadata,
            name: "greet".into(),
            qualified_name: "mod::greet".into(),
            source_path: PathBuf::from("src/lib.rs"),
            line_start: 1,
            line_end: 3,
            observations: vec!["greets a user".into()],
            content: "fn greet(name: &str) -> String".into(),
            vector: None,
            metadata: EntityMetadata::for_code(Language::Rust, Visibility::Public, "low"),
        };
        index.upsert_entity(&entity).expect("upsert entity");
        let fetched = index.get_entity("e1").expect("get entity").expect("present");
        assert_eq!(fetched.name, "greet");
        assert_eq!(fetched.entity_type, EntityType::Function);
    }

    #[test]
    fn test_relation_roundtrip() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let index = MetadataIndex::open(&dir.path().join("test.db")).expect("open database");
        index.ensure_collection("demo").expect("ensure collection");
        let entity = |id: &str| Entity {
            id: id.into(),
            collection: "demo".into(),
            entity_type: EntityType::Function,
            chunk_kind: EntityChunkKind::Metadata,
            name: id.into(),
            qualified_name: id.into(),
            source_path: PathBuf::new(),
            line_start: 0,
            line_end: 0,
            observations: vec![],
            content: String::new(),
            vector: None,
            metadata: EntityMetadata::default(),
        };
        index.upsert_entity(&entity("a")).unwrap();
        index.upsert_entity(&entity("b")).unwrap();
        index
            .insert_relation(&Relation {
                from_id: "a".into(),
                to_id: "b".into(),
                kind: RelationKind::Calls,
                weight: None,
            })
            .unwrap();
        let out = index.relations_from("a").unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].to_id, "b");
    }
}
