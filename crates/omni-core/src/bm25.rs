//! Lexical inverted index with tunable BM25 scoring.
//!
//! Postings live in the same SQLite database as entities (see
//! `index/schema.sql`), so upserts and deletes stay transactional with the
//! rest of indexing. Tokenisation is language-agnostic: lower-cased
//! unicode word-characters, with camelCase and snake_case split into their
//! component words in addition to being kept whole, so a query for `parse`
//! matches both `parseFile` and `parse_file`.

use std::collections::HashMap;

use rusqlite::{params, Connection};

use crate::config::Bm25Config;
use crate::error::OmniResult;

/// A single scored hit from a BM25 query.
#[derive(Debug, Clone, PartialEq)]
pub struct Bm25Hit {
    /// Entity id.
    pub entity_id: String,
    /// BM25 score (higher is more relevant).
    pub score: f64,
}

/// Tokenise text into lower-cased word tokens, splitting camelCase and
/// snake_case into their component words *in addition to* the whole
/// identifier, so both still match.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    for word in text.split(|c: char| !c.is_alphanumeric() && c != '_') {
        if word.is_empty() {
            continue;
        }
        let lower = word.to_lowercase();
        tokens.push(lower);
        for part in split_identifier(word) {
            let lower_part = part.to_lowercase();
            if lower_part != word.to_lowercase() {
                tokens.push(lower_part);
            }
        }
    }
    tokens
}

/// Split a single identifier on underscores and camelCase boundaries.
fn split_identifier(word: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let chars: Vec<char> = word.chars().collect();

    for (i, &c) in chars.iter().enumerate() {
        if c == '_' {
            if !current.is_empty() {
                parts.push(std::mem::take(&mut current));
            }
            continue;
        }
        if i > 0 {
            let prev = chars[i - 1];
            let boundary = (prev.is_lowercase() && c.is_uppercase())
                || (i + 1 < chars.len()
                    && prev.is_uppercase()
                    && c.is_uppercase()
                    && chars[i + 1].is_lowercase());
            if boundary && !current.is_empty() {
                parts.push(std::mem::take(&mut current));
            }
        }
        current.push(c);
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

/// Insert or replace the postings for an entity's content, updating
/// collection-level document statistics. Call after deleting any prior
/// postings for this entity id (upsert semantics).
pub fn index_entity(
    conn: &Connection,
    collection: &str,
    entity_id: &str,
    content: &str,
) -> OmniResult<()> {
    let tokens = tokenize(content);
    let doc_length = tokens.len() as i64;

    let mut freqs: HashMap<String, i64> = HashMap::new();
    for token in &tokens {
        *freqs.entry(token.clone()).or_insert(0) += 1;
    }

    let previously_indexed: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM bm25_doc_stats WHERE collection = ?1 AND entity_id = ?2)",
        params![collection, entity_id],
        |row| row.get(0),
    )?;

    delete_entity(conn, collection, entity_id)?;

    for (term, freq) in &freqs {
        conn.execute(
            "INSERT INTO bm25_postings (collection, term, entity_id, term_freq)
             VALUES (?1, ?2, ?3, ?4)",
            params![collection, term, entity_id, freq],
        )?;
    }
    conn.execute(
        "INSERT INTO bm25_doc_stats (collection, entity_id, doc_length) VALUES (?1, ?2, ?3)",
        params![collection, entity_id, doc_length],
    )?;

    conn.execute(
        "INSERT INTO bm25_collection_stats (collection, doc_count, total_length)
         VALUES (?1, 1, ?2)
         ON CONFLICT(collection) DO UPDATE SET
            doc_count = doc_count + ?3,
            total_length = total_length + ?2",
        params![collection, doc_length, if previously_indexed { 0 } else { 1 }],
    )?;

    Ok(())
}

/// Remove all postings and doc stats for an entity.
pub fn delete_entity(conn: &Connection, collection: &str, entity_id: &str) -> OmniResult<()> {
    let prior_length: Option<i64> = conn
        .query_row(
            "SELECT doc_length FROM bm25_doc_stats WHERE collection = ?1 AND entity_id = ?2",
            params![collection, entity_id],
            |row| row.get(0),
        )
        .ok();

    conn.execute(
        "DELETE FROM bm25_postings WHERE collection = ?1 AND entity_id = ?2",
        params![collection, entity_id],
    )?;
    conn.execute(
        "DELETE FROM bm25_doc_stats WHERE collection = ?1 AND entity_id = ?2",
        params![collection, entity_id],
    )?;

    if let Some(length) = prior_length {
        conn.execute(
            "UPDATE bm25_collection_stats SET
                doc_count = MAX(0, doc_count - 1),
                total_length = MAX(0, total_length - ?2)
             WHERE collection = ?1",
            params![collection, length],
        )?;
    }
    Ok(())
}

/// Run a BM25 query against a collection's postings, returning the top `k`
/// entity ids by descending score.
pub fn search(
    conn: &Connection,
    collection: &str,
    query: &str,
    k: usize,
    config: &Bm25Config,
) -> OmniResult<Vec<Bm25Hit>> {
    let (doc_count, total_length): (i64, i64) = conn
        .query_row(
            "SELECT doc_count, total_length FROM bm25_collection_stats WHERE collection = ?1",
            params![collection],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap_or((0, 0));

    if doc_count == 0 {
        return Ok(Vec::new());
    }
    let avg_doc_length = total_length as f64 / doc_count as f64;

    let mut query_terms: Vec<String> = tokenize(query);
    query_terms.sort();
    query_terms.dedup();

    let mut scores: HashMap<String, f64> = HashMap::new();

    for term in &query_terms {
        let doc_freq: i64 = conn.query_row(
            "SELECT COUNT(DISTINCT entity_id) FROM bm25_postings WHERE collection = ?1 AND term = ?2",
            params![collection, term],
            |row| row.get(0),
        )?;
        if doc_freq == 0 {
            continue;
        }
        // Robertson-Sparck Jones IDF, floored at a small epsilon so a term
        // present in every document doesn't produce a negative weight.
        let idf = ((doc_count as f64 - doc_freq as f64 + 0.5) / (doc_freq as f64 + 0.5) + 1.0).ln();

        let mut stmt = conn.prepare(
            "SELECT p.entity_id, p.term_freq, d.doc_length
             FROM bm25_postings p
             JOIN bm25_doc_stats d ON d.collection = p.collection AND d.entity_id = p.entity_id
             WHERE p.collection = ?1 AND p.term = ?2",
        )?;
        let rows = stmt.query_map(params![collection, term], |row| {
            let entity_id: String = row.get(0)?;
            let term_freq: i64 = row.get(1)?;
            let doc_length: i64 = row.get(2)?;
            Ok((entity_id, term_freq, doc_length))
        })?;

        for row in rows {
            let (entity_id, term_freq, doc_length) = row?;
            let tf = term_freq as f64;
            let len_norm = 1.0 - config.b + config.b * (doc_length as f64 / avg_doc_length);
            let term_score = idf * (tf * (config.k1 + 1.0)) / (tf + config.k1 * len_norm);
            *scores.entry(entity_id).or_insert(0.0) += term_score;
        }
    }

    let mut hits: Vec<Bm25Hit> = scores
        .into_iter()
        .map(|(entity_id, score)| Bm25Hit { entity_id, score })
        .collect();
    hits.sort_by(|a, b| b.score.total_cmp(&a.score));
    hits.truncate(k);
    Ok(hits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::MetadataIndex;

    #[test]
    fn test_tokenize_splits_camel_and_snake_case() {
        let tokens = tokenize("parseFile parse_file");
        assert!(tokens.contains(&"parsefile".to_string()));
        assert!(tokens.contains(&"parse".to_string()));
        assert!(tokens.contains(&"file".to_string()));
    }

    #[test]
    fn test_index_and_search_ranks_relevant_doc_first() {
        let dir = tempfile::tempdir().unwrap();
        let index = MetadataIndex::open(&dir.path().join("test.db")).unwrap();
        index.ensure_collection("demo").unwrap();
        let conn = index.connection();

        index_entity(conn, "demo", "a", "fn parse_file(path: &Path) -> Result<Ast>").unwrap();
        index_entity(conn, "demo", "b", "fn write_log(message: &str)").unwrap();

        let config = Bm25Config::default();
        let hits = search(conn, "demo", "parse file", 10, &config).unwrap();
        assert!(!hits.is_empty());
        assert_eq!(hits[0].entity_id, "a");
    }

    #[test]
    fn test_delete_entity_removes_postings() {
        let dir = tempfile::tempdir().unwrap();
        let index = MetadataIndex::open(&dir.path().join("test.db")).unwrap();
        index.ensure_collection("demo").unwrap();
        let conn = index.connection();

        index_entity(conn, "demo", "a", "fn parse_file()").unwrap();
        delete_entity(conn, "demo", "a").unwrap();

        let config = Bm25Config::default();
        let hits = search(conn, "demo", "parse", 10, &config).unwrap();
        assert!(hits.is_empty());
    }
}
