//! The versioned-tables schema contract (§6): `collections` and `documents`.
//!
//! The version store is only reachable through its generic `exec`/`query_json`
//! SQL surface (§4.1), so the engine owns the DDL and the row (de)serialization
//! for these two tables. The version store itself has no notion of what a
//! "document" or "collection" is; it just stores rows.

use std::collections::HashMap;

use docsync_core::error::{Result, SyncError};
use docsync_core::traits::VsAdapter;
use docsync_core::types::{Collection, Document};
use serde_json::Value;

const CREATE_COLLECTIONS: &str = r#"
CREATE TABLE IF NOT EXISTS collections (
    collection_name TEXT PRIMARY KEY,
    display_name TEXT,
    description TEXT,
    embedding_model TEXT NOT NULL,
    chunk_size INTEGER NOT NULL,
    chunk_overlap INTEGER NOT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    document_count INTEGER NOT NULL DEFAULT 0,
    metadata_json TEXT NOT NULL DEFAULT '{}'
);
"#;

const CREATE_DOCUMENTS: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
    doc_id TEXT NOT NULL,
    collection_name TEXT NOT NULL,
    content TEXT NOT NULL,
    content_hash TEXT NOT NULL,
    title TEXT,
    doc_type TEXT,
    metadata_json TEXT NOT NULL DEFAULT '{}',
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    PRIMARY KEY (doc_id, collection_name),
    FOREIGN KEY (collection_name) REFERENCES collections(collection_name)
);
"#;

/// Run the initial migration against the version store. Idempotent.
pub async fn ensure_schema(vs: &dyn VsAdapter) -> Result<()> {
    vs.exec(CREATE_COLLECTIONS).await?;
    vs.exec(CREATE_DOCUMENTS).await?;
    Ok(())
}

/// True if the documents table exists and is reachable.
pub async fn schema_present(vs: &dyn VsAdapter) -> bool {
    vs.query_json("SELECT name FROM sqlite_master WHERE type='table' AND name='documents'")
        .await
        .map(|rows| !rows.is_empty())
        .unwrap_or(false)
}

fn sql_str(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

fn sql_opt_str(s: &Option<String>) -> String {
    match s {
        Some(v) => sql_str(v),
        None => "NULL".to_string(),
    }
}

pub async fn upsert_collection(vs: &dyn VsAdapter, collection: &Collection) -> Result<()> {
    let metadata_json = sql_str("{}");
    let sql = format!(
        "INSERT INTO collections (collection_name, display_name, description, embedding_model, \
         chunk_size, chunk_overlap, created_at, updated_at, document_count, metadata_json) \
         VALUES ({}, {}, {}, {}, {}, {}, {}, {}, {}, {}) \
         ON CONFLICT(collection_name) DO UPDATE SET \
         display_name=excluded.display_name, description=excluded.description, \
         embedding_model=excluded.embedding_model, chunk_size=excluded.chunk_size, \
         chunk_overlap=excluded.chunk_overlap, updated_at=excluded.updated_at, \
         document_count=excluded.document_count",
        sql_str(&collection.name),
        sql_opt_str(&collection.display_name),
        sql_opt_str(&collection.description),
        sql_str(&collection.embedding_model),
        collection.chunk_size,
        collection.chunk_overlap,
        collection.created_at,
        collection.updated_at,
        collection.document_count,
        metadata_json,
    );
    vs.exec(&sql).await?;
    Ok(())
}

pub async fn get_collection(vs: &dyn VsAdapter, name: &str) -> Result<Option<Collection>> {
    let sql = format!(
        "SELECT collection_name, display_name, description, embedding_model, chunk_size, \
         chunk_overlap, created_at, updated_at, document_count FROM collections WHERE collection_name = {}",
        sql_str(name)
    );
    let rows = vs.query_json(&sql).await?;
    Ok(rows.first().map(row_to_collection))
}

fn row_to_collection(row: &Value) -> Collection {
    Collection {
        name: row.get("collection_name").and_then(Value::as_str).unwrap_or_default().to_string(),
        display_name: row.get("display_name").and_then(Value::as_str).map(str::to_string),
        description: row.get("description").and_then(Value::as_str).map(str::to_string),
        embedding_model: row.get("embedding_model").and_then(Value::as_str).unwrap_or_default().to_string(),
        chunk_size: row.get("chunk_size").and_then(Value::as_u64).unwrap_or(512) as usize,
        chunk_overlap: row.get("chunk_overlap").and_then(Value::as_u64).unwrap_or(50) as usize,
        created_at: row.get("created_at").and_then(Value::as_i64).unwrap_or(0),
        updated_at: row.get("updated_at").and_then(Value::as_i64).unwrap_or(0),
        document_count: row.get("document_count").and_then(Value::as_u64).unwrap_or(0),
    }
}

pub async fn insert_document(vs: &dyn VsAdapter, doc: &Document) -> Result<()> {
    let metadata_json = serde_json::to_string(&doc.metadata)?;
    let sql = format!(
        "INSERT INTO documents (doc_id, collection_name, content, content_hash, title, doc_type, \
         metadata_json, created_at, updated_at) VALUES ({}, {}, {}, {}, {}, {}, {}, {}, {})",
        sql_str(&doc.doc_id),
        sql_str(&doc.collection),
        sql_str(&doc.content),
        sql_str(&doc.content_hash),
        sql_opt_str(&doc.title),
        sql_opt_str(&doc.doc_type),
        sql_str(&metadata_json),
        doc.created_at,
        doc.updated_at,
    );
    vs.exec(&sql).await?;
    Ok(())
}

pub async fn update_document(vs: &dyn VsAdapter, doc: &Document) -> Result<()> {
    let metadata_json = serde_json::to_string(&doc.metadata)?;
    let sql = format!(
        "UPDATE documents SET content = {}, content_hash = {}, title = {}, doc_type = {}, \
         metadata_json = {}, updated_at = {} WHERE doc_id = {} AND collection_name = {}",
        sql_str(&doc.content),
        sql_str(&doc.content_hash),
        sql_opt_str(&doc.title),
        sql_opt_str(&doc.doc_type),
        sql_str(&metadata_json),
        doc.updated_at,
        sql_str(&doc.doc_id),
        sql_str(&doc.collection),
    );
    vs.exec(&sql).await?;
    Ok(())
}

pub async fn delete_document(vs: &dyn VsAdapter, collection: &str, doc_id: &str) -> Result<()> {
    let sql = format!(
        "DELETE FROM documents WHERE doc_id = {} AND collection_name = {}",
        sql_str(doc_id),
        sql_str(collection)
    );
    vs.exec(&sql).await?;
    Ok(())
}

pub async fn get_document(vs: &dyn VsAdapter, collection: &str, doc_id: &str) -> Result<Option<Document>> {
    let sql = format!(
        "SELECT doc_id, collection_name, content, content_hash, title, doc_type, metadata_json, \
         created_at, updated_at FROM documents WHERE doc_id = {} AND collection_name = {}",
        sql_str(doc_id),
        sql_str(collection)
    );
    let rows = vs.query_json(&sql).await?;
    rows.first().map(row_to_document).transpose()
}

pub async fn list_documents(vs: &dyn VsAdapter, collection: &str) -> Result<Vec<Document>> {
    let sql = format!(
        "SELECT doc_id, collection_name, content, content_hash, title, doc_type, metadata_json, \
         created_at, updated_at FROM documents WHERE collection_name = {} ORDER BY doc_id",
        sql_str(collection)
    );
    let rows = vs.query_json(&sql).await?;
    rows.iter().map(row_to_document).collect()
}

fn row_to_document(row: &Value) -> Result<Document> {
    let metadata_str = row.get("metadata_json").and_then(Value::as_str).unwrap_or("{}");
    let metadata: HashMap<String, Value> = serde_json::from_str(metadata_str)?;
    Ok(Document {
        doc_id: row.get("doc_id").and_then(Value::as_str).ok_or_else(|| SyncError::inconsistent("document row missing doc_id"))?.to_string(),
        collection: row.get("collection_name").and_then(Value::as_str).unwrap_or_default().to_string(),
        content: row.get("content").and_then(Value::as_str).unwrap_or_default().to_string(),
        content_hash: row.get("content_hash").and_then(Value::as_str).unwrap_or_default().to_string(),
        title: row.get("title").and_then(Value::as_str).map(str::to_string),
        doc_type: row.get("doc_type").and_then(Value::as_str).map(str::to_string),
        metadata,
        created_at: row.get("created_at").and_then(Value::as_i64).unwrap_or(0),
        updated_at: row.get("updated_at").and_then(Value::as_i64).unwrap_or(0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_embedded_quotes() {
        assert_eq!(sql_str("o'brien"), "'o''brien'");
    }

    #[test]
    fn opt_str_none_is_null() {
        assert_eq!(sql_opt_str(&None), "NULL");
    }
}
