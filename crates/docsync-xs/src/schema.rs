//! Database schema definitions for the embedded vector store.

/// Main schema SQL for initializing the database. Chunk-id granular:
/// documents never appear here, only their emitted chunks.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS collections (
    name TEXT PRIMARY KEY,
    embedding_dim INTEGER NOT NULL,
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS chunks (
    chunk_id TEXT PRIMARY KEY,
    collection TEXT NOT NULL REFERENCES collections(name) ON DELETE CASCADE,
    doc_id TEXT NOT NULL,
    content TEXT NOT NULL,
    metadata TEXT NOT NULL DEFAULT '{}'
);

CREATE INDEX IF NOT EXISTS idx_chunks_collection ON chunks(collection);
CREATE INDEX IF NOT EXISTS idx_chunks_doc_id ON chunks(doc_id);

-- FTS5 virtual table kept for keyword lookups over chunk content; the
-- similarity-query surface proper is an external collaborator, but a local
-- text index is useful for diagnostics and the CLI's `get` command.
CREATE VIRTUAL TABLE IF NOT EXISTS chunks_fts USING fts5(
    content,
    content=chunks,
    content_rowid=rowid
);

CREATE TRIGGER IF NOT EXISTS chunks_ai AFTER INSERT ON chunks BEGIN
    INSERT INTO chunks_fts(rowid, content) VALUES (NEW.rowid, NEW.content);
END;

CREATE TRIGGER IF NOT EXISTS chunks_ad AFTER DELETE ON chunks BEGIN
    INSERT INTO chunks_fts(chunks_fts, rowid, content) VALUES ('delete', OLD.rowid, OLD.content);
END;

CREATE TRIGGER IF NOT EXISTS chunks_au AFTER UPDATE ON chunks BEGIN
    INSERT INTO chunks_fts(chunks_fts, rowid, content) VALUES ('delete', OLD.rowid, OLD.content);
    INSERT INTO chunks_fts(rowid, content) VALUES (NEW.rowid, NEW.content);
END;
"#;

/// Schema version for migrations.
pub const SCHEMA_VERSION: u32 = 1;

/// Name of the per-collection vec0 virtual table holding embeddings. Each
/// collection gets its own table because `vec0` fixes the embedding
/// dimension at creation time and collections may use different models.
pub fn vec_table_name(collection: &str) -> String {
    let sanitized: String = collection
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("vec_chunks_{sanitized}")
}

/// SQL to create the vec0 table for a collection with a given dimension.
pub fn vec_table_schema(collection: &str, dim: usize) -> String {
    format!(
        "CREATE VIRTUAL TABLE IF NOT EXISTS {} USING vec0(chunk_id TEXT PRIMARY KEY, embedding float[{}] distance_metric=cosine);",
        vec_table_name(collection),
        dim
    )
}
