//! Delta Detector (§4.4): pure reads that enumerate what is out of sync
//! between the version store and the vector store for one collection.
//!
//! Neither detector mutates anything; both only compare content hashes
//! against the Sync Log.

use std::collections::{HashMap, HashSet};

use docsync_codec::reassemble;
use docsync_core::error::Result;
use docsync_core::traits::{StateStore, VsAdapter, XsAdapter};
use docsync_core::types::{content_hash, Document};
use serde_json::Value;
use tracing::debug;

use crate::vs_schema;

/// One pending change, named by `doc_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeltaKind {
    New,
    Modified,
    Deleted,
}

/// Result of scanning one direction for one collection.
#[derive(Debug, Clone, Default)]
pub struct Delta {
    pub new: Vec<String>,
    pub modified: Vec<String>,
    pub deleted: Vec<String>,
}

impl Delta {
    pub fn is_empty(&self) -> bool {
        self.new.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }

    fn push(&mut self, doc_id: String, kind: DeltaKind) {
        match kind {
            DeltaKind::New => self.new.push(doc_id),
            DeltaKind::Modified => self.modified.push(doc_id),
            DeltaKind::Deleted => self.deleted.push(doc_id),
        }
    }
}

pub struct DeltaDetector;

impl DeltaDetector {
    /// VS → XS pending: documents table rows whose `(doc_id, content_hash)`
    /// isn't reflected in the Sync Log, plus Sync Log entries whose
    /// `doc_id` no longer exists in the VS.
    pub async fn vs_to_xs_pending(
        vs: &dyn VsAdapter,
        state: &dyn StateStore,
        collection: &str,
    ) -> Result<Delta> {
        let documents = vs_schema::list_documents(vs, collection).await?;
        let log_entries = state.list_sync_log(collection).await?;
        let log_by_doc: HashMap<&str, &docsync_core::types::SyncLogEntry> =
            log_entries.iter().map(|e| (e.doc_id.as_str(), e)).collect();

        let mut delta = Delta::default();
        let mut seen = HashSet::new();

        for doc in &documents {
            seen.insert(doc.doc_id.as_str());
            match log_by_doc.get(doc.doc_id.as_str()) {
                None => delta.push(doc.doc_id.clone(), DeltaKind::New),
                Some(entry) if entry.content_hash != doc.content_hash => {
                    delta.push(doc.doc_id.clone(), DeltaKind::Modified)
                }
                Some(_) => {}
            }
        }

        for entry in &log_entries {
            if !seen.contains(entry.doc_id.as_str()) {
                delta.push(entry.doc_id.clone(), DeltaKind::Deleted);
            }
        }

        debug!(
            collection,
            new = delta.new.len(),
            modified = delta.modified.len(),
            deleted = delta.deleted.len(),
            "computed vs->xs delta"
        );
        Ok(delta)
    }

    /// XS → VS pending: XS documents (grouped from chunks by `source_id`)
    /// that carry a Local-Change flag, reassemble to a different hash than
    /// the Sync Log records, or have no Sync Log entry at all. Plus Sync
    /// Log entries whose `doc_id` no longer exists in the XS.
    pub async fn xs_to_vs_pending(
        xs: &dyn XsAdapter,
        state: &dyn StateStore,
        collection: &str,
        chunk_overlap: usize,
    ) -> Result<Delta> {
        let grouped = group_xs_documents(xs, collection).await?;
        let log_entries = state.list_sync_log(collection).await?;
        let log_by_doc: HashMap<&str, &docsync_core::types::SyncLogEntry> =
            log_entries.iter().map(|e| (e.doc_id.as_str(), e)).collect();

        let mut delta = Delta::default();
        let mut seen = HashSet::new();

        for (doc_id, chunks) in &grouped {
            seen.insert(doc_id.as_str());
            let flagged = state.get_local_change_flag(collection, doc_id).await?;
            let reassembled = reassemble_chunks(chunks, chunk_overlap);
            let actual_hash = content_hash(&reassembled);

            match log_by_doc.get(doc_id.as_str()) {
                None => delta.push(doc_id.clone(), DeltaKind::New),
                Some(entry) if flagged || entry.content_hash != actual_hash => {
                    delta.push(doc_id.clone(), DeltaKind::Modified)
                }
                Some(_) => {}
            }
        }

        for entry in &log_entries {
            if !seen.contains(entry.doc_id.as_str()) {
                delta.push(entry.doc_id.clone(), DeltaKind::Deleted);
            }
        }

        debug!(
            collection,
            new = delta.new.len(),
            modified = delta.modified.len(),
            deleted = delta.deleted.len(),
            "computed xs->vs delta"
        );
        Ok(delta)
    }
}

/// A chunk of an XS document, ordered and ready for reassembly.
pub struct XsChunk {
    pub chunk_id: String,
    pub chunk_index: u32,
    pub content: String,
    pub metadata: HashMap<String, Value>,
}

/// Group every chunk in a collection by its `source_id` (doc_id), in
/// `chunk_index` order.
pub async fn group_xs_documents(
    xs: &dyn XsAdapter,
    collection: &str,
) -> Result<HashMap<String, Vec<XsChunk>>> {
    let ids_with_meta = xs.list_ids_with_metadata(collection).await?;
    if ids_with_meta.is_empty() {
        return Ok(HashMap::new());
    }

    let ids: Vec<String> = ids_with_meta.iter().map(|(id, _)| id.clone()).collect();
    let (got_ids, docs, _) = xs.get(collection, &ids).await?;
    let content_by_id: HashMap<&str, &str> = got_ids
        .iter()
        .zip(docs.iter())
        .map(|(id, doc)| (id.as_str(), doc.as_str()))
        .collect();

    let mut grouped: HashMap<String, Vec<XsChunk>> = HashMap::new();
    for (chunk_id, metadata) in ids_with_meta {
        let doc_id = metadata
            .get("source_id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let chunk_index = metadata.get("chunk_index").and_then(Value::as_u64).unwrap_or(0) as u32;
        let content = content_by_id.get(chunk_id.as_str()).copied().unwrap_or_default().to_string();

        grouped.entry(doc_id).or_default().push(XsChunk {
            chunk_id,
            chunk_index,
            content,
            metadata,
        });
    }

    for chunks in grouped.values_mut() {
        chunks.sort_by_key(|c| c.chunk_index);
    }

    Ok(grouped)
}

/// Reassemble an ordered chunk list back into document content using the
/// collection's configured chunk overlap.
pub fn reassemble_chunks(chunks: &[XsChunk], chunk_overlap: usize) -> String {
    let contents: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
    reassemble(&contents, chunk_overlap)
}

/// Build a `Document` from a group of ordered XS chunks, verifying the
/// content hash the chunks' own metadata recorded.
pub fn document_from_xs_chunks(
    collection: &str,
    doc_id: &str,
    chunks: &[XsChunk],
    chunk_overlap: usize,
) -> Result<Document> {
    let reassembled = reassemble_chunks(chunks, chunk_overlap);
    let metadata = chunks
        .first()
        .map(|c| c.metadata.clone())
        .unwrap_or_default();
    let user_metadata = docsync_codec::partition_ingress(&metadata, &reassembled)?;

    let now = docsync_core::config::now_millis();
    Ok(Document {
        doc_id: doc_id.to_string(),
        collection: collection.to_string(),
        content_hash: content_hash(&reassembled),
        content: reassembled,
        title: None,
        doc_type: None,
        metadata: user_metadata,
        created_at: now,
        updated_at: now,
    })
}
