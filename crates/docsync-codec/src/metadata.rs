//! Metadata partitioning between the "system" fields the engine owns and
//! the "user" fields that came from the Document itself.

use std::collections::HashMap;

use docsync_core::error::{Result, SyncError};
use serde_json::Value;

/// Keys the engine writes into chunk metadata and therefore reserves. A
/// user metadata key with the same name is renamed to `user_<key>` rather
/// than overwritten, so no information is silently dropped.
pub const SYSTEM_KEYS: &[&str] = &[
    "source_id",
    "collection_name",
    "content_hash",
    "chunk_index",
    "total_chunks",
    "source_commit",
];

/// System values attached to every chunk of a document.
#[derive(Debug, Clone)]
pub struct SystemFields {
    pub source_id: String,
    pub collection_name: String,
    pub content_hash: String,
    pub chunk_index: u32,
    pub total_chunks: u32,
    pub source_commit: Option<String>,
}

/// Build chunk metadata for egress (VS → XS): user metadata with the
/// system keys overwritten, renaming any user key that collides with a
/// system key to `user_<key>` first.
pub fn partition_egress(
    user_metadata: &HashMap<String, Value>,
    system: &SystemFields,
) -> HashMap<String, Value> {
    let mut out = HashMap::with_capacity(user_metadata.len() + SYSTEM_KEYS.len());

    for (key, value) in user_metadata {
        if SYSTEM_KEYS.contains(&key.as_str()) {
            out.insert(format!("user_{key}"), value.clone());
        } else {
            out.insert(key.clone(), value.clone());
        }
    }

    out.insert("source_id".to_string(), Value::String(system.source_id.clone()));
    out.insert(
        "collection_name".to_string(),
        Value::String(system.collection_name.clone()),
    );
    out.insert(
        "content_hash".to_string(),
        Value::String(system.content_hash.clone()),
    );
    out.insert("chunk_index".to_string(), Value::from(system.chunk_index));
    out.insert("total_chunks".to_string(), Value::from(system.total_chunks));
    if let Some(commit) = &system.source_commit {
        out.insert("source_commit".to_string(), Value::String(commit.clone()));
    }

    out
}

/// Strip the system keys back out of chunk metadata for ingress
/// (XS → VS), reversing the `user_<key>` rename, and verify the recorded
/// content hash matches the reassembled content.
pub fn partition_ingress(
    chunk_metadata: &HashMap<String, Value>,
    reassembled_content: &str,
) -> Result<HashMap<String, Value>> {
    let recorded_hash = chunk_metadata
        .get("content_hash")
        .and_then(Value::as_str)
        .ok_or_else(|| SyncError::invalid_argument("chunk metadata missing content_hash"))?
        .to_string();

    let actual_hash = docsync_core::types::content_hash(reassembled_content);
    if recorded_hash != actual_hash {
        let doc_id = chunk_metadata
            .get("source_id")
            .and_then(Value::as_str)
            .unwrap_or("<unknown>")
            .to_string();
        let collection = chunk_metadata
            .get("collection_name")
            .and_then(Value::as_str)
            .unwrap_or("<unknown>")
            .to_string();
        return Err(SyncError::ContentHashMismatch {
            collection,
            doc_id,
            expected: recorded_hash,
            actual: actual_hash,
        });
    }

    let mut user_metadata = HashMap::new();
    for (key, value) in chunk_metadata {
        if SYSTEM_KEYS.contains(&key.as_str()) {
            continue;
        }
        if let Some(original) = key.strip_prefix("user_") {
            if SYSTEM_KEYS.contains(&original) {
                user_metadata.insert(original.to_string(), value.clone());
                continue;
            }
        }
        user_metadata.insert(key.clone(), value.clone());
    }

    Ok(user_metadata)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_system() -> SystemFields {
        SystemFields {
            source_id: "d1".into(),
            collection_name: "teachings".into(),
            content_hash: docsync_core::types::content_hash("ABC"),
            chunk_index: 0,
            total_chunks: 1,
            source_commit: Some("abc123".into()),
        }
    }

    #[test]
    fn egress_overwrites_system_keys() {
        let mut user = HashMap::new();
        user.insert("author".to_string(), Value::String("me".to_string()));
        let out = partition_egress(&user, &sample_system());
        assert_eq!(out.get("source_id").unwrap(), "d1");
        assert_eq!(out.get("author").unwrap(), "me");
    }

    #[test]
    fn egress_renames_colliding_user_key() {
        let mut user = HashMap::new();
        user.insert("chunk_index".to_string(), Value::from(99));
        let out = partition_egress(&user, &sample_system());
        assert_eq!(out.get("chunk_index").unwrap(), &Value::from(0));
        assert_eq!(out.get("user_chunk_index").unwrap(), &Value::from(99));
    }

    #[test]
    fn ingress_round_trips_user_metadata() {
        let mut user = HashMap::new();
        user.insert("author".to_string(), Value::String("me".to_string()));
        user.insert("chunk_index".to_string(), Value::from(99));
        let egressed = partition_egress(&user, &sample_system());
        let recovered = partition_ingress(&egressed, "ABC").unwrap();
        assert_eq!(recovered.get("author").unwrap(), "me");
        assert_eq!(recovered.get("chunk_index").unwrap(), &Value::from(99));
    }

    #[test]
    fn ingress_detects_hash_mismatch() {
        let egressed = partition_egress(&HashMap::new(), &sample_system());
        let err = partition_ingress(&egressed, "TAMPERED").unwrap_err();
        assert_eq!(err.error_code(), "CONTENT_HASH_MISMATCH");
    }
}
