//! Deterministic byte-windowed chunking.
//!
//! Two independent implementations given the same `(content, chunk_size,
//! chunk_overlap)` must produce byte-identical chunk arrays; this is the
//! only chunking algorithm the engine uses.

use docsync_core::error::{Result, SyncError};

/// Split `content` into fixed-width, overlapping windows over its raw UTF-8
/// bytes. `overlap` must be strictly less than `chunk_size`. Empty content
/// yields exactly one empty chunk.
///
/// A window boundary may split a multi-byte codepoint; chunk text is only
/// ever reassembled whole before being interpreted, never displayed
/// chunk-by-chunk, so this is not observable as mojibake.
pub fn chunk_bytes(content: &str, chunk_size: usize, overlap: usize) -> Result<Vec<String>> {
    if chunk_size == 0 {
        return Err(SyncError::invalid_argument("codec.chunk_size must be greater than 0"));
    }
    if overlap >= chunk_size {
        return Err(SyncError::invalid_argument(format!(
            "codec.chunk_overlap ({overlap}) must be less than codec.chunk_size ({chunk_size})"
        )));
    }

    let bytes = content.as_bytes();
    let len = bytes.len();
    let stride = chunk_size - overlap;

    if len == 0 {
        return Ok(vec![String::new()]);
    }

    let mut chunks = Vec::new();
    let mut start = 0usize;
    while start < len {
        let end = std::cmp::min(start + chunk_size, len);
        chunks.push(String::from_utf8_lossy(&bytes[start..end]).into_owned());
        start += stride;
    }
    Ok(chunks)
}

fn floor_char_boundary(s: &str, idx: usize) -> usize {
    let mut idx = idx.min(s.len());
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

/// Reverse of [`chunk_bytes`]: reassemble a document's content from its
/// ordered chunks by dropping each chunk's leading `overlap` bytes except
/// for the first chunk. This reproduces the original content exactly for
/// content whose chunk boundaries fall on UTF-8 char boundaries.
pub fn reassemble(chunks: &[String], overlap: usize) -> String {
    let Some((first, rest)) = chunks.split_first() else {
        return String::new();
    };
    let mut result = first.clone();
    for chunk in rest {
        let cut = floor_char_boundary(chunk, overlap);
        if chunk.len() > cut {
            result.push_str(&chunk[cut..]);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_content_yields_one_empty_chunk() {
        let chunks = chunk_bytes("", 512, 50).unwrap();
        assert_eq!(chunks, vec![String::new()]);
    }

    #[test]
    fn exact_multiple_no_overlap_no_trailer() {
        let content = "a".repeat(30);
        let chunks = chunk_bytes(&content, 10, 0).unwrap();
        assert_eq!(chunks.len(), 3);
        for c in &chunks {
            assert_eq!(c.len(), 10);
        }
    }

    #[test]
    fn short_content_single_chunk() {
        let chunks = chunk_bytes("ABC", 512, 50).unwrap();
        assert_eq!(chunks, vec!["ABC".to_string()]);
    }

    #[test]
    fn overlap_windows_advance_by_stride() {
        let content = "0123456789";
        let chunks = chunk_bytes(content, 4, 2).unwrap();
        assert_eq!(chunks, vec!["0123", "2345", "4567", "6789", "89"]);
    }

    #[test]
    fn rejects_overlap_not_less_than_size() {
        assert!(chunk_bytes("abc", 10, 10).is_err());
        assert!(chunk_bytes("abc", 10, 11).is_err());
    }

    #[test]
    fn rejects_zero_chunk_size() {
        assert!(chunk_bytes("abc", 0, 0).is_err());
    }

    #[test]
    fn deterministic_across_calls() {
        let content = "the quick brown fox jumps over the lazy dog".repeat(5);
        let a = chunk_bytes(&content, 37, 11).unwrap();
        let b = chunk_bytes(&content, 37, 11).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn reassemble_round_trips_overlapping_windows() {
        let content = "0123456789";
        let chunks = chunk_bytes(content, 4, 2).unwrap();
        assert_eq!(reassemble(&chunks, 2), content);
    }

    #[test]
    fn reassemble_round_trips_exact_multiple() {
        let content = "a".repeat(30);
        let chunks = chunk_bytes(&content, 10, 0).unwrap();
        assert_eq!(reassemble(&chunks, 0), content);
    }

    #[test]
    fn reassemble_single_chunk_is_identity() {
        let chunks = chunk_bytes("ABC", 512, 50).unwrap();
        assert_eq!(reassemble(&chunks, 50), "ABC");
    }
}
