//! Chunk id assembly.

pub use docsync_core::types::Chunk;

/// Assemble the id for chunk `index` of `doc_id`. Ids are never reused
/// across edits: an update deletes all chunks for a document and adds new
/// ones under fresh indices starting at 0.
pub fn chunk_id(doc_id: &str, index: u32) -> String {
    Chunk::make_id(doc_id, index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_matches_spec() {
        assert_eq!(chunk_id("report-1", 0), "report-1_chunk_0");
    }
}
