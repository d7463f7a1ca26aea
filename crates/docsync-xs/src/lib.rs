//! docsync-xs - Embedded vector store adapter (SQLite + sqlite-vec)
//! implementing the XS capability set.
//!
//! This stands in for the external vector-store driver named in the
//! capability set: chunk-id granular storage plus per-collection `vec0`
//! tables, since collections may use different embedding models.

mod schema;
mod sqlite;

pub use schema::{vec_table_name, vec_table_schema, SCHEMA, SCHEMA_VERSION};
pub use sqlite::SqliteXsAdapter;
