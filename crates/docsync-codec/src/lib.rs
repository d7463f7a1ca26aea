//! docsync-codec - Deterministic chunking, content hashing and metadata
//! partitioning shared by the Stager and Hydrator.
//!
//! # Modules
//!
//! - [`chunk`]: the one deterministic byte-windowed splitting algorithm.
//! - [`hash`]: SHA-256 content hashing.
//! - [`ids`]: chunk id assembly.
//! - [`metadata`]: system/user metadata partitioning.

pub mod chunk;
pub mod hash;
pub mod ids;
pub mod metadata;

pub use chunk::{chunk_bytes, reassemble};
pub use hash::content_hash;
pub use ids::chunk_id;
pub use metadata::{partition_egress, partition_ingress, SystemFields};
