//! docsync-core - Core types, traits and configuration for the sync engine
//!
//! This crate provides the foundational domain types, the `VsAdapter`/
//! `XsAdapter`/`StateStore`/`Embedder` capability sets, configuration and
//! error handling shared by every other crate in the workspace.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::*;
pub use error::{Result, SyncError};
pub use traits::*;
pub use types::*;
