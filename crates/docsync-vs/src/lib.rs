//! docsync-vs - Adapter over the external version-store command-line tool.
//!
//! Exposes a typed, async `VsAdapter` capability set (re-exported from
//! `docsync-core`) with two implementations: [`CliVsAdapter`], which drives
//! the real CLI as a subprocess, and [`mock::MockVsAdapter`], an in-memory
//! fake used by tests.

mod adapter;
mod process;
pub mod mock;

pub use adapter::CliVsAdapter;
pub use mock::MockVsAdapter;
