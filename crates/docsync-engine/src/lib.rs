//! docsync-engine - Delta detection, staging, hydration, the side-band
//! state store and the sync manager state machine that ties the version
//! store and the vector store together.

pub mod delta;
pub mod hydrator;
pub mod manager;
pub mod stager;
pub mod state_store;
pub mod vs_schema;

#[cfg(test)]
mod test_support;

pub use delta::{Delta, DeltaDetector, DeltaKind};
pub use hydrator::{HydrationResult, Hydrator};
pub use manager::{BootstrapOptions, RepositoryStatus, SyncManager};
pub use stager::{Stager, StagerResult};
pub use state_store::SqliteStateStore;
