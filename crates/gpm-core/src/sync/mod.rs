//! Synchronization between the working tree and the blob store

mod engine;
mod executor;
mod report;

pub use engine::{SyncEngine, SyncOptions};
pub use executor::CancelToken;
pub use report::{GcReport, RunSummary, SyncReport};
