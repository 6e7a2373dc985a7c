//! Command implementations for gpm-cli

pub mod gc;
pub mod init;
pub mod status;
pub mod sync;

pub use gc::run_gc;
pub use init::run_init;
pub use status::run_status;
pub use sync::run_sync;
