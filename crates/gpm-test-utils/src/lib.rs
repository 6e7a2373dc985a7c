//! Shared test utilities for the git-privacy-manager workspace.
//!
//! Dev-dependency only, never published.
//!
//! # Modules
//!
//! - [`adapter`]: deterministic in-process encryption adapters
//! - [`tree`]: [`TestTree`] builder for managed working trees

pub mod adapter;
pub mod tree;

pub use adapter::{FailingAdapter, XorAdapter};
pub use tree::{TEST_PASSPHRASE, TestTree};
