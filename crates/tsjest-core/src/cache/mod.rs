//! Persistent dependency graph and cache keys
//!
//! The dependency graph records, per file, the content it was last checked
//! with and the modules it resolves to. It is persisted per configuration
//! digest so worker processes with the same configuration share it.

mod error;
mod hash;
mod invalidation;
mod key;
mod manager;
mod manifest;

pub use error::{CacheError, Result};
pub use hash::{hash_config, hash_content};
pub use invalidation::InvalidationEngine;
pub use key::CacheKeyInputs;
pub use manager::GraphStore;
pub use manifest::{DependencyGraph, DependencyGraphEntry};

/// Graph file format version - increment when the layout changes
pub const CACHE_VERSION: u32 = 1;

/// Subdirectory of the cache directory owned by this crate
pub const CACHE_DIR_NAME: &str = "tsjest";

/// Name of the graph file for a configuration digest
pub fn graph_file_name(config_digest: &str) -> String {
    format!("deps-{}.bin", config_digest)
}
