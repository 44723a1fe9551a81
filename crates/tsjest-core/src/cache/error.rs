use thiserror::Error;

/// Internal cache failures. These never reach the compile boundary: a graph
/// that cannot be read is replaced by an empty one.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("Cache version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },

    #[error("Config digest mismatch: expected {expected}, found {found}")]
    ConfigMismatch { expected: String, found: String },
}

pub type Result<T> = std::result::Result<T, CacheError>;
