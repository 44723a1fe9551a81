use std::path::PathBuf;
use thiserror::Error;

use crate::diagnostics::TsError;
use crate::transformers::TransformError;

/// Errors raised while building a [`ConfigSet`](crate::config_set::ConfigSet).
///
/// All of these are fatal at startup and never retried.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration file {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("invalid diagnostic code '{0}': expected a number, optionally prefixed with `TS`")]
    InvalidDiagnosticCode(String),

    #[error("invalid glob pattern '{pattern}': {message}")]
    InvalidGlob { pattern: String, message: String },

    #[error("invalid regular expression '{pattern}': {message}")]
    InvalidRegex { pattern: String, message: String },

    #[error("unknown AST transformer '{0}'")]
    UnknownTransformer(String),

    #[error("invalid options for AST transformer '{name}': {message}")]
    TransformerOptions { name: String, message: String },

    #[error(transparent)]
    Diagnostics(#[from] TsError),

    #[error("failed to digest configuration: {0}")]
    Digest(#[from] serde_json::Error),
}

/// The error type surfaced at the per-file compile boundary.
///
/// One file failing never aborts the compilation of unrelated files; the host
/// decides what to do with the error.
#[derive(Debug, Error)]
pub enum TsJestError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Diagnostics(#[from] TsError),

    #[error(
        "Unable to require declaration file `{}`: it produced no output. \
         Make sure an executable file (.js, .json, ...) sits next to it, \
         or that it is only imported for its types",
        file.display()
    )]
    NotEmittable { file: PathBuf },

    #[error(
        "Unable to process '{}': the compiler skipped emitting it. \
         Check that `outDir` is neither '' nor '.', and that the host is meant to transform this file",
        file.display()
    )]
    CannotProcess { file: PathBuf },

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize output: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TsJestError>;
