//! Test compilation helpers for tsjest
//!
//! Build configurations and transformers over an in-memory file system, or
//! over a [`TestProject`](crate::fixtures::TestProject) on disk.

use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tsjest_core::config::TsJestConfig;
use tsjest_core::config_set::ConfigSet;
use tsjest_core::diagnostics::CollectingDiagnosticHandler;
use tsjest_core::fs::{FileSystem, MockFileSystem};
use tsjest_core::transformer::{TransformOptions, TsJestTransformer};

/// Resolve a configuration given as JSON against `root`
///
/// # Panics
/// When the JSON is not a valid configuration or resolving it fails
pub fn config_set(root: &Path, config: Value) -> Arc<ConfigSet> {
    let config: TsJestConfig = serde_json::from_value(config).expect("invalid configuration");
    Arc::new(
        ConfigSet::from_config(config, root, &CollectingDiagnosticHandler::new())
            .expect("failed to resolve configuration"),
    )
}

/// Configuration for an in-memory project rooted at `/project`, with an
/// inline tsconfig carrying `compiler_options`
pub fn in_memory_config(compiler_options: Value) -> Arc<ConfigSet> {
    config_set(
        Path::new("/project"),
        serde_json::json!({
            "tsconfig": { "compilerOptions": compiler_options, "files": [] }
        }),
    )
}

/// A transformer over `fs` with a collecting handler
pub fn transformer(
    fs: Arc<dyn FileSystem>,
) -> (TsJestTransformer, Arc<CollectingDiagnosticHandler>) {
    let handler = Arc::new(CollectingDiagnosticHandler::new());
    (
        TsJestTransformer::with_file_system(handler.clone(), fs),
        handler,
    )
}

/// Transform one in-memory file with default options
///
/// # Returns
/// The generated code or the error message
pub fn compile(source: &str, path: &str) -> Result<String, String> {
    let (mut transformer, _) = transformer(Arc::new(MockFileSystem::new()));
    let options = TransformOptions::new(in_memory_config(serde_json::json!({})));
    transformer
        .process(source, Path::new(path), &options)
        .map(|out| out.code)
        .map_err(|e| e.to_string())
}
