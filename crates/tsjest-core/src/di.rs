use crate::config_set::ConfigSet;
use crate::diagnostics::{DiagnosticHandler, LoggingDiagnosticHandler};
use crate::fs::{FileSystem, RealFileSystem};
use crate::transformer::{TransformOptions, TsJestTransformer};
use std::sync::Arc;

/// Dependency injection container
/// Wires the resolved configuration, the diagnostics output channel and the
/// file system into transformers
pub struct Container {
    config: Arc<ConfigSet>,
    diagnostic_handler: Arc<dyn DiagnosticHandler>,
    file_system: Arc<dyn FileSystem>,
}

impl Container {
    /// Create a new container with production dependencies
    pub fn new(config: ConfigSet) -> Self {
        Container {
            config: Arc::new(config),
            diagnostic_handler: Arc::new(LoggingDiagnosticHandler::new()),
            file_system: Arc::new(RealFileSystem::new()),
        }
    }

    /// Create a container with custom dependencies (for testing)
    pub fn with_dependencies(
        config: ConfigSet,
        diagnostic_handler: Arc<dyn DiagnosticHandler>,
        file_system: Arc<dyn FileSystem>,
    ) -> Self {
        Container {
            config: Arc::new(config),
            diagnostic_handler,
            file_system,
        }
    }

    pub fn config(&self) -> &Arc<ConfigSet> {
        &self.config
    }

    pub fn diagnostic_handler(&self) -> &Arc<dyn DiagnosticHandler> {
        &self.diagnostic_handler
    }

    pub fn file_system(&self) -> &Arc<dyn FileSystem> {
        &self.file_system
    }

    /// A transformer sharing this container's handler and file system
    pub fn transformer(&self) -> TsJestTransformer {
        TsJestTransformer::with_file_system(
            Arc::clone(&self.diagnostic_handler),
            Arc::clone(&self.file_system),
        )
    }

    /// Default per-call options for this container's configuration
    pub fn transform_options(&self) -> TransformOptions {
        TransformOptions::new(Arc::clone(&self.config))
    }

    /// Get the warning count
    pub fn warning_count(&self) -> usize {
        self.diagnostic_handler.warning_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{TsConfig, TsConfigSource, TsJestConfig};
    use crate::diagnostics::{CollectingDiagnosticHandler, WarningKind};
    use crate::fs::MockFileSystem;
    use std::path::Path;

    fn config_set() -> ConfigSet {
        let config = TsJestConfig {
            tsconfig: Some(TsConfigSource::Inline(TsConfig {
                files: Some(Vec::new()),
                ..Default::default()
            })),
            ..Default::default()
        };
        ConfigSet::from_config(config, Path::new("/p"), &CollectingDiagnosticHandler::new()).unwrap()
    }

    #[test]
    fn test_container_creation() {
        let container = Container::new(config_set());

        assert_eq!(container.warning_count(), 0);
        assert_eq!(container.config().root_dir(), Path::new("/p"));
    }

    #[test]
    fn test_container_with_mock_dependencies() {
        let diagnostics = Arc::new(CollectingDiagnosticHandler::new());
        let fs = Arc::new(MockFileSystem::new());
        let container = Container::with_dependencies(config_set(), diagnostics.clone(), fs);

        let mut transformer = container.transformer();
        let options = container.transform_options();
        let out = transformer
            .process("x", Path::new("/p/style.css"), &options)
            .unwrap();

        assert_eq!(out.code, "x");
        assert_eq!(container.warning_count(), 1);
        assert_eq!(diagnostics.count_of(WarningKind::UnknownFileType), 1);
    }
}
