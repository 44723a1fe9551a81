//! Source-to-source AST transformers applied during emit
//!
//! Stages run in three independent phases: `before` lowering, `after`
//! lowering, and on declaration output. `hoist-jest` is always the first
//! `before` stage; everything else comes from configuration descriptors
//! resolved through a [`TransformerRegistry`].

pub mod hoist_jest;
pub mod path_mapping;

use crate::config::{AstTransformersConfig, CompilerOptions, TransformerDescriptor};
use crate::errors::ConfigError;
use crate::service::LanguageServiceHost;
use crate::syntax::SourceFile;
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

pub use hoist_jest::HoistJest;
pub use path_mapping::PathMapping;

/// A stage failed on one file
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("AST transformer '{stage}' failed on {}: {message}", file.display())]
pub struct TransformError {
    pub stage: String,
    pub file: PathBuf,
    pub message: String,
}

impl TransformError {
    pub fn new(stage: impl Into<String>, file: &Path, message: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            file: file.to_path_buf(),
            message: message.into(),
        }
    }
}

/// What a stage gets to see besides the tree
pub struct TransformContext<'a> {
    pub file_name: &'a Path,
    pub options: &'a CompilerOptions,
    pub host: &'a mut dyn LanguageServiceHost,
}

pub trait AstTransformer: Send + Sync {
    /// Name used in cache keys; unnamed stages still run
    fn name(&self) -> Option<&str>;

    /// Bumped whenever the stage's output changes for the same input
    fn version(&self) -> Option<u32>;

    fn transform(
        &self,
        file: SourceFile,
        ctx: &mut TransformContext<'_>,
    ) -> Result<SourceFile, TransformError>;
}

/// Builds a stage from its descriptor options
pub type TransformerFactory =
    Arc<dyn Fn(Option<&Value>) -> Result<Box<dyn AstTransformer>, String> + Send + Sync>;

/// Maps descriptor paths to stage factories
#[derive(Clone, Default)]
pub struct TransformerRegistry {
    factories: FxHashMap<String, TransformerFactory>,
}

impl TransformerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry knowing the stages shipped with this crate
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(path_mapping::NAME, |_| Ok(Box::new(PathMapping::new())));
        registry.register(hoist_jest::NAME, |_| Ok(Box::new(HoistJest::new())));
        registry
    }

    pub fn register<F>(&mut self, path: &str, factory: F)
    where
        F: Fn(Option<&Value>) -> Result<Box<dyn AstTransformer>, String> + Send + Sync + 'static,
    {
        self.factories.insert(path.to_string(), Arc::new(factory));
    }

    pub fn create(&self, descriptor: &TransformerDescriptor) -> Result<PipelineStage, ConfigError> {
        let path = descriptor.path();
        let factory = self
            .factories
            .get(path)
            .ok_or_else(|| ConfigError::UnknownTransformer(path.to_string()))?;
        let transformer =
            factory(descriptor.options()).map_err(|message| ConfigError::TransformerOptions {
                name: path.to_string(),
                message,
            })?;
        Ok(PipelineStage::new(path, transformer))
    }
}

impl fmt::Debug for TransformerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.factories.keys().collect();
        names.sort();
        f.debug_struct("TransformerRegistry")
            .field("factories", &names)
            .finish()
    }
}

pub struct PipelineStage {
    pub path: String,
    pub transformer: Box<dyn AstTransformer>,
}

impl PipelineStage {
    pub fn new(path: &str, transformer: Box<dyn AstTransformer>) -> Self {
        if transformer.name().is_none() || transformer.version().is_none() {
            warn!(
                "AST transformer '{}' does not declare a name and version; \
                 changes to it will not invalidate cached output",
                path
            );
        }
        Self {
            path: path.to_string(),
            transformer,
        }
    }

    /// `name@version`, falling back to the descriptor path
    pub fn fingerprint(&self) -> String {
        let name = self.transformer.name().unwrap_or(&self.path);
        match self.transformer.version() {
            Some(version) => format!("{}@{}", name, version),
            None => name.to_string(),
        }
    }
}

/// Ordered stages of the three phases
pub struct TransformerPipeline {
    before: Vec<PipelineStage>,
    after: Vec<PipelineStage>,
    after_declarations: Vec<PipelineStage>,
}

impl TransformerPipeline {
    /// Only the built-in hoisting stage
    pub fn new() -> Self {
        Self {
            before: vec![PipelineStage::new(
                hoist_jest::NAME,
                Box::new(HoistJest::new()),
            )],
            after: Vec::new(),
            after_declarations: Vec::new(),
        }
    }

    pub fn from_config(
        config: &AstTransformersConfig,
        registry: &TransformerRegistry,
    ) -> Result<Self, ConfigError> {
        let mut pipeline = Self::new();
        for descriptor in &config.before {
            if descriptor.path() == hoist_jest::NAME {
                continue;
            }
            pipeline.before.push(registry.create(descriptor)?);
        }
        for descriptor in &config.after {
            pipeline.after.push(registry.create(descriptor)?);
        }
        for descriptor in &config.after_declarations {
            pipeline.after_declarations.push(registry.create(descriptor)?);
        }
        debug!(
            before = pipeline.before.len(),
            after = pipeline.after.len(),
            after_declarations = pipeline.after_declarations.len(),
            "Built AST transformer pipeline"
        );
        Ok(pipeline)
    }

    /// Stage identities per phase, for configuration digests
    pub fn fingerprint(&self) -> Vec<String> {
        let phase = |prefix: &str, stages: &[PipelineStage]| {
            stages
                .iter()
                .map(|s| format!("{}:{}", prefix, s.fingerprint()))
                .collect::<Vec<_>>()
        };
        let mut out = phase("before", &self.before);
        out.extend(phase("after", &self.after));
        out.extend(phase("afterDeclarations", &self.after_declarations));
        out
    }

    pub fn run_before(
        &self,
        file: SourceFile,
        ctx: &mut TransformContext<'_>,
    ) -> Result<SourceFile, TransformError> {
        apply(&self.before, file, ctx)
    }

    pub fn run_after(
        &self,
        file: SourceFile,
        ctx: &mut TransformContext<'_>,
    ) -> Result<SourceFile, TransformError> {
        apply(&self.after, file, ctx)
    }

    pub fn run_after_declarations(
        &self,
        file: SourceFile,
        ctx: &mut TransformContext<'_>,
    ) -> Result<SourceFile, TransformError> {
        apply(&self.after_declarations, file, ctx)
    }
}

impl Default for TransformerPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TransformerPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.fingerprint()).finish()
    }
}

fn apply(
    stages: &[PipelineStage],
    mut file: SourceFile,
    ctx: &mut TransformContext<'_>,
) -> Result<SourceFile, TransformError> {
    for stage in stages {
        file = stage.transformer.transform(file, ctx)?;
    }
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::StandaloneHost;
    use crate::fs::MockFileSystem;
    use crate::syntax::print;
    use std::sync::Arc;

    struct Failing;

    impl AstTransformer for Failing {
        fn name(&self) -> Option<&str> {
            None
        }

        fn version(&self) -> Option<u32> {
            None
        }

        fn transform(
            &self,
            file: SourceFile,
            _ctx: &mut TransformContext<'_>,
        ) -> Result<SourceFile, TransformError> {
            Err(TransformError::new("failing", &file.file_name, "nope"))
        }
    }

    fn host() -> StandaloneHost {
        StandaloneHost::new(
            PathBuf::from("/p/a.ts"),
            String::new(),
            CompilerOptions::default(),
            Arc::new(MockFileSystem::new()),
        )
    }

    #[test]
    fn test_hoist_jest_is_always_first() {
        let config: AstTransformersConfig = serde_json::from_str(
            r#"{ "before": ["path-mapping", "hoist-jest"], "after": ["path-mapping"] }"#,
        )
        .unwrap();
        let pipeline =
            TransformerPipeline::from_config(&config, &TransformerRegistry::with_builtins())
                .unwrap();

        assert_eq!(
            pipeline.fingerprint(),
            vec![
                "before:hoist-jest@4",
                "before:path-mapping@1",
                "after:path-mapping@1"
            ]
        );
    }

    #[test]
    fn test_unknown_transformer() {
        let config: AstTransformersConfig =
            serde_json::from_str(r#"{ "before": ["./my-transformer.js"] }"#).unwrap();
        let result =
            TransformerPipeline::from_config(&config, &TransformerRegistry::with_builtins());

        assert!(matches!(
            result,
            Err(ConfigError::UnknownTransformer(path)) if path == "./my-transformer.js"
        ));
    }

    #[test]
    fn test_unversioned_stage_uses_path() {
        let stage = PipelineStage::new("custom", Box::new(Failing));
        assert_eq!(stage.fingerprint(), "custom");
    }

    #[test]
    fn test_stage_error_stops_pipeline() {
        let mut registry = TransformerRegistry::new();
        registry.register("failing", |_| Ok(Box::new(Failing)));
        let config: AstTransformersConfig =
            serde_json::from_str(r#"{ "after": ["failing"] }"#).unwrap();
        let pipeline = TransformerPipeline::from_config(&config, &registry).unwrap();

        let mut host = host();
        let options = CompilerOptions::default();
        let mut ctx = TransformContext {
            file_name: Path::new("/p/a.ts"),
            options: &options,
            host: &mut host,
        };
        let file = SourceFile::parse(Path::new("/p/a.ts"), "x();");

        let before = pipeline.run_before(file, &mut ctx).unwrap();
        assert_eq!(print(&before, None), "x();");
        let error = pipeline.run_after(before, &mut ctx).unwrap_err();
        assert_eq!(error.stage, "failing");
    }

    #[test]
    fn test_factory_errors_are_config_errors() {
        let mut registry = TransformerRegistry::new();
        registry.register("picky", |options| match options {
            Some(_) => Ok(Box::new(Failing) as Box<dyn AstTransformer>),
            None => Err("options are required".to_string()),
        });
        let result = registry.create(&TransformerDescriptor::Path("picky".to_string()));

        assert!(matches!(
            result,
            Err(ConfigError::TransformerOptions { name, .. }) if name == "picky"
        ));
    }
}
