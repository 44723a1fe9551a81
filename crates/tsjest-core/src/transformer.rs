//! Host-facing entry point: `process` and `get_cache_key`.

use crate::cache::CacheKeyInputs;
use crate::compiler::{output_module_kind, CompileOptions, CompilerSession};
use crate::config_set::ConfigSet;
use crate::diagnostics::{DiagnosticHandler, Warning, WarningKind};
use crate::errors::Result;
use crate::file_kind::{FileKind, PassThroughReason};
use crate::fs::{normalize_path, FileSystem, RealFileSystem};
use crate::service::ServiceStats;
use rustc_hash::FxHashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Per-call options supplied by the host
#[derive(Debug, Clone)]
pub struct TransformOptions {
    pub config: Arc<ConfigSet>,
    /// Coverage instrumentation requested; only affects cache keys
    pub instrument: bool,
    pub supports_static_esm: bool,
    pub watch_mode: bool,
}

impl TransformOptions {
    pub fn new(config: Arc<ConfigSet>) -> Self {
        Self {
            config,
            instrument: false,
            supports_static_esm: false,
            watch_mode: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformedSource {
    pub code: String,
}

/// Owns one compiler session per configuration digest
pub struct TsJestTransformer {
    handler: Arc<dyn DiagnosticHandler>,
    fs: Arc<dyn FileSystem>,
    sessions: FxHashMap<String, CompilerSession>,
}

impl TsJestTransformer {
    pub fn new(handler: Arc<dyn DiagnosticHandler>) -> Self {
        Self::with_file_system(handler, Arc::new(RealFileSystem::new()))
    }

    pub fn with_file_system(handler: Arc<dyn DiagnosticHandler>, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            handler,
            fs,
            sessions: FxHashMap::default(),
        }
    }

    fn session(&mut self, config: &Arc<ConfigSet>) -> &mut CompilerSession {
        let handler = &self.handler;
        let fs = &self.fs;
        self.sessions
            .entry(config.digest().to_string())
            .or_insert_with(|| {
                CompilerSession::new(Arc::clone(config), Arc::clone(handler), Arc::clone(fs))
            })
    }

    /// Transform one file for the host
    pub fn process(
        &mut self,
        source: &str,
        path: &Path,
        options: &TransformOptions,
    ) -> Result<TransformedSource> {
        let file = normalize_path(path);
        let kind = FileKind::classify(&file, &options.config);
        debug!(file = %file.display(), ?kind, "Processing");

        let code = match kind {
            FileKind::Stringify => format!("module.exports={}", serde_json::to_string(source)?),
            FileKind::Declaration => String::new(),
            FileKind::PassThrough(reason) => {
                self.handler.report(pass_through_warning(reason, &file));
                source.to_string()
            }
            FileKind::Compile { .. } => {
                let compile_options = CompileOptions {
                    watch_mode: options.watch_mode,
                    supports_static_esm: options.supports_static_esm,
                };
                self.session(&options.config)
                    .compile(source, &file, &compile_options)?
            }
        };

        Ok(TransformedSource { code })
    }

    /// Key for the host's artifact cache. Stable across processes for equal
    /// inputs; changes when a tracked dependency is modified.
    pub fn get_cache_key(
        &mut self,
        source: &str,
        path: &Path,
        options: &TransformOptions,
    ) -> Result<String> {
        let file = normalize_path(path);
        let config = &options.config;
        let dependencies = self.session(config).dependencies_for(&file, source);
        let module_kind = output_module_kind(config, options.supports_static_esm);

        let key = CacheKeyInputs {
            config_digest: config.digest(),
            root_dir: config.root_dir(),
            file_path: &file,
            file_content: source,
            instrument: options.instrument,
            module_kind: module_kind.as_str(),
            dependencies,
        }
        .digest();
        debug!(file = %file.display(), key = %key, "Computed cache key");
        Ok(key)
    }

    /// Files to re-transform after `changed` were modified
    pub fn stale_files(&mut self, config: &Arc<ConfigSet>, changed: &[PathBuf]) -> Vec<PathBuf> {
        self.session(config).stale_files(changed)
    }

    pub fn stats(&self, config: &ConfigSet) -> Option<ServiceStats> {
        self.sessions.get(config.digest()).map(CompilerSession::stats)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

fn pass_through_warning(reason: PassThroughReason, file: &Path) -> Warning {
    match reason {
        PassThroughReason::ScriptWithoutAllowJs => Warning::new(
            WarningKind::PassThrough,
            Some(file),
            format!(
                "Got a JavaScript file to compile while `allowJs` is not set to `true` (file: {}). \
                 Set `allowJs` in the compiler options to process JavaScript files.",
                file.display()
            ),
        ),
        PassThroughReason::UnknownExtension => Warning::new(
            WarningKind::UnknownFileType,
            Some(file),
            format!(
                "Got an unknown file type to compile (file: {}). \
                 Exclude it from the files handed to this transformer.",
                file.display()
            ),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{OneOrMany, TsConfig, TsConfigSource, TsJestConfig};
    use crate::diagnostics::CollectingDiagnosticHandler;
    use crate::fs::MockFileSystem;

    fn setup(config: TsJestConfig) -> (TsJestTransformer, TransformOptions, Arc<CollectingDiagnosticHandler>) {
        let handler = Arc::new(CollectingDiagnosticHandler::new());
        let config = TsJestConfig {
            tsconfig: Some(TsConfigSource::Inline(TsConfig {
                files: Some(Vec::new()),
                ..Default::default()
            })),
            ..config
        };
        let config = ConfigSet::from_config(config, Path::new("/p"), handler.as_ref()).unwrap();
        let transformer =
            TsJestTransformer::with_file_system(handler.clone(), Arc::new(MockFileSystem::new()));
        (transformer, TransformOptions::new(Arc::new(config)), handler)
    }

    #[test]
    fn test_stringify_content() {
        let (mut transformer, options, _) = setup(TsJestConfig {
            stringify_content_path_regex: Some(OneOrMany::One(r"\.html$".to_string())),
            ..Default::default()
        });
        let out = transformer
            .process("<p class=\"x\">hi</p>\n", Path::new("/p/page.html"), &options)
            .unwrap();

        assert_eq!(out.code, r#"module.exports="<p class=\"x\">hi</p>\n""#);
        assert_eq!(transformer.session_count(), 0);
    }

    #[test]
    fn test_declaration_and_pass_through() {
        let (mut transformer, options, handler) = setup(TsJestConfig::default());

        let decl = transformer
            .process("export declare const a: number;", Path::new("/p/a.d.ts"), &options)
            .unwrap();
        assert_eq!(decl.code, "");

        let js = transformer
            .process("module.exports = 1;", Path::new("/p/a.js"), &options)
            .unwrap();
        assert_eq!(js.code, "module.exports = 1;");

        let css = transformer
            .process("a {}", Path::new("/p/a.css"), &options)
            .unwrap();
        assert_eq!(css.code, "a {}");

        assert_eq!(handler.count_of(WarningKind::PassThrough), 1);
        assert_eq!(handler.count_of(WarningKind::UnknownFileType), 1);
    }

    #[test]
    fn test_sessions_are_shared_per_digest() {
        let (mut transformer, options, _) = setup(TsJestConfig::default());
        transformer
            .process("export const a = 1;", Path::new("/p/a.ts"), &options)
            .unwrap();
        transformer
            .process("export const b = 1;", Path::new("/p/b.ts"), &options)
            .unwrap();

        assert_eq!(transformer.session_count(), 1);
        assert_eq!(transformer.stats(&options.config).map(|s| s.emits), Some(2));
    }

    #[test]
    fn test_cache_key_inputs() {
        let (mut transformer, options, _) = setup(TsJestConfig::default());
        let path = Path::new("/p/a.ts");

        let key = transformer.get_cache_key("const a = 1;", path, &options).unwrap();
        assert_eq!(key.len(), 64);
        assert_eq!(
            key,
            transformer.get_cache_key("const a = 1;", path, &options).unwrap()
        );
        assert_ne!(
            key,
            transformer.get_cache_key("const a = 2;", path, &options).unwrap()
        );
        assert_ne!(
            key,
            transformer
                .get_cache_key("const a = 1;", Path::new("/p/b.ts"), &options)
                .unwrap()
        );

        let instrumented = TransformOptions {
            instrument: true,
            ..options.clone()
        };
        assert_ne!(
            key,
            transformer.get_cache_key("const a = 1;", path, &instrumented).unwrap()
        );
    }
}
