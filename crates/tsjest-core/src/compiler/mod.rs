//! Incremental compile session: one per configuration digest.
//!
//! The session keeps every file it has seen in a [`MemoryCache`], drives a
//! [`LanguageService`] through [`SessionHost`], and decides which
//! diagnostics to compute and raise for each compiled file. In watch mode
//! the dependency graph is consulted to re-check the files importing the one
//! that changed.

mod memory_cache;

pub use memory_cache::{FileRecord, MemoryCache};

use crate::cache::{
    hash_content, DependencyGraph, DependencyGraphEntry, GraphStore, InvalidationEngine,
};
use crate::config::{CompilerOptions, ModuleKind};
use crate::config_set::ConfigSet;
use crate::diagnostics::{Diagnostic, DiagnosticHandler, Warning, WarningKind};
use crate::errors::{Result, TsJestError};
use crate::file_kind::{is_declaration_file, is_source_file};
use crate::fs::{normalize_path, FileSystem};
use crate::memoize::Memoized;
use crate::resolution::{ModuleResolutionCache, ResolvedModule};
use crate::service::{
    EmitOutput, LanguageService, LanguageServiceHost, ModuleGraphService, ServiceStats,
    StandaloneHost,
};
use crate::sourcemap::update_output;
use crate::transformers::TransformerPipeline;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, info};

/// Per-call flags supplied by the host
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompileOptions {
    /// Re-check files importing the compiled one
    pub watch_mode: bool,
    /// The host can load ES modules for this call
    pub supports_static_esm: bool,
}

/// Host side of the language service: file state, compiler options and
/// module resolution, all owned by the session.
pub struct SessionHost {
    memory: MemoryCache,
    options: CompilerOptions,
    resolution: ModuleResolutionCache,
    fs: Arc<dyn FileSystem>,
}

impl SessionHost {
    fn content_or_disk(&self, path: &Path) -> Option<String> {
        self.memory
            .content(path)
            .map(str::to_owned)
            .or_else(|| self.fs.read_file(path).ok())
    }
}

impl LanguageServiceHost for SessionHost {
    fn project_version(&self) -> u64 {
        self.memory.project_version()
    }

    fn script_file_names(&self) -> Vec<PathBuf> {
        self.memory.file_names()
    }

    fn script_version(&self, path: &Path) -> Option<u64> {
        self.memory.version(path)
    }

    fn script_snapshot(&mut self, path: &Path) -> Option<String> {
        if let Some(content) = self.memory.content(path) {
            return Some(content.to_string());
        }
        let content = self.fs.read_file(path).ok()?;
        Some(self.memory.load(path, content).to_string())
    }

    fn compilation_settings(&self) -> &CompilerOptions {
        &self.options
    }

    fn resolve_module_name(
        &mut self,
        specifier: &str,
        containing_file: &Path,
    ) -> Option<ResolvedModule> {
        self.resolution
            .resolve(specifier, containing_file, self.fs.as_ref())
    }
}

/// Module kind emitted for one call: the configured ES kind (or `ESNext`)
/// when `useESM` is on and the host loads static ESM, `CommonJS` otherwise
pub fn output_module_kind(config: &ConfigSet, supports_static_esm: bool) -> ModuleKind {
    if config.use_esm() && supports_static_esm {
        match config.compiler_options().module {
            Some(kind) if kind.is_es_module() => kind,
            _ => ModuleKind::EsNext,
        }
    } else {
        ModuleKind::CommonJs
    }
}

fn options_id(digest: &str, module: Option<ModuleKind>) -> String {
    let module = module.map_or("default", |kind| kind.as_str());
    format!("{}:{}", digest, module)
}

/// Emitted JavaScript, as opposed to maps and declarations
fn code_output(output: &EmitOutput) -> Option<&str> {
    output
        .output_files
        .iter()
        .find(|file| {
            let name = file.name.to_string_lossy();
            [".js", ".mjs", ".cjs"].iter().any(|ext| name.ends_with(ext))
        })
        .map(|file| file.text.as_str())
}

fn map_output(output: &EmitOutput) -> Option<&str> {
    output.find(".map").map(|file| file.text.as_str())
}

pub struct CompilerSession {
    config: Arc<ConfigSet>,
    handler: Arc<dyn DiagnosticHandler>,
    host: SessionHost,
    service: Box<dyn LanguageService>,
    pipeline: Arc<TransformerPipeline>,
    graph: DependencyGraph,
    store: Option<GraphStore>,
    imports: Memoized<String, Vec<String>>,
}

impl CompilerSession {
    pub fn new(
        config: Arc<ConfigSet>,
        handler: Arc<dyn DiagnosticHandler>,
        fs: Arc<dyn FileSystem>,
    ) -> Self {
        Self::with_service(config, handler, fs, Box::new(ModuleGraphService::new()))
    }

    /// Session driving a caller-provided language service
    pub fn with_service(
        config: Arc<ConfigSet>,
        handler: Arc<dyn DiagnosticHandler>,
        fs: Arc<dyn FileSystem>,
        service: Box<dyn LanguageService>,
    ) -> Self {
        let options = config.compiler_options().clone();
        let resolution =
            ModuleResolutionCache::new(options.clone(), options_id(config.digest(), options.module));

        let store = if config.tracks_dependencies() {
            config.graph_store()
        } else {
            None
        };
        let graph = match &store {
            Some(store) => store.load(),
            None => DependencyGraph::new(config.digest().to_string()),
        };

        info!(
            digest = %config.digest(),
            isolated = config.isolated_modules(),
            graph_entries = graph.len(),
            "Created compiler session"
        );

        Self {
            host: SessionHost {
                memory: MemoryCache::new(config.file_names().iter().cloned()),
                options,
                resolution,
                fs,
            },
            pipeline: config.pipeline(),
            config,
            handler,
            service,
            graph,
            store,
            imports: Memoized::new(),
        }
    }

    pub fn config(&self) -> &ConfigSet {
        &self.config
    }

    /// Compile one file and return JavaScript with an inline source map.
    ///
    /// Diagnostics are raised according to the policy: fatal ones fail the
    /// call, the rest go to the diagnostic handler.
    pub fn compile(&mut self, source: &str, path: &Path, options: &CompileOptions) -> Result<String> {
        let file = normalize_path(path);
        let module_changed = self.apply_module_kind(options.supports_static_esm);

        if self.config.isolated_modules() {
            return self.transpile(source, &file);
        }

        if self.host.memory.update(&file, source) {
            debug!(file = %file.display(), version = self.host.memory.project_version(), "Project version bumped");
        } else if module_changed {
            self.host.memory.bump_project_version();
        }

        let output = self
            .service
            .get_emit_output(&mut self.host, &file, &self.pipeline)?;

        if options.watch_mode {
            self.track_dependencies(&file, source);
        }
        self.type_check(&file, options.watch_mode)?;

        if output.emit_skipped {
            if is_source_file(&file) {
                return Err(TsJestError::CannotProcess { file });
            }
            self.handler.report(Warning::new(
                WarningKind::PassThrough,
                Some(&file),
                format!(
                    "Unable to process '{}', falling back to the original file content. \
                     Set `allowJs` to compile JavaScript files.",
                    file.display()
                ),
            ));
            return Ok(source.to_string());
        }

        let Some(code) = code_output(&output) else {
            if is_declaration_file(&file) {
                return Ok(String::new());
            }
            return Err(TsJestError::NotEmittable { file });
        };

        Ok(update_output(code, &file, map_output(&output))?)
    }

    /// Switch the output module kind for this call. Returns whether it
    /// changed, in which case module resolution starts over.
    fn apply_module_kind(&mut self, supports_static_esm: bool) -> bool {
        let module = output_module_kind(&self.config, supports_static_esm);

        if self.host.options.module == Some(module) {
            return false;
        }

        debug!(module = module.as_str(), "Switching output module kind");
        self.host.options.module = Some(module);
        let id = options_id(self.config.digest(), Some(module));
        if !self.host.resolution.is_valid_for(&id) {
            self.host.resolution = ModuleResolutionCache::new(self.host.options.clone(), id);
        }
        true
    }

    /// Compile without a program: no memory cache, no graph
    fn transpile(&mut self, source: &str, file: &Path) -> Result<String> {
        let mut host = StandaloneHost::new(
            file.to_path_buf(),
            source.to_string(),
            self.host.options.clone(),
            Arc::clone(&self.host.fs),
        );
        let output = self
            .service
            .transpile_module(&mut host, file, &self.pipeline)?;

        if self.config.should_report_diagnostics(file) {
            self.config
                .policy()
                .raise(output.diagnostics, file, self.handler.as_ref())?;
        }

        Ok(update_output(
            &output.output_text,
            file,
            output.source_map_text.as_deref(),
        )?)
    }

    fn diagnostics_for(&mut self, file: &Path) -> Vec<Diagnostic> {
        let mut diagnostics = self.service.get_semantic_diagnostics(&mut self.host, file);
        diagnostics.extend(self.service.get_syntactic_diagnostics(&mut self.host, file));
        diagnostics
    }

    fn type_check(&mut self, file: &Path, watch_mode: bool) -> Result<()> {
        if self.config.should_report_diagnostics(file) {
            debug!(file = %file.display(), "Computing diagnostics");
            let diagnostics = self.diagnostics_for(file);
            self.config
                .policy()
                .raise(diagnostics, file, self.handler.as_ref())?;
        }

        if !watch_mode {
            return Ok(());
        }

        let dependents = InvalidationEngine::new(&self.graph).direct_dependents(file);
        for dependent in dependents {
            if dependent == file || !self.config.should_report_diagnostics(&dependent) {
                continue;
            }
            let Some(content) = self.host.content_or_disk(&dependent) else {
                continue;
            };
            let current = self
                .graph
                .get(&dependent)
                .is_some_and(|entry| entry.is_current(&content));
            if !current {
                debug!(dependent = %dependent.display(), "Dependent changed since it was tracked, skipping");
                continue;
            }

            debug!(
                file = %file.display(),
                dependent = %dependent.display(),
                "Re-checking dependent"
            );
            self.host.memory.update(&dependent, &content);
            let diagnostics = self.diagnostics_for(&dependent);
            self.config
                .policy()
                .raise(diagnostics, file, self.handler.as_ref())?;
        }
        Ok(())
    }

    /// Specifiers a source refers to, resolved and filtered to project files
    fn resolve_imports(&mut self, file: &Path, source: &str) -> Vec<PathBuf> {
        let service = &self.service;
        let specifiers = self.imports.get_or_compute(hash_content(source), || {
            service
                .preprocess_imports(source)
                .into_iter()
                .map(|import| import.specifier)
                .collect()
        });

        let mut resolved = Vec::new();
        for specifier in specifiers {
            let Some(module) = self.host.resolve_module_name(&specifier, file) else {
                continue;
            };
            if module.is_external_library_import
                || module.resolved_file_name == file
                || resolved.contains(&module.resolved_file_name)
            {
                continue;
            }
            resolved.push(module.resolved_file_name);
        }
        resolved
    }

    /// Direct imports of `file` followed by the imports of each of them.
    /// The expansion stops after that second level.
    pub fn resolved_modules(&mut self, path: &Path, source: &str) -> Vec<PathBuf> {
        let file = normalize_path(path);
        let mut resolved = self.resolve_imports(&file, source);

        for dependency in resolved.clone() {
            let Some(text) = self.host.content_or_disk(&dependency) else {
                continue;
            };
            for nested in self.resolve_imports(&dependency, &text) {
                if nested != file && !resolved.contains(&nested) {
                    resolved.push(nested);
                }
            }
        }
        resolved
    }

    /// Tracked dependencies of `file`, recomputed and persisted when the
    /// recorded entry no longer matches `source`
    fn track_dependencies(&mut self, file: &Path, source: &str) -> Vec<PathBuf> {
        if let Some(entry) = self.graph.get(file) {
            if entry.is_current(source) {
                return entry.resolved_module_names.clone();
            }
        }

        let resolved = self.resolved_modules(file, source);
        debug!(file = %file.display(), dependencies = resolved.len(), "Tracked dependencies");
        self.graph.insert(
            file.to_path_buf(),
            DependencyGraphEntry::new(source.to_string(), resolved.clone()),
        );
        if let Some(store) = &self.store {
            store.persist(&self.graph);
        }
        resolved
    }

    /// Dependencies of a file with their modification times, for cache keys.
    /// Empty unless dependency tracking is enabled.
    pub fn dependencies_for(
        &mut self,
        path: &Path,
        source: &str,
    ) -> Vec<(PathBuf, Option<SystemTime>)> {
        if !self.config.tracks_dependencies() {
            return Vec::new();
        }
        let file = normalize_path(path);
        self.track_dependencies(&file, source)
            .into_iter()
            .map(|dependency| {
                let modified = self.host.fs.modified(&dependency).ok();
                (dependency, modified)
            })
            .collect()
    }

    /// `changed` plus every tracked file that depends on them, transitively
    pub fn stale_files(&self, changed: &[PathBuf]) -> Vec<PathBuf> {
        let changed: Vec<PathBuf> = changed.iter().map(|p| normalize_path(p)).collect();
        let mut stale: Vec<PathBuf> = InvalidationEngine::new(&self.graph)
            .compute_stale_modules(&changed)
            .into_iter()
            .collect();
        stale.sort();
        stale
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn project_version(&self) -> u64 {
        self.host.memory.project_version()
    }

    pub fn file_version(&self, path: &Path) -> Option<u64> {
        self.host.memory.version(&normalize_path(path))
    }

    /// Identity of the options the module resolution cache was built for
    pub fn resolution_options_id(&self) -> &str {
        self.host.resolution.options_id()
    }

    pub fn stats(&self) -> ServiceStats {
        self.service.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        CompilerOptions, DiagnosticsConfig, DiagnosticsOptions, TsConfig, TsConfigSource,
        TsJestConfig,
    };
    use crate::diagnostics::{codes, CollectingDiagnosticHandler};
    use crate::fs::MockFileSystem;
    use indoc::indoc;

    fn config(options: CompilerOptions, diagnostics: DiagnosticsConfig) -> Arc<ConfigSet> {
        let config = TsJestConfig {
            tsconfig: Some(TsConfigSource::Inline(TsConfig {
                compiler_options: options,
                files: Some(vec!["/p/a.ts".to_string()]),
                ..Default::default()
            })),
            diagnostics,
            ..Default::default()
        };
        Arc::new(
            ConfigSet::from_config(
                config,
                Path::new("/p"),
                &CollectingDiagnosticHandler::new(),
            )
            .unwrap(),
        )
    }

    fn session(
        options: CompilerOptions,
        diagnostics: DiagnosticsConfig,
    ) -> (CompilerSession, Arc<MockFileSystem>, Arc<CollectingDiagnosticHandler>) {
        let fs = Arc::new(MockFileSystem::new());
        let handler = Arc::new(CollectingDiagnosticHandler::new());
        let session = CompilerSession::new(config(options, diagnostics), handler.clone(), fs.clone());
        (session, fs, handler)
    }

    fn default_session() -> (CompilerSession, Arc<MockFileSystem>, Arc<CollectingDiagnosticHandler>) {
        session(CompilerOptions::default(), DiagnosticsConfig::default())
    }

    #[test]
    fn test_compile_emits_commonjs_with_inline_map() {
        let (mut session, _, _) = default_session();
        let code = session
            .compile("export const a = 1;\n", Path::new("/p/a.ts"), &CompileOptions::default())
            .unwrap();

        assert!(code.starts_with("\"use strict\";"));
        assert!(code.contains("const a = 1;\nexports.a = a;"));
        assert!(code.contains("//# sourceMappingURL=data:application/json;charset=utf-8;base64,"));
        assert!(!code.contains("a.js.map"));
    }

    #[test]
    fn test_versions_follow_content() {
        let (mut session, _, _) = default_session();
        let file = Path::new("/p/a.ts");
        let options = CompileOptions::default();
        let initial = session.project_version();

        session.compile("export const a = 1;", file, &options).unwrap();
        assert_eq!(session.file_version(file), Some(1));
        let after_first = session.project_version();
        assert!(after_first > initial);

        session.compile("export const a = 1;", file, &options).unwrap();
        assert_eq!(session.project_version(), after_first);

        session.compile("export const a = 2;", file, &options).unwrap();
        assert_eq!(session.file_version(file), Some(2));
        assert_eq!(session.project_version(), after_first + 1);
    }

    #[test]
    fn test_module_kind_switch_rebuilds_resolution() {
        let config = {
            let config = TsJestConfig {
                use_esm: true,
                tsconfig: Some(TsConfigSource::Inline(TsConfig {
                    files: Some(vec!["/p/a.ts".to_string()]),
                    ..Default::default()
                })),
                ..Default::default()
            };
            Arc::new(ConfigSet::from_config(config, Path::new("/p"), &CollectingDiagnosticHandler::new()).unwrap())
        };
        let mut session = CompilerSession::new(
            config,
            Arc::new(CollectingDiagnosticHandler::new()),
            Arc::new(MockFileSystem::new()),
        );
        let file = Path::new("/p/a.ts");

        let cjs = session.compile("export const a = 1;", file, &CompileOptions::default()).unwrap();
        assert!(cjs.contains("exports.a = a;"));
        assert!(session.resolution_options_id().ends_with(":CommonJS"));
        let version = session.project_version();

        let esm_options = CompileOptions {
            supports_static_esm: true,
            ..Default::default()
        };
        let esm = session.compile("export const a = 1;", file, &esm_options).unwrap();
        assert!(esm.starts_with("export const a = 1;"));
        assert!(session.resolution_options_id().ends_with(":ESNext"));
        assert_eq!(session.project_version(), version + 1);
    }

    #[test]
    fn test_diagnostics_are_raised() {
        let (mut session, _, _) = default_session();
        let error = session
            .compile("import { x } from './missing';\n", Path::new("/p/a.ts"), &CompileOptions::default())
            .unwrap_err();

        let TsJestError::Diagnostics(error) = error else {
            panic!("expected diagnostics");
        };
        assert_eq!(error.diagnostic_codes, vec![codes::CANNOT_FIND_MODULE]);
    }

    #[test]
    fn test_warn_only_reports_and_emits() {
        let (mut session, _, handler) = session(
            CompilerOptions::default(),
            DiagnosticsConfig::Options(DiagnosticsOptions {
                warn_only: true,
                ..Default::default()
            }),
        );
        let code = session
            .compile("import { x } from './missing';\n", Path::new("/p/a.ts"), &CompileOptions::default())
            .unwrap();

        assert!(code.contains("require(\"./missing\")"));
        assert_eq!(handler.count_of(WarningKind::Diagnostics), 1);
    }

    #[test]
    fn test_declaration_file_compiles_to_nothing() {
        let (mut session, _, handler) = default_session();
        let code = session
            .compile("export declare const a: number;", Path::new("/p/types.d.ts"), &CompileOptions::default())
            .unwrap();

        assert_eq!(code, "");
        assert_eq!(handler.warning_count(), 0);
    }

    #[test]
    fn test_script_without_allow_js_passes_through() {
        let (mut session, _, handler) = default_session();
        let source = "module.exports = 1;\n";
        let code = session
            .compile(source, Path::new("/p/plain.js"), &CompileOptions::default())
            .unwrap();

        assert_eq!(code, source);
        assert_eq!(handler.count_of(WarningKind::PassThrough), 1);
    }

    #[test]
    fn test_source_with_skipped_emit_is_fatal() {
        let (mut session, _, _) = session(
            CompilerOptions {
                no_emit_on_error: true,
                ..Default::default()
            },
            DiagnosticsConfig::Enabled(false),
        );
        let error = session
            .compile("const a = 'oops;\n", Path::new("/p/a.ts"), &CompileOptions::default())
            .unwrap_err();

        assert!(matches!(error, TsJestError::CannotProcess { .. }));
    }

    #[test]
    fn test_resolved_modules_expand_one_level() {
        let (mut session, fs, _) = default_session();
        fs.add_file("/p/b.ts", "import { c } from './c';\nexport const b = c;");
        fs.add_file("/p/c.ts", "import { d } from './d';\nexport const c = d;");
        fs.add_file("/p/d.ts", "export const d = 1;");

        let resolved = session.resolved_modules(Path::new("/p/a.ts"), "import { b } from './b';");
        assert_eq!(resolved, vec![PathBuf::from("/p/b.ts"), PathBuf::from("/p/c.ts")]);
    }

    #[test]
    fn test_watch_mode_rechecks_dependents() {
        let (mut session, fs, _) = default_session();
        let a = Path::new("/p/a.ts");
        let b = Path::new("/p/b.ts");
        let b_source = indoc! {"
            import { value } from './a';
            export const doubled = value * 2;
        "};
        fs.add_file(a, "export const value = 1;");
        fs.add_file(b, b_source);
        let watch = CompileOptions {
            watch_mode: true,
            ..Default::default()
        };

        session.compile(b_source, b, &watch).unwrap();
        session.compile("export const value = 1;", a, &watch).unwrap();

        let error = session
            .compile("export const renamed = 1;", a, &watch)
            .unwrap_err();
        let TsJestError::Diagnostics(error) = error else {
            panic!("expected diagnostics");
        };
        assert_eq!(error.diagnostic_codes, vec![codes::NO_EXPORTED_MEMBER]);
        assert!(error.diagnostic_text.contains("b.ts"));
    }

    #[test]
    fn test_isolated_modules_reports_syntax_only() {
        let config = TsJestConfig {
            isolated_modules: true,
            tsconfig: Some(TsConfigSource::Inline(TsConfig {
                files: Some(Vec::new()),
                ..Default::default()
            })),
            ..Default::default()
        };
        let config =
            Arc::new(ConfigSet::from_config(config, Path::new("/p"), &CollectingDiagnosticHandler::new()).unwrap());
        let mut session = CompilerSession::new(
            config,
            Arc::new(CollectingDiagnosticHandler::new()),
            Arc::new(MockFileSystem::new()),
        );

        let code = session
            .compile("import { x } from './missing';\nexport const y = x;\n", Path::new("/p/a.ts"), &CompileOptions::default())
            .unwrap();
        assert!(code.contains("require(\"./missing\")"));
        assert_eq!(session.stats().transpiles, 1);
        assert_eq!(session.stats().semantic_checks, 0);

        let error = session
            .compile("const a = 'oops;\n", Path::new("/p/a.ts"), &CompileOptions::default())
            .unwrap_err();
        assert!(matches!(error, TsJestError::Diagnostics(_)));
    }
}
