//! Resolved, immutable configuration shared by every compile call of one
//! project. Built once, digested once.

use crate::cache::{hash_config, GraphStore};
use crate::config::{CompilerOptions, TsConfig, TsConfigSource, TsJestConfig};
use crate::diagnostics::{codes, Diagnostic, DiagnosticHandler};
use crate::errors::ConfigError;
use crate::fs::{absolutize, normalize_path};
use crate::policy::DiagnosticsPolicy;
use crate::transformers::{TransformerPipeline, TransformerRegistry};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use regex::Regex;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use walkdir::WalkDir;

const DEFAULT_TSCONFIG: &str = "tsconfig.json";
const DEFAULT_EXCLUDES: &[&str] = &["node_modules", "bower_components", "jspm_packages"];
const SOURCE_EXTENSIONS: &[&str] = &[".ts", ".tsx", ".mts", ".cts"];
const SCRIPT_EXTENSIONS: &[&str] = &[".js", ".jsx", ".mjs", ".cjs"];

#[derive(Debug)]
pub struct ConfigSet {
    root_dir: PathBuf,
    cache_dir: Option<PathBuf>,
    tsconfig_path: Option<PathBuf>,
    compiler_options: CompilerOptions,
    file_names: Vec<PathBuf>,
    policy: DiagnosticsPolicy,
    isolated_modules: bool,
    use_esm: bool,
    stringify: Vec<Regex>,
    pipeline: Arc<TransformerPipeline>,
    digest: String,
}

impl ConfigSet {
    /// Resolve `config` with the built-in AST transformers available.
    ///
    /// `base_dir` anchors a relative `rootDir`; it is usually the directory
    /// of the configuration file.
    pub fn from_config(
        config: TsJestConfig,
        base_dir: &Path,
        handler: &dyn DiagnosticHandler,
    ) -> Result<Self, ConfigError> {
        Self::with_registry(config, base_dir, handler, &TransformerRegistry::with_builtins())
    }

    pub fn with_registry(
        config: TsJestConfig,
        base_dir: &Path,
        handler: &dyn DiagnosticHandler,
        registry: &TransformerRegistry,
    ) -> Result<Self, ConfigError> {
        let root_dir = match &config.root_dir {
            Some(root) => absolutize(root, base_dir),
            None => normalize_path(base_dir),
        };
        let cache_dir = config
            .cache_directory
            .as_ref()
            .map(|dir| absolutize(dir, &root_dir));

        let (tsconfig_path, tsconfig) = load_tsconfig(config.tsconfig.as_ref(), &root_dir)?;
        let config_dir = tsconfig_path
            .as_deref()
            .and_then(Path::parent)
            .map_or_else(|| root_dir.clone(), Path::to_path_buf);

        let mut compiler_options = tsconfig.compiler_options.clone();
        compiler_options.base_url = compiler_options
            .base_url
            .as_ref()
            .map(|base| absolutize(base, &config_dir));
        if compiler_options.paths_base.is_none() {
            compiler_options.paths_base = Some(config_dir.clone());
        }
        compiler_options.no_emit = false;
        compiler_options.inline_source_map = false;
        compiler_options.out_file = None;

        let policy =
            DiagnosticsPolicy::from_config(&config.diagnostics, compiler_options.check_js, &root_dir)?;
        let file_names = discover_files(&tsconfig, &config_dir, &compiler_options)?;

        let tsconfig_file = tsconfig_path
            .clone()
            .unwrap_or_else(|| root_dir.join(DEFAULT_TSCONFIG));
        let diagnostics =
            configuration_diagnostics(&tsconfig, &compiler_options, &file_names, &tsconfig_file);
        policy.raise(diagnostics, &tsconfig_file, handler)?;

        let stringify_patterns = config
            .stringify_content_path_regex
            .as_ref()
            .map(|patterns| patterns.to_vec())
            .unwrap_or_default();
        let stringify = stringify_patterns
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| ConfigError::InvalidRegex {
                    pattern: pattern.clone(),
                    message: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let pipeline = TransformerPipeline::from_config(&config.ast_transformers, registry)?;

        let digest = hash_config(&json!({
            "version": env!("CARGO_PKG_VERSION"),
            "compilerOptions": serde_json::to_value(&compiler_options)?,
            "diagnostics": policy.fingerprint(),
            "transformers": pipeline.fingerprint(),
            "isolatedModules": config.isolated_modules,
            "useESM": config.use_esm,
            "stringifyContentPathRegex": stringify_patterns,
        }))?;

        info!(
            root_dir = %root_dir.display(),
            files = file_names.len(),
            digest = %digest,
            "Resolved configuration"
        );

        Ok(Self {
            root_dir,
            cache_dir,
            tsconfig_path,
            compiler_options,
            file_names,
            policy,
            isolated_modules: config.isolated_modules,
            use_esm: config.use_esm,
            stringify,
            pipeline: Arc::new(pipeline),
            digest,
        })
    }

    /// Load a JSON or YAML configuration file and resolve it against the
    /// file's directory
    pub fn from_file(path: &Path, handler: &dyn DiagnosticHandler) -> Result<Self, ConfigError> {
        let config = TsJestConfig::from_file(path)?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_config(config, base_dir, handler)
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    pub fn cache_dir(&self) -> Option<&Path> {
        self.cache_dir.as_deref()
    }

    pub fn tsconfig_path(&self) -> Option<&Path> {
        self.tsconfig_path.as_deref()
    }

    pub fn compiler_options(&self) -> &CompilerOptions {
        &self.compiler_options
    }

    /// Root files of the project, as discovered from `files`/`include`
    pub fn file_names(&self) -> &[PathBuf] {
        &self.file_names
    }

    pub fn policy(&self) -> &DiagnosticsPolicy {
        &self.policy
    }

    pub fn isolated_modules(&self) -> bool {
        self.isolated_modules
    }

    pub fn use_esm(&self) -> bool {
        self.use_esm
    }

    pub fn pipeline(&self) -> Arc<TransformerPipeline> {
        Arc::clone(&self.pipeline)
    }

    pub fn is_stringify(&self, path: &Path) -> bool {
        let text = path.to_string_lossy();
        self.stringify.iter().any(|re| re.is_match(&text))
    }

    pub fn should_report_diagnostics(&self, path: &Path) -> bool {
        self.policy.should_report(path)
    }

    /// Dependency tracking needs a full program and somewhere to persist
    pub fn tracks_dependencies(&self) -> bool {
        !self.isolated_modules && self.cache_dir.is_some()
    }

    /// Store for this configuration's dependency graph, when persisted
    pub fn graph_store(&self) -> Option<GraphStore> {
        self.cache_dir
            .as_deref()
            .map(|dir| GraphStore::new(dir, &self.digest))
    }
}

fn load_tsconfig(
    source: Option<&TsConfigSource>,
    root_dir: &Path,
) -> Result<(Option<PathBuf>, TsConfig), ConfigError> {
    match source {
        Some(TsConfigSource::Path(path)) => {
            let path = absolutize(path, root_dir);
            let config = TsConfig::from_file(&path)?;
            Ok((Some(path), config))
        }
        Some(TsConfigSource::Inline(config)) => Ok((None, config.clone())),
        None => {
            let path = root_dir.join(DEFAULT_TSCONFIG);
            if path.is_file() {
                let config = TsConfig::from_file(&path)?;
                Ok((Some(path), config))
            } else {
                debug!("No tsconfig found in {}, using defaults", root_dir.display());
                Ok((None, TsConfig::default()))
            }
        }
    }
}

/// Glob set matching each pattern and, for directory-like patterns,
/// everything below it
fn glob_set(patterns: &[String], base: &Path) -> Result<GlobSet, ConfigError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let absolute = absolutize(Path::new(pattern), base)
            .to_string_lossy()
            .replace('\\', "/");
        for candidate in [absolute.clone(), format!("{}/**", absolute)] {
            let glob = GlobBuilder::new(&candidate)
                .literal_separator(true)
                .build()
                .map_err(|e| ConfigError::InvalidGlob {
                    pattern: pattern.clone(),
                    message: e.to_string(),
                })?;
            builder.add(glob);
        }
    }
    builder.build().map_err(|e| ConfigError::InvalidGlob {
        pattern: patterns.join(", "),
        message: e.to_string(),
    })
}

fn is_root_file_candidate(path: &Path, options: &CompilerOptions) -> bool {
    let name = path.to_string_lossy();
    SOURCE_EXTENSIONS.iter().any(|ext| name.ends_with(ext))
        || (options.allow_js && SCRIPT_EXTENSIONS.iter().any(|ext| name.ends_with(ext)))
}

/// `files` first, then everything under `config_dir` matched by `include`
/// and not by `exclude`
fn discover_files(
    tsconfig: &TsConfig,
    config_dir: &Path,
    options: &CompilerOptions,
) -> Result<Vec<PathBuf>, ConfigError> {
    let mut file_names: Vec<PathBuf> = tsconfig
        .files
        .iter()
        .flatten()
        .map(|file| absolutize(Path::new(file), config_dir))
        .collect();

    let include = match (&tsconfig.include, &tsconfig.files) {
        (Some(include), _) => include.clone(),
        (None, Some(_)) => Vec::new(),
        (None, None) => vec!["**/*".to_string()],
    };
    if include.is_empty() {
        return Ok(file_names);
    }

    let exclude = tsconfig.exclude.clone().unwrap_or_else(|| {
        let mut defaults: Vec<String> = DEFAULT_EXCLUDES.iter().map(|d| d.to_string()).collect();
        defaults.extend(
            options
                .out_dir
                .as_ref()
                .map(|dir| absolutize(Path::new(dir), config_dir).to_string_lossy().into_owned()),
        );
        defaults
    });
    let include = glob_set(&include, config_dir)?;
    let exclude = glob_set(&exclude, config_dir)?;

    let walker = WalkDir::new(config_dir)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !exclude.is_match(entry.path()));
    for entry in walker.filter_map(|entry| entry.ok()) {
        let path = entry.path();
        if entry.file_type().is_file()
            && is_root_file_candidate(path, options)
            && include.is_match(path)
            && !file_names.iter().any(|known| known == path)
        {
            file_names.push(path.to_path_buf());
        }
    }

    debug!(count = file_names.len(), "Discovered root files");
    Ok(file_names)
}

/// TS5023 for unknown options, TS18002/TS18003 when there is nothing to compile
fn configuration_diagnostics(
    tsconfig: &TsConfig,
    options: &CompilerOptions,
    file_names: &[PathBuf],
    tsconfig_file: &Path,
) -> Vec<Diagnostic> {
    let mut diagnostics: Vec<Diagnostic> = options
        .unknown_options()
        .into_iter()
        .map(|name| {
            Diagnostic::error(
                codes::UNKNOWN_COMPILER_OPTION,
                format!("Unknown compiler option '{}'.", name),
            )
            .with_file(tsconfig_file)
        })
        .collect();

    if file_names.is_empty() {
        let diagnostic = if tsconfig.include.is_none() && tsconfig.files.is_some() {
            Diagnostic::error(
                codes::EMPTY_FILES_LIST,
                format!(
                    "The 'files' list in config file '{}' is empty.",
                    tsconfig_file.display()
                ),
            )
        } else {
            Diagnostic::error(
                codes::NO_INPUTS_FOUND,
                format!(
                    "No inputs were found in config file '{}'. Specified 'include' paths were '{:?}' and 'exclude' paths were '{:?}'.",
                    tsconfig_file.display(),
                    tsconfig.include.clone().unwrap_or_else(|| vec!["**/*".to_string()]),
                    tsconfig.exclude.clone().unwrap_or_default(),
                ),
            )
        };
        diagnostics.push(diagnostic.with_file(tsconfig_file));
    }
    diagnostics
}
