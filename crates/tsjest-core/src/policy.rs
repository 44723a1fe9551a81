use crate::config::DiagnosticsConfig;
use crate::diagnostics::{
    codes, Diagnostic, DiagnosticCategory, DiagnosticHandler, TsError, Warning,
};
use crate::errors::ConfigError;
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

const SCRIPT_EXTENSIONS: &[&str] = &["js", "jsx", "mjs", "cjs"];

/// Decides which diagnostics are reported and whether they fail the file.
///
/// Built once from configuration and never mutated.
#[derive(Debug, Clone)]
pub struct DiagnosticsPolicy {
    ignore_codes: Vec<u32>,
    exclude: GlobSet,
    exclude_patterns: Vec<String>,
    throw_on_error: bool,
    enabled: bool,
    check_js: bool,
    pretty: bool,
    cwd: PathBuf,
}

impl DiagnosticsPolicy {
    pub fn from_config(
        config: &DiagnosticsConfig,
        check_js: bool,
        cwd: &Path,
    ) -> Result<Self, ConfigError> {
        let mut ignore_codes = codes::DEFAULT_IGNORED.to_vec();
        let (enabled, pretty, throw_on_error, exclude_patterns) = match config {
            DiagnosticsConfig::Enabled(enabled) => (*enabled, true, true, Vec::new()),
            DiagnosticsConfig::Options(options) => {
                ignore_codes.extend(options.ignore_codes.codes()?);
                (
                    true,
                    options.pretty,
                    !options.warn_only,
                    options.exclude.clone(),
                )
            }
        };
        ignore_codes.sort_unstable();
        ignore_codes.dedup();

        let mut builder = GlobSetBuilder::new();
        for pattern in &exclude_patterns {
            let glob = GlobBuilder::new(pattern)
                .literal_separator(true)
                .build()
                .map_err(|e| ConfigError::InvalidGlob {
                    pattern: pattern.clone(),
                    message: e.to_string(),
                })?;
            builder.add(glob);
        }
        let exclude = builder.build().map_err(|e| ConfigError::InvalidGlob {
            pattern: exclude_patterns.join(", "),
            message: e.to_string(),
        })?;

        Ok(Self {
            ignore_codes,
            exclude,
            exclude_patterns,
            throw_on_error,
            enabled,
            check_js,
            pretty,
            cwd: cwd.to_path_buf(),
        })
    }

    pub fn ignore_codes(&self) -> &[u32] {
        &self.ignore_codes
    }

    pub fn throw_on_error(&self) -> bool {
        self.throw_on_error
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Stable description of the policy for configuration digests
    pub fn fingerprint(&self) -> Value {
        json!({
            "enabled": self.enabled,
            "ignoreCodes": self.ignore_codes,
            "exclude": self.exclude_patterns,
            "throwOnError": self.throw_on_error,
            "checkJs": self.check_js,
            "pretty": self.pretty,
        })
    }

    /// Whether `path` matches an exclude pattern, either as given or relative
    /// to the project root
    pub fn is_excluded(&self, path: &Path) -> bool {
        if self.exclude.is_empty() {
            return false;
        }
        self.exclude.is_match(path)
            || path
                .strip_prefix(&self.cwd)
                .is_ok_and(|relative| self.exclude.is_match(relative))
    }

    pub fn should_report(&self, path: &Path) -> bool {
        if !self.enabled || self.is_excluded(path) {
            return false;
        }
        let is_script = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| SCRIPT_EXTENSIONS.contains(&e));
        !is_script || self.check_js
    }

    /// Drop ignored codes and diagnostics located in excluded files. Nothing
    /// survives when `file` itself is not reported.
    pub fn filter(&self, diagnostics: Vec<Diagnostic>, file: &Path) -> Vec<Diagnostic> {
        if !self.should_report(file) {
            return Vec::new();
        }
        diagnostics
            .into_iter()
            .filter(|d| self.ignore_codes.binary_search(&d.code).is_err())
            .filter(|d| d.file.as_deref().map_or(true, |f| !self.is_excluded(f)))
            .collect()
    }

    pub fn should_throw(&self, diagnostics: &[Diagnostic]) -> bool {
        self.throw_on_error
            && diagnostics.iter().any(|d| {
                matches!(
                    d.category,
                    DiagnosticCategory::Error | DiagnosticCategory::Warning
                )
            })
    }

    /// Filter `diagnostics` and either fail with one aggregate error or hand
    /// it to `handler` as a warning.
    pub fn raise(
        &self,
        diagnostics: Vec<Diagnostic>,
        file: &Path,
        handler: &dyn DiagnosticHandler,
    ) -> Result<(), TsError> {
        let diagnostics = self.filter(diagnostics, file);
        if diagnostics.is_empty() {
            return Ok(());
        }

        let error = TsError::new(&diagnostics, &self.cwd, self.pretty);
        if self.should_throw(&diagnostics) {
            return Err(error);
        }
        handler.report(Warning::diagnostics(Some(file), &error));
        Ok(())
    }
}
