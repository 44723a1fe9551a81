//! The compiler boundary: what the compile session asks of a language
//! service, and what the service asks back of its host.
//!
//! The session owns the host side (file versions, snapshots, module
//! resolution); the service owns whatever it caches about parsed files.
//! [`ModuleGraphService`] is the implementation shipped with this crate.

pub mod lowering;
pub mod module_graph;

use crate::config::CompilerOptions;
use crate::diagnostics::Diagnostic;
use crate::errors::Result;
use crate::fs::FileSystem;
use crate::resolution::{resolve_module_name, ResolvedModule};
use crate::syntax::{preprocess_imports, ImportedFile};
use crate::transformers::TransformerPipeline;
use rustc_hash::FxHashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use module_graph::ModuleGraphService;

/// What a language service needs to know about the project
pub trait LanguageServiceHost {
    /// Bumped whenever anything that may change compiled output changes
    fn project_version(&self) -> u64;

    /// Root files of the project
    fn script_file_names(&self) -> Vec<PathBuf>;

    /// Version of one file, `None` when the host has never seen it
    fn script_version(&self, path: &Path) -> Option<u64>;

    /// Current text of a file. Files unknown to the host are read from disk
    /// and remembered.
    fn script_snapshot(&mut self, path: &Path) -> Option<String>;

    fn compilation_settings(&self) -> &CompilerOptions;

    fn resolve_module_name(
        &mut self,
        specifier: &str,
        containing_file: &Path,
    ) -> Option<ResolvedModule>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFile {
    pub name: PathBuf,
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmitOutput {
    pub output_files: Vec<OutputFile>,
    pub emit_skipped: bool,
}

impl EmitOutput {
    pub fn skipped() -> Self {
        Self {
            output_files: Vec::new(),
            emit_skipped: true,
        }
    }

    /// First output whose name ends with `suffix`
    pub fn find(&self, suffix: &str) -> Option<&OutputFile> {
        self.output_files
            .iter()
            .find(|f| f.name.to_string_lossy().ends_with(suffix))
    }
}

/// Result of compiling one file in isolation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranspileOutput {
    pub output_text: String,
    pub source_map_text: Option<String>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Work counters, for observing what a service actually recomputed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServiceStats {
    pub files_parsed: u64,
    pub semantic_checks: u64,
    pub emits: u64,
    pub transpiles: u64,
}

/// Incremental compiler API consumed by the compile session
pub trait LanguageService: Send {
    fn get_emit_output(
        &mut self,
        host: &mut dyn LanguageServiceHost,
        file: &Path,
        pipeline: &TransformerPipeline,
    ) -> Result<EmitOutput>;

    fn get_syntactic_diagnostics(
        &mut self,
        host: &mut dyn LanguageServiceHost,
        file: &Path,
    ) -> Vec<Diagnostic>;

    fn get_semantic_diagnostics(
        &mut self,
        host: &mut dyn LanguageServiceHost,
        file: &Path,
    ) -> Vec<Diagnostic>;

    /// Raw import specifiers of a source text, unresolved
    fn preprocess_imports(&self, source: &str) -> Vec<ImportedFile> {
        preprocess_imports(source)
    }

    /// Compile one file without consulting any other file
    fn transpile_module(
        &mut self,
        host: &mut dyn LanguageServiceHost,
        file: &Path,
        pipeline: &TransformerPipeline,
    ) -> Result<TranspileOutput>;

    fn stats(&self) -> ServiceStats;
}

/// Host for one file compiled outside of a session: isolated modules and
/// one-off transformer runs. Other files come straight from the file system.
pub struct StandaloneHost {
    file: PathBuf,
    source: String,
    options: CompilerOptions,
    fs: Arc<dyn FileSystem>,
    loaded: FxHashMap<PathBuf, String>,
}

impl StandaloneHost {
    pub fn new(
        file: PathBuf,
        source: String,
        options: CompilerOptions,
        fs: Arc<dyn FileSystem>,
    ) -> Self {
        Self {
            file,
            source,
            options,
            fs,
            loaded: FxHashMap::default(),
        }
    }
}

impl LanguageServiceHost for StandaloneHost {
    fn project_version(&self) -> u64 {
        1
    }

    fn script_file_names(&self) -> Vec<PathBuf> {
        vec![self.file.clone()]
    }

    fn script_version(&self, path: &Path) -> Option<u64> {
        (path == self.file || self.loaded.contains_key(path)).then_some(1)
    }

    fn script_snapshot(&mut self, path: &Path) -> Option<String> {
        if path == self.file {
            return Some(self.source.clone());
        }
        if let Some(text) = self.loaded.get(path) {
            return Some(text.clone());
        }
        let text = self.fs.read_file(path).ok()?;
        self.loaded.insert(path.to_path_buf(), text.clone());
        Some(text)
    }

    fn compilation_settings(&self) -> &CompilerOptions {
        &self.options
    }

    fn resolve_module_name(
        &mut self,
        specifier: &str,
        containing_file: &Path,
    ) -> Option<ResolvedModule> {
        resolve_module_name(specifier, containing_file, &self.options, self.fs.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MockFileSystem;

    #[test]
    fn test_standalone_host_reads_other_files_once() {
        let fs = Arc::new(MockFileSystem::new());
        fs.add_file("/p/b.ts", "export const b = 1;");
        let mut host = StandaloneHost::new(
            PathBuf::from("/p/a.ts"),
            "import { b } from './b';".to_string(),
            CompilerOptions::default(),
            fs.clone(),
        );

        assert_eq!(host.script_version(Path::new("/p/b.ts")), None);
        assert_eq!(
            host.script_snapshot(Path::new("/p/b.ts")).as_deref(),
            Some("export const b = 1;")
        );
        fs.add_file("/p/b.ts", "changed");
        assert_eq!(
            host.script_snapshot(Path::new("/p/b.ts")).as_deref(),
            Some("export const b = 1;")
        );
        assert_eq!(host.script_version(Path::new("/p/b.ts")), Some(1));
        assert!(host.script_snapshot(Path::new("/p/missing.ts")).is_none());
    }

    #[test]
    fn test_standalone_host_resolves_through_fs() {
        let fs = Arc::new(MockFileSystem::new());
        fs.add_file("/p/b.ts", "");
        let mut host = StandaloneHost::new(
            PathBuf::from("/p/a.ts"),
            String::new(),
            CompilerOptions::default(),
            fs,
        );

        let resolved = host
            .resolve_module_name("./b", Path::new("/p/a.ts"))
            .unwrap();
        assert_eq!(resolved.resolved_file_name, PathBuf::from("/p/b.ts"));
        assert!(!resolved.is_external_library_import);
    }

    #[test]
    fn test_emit_output_find() {
        let output = EmitOutput {
            output_files: vec![
                OutputFile {
                    name: PathBuf::from("/p/a.js"),
                    text: "code".to_string(),
                },
                OutputFile {
                    name: PathBuf::from("/p/a.js.map"),
                    text: "{}".to_string(),
                },
            ],
            emit_skipped: false,
        };

        assert_eq!(output.find(".js").map(|f| f.text.as_str()), Some("code"));
        assert_eq!(output.find(".map").map(|f| f.text.as_str()), Some("{}"));
        assert!(output.find(".d.ts").is_none());
    }
}
