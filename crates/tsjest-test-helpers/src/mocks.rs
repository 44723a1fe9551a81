//! Mock implementations for testing

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tsjest_core::diagnostics::Diagnostic;
use tsjest_core::errors::Result;
use tsjest_core::service::{
    EmitOutput, LanguageService, LanguageServiceHost, OutputFile, ServiceStats, TranspileOutput,
};
use tsjest_core::transformers::TransformerPipeline;

/// One call received by a [`MockLanguageService`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceCall {
    Emit(PathBuf),
    Syntactic(PathBuf),
    Semantic(PathBuf),
    Transpile(PathBuf),
}

/// Shared record of the calls a mock received, readable after the mock has
/// been boxed into a session
pub type CallLog = Arc<Mutex<Vec<ServiceCall>>>;

/// A language service returning canned results
#[derive(Debug, Default)]
pub struct MockLanguageService {
    emit: EmitOutput,
    syntactic: Vec<Diagnostic>,
    semantic: Vec<Diagnostic>,
    transpile: TranspileOutput,
    calls: CallLog,
    stats: ServiceStats,
}

impl MockLanguageService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit `code` (plus an empty map) for every file
    pub fn emitting(code: &str) -> Self {
        Self {
            emit: EmitOutput {
                output_files: vec![
                    OutputFile {
                        name: PathBuf::from("out.js"),
                        text: code.to_string(),
                    },
                    OutputFile {
                        name: PathBuf::from("out.js.map"),
                        text: r#"{"version":3,"sources":["in.ts"],"names":[],"mappings":""}"#
                            .to_string(),
                    },
                ],
                emit_skipped: false,
            },
            ..Self::default()
        }
    }

    /// Skip emit for every file
    pub fn skipping() -> Self {
        Self {
            emit: EmitOutput::skipped(),
            ..Self::default()
        }
    }

    /// Emit nothing, without marking the emit as skipped
    pub fn without_outputs() -> Self {
        Self::default()
    }

    pub fn with_syntactic(mut self, diagnostics: Vec<Diagnostic>) -> Self {
        self.syntactic = diagnostics;
        self
    }

    pub fn with_semantic(mut self, diagnostics: Vec<Diagnostic>) -> Self {
        self.semantic = diagnostics;
        self
    }

    pub fn with_transpile(mut self, output: TranspileOutput) -> Self {
        self.transpile = output;
        self
    }

    /// Handle on the call log
    pub fn calls(&self) -> CallLog {
        Arc::clone(&self.calls)
    }

    fn record(&self, call: ServiceCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl LanguageService for MockLanguageService {
    fn get_emit_output(
        &mut self,
        _host: &mut dyn LanguageServiceHost,
        file: &Path,
        _pipeline: &TransformerPipeline,
    ) -> Result<EmitOutput> {
        self.record(ServiceCall::Emit(file.to_path_buf()));
        self.stats.emits += 1;
        Ok(self.emit.clone())
    }

    fn get_syntactic_diagnostics(
        &mut self,
        _host: &mut dyn LanguageServiceHost,
        file: &Path,
    ) -> Vec<Diagnostic> {
        self.record(ServiceCall::Syntactic(file.to_path_buf()));
        self.syntactic.clone()
    }

    fn get_semantic_diagnostics(
        &mut self,
        _host: &mut dyn LanguageServiceHost,
        file: &Path,
    ) -> Vec<Diagnostic> {
        self.record(ServiceCall::Semantic(file.to_path_buf()));
        self.stats.semantic_checks += 1;
        self.semantic.clone()
    }

    fn transpile_module(
        &mut self,
        _host: &mut dyn LanguageServiceHost,
        file: &Path,
        _pipeline: &TransformerPipeline,
    ) -> Result<TranspileOutput> {
        self.record(ServiceCall::Transpile(file.to_path_buf()));
        self.stats.transpiles += 1;
        Ok(self.transpile.clone())
    }

    fn stats(&self) -> ServiceStats {
        self.stats
    }
}
