use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use tracing::warn;

/// Diagnostic severity, mirroring the categories a language service reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiagnosticCategory {
    Warning,
    Error,
    Suggestion,
    Message,
}

impl DiagnosticCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticCategory::Warning => "warning",
            DiagnosticCategory::Error => "error",
            DiagnosticCategory::Suggestion => "suggestion",
            DiagnosticCategory::Message => "message",
        }
    }

    /// Categories that are allowed to fail a compile call
    pub fn is_important(&self) -> bool {
        matches!(self, DiagnosticCategory::Warning | DiagnosticCategory::Error)
    }
}

/// 1-based line/column of a diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

/// A compiler-reported issue with a severity and a numeric code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub category: DiagnosticCategory,
    pub code: u32,
    pub file: Option<PathBuf>,
    pub start: Option<Position>,
    pub message: String,
}

impl Diagnostic {
    pub fn new(category: DiagnosticCategory, code: u32, message: impl Into<String>) -> Self {
        Self {
            category,
            code,
            file: None,
            start: None,
            message: message.into(),
        }
    }

    pub fn error(code: u32, message: impl Into<String>) -> Self {
        Self::new(DiagnosticCategory::Error, code, message)
    }

    pub fn warning(code: u32, message: impl Into<String>) -> Self {
        Self::new(DiagnosticCategory::Warning, code, message)
    }

    pub fn message(code: u32, message: impl Into<String>) -> Self {
        Self::new(DiagnosticCategory::Message, code, message)
    }

    pub fn with_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.file = Some(file.into());
        self
    }

    /// Attach a 1-based position
    pub fn at(mut self, line: u32, column: u32) -> Self {
        self.start = Some(Position { line, column });
        self
    }
}

/// Diagnostic codes produced by this crate and its reference language service
pub mod codes {
    pub const UNTERMINATED_STRING: u32 = 1002;
    pub const TOKEN_EXPECTED: u32 = 1005;
    pub const COMMENT_NOT_CLOSED: u32 = 1010;
    pub const STATEMENT_EXPECTED: u32 = 1128;
    pub const UNTERMINATED_TEMPLATE: u32 = 1160;
    pub const UNTERMINATED_REGEX: u32 = 1161;
    pub const NO_DEFAULT_EXPORT: u32 = 1192;
    pub const NO_EXPORTED_MEMBER: u32 = 2305;
    pub const CANNOT_FIND_MODULE: u32 = 2307;
    pub const UNKNOWN_COMPILER_OPTION: u32 = 5023;
    pub const EMPTY_FILES_LIST: u32 = 18002;
    pub const NO_INPUTS_FOUND: u32 = 18003;

    /// Codes that are ignored unless the user asks otherwise: configuration
    /// advisories that have no meaning for a single transformed file.
    pub const DEFAULT_IGNORED: [u32; 3] = [6059, 18002, 18003];
}

/// Format diagnostics the way a compiler prints them.
///
/// Paths are shown relative to `cwd` when possible. The pretty form uses
/// ANSI colors and a `file:line:col - category TSxxxx: message` layout.
pub fn format_diagnostics(diagnostics: &[Diagnostic], cwd: &Path, pretty: bool) -> String {
    let mut lines = Vec::with_capacity(diagnostics.len());

    for diagnostic in diagnostics {
        let location = diagnostic.file.as_ref().map(|file| {
            let shown = file.strip_prefix(cwd).unwrap_or(file);
            (shown.display().to_string(), diagnostic.start)
        });

        let line = if pretty {
            let category = match diagnostic.category {
                DiagnosticCategory::Error => "\x1b[91merror\x1b[0m",
                DiagnosticCategory::Warning => "\x1b[93mwarning\x1b[0m",
                DiagnosticCategory::Suggestion => "\x1b[94msuggestion\x1b[0m",
                DiagnosticCategory::Message => "\x1b[94mmessage\x1b[0m",
            };
            let prefix = match location {
                Some((file, Some(pos))) => format!(
                    "\x1b[96m{}\x1b[0m:\x1b[93m{}\x1b[0m:\x1b[93m{}\x1b[0m - ",
                    file, pos.line, pos.column
                ),
                Some((file, None)) => format!("\x1b[96m{}\x1b[0m - ", file),
                None => String::new(),
            };
            format!(
                "{}{}\x1b[90m TS{}: \x1b[0m{}",
                prefix, category, diagnostic.code, diagnostic.message
            )
        } else {
            let prefix = match location {
                Some((file, Some(pos))) => format!("{}({},{}): ", file, pos.line, pos.column),
                Some((file, None)) => format!("{}: ", file),
                None => String::new(),
            };
            format!(
                "{}{} TS{}: {}",
                prefix,
                diagnostic.category.as_str(),
                diagnostic.code,
                diagnostic.message
            )
        };
        lines.push(line);
    }

    lines.join("\n")
}

/// Aggregate error raised when diagnostics are fatal for a compile call
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Unable to compile TypeScript:\n{diagnostic_text}")]
pub struct TsError {
    pub diagnostic_text: String,
    pub diagnostic_codes: Vec<u32>,
}

impl TsError {
    pub fn new(diagnostics: &[Diagnostic], cwd: &Path, pretty: bool) -> Self {
        Self {
            diagnostic_text: format_diagnostics(diagnostics, cwd, pretty),
            diagnostic_codes: diagnostics.iter().map(|d| d.code).collect(),
        }
    }
}

/// What kind of advisory went through the output channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    /// Diagnostics reported in warn-only mode
    Diagnostics,
    /// A script file whose emit was skipped was returned unchanged
    PassThrough,
    /// A file the transformer does not know how to compile was returned unchanged
    UnknownFileType,
}

/// A non-fatal report sent to the diagnostic handler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    pub kind: WarningKind,
    pub file: Option<PathBuf>,
    pub message: String,
    pub codes: Vec<u32>,
}

impl Warning {
    pub fn new(kind: WarningKind, file: Option<&Path>, message: impl Into<String>) -> Self {
        Self {
            kind,
            file: file.map(Path::to_path_buf),
            message: message.into(),
            codes: Vec::new(),
        }
    }

    pub fn diagnostics(file: Option<&Path>, error: &TsError) -> Self {
        Self {
            kind: WarningKind::Diagnostics,
            file: file.map(Path::to_path_buf),
            message: error.to_string(),
            codes: error.diagnostic_codes.clone(),
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.file {
            Some(file) => write!(f, "{}: {}", file.display(), self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Trait for the diagnostics output channel.
/// This allows for dependency injection and testing with collecting handlers
pub trait DiagnosticHandler: Send + Sync {
    fn report(&self, warning: Warning);

    fn warning_count(&self) -> usize;

    fn get_warnings(&self) -> Vec<Warning>;

    fn count_of(&self, kind: WarningKind) -> usize {
        self.get_warnings().iter().filter(|w| w.kind == kind).count()
    }
}

/// Handler that logs every warning through `tracing` and keeps a record
#[derive(Debug, Default)]
pub struct LoggingDiagnosticHandler {
    warnings: Mutex<Vec<Warning>>,
}

impl LoggingDiagnosticHandler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DiagnosticHandler for LoggingDiagnosticHandler {
    fn report(&self, warning: Warning) {
        let file = warning
            .file
            .as_ref()
            .map(|f| f.display().to_string())
            .unwrap_or_default();
        warn!(
            kind = ?warning.kind,
            file = %file,
            codes = ?warning.codes,
            "{}",
            warning.message
        );

        self.warnings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(warning);
    }

    fn warning_count(&self) -> usize {
        self.warnings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn get_warnings(&self) -> Vec<Warning> {
        self.warnings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Collecting diagnostic handler for testing.
/// Collects all warnings without logging
#[derive(Debug, Default)]
pub struct CollectingDiagnosticHandler {
    warnings: Mutex<Vec<Warning>>,
}

impl CollectingDiagnosticHandler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DiagnosticHandler for CollectingDiagnosticHandler {
    fn report(&self, warning: Warning) {
        self.warnings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(warning);
    }

    fn warning_count(&self) -> usize {
        self.warnings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn get_warnings(&self) -> Vec<Warning> {
        self.warnings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_creation() {
        let diag = Diagnostic::error(2305, "Module has no exported member 'x'.")
            .with_file("/project/src/a.ts")
            .at(3, 10);

        assert_eq!(diag.category, DiagnosticCategory::Error);
        assert_eq!(diag.code, 2305);
        assert_eq!(diag.start, Some(Position { line: 3, column: 10 }));
    }

    #[test]
    fn test_format_plain_relative_to_cwd() {
        let diags = vec![
            Diagnostic::error(2307, "Cannot find module './b'.")
                .with_file("/project/src/a.ts")
                .at(1, 15),
            Diagnostic::message(6059, "Advisory."),
        ];

        let text = format_diagnostics(&diags, Path::new("/project"), false);

        assert_eq!(
            text,
            "src/a.ts(1,15): error TS2307: Cannot find module './b'.\nmessage TS6059: Advisory."
        );
    }

    #[test]
    fn test_format_pretty_contains_code_and_message() {
        let diags = vec![Diagnostic::warning(1234, "Careful.").with_file("/p/x.ts")];
        let text = format_diagnostics(&diags, Path::new("/p"), true);

        assert!(text.contains("x.ts"));
        assert!(text.contains("TS1234"));
        assert!(text.contains("Careful."));
    }

    #[test]
    fn test_ts_error_keeps_codes() {
        let diags = vec![
            Diagnostic::error(2305, "a"),
            Diagnostic::error(2307, "b"),
        ];
        let error = TsError::new(&diags, Path::new("/"), false);

        assert_eq!(error.diagnostic_codes, vec![2305, 2307]);
        assert!(error.to_string().starts_with("Unable to compile TypeScript:"));
    }

    #[test]
    fn test_collecting_handler() {
        let handler = CollectingDiagnosticHandler::new();

        handler.report(Warning::new(WarningKind::PassThrough, None, "one"));
        handler.report(Warning::new(
            WarningKind::Diagnostics,
            Some(Path::new("/a.ts")),
            "two",
        ));

        assert_eq!(handler.warning_count(), 2);
        assert_eq!(handler.count_of(WarningKind::PassThrough), 1);
        assert_eq!(handler.get_warnings()[1].to_string(), "/a.ts: two");
    }

    #[test]
    fn test_logging_handler_records() {
        let handler = LoggingDiagnosticHandler::new();
        handler.report(Warning::new(WarningKind::UnknownFileType, None, "odd file"));

        assert_eq!(handler.warning_count(), 1);
    }
}
