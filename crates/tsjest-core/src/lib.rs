pub mod cache;
pub mod compiler;
pub mod config;
pub mod config_set;
pub mod di;
pub mod diagnostics;
pub mod errors;
pub mod file_kind;
pub mod fs;
pub mod logging;
pub mod memoize;
pub mod policy;
pub mod resolution;
pub mod service;
pub mod sourcemap;
pub mod syntax;
pub mod transformer;
pub mod transformers;

pub use compiler::{CompileOptions, CompilerSession};
pub use config::{CompilerOptions, ModuleKind, TsConfig, TsJestConfig};
pub use config_set::ConfigSet;
pub use di::Container;
pub use diagnostics::{
    codes, Diagnostic, DiagnosticCategory, DiagnosticHandler, TsError, Warning, WarningKind,
};
pub use errors::{ConfigError, Result, TsJestError};
pub use file_kind::FileKind;
pub use policy::DiagnosticsPolicy;
pub use service::{LanguageService, LanguageServiceHost, ModuleGraphService};
pub use transformer::{TransformOptions, TransformedSource, TsJestTransformer};
