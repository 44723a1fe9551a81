use crate::config_set::ConfigSet;
use std::path::Path;

const DECLARATION_SUFFIXES: &[&str] = &[".d.ts", ".d.mts", ".d.cts"];
const SOURCE_EXTENSIONS: &[&str] = &["ts", "tsx", "mts", "cts"];
const SCRIPT_EXTENSIONS: &[&str] = &["js", "jsx", "mjs", "cjs"];

fn extension(path: &Path) -> Option<&str> {
    path.extension().and_then(|e| e.to_str())
}

pub fn is_declaration_file(path: &Path) -> bool {
    let name = path.to_string_lossy();
    DECLARATION_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
}

/// `.ts`, `.tsx`, `.mts`, `.cts`, declaration files excluded
pub fn is_source_file(path: &Path) -> bool {
    !is_declaration_file(path) && extension(path).is_some_and(|e| SOURCE_EXTENSIONS.contains(&e))
}

/// `.js`, `.jsx`, `.mjs`, `.cjs`
pub fn is_script_file(path: &Path) -> bool {
    extension(path).is_some_and(|e| SCRIPT_EXTENSIONS.contains(&e))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassThroughReason {
    /// A script while `allowJs` is off
    ScriptWithoutAllowJs,
    /// Not a file the compiler understands
    UnknownExtension,
}

/// What the transformer does with an incoming file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// Content exported as a JSON string
    Stringify,
    /// Type declarations only, nothing to run
    Declaration,
    Compile { script: bool },
    PassThrough(PassThroughReason),
}

impl FileKind {
    pub fn classify(path: &Path, config: &ConfigSet) -> Self {
        if config.is_stringify(path) {
            return FileKind::Stringify;
        }
        if is_declaration_file(path) {
            return FileKind::Declaration;
        }
        if is_source_file(path) {
            return FileKind::Compile { script: false };
        }
        if is_script_file(path) {
            return if config.compiler_options().allow_js {
                FileKind::Compile { script: true }
            } else {
                FileKind::PassThrough(PassThroughReason::ScriptWithoutAllowJs)
            };
        }
        FileKind::PassThrough(PassThroughReason::UnknownExtension)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CompilerOptions, OneOrMany, TsConfigSource, TsConfig, TsJestConfig};
    use crate::diagnostics::CollectingDiagnosticHandler;
    use std::path::PathBuf;

    fn config_set(allow_js: bool) -> ConfigSet {
        let config = TsJestConfig {
            tsconfig: Some(TsConfigSource::Inline(TsConfig {
                compiler_options: CompilerOptions {
                    allow_js,
                    ..Default::default()
                },
                files: Some(Vec::new()),
                ..Default::default()
            })),
            stringify_content_path_regex: Some(OneOrMany::One(r"\.html$".to_string())),
            ..Default::default()
        };
        ConfigSet::from_config(
            config,
            &PathBuf::from("/project"),
            &CollectingDiagnosticHandler::new(),
        )
        .unwrap()
    }

    #[test]
    fn test_extension_helpers() {
        assert!(is_declaration_file(Path::new("/p/types.d.ts")));
        assert!(is_declaration_file(Path::new("/p/types.d.mts")));
        assert!(!is_source_file(Path::new("/p/types.d.ts")));
        assert!(is_source_file(Path::new("/p/a.cts")));
        assert!(is_script_file(Path::new("/p/a.mjs")));
        assert!(!is_script_file(Path::new("/p/a.json")));
    }

    #[test]
    fn test_classify() {
        let config = config_set(false);

        assert_eq!(
            FileKind::classify(Path::new("/project/page.html"), &config),
            FileKind::Stringify
        );
        assert_eq!(
            FileKind::classify(Path::new("/project/a.d.ts"), &config),
            FileKind::Declaration
        );
        assert_eq!(
            FileKind::classify(Path::new("/project/a.tsx"), &config),
            FileKind::Compile { script: false }
        );
        assert_eq!(
            FileKind::classify(Path::new("/project/a.js"), &config),
            FileKind::PassThrough(PassThroughReason::ScriptWithoutAllowJs)
        );
        assert_eq!(
            FileKind::classify(Path::new("/project/a.css"), &config),
            FileKind::PassThrough(PassThroughReason::UnknownExtension)
        );
    }

    #[test]
    fn test_scripts_compile_with_allow_js() {
        assert_eq!(
            FileKind::classify(Path::new("/project/a.js"), &config_set(true)),
            FileKind::Compile { script: true }
        );
    }
}
