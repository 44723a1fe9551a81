use crate::errors::ConfigError;
use crate::fs::absolutize;
use crate::syntax::{Lexer, TokenKind};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};

/// Output module format of emitted code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ModuleKind {
    None,
    CommonJs,
    Amd,
    Umd,
    System,
    Es2015,
    Es2020,
    Es2022,
    EsNext,
    Node16,
    NodeNext,
    Preserve,
}

impl ModuleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleKind::None => "None",
            ModuleKind::CommonJs => "CommonJS",
            ModuleKind::Amd => "AMD",
            ModuleKind::Umd => "UMD",
            ModuleKind::System => "System",
            ModuleKind::Es2015 => "ES2015",
            ModuleKind::Es2020 => "ES2020",
            ModuleKind::Es2022 => "ES2022",
            ModuleKind::EsNext => "ESNext",
            ModuleKind::Node16 => "Node16",
            ModuleKind::NodeNext => "NodeNext",
            ModuleKind::Preserve => "Preserve",
        }
    }

    /// Whether the kind emits `import`/`export` statements as-is
    pub fn is_es_module(&self) -> bool {
        matches!(
            self,
            ModuleKind::Es2015
                | ModuleKind::Es2020
                | ModuleKind::Es2022
                | ModuleKind::EsNext
                | ModuleKind::Preserve
        )
    }
}

impl TryFrom<String> for ModuleKind {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let kind = match value.to_ascii_lowercase().as_str() {
            "none" => ModuleKind::None,
            "commonjs" => ModuleKind::CommonJs,
            "amd" => ModuleKind::Amd,
            "umd" => ModuleKind::Umd,
            "system" => ModuleKind::System,
            "es6" | "es2015" => ModuleKind::Es2015,
            "es2020" => ModuleKind::Es2020,
            "es2022" => ModuleKind::Es2022,
            "esnext" => ModuleKind::EsNext,
            "node16" => ModuleKind::Node16,
            "nodenext" => ModuleKind::NodeNext,
            "preserve" => ModuleKind::Preserve,
            _ => return Err(format!("unknown module kind '{}'", value)),
        };
        Ok(kind)
    }
}

impl From<ModuleKind> for String {
    fn from(kind: ModuleKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compiler options recognised by the language service. Anything else lands
/// in `extra`, where it is either a known pass-through option or reported as
/// unknown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompilerOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<ModuleKind>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module_resolution: Option<String>,

    /// Generate source maps (default: true)
    #[serde(default = "default_true")]
    pub source_map: bool,

    #[serde(default)]
    pub inline_source_map: bool,

    /// Compile `.js`/`.jsx` files as well (default: false)
    #[serde(default)]
    pub allow_js: bool,

    /// Report diagnostics for `.js`/`.jsx` files (default: false)
    #[serde(default)]
    pub check_js: bool,

    /// Emit `.d.ts` declaration output
    #[serde(default)]
    pub declaration: bool,

    #[serde(default)]
    pub no_emit: bool,

    #[serde(default)]
    pub no_emit_on_error: bool,

    #[serde(default)]
    pub resolve_json_module: bool,

    #[serde(default)]
    pub es_module_interop: bool,

    #[serde(default)]
    pub allow_synthetic_default_imports: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub paths: IndexMap<String, Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub out_dir: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub out_file: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jsx: Option<String>,

    /// Directory `paths` entries are relative to when `baseUrl` is unset
    #[serde(skip)]
    pub paths_base: Option<PathBuf>,

    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

fn default_true() -> bool {
    true
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            module: None,
            target: None,
            module_resolution: None,
            source_map: true,
            inline_source_map: false,
            allow_js: false,
            check_js: false,
            declaration: false,
            no_emit: false,
            no_emit_on_error: false,
            resolve_json_module: false,
            es_module_interop: false,
            allow_synthetic_default_imports: false,
            base_url: None,
            paths: IndexMap::new(),
            out_dir: None,
            out_file: None,
            jsx: None,
            paths_base: None,
            extra: IndexMap::new(),
        }
    }
}

/// Options accepted without effect on emitted code
const KNOWN_OPTIONS: &[&str] = &[
    "strict",
    "noImplicitAny",
    "strictNullChecks",
    "strictFunctionTypes",
    "strictPropertyInitialization",
    "noImplicitThis",
    "noImplicitReturns",
    "noUnusedLocals",
    "noUnusedParameters",
    "noFallthroughCasesInSwitch",
    "alwaysStrict",
    "lib",
    "types",
    "typeRoots",
    "skipLibCheck",
    "skipDefaultLibCheck",
    "forceConsistentCasingInFileNames",
    "isolatedModules",
    "experimentalDecorators",
    "emitDecoratorMetadata",
    "useDefineForClassFields",
    "importHelpers",
    "downlevelIteration",
    "removeComments",
    "declarationMap",
    "rootDir",
    "rootDirs",
    "composite",
    "incremental",
    "tsBuildInfoFile",
    "verbatimModuleSyntax",
    "allowImportingTsExtensions",
    "resolvePackageJsonExports",
    "resolvePackageJsonImports",
    "moduleDetection",
    "jsxFactory",
    "jsxFragmentFactory",
    "jsxImportSource",
    "newLine",
    "preserveConstEnums",
    "sourceRoot",
    "mapRoot",
    "inlineSources",
    "allowUnreachableCode",
    "allowUnusedLabels",
    "noErrorTruncation",
    "pretty",
    "listFiles",
    "traceResolution",
    "diagnostics",
];

impl CompilerOptions {
    /// Options in `extra` that no compiler knows about
    pub fn unknown_options(&self) -> Vec<&str> {
        self.extra
            .keys()
            .map(String::as_str)
            .filter(|key| !KNOWN_OPTIONS.contains(key))
            .collect()
    }
}

/// A `tsconfig.json` document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TsConfig {
    #[serde(default)]
    pub compiler_options: CompilerOptions,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<String>>,
}

/// How deep `extends` chains may go before they are treated as cyclic
const MAX_EXTENDS_DEPTH: usize = 16;

impl TsConfig {
    /// Load a tsconfig file, following `extends` and accepting comments and
    /// trailing commas. Relative paths are made absolute against the file
    /// that declared them.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let value = load_tsconfig_value(path, 0)?;
        let mut config: TsConfig =
            serde_json::from_value(value).map_err(|e| ConfigError::Parse {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        config.compiler_options.paths_base = path.parent().map(Path::to_path_buf);
        Ok(config)
    }
}

fn read_config_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn load_tsconfig_value(path: &Path, depth: usize) -> Result<Value, ConfigError> {
    let content = read_config_file(path)?;
    let mut value: Value =
        serde_json::from_str(&strip_json_comments(&content)).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    absolutize_config_paths(&mut value, dir);

    let extends = value
        .as_object_mut()
        .and_then(|object| object.remove("extends"));
    let Some(Value::String(extends)) = extends else {
        return Ok(value);
    };
    if depth >= MAX_EXTENDS_DEPTH {
        return Err(ConfigError::Parse {
            path: path.to_path_buf(),
            message: format!("`extends` chain is too deep at '{}'", extends),
        });
    }

    let mut base_path = absolutize(Path::new(&extends), dir);
    if !base_path.is_file() {
        let mut with_extension = base_path.into_os_string();
        with_extension.push(".json");
        base_path = PathBuf::from(with_extension);
    }
    let base = load_tsconfig_value(&base_path, depth + 1)?;
    Ok(merge_tsconfig(base, value))
}

/// Child values win; `compilerOptions` is merged key by key.
fn merge_tsconfig(mut base: Value, child: Value) -> Value {
    let (Some(base_object), Value::Object(child_object)) = (base.as_object_mut(), child) else {
        return base;
    };

    for (key, value) in child_object {
        if key == "compilerOptions" {
            if let (Some(Value::Object(base_options)), Value::Object(child_options)) =
                (base_object.get_mut(&key), &value)
            {
                for (option, option_value) in child_options {
                    base_options.insert(option.clone(), option_value.clone());
                }
                continue;
            }
        }
        base_object.insert(key, value);
    }
    base
}

fn absolutize_config_paths(value: &mut Value, dir: &Path) {
    let absolute = |s: &str| absolutize(Path::new(s), dir).to_string_lossy().into_owned();

    for key in ["include", "exclude", "files"] {
        if let Some(Value::Array(entries)) = value.get_mut(key) {
            for entry in entries.iter_mut() {
                if let Value::String(s) = entry {
                    *s = absolute(s);
                }
            }
        }
    }
    if let Some(Value::Object(options)) = value.get_mut("compilerOptions") {
        for key in ["baseUrl", "outDir"] {
            if let Some(Value::String(s)) = options.get_mut(key) {
                *s = absolute(s);
            }
        }
    }
}

/// Remove comments and trailing commas so a JSONC document parses as JSON.
/// Line breaks are kept so parse errors still point at the right line.
pub fn strip_json_comments(source: &str) -> String {
    let lexed = Lexer::new(source).tokenize();
    let mut out = String::with_capacity(source.len());

    let trivia = |out: &mut String, leading: &str| {
        let newlines = leading.matches('\n').count();
        if newlines > 0 {
            out.push_str(&"\n".repeat(newlines));
        } else if !leading.is_empty() {
            out.push(' ');
        }
    };

    for (i, token) in lexed.tokens.iter().enumerate() {
        trivia(&mut out, &token.leading);
        let trailing_comma = token.kind == TokenKind::Punctuator
            && token.text == ","
            && lexed
                .tokens
                .get(i + 1)
                .is_some_and(|next| next.is_punct("}") || next.is_punct("]"));
        if !trailing_comma {
            out.push_str(&token.text);
        }
    }
    trivia(&mut out, &lexed.trailing);
    out
}

/// `tsconfig` given inline or as a path to a file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TsConfigSource {
    Path(PathBuf),
    Inline(TsConfig),
}

/// A diagnostic code given as `2345` or `"TS2345"`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DiagnosticCode {
    Number(u32),
    Text(String),
}

/// `ignoreCodes`: a number, a comma separated string, or a list of either
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IgnoreCodes {
    One(DiagnosticCode),
    List(Vec<DiagnosticCode>),
}

impl Default for IgnoreCodes {
    fn default() -> Self {
        IgnoreCodes::List(Vec::new())
    }
}

fn parse_code_text(text: &str) -> Result<Vec<u32>, ConfigError> {
    text.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            let digits = part
                .strip_prefix("TS")
                .or_else(|| part.strip_prefix("ts"))
                .unwrap_or(part);
            digits
                .parse::<u32>()
                .map_err(|_| ConfigError::InvalidDiagnosticCode(part.to_string()))
        })
        .collect()
}

impl IgnoreCodes {
    pub fn codes(&self) -> Result<Vec<u32>, ConfigError> {
        let entries: &[DiagnosticCode] = match self {
            IgnoreCodes::One(code) => std::slice::from_ref(code),
            IgnoreCodes::List(codes) => codes,
        };
        let mut out = Vec::new();
        for entry in entries {
            match entry {
                DiagnosticCode::Number(code) => out.push(*code),
                DiagnosticCode::Text(text) => out.extend(parse_code_text(text)?),
            }
        }
        Ok(out)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsOptions {
    /// Colorized, multi-line diagnostics (default: true)
    #[serde(default = "default_true")]
    pub pretty: bool,

    #[serde(default)]
    pub ignore_codes: IgnoreCodes,

    /// Glob patterns of files whose diagnostics are never reported
    #[serde(default)]
    pub exclude: Vec<String>,

    /// Log diagnostics instead of failing the file
    #[serde(default)]
    pub warn_only: bool,
}

impl Default for DiagnosticsOptions {
    fn default() -> Self {
        Self {
            pretty: true,
            ignore_codes: IgnoreCodes::default(),
            exclude: Vec::new(),
            warn_only: false,
        }
    }
}

/// `diagnostics: true | false | { ... }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DiagnosticsConfig {
    Enabled(bool),
    Options(DiagnosticsOptions),
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        DiagnosticsConfig::Enabled(true)
    }
}

/// An AST transformer reference: `"path"` or `{ "path": ..., "options": ... }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TransformerDescriptor {
    Path(String),
    WithOptions {
        path: String,
        #[serde(default)]
        options: Option<Value>,
    },
}

impl TransformerDescriptor {
    pub fn path(&self) -> &str {
        match self {
            TransformerDescriptor::Path(path) => path,
            TransformerDescriptor::WithOptions { path, .. } => path,
        }
    }

    pub fn options(&self) -> Option<&Value> {
        match self {
            TransformerDescriptor::Path(_) => None,
            TransformerDescriptor::WithOptions { options, .. } => options.as_ref(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AstTransformersConfig {
    #[serde(default)]
    pub before: Vec<TransformerDescriptor>,

    #[serde(default)]
    pub after: Vec<TransformerDescriptor>,

    #[serde(default)]
    pub after_declarations: Vec<TransformerDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            OneOrMany::One(value) => vec![value.clone()],
            OneOrMany::Many(values) => values.clone(),
        }
    }
}

/// Main transformer configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TsJestConfig {
    /// Project root; relative paths are resolved against the config file's
    /// directory
    #[serde(default)]
    pub root_dir: Option<PathBuf>,

    /// Where the dependency graph is persisted (no persistence when unset)
    #[serde(default)]
    pub cache_directory: Option<PathBuf>,

    /// Inline compiler configuration or a path to a tsconfig file
    #[serde(default)]
    pub tsconfig: Option<TsConfigSource>,

    /// Transpile each file on its own, without type information
    #[serde(default)]
    pub isolated_modules: bool,

    #[serde(default, rename = "useESM")]
    pub use_esm: bool,

    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,

    #[serde(default)]
    pub ast_transformers: AstTransformersConfig,

    /// Files whose content is exported as a JSON string instead of compiled
    #[serde(default)]
    pub stringify_content_path_regex: Option<OneOrMany>,
}

impl TsJestConfig {
    /// Load configuration from a JSON or YAML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = read_config_file(path)?;
        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );

        let parse_error = |message: String| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        };
        if is_yaml {
            serde_yaml::from_str(&content).map_err(|e| parse_error(e.to_string()))
        } else {
            serde_json::from_str(&strip_json_comments(&content))
                .map_err(|e| parse_error(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = TsJestConfig::default();
        assert_eq!(config.diagnostics, DiagnosticsConfig::Enabled(true));
        assert!(!config.isolated_modules);
        assert!(CompilerOptions::default().source_map);
    }

    #[test]
    fn test_deserialize_config() {
        let json = r#"{
            "useESM": true,
            "tsconfig": { "compilerOptions": { "module": "esnext", "allowJs": true } },
            "diagnostics": { "ignoreCodes": "TS2345, 1234", "warnOnly": true },
            "astTransformers": { "before": ["path-mapping", { "path": "custom", "options": { "a": 1 } }] }
        }"#;
        let config: TsJestConfig = serde_json::from_str(json).unwrap();

        assert!(config.use_esm);
        let Some(TsConfigSource::Inline(tsconfig)) = config.tsconfig else {
            panic!("expected inline tsconfig");
        };
        assert_eq!(tsconfig.compiler_options.module, Some(ModuleKind::EsNext));
        assert!(tsconfig.compiler_options.allow_js);

        let DiagnosticsConfig::Options(diagnostics) = config.diagnostics else {
            panic!("expected diagnostics options");
        };
        assert_eq!(diagnostics.ignore_codes.codes().unwrap(), vec![2345, 1234]);
        assert!(diagnostics.warn_only);

        let before = &config.ast_transformers.before;
        assert_eq!(before[0].path(), "path-mapping");
        assert_eq!(before[1].options(), Some(&serde_json::json!({ "a": 1 })));
    }

    #[test]
    fn test_ignore_code_forms() {
        let one: IgnoreCodes = serde_json::from_str("2345").unwrap();
        assert_eq!(one.codes().unwrap(), vec![2345]);

        let list: IgnoreCodes = serde_json::from_str(r#"[1, "TS2", "ts3, 4"]"#).unwrap();
        assert_eq!(list.codes().unwrap(), vec![1, 2, 3, 4]);

        let bad: IgnoreCodes = serde_json::from_str(r#""TSabc""#).unwrap();
        assert!(matches!(
            bad.codes(),
            Err(ConfigError::InvalidDiagnosticCode(code)) if code == "TSabc"
        ));
    }

    #[test]
    fn test_unknown_compiler_options() {
        let options: CompilerOptions =
            serde_json::from_str(r#"{ "strict": true, "notAnOption": 1 }"#).unwrap();
        assert_eq!(options.unknown_options(), vec!["notAnOption"]);
    }

    #[test]
    fn test_strip_json_comments() {
        let source = indoc! {r#"
            {
              // comment
              "a": "// not a comment", /* block */
              "b": [1, 2,],
            }
        "#};
        let value: Value = serde_json::from_str(&strip_json_comments(source)).unwrap();
        assert_eq!(value["a"], "// not a comment");
        assert_eq!(value["b"], serde_json::json!([1, 2]));
    }

    #[test]
    fn test_tsconfig_extends() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("base")).unwrap();
        std::fs::write(
            dir.path().join("base/tsconfig.base.json"),
            r#"{ "compilerOptions": { "allowJs": true, "baseUrl": "." }, "include": ["src"] }"#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join("tsconfig.json"),
            r#"{ "extends": "./base/tsconfig.base", "compilerOptions": { "declaration": true } }"#,
        )
        .unwrap();

        let config = TsConfig::from_file(&dir.path().join("tsconfig.json")).unwrap();

        assert!(config.compiler_options.allow_js);
        assert!(config.compiler_options.declaration);
        assert_eq!(
            config.compiler_options.base_url,
            Some(dir.path().join("base"))
        );
        assert_eq!(
            config.include,
            Some(vec![dir.path().join("base").join("src").to_string_lossy().into_owned()])
        );
    }

    #[test]
    fn test_yaml_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tsjest.yaml");
        std::fs::write(
            &path,
            indoc! {"
                isolatedModules: true
                diagnostics: false
                stringifyContentPathRegex: '\\.html$'
            "},
        )
        .unwrap();

        let config = TsJestConfig::from_file(&path).unwrap();
        assert!(config.isolated_modules);
        assert_eq!(config.diagnostics, DiagnosticsConfig::Enabled(false));
        assert_eq!(
            config.stringify_content_path_regex,
            Some(OneOrMany::One("\\.html$".to_string()))
        );
    }

    #[test]
    fn test_missing_file() {
        let result = TsJestConfig::from_file(Path::new("/definitely/not/here.json"));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }
}
