//! Reference language service.
//!
//! Checks that imports resolve and that imported names exist in the
//! target module's exports, lowers module syntax, and emits code with a
//! source map. It does not check types.

use super::{
    lowering, EmitOutput, LanguageService, LanguageServiceHost, OutputFile, ServiceStats,
    TranspileOutput,
};
use crate::config::CompilerOptions;
use crate::diagnostics::{codes, Diagnostic, DiagnosticCategory};
use crate::errors::Result;
use crate::file_kind::{is_declaration_file, is_script_file, is_source_file};
use crate::sourcemap::{SourceMap, SourceMapBuilder};
use crate::syntax::{print, print_statement, ExportDeclaration, SourceFile, StatementKind};
use crate::transformers::{TransformContext, TransformerPipeline};
use rustc_hash::{FxHashMap, FxHashSet};
use std::path::{Path, PathBuf};
use tracing::debug;

struct ParsedFile {
    version: u64,
    text: String,
    file: SourceFile,
}

/// Exported names of one module
#[derive(Debug, Default)]
struct ModuleExports {
    names: FxHashSet<String>,
    has_default: bool,
    /// Anything could be exported: CommonJS, `export *`, `export =`
    open: bool,
}

impl ModuleExports {
    fn of(file: &SourceFile) -> Self {
        let mut exports = ModuleExports::default();
        let mut es_syntax = false;

        for statement in &file.statements {
            match statement.kind() {
                StatementKind::Import(decl) => es_syntax |= !decl.is_require,
                StatementKind::Export(decl) => {
                    es_syntax = true;
                    match decl {
                        ExportDeclaration::Declaration { names, .. } => {
                            exports.names.extend(names)
                        }
                        ExportDeclaration::Default { .. } => exports.has_default = true,
                        ExportDeclaration::Named { bindings, .. } => {
                            for binding in bindings {
                                if binding.exported == "default" {
                                    exports.has_default = true;
                                } else {
                                    exports.names.insert(binding.exported);
                                }
                            }
                        }
                        ExportDeclaration::All {
                            alias: Some(alias), ..
                        } => {
                            exports.names.insert(alias);
                        }
                        ExportDeclaration::All { alias: None, .. }
                        | ExportDeclaration::Assignment => exports.open = true,
                    }
                }
                _ if statement.first_token().is_some_and(|t| t.is_ident("export")) => {
                    es_syntax = true;
                    exports.open = true;
                }
                _ => {}
            }
        }

        exports.open |= !es_syntax;
        exports
    }
}

/// One `import`/`export ... from` and what it takes from the target
struct ModuleRequest {
    specifier: String,
    line: u32,
    column: u32,
    names: Vec<(String, u32, u32)>,
    wants_default: bool,
}

fn module_requests(file: &SourceFile) -> Vec<ModuleRequest> {
    let mut requests = Vec::new();
    for statement in &file.statements {
        match statement.kind() {
            StatementKind::Import(decl) => requests.push(ModuleRequest {
                names: decl
                    .named
                    .iter()
                    .map(|b| (b.imported.clone(), b.line, b.column))
                    .collect(),
                wants_default: decl.default_binding.is_some(),
                specifier: decl.specifier,
                line: decl.specifier_line,
                column: decl.specifier_column,
            }),
            StatementKind::Export(ExportDeclaration::Named {
                bindings,
                from: Some(from),
                ..
            }) => requests.push(ModuleRequest {
                wants_default: bindings.iter().any(|b| b.local == "default"),
                names: bindings
                    .into_iter()
                    .filter(|b| b.local != "default")
                    .map(|b| (b.local, from.line, from.column))
                    .collect(),
                specifier: from.specifier,
                line: from.line,
                column: from.column,
            }),
            StatementKind::Export(ExportDeclaration::All { from, .. }) => {
                requests.push(ModuleRequest {
                    specifier: from.specifier,
                    line: from.line,
                    column: from.column,
                    names: Vec::new(),
                    wants_default: false,
                })
            }
            _ => {}
        }
    }
    requests
}

fn is_path_specifier(specifier: &str) -> bool {
    specifier.starts_with("./")
        || specifier.starts_with("../")
        || specifier.starts_with('/')
        || specifier == "."
        || specifier == ".."
}

fn has_exports_to_check(path: &Path) -> bool {
    is_declaration_file(path) || is_source_file(path) || is_script_file(path)
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// `a.ts` -> `a.js`, `a.mts` -> `a.mjs`, `a.cts` -> `a.cjs`
fn js_output_name(file: &Path) -> PathBuf {
    let extension = match file.extension().and_then(|e| e.to_str()) {
        Some("mts") => "mjs",
        Some("cts") => "cjs",
        _ => "js",
    };
    file.with_extension(extension)
}

fn declaration_output_name(file: &Path) -> PathBuf {
    let extension = match file.extension().and_then(|e| e.to_str()) {
        Some("mts") => "d.mts",
        Some("cts") => "d.cts",
        _ => "d.ts",
    };
    file.with_extension(extension)
}

/// `.d.ts` text exposing the file's exports as `any`
fn declaration_text(file: &SourceFile) -> String {
    let mut lines = Vec::new();
    let mut imported = FxHashSet::default();
    let mut declared: FxHashSet<String> = FxHashSet::default();

    for statement in &file.statements {
        let verbatim = || print_statement(statement).trim_start().to_string();
        let first = statement.first_token().map(|t| t.text.as_str());

        match statement.kind() {
            StatementKind::Import(decl) => {
                imported.extend(decl.default_binding.clone());
                imported.extend(decl.namespace.clone());
                imported.extend(decl.named.iter().map(|b| b.local.clone()));
                lines.push(verbatim());
            }
            StatementKind::Export(decl) => match decl {
                ExportDeclaration::Declaration {
                    keyword,
                    names,
                    type_only,
                } => {
                    declared.extend(names.iter().cloned());
                    match keyword.as_str() {
                        _ if type_only && keyword != "const enum" => lines.push(verbatim()),
                        "const" | "let" | "var" | "using" => {
                            let keyword = if keyword == "using" { "const" } else { keyword.as_str() };
                            for name in names {
                                lines.push(format!("export declare {} {}: any;", keyword, name));
                            }
                        }
                        "function" => {
                            for name in names {
                                lines.push(format!(
                                    "export declare function {}(...args: any[]): any;",
                                    name
                                ));
                            }
                        }
                        "class" => {
                            for name in names {
                                lines.push(format!(
                                    "export declare class {} {{\n    [key: string]: any;\n}}",
                                    name
                                ));
                            }
                        }
                        "enum" | "const enum" => {
                            let mut body = statement.clone();
                            body.strip_leading_tokens(1);
                            lines.push(format!(
                                "export declare {}",
                                print_statement(&body).trim_start()
                            ));
                        }
                        _ => {
                            for name in names {
                                lines.push(format!("export declare const {}: any;", name));
                            }
                        }
                    }
                }
                ExportDeclaration::Default { .. } => {
                    lines.push("declare const _default: any;".to_string());
                    lines.push("export default _default;".to_string());
                }
                ExportDeclaration::Named {
                    bindings,
                    from: None,
                    type_only: false,
                } => {
                    for binding in bindings.iter().filter(|b| !b.type_only) {
                        if !imported.contains(&binding.local) && declared.insert(binding.local.clone())
                        {
                            lines.push(format!("declare const {}: any;", binding.local));
                        }
                    }
                    lines.push(verbatim());
                }
                ExportDeclaration::Named { .. } | ExportDeclaration::All { .. } => {
                    lines.push(verbatim())
                }
                ExportDeclaration::Assignment => {
                    lines.push("declare const _exported: any;".to_string());
                    lines.push("export = _exported;".to_string());
                }
            },
            _ if matches!(first, Some("interface" | "type" | "declare")) => {
                lines.push(verbatim())
            }
            _ => {}
        }
    }

    if lines.is_empty() {
        return "export {};\n".to_string();
    }
    let mut text = lines.join("\n");
    text.push('\n');
    text
}

/// Run the pipeline and lowering on one parsed file, then print it
fn emit_js(
    host: &mut dyn LanguageServiceHost,
    source: SourceFile,
    text: &str,
    options: &CompilerOptions,
    pipeline: &TransformerPipeline,
) -> Result<(String, SourceMap)> {
    let file_name = source.file_name.clone();
    let mut ctx = TransformContext {
        file_name: &file_name,
        options,
        host,
    };

    let transformed = pipeline.run_before(source, &mut ctx)?;
    let lowered = lowering::lower(transformed, options);
    let transformed = pipeline.run_after(lowered, &mut ctx)?;

    let mut builder = SourceMapBuilder::new(file_name_of(&file_name));
    builder.set_file(file_name_of(&js_output_name(&file_name)));
    builder.add_source_content(text.to_string());
    let mut code = print(&transformed, Some(&mut builder));
    if !code.is_empty() && !code.ends_with('\n') {
        code.push('\n');
    }
    Ok((code, builder.build()))
}

fn source_mapping_comment(js_name: &Path) -> String {
    format!("//# sourceMappingURL={}.map", file_name_of(js_name))
}

/// In-process [`LanguageService`] over a lossless statement-level syntax tree
#[derive(Default)]
pub struct ModuleGraphService {
    parsed: FxHashMap<PathBuf, ParsedFile>,
    semantic: FxHashMap<PathBuf, (u64, Vec<Diagnostic>)>,
    stats: ServiceStats,
}

impl ModuleGraphService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parsed tree of `path`, reparsed when the host reports new content
    fn source(&mut self, host: &mut dyn LanguageServiceHost, path: &Path) -> Option<&ParsedFile> {
        let text = host.script_snapshot(path)?;
        let version = host.script_version(path).unwrap_or(0);
        let fresh = self
            .parsed
            .get(path)
            .is_some_and(|p| p.version == version && p.text == text);

        if !fresh {
            self.stats.files_parsed += 1;
            debug!(file = %path.display(), version, "Parsing");
            let file = SourceFile::parse(path, &text);
            self.parsed.insert(
                path.to_path_buf(),
                ParsedFile {
                    version,
                    text,
                    file,
                },
            );
        }
        self.parsed.get(path)
    }

    fn check_module_requests(
        &mut self,
        host: &mut dyn LanguageServiceHost,
        file: &Path,
    ) -> Vec<Diagnostic> {
        let Some(requests) = self.source(host, file).map(|p| module_requests(&p.file)) else {
            return Vec::new();
        };

        let mut diagnostics = Vec::new();
        for request in requests {
            let spec_at = |d: Diagnostic| {
                d.with_file(file)
                    .at(request.line + 1, request.column + 1)
            };
            let Some(resolved) = host.resolve_module_name(&request.specifier, file) else {
                if is_path_specifier(&request.specifier) {
                    diagnostics.push(spec_at(Diagnostic::error(
                        codes::CANNOT_FIND_MODULE,
                        format!(
                            "Cannot find module '{}' or its corresponding type declarations.",
                            request.specifier
                        ),
                    )));
                }
                continue;
            };
            if resolved.is_external_library_import
                || !has_exports_to_check(&resolved.resolved_file_name)
            {
                continue;
            }

            let Some(exports) = self
                .source(host, &resolved.resolved_file_name)
                .map(|p| ModuleExports::of(&p.file))
            else {
                continue;
            };
            if exports.open {
                continue;
            }

            for (name, line, column) in &request.names {
                let found = if name == "default" {
                    exports.has_default
                } else {
                    exports.names.contains(name)
                };
                if !found {
                    diagnostics.push(
                        Diagnostic::error(
                            codes::NO_EXPORTED_MEMBER,
                            format!(
                                "Module '\"{}\"' has no exported member '{}'.",
                                request.specifier, name
                            ),
                        )
                        .with_file(file)
                        .at(line + 1, column + 1),
                    );
                }
            }
            if request.wants_default && !exports.has_default {
                diagnostics.push(spec_at(Diagnostic::error(
                    codes::NO_DEFAULT_EXPORT,
                    format!("Module '\"{}\"' has no default export.", request.specifier),
                )));
            }
        }
        diagnostics
    }
}

impl LanguageService for ModuleGraphService {
    fn get_emit_output(
        &mut self,
        host: &mut dyn LanguageServiceHost,
        file: &Path,
        pipeline: &TransformerPipeline,
    ) -> Result<EmitOutput> {
        self.stats.emits += 1;
        let options = host.compilation_settings().clone();

        if is_declaration_file(file) {
            return Ok(EmitOutput::default());
        }
        let script = is_script_file(file);
        if options.no_emit || !(is_source_file(file) || script) || (script && !options.allow_js) {
            debug!(file = %file.display(), "Emit skipped");
            return Ok(EmitOutput::skipped());
        }

        let Some((source, text)) = self
            .source(host, file)
            .map(|p| (p.file.clone(), p.text.clone()))
        else {
            return Ok(EmitOutput::skipped());
        };

        if options.no_emit_on_error {
            let has_errors = source.has_syntax_errors()
                || self
                    .get_semantic_diagnostics(host, file)
                    .iter()
                    .any(|d| d.category == DiagnosticCategory::Error);
            if has_errors {
                debug!(file = %file.display(), "Emit skipped: noEmitOnError");
                return Ok(EmitOutput::skipped());
            }
        }

        let declaration_source = (options.declaration && !script).then(|| source.clone());
        let (mut code, map) = emit_js(host, source, &text, &options, pipeline)?;

        let js_name = js_output_name(file);
        let mut output_files = Vec::new();
        if options.source_map {
            code.push_str(&source_mapping_comment(&js_name));
            let mut map_name = js_name.clone().into_os_string();
            map_name.push(".map");
            output_files.push(OutputFile {
                name: PathBuf::from(map_name),
                text: map.to_json()?,
            });
        }
        output_files.insert(
            0,
            OutputFile {
                name: js_name,
                text: code,
            },
        );

        if let Some(original) = declaration_source {
            let name = declaration_output_name(file);
            let declarations = SourceFile::parse(&name, &declaration_text(&original));
            let mut ctx = TransformContext {
                file_name: file,
                options: &options,
                host,
            };
            let declarations = pipeline.run_after_declarations(declarations, &mut ctx)?;
            output_files.push(OutputFile {
                name,
                text: print(&declarations, None),
            });
        }

        Ok(EmitOutput {
            output_files,
            emit_skipped: false,
        })
    }

    fn get_syntactic_diagnostics(
        &mut self,
        host: &mut dyn LanguageServiceHost,
        file: &Path,
    ) -> Vec<Diagnostic> {
        self.source(host, file)
            .map(|p| p.file.diagnostics.clone())
            .unwrap_or_default()
    }

    fn get_semantic_diagnostics(
        &mut self,
        host: &mut dyn LanguageServiceHost,
        file: &Path,
    ) -> Vec<Diagnostic> {
        let project_version = host.project_version();
        if let Some((version, diagnostics)) = self.semantic.get(file) {
            if *version == project_version {
                return diagnostics.clone();
            }
        }

        self.stats.semantic_checks += 1;
        debug!(file = %file.display(), project_version, "Checking module requests");
        let diagnostics = self.check_module_requests(host, file);
        self.semantic
            .insert(file.to_path_buf(), (project_version, diagnostics.clone()));
        diagnostics
    }

    fn transpile_module(
        &mut self,
        host: &mut dyn LanguageServiceHost,
        file: &Path,
        pipeline: &TransformerPipeline,
    ) -> Result<TranspileOutput> {
        self.stats.transpiles += 1;
        let options = host.compilation_settings().clone();
        let text = host.script_snapshot(file).unwrap_or_default();
        let source = SourceFile::parse(file, &text);
        let diagnostics = source.diagnostics.clone();

        let (mut code, map) = emit_js(host, source, &text, &options, pipeline)?;
        let source_map_text = if options.source_map {
            code.push_str(&source_mapping_comment(&js_output_name(file)));
            Some(map.to_json()?)
        } else {
            None
        };

        Ok(TranspileOutput {
            output_text: code,
            source_map_text,
            diagnostics,
        })
    }

    fn stats(&self) -> ServiceStats {
        self.stats
    }
}
