//! Module lowering: rewrites `import`/`export` statements for the output
//! module kind and erases statement-level type constructs.
//!
//! Generated statements are parsed from small code fragments and stamped
//! with the position of the statement they replace, so source maps still
//! point at the original import or export.

use crate::config::{CompilerOptions, ModuleKind};
use crate::syntax::{
    ExportBinding, ExportDeclaration, ImportDeclaration, SourceFile, Statement, StatementKind,
    TokenKind,
};
use rustc_hash::FxHashSet;
use std::path::Path;

const IMPORT_DEFAULT_HELPER: &str = "var __importDefault = (this && this.__importDefault) || function (mod) {\n    return (mod && mod.__esModule) ? mod : { \"default\": mod };\n};";

const EXPORT_STAR_HELPER: &str = "var __exportStar = (this && this.__exportStar) || function (m, exports) {\n    for (var p in m) if (p !== \"default\" && !Object.prototype.hasOwnProperty.call(exports, p)) exports[p] = m[p];\n};";

const PROLOGUE: &str =
    "\"use strict\";\nObject.defineProperty(exports, \"__esModule\", { value: true });";

/// Module kind the emitted code for `file` uses
pub fn effective_module_kind(options: &CompilerOptions, file: &Path) -> ModuleKind {
    match options.module.unwrap_or(ModuleKind::CommonJs) {
        ModuleKind::Node16 | ModuleKind::NodeNext => {
            let esm = file
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e == "mts" || e == "mjs");
            if esm {
                ModuleKind::EsNext
            } else {
                ModuleKind::CommonJs
            }
        }
        kind if kind.is_es_module() => kind,
        _ => ModuleKind::CommonJs,
    }
}

/// Lower one file for the module kind configured in `options`
pub fn lower(file: SourceFile, options: &CompilerOptions) -> SourceFile {
    let kind = effective_module_kind(options, &file.file_name);
    let commonjs = !kind.is_es_module();
    let SourceFile {
        file_name,
        statements,
        trailing,
        diagnostics,
    } = file;

    let lowering = Lowering::new(options, type_level_names(&statements));
    let statements = if commonjs && is_module(&statements) {
        lowering.commonjs(statements)
    } else {
        lowering.erase_types(statements, !commonjs)
    };

    SourceFile {
        file_name,
        statements,
        trailing,
        diagnostics,
    }
}

fn is_module(statements: &[Statement]) -> bool {
    statements.iter().any(|s| {
        matches!(s.kind(), StatementKind::Import(_) | StatementKind::Export(_))
            || s.first_token().is_some_and(|t| t.is_ident("export"))
    })
}

/// `interface I`, `type T =`, `declare ...` at statement level
fn is_type_level(statement: &Statement) -> bool {
    let items = statement.items();
    let ident = |i: usize| {
        items
            .get(i)
            .and_then(|it| it.token())
            .filter(|t| t.kind == TokenKind::Identifier)
    };
    let Some(first) = ident(0) else {
        return false;
    };
    match first.text.as_str() {
        "interface" | "declare" => ident(1).is_some(),
        "type" => {
            ident(1).is_some()
                && items
                    .get(2)
                    .and_then(|it| it.token())
                    .is_some_and(|t| t.is_punct("=") || t.is_punct("<"))
        }
        _ => false,
    }
}

/// Names that only exist at the type level in this file
fn type_level_names(statements: &[Statement]) -> FxHashSet<String> {
    let mut names = FxHashSet::default();
    for statement in statements {
        match statement.kind() {
            StatementKind::Export(ExportDeclaration::Declaration {
                keyword,
                names: declared,
                type_only: true,
            }) if keyword != "const enum" => names.extend(declared),
            _ if is_type_level(statement) => {
                let tokens = statement.tokens();
                let skip = usize::from(tokens.first().is_some_and(|t| t.is_ident("declare")));
                if let Some(name) = tokens.get(skip + 1) {
                    names.insert(name.text.clone());
                }
            }
            _ => {}
        }
    }
    names
}

fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

fn position(statement: &Statement) -> (u32, u32) {
    statement
        .first_token()
        .map_or((0, 0), |t| (t.line, t.column))
}

fn take_leading(statement: &mut Statement) -> String {
    statement
        .first_token_mut()
        .map(|t| std::mem::take(&mut t.leading))
        .unwrap_or_default()
}

fn set_leading(statements: &mut [Statement], leading: String) {
    if let Some(token) = statements.first_mut().and_then(Statement::first_token_mut) {
        token.leading = leading;
    }
}

struct Lowering<'a> {
    options: &'a CompilerOptions,
    type_names: FxHashSet<String>,
    out: Vec<Statement>,
    helpers: Vec<&'static str>,
    temps: usize,
    /// Statements were dropped before anything was emitted
    dropped_top: bool,
    /// Comments in front of those statements
    pending: String,
}

impl<'a> Lowering<'a> {
    fn new(options: &'a CompilerOptions, type_names: FxHashSet<String>) -> Self {
        Self {
            options,
            type_names,
            out: Vec::new(),
            helpers: Vec::new(),
            temps: 0,
            dropped_top: false,
            pending: String::new(),
        }
    }

    fn push(&mut self, mut statement: Statement) {
        if self.out.is_empty() && self.dropped_top {
            let pending = std::mem::take(&mut self.pending);
            if let Some(token) = statement.first_token_mut() {
                token.leading = format!("{}{}", pending, token.leading.trim_start());
            }
        }
        self.out.push(statement);
    }

    fn drop_statement(&mut self, mut statement: Statement) {
        if self.out.is_empty() {
            self.dropped_top = true;
            let leading = take_leading(&mut statement);
            if !leading.trim().is_empty() {
                self.pending.push_str(leading.trim_start());
            }
        }
    }

    /// Replace `original` by the statements of `code`, keeping its trivia
    fn replace(&mut self, mut original: Statement, code: &str) {
        let (line, column) = position(&original);
        let mut fragment = SourceFile::parse_fragment(code, line, column);
        set_leading(&mut fragment, take_leading(&mut original));
        for statement in fragment {
            self.push(statement);
        }
    }

    /// Emit `code` on the lines after the statement at `at`
    fn append(&mut self, at: (u32, u32), code: &str) {
        let fragment = SourceFile::parse_fragment(&format!("\n{}", code), at.0, at.1);
        for statement in fragment {
            self.push(statement);
        }
    }

    /// Drop `count` leading tokens of `statement` and put `code` in front
    fn prepend(&mut self, mut statement: Statement, count: usize, code: &str) {
        let (line, column) = position(&statement);
        statement.strip_leading_tokens(count);
        let leading = take_leading(&mut statement);
        if let Some(token) = statement.first_token_mut() {
            token.leading = " ".to_string();
        }

        let mut fragment = SourceFile::parse_fragment(code, line, column);
        let mut parts = Vec::new();
        for generated in fragment.drain(..) {
            parts.extend(generated.parts);
        }
        parts.append(&mut statement.parts);
        statement.parts = parts;
        if let Some(token) = statement.first_token_mut() {
            token.leading = leading;
        }
        self.push(statement);
    }

    fn temp(&mut self) -> String {
        self.temps += 1;
        format!("_module_{}", self.temps)
    }

    fn use_helper(&mut self, helper: &'static str) {
        if !self.helpers.contains(&helper) {
            self.helpers.push(helper);
        }
    }

    fn default_of(&mut self, module: &str) -> String {
        if self.options.es_module_interop {
            self.use_helper(IMPORT_DEFAULT_HELPER);
            format!("__importDefault({}).default", module)
        } else {
            format!("{}.default", module)
        }
    }

    fn is_value_binding(&self, binding: &ExportBinding) -> bool {
        !binding.type_only && !self.type_names.contains(&binding.local)
    }

    /// Only erase type-level statements; for ES output also drop type-only
    /// import and export specifiers
    fn erase_types(mut self, statements: Vec<Statement>, esm: bool) -> Vec<Statement> {
        for statement in statements {
            if is_type_level(&statement) {
                self.drop_statement(statement);
                continue;
            }
            if !esm {
                self.push(statement);
                continue;
            }
            match statement.kind() {
                StatementKind::Import(decl) => self.esm_import(statement, &decl),
                StatementKind::Export(decl) => self.esm_export(statement, decl),
                _ => self.push(statement),
            }
        }
        self.out
    }

    fn esm_import(&mut self, statement: Statement, decl: &ImportDeclaration) {
        if decl.type_only {
            return self.drop_statement(statement);
        }
        if decl.is_require {
            let name = decl.namespace.as_deref().unwrap_or_default();
            let code = format!("const {} = require({});", name, quote(&decl.specifier));
            return self.replace(statement, &code);
        }
        if decl.named.iter().all(|b| !b.type_only) {
            return self.push(statement);
        }

        let mut clauses = Vec::new();
        clauses.extend(decl.default_binding.clone());
        let named: Vec<String> = decl
            .value_bindings()
            .map(|b| {
                if b.imported == b.local {
                    b.local.clone()
                } else {
                    format!("{} as {}", b.imported, b.local)
                }
            })
            .collect();
        if !named.is_empty() {
            clauses.push(format!("{{ {} }}", named.join(", ")));
        }
        if clauses.is_empty() {
            return self.drop_statement(statement);
        }
        let code = format!(
            "import {} from {};",
            clauses.join(", "),
            quote(&decl.specifier)
        );
        self.replace(statement, &code);
    }

    fn esm_export(&mut self, statement: Statement, decl: ExportDeclaration) {
        match decl {
            ExportDeclaration::Declaration {
                keyword,
                type_only: true,
                ..
            } if keyword != "const enum" => self.drop_statement(statement),
            ExportDeclaration::Default { name: None } if is_default_interface(&statement) => {
                self.drop_statement(statement)
            }
            ExportDeclaration::Named {
                type_only: true, ..
            } => self.drop_statement(statement),
            ExportDeclaration::Named { bindings, from, .. } => {
                let values: Vec<&ExportBinding> = bindings
                    .iter()
                    .filter(|b| !b.type_only && (from.is_some() || self.is_value_binding(b)))
                    .collect();
                if values.len() == bindings.len() {
                    return self.push(statement);
                }
                if values.is_empty() {
                    return self.drop_statement(statement);
                }
                let clause = values
                    .iter()
                    .map(|b| {
                        if b.local == b.exported {
                            b.local.clone()
                        } else {
                            format!("{} as {}", b.local, b.exported)
                        }
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                let code = match from {
                    Some(source) => {
                        format!("export {{ {} }} from {};", clause, quote(&source.specifier))
                    }
                    None => format!("export {{ {} }};", clause),
                };
                self.replace(statement, &code);
            }
            _ => self.push(statement),
        }
    }

    fn commonjs(mut self, mut statements: Vec<Statement>) -> Vec<Statement> {
        let header = statements
            .first_mut()
            .map(take_leading)
            .unwrap_or_default();

        for statement in statements {
            if is_type_level(&statement) {
                self.drop_statement(statement);
                continue;
            }
            match statement.kind() {
                StatementKind::Import(decl) => self.commonjs_import(statement, decl),
                StatementKind::Export(decl) => self.commonjs_export(statement, decl),
                // `export as namespace X` and other ambient forms
                _ if statement.first_token().is_some_and(|t| t.is_ident("export")) => {
                    self.drop_statement(statement)
                }
                _ => self.push(statement),
            }
        }

        let mut prologue_code = PROLOGUE.to_string();
        for helper in &self.helpers {
            prologue_code.push('\n');
            prologue_code.push_str(helper);
        }
        let mut prologue = SourceFile::parse_fragment(&prologue_code, 0, 0);
        set_leading(&mut prologue, header);

        if let Some(token) = self.out.first_mut().and_then(Statement::first_token_mut) {
            if !token.leading.contains('\n') {
                token.leading = format!("\n{}", token.leading.trim_start());
            }
        }
        prologue.append(&mut self.out);
        prologue
    }

    fn commonjs_import(&mut self, statement: Statement, decl: ImportDeclaration) {
        let module = format!("require({})", quote(&decl.specifier));
        if decl.type_only {
            return self.drop_statement(statement);
        }
        if decl.is_require {
            let name = decl.namespace.as_deref().unwrap_or_default();
            return self.replace(statement, &format!("const {} = {};", name, module));
        }
        if decl.is_side_effect_only() {
            return self.replace(statement, &format!("{};", module));
        }

        let named: Vec<String> = decl
            .value_bindings()
            .map(|b| {
                if b.imported == b.local {
                    b.local.clone()
                } else {
                    format!("{}: {}", b.imported, b.local)
                }
            })
            .collect();
        let bindings = usize::from(decl.default_binding.is_some())
            + usize::from(decl.namespace.is_some())
            + usize::from(!named.is_empty());

        let code = match bindings {
            0 => return self.drop_statement(statement),
            1 => {
                if let Some(namespace) = &decl.namespace {
                    format!("const {} = {};", namespace, module)
                } else if let Some(default) = &decl.default_binding {
                    format!("const {} = {};", default, self.default_of(&module))
                } else {
                    format!("const {{ {} }} = {};", named.join(", "), module)
                }
            }
            _ => {
                let temp = self.temp();
                let mut lines = vec![format!("const {} = {};", temp, module)];
                if let Some(default) = &decl.default_binding {
                    lines.push(format!("const {} = {};", default, self.default_of(&temp)));
                }
                if let Some(namespace) = &decl.namespace {
                    lines.push(format!("const {} = {};", namespace, temp));
                }
                if !named.is_empty() {
                    lines.push(format!("const {{ {} }} = {};", named.join(", "), temp));
                }
                lines.join("\n")
            }
        };
        self.replace(statement, &code);
    }

    fn commonjs_export(&mut self, statement: Statement, decl: ExportDeclaration) {
        let at = position(&statement);
        match decl {
            ExportDeclaration::Declaration {
                keyword,
                type_only: true,
                ..
            } if keyword != "const enum" => self.drop_statement(statement),
            ExportDeclaration::Declaration { names, .. } => {
                self.prepend(statement, 1, "");
                let code = names
                    .iter()
                    .map(|n| format!("exports.{} = {};", n, n))
                    .collect::<Vec<_>>()
                    .join("\n");
                if !code.is_empty() {
                    self.append(at, &code);
                }
            }
            ExportDeclaration::Default { name: Some(name) } => {
                self.prepend(statement, 2, "");
                self.append(at, &format!("exports.default = {};", name));
            }
            ExportDeclaration::Default { name: None } => {
                if is_default_interface(&statement) {
                    self.drop_statement(statement);
                } else {
                    self.prepend(statement, 2, "exports.default =");
                }
            }
            ExportDeclaration::Named {
                type_only: true, ..
            } => self.drop_statement(statement),
            ExportDeclaration::Named {
                bindings,
                from: None,
                ..
            } => {
                let lines: Vec<String> = bindings
                    .iter()
                    .filter(|b| self.is_value_binding(b))
                    .map(|b| format!("exports.{} = {};", b.exported, b.local))
                    .collect();
                if lines.is_empty() {
                    self.drop_statement(statement);
                } else {
                    self.replace(statement, &lines.join("\n"));
                }
            }
            ExportDeclaration::Named {
                bindings,
                from: Some(source),
                ..
            } => {
                let values: Vec<&ExportBinding> =
                    bindings.iter().filter(|b| !b.type_only).collect();
                if values.is_empty() {
                    return self.drop_statement(statement);
                }
                let temp = self.temp();
                let mut lines = vec![format!(
                    "const {} = require({});",
                    temp,
                    quote(&source.specifier)
                )];
                for binding in values {
                    let value = if binding.local == "default" {
                        self.default_of(&temp)
                    } else {
                        format!("{}.{}", temp, binding.local)
                    };
                    lines.push(format!("exports.{} = {};", binding.exported, value));
                }
                self.replace(statement, &lines.join("\n"));
            }
            ExportDeclaration::All {
                alias: Some(alias),
                from,
            } => {
                let code = format!("exports.{} = require({});", alias, quote(&from.specifier));
                self.replace(statement, &code);
            }
            ExportDeclaration::All { alias: None, from } => {
                self.use_helper(EXPORT_STAR_HELPER);
                let code = format!("__exportStar(require({}), exports);", quote(&from.specifier));
                self.replace(statement, &code);
            }
            ExportDeclaration::Assignment => self.prepend(statement, 2, "module.exports ="),
        }
    }
}

fn is_default_interface(statement: &Statement) -> bool {
    statement
        .items()
        .get(2)
        .and_then(|it| it.token())
        .is_some_and(|t| t.is_ident("interface"))
}
