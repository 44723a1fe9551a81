//! Lossless statement-level syntax tree for TypeScript/JavaScript sources
//!
//! The tree is shallow: a file is a list of statements, a
//! statement is a run of tokens and nested `{}` blocks, and every token keeps
//! the trivia (whitespace, comments) in front of it. Printing an untouched
//! tree reproduces the source byte for byte, which lets the transform
//! pipeline reorder or rewrite statements without disturbing anything else.

pub mod imports;
pub mod lexer;
pub mod parser;
pub mod printer;

use crate::diagnostics::Diagnostic;
use std::path::{Path, PathBuf};

pub use imports::{preprocess_imports, ImportedFile};
pub use lexer::{Lexed, Lexer};
pub use parser::Parser;
pub use printer::{print, print_statement};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Identifier,
    Punctuator,
    String,
    Template,
    Number,
    Regex,
    Unknown,
}

/// A token with the trivia that precedes it. `line` and `column` are 0-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub leading: String,
    pub text: String,
    pub line: u32,
    pub column: u32,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            kind,
            leading: String::new(),
            text: text.into(),
            line,
            column,
        }
    }

    pub fn is_punct(&self, text: &str) -> bool {
        self.kind == TokenKind::Punctuator && self.text == text
    }

    pub fn is_ident(&self, text: &str) -> bool {
        self.kind == TokenKind::Identifier && self.text == text
    }

    pub fn has_newline_before(&self) -> bool {
        self.leading.contains('\n')
    }

    /// The value of a string literal token without its quotes
    pub fn string_value(&self) -> Option<&str> {
        if self.kind != TokenKind::String || self.text.len() < 2 {
            return None;
        }
        let quote = self.text.chars().next()?;
        if !self.text.ends_with(quote) {
            return None;
        }
        Some(&self.text[1..self.text.len() - 1])
    }

    /// Replace the value of a string literal token, keeping its quote style
    pub fn set_string_value(&mut self, value: &str) {
        let quote = self.text.chars().next().unwrap_or('"');
        let escaped = value.replace(quote, &format!("\\{}", quote));
        self.text = format!("{}{}{}", quote, escaped, quote);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Part {
    Token(Token),
    Block(Block),
}

/// A `{ ... }` region, parsed as a nested statement list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub open: Token,
    pub statements: Vec<Statement>,
    pub close: Option<Token>,
}

impl Block {
    /// All tokens of the block in source order, braces excluded
    pub fn inner_tokens(&self) -> Vec<&Token> {
        let mut out = Vec::new();
        for statement in &self.statements {
            collect_tokens(&statement.parts, &mut out);
        }
        out
    }
}

/// A top-level item of a statement: a token or a whole block
#[derive(Debug, Clone, Copy)]
pub enum Item<'a> {
    Tok(&'a Token),
    Block(&'a Block),
}

impl<'a> Item<'a> {
    pub fn token(&self) -> Option<&'a Token> {
        match self {
            Item::Tok(token) => Some(token),
            Item::Block(_) => None,
        }
    }

    fn is_punct(&self, text: &str) -> bool {
        self.token().is_some_and(|t| t.is_punct(text))
    }

    fn is_ident(&self, text: &str) -> bool {
        self.token().is_some_and(|t| t.is_ident(text))
    }

    fn identifier(&self) -> Option<&'a str> {
        self.token()
            .filter(|t| t.kind == TokenKind::Identifier)
            .map(|t| t.text.as_str())
    }

    fn string(&self) -> Option<&'a Token> {
        self.token().filter(|t| t.kind == TokenKind::String)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Statement {
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportBinding {
    pub imported: String,
    pub local: String,
    pub type_only: bool,
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportDeclaration {
    pub type_only: bool,
    pub default_binding: Option<String>,
    pub namespace: Option<String>,
    pub named: Vec<ImportBinding>,
    pub specifier: String,
    pub specifier_line: u32,
    pub specifier_column: u32,
    /// `import x = require("...")`
    pub is_require: bool,
}

impl ImportDeclaration {
    pub fn is_side_effect_only(&self) -> bool {
        self.default_binding.is_none() && self.namespace.is_none() && self.named.is_empty()
    }

    pub fn value_bindings(&self) -> impl Iterator<Item = &ImportBinding> {
        self.named.iter().filter(|b| !b.type_only)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportBinding {
    pub local: String,
    pub exported: String,
    pub type_only: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSource {
    pub specifier: String,
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportDeclaration {
    /// `export const a = 1`, `export function f() {}`, `export interface I {}`
    Declaration {
        keyword: String,
        names: Vec<String>,
        type_only: bool,
    },
    /// `export default ...`; `name` is set for named function/class declarations
    Default { name: Option<String> },
    /// `export { a, b as c } [from "..."]`
    Named {
        bindings: Vec<ExportBinding>,
        from: Option<ExportSource>,
        type_only: bool,
    },
    /// `export * [as ns] from "..."`
    All {
        alias: Option<String>,
        from: ExportSource,
    },
    /// `export = value`
    Assignment,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expression {
    Identifier(String),
    Member {
        object: Box<Expression>,
        property: String,
    },
    Call {
        callee: Box<Expression>,
    },
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatementKind {
    Import(ImportDeclaration),
    Export(ExportDeclaration),
    Expression(Expression),
    Other,
}

const DECLARATION_MODIFIERS: &[&str] = &["declare", "async", "abstract"];

impl Statement {
    pub fn new(parts: Vec<Part>) -> Self {
        Self { parts }
    }

    pub fn items(&self) -> Vec<Item<'_>> {
        self.parts
            .iter()
            .map(|part| match part {
                Part::Token(token) => Item::Tok(token),
                Part::Block(block) => Item::Block(block),
            })
            .collect()
    }

    pub fn first_token(&self) -> Option<&Token> {
        match self.parts.first()? {
            Part::Token(token) => Some(token),
            Part::Block(block) => Some(&block.open),
        }
    }

    pub fn first_token_mut(&mut self) -> Option<&mut Token> {
        match self.parts.first_mut()? {
            Part::Token(token) => Some(token),
            Part::Block(block) => Some(&mut block.open),
        }
    }

    /// Text of the last token, `}` for a trailing block
    pub fn last_text(&self) -> Option<&str> {
        match self.parts.last()? {
            Part::Token(token) => Some(&token.text),
            Part::Block(block) => Some(block.close.as_ref().map_or("}", |t| t.text.as_str())),
        }
    }

    /// All tokens in source order, including those of nested blocks
    pub fn tokens(&self) -> Vec<&Token> {
        let mut out = Vec::new();
        collect_tokens(&self.parts, &mut out);
        out
    }

    pub fn tokens_mut(&mut self) -> Vec<&mut Token> {
        let mut out = Vec::new();
        collect_tokens_mut(&mut self.parts, &mut out);
        out
    }

    pub fn kind(&self) -> StatementKind {
        let items = self.items();
        let Some(first) = items.first() else {
            return StatementKind::Other;
        };

        if first.is_ident("import") {
            return match classify_import(&items) {
                Some(decl) => StatementKind::Import(decl),
                None => classify_expression(&items),
            };
        }
        if first.is_ident("export") {
            return classify_export(&items)
                .map(StatementKind::Export)
                .unwrap_or(StatementKind::Other);
        }
        classify_expression(&items)
    }

    /// Drop the first `count` tokens, keeping the trivia of the first one
    pub fn strip_leading_tokens(&mut self, count: usize) {
        let mut leading = None;
        for _ in 0..count {
            if !matches!(self.parts.first(), Some(Part::Token(_))) {
                break;
            }
            if let Part::Token(token) = self.parts.remove(0) {
                leading.get_or_insert(token.leading);
            }
        }
        if let (Some(leading), Some(first)) = (leading, self.first_token_mut()) {
            if first.leading.trim().is_empty() {
                first.leading = leading;
            } else {
                first.leading = format!("{}{}", leading, first.leading);
            }
        }
    }
}

pub(crate) fn collect_tokens<'a>(parts: &'a [Part], out: &mut Vec<&'a Token>) {
    for part in parts {
        match part {
            Part::Token(token) => out.push(token),
            Part::Block(block) => {
                out.push(&block.open);
                for statement in &block.statements {
                    collect_tokens(&statement.parts, out);
                }
                if let Some(close) = &block.close {
                    out.push(close);
                }
            }
        }
    }
}

fn collect_tokens_mut<'a>(parts: &'a mut [Part], out: &mut Vec<&'a mut Token>) {
    for part in parts {
        match part {
            Part::Token(token) => out.push(token),
            Part::Block(block) => {
                out.push(&mut block.open);
                for statement in &mut block.statements {
                    collect_tokens_mut(&mut statement.parts, out);
                }
                if let Some(close) = &mut block.close {
                    out.push(close);
                }
            }
        }
    }
}

/// A parsed source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub file_name: PathBuf,
    pub statements: Vec<Statement>,
    pub trailing: String,
    pub diagnostics: Vec<Diagnostic>,
}

impl SourceFile {
    pub fn parse(file_name: &Path, source: &str) -> Self {
        let lexed = Lexer::new(source).tokenize();
        let mut file = Parser::new(lexed).parse(file_name);
        for diagnostic in &mut file.diagnostics {
            diagnostic.file = Some(file_name.to_path_buf());
        }
        file
    }

    /// Parse generated code and stamp every token with one source position,
    /// so the whole fragment maps back to the statement it replaces.
    pub fn parse_fragment(code: &str, line: u32, column: u32) -> Vec<Statement> {
        let lexed = Lexer::new(code).tokenize();
        let mut file = Parser::new(lexed).parse(Path::new(""));
        for statement in &mut file.statements {
            for token in statement.tokens_mut() {
                token.line = line;
                token.column = column;
            }
        }
        file.statements
    }

    pub fn has_syntax_errors(&self) -> bool {
        !self.diagnostics.is_empty()
    }
}

fn split_bindings<'a>(tokens: &[&'a Token]) -> Vec<Vec<&'a Token>> {
    let mut groups = Vec::new();
    let mut current = Vec::new();
    for token in tokens {
        if token.is_punct(",") {
            if !current.is_empty() {
                groups.push(std::mem::take(&mut current));
            }
        } else {
            current.push(*token);
        }
    }
    if !current.is_empty() {
        groups.push(current);
    }
    groups
}

fn binding_name(token: &Token) -> String {
    token
        .string_value()
        .map(str::to_string)
        .unwrap_or_else(|| token.text.clone())
}

/// `[type] name [as alias]` groups of a `{ ... }` import/export clause
fn parse_binding_groups(block: &Block) -> Vec<(String, String, bool, &Token)> {
    let tokens = block.inner_tokens();
    let mut out = Vec::new();
    for group in split_bindings(&tokens) {
        let mut rest: &[&Token] = &group;
        // `type as alias` imports a binding called `type`
        let type_only = rest.len() > 1 && rest[0].is_ident("type") && !rest[1].is_ident("as");
        if type_only {
            rest = &rest[1..];
        }
        let Some(name_token) = rest.first() else {
            continue;
        };
        let name = binding_name(name_token);
        let alias = if rest.len() >= 3 && rest[1].is_ident("as") {
            binding_name(rest[2])
        } else {
            name.clone()
        };
        out.push((name, alias, type_only, *name_token));
    }
    out
}

fn classify_import(items: &[Item<'_>]) -> Option<ImportDeclaration> {
    let next = items.get(1)?;
    if next.is_punct("(") || next.is_punct(".") {
        return None;
    }

    let mut i = 1;
    let mut type_only = false;
    if items.get(i).is_some_and(|it| it.is_ident("type")) {
        let after = items.get(i + 1);
        let is_default_named_type = after.is_some_and(|it| it.is_ident("from"))
            || after.is_some_and(|it| it.is_punct(","))
            || after.is_some_and(|it| it.is_punct("="));
        if !is_default_named_type {
            type_only = true;
            i += 1;
        }
    }

    let mut decl = ImportDeclaration {
        type_only,
        default_binding: None,
        namespace: None,
        named: Vec::new(),
        specifier: String::new(),
        specifier_line: 0,
        specifier_column: 0,
        is_require: false,
    };

    if let Some(token) = items.get(i).and_then(Item::string) {
        decl.specifier = token.string_value()?.to_string();
        decl.specifier_line = token.line;
        decl.specifier_column = token.column;
        return Some(decl);
    }

    if let Some(name) = items.get(i).and_then(Item::identifier) {
        if items.get(i + 1).is_some_and(|it| it.is_punct("=")) {
            // import x = require("...")
            if !items.get(i + 2).is_some_and(|it| it.is_ident("require"))
                || !items.get(i + 3).is_some_and(|it| it.is_punct("("))
            {
                return None;
            }
            let token = items.get(i + 4).and_then(Item::string)?;
            decl.namespace = Some(name.to_string());
            decl.specifier = token.string_value()?.to_string();
            decl.specifier_line = token.line;
            decl.specifier_column = token.column;
            decl.is_require = true;
            return Some(decl);
        }
        decl.default_binding = Some(name.to_string());
        i += 1;
        if items.get(i).is_some_and(|it| it.is_punct(",")) {
            i += 1;
        }
    }

    if items.get(i).is_some_and(|it| it.is_punct("*")) {
        if !items.get(i + 1).is_some_and(|it| it.is_ident("as")) {
            return None;
        }
        decl.namespace = Some(items.get(i + 2).and_then(Item::identifier)?.to_string());
        i += 3;
    } else if let Some(Item::Block(block)) = items.get(i) {
        decl.named = parse_binding_groups(block)
            .into_iter()
            .map(|(imported, local, type_only, token)| ImportBinding {
                imported,
                local,
                type_only,
                line: token.line,
                column: token.column,
            })
            .collect();
        i += 1;
    }

    if !items.get(i).is_some_and(|it| it.is_ident("from")) {
        return None;
    }
    let token = items.get(i + 1).and_then(Item::string)?;
    decl.specifier = token.string_value()?.to_string();
    decl.specifier_line = token.line;
    decl.specifier_column = token.column;
    Some(decl)
}

fn export_source(items: &[Item<'_>], at: usize) -> Option<ExportSource> {
    if !items.get(at).is_some_and(|it| it.is_ident("from")) {
        return None;
    }
    let token = items.get(at + 1).and_then(Item::string)?;
    Some(ExportSource {
        specifier: token.string_value()?.to_string(),
        line: token.line,
        column: token.column,
    })
}

fn classify_export(items: &[Item<'_>]) -> Option<ExportDeclaration> {
    let next = items.get(1)?;

    if next.is_punct("=") {
        return Some(ExportDeclaration::Assignment);
    }

    if next.is_punct("*") {
        let (alias, from_at) = if items.get(2).is_some_and(|it| it.is_ident("as")) {
            (Some(items.get(3).and_then(Item::identifier)?.to_string()), 4)
        } else {
            (None, 2)
        };
        return Some(ExportDeclaration::All {
            alias,
            from: export_source(items, from_at)?,
        });
    }

    let (type_only, clause_at) = if next.is_ident("type")
        && matches!(items.get(2), Some(Item::Block(_)))
    {
        (true, 2)
    } else {
        (false, 1)
    };
    if let Some(Item::Block(block)) = items.get(clause_at) {
        let bindings = parse_binding_groups(block)
            .into_iter()
            .map(|(local, exported, binding_type_only, _)| ExportBinding {
                local,
                exported,
                type_only: type_only || binding_type_only,
            })
            .collect();
        return Some(ExportDeclaration::Named {
            bindings,
            from: export_source(items, clause_at + 1),
            type_only,
        });
    }

    if next.is_ident("default") {
        let mut i = 2;
        while items
            .get(i)
            .is_some_and(|it| DECLARATION_MODIFIERS.iter().any(|m| it.is_ident(m)))
        {
            i += 1;
        }
        let name = if items.get(i).is_some_and(|it| it.is_ident("function") || it.is_ident("class")) {
            let mut j = i + 1;
            if items.get(j).is_some_and(|it| it.is_punct("*")) {
                j += 1;
            }
            items
                .get(j)
                .and_then(Item::identifier)
                .filter(|n| *n != "extends" && *n != "implements")
                .map(str::to_string)
        } else {
            None
        };
        return Some(ExportDeclaration::Default { name });
    }

    if next.is_ident("as") {
        // export as namespace Foo
        return None;
    }

    if next.is_ident("import") {
        let name = items.get(2).and_then(Item::identifier)?;
        return Some(ExportDeclaration::Declaration {
            keyword: "import".to_string(),
            names: vec![name.to_string()],
            type_only: false,
        });
    }

    let mut i = 1;
    let mut ambient = false;
    while let Some(modifier) = items
        .get(i)
        .and_then(Item::identifier)
        .filter(|t| DECLARATION_MODIFIERS.contains(t))
    {
        ambient |= modifier == "declare";
        i += 1;
    }

    let keyword = items.get(i).and_then(Item::identifier)?;
    match keyword {
        "const" if items.get(i + 1).is_some_and(|it| it.is_ident("enum")) => {
            let name = items.get(i + 2).and_then(Item::identifier)?;
            Some(ExportDeclaration::Declaration {
                keyword: "const enum".to_string(),
                names: vec![name.to_string()],
                type_only: true,
            })
        }
        "const" | "let" | "var" | "using" => Some(ExportDeclaration::Declaration {
            keyword: keyword.to_string(),
            names: variable_names(&items[i + 1..]),
            type_only: ambient,
        }),
        "function" | "class" | "enum" | "namespace" | "module" | "interface" | "type" => {
            let mut j = i + 1;
            if items.get(j).is_some_and(|it| it.is_punct("*")) {
                j += 1;
            }
            let name = items.get(j).and_then(Item::identifier)?;
            let type_only = ambient || matches!(keyword, "interface" | "type");
            Some(ExportDeclaration::Declaration {
                keyword: keyword.to_string(),
                names: vec![name.to_string()],
                type_only,
            })
        }
        _ => None,
    }
}

/// Names bound by `a = 1, { b, c: d } = o, [e] = l`
fn variable_names(items: &[Item<'_>]) -> Vec<String> {
    let mut names = Vec::new();
    let mut depth = 0usize;
    let mut angle = 0usize;
    let mut expect_binding = true;

    let mut i = 0;
    while i < items.len() {
        match items[i] {
            Item::Block(block) if depth == 0 && expect_binding => {
                names.extend(pattern_names(&block.inner_tokens()));
                expect_binding = false;
            }
            Item::Block(_) => {}
            Item::Tok(token) if depth == 0 && expect_binding && token.is_punct("[") => {
                let end = skip_balanced(items, i, "[", "]").unwrap_or(items.len());
                let mut inner = Vec::new();
                for item in &items[i + 1..end] {
                    match item {
                        Item::Tok(t) => inner.push(*t),
                        Item::Block(b) => inner.extend(b.inner_tokens()),
                    }
                }
                names.extend(pattern_names(&inner));
                expect_binding = false;
                i = end;
            }
            Item::Tok(token) => {
                if depth == 0 && expect_binding && token.kind == TokenKind::Identifier {
                    names.push(token.text.clone());
                    expect_binding = false;
                } else if token.is_punct("(") || token.is_punct("[") {
                    depth += 1;
                } else if token.is_punct(")") || token.is_punct("]") {
                    depth = depth.saturating_sub(1);
                } else if token.is_punct("<") {
                    angle += 1;
                } else if token.is_punct(">") {
                    angle = angle.saturating_sub(1);
                } else if token.is_punct(">>") {
                    angle = angle.saturating_sub(2);
                } else if depth == 0 && angle == 0 && token.is_punct(",") {
                    expect_binding = true;
                }
            }
        }
        i += 1;
    }
    names
}

/// Identifiers bound by a destructuring pattern
fn pattern_names(tokens: &[&Token]) -> Vec<String> {
    let mut names = Vec::new();
    for (i, token) in tokens.iter().enumerate() {
        if token.kind != TokenKind::Identifier {
            continue;
        }
        let prev_ok = i == 0
            || ["{", ",", ":", "...", "["]
                .iter()
                .any(|p| tokens[i - 1].is_punct(p));
        let next_is_colon = tokens.get(i + 1).is_some_and(|t| t.is_punct(":"));
        if prev_ok && !next_is_colon {
            names.push(token.text.clone());
        }
    }
    names
}

fn classify_expression(items: &[Item<'_>]) -> StatementKind {
    let Some(name) = items.first().and_then(Item::identifier) else {
        return StatementKind::Other;
    };
    // `import(...)` is a dynamic import, not a call of an identifier
    if name == "import" {
        return StatementKind::Expression(Expression::Other);
    }

    let mut expr = Expression::Identifier(name.to_string());
    let mut i = 1;
    loop {
        match items.get(i) {
            Some(it) if it.is_punct(".") => match items.get(i + 1).and_then(Item::identifier) {
                Some(property) => {
                    expr = Expression::Member {
                        object: Box::new(expr),
                        property: property.to_string(),
                    };
                    i += 2;
                }
                None => return StatementKind::Expression(Expression::Other),
            },
            Some(it) if it.is_punct("(") => match skip_balanced(items, i, "(", ")") {
                Some(end) => {
                    expr = Expression::Call {
                        callee: Box::new(expr),
                    };
                    i = end + 1;
                }
                None => return StatementKind::Expression(Expression::Other),
            },
            Some(it) if it.is_punct("<") => {
                // explicit type arguments: `jest.mock<typeof import("x")>("x")`
                match skip_balanced(items, i, "<", ">") {
                    Some(end) if items.get(end + 1).is_some_and(|it| it.is_punct("(")) => {
                        i = end + 1;
                    }
                    _ => return StatementKind::Expression(Expression::Other),
                }
            }
            _ => break,
        }
    }

    let rest = &items[i..];
    let complete = rest.is_empty() || (rest.len() == 1 && rest[0].is_punct(";"));
    if complete {
        StatementKind::Expression(expr)
    } else {
        StatementKind::Expression(Expression::Other)
    }
}

/// Index of the token closing the group opened at `start`
fn skip_balanced(items: &[Item<'_>], start: usize, open: &str, close: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (offset, item) in items[start..].iter().enumerate() {
        if item.is_punct(open) {
            depth += 1;
        } else if item.is_punct(close) {
            depth -= 1;
            if depth == 0 {
                return Some(start + offset);
            }
        } else if close == ">" && item.is_punct(">>") {
            depth = depth.saturating_sub(2);
            if depth == 0 {
                return Some(start + offset);
            }
        }
    }
    None
}
