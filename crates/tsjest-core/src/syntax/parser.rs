use std::collections::VecDeque;
use std::path::Path;

use super::{Block, Lexed, Part, SourceFile, Statement, Token, TokenKind};
use crate::diagnostics::{codes, Diagnostic};

/// Statement heads whose statement ends right after their body block
const BLOCK_HEADS: &[&str] = &[
    "function",
    "class",
    "if",
    "for",
    "while",
    "with",
    "switch",
    "try",
    "do",
    "namespace",
    "module",
    "interface",
    "enum",
    "else",
];

/// Modifiers skipped when looking for a statement's head keyword
const HEAD_MODIFIERS: &[&str] = &["export", "default", "declare", "async", "abstract"];

/// Keywords that cannot end a statement when followed by a line break
const CONTINUATION_KEYWORDS: &[&str] = &[
    "else",
    "do",
    "new",
    "typeof",
    "void",
    "delete",
    "in",
    "instanceof",
    "of",
    "extends",
    "implements",
    "export",
    "import",
    "default",
    "const",
    "let",
    "var",
    "case",
    "class",
    "function",
    "interface",
    "enum",
    "from",
    "declare",
    "abstract",
    "namespace",
    "keyof",
    "as",
    "satisfies",
];

/// Groups tokens into statements and `{}` blocks.
///
/// This is not a grammar-complete parser: it only has to find statement
/// boundaries the way automatic semicolon insertion would, and report
/// unbalanced braces and parentheses.
pub struct Parser {
    tokens: VecDeque<Token>,
    trailing: String,
    diagnostics: Vec<Diagnostic>,
    end_line: u32,
    end_column: u32,
}

struct StatementState {
    head: String,
    depth: usize,
    has_block: bool,
    head_parens_closed: usize,
}

impl Parser {
    pub fn new(lexed: Lexed) -> Self {
        Self {
            tokens: lexed.tokens.into(),
            trailing: lexed.trailing,
            diagnostics: lexed.diagnostics,
            end_line: lexed.end_line,
            end_column: lexed.end_column,
        }
    }

    pub fn parse(mut self, file_name: &Path) -> SourceFile {
        let statements = self.parse_statements(false);
        let mut diagnostics = self.diagnostics;
        diagnostics.sort_by_key(|d| d.start.map(|p| (p.line, p.column)));

        SourceFile {
            file_name: file_name.to_path_buf(),
            statements,
            trailing: self.trailing,
            diagnostics,
        }
    }

    fn error_at_token(&mut self, token: &Token, code: u32, message: &str) {
        self.diagnostics
            .push(Diagnostic::error(code, message).at(token.line + 1, token.column + 1));
    }

    fn error_at_end(&mut self, code: u32, message: &str) {
        self.diagnostics.push(
            Diagnostic::error(code, message).at(self.end_line + 1, self.end_column + 1),
        );
    }

    fn parse_statements(&mut self, in_block: bool) -> Vec<Statement> {
        let mut statements = Vec::new();

        while let Some(next) = self.tokens.front() {
            if next.is_punct("}") {
                if in_block {
                    break;
                }
                let Some(stray) = self.tokens.pop_front() else {
                    break;
                };
                self.error_at_token(
                    &stray,
                    codes::STATEMENT_EXPECTED,
                    "Declaration or statement expected.",
                );
                statements.push(Statement::new(vec![Part::Token(stray)]));
                continue;
            }
            statements.push(self.parse_statement());
        }

        statements
    }

    fn parse_block(&mut self) -> Option<Block> {
        let open = self.tokens.pop_front()?;
        let statements = self.parse_statements(true);
        let close = match self.tokens.front() {
            Some(token) if token.is_punct("}") => self.tokens.pop_front(),
            _ => {
                self.error_at_end(codes::TOKEN_EXPECTED, "'}' expected.");
                None
            }
        };
        Some(Block {
            open,
            statements,
            close,
        })
    }

    fn head_keyword(&self) -> String {
        let mut iter = self.tokens.iter().peekable();
        while let Some(token) = iter.next() {
            if token.kind == TokenKind::Identifier && HEAD_MODIFIERS.contains(&token.text.as_str())
            {
                continue;
            }
            if token.is_ident("const") && iter.peek().is_some_and(|t| t.is_ident("enum")) {
                return "enum".to_string();
            }
            return token.text.clone();
        }
        String::new()
    }

    fn parse_statement(&mut self) -> Statement {
        let mut parts: Vec<Part> = Vec::new();
        let mut state = StatementState {
            head: self.head_keyword(),
            depth: 0,
            has_block: false,
            head_parens_closed: 0,
        };

        loop {
            let Some(next) = self.tokens.front() else {
                break;
            };
            if next.is_punct("}") {
                break;
            }
            if !parts.is_empty()
                && state.depth == 0
                && next.has_newline_before()
                && !continues(&parts, next, &state)
            {
                break;
            }

            if next.is_punct("{") {
                let first_part = parts.is_empty();
                let Some(block) = self.parse_block() else {
                    break;
                };
                parts.push(Part::Block(block));

                if state.depth == 0 {
                    let ends = first_part || BLOCK_HEADS.contains(&state.head.as_str());
                    state.has_block = true;
                    if ends {
                        let keeps_going = self.tokens.front().is_some_and(|t| {
                            t.is_ident("else")
                                || t.is_ident("catch")
                                || t.is_ident("finally")
                                || (state.head == "do" && t.is_ident("while"))
                        });
                        if !keeps_going {
                            break;
                        }
                    }
                }
                continue;
            }

            let Some(token) = self.tokens.pop_front() else {
                break;
            };
            if token.is_punct("(") || token.is_punct("[") {
                state.depth += 1;
            } else if token.is_punct(")") || token.is_punct("]") {
                if state.depth == 0 {
                    self.error_at_token(
                        &token,
                        codes::STATEMENT_EXPECTED,
                        "Declaration or statement expected.",
                    );
                } else {
                    state.depth -= 1;
                    if state.depth == 0 && token.is_punct(")") {
                        state.head_parens_closed += 1;
                    }
                }
            }

            let ends = state.depth == 0 && token.is_punct(";");
            parts.push(Part::Token(token));
            if ends {
                break;
            }
        }

        if state.depth > 0 {
            match self.tokens.front() {
                Some(token) => {
                    let token = token.clone();
                    self.error_at_token(&token, codes::TOKEN_EXPECTED, "')' expected.");
                }
                None => self.error_at_end(codes::TOKEN_EXPECTED, "')' expected."),
            }
        }

        Statement::new(parts)
    }
}

/// Whether a statement continues across the line break before `next`
fn continues(parts: &[Part], next: &Token, state: &StatementState) -> bool {
    let prev = match parts.last() {
        Some(Part::Token(token)) => Some(token),
        _ => None,
    };

    if let Some(prev) = prev {
        match prev.kind {
            TokenKind::Punctuator => {
                if !matches!(prev.text.as_str(), ")" | "]" | "}" | "++" | "--") {
                    return true;
                }
                if prev.is_punct(")")
                    && matches!(state.head.as_str(), "if" | "for" | "while" | "with")
                    && !state.has_block
                    && state.head_parens_closed == 1
                {
                    return true;
                }
            }
            TokenKind::Identifier if CONTINUATION_KEYWORDS.contains(&prev.text.as_str()) => {
                return true;
            }
            _ => {}
        }
    }

    match next.kind {
        TokenKind::Punctuator => match next.text.as_str() {
            "{" => !state.has_block && BLOCK_HEADS.contains(&state.head.as_str()),
            "!" | "~" | "++" | "--" | "@" => false,
            _ => true,
        },
        TokenKind::Template => true,
        TokenKind::Identifier => {
            matches!(next.text.as_str(), "else" | "instanceof" | "as" | "satisfies")
        }
        _ => false,
    }
}
