use super::{Token, TokenKind};
use crate::diagnostics::{codes, Diagnostic};

/// Punctuators, longest first so greedy matching picks the right one
const PUNCTUATORS: &[&str] = &[
    ">>>=", "...", "===", "!==", "**=", "<<=", ">>=", ">>>", "&&=", "||=", "??=", "=>", "==",
    "!=", "<=", ">=", "&&", "||", "??", "?.", "++", "--", "+=", "-=", "*=", "/=", "%=", "&=",
    "|=", "^=", "**", "<<", ">>", "{", "}", "(", ")", "[", "]", ";", ",", "<", ">", "+", "-",
    "*", "/", "%", "&", "|", "^", "!", "~", "?", ":", "=", ".", "@",
];

/// Keywords after which a `/` starts a regular expression
const KEYWORDS_BEFORE_EXPRESSION: &[&str] = &[
    "return",
    "typeof",
    "instanceof",
    "in",
    "of",
    "new",
    "delete",
    "void",
    "throw",
    "case",
    "do",
    "else",
    "yield",
    "await",
];

/// Output of the lexer
#[derive(Debug, Clone)]
pub struct Lexed {
    pub tokens: Vec<Token>,
    /// Trivia after the last token
    pub trailing: String,
    pub diagnostics: Vec<Diagnostic>,
    /// 0-based position just past the end of the input
    pub end_line: u32,
    pub end_column: u32,
}

/// Lossless tokenizer: concatenating every token's leading trivia and text,
/// then the trailing trivia, gives back the input exactly.
pub struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: u32,
    column: u32,
    diagnostics: Vec<Diagnostic>,
    prev_kind: Option<TokenKind>,
    prev_text: String,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 0,
            column: 0,
            diagnostics: Vec::new(),
            prev_kind: None,
            prev_text: String::new(),
        }
    }

    pub fn tokenize(mut self) -> Lexed {
        let mut tokens = Vec::new();

        loop {
            let leading = self.scan_trivia();
            if self.peek(0).is_none() {
                return Lexed {
                    tokens,
                    trailing: leading,
                    diagnostics: self.diagnostics,
                    end_line: self.line,
                    end_column: self.column,
                };
            }

            let (line, column) = (self.line, self.column);
            let (kind, text) = self.scan_token();
            self.prev_kind = Some(kind);
            self.prev_text.clone_from(&text);

            tokens.push(Token {
                kind,
                leading,
                text,
                line,
                column,
            });
        }
    }

    fn peek(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.chars.get(self.pos).copied()?;
        self.pos += 1;
        if ch == '\n' {
            self.line += 1;
            self.column = 0;
        } else {
            self.column += ch.len_utf16() as u32;
        }
        Some(ch)
    }

    fn bump_into(&mut self, text: &mut String) -> Option<char> {
        let ch = self.bump()?;
        text.push(ch);
        Some(ch)
    }

    fn error_at(&mut self, line: u32, column: u32, code: u32, message: &str) {
        self.diagnostics
            .push(Diagnostic::error(code, message).at(line + 1, column + 1));
    }

    fn scan_trivia(&mut self) -> String {
        let mut trivia = String::new();
        loop {
            match (self.peek(0), self.peek(1)) {
                (Some(c), _) if c.is_whitespace() => {
                    self.bump_into(&mut trivia);
                }
                (Some('/'), Some('/')) => self.scan_line_comment(&mut trivia),
                (Some('#'), Some('!')) if self.pos == 0 => self.scan_line_comment(&mut trivia),
                (Some('/'), Some('*')) => {
                    let (line, column) = (self.line, self.column);
                    self.bump_into(&mut trivia);
                    self.bump_into(&mut trivia);
                    let mut closed = false;
                    while let Some(ch) = self.bump_into(&mut trivia) {
                        if ch == '*' && self.peek(0) == Some('/') {
                            self.bump_into(&mut trivia);
                            closed = true;
                            break;
                        }
                    }
                    if !closed {
                        self.error_at(line, column, codes::COMMENT_NOT_CLOSED, "'*/' expected.");
                    }
                }
                _ => return trivia,
            }
        }
    }

    fn scan_line_comment(&mut self, text: &mut String) {
        while let Some(ch) = self.peek(0) {
            if ch == '\n' {
                break;
            }
            self.bump_into(text);
        }
    }

    fn scan_token(&mut self) -> (TokenKind, String) {
        let mut text = String::new();
        let Some(ch) = self.peek(0) else {
            return (TokenKind::Unknown, text);
        };

        if is_identifier_start(ch)
            || (ch == '#' && self.peek(1).is_some_and(is_identifier_start))
        {
            self.bump_into(&mut text);
            while self.peek(0).is_some_and(is_identifier_part) {
                self.bump_into(&mut text);
            }
            return (TokenKind::Identifier, text);
        }

        if ch.is_ascii_digit() || (ch == '.' && self.peek(1).is_some_and(|c| c.is_ascii_digit())) {
            self.scan_number(&mut text);
            return (TokenKind::Number, text);
        }

        match ch {
            '\'' | '"' => {
                self.scan_string(&mut text);
                (TokenKind::String, text)
            }
            '`' => {
                let (line, column) = (self.line, self.column);
                self.bump_into(&mut text);
                if !self.scan_template_rest(&mut text) {
                    self.error_at(
                        line,
                        column,
                        codes::UNTERMINATED_TEMPLATE,
                        "Unterminated template literal.",
                    );
                }
                (TokenKind::Template, text)
            }
            '/' if self.regex_allowed() => {
                self.scan_regex(&mut text);
                (TokenKind::Regex, text)
            }
            _ => {
                for punct in PUNCTUATORS {
                    if self.matches(punct) {
                        for _ in 0..punct.chars().count() {
                            self.bump_into(&mut text);
                        }
                        return (TokenKind::Punctuator, text);
                    }
                }
                self.bump_into(&mut text);
                (TokenKind::Unknown, text)
            }
        }
    }

    fn matches(&self, text: &str) -> bool {
        text.chars()
            .enumerate()
            .all(|(i, c)| self.peek(i) == Some(c))
    }

    fn regex_allowed(&self) -> bool {
        match self.prev_kind {
            None | Some(TokenKind::Unknown) => true,
            Some(TokenKind::Punctuator) => {
                !matches!(self.prev_text.as_str(), ")" | "]" | "}" | "++" | "--")
            }
            Some(TokenKind::Identifier) => {
                KEYWORDS_BEFORE_EXPRESSION.contains(&self.prev_text.as_str())
            }
            Some(_) => false,
        }
    }

    fn scan_number(&mut self, text: &mut String) {
        let mut seen_dot = false;
        let radix_prefixed = self.peek(0) == Some('0')
            && matches!(self.peek(1), Some('x' | 'X' | 'o' | 'O' | 'b' | 'B'));

        while let Some(ch) = self.peek(0) {
            if ch.is_ascii_alphanumeric() || ch == '_' {
                self.bump_into(text);
                if !radix_prefixed
                    && matches!(ch, 'e' | 'E')
                    && matches!(self.peek(0), Some('+' | '-'))
                {
                    self.bump_into(text);
                }
            } else if ch == '.'
                && !seen_dot
                && !radix_prefixed
                && !self
                    .peek(1)
                    .is_some_and(|c| c == '.' || is_identifier_start(c))
            {
                seen_dot = true;
                self.bump_into(text);
            } else {
                break;
            }
        }
    }

    fn scan_string(&mut self, text: &mut String) {
        let (line, column) = (self.line, self.column);
        let Some(quote) = self.bump_into(text) else {
            return;
        };

        loop {
            match self.peek(0) {
                None | Some('\n') => {
                    self.error_at(
                        line,
                        column,
                        codes::UNTERMINATED_STRING,
                        "Unterminated string literal.",
                    );
                    return;
                }
                Some('\\') => {
                    self.bump_into(text);
                    self.bump_into(text);
                }
                Some(ch) => {
                    self.bump_into(text);
                    if ch == quote {
                        return;
                    }
                }
            }
        }
    }

    /// Scan a template after its opening backtick; false when unterminated
    fn scan_template_rest(&mut self, text: &mut String) -> bool {
        loop {
            match self.bump_into(text) {
                None => return false,
                Some('\\') => {
                    self.bump_into(text);
                }
                Some('`') => return true,
                Some('$') if self.peek(0) == Some('{') => {
                    self.bump_into(text);
                    if !self.scan_template_expression(text) {
                        return false;
                    }
                }
                Some(_) => {}
            }
        }
    }

    /// Scan a `${ ... }` substitution up to and including its closing brace
    fn scan_template_expression(&mut self, text: &mut String) -> bool {
        let mut depth = 0usize;
        loop {
            match self.peek(0) {
                None => return false,
                Some('{') => {
                    depth += 1;
                    self.bump_into(text);
                }
                Some('}') => {
                    self.bump_into(text);
                    if depth == 0 {
                        return true;
                    }
                    depth -= 1;
                }
                Some('\'' | '"') => self.scan_string(text),
                Some('`') => {
                    self.bump_into(text);
                    if !self.scan_template_rest(text) {
                        return false;
                    }
                }
                Some('/') if self.peek(1) == Some('/') => self.scan_line_comment(text),
                Some('/') if self.peek(1) == Some('*') => {
                    self.bump_into(text);
                    self.bump_into(text);
                    while let Some(ch) = self.bump_into(text) {
                        if ch == '*' && self.peek(0) == Some('/') {
                            self.bump_into(text);
                            break;
                        }
                    }
                }
                Some(_) => {
                    self.bump_into(text);
                }
            }
        }
    }

    fn scan_regex(&mut self, text: &mut String) {
        let (line, column) = (self.line, self.column);
        self.bump_into(text);
        let mut in_class = false;

        loop {
            match self.peek(0) {
                None | Some('\n') => {
                    self.error_at(
                        line,
                        column,
                        codes::UNTERMINATED_REGEX,
                        "Unterminated regular expression literal.",
                    );
                    return;
                }
                Some('\\') => {
                    self.bump_into(text);
                    if self.peek(0).is_some_and(|c| c != '\n') {
                        self.bump_into(text);
                    }
                }
                Some('[') => {
                    in_class = true;
                    self.bump_into(text);
                }
                Some(']') => {
                    in_class = false;
                    self.bump_into(text);
                }
                Some('/') if !in_class => {
                    self.bump_into(text);
                    break;
                }
                Some(_) => {
                    self.bump_into(text);
                }
            }
        }

        while self.peek(0).is_some_and(is_identifier_part) {
            self.bump_into(text);
        }
    }
}

fn is_identifier_start(ch: char) -> bool {
    ch.is_alphabetic() || ch == '_' || ch == '$'
}

fn is_identifier_part(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_' || ch == '$'
}
