use super::{Part, SourceFile, Statement, Token, TokenKind};
use crate::sourcemap::SourceMapBuilder;

struct Printer<'a> {
    out: String,
    map: Option<&'a mut SourceMapBuilder>,
}

impl Printer<'_> {
    fn write(&mut self, text: &str) {
        self.out.push_str(text);
        if let Some(map) = self.map.as_deref_mut() {
            map.advance(text);
        }
    }

    fn token(&mut self, token: &Token) {
        self.write(&token.leading);
        if token.text.is_empty() {
            return;
        }
        if let Some(map) = self.map.as_deref_mut() {
            let name = (token.kind == TokenKind::Identifier).then_some(token.text.as_str());
            map.add_mapping(token.line, token.column, name);
        }
        self.write(&token.text);
    }

    fn statements(&mut self, statements: &[Statement]) {
        let mut previous: Option<&Statement> = None;
        for statement in statements {
            if let Some(previous) = previous {
                if needs_separator(previous, statement) {
                    self.write("\n");
                }
            }
            self.parts(&statement.parts);
            previous = Some(statement);
        }
    }

    fn parts(&mut self, parts: &[Part]) {
        for part in parts {
            match part {
                Part::Token(token) => self.token(token),
                Part::Block(block) => {
                    self.token(&block.open);
                    self.statements(&block.statements);
                    if let Some(close) = &block.close {
                        self.token(close);
                    }
                }
            }
        }
    }
}

/// Statements moved next to each other by a transform may have lost the
/// line break that separated them.
fn needs_separator(previous: &Statement, next: &Statement) -> bool {
    let Some(first) = next.first_token() else {
        return false;
    };
    if first.has_newline_before() || first.is_punct("}") {
        return false;
    }
    !matches!(previous.last_text(), None | Some(";") | Some("}"))
}

/// Print a syntax tree, optionally recording a source map of every token
pub fn print(file: &SourceFile, map: Option<&mut SourceMapBuilder>) -> String {
    let mut printer = Printer {
        out: String::new(),
        map,
    };
    printer.statements(&file.statements);
    printer.write(&file.trailing);
    printer.out
}

pub fn print_statement(statement: &Statement) -> String {
    let mut printer = Printer {
        out: String::new(),
        map: None,
    };
    printer.parts(&statement.parts);
    printer.out
}
