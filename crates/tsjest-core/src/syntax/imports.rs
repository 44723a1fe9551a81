use super::{Lexer, Token, TokenKind};

/// A module specifier referenced by a source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedFile {
    pub specifier: String,
    /// 0-based line of the specifier literal
    pub line: u32,
}

/// Collect every module specifier a file refers to without building a tree.
///
/// Covers static imports and re-exports, `import x = require()`, CommonJS
/// `require()` and dynamic `import()` calls anywhere in the file.
pub fn preprocess_imports(source: &str) -> Vec<ImportedFile> {
    let tokens = Lexer::new(source).tokenize().tokens;
    let mut imports = Vec::new();

    for (i, token) in tokens.iter().enumerate() {
        let after_dot = i > 0 && tokens[i - 1].is_punct(".");
        if token.kind != TokenKind::Identifier || after_dot {
            continue;
        }

        let specifier = match token.text.as_str() {
            "from" => string_at(&tokens, i + 1),
            "import" => string_at(&tokens, i + 1).or_else(|| call_argument(&tokens, i)),
            "require" => call_argument(&tokens, i),
            _ => None,
        };

        if let Some(literal) = specifier {
            if let Some(value) = literal.string_value() {
                imports.push(ImportedFile {
                    specifier: value.to_string(),
                    line: literal.line,
                });
            }
        }
    }

    imports
}

fn string_at(tokens: &[Token], index: usize) -> Option<&Token> {
    tokens.get(index).filter(|t| t.kind == TokenKind::String)
}

/// The literal in `callee("literal")`
fn call_argument(tokens: &[Token], callee: usize) -> Option<&Token> {
    if !tokens.get(callee + 1)?.is_punct("(") {
        return None;
    }
    let literal = string_at(tokens, callee + 2)?;
    let close = tokens.get(callee + 3)?;
    (close.is_punct(")") || close.is_punct(",")).then_some(literal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    fn specifiers(source: &str) -> Vec<String> {
        preprocess_imports(source)
            .into_iter()
            .map(|i| i.specifier)
            .collect()
    }

    #[test]
    fn test_collects_all_import_forms() {
        let source = indoc! {r#"
            import a from './a';
            import type { B } from "./b";
            import './side-effect';
            export * from './c';
            export { d } from './d';
            import e = require('./e');
            const f = require('./f');
            const g = await import('./g');
        "#};

        assert_eq!(
            specifiers(source),
            vec!["./a", "./b", "./side-effect", "./c", "./d", "./e", "./f", "./g"]
        );
    }

    #[test]
    fn test_ignores_lookalikes() {
        let source = indoc! {r#"
            const list = Array.from('abc');
            obj.require('./nope');
            // import x from './commented'
            const s = "import y from './in-string'";
            require(path);
        "#};

        assert!(specifiers(source).is_empty());
    }

    #[test]
    fn test_reports_specifier_line() {
        let imports = preprocess_imports("\n\nimport x from './x'");
        assert_eq!(imports[0].line, 2);
    }
}
