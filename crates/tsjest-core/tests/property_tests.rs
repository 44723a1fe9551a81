//! Property-based tests for tsjest
//!
//! These tests use proptest to check the lossless syntax layer and the cache
//! key across a wide range of random inputs.

use proptest::prelude::*;
use std::path::{Path, PathBuf};
use tsjest_core::cache::CacheKeyInputs;
use tsjest_core::syntax::{preprocess_imports, print, Lexed, Lexer, SourceFile};

// =============================================================================
// Lexer Round-Trip Properties
// =============================================================================

fn reassemble(lexed: &Lexed) -> String {
    let mut out = String::new();
    for token in &lexed.tokens {
        out.push_str(&token.leading);
        out.push_str(&token.text);
    }
    out.push_str(&lexed.trailing);
    out
}

/// Fragments that exercise every token kind, including broken ones
fn fragment_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-zA-Z_$][a-zA-Z0-9_$]{0,8}",
        "[0-9]{1,6}(\\.[0-9]{1,3})?",
        Just("'str'".to_string()),
        Just("\"dq\\\"x\"".to_string()),
        Just("`tpl ${a} b`".to_string()),
        Just("/re[/]x/g".to_string()),
        Just("// line\n".to_string()),
        Just("/* block */".to_string()),
        Just("'unterminated\n".to_string()),
        Just("/* open".to_string()),
        "[-+*/%=<>!&|^~?:;,.(){}\\[\\]]",
        "[ \t\n]{1,3}",
    ]
}

fn identifier_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-zA-Z0-9]{0,10}".prop_filter("reserved words", |s| {
        !matches!(
            s.as_str(),
            "as" | "do" | "if" | "in" | "for" | "new" | "try" | "var" | "case" | "else" | "enum"
                | "from" | "null" | "this" | "true" | "type" | "void" | "with" | "await"
                | "break" | "catch" | "class" | "const" | "false" | "super" | "throw"
                | "while" | "yield" | "delete" | "export" | "import" | "return" | "switch"
                | "typeof" | "default" | "extends" | "finally" | "require" | "continue"
                | "debugger" | "function" | "interface" | "instanceof"
        )
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn test_lexer_round_trips_printable_input(source in "[ -~\t\n]{0,200}") {
        let lexed = Lexer::new(&source).tokenize();
        prop_assert_eq!(reassemble(&lexed), source);
    }

    #[test]
    fn test_lexer_round_trips_token_soup(parts in prop::collection::vec(fragment_strategy(), 0..40)) {
        let source = parts.concat();
        let lexed = Lexer::new(&source).tokenize();
        prop_assert_eq!(reassemble(&lexed), source);
    }

    #[test]
    fn test_balanced_module_prints_unchanged(
        names in prop::collection::vec(identifier_strategy(), 1..6),
        specifier in "[a-z]{1,8}",
    ) {
        let imports = names.join(", ");
        let source = format!(
            "import {{ {imports} }} from './{specifier}';\n\
             export function run() {{\n    return [{imports}];\n}}\n"
        );
        let file = SourceFile::parse(Path::new("/p/a.ts"), &source);
        prop_assert!(file.diagnostics.is_empty());
        prop_assert_eq!(print(&file, None), source);
    }

    #[test]
    fn test_preprocess_finds_every_specifier(specifiers in prop::collection::vec("[a-z]{1,8}", 1..6)) {
        let source: String = specifiers
            .iter()
            .enumerate()
            .map(|(i, s)| match i % 3 {
                0 => format!("import x{i} from './{s}';\n"),
                1 => format!("const x{i} = require('./{s}');\n"),
                _ => format!("const x{i} = await import('./{s}');\n"),
            })
            .collect();

        let found: Vec<String> = preprocess_imports(&source)
            .into_iter()
            .map(|import| import.specifier)
            .collect();
        let expected: Vec<String> = specifiers.iter().map(|s| format!("./{s}")).collect();
        prop_assert_eq!(found, expected);
    }
}

// =============================================================================
// Cache Key Properties
// =============================================================================

proptest! {
    #[test]
    fn test_cache_key_is_deterministic_and_content_sensitive(
        content in ".{0,64}",
        other in ".{0,64}",
        instrument in any::<bool>(),
    ) {
        let key = |content: &str, instrument: bool| {
            CacheKeyInputs {
                config_digest: "digest",
                root_dir: Path::new("/p"),
                file_path: Path::new("/p/a.ts"),
                file_content: content,
                instrument,
                module_kind: "CommonJS",
                dependencies: vec![(PathBuf::from("/p/b.ts"), None)],
            }
            .digest()
        };

        prop_assert_eq!(key(&content, instrument), key(&content, instrument));
        prop_assert_ne!(key(&content, instrument), key(&content, !instrument));
        if content != other {
            prop_assert_ne!(key(&content, instrument), key(&other, instrument));
        }
    }
}
