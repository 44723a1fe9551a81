//! Moves jest mock registrations above the code that imports the mocked
//! modules, in every statement list of the file.

use super::{AstTransformer, TransformContext, TransformError};
use crate::syntax::{Expression, Part, SourceFile, Statement, StatementKind};

pub const NAME: &str = "hoist-jest";
const VERSION: u32 = 4;

const JEST_GLOBALS: &str = "@jest/globals";

/// Methods whose calls must run before any import
const HOIST_METHODS: &[&str] = &[
    "mock",
    "unmock",
    "enableAutomock",
    "disableAutomock",
    "deepUnmock",
];

/// How the file refers to the jest object
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct JestRefs {
    identifiers: Vec<String>,
    namespaces: Vec<String>,
}

impl JestRefs {
    fn from_file(file: &SourceFile) -> Self {
        let mut refs = JestRefs::default();
        let mut imports_globals = false;

        for statement in &file.statements {
            let StatementKind::Import(decl) = statement.kind() else {
                continue;
            };
            if decl.specifier != JEST_GLOBALS || decl.type_only {
                continue;
            }
            imports_globals = true;
            for binding in decl.value_bindings() {
                if binding.imported == "jest" {
                    refs.identifiers.push(binding.local.clone());
                }
            }
            refs.namespaces.extend(decl.namespace.clone());
            refs.namespaces.extend(decl.default_binding.clone());
        }

        if !imports_globals {
            refs.identifiers.push("jest".to_string());
        }
        refs
    }

    fn is_jest(&self, expr: &Expression) -> bool {
        match expr {
            Expression::Identifier(name) => self.identifiers.contains(name),
            Expression::Member { object, property } if property == "jest" => {
                matches!(object.as_ref(), Expression::Identifier(ns) if self.namespaces.contains(ns))
            }
            _ => false,
        }
    }

    /// `jest.mock(...)`, also chained: `jest.mock('a').unmock('b')`
    fn is_hoistable(&self, expr: &Expression) -> bool {
        let Expression::Call { callee } = expr else {
            return false;
        };
        let Expression::Member { object, property } = callee.as_ref() else {
            return false;
        };
        HOIST_METHODS.contains(&property.as_str())
            && (self.is_jest(object) || self.is_hoistable(object))
    }
}

fn is_globals_import(statement: &Statement) -> bool {
    matches!(statement.kind(), StatementKind::Import(decl) if decl.specifier == JEST_GLOBALS)
}

/// Stable partition of one statement list, then recurse into blocks
fn hoist_list(statements: &mut Vec<Statement>, refs: &JestRefs, top_level: bool) {
    for statement in statements.iter_mut() {
        for part in statement.parts.iter_mut() {
            if let Part::Block(block) = part {
                hoist_list(&mut block.statements, refs, false);
            }
        }
    }

    let rank = |statement: &Statement| -> u8 {
        if top_level && is_globals_import(statement) {
            return 0;
        }
        match statement.kind() {
            StatementKind::Expression(expr) if refs.is_hoistable(&expr) => 1,
            _ => 2,
        }
    };

    let ranks: Vec<u8> = statements.iter().map(rank).collect();
    if ranks.windows(2).all(|w| w[0] <= w[1]) {
        return;
    }

    let original_first_leading = statements
        .first()
        .and_then(Statement::first_token)
        .map(|t| t.leading.clone())
        .unwrap_or_default();

    let mut ranked: Vec<(u8, usize, Statement)> = std::mem::take(statements)
        .into_iter()
        .enumerate()
        .map(|(i, s)| (ranks[i], i, s))
        .collect();
    ranked.sort_by_key(|(rank, index, _)| (*rank, *index));

    // The trivia in front of the old first statement (shebang, header
    // comments) stays at the top of the list.
    let moved_first = ranked.first().map_or(0, |(_, index, _)| *index);
    if moved_first != 0 {
        let displaced_leading = ranked[0]
            .2
            .first_token_mut()
            .map(|t| std::mem::replace(&mut t.leading, original_first_leading))
            .unwrap_or_default();
        if let Some((_, _, old_first)) = ranked.iter_mut().find(|(_, index, _)| *index == 0) {
            if let Some(token) = old_first.first_token_mut() {
                token.leading = displaced_leading;
            }
        }
    }

    statements.extend(ranked.into_iter().map(|(_, _, s)| s));
}

#[derive(Debug, Default)]
pub struct HoistJest;

impl HoistJest {
    pub fn new() -> Self {
        Self
    }
}

impl AstTransformer for HoistJest {
    fn name(&self) -> Option<&str> {
        Some(NAME)
    }

    fn version(&self) -> Option<u32> {
        Some(VERSION)
    }

    fn transform(
        &self,
        mut file: SourceFile,
        _ctx: &mut TransformContext<'_>,
    ) -> Result<SourceFile, TransformError> {
        let refs = JestRefs::from_file(&file);
        hoist_list(&mut file.statements, &refs, true);
        Ok(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompilerOptions;
    use crate::fs::MockFileSystem;
    use crate::service::StandaloneHost;
    use crate::syntax::print;
    use indoc::indoc;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;

    fn hoist(source: &str) -> String {
        let mut host = StandaloneHost::new(
            PathBuf::from("/p/a.test.ts"),
            source.to_string(),
            CompilerOptions::default(),
            Arc::new(MockFileSystem::new()),
        );
        let options = CompilerOptions::default();
        let mut ctx = TransformContext {
            file_name: Path::new("/p/a.test.ts"),
            options: &options,
            host: &mut host,
        };
        let file = SourceFile::parse(Path::new("/p/a.test.ts"), source);
        print(&HoistJest::new().transform(file, &mut ctx).unwrap(), None)
    }

    #[test]
    fn test_hoists_above_imports() {
        let out = hoist(indoc! {"
            import { a } from './a';
            jest.mock('./a');
            a();
        "});

        assert_eq!(
            out,
            indoc! {"
                jest.mock('./a');
                import { a } from './a';
                a();
            "}
        );
    }

    #[test]
    fn test_chained_call_off_other_expression_stays() {
        let out = hoist(indoc! {"
            import x from './x';
            jest.mock('./x');
            foo().mock('y');
            jest.mock('a').unmock('b');
        "});

        assert_eq!(
            out,
            indoc! {"
                jest.mock('./x');
                jest.mock('a').unmock('b');
                import x from './x';
                foo().mock('y');
            "}
        );
    }

    #[test]
    fn test_globals_import_stays_first() {
        let out = hoist(indoc! {"
            import { sum } from './sum';
            import { jest as j, expect } from '@jest/globals';
            j.mock('./sum');
            jest.mock('./not-hoisted');
        "});

        assert_eq!(
            out,
            indoc! {"
                import { jest as j, expect } from '@jest/globals';
                j.mock('./sum');
                import { sum } from './sum';
                jest.mock('./not-hoisted');
            "}
        );
    }

    #[test]
    fn test_namespace_import() {
        let out = hoist(indoc! {"
            import * as g from '@jest/globals';
            import a from './a';
            g.jest.mock('./a');
        "});

        assert!(out.starts_with("import * as g from '@jest/globals';\ng.jest.mock('./a');"));
    }

    #[test]
    fn test_nested_blocks_hoist_independently() {
        let out = hoist(indoc! {"
            describe('suite', () => {
              const value = require('./v');
              jest.mock('./v');
            });
        "});

        assert_eq!(
            out,
            indoc! {"
                describe('suite', () => {
                  jest.mock('./v');
                  const value = require('./v');
                });
            "}
        );
    }

    #[test]
    fn test_header_trivia_stays_on_top() {
        let out = hoist("#!/usr/bin/env node\n// header\nimport a from './a'\njest.mock('./a')\n");

        assert_eq!(
            out,
            "#!/usr/bin/env node\n// header\njest.mock('./a')\nimport a from './a'\n"
        );
    }

    #[test]
    fn test_untouched_file_is_identical() {
        let source = "import a from './a';\n\na();\n";
        assert_eq!(hoist(source), source);
    }
}
