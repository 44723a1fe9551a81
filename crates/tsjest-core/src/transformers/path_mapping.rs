//! Rewrites module specifiers that go through `compilerOptions.paths` into
//! relative paths, so the runtime module loader needs no alias setup.

use super::{AstTransformer, TransformContext, TransformError};
use crate::fs::relative_path;
use crate::syntax::{SourceFile, Token, TokenKind};
use std::path::Path;
use tracing::debug;

pub const NAME: &str = "path-mapping";
const VERSION: u32 = 1;

/// jest methods that take a module path as first argument
const JEST_MODULE_METHODS: &[&str] = &[
    "mock",
    "unmock",
    "doMock",
    "dontMock",
    "setMock",
    "deepUnmock",
    "requireActual",
    "requireMock",
    "createMockFromModule",
];

/// Whether the string token at `index` is a module specifier
fn is_specifier_position(tokens: &[&Token], index: usize) -> bool {
    let at = |offset: usize| index.checked_sub(offset).and_then(|i| tokens.get(i));
    let not_member = |offset: usize| !at(offset).is_some_and(|t| t.is_punct("."));

    let Some(prev) = at(1) else {
        return false;
    };
    if prev.is_ident("from") || prev.is_ident("import") {
        return not_member(2);
    }
    if !prev.is_punct("(") {
        return false;
    }
    let Some(callee) = at(2) else {
        return false;
    };
    if callee.is_ident("require") || callee.is_ident("import") {
        return not_member(3);
    }
    callee.kind == TokenKind::Identifier
        && JEST_MODULE_METHODS.contains(&callee.text.as_str())
        && !not_member(3)
}

fn matches_pattern(pattern: &str, specifier: &str) -> bool {
    match pattern.split_once('*') {
        Some((prefix, suffix)) => {
            specifier.len() >= prefix.len() + suffix.len()
                && specifier.starts_with(prefix)
                && specifier.ends_with(suffix)
        }
        None => pattern == specifier,
    }
}

/// `./x` style specifier of `target` seen from `containing_dir`; the
/// extension is dropped unless it is `.json`
fn relative_specifier(containing_dir: &Path, target: &Path) -> String {
    let relative = relative_path(containing_dir, target);
    let mut text = relative.to_string_lossy().replace('\\', "/");

    for extension in [".d.ts", ".d.mts", ".d.cts", ".ts", ".tsx", ".mts", ".cts", ".js", ".jsx"] {
        if let Some(stripped) = text.strip_suffix(extension) {
            text = stripped.to_string();
            break;
        }
    }
    if text.starts_with("../") {
        text
    } else {
        format!("./{}", text)
    }
}

#[derive(Debug, Default)]
pub struct PathMapping;

impl PathMapping {
    pub fn new() -> Self {
        Self
    }
}

impl AstTransformer for PathMapping {
    fn name(&self) -> Option<&str> {
        Some(NAME)
    }

    fn version(&self) -> Option<u32> {
        Some(VERSION)
    }

    fn transform(
        &self,
        mut file: SourceFile,
        ctx: &mut TransformContext<'_>,
    ) -> Result<SourceFile, TransformError> {
        if ctx.options.paths.is_empty() {
            return Ok(file);
        }
        let containing_dir = ctx.file_name.parent().unwrap_or_else(|| Path::new("/"));

        for statement in &mut file.statements {
            let rewrites: Vec<(usize, String)> = {
                let tokens = statement.tokens();
                let mut rewrites = Vec::new();
                for (index, token) in tokens.iter().enumerate() {
                    if token.kind != TokenKind::String || !is_specifier_position(&tokens, index) {
                        continue;
                    }
                    let Some(specifier) = token.string_value() else {
                        continue;
                    };
                    if !ctx.options.paths.keys().any(|p| matches_pattern(p, specifier)) {
                        continue;
                    }
                    let Some(resolved) = ctx.host.resolve_module_name(specifier, ctx.file_name)
                    else {
                        continue;
                    };
                    if resolved.is_external_library_import {
                        continue;
                    }
                    let replacement =
                        relative_specifier(containing_dir, &resolved.resolved_file_name);
                    debug!(
                        from = specifier,
                        to = %replacement,
                        file = %ctx.file_name.display(),
                        "Rewriting mapped import"
                    );
                    rewrites.push((index, replacement));
                }
                rewrites
            };

            if rewrites.is_empty() {
                continue;
            }
            let mut tokens = statement.tokens_mut();
            for (index, replacement) in rewrites {
                if let Some(token) = tokens.get_mut(index) {
                    token.set_string_value(&replacement);
                }
            }
        }

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
    use std::path::PathBuf;
    use std::sync::Arc;

    fn rewrite(source: &str) -> String {
        let fs = Arc::new(MockFileSystem::new());
        fs.add_file("/p/src/utils/strings.ts", "");
        fs.add_file("/p/src/data.json", "{}");
        fs.add_file("/p/node_modules/@app/ext/index.d.ts", "");

        let mut options = CompilerOptions {
            base_url: Some(PathBuf::from("/p")),
            resolve_json_module: true,
            ..Default::default()
        };
        options
            .paths
            .insert("@/*".to_string(), vec!["src/*".to_string()]);
        options.paths.insert(
            "@app/*".to_string(),
            vec!["node_modules/@app/*".to_string()],
        );

        let file_name = Path::new("/p/src/feature/a.ts");
        let mut host = StandaloneHost::new(
            file_name.to_path_buf(),
            source.to_string(),
            options.clone(),
            fs,
        );
        let mut ctx = TransformContext {
            file_name,
            options: &options,
            host: &mut host,
        };
        let file = SourceFile::parse(file_name, source);
        print(&PathMapping::new().transform(file, &mut ctx).unwrap(), None)
    }

    #[test]
    fn test_rewrites_all_specifier_positions() {
        let out = rewrite(indoc! {r#"
            import { upper } from '@/utils/strings';
            export * from "@/utils/strings";
            const s = require('@/utils/strings');
            const lazy = import('@/utils/strings');
            jest.mock('@/utils/strings');
            import data from '@/data.json';
        "#});

        assert_eq!(
            out,
            indoc! {r#"
                import { upper } from '../utils/strings';
                export * from "../utils/strings";
                const s = require('../utils/strings');
                const lazy = import('../utils/strings');
                jest.mock('../utils/strings');
                import data from '../data.json';
            "#}
        );
    }

    #[test]
    fn test_leaves_other_strings_alone() {
        let source = indoc! {r#"
            import x from './local';
            const label = '@/utils/strings';
            log('@/utils/strings');
            import ext from '@app/ext';
            import missing from '@/nope';
        "#};
        assert_eq!(rewrite(source), source);
    }

    #[test]
    fn test_relative_specifier() {
        assert_eq!(
            relative_specifier(Path::new("/p/src"), Path::new("/p/src/a/b.tsx")),
            "./a/b"
        );
        assert_eq!(
            relative_specifier(Path::new("/p/src/x"), Path::new("/p/types/t.d.ts")),
            "../../types/t"
        );
    }
}
