//! Test fixtures - source snippets and on-disk projects

use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A module with one value export
pub fn simple_module() -> &'static str {
    "export const value = 1;\n"
}

/// A module importing `value` from `./a`
pub fn importing_module() -> &'static str {
    "import { value } from './a';\nexport const doubled = value * 2;\n"
}

/// A test file registering a mock below its imports
pub fn jest_test_file() -> &'static str {
    r#"import { render } from './render';
jest.mock('./render');
describe('render', () => {
    it('renders', () => {
        expect(render()).toBeUndefined();
    });
});
"#
}

pub fn type_only_module() -> &'static str {
    r#"import type { Options } from './options';
export interface Shape {
    size: number;
}
export type Id = string;
export const shape = 1;
"#
}

/// Programs with syntax errors
pub fn syntax_error_unterminated_string() -> &'static str {
    "const message = 'never closed;\n"
}

pub fn syntax_error_unbalanced_block() -> &'static str {
    "function broken() {\n    return 1;\n"
}

/// Programs with module errors
pub fn missing_module_import() -> &'static str {
    "import { helper } from './does-not-exist';\nexport const x = helper;\n"
}

/// A temporary project directory, removed on drop
pub struct TestProject {
    dir: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("failed to create temp dir"),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.dir.path().join(relative)
    }

    /// Write a file, creating parent directories
    pub fn write(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.path(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("failed to create parent dir");
        }
        fs::write(&path, content).expect("failed to write file");
        path
    }

    pub fn read(&self, relative: &str) -> String {
        fs::read_to_string(self.path(relative)).expect("failed to read file")
    }

    /// Write `tsconfig.json` at the project root
    pub fn tsconfig(&self, config: Value) -> PathBuf {
        self.write("tsconfig.json", &config.to_string())
    }

    /// Write the transformer configuration file
    pub fn jest_config(&self, config: Value) -> PathBuf {
        self.write("tsjest.config.json", &config.to_string())
    }
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}
