use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn tsjest_cmd() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("tsjest"))
}

fn write(dir: &Path, relative: &str, content: &str) {
    let path = dir.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

/// A project with a tsconfig including `src`, and two modules importing each other
fn project() -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    write(
        temp_dir.path(),
        "tsconfig.json",
        r#"{ "compilerOptions": {}, "include": ["src"] }"#,
    );
    write(temp_dir.path(), "src/a.ts", "export const value = 1;\n");
    write(
        temp_dir.path(),
        "src/b.ts",
        "import { value } from './a';\nexport const doubled = value * 2;\n",
    );
    temp_dir
}

// ============================================================================
// OUTPUT TESTS
// ============================================================================

#[test]
fn test_single_file_to_stdout() {
    let temp_dir = project();

    tsjest_cmd()
        .current_dir(&temp_dir)
        .arg("src/a.ts")
        .arg("--no-cache")
        .assert()
        .success()
        .stdout(predicate::str::contains("// src/a.js"))
        .stdout(predicate::str::contains("exports.value = value;"))
        .stdout(predicate::str::contains("sourceMappingURL=data:application/json"));
}

#[test]
fn test_directory_to_out_dir() {
    let temp_dir = project();
    write(temp_dir.path(), "src/types.d.ts", "export type Id = string;\n");

    tsjest_cmd()
        .current_dir(&temp_dir)
        .args(["src", "--out-dir", "dist", "--no-cache"])
        .assert()
        .success();

    let b = fs::read_to_string(temp_dir.path().join("dist/src/b.js")).unwrap();
    assert!(b.contains("require(\"./a\")"));
    assert!(temp_dir.path().join("dist/src/a.js").exists());
    assert!(!temp_dir.path().join("dist/src/types.d.js").exists());
}

#[test]
fn test_files_default_to_tsconfig() {
    let temp_dir = project();

    tsjest_cmd()
        .current_dir(&temp_dir)
        .args(["--out-dir", "dist", "--no-cache"])
        .assert()
        .success();

    assert!(temp_dir.path().join("dist/src/a.js").exists());
    assert!(temp_dir.path().join("dist/src/b.js").exists());
}

// ============================================================================
// FAILURE TESTS
// ============================================================================

#[test]
fn test_type_error_fails_but_other_files_are_written() {
    let temp_dir = project();
    write(
        temp_dir.path(),
        "src/c.ts",
        "import { helper } from './missing';\nexport const x = helper;\n",
    );

    tsjest_cmd()
        .current_dir(&temp_dir)
        .args(["src", "--out-dir", "dist", "--no-cache"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("TS2307"))
        .stderr(predicate::str::contains("c.ts"));

    assert!(temp_dir.path().join("dist/src/a.js").exists());
    assert!(!temp_dir.path().join("dist/src/c.js").exists());
}

#[test]
fn test_isolated_modules_skip_type_errors() {
    let temp_dir = project();
    write(
        temp_dir.path(),
        "src/c.ts",
        "import { helper } from './missing';\nexport const x = helper;\n",
    );

    tsjest_cmd()
        .current_dir(&temp_dir)
        .args(["src/c.ts", "--isolated-modules", "--no-cache"])
        .assert()
        .success()
        .stdout(predicate::str::contains("require(\"./missing\")"));
}

#[test]
fn test_missing_path_fails() {
    let temp_dir = project();

    tsjest_cmd()
        .current_dir(&temp_dir)
        .arg("src/nope.ts")
        .assert()
        .failure()
        .stderr(predicate::str::contains("no such file or directory"));
}

#[test]
fn test_invalid_config_fails() {
    let temp_dir = project();
    write(temp_dir.path(), "tsjest.config.json", "{ not json");

    tsjest_cmd()
        .current_dir(&temp_dir)
        .arg("src/a.ts")
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to parse configuration file"));
}

// ============================================================================
// CONFIGURATION AND CACHE TESTS
// ============================================================================

#[test]
fn test_yaml_config_with_stringify() {
    let temp_dir = project();
    write(temp_dir.path(), "src/view.html", "<b>hi</b>");
    write(
        temp_dir.path(),
        "jest/tsjest.config.yaml",
        "rootDir: ..\nstringifyContentPathRegex: \"\\\\.html$\"\n",
    );

    tsjest_cmd()
        .current_dir(&temp_dir)
        .args(["src", "--config", "jest/tsjest.config.yaml", "--no-cache"])
        .args(["--out-dir", "dist"])
        .assert()
        .success();

    let view = fs::read_to_string(temp_dir.path().join("dist/src/view.html.js")).unwrap();
    assert_eq!(view, "module.exports=\"<b>hi</b>\"");
}

#[test]
fn test_artifacts_are_cached_and_reused() {
    let temp_dir = project();

    let first = tsjest_cmd()
        .current_dir(&temp_dir)
        .args(["src/b.ts", "--cache-dir", "cache"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let artifacts: Vec<_> = fs::read_dir(temp_dir.path().join("cache/artifacts"))
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect();
    assert_eq!(artifacts.len(), 1);
    assert_eq!(artifacts[0].extension().unwrap(), "js");
    let graphs = fs::read_dir(temp_dir.path().join("cache/tsjest")).unwrap().count();
    assert_eq!(graphs, 1);

    tsjest_cmd()
        .current_dir(&temp_dir)
        .args(["src/b.ts", "--cache-dir", "cache"])
        .assert()
        .success()
        .stdout(first);
}

#[test]
fn test_no_cache_writes_nothing() {
    let temp_dir = project();

    tsjest_cmd()
        .current_dir(&temp_dir)
        .args(["src/a.ts", "--no-cache"])
        .assert()
        .success();

    assert!(!temp_dir.path().join(".tsjest-cache").exists());
}
