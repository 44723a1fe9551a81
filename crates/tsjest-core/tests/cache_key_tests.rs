use serde_json::json;
use std::fs::File;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tsjest_core::config_set::ConfigSet;
use tsjest_core::diagnostics::CollectingDiagnosticHandler;
use tsjest_core::transformer::{TransformOptions, TsJestTransformer};
use tsjest_test_helpers::fixtures::{self, TestProject};

const A: &str = "src/a.ts";
const B: &str = "src/b.ts";

fn load(project: &TestProject, config: serde_json::Value) -> Arc<ConfigSet> {
    let path = project.jest_config(config);
    Arc::new(ConfigSet::from_file(&path, &CollectingDiagnosticHandler::new()).unwrap())
}

fn project() -> (TestProject, Arc<ConfigSet>) {
    let project = TestProject::new();
    project.tsconfig(json!({ "compilerOptions": {}, "include": ["src"] }));
    project.write(A, fixtures::simple_module());
    project.write(B, fixtures::importing_module());
    let config = load(&project, json!({ "cacheDirectory": ".cache" }));
    (project, config)
}

fn transformer() -> TsJestTransformer {
    TsJestTransformer::new(Arc::new(CollectingDiagnosticHandler::new()))
}

fn touch_later(path: &std::path::Path, seconds: u64) {
    File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(SystemTime::now() + Duration::from_secs(seconds))
        .unwrap();
}

#[test]
fn test_key_is_stable_across_transformers() {
    let (project, config) = project();
    let options = TransformOptions::new(config);
    let b = project.path(B);

    let key = transformer()
        .get_cache_key(fixtures::importing_module(), &b, &options)
        .unwrap();
    let again = transformer()
        .get_cache_key(fixtures::importing_module(), &b, &options)
        .unwrap();

    assert_eq!(key.len(), 64);
    assert_eq!(key, again);
}

#[test]
fn test_dependency_mtime_changes_key() {
    let (project, config) = project();
    let options = TransformOptions::new(config);
    let b = project.path(B);
    let mut transformer = transformer();

    let before = transformer
        .get_cache_key(fixtures::importing_module(), &b, &options)
        .unwrap();
    touch_later(&project.path(A), 60);
    let after = transformer
        .get_cache_key(fixtures::importing_module(), &b, &options)
        .unwrap();

    assert_ne!(before, after);
}

#[test]
fn test_unrelated_mtime_keeps_key() {
    let (project, config) = project();
    project.write("src/unrelated.ts", "export const u = 1;\n");
    let options = TransformOptions::new(config);
    let b = project.path(B);
    let mut transformer = transformer();

    let before = transformer
        .get_cache_key(fixtures::importing_module(), &b, &options)
        .unwrap();
    touch_later(&project.path("src/unrelated.ts"), 60);
    let after = transformer
        .get_cache_key(fixtures::importing_module(), &b, &options)
        .unwrap();

    assert_eq!(before, after);
}

#[test]
fn test_configuration_changes_key() {
    let (project, config) = project();
    let isolated = load(
        &project,
        json!({ "cacheDirectory": ".cache", "isolatedModules": true }),
    );
    let b = project.path(B);
    let mut transformer = transformer();

    let tracked = transformer
        .get_cache_key(fixtures::importing_module(), &b, &TransformOptions::new(config))
        .unwrap();
    let untracked = transformer
        .get_cache_key(fixtures::importing_module(), &b, &TransformOptions::new(isolated))
        .unwrap();

    assert_ne!(tracked, untracked);
    assert_eq!(transformer.session_count(), 2);
}

#[test]
fn test_graph_is_persisted_and_reloaded() {
    let (project, config) = project();
    let options = TransformOptions::new(config.clone());
    let b = project.path(B);

    transformer()
        .get_cache_key(fixtures::importing_module(), &b, &options)
        .unwrap();

    let store = config.graph_store().unwrap();
    assert!(store.path().exists());
    let graph = store.try_load().unwrap();
    let entry = graph.get(&b).unwrap();
    assert_eq!(entry.file_content, fixtures::importing_module());
    assert_eq!(entry.resolved_module_names, vec![project.path(A)]);
}

#[test]
fn test_corrupt_graph_is_rebuilt() {
    let (project, config) = project();
    let options = TransformOptions::new(config.clone());
    let b = project.path(B);

    let key = transformer()
        .get_cache_key(fixtures::importing_module(), &b, &options)
        .unwrap();

    let store = config.graph_store().unwrap();
    std::fs::write(store.path(), b"definitely not bincode").unwrap();

    let recovered = transformer()
        .get_cache_key(fixtures::importing_module(), &b, &options)
        .unwrap();
    assert_eq!(key, recovered);
    assert!(store.try_load().is_ok());
}

#[test]
fn test_process_after_cache_key_compiles() {
    let (project, config) = project();
    let options = TransformOptions::new(config);
    let b = project.path(B);
    let mut transformer = transformer();

    transformer
        .get_cache_key(fixtures::importing_module(), &b, &options)
        .unwrap();
    let out = transformer
        .process(fixtures::importing_module(), &b, &options)
        .unwrap();

    assert!(out.code.contains("require(\"./a\")"));
    assert!(out.code.contains("exports.doubled = doubled;"));
    assert_eq!(transformer.session_count(), 1);
}

#[test]
fn test_module_kind_changes_key() {
    let (project, _) = project();
    let config = load(&project, json!({ "cacheDirectory": ".cache", "useESM": true }));
    let a = project.path(A);
    let mut transformer = transformer();

    let commonjs = TransformOptions::new(config.clone());
    let esm = TransformOptions {
        supports_static_esm: true,
        ..TransformOptions::new(config)
    };

    let commonjs_key = transformer
        .get_cache_key(fixtures::simple_module(), &a, &commonjs)
        .unwrap();
    let esm_key = transformer
        .get_cache_key(fixtures::simple_module(), &a, &esm)
        .unwrap();
    assert_ne!(commonjs_key, esm_key);

    let commonjs_out = transformer
        .process(fixtures::simple_module(), &a, &commonjs)
        .unwrap();
    let esm_out = transformer
        .process(fixtures::simple_module(), &a, &esm)
        .unwrap();
    assert!(commonjs_out.code.contains("exports.value = value;"));
    assert!(esm_out.code.starts_with("export const value = 1;"));
}
