use rustc_hash::{FxHashMap, FxHashSet};
use std::path::{Path, PathBuf};

use super::DependencyGraph;

/// Answers "who depends on this file" over a dependency graph
pub struct InvalidationEngine<'a> {
    graph: &'a DependencyGraph,
}

impl<'a> InvalidationEngine<'a> {
    pub fn new(graph: &'a DependencyGraph) -> Self {
        Self { graph }
    }

    /// Files whose recorded imports include `path`
    pub fn direct_dependents(&self, path: &Path) -> Vec<PathBuf> {
        self.graph.dependents_of(path)
    }

    /// The changed files plus everything that transitively depends on them
    pub fn compute_stale_modules(&self, changed_files: &[PathBuf]) -> FxHashSet<PathBuf> {
        let mut stale: FxHashSet<PathBuf> = changed_files.iter().cloned().collect();

        let mut reverse_deps: FxHashMap<&Path, Vec<&Path>> = FxHashMap::default();
        for (module_path, entry) in self.graph.iter() {
            for dep in &entry.resolved_module_names {
                reverse_deps
                    .entry(dep.as_path())
                    .or_default()
                    .push(module_path.as_path());
            }
        }

        let mut to_process: Vec<PathBuf> = changed_files.to_vec();
        while let Some(changed) = to_process.pop() {
            let Some(dependents) = reverse_deps.get(changed.as_path()) else {
                continue;
            };
            for dependent in dependents {
                if stale.insert(dependent.to_path_buf()) {
                    to_process.push(dependent.to_path_buf());
                }
            }
        }

        stale
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::DependencyGraphEntry;

    fn graph(edges: &[(&str, &[&str])]) -> DependencyGraph {
        let mut graph = DependencyGraph::new("test".to_string());
        for (file, deps) in edges {
            graph.insert(
                PathBuf::from(file),
                DependencyGraphEntry::new(
                    String::new(),
                    deps.iter().map(PathBuf::from).collect(),
                ),
            );
        }
        graph
    }

    #[test]
    fn test_simple_invalidation() {
        let graph = graph(&[("/test/a.ts", &[])]);
        let stale = InvalidationEngine::new(&graph)
            .compute_stale_modules(&[PathBuf::from("/test/a.ts")]);

        assert_eq!(stale.len(), 1);
        assert!(stale.contains(&PathBuf::from("/test/a.ts")));
    }

    #[test]
    fn test_transitive_invalidation() {
        let graph = graph(&[
            ("/test/c.ts", &[]),
            ("/test/b.ts", &["/test/c.ts"]),
            ("/test/a.ts", &["/test/b.ts"]),
        ]);
        let engine = InvalidationEngine::new(&graph);

        let stale = engine.compute_stale_modules(&[PathBuf::from("/test/c.ts")]);
        assert_eq!(stale.len(), 3, "All three modules should be stale");

        assert_eq!(
            engine.direct_dependents(Path::new("/test/c.ts")),
            vec![PathBuf::from("/test/b.ts")]
        );
    }

    #[test]
    fn test_partial_invalidation() {
        let graph = graph(&[("/test/a.ts", &[]), ("/test/b.ts", &[])]);
        let stale = InvalidationEngine::new(&graph)
            .compute_stale_modules(&[PathBuf::from("/test/a.ts")]);

        assert!(!stale.contains(&PathBuf::from("/test/b.ts")));
    }

    #[test]
    fn test_cycles_terminate() {
        let graph = graph(&[("/test/a.ts", &["/test/b.ts"]), ("/test/b.ts", &["/test/a.ts"])]);
        let stale = InvalidationEngine::new(&graph)
            .compute_stale_modules(&[PathBuf::from("/test/a.ts")]);

        assert_eq!(stale.len(), 2);
    }
}
