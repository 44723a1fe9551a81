use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::{graph_file_name, DependencyGraph, Result, CACHE_DIR_NAME};

/// Reads and writes the dependency graph file of one configuration
#[derive(Debug, Clone)]
pub struct GraphStore {
    path: PathBuf,
    config_digest: String,
}

impl GraphStore {
    /// Store for `<cache_dir>/tsjest/deps-<digest>.bin`
    pub fn new(cache_dir: &Path, config_digest: &str) -> Self {
        Self {
            path: cache_dir
                .join(CACHE_DIR_NAME)
                .join(graph_file_name(config_digest)),
            config_digest: config_digest.to_string(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn try_load(&self) -> Result<DependencyGraph> {
        let bytes = std::fs::read(&self.path)?;
        DependencyGraph::from_bytes(&bytes, &self.config_digest)
    }

    /// Load the graph; a missing, unreadable or corrupted file yields an
    /// empty graph
    pub fn load(&self) -> DependencyGraph {
        if !self.path.exists() {
            debug!("No dependency graph at {}", self.path.display());
            return DependencyGraph::new(self.config_digest.clone());
        }

        match self.try_load() {
            Ok(graph) => {
                info!(
                    "Loaded dependency graph with {} entries from {}",
                    graph.len(),
                    self.path.display()
                );
                graph
            }
            Err(e) => {
                warn!(
                    "Discarding dependency graph {}: {}",
                    self.path.display(),
                    e
                );
                DependencyGraph::new(self.config_digest.clone())
            }
        }
    }

    /// Write to a temporary sibling, then rename over the graph file
    pub fn try_persist(&self, graph: &DependencyGraph) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let bytes = graph.to_bytes()?;
        let tmp = self
            .path
            .with_extension(format!("bin.{}.tmp", std::process::id()));
        std::fs::write(&tmp, &bytes)?;
        if let Err(e) = std::fs::rename(&tmp, &self.path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(e.into());
        }
        debug!(
            "Saved dependency graph with {} entries to {}",
            graph.len(),
            self.path.display()
        );
        Ok(())
    }

    /// Persist, logging instead of failing
    pub fn persist(&self, graph: &DependencyGraph) {
        if let Err(e) = self.try_persist(graph) {
            warn!(
                "Failed to write dependency graph {}: {}",
                self.path.display(),
                e
            );
        }
    }
}
