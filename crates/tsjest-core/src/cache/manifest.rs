use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::{CacheError, Result, CACHE_VERSION};

/// What a file looked like when its imports were last resolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyGraphEntry {
    /// Content the resolution below was computed from
    pub file_content: String,

    /// Absolute paths of resolved imports, first level then second level
    pub resolved_module_names: Vec<PathBuf>,
}

impl DependencyGraphEntry {
    pub fn new(file_content: String, resolved_module_names: Vec<PathBuf>) -> Self {
        Self {
            file_content,
            resolved_module_names,
        }
    }

    /// An entry only describes the file while its content is unchanged
    pub fn is_current(&self, content: &str) -> bool {
        self.file_content == content
    }
}

/// On-disk layout of the graph
#[derive(Serialize, Deserialize)]
struct GraphFile {
    version: u32,
    config_digest: String,
    entries: Vec<(PathBuf, DependencyGraphEntry)>,
}

/// File → dependencies map for one configuration, in insertion order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyGraph {
    config_digest: String,
    entries: IndexMap<PathBuf, DependencyGraphEntry>,
}

impl DependencyGraph {
    pub fn new(config_digest: String) -> Self {
        Self {
            config_digest,
            entries: IndexMap::new(),
        }
    }

    pub fn config_digest(&self) -> &str {
        &self.config_digest
    }

    pub fn get(&self, path: &Path) -> Option<&DependencyGraphEntry> {
        self.entries.get(path)
    }

    /// Add or overwrite the entry of `path`, keeping its original position
    pub fn insert(&mut self, path: PathBuf, entry: DependencyGraphEntry) {
        self.entries.insert(path, entry);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PathBuf, &DependencyGraphEntry)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Files whose resolved imports include `path`, in graph order
    pub fn dependents_of(&self, path: &Path) -> Vec<PathBuf> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.resolved_module_names.iter().any(|p| p == path))
            .map(|(file, _)| file.clone())
            .collect()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let file = GraphFile {
            version: CACHE_VERSION,
            config_digest: self.config_digest.clone(),
            entries: self
                .entries
                .iter()
                .map(|(path, entry)| (path.clone(), entry.clone()))
                .collect(),
        };
        bincode::serialize(&file).map_err(CacheError::from)
    }

    /// Decode a graph written for `expected_digest`
    pub fn from_bytes(bytes: &[u8], expected_digest: &str) -> Result<Self> {
        let file: GraphFile = bincode::deserialize(bytes)?;
        if file.version != CACHE_VERSION {
            return Err(CacheError::VersionMismatch {
                expected: CACHE_VERSION,
                found: file.version,
            });
        }
        if file.config_digest != expected_digest {
            return Err(CacheError::ConfigMismatch {
                expected: expected_digest.to_string(),
                found: file.config_digest,
            });
        }
        Ok(Self {
            config_digest: file.config_digest,
            entries: file.entries.into_iter().collect(),
        })
    }
}
