use rustc_hash::{FxHashMap, FxHashSet};
use std::path::{Path, PathBuf};

/// Content and version of one file known to a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub content: String,
    pub version: u64,
}

/// Per-session file state: what each file looked like last time, and a
/// project version bumped whenever that may change compiled output.
///
/// Records are never removed during a session.
#[derive(Debug, Default)]
pub struct MemoryCache {
    files: FxHashMap<PathBuf, FileRecord>,
    root_files: FxHashSet<PathBuf>,
    project_version: u64,
}

impl MemoryCache {
    pub fn new(root_files: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            files: FxHashMap::default(),
            root_files: root_files.into_iter().collect(),
            project_version: 1,
        }
    }

    /// Record `content` for a file handed to the session. Returns whether the
    /// project version moved.
    ///
    /// A new file or a content change bumps the file and project versions.
    /// A file outside the discovered root set bumps the project version on
    /// every call, since the program has to pick it up again.
    pub fn update(&mut self, path: &Path, content: &str) -> bool {
        let mut bump = !self.root_files.contains(path);

        match self.files.get_mut(path) {
            Some(record) if record.content == content => {}
            Some(record) => {
                record.content = content.to_string();
                record.version += 1;
                bump = true;
            }
            None => {
                self.files.insert(
                    path.to_path_buf(),
                    FileRecord {
                        content: content.to_string(),
                        version: 1,
                    },
                );
                bump = true;
            }
        }

        if bump {
            self.bump_project_version();
        }
        bump
    }

    /// Remember a file the compiler read on its own. Known files keep their
    /// record; the project version is left alone.
    pub fn load(&mut self, path: &Path, content: String) -> &str {
        &self
            .files
            .entry(path.to_path_buf())
            .or_insert(FileRecord {
                content,
                version: 1,
            })
            .content
    }

    pub fn content(&self, path: &Path) -> Option<&str> {
        self.files.get(path).map(|record| record.content.as_str())
    }

    pub fn version(&self, path: &Path) -> Option<u64> {
        self.files.get(path).map(|record| record.version)
    }

    pub fn bump_project_version(&mut self) {
        self.project_version += 1;
    }

    pub fn project_version(&self) -> u64 {
        self.project_version
    }

    pub fn is_root(&self, path: &Path) -> bool {
        self.root_files.contains(path)
    }

    /// Every file with a record, sorted
    pub fn file_names(&self) -> Vec<PathBuf> {
        let mut names: Vec<PathBuf> = self.files.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
