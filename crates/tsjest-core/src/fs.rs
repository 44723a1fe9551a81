//! File system abstraction
//!
//! Everything the core reads from disk goes through [`FileSystem`], so tests
//! can run against an in-memory tree with controllable modification times.

use rustc_hash::FxHashMap;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, SystemTime};

pub trait FileSystem: Send + Sync {
    fn read_file(&self, path: &Path) -> io::Result<String>;

    fn file_exists(&self, path: &Path) -> bool;

    fn dir_exists(&self, path: &Path) -> bool;

    fn modified(&self, path: &Path) -> io::Result<SystemTime>;
}

/// Production file system backed by `std::fs`
#[derive(Debug, Default, Clone, Copy)]
pub struct RealFileSystem;

impl RealFileSystem {
    pub fn new() -> Self {
        Self
    }
}

impl FileSystem for RealFileSystem {
    fn read_file(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn file_exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn dir_exists(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn modified(&self, path: &Path) -> io::Result<SystemTime> {
        std::fs::metadata(path)?.modified()
    }
}

#[derive(Debug, Clone)]
struct MockFile {
    content: String,
    modified: SystemTime,
}

/// In-memory file system for tests
#[derive(Debug)]
pub struct MockFileSystem {
    files: Mutex<FxHashMap<PathBuf, MockFile>>,
    clock: Mutex<SystemTime>,
}

impl Default for MockFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self {
            files: Mutex::new(FxHashMap::default()),
            clock: Mutex::new(SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000)),
        }
    }

    fn tick(&self) -> SystemTime {
        let mut clock = self.clock.lock().unwrap_or_else(PoisonError::into_inner);
        *clock += Duration::from_millis(1);
        *clock
    }

    /// Add or replace a file; every write gets a fresh modification time
    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<String>) {
        let modified = self.tick();
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                normalize_path(path.as_ref()),
                MockFile {
                    content: content.into(),
                    modified,
                },
            );
    }

    /// Bump the modification time without touching the content
    pub fn touch(&self, path: impl AsRef<Path>) {
        let modified = self.tick();
        if let Some(file) = self
            .files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(&normalize_path(path.as_ref()))
        {
            file.modified = modified;
        }
    }

    pub fn remove_file(&self, path: impl AsRef<Path>) {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&normalize_path(path.as_ref()));
    }
}

impl FileSystem for MockFileSystem {
    fn read_file(&self, path: &Path) -> io::Result<String> {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&normalize_path(path))
            .map(|f| f.content.clone())
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.display().to_string()))
    }

    fn file_exists(&self, path: &Path) -> bool {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&normalize_path(path))
    }

    fn dir_exists(&self, path: &Path) -> bool {
        let dir = normalize_path(path);
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .any(|file| file.starts_with(&dir) && file != &dir)
    }

    fn modified(&self, path: &Path) -> io::Result<SystemTime> {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&normalize_path(path))
            .map(|f| f.modified)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.display().to_string()))
    }
}

/// Lexically normalize a path: drop `.` components and fold `..` into the
/// parent. Symlinks are not resolved.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Make `path` absolute against `base`, then normalize it
pub fn absolutize(path: &Path, base: &Path) -> PathBuf {
    if path.is_absolute() {
        normalize_path(path)
    } else {
        normalize_path(&base.join(path))
    }
}

/// Lexical path from `from_dir` to `to`, both absolute
pub fn relative_path(from_dir: &Path, to: &Path) -> PathBuf {
    let from = normalize_path(from_dir);
    let to = normalize_path(to);
    let from_parts: Vec<_> = from.components().collect();
    let to_parts: Vec<_> = to.components().collect();

    let common = from_parts
        .iter()
        .zip(&to_parts)
        .take_while(|(a, b)| a == b)
        .count();

    let mut out = PathBuf::new();
    for _ in common..from_parts.len() {
        out.push("..");
    }
    for part in &to_parts[common..] {
        out.push(part.as_os_str());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(
            normalize_path(Path::new("/a/b/./c/../d.ts")),
            PathBuf::from("/a/b/d.ts")
        );
        assert_eq!(normalize_path(Path::new("a/../../b")), PathBuf::from("../b"));
    }

    #[test]
    fn test_absolutize() {
        assert_eq!(
            absolutize(Path::new("./src/a.ts"), Path::new("/project")),
            PathBuf::from("/project/src/a.ts")
        );
        assert_eq!(
            absolutize(Path::new("/other/a.ts"), Path::new("/project")),
            PathBuf::from("/other/a.ts")
        );
    }

    #[test]
    fn test_mock_file_system() {
        let fs = MockFileSystem::new();
        fs.add_file("/project/src/a.ts", "export const a = 1");

        assert!(fs.file_exists(Path::new("/project/src/a.ts")));
        assert!(fs.file_exists(Path::new("/project/src/../src/a.ts")));
        assert!(fs.dir_exists(Path::new("/project/src")));
        assert!(!fs.dir_exists(Path::new("/project/lib")));
        assert_eq!(
            fs.read_file(Path::new("/project/src/a.ts")).unwrap(),
            "export const a = 1"
        );
    }

    #[test]
    fn test_mock_touch_changes_mtime() {
        let fs = MockFileSystem::new();
        fs.add_file("/a.ts", "x");
        let before = fs.modified(Path::new("/a.ts")).unwrap();

        fs.touch("/a.ts");
        let after = fs.modified(Path::new("/a.ts")).unwrap();

        assert!(after > before);
        assert_eq!(fs.read_file(Path::new("/a.ts")).unwrap(), "x");
    }

    #[test]
    fn test_mock_missing_file() {
        let fs = MockFileSystem::new();
        assert!(fs.read_file(Path::new("/nope.ts")).is_err());
        assert!(fs.modified(Path::new("/nope.ts")).is_err());
    }

    #[test]
    fn test_relative_path() {
        assert_eq!(
            relative_path(Path::new("/p/src/a"), Path::new("/p/src/lib/x.ts")),
            PathBuf::from("../lib/x.ts")
        );
        assert_eq!(
            relative_path(Path::new("/p/src"), Path::new("/p/src/x.ts")),
            PathBuf::from("x.ts")
        );
    }
}
