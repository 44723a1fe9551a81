//! Node-style module resolution with a per-options memoization cache

use crate::config::CompilerOptions;
use crate::fs::{absolutize, FileSystem};
use crate::memoize::Memoized;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResolvedModule {
    pub resolved_file_name: PathBuf,
    /// Located under a `node_modules` directory
    pub is_external_library_import: bool,
}

impl ResolvedModule {
    fn new(path: PathBuf) -> Self {
        let is_external_library_import = path
            .components()
            .any(|c| c == Component::Normal("node_modules".as_ref()));
        Self {
            resolved_file_name: path,
            is_external_library_import,
        }
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut s: OsString = path.as_os_str().to_owned();
    s.push(suffix);
    PathBuf::from(s)
}

fn is_relative_specifier(specifier: &str) -> bool {
    specifier == "."
        || specifier == ".."
        || specifier.starts_with("./")
        || specifier.starts_with("../")
}

struct Resolver<'a> {
    options: &'a CompilerOptions,
    fs: &'a dyn FileSystem,
}

impl Resolver<'_> {
    fn extensions(&self) -> Vec<&'static str> {
        let mut extensions = vec![".ts", ".tsx", ".d.ts"];
        if self.options.allow_js {
            extensions.extend([".js", ".jsx"]);
        }
        if self.options.resolve_json_module {
            extensions.push(".json");
        }
        extensions
    }

    fn is_supported(&self, path: &Path) -> bool {
        match path.extension().and_then(|e| e.to_str()) {
            Some("ts" | "tsx" | "mts" | "cts") => true,
            Some("js" | "jsx" | "mjs" | "cjs") => self.options.allow_js,
            Some("json") => self.options.resolve_json_module,
            _ => false,
        }
    }

    fn load_as_file(&self, path: &Path) -> Option<PathBuf> {
        if self.is_supported(path) && self.fs.file_exists(path) {
            return Some(path.to_path_buf());
        }

        // `./a.js` written in a TypeScript file refers to `./a.ts`
        let file_name = path.file_name()?.to_str()?;
        let rewrites: &[(&str, &[&str])] = &[
            (".js", &[".ts", ".tsx", ".d.ts"]),
            (".jsx", &[".tsx"]),
            (".mjs", &[".mts", ".d.mts"]),
            (".cjs", &[".cts", ".d.cts"]),
        ];
        for (from, to) in rewrites {
            if let Some(stem) = file_name.strip_suffix(from) {
                let stem = path.with_file_name(stem);
                for extension in *to {
                    let candidate = with_suffix(&stem, extension);
                    if self.fs.file_exists(&candidate) {
                        return Some(candidate);
                    }
                }
            }
        }

        self.extensions()
            .into_iter()
            .map(|extension| with_suffix(path, extension))
            .find(|candidate| self.fs.file_exists(candidate))
    }

    fn load_as_directory(&self, dir: &Path) -> Option<PathBuf> {
        let manifest = dir.join("package.json");
        if let Ok(content) = self.fs.read_file(&manifest) {
            if let Ok(package) = serde_json::from_str::<Value>(&content) {
                for field in ["types", "typings", "main"] {
                    let Some(entry) = package.get(field).and_then(Value::as_str) else {
                        continue;
                    };
                    let target = absolutize(Path::new(entry), dir);
                    if let Some(found) = self
                        .load_as_file(&target)
                        .or_else(|| self.load_index(&target))
                    {
                        return Some(found);
                    }
                }
            }
        }
        self.load_index(dir)
    }

    fn load_index(&self, dir: &Path) -> Option<PathBuf> {
        self.load_as_file(&dir.join("index"))
    }

    fn load(&self, path: &Path) -> Option<PathBuf> {
        self.load_as_file(path)
            .or_else(|| self.load_as_directory(path))
    }

    fn paths_base(&self) -> Option<&Path> {
        self.options
            .base_url
            .as_deref()
            .or(self.options.paths_base.as_deref())
    }

    /// Longest matching `paths` pattern wins; `*` captures the rest
    fn load_from_paths(&self, specifier: &str) -> Option<PathBuf> {
        let base = self.paths_base()?;
        let mut best: Option<(&String, &Vec<String>, String)> = None;

        for (pattern, targets) in &self.options.paths {
            let capture = match pattern.split_once('*') {
                None if pattern == specifier => String::new(),
                None => continue,
                Some((prefix, suffix)) => {
                    if specifier.len() < prefix.len() + suffix.len()
                        || !specifier.starts_with(prefix)
                        || !specifier.ends_with(suffix)
                    {
                        continue;
                    }
                    specifier[prefix.len()..specifier.len() - suffix.len()].to_string()
                }
            };
            let longer = best
                .as_ref()
                .map_or(true, |(current, _, _)| pattern.len() > current.len());
            if longer {
                best = Some((pattern, targets, capture));
            }
        }

        let (_, targets, capture) = best?;
        targets.iter().find_map(|target| {
            let substituted = target.replacen('*', &capture, 1);
            self.load(&absolutize(Path::new(&substituted), base))
        })
    }

    fn load_from_node_modules(&self, specifier: &str, containing_dir: &Path) -> Option<PathBuf> {
        let types_name = match specifier.strip_prefix('@') {
            Some(scoped) => scoped.replacen('/', "__", 1),
            None => specifier.to_string(),
        };

        for dir in containing_dir.ancestors() {
            if dir.file_name().is_some_and(|name| name == "node_modules") {
                continue;
            }
            let node_modules = dir.join("node_modules");
            if !self.fs.dir_exists(&node_modules) {
                continue;
            }
            if let Some(found) = self
                .load(&node_modules.join(specifier))
                .or_else(|| self.load(&node_modules.join("@types").join(&types_name)))
            {
                return Some(found);
            }
        }
        None
    }

    fn resolve(&self, specifier: &str, containing_file: &Path) -> Option<PathBuf> {
        let containing_dir = containing_file.parent().unwrap_or_else(|| Path::new("/"));

        if is_relative_specifier(specifier) || Path::new(specifier).is_absolute() {
            return self.load(&absolutize(Path::new(specifier), containing_dir));
        }

        if let Some(found) = self.load_from_paths(specifier) {
            return Some(found);
        }
        if let Some(base_url) = &self.options.base_url {
            if let Some(found) = self.load(&absolutize(Path::new(specifier), base_url)) {
                return Some(found);
            }
        }
        self.load_from_node_modules(specifier, containing_dir)
    }
}

/// Resolve `specifier` imported from `containing_file` the way Node and the
/// compiler do, without caching
pub fn resolve_module_name(
    specifier: &str,
    containing_file: &Path,
    options: &CompilerOptions,
    fs: &dyn FileSystem,
) -> Option<ResolvedModule> {
    Resolver { options, fs }
        .resolve(specifier, containing_file)
        .map(ResolvedModule::new)
}

/// Memoized resolution scoped to one compiler-options value.
///
/// The owner replaces the whole cache when the effective options change.
#[derive(Debug)]
pub struct ModuleResolutionCache {
    options: CompilerOptions,
    options_id: String,
    memo: Memoized<(String, PathBuf), Option<ResolvedModule>>,
}

impl ModuleResolutionCache {
    pub fn new(options: CompilerOptions, options_id: String) -> Self {
        debug!(options_id = %options_id, "Creating module resolution cache");
        Self {
            options,
            options_id,
            memo: Memoized::new(),
        }
    }

    pub fn options_id(&self) -> &str {
        &self.options_id
    }

    pub fn is_valid_for(&self, options_id: &str) -> bool {
        self.options_id == options_id
    }

    pub fn resolve(
        &mut self,
        specifier: &str,
        containing_file: &Path,
        fs: &dyn FileSystem,
    ) -> Option<ResolvedModule> {
        let options = &self.options;
        self.memo.get_or_compute(
            (specifier.to_string(), containing_file.to_path_buf()),
            || resolve_module_name(specifier, containing_file, options, fs),
        )
    }

    pub fn len(&self) -> usize {
        self.memo.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memo.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.memo.hits()
    }
}
