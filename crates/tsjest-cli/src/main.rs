use anyhow::Context;
use clap::Parser;
use rustc_hash::FxHashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};
use tsjest_core::config::TsJestConfig;
use tsjest_core::config_set::ConfigSet;
use tsjest_core::di::Container;
use tsjest_core::diagnostics::LoggingDiagnosticHandler;
use tsjest_core::file_kind::{is_declaration_file, is_script_file, is_source_file};
use tsjest_core::fs::{absolutize, normalize_path};
use tsjest_core::transformer::{TransformOptions, TsJestTransformer};
use walkdir::WalkDir;

/// Configuration files looked up in the working directory when `--config`
/// is not given
const CONFIG_FILE_NAMES: &[&str] = &[
    "tsjest.config.json",
    "tsjest.config.yaml",
    "tsjest.config.yml",
];

const DEFAULT_CACHE_DIR: &str = ".tsjest-cache";

/// Directories never entered when expanding a directory argument
const SKIPPED_DIRS: &[&str] = &["node_modules", ".git", DEFAULT_CACHE_DIR];

/// Quiet period after a file event before rebuilding
const DEBOUNCE: Duration = Duration::from_millis(100);

/// tsjest - TypeScript to JavaScript transformer for test runners
#[derive(Parser, Debug, Clone)]
#[command(name = "tsjest")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Files or directories to transform (defaults to the tsconfig's files)
    #[arg(value_name = "PATHS")]
    paths: Vec<PathBuf>,

    /// Path to a tsjest.config.json or tsjest.config.yaml file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Write outputs under this directory instead of printing them
    #[arg(long, value_name = "DIR")]
    out_dir: Option<PathBuf>,

    /// Cache directory for artifacts and the dependency graph
    #[arg(long, value_name = "DIR")]
    cache_dir: Option<PathBuf>,

    /// Neither read nor write the artifact cache
    #[arg(long)]
    no_cache: bool,

    /// Mark outputs as instrumented for coverage
    #[arg(long)]
    instrument: bool,

    /// Emit ES modules when the configuration enables them
    #[arg(long)]
    esm: bool,

    /// Transpile each file on its own, without type checking
    #[arg(long)]
    isolated_modules: bool,

    /// Rebuild changed files and their dependents
    #[arg(short, long)]
    watch: bool,
}

fn main() -> anyhow::Result<()> {
    tsjest_core::logging::init(tracing::Level::INFO);

    let cli = Cli::parse();
    let cwd = std::env::current_dir().context("cannot read the working directory")?;

    let container = load_container(&cli, &cwd)?;
    let files = collect_inputs(&cli.paths, &cwd, container.config())?;
    if files.is_empty() {
        eprintln!("Error: No input files found. Use --help for usage information.");
        std::process::exit(1);
    }

    let mut build = Build::new(&cli, &container, &cwd);
    let failures = build.run(&files);

    if cli.watch {
        let root = container.config().root_dir().to_path_buf();
        return watch(&mut build, &files, &root);
    }
    if failures > 0 {
        std::process::exit(1);
    }
    Ok(())
}

/// Locate and parse the configuration file. Returns it with the directory
/// its relative paths resolve against.
fn load_config(cli: &Cli, cwd: &Path) -> anyhow::Result<(TsJestConfig, PathBuf)> {
    let path = match &cli.config {
        Some(path) => Some(absolutize(path, cwd)),
        None => CONFIG_FILE_NAMES
            .iter()
            .map(|name| cwd.join(name))
            .find(|path| path.is_file()),
    };

    let Some(path) = path else {
        debug!("No configuration file, using defaults");
        return Ok((TsJestConfig::default(), cwd.to_path_buf()));
    };
    let config = TsJestConfig::from_file(&path)?;
    let base_dir = path
        .parent()
        .map_or_else(|| cwd.to_path_buf(), Path::to_path_buf);
    info!(config = %path.display(), "Loaded configuration");
    Ok((config, base_dir))
}

/// Apply command line overrides and resolve the configuration
fn load_container(cli: &Cli, cwd: &Path) -> anyhow::Result<Container> {
    let (mut config, base_dir) = load_config(cli, cwd)?;

    if cli.isolated_modules {
        config.isolated_modules = true;
    }
    if cli.esm {
        config.use_esm = true;
    }
    if cli.no_cache {
        config.cache_directory = None;
    } else if let Some(dir) = &cli.cache_dir {
        config.cache_directory = Some(absolutize(dir, cwd));
    } else if config.cache_directory.is_none() {
        config.cache_directory = Some(PathBuf::from(DEFAULT_CACHE_DIR));
    }

    let config_set = ConfigSet::from_config(config, &base_dir, &LoggingDiagnosticHandler::new())?;
    Ok(Container::new(config_set))
}

fn is_skipped_dir(entry: &walkdir::DirEntry) -> bool {
    entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| SKIPPED_DIRS.contains(&name))
}

/// Whether a file found by directory expansion should be transformed
fn is_input(path: &Path, config: &ConfigSet) -> bool {
    if is_declaration_file(path) {
        return false;
    }
    is_source_file(path)
        || (config.compiler_options().allow_js && is_script_file(path))
        || config.is_stringify(path)
}

/// Expand the command line paths into the list of files to transform.
/// Explicit files are always kept; directories contribute their inputs.
fn collect_inputs(paths: &[PathBuf], cwd: &Path, config: &ConfigSet) -> anyhow::Result<Vec<PathBuf>> {
    if paths.is_empty() {
        return Ok(config
            .file_names()
            .iter()
            .filter(|path| is_input(path, config))
            .cloned()
            .collect());
    }

    let mut seen = FxHashSet::default();
    let mut files = Vec::new();
    for path in paths {
        let path = normalize_path(&absolutize(path, cwd));
        if path.is_dir() {
            let walker = WalkDir::new(&path)
                .sort_by_file_name()
                .into_iter()
                .filter_entry(|entry| entry.depth() == 0 || !is_skipped_dir(entry));
            for entry in walker {
                let entry = entry?;
                if entry.file_type().is_file() && is_input(entry.path(), config) {
                    let file = normalize_path(entry.path());
                    if seen.insert(file.clone()) {
                        files.push(file);
                    }
                }
            }
        } else if path.is_file() {
            if seen.insert(path.clone()) {
                files.push(path);
            }
        } else {
            anyhow::bail!("{}: no such file or directory", path.display());
        }
    }
    Ok(files)
}

/// Output path of `file` relative to the output directory
fn output_name(file: &Path, root: &Path) -> PathBuf {
    let relative = file.strip_prefix(root).map_or_else(
        |_| PathBuf::from(file.file_name().unwrap_or_default()),
        Path::to_path_buf,
    );
    let extension = match relative.extension().and_then(|e| e.to_str()) {
        Some("mts" | "mjs") => "mjs",
        Some("cts" | "cjs") => "cjs",
        Some("ts" | "tsx" | "js" | "jsx") => "js",
        _ => {
            let mut name = relative.into_os_string();
            name.push(".js");
            return PathBuf::from(name);
        }
    };
    relative.with_extension(extension)
}

fn write_file(path: &Path, content: &str) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content).with_context(|| format!("failed to write {}", path.display()))
}

/// How a file's output was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Served {
    Cache,
    Compiled,
}

/// One transformer with its options and output locations, reused across
/// watch rebuilds
struct Build {
    transformer: TsJestTransformer,
    options: TransformOptions,
    artifacts: Option<PathBuf>,
    out_dir: Option<PathBuf>,
    root: PathBuf,
}

impl Build {
    fn new(cli: &Cli, container: &Container, cwd: &Path) -> Self {
        let config = container.config();
        Self {
            transformer: container.transformer(),
            options: TransformOptions {
                instrument: cli.instrument,
                supports_static_esm: cli.esm,
                ..container.transform_options()
            },
            artifacts: config.cache_dir().map(|dir| dir.join("artifacts")),
            out_dir: cli.out_dir.as_deref().map(|dir| absolutize(dir, cwd)),
            root: config.root_dir().to_path_buf(),
        }
    }

    /// Transform every file, reporting failures as they happen. Returns the
    /// number of files that failed.
    fn run(&mut self, files: &[PathBuf]) -> usize {
        let mut failures = 0;
        let mut from_cache = 0;
        for file in files {
            match self.build_file(file) {
                Ok(Served::Cache) => from_cache += 1,
                Ok(Served::Compiled) => {}
                Err(error) => {
                    failures += 1;
                    eprintln!("Error transforming {}:\n{}", file.display(), error);
                }
            }
        }
        info!(files = files.len(), from_cache, failures, "Build finished");
        failures
    }

    fn build_file(&mut self, file: &Path) -> anyhow::Result<Served> {
        let source = std::fs::read_to_string(file)?;
        let key = self.transformer.get_cache_key(&source, file, &self.options)?;
        let artifact = self
            .artifacts
            .as_ref()
            .map(|dir| dir.join(format!("{key}.js")));

        if let Some(code) = artifact
            .as_deref()
            .and_then(|path| std::fs::read_to_string(path).ok())
        {
            debug!(file = %file.display(), key = %key, "Cache hit");
            self.emit(file, &code)?;
            return Ok(Served::Cache);
        }

        let output = self.transformer.process(&source, file, &self.options)?;
        if let Some(path) = &artifact {
            write_file(path, &output.code)?;
        }
        self.emit(file, &output.code)?;
        Ok(Served::Compiled)
    }

    fn emit(&self, file: &Path, code: &str) -> anyhow::Result<()> {
        match &self.out_dir {
            Some(out_dir) => {
                let path = out_dir.join(output_name(file, &self.root));
                write_file(&path, code)?;
                debug!(output = %path.display(), "Wrote output");
            }
            None => {
                let mut stdout = std::io::stdout().lock();
                writeln!(stdout, "// {}", output_name(file, &self.root).display())?;
                writeln!(stdout, "{}", code.trim_end())?;
            }
        }
        Ok(())
    }
}

/// Record the tracked files touched by `event`
fn collect_changes(event: notify::Event, tracked: &FxHashSet<PathBuf>, changed: &mut FxHashSet<PathBuf>) {
    use notify::EventKind;

    if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
        return;
    }
    for path in event.paths {
        let path = normalize_path(&path);
        if tracked.contains(&path) {
            changed.insert(path);
        }
    }
}

/// Rebuild changed files and everything that depends on them until the
/// watcher goes away
fn watch(build: &mut Build, files: &[PathBuf], root: &Path) -> anyhow::Result<()> {
    use notify::{Event, RecursiveMode, Watcher};
    use std::sync::mpsc::channel;

    let (tx, rx) = channel();
    let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
        if let Ok(event) = res {
            let _ = tx.send(event);
        }
    })?;
    watcher.watch(root, RecursiveMode::Recursive)?;

    build.options.watch_mode = true;
    let tracked: FxHashSet<PathBuf> = files.iter().cloned().collect();
    println!("Watching for changes... (Press Ctrl+C to stop)");

    loop {
        let Ok(event) = rx.recv() else {
            anyhow::bail!("File watcher disconnected");
        };
        let mut changed = FxHashSet::default();
        collect_changes(event, &tracked, &mut changed);
        while let Ok(event) = rx.recv_timeout(DEBOUNCE) {
            collect_changes(event, &tracked, &mut changed);
        }
        if changed.is_empty() {
            continue;
        }

        let mut changed: Vec<PathBuf> = changed.into_iter().collect();
        changed.sort();
        let mut targets = changed.clone();
        for stale in build.transformer.stale_files(&build.options.config, &changed) {
            if tracked.contains(&stale) && !targets.contains(&stale) {
                targets.push(stale);
            }
        }

        info!(changed = changed.len(), rebuilding = targets.len(), "Files changed");
        build.run(&targets);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_name_maps_extensions() {
        let root = Path::new("/p");
        assert_eq!(output_name(Path::new("/p/src/a.ts"), root), PathBuf::from("src/a.js"));
        assert_eq!(output_name(Path::new("/p/b.mts"), root), PathBuf::from("b.mjs"));
        assert_eq!(output_name(Path::new("/p/c.cts"), root), PathBuf::from("c.cjs"));
        assert_eq!(output_name(Path::new("/p/v.html"), root), PathBuf::from("v.html.js"));
        assert_eq!(output_name(Path::new("/elsewhere/d.tsx"), root), PathBuf::from("d.js"));
    }

    #[test]
    fn test_cli_parses_flags() {
        let cli = Cli::parse_from([
            "tsjest",
            "src",
            "--out-dir",
            "dist",
            "--isolated-modules",
            "--no-cache",
            "-w",
        ]);
        assert_eq!(cli.paths, vec![PathBuf::from("src")]);
        assert_eq!(cli.out_dir, Some(PathBuf::from("dist")));
        assert!(cli.isolated_modules && cli.no_cache && cli.watch);
        assert!(!cli.esm && !cli.instrument);
    }
}
