//! Tracing subscriber setup shared by hosts.
//!
//! `RUST_LOG` filters the stderr output as usual. Setting `TSJEST_LOG` to a
//! file path additionally writes every event at debug level and above to that
//! file as JSON lines.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Environment variable naming the JSON log file
pub const LOG_FILE_ENV: &str = "TSJEST_LOG";

fn open_log_file(path: &Path) -> Option<File> {
    File::options().create(true).append(true).open(path).ok()
}

/// Install the global subscriber. Returns false when one was already set.
pub fn init(default_level: Level) -> bool {
    let stderr = fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_default_env().add_directive(default_level.into()));

    let json = std::env::var_os(LOG_FILE_ENV)
        .and_then(|path| open_log_file(Path::new(&path)))
        .map(|file| {
            fmt::layer()
                .json()
                .with_writer(Arc::new(file))
                .with_filter(LevelFilter::DEBUG)
        });

    tracing_subscriber::registry()
        .with(stderr)
        .with(json)
        .try_init()
        .is_ok()
}
