use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

const SEPARATOR: &[u8] = b"\0";

/// Everything an artifact cache key is made of
#[derive(Debug, Clone)]
pub struct CacheKeyInputs<'a> {
    pub config_digest: &'a str,
    pub root_dir: &'a Path,
    pub file_path: &'a Path,
    pub file_content: &'a str,
    pub instrument: bool,
    /// Module kind the output is emitted as
    pub module_kind: &'a str,
    /// Resolved dependencies with their modification time, `None` when the
    /// file is gone
    pub dependencies: Vec<(PathBuf, Option<SystemTime>)>,
}

impl CacheKeyInputs<'_> {
    /// 64 hex characters of blake3 over the NUL-separated inputs
    pub fn digest(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        let instrument = if self.instrument {
            "instrument:on"
        } else {
            "instrument:off"
        };

        let module = format!("module:{}", self.module_kind);

        let parts: [&[u8]; 6] = [
            self.config_digest.as_bytes(),
            self.root_dir.as_os_str().as_encoded_bytes(),
            instrument.as_bytes(),
            module.as_bytes(),
            self.file_content.as_bytes(),
            self.file_path.as_os_str().as_encoded_bytes(),
        ];
        for (i, part) in parts.iter().enumerate() {
            if i > 0 {
                hasher.update(SEPARATOR);
            }
            hasher.update(part);
        }

        for (path, modified) in &self.dependencies {
            hasher.update(SEPARATOR);
            hasher.update(path.as_os_str().as_encoded_bytes());
            hasher.update(SEPARATOR);
            hasher.update(mtime_text(*modified).as_bytes());
        }

        hasher.finalize().to_hex().to_string()
    }
}

fn mtime_text(modified: Option<SystemTime>) -> String {
    match modified.and_then(|m| m.duration_since(UNIX_EPOCH).ok()) {
        Some(duration) => duration.as_millis().to_string(),
        None => "missing".to_string(),
    }
}
