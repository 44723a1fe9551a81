use serde::Serialize;

/// Blake3 hex digest of a string
pub fn hash_content(content: &str) -> String {
    blake3::hash(content.as_bytes()).to_hex().to_string()
}

/// Hash a configuration value through its JSON form.
/// Any change in the serialized value changes the digest.
pub fn hash_config<T: Serialize>(config: &T) -> Result<String, serde_json::Error> {
    let json = serde_json::to_vec(config)?;
    Ok(blake3::hash(&json).to_hex().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompilerOptions;

    #[test]
    fn test_hash_content_consistency() {
        assert_eq!(hash_content("a"), hash_content("a"));
        assert_ne!(hash_content("a"), hash_content("b"));
        assert_eq!(hash_content("a").len(), 64);
    }

    #[test]
    fn test_hash_config_tracks_changes() {
        let config = CompilerOptions::default();
        let changed = CompilerOptions {
            allow_js: true,
            ..CompilerOptions::default()
        };

        assert_eq!(hash_config(&config).unwrap(), hash_config(&config).unwrap());
        assert_ne!(hash_config(&config).unwrap(), hash_config(&changed).unwrap());
    }
}
