use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use tracing::debug;

const SOURCE_MAPPING_PREFIX: &str = "sourceMappingURL=";
const DATA_URI_PREFIX: &str = "data:application/json;charset=utf-8;base64,";

/// A source map builder following the Source Map v3 specification
/// https://sourcemaps.info/spec.html
#[derive(Debug)]
pub struct SourceMapBuilder {
    file: Option<String>,
    sources: Vec<String>,
    sources_content: Vec<Option<String>>,
    names: Vec<String>,
    mappings: Vec<Mapping>,
    generated_line: usize,
    generated_column: usize,
}

#[derive(Debug, Clone)]
struct Mapping {
    generated_line: usize,
    generated_column: usize,
    source_line: usize,
    source_column: usize,
    name_index: Option<usize>,
}

/// The JSON structure for source maps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMap {
    pub version: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_root: Option<String>,
    pub sources: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources_content: Vec<Option<String>>,
    #[serde(default)]
    pub names: Vec<String>,
    pub mappings: String,
}

impl SourceMapBuilder {
    pub fn new(source_file: String) -> Self {
        Self {
            file: None,
            sources: vec![source_file],
            sources_content: Vec::new(),
            names: Vec::new(),
            mappings: Vec::new(),
            generated_line: 0,
            generated_column: 0,
        }
    }

    pub fn set_file(&mut self, file: String) {
        self.file = Some(file);
    }

    pub fn add_source_content(&mut self, content: String) {
        self.sources_content.push(Some(content));
    }

    /// Map the current generated position to a 0-based source position
    pub fn add_mapping(&mut self, source_line: u32, source_column: u32, name: Option<&str>) {
        let name_index = name.map(|n| {
            if let Some(idx) = self.names.iter().position(|existing| existing == n) {
                idx
            } else {
                self.names.push(n.to_string());
                self.names.len() - 1
            }
        });

        self.mappings.push(Mapping {
            generated_line: self.generated_line,
            generated_column: self.generated_column,
            source_line: source_line as usize,
            source_column: source_column as usize,
            name_index,
        });
    }

    /// Advance the generated position by writing text
    pub fn advance(&mut self, text: &str) {
        for ch in text.chars() {
            if ch == '\n' {
                self.generated_line += 1;
                self.generated_column = 0;
            } else {
                self.generated_column += ch.len_utf16();
            }
        }
    }

    pub fn build(self) -> SourceMap {
        let mappings = self.encode_mappings();

        SourceMap {
            version: 3,
            file: self.file,
            source_root: None,
            sources: self.sources,
            sources_content: self.sources_content,
            names: self.names,
            mappings,
        }
    }

    /// Encode mappings using VLQ (Variable Length Quantity) encoding
    fn encode_mappings(&self) -> String {
        let mut result = String::new();
        let mut prev_generated_line = 0;
        let mut prev_generated_col = 0;
        let mut prev_source_line = 0;
        let mut prev_source_col = 0;
        let mut prev_name_index = 0;
        let mut first_in_line = true;

        for mapping in &self.mappings {
            while prev_generated_line < mapping.generated_line {
                result.push(';');
                prev_generated_line += 1;
                prev_generated_col = 0;
                first_in_line = true;
            }

            if !first_in_line {
                result.push(',');
            }
            first_in_line = false;

            // [generated_col, source_index, source_line, source_col, name_index], all deltas
            let generated_col_delta = mapping.generated_column as i32 - prev_generated_col as i32;
            result.push_str(&Self::encode_vlq(generated_col_delta));
            prev_generated_col = mapping.generated_column;

            // Single source, so the index delta is always zero
            result.push_str(&Self::encode_vlq(0));

            let source_line_delta = mapping.source_line as i32 - prev_source_line as i32;
            result.push_str(&Self::encode_vlq(source_line_delta));
            prev_source_line = mapping.source_line;

            let source_col_delta = mapping.source_column as i32 - prev_source_col as i32;
            result.push_str(&Self::encode_vlq(source_col_delta));
            prev_source_col = mapping.source_column;

            if let Some(name_idx) = mapping.name_index {
                let name_index_delta = name_idx as i32 - prev_name_index;
                result.push_str(&Self::encode_vlq(name_index_delta));
                prev_name_index = name_idx as i32;
            }
        }

        result
    }

    /// Encode a single value using VLQ Base64 encoding
    fn encode_vlq(value: i32) -> String {
        const BASE64_CHARS: &[u8] =
            b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

        let mut vlq = if value < 0 {
            ((-value) << 1) | 1
        } else {
            value << 1
        };

        let mut result = String::new();

        loop {
            let mut digit = (vlq & 0x1F) as u8;
            vlq >>= 5;

            if vlq > 0 {
                digit |= 0x20; // Continuation bit
            }

            result.push(BASE64_CHARS[digit as usize] as char);

            if vlq == 0 {
                break;
            }
        }

        result
    }
}

impl SourceMap {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn to_data_uri(&self) -> Result<String, serde_json::Error> {
        let json = serde_json::to_string(self)?;
        Ok(format!("{}{}", DATA_URI_PREFIX, STANDARD.encode(json.as_bytes())))
    }

    pub fn to_comment(&self) -> Result<String, serde_json::Error> {
        Ok(format!("//# {}{}", SOURCE_MAPPING_PREFIX, self.to_data_uri()?))
    }
}

/// Point `file` and `sources` at the canonical path and drop `sourceRoot`.
///
/// Works on a generic JSON value so fields this crate does not model
/// (`x_google_ignoreList`, ...) survive the rewrite.
fn canonicalize_map(map: &mut Value, file: &Path) {
    let canonical = file.to_string_lossy().replace('\\', "/");
    if let Value::Object(fields) = map {
        fields.insert("file".to_string(), Value::String(canonical.clone()));
        fields.insert(
            "sources".to_string(),
            Value::Array(vec![Value::String(canonical)]),
        );
        fields.remove("sourceRoot");
    }
}

/// Merge a companion source map into emitted code as an inline comment.
///
/// Everything after the last `sourceMappingURL=` is replaced with the data
/// URI of the rewritten map; a comment is appended when the code has none.
/// Without a map, an inline map already present in the code is rewritten.
pub fn update_output(
    code: &str,
    file: &Path,
    source_map: Option<&str>,
) -> Result<String, serde_json::Error> {
    let Some(raw_map) = source_map else {
        return Ok(rewrite_inline_source_map(code, file));
    };

    let mut map: Value = serde_json::from_str(raw_map)?;
    canonicalize_map(&mut map, file);
    let encoded = STANDARD.encode(serde_json::to_string(&map)?.as_bytes());
    let data_uri = format!("{}{}", DATA_URI_PREFIX, encoded);

    Ok(match code.rfind(SOURCE_MAPPING_PREFIX) {
        Some(idx) => format!(
            "{}{}",
            &code[..idx + SOURCE_MAPPING_PREFIX.len()],
            data_uri
        ),
        None => {
            let separator = if code.is_empty() || code.ends_with('\n') {
                ""
            } else {
                "\n"
            };
            format!("{}{}//# {}{}", code, separator, SOURCE_MAPPING_PREFIX, data_uri)
        }
    })
}

/// Rewrite an inline base64 source map in place so it points at `file`.
///
/// Code without an inline map, or with one that cannot be decoded, is
/// returned unchanged. Applying the rewrite twice gives the same result.
pub fn rewrite_inline_source_map(code: &str, file: &Path) -> String {
    let Some(idx) = code.rfind(SOURCE_MAPPING_PREFIX) else {
        return code.to_string();
    };
    let value_start = idx + SOURCE_MAPPING_PREFIX.len();
    let rest = &code[value_start..];
    let Some(payload) = rest.strip_prefix(DATA_URI_PREFIX).or_else(|| {
        rest.strip_prefix("data:application/json;base64,")
    }) else {
        return code.to_string();
    };

    let payload_len = payload
        .find(|c: char| c.is_whitespace())
        .unwrap_or(payload.len());
    let tail = &payload[payload_len..];

    let decoded = match STANDARD.decode(&payload[..payload_len]) {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!("Inline source map is not valid base64: {}", e);
            return code.to_string();
        }
    };
    let mut map: Value = match serde_json::from_slice(&decoded) {
        Ok(map) => map,
        Err(e) => {
            debug!("Inline source map is not valid JSON: {}", e);
            return code.to_string();
        }
    };
    canonicalize_map(&mut map, file);

    let Ok(json) = serde_json::to_string(&map) else {
        return code.to_string();
    };
    format!(
        "{}{}{}{}",
        &code[..value_start],
        DATA_URI_PREFIX,
        STANDARD.encode(json.as_bytes()),
        tail
    )
}

/// Decode the inline source map of `code`, if any
pub fn extract_inline_source_map(code: &str) -> Option<SourceMap> {
    let idx = code.rfind(SOURCE_MAPPING_PREFIX)?;
    let payload = code[idx + SOURCE_MAPPING_PREFIX.len()..].strip_prefix(DATA_URI_PREFIX)?;
    let end = payload
        .find(|c: char| c.is_whitespace())
        .unwrap_or(payload.len());
    let bytes = STANDARD.decode(&payload[..end]).ok()?;
    serde_json::from_slice(&bytes).ok()
}
