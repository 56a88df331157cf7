//! Structured document parsing (YAML, TOML, JSON)
//!
//! Every document is converted to a JSON value so that configuration and
//! data-source files share one value model.

use std::fs;
use std::path::Path;

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Document format, chosen by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Yaml,
    Toml,
    Json,
}

impl DocumentFormat {
    /// Detect the format from a path; unknown extensions are read as YAML
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => DocumentFormat::Toml,
            Some("json") => DocumentFormat::Json,
            _ => DocumentFormat::Yaml,
        }
    }
}

/// Errors reading or parsing a document
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("failed to read {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("failed to parse {path}: {reason}")]
    Parse { path: String, reason: String },
}

/// A parsed document plus the digest of its raw bytes
#[derive(Debug, Clone)]
pub struct Document {
    pub value: Value,
    pub digest: String,
}

/// Read and parse a document
pub fn read_document(path: &Path) -> Result<Document, DocumentError> {
    let bytes = fs::read(path).map_err(|e| DocumentError::Read {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    let digest = hex::encode(hasher.finalize());

    let text = String::from_utf8(bytes).map_err(|e| DocumentError::Parse {
        path: path.display().to_string(),
        reason: format!("invalid UTF-8: {}", e),
    })?;

    let value = parse_document(&text, DocumentFormat::from_path(path)).map_err(|reason| {
        DocumentError::Parse {
            path: path.display().to_string(),
            reason,
        }
    })?;

    Ok(Document { value, digest })
}

/// Parse document text in the given format
pub fn parse_document(text: &str, format: DocumentFormat) -> Result<Value, String> {
    match format {
        DocumentFormat::Yaml => {
            if text.trim().is_empty() {
                return Ok(Value::Null);
            }
            serde_yaml::from_str::<Value>(text).map_err(|e| format!("YAML parse error: {}", e))
        }
        DocumentFormat::Toml => {
            let table: toml::Value =
                toml::from_str(text).map_err(|e| format!("TOML parse error: {}", e))?;
            Ok(toml_to_json(table))
        }
        DocumentFormat::Json => {
            serde_json::from_str(text).map_err(|e| format!("JSON parse error: {}", e))
        }
    }
}

/// Convert a TOML value to JSON; datetimes become strings
fn toml_to_json(toml: toml::Value) -> Value {
    match toml {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::Number(i.into()),
        toml::Value::Float(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(items) => Value::Array(items.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => Value::Object(
            table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect(),
        ),
    }
}
