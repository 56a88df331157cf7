//! Effective configuration with provenance
//!
//! The configuration is layered from built-in defaults, the base file and CLI
//! overrides, then completed by environment resolution. After that it changes
//! only through data-source `common` overrides.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use confstage_namespace::{Category, Conflict, MergeStrategy, Merger, Namespace};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::defaults::BuiltinDefaults;
use super::document::{read_document, DocumentError};
use super::merge::layer_all;

/// Process environment variable that selects the environment
pub const ENVIRONMENT_VAR: &str = "environment";

/// Key holding the format-version marker
pub const CONFIG_VERSION_KEY: &str = "config_version";

/// Keys that contain secrets and are redacted for display
const SECRET_KEYS: &[&str] = &[
    "password",
    "token",
    "secret",
    "private_key",
    "api_key",
    "credential",
];

/// Origin of a configuration layer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ConfigOrigin {
    Builtin,
    File,
    Cli,
}

/// A contributing layer with provenance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSource {
    pub origin: ConfigOrigin,

    /// File path (None for builtin/cli)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// SHA-256 digest of raw file bytes (None for builtin/cli)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

/// Shape of the base configuration file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FormatVersion {
    /// Environments live in separate files under `<base_dir>/environments`
    Legacy = 1,
    /// Environments live in an `environments` block of the base file
    Current = 2,
}

impl FormatVersion {
    /// Detect the shape from the parsed base file
    pub fn detect(file: &Value) -> Self {
        if file.get("environments").is_some() {
            FormatVersion::Current
        } else {
            FormatVersion::Legacy
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error("configuration root must be a mapping")]
    NotAMapping,

    #[error("invalid value for '{key}': {reason}")]
    Invalid { key: String, reason: String },
}

/// The run's configuration
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    values: Namespace,
    sources: Vec<ConfigSource>,
    created_at: DateTime<Utc>,
}

impl Config {
    /// Load the base file at `path` and layer it between defaults and `overrides`
    pub fn load(path: &Path, overrides: Option<Value>) -> Result<Self, ConfigError> {
        let document = read_document(path)?;
        let source = ConfigSource {
            origin: ConfigOrigin::File,
            path: Some(path.display().to_string()),
            digest: Some(document.digest),
        };
        Self::build(document.value, Some(source), overrides)
    }

    /// Build from an already-parsed base document
    pub fn from_value(file: Value, overrides: Option<Value>) -> Result<Self, ConfigError> {
        Self::build(file, None, overrides)
    }

    fn build(
        file: Value,
        file_source: Option<ConfigSource>,
        overrides: Option<Value>,
    ) -> Result<Self, ConfigError> {
        if !(file.is_object() || file.is_null()) {
            return Err(ConfigError::NotAMapping);
        }

        let version = FormatVersion::detect(&file);

        let mut layers = vec![BuiltinDefaults::default().to_value()];
        let mut sources = vec![ConfigSource {
            origin: ConfigOrigin::Builtin,
            path: None,
            digest: None,
        }];

        layers.push(file);
        if let Some(source) = file_source {
            sources.push(source);
        }

        if let Some(cli) = overrides {
            layers.push(cli);
            sources.push(ConfigSource {
                origin: ConfigOrigin::Cli,
                path: None,
                digest: None,
            });
        }

        let merged = layer_all(layers);
        let mut values = Namespace::from_value(merged).ok_or(ConfigError::NotAMapping)?;
        values.insert(CONFIG_VERSION_KEY, version as u64);

        let config = Self {
            values,
            sources,
            created_at: Utc::now(),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for key in ["data_sources", "template_sources"] {
            self.string_list(key)?;
        }

        if let Some(port) = self.get("api_port") {
            match port.as_u64() {
                Some(p) if p > 0 && p <= u64::from(u16::MAX) => {}
                _ => {
                    return Err(ConfigError::Invalid {
                        key: "api_port".to_string(),
                        reason: format!("expected a port number, got {}", port),
                    })
                }
            }
        }

        Ok(())
    }

    /// Resolve the active environment and record it under `environment`.
    ///
    /// Precedence: explicit override, then the process environment value,
    /// then `default_environment`.
    pub fn resolve_environment(&mut self, explicit: Option<&str>, from_process: Option<String>) -> String {
        let environment = explicit
            .map(str::to_string)
            .filter(|e| !e.is_empty())
            .or_else(|| from_process.filter(|e| !e.is_empty()))
            .or_else(|| self.get_str("default_environment").map(str::to_string))
            .unwrap_or_else(|| BuiltinDefaults::default().default_environment);

        self.values.insert("environment", environment.clone());
        environment
    }

    /// The resolved environment, or the default when not yet resolved
    pub fn environment(&self) -> &str {
        self.get_str("environment")
            .or_else(|| self.get_str("default_environment"))
            .unwrap_or("development")
    }

    pub fn format_version(&self) -> FormatVersion {
        match self.get_u64(CONFIG_VERSION_KEY) {
            Some(2) => FormatVersion::Current,
            _ => FormatVersion::Legacy,
        }
    }

    pub fn base_dir(&self) -> PathBuf {
        PathBuf::from(self.get_str("base_dir").unwrap_or(super::DEFAULT_BASE_DIR))
    }

    /// Configured data source names, lowest precedence first
    pub fn data_sources(&self) -> Vec<String> {
        self.string_list("data_sources").unwrap_or_default()
    }

    /// Configured template source names, lowest precedence first
    pub fn template_sources(&self) -> Vec<String> {
        self.string_list("template_sources").unwrap_or_default()
    }

    pub fn merge_strategy(&self) -> MergeStrategy {
        if self.get_bool("deep_merge").unwrap_or(false) {
            MergeStrategy::Deep
        } else {
            MergeStrategy::Shallow
        }
    }

    pub fn checksum_enabled(&self) -> bool {
        self.get_bool("checksum").unwrap_or(false)
    }

    pub fn api_enabled(&self) -> bool {
        self.get_bool("api_enable").unwrap_or(false)
    }

    pub fn api_port(&self) -> u16 {
        self.get_u64("api_port")
            .and_then(|p| u16::try_from(p).ok())
            .unwrap_or(super::DEFAULT_API_PORT)
    }

    pub fn no_exec(&self) -> bool {
        self.get_bool("no_exec").unwrap_or(false)
    }

    /// Merge a data source's `common` overrides into the configuration
    pub fn merge_common(&mut self, overlay: &Namespace, source: &str) -> Vec<Conflict> {
        Merger::new(Category::Common, source)
            .with_strategy(self.merge_strategy())
            .merge(&mut self.values, overlay)
    }

    /// All configuration values
    pub fn values(&self) -> &Namespace {
        &self.values
    }

    /// Contributing layers in precedence order
    pub fn sources(&self) -> &[ConfigSource] {
        &self.sources
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Configuration as JSON with secret-like values redacted, plus the
    /// redacted key paths
    pub fn redacted(&self) -> (Value, Vec<String>) {
        let mut value = self.values.clone().into_value();
        let mut redactions = Vec::new();
        redact_recursive(&mut value, String::new(), &mut redactions);
        (value, redactions)
    }

    /// Get a value by dot-separated path
    pub fn get(&self, path: &str) -> Option<&Value> {
        self.values.lookup(path).value()
    }

    pub fn get_u64(&self, path: &str) -> Option<u64> {
        self.get(path).and_then(Value::as_u64)
    }

    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(Value::as_str)
    }

    pub fn get_bool(&self, path: &str) -> Option<bool> {
        self.get(path).and_then(Value::as_bool)
    }

    /// Read a key holding a list of names; a single string counts as one entry
    fn string_list(&self, key: &str) -> Result<Vec<String>, ConfigError> {
        let invalid = |reason: String| ConfigError::Invalid {
            key: key.to_string(),
            reason,
        };

        match self.get(key) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::String(s)) => Ok(vec![s.clone()]),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| invalid(format!("expected a name, got {}", item)))
                })
                .collect(),
            Some(other) => Err(invalid(format!("expected a list of names, got {}", other))),
        }
    }
}

fn redact_recursive(value: &mut Value, path: String, redactions: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (key, val) in map.iter_mut() {
                let key_lower = key.to_lowercase();
                let current_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", path, key)
                };

                let is_secret = SECRET_KEYS.iter().any(|s| key_lower.contains(s));

                if is_secret && !val.is_object() && !val.is_array() {
                    *val = Value::String("[REDACTED]".to_string());
                    redactions.push(current_path);
                } else {
                    redact_recursive(val, current_path, redactions);
                }
            }
        }
        Value::Array(items) => {
            for (i, val) in items.iter_mut().enumerate() {
                redact_recursive(val, format!("{}[{}]", path, i), redactions);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_only() {
        let config = Config::from_value(Value::Null, None).unwrap();

        assert_eq!(config.data_sources(), vec!["file"]);
        assert_eq!(config.template_sources(), vec!["file"]);
        assert_eq!(config.api_port(), 6275);
        assert!(!config.api_enabled());
        assert_eq!(config.merge_strategy(), MergeStrategy::Shallow);
        assert_eq!(config.base_dir(), PathBuf::from("/etc/confstage"));
    }

    #[test]
    fn test_legacy_format_detected() {
        let config = Config::from_value(json!({"exec": "/bin/true"}), None).unwrap();
        assert_eq!(config.format_version(), FormatVersion::Legacy);
        assert_eq!(config.get_u64(CONFIG_VERSION_KEY), Some(1));
    }

    #[test]
    fn test_current_format_detected() {
        let config = Config::from_value(json!({"environments": {}}), None).unwrap();
        assert_eq!(config.format_version(), FormatVersion::Current);
        assert_eq!(config.get_u64(CONFIG_VERSION_KEY), Some(2));
    }

    #[test]
    fn test_cli_overrides_file() {
        let config = Config::from_value(
            json!({"api_port": 7000, "exec": "a"}),
            Some(json!({"exec": "b", "base_dir": "/srv/conf"})),
        )
        .unwrap();

        assert_eq!(config.api_port(), 7000);
        assert_eq!(config.get_str("exec"), Some("b"));
        assert_eq!(config.base_dir(), PathBuf::from("/srv/conf"));
        assert_eq!(config.sources().len(), 2);
        assert_eq!(config.sources()[1].origin, ConfigOrigin::Cli);
    }

    #[test]
    fn test_environment_precedence() {
        let mut config =
            Config::from_value(json!({"default_environment": "staging"}), None).unwrap();

        assert_eq!(
            config.resolve_environment(Some("production"), Some("qa".to_string())),
            "production"
        );
        assert_eq!(config.resolve_environment(None, Some("qa".to_string())), "qa");
        assert_eq!(config.resolve_environment(None, None), "staging");
        assert_eq!(config.resolve_environment(Some(""), Some(String::new())), "staging");
        assert_eq!(config.environment(), "staging");
        assert_eq!(config.get_str("environment"), Some("staging"));
    }

    #[test]
    fn test_environment_falls_back_to_builtin() {
        let mut config = Config::from_value(Value::Null, None).unwrap();
        assert_eq!(config.resolve_environment(None, None), "development");
    }

    #[test]
    fn test_single_source_name_accepted() {
        let config = Config::from_value(json!({"data_sources": "environment"}), None).unwrap();
        assert_eq!(config.data_sources(), vec!["environment"]);
    }

    #[test]
    fn test_invalid_source_list_rejected() {
        let err = Config::from_value(json!({"data_sources": [1, 2]}), None).unwrap_err();
        assert!(err.to_string().contains("data_sources"));
    }

    #[test]
    fn test_invalid_api_port_rejected() {
        let err = Config::from_value(json!({"api_port": 70000}), None).unwrap_err();
        assert!(err.to_string().contains("api_port"));
    }

    #[test]
    fn test_non_mapping_root_rejected() {
        let err = Config::from_value(json!(["a"]), None).unwrap_err();
        assert!(matches!(err, ConfigError::NotAMapping));
    }

    #[test]
    fn test_merge_common_reports_conflicts() {
        let mut config = Config::from_value(json!({"exec": "/bin/a"}), None).unwrap();
        let overlay = Namespace::from_value(json!({"exec": "/bin/b", "extra": 1})).unwrap();

        let conflicts = config.merge_common(&overlay, "file");

        assert_eq!(config.get_str("exec"), Some("/bin/b"));
        assert_eq!(config.get_u64("extra"), Some(1));
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].category, Category::Common);
        assert_eq!(conflicts[0].source, "file");
    }

    #[test]
    fn test_secret_redaction() {
        let config = Config::from_value(
            json!({
                "consul": {"token": "abc", "url": "http://consul"},
                "password": "hunter2"
            }),
            None,
        )
        .unwrap();

        let (value, redactions) = config.redacted();
        assert_eq!(value["consul"]["token"], "[REDACTED]");
        assert_eq!(value["consul"]["url"], "http://consul");
        assert_eq!(value["password"], "[REDACTED]");
        assert!(redactions.contains(&"consul.token".to_string()));
        // the live configuration is untouched
        assert_eq!(config.get_str("password"), Some("hunter2"));
    }

    #[test]
    fn test_load_yaml_file() {
        let mut temp = NamedTempFile::with_suffix(".yaml").unwrap();
        writeln!(temp, "exec: [\"/usr/bin/app\", \"--serve\"]").unwrap();
        writeln!(temp, "data_sources: [file, environment]").unwrap();
        writeln!(temp, "environments:").unwrap();
        writeln!(temp, "  development: {{}}").unwrap();

        let config = Config::load(temp.path(), None).unwrap();

        assert_eq!(config.get("exec"), Some(&json!(["/usr/bin/app", "--serve"])));
        assert_eq!(config.data_sources(), vec!["file", "environment"]);
        assert_eq!(config.format_version(), FormatVersion::Current);
        assert_eq!(config.sources()[1].origin, ConfigOrigin::File);
        assert!(config.sources()[1].digest.is_some());
    }

    #[test]
    fn test_load_missing_file_fails() {
        let result = Config::load(Path::new("/nonexistent/common.yaml"), None);
        assert!(matches!(result, Err(ConfigError::Document(DocumentError::Read { .. }))));
    }
}
