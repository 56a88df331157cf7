//! Built-in defaults (lowest configuration layer)

use serde::{Deserialize, Serialize};

/// Default base directory for configuration, templates and environment files
pub const DEFAULT_BASE_DIR: &str = "/etc/confstage";

/// Default status endpoint port
pub const DEFAULT_API_PORT: u16 = 6275;

/// Built-in default configuration values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltinDefaults {
    /// Environment used when neither CLI nor process environment choose one
    pub default_environment: String,

    /// Data sources, lowest precedence first
    pub data_sources: Vec<String>,

    /// Template sources, lowest precedence first
    pub template_sources: Vec<String>,

    /// Serve the status endpoint (default: false)
    pub api_enable: bool,

    pub api_port: u16,

    /// Merge nested objects recursively (default: false)
    pub deep_merge: bool,

    /// Skip writing targets whose content is unchanged (default: false)
    pub checksum: bool,

    /// Do not launch the configured executable (default: false)
    pub no_exec: bool,
}

impl Default for BuiltinDefaults {
    fn default() -> Self {
        Self {
            default_environment: "development".to_string(),
            data_sources: vec!["file".to_string()],
            template_sources: vec!["file".to_string()],
            api_enable: false,
            api_port: DEFAULT_API_PORT,
            deep_merge: false,
            checksum: false,
            no_exec: false,
        }
    }
}

impl BuiltinDefaults {
    /// Convert to a JSON value for layering
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "base_dir": DEFAULT_BASE_DIR,
            "default_environment": self.default_environment,
            "data_sources": self.data_sources,
            "template_sources": self.template_sources,
            "api_enable": self.api_enable,
            "api_port": self.api_port,
            "deep_merge": self.deep_merge,
            "checksum": self.checksum,
            "no_exec": self.no_exec,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let defaults = BuiltinDefaults::default();
        assert_eq!(defaults.default_environment, "development");
        assert_eq!(defaults.data_sources, vec!["file"]);
        assert_eq!(defaults.template_sources, vec!["file"]);
        assert_eq!(defaults.api_port, 6275);
        assert!(!defaults.api_enable);
        assert!(!defaults.no_exec);
    }

    #[test]
    fn test_to_value() {
        let value = BuiltinDefaults::default().to_value();
        assert_eq!(value["base_dir"], DEFAULT_BASE_DIR);
        assert_eq!(value["data_sources"][0], "file");
        assert_eq!(value["deep_merge"], false);
    }
}
