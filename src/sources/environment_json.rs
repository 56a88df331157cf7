//! `environment_json` data source
//!
//! Reads a JSON document from a process environment variable
//! (`CONFSTAGE_JSON`, or `environment_json.variable`).
//!
//! A document with `"_version": 2` is structured: `global` holds global values
//! and every other key is a template entry shaped like the `file` source's.
//! Any other object is taken whole as global values.

use confstage_namespace::Namespace;
use serde_json::Value;
use tracing::warn;

use super::{section, split_template_entry, DataSource};
use crate::config::Config;

const DEFAULT_VARIABLE: &str = "CONFSTAGE_JSON";

/// JSON-in-environment data source
#[derive(Debug, Clone)]
pub struct EnvironmentJsonDataSource {
    document: Namespace,
    structured: bool,
}

impl EnvironmentJsonDataSource {
    pub fn from_config(config: &Config) -> Self {
        let variable = config
            .get_str("environment_json.variable")
            .unwrap_or(DEFAULT_VARIABLE);
        Self::from_text(std::env::var(variable).ok().as_deref())
    }

    /// Build from the variable's content (`None` when unset)
    pub fn from_text(text: Option<&str>) -> Self {
        let parsed = match text {
            None => Value::Null,
            Some(t) => serde_json::from_str::<Value>(t).unwrap_or_else(|e| {
                warn!(error = %e, "invalid JSON in environment, ignoring");
                Value::Null
            }),
        };

        let mut document = section(Some(&parsed), "environment_json");
        let structured = document.get("_version").and_then(Value::as_u64) == Some(2);
        document.remove("_version");

        Self {
            document,
            structured,
        }
    }

    fn template_entry(&self, template: &str) -> Option<Namespace> {
        if !self.structured {
            return None;
        }
        self.document.get(template).map(|v| section(Some(v), template))
    }
}

impl DataSource for EnvironmentJsonDataSource {
    fn global_values(&self) -> Namespace {
        if self.structured {
            section(self.document.get("global"), "global")
        } else {
            self.document.clone()
        }
    }

    fn values(&self, template: &str) -> Option<Namespace> {
        self.template_entry(template)
            .and_then(|entry| split_template_entry(&entry).0)
    }

    fn target_values(&self, template: &str) -> Namespace {
        self.template_entry(template)
            .map(|entry| split_template_entry(&entry).1)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flat_document_is_global() {
        let source = EnvironmentJsonDataSource::from_text(Some(r#"{"port": 9000, "debug": true}"#));
        let globals = source.global_values();
        assert_eq!(globals.get("port"), Some(&json!(9000)));
        assert_eq!(globals.get("debug"), Some(&json!(true)));
        assert!(source.values("port").is_none());
    }

    #[test]
    fn test_structured_document() {
        let source = EnvironmentJsonDataSource::from_text(Some(
            r#"{
                "_version": 2,
                "global": {"region": "us"},
                "app.conf.erb": {"config": {"port": 81}, "target": "/tmp/app.conf"}
            }"#,
        ));

        let globals = source.global_values();
        assert_eq!(globals.get("region"), Some(&json!("us")));
        assert!(!globals.contains_key("_version"));
        assert_eq!(source.values("app.conf.erb").unwrap().get("port"), Some(&json!(81)));
        assert_eq!(source.target_values("app.conf.erb").get_str("target"), Some("/tmp/app.conf"));
    }

    #[test]
    fn test_unset_variable_contributes_nothing() {
        let source = EnvironmentJsonDataSource::from_text(None);
        assert!(source.global_values().is_empty());
    }

    #[test]
    fn test_invalid_json_contributes_nothing() {
        let source = EnvironmentJsonDataSource::from_text(Some("{not json"));
        assert!(source.global_values().is_empty());
    }

    #[test]
    fn test_non_object_contributes_nothing() {
        let source = EnvironmentJsonDataSource::from_text(Some("[1, 2]"));
        assert!(source.global_values().is_empty());
    }
}
