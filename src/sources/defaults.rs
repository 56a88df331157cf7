//! `defaults` data source
//!
//! Values that apply regardless of environment. `global` holds global values;
//! every other key is a template entry shaped like the `file` source's.
//! Current-format configurations use the `defaults` block; legacy ones read
//! `<base_dir>/defaults.yaml` and then each `*.yaml` in `<base_dir>/defaults.d`
//! in name order, later files layered over earlier ones.

use std::path::Path;

use confstage_namespace::Namespace;
use serde_json::Value;
use tracing::debug;
use walkdir::WalkDir;

use super::{section, split_template_entry, DataSource, SourceError};
use crate::config::{layer, read_document, Config, FormatVersion};

/// Environment-independent defaults
#[derive(Debug, Clone)]
pub struct DefaultsDataSource {
    defaults: Namespace,
}

impl DefaultsDataSource {
    pub fn from_config(config: &Config) -> Result<Self, SourceError> {
        let defaults = match config.format_version() {
            FormatVersion::Current => section(config.values().get("defaults"), "defaults"),
            FormatVersion::Legacy => {
                let value = Self::read_legacy(&config.base_dir())?;
                section(Some(&value), "defaults")
            }
        };
        Ok(Self { defaults })
    }

    fn read_legacy(base_dir: &Path) -> Result<Value, SourceError> {
        let mut merged = Value::Null;

        let single = base_dir.join("defaults.yaml");
        if single.is_file() {
            debug!(path = %single.display(), "loading defaults file");
            merged = layer(merged, read_document(&single)?.value);
        }

        let dir = base_dir.join("defaults.d");
        if dir.is_dir() {
            let mut files: Vec<_> = WalkDir::new(&dir)
                .min_depth(1)
                .max_depth(1)
                .into_iter()
                .filter_map(Result::ok)
                .filter(|e| e.file_type().is_file())
                .map(|e| e.into_path())
                .filter(|p| p.extension().is_some_and(|ext| ext == "yaml" || ext == "yml"))
                .collect();
            files.sort();

            for path in files {
                debug!(path = %path.display(), "loading defaults file");
                merged = layer(merged, read_document(&path)?.value);
            }
        }

        Ok(merged)
    }

    fn template_entry(&self, template: &str) -> Option<Namespace> {
        self.defaults.get(template).map(|v| section(Some(v), template))
    }
}

impl DataSource for DefaultsDataSource {
    fn global_values(&self) -> Namespace {
        section(self.defaults.get("global"), "global")
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
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_current_format_block() {
        let config = Config::from_value(
            json!({
                "environments": {},
                "defaults": {
                    "global": {"log_level": "info"},
                    "app.conf.erb": {"target": "/etc/app.conf", "config": {"port": 80}}
                }
            }),
            None,
        )
        .unwrap();

        let source = DefaultsDataSource::from_config(&config).unwrap();
        assert_eq!(source.global_values().get("log_level"), Some(&json!("info")));
        assert_eq!(source.values("app.conf.erb").unwrap().get("port"), Some(&json!(80)));
        assert_eq!(source.target_values("app.conf.erb").get_str("target"), Some("/etc/app.conf"));
        assert!(source.common().is_empty());
    }

    #[test]
    fn test_legacy_files_layered_in_order() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("defaults.yaml"), "global:\n  a: 1\n  b: 1\n").unwrap();
        fs::create_dir(dir.path().join("defaults.d")).unwrap();
        fs::write(dir.path().join("defaults.d/20-late.yaml"), "global:\n  b: 3\n").unwrap();
        fs::write(dir.path().join("defaults.d/10-early.yaml"), "global:\n  b: 2\n  c: 2\n").unwrap();
        fs::write(dir.path().join("defaults.d/notes.txt"), "ignored").unwrap();

        let config = Config::from_value(
            json!({"base_dir": dir.path().to_str().unwrap()}),
            None,
        )
        .unwrap();

        let globals = DefaultsDataSource::from_config(&config).unwrap().global_values();
        assert_eq!(globals.get("a"), Some(&json!(1)));
        assert_eq!(globals.get("b"), Some(&json!(3)));
        assert_eq!(globals.get("c"), Some(&json!(2)));
    }

    #[test]
    fn test_legacy_without_files_is_empty() {
        let dir = TempDir::new().unwrap();
        let config = Config::from_value(
            json!({"base_dir": dir.path().to_str().unwrap()}),
            None,
        )
        .unwrap();

        let source = DefaultsDataSource::from_config(&config).unwrap();
        assert!(source.global_values().is_empty());
        assert!(source.values("x").is_none());
    }
}
