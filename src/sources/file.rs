//! `file` data source
//!
//! Reads the block for the active environment. Within it:
//! - `common` overrides configuration
//! - `global_values` applies to every template
//! - `<template>.config` holds template values
//! - `<template>.{target,user,group,perms}` holds delivery metadata
//!
//! Current-format configurations carry the blocks under `environments`;
//! legacy ones keep one file per environment in `<base_dir>/environments`.

use std::path::PathBuf;

use confstage_namespace::Namespace;
use tracing::{debug, warn};

use super::{section, split_template_entry, DataSource, SourceError};
use crate::config::{read_document, Config, FormatVersion};

/// Environment-block data source
#[derive(Debug, Clone)]
pub struct FileDataSource {
    environment: Namespace,
}

impl FileDataSource {
    pub fn from_config(config: &Config) -> Result<Self, SourceError> {
        let name = config.environment();

        let environment = match config.format_version() {
            FormatVersion::Current => {
                let block = config
                    .values()
                    .get("environments")
                    .and_then(|envs| envs.get(name));
                if block.is_none() {
                    warn!(environment = name, "no block for environment in configuration");
                }
                section(block, "environments")
            }
            FormatVersion::Legacy => {
                let path = Self::legacy_path(config, name);
                if path.exists() {
                    debug!(path = %path.display(), "loading environment file");
                    let document = read_document(&path)?;
                    section(Some(&document.value), "environment file")
                } else {
                    warn!(path = %path.display(), "environment file not found");
                    Namespace::new()
                }
            }
        };

        Ok(Self { environment })
    }

    /// `<base_dir>/environments/<environment>.yaml`
    pub fn legacy_path(config: &Config, environment: &str) -> PathBuf {
        config
            .base_dir()
            .join("environments")
            .join(format!("{}.yaml", environment))
    }

    fn template_entry(&self, template: &str) -> Option<Namespace> {
        self.environment
            .get(template)
            .map(|v| section(Some(v), template))
    }
}

impl DataSource for FileDataSource {
    fn common(&self) -> Namespace {
        section(self.environment.get("common"), "common")
    }

    fn global_values(&self) -> Namespace {
        section(self.environment.get("global_values"), "global_values")
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

    fn current_config(environment: &str) -> Config {
        let mut config = Config::from_value(
            json!({
                "environments": {
                    "production": {
                        "common": {"exec": ["/usr/sbin/nginx"]},
                        "global_values": {"region": "eu"},
                        "nginx.conf.erb": {
                            "target": "/etc/nginx/nginx.conf",
                            "user": "root",
                            "perms": "0644",
                            "config": {"workers": 4}
                        },
                        "disabled.erb": {"config": {"x": 1}}
                    }
                }
            }),
            None,
        )
        .unwrap();
        config.resolve_environment(Some(environment), None);
        config
    }

    #[test]
    fn test_current_format_values() {
        let source = FileDataSource::from_config(&current_config("production")).unwrap();

        assert_eq!(source.common().get("exec"), Some(&json!(["/usr/sbin/nginx"])));
        assert_eq!(source.global_values().get("region"), Some(&json!("eu")));
        assert_eq!(
            source.values("nginx.conf.erb").unwrap().get("workers"),
            Some(&json!(4))
        );

        let target = source.target_values("nginx.conf.erb");
        assert_eq!(target.get_str("target"), Some("/etc/nginx/nginx.conf"));
        assert_eq!(target.get_str("user"), Some("root"));
        assert_eq!(target.get_str("perms"), Some("0644"));
        assert!(!target.contains_key("config"));
    }

    #[test]
    fn test_template_without_target() {
        let source = FileDataSource::from_config(&current_config("production")).unwrap();
        assert!(source.values("disabled.erb").is_some());
        assert!(source.target_values("disabled.erb").is_empty());
    }

    #[test]
    fn test_unknown_template_contributes_nothing() {
        let source = FileDataSource::from_config(&current_config("production")).unwrap();
        assert!(source.values("other.erb").is_none());
        assert!(source.target_values("other.erb").is_empty());
    }

    #[test]
    fn test_missing_environment_block() {
        let source = FileDataSource::from_config(&current_config("staging")).unwrap();
        assert!(source.global_values().is_empty());
        assert!(source.target_values("nginx.conf.erb").is_empty());
    }

    #[test]
    fn test_legacy_environment_file() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("environments")).unwrap();
        fs::write(
            dir.path().join("environments/development.yaml"),
            "global_values:\n  debug: true\napp.conf.erb:\n  target: /tmp/app.conf\n  config:\n    port: 80\n",
        )
        .unwrap();

        let mut config = Config::from_value(
            json!({"base_dir": dir.path().to_str().unwrap()}),
            None,
        )
        .unwrap();
        config.resolve_environment(None, None);

        let source = FileDataSource::from_config(&config).unwrap();
        assert_eq!(source.global_values().get("debug"), Some(&json!(true)));
        assert_eq!(source.values("app.conf.erb").unwrap().get("port"), Some(&json!(80)));
        assert_eq!(source.target_values("app.conf.erb").get_str("target"), Some("/tmp/app.conf"));
    }

    #[test]
    fn test_legacy_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::from_value(
            json!({"base_dir": dir.path().to_str().unwrap()}),
            None,
        )
        .unwrap();
        config.resolve_environment(Some("production"), None);

        let source = FileDataSource::from_config(&config).unwrap();
        assert!(source.global_values().is_empty());
    }

    #[test]
    fn test_legacy_unparseable_file_fails() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("environments")).unwrap();
        fs::write(dir.path().join("environments/development.yaml"), "a: [unclosed").unwrap();

        let config = Config::from_value(
            json!({"base_dir": dir.path().to_str().unwrap()}),
            None,
        )
        .unwrap();

        assert!(FileDataSource::from_config(&config).is_err());
    }
}
