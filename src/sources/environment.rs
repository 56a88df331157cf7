//! `environment` data source
//!
//! Exposes process environment variables as global values. Keys are prefixed
//! (`env_` by default) and lower-cased unless `environment_data.lowercase` is
//! false, so `HOME` becomes `env_home`.

use confstage_namespace::Namespace;

use super::DataSource;
use crate::config::Config;

const DEFAULT_PREFIX: &str = "env_";

/// Process-environment data source
#[derive(Debug, Clone)]
pub struct EnvironmentDataSource {
    values: Namespace,
}

impl EnvironmentDataSource {
    /// Snapshot the current process environment
    pub fn from_config(config: &Config) -> Self {
        Self::with_vars(config, std::env::vars())
    }

    /// Build from an explicit set of variables
    pub fn with_vars<I>(config: &Config, vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let prefix = config
            .get_str("environment_data.prefix")
            .unwrap_or(DEFAULT_PREFIX)
            .to_string();
        let lowercase = config.get_bool("environment_data.lowercase").unwrap_or(true);

        let mut vars: Vec<_> = vars.into_iter().collect();
        vars.sort();

        let mut values = Namespace::new();
        for (key, value) in vars {
            let key = if lowercase { key.to_lowercase() } else { key };
            values.insert(format!("{}{}", prefix, key), value);
        }

        Self { values }
    }
}

impl DataSource for EnvironmentDataSource {
    fn global_values(&self) -> Namespace {
        self.values.clone()
    }
}
