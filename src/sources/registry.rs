//! Name-to-constructor registry for plugins

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use super::{
    DataSource, DefaultsDataSource, EnvironmentDataSource, EnvironmentJsonDataSource,
    FileDataSource, FileTemplateSource, InlineTemplateSource, PluginKind, SourceError,
    TemplateSource,
};
use crate::config::Config;

/// Constructs a data source from the current configuration
pub type DataSourceFactory =
    Arc<dyn Fn(&Config) -> Result<Box<dyn DataSource>, SourceError> + Send + Sync>;

/// Constructs a template source from the current configuration
pub type TemplateSourceFactory =
    Arc<dyn Fn(&Config) -> Result<Box<dyn TemplateSource>, SourceError> + Send + Sync>;

/// A resolved data source: its configured name and constructor
#[derive(Clone)]
pub struct NamedDataSource {
    pub name: String,
    factory: DataSourceFactory,
}

impl NamedDataSource {
    /// Construct a fresh instance
    pub fn construct(&self, config: &Config) -> Result<Box<dyn DataSource>, SourceError> {
        (self.factory)(config)
    }
}

impl fmt::Debug for NamedDataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamedDataSource").field("name", &self.name).finish()
    }
}

/// A resolved template source: its configured name and constructor
#[derive(Clone)]
pub struct NamedTemplateSource {
    pub name: String,
    factory: TemplateSourceFactory,
}

impl NamedTemplateSource {
    /// Construct a fresh instance
    pub fn construct(&self, config: &Config) -> Result<Box<dyn TemplateSource>, SourceError> {
        (self.factory)(config)
    }
}

impl fmt::Debug for NamedTemplateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamedTemplateSource").field("name", &self.name).finish()
    }
}

/// Registry of available plugins
#[derive(Clone, Default)]
pub struct SourceRegistry {
    data_sources: BTreeMap<String, DataSourceFactory>,
    template_sources: BTreeMap<String, TemplateSourceFactory>,
}

impl SourceRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in plugin
    pub fn builtin() -> Self {
        let mut registry = Self::new();

        registry.register_data_source("file", |config| {
            Ok(Box::new(FileDataSource::from_config(config)?) as Box<dyn DataSource>)
        });
        registry.register_data_source("defaults", |config| {
            Ok(Box::new(DefaultsDataSource::from_config(config)?) as Box<dyn DataSource>)
        });
        registry.register_data_source("environment", |config| {
            Ok(Box::new(EnvironmentDataSource::from_config(config)) as Box<dyn DataSource>)
        });
        registry.register_data_source("environment_json", |config| {
            Ok(Box::new(EnvironmentJsonDataSource::from_config(config)) as Box<dyn DataSource>)
        });

        registry.register_template_source("file", |config| {
            Ok(Box::new(FileTemplateSource::from_config(config)) as Box<dyn TemplateSource>)
        });
        registry.register_template_source("inline", |config| {
            Ok(Box::new(InlineTemplateSource::from_config(config)) as Box<dyn TemplateSource>)
        });

        registry
    }

    /// Register (or replace) a data source under `name`
    pub fn register_data_source<F>(&mut self, name: &str, factory: F) -> &mut Self
    where
        F: Fn(&Config) -> Result<Box<dyn DataSource>, SourceError> + Send + Sync + 'static,
    {
        self.data_sources.insert(name.to_string(), Arc::new(factory));
        self
    }

    /// Register (or replace) a template source under `name`
    pub fn register_template_source<F>(&mut self, name: &str, factory: F) -> &mut Self
    where
        F: Fn(&Config) -> Result<Box<dyn TemplateSource>, SourceError> + Send + Sync + 'static,
    {
        self.template_sources.insert(name.to_string(), Arc::new(factory));
        self
    }

    /// Resolve data sources by name, preserving order; unknown names fail
    pub fn data_sources(&self, names: &[String]) -> Result<Vec<NamedDataSource>, SourceError> {
        names
            .iter()
            .map(|name| {
                let factory = self.data_sources.get(name).ok_or_else(|| {
                    SourceError::UnknownPlugin {
                        kind: PluginKind::DataSource,
                        name: name.clone(),
                    }
                })?;
                debug!(name = %name, "resolved data source");
                Ok(NamedDataSource {
                    name: name.clone(),
                    factory: Arc::clone(factory),
                })
            })
            .collect()
    }

    /// Resolve template sources by name, preserving order; unknown names fail
    pub fn template_sources(&self, names: &[String]) -> Result<Vec<NamedTemplateSource>, SourceError> {
        names
            .iter()
            .map(|name| {
                let factory = self.template_sources.get(name).ok_or_else(|| {
                    SourceError::UnknownPlugin {
                        kind: PluginKind::TemplateSource,
                        name: name.clone(),
                    }
                })?;
                debug!(name = %name, "resolved template source");
                Ok(NamedTemplateSource {
                    name: name.clone(),
                    factory: Arc::clone(factory),
                })
            })
            .collect()
    }

    /// Registered data source names, sorted
    pub fn data_source_names(&self) -> Vec<&str> {
        self.data_sources.keys().map(String::as_str).collect()
    }

    /// Registered template source names, sorted
    pub fn template_source_names(&self) -> Vec<&str> {
        self.template_sources.keys().map(String::as_str).collect()
    }
}
