//! Data-source and template-source plugins
//!
//! Plugins are resolved by name through a [`SourceRegistry`] and constructed
//! from the current [`Config`] for every query the engine makes: once per
//! source for the common pass, once for the global pass, then once per source
//! per template. An implementation must derive everything it returns from the
//! configuration (and the outside world) at construction time or call time;
//! nothing it stores survives to the next construction.
//!
//! Returned namespaces are owned by the caller and merged, never retained.

mod defaults;
mod environment;
mod environment_json;
mod file;
mod registry;
mod templates;

pub use defaults::DefaultsDataSource;
pub use environment::EnvironmentDataSource;
pub use environment_json::EnvironmentJsonDataSource;
pub use file::FileDataSource;
pub use registry::{
    DataSourceFactory, NamedDataSource, NamedTemplateSource, SourceRegistry,
    TemplateSourceFactory,
};
pub use templates::{FileTemplateSource, InlineTemplateSource};

use std::fmt;

use confstage_namespace::Namespace;
use serde_json::Value;
use tracing::warn;

use crate::config::DocumentError;

/// Keys of a template entry that describe its delivery target
pub const TARGET_KEYS: &[&str] = &["target", "user", "group", "perms"];

/// Contributes values to the configuration and to template namespaces.
///
/// Every method has an empty default so a source implements only what it
/// provides.
pub trait DataSource {
    /// Overrides merged into the configuration before global values are computed
    fn common(&self) -> Namespace {
        Namespace::new()
    }

    /// Values shared by every template
    fn global_values(&self) -> Namespace {
        Namespace::new()
    }

    /// Template-specific values; `None` means this source has nothing for the
    /// template, which the engine treats the same as an empty namespace
    fn values(&self, _template: &str) -> Option<Namespace> {
        None
    }

    /// Delivery metadata (`target`, `user`, `group`, `perms`); a result without
    /// `target` leaves the template disabled as far as this source is concerned
    fn target_values(&self, _template: &str) -> Namespace {
        Namespace::new()
    }
}

/// Enumerates templates and supplies their raw content
pub trait TemplateSource {
    fn templates(&self) -> Result<Vec<String>, SourceError>;

    fn template(&self, id: &str) -> Result<String, SourceError>;
}

/// Plugin kinds, for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginKind {
    DataSource,
    TemplateSource,
}

impl fmt::Display for PluginKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PluginKind::DataSource => f.write_str("data source"),
            PluginKind::TemplateSource => f.write_str("template source"),
        }
    }
}

/// Plugin errors
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("unknown {kind} '{name}'")]
    UnknownPlugin { kind: PluginKind, name: String },

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error("failed to read template '{id}': {reason}")]
    TemplateRead { id: String, reason: String },

    #[error("template '{0}' not found")]
    TemplateNotFound(String),
}

/// Convert a section of a document to a namespace.
///
/// Missing or `null` sections are empty; non-mapping sections are logged and
/// treated as empty.
pub(crate) fn section(value: Option<&Value>, what: &str) -> Namespace {
    match value {
        None => Namespace::new(),
        Some(v) => Namespace::from_value(v.clone()).unwrap_or_else(|| {
            warn!(section = what, "expected a mapping, ignoring");
            Namespace::new()
        }),
    }
}

/// Split a per-template entry into its `config` values and target metadata
pub(crate) fn split_template_entry(entry: &Namespace) -> (Option<Namespace>, Namespace) {
    let values = entry
        .get("config")
        .map(|v| section(Some(v), "config"));

    let target = entry
        .iter()
        .filter(|(k, _)| TARGET_KEYS.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    (values, target)
}
