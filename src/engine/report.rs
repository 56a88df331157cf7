//! Result of one generation pass

use std::collections::BTreeMap;

use confstage_namespace::{Conflict, Namespace};
use serde::Serialize;
use serde_json::Value;

use crate::config::Config;

/// What was built for one template
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemplateReport {
    /// Namespace the template was rendered against, internal keys removed
    pub merged_values: Namespace,
    /// Merged target metadata, internal keys removed
    pub target_values: Namespace,
}

/// Outcome of a generation pass, read by the status endpoint
#[derive(Debug, Clone)]
pub struct Report {
    pub config: Config,
    pub global_values: Namespace,
    /// Built templates only; templates without a target are absent
    pub templates: BTreeMap<String, TemplateReport>,
    pub conflicts: Vec<Conflict>,
}

impl Report {
    /// Configuration with secret-like values redacted
    pub fn redacted_config(&self) -> Value {
        self.config.redacted().0
    }

    pub fn template_ids(&self) -> Vec<&str> {
        self.templates.keys().map(String::as_str).collect()
    }
}

/// Whether a key is internal bookkeeping and kept out of reports
pub fn is_internal_key(key: &str) -> bool {
    key.starts_with('_')
}

/// Copy of `namespace` without internal bookkeeping keys
pub fn strip_internal(namespace: &Namespace) -> Namespace {
    let mut stripped = namespace.clone();
    stripped.retain(|key, _| !is_internal_key(key));
    stripped
}
