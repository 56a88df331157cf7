//! Template sources: `file` and `inline`

use std::fs;
use std::path::{Path, PathBuf};

use confstage_namespace::Namespace;
use serde_json::Value;
use tracing::{debug, warn};
use walkdir::WalkDir;

use super::{SourceError, TemplateSource};
use crate::config::Config;

/// Templates stored under `<base_dir>/templates`.
///
/// Identifiers are paths relative to that directory using `/` separators.
#[derive(Debug, Clone)]
pub struct FileTemplateSource {
    dir: PathBuf,
}

impl FileTemplateSource {
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.base_dir().join("templates"))
    }

    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl TemplateSource for FileTemplateSource {
    fn templates(&self) -> Result<Vec<String>, SourceError> {
        if !self.dir.is_dir() {
            warn!(dir = %self.dir.display(), "template directory not found");
            return Ok(Vec::new());
        }

        let mut ids = Vec::new();
        for entry in WalkDir::new(&self.dir).min_depth(1).sort_by_file_name() {
            let entry = entry.map_err(|e| SourceError::TemplateRead {
                id: self.dir.display().to_string(),
                reason: e.to_string(),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            if let Ok(relative) = entry.path().strip_prefix(&self.dir) {
                let id = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                ids.push(id);
            }
        }

        debug!(dir = %self.dir.display(), count = ids.len(), "listed templates");
        Ok(ids)
    }

    fn template(&self, id: &str) -> Result<String, SourceError> {
        let path = self.dir.join(id);
        if !path.is_file() {
            return Err(SourceError::TemplateNotFound(id.to_string()));
        }
        fs::read_to_string(&path).map_err(|e| SourceError::TemplateRead {
            id: id.to_string(),
            reason: e.to_string(),
        })
    }
}

/// Templates embedded in configuration under `templates`
#[derive(Debug, Clone)]
pub struct InlineTemplateSource {
    templates: Namespace,
}

impl InlineTemplateSource {
    pub fn from_config(config: &Config) -> Self {
        let mut templates = Namespace::new();
        if let Some(Value::Object(entries)) = config.values().get("templates") {
            for (id, content) in entries {
                match content {
                    Value::String(_) => {
                        templates.insert(id.clone(), content.clone());
                    }
                    _ => warn!(template = %id, "inline template content must be a string, ignoring"),
                }
            }
        }
        Self { templates }
    }
}

impl TemplateSource for InlineTemplateSource {
    fn templates(&self) -> Result<Vec<String>, SourceError> {
        Ok(self.templates.keys().cloned().collect())
    }

    fn template(&self, id: &str) -> Result<String, SourceError> {
        self.templates
            .get_str(id)
            .map(str::to_string)
            .ok_or_else(|| SourceError::TemplateNotFound(id.to_string()))
    }
}
