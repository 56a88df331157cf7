//! Assembly engine
//!
//! One generation pass:
//! 1. resolve the configured data and template sources
//! 2. common pass: every data source's `common()` merged into the configuration
//! 3. global pass: every data source's `global_values()` merged into the seed
//! 4. collect templates; a later template source overwrites an earlier one
//! 5. per template, in identifier order: build the namespace and target
//!    metadata, then render and deliver when a target is set
//!
//! The common pass runs to completion before the global pass starts, so every
//! `global_values()` call sees every `common()` override. Each plugin is
//! constructed fresh for each query.

mod report;

pub use report::{is_internal_key, strip_internal, Report, TemplateReport};

use std::collections::BTreeMap;

use confstage_namespace::{Category, Conflict, MergeStrategy, Merger, Namespace};
use confstage_render::{render, RenderError};
use tracing::{debug, info};

use crate::config::Config;
use crate::delivery::{Deliverer, DeliveryError, DeliveryOutcome, Privilege, Target};
use crate::sources::{NamedDataSource, NamedTemplateSource, SourceError, SourceRegistry};

/// Source name recorded on conflicts between the environment key and globals
const GLOBAL_SEED: &str = "global_values";

/// Fatal generation errors
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("template '{template}': {source}")]
    Render {
        template: String,
        #[source]
        source: RenderError,
    },

    #[error("template '{template}': {source}")]
    Delivery {
        template: String,
        #[source]
        source: DeliveryError,
    },
}

/// Runs generation passes against a plugin registry
#[derive(Clone)]
pub struct Engine<'r> {
    registry: &'r SourceRegistry,
    privilege: Privilege,
}

impl<'r> Engine<'r> {
    /// Engine delivering with the current process's privilege
    pub fn new(registry: &'r SourceRegistry) -> Self {
        Self {
            registry,
            privilege: Privilege::current(),
        }
    }

    pub fn with_privilege(mut self, privilege: Privilege) -> Self {
        self.privilege = privilege;
        self
    }

    /// Run one generation pass. `config` must already have its environment
    /// resolved.
    pub fn run(&self, mut config: Config) -> Result<Report, EngineError> {
        let environment = config.environment().to_string();
        let data_sources = self.registry.data_sources(&config.data_sources())?;
        let template_sources = self.registry.template_sources(&config.template_sources())?;
        info!(
            environment = %environment,
            data_sources = ?data_sources.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
            template_sources = ?template_sources.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
            "plugins loaded"
        );

        let mut conflicts = Vec::new();

        for source in &data_sources {
            let common = source.construct(&config)?.common();
            conflicts.extend(config.merge_common(&common, &source.name));
        }

        let strategy = config.merge_strategy();
        let mut global_values = Namespace::new();
        for source in &data_sources {
            let globals = source.construct(&config)?.global_values();
            conflicts.extend(
                Merger::new(Category::Global, &source.name)
                    .with_strategy(strategy)
                    .merge(&mut global_values, &globals),
            );
        }

        // every template starts from the environment key overlaid with globals
        let mut seed = Namespace::new();
        seed.insert("environment", environment.as_str());
        conflicts.extend(
            Merger::new(Category::Global, GLOBAL_SEED)
                .with_strategy(strategy)
                .merge(&mut seed, &global_values),
        );

        let templates = collect_templates(&template_sources, &config)?;
        debug!(count = templates.len(), "collected templates");

        let deliverer = Deliverer::new(self.privilege).with_checksum(config.checksum_enabled());
        let pass = Pass {
            config: &config,
            environment: &environment,
            data_sources: &data_sources,
            seed: &seed,
            strategy,
            deliverer: &deliverer,
        };

        let mut built = BTreeMap::new();
        for (id, content) in &templates {
            if let Some(record) = pass.build(id, content, &mut conflicts)? {
                built.insert(id.clone(), record);
            }
        }

        info!(built = built.len(), conflicts = conflicts.len(), "generation complete");

        Ok(Report {
            config,
            global_values,
            templates: built,
            conflicts,
        })
    }
}

/// Read-only state shared by every template of a pass
struct Pass<'a> {
    config: &'a Config,
    environment: &'a str,
    data_sources: &'a [NamedDataSource],
    seed: &'a Namespace,
    strategy: MergeStrategy,
    deliverer: &'a Deliverer,
}

impl Pass<'_> {
    fn build(
        &self,
        id: &str,
        content: &str,
        conflicts: &mut Vec<Conflict>,
    ) -> Result<Option<TemplateReport>, EngineError> {
        let mut namespace = self.seed.clone();

        let mut target_values = Namespace::new();
        for source in self.data_sources {
            let instance = source.construct(self.config)?;

            if let Some(values) = instance.values(id) {
                conflicts.extend(
                    Merger::new(Category::Data, &source.name)
                        .with_strategy(self.strategy)
                        .merge(&mut namespace, &values),
                );
            }

            conflicts.extend(
                Merger::new(Category::Target, &source.name).merge(&mut target_values, &instance.target_values(id)),
            );
        }

        let delivery_error = |source: DeliveryError| EngineError::Delivery {
            template: id.to_string(),
            source,
        };

        let target = match Target::from_metadata(&target_values).map_err(delivery_error)? {
            Some(target) => target,
            None => {
                debug!(template = %id, environment = %self.environment, "no target path, skipping template");
                return Ok(None);
            }
        };

        let rendered = render(content, &namespace).map_err(|source| EngineError::Render {
            template: id.to_string(),
            source,
        })?;

        let outcome = self
            .deliverer
            .deliver(&target, &rendered)
            .map_err(delivery_error)?;
        match outcome {
            DeliveryOutcome::Written => {
                info!(template = %id, path = %target.path.display(), "built template")
            }
            DeliveryOutcome::Unchanged => {
                info!(template = %id, path = %target.path.display(), "template unchanged")
            }
        }

        Ok(Some(TemplateReport {
            merged_values: strip_internal(&namespace),
            target_values: strip_internal(&target_values),
        }))
    }
}

/// Collect `id -> content` from every template source; later sources overwrite
fn collect_templates(
    sources: &[NamedTemplateSource],
    config: &Config,
) -> Result<BTreeMap<String, String>, SourceError> {
    let mut templates = BTreeMap::new();
    for source in sources {
        let instance = source.construct(config)?;
        for id in instance.templates()? {
            let content = instance.template(&id)?;
            if templates.insert(id.clone(), content).is_some() {
                debug!(template = %id, source = %source.name, "template content overwritten");
            }
        }
    }
    Ok(templates)
}
