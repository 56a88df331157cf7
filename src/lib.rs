//! confstage - configuration assembly and process supervision
//!
//! Builds configuration files for a process from pluggable data sources and
//! template sources, writes them atomically, then launches the process and
//! relays termination signals to it for the rest of its life.

pub mod api;
pub mod config;
pub mod delivery;
pub mod engine;
#[cfg(unix)]
pub mod signal;
pub mod sources;
pub mod supervisor;

pub use api::{ApiError, StatusServer};
pub use config::{Config, ConfigError};
pub use delivery::{Deliverer, DeliveryError, Privilege, Target};
pub use engine::{Engine, EngineError, Report, TemplateReport};
pub use sources::{DataSource, SourceError, SourceRegistry, TemplateSource};
pub use supervisor::{ExecOverride, ExecSpec, Supervisor, SupervisorError};

pub use confstage_namespace::{Category, Conflict, Lookup, MergeStrategy, Namespace};
