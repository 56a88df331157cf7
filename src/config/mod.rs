//! Configuration
//!
//! Three silent layers:
//! 1. Built-in defaults
//! 2. Base file (`<base_dir>/common.yaml` by default; YAML, TOML or JSON)
//! 3. CLI flags
//!
//! followed by environment resolution and data-source `common` overrides,
//! which are reported on conflict.

mod defaults;
mod document;
mod effective;
mod merge;

pub use defaults::{BuiltinDefaults, DEFAULT_API_PORT, DEFAULT_BASE_DIR};
pub use document::{parse_document, read_document, Document, DocumentError, DocumentFormat};
pub use effective::{
    Config, ConfigError, ConfigOrigin, ConfigSource, FormatVersion, CONFIG_VERSION_KEY,
    ENVIRONMENT_VAR,
};
pub use merge::{layer, layer_all};
