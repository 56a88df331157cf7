//! Conflict-reporting merge
//!
//! Merge semantics:
//! - Key absent in base: inserted
//! - Key present with an equal value: silent
//! - Key present with a different value: override wins, one [`Conflict`] reported
//!
//! With [`MergeStrategy::Deep`], objects present on both sides are merged
//! recursively and conflicts are reported per leaf with a dotted key path.
//! Arrays and scalars are always replaced.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::Namespace;

/// Which merge a conflict originated from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Data-source overrides of the base configuration
    Common,
    /// Values shared by every template
    Global,
    /// Template-specific values
    Data,
    /// Template target metadata
    Target,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Common => "common",
            Category::Global => "global",
            Category::Data => "data",
            Category::Target => "target",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A key whose value was replaced by a later source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    /// Key, dotted for nested keys under deep merge
    pub key: String,
    pub old: Value,
    pub new: Value,
    pub category: Category,
    /// Name of the source whose value won
    pub source: String,
}

/// How nested objects are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeStrategy {
    /// Top-level keys only; nested objects are replaced whole
    #[default]
    Shallow,
    /// Objects on both sides are merged recursively
    Deep,
}

/// Merges override namespaces into a base on behalf of one source
#[derive(Debug, Clone)]
pub struct Merger<'a> {
    category: Category,
    source: &'a str,
    strategy: MergeStrategy,
}

impl<'a> Merger<'a> {
    pub fn new(category: Category, source: &'a str) -> Self {
        Self {
            category,
            source,
            strategy: MergeStrategy::Shallow,
        }
    }

    pub fn with_strategy(mut self, strategy: MergeStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Apply `overlay` on top of `base`, returning every reported conflict
    pub fn merge(&self, base: &mut Namespace, overlay: &Namespace) -> Vec<Conflict> {
        let mut conflicts = Vec::new();
        self.merge_map(&mut base.0, overlay.as_map(), "", &mut conflicts);
        conflicts
    }

    fn merge_map(
        &self,
        base: &mut Map<String, Value>,
        overlay: &Map<String, Value>,
        prefix: &str,
        conflicts: &mut Vec<Conflict>,
    ) {
        for (key, new) in overlay {
            let path = if prefix.is_empty() {
                key.clone()
            } else {
                format!("{}.{}", prefix, key)
            };

            match base.get_mut(key) {
                None => {
                    base.insert(key.clone(), new.clone());
                }
                Some(old) if *old == *new => {}
                Some(Value::Object(old_map))
                    if self.strategy == MergeStrategy::Deep && new.is_object() =>
                {
                    if let Value::Object(new_map) = new {
                        self.merge_map(old_map, new_map, &path, conflicts);
                    }
                }
                Some(old) => {
                    let previous = std::mem::replace(old, new.clone());
                    let conflict = Conflict {
                        key: path,
                        old: previous,
                        new: new.clone(),
                        category: self.category,
                        source: self.source.to_string(),
                    };
                    report(&conflict);
                    conflicts.push(conflict);
                }
            }
        }
    }
}

fn report(conflict: &Conflict) {
    warn!(
        key = %conflict.key,
        old = %conflict.old,
        new = %conflict.new,
        category = %conflict.category,
        source = %conflict.source,
        "merge conflict: value overridden"
    );
}

impl Namespace {
    /// Shallow merge of `overlay` into `self`; see [`Merger`]
    pub fn merge(&mut self, overlay: &Namespace, category: Category, source: &str) -> Vec<Conflict> {
        Merger::new(category, source).merge(self, overlay)
    }
}

/// Fold layers in order (first is lowest precedence, last wins)
pub fn fold<'a, I>(layers: I, category: Category, strategy: MergeStrategy) -> (Namespace, Vec<Conflict>)
where
    I: IntoIterator<Item = (&'a str, &'a Namespace)>,
{
    let mut merged = Namespace::new();
    let mut conflicts = Vec::new();
    for (source, layer) in layers {
        let merger = Merger::new(category, source).with_strategy(strategy);
        conflicts.extend(merger.merge(&mut merged, layer));
    }
    (merged, conflicts)
}
