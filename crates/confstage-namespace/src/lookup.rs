//! Reference resolution against a namespace

use serde_json::Value;

use crate::Namespace;

/// Result of resolving a reference.
///
/// `Absent` is an ordinary outcome, not an error: callers decide how an
/// unresolved reference is presented.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Lookup<'a> {
    Found(&'a Value),
    Absent,
}

impl<'a> Lookup<'a> {
    pub fn is_absent(&self) -> bool {
        matches!(self, Lookup::Absent)
    }

    pub fn value(&self) -> Option<&'a Value> {
        match *self {
            Lookup::Found(v) => Some(v),
            Lookup::Absent => None,
        }
    }
}

impl Namespace {
    /// Resolve a dot-separated reference such as `db.host` or `servers.0`.
    ///
    /// Object segments are matched by key, array segments by index.
    pub fn lookup(&self, path: &str) -> Lookup<'_> {
        let mut parts = path.split('.');
        let first = match parts.next() {
            Some(p) if !p.is_empty() => p,
            _ => return Lookup::Absent,
        };

        let mut current = match self.get(first) {
            Some(v) => v,
            None => return Lookup::Absent,
        };

        for part in parts {
            let next = match current {
                Value::Object(map) => map.get(part),
                Value::Array(items) => part.parse::<usize>().ok().and_then(|i| items.get(i)),
                _ => None,
            };
            current = match next {
                Some(v) => v,
                None => return Lookup::Absent,
            };
        }

        Lookup::Found(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Namespace {
        Namespace::from_value(json!({
            "port": 8080,
            "db": {"host": "db.internal", "replicas": ["r1", "r2"]},
            "empty": null
        }))
        .unwrap()
    }

    #[test]
    fn test_top_level_key() {
        assert_eq!(sample().lookup("port"), Lookup::Found(&json!(8080)));
    }

    #[test]
    fn test_nested_key() {
        let ns = sample();
        assert_eq!(ns.lookup("db.host").value(), Some(&json!("db.internal")));
    }

    #[test]
    fn test_array_index() {
        let ns = sample();
        assert_eq!(ns.lookup("db.replicas.1").value(), Some(&json!("r2")));
        assert!(ns.lookup("db.replicas.7").is_absent());
    }

    #[test]
    fn test_missing_is_absent() {
        let ns = sample();
        assert!(ns.lookup("nope").is_absent());
        assert!(ns.lookup("db.port").is_absent());
        assert!(ns.lookup("port.deeper").is_absent());
        assert!(ns.lookup("").is_absent());
    }

    #[test]
    fn test_explicit_null_is_found() {
        assert_eq!(sample().lookup("empty"), Lookup::Found(&Value::Null));
    }
}
