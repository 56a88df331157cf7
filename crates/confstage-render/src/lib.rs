//! ERB-style template rendering.
//!
//! Supported syntax:
//! - `<%= key %>` / `<%= db.host %>`: substitute a namespace value
//! - `<%# comment %>`: dropped from output
//! - `<%%`: literal `<%`
//! - `-%>`: closing a tag this way also drops the newline that follows
//!
//! A reference that does not resolve renders as the empty string. Code blocks
//! (`<% ... %>`) and arbitrary expressions are rejected.

mod tag;

pub use tag::is_reference;

use confstage_namespace::{Lookup, Namespace};
use serde_json::Value;
use tracing::debug;

use tag::{Tag, TagError};

/// Errors raised while rendering
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    #[error("unterminated tag at byte {offset}")]
    Unterminated { offset: usize },

    #[error("code blocks are not supported at byte {offset}: '{code}'")]
    UnsupportedCode { offset: usize, code: String },

    #[error("unsupported expression at byte {offset}: '{expression}'")]
    UnsupportedExpression { offset: usize, expression: String },
}

/// Render `template` against `namespace`.
pub fn render(template: &str, namespace: &Namespace) -> Result<String, RenderError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    let mut offset = 0;

    while let Some(start) = rest.find("<%") {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];

        if let Some(escaped) = after_open.strip_prefix('%') {
            out.push_str("<%");
            offset += start + 3;
            rest = escaped;
            continue;
        }

        let tag_offset = offset + start;
        let close = after_open
            .find("%>")
            .ok_or(RenderError::Unterminated { offset: tag_offset })?;
        let body = &after_open[..close];
        let (body, trim_newline) = match body.strip_suffix('-') {
            Some(b) => (b, true),
            None => (body, false),
        };

        match Tag::parse(body) {
            Ok(Tag::Output(reference)) => out.push_str(&resolve(namespace, reference)),
            Ok(Tag::Comment) => {}
            Err(TagError::Code(code)) => {
                return Err(RenderError::UnsupportedCode {
                    offset: tag_offset,
                    code,
                })
            }
            Err(TagError::Expression(expression)) => {
                return Err(RenderError::UnsupportedExpression {
                    offset: tag_offset,
                    expression,
                })
            }
        }

        let mut consumed = start + 2 + close + 2;
        if trim_newline {
            let next = &rest[consumed..];
            if let Some(stripped) = next.strip_prefix("\r\n").or_else(|| next.strip_prefix('\n')) {
                consumed += next.len() - stripped.len();
            }
        }
        offset += consumed;
        rest = &rest[consumed..];
    }

    out.push_str(rest);
    Ok(out)
}

fn resolve(namespace: &Namespace, reference: &str) -> String {
    match namespace.lookup(reference) {
        Lookup::Found(value) => format_value(value),
        Lookup::Absent => {
            debug!(reference, "unresolved reference rendered empty");
            String::new()
        }
    }
}

/// Text form of a value inside rendered output.
///
/// Strings are inserted raw, `null` is empty, containers are compact JSON.
pub fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}
