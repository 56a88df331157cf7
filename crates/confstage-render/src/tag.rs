//! Tag classification
//!
//! The body of a `<% ... %>` tag (delimiters and trim marker removed) is
//! classified into one of the supported tag kinds.

use std::sync::OnceLock;

use regex_lite::Regex;

/// A parsed template tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tag<'a> {
    /// `<%= reference %>`
    Output(&'a str),
    /// `<%# anything %>`
    Comment,
}

/// Why a tag body could not be classified
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagError {
    /// `<% code %>` blocks are not evaluated
    Code(String),
    /// `<%= %>` body is not a key reference
    Expression(String),
}

fn reference_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z0-9_]+)*$").expect("static pattern")
    })
}

/// Check whether `text` is a valid key reference (`port`, `db.host`, `servers.0`)
pub fn is_reference(text: &str) -> bool {
    reference_pattern().is_match(text)
}

impl<'a> Tag<'a> {
    pub fn parse(body: &'a str) -> Result<Self, TagError> {
        if let Some(expr) = body.strip_prefix('=') {
            let expr = expr.trim();
            if is_reference(expr) {
                Ok(Tag::Output(expr))
            } else {
                Err(TagError::Expression(expr.to_string()))
            }
        } else if body.starts_with('#') {
            Ok(Tag::Comment)
        } else {
            Err(TagError::Code(body.trim().to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_tag() {
        assert_eq!(Tag::parse("= port "), Ok(Tag::Output("port")));
        assert_eq!(Tag::parse("=db.host"), Ok(Tag::Output("db.host")));
    }

    #[test]
    fn test_comment_tag() {
        assert_eq!(Tag::parse("# note about port"), Ok(Tag::Comment));
    }

    #[test]
    fn test_code_tag_rejected() {
        assert_eq!(
            Tag::parse(" if x "),
            Err(TagError::Code("if x".to_string()))
        );
    }

    #[test]
    fn test_expression_rejected() {
        assert_eq!(
            Tag::parse("= port + 1"),
            Err(TagError::Expression("port + 1".to_string()))
        );
        assert!(Tag::parse("= ").is_err());
    }

    #[test]
    fn test_reference_pattern() {
        assert!(is_reference("env_home"));
        assert!(is_reference("servers.0"));
        assert!(!is_reference("0servers"));
        assert!(!is_reference("a..b"));
        assert!(!is_reference("a.b."));
    }
}
