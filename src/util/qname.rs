//! `QName` (qualified name) handling and lexical checks.
//!
//! A `QName` is a name of the form `prefix:localname` or just `localname` (with
//! no prefix). This module provides utilities for splitting qualified names
//! and for validating identifiers against the XML 1.0 `Name` production and
//! the Namespaces in XML 1.0 `NCName` / `QName` productions before they reach
//! the engine.
//!
//! See <https://www.w3.org/TR/xml-names/#NT-QName>

use crate::error::{Error, Result};

/// Returns `true` if `c` is a valid `NameStartChar` per XML 1.0 §2.3 `[4]`.
fn is_name_start_char(c: char) -> bool {
    matches!(c,
        ':' | 'A'..='Z' | '_' | 'a'..='z' |
        '\u{C0}'..='\u{D6}' | '\u{D8}'..='\u{F6}' | '\u{F8}'..='\u{2FF}' |
        '\u{370}'..='\u{37D}' | '\u{37F}'..='\u{1FFF}' |
        '\u{200C}'..='\u{200D}' | '\u{2070}'..='\u{218F}' |
        '\u{2C00}'..='\u{2FEF}' | '\u{3001}'..='\u{D7FF}' |
        '\u{F900}'..='\u{FDCF}' | '\u{FDF0}'..='\u{FFFD}' |
        '\u{10000}'..='\u{EFFFF}'
    )
}

/// Returns `true` if `c` is a valid `NameChar` per XML 1.0 §2.3 [4a].
fn is_name_char(c: char) -> bool {
    is_name_start_char(c)
        || matches!(c,
            '-' | '.' | '0'..='9' | '\u{B7}' |
            '\u{300}'..='\u{36F}' | '\u{203F}'..='\u{2040}'
        )
}

fn is_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(is_name_start_char) && chars.all(is_name_char)
}

fn is_nc_name(name: &str) -> bool {
    !name.contains(':') && is_name(name)
}

/// Splits a `QName` into its prefix and local name parts.
///
/// Returns `(Some(prefix), localname)` if the name contains a colon,
/// or `(None, localname)` if it does not.
///
/// # Examples
///
/// ```
/// use oxdom::util::qname::split_qname;
///
/// assert_eq!(split_qname("svg:rect"), (Some("svg"), "rect"));
/// assert_eq!(split_qname("div"), (None, "div"));
/// ```
#[must_use]
pub fn split_qname(qname: &str) -> (Option<&str>, &str) {
    match qname.find(':') {
        Some(pos) => (Some(&qname[..pos]), &qname[pos + 1..]),
        None => (None, qname),
    }
}

/// Checks that `name` matches the XML 1.0 `Name` production.
///
/// # Errors
///
/// Returns [`Error::InvalidOperation`] if it does not.
pub fn check_name(name: &str) -> Result<()> {
    if is_name(name) {
        Ok(())
    } else {
        Err(Error::invalid(format!("invalid XML name: {name:?}")))
    }
}

/// Checks that `name` is an `NCName` (a `Name` without colons).
///
/// # Errors
///
/// Returns [`Error::InvalidOperation`] if it is not.
pub fn check_nc_name(name: &str) -> Result<()> {
    if is_nc_name(name) {
        Ok(())
    } else {
        Err(Error::invalid(format!("invalid NCName: {name:?}")))
    }
}

/// Checks that `name` is a `QName`: an `NCName`, optionally preceded by an
/// `NCName` prefix and a single colon.
///
/// # Errors
///
/// Returns [`Error::InvalidOperation`] if it is not.
pub fn check_qname(name: &str) -> Result<()> {
    let valid = match split_qname(name) {
        (Some(prefix), local) => is_nc_name(prefix) && is_nc_name(local),
        (None, local) => is_nc_name(local),
    };
    if valid {
        Ok(())
    } else {
        Err(Error::invalid(format!("invalid QName: {name:?}")))
    }
}

/// Checks that `uri` is usable as a namespace name: non-empty, free of
/// whitespace and control characters, and with a well-formed scheme if it
/// has one.
///
/// # Errors
///
/// Returns [`Error::InvalidOperation`] if it is not.
pub fn check_uri(uri: &str) -> Result<()> {
    let bad = || Err(Error::invalid(format!("invalid namespace URI: {uri:?}")));
    if uri.is_empty() || uri.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return bad();
    }
    let scheme_end = uri.find(':');
    let path_start = uri.find(&['/', '?', '#'][..]);
    if let Some(colon) = scheme_end {
        if path_start.map_or(true, |p| colon < p) {
            let scheme = &uri[..colon];
            let mut chars = scheme.chars();
            let valid_scheme = chars.next().is_some_and(|c| c.is_ascii_alphabetic())
                && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
            if !valid_scheme {
                return bad();
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_qname_with_prefix() {
        assert_eq!(split_qname("xml:lang"), (Some("xml"), "lang"));
    }

    #[test]
    fn test_split_qname_without_prefix() {
        assert_eq!(split_qname("div"), (None, "div"));
    }

    #[test]
    fn test_split_qname_empty() {
        assert_eq!(split_qname(""), (None, ""));
    }

    #[test]
    fn test_split_qname_colon_at_start() {
        assert_eq!(split_qname(":local"), (Some(""), "local"));
    }

    #[test]
    fn test_split_qname_multiple_colons() {
        // Only splits on first colon
        assert_eq!(split_qname("a:b:c"), (Some("a"), "b:c"));
    }

    #[test]
    fn test_check_name() {
        assert!(check_name("a").is_ok());
        assert!(check_name("a:b").is_ok());
        assert!(check_name("_x-1.2").is_ok());
        assert!(check_name("").is_err());
        assert!(check_name("1a").is_err());
        assert!(check_name("a b").is_err());
    }

    #[test]
    fn test_check_nc_name() {
        assert!(check_nc_name("local").is_ok());
        assert!(check_nc_name("a:b").is_err());
        assert!(check_nc_name("-x").is_err());
    }

    #[test]
    fn test_check_qname() {
        assert!(check_qname("p:local").is_ok());
        assert!(check_qname("local").is_ok());
        assert!(matches!(check_qname("p:"), Err(Error::InvalidOperation(_))));
        assert!(check_qname(":local").is_err());
        assert!(check_qname("a:b:c").is_err());
        assert!(check_qname("1p:x").is_err());
    }

    #[test]
    fn test_check_uri() {
        assert!(check_uri("http://example.com/ns").is_ok());
        assert!(check_uri("urn:isbn:0451450523").is_ok());
        assert!(check_uri("relative/path").is_ok());
        assert!(check_uri("").is_err());
        assert!(check_uri("http://exa mple.com").is_err());
        assert!(check_uri("1http://x").is_err());
    }
}
