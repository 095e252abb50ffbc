//! Qualified names and the namespace URIs of AIXM 5.1 basic messages.
//!
//! A [`QName`] is URI + local-name plus the prefix it was written with.
//! Two qnames are equal if URI and local-name match, regardless of prefix;
//! the prefix is only a serialization hint.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

/// AIXM 5.1 feature namespace.
pub const AIXM_NS: &str = "http://www.aixm.aero/schema/5.1";
/// AIXM 5.1 basic message namespace.
pub const MESSAGE_NS: &str = "http://www.aixm.aero/schema/5.1/message";
/// GML 3.2 namespace (identifier, gml:id, validTime).
pub const GML_NS: &str = "http://www.opengis.net/gml/3.2";
/// XLink namespace (xlink:href cross-references).
pub const XLINK_NS: &str = "http://www.w3.org/1999/xlink";
/// XML Schema instance namespace (xsi:nil).
pub const XSI_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";
/// Fest gebundener `xml:` Namespace.
pub const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

/// Qualified name: namespace URI, local name and optional prefix.
#[derive(Clone)]
pub struct QName {
    /// Namespace URI (empty string for "no namespace").
    pub uri: Rc<str>,
    /// Local part of the name.
    pub local_name: Rc<str>,
    /// Prefix as written in the source (or chosen for new nodes).
    pub prefix: Option<Rc<str>>,
}

impl QName {
    /// Erstellt einen QName ohne Prefix.
    pub fn new(uri: impl Into<Rc<str>>, local_name: impl Into<Rc<str>>) -> Self {
        Self {
            uri: uri.into(),
            local_name: local_name.into(),
            prefix: None,
        }
    }

    /// Erstellt einen QName mit Prefix.
    pub fn with_prefix(
        uri: impl Into<Rc<str>>,
        local_name: impl Into<Rc<str>>,
        prefix: impl Into<Rc<str>>,
    ) -> Self {
        Self {
            uri: uri.into(),
            local_name: local_name.into(),
            prefix: Some(prefix.into()),
        }
    }

    /// True if URI and local-name match.
    #[inline]
    pub fn is(&self, uri: &str, local_name: &str) -> bool {
        &*self.local_name == local_name && &*self.uri == uri
    }
}

impl PartialEq for QName {
    fn eq(&self, other: &Self) -> bool {
        self.uri == other.uri && self.local_name == other.local_name
    }
}

impl Eq for QName {}

impl Hash for QName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.uri.hash(state);
        self.local_name.hash(state);
    }
}

/// Lexikalische Form (`prefix:local` oder `local`).
impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.prefix.as_deref() {
            Some(pfx) if !pfx.is_empty() => write!(f, "{pfx}:{}", self.local_name),
            _ => f.write_str(&self.local_name),
        }
    }
}

impl fmt::Debug for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}{}", self.uri, self.local_name)?;
        if let Some(pfx) = &self.prefix {
            write!(f, " ({pfx})")?;
        }
        Ok(())
    }
}

/// Splits a lexical name at the first `:` into (prefix, local).
pub(crate) fn split_lexical(name: &str) -> (Option<&str>, &str) {
    match name.split_once(':') {
        Some((pfx, local)) => (Some(pfx), local),
        None => (None, name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_ignores_prefix() {
        let a = QName::with_prefix(AIXM_NS, "timeSlice", "aixm");
        let b = QName::with_prefix(AIXM_NS, "timeSlice", "a");
        let c = QName::new(AIXM_NS, "timeSlice");
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert_ne!(a, QName::new(GML_NS, "timeSlice"));
    }

    #[test]
    fn display_lexical_form() {
        assert_eq!(QName::with_prefix(GML_NS, "id", "gml").to_string(), "gml:id");
        assert_eq!(QName::new("", "plain").to_string(), "plain");
        assert_eq!(QName::with_prefix("urn:x", "e", "").to_string(), "e");
    }

    #[test]
    fn split_lexical_names() {
        assert_eq!(split_lexical("gml:identifier"), (Some("gml"), "identifier"));
        assert_eq!(split_lexical("identifier"), (None, "identifier"));
    }

    #[test]
    fn is_checks_uri_and_local() {
        let q = QName::with_prefix(MESSAGE_NS, "hasMember", "message");
        assert!(q.is(MESSAGE_NS, "hasMember"));
        assert!(!q.is(AIXM_NS, "hasMember"));
    }
}
