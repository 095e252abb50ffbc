//! Namespace context for detached subtrees.
//!
//! A partial loses its ancestor chain once it is cut out of the document,
//! so the prefix→URI bindings that were in scope have to travel with it.
//! The assembler pushes one scope per open element and hands a flattened
//! [`NamespaceContext::snapshot`] to the handler when a partial completes.

use std::rc::Rc;

use crate::qname::XML_NS;

/// One `xmlns` / `xmlns:prefix` declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NsBinding {
    /// Declared prefix, empty string for the default namespace.
    pub prefix: Rc<str>,
    /// Bound namespace URI (empty string undeclares the default namespace).
    pub uri: Rc<str>,
}

impl NsBinding {
    pub fn new(prefix: impl Into<Rc<str>>, uri: impl Into<Rc<str>>) -> Self {
        Self {
            prefix: prefix.into(),
            uri: uri.into(),
        }
    }
}

/// Stack of namespace scopes, innermost last.
#[derive(Debug, Clone, Default)]
pub struct NamespaceContext {
    scopes: Vec<Vec<NsBinding>>,
}

impl NamespaceContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Oeffnet einen neuen Scope mit den Deklarationen eines Elements.
    pub fn push_scope(&mut self, decls: Vec<NsBinding>) {
        self.scopes.push(decls);
    }

    /// Schliesst den innersten Scope.
    pub fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    /// Number of open scopes.
    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Fuegt eine Bindung zum innersten Scope hinzu (oeffnet einen, falls keiner existiert).
    pub fn declare(&mut self, binding: NsBinding) {
        match self.scopes.last_mut() {
            Some(scope) => scope.push(binding),
            None => self.scopes.push(vec![binding]),
        }
    }

    /// Resolves `prefix` to its URI. The empty prefix is the default namespace.
    ///
    /// `xml` is always bound. An undeclared default namespace (or one reset
    /// with `xmlns=""`) resolves to `None`.
    pub fn resolve_prefix(&self, prefix: &str) -> Option<&str> {
        if prefix == "xml" {
            return Some(XML_NS);
        }
        let uri = self
            .scopes
            .iter()
            .rev()
            .flat_map(|scope| scope.iter().rev())
            .find(|b| &*b.prefix == prefix)
            .map(|b| &*b.uri)?;
        if uri.is_empty() { None } else { Some(uri) }
    }

    /// Preferred prefix for `uri`, the default namespace (`""`) included.
    ///
    /// Only bindings that are not shadowed by an inner declaration of the
    /// same prefix qualify.
    pub fn prefix_for_uri(&self, uri: &str) -> Option<&str> {
        if uri == XML_NS {
            return Some("xml");
        }
        self.scopes
            .iter()
            .rev()
            .flat_map(|scope| scope.iter().rev())
            .filter(|b| &*b.uri == uri)
            .map(|b| &*b.prefix)
            .find(|pfx| self.resolve_prefix(pfx) == Some(uri))
    }

    /// Like [`prefix_for_uri`](Self::prefix_for_uri), but never the default
    /// namespace. Attributes cannot use an empty prefix.
    pub fn attribute_prefix_for_uri(&self, uri: &str) -> Option<&str> {
        if uri == XML_NS {
            return Some("xml");
        }
        self.scopes
            .iter()
            .rev()
            .flat_map(|scope| scope.iter().rev())
            .filter(|b| &*b.uri == uri && !b.prefix.is_empty())
            .map(|b| &*b.prefix)
            .find(|pfx| self.resolve_prefix(pfx) == Some(uri))
    }

    /// True if `prefix` is bound to exactly `uri` in the current scope chain.
    ///
    /// For the empty prefix, an empty `uri` matches "no default namespace".
    pub fn is_bound(&self, prefix: &str, uri: &str) -> bool {
        match self.resolve_prefix(prefix) {
            Some(bound) => bound == uri,
            None => prefix.is_empty() && uri.is_empty(),
        }
    }

    /// True if `prefix` is declared anywhere in the scope chain.
    pub fn has_prefix(&self, prefix: &str) -> bool {
        prefix == "xml" || self.scopes.iter().flatten().any(|b| &*b.prefix == prefix)
    }

    /// Effective bindings in declaration order (outermost first), each prefix once.
    pub fn bindings(&self) -> Vec<NsBinding> {
        let mut out: Vec<NsBinding> = Vec::new();
        for binding in self.scopes.iter().flatten() {
            if let Some(existing) = out.iter_mut().find(|b| b.prefix == binding.prefix) {
                existing.uri = binding.uri.clone();
            } else {
                out.push(binding.clone());
            }
        }
        out
    }

    /// Flattened copy of the bindings currently in scope (one scope deep).
    pub fn snapshot(&self) -> NamespaceContext {
        NamespaceContext {
            scopes: vec![self.bindings()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qname::{AIXM_NS, GML_NS};

    fn ctx() -> NamespaceContext {
        let mut ns = NamespaceContext::new();
        ns.push_scope(vec![
            NsBinding::new("aixm", AIXM_NS),
            NsBinding::new("gml", GML_NS),
            NsBinding::new("", "urn:default"),
        ]);
        ns
    }

    #[test]
    fn resolves_prefixes_and_default() {
        let ns = ctx();
        assert_eq!(ns.resolve_prefix("aixm"), Some(AIXM_NS));
        assert_eq!(ns.resolve_prefix(""), Some("urn:default"));
        assert_eq!(ns.resolve_prefix("xml"), Some(XML_NS));
        assert_eq!(ns.resolve_prefix("nope"), None);
    }

    #[test]
    fn inner_scope_shadows_outer() {
        let mut ns = ctx();
        ns.push_scope(vec![NsBinding::new("aixm", "urn:other")]);
        assert_eq!(ns.resolve_prefix("aixm"), Some("urn:other"));
        // Outer binding is shadowed, so no prefix maps to AIXM any more.
        assert_eq!(ns.prefix_for_uri(AIXM_NS), None);
        ns.pop_scope();
        assert_eq!(ns.prefix_for_uri(AIXM_NS), Some("aixm"));
    }

    #[test]
    fn default_namespace_can_be_reset() {
        let mut ns = ctx();
        ns.push_scope(vec![NsBinding::new("", "")]);
        assert_eq!(ns.resolve_prefix(""), None);
        assert!(ns.is_bound("", ""));
    }

    #[test]
    fn attribute_prefix_skips_default() {
        let mut ns = NamespaceContext::new();
        ns.push_scope(vec![NsBinding::new("", GML_NS)]);
        assert_eq!(ns.prefix_for_uri(GML_NS), Some(""));
        assert_eq!(ns.attribute_prefix_for_uri(GML_NS), None);
        ns.push_scope(vec![NsBinding::new("g", GML_NS)]);
        assert_eq!(ns.attribute_prefix_for_uri(GML_NS), Some("g"));
    }

    #[test]
    fn snapshot_flattens_and_survives_pops() {
        let mut ns = ctx();
        ns.push_scope(vec![
            NsBinding::new("xlink", "http://www.w3.org/1999/xlink"),
            NsBinding::new("gml", "urn:gml-override"),
        ]);
        let snap = ns.snapshot();
        ns.pop_scope();
        ns.pop_scope();
        assert_eq!(ns.depth(), 0);
        assert_eq!(snap.depth(), 1);
        assert_eq!(snap.resolve_prefix("xlink"), Some("http://www.w3.org/1999/xlink"));
        assert_eq!(snap.resolve_prefix("gml"), Some("urn:gml-override"));
        assert_eq!(snap.bindings().len(), 4);
    }
}
