//! Restricted structural queries over a [`Partial`].
//!
//! Supported grammar (nothing more):
//!
//! ```text
//! path      := step ('/' step)* ('/@' qname)?  |  '@' qname
//! step      := ['descendant::'] nametest [predicate]
//! nametest  := qname | '*'
//! predicate := '[@' qname '=' ('"' value '"' | "'" value "'") ']'
//! ```
//!
//! Prefixes resolve through a fixed table: `aixm`, `gml`, `xlink`, `xsi`,
//! `message`, `xml`. Results come back in traversal order without duplicates.

use std::str::FromStr;

use crate::FastHashSet;
use crate::error::{Error, Result};
use crate::partial::{NodeId, Partial};
use crate::qname::{AIXM_NS, GML_NS, MESSAGE_NS, QName, XLINK_NS, XML_NS, XSI_NS, split_lexical};

/// Fixed prefix table for query expressions.
fn resolve_query_prefix(prefix: &str) -> Option<&'static str> {
    match prefix {
        "aixm" => Some(AIXM_NS),
        "gml" => Some(GML_NS),
        "xlink" => Some(XLINK_NS),
        "xsi" => Some(XSI_NS),
        "message" => Some(MESSAGE_NS),
        "xml" => Some(XML_NS),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum NameTest {
    Any,
    Name(QName),
}

impl NameTest {
    fn matches(&self, name: &QName) -> bool {
        match self {
            Self::Any => true,
            Self::Name(q) => q == name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Step {
    descendant: bool,
    test: NameTest,
    predicate: Option<(QName, String)>,
}

/// A compiled path expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Path {
    steps: Vec<Step>,
    attribute: Option<QName>,
}

impl FromStr for Path {
    type Err = Error;

    fn from_str(expr: &str) -> Result<Self> {
        Parser { expr, rest: expr.trim() }.parse()
    }
}

impl Path {
    /// Element nodes selected by the step list (the attribute part is ignored).
    pub fn select(&self, partial: &Partial, context: NodeId) -> Vec<NodeId> {
        let mut current = vec![context];
        for step in &self.steps {
            let mut seen: FastHashSet<NodeId> = FastHashSet::default();
            let mut next = Vec::new();
            for node in current {
                let candidates: Vec<NodeId> = if step.descendant {
                    partial.descendant_elements(node)
                } else {
                    partial.child_elements(node).collect()
                };
                for cand in candidates {
                    let Some(element) = partial.element(cand) else {
                        continue;
                    };
                    if !step.test.matches(&element.name) {
                        continue;
                    }
                    if let Some((attr, value)) = &step.predicate
                        && element.attribute(&attr.uri, &attr.local_name) != Some(value.as_str())
                    {
                        continue;
                    }
                    if seen.insert(cand) {
                        next.push(cand);
                    }
                }
            }
            current = next;
        }
        current
    }

    /// `(element, attribute name)` pairs for a path ending in `/@name`.
    pub fn select_attributes(&self, partial: &Partial, context: NodeId) -> Vec<(NodeId, QName)> {
        let Some(attr) = &self.attribute else {
            return Vec::new();
        };
        self.select(partial, context)
            .into_iter()
            .filter(|id| partial.attribute(*id, &attr.uri, &attr.local_name).is_some())
            .map(|id| (id, attr.clone()))
            .collect()
    }
}

/// All elements matching `expr`, relative to `context`.
pub fn find_all(partial: &Partial, context: NodeId, expr: &str) -> Result<Vec<NodeId>> {
    Ok(expr.parse::<Path>()?.select(partial, context))
}

/// First element matching `expr`, relative to `context`.
pub fn find_one(partial: &Partial, context: NodeId, expr: &str) -> Result<Option<NodeId>> {
    Ok(find_all(partial, context, expr)?.into_iter().next())
}

/// Attributes selected by an `.../@name` expression.
pub fn find_attributes(
    partial: &Partial,
    context: NodeId,
    expr: &str,
) -> Result<Vec<(NodeId, QName)>> {
    let path: Path = expr.parse()?;
    if path.attribute.is_none() {
        return Err(Error::InvalidPath(expr.to_string()));
    }
    Ok(path.select_attributes(partial, context))
}

struct Parser<'a> {
    expr: &'a str,
    rest: &'a str,
}

impl Parser<'_> {
    fn err(&self) -> Error {
        Error::InvalidPath(self.expr.to_string())
    }

    fn parse(mut self) -> Result<Path> {
        if self.rest.is_empty() {
            return Err(self.err());
        }
        let mut steps = Vec::new();
        let mut attribute = None;
        loop {
            if let Some(name) = self.rest.strip_prefix('@') {
                attribute = Some(self.qname(name)?);
                break;
            }
            let mut descendant = false;
            if let Some(r) = self.rest.strip_prefix("descendant::") {
                descendant = true;
                self.rest = r;
            }
            let end = self.rest.find(['/', '[']).unwrap_or(self.rest.len());
            let test = match &self.rest[..end] {
                "*" => NameTest::Any,
                name => NameTest::Name(self.qname(name)?),
            };
            self.rest = &self.rest[end..];
            let predicate = if self.rest.starts_with('[') {
                Some(self.predicate()?)
            } else {
                None
            };
            steps.push(Step {
                descendant,
                test,
                predicate,
            });
            if self.rest.is_empty() {
                break;
            }
            self.rest = self.rest.strip_prefix('/').ok_or_else(|| self.err())?;
            if self.rest.is_empty() {
                return Err(self.err());
            }
        }
        Ok(Path { steps, attribute })
    }

    /// `[@name = "value"]`, `self.rest` starts at `[`.
    fn predicate(&mut self) -> Result<(QName, String)> {
        let rest = self.rest;
        let body = rest[1..].trim_start();
        let body = body.strip_prefix('@').ok_or_else(|| self.err())?;
        let eq = body.find('=').ok_or_else(|| self.err())?;
        let name = self.qname(body[..eq].trim())?;
        let after = body[eq + 1..].trim_start();
        let quote = after
            .chars()
            .next()
            .filter(|c| *c == '"' || *c == '\'')
            .ok_or_else(|| self.err())?;
        let value_and_tail = &after[1..];
        let close = value_and_tail.find(quote).ok_or_else(|| self.err())?;
        let value = value_and_tail[..close].to_string();
        let tail = value_and_tail[close + 1..].trim_start();
        self.rest = tail.strip_prefix(']').ok_or_else(|| self.err())?;
        Ok((name, value))
    }

    /// Unprefixed names are in no namespace, for elements and attributes alike.
    fn qname(&self, lexical: &str) -> Result<QName> {
        let valid = lexical.starts_with(|c: char| c.is_alphabetic() || c == '_')
            && lexical
                .chars()
                .all(|c| c.is_alphanumeric() || matches!(c, ':' | '_' | '-' | '.'));
        if !valid {
            return Err(self.err());
        }
        match split_lexical(lexical) {
            (Some(prefix), local) => {
                let uri = resolve_query_prefix(prefix).ok_or_else(|| self.err())?;
                Ok(QName::with_prefix(uri, local, prefix))
            }
            (None, local) => Ok(QName::new("", local)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partial::{Element, NodeKind};

    fn el(uri: &str, pfx: &str, local: &str) -> Element {
        Element::new(QName::with_prefix(uri, local, pfx))
    }

    /// Airspace / timeSlice / AirspaceTimeSlice { annotation[nil], annotation, x(href) }
    fn feature() -> (Partial, Vec<NodeId>) {
        let mut p = Partial::new(el(AIXM_NS, "aixm", "Airspace"));
        let root = p.root();
        let ts = p.append(root, NodeKind::Element(el(AIXM_NS, "aixm", "timeSlice")));
        let ats = p.append(ts, NodeKind::Element(el(AIXM_NS, "aixm", "AirspaceTimeSlice")));
        let mut nil = el(AIXM_NS, "aixm", "annotation");
        nil.set_attribute(QName::with_prefix(XSI_NS, "nil", "xsi"), "true");
        let a1 = p.append(ats, NodeKind::Element(nil));
        let a2 = p.append(ats, NodeKind::Element(el(AIXM_NS, "aixm", "annotation")));
        let mut link = el(AIXM_NS, "aixm", "clientAirspace");
        link.set_attribute(QName::with_prefix(XLINK_NS, "href", "xlink"), "urn:uuid:x");
        let x = p.append(ats, NodeKind::Element(link));
        (p, vec![ts, ats, a1, a2, x])
    }

    #[test]
    fn child_steps() {
        let (p, ids) = feature();
        let found = find_all(&p, p.root(), "aixm:timeSlice/*").unwrap();
        assert_eq!(found, vec![ids[1]]);
        assert_eq!(find_one(&p, p.root(), "aixm:annotation").unwrap(), None);
    }

    #[test]
    fn descendant_with_predicate() {
        let (p, ids) = feature();
        let found = find_all(&p, p.root(), r#"descendant::aixm:annotation[@xsi:nil="true"]"#).unwrap();
        assert_eq!(found, vec![ids[2]]);
        let single = find_one(&p, ids[1], "aixm:annotation[@xsi:nil = 'true']").unwrap();
        assert_eq!(single, Some(ids[2]));
    }

    #[test]
    fn attribute_selection() {
        let (p, ids) = feature();
        let attrs = find_attributes(&p, p.root(), "descendant::*/@xlink:href").unwrap();
        assert_eq!(attrs.len(), 1);
        assert_eq!(attrs[0].0, ids[4]);
        assert!(attrs[0].1.is(XLINK_NS, "href"));
    }

    #[test]
    fn nested_descendant_steps_do_not_duplicate() {
        let (p, _) = feature();
        let found = find_all(&p, p.root(), "descendant::*/descendant::aixm:annotation").unwrap();
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn rejects_unsupported_expressions() {
        for expr in ["", "aixm:a//b", "foo:bar", "aixm:a[1]", "aixm:a/", "aixm:a[@b=c]", "..", "@"] {
            let err = expr.parse::<Path>().unwrap_err();
            assert!(matches!(err, Error::InvalidPath(_)), "{expr}: {err}");
        }
    }

    #[test]
    fn find_attributes_requires_attribute_part() {
        let (p, _) = feature();
        assert!(find_attributes(&p, p.root(), "aixm:timeSlice").is_err());
    }
}
