//! Partial assembler: one incremental scan, one unit in memory.
//!
//! The document root is reported once as a [`RootDescriptor`]. Every
//! top-level child below it is accumulated into its own [`Partial`]
//! (and nothing else), classified by the [`BoundaryClassifier`] and handed
//! to a [`PartialHandler`] together with a snapshot of the namespace
//! bindings in scope at that child. The partial is dropped as soon as the
//! handler returns.

use std::borrow::Cow;
use std::io::{BufRead, BufReader, Read};

use log::{debug, trace};
use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{QName as XmlQName, ResolveResult};
use quick_xml::reader::NsReader;

use crate::boundary::{Boundary, BoundaryClassifier, UnitKind, AIXM_BOUNDARIES};
use crate::error::{Error, Result};
use crate::namespace::{NamespaceContext, NsBinding};
use crate::partial::{Attribute, Element, NodeKind, Partial, PartialBuilder};
use crate::qname::QName;

/// Name, attributes and namespace declarations of the document root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootDescriptor {
    pub name: QName,
    pub attributes: Vec<Attribute>,
    pub namespaces: Vec<NsBinding>,
}

/// A completed, classified top-level unit.
#[derive(Debug)]
pub enum Unit {
    Metadata(Partial),
    Feature(Partial),
}

impl Unit {
    pub fn kind(&self) -> UnitKind {
        match self {
            Self::Metadata(_) => UnitKind::Metadata,
            Self::Feature(_) => UnitKind::Feature,
        }
    }

    pub fn partial(&self) -> &Partial {
        match self {
            Self::Metadata(p) | Self::Feature(p) => p,
        }
    }

    pub fn into_partial(self) -> Partial {
        match self {
            Self::Metadata(p) | Self::Feature(p) => p,
        }
    }
}

/// Receiver of assembler callbacks, invoked in document order.
pub trait PartialHandler {
    /// Called exactly once, when the root start tag has been read.
    fn root_element(&mut self, _root: &RootDescriptor, _ns: &NamespaceContext) -> Result<()> {
        Ok(())
    }

    /// Called once for the first completed top-level child, before it is
    /// classified and dispatched.
    fn first_partial(&mut self, _partial: &Partial, _ns: &NamespaceContext) -> Result<()> {
        Ok(())
    }

    /// Called for every completed top-level child.
    fn handle_unit(&mut self, unit: Unit, ns: &NamespaceContext) -> Result<()>;
}

/// Counters of a finished scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssemblyStats {
    pub metadata_units: usize,
    pub feature_units: usize,
}

/// Incremental boundary-driven parser.
#[derive(Debug, Clone)]
pub struct PartialAssembler {
    boundaries: &'static [Boundary],
}

impl Default for PartialAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialAssembler {
    /// Assembler for AIXM 5.1 basic messages.
    pub fn new() -> Self {
        Self {
            boundaries: AIXM_BOUNDARIES,
        }
    }

    /// Scans `input` once and drives `handler`.
    pub fn run<R: Read, H: PartialHandler + ?Sized>(
        &self,
        input: R,
        handler: &mut H,
    ) -> Result<AssemblyStats> {
        let mut reader = NsReader::from_reader(BufReader::new(input));
        reader.config_mut().trim_text(false);

        let mut scan = ScanState::new(BoundaryClassifier::new(self.boundaries));
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) => {
                    let element = read_element(&reader, &e, &mut scan.ns)?;
                    scan.start(element, handler)?;
                }
                Ok(Event::Empty(e)) => {
                    let element = read_element(&reader, &e, &mut scan.ns)?;
                    scan.start(element, handler)?;
                    scan.end(handler)?;
                }
                Ok(Event::End(_e)) => scan.end(handler)?,
                Ok(Event::Text(e)) => {
                    let raw = std::str::from_utf8(e.as_ref())
                        .map_err(|er| Error::XmlParseError(er.to_string()))?;
                    let text = quick_xml::escape::unescape(raw)
                        .map_err(|er| Error::XmlParseError(er.to_string()))?;
                    scan.text(&normalize_line_endings(&text))?;
                }
                Ok(Event::CData(e)) => {
                    let text = String::from_utf8(e.into_inner().into_owned())
                        .map_err(|er| Error::XmlParseError(er.to_string()))?;
                    scan.node(NodeKind::CData(normalize_line_endings(&text).into_owned()));
                }
                Ok(Event::GeneralRef(e)) => {
                    let name = std::str::from_utf8(e.as_ref())
                        .map_err(|er| Error::XmlParseError(er.to_string()))?;
                    let resolved: Cow<'_, str> = if name.starts_with('#') {
                        let ch = resolve_char_reference(name).ok_or_else(|| {
                            Error::XmlParseError(format!("invalid character reference '&{name};'"))
                        })?;
                        Cow::Owned(ch.to_string())
                    } else if let Some(predefined) = resolve_predefined_entity(name) {
                        Cow::Borrowed(predefined)
                    } else {
                        // Keine DTD-Unterstuetzung: unbekannte Entities sind fatal.
                        return Err(Error::XmlParseError(format!(
                            "undeclared entity '&{name};'"
                        )));
                    };
                    scan.text(&resolved)?;
                }
                Ok(Event::Comment(e)) => {
                    let text = String::from_utf8(e.as_ref().to_vec())
                        .map_err(|er| Error::XmlParseError(er.to_string()))?;
                    scan.node(NodeKind::Comment(text));
                }
                Ok(Event::PI(e)) => {
                    let target = String::from_utf8(e.target().to_vec())
                        .map_err(|er| Error::XmlParseError(er.to_string()))?;
                    let data = std::str::from_utf8(e.content())
                        .map_err(|er| Error::XmlParseError(er.to_string()))?;
                    scan.node(NodeKind::ProcessingInstruction {
                        target,
                        data: data.trim_start().to_string(),
                    });
                }
                Ok(Event::Decl(_) | Event::DocType(_)) => {}
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(Error::XmlParseError(format!(
                        "parse XML error at {:?}: {e}",
                        reader.buffer_position()
                    )));
                }
            }

            buf.clear();
        }

        if !scan.root_seen {
            return Err(Error::XmlParseError("document has no root element".into()));
        }
        if scan.depth != 0 {
            return Err(Error::XmlParseError(format!(
                "unexpected end of input with {} open element(s)",
                scan.depth
            )));
        }
        debug!(
            "assembled {} metadata and {} feature unit(s)",
            scan.stats.metadata_units, scan.stats.feature_units
        );
        Ok(scan.stats)
    }
}

/// Convenience: [`PartialAssembler::run`] with the AIXM boundary table.
pub fn assemble<R: Read, H: PartialHandler + ?Sized>(
    input: R,
    handler: &mut H,
) -> Result<AssemblyStats> {
    PartialAssembler::new().run(input, handler)
}

/// Laufzustand eines Scans. Tiefe 1 = im Root, Tiefe >= 2 = in einer Partial.
struct ScanState {
    ns: NamespaceContext,
    classifier: BoundaryClassifier,
    depth: usize,
    builder: Option<PartialBuilder>,
    root_seen: bool,
    first_seen: bool,
    stats: AssemblyStats,
}

impl ScanState {
    fn new(classifier: BoundaryClassifier) -> Self {
        Self {
            ns: NamespaceContext::new(),
            classifier,
            depth: 0,
            builder: None,
            root_seen: false,
            first_seen: false,
            stats: AssemblyStats::default(),
        }
    }

    /// `element` has already been resolved and its scope pushed.
    fn start<H: PartialHandler + ?Sized>(&mut self, element: Element, handler: &mut H) -> Result<()> {
        match self.depth {
            0 => {
                if self.root_seen {
                    return Err(Error::XmlParseError(format!(
                        "second root element '{}'",
                        element.name
                    )));
                }
                self.root_seen = true;
                let root = RootDescriptor {
                    name: element.name,
                    attributes: element.attributes,
                    namespaces: element.namespaces,
                };
                handler.root_element(&root, &self.ns)?;
            }
            1 => {
                self.classifier.classify(&element.name);
                self.builder = Some(PartialBuilder::new(element));
            }
            _ => match self.builder.as_mut() {
                Some(builder) => builder.start_element(element),
                None => return Err(Error::XmlParseError("element outside of a unit".into())),
            },
        }
        self.depth += 1;
        Ok(())
    }

    fn end<H: PartialHandler + ?Sized>(&mut self, handler: &mut H) -> Result<()> {
        self.depth = self.depth.checked_sub(1).ok_or_else(|| {
            Error::XmlParseError("unexpected end element at depth 0".to_string())
        })?;
        match self.depth {
            0 => self.ns.pop_scope(),
            1 => {
                let Some(builder) = self.builder.take() else {
                    return Err(Error::XmlParseError("unbalanced top-level element".into()));
                };
                let snapshot = self.ns.snapshot();
                self.ns.pop_scope();
                self.dispatch(builder.finish(), &snapshot, handler)?;
            }
            _ => {
                if let Some(builder) = self.builder.as_mut() {
                    builder.end_element();
                }
                self.ns.pop_scope();
            }
        }
        Ok(())
    }

    fn dispatch<H: PartialHandler + ?Sized>(
        &mut self,
        partial: Partial,
        ns: &NamespaceContext,
        handler: &mut H,
    ) -> Result<()> {
        if !self.first_seen {
            self.first_seen = true;
            handler.first_partial(&partial, ns)?;
        }
        let root_name = partial
            .element(partial.root())
            .map(|e| e.name.clone())
            .ok_or_else(|| Error::XmlParseError("unit without root element".into()))?;
        let unit = match self.classifier.current(&root_name)? {
            UnitKind::Metadata => {
                self.stats.metadata_units += 1;
                Unit::Metadata(partial)
            }
            UnitKind::Feature => {
                self.stats.feature_units += 1;
                Unit::Feature(partial)
            }
        };
        trace!("dispatching {:?} unit <{root_name}>", unit.kind());
        handler.handle_unit(unit, ns)
    }

    fn text(&mut self, text: &str) -> Result<()> {
        if text.is_empty() {
            return Ok(());
        }
        match self.depth {
            0 if !text.trim().is_empty() => Err(Error::XmlParseError(
                "character data outside root element".to_string(),
            )),
            // Text zwischen Units gehoert zu keiner Partial.
            0 | 1 => Ok(()),
            _ => {
                if let Some(builder) = self.builder.as_mut() {
                    builder.text(text);
                }
                Ok(())
            }
        }
    }

    /// Comments, PIs and CDATA; dropped outside of units.
    fn node(&mut self, kind: NodeKind) {
        if self.depth >= 2
            && let Some(builder) = self.builder.as_mut()
        {
            builder.node(kind);
        }
    }
}

/// Resolves a start tag through the reader's namespace scope.
///
/// The element's own declarations are also pushed onto `ns`, which only
/// feeds the snapshot handed to handlers.
fn read_element<B: BufRead>(
    reader: &NsReader<B>,
    e: &BytesStart<'_>,
    ns: &mut NamespaceContext,
) -> Result<Element> {
    let mut decls = Vec::new();
    let mut attributes = Vec::new();

    for attr in e.attributes() {
        let attr = attr.map_err(|er| Error::XmlParseError(er.to_string()))?;
        let raw = std::str::from_utf8(attr.value.as_ref())
            .map_err(|er| Error::XmlParseError(er.to_string()))?;
        let value = quick_xml::escape::unescape(raw)
            .map_err(|er| Error::XmlParseError(er.to_string()))?;
        let value = normalize_line_endings(&value).into_owned();

        let key = attr.key.as_ref();
        if key == b"xmlns" {
            decls.push(NsBinding::new("", value));
        } else if let Some(prefix) = key.strip_prefix(b"xmlns:") {
            decls.push(NsBinding::new(utf8(prefix)?, value));
        } else {
            let (resolved, local) = reader.resolver().resolve_attribute(attr.key);
            let name = resolve_qname(resolved, local.as_ref(), attr.key)?;
            attributes.push(Attribute { name, value });
        }
    }

    let (resolved, local) = reader.resolver().resolve_element(e.name());
    let name = resolve_qname(resolved, local.as_ref(), e.name())?;

    ns.push_scope(decls.clone());
    Ok(Element {
        name,
        attributes,
        namespaces: decls,
    })
}

fn resolve_qname(resolved: ResolveResult<'_>, local: &[u8], raw: XmlQName<'_>) -> Result<QName> {
    let local = utf8(local)?;
    let uri = match resolved {
        ResolveResult::Bound(uri) => utf8(uri.0)?,
        ResolveResult::Unbound => "",
        ResolveResult::Unknown(prefix) => {
            return Err(Error::XmlParseError(format!(
                "unknown namespace prefix '{}' on '{}'",
                String::from_utf8_lossy(&prefix),
                String::from_utf8_lossy(raw.as_ref())
            )));
        }
    };
    Ok(match raw.prefix() {
        Some(prefix) => QName::with_prefix(uri, local, utf8(prefix.as_ref())?),
        None => QName::new(uri, local),
    })
}

fn utf8(bytes: &[u8]) -> Result<&str> {
    std::str::from_utf8(bytes).map_err(|er| Error::XmlParseError(er.to_string()))
}

/// `&#NN;` / `&#xHH;` to char.
fn resolve_char_reference(name: &str) -> Option<char> {
    let num = name.strip_prefix('#')?;
    let code = match num.strip_prefix('x') {
        Some(hex) => u32::from_str_radix(hex, 16).ok()?,
        None => num.parse::<u32>().ok()?,
    };
    char::from_u32(code)
}

/// XML 1.0 Sec. 2.11: \r\n -> \n, alleinstehende \r -> \n
fn normalize_line_endings(s: &str) -> Cow<'_, str> {
    if memchr::memchr(b'\r', s.as_bytes()).is_none() {
        return Cow::Borrowed(s);
    }
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\r' {
            if matches!(chars.peek(), Some('\n')) {
                chars.next();
            }
            out.push('\n');
        } else {
            out.push(ch);
        }
    }
    Cow::Owned(out)
}
