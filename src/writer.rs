//! Streaming writer for partial documents.
//!
//! The output root is opened once, each unit is serialized on its own
//! (wrapped in the configured container element) and dropped right after,
//! and the root is closed at the end. Namespace declarations are emitted
//! only where the output scope does not already bind them; prefixes the
//! output cannot resolve are taken from the unit's namespace snapshot or,
//! as a last resort, synthesized (`ns0`, `ns1`, ...).

use std::io::Write;

use log::debug;

use crate::assembler::RootDescriptor;
use crate::error::{Error, Result};
use crate::namespace::{NamespaceContext, NsBinding};
use crate::partial::{Element, NodeId, NodeKind, Partial};
use crate::qname::QName;

/// io::Error → Error Konvertierung.
fn io_err(e: std::io::Error) -> Error {
    Error::IoError(e.to_string())
}

/// Schreibt einen String als Bytes in den Writer.
#[inline]
fn w(writer: &mut impl Write, s: &str) -> Result<()> {
    writer.write_all(s.as_bytes()).map_err(io_err)
}

/// XML-Escaping mit memchr3-SIMD: Sucht drei Zeichen gleichzeitig und ersetzt sie.
/// Grosse Bloecke ohne Escape-Zeichen werden in einem Stueck geschrieben.
fn write_escaped_memchr3(
    w: &mut impl Write,
    s: &str,
    needle: [u8; 3],
    replacement: [&[u8]; 3],
) -> Result<()> {
    let bytes = s.as_bytes();
    let mut start = 0;
    while start < bytes.len() {
        match memchr::memchr3(needle[0], needle[1], needle[2], &bytes[start..]) {
            Some(offset) => {
                let pos = start + offset;
                if start < pos {
                    w.write_all(&bytes[start..pos]).map_err(io_err)?;
                }
                let idx = if bytes[pos] == needle[0] {
                    0
                } else if bytes[pos] == needle[1] {
                    1
                } else {
                    2
                };
                w.write_all(replacement[idx]).map_err(io_err)?;
                start = pos + 1;
            }
            None => {
                w.write_all(&bytes[start..]).map_err(io_err)?;
                break;
            }
        }
    }
    Ok(())
}

/// XML-Escaping fuer Text-Inhalt: & < > → &amp; &lt; &gt;
fn write_escaped_text(w: &mut impl Write, s: &str) -> Result<()> {
    write_escaped_memchr3(w, s, [b'&', b'<', b'>'], [b"&amp;", b"&lt;", b"&gt;"])
}

/// XML-Escaping fuer Attribut-Werte: & < " → &amp; &lt; &quot;,
/// Tab, LF und CR als Zeichenreferenz.
fn write_escaped_attr(w: &mut impl Write, s: &str) -> Result<()> {
    let bytes = s.as_bytes();
    let mut start = 0;
    while let Some(offset) = memchr::memchr3(b'\t', b'\n', b'\r', &bytes[start..]) {
        let pos = start + offset;
        write_escaped_memchr3(w, &s[start..pos], [b'&', b'<', b'"'], [b"&amp;", b"&lt;", b"&quot;"])?;
        let reference: &[u8] = match bytes[pos] {
            b'\t' => b"&#9;",
            b'\n' => b"&#10;",
            _ => b"&#13;",
        };
        w.write_all(reference).map_err(io_err)?;
        start = pos + 1;
    }
    write_escaped_memchr3(w, &s[start..], [b'&', b'<', b'"'], [b"&amp;", b"&lt;", b"&quot;"])
}

/// Schreibt NS-Deklarationen in den Writer.
fn write_ns_decls(writer: &mut impl Write, ns_decls: &[NsBinding]) -> Result<()> {
    for ns in ns_decls {
        if ns.prefix.is_empty() {
            w(writer, " xmlns=\"")?;
        } else {
            w(writer, " xmlns:")?;
            w(writer, &ns.prefix)?;
            w(writer, "=\"")?;
        }
        write_escaped_attr(writer, &ns.uri)?;
        w(writer, "\"")?;
    }
    Ok(())
}

fn write_lexical(writer: &mut impl Write, prefix: &str, local: &str) -> Result<()> {
    if !prefix.is_empty() {
        w(writer, prefix)?;
        w(writer, ":")?;
    }
    w(writer, local)
}

/// Schreibt einen Kommentar, prueft auf XML-Restriktionen.
fn write_comment(writer: &mut impl Write, text: &str) -> Result<()> {
    if text.contains("--") || text.ends_with('-') {
        return Err(Error::XmlParseError(
            "comment text contains '--' or ends with '-'".into(),
        ));
    }
    w(writer, "<!--")?;
    w(writer, text)?;
    w(writer, "-->")
}

/// Schreibt eine Processing Instruction, prueft auf XML-Restriktionen.
fn write_pi(writer: &mut impl Write, target: &str, data: &str) -> Result<()> {
    if data.contains("?>") {
        return Err(Error::XmlParseError("PI data contains '?>'".into()));
    }
    w(writer, "<?")?;
    w(writer, target)?;
    if !data.is_empty() {
        w(writer, " ")?;
        w(writer, data)?;
    }
    w(writer, "?>")
}

/// CDATA-Section; `]]>` wird auf zwei Sections aufgeteilt.
fn write_cdata(writer: &mut impl Write, text: &str) -> Result<()> {
    w(writer, "<![CDATA[")?;
    w(writer, &text.replace("]]>", "]]]]><![CDATA[>"))?;
    w(writer, "]]>")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Fresh,
    Open,
    Closed,
}

/// Writes a root element around individually streamed units.
pub struct PartialWriter<W: Write> {
    out: W,
    state: State,
    root_tag: String,
    wrapper: Option<QName>,
    /// Bindings in scope at the current output position.
    scope: NamespaceContext,
    /// Prefix hints of the unit being written.
    hints: NamespaceContext,
    synthetic_ns_counter: usize,
    emitted: usize,
}

impl<W: Write> PartialWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            state: State::Fresh,
            root_tag: String::new(),
            wrapper: None,
            scope: NamespaceContext::new(),
            hints: NamespaceContext::new(),
            synthetic_ns_counter: 0,
            emitted: 0,
        }
    }

    pub fn is_open(&self) -> bool {
        self.state == State::Open
    }

    /// Number of units written by [`emit`](Self::emit).
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    /// Writes the XML declaration and the root start tag.
    pub fn open(&mut self, root: &RootDescriptor, ns: &NamespaceContext) -> Result<()> {
        if self.state != State::Fresh {
            return Err(Error::writer_state("open called twice"));
        }
        self.hints = ns.snapshot();
        w(&mut self.out, "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n")?;
        let element = Element {
            name: root.name.clone(),
            attributes: root.attributes.clone(),
            namespaces: root.namespaces.clone(),
        };
        self.root_tag = self.write_start(&element, false)?;
        self.state = State::Open;
        Ok(())
    }

    /// Container element every subsequently emitted unit is wrapped in.
    pub fn set_wrapper(&mut self, uri: &str, local_name: &str) {
        self.wrapper = Some(QName::new(uri, local_name));
    }

    /// Serializes `unit` inside the wrapper and drops it.
    pub fn emit(&mut self, unit: Partial, ns: &NamespaceContext) -> Result<()> {
        if self.state != State::Open {
            return Err(Error::writer_state("emit outside of an open document"));
        }
        self.hints = ns.clone();
        // Snapshot-Bindungen, die im Output noch fehlen, landen am Wrapper.
        let wrapper_tag = match self.wrapper.clone() {
            Some(name) => {
                let mut wrapper = Element::new(name);
                wrapper.namespaces = ns.bindings();
                Some(self.write_start(&wrapper, false)?)
            }
            None => None,
        };
        self.write_node(&unit, unit.root())?;
        if let Some(tag) = wrapper_tag {
            self.write_end(&tag)?;
        }
        self.emitted += 1;
        Ok(())
    }

    /// Writes the root end tag and flushes.
    pub fn close(&mut self) -> Result<()> {
        match self.state {
            State::Open => {}
            State::Fresh => return Err(Error::writer_state("close before open")),
            State::Closed => return Err(Error::writer_state("close called twice")),
        }
        let tag = std::mem::take(&mut self.root_tag);
        self.write_end(&tag)?;
        self.out.flush().map_err(io_err)?;
        self.state = State::Closed;
        debug!("writer closed after {} unit(s)", self.emitted);
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_node(&mut self, partial: &Partial, id: NodeId) -> Result<()> {
        match partial.kind(id) {
            NodeKind::Element(element) => {
                let children = partial.children(id);
                if children.is_empty() {
                    self.write_start(element, true)?;
                } else {
                    let tag = self.write_start(element, false)?;
                    for child in children {
                        self.write_node(partial, *child)?;
                    }
                    self.write_end(&tag)?;
                }
                Ok(())
            }
            NodeKind::Text(text) => write_escaped_text(&mut self.out, text),
            NodeKind::CData(text) => write_cdata(&mut self.out, text),
            NodeKind::Comment(text) => write_comment(&mut self.out, text),
            NodeKind::ProcessingInstruction { target, data } => {
                write_pi(&mut self.out, target, data)
            }
        }
    }

    /// Schreibt den Start-Tag, gibt den lexikalischen Namen fuer den End-Tag zurueck.
    fn write_start(&mut self, element: &Element, self_closing: bool) -> Result<String> {
        // Nur Deklarationen, die im Output-Scope noch fehlen.
        let mut decls: Vec<NsBinding> = element
            .namespaces
            .iter()
            .filter(|b| !self.scope.is_bound(&b.prefix, &b.uri))
            .cloned()
            .collect();
        self.scope.push_scope(decls.clone());

        let name = &element.name;
        let elem_prefix = if name.uri.is_empty() {
            self.bind(Some(""), "", false, &mut decls)
        } else {
            self.bind(name.prefix.as_deref(), &name.uri, false, &mut decls)
        };

        let mut attrs: Vec<(String, &QName, &str)> = Vec::with_capacity(element.attributes.len());
        for attr in &element.attributes {
            let prefix = if attr.name.uri.is_empty() {
                String::new()
            } else {
                self.bind(attr.name.prefix.as_deref(), &attr.name.uri, true, &mut decls)
            };
            attrs.push((prefix, &attr.name, attr.value.as_str()));
        }

        let mut tag = String::with_capacity(elem_prefix.len() + name.local_name.len() + 1);
        if !elem_prefix.is_empty() {
            tag.push_str(&elem_prefix);
            tag.push(':');
        }
        tag.push_str(&name.local_name);

        w(&mut self.out, "<")?;
        w(&mut self.out, &tag)?;
        write_ns_decls(&mut self.out, &decls)?;
        for (prefix, qname, value) in attrs {
            w(&mut self.out, " ")?;
            write_lexical(&mut self.out, &prefix, &qname.local_name)?;
            w(&mut self.out, "=\"")?;
            write_escaped_attr(&mut self.out, value)?;
            w(&mut self.out, "\"")?;
        }
        if self_closing {
            w(&mut self.out, "/>")?;
            self.scope.pop_scope();
        } else {
            w(&mut self.out, ">")?;
        }
        Ok(tag)
    }

    fn write_end(&mut self, tag: &str) -> Result<()> {
        w(&mut self.out, "</")?;
        w(&mut self.out, tag)?;
        w(&mut self.out, ">")?;
        self.scope.pop_scope();
        Ok(())
    }

    /// Liefert einen im Output gueltigen Prefix fuer `uri`, deklariert ihn bei Bedarf.
    ///
    /// Reihenfolge: gewuenschter Prefix, vorhandene Bindung im Scope,
    /// Hinweis aus dem Snapshot, synthetischer `nsN` Prefix.
    fn bind(
        &mut self,
        preferred: Option<&str>,
        uri: &str,
        attribute: bool,
        decls: &mut Vec<NsBinding>,
    ) -> String {
        if let Some(pfx) = preferred
            && !(attribute && pfx.is_empty())
        {
            if self.scope.is_bound(pfx, uri) {
                return pfx.to_string();
            }
            if !decls.iter().any(|d| &*d.prefix == pfx) {
                self.declare(pfx, uri, decls);
                return pfx.to_string();
            }
        }

        let existing = if attribute {
            self.scope.attribute_prefix_for_uri(uri)
        } else {
            self.scope.prefix_for_uri(uri)
        };
        if let Some(pfx) = existing {
            return pfx.to_string();
        }

        let hint = if attribute {
            self.hints.attribute_prefix_for_uri(uri)
        } else {
            self.hints.prefix_for_uri(uri)
        }
        .map(str::to_string);
        if let Some(pfx) = hint
            && !decls.iter().any(|d| *d.prefix == *pfx)
        {
            self.declare(&pfx, uri, decls);
            return pfx;
        }

        let synthetic = loop {
            let candidate = format!("ns{}", self.synthetic_ns_counter);
            self.synthetic_ns_counter += 1;
            if !self.scope.has_prefix(&candidate) {
                break candidate;
            }
        };
        self.declare(&synthetic, uri, decls);
        synthetic
    }

    fn declare(&mut self, prefix: &str, uri: &str, decls: &mut Vec<NsBinding>) {
        let binding = NsBinding::new(prefix, uri);
        self.scope.declare(binding.clone());
        decls.push(binding);
    }
}
