//! Pass 2: substitution.
//!
//! Second scan over the same message. Every feature unit is reduced to its
//! most current time slice, stamped with the effective date, re-identified
//! through the maps of pass 1, optionally annotated, and streamed to the
//! output. Metadata units are not written.

use std::borrow::Cow;
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use log::{debug, trace, warn};
use uuid::Uuid;

use crate::annotation::{AnnotationOrder, DefaultAnnotationOrder};
use crate::assembler::{PartialHandler, RootDescriptor, Unit, assemble};
use crate::datetime::DateTime;
use crate::error::{Error, Result};
use crate::identifiers::{IdentifierMaps, extract_identifiers_from_path};
use crate::namespace::NamespaceContext;
use crate::partial::{Element, NodeId, NodeKind, Partial};
use crate::qname::{AIXM_NS, GML_NS, MESSAGE_NS, QName, XLINK_NS};
use crate::query::Path as QueryPath;
use crate::writer::PartialWriter;
use crate::xref::{gml_id_for, rewrite_reference};

/// Configuration of pass 2.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubstitutionParams {
    /// New validity start of every kept time slice.
    pub effective_date: DateTime,
    /// Text of the `REMARK` annotation, none if `None`.
    pub remark: Option<String>,
    /// Give every `gml:id` inside the kept time slice a fresh value.
    pub regenerate_nested_ids: bool,
}

impl SubstitutionParams {
    pub fn new(effective_date: DateTime) -> Self {
        Self {
            effective_date,
            remark: None,
            regenerate_nested_ids: true,
        }
    }

    pub fn with_remark(mut self, remark: impl Into<String>) -> Self {
        self.remark = Some(remark.into());
        self
    }

    pub fn with_regenerate_nested_ids(mut self, regenerate: bool) -> Self {
        self.regenerate_nested_ids = regenerate;
        self
    }
}

/// Vorkompilierte Pfade, einmal pro Lauf.
struct Paths {
    identifier: QueryPath,
    time_slice: QueryPath,
    begin_position: QueryPath,
    sequence_number: QueryPath,
    correction_number: QueryPath,
    nil_annotation: QueryPath,
}

impl Paths {
    fn new() -> Result<Self> {
        Ok(Self {
            identifier: "gml:identifier".parse()?,
            time_slice: "aixm:timeSlice".parse()?,
            begin_position: "descendant::gml:validTime/gml:TimePeriod/gml:beginPosition".parse()?,
            sequence_number: "descendant::aixm:sequenceNumber".parse()?,
            correction_number: "descendant::aixm:correctionNumber".parse()?,
            nil_annotation: r#"aixm:annotation[@xsi:nil = "true"]"#.parse()?,
        })
    }
}

fn first(path: &QueryPath, partial: &Partial, context: NodeId) -> Option<NodeId> {
    path.select(partial, context).into_iter().next()
}

/// Zahlenfeld lesen; fehlend oder unlesbar = 0.
fn number_at(path: &QueryPath, partial: &Partial, context: NodeId) -> i64 {
    first(path, partial, context)
        .and_then(|n| partial.text_content(n).trim().parse().ok())
        .unwrap_or(0)
}

/// Ordinal of a time slice: `sequenceNumber * 10000 + correctionNumber`.
pub fn revision_ordinal(sequence: i64, correction: i64) -> i64 {
    sequence.saturating_mul(10_000).saturating_add(correction)
}

/// Pass-2 handler: mutates each feature unit and streams it out.
pub struct Substitution<'a, W: Write> {
    writer: PartialWriter<W>,
    params: &'a SubstitutionParams,
    maps: &'a IdentifierMaps,
    order: &'a dyn AnnotationOrder,
    paths: Paths,
    root: Option<RootDescriptor>,
    collapsed: usize,
}

impl<'a, W: Write> Substitution<'a, W> {
    pub fn new(
        output: W,
        params: &'a SubstitutionParams,
        maps: &'a IdentifierMaps,
        order: &'a dyn AnnotationOrder,
    ) -> Result<Self> {
        Ok(Self {
            writer: PartialWriter::new(output),
            params,
            maps,
            order,
            paths: Paths::new()?,
            root: None,
            collapsed: 0,
        })
    }

    /// Closes the output document and returns the sink.
    ///
    /// A message without any top-level child still yields its root element.
    pub fn finish(mut self) -> Result<W> {
        if !self.writer.is_open() {
            let Some(root) = self.root.take() else {
                return Err(Error::writer_state("no root element was observed"));
            };
            let mut ns = NamespaceContext::new();
            ns.push_scope(root.namespaces.clone());
            self.writer.open(&root, &ns)?;
        }
        self.writer.close()?;
        debug!(
            "pass 2: {} feature(s) written, {} with collapsed time slices",
            self.writer.emitted(),
            self.collapsed
        );
        Ok(self.writer.into_inner())
    }

    fn handle_feature(&mut self, mut partial: Partial, ns: &NamespaceContext) -> Result<()> {
        let Some(feature) = partial.first_child_element(partial.root()) else {
            trace!("feature wrapper without feature element skipped");
            return Ok(());
        };
        let feature_type = partial.local_name(feature).unwrap_or_default().to_string();
        let identifier = first(&self.paths.identifier, &partial, feature);
        let original_identifier = identifier.map(|id| partial.text_content(id).trim().to_string());

        let kept = self.select_revision(&mut partial, feature, original_identifier.as_deref());

        if let Some(time_slice) = kept {
            if self.params.regenerate_nested_ids {
                regenerate_gml_ids(&mut partial, time_slice);
            }
            if let Some(begin) = first(&self.paths.begin_position, &partial, time_slice) {
                partial.set_text_content(begin, self.params.effective_date.to_string());
            }
            if let Some(seq) = first(&self.paths.sequence_number, &partial, time_slice) {
                partial.set_text_content(seq, "1");
            }
            if let Some(corr) = first(&self.paths.correction_number, &partial, time_slice) {
                partial.set_text_content(corr, "0");
            }
        }

        if let (Some(node), Some(old)) = (identifier, original_identifier.as_deref())
            && let Some(new) = self.maps.lookup(old)
        {
            partial.set_text_content(node, new);
            let gml_id = QName::with_prefix(GML_NS, "id", ns.attribute_prefix_for_uri(GML_NS).unwrap_or("gml"));
            partial.set_attribute(feature, gml_id, gml_id_for(new));
        }

        self.rewrite_references(&mut partial, feature);

        if let (Some(remark), Some(time_slice)) = (self.params.remark.as_deref(), kept)
            && let Some(slice_body) = partial.first_child_element(time_slice)
        {
            if let Some(placeholder) = first(&self.paths.nil_annotation, &partial, slice_body) {
                partial.detach(placeholder);
            }
            let annotation = build_annotation(&mut partial, remark, ns);
            let anchor = partial.child_elements(slice_body).find(|child| {
                partial
                    .local_name(*child)
                    .is_some_and(|local| self.order.is_after_annotation(&feature_type, local))
            });
            match anchor {
                Some(anchor) => partial.insert_before(slice_body, annotation, anchor),
                None => partial.append_child(slice_body, annotation),
            }
        }

        self.writer.emit(partial.into_subtree(feature), ns)
    }

    /// Keeps the time slice with the highest ordinal (first one on ties),
    /// detaches all others.
    fn select_revision(
        &mut self,
        partial: &mut Partial,
        feature: NodeId,
        original_identifier: Option<&str>,
    ) -> Option<NodeId> {
        let slices = self.paths.time_slice.select(partial, feature);
        let mut best: Option<(NodeId, i64, i64, i64)> = None;
        for slice in &slices {
            let seq = number_at(&self.paths.sequence_number, partial, *slice);
            let corr = number_at(&self.paths.correction_number, partial, *slice);
            let ordinal = revision_ordinal(seq, corr);
            if best.is_none_or(|(_, b, _, _)| ordinal > b) {
                best = Some((*slice, ordinal, seq, corr));
            }
        }
        let (kept, _, seq, corr) = best?;
        if slices.len() > 1 {
            let name = original_identifier
                .map(str::to_string)
                .or_else(|| partial.attribute(feature, GML_NS, "id").map(str::to_string))
                .unwrap_or_else(|| "<unidentified>".to_string());
            warn!(
                "feature {name} has {} time slices, keeping sequence {seq} correction {corr}",
                slices.len()
            );
            self.collapsed += 1;
            for slice in slices.into_iter().filter(|s| *s != kept) {
                partial.detach(slice);
            }
        }
        Some(kept)
    }

    /// Cross-references are the `xlink:href` attributes of the feature subtree.
    fn rewrite_references(&self, partial: &mut Partial, feature: NodeId) {
        let mut targets = vec![feature];
        targets.extend(partial.descendant_elements(feature));
        for id in targets {
            let Some(element) = partial.element_mut(id) else {
                continue;
            };
            for attr in element.attributes.iter_mut().filter(|a| a.name.is(XLINK_NS, "href")) {
                let rewritten = match rewrite_reference(
                    &attr.value,
                    &self.maps.identifiers,
                    &self.maps.gml_id_exceptions,
                ) {
                    Cow::Owned(value) => Some(value),
                    Cow::Borrowed(_) => None,
                };
                if let Some(value) = rewritten {
                    attr.value = value;
                }
            }
        }
    }
}

impl<W: Write> PartialHandler for Substitution<'_, W> {
    fn root_element(&mut self, root: &RootDescriptor, _ns: &NamespaceContext) -> Result<()> {
        self.root = Some(root.clone());
        Ok(())
    }

    fn first_partial(&mut self, _partial: &Partial, ns: &NamespaceContext) -> Result<()> {
        if self.writer.is_open() {
            return Ok(());
        }
        let Some(root) = self.root.as_ref() else {
            return Err(Error::writer_state("partial observed before the root element"));
        };
        self.writer.open(root, ns)?;
        self.writer.set_wrapper(MESSAGE_NS, "hasMember");
        Ok(())
    }

    fn handle_unit(&mut self, unit: Unit, ns: &NamespaceContext) -> Result<()> {
        match unit {
            Unit::Metadata(_) => {
                trace!("metadata unit not written");
                Ok(())
            }
            Unit::Feature(partial) => self.handle_feature(partial, ns),
        }
    }
}

/// Neue `uuid.<v4>` Werte fuer alle gml:id Attribute unterhalb von `node`.
fn regenerate_gml_ids(partial: &mut Partial, node: NodeId) {
    for id in partial.descendant_elements(node) {
        if let Some(element) = partial.element_mut(id) {
            for attr in element.attributes.iter_mut().filter(|a| a.name.is(GML_NS, "id")) {
                attr.value = gml_id_for(&Uuid::new_v4().to_string());
            }
        }
    }
}

/// Builds `annotation/Note{purpose, translatedNote/LinguisticNote/note}` detached in `partial`.
fn build_annotation(partial: &mut Partial, remark: &str, ns: &NamespaceContext) -> NodeId {
    let aixm = ns.prefix_for_uri(AIXM_NS).unwrap_or("aixm").to_string();
    let gml = ns.attribute_prefix_for_uri(GML_NS).unwrap_or("gml").to_string();
    let element = |local: &str| Element::new(QName::with_prefix(AIXM_NS, local, aixm.as_str()));
    let identified = |local: &str| {
        let mut e = element(local);
        e.set_attribute(
            QName::with_prefix(GML_NS, "id", gml.as_str()),
            gml_id_for(&Uuid::new_v4().to_string()),
        );
        e
    };

    let annotation = partial.create(NodeKind::Element(element("annotation")));
    let note = partial.append(annotation, NodeKind::Element(identified("Note")));
    let purpose = partial.append(note, NodeKind::Element(element("purpose")));
    partial.set_text_content(purpose, "REMARK");
    let translated = partial.append(note, NodeKind::Element(element("translatedNote")));
    let linguistic = partial.append(translated, NodeKind::Element(identified("LinguisticNote")));
    let text = partial.append(linguistic, NodeKind::Element(element("note")));
    partial.set_text_content(text, remark);
    annotation
}

/// Runs pass 2 with the default annotation order; returns the output sink.
pub fn substitute<R: Read, W: Write>(
    input: R,
    output: W,
    params: &SubstitutionParams,
    maps: &IdentifierMaps,
) -> Result<W> {
    substitute_with_order(input, output, params, maps, &DefaultAnnotationOrder)
}

/// Runs pass 2 with a custom annotation order.
pub fn substitute_with_order<R: Read, W: Write>(
    input: R,
    output: W,
    params: &SubstitutionParams,
    maps: &IdentifierMaps,
    order: &dyn AnnotationOrder,
) -> Result<W> {
    let mut handler = Substitution::new(output, params, maps, order)?;
    assemble(input, &mut handler)?;
    handler.finish()
}

/// Pass 2 from file to file.
pub fn substitute_file(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    params: &SubstitutionParams,
    maps: &IdentifierMaps,
) -> Result<()> {
    let (input, output) = (input.as_ref(), output.as_ref());
    let reader = File::open(input)
        .map_err(|e| Error::IoError(format!("cannot open {}: {e}", input.display())))?;
    let file = File::create(output)
        .map_err(|e| Error::IoError(format!("cannot create {}: {e}", output.display())))?;
    let mut out = substitute(reader, BufWriter::new(file), params, maps)?;
    out.flush()?;
    Ok(())
}

/// Both passes over `input`, written to `output`. Returns the maps of pass 1.
pub fn run(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    params: &SubstitutionParams,
) -> Result<IdentifierMaps> {
    let maps = extract_identifiers_from_path(input.as_ref())?;
    substitute_file(input, output, params, &maps)?;
    Ok(maps)
}
