//! Pass 1: identifier extraction.
//!
//! One read-only scan over the message. Every feature's `gml:identifier`
//! gets a fresh v4 UUID; feature `gml:id` values that do not follow the
//! `uuid.<identifier>` convention are recorded as exceptions so that
//! references to them can be repaired in pass 2.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use log::{debug, trace};
use uuid::Uuid;

use crate::FastIndexMap;
use crate::assembler::{PartialHandler, Unit, assemble};
use crate::error::{Error, Result};
use crate::namespace::NamespaceContext;
use crate::partial::Partial;
use crate::qname::GML_NS;
use crate::query::Path as QueryPath;
use crate::xref::{conventional_uuid, gml_id_for};

/// Original value → replacement, in document order.
pub type IdentifierMap = FastIndexMap<String, String>;

/// Result of pass 1; read-only input of pass 2.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentifierMaps {
    /// `gml:identifier` text → new UUID.
    pub identifiers: IdentifierMap,
    /// Non-conventional feature `gml:id` → `uuid.<new UUID>`.
    pub gml_id_exceptions: IdentifierMap,
}

impl IdentifierMaps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.identifiers.is_empty() && self.gml_id_exceptions.is_empty()
    }

    /// New UUID for an original identifier.
    pub fn lookup(&self, identifier: &str) -> Option<&str> {
        self.identifiers.get(identifier).map(String::as_str)
    }
}

/// Handler sammelt beide Maps ueber alle Feature-Units.
struct IdentifierExtractor {
    maps: IdentifierMaps,
    identifier_path: QueryPath,
    features: usize,
}

impl IdentifierExtractor {
    fn new() -> Result<Self> {
        Ok(Self {
            maps: IdentifierMaps::new(),
            identifier_path: "gml:identifier".parse()?,
            features: 0,
        })
    }

    fn inspect(&mut self, partial: &Partial) {
        self.features += 1;
        let Some(feature) = partial.first_child_element(partial.root()) else {
            return;
        };
        let Some(identifier) = self.identifier_path.select(partial, feature).into_iter().next() else {
            trace!("feature without gml:identifier skipped");
            return;
        };
        let old = partial.text_content(identifier).trim().to_string();
        if old.is_empty() {
            return;
        }

        let new = self
            .maps
            .identifiers
            .entry(old.clone())
            .or_insert_with(|| Uuid::new_v4().to_string())
            .clone();

        // Fehlendes gml:id erzeugt keinen Eintrag (leerer Schluessel waere nutzlos).
        if let Some(gml_id) = partial.attribute(feature, GML_NS, "id")
            && conventional_uuid(gml_id) != Some(old.as_str())
        {
            self.maps
                .gml_id_exceptions
                .entry(gml_id.to_string())
                .or_insert_with(|| gml_id_for(&new));
        }
    }
}

impl PartialHandler for IdentifierExtractor {
    fn handle_unit(&mut self, unit: Unit, _ns: &NamespaceContext) -> Result<()> {
        if let Unit::Feature(partial) = unit {
            self.inspect(&partial);
        }
        Ok(())
    }
}

/// Runs pass 1 over `input`.
pub fn extract_identifiers<R: Read>(input: R) -> Result<IdentifierMaps> {
    let mut extractor = IdentifierExtractor::new()?;
    assemble(input, &mut extractor)?;
    debug!(
        "pass 1: {} feature(s), {} identifier(s), {} gml:id exception(s)",
        extractor.features,
        extractor.maps.identifiers.len(),
        extractor.maps.gml_id_exceptions.len()
    );
    Ok(extractor.maps)
}

/// Runs pass 1 over the file at `path`.
pub fn extract_identifiers_from_path(path: impl AsRef<Path>) -> Result<IdentifierMaps> {
    let path = path.as_ref();
    let file = File::open(path)
        .map_err(|e| Error::IoError(format!("cannot open {}: {e}", path.display())))?;
    extract_identifiers(file)
}

/// Writes `identifiers` as CSV: header `"original","new"`, one quoted row per entry.
pub fn export_csv<W: Write>(identifiers: &IdentifierMap, out: W) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Always)
        .from_writer(out);
    wtr.write_record(["original", "new"])?;
    for (old, new) in identifiers {
        wtr.write_record([old, new])?;
    }
    wtr.flush()?;
    Ok(())
}
