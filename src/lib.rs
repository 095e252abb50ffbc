//! aixm-uuid-subst – UUID-Substitution fuer AIXM 5.1 Basic Messages
//!
//! Zwei Durchlaeufe ueber dieselbe Eingabe, beide als Stream in
//! Feature-grossen Teilbaeumen ([`Partial`]):
//!
//! 1. [`extract_identifiers`] sammelt alle `gml:identifier` und vergibt neue UUIDs.
//! 2. [`substitute`] schreibt die Nachricht neu: eine Revision pro Feature,
//!    neues Gueltigkeitsdatum, neue Identifier, umgeschriebene `xlink:href`.
//!
//! # Beispiel
//!
//! ```
//! use aixm_uuid_subst::{extract_identifiers, substitute, SubstitutionParams};
//!
//! let xml = r#"<message:AIXMBasicMessage
//!     xmlns:message="http://www.aixm.aero/schema/5.1/message"
//!     xmlns:aixm="http://www.aixm.aero/schema/5.1"
//!     xmlns:gml="http://www.opengis.net/gml/3.2"><message:hasMember><aixm:Airspace
//!     gml:id="uuid.0a1b2c3d-0000-4000-8000-00000000000a"><gml:identifier
//!     codeSpace="urn:uuid:">0a1b2c3d-0000-4000-8000-00000000000a</gml:identifier></aixm:Airspace></message:hasMember></message:AIXMBasicMessage>"#;
//!
//! let maps = extract_identifiers(xml.as_bytes()).unwrap();
//! let params = SubstitutionParams::new("2022-12-24T00:00:00Z".parse().unwrap());
//! let out = substitute(xml.as_bytes(), Vec::new(), &params, &maps).unwrap();
//!
//! let new = maps.lookup("0a1b2c3d-0000-4000-8000-00000000000a").unwrap();
//! assert!(String::from_utf8(out).unwrap().contains(new));
//! ```

pub mod annotation;
pub mod assembler;
pub mod boundary;
pub mod datetime;
pub mod error;
pub mod identifiers;
pub mod namespace;
pub mod partial;
pub mod pretty;
pub mod qname;
pub mod query;
pub mod substitution;
pub mod writer;
pub mod xref;

pub use error::{Error, Result};

/// HashMap mit ahash (schneller, nicht DoS-resistent, für interne Datenstrukturen).
pub(crate) type FastHashMap<K, V> = hashbrown::HashMap<K, V, ahash::RandomState>;

/// HashSet mit ahash.
pub(crate) type FastHashSet<K> = hashbrown::HashSet<K, ahash::RandomState>;

/// IndexMap mit ahash (deterministische Iteration + schnelles Hashing).
pub type FastIndexMap<K, V> = indexmap::IndexMap<K, V, ahash::RandomState>;

// Public API: Streaming
pub use assembler::{PartialAssembler, PartialHandler, RootDescriptor, Unit, assemble};
pub use boundary::UnitKind;
pub use partial::{NodeId, Partial};
pub use writer::PartialWriter;

// Public API: Types
pub use datetime::DateTime;
pub use namespace::NamespaceContext;
pub use qname::QName;

// Public API: Substitution
pub use annotation::{AnnotationOrder, DefaultAnnotationOrder, TableAnnotationOrder};
pub use identifiers::{
    IdentifierMap, IdentifierMaps, export_csv, extract_identifiers, extract_identifiers_from_path,
};
pub use pretty::pretty_print;
pub use substitution::{
    SubstitutionParams, run, substitute, substitute_file, substitute_with_order,
};
