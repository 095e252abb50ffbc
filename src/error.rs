//! Central error type for the streaming substitution engine.
//!
//! Every fallible path of the two passes ends up here. Missing optional
//! elements are never errors (they are simply not updated); only structural
//! violations, unusable configuration and I/O failures abort a run.

use core::fmt;
use std::borrow::Cow;

/// All errors the engine can report.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// The input is not well-formed XML (or uses an undeclared prefix).
    XmlParseError(String),
    /// Reading the input or writing the output failed.
    IoError(String),
    /// A top-level unit had to be handled before any boundary element
    /// was recognized: the document is not an AIXM basic message.
    MalformedContainer {
        /// Qualified name of the offending top-level child.
        element: String,
    },
    /// The effective date literal could not be parsed.
    InvalidDateTime(String),
    /// A query expression lies outside the supported path subset.
    InvalidPath(String),
    /// The streaming writer was driven out of order (emit before open, ...).
    WriterState(Cow<'static, str>),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::XmlParseError(msg) => write!(f, "XML parse error: {msg}"),
            Self::IoError(msg) => write!(f, "I/O error: {msg}"),
            Self::MalformedContainer { element } => {
                if element.is_empty() {
                    write!(f, "malformed container: no message boundary recognized")
                } else {
                    write!(
                        f,
                        "malformed container: '{element}' appears before any message boundary"
                    )
                }
            }
            Self::InvalidDateTime(value) => write!(f, "invalid xsd:dateTime literal '{value}'"),
            Self::InvalidPath(expr) => write!(f, "unsupported path expression '{expr}'"),
            Self::WriterState(msg) => write!(f, "writer state violation: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::IoError(e.to_string())
    }
}

impl From<quick_xml::Error> for Error {
    fn from(e: quick_xml::Error) -> Self {
        match e {
            quick_xml::Error::Io(io) => Self::IoError(io.to_string()),
            other => Self::XmlParseError(other.to_string()),
        }
    }
}

impl From<csv::Error> for Error {
    fn from(e: csv::Error) -> Self {
        Self::IoError(e.to_string())
    }
}

impl Error {
    /// Erstellt einen `WriterState` Fehler mit Nachricht.
    pub fn writer_state(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::WriterState(msg.into())
    }
}

/// A convenience `Result` type alias using [`Error`].
pub type Result<T> = core::result::Result<T, Error>;
