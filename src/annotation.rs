//! Ordering rules for inserted `aixm:annotation` elements.
//!
//! In every AIXM 5.1 time slice `annotation` is followed only by
//! `extension`; other tables can be plugged in through [`AnnotationOrder`].

use crate::FastHashMap;

/// Local names that must follow `aixm:annotation`, per feature type.
pub trait AnnotationOrder {
    /// True if a child named `local_name` of a `feature_type` time slice
    /// has to come after the annotation.
    fn is_after_annotation(&self, feature_type: &str, local_name: &str) -> bool;
}

/// AIXM 5.1 rule: `extension` is the only element after `annotation`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultAnnotationOrder;

/// Kind-Elemente nach `annotation` in allen AIXM 5.1 Time Slices.
pub const AIXM_AFTER_ANNOTATION: &[&str] = &["extension"];

impl AnnotationOrder for DefaultAnnotationOrder {
    fn is_after_annotation(&self, _feature_type: &str, local_name: &str) -> bool {
        AIXM_AFTER_ANNOTATION.contains(&local_name)
    }
}

/// Caller-supplied table keyed by feature local name.
///
/// Feature types missing from the table use [`DefaultAnnotationOrder`].
#[derive(Debug, Clone, Default)]
pub struct TableAnnotationOrder {
    table: FastHashMap<String, Vec<String>>,
}

impl TableAnnotationOrder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the after-annotation names for `feature_type`.
    pub fn insert<I, S>(&mut self, feature_type: impl Into<String>, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.table
            .insert(feature_type.into(), names.into_iter().map(Into::into).collect());
    }

    pub fn with<I, S>(mut self, feature_type: impl Into<String>, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.insert(feature_type, names);
        self
    }
}

impl AnnotationOrder for TableAnnotationOrder {
    fn is_after_annotation(&self, feature_type: &str, local_name: &str) -> bool {
        match self.table.get(feature_type) {
            Some(names) => names.iter().any(|n| n == local_name),
            None => DefaultAnnotationOrder.is_after_annotation(feature_type, local_name),
        }
    }
}
