//! Selection predicates for list operations.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::StorageResult;

use super::pagination::PageRequest;
use super::selector::{Operator, Requirement, Selector};

/// A dotted path into an encoded object, e.g. `metadata.labels.tier`.
///
/// Label keys may themselves contain dots and slashes, so a path is kept as
/// segments rather than re-split from a string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath {
    segments: Vec<String>,
}

impl FieldPath {
    /// Parses a dotted field path.
    pub fn parse(path: &str) -> Self {
        Self {
            segments: path.split('.').map(str::to_string).collect(),
        }
    }

    /// Path of a label under `metadata.labels`.
    pub fn label(key: &str) -> Self {
        Self {
            segments: vec![
                "metadata".to_string(),
                "labels".to_string(),
                key.to_string(),
            ],
        }
    }

    /// Returns the path segments.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Returns the final segment.
    pub fn last(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or("")
    }

    /// Returns the segments joined with dots.
    pub fn dotted(&self) -> String {
        self.segments.join(".")
    }

    /// Looks up the path in a JSON value.
    pub fn lookup<'v>(&self, value: &'v serde_json::Value) -> Option<&'v serde_json::Value> {
        self.segments
            .iter()
            .try_fold(value, |current, segment| current.get(segment))
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.dotted())
    }
}

/// A requirement resolved onto an object path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRequirement {
    /// Where the requirement applies.
    pub path: FieldPath,
    /// The comparison.
    pub operator: Operator,
    /// Operand values.
    pub values: Vec<String>,
    /// True when the requirement came from the label selector.
    pub label: bool,
}

impl FieldRequirement {
    /// Returns the first operand, or an empty string.
    pub fn value(&self) -> &str {
        self.values.first().map(String::as_str).unwrap_or("")
    }
}

/// Label selector, field selector and an optional page request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionPredicate {
    /// Requirements on `metadata.labels`.
    pub label: Selector,
    /// Requirements on object fields.
    pub field: Selector,
    /// The page to return; `None` returns everything.
    pub page: Option<PageRequest>,
}

impl SelectionPredicate {
    /// A predicate matching every object, unpaged.
    pub fn everything() -> Self {
        Self::default()
    }

    /// Parses the external string form of a predicate.
    pub fn parse(
        label_selector: &str,
        field_selector: &str,
        page: Option<PageRequest>,
    ) -> StorageResult<Self> {
        Ok(Self {
            label: Selector::parse_labels(label_selector)?,
            field: Selector::parse_fields(field_selector)?,
            page,
        })
    }

    /// Sets the label selector.
    pub fn with_label(mut self, label: Selector) -> Self {
        self.label = label;
        self
    }

    /// Sets the field selector.
    pub fn with_field(mut self, field: Selector) -> Self {
        self.field = field;
        self
    }

    /// Sets the page request.
    pub fn with_page(mut self, number: u64, per_page: u64) -> Self {
        self.page = Some(PageRequest::new(number, per_page));
        self
    }

    /// Matches a single field exactly.
    pub fn field_equals(path: &str, value: &str) -> Self {
        Self::default().with_field(
            Selector::everything().with(Requirement::new(path, Operator::Equals, value)),
        )
    }

    /// Returns label then field requirements resolved onto object paths.
    pub fn requirements(&self) -> Vec<FieldRequirement> {
        let labels = self.label.requirements().iter().map(|r| FieldRequirement {
            path: FieldPath::label(&r.key),
            operator: r.operator,
            values: r.values.clone(),
            label: true,
        });
        let fields = self.field.requirements().iter().map(|r| FieldRequirement {
            path: FieldPath::parse(&r.key),
            operator: r.operator,
            values: r.values.clone(),
            label: false,
        });
        labels.chain(fields).collect()
    }
}
