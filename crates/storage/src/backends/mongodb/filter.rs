//! Selection predicate to MongoDB filter translation.
//!
//! No field is mirrored into the document, so every requirement becomes a
//! regex over the serialized object in [`PAYLOAD_FIELD`]. A requirement
//! matches on the last segment of its path, anywhere in the object.

use bson::{Bson, Document, Regex, doc};

use crate::core::{PredicateTranslator, supported_requirements};
use crate::types::{FieldRequirement, Operator, SelectionPredicate};

use super::backend::BACKEND_NAME;
use super::document::PAYLOAD_FIELD;

/// Translates predicates into `{ "$and": [...] }` filters.
#[derive(Debug, Clone, Copy, Default)]
pub struct MongoTranslator;

impl PredicateTranslator for MongoTranslator {
    type Output = Document;

    fn translate(&self, predicate: &SelectionPredicate) -> Document {
        let clauses: Vec<Bson> = supported_requirements(BACKEND_NAME, predicate)
            .iter()
            .filter_map(clause)
            .map(Bson::Document)
            .collect();
        if clauses.is_empty() {
            return Document::new();
        }
        tracing::debug!(clauses = clauses.len(), "translated predicate");
        doc! { "$and": clauses }
    }
}

fn clause(req: &FieldRequirement) -> Option<Document> {
    let (pattern, negate) = match req.operator {
        Operator::Equals | Operator::DoubleEquals => (equals_pattern(req), false),
        Operator::NotEquals => (equals_pattern(req), true),
        Operator::Exists => (exists_pattern(req), false),
        Operator::NotExists => (exists_pattern(req), true),
        Operator::Contains => (contains_pattern(req), false),
        Operator::NotContains => (contains_pattern(req), true),
        Operator::In | Operator::NotIn => return None,
    };

    let condition = if negate {
        doc! {
            "$not": Bson::RegularExpression(Regex {
                pattern,
                options: String::new(),
            })
        }
    } else {
        doc! { "$regex": pattern }
    };

    let mut clause = Document::new();
    clause.insert(PAYLOAD_FIELD, condition);
    Some(clause)
}

/// Escapes `text` as it appears inside a serialized JSON string, then for
/// use in a regex.
fn escaped(text: &str) -> String {
    let quoted = serde_json::Value::String(text.to_string()).to_string();
    let inner = quoted
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .unwrap_or(&quoted);
    regex::escape(inner)
}

/// `"key":"value"` or `"key":value`, followed by the end of the member.
fn equals_pattern(req: &FieldRequirement) -> String {
    let value = escaped(req.value());
    format!(
        r#""{}":(?:"{value}"|{value})[,}}\]]"#,
        escaped(req.path.last())
    )
}

fn exists_pattern(req: &FieldRequirement) -> String {
    format!(r#""{}":"#, escaped(req.path.last()))
}

fn contains_pattern(req: &FieldRequirement) -> String {
    format!(
        r#""{}":"[^"]*{}"#,
        escaped(req.path.last()),
        escaped(req.value())
    )
}
