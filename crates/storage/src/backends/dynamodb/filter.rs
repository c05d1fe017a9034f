//! Selection predicate to DynamoDB filter expression translation.
//!
//! Nested fields are stored as map attributes, so every requirement is
//! addressed by its full document path: `metadata.labels.tier` becomes
//! `#metadata.#labels.#tier`.

use std::collections::BTreeMap;
use std::fmt;

use crate::core::{PredicateTranslator, supported_requirements};
use crate::types::{FieldRequirement, Operator, SelectionPredicate};

use super::backend::BACKEND_NAME;
use super::item::{AttrValue, Item};

/// A comparison in a filter expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionOp {
    /// `a = :v`
    Equals,
    /// `a <> :v`
    NotEquals,
    /// `attribute_exists(a)`
    Exists,
    /// `attribute_not_exists(a)`
    NotExists,
    /// `contains(a, :v)`
    Contains,
    /// `NOT contains(a, :v)`
    NotContains,
    /// `begins_with(a, :v)`
    BeginsWith,
}

/// One AND-ed term of a [`FilterExpression`], kept in structured form.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    /// Attribute path, outermost first.
    pub path: Vec<String>,
    /// Comparison.
    pub op: ConditionOp,
    /// Operand, absent for existence checks.
    pub value: Option<AttrValue>,
}

impl Condition {
    /// Evaluates the condition against an item the way DynamoDB does: a
    /// comparison against a missing attribute is false.
    pub fn matches(&self, item: &Item) -> bool {
        let attr = AttrValue::lookup(item, &self.path);
        match self.op {
            ConditionOp::Exists => attr.is_some(),
            ConditionOp::NotExists => attr.is_none(),
            ConditionOp::Equals => attr.is_some() && attr == self.value.as_ref(),
            ConditionOp::NotEquals => attr.is_some() && attr != self.value.as_ref(),
            ConditionOp::Contains => contains(attr, self.value.as_ref()),
            ConditionOp::NotContains => !contains(attr, self.value.as_ref()),
            ConditionOp::BeginsWith => match (attr, &self.value) {
                (Some(AttrValue::S(s)), Some(AttrValue::S(prefix))) => s.starts_with(prefix),
                _ => false,
            },
        }
    }
}

fn contains(attr: Option<&AttrValue>, value: Option<&AttrValue>) -> bool {
    match (attr, value) {
        (Some(AttrValue::S(s)), Some(AttrValue::S(needle))) => s.contains(needle.as_str()),
        (Some(AttrValue::L(items)), Some(needle)) => items.contains(needle),
        _ => false,
    }
}

/// A scan filter: the expression string, its placeholder maps, and the
/// same conditions in structured form.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterExpression {
    /// Expression text with `#name` and `:value` placeholders.
    pub expression: String,
    /// `#name` placeholder to attribute name.
    pub names: BTreeMap<String, String>,
    /// `:value` placeholder to operand.
    pub values: BTreeMap<String, AttrValue>,
    /// The AND-ed terms.
    pub conditions: Vec<Condition>,
}

impl FilterExpression {
    /// Returns true if the filter has no terms.
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Returns true if `item` satisfies every condition.
    pub fn matches(&self, item: &Item) -> bool {
        self.conditions.iter().all(|c| c.matches(item))
    }

    /// Restricts the filter to items whose `attribute` starts with `prefix`.
    pub fn and_begins_with(&mut self, attribute: &str, prefix: &str) {
        let path = vec![attribute.to_string()];
        self.push(path, ConditionOp::BeginsWith, Some(prefix.to_string()));
    }

    /// Requires `attribute` to be absent.
    pub fn and_not_exists(&mut self, attribute: &str) {
        self.push(vec![attribute.to_string()], ConditionOp::NotExists, None);
    }

    fn push(&mut self, path: Vec<String>, op: ConditionOp, value: Option<String>) {
        let name = path
            .iter()
            .map(|segment| self.name_placeholder(segment))
            .collect::<Vec<_>>()
            .join(".");
        let value_placeholder = value.as_ref().map(|v| {
            let placeholder = format!(
                ":{}val{}",
                sanitize(path.last().map(String::as_str).unwrap_or("v")),
                unique_suffix()
            );
            self.values
                .insert(placeholder.clone(), AttrValue::S(v.clone()));
            placeholder
        });
        let placeholder = value_placeholder.unwrap_or_default();

        let term = match op {
            ConditionOp::Equals => format!("{name} = {placeholder}"),
            ConditionOp::NotEquals => format!("{name} <> {placeholder}"),
            ConditionOp::Exists => format!("attribute_exists({name})"),
            ConditionOp::NotExists => format!("attribute_not_exists({name})"),
            ConditionOp::Contains => format!("contains({name}, {placeholder})"),
            ConditionOp::NotContains => format!("NOT contains({name}, {placeholder})"),
            ConditionOp::BeginsWith => format!("begins_with({name}, {placeholder})"),
        };
        if self.expression.is_empty() {
            self.expression = term;
        } else {
            self.expression = format!("{} AND {term}", self.expression);
        }

        self.conditions.push(Condition {
            path,
            op,
            value: value.map(AttrValue::S),
        });
    }

    /// Returns the `#name` placeholder for a path segment. Segments that
    /// sanitize to the same name get distinct placeholders.
    fn name_placeholder(&mut self, segment: &str) -> String {
        if let Some((placeholder, _)) = self.names.iter().find(|(_, s)| s.as_str() == segment) {
            return placeholder.clone();
        }
        let base = format!("#{}", sanitize(segment));
        let mut placeholder = base.clone();
        let mut n = 1;
        while self.names.contains_key(&placeholder) {
            placeholder = format!("{base}{n}");
            n += 1;
        }
        self.names.insert(placeholder.clone(), segment.to_string());
        placeholder
    }
}

impl fmt::Display for FilterExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}

fn sanitize(segment: &str) -> String {
    segment
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn unique_suffix() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// Translates predicates into scan filter expressions.
#[derive(Debug, Clone, Copy, Default)]
pub struct DynamoTranslator;

impl PredicateTranslator for DynamoTranslator {
    type Output = FilterExpression;

    fn translate(&self, predicate: &SelectionPredicate) -> FilterExpression {
        let mut filter = FilterExpression::default();
        for req in supported_requirements(BACKEND_NAME, predicate) {
            requirement(&mut filter, &req);
        }
        if !filter.is_empty() {
            tracing::debug!(expression = %filter, "translated predicate");
        }
        filter
    }
}

fn requirement(filter: &mut FilterExpression, req: &FieldRequirement) {
    let path = req.path.segments().to_vec();
    let value = Some(req.value().to_string());
    match req.operator {
        Operator::Equals | Operator::DoubleEquals => filter.push(path, ConditionOp::Equals, value),
        Operator::NotEquals => filter.push(path, ConditionOp::NotEquals, value),
        Operator::Exists => filter.push(path, ConditionOp::Exists, None),
        Operator::NotExists => filter.push(path, ConditionOp::NotExists, None),
        Operator::Contains => filter.push(path, ConditionOp::Contains, value),
        Operator::NotContains => filter.push(path, ConditionOp::NotContains, value),
        Operator::In | Operator::NotIn => {}
    }
}
