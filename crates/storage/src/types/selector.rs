//! Label and field selector parsing.
//!
//! Selectors use the Kubernetes string syntax. Label selectors accept
//! `key`, `!key`, `key=value`, `key==value`, `key!=value`,
//! `key in (a,b)` and `key notin (a,b)`; field selectors accept the three
//! equality forms. Requirements are comma separated and always AND-ed.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{StorageResult, ValidationError};

/// Comparison applied by a [`Requirement`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    /// `key=value`
    Equals,
    /// `key==value`
    DoubleEquals,
    /// `key!=value`
    NotEquals,
    /// `key in (a,b)`
    In,
    /// `key notin (a,b)`
    NotIn,
    /// `key`
    Exists,
    /// `!key`
    NotExists,
    /// Value contains the given substring or element.
    Contains,
    /// Value does not contain the given substring or element.
    NotContains,
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operator::Equals => "=",
            Operator::DoubleEquals => "==",
            Operator::NotEquals => "!=",
            Operator::In => "in",
            Operator::NotIn => "notin",
            Operator::Exists => "exists",
            Operator::NotExists => "!",
            Operator::Contains => "contains",
            Operator::NotContains => "notcontains",
        };
        write!(f, "{s}")
    }
}

/// A single selector term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirement {
    /// Label key or dotted field path.
    pub key: String,
    /// The comparison.
    pub operator: Operator,
    /// Operand values; empty for `Exists`/`NotExists`.
    pub values: Vec<String>,
}

impl Requirement {
    /// Creates a requirement with a single value.
    pub fn new(key: impl Into<String>, operator: Operator, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            operator,
            values: vec![value.into()],
        }
    }

    /// Creates an `Exists` or `NotExists` requirement.
    pub fn presence(key: impl Into<String>, exists: bool) -> Self {
        Self {
            key: key.into(),
            operator: if exists {
                Operator::Exists
            } else {
                Operator::NotExists
            },
            values: Vec::new(),
        }
    }

    /// Returns the first operand, or an empty string.
    pub fn value(&self) -> &str {
        self.values.first().map(String::as_str).unwrap_or("")
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.operator {
            Operator::Exists => write!(f, "{}", self.key),
            Operator::NotExists => write!(f, "!{}", self.key),
            Operator::In | Operator::NotIn => {
                write!(f, "{} {} ({})", self.key, self.operator, self.values.join(","))
            }
            _ => write!(f, "{}{}{}", self.key, self.operator, self.value()),
        }
    }
}

/// A parsed selector: a conjunction of requirements.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selector {
    requirements: Vec<Requirement>,
}

impl Selector {
    /// A selector that matches everything.
    pub fn everything() -> Self {
        Self::default()
    }

    /// Builds a selector from requirements.
    pub fn from_requirements(requirements: Vec<Requirement>) -> Self {
        Self { requirements }
    }

    /// Adds a requirement.
    pub fn with(mut self, requirement: Requirement) -> Self {
        self.requirements.push(requirement);
        self
    }

    /// Returns the requirements.
    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    /// Returns true if the selector has no requirements.
    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    /// Parses a label selector string.
    pub fn parse_labels(input: &str) -> StorageResult<Self> {
        Parser::new(input, true).parse()
    }

    /// Parses a field selector string.
    pub fn parse_fields(input: &str) -> StorageResult<Self> {
        Parser::new(input, false).parse()
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.requirements.iter().map(|r| r.to_string()).collect();
        write!(f, "{}", parts.join(","))
    }
}

struct Parser<'a> {
    input: &'a str,
    labels: bool,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str, labels: bool) -> Self {
        Self { input, labels }
    }

    fn parse(&self) -> StorageResult<Selector> {
        let mut requirements = Vec::new();
        for term in split_terms(self.input) {
            let term = term.trim();
            if term.is_empty() {
                continue;
            }
            requirements.push(self.parse_term(term)?);
        }
        Ok(Selector { requirements })
    }

    fn parse_term(&self, term: &str) -> StorageResult<Requirement> {
        if let Some(pos) = term.find("!=") {
            return self.binary(term, pos, 2, Operator::NotEquals);
        }
        if let Some(pos) = term.find("==") {
            return self.binary(term, pos, 2, Operator::DoubleEquals);
        }
        if let Some(pos) = term.find('=') {
            return self.binary(term, pos, 1, Operator::Equals);
        }

        if !self.labels {
            return Err(self.error(format!("'{term}' is not a field requirement")));
        }

        if let Some(key) = term.strip_prefix('!') {
            let key = self.key(key.trim())?;
            return Ok(Requirement::presence(key, false));
        }

        let mut words = term.splitn(2, char::is_whitespace);
        let key = words.next().unwrap_or_default();
        match words.next().map(str::trim_start) {
            None => Ok(Requirement::presence(self.key(key)?, true)),
            Some(rest) => {
                let (operator, list) = if let Some(list) = rest.strip_prefix("notin") {
                    (Operator::NotIn, list)
                } else if let Some(list) = rest.strip_prefix("in") {
                    (Operator::In, list)
                } else {
                    return Err(self.error(format!("unknown operator in '{term}'")));
                };
                let values = self.value_list(list.trim())?;
                Ok(Requirement {
                    key: self.key(key)?,
                    operator,
                    values,
                })
            }
        }
    }

    fn binary(
        &self,
        term: &str,
        pos: usize,
        width: usize,
        operator: Operator,
    ) -> StorageResult<Requirement> {
        let key = self.key(term[..pos].trim())?;
        let value = term[pos + width..].trim();
        Ok(Requirement::new(key, operator, value))
    }

    fn value_list(&self, list: &str) -> StorageResult<Vec<String>> {
        let inner = list
            .strip_prefix('(')
            .and_then(|l| l.strip_suffix(')'))
            .ok_or_else(|| self.error(format!("expected parenthesised values, found '{list}'")))?;
        Ok(inner
            .split(',')
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn key(&self, key: &str) -> StorageResult<String> {
        if key.is_empty() || key.contains(char::is_whitespace) {
            return Err(self.error(format!("invalid key '{key}'")));
        }
        Ok(key.to_string())
    }

    fn error(&self, message: String) -> crate::error::StorageError {
        ValidationError::InvalidSelector {
            selector: self.input.to_string(),
            message,
        }
        .into()
    }
}

/// Splits on commas that are not inside a parenthesised value list.
fn split_terms(input: &str) -> Vec<&str> {
    let mut terms = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in input.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                terms.push(&input[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    terms.push(&input[start..]);
    terms
}
