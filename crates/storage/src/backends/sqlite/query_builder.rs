//! SQL query builder for selection predicates.
//!
//! Requirements on fields with a mirrored column compare the column;
//! everything else is evaluated against the raw object with SQLite's JSON
//! functions. The JSON path is bound as a parameter, never spliced into
//! the statement.

use rusqlite::types::Value as SqlValue;

use crate::core::{PredicateTranslator, supported_requirements};
use crate::schema::{ColumnDef, ColumnType, ColumnValue, SchemaDescriptor};
use crate::types::{FieldPath, FieldRequirement, Operator, PageWindow, SelectionPredicate};

use super::backend::BACKEND_NAME;

/// A fragment of SQL with bound parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlFragment {
    /// The SQL clause.
    pub sql: String,
    /// Bound parameter values.
    pub params: Vec<SqlParam>,
}

/// A bound SQL parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    /// String parameter.
    String(String),
    /// Integer parameter.
    Integer(i64),
    /// Float parameter.
    Float(f64),
    /// Blob parameter.
    Blob(Vec<u8>),
    /// Null parameter.
    Null,
}

impl SqlParam {
    /// Creates a string parameter.
    pub fn string(s: impl Into<String>) -> Self {
        SqlParam::String(s.into())
    }
}

impl From<ColumnValue> for SqlParam {
    fn from(value: ColumnValue) -> Self {
        match value {
            ColumnValue::Null => SqlParam::Null,
            ColumnValue::Integer(i) => SqlParam::Integer(i),
            ColumnValue::Real(f) => SqlParam::Float(f),
            ColumnValue::Text(s) => SqlParam::String(s),
        }
    }
}

impl From<SqlParam> for SqlValue {
    fn from(param: SqlParam) -> Self {
        match param {
            SqlParam::String(s) => SqlValue::Text(s),
            SqlParam::Integer(i) => SqlValue::Integer(i),
            SqlParam::Float(f) => SqlValue::Real(f),
            SqlParam::Blob(b) => SqlValue::Blob(b),
            SqlParam::Null => SqlValue::Null,
        }
    }
}

impl SqlFragment {
    /// Creates a new SQL fragment.
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// Adds a parameter placeholder and returns the placeholder string.
    pub fn add_param(&mut self, param: SqlParam) -> String {
        self.params.push(param);
        format!("?{}", self.params.len())
    }

    /// Appends a condition, AND-ed with any existing ones.
    pub fn push_condition(&mut self, condition: &str) {
        if self.sql.is_empty() {
            self.sql = condition.to_string();
        } else {
            self.sql = format!("{} AND {}", self.sql, condition);
        }
    }

    /// Returns true if this fragment is empty.
    pub fn is_empty(&self) -> bool {
        self.sql.is_empty()
    }

    /// Returns the parameters as rusqlite values.
    pub fn values(&self) -> Vec<SqlValue> {
        self.params.iter().cloned().map(SqlValue::from).collect()
    }
}

/// Translates predicates into `WHERE` clauses for one table.
#[derive(Debug, Clone, Copy)]
pub struct SqlTranslator<'a> {
    schema: &'a SchemaDescriptor,
}

impl<'a> SqlTranslator<'a> {
    /// Creates a translator for `schema`.
    pub fn new(schema: &'a SchemaDescriptor) -> Self {
        Self { schema }
    }

    /// Builds `SELECT COUNT(*)` for the predicate.
    pub fn count_query(&self, predicate: &SelectionPredicate) -> SqlFragment {
        let filter = self.translate(predicate);
        let mut query = SqlFragment::new(format!(
            "SELECT COUNT(*) FROM \"{}\"",
            self.schema.table_name()
        ));
        if !filter.is_empty() {
            query.sql = format!("{} WHERE {}", query.sql, filter.sql);
        }
        query.params = filter.params;
        query
    }

    /// Builds the page query returning `(resource key, raw object)` rows
    /// ordered by resource key.
    pub fn select_query(&self, predicate: &SelectionPredicate, window: &PageWindow) -> SqlFragment {
        let filter = self.translate(predicate);
        let key = self.schema.resource_key_column();
        let mut query = SqlFragment::new(format!(
            "SELECT \"{key}\", \"{}\" FROM \"{}\"",
            self.schema.raw_object_column(),
            self.schema.table_name()
        ));
        if !filter.is_empty() {
            query.sql = format!("{} WHERE {}", query.sql, filter.sql);
        }
        query.params = filter.params;
        query.sql = format!("{} ORDER BY \"{key}\"", query.sql);

        if window.has_page {
            let limit = query.add_param(SqlParam::Integer(clamp(window.per_page)));
            let offset = query.add_param(SqlParam::Integer(clamp(window.skip)));
            query.sql = format!("{} LIMIT {limit} OFFSET {offset}", query.sql);
        }
        query
    }

    /// Resolves the mirrored column a requirement compares against. Label
    /// keys only match a column declared for the exact label path.
    fn column_for(&self, req: &FieldRequirement) -> Option<&'a ColumnDef> {
        let dotted = req.path.dotted();
        let column = if req.label {
            self.schema.column_for_exact_field(&dotted)
        } else {
            self.schema.column_for_field(&dotted)
        }?;
        self.schema.column(column)
    }

    /// The value of `path` in the raw object as text. JSON booleans read as
    /// `true`/`false` so they compare like the selector's literal.
    fn raw_text(&self, fragment: &mut SqlFragment, path: &FieldPath) -> String {
        let path = fragment.add_param(SqlParam::string(json_path(path)));
        let raw = self.schema.raw_object_column();
        format!(
            "CASE json_type(CAST(\"{raw}\" AS TEXT), {path}) \
             WHEN 'true' THEN 'true' WHEN 'false' THEN 'false' \
             ELSE CAST(json_extract(CAST(\"{raw}\" AS TEXT), {path}) AS TEXT) END"
        )
    }

    fn target(
        &self,
        fragment: &mut SqlFragment,
        column: Option<&ColumnDef>,
        req: &FieldRequirement,
    ) -> String {
        match column {
            Some(def) => format!("\"{}\"", def.column),
            None => self.raw_text(fragment, &req.path),
        }
    }

    fn requirement(&self, fragment: &mut SqlFragment, req: &FieldRequirement) {
        let column = self.column_for(req);

        let condition = match req.operator {
            Operator::Equals | Operator::DoubleEquals => {
                let target = self.target(fragment, column, req);
                let value = fragment.add_param(SqlParam::string(compared_value(column, req.value())));
                format!("{target} = {value}")
            }
            Operator::NotEquals => {
                let target = self.target(fragment, column, req);
                let value = fragment.add_param(SqlParam::string(compared_value(column, req.value())));
                format!("{target} IS NOT {value}")
            }
            Operator::Exists | Operator::NotExists => {
                let negate = if req.operator == Operator::Exists {
                    "NOT "
                } else {
                    ""
                };
                match column {
                    Some(def) => format!("\"{}\" IS {negate}NULL", def.column),
                    None => {
                        let path = fragment.add_param(SqlParam::string(json_path(&req.path)));
                        format!(
                            "json_type(CAST(\"{}\" AS TEXT), {path}) IS {negate}NULL",
                            self.schema.raw_object_column()
                        )
                    }
                }
            }
            Operator::Contains => {
                let target = self.target(fragment, column, req);
                let value = fragment.add_param(SqlParam::string(req.value()));
                format!("instr({target}, {value}) > 0")
            }
            Operator::NotContains => {
                let target = self.target(fragment, column, req);
                let value = fragment.add_param(SqlParam::string(req.value()));
                format!("COALESCE(instr({target}, {value}), 0) = 0")
            }
            Operator::In | Operator::NotIn => return,
        };

        tracing::trace!(
            field = %req.path,
            column = ?column.map(|def| def.column.as_str()),
            %condition,
            "translated requirement"
        );
        fragment.push_condition(&condition);
    }
}

impl PredicateTranslator for SqlTranslator<'_> {
    type Output = SqlFragment;

    fn translate(&self, predicate: &SelectionPredicate) -> SqlFragment {
        let mut fragment = SqlFragment::default();
        for req in supported_requirements(BACKEND_NAME, predicate) {
            self.requirement(&mut fragment, &req);
        }
        fragment
    }
}

/// Formats a field path as a SQLite JSON path, quoting every segment.
fn json_path(path: &FieldPath) -> String {
    let mut out = String::from("$");
    for segment in path.segments() {
        out.push_str(".\"");
        out.push_str(&segment.replace('"', "\\\""));
        out.push('"');
    }
    out
}

/// Numeric columns hold booleans as `1`/`0`; text columns and the raw
/// object compare against the literal.
fn compared_value<'v>(column: Option<&ColumnDef>, value: &'v str) -> &'v str {
    let numeric = column.is_some_and(|def| def.column_type != ColumnType::Text);
    match value {
        "true" if numeric => "1",
        "false" if numeric => "0",
        other => other,
    }
}

fn clamp(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Requirement, Selector};

    fn schema() -> SchemaDescriptor {
        SchemaDescriptor::builder("widgets")
            .resource_key("metadata.name", "name")
            .column("spec.count", "count", ColumnType::Integer)
            .column("spec.mode", "mode", ColumnType::Text)
            .build()
            .unwrap()
    }

    fn raw_text(n: usize) -> String {
        format!(
            "CASE json_type(CAST(\"rawobj\" AS TEXT), ?{n}) \
             WHEN 'true' THEN 'true' WHEN 'false' THEN 'false' \
             ELSE CAST(json_extract(CAST(\"rawobj\" AS TEXT), ?{n}) AS TEXT) END"
        )
    }

    #[test]
    fn test_indexed_field_uses_column() {
        let schema = schema();
        let predicate = SelectionPredicate::field_equals("metadata.name", "foo");
        let fragment = SqlTranslator::new(&schema).translate(&predicate);
        assert_eq!(fragment.sql, "\"name\" = ?1");
        assert_eq!(fragment.params, vec![SqlParam::string("foo")]);
    }

    #[test]
    fn test_unindexed_field_queries_raw_object() {
        let schema = schema();
        let predicate = SelectionPredicate::parse("tier=prod", "spec.enabled!=true", None).unwrap();
        let fragment = SqlTranslator::new(&schema).translate(&predicate);
        assert_eq!(
            fragment.sql,
            format!("{} = ?2 AND {} IS NOT ?4", raw_text(1), raw_text(3))
        );
        assert_eq!(
            fragment.params,
            vec![
                SqlParam::string("$.\"metadata\".\"labels\".\"tier\""),
                SqlParam::string("prod"),
                SqlParam::string("$.\"spec\".\"enabled\""),
                SqlParam::string("true"),
            ]
        );
    }

    #[test]
    fn test_booleans_follow_column_type() {
        let schema = schema();
        let translator = SqlTranslator::new(&schema);

        let fragment = translator.translate(&SelectionPredicate::field_equals("spec.count", "true"));
        assert_eq!(fragment.sql, "\"count\" = ?1");
        assert_eq!(fragment.params, vec![SqlParam::string("1")]);

        let fragment = translator.translate(&SelectionPredicate::field_equals("spec.mode", "false"));
        assert_eq!(fragment.sql, "\"mode\" = ?1");
        assert_eq!(fragment.params, vec![SqlParam::string("false")]);
    }

    #[test]
    fn test_label_keys_never_fall_back_to_columns() {
        let schema = schema();
        let predicate = SelectionPredicate::parse("name=web,count=2", "", None).unwrap();
        let fragment = SqlTranslator::new(&schema).translate(&predicate);
        assert_eq!(
            fragment.sql,
            format!("{} = ?2 AND {} = ?4", raw_text(1), raw_text(3))
        );
        assert_eq!(
            fragment.params,
            vec![
                SqlParam::string("$.\"metadata\".\"labels\".\"name\""),
                SqlParam::string("web"),
                SqlParam::string("$.\"metadata\".\"labels\".\"count\""),
                SqlParam::string("2"),
            ]
        );

        let predicate = SelectionPredicate::field_equals("status.count", "2");
        let fragment = SqlTranslator::new(&schema).translate(&predicate);
        assert_eq!(fragment.sql, "\"count\" = ?1");
    }

    #[test]
    fn test_presence_and_contains() {
        let schema = schema();
        let predicate = SelectionPredicate::default()
            .with_label(Selector::parse_labels("app,!legacy").unwrap())
            .with_field(
                Selector::everything()
                    .with(Requirement::presence("spec.count", true))
                    .with(Requirement::new("spec.note", Operator::Contains, "abc")),
            );
        let fragment = SqlTranslator::new(&schema).translate(&predicate);
        assert_eq!(
            fragment.sql,
            format!(
                "json_type(CAST(\"rawobj\" AS TEXT), ?1) IS NOT NULL AND \
                 json_type(CAST(\"rawobj\" AS TEXT), ?2) IS NULL AND \
                 \"count\" IS NOT NULL AND \
                 instr({}, ?4) > 0",
                raw_text(3)
            )
        );
        assert_eq!(
            fragment.params,
            vec![
                SqlParam::string("$.\"metadata\".\"labels\".\"app\""),
                SqlParam::string("$.\"metadata\".\"labels\".\"legacy\""),
                SqlParam::string("$.\"spec\".\"note\""),
                SqlParam::string("abc"),
            ]
        );
    }

    #[test]
    fn test_set_operators_skipped() {
        let schema = schema();
        let predicate = SelectionPredicate::parse("tier in (prod,dev)", "", None).unwrap();
        assert!(SqlTranslator::new(&schema).translate(&predicate).is_empty());
    }

    #[test]
    fn test_select_query_pages_after_filter() {
        let schema = schema();
        let predicate = SelectionPredicate::field_equals("spec.count", "3");
        let window = PageWindow {
            has_page: true,
            per_page: 10,
            skip: 20,
        };
        let query = SqlTranslator::new(&schema).select_query(&predicate, &window);
        assert_eq!(
            query.sql,
            "SELECT \"name\", \"rawobj\" FROM \"widgets\" WHERE \"count\" = ?1 \
             ORDER BY \"name\" LIMIT ?2 OFFSET ?3"
        );
        assert_eq!(
            query.params,
            vec![
                SqlParam::string("3"),
                SqlParam::Integer(10),
                SqlParam::Integer(20)
            ]
        );

        let count = SqlTranslator::new(&schema).count_query(&SelectionPredicate::everything());
        assert_eq!(count.sql, "SELECT COUNT(*) FROM \"widgets\"");
        assert!(count.params.is_empty());
    }

    #[test]
    fn test_json_path_quotes_dotted_label_keys() {
        assert_eq!(
            json_path(&FieldPath::label("app.kubernetes.io/name")),
            "$.\"metadata\".\"labels\".\"app.kubernetes.io/name\""
        );
    }
}
