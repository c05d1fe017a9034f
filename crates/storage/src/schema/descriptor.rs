//! Table layout for one resource kind.

use std::collections::HashSet;

use serde_json::Value;

use crate::error::SchemaError;
use crate::types::FieldPath;

/// Column name used for the encoded object when none is declared.
pub const DEFAULT_RAW_OBJECT_COLUMN: &str = "rawobj";

/// Storage class of a mirrored column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    /// UTF-8 text. Booleans are stored as `true`/`false`.
    Text,
    /// 64-bit integer. Booleans are stored as `1`/`0`.
    Integer,
    /// 64-bit float.
    Real,
}

impl ColumnType {
    /// Returns the SQL type name.
    pub fn sql_type(&self) -> &'static str {
        match self {
            ColumnType::Text => "TEXT",
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
        }
    }
}

/// A column mirroring one object field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    /// Dotted path of the field in the encoded object.
    pub field: String,
    /// Column name.
    pub column: String,
    /// Column storage class.
    pub column_type: ColumnType,
    /// This column holds the resource key.
    pub resource_key: bool,
    /// Written on insert, never on update.
    pub constant: bool,
}

/// A value extracted from an object for a mirrored column.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    /// SQL NULL.
    Null,
    /// Integer value.
    Integer(i64),
    /// Float value.
    Real(f64),
    /// Text value.
    Text(String),
}

impl ColumnDef {
    /// Extracts this column's value from an encoded object.
    pub fn extract(&self, object: &Value) -> ColumnValue {
        let Some(value) = FieldPath::parse(&self.field).lookup(object) else {
            return ColumnValue::Null;
        };
        match (value, self.column_type) {
            (Value::Null, _) => ColumnValue::Null,
            (Value::Bool(b), ColumnType::Text) => ColumnValue::Text(b.to_string()),
            (Value::Bool(b), _) => ColumnValue::Integer(i64::from(*b)),
            (Value::Number(n), ColumnType::Integer) => n
                .as_i64()
                .map(ColumnValue::Integer)
                .or_else(|| n.as_f64().map(ColumnValue::Real))
                .unwrap_or(ColumnValue::Null),
            (Value::Number(n), ColumnType::Real) => {
                n.as_f64().map(ColumnValue::Real).unwrap_or(ColumnValue::Null)
            }
            (Value::Number(n), ColumnType::Text) => ColumnValue::Text(n.to_string()),
            (Value::String(s), _) => ColumnValue::Text(s.clone()),
            (other, _) => ColumnValue::Text(other.to_string()),
        }
    }
}

/// How one resource kind maps onto a relational table.
///
/// Built once through [`SchemaDescriptor::builder`] and immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaDescriptor {
    table_name: String,
    columns: Vec<ColumnDef>,
    resource_key: usize,
    raw_object_column: String,
    constant_columns: HashSet<String>,
}

impl SchemaDescriptor {
    /// Starts declaring the layout of `table_name`.
    pub fn builder(table_name: impl Into<String>) -> SchemaDescriptorBuilder {
        SchemaDescriptorBuilder {
            table_name: table_name.into(),
            columns: Vec::new(),
            raw_object_column: DEFAULT_RAW_OBJECT_COLUMN.to_string(),
        }
    }

    /// Returns the table name.
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Returns every mirrored column, including the resource key.
    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    /// Returns the resource key column definition.
    pub fn resource_key(&self) -> &ColumnDef {
        &self.columns[self.resource_key]
    }

    /// Returns the resource key column name.
    pub fn resource_key_column(&self) -> &str {
        &self.resource_key().column
    }

    /// Returns the column holding the encoded object.
    pub fn raw_object_column(&self) -> &str {
        &self.raw_object_column
    }

    /// Returns the columns written only on insert.
    pub fn constant_columns(&self) -> &HashSet<String> {
        &self.constant_columns
    }

    /// Returns true if `column` is never rewritten on update.
    pub fn is_constant(&self, column: &str) -> bool {
        self.constant_columns.contains(column)
    }

    /// Returns the mirrored column for a dotted field path.
    ///
    /// An exact path match wins; otherwise the last path segment is matched
    /// against the last segment of each declared field. `None` means the
    /// field is only present in the raw object.
    pub fn column_for_field(&self, field_path: &str) -> Option<&str> {
        if let Some(column) = self.column_for_exact_field(field_path) {
            return Some(column);
        }
        let last = field_path.rsplit('.').next().unwrap_or(field_path);
        self.columns
            .iter()
            .find(|c| c.field.rsplit('.').next() == Some(last))
            .map(|c| c.column.as_str())
    }

    /// Returns the column declared for exactly `field_path`, with no
    /// last-segment fallback.
    pub fn column_for_exact_field(&self, field_path: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|c| c.field == field_path)
            .map(|c| c.column.as_str())
    }

    /// Returns the column definition for a column name.
    pub fn column(&self, column: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.column == column)
    }

    /// Columns rewritten on update: every non-constant, non-key column, or
    /// only those whose field is in `changed_fields` when it is non-empty.
    pub fn update_columns<'a>(
        &'a self,
        changed_fields: &'a std::collections::BTreeSet<String>,
    ) -> impl Iterator<Item = &'a ColumnDef> + 'a {
        self.columns.iter().filter(move |c| {
            !c.resource_key
                && !c.constant
                && (changed_fields.is_empty() || changed_fields.contains(&c.field))
        })
    }
}

/// Builder returned by [`SchemaDescriptor::builder`].
#[derive(Debug, Clone)]
pub struct SchemaDescriptorBuilder {
    table_name: String,
    columns: Vec<ColumnDef>,
    raw_object_column: String,
}

impl SchemaDescriptorBuilder {
    /// Declares a mirrored, updatable column.
    pub fn column(self, field: &str, column: &str, column_type: ColumnType) -> Self {
        self.push(field, column, column_type, false, false)
    }

    /// Declares the resource key column.
    pub fn resource_key(self, field: &str, column: &str) -> Self {
        self.push(field, column, ColumnType::Text, true, true)
    }

    /// Declares a mirrored column that is only written on insert.
    pub fn constant(self, field: &str, column: &str, column_type: ColumnType) -> Self {
        self.push(field, column, column_type, false, true)
    }

    /// Names the column holding the encoded object.
    pub fn raw_object(mut self, column: &str) -> Self {
        self.raw_object_column = column.to_string();
        self
    }

    fn push(
        mut self,
        field: &str,
        column: &str,
        column_type: ColumnType,
        resource_key: bool,
        constant: bool,
    ) -> Self {
        self.columns.push(ColumnDef {
            field: field.to_string(),
            column: column.to_string(),
            column_type,
            resource_key,
            constant,
        });
        self
    }

    /// Validates the declaration.
    pub fn build(self) -> Result<SchemaDescriptor, SchemaError> {
        if self.table_name.is_empty() {
            return Err(SchemaError::MissingTable);
        }
        check_identifier(&self.table_name)?;

        if self.raw_object_column.is_empty() {
            return Err(SchemaError::MissingRawObject {
                table: self.table_name,
            });
        }
        check_identifier(&self.raw_object_column)?;

        let mut seen = HashSet::from([self.raw_object_column.clone()]);
        for def in &self.columns {
            check_identifier(&def.column)?;
            if !seen.insert(def.column.clone()) {
                return Err(SchemaError::DuplicateColumn {
                    table: self.table_name.clone(),
                    column: def.column.clone(),
                });
            }
        }

        let Some(resource_key) = self.columns.iter().position(|c| c.resource_key) else {
            return Err(SchemaError::MissingResourceKey {
                table: self.table_name,
            });
        };
        if let Some(extra) = self.columns.iter().skip(resource_key + 1).find(|c| c.resource_key) {
            return Err(SchemaError::DuplicateColumn {
                table: self.table_name.clone(),
                column: extra.column.clone(),
            });
        }

        let constant_columns = self
            .columns
            .iter()
            .filter(|c| c.constant)
            .map(|c| c.column.clone())
            .collect();

        Ok(SchemaDescriptor {
            table_name: self.table_name,
            columns: self.columns,
            resource_key,
            raw_object_column: self.raw_object_column,
            constant_columns,
        })
    }
}

fn check_identifier(identifier: &str) -> Result<(), SchemaError> {
    let mut chars = identifier.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(SchemaError::InvalidIdentifier {
            identifier: identifier.to_string(),
        })
    }
}
