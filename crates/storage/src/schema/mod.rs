//! Relational table layouts.
//!
//! Each resource kind served by the SQLite store declares its table once at
//! startup: the resource key column, the raw object column, and any columns
//! that mirror object fields so selectors can use them. Mirrored columns are
//! filled from the encoded object and never read back as object state.
//!
//! ```
//! use apimaster_storage::schema::{ColumnType, SchemaDescriptor, SchemaRegistry};
//!
//! let registry = SchemaRegistry::builder()
//!     .register_kind(
//!         "Widget",
//!         SchemaDescriptor::builder("widgets")
//!             .resource_key("metadata.name", "name")
//!             .constant("metadata.namespace", "namespace", ColumnType::Text)
//!             .column("spec.count", "count", ColumnType::Integer),
//!     )
//!     .unwrap()
//!     .build();
//!
//! let widgets = registry.get("Widget").unwrap();
//! assert_eq!(widgets.column_for_field("spec.count"), Some("count"));
//! assert_eq!(widgets.column_for_field("spec.color"), None);
//! ```

mod descriptor;
mod registry;

pub use descriptor::{
    ColumnDef, ColumnType, ColumnValue, DEFAULT_RAW_OBJECT_COLUMN, SchemaDescriptor,
    SchemaDescriptorBuilder,
};
pub use registry::{SchemaRegistry, SchemaRegistryBuilder};
