//! Process-wide registry of table layouts, keyed by resource kind.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{SchemaError, StorageResult, ValidationError};
use crate::types::Resource;

use super::descriptor::{SchemaDescriptor, SchemaDescriptorBuilder};

/// Table layouts for every resource kind a relational store serves.
///
/// Built once at startup and shared through `Arc`; there is no way to add
/// or evict entries afterwards, so reads need no synchronization.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    by_kind: HashMap<String, Arc<SchemaDescriptor>>,
}

impl SchemaRegistry {
    /// Starts building a registry.
    pub fn builder() -> SchemaRegistryBuilder {
        SchemaRegistryBuilder::default()
    }

    /// Returns the layout for `kind`.
    pub fn get(&self, kind: &str) -> Option<&Arc<SchemaDescriptor>> {
        self.by_kind.get(kind)
    }

    /// Returns the layout for `T`, or `UnregisteredKind`.
    pub fn for_resource<T: Resource>(&self) -> StorageResult<&Arc<SchemaDescriptor>> {
        self.get(T::KIND).ok_or_else(|| {
            ValidationError::UnregisteredKind {
                kind: T::KIND.to_string(),
            }
            .into()
        })
    }

    /// Iterates over `(kind, layout)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<SchemaDescriptor>)> {
        self.by_kind.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Returns the number of registered kinds.
    pub fn len(&self) -> usize {
        self.by_kind.len()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.by_kind.is_empty()
    }
}

/// Builder returned by [`SchemaRegistry::builder`].
#[derive(Debug, Default)]
pub struct SchemaRegistryBuilder {
    by_kind: HashMap<String, Arc<SchemaDescriptor>>,
}

impl SchemaRegistryBuilder {
    /// Registers the layout for `T`.
    pub fn register<T: Resource>(
        self,
        descriptor: SchemaDescriptorBuilder,
    ) -> Result<Self, SchemaError> {
        self.register_kind(T::KIND, descriptor)
    }

    /// Registers the layout for a kind given by name.
    pub fn register_kind(
        mut self,
        kind: &str,
        descriptor: SchemaDescriptorBuilder,
    ) -> Result<Self, SchemaError> {
        let descriptor = descriptor.build()?;
        if self.by_kind.contains_key(kind) {
            return Err(SchemaError::DuplicateKind {
                kind: kind.to_string(),
            });
        }
        tracing::debug!(kind, table = descriptor.table_name(), "registered table schema");
        self.by_kind.insert(kind.to_string(), Arc::new(descriptor));
        Ok(self)
    }

    /// Freezes the registry.
    pub fn build(self) -> SchemaRegistry {
        SchemaRegistry {
            by_kind: self.by_kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnType;

    fn layout(table: &str) -> SchemaDescriptorBuilder {
        SchemaDescriptor::builder(table)
            .resource_key("metadata.name", "name")
            .column("spec.size", "size", ColumnType::Integer)
    }

    #[test]
    fn test_lookup_by_kind() {
        let registry = SchemaRegistry::builder()
            .register_kind("Widget", layout("widgets"))
            .unwrap()
            .register_kind("Gizmo", layout("gizmos"))
            .unwrap()
            .build();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get("Widget").unwrap().table_name(), "widgets");
        assert!(registry.get("Sprocket").is_none());
    }

    #[test]
    fn test_duplicate_kind_rejected() {
        let err = SchemaRegistry::builder()
            .register_kind("Widget", layout("widgets"))
            .unwrap()
            .register_kind("Widget", layout("widgets_v2"))
            .unwrap_err();
        assert_eq!(
            err,
            SchemaError::DuplicateKind {
                kind: "Widget".to_string()
            }
        );
    }

    #[test]
    fn test_invalid_layout_fails_registration() {
        let err = SchemaRegistry::builder()
            .register_kind("Widget", SchemaDescriptor::builder("widgets"))
            .unwrap_err();
        assert!(matches!(err, SchemaError::MissingResourceKey { .. }));
    }
}
