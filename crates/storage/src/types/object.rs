//! API object metadata and the [`Resource`] trait.
//!
//! Every stored type carries Kubernetes-style type metadata (`kind`,
//! `apiVersion`) and object metadata (`name`, `resourceVersion`, labels).
//! Stores only touch objects through the accessors defined here.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Kind and API version embedded in every encoded object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeMeta {
    /// The resource kind, e.g. `Widget`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kind: String,

    /// The storage API version, e.g. `v1`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_version: String,
}

/// Standard object metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    /// Object name, unique within its namespace.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    /// Namespace the object lives in.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,

    /// Unique identifier assigned by the caller.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uid: String,

    /// Opaque version stamp set by the store on every read.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub resource_version: String,

    /// Labels matched by label selectors.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    /// Free-form annotations.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,

    /// Creation time, if the caller recorded one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<DateTime<Utc>>,
}

/// List metadata returned alongside a page of items.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListMeta {
    /// Version stamp of the list.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub resource_version: String,

    /// Number of items matching the predicate, ignoring paging.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_items: Option<u64>,
}

/// A storable API object.
///
/// Implementors are plain serde types with a `TypeMeta` flattened at the top
/// level and an `ObjectMeta` under `metadata`:
///
/// ```
/// use apimaster_storage::types::{ObjectMeta, Resource, TypeMeta};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
/// struct Widget {
///     #[serde(flatten)]
///     type_meta: TypeMeta,
///     metadata: ObjectMeta,
///     count: u32,
/// }
///
/// impl Resource for Widget {
///     const KIND: &'static str = "Widget";
///
///     fn type_meta(&self) -> &TypeMeta { &self.type_meta }
///     fn type_meta_mut(&mut self) -> &mut TypeMeta { &mut self.type_meta }
///     fn metadata(&self) -> &ObjectMeta { &self.metadata }
///     fn metadata_mut(&mut self) -> &mut ObjectMeta { &mut self.metadata }
/// }
/// ```
pub trait Resource:
    Serialize + DeserializeOwned + Default + Clone + Send + Sync + 'static
{
    /// The resource kind. Selects the table, collection or key prefix.
    const KIND: &'static str;

    /// Returns the type metadata.
    fn type_meta(&self) -> &TypeMeta;

    /// Returns the type metadata mutably.
    fn type_meta_mut(&mut self) -> &mut TypeMeta;

    /// Returns the object metadata.
    fn metadata(&self) -> &ObjectMeta;

    /// Returns the object metadata mutably.
    fn metadata_mut(&mut self) -> &mut ObjectMeta;
}

/// A list of resources filled by `get_to_list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceList<T> {
    /// Type metadata of the list, e.g. `WidgetList`.
    #[serde(flatten)]
    pub type_meta: TypeMeta,

    /// List metadata.
    #[serde(default)]
    pub metadata: ListMeta,

    /// Decoded items, in backend order.
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}

impl<T> Default for ResourceList<T> {
    fn default() -> Self {
        Self {
            type_meta: TypeMeta::default(),
            metadata: ListMeta::default(),
            items: Vec::new(),
        }
    }
}

impl<T: Resource> ResourceList<T> {
    /// Creates an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if the list holds no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns the item names, in list order.
    pub fn names(&self) -> Vec<&str> {
        self.items
            .iter()
            .map(|item| item.metadata().name.as_str())
            .collect()
    }
}

/// Returns the resource name encoded in a storage key: its last `/` segment.
pub fn resource_key(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_key_takes_last_segment() {
        assert_eq!(resource_key("ns/foo"), "foo");
        assert_eq!(resource_key("/registry/widgets/ns/bar"), "bar");
        assert_eq!(resource_key("plain"), "plain");
        assert_eq!(resource_key("trailing/"), "");
    }

    #[test]
    fn test_object_meta_omits_empty_fields() {
        let meta = ObjectMeta {
            name: "foo".to_string(),
            ..Default::default()
        };
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json, serde_json::json!({"name": "foo"}));
    }

    #[test]
    fn test_list_meta_total_items() {
        let meta = ListMeta {
            resource_version: "1".to_string(),
            total_items: Some(25),
        };
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["totalItems"], 25);
        assert_eq!(json["resourceVersion"], "1");
    }
}
