//! Test fixtures for store integration tests.
//!
//! Provides a small `Service` resource, builders for it, and the schema
//! registry the relational backend needs to store it.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use apimaster_storage::schema::{ColumnType, SchemaDescriptor, SchemaRegistry};
use apimaster_storage::types::{ObjectMeta, Resource, TypeMeta};

/// A namespaced service definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Service {
    #[serde(flatten)]
    pub type_meta: TypeMeta,
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: ServiceSpec,
}

/// Desired state of a [`Service`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceSpec {
    #[serde(default)]
    pub port: i64,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub replicas: i64,
}

impl Resource for Service {
    const KIND: &'static str = "Service";

    fn type_meta(&self) -> &TypeMeta {
        &self.type_meta
    }

    fn type_meta_mut(&mut self) -> &mut TypeMeta {
        &mut self.type_meta
    }

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

/// Builder for [`Service`] fixtures.
#[derive(Debug, Clone)]
pub struct ServiceFixture {
    name: String,
    labels: BTreeMap<String, String>,
    port: i64,
    host: String,
    uid: Option<String>,
}

impl ServiceFixture {
    /// Creates a fixture named `name` in the `ns` namespace.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            labels: BTreeMap::new(),
            port: 80,
            host: String::new(),
            uid: None,
        }
    }

    /// Adds a label.
    pub fn with_label(mut self, key: &str, value: &str) -> Self {
        self.labels.insert(key.to_string(), value.to_string());
        self
    }

    /// Sets the port.
    pub fn with_port(mut self, port: i64) -> Self {
        self.port = port;
        self
    }

    /// Sets the host.
    pub fn with_host(mut self, host: &str) -> Self {
        self.host = host.to_string();
        self
    }

    /// Sets the uid.
    pub fn with_uid(mut self, uid: &str) -> Self {
        self.uid = Some(uid.to_string());
        self
    }

    /// Builds the service.
    pub fn build(self) -> Service {
        Service {
            type_meta: TypeMeta::default(),
            metadata: ObjectMeta {
                name: self.name,
                namespace: "ns".to_string(),
                uid: self.uid.unwrap_or_default(),
                labels: self.labels,
                ..Default::default()
            },
            spec: ServiceSpec {
                port: self.port,
                host: self.host,
                replicas: 0,
            },
        }
    }
}

/// Shorthand for a service carrying a `tier` label.
pub fn service(name: &str, tier: &str) -> Service {
    ServiceFixture::new(name).with_label("tier", tier).build()
}

/// The storage key for a service in the `ns` namespace.
pub fn key(name: &str) -> String {
    format!("ns/{name}")
}

/// A registry with the `services` table layout.
pub fn registry() -> Arc<SchemaRegistry> {
    let registry = SchemaRegistry::builder()
        .register::<Service>(
            SchemaDescriptor::builder("services")
                .resource_key("metadata.name", "name")
                .constant("metadata.namespace", "namespace", ColumnType::Text)
                .column("spec.port", "port", ColumnType::Integer)
                .column("spec.replicas", "replicas", ColumnType::Integer),
        )
        .expect("services layout is valid")
        .build();
    Arc::new(registry)
}
