//! In-memory clients standing in for MongoDB and DynamoDB in unit tests.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bson::{Bson, Document};
use serde::{Deserialize, Serialize};

use super::dynamodb::{
    AttrValue, FilterExpression, Item, KEY_ATTR, KeyValueApi, KeyValueClientError, ScanOutput,
    ScanRequest, TableSpec,
};
use super::mongodb::{DocumentApi, DocumentClientError, FindQuery, RequestMeta};
use crate::types::{ObjectMeta, Resource, TypeMeta};

// ============================================================================
// Fixtures
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct Widget {
    #[serde(flatten)]
    pub type_meta: TypeMeta,
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: WidgetSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct WidgetSpec {
    #[serde(default)]
    pub count: i64,
    #[serde(default)]
    pub host: String,
}

impl Resource for Widget {
    const KIND: &'static str = "Widget";

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

/// A widget named `name` in namespace `ns` with label `tier`.
pub(crate) fn widget(name: &str, tier: &str) -> Widget {
    let mut metadata = ObjectMeta {
        name: name.to_string(),
        namespace: "ns".to_string(),
        uid: format!("uid-{name}"),
        ..Default::default()
    };
    metadata.labels.insert("tier".to_string(), tier.to_string());
    Widget {
        metadata,
        ..Default::default()
    }
}

// ============================================================================
// Document client
// ============================================================================

#[derive(Debug, Default)]
struct DocumentState {
    collections: HashMap<(String, String), Vec<Document>>,
    index_calls: HashMap<String, usize>,
    unavailable: bool,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct MemoryDocumentClient {
    state: Arc<Mutex<DocumentState>>,
}

impl MemoryDocumentClient {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().unwrap().unavailable = unavailable;
    }

    /// Number of times indexes were ensured on `collection`.
    pub(crate) fn index_calls(&self, collection: &str) -> usize {
        let state = self.state.lock().unwrap();
        state.index_calls.get(collection).copied().unwrap_or_default()
    }

    /// Raw documents stored in `collection`, in insertion order.
    pub(crate) fn documents(&self, database: &str, collection: &str) -> Vec<Document> {
        let state = self.state.lock().unwrap();
        state
            .collections
            .get(&(database.to_string(), collection.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    /// Inserts a document without any uniqueness check.
    pub(crate) fn insert_raw(&self, meta: &RequestMeta, doc: Document) {
        let mut state = self.state.lock().unwrap();
        state
            .collections
            .entry((meta.database.clone(), meta.collection.clone()))
            .or_default()
            .push(doc);
    }

    fn check(&self) -> Result<(), DocumentClientError> {
        if self.state.lock().unwrap().unavailable {
            return Err(DocumentClientError::Unavailable("connection refused".into()));
        }
        Ok(())
    }

    fn matching(&self, meta: &RequestMeta, filter: &Document) -> Vec<Document> {
        let state = self.state.lock().unwrap();
        state
            .collections
            .get(&(meta.database.clone(), meta.collection.clone()))
            .map(|docs| {
                docs.iter()
                    .filter(|doc| document_matches(doc, filter))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn regex_pattern(value: &Bson) -> Option<&str> {
    match value {
        Bson::String(pattern) => Some(pattern),
        Bson::RegularExpression(re) => Some(&re.pattern),
        _ => None,
    }
}

fn regex_matches(pattern: &str, value: Option<&Bson>) -> bool {
    let Ok(re) = regex::Regex::new(pattern) else {
        return false;
    };
    matches!(value, Some(Bson::String(s)) if re.is_match(s))
}

fn field_matches(doc: &Document, field: &str, condition: &Bson) -> bool {
    let value = doc.get(field);
    if let Bson::Document(ops) = condition {
        if let Some(pattern) = ops.get("$regex").and_then(regex_pattern) {
            return regex_matches(pattern, value);
        }
        if let Some(pattern) = ops.get("$not").and_then(regex_pattern) {
            return !regex_matches(pattern, value);
        }
    }
    value == Some(condition)
}

fn document_matches(doc: &Document, filter: &Document) -> bool {
    filter.iter().all(|(field, condition)| match (field.as_str(), condition) {
        ("$and", Bson::Array(clauses)) => clauses.iter().all(|clause| match clause {
            Bson::Document(clause) => document_matches(doc, clause),
            _ => false,
        }),
        _ => field_matches(doc, field, condition),
    })
}

#[async_trait]
impl DocumentApi for MemoryDocumentClient {
    async fn ping(&self, _database: &str) -> Result<(), DocumentClientError> {
        self.check()
    }

    async fn ensure_indexes(&self, meta: &RequestMeta) -> Result<(), DocumentClientError> {
        self.check()?;
        let mut state = self.state.lock().unwrap();
        *state.index_calls.entry(meta.collection.clone()).or_default() += 1;
        Ok(())
    }

    async fn find_one(
        &self,
        meta: &RequestMeta,
        filter: Document,
    ) -> Result<Option<Document>, DocumentClientError> {
        self.check()?;
        Ok(self.matching(meta, &filter).into_iter().next())
    }

    async fn find(
        &self,
        meta: &RequestMeta,
        query: FindQuery,
    ) -> Result<Vec<Document>, DocumentClientError> {
        self.check()?;
        let mut docs = self.matching(meta, &query.filter);
        if query.sort.is_some() {
            docs.sort_by(|a, b| a.get_str("key").ok().cmp(&b.get_str("key").ok()));
        }
        let skip = query.skip.unwrap_or_default() as usize;
        let limit = query
            .limit
            .and_then(|l| usize::try_from(l).ok())
            .unwrap_or(usize::MAX);
        Ok(docs.into_iter().skip(skip).take(limit).collect())
    }

    async fn count_documents(
        &self,
        meta: &RequestMeta,
        filter: Document,
    ) -> Result<u64, DocumentClientError> {
        self.check()?;
        Ok(self.matching(meta, &filter).len() as u64)
    }

    async fn insert_one(
        &self,
        meta: &RequestMeta,
        doc: Document,
    ) -> Result<(), DocumentClientError> {
        self.check()?;
        let mut state = self.state.lock().unwrap();
        let docs = state
            .collections
            .entry((meta.database.clone(), meta.collection.clone()))
            .or_default();
        let key = doc.get("key").cloned();
        if docs.iter().any(|existing| existing.get("key").cloned() == key) {
            return Err(DocumentClientError::Duplicate(format!(
                "E11000 duplicate key error collection: {}",
                meta.collection
            )));
        }
        docs.push(doc);
        Ok(())
    }

    async fn update_one(
        &self,
        meta: &RequestMeta,
        filter: Document,
        update: Document,
    ) -> Result<u64, DocumentClientError> {
        self.check()?;
        let mut state = self.state.lock().unwrap();
        let Some(docs) = state
            .collections
            .get_mut(&(meta.database.clone(), meta.collection.clone()))
        else {
            return Ok(0);
        };
        let Some(doc) = docs.iter_mut().find(|doc| document_matches(doc, &filter)) else {
            return Ok(0);
        };
        if let Ok(set) = update.get_document("$set") {
            for (field, value) in set {
                doc.insert(field.clone(), value.clone());
            }
        }
        Ok(1)
    }

    async fn delete_one(
        &self,
        meta: &RequestMeta,
        filter: Document,
    ) -> Result<u64, DocumentClientError> {
        self.check()?;
        let mut state = self.state.lock().unwrap();
        let Some(docs) = state
            .collections
            .get_mut(&(meta.database.clone(), meta.collection.clone()))
        else {
            return Ok(0);
        };
        match docs.iter().position(|doc| document_matches(doc, &filter)) {
            Some(pos) => {
                docs.remove(pos);
                Ok(1)
            }
            None => Ok(0),
        }
    }
}

// ============================================================================
// Key-value client
// ============================================================================

#[derive(Debug, Default)]
struct KeyValueState {
    tables: BTreeSet<String>,
    items: BTreeMap<(String, String), Item>,
    /// Items evaluated per scan call when the request sets no limit.
    scan_page_size: Option<usize>,
    scan_calls: usize,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct MemoryKeyValueClient {
    state: Arc<Mutex<KeyValueState>>,
}

impl MemoryKeyValueClient {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Splits scans into pages of `size` evaluated items.
    pub(crate) fn with_scan_page_size(self, size: usize) -> Self {
        self.state.lock().unwrap().scan_page_size = Some(size);
        self
    }

    pub(crate) fn scan_calls(&self) -> usize {
        self.state.lock().unwrap().scan_calls
    }

    pub(crate) fn item(&self, table: &str, key: &str) -> Option<Item> {
        let state = self.state.lock().unwrap();
        state
            .items
            .get(&(table.to_string(), key.to_string()))
            .cloned()
    }

    fn table_exists(&self, table: &str) -> Result<(), KeyValueClientError> {
        if self.state.lock().unwrap().tables.contains(table) {
            Ok(())
        } else {
            Err(KeyValueClientError::NotFound(format!(
                "Requested resource not found: Table: {table} not found"
            )))
        }
    }
}

fn key_of(item: &Item) -> Result<String, KeyValueClientError> {
    match item.get(KEY_ATTR) {
        Some(AttrValue::S(key)) => Ok(key.clone()),
        _ => Err(KeyValueClientError::Internal(
            "The provided key element does not match the schema".into(),
        )),
    }
}

#[async_trait]
impl KeyValueApi for MemoryKeyValueClient {
    async fn describe_table(&self, table: &str) -> Result<bool, KeyValueClientError> {
        Ok(self.state.lock().unwrap().tables.contains(table))
    }

    async fn ensure_table(&self, spec: &TableSpec) -> Result<(), KeyValueClientError> {
        self.state.lock().unwrap().tables.insert(spec.table.clone());
        Ok(())
    }

    async fn get_item(&self, table: &str, key: Item) -> Result<Option<Item>, KeyValueClientError> {
        self.table_exists(table)?;
        Ok(self.item(table, &key_of(&key)?))
    }

    async fn put_item(
        &self,
        table: &str,
        item: Item,
        condition: Option<FilterExpression>,
    ) -> Result<(), KeyValueClientError> {
        self.table_exists(table)?;
        let key = (table.to_string(), key_of(&item)?);
        let mut state = self.state.lock().unwrap();
        if let Some(condition) = condition {
            let current = state.items.get(&key).cloned().unwrap_or_default();
            if !condition.matches(&current) {
                return Err(KeyValueClientError::ConditionFailed);
            }
        }
        state.items.insert(key, item);
        Ok(())
    }

    async fn delete_item(
        &self,
        table: &str,
        key: Item,
    ) -> Result<Option<Item>, KeyValueClientError> {
        self.table_exists(table)?;
        let key = (table.to_string(), key_of(&key)?);
        Ok(self.state.lock().unwrap().items.remove(&key))
    }

    async fn scan(&self, request: ScanRequest) -> Result<ScanOutput, KeyValueClientError> {
        self.table_exists(&request.table)?;
        let start = request.exclusive_start_key.as_ref().map(key_of).transpose()?;

        let mut state = self.state.lock().unwrap();
        state.scan_calls += 1;
        let page_size = request
            .limit
            .and_then(|l| usize::try_from(l).ok())
            .or(state.scan_page_size)
            .unwrap_or(usize::MAX);

        let remaining: Vec<(&String, &Item)> = state
            .items
            .iter()
            .filter(|((table, _), _)| *table == request.table)
            .filter(|((_, key), _)| start.as_ref().is_none_or(|s| key > s))
            .map(|((_, key), item)| (key, item))
            .collect();
        let evaluated = &remaining[..remaining.len().min(page_size)];
        let last_evaluated_key = (evaluated.len() < remaining.len())
            .then(|| evaluated.last().map(|(_, item)| (*item).clone()))
            .flatten();

        let items: Vec<Item> = evaluated
            .iter()
            .map(|(_, item)| *item)
            .filter(|item| request.filter.as_ref().is_none_or(|f| f.matches(item)))
            .cloned()
            .collect();
        let count = items.len() as u64;
        Ok(ScanOutput {
            items: if request.select_count { Vec::new() } else { items },
            count,
            last_evaluated_key,
        })
    }
}
