use std::fmt;

use async_trait::async_trait;

use super::filter::FilterExpression;
use super::item::Item;

/// Table layout: string hash and range keys plus provisioned throughput.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    /// Table name.
    pub table: String,
    /// Hash key attribute.
    pub hash_key: String,
    /// Range key attribute.
    pub range_key: String,
    /// Provisioned read capacity units.
    pub read_capacity: i64,
    /// Provisioned write capacity units.
    pub write_capacity: i64,
}

/// One page of a table scan.
#[derive(Debug, Clone, Default)]
pub struct ScanRequest {
    /// Table to scan.
    pub table: String,
    /// Filter applied after items are read.
    pub filter: Option<FilterExpression>,
    /// Maximum items evaluated per page.
    pub limit: Option<i32>,
    /// Return only the number of matching items.
    pub select_count: bool,
    /// Resume point from the previous page.
    pub exclusive_start_key: Option<Item>,
}

impl ScanRequest {
    /// Scans `table`, dropping an empty filter.
    pub fn new(table: impl Into<String>, filter: &FilterExpression) -> Self {
        Self {
            table: table.into(),
            filter: (!filter.is_empty()).then(|| filter.clone()),
            ..Default::default()
        }
    }
}

/// Result of one scan page.
#[derive(Debug, Clone, Default)]
pub struct ScanOutput {
    /// Matching items, empty for count scans.
    pub items: Vec<Item>,
    /// Number of matching items on this page.
    pub count: u64,
    /// Set when more pages remain.
    pub last_evaluated_key: Option<Item>,
}

/// Errors surfaced by a [`KeyValueApi`] implementation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyValueClientError {
    /// A write condition did not hold.
    ConditionFailed,
    /// The table does not exist.
    NotFound(String),
    /// Request rate exceeded.
    Throttled(String),
    /// The service could not be reached.
    Unavailable(String),
    /// Anything else.
    Internal(String),
}

impl fmt::Display for KeyValueClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConditionFailed => f.write_str("conditional check failed"),
            Self::NotFound(m) => write!(f, "not found: {m}"),
            Self::Throttled(m) => write!(f, "throttled: {m}"),
            Self::Unavailable(m) => write!(f, "unavailable: {m}"),
            Self::Internal(m) => f.write_str(m),
        }
    }
}

/// The subset of DynamoDB the store uses.
#[async_trait]
pub trait KeyValueApi: Send + Sync {
    /// Returns whether the table exists.
    async fn describe_table(&self, table: &str) -> Result<bool, KeyValueClientError>;

    /// Creates the table if it is missing and waits for it to become usable.
    async fn ensure_table(&self, spec: &TableSpec) -> Result<(), KeyValueClientError>;

    /// Strongly consistent read of one item.
    async fn get_item(&self, table: &str, key: Item) -> Result<Option<Item>, KeyValueClientError>;

    /// Writes `item`, replacing any item with the same key. Fails with
    /// [`KeyValueClientError::ConditionFailed`] when `condition` does not
    /// hold for the current item.
    async fn put_item(
        &self,
        table: &str,
        item: Item,
        condition: Option<FilterExpression>,
    ) -> Result<(), KeyValueClientError>;

    /// Deletes the item under `key`, returning its old attributes.
    async fn delete_item(&self, table: &str, key: Item)
    -> Result<Option<Item>, KeyValueClientError>;

    /// Reads one page of a filtered scan.
    async fn scan(&self, request: ScanRequest) -> Result<ScanOutput, KeyValueClientError>;
}

#[cfg(feature = "dynamodb")]
pub use sdk::DynamoDbClient;

#[cfg(feature = "dynamodb")]
mod sdk {
    use std::collections::HashMap;
    use std::time::Duration;

    use async_trait::async_trait;
    use aws_config::{BehaviorVersion, Region};
    use aws_credential_types::Credentials;
    use aws_sdk_dynamodb::Client;
    use aws_sdk_dynamodb::error::ProvideErrorMetadata;
    use aws_sdk_dynamodb::types::{
        AttributeDefinition, AttributeValue, KeySchemaElement, KeyType, ProvisionedThroughput,
        ReturnValue, ScalarAttributeType, Select, TableStatus,
    };

    use super::super::backend::DynamoBackendConfig;
    use super::super::filter::FilterExpression;
    use super::super::item::{AttrValue, Item};
    use super::{KeyValueApi, KeyValueClientError, ScanOutput, ScanRequest, TableSpec};

    const TABLE_ACTIVE_POLL: Duration = Duration::from_millis(500);
    const TABLE_ACTIVE_ATTEMPTS: u32 = 120;

    /// [`KeyValueApi`] over the AWS SDK client.
    #[derive(Debug, Clone)]
    pub struct DynamoDbClient {
        client: Client,
    }

    impl DynamoDbClient {
        /// Wraps an existing SDK client.
        pub fn new(client: Client) -> Self {
            Self { client }
        }

        /// Loads AWS configuration, applying the region, static
        /// credentials and endpoint override from `config`.
        pub async fn connect(config: &DynamoBackendConfig) -> Self {
            let mut loader = aws_config::defaults(BehaviorVersion::latest())
                .region(Region::new(config.region.clone()));
            if let (Some(id), Some(secret)) = (&config.access_key_id, &config.secret_access_key) {
                loader = loader.credentials_provider(Credentials::new(
                    id.clone(),
                    secret.clone(),
                    config.session_token.clone(),
                    None,
                    "apimaster-storage",
                ));
            }
            if let Some(endpoint) = &config.endpoint_url {
                loader = loader.endpoint_url(endpoint.clone());
            }
            let sdk_config = loader.load().await;
            Self::new(Client::new(&sdk_config))
        }

        async fn table_status(&self, table: &str) -> Result<Option<TableStatus>, KeyValueClientError> {
            match self.client.describe_table().table_name(table).send().await {
                Ok(out) => Ok(out.table().and_then(|t| t.table_status().cloned())),
                Err(err) => match map_sdk_error(err) {
                    KeyValueClientError::NotFound(_) => Ok(None),
                    other => Err(other),
                },
            }
        }
    }

    fn to_sdk(value: &AttrValue) -> AttributeValue {
        match value {
            AttrValue::S(s) => AttributeValue::S(s.clone()),
            AttrValue::N(n) => AttributeValue::N(n.clone()),
            AttrValue::Bool(b) => AttributeValue::Bool(*b),
            AttrValue::Null => AttributeValue::Null(true),
            AttrValue::M(map) => AttributeValue::M(to_sdk_item(map)),
            AttrValue::L(items) => AttributeValue::L(items.iter().map(to_sdk).collect()),
        }
    }

    fn from_sdk(value: &AttributeValue) -> AttrValue {
        match value {
            AttributeValue::S(s) => AttrValue::S(s.clone()),
            AttributeValue::N(n) => AttrValue::N(n.clone()),
            AttributeValue::Bool(b) => AttrValue::Bool(*b),
            AttributeValue::M(map) => AttrValue::M(from_sdk_item(map)),
            AttributeValue::L(items) => AttrValue::L(items.iter().map(from_sdk).collect()),
            AttributeValue::Ss(items) => {
                AttrValue::L(items.iter().cloned().map(AttrValue::S).collect())
            }
            AttributeValue::Ns(items) => {
                AttrValue::L(items.iter().cloned().map(AttrValue::N).collect())
            }
            _ => AttrValue::Null,
        }
    }

    fn to_sdk_item(item: &Item) -> HashMap<String, AttributeValue> {
        item.iter().map(|(k, v)| (k.clone(), to_sdk(v))).collect()
    }

    fn from_sdk_item(item: &HashMap<String, AttributeValue>) -> Item {
        item.iter().map(|(k, v)| (k.clone(), from_sdk(v))).collect()
    }

    type ExpressionParts = (
        String,
        HashMap<String, String>,
        HashMap<String, AttributeValue>,
    );

    fn expression_parts(filter: FilterExpression) -> ExpressionParts {
        let values = filter
            .values
            .iter()
            .map(|(k, v)| (k.clone(), to_sdk(v)))
            .collect();
        (filter.expression, filter.names.into_iter().collect(), values)
    }

    fn build_error(err: aws_sdk_dynamodb::error::BuildError) -> KeyValueClientError {
        KeyValueClientError::Internal(err.to_string())
    }

    #[async_trait]
    impl KeyValueApi for DynamoDbClient {
        async fn describe_table(&self, table: &str) -> Result<bool, KeyValueClientError> {
            Ok(self.table_status(table).await?.is_some())
        }

        async fn ensure_table(&self, spec: &TableSpec) -> Result<(), KeyValueClientError> {
            if self.table_status(&spec.table).await?.is_none() {
                let created = self
                    .client
                    .create_table()
                    .table_name(&spec.table)
                    .attribute_definitions(
                        AttributeDefinition::builder()
                            .attribute_name(&spec.hash_key)
                            .attribute_type(ScalarAttributeType::S)
                            .build()
                            .map_err(build_error)?,
                    )
                    .attribute_definitions(
                        AttributeDefinition::builder()
                            .attribute_name(&spec.range_key)
                            .attribute_type(ScalarAttributeType::S)
                            .build()
                            .map_err(build_error)?,
                    )
                    .key_schema(
                        KeySchemaElement::builder()
                            .attribute_name(&spec.hash_key)
                            .key_type(KeyType::Hash)
                            .build()
                            .map_err(build_error)?,
                    )
                    .key_schema(
                        KeySchemaElement::builder()
                            .attribute_name(&spec.range_key)
                            .key_type(KeyType::Range)
                            .build()
                            .map_err(build_error)?,
                    )
                    .provisioned_throughput(
                        ProvisionedThroughput::builder()
                            .read_capacity_units(spec.read_capacity)
                            .write_capacity_units(spec.write_capacity)
                            .build()
                            .map_err(build_error)?,
                    )
                    .send()
                    .await;
                match created {
                    Ok(_) => tracing::info!(table = %spec.table, "created table"),
                    // Another process won the race.
                    Err(err)
                        if err
                            .as_service_error()
                            .is_some_and(|e| e.is_resource_in_use_exception()) => {}
                    Err(err) => return Err(map_sdk_error(err)),
                }
            }

            for _ in 0..TABLE_ACTIVE_ATTEMPTS {
                if self.table_status(&spec.table).await? == Some(TableStatus::Active) {
                    return Ok(());
                }
                tokio::time::sleep(TABLE_ACTIVE_POLL).await;
            }
            Err(KeyValueClientError::Unavailable(format!(
                "table {} did not become active",
                spec.table
            )))
        }

        async fn get_item(
            &self,
            table: &str,
            key: Item,
        ) -> Result<Option<Item>, KeyValueClientError> {
            let out = self
                .client
                .get_item()
                .table_name(table)
                .set_key(Some(to_sdk_item(&key)))
                .consistent_read(true)
                .send()
                .await
                .map_err(map_sdk_error)?;
            Ok(out.item().map(from_sdk_item))
        }

        async fn put_item(
            &self,
            table: &str,
            item: Item,
            condition: Option<FilterExpression>,
        ) -> Result<(), KeyValueClientError> {
            let mut request = self
                .client
                .put_item()
                .table_name(table)
                .set_item(Some(to_sdk_item(&item)));
            if let Some(condition) = condition {
                let (expression, names, values) = expression_parts(condition);
                request = request
                    .condition_expression(expression)
                    .set_expression_attribute_names(Some(names));
                if !values.is_empty() {
                    request = request.set_expression_attribute_values(Some(values));
                }
            }
            request.send().await.map_err(map_sdk_error)?;
            Ok(())
        }

        async fn delete_item(
            &self,
            table: &str,
            key: Item,
        ) -> Result<Option<Item>, KeyValueClientError> {
            let out = self
                .client
                .delete_item()
                .table_name(table)
                .set_key(Some(to_sdk_item(&key)))
                .return_values(ReturnValue::AllOld)
                .send()
                .await
                .map_err(map_sdk_error)?;
            Ok(out.attributes().map(from_sdk_item))
        }

        async fn scan(&self, request: ScanRequest) -> Result<ScanOutput, KeyValueClientError> {
            let mut scan = self
                .client
                .scan()
                .table_name(&request.table)
                .set_limit(request.limit)
                .set_exclusive_start_key(request.exclusive_start_key.as_ref().map(to_sdk_item));
            if request.select_count {
                scan = scan.select(Select::Count);
            }
            if let Some(filter) = request.filter {
                let (expression, names, values) = expression_parts(filter);
                scan = scan
                    .filter_expression(expression)
                    .set_expression_attribute_names(Some(names));
                if !values.is_empty() {
                    scan = scan.set_expression_attribute_values(Some(values));
                }
            }

            let out = scan.send().await.map_err(map_sdk_error)?;
            Ok(ScanOutput {
                items: out.items().iter().map(from_sdk_item).collect(),
                count: u64::try_from(out.count()).unwrap_or_default(),
                last_evaluated_key: out.last_evaluated_key().map(from_sdk_item),
            })
        }
    }

    fn map_sdk_error<E>(err: aws_sdk_dynamodb::error::SdkError<E>) -> KeyValueClientError
    where
        E: ProvideErrorMetadata + std::fmt::Debug,
    {
        let fallback = format!("{err:?}");

        match err {
            aws_sdk_dynamodb::error::SdkError::ServiceError(service_err) => {
                let code = service_err.err().code().unwrap_or("Unknown");
                let message = service_err
                    .err()
                    .message()
                    .map(str::to_string)
                    .unwrap_or_else(|| fallback.clone());
                match code {
                    "ConditionalCheckFailedException" => KeyValueClientError::ConditionFailed,
                    "ProvisionedThroughputExceededException"
                    | "ThrottlingException"
                    | "RequestLimitExceeded" => KeyValueClientError::Throttled(message),
                    "ResourceNotFoundException" => KeyValueClientError::NotFound(message),
                    _ => KeyValueClientError::Internal(format!("{code}: {message}")),
                }
            }
            aws_sdk_dynamodb::error::SdkError::TimeoutError(_) => {
                KeyValueClientError::Unavailable(fallback)
            }
            aws_sdk_dynamodb::error::SdkError::DispatchFailure(_) => {
                KeyValueClientError::Unavailable(fallback)
            }
            _ => KeyValueClientError::Internal(fallback),
        }
    }
}
