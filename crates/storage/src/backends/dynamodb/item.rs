//! Item layout: the encoded object's top-level fields as attributes, plus
//! the two key attributes. Objects with a top-level `key` or `sortKey`
//! field cannot be stored.

use std::collections::BTreeMap;

use serde_json::{Map, Number, Value};

/// Partition key attribute.
pub const KEY_ATTR: &str = "key";

/// Sort key attribute; always equal to the partition key.
pub const SORT_KEY_ATTR: &str = "sortKey";

/// A DynamoDB attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    /// String.
    S(String),
    /// Numbers travel as strings, as on the wire.
    N(String),
    /// Boolean.
    Bool(bool),
    /// Null.
    Null,
    /// Nested map.
    M(BTreeMap<String, AttrValue>),
    /// List.
    L(Vec<AttrValue>),
}

/// A stored item.
pub type Item = BTreeMap<String, AttrValue>;

impl AttrValue {
    /// Converts a JSON value into its attribute form.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => AttrValue::Null,
            Value::Bool(b) => AttrValue::Bool(*b),
            Value::Number(n) => AttrValue::N(n.to_string()),
            Value::String(s) => AttrValue::S(s.clone()),
            Value::Array(items) => AttrValue::L(items.iter().map(AttrValue::from_json).collect()),
            Value::Object(map) => AttrValue::M(
                map.iter()
                    .map(|(k, v)| (k.clone(), AttrValue::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Converts back to JSON, failing on unparseable numbers.
    pub fn to_json(&self) -> Result<Value, String> {
        Ok(match self {
            AttrValue::S(s) => Value::String(s.clone()),
            AttrValue::N(n) => Value::Number(parse_number(n)?),
            AttrValue::Bool(b) => Value::Bool(*b),
            AttrValue::Null => Value::Null,
            AttrValue::L(items) => Value::Array(
                items
                    .iter()
                    .map(AttrValue::to_json)
                    .collect::<Result<_, _>>()?,
            ),
            AttrValue::M(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| -> Result<(String, Value), String> {
                        Ok((k.clone(), v.to_json()?))
                    })
                    .collect::<Result<Map<_, _>, _>>()?,
            ),
        })
    }

    /// Follows a path of map keys.
    pub fn lookup<'a>(item: &'a Item, path: &[String]) -> Option<&'a AttrValue> {
        let (first, rest) = path.split_first()?;
        rest.iter().try_fold(item.get(first)?, |current, segment| match current {
            AttrValue::M(map) => map.get(segment),
            _ => None,
        })
    }
}

fn parse_number(n: &str) -> Result<Number, String> {
    if let Ok(i) = n.parse::<i64>() {
        return Ok(Number::from(i));
    }
    if let Ok(u) = n.parse::<u64>() {
        return Ok(Number::from(u));
    }
    n.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .ok_or_else(|| format!("invalid number attribute {n:?}"))
}

/// The primary key of the item stored under `key`.
pub fn item_key(key: &str) -> Item {
    Item::from([
        (KEY_ATTR.to_string(), AttrValue::S(key.to_string())),
        (SORT_KEY_ATTR.to_string(), AttrValue::S(key.to_string())),
    ])
}

/// Builds the item for an encoded object.
pub fn to_item(key: &str, payload: &[u8]) -> Result<Item, String> {
    let value: Value = serde_json::from_slice(payload).map_err(|e| e.to_string())?;
    let Value::Object(fields) = value else {
        return Err("encoded object is not a JSON object".to_string());
    };
    if let Some(reserved) = [KEY_ATTR, SORT_KEY_ATTR]
        .into_iter()
        .find(|attr| fields.contains_key(*attr))
    {
        return Err(format!(
            "top-level field {reserved:?} collides with a key attribute"
        ));
    }
    let mut item: Item = fields
        .iter()
        .map(|(k, v)| (k.clone(), AttrValue::from_json(v)))
        .collect();
    item.extend(item_key(key));
    Ok(item)
}

/// Rebuilds the encoded object from an item, returning it with its key.
pub fn from_item(mut item: Item) -> Result<(String, Vec<u8>), String> {
    let key = match item.remove(KEY_ATTR) {
        Some(AttrValue::S(key)) => key,
        other => return Err(format!("item has no string key attribute: {other:?}")),
    };
    item.remove(SORT_KEY_ATTR);
    let object = AttrValue::M(item).to_json()?;
    let payload = serde_json::to_vec(&object).map_err(|e| e.to_string())?;
    Ok((key, payload))
}
