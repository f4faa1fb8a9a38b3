// ── Schema normalization boundary ──
//
// Flattens a raw API response into id-keyed records per model plus the
// ordered list of root ids. The orchestrator only depends on the
// `Normalizer` trait; `FlatNormalizer` covers plain REST payloads.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::event::ListPayload;
use crate::model::RecordId;

/// Shape descriptor handed to the normalizer with every response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    pub model: String,
    #[serde(default = "default_id_attribute")]
    pub id_attribute: String,
}

fn default_id_attribute() -> String {
    "id".to_owned()
}

impl Schema {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            id_attribute: default_id_attribute(),
        }
    }

    #[must_use]
    pub fn with_id_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.id_attribute = attribute.into();
        self
    }
}

/// Output of a [`Normalizer`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Normalized {
    /// model -> id -> record, in first-seen order.
    pub entities: BTreeMap<String, IndexMap<RecordId, Value>>,
    /// Root ids in response order.
    pub result: Vec<RecordId>,
    /// Sibling fields of a `data` envelope.
    pub envelope: Map<String, Value>,
}

impl Normalized {
    pub fn records_of(&self, model: &str) -> Option<&IndexMap<RecordId, Value>> {
        self.entities.get(model)
    }

    /// Root records of `model` as a list-fetch payload.
    pub fn into_list(mut self, model: &str) -> ListPayload {
        let records = self.entities.remove(model).unwrap_or_default();
        let records = self
            .result
            .iter()
            .filter_map(|id| records.get(id).map(|r| (id.clone(), r.clone())))
            .collect();
        ListPayload {
            records,
            other_info: self.envelope,
        }
    }

    /// The first root record of `model`, for single-record responses.
    pub fn into_single(mut self, model: &str) -> Option<(RecordId, Value)> {
        let mut records = self.entities.remove(model)?;
        let id = self.result.first()?;
        records.shift_remove(id).map(|record| (id.clone(), record))
    }

    /// `{ byId, ids, otherInfo }` view of `model`, as carried by
    /// generic-call result events.
    pub fn to_value(&self, model: &str) -> Value {
        let by_id: Map<String, Value> = self
            .records_of(model)
            .into_iter()
            .flatten()
            .map(|(id, record)| (id.to_string(), record.clone()))
            .collect();
        let ids: Vec<Value> = self.result.iter().cloned().map(Value::from).collect();
        serde_json::json!({
            "byId": by_id,
            "ids": ids,
            "otherInfo": self.envelope,
        })
    }
}

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("record at index {index} has no usable `{id_attribute}`")]
    MissingId { index: usize, id_attribute: String },

    #[error("envelope `data` must be a list or an object, got {found}")]
    UnexpectedData { found: &'static str },

    #[error("expected a list or an object, got {found}")]
    UnexpectedShape { found: &'static str },
}

/// Flattens raw responses for one schema.
pub trait Normalizer: Send + Sync {
    fn normalize(&self, raw: &Value, schema: &Schema) -> Result<Normalized, NormalizeError>;
}

/// Normalizer for flat REST payloads.
///
/// Accepts a bare list, a single object, `null`, or a `{ "data": ... }`
/// envelope whose `data` is a list or an object. Nested records are left
/// in place.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlatNormalizer;

impl Normalizer for FlatNormalizer {
    fn normalize(&self, raw: &Value, schema: &Schema) -> Result<Normalized, NormalizeError> {
        let mut envelope = Map::new();
        let items: Vec<&Value> = match raw {
            Value::Null => Vec::new(),
            Value::Array(items) => items.iter().collect(),
            Value::Object(map) => match map.get("data") {
                Some(Value::Array(items)) => {
                    envelope = without_data(map);
                    items.iter().collect()
                }
                Some(item @ Value::Object(_)) => {
                    envelope = without_data(map);
                    vec![item]
                }
                Some(other) => {
                    return Err(NormalizeError::UnexpectedData {
                        found: json_kind(other),
                    });
                }
                None => vec![raw],
            },
            other => {
                return Err(NormalizeError::UnexpectedShape {
                    found: json_kind(other),
                });
            }
        };

        let mut records = IndexMap::with_capacity(items.len());
        let mut result = Vec::with_capacity(items.len());
        for (index, item) in items.into_iter().enumerate() {
            let id = RecordId::of_record(item, &schema.id_attribute).ok_or_else(|| {
                NormalizeError::MissingId {
                    index,
                    id_attribute: schema.id_attribute.clone(),
                }
            })?;
            records.insert(id.clone(), item.clone());
            result.push(id);
        }

        let mut entities = BTreeMap::new();
        entities.insert(schema.model.clone(), records);
        Ok(Normalized {
            entities,
            result,
            envelope,
        })
    }
}

fn without_data(map: &Map<String, Value>) -> Map<String, Value> {
    map.iter()
        .filter(|(key, _)| key.as_str() != "data")
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}
