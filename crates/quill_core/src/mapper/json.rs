//! JSON payload mapper.
//!
//! A change becomes one compact JSON object:
//!
//! ```text
//! {"mode":"ACCEPTING","version":3,"node":{"port":9410},"pending":null}
//! ```
//!
//! Strings, integers and nested objects map to the matching document values,
//! `null` removes a key. Nested values that are none of those (booleans,
//! arrays, floats) can only come from external values and are kept as
//! [`Value::External`].

use super::Mapper;
use crate::change::{Change, ChangeVisitor};
use crate::document::{Document, Value};
use crate::error::{CoreError, CoreResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value as Json};

/// Format version written by [`JsonMapper`].
pub const CURRENT_FORMAT_VERSION: &str = "2";

/// Versions [`JsonMapper`] can read. `""` is the legacy unversioned format.
const SUPPORTED_VERSIONS: &[&str] = &["", "1", CURRENT_FORMAT_VERSION];

/// The default [`Mapper`], encoding payloads as JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonMapper;

impl JsonMapper {
    /// Creates a mapper.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

fn check_version(version: &str) -> CoreResult<()> {
    if SUPPORTED_VERSIONS.contains(&version) {
        Ok(())
    } else {
        Err(CoreError::invalid_payload(format!(
            "unsupported format version: {version:?}"
        )))
    }
}

/// Collects a change into one JSON object; later writes to a key win.
struct PayloadWriter(Map<String, Json>);

impl ChangeVisitor for PayloadWriter {
    fn visit_string(&mut self, key: &str, value: &str) {
        self.0.insert(key.to_string(), Json::String(value.to_string()));
    }

    fn visit_long(&mut self, key: &str, value: i64) {
        self.0.insert(key.to_string(), Json::from(value));
    }

    fn visit_object(&mut self, key: &str, value: &Document) {
        self.0
            .insert(key.to_string(), Json::Object(document_to_json(value)));
    }

    fn visit_unset(&mut self, key: &str) {
        self.0.insert(key.to_string(), Json::Null);
    }
}

/// Converts a document into a JSON object, keeping key order.
#[must_use]
pub fn document_to_json(document: &Document) -> Map<String, Json> {
    let mut object = Map::new();
    document.accept(&mut |key: &str, value: &Value| {
        object.insert(key.to_string(), value_to_json(value));
    });
    object
}

fn value_to_json(value: &Value) -> Json {
    match value {
        Value::String(s) => Json::String(s.clone()),
        Value::Long(n) => Json::from(*n),
        Value::Object(doc) => Json::Object(document_to_json(doc)),
        Value::External(json) => json.clone(),
    }
}

fn json_to_value(json: Json) -> Value {
    match json {
        Json::String(s) => Value::String(s),
        Json::Number(n) => match n.as_i64() {
            Some(n) => Value::Long(n),
            None => Value::External(Json::Number(n)),
        },
        Json::Object(object) => Value::Object(json_to_document(object)),
        other => Value::External(other),
    }
}

fn json_to_document(object: Map<String, Json>) -> Document {
    let mut document = Document::new();
    for (key, value) in object {
        document.set(key, json_to_value(value));
    }
    document
}

impl Mapper for JsonMapper {
    fn current_format_version(&self) -> &str {
        CURRENT_FORMAT_VERSION
    }

    fn to_payload(&self, change: &Change) -> CoreResult<String> {
        let mut writer = PayloadWriter(Map::new());
        change.accept(&mut writer);
        Ok(serde_json::to_string(&Json::Object(writer.0))?)
    }

    fn apply_payload(&self, text: &str, version: &str, target: &mut Document) -> CoreResult<()> {
        check_version(version)?;

        let Json::Object(object) = serde_json::from_str::<Json>(text)? else {
            return Err(CoreError::invalid_payload("payload is not a JSON object"));
        };

        for (key, value) in object {
            match value {
                Json::Null => {
                    target.remove_key(&key);
                }
                other => target.set(key, json_to_value(other)),
            }
        }
        Ok(())
    }

    fn to_external<T>(&self, value: &T, version: Option<&str>) -> CoreResult<Json>
    where
        T: Serialize + ?Sized,
    {
        if let Some(version) = version {
            check_version(version)?;
        }
        Ok(serde_json::to_value(value)?)
    }

    fn map<T>(&self, value: &Value, version: Option<&str>) -> CoreResult<T>
    where
        T: DeserializeOwned,
    {
        if let Some(version) = version {
            check_version(version)?;
        }
        Ok(serde_json::from_value(value_to_json(value))?)
    }
}
