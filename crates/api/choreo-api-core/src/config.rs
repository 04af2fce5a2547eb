//! Per-session configuration surface.
//!
//! A session receives one nested JSON object. Every module reads only its own
//! declared option sub-key; presence of a truthy value under that key is the
//! default activation signal.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value as JsonValue};

/// Immutable configuration snapshot for one orchestration session.
#[derive(Clone, Debug, Default)]
pub struct OrchestrationConfig {
    root: Map<String, JsonValue>,
}

impl OrchestrationConfig {
    /// Wrap a JSON value. Non-object values collapse to the empty config.
    pub fn new(value: JsonValue) -> Self {
        match value {
            JsonValue::Object(map) => Self { root: map },
            _ => Self::default(),
        }
    }

    /// Raw access to one option sub-key.
    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.root.get(key)
    }

    /// Truthiness of an option sub-key, the default module activation signal:
    /// absent, `null`, `false`, `0` and `""` are disabled; everything else
    /// (including empty objects and arrays) is enabled.
    pub fn is_enabled(&self, key: &str) -> bool {
        match self.root.get(key) {
            None | Some(JsonValue::Null) => false,
            Some(JsonValue::Bool(b)) => *b,
            Some(JsonValue::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
            Some(JsonValue::String(s)) => !s.is_empty(),
            Some(JsonValue::Array(_)) | Some(JsonValue::Object(_)) => true,
        }
    }

    /// Clone of one option sub-key, `Null` when absent.
    pub fn module_options(&self, key: &str) -> JsonValue {
        self.root.get(key).cloned().unwrap_or(JsonValue::Null)
    }

    /// Deserialize a module's option section. A bare activation flag (absent,
    /// `null` or boolean) yields `T::default()`; anything else must
    /// deserialize into `T`.
    pub fn section<T>(&self, key: &str) -> Result<T, serde_json::Error>
    where
        T: DeserializeOwned + Default,
    {
        match self.root.get(key) {
            None | Some(JsonValue::Null) | Some(JsonValue::Bool(_)) => Ok(T::default()),
            Some(v) => serde_json::from_value(v.clone()),
        }
    }
}

impl From<JsonValue> for OrchestrationConfig {
    fn from(value: JsonValue) -> Self {
        Self::new(value)
    }
}
