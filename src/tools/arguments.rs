//! Typed access to tool call arguments.

use serde_json::{Map, Value};

use crate::error::{BridgeError, Result};

/// Wrapper around a call's argument mapping providing typed extraction.
#[derive(Debug, Clone, Default)]
pub struct ToolArguments {
    values: Map<String, Value>,
}

impl ToolArguments {
    pub fn new(values: Map<String, Value>) -> Self {
        Self { values }
    }

    /// Get the raw mapping.
    pub fn raw(&self) -> &Map<String, Value> {
        &self.values
    }

    /// Get a string argument by key.
    pub fn get_str(&self, key: &str) -> Result<&str> {
        self.values
            .get(key)
            .and_then(Value::as_str)
            .ok_or_else(|| BridgeError::InvalidArgument(format!("Missing string argument: {key}")))
    }

    /// Get an optional string argument.
    pub fn get_str_opt(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    /// Get an integer argument.
    pub fn get_i64(&self, key: &str) -> Result<i64> {
        self.values
            .get(key)
            .and_then(Value::as_i64)
            .ok_or_else(|| BridgeError::InvalidArgument(format!("Missing integer argument: {key}")))
    }

    /// Get a float argument.
    pub fn get_f64(&self, key: &str) -> Result<f64> {
        self.values
            .get(key)
            .and_then(Value::as_f64)
            .ok_or_else(|| BridgeError::InvalidArgument(format!("Missing float argument: {key}")))
    }

    /// Get a boolean argument.
    pub fn get_bool(&self, key: &str) -> Result<bool> {
        self.values
            .get(key)
            .and_then(Value::as_bool)
            .ok_or_else(|| BridgeError::InvalidArgument(format!("Missing boolean argument: {key}")))
    }

    /// Deserialize the entire mapping into a typed struct.
    pub fn deserialize<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(Value::Object(self.values.clone()))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(value: Value) -> ToolArguments {
        match value {
            Value::Object(map) => ToolArguments::new(map),
            _ => unreachable!("test helper expects an object"),
        }
    }

    #[test]
    fn typed_getters_report_missing_keys() {
        let arguments = args(json!({"city": "Oslo", "days": 3}));
        assert_eq!(arguments.get_str("city").unwrap(), "Oslo");
        assert_eq!(arguments.get_i64("days").unwrap(), 3);
        assert!(matches!(
            arguments.get_bool("metric"),
            Err(BridgeError::InvalidArgument(_))
        ));
    }

    #[test]
    fn deserializes_into_struct() {
        #[derive(serde::Deserialize)]
        struct Query {
            city: String,
        }
        let query: Query = args(json!({"city": "Lima"})).deserialize().unwrap();
        assert_eq!(query.city, "Lima");
    }
}
