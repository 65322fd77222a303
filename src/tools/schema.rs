//! Tool input schemas
//!
//! A `ToolInputSchema` describes how a tool is called. It is advertised to the
//! model and used by tools to validate their own input.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Declarative call shape of a tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInputSchema {
    /// Tool name (e.g., "bash", "str_replace_editor")
    pub name: String,
    /// Human-readable description for the model
    pub description: String,
    /// Provider-defined tool type (e.g., "bash_20250124"); None for custom tools
    #[serde(default)]
    pub api_type: Option<String>,
    /// JSON schema for input parameters
    pub input_schema: Value,
    /// Extra advertisement fields (e.g., display size for the computer tool)
    #[serde(default)]
    pub options: Map<String, Value>,
}

impl ToolInputSchema {
    /// Create a schema with an empty parameter object
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            api_type: None,
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {},
                "required": []
            }),
            options: Map::new(),
        }
    }

    /// Set input schema
    pub fn with_schema(mut self, schema: Value) -> Self {
        self.input_schema = schema;
        self
    }

    /// Mark as a provider-defined tool of the given type
    pub fn with_api_type(mut self, api_type: impl Into<String>) -> Self {
        self.api_type = Some(api_type.into());
        self
    }

    /// Add an advertisement option
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Names of required parameters
    pub fn required_params(&self) -> Vec<&str> {
        self.input_schema["required"]
            .as_array()
            .map(|r| r.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    /// Render the params the provider expects for this tool
    pub fn to_api_params(&self) -> Value {
        match &self.api_type {
            Some(api_type) => {
                let mut params = Map::new();
                params.insert("name".to_string(), Value::String(self.name.clone()));
                params.insert("type".to_string(), Value::String(api_type.clone()));
                for (key, value) in &self.options {
                    params.insert(key.clone(), value.clone());
                }
                Value::Object(params)
            }
            None => serde_json::json!({
                "name": self.name,
                "description": self.description,
                "input_schema": self.input_schema,
            }),
        }
    }

    /// Check an input record against this schema
    ///
    /// Checks object shape, required parameters, primitive types and enums.
    /// Unknown parameters are allowed.
    pub fn validate(&self, input: &Value) -> Result<(), String> {
        let Some(fields) = input.as_object() else {
            return Err(format!("Input for {} must be a JSON object", self.name));
        };

        for required in self.required_params() {
            if fields.get(required).is_none_or(Value::is_null) {
                return Err(format!("Missing required parameter '{}'", required));
            }
        }

        let Some(properties) = self.input_schema["properties"].as_object() else {
            return Ok(());
        };

        for (key, value) in fields {
            if value.is_null() {
                continue;
            }
            let Some(property) = properties.get(key) else {
                continue;
            };
            if let Some(expected) = property["type"].as_str()
                && !type_matches(expected, value)
            {
                return Err(format!("Parameter '{}' must be of type {}", key, expected));
            }
            if let Some(allowed) = property["enum"].as_array()
                && !allowed.contains(value)
            {
                let names: Vec<String> = allowed.iter().map(|v| v.to_string()).collect();
                return Err(format!(
                    "Parameter '{}' has invalid value {}; expected one of: {}",
                    key,
                    value,
                    names.join(", ")
                ));
            }
        }

        Ok(())
    }
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        _ => true,
    }
}
