//! Step descriptor types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// HTTP verb used to start a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
        }
    }
}

/// Remote operation that starts a step: address plus verb.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub method: HttpMethod,
    /// Path relative to the backend base URL (e.g. "/api/steps/extract").
    pub path: String,
}

impl Operation {
    pub fn post(path: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Post,
            path: path.into(),
        }
    }
}

/// Kind and bounds of a single configurable option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OptionKind {
    /// Integer option, clamped into `[min, max]` on write.
    Integer { min: i64, max: i64, default: i64 },
    /// Boolean flag.
    Boolean { default: bool },
}

impl OptionKind {
    pub fn default_value(&self) -> Value {
        match self {
            OptionKind::Integer { default, .. } => Value::from(*default),
            OptionKind::Boolean { default } => Value::Bool(*default),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            OptionKind::Integer { .. } => "integer",
            OptionKind::Boolean { .. } => "boolean",
        }
    }
}

/// A named option in a step's configuration schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionSpec {
    pub name: String,
    pub description: String,
    #[serde(flatten)]
    pub kind: OptionKind,
}

impl OptionSpec {
    pub fn integer(name: &str, description: &str, min: i64, max: i64, default: i64) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            kind: OptionKind::Integer { min, max, default },
        }
    }

    pub fn boolean(name: &str, description: &str, default: bool) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            kind: OptionKind::Boolean { default },
        }
    }
}

/// Immutable description of one workflow step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDescriptor {
    /// Stable unique key.
    pub id: String,
    /// Display name.
    pub name: String,
    pub description: String,
    /// Call that starts the step.
    pub operation: Operation,
    /// Request body shape; configured option values are merged into it.
    pub default_payload: Value,
    /// Options a caller may set for this step.
    pub config_schema: Vec<OptionSpec>,
}

impl StepDescriptor {
    pub fn option(&self, name: &str) -> Option<&OptionSpec> {
        self.config_schema.iter().find(|o| o.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_option_spec_serialization_is_flat() {
        let spec = OptionSpec::integer("days", "Lookback window", 1, 3650, 365);
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["name"], "days");
        assert_eq!(json["type"], "integer");
        assert_eq!(json["min"], 1);
        assert_eq!(json["max"], 3650);
        assert_eq!(json["default"], 365);
    }

    #[test]
    fn test_http_method_serialization() {
        let op = Operation::post("/api/steps/extract");
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["method"], "POST");
        assert_eq!(op.method.as_str(), "POST");
    }

    #[test]
    fn test_default_values() {
        assert_eq!(
            OptionKind::Integer { min: 1, max: 10, default: 4 }.default_value(),
            Value::from(4)
        );
        assert_eq!(
            OptionKind::Boolean { default: true }.default_value(),
            Value::Bool(true)
        );
    }
}
