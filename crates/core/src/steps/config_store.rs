//! Per-step user configuration.
//!
//! Values are validated when written, never when read. Policy:
//! - Integer values outside the option's bounds are clamped to the nearest
//!   bound.
//! - Unknown options and values of the wrong type reject the whole update;
//!   nothing from a rejected update is stored.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::catalog::StepCatalog;
use super::types::{OptionKind, StepDescriptor};

/// Validated option values for one step.
pub type StepConfig = Map<String, Value>;

/// Errors produced by the validating setter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StepConfigError {
    #[error("unknown step: {0}")]
    UnknownStep(String),

    #[error("step {step_id} has no option '{option}'")]
    UnknownOption { step_id: String, option: String },

    #[error("option '{option}' of step {step_id} expects {expected}, got {actual}")]
    InvalidType {
        step_id: String,
        option: String,
        expected: String,
        actual: String,
    },
}

/// Holds the current configuration record of every catalog step.
pub struct StepConfigStore {
    catalog: Arc<StepCatalog>,
    values: RwLock<HashMap<String, StepConfig>>,
}

impl StepConfigStore {
    /// Create a store with every step at its schema defaults.
    pub fn new(catalog: Arc<StepCatalog>) -> Self {
        let values = catalog
            .list_steps()
            .iter()
            .map(|step| (step.id.clone(), defaults_for(step)))
            .collect();

        Self {
            catalog,
            values: RwLock::new(values),
        }
    }

    /// Current configuration of a step.
    pub async fn get_config(&self, step_id: &str) -> Result<StepConfig, StepConfigError> {
        self.values
            .read()
            .await
            .get(step_id)
            .cloned()
            .ok_or_else(|| StepConfigError::UnknownStep(step_id.to_string()))
    }

    /// Validate `partial` against the step's schema and merge it into the
    /// stored record. Returns the merged record.
    pub async fn set_config(
        &self,
        step_id: &str,
        partial: &Map<String, Value>,
    ) -> Result<StepConfig, StepConfigError> {
        let step = self
            .catalog
            .get(step_id)
            .ok_or_else(|| StepConfigError::UnknownStep(step_id.to_string()))?;

        let mut validated = Map::new();
        for (name, value) in partial {
            validated.insert(name.clone(), validate_value(step, name, value)?);
        }

        let mut values = self.values.write().await;
        let record = values
            .entry(step_id.to_string())
            .or_insert_with(|| defaults_for(step));
        for (name, value) in validated {
            record.insert(name, value);
        }
        debug!("Updated config for step {}: {:?}", step_id, record);
        Ok(record.clone())
    }
}

fn defaults_for(step: &StepDescriptor) -> StepConfig {
    step.config_schema
        .iter()
        .map(|option| (option.name.clone(), option.kind.default_value()))
        .collect()
}

fn validate_value(
    step: &StepDescriptor,
    name: &str,
    value: &Value,
) -> Result<Value, StepConfigError> {
    let option = step
        .option(name)
        .ok_or_else(|| StepConfigError::UnknownOption {
            step_id: step.id.clone(),
            option: name.to_string(),
        })?;

    let invalid = || StepConfigError::InvalidType {
        step_id: step.id.clone(),
        option: name.to_string(),
        expected: option.kind.type_name().to_string(),
        actual: json_type_name(value).to_string(),
    };

    match &option.kind {
        OptionKind::Integer { min, max, .. } => {
            // Integers beyond i64 can only be above the upper bound.
            let raw = match (value.as_i64(), value.as_u64()) {
                (Some(raw), _) => raw,
                (None, Some(_)) => i64::MAX,
                (None, None) => return Err(invalid()),
            };
            let clamped = raw.clamp(*min, *max);
            if clamped != raw {
                warn!(
                    "Clamped option '{}' of step {} from {} to {}",
                    name, step.id, raw, clamped
                );
            }
            Ok(Value::from(clamped))
        }
        OptionKind::Boolean { .. } => value.as_bool().map(Value::Bool).ok_or_else(invalid),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> StepConfigStore {
        StepConfigStore::new(Arc::new(StepCatalog::default_workflow()))
    }

    fn partial(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_defaults_at_startup() {
        let store = store();
        let config = store.get_config("extract").await.unwrap();
        assert_eq!(config["days"], 365);

        let augment = store.get_config("augment").await.unwrap();
        assert_eq!(augment["batch_size"], 50);
        assert_eq!(augment["refresh"], false);
    }

    #[tokio::test]
    async fn test_in_bounds_value_round_trips() {
        let store = store();
        let merged = store
            .set_config("extract", &partial(json!({ "days": 30 })))
            .await
            .unwrap();
        assert_eq!(merged["days"], 30);
        assert_eq!(store.get_config("extract").await.unwrap()["days"], 30);
    }

    #[tokio::test]
    async fn test_out_of_bounds_value_is_clamped() {
        let store = store();
        let merged = store
            .set_config("extract", &partial(json!({ "days": 99999 })))
            .await
            .unwrap();
        assert_eq!(merged["days"], 3650);

        let merged = store
            .set_config("extract", &partial(json!({ "days": -5 })))
            .await
            .unwrap();
        assert_eq!(merged["days"], 1);
    }

    #[tokio::test]
    async fn test_integer_beyond_i64_is_clamped_to_max() {
        let store = store();
        let merged = store
            .set_config("extract", &partial(json!({ "days": u64::MAX })))
            .await
            .unwrap();
        assert_eq!(merged["days"], 3650);
    }

    #[tokio::test]
    async fn test_unknown_option_rejects_whole_update() {
        let store = store();
        let err = store
            .set_config("augment", &partial(json!({ "batch_size": 10, "bogus": 1 })))
            .await
            .unwrap_err();
        assert!(matches!(err, StepConfigError::UnknownOption { .. }));

        // batch_size from the rejected update was not stored
        assert_eq!(store.get_config("augment").await.unwrap()["batch_size"], 50);
    }

    #[tokio::test]
    async fn test_wrong_type_is_rejected() {
        let store = store();
        let err = store
            .set_config("extract", &partial(json!({ "days": "30" })))
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "option 'days' of step extract expects integer, got string"
        );

        let err = store
            .set_config("extract", &partial(json!({ "days": 2.5 })))
            .await
            .unwrap_err();
        assert!(matches!(err, StepConfigError::InvalidType { .. }));
    }

    #[tokio::test]
    async fn test_partial_update_keeps_other_fields() {
        let store = store();
        store
            .set_config("augment", &partial(json!({ "refresh": true })))
            .await
            .unwrap();
        let config = store.get_config("augment").await.unwrap();
        assert_eq!(config["refresh"], true);
        assert_eq!(config["batch_size"], 50);
    }

    #[test]
    fn test_each_store_starts_from_defaults() {
        let first = store();
        tokio_test::block_on(first.set_config("insights", &partial(json!({ "max_insights": 3 }))))
            .unwrap();

        let second = store();
        let config = tokio_test::block_on(second.get_config("insights")).unwrap();
        assert_eq!(config["max_insights"], 10);
    }

    #[tokio::test]
    async fn test_unknown_step() {
        let store = store();
        assert_eq!(
            store.get_config("nope").await.unwrap_err(),
            StepConfigError::UnknownStep("nope".to_string())
        );
        assert!(store
            .set_config("nope", &Map::new())
            .await
            .is_err());
    }
}
