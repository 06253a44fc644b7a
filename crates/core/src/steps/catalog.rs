//! Ordered catalog of workflow steps.

use serde_json::json;

use super::types::{Operation, OptionSpec, StepDescriptor};

/// Static, ordered list of step descriptors.
///
/// Iteration order is the pipeline order and never changes after
/// construction.
#[derive(Debug, Clone)]
pub struct StepCatalog {
    steps: Vec<StepDescriptor>,
}

impl StepCatalog {
    /// Build a catalog from descriptors. Duplicate ids keep the first
    /// occurrence.
    pub fn new(steps: Vec<StepDescriptor>) -> Self {
        let mut unique: Vec<StepDescriptor> = Vec::with_capacity(steps.len());
        for step in steps {
            if unique.iter().any(|s| s.id == step.id) {
                tracing::warn!("Duplicate step id '{}' ignored", step.id);
                continue;
            }
            unique.push(step);
        }
        Self { steps: unique }
    }

    /// The five-stage enrichment workflow.
    pub fn default_workflow() -> Self {
        Self::new(vec![
            StepDescriptor {
                id: "extract".to_string(),
                name: "Extract Contacts".to_string(),
                description: "Extract contacts from the connected mailbox".to_string(),
                operation: Operation::post("/api/steps/extract"),
                default_payload: json!({ "source": "mailbox" }),
                config_schema: vec![OptionSpec::integer(
                    "days",
                    "Lookback window in days",
                    1,
                    3650,
                    365,
                )],
            },
            StepDescriptor {
                id: "sync".to_string(),
                name: "Sync Emails".to_string(),
                description: "Synchronise email threads for extracted contacts".to_string(),
                operation: Operation::post("/api/steps/sync"),
                default_payload: json!({}),
                config_schema: vec![OptionSpec::integer(
                    "days",
                    "Lookback window in days",
                    1,
                    3650,
                    365,
                )],
            },
            StepDescriptor {
                id: "augment".to_string(),
                name: "Augment Contacts".to_string(),
                description: "Enrich contacts with public profile data".to_string(),
                operation: Operation::post("/api/steps/augment"),
                default_payload: json!({}),
                config_schema: vec![
                    OptionSpec::integer("batch_size", "Contacts per batch", 1, 500, 50),
                    OptionSpec::boolean("refresh", "Re-augment already enriched contacts", false),
                ],
            },
            StepDescriptor {
                id: "knowledge_tree".to_string(),
                name: "Build Knowledge Tree".to_string(),
                description: "Organise contacts and threads into a knowledge tree".to_string(),
                operation: Operation::post("/api/steps/knowledge_tree"),
                default_payload: json!({}),
                config_schema: vec![OptionSpec::integer(
                    "max_depth",
                    "Maximum tree depth",
                    1,
                    10,
                    4,
                )],
            },
            StepDescriptor {
                id: "insights".to_string(),
                name: "Generate Insights".to_string(),
                description: "Generate insights from the knowledge tree".to_string(),
                operation: Operation::post("/api/steps/insights"),
                default_payload: json!({}),
                config_schema: vec![OptionSpec::integer(
                    "max_insights",
                    "Maximum number of insights",
                    1,
                    100,
                    10,
                )],
            },
        ])
    }

    /// All steps, in pipeline order.
    pub fn list_steps(&self) -> &[StepDescriptor] {
        &self.steps
    }

    pub fn get(&self, id: &str) -> Option<&StepDescriptor> {
        self.steps.iter().find(|s| s.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().map(|s| s.id.as_str())
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
