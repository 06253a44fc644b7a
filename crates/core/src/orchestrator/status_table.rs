//! Authoritative step-id → runtime state map.
//!
//! Every component reads and writes step state through this table. Writes
//! are published to subscribers in the order they are applied.

use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::{broadcast, RwLock};

use crate::steps::StepCatalog;

use super::types::{OrchestratorError, StepPhase, StepRuntimeState};

/// Capacity of the change feed. Slow subscribers skip ahead.
const UPDATE_CHANNEL_CAPACITY: usize = 256;

pub struct StepStatusTable {
    /// Catalog order, used for snapshots.
    order: Vec<String>,
    states: RwLock<HashMap<String, StepRuntimeState>>,
    updates: broadcast::Sender<StepRuntimeState>,
}

impl StepStatusTable {
    /// One `ready` slot per catalog step; `disabled` ids start as disabled.
    pub fn new(catalog: &StepCatalog, disabled: &[String]) -> Self {
        let order: Vec<String> = catalog.ids().map(str::to_string).collect();
        let states = order
            .iter()
            .map(|id| {
                let phase = if disabled.iter().any(|d| d == id) {
                    StepPhase::Disabled
                } else {
                    StepPhase::Ready
                };
                (id.clone(), StepRuntimeState::new(id.clone(), phase))
            })
            .collect();
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);

        Self {
            order,
            states: RwLock::new(states),
            updates,
        }
    }

    pub async fn get(&self, step_id: &str) -> Option<StepRuntimeState> {
        self.states.read().await.get(step_id).cloned()
    }

    /// All step states in catalog order.
    pub async fn snapshot(&self) -> Vec<StepRuntimeState> {
        let states = self.states.read().await;
        self.order
            .iter()
            .filter_map(|id| states.get(id).cloned())
            .collect()
    }

    /// Replace a step's state wholesale.
    pub async fn set(&self, state: StepRuntimeState) -> Result<(), OrchestratorError> {
        let step_id = state.step_id.clone();
        self.modify(&step_id, move |current| {
            *current = state;
            Ok(true)
        })
        .await
        .map(|_| ())
    }

    /// Atomically read-modify-write one step.
    ///
    /// The closure works on a copy. Returning `Ok(true)` commits and
    /// publishes it, `Ok(false)` discards it, and an error discards it and
    /// is passed through. Returns the state held after the call.
    pub async fn modify<F>(
        &self,
        step_id: &str,
        f: F,
    ) -> Result<StepRuntimeState, OrchestratorError>
    where
        F: FnOnce(&mut StepRuntimeState) -> Result<bool, OrchestratorError>,
    {
        let mut states = self.states.write().await;
        let current = states
            .get_mut(step_id)
            .ok_or_else(|| OrchestratorError::UnknownStep(step_id.to_string()))?;

        let mut next = current.clone();
        if !f(&mut next)? {
            return Ok(current.clone());
        }

        next.step_id = step_id.to_string();
        next.normalize();
        next.updated_at = Utc::now();
        *current = next.clone();

        // No subscribers is fine.
        let _ = self.updates.send(next.clone());
        Ok(next)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StepRuntimeState> {
        self.updates.subscribe()
    }
}
