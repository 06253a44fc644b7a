//! Step catalog and per-step configuration.
//!
//! The catalog is pure data: an ordered list of step descriptors. The
//! config store holds the user-editable options of each step and is the
//! only place those options are validated.

mod catalog;
mod config_store;
mod types;

pub use catalog::StepCatalog;
pub use config_store::{StepConfig, StepConfigError, StepConfigStore};
pub use types::*;
