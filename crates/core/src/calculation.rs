//! Calculation submission input and the rules applied to it before it
//! is stored and forwarded to the compute service.
//!
//! Field names follow the wire format the compute service expects, so
//! the validated input can be forwarded as is.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::CoreError;

/// Algorithm alias accepted from older clients.
pub const LEGACY_ALGORITHM_ALIAS: &str = "golang";
/// What [`LEGACY_ALGORITHM_ALIAS`] is stored and forwarded as.
pub const LEGACY_ALGORITHM_TARGET: &str = "PYTHON_BLF";

/// Color given to item groups created implicitly for an unknown group name.
pub const DEFAULT_GROUP_COLOR: &str = "#CCCCCC";

/// Algorithms that run as asynchronous jobs unless configured otherwise.
pub const DEFAULT_ASYNC_ALGORITHMS: [&str; 2] = ["PYTHON_GA", "PYTHON_CLPTAC"];

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ContainerSpec {
    #[validate(range(exclusive_min = 0.0))]
    pub length: f64,
    #[validate(range(exclusive_min = 0.0))]
    pub width: f64,
    #[validate(range(exclusive_min = 0.0))]
    pub height: f64,
    #[serde(rename = "maxWeight", default)]
    #[validate(range(min = 0.0))]
    pub max_weight: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ItemSpec {
    /// Client-side identifier, stored as the item's external id.
    #[validate(length(min = 1))]
    pub id: String,
    #[validate(range(min = 1))]
    pub quantity: i32,
    #[validate(range(exclusive_min = 0.0))]
    pub length: f64,
    #[validate(range(exclusive_min = 0.0))]
    pub width: f64,
    #[validate(range(exclusive_min = 0.0))]
    pub height: f64,
    #[validate(range(min = 0.0))]
    pub weight: f64,
    /// Group reference: either a group's client id or its name.
    #[serde(default)]
    pub group: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct GroupSpec {
    pub id: String,
    #[validate(length(min = 1))]
    pub name: String,
    pub color: String,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ConstraintFlags {
    #[serde(rename = "enforceLoadCapacity", default)]
    pub enforce_load_capacity: bool,
    #[serde(rename = "enforceStacking", default)]
    pub enforce_stacking: bool,
    #[serde(rename = "enforcePriority", default)]
    pub enforce_priority: bool,
    #[serde(rename = "enforceLIFO", default)]
    pub enforce_lifo: bool,
}

/// Body of `POST /api/calculations`.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CalculationInput {
    #[validate(nested)]
    pub container: ContainerSpec,
    #[validate(length(min = 1), nested)]
    pub items: Vec<ItemSpec>,
    #[serde(default)]
    #[validate(nested)]
    pub groups: Vec<GroupSpec>,
    #[validate(length(min = 1))]
    pub algorithm: String,
    #[serde(default)]
    pub activity_name: Option<String>,
    #[serde(default)]
    pub constraints: ConstraintFlags,
}

impl CalculationInput {
    /// Validate and normalize the input in place.
    pub fn prepare(&mut self) -> Result<(), CoreError> {
        self.validate()?;
        self.algorithm = normalize_algorithm(&self.algorithm);
        Ok(())
    }
}

/// Map legacy algorithm aliases to their stored name.
pub fn normalize_algorithm(algorithm: &str) -> String {
    let trimmed = algorithm.trim();
    if trimmed == LEGACY_ALGORITHM_ALIAS {
        LEGACY_ALGORITHM_TARGET.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Whether `algorithm` runs as an asynchronous job.
pub fn is_async_algorithm(algorithm: &str, async_algorithms: &[String]) -> bool {
    async_algorithms.iter().any(|a| a == algorithm)
}
