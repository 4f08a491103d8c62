//! In-memory model of PlanDefinition templates and the request trees built from them.
//!
//! Plans are parsed from FHIR JSON with serde and never mutated by the engine.
//! Resources the engine does not interpret (activity templates, questionnaires,
//! tasks, ...) stay as `serde_json::Value`.

pub mod datatypes;
pub mod plan;
pub mod request;

pub use datatypes::{DataRequirement, Duration, Expression, Extension, Reference, find_extension};
pub use plan::{
    ActionCondition, ActionRelationship, ActionTiming, DynamicValue, GoalTarget, PlanAction,
    PlanDefinition, PlanGoal, RelatedAction, RelatedArtifact, SelectionBehavior,
};
pub use request::{RequestAction, RequestGroup};

use serde_json::Value;

pub fn resource_type(resource: &Value) -> Option<&str> {
    resource.get("resourceType").and_then(|t| t.as_str())
}

pub fn resource_id(resource: &Value) -> Option<&str> {
    resource.get("id").and_then(|i| i.as_str())
}
