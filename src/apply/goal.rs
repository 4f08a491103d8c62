use serde_json::{Map, Value, json};

use crate::constants::PERTAINS_TO_GOAL;
use crate::context::EvaluationContext;
use crate::error::Result;
use crate::model::{Extension, PlanGoal, Reference};

use super::{PlanDefinitionProcessor, PlanFrame};

/// Converts a plan goal into a proposed Goal for `subject`.
pub fn convert_goal(goal: &PlanGoal, id: &str, subject: &str) -> Value {
    let mut resource = Map::new();
    resource.insert("resourceType".to_string(), json!("Goal"));
    resource.insert("id".to_string(), json!(id));
    resource.insert("lifecycleStatus".to_string(), json!("proposed"));
    if let Some(category) = &goal.category {
        resource.insert("category".to_string(), json!([category]));
    }
    if let Some(description) = &goal.description {
        resource.insert("description".to_string(), description.clone());
    }
    if let Some(priority) = &goal.priority {
        resource.insert("priority".to_string(), priority.clone());
    }
    if let Some(start) = &goal.start {
        resource.insert("startCodeableConcept".to_string(), start.clone());
    }
    resource.insert("subject".to_string(), json!({ "reference": subject }));

    let targets: Vec<Value> = goal
        .target
        .iter()
        .map(|target| {
            let mut converted = Map::new();
            if let Some(measure) = &target.measure {
                converted.insert("measure".to_string(), measure.clone());
            }
            for (key, value) in &target.other {
                // PlanDefinition targets carry a plain `due` Duration
                let key = if key == "due" { "dueDuration" } else { key.as_str() };
                converted.insert(key.to_string(), value.clone());
            }
            Value::Object(converted)
        })
        .collect();
    if !targets.is_empty() {
        resource.insert("target".to_string(), Value::Array(targets));
    }

    Value::Object(resource)
}

impl PlanDefinitionProcessor {
    /// Creates one Goal per plan goal and links each from the request group.
    pub(crate) fn resolve_goals(&self, frame: &mut PlanFrame<'_>, ctx: &mut EvaluationContext) -> Result<()> {
        for (index, goal) in frame.plan.goal.iter().enumerate() {
            let id = format!("{}-goal-{}", frame.plan.id_part(), index + 1);
            let resource = convert_goal(goal, &id, &ctx.subject);

            let reference = if ctx.contain_resources {
                frame.group.contained.push(resource.clone());
                Reference::contained(&id)
            } else {
                Reference::new(format!("Goal/{id}"))
            };
            frame.group.extension.push(Extension::with_value(
                PERTAINS_TO_GOAL,
                "valueReference",
                serde_json::to_value(&reference)?,
            ));
            ctx.request_resources.push(resource);
        }
        Ok(())
    }
}
