use serde_json::{Map, Value, json};

use super::{ActivityApplier, ActivityRequest};
use crate::error::{PlanApplyError, Result};
use crate::model::resource_type;

/// Creates a draft request of the ActivityDefinition's `kind` (default `Task`).
///
/// Copies `code` and `description`, links the template through
/// `instantiatesCanonical` and points the request at the subject. Dynamic
/// values on the template are not evaluated.
#[derive(Debug, Default, Clone, Copy)]
pub struct BasicActivityApplier;

impl BasicActivityApplier {
    pub fn new() -> Self {
        Self
    }
}

impl ActivityApplier for BasicActivityApplier {
    fn apply(&self, activity: &Value, request: &ActivityRequest<'_>) -> Result<Value> {
        let found = resource_type(activity).unwrap_or("");
        if found != "ActivityDefinition" {
            return Err(PlanApplyError::invalid_resource("ActivityDefinition", found));
        }

        let kind = activity
            .get("kind")
            .and_then(|k| k.as_str())
            .unwrap_or("Task");

        let mut resource = Map::new();
        resource.insert("resourceType".to_string(), json!(kind));
        if let Some(id) = activity.get("id") {
            resource.insert("id".to_string(), id.clone());
        }
        resource.insert("status".to_string(), json!("draft"));
        resource.insert("intent".to_string(), json!("proposal"));

        if let Some(url) = activity.get("url").and_then(|u| u.as_str()) {
            let canonical = match activity.get("version").and_then(|v| v.as_str()) {
                Some(version) => format!("{url}|{version}"),
                None => url.to_string(),
            };
            // Task carries a single canonical, the other request types a list.
            let value = if kind == "Task" {
                json!(canonical)
            } else {
                json!([canonical])
            };
            resource.insert("instantiatesCanonical".to_string(), value);
        }

        if let Some(code) = activity.get("code") {
            let key = match kind {
                "MedicationRequest" => "medicationCodeableConcept",
                _ => "code",
            };
            resource.insert(key.to_string(), code.clone());
        }
        if kind == "Task"
            && let Some(description) = activity.get("description")
        {
            resource.insert("description".to_string(), description.clone());
        }

        let subject_key = if kind == "Task" { "for" } else { "subject" };
        resource.insert(
            subject_key.to_string(),
            json!({"reference": request.subject}),
        );
        if let Some(encounter) = request.encounter {
            resource.insert("encounter".to_string(), json!({"reference": encounter}));
        }
        if let Some(requester) = request.practitioner.or(request.organization) {
            resource.insert("requester".to_string(), json!({"reference": requester}));
        }

        Ok(Value::Object(resource))
    }
}
