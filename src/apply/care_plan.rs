use serde_json::{Map, Value, json};

use crate::constants::EXT_CRMI_MESSAGES;
use crate::contained::flatten_contained;
use crate::error::Result;
use crate::model::{Reference, resource_id, resource_type};
use crate::outcome::OutcomeLog;

use super::ApplyResult;

impl ApplyResult {
    /// Projects the result onto a CarePlan that contains the request group,
    /// references the goals, lists extracted resources as supporting info and
    /// carries the outcome as a contained OperationOutcome. The returned
    /// CarePlan is flattened to a single level of `contained`.
    pub fn to_care_plan(&self) -> Result<Value> {
        let group = &self.request_group;
        let mut care_plan = Map::new();
        care_plan.insert("resourceType".to_string(), json!("CarePlan"));
        care_plan.insert("id".to_string(), json!(group.id));
        if !group.instantiates_canonical.is_empty() {
            care_plan.insert(
                "instantiatesCanonical".to_string(),
                json!(group.instantiates_canonical),
            );
        }
        care_plan.insert("status".to_string(), json!("draft"));
        care_plan.insert("intent".to_string(), json!("proposal"));
        for (key, reference) in [
            ("subject", &group.subject),
            ("encounter", &group.encounter),
            ("author", &group.author),
        ] {
            if let Some(reference) = reference {
                care_plan.insert(key.to_string(), reference.to_value());
            }
        }
        if let Some(language) = &group.language {
            care_plan.insert("language".to_string(), json!(language));
        }

        let mut group_resource = group.to_resource()?;
        let mut contained = Vec::new();
        let mut extensions = Vec::new();

        if let Some(outcome) = self.operation_outcome() {
            let id = resource_id(&outcome).unwrap_or("").to_string();
            push_to(&mut group_resource, "contained", outcome);
            push_to(
                &mut group_resource,
                "extension",
                json!({"url": EXT_CRMI_MESSAGES, "valueReference": Reference::contained(&id).to_value()}),
            );
            extensions.push(json!({
                "url": EXT_CRMI_MESSAGES,
                "valueReference": Reference::contained(&id).to_value(),
            }));
        }

        let goals: Vec<Value> = self
            .request_resources
            .iter()
            .filter(|r| resource_type(r) == Some("Goal"))
            .filter_map(resource_id)
            .map(|id| {
                let reference = if self.contain_resources {
                    Reference::contained(id)
                } else {
                    Reference::new(format!("Goal/{id}"))
                };
                reference.to_value()
            })
            .collect();
        if !goals.is_empty() {
            care_plan.insert("goal".to_string(), Value::Array(goals));
        }

        care_plan.insert(
            "activity".to_string(),
            json!([{ "reference": Reference::contained(&group.id).to_value() }]),
        );
        contained.push(group_resource);

        if !self.extracted_resources.is_empty() {
            let supporting: Vec<Value> = self
                .extracted_resources
                .iter()
                .filter_map(resource_id)
                .map(|id| Reference::contained(id).to_value())
                .collect();
            care_plan.insert("supportingInfo".to_string(), Value::Array(supporting));
            contained.extend(self.extracted_resources.iter().cloned());
        }

        if let Some(questionnaire) = self.questionnaire() {
            contained.push(questionnaire);
        }
        if !extensions.is_empty() {
            care_plan.insert("extension".to_string(), Value::Array(extensions));
        }
        care_plan.insert("contained".to_string(), Value::Array(contained));

        let mut care_plan = Value::Object(care_plan);
        let mut flatten_log = OutcomeLog::new();
        flatten_contained(&mut care_plan, &mut flatten_log);
        if !flatten_log.is_empty() {
            tracing::warn!(
                "Flattening CarePlan {} renamed {} contained resource(s)",
                group.id,
                flatten_log.len()
            );
        }
        Ok(care_plan)
    }
}

fn push_to(resource: &mut Value, key: &str, value: Value) {
    if let Some(object) = resource.as_object_mut() {
        let list = object.entry(key).or_insert_with(|| json!([]));
        if let Some(list) = list.as_array_mut() {
            list.push(value);
        }
    }
}
