use serde_json::{Value, json};

use crate::constants::{
    APHL_CONDITION, APHL_EXPRESSION, APHL_INPUT, APHL_LANGUAGE, APHL_NEXT, APHL_OFFSET, APHL_TARGET,
};
use crate::context::EvaluationContext;
use crate::error::Result;
use crate::model::{Extension, PlanAction, Reference};

use super::{PlanDefinitionProcessor, PlanFrame};

/// Workflow extensions describing `action` on the task created for it.
pub fn task_extensions(action: &PlanAction) -> Result<Vec<Extension>> {
    let mut extensions = Vec::new();

    for related in &action.related_action {
        let mut next = Extension::new(APHL_NEXT);
        if let Some(offset) = &related.offset_duration {
            next.push(Extension::with_value(
                APHL_OFFSET,
                "valueDuration",
                serde_json::to_value(offset)?,
            ));
        }
        next.push(Extension::with_value(
            APHL_TARGET,
            "valueReference",
            Reference::new(format!("Task/{}", related.action_id)).to_value(),
        ));
        extensions.push(next);
    }

    for condition in &action.condition {
        let Some(expression) = &condition.expression else {
            continue;
        };
        let mut extension = Extension::new(APHL_CONDITION);
        if let Some(language) = &expression.language {
            extension.push(Extension::with_value(APHL_LANGUAGE, "valueString", json!(language)));
        }
        if let Some(text) = &expression.expression {
            extension.push(Extension::with_value(APHL_EXPRESSION, "valueString", json!(text)));
        }
        extensions.push(extension);
    }

    for input in &action.input {
        extensions.push(Extension::with_value(
            APHL_INPUT,
            "valueDataRequirement",
            serde_json::to_value(input)?,
        ));
    }

    Ok(extensions)
}

impl PlanDefinitionProcessor {
    /// Links a task produced for `action` into the request group: the task
    /// takes the action id, describes the action's relations, conditions and
    /// inputs as extensions and is based on the group. Pre-population runs last.
    pub(crate) fn annotate_task(
        &self,
        frame: &mut PlanFrame<'_>,
        ctx: &mut EvaluationContext,
        task: &mut Value,
        action: &PlanAction,
    ) -> Result<()> {
        let extensions = task_extensions(action)?;
        let based_on = frame.group_reference().to_value();
        let subject = frame.group.subject.as_ref().map(Reference::to_value);

        if let Some(object) = task.as_object_mut() {
            if let Some(id) = &action.id {
                object.insert("id".to_string(), json!(id));
            }
            if !extensions.is_empty() {
                let list = object.entry("extension").or_insert_with(|| json!([]));
                if let Some(list) = list.as_array_mut() {
                    for extension in extensions {
                        list.push(serde_json::to_value(extension)?);
                    }
                }
            }
            let list = object.entry("basedOn").or_insert_with(|| json!([]));
            if let Some(list) = list.as_array_mut() {
                list.push(based_on);
            }
            if let Some(subject) = subject {
                object.insert("for".to_string(), subject);
            }
        }

        self.prepopulate_task(frame, ctx, task, action)
    }
}
