use octofhir_plandefinition::*;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub const SUBJECT: &str = "Patient/123";

/// Evaluator with a fixed script: expression text -> values or an error.
/// Literals (`true`, `false`, numbers, quoted strings) work without a script.
#[allow(dead_code)]
#[derive(Default)]
pub struct ScriptedEvaluator {
    script: HashMap<String, std::result::Result<Vec<Value>, String>>,
    pub calls: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl ScriptedEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn returning(mut self, expression: &str, values: Vec<Value>) -> Self {
        self.script.insert(expression.to_string(), Ok(values));
        self
    }

    pub fn failing(mut self, expression: &str, message: &str) -> Self {
        self.script
            .insert(expression.to_string(), Err(message.to_string()));
        self
    }

    pub fn call_count(&self, expression: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.as_str() == expression)
            .count()
    }
}

impl ExpressionEvaluator for ScriptedEvaluator {
    fn evaluate(
        &self,
        subject: &str,
        expression: &CqfExpression,
        parameters: Option<&Value>,
        data: Option<&Value>,
    ) -> Result<Vec<Value>> {
        self.calls.lock().unwrap().push(expression.expression.clone());
        match self.script.get(&expression.expression) {
            Some(Ok(values)) => Ok(values.clone()),
            Some(Err(message)) => Err(PlanApplyError::evaluation(
                expression.expression.clone(),
                message.clone(),
            )),
            None => LiteralExpressionEvaluator::new().evaluate(subject, expression, parameters, data),
        }
    }
}

/// Activity applier that records which templates it was asked to apply.
#[allow(dead_code)]
#[derive(Default)]
pub struct RecordingApplier {
    pub applied: Mutex<Vec<String>>,
    fail_for: Vec<String>,
}

#[allow(dead_code)]
impl RecordingApplier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_for(mut self, activity_id: &str) -> Self {
        self.fail_for.push(activity_id.to_string());
        self
    }

    pub fn applied(&self) -> Vec<String> {
        self.applied.lock().unwrap().clone()
    }
}

impl ActivityApplier for RecordingApplier {
    fn apply(&self, activity: &Value, request: &ActivityRequest<'_>) -> Result<Value> {
        let id = resource_id(activity).unwrap_or("").to_string();
        self.applied.lock().unwrap().push(id.clone());
        if self.fail_for.contains(&id) {
            return Err(PlanApplyError::activity_application(format!(
                "{id} is not applicable"
            )));
        }
        BasicActivityApplier::new().apply(activity, request)
    }
}

/// Package client returning a fixed bundle and recording the request body.
#[allow(dead_code)]
pub struct StaticPackageClient {
    bundle: Option<Value>,
    pub requests: Mutex<Vec<(String, String, Value)>>,
}

#[allow(dead_code)]
impl StaticPackageClient {
    pub fn returning(bundle: Value) -> Self {
        Self {
            bundle: Some(bundle),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn unreachable() -> Self {
        Self {
            bundle: None,
            requests: Mutex::new(Vec::new()),
        }
    }
}

impl QuestionnairePackageClient for StaticPackageClient {
    fn fetch_package(&self, base_url: &str, operation: &str, parameters: &Value) -> Result<Value> {
        self.requests.lock().unwrap().push((
            base_url.to_string(),
            operation.to_string(),
            parameters.clone(),
        ));
        self.bundle
            .clone()
            .ok_or_else(|| PlanApplyError::http_error("connection refused"))
    }
}

/// Marks the questionnaire as populated and records the support bundle size.
#[allow(dead_code)]
#[derive(Default)]
pub struct MarkingPrePopulator {
    pub support_sizes: Mutex<Vec<usize>>,
}

impl QuestionnairePrePopulator for MarkingPrePopulator {
    fn pre_populate(
        &self,
        questionnaire: &Value,
        _subject: &str,
        _parameters: Option<&Value>,
        support: &Value,
    ) -> Result<Value> {
        let size = support["entry"].as_array().map(Vec::len).unwrap_or(0);
        self.support_sizes.lock().unwrap().push(size);
        let mut populated = questionnaire.clone();
        let id = resource_id(questionnaire).unwrap_or("questionnaire").to_string();
        populated["id"] = json!(format!("{id}-populated"));
        Ok(populated)
    }
}

/// One item per input, linkId set to the insertion index.
#[allow(dead_code)]
pub struct IndexItemGenerator;

impl QuestionnaireItemGenerator for IndexItemGenerator {
    fn generate_item(&self, input: &DataRequirement, index: usize) -> Result<Value> {
        Ok(json!({
            "linkId": index.to_string(),
            "text": input.type_name,
            "definition": input.profile.first(),
        }))
    }
}

/// Extracts one Observation per QuestionnaireResponse.
#[allow(dead_code)]
pub struct ObservationExtractor;

impl QuestionnaireResponseExtractor for ObservationExtractor {
    fn extract(&self, response: &Value, _parameters: Option<&Value>, _data: Option<&Value>) -> Result<Value> {
        let id = resource_id(response).unwrap_or("qr");
        Ok(json!({
            "resourceType": "Bundle",
            "type": "collection",
            "entry": [{"resource": {"resourceType": "Observation", "id": format!("{id}-obs")}}]
        }))
    }
}

#[allow(dead_code)]
pub fn builder(resources: Vec<Value>, evaluator: ScriptedEvaluator) -> PlanDefinitionProcessorBuilder {
    PlanDefinitionProcessor::builder(
        Arc::new(InMemoryRepository::from_resources(resources)),
        Arc::new(evaluator),
    )
    .with_package_client(Arc::new(StaticPackageClient::unreachable()))
}

#[allow(dead_code)]
pub fn processor(resources: Vec<Value>) -> PlanDefinitionProcessor {
    builder(resources, ScriptedEvaluator::new()).build().unwrap()
}

#[allow(dead_code)]
pub fn plan(id: &str, actions: Vec<Value>) -> Value {
    json!({
        "resourceType": "PlanDefinition",
        "id": id,
        "url": format!("http://example.org/PlanDefinition/{id}"),
        "action": actions
    })
}

#[allow(dead_code)]
pub fn action(id: &str) -> Value {
    json!({ "id": id, "title": format!("Action {id}") })
}

#[allow(dead_code)]
pub fn with_condition(mut action: Value, expression: &str) -> Value {
    let conditions = action
        .as_object_mut()
        .unwrap()
        .entry("condition")
        .or_insert_with(|| json!([]));
    conditions.as_array_mut().unwrap().push(json!({
        "kind": "applicability",
        "expression": {"language": "text/cql", "expression": expression}
    }));
    action
}

#[allow(dead_code)]
pub fn with_definition(mut action: Value, canonical: &str) -> Value {
    action["definitionCanonical"] = json!(canonical);
    action
}

#[allow(dead_code)]
pub fn with_children(mut action: Value, children: Vec<Value>) -> Value {
    action["action"] = Value::Array(children);
    action
}

#[allow(dead_code)]
pub fn activity(id: &str, kind: &str) -> Value {
    json!({
        "resourceType": "ActivityDefinition",
        "id": id,
        "url": format!("http://example.org/ActivityDefinition/{id}"),
        "kind": kind,
        "code": {"text": format!("Do {id}")}
    })
}

#[allow(dead_code)]
pub fn apply(processor: &PlanDefinitionProcessor, plan: Value) -> ApplyResult {
    let plan = PlanDefinition::from_resource(plan).unwrap();
    processor
        .apply(ApplyRequest::for_plan(plan, SUBJECT))
        .unwrap()
}

#[allow(dead_code)]
pub fn find_resource<'a>(resources: &'a [Value], resource_type: &str, id: &str) -> Option<&'a Value> {
    resources
        .iter()
        .find(|r| r["resourceType"] == resource_type && r["id"] == id)
}

/// Every `#id` reference below `root` resolves to a member of `root.contained`.
#[allow(dead_code)]
pub fn fragment_references_resolve(root: &Value) -> bool {
    let ids: Vec<&str> = root["contained"]
        .as_array()
        .map(|c| c.iter().filter_map(|r| r["id"].as_str()).collect())
        .unwrap_or_default();
    let mut references = Vec::new();
    collect_fragments(root, &mut references);
    references
        .iter()
        .all(|r| ids.contains(&r.trim_start_matches('#')))
}

fn collect_fragments(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Object(object) => {
            for (key, field) in object {
                if key == "reference"
                    && let Some(reference) = field.as_str()
                    && reference.starts_with('#')
                {
                    out.push(reference.to_string());
                } else {
                    collect_fragments(field, out);
                }
            }
        }
        Value::Array(items) => items.iter().for_each(|i| collect_fragments(i, out)),
        _ => {}
    }
}
