//! Per-call state of an `$apply` invocation.

use serde_json::{Value, json};

use crate::model::{DataRequirement, PlanDefinition, resource_type};
use crate::outcome::OutcomeLog;
use crate::provider::ActivityRequest;

/// Where the plan to apply comes from.
#[derive(Debug, Clone)]
pub enum PlanSource {
    Resource(Box<PlanDefinition>),
    Canonical(String),
    Id(String),
}

/// Caller input for one `$apply`.
#[derive(Debug, Clone)]
pub struct ApplyRequest {
    pub plan: PlanSource,
    pub subject: String,
    pub encounter: Option<String>,
    pub practitioner: Option<String>,
    pub organization: Option<String>,
    pub user_type: Option<Value>,
    pub user_language: Option<Value>,
    pub user_task_context: Option<Value>,
    pub setting: Option<Value>,
    pub setting_context: Option<Value>,
    /// A FHIR `Parameters` resource.
    pub parameters: Option<Value>,
    /// A Bundle of resources already known about the subject.
    pub data: Option<Value>,
    /// Overrides the configured containment policy.
    pub contain_resources: Option<bool>,
}

impl ApplyRequest {
    pub fn new(plan: PlanSource, subject: impl Into<String>) -> Self {
        Self {
            plan,
            subject: subject.into(),
            encounter: None,
            practitioner: None,
            organization: None,
            user_type: None,
            user_language: None,
            user_task_context: None,
            setting: None,
            setting_context: None,
            parameters: None,
            data: None,
            contain_resources: None,
        }
    }

    pub fn for_plan(plan: PlanDefinition, subject: impl Into<String>) -> Self {
        Self::new(PlanSource::Resource(Box::new(plan)), subject)
    }

    pub fn with_encounter(mut self, encounter: impl Into<String>) -> Self {
        self.encounter = Some(encounter.into());
        self
    }

    pub fn with_practitioner(mut self, practitioner: impl Into<String>) -> Self {
        self.practitioner = Some(practitioner.into());
        self
    }

    pub fn with_organization(mut self, organization: impl Into<String>) -> Self {
        self.organization = Some(organization.into());
        self
    }

    pub fn with_user_language(mut self, language: Value) -> Self {
        self.user_language = Some(language);
        self
    }

    pub fn with_user_type(mut self, user_type: Value) -> Self {
        self.user_type = Some(user_type);
        self
    }

    pub fn with_setting(mut self, setting: Value, setting_context: Option<Value>) -> Self {
        self.setting = Some(setting);
        self.setting_context = setting_context;
        self
    }

    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = Some(parameters);
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_containment(mut self, contain_resources: bool) -> Self {
        self.contain_resources = Some(contain_resources);
        self
    }
}

/// Mutable state owned by a single resolution call and threaded through
/// every recursive step. Never shared between calls.
#[derive(Debug, Clone, Default)]
pub struct EvaluationContext {
    pub subject: String,
    pub encounter: Option<String>,
    pub practitioner: Option<String>,
    pub organization: Option<String>,
    pub user_type: Option<Value>,
    pub user_language: Option<Value>,
    pub user_task_context: Option<Value>,
    pub setting: Option<Value>,
    pub setting_context: Option<Value>,
    pub parameters: Option<Value>,
    /// Working document; grows as extraction and pre-population add resources.
    pub data: Option<Value>,
    pub contain_resources: bool,
    pub extracted_resources: Vec<Value>,
    /// Resolved resources that are not embedded in the request tree.
    pub request_resources: Vec<Value>,
    /// Items of the Questionnaire generated from profiled action inputs.
    pub questionnaire_items: Vec<Value>,
    pub outcome: OutcomeLog,
    plan_stack: Vec<String>,
}

impl EvaluationContext {
    pub fn from_request(request: &ApplyRequest, default_contain: bool) -> Self {
        Self {
            subject: request.subject.clone(),
            encounter: request.encounter.clone(),
            practitioner: request.practitioner.clone(),
            organization: request.organization.clone(),
            user_type: request.user_type.clone(),
            user_language: request.user_language.clone(),
            user_task_context: request.user_task_context.clone(),
            setting: request.setting.clone(),
            setting_context: request.setting_context.clone(),
            parameters: request.parameters.clone(),
            data: request.data.clone(),
            contain_resources: request.contain_resources.unwrap_or(default_contain),
            ..Default::default()
        }
    }

    /// Fresh context for a nested plan. Caller fields and the containment
    /// policy are propagated, the working document is copied, and the
    /// generated Questionnaire items move into the nested context until
    /// [`EvaluationContext::merge_nested`] hands them back.
    pub fn nested(&mut self) -> Self {
        Self {
            subject: self.subject.clone(),
            encounter: self.encounter.clone(),
            practitioner: self.practitioner.clone(),
            organization: self.organization.clone(),
            user_type: self.user_type.clone(),
            user_language: self.user_language.clone(),
            user_task_context: self.user_task_context.clone(),
            setting: self.setting.clone(),
            setting_context: self.setting_context.clone(),
            parameters: self.parameters.clone(),
            data: self.data.clone(),
            contain_resources: self.contain_resources,
            extracted_resources: Vec::new(),
            request_resources: Vec::new(),
            questionnaire_items: std::mem::take(&mut self.questionnaire_items),
            outcome: OutcomeLog::new(),
            plan_stack: self.plan_stack.clone(),
        }
    }

    /// Folds a finished nested context back: its Outcome Log is appended to
    /// ours, as are its request and extracted resources.
    pub fn merge_nested(&mut self, nested: EvaluationContext) {
        self.outcome.merge(nested.outcome);
        self.request_resources.extend(nested.request_resources);
        self.extracted_resources.extend(nested.extracted_resources);
        self.questionnaire_items = nested.questionnaire_items;
    }

    pub fn depth(&self) -> usize {
        self.plan_stack.len()
    }

    pub fn is_active(&self, plan_identity: &str) -> bool {
        self.plan_stack.iter().any(|p| p == plan_identity)
    }

    pub(crate) fn enter_plan(&mut self, plan_identity: String) {
        self.plan_stack.push(plan_identity);
    }

    pub(crate) fn exit_plan(&mut self) {
        self.plan_stack.pop();
    }

    pub fn activity_request(&self) -> ActivityRequest<'_> {
        ActivityRequest {
            subject: &self.subject,
            encounter: self.encounter.as_deref(),
            practitioner: self.practitioner.as_deref(),
            organization: self.organization.as_deref(),
            user_type: self.user_type.as_ref(),
            user_language: self.user_language.as_ref(),
            user_task_context: self.user_task_context.as_ref(),
            setting: self.setting.as_ref(),
            setting_context: self.setting_context.as_ref(),
            parameters: self.parameters.as_ref(),
            data: self.data.as_ref(),
        }
    }

    /// Appends a resource to the working document, creating it if needed.
    pub fn add_to_data(&mut self, resource: Value) {
        let data = self
            .data
            .get_or_insert_with(|| json!({"resourceType": "Bundle", "type": "collection"}));
        if let Some(object) = data.as_object_mut() {
            let entries = object.entry("entry").or_insert_with(|| json!([]));
            if let Some(entries) = entries.as_array_mut() {
                entries.push(json!({ "resource": resource }));
            }
        }
    }

    /// Resources of the working document with the given type.
    pub fn data_of_type(&self, wanted: &str) -> Vec<&Value> {
        self.data
            .as_ref()
            .and_then(|d| d.get("entry"))
            .and_then(|e| e.as_array())
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|entry| entry.get("resource"))
                    .filter(|r| resource_type(r) == Some(wanted))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Parameters handed to condition and dynamic value expressions: the
    /// caller's parameters plus, for every input requirement, each
    /// working-document resource of the required type.
    pub fn input_parameters(&self, inputs: &[DataRequirement]) -> Option<Value> {
        if inputs.is_empty() {
            return self.parameters.clone();
        }

        let mut parameters: Vec<Value> = self
            .parameters
            .as_ref()
            .and_then(|p| p.get("parameter"))
            .and_then(|p| p.as_array())
            .cloned()
            .unwrap_or_default();

        for input in inputs {
            let (Some(name), Some(wanted)) = (input.parameter_name(), input.type_name.as_deref())
            else {
                continue;
            };
            for resource in self.data_of_type(wanted) {
                parameters.push(json!({ "name": name, "resource": resource }));
            }
        }

        Some(json!({"resourceType": "Parameters", "parameter": parameters}))
    }

    /// First caller parameter with this name.
    pub fn parameter(&self, name: &str) -> Option<&Value> {
        self.parameters
            .as_ref()
            .and_then(|p| p.get("parameter"))
            .and_then(|p| p.as_array())
            .and_then(|params| {
                params
                    .iter()
                    .find(|p| p.get("name").and_then(|n| n.as_str()) == Some(name))
            })
    }
}

/// Renders a `Parameters.parameter` entry as text: primitives as-is,
/// references by their reference, embedded resources as `Type/id`.
pub fn parameter_text(parameter: &Value) -> Option<String> {
    if let Some(resource) = parameter.get("resource") {
        let rt = resource_type(resource)?;
        let id = resource.get("id").and_then(|i| i.as_str())?;
        return Some(format!("{rt}/{id}"));
    }
    let object = parameter.as_object()?;
    let (_, value) = object.iter().find(|(key, _)| key.starts_with("value"))?;
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Object(o) => o
            .get("reference")
            .and_then(|r| r.as_str())
            .map(str::to_string),
        _ => None,
    }
}
