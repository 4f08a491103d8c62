use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::datatypes::{Extension, Reference};
use super::plan::{ActionCondition, ActionTiming, PlanAction, RelatedAction, SelectionBehavior};
use crate::error::Result;

fn request_group_type() -> String {
    "RequestGroup".to_string()
}

/// Root of the request tree produced for one PlanDefinition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestGroup {
    #[serde(rename = "resourceType", default = "request_group_type")]
    pub resource_type: String,
    pub id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contained: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extension: Vec<Extension>,
    #[serde(rename = "instantiatesCanonical", default, skip_serializing_if = "Vec::is_empty")]
    pub instantiates_canonical: Vec<String>,
    pub status: String,
    pub intent: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<Reference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encounter: Option<Reference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<Reference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub action: Vec<RequestAction>,
}

impl RequestGroup {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            resource_type: request_group_type(),
            id: id.into(),
            contained: Vec::new(),
            extension: Vec::new(),
            instantiates_canonical: Vec::new(),
            status: "draft".to_string(),
            intent: "proposal".to_string(),
            subject: None,
            encounter: None,
            author: None,
            language: None,
            action: Vec::new(),
        }
    }

    pub fn reference(&self) -> Reference {
        Reference::new(format!("RequestGroup/{}", self.id))
    }

    pub fn to_resource(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Number of request nodes in the tree, root excluded.
    pub fn node_count(&self) -> usize {
        self.action.iter().map(RequestAction::subtree_size).sum()
    }
}

/// One node of the request tree. Mirrors a [`PlanAction`] whose conditions passed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestAction {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extension: Vec<Extension>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "textEquivalent", skip_serializing_if = "Option::is_none")]
    pub text_equivalent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub code: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub documentation: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub condition: Vec<ActionCondition>,
    #[serde(rename = "relatedAction", default, skip_serializing_if = "Vec::is_empty")]
    pub related_action: Vec<RelatedAction>,
    #[serde(flatten)]
    pub timing: ActionTiming,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub participant: Vec<Value>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<Value>,
    #[serde(rename = "groupingBehavior", skip_serializing_if = "Option::is_none")]
    pub grouping_behavior: Option<String>,
    #[serde(rename = "selectionBehavior", skip_serializing_if = "Option::is_none")]
    pub selection_behavior: Option<SelectionBehavior>,
    #[serde(rename = "requiredBehavior", skip_serializing_if = "Option::is_none")]
    pub required_behavior: Option<String>,
    #[serde(rename = "precheckBehavior", skip_serializing_if = "Option::is_none")]
    pub precheck_behavior: Option<String>,
    #[serde(rename = "cardinalityBehavior", skip_serializing_if = "Option::is_none")]
    pub cardinality_behavior: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<Reference>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub action: Vec<RequestAction>,
    /// Elements set by dynamic values that have no dedicated field.
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl RequestAction {
    /// Copies the display, timing, condition, relationship and behaviour
    /// metadata of `action`. Extensions are filtered by `keep_extension`.
    pub fn from_plan_action(action: &PlanAction, keep_extension: impl Fn(&str) -> bool) -> Self {
        Self {
            id: action.id.clone(),
            extension: action
                .extension
                .iter()
                .filter(|e| keep_extension(&e.url))
                .cloned()
                .collect(),
            prefix: action.prefix.clone(),
            title: action.title.clone(),
            description: action.description.clone(),
            text_equivalent: action.text_equivalent.clone(),
            priority: action.priority.clone(),
            code: action.code.clone(),
            documentation: action.documentation.clone(),
            condition: action.condition.clone(),
            related_action: action.related_action.clone(),
            timing: action.timing.clone(),
            participant: action.participant.clone(),
            type_: action.type_.clone(),
            grouping_behavior: action.grouping_behavior.clone(),
            selection_behavior: action.selection_behavior,
            required_behavior: action.required_behavior.clone(),
            precheck_behavior: action.precheck_behavior.clone(),
            cardinality_behavior: action.cardinality_behavior.clone(),
            resource: None,
            action: Vec::new(),
            other: Map::new(),
        }
    }

    pub fn subtree_size(&self) -> usize {
        1 + self.action.iter().map(RequestAction::subtree_size).sum::<usize>()
    }

    /// Depth of the subtree rooted here; a leaf has depth 1.
    pub fn depth(&self) -> usize {
        1 + self.action.iter().map(RequestAction::depth).max().unwrap_or(0)
    }
}
