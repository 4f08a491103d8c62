use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::datatypes::{DataRequirement, Duration, Expression, Extension, Reference, find_extension};
use crate::error::{PlanApplyError, Result};

fn plan_definition_type() -> String {
    "PlanDefinition".to_string()
}

/// A parsed PlanDefinition. Read-only once loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanDefinition {
    #[serde(rename = "resourceType", default = "plan_definition_type")]
    pub resource_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contained: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extension: Vec<Extension>,
    #[serde(rename = "relatedArtifact", default, skip_serializing_if = "Vec::is_empty")]
    pub related_artifact: Vec<RelatedArtifact>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub library: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub goal: Vec<PlanGoal>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub action: Vec<PlanAction>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl PlanDefinition {
    pub fn from_resource(resource: Value) -> Result<Self> {
        let resource_type = resource
            .get("resourceType")
            .and_then(|t| t.as_str())
            .unwrap_or("")
            .to_string();
        if resource_type != "PlanDefinition" {
            return Err(PlanApplyError::invalid_resource(
                "PlanDefinition".to_string(),
                resource_type,
            ));
        }
        Ok(serde_json::from_value(resource)?)
    }

    pub fn to_resource(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn id_part(&self) -> &str {
        self.id.as_deref().unwrap_or("plandefinition")
    }

    /// `url|version` when the plan is versioned, otherwise `url`.
    pub fn canonical(&self) -> Option<String> {
        self.url.as_ref().map(|url| match &self.version {
            Some(version) => format!("{url}|{version}"),
            None => url.clone(),
        })
    }

    /// Key identifying this plan on the nested-plan stack.
    pub fn identity(&self) -> String {
        self.canonical()
            .unwrap_or_else(|| format!("PlanDefinition/{}", self.id_part()))
    }

    pub fn primary_library(&self) -> Option<&str> {
        self.library.first().map(String::as_str)
    }

    pub fn has_extension(&self, url: &str) -> bool {
        find_extension(&self.extension, url).is_some()
    }

    /// Looks up a resource embedded in this plan by fragment reference (`#id`).
    pub fn resolve_contained(&self, reference: &str) -> Option<&Value> {
        let id = reference.trim_start_matches('#');
        self.contained.iter().find(|resource| {
            resource
                .get("id")
                .and_then(|i| i.as_str())
                .map(|i| i.trim_start_matches('#') == id)
                .unwrap_or(false)
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelatedArtifact {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanGoal {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub addresses: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub target: Vec<GoalTarget>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GoalTarget {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub measure: Option<Value>,
    /// `detail[x]`, `due[x]` and extensions.
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SelectionBehavior {
    Any,
    All,
    AllOrNone,
    ExactlyOne,
    AtMostOne,
    OneOrMore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionRelationship {
    BeforeStart,
    Before,
    BeforeEnd,
    ConcurrentWithStart,
    Concurrent,
    ConcurrentWithEnd,
    AfterStart,
    After,
    AfterEnd,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelatedAction {
    #[serde(rename = "actionId")]
    pub action_id: String,
    pub relationship: ActionRelationship,
    #[serde(rename = "offsetDuration", skip_serializing_if = "Option::is_none")]
    pub offset_duration: Option<Duration>,
    #[serde(rename = "offsetRange", skip_serializing_if = "Option::is_none")]
    pub offset_range: Option<Value>,
}

impl RelatedAction {
    pub fn new(action_id: impl Into<String>, relationship: ActionRelationship) -> Self {
        Self {
            action_id: action_id.into(),
            relationship,
            offset_duration: None,
            offset_range: None,
        }
    }

    pub fn with_offset(mut self, offset: Duration) -> Self {
        self.offset_duration = Some(offset);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionCondition {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expression: Option<Expression>,
}

impl ActionCondition {
    pub fn applicability(expression: Expression) -> Self {
        Self {
            kind: Some("applicability".to_string()),
            expression: Some(expression),
        }
    }

    pub fn expression_text(&self) -> Option<&str> {
        self.expression.as_ref().and_then(|e| e.expression.as_deref())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DynamicValue {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expression: Option<Expression>,
}

/// `timing[x]`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionTiming {
    #[serde(rename = "timingDateTime", skip_serializing_if = "Option::is_none")]
    pub date_time: Option<Value>,
    #[serde(rename = "timingAge", skip_serializing_if = "Option::is_none")]
    pub age: Option<Value>,
    #[serde(rename = "timingPeriod", skip_serializing_if = "Option::is_none")]
    pub period: Option<Value>,
    #[serde(rename = "timingDuration", skip_serializing_if = "Option::is_none")]
    pub duration: Option<Value>,
    #[serde(rename = "timingRange", skip_serializing_if = "Option::is_none")]
    pub range: Option<Value>,
    #[serde(rename = "timingTiming", skip_serializing_if = "Option::is_none")]
    pub timing: Option<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanAction {
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
    #[serde(rename = "goalId", default, skip_serializing_if = "Vec::is_empty")]
    pub goal_id: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub condition: Vec<ActionCondition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub input: Vec<DataRequirement>,
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
    #[serde(rename = "definitionCanonical", skip_serializing_if = "Option::is_none")]
    pub definition_canonical: Option<String>,
    /// STU3 form of the definition reference.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub definition: Option<Reference>,
    #[serde(rename = "dynamicValue", default, skip_serializing_if = "Vec::is_empty")]
    pub dynamic_value: Vec<DynamicValue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub action: Vec<PlanAction>,
}

impl PlanAction {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Default::default()
        }
    }

    pub fn definition_reference(&self) -> Option<&str> {
        self.definition_canonical
            .as_deref()
            .or_else(|| self.definition.as_ref().and_then(|d| d.reference.as_deref()))
    }

    pub fn extension_by_url(&self, url: &str) -> Option<&Extension> {
        find_extension(&self.extension, url)
    }

    pub fn id_or_default(&self) -> &str {
        self.id.as_deref().unwrap_or("")
    }
}
