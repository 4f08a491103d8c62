//! Collaborators the apply engine delegates to.
//!
//! The engine only depends on these traits. Each one has an in-process default
//! so plans can be applied without a FHIR server:
//!
//! - [`CanonicalResolver`]: [`InMemoryRepository`]
//! - [`ExpressionEvaluator`]: [`LiteralExpressionEvaluator`]
//! - [`ActivityApplier`]: [`BasicActivityApplier`]
//! - [`ValueSetter`]: [`JsonPathSetter`]
//! - [`QuestionnairePackageClient`]: `HttpPackageClient` (feature `http-client`)
//!
//! Questionnaire item generation, pre-population and response extraction have
//! no default and are only invoked when configured.

pub mod activity;
pub mod evaluator;
pub mod memory;
pub mod path;

#[cfg(feature = "http-client")]
pub mod http;

pub use activity::BasicActivityApplier;
pub use evaluator::{CqfExpression, LiteralExpressionEvaluator};
pub use memory::InMemoryRepository;
pub use path::JsonPathSetter;

#[cfg(feature = "http-client")]
pub use http::HttpPackageClient;

use serde_json::Value;

use crate::error::Result;
use crate::model::DataRequirement;

/// Looks up knowledge artifacts (plans, activity definitions, questionnaires,
/// libraries) by canonical URL or by id.
pub trait CanonicalResolver: Send + Sync {
    /// Resolve `url` or `url|version`.
    fn search_by_canonical(&self, canonical: &str) -> Result<Option<Value>>;

    fn read(&self, resource_type: &str, id: &str) -> Result<Option<Value>>;
}

/// Evaluates a guideline expression for one subject.
///
/// Returns every value the expression produced; an empty list means no result.
pub trait ExpressionEvaluator: Send + Sync {
    fn evaluate(
        &self,
        subject: &str,
        expression: &CqfExpression,
        parameters: Option<&Value>,
        data: Option<&Value>,
    ) -> Result<Vec<Value>>;
}

/// Everything the activity applier receives besides the template itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct ActivityRequest<'a> {
    pub subject: &'a str,
    pub encounter: Option<&'a str>,
    pub practitioner: Option<&'a str>,
    pub organization: Option<&'a str>,
    pub user_type: Option<&'a Value>,
    pub user_language: Option<&'a Value>,
    pub user_task_context: Option<&'a Value>,
    pub setting: Option<&'a Value>,
    pub setting_context: Option<&'a Value>,
    pub parameters: Option<&'a Value>,
    pub data: Option<&'a Value>,
}

/// Turns an ActivityDefinition into a concrete request resource.
pub trait ActivityApplier: Send + Sync {
    fn apply(&self, activity: &Value, request: &ActivityRequest<'_>) -> Result<Value>;
}

/// Builds a Questionnaire item for a profiled input requirement.
pub trait QuestionnaireItemGenerator: Send + Sync {
    /// `index` is the number of items already generated in this call.
    fn generate_item(&self, input: &DataRequirement, index: usize) -> Result<Value>;
}

/// Pre-populates a Questionnaire, producing a QuestionnaireResponse-ready form.
pub trait QuestionnairePrePopulator: Send + Sync {
    fn pre_populate(
        &self,
        questionnaire: &Value,
        subject: &str,
        parameters: Option<&Value>,
        support: &Value,
    ) -> Result<Value>;
}

/// Extracts resources from a QuestionnaireResponse. Returns a Bundle.
pub trait QuestionnaireResponseExtractor: Send + Sync {
    fn extract(
        &self,
        response: &Value,
        parameters: Option<&Value>,
        data: Option<&Value>,
    ) -> Result<Value>;
}

/// Invokes a remote `$questionnaire-package` style operation. Returns a Bundle.
pub trait QuestionnairePackageClient: Send + Sync {
    fn fetch_package(&self, base_url: &str, operation: &str, parameters: &Value) -> Result<Value>;
}

/// Assigns a value at a path inside a resource or request node.
pub trait ValueSetter: Send + Sync {
    fn set_value(&self, target: &mut Value, path: &str, value: Value) -> Result<()>;
}
