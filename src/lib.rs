//! # OctoFHIR PlanDefinition
//!
//! An implementation of the FHIR `PlanDefinition/$apply` operation.
//!
//! A PlanDefinition is a reusable clinical-guideline template: goals plus a
//! tree of conditional actions. Applying it for one subject evaluates the
//! action conditions, resolves what each action refers to (activity
//! templates, questionnaires, nested plans) and produces a `RequestGroup`,
//! optionally projected onto a `CarePlan` or a `Bundle`.
//!
//! ## Features
//!
//! - **Condition gating**: actions whose conditions fail are pruned with their whole subtree
//! - **Definition dispatch**: nested plans, ActivityDefinitions and Questionnaires
//! - **Task workflow**: related actions, conditions and inputs become task extensions
//! - **Pre-population**: questionnaire packages resolved locally or over HTTP
//! - **Partial failure**: collaborator errors land in an Outcome Log instead of aborting
//! - **Containment flattening**: nested `contained` resources rewritten to one level
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use octofhir_plandefinition::*;
//!
//! # fn example() -> Result<()> {
//! let repository = InMemoryRepository::from_directory("knowledge")?;
//! let processor = PlanDefinitionProcessor::builder(
//!     Arc::new(repository),
//!     Arc::new(LiteralExpressionEvaluator::new()),
//! )
//! .with_config(ApplyConfig::default().with_containment(true))
//! .build()?;
//!
//! let request = ApplyRequest::new(PlanSource::Id("diabetes".to_string()), "Patient/123");
//! let result = processor.apply(request)?;
//! for issue in result.outcome.issues() {
//!     println!("{}: {}", issue.severity, issue.diagnostics);
//! }
//! # Ok(())
//! # }
//! ```

pub mod apply;
pub mod config;
pub mod constants;
pub mod contained;
pub mod context;
pub mod error;
pub mod model;
pub mod outcome;
pub mod provider;

pub use apply::{
    ApplyResult, DefinitionKind, PlanDefinitionProcessor, PlanDefinitionProcessorBuilder, PlanFrame,
};
pub use config::ApplyConfig;
pub use contained::flatten_contained;
pub use context::{ApplyRequest, EvaluationContext, PlanSource};
pub use error::Result;
pub use error::PlanApplyError;
pub use model::*;
pub use outcome::{IssueSeverity, OutcomeIssue, OutcomeLog};
pub use provider::{
    ActivityApplier, ActivityRequest, BasicActivityApplier, CanonicalResolver, CqfExpression,
    ExpressionEvaluator, InMemoryRepository, JsonPathSetter, LiteralExpressionEvaluator,
    QuestionnaireItemGenerator, QuestionnairePackageClient, QuestionnairePrePopulator,
    QuestionnaireResponseExtractor, ValueSetter,
};

#[cfg(feature = "http-client")]
pub use provider::HttpPackageClient;
