use serde_json::{Value, json};

use crate::context::EvaluationContext;
use crate::error::{PlanApplyError, Result};
use crate::model::{PlanAction, PlanDefinition, resource_type};

use super::{PlanDefinitionProcessor, PlanFrame};

/// A resolved action definition, classified once at dispatch time.
#[derive(Debug, Clone)]
pub enum DefinitionKind {
    NestedPlan(Box<PlanDefinition>),
    Activity { template: Value, contained: bool },
    Questionnaire(Value),
}

const KNOWN_KINDS: [&str; 3] = ["PlanDefinition", "ActivityDefinition", "Questionnaire"];

/// Resource type named by a canonical or relative reference: the segment
/// before the id, e.g. `ActivityDefinition` for
/// `http://example.org/ActivityDefinition/order|1.0`.
pub fn reference_type_token(reference: &str) -> Option<&str> {
    let reference = reference.split('|').next().unwrap_or(reference);
    let mut segments = reference.rsplit('/');
    segments.next()?;
    segments.next().filter(|s| !s.is_empty())
}

impl DefinitionKind {
    fn classify(reference: &str, resource: Value, contained: bool) -> Result<Self> {
        match resource_type(&resource) {
            Some("PlanDefinition") => Ok(DefinitionKind::NestedPlan(Box::new(
                PlanDefinition::from_resource(resource)?,
            ))),
            Some("ActivityDefinition") => Ok(DefinitionKind::Activity {
                template: resource,
                contained,
            }),
            Some("Questionnaire") => Ok(DefinitionKind::Questionnaire(resource)),
            other => Err(PlanApplyError::unknown_definition_kind(
                reference,
                other.unwrap_or("unknown"),
            )),
        }
    }
}

impl PlanDefinitionProcessor {
    /// Resolves the definition of `action` to a concrete resource.
    ///
    /// Unknown definition kinds and dangling `#id` references are structural
    /// and returned as `Err`. Anything that goes wrong inside a handler is
    /// logged and yields `Ok(None)`.
    pub(crate) fn resolve_definition(
        &self,
        frame: &mut PlanFrame<'_>,
        ctx: &mut EvaluationContext,
        action: &PlanAction,
        reference: &str,
    ) -> Result<Option<Value>> {
        tracing::debug!("Resolving definition {}", reference);

        let definition = match self.lookup_definition(frame.plan, reference) {
            Ok(Some(definition)) => definition,
            Ok(None) => {
                let message = format!("Definition {reference} could not be found");
                tracing::error!("{}", message);
                ctx.outcome.error(message);
                return Ok(None);
            }
            Err(e) if e.is_structural() => return Err(e),
            Err(e) => {
                self.log_definition_failure(ctx, reference, &e);
                return Ok(None);
            }
        };

        let resolved = match definition {
            DefinitionKind::NestedPlan(plan) => self.apply_nested_plan(ctx, &plan),
            DefinitionKind::Activity {
                template,
                contained,
            } => self.apply_activity(ctx, &template, contained),
            DefinitionKind::Questionnaire(questionnaire) => Ok(questionnaire),
        };

        match resolved {
            Ok(mut resource) => {
                if resource_type(&resource) == Some("Task") {
                    self.annotate_task(frame, ctx, &mut resource, action)?;
                }
                Ok(Some(resource))
            }
            Err(e) => {
                self.log_definition_failure(ctx, reference, &e);
                Ok(None)
            }
        }
    }

    /// `Ok(None)` when a canonical reference resolves to nothing.
    fn lookup_definition(&self, plan: &PlanDefinition, reference: &str) -> Result<Option<DefinitionKind>> {
        if reference.starts_with('#') {
            let resource = plan
                .resolve_contained(reference)
                .cloned()
                .ok_or_else(|| PlanApplyError::unresolved_definition(reference))?;
            return DefinitionKind::classify(reference, resource, true).map(Some);
        }

        // The resolved resource decides the kind; the reference's type token
        // only matters when nothing resolves.
        match self.repository.search_by_canonical(reference)? {
            Some(resource) => DefinitionKind::classify(reference, resource, false).map(Some),
            None => match reference_type_token(reference) {
                Some(token) if !KNOWN_KINDS.contains(&token) => Err(
                    PlanApplyError::unknown_definition_kind(reference, token),
                ),
                _ => Ok(None),
            },
        }
    }

    fn log_definition_failure(&self, ctx: &mut EvaluationContext, reference: &str, error: &PlanApplyError) {
        let message = format!("Definition {reference} could not be applied and threw exception: {error}");
        tracing::error!("{}", message);
        ctx.outcome.error(message);
    }

    /// Applies a nested plan in its own context and returns its request group.
    fn apply_nested_plan(&self, ctx: &mut EvaluationContext, plan: &PlanDefinition) -> Result<Value> {
        let identity = plan.identity();
        if ctx.is_active(&identity) {
            return Err(PlanApplyError::recursive_plan(identity));
        }
        if ctx.depth() >= self.config.max_nesting_depth {
            return Err(PlanApplyError::NestingDepthExceeded {
                depth: ctx.depth() + 1,
                limit: self.config.max_nesting_depth,
            });
        }

        tracing::debug!("Applying nested PlanDefinition {}", identity);
        let mut nested = ctx.nested();
        nested.enter_plan(identity);
        let group = self.resolve_plan(plan, &mut nested);
        ctx.merge_nested(nested);

        group?.to_resource()
    }

    fn apply_activity(&self, ctx: &mut EvaluationContext, template: &Value, contained: bool) -> Result<Value> {
        let mut resource = self
            .activity_applier
            .apply(template, &ctx.activity_request())?;

        let template_id = template
            .get("id")
            .and_then(|i| i.as_str())
            .map(|id| if contained { id.trim_start_matches('#') } else { id });
        if let Some(id) = template_id
            && let Some(object) = resource.as_object_mut()
        {
            object.insert("id".to_string(), json!(id));
        }
        Ok(resource)
    }
}
