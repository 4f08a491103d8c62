use serde_json::Value;

use crate::context::EvaluationContext;
use crate::error::{PlanApplyError, Result};
use crate::model::{DynamicValue, PlanAction, RequestAction};
use crate::provider::CqfExpression;

use super::{PlanDefinitionProcessor, PlanFrame};

const ACTION_PREFIX: &str = "action.";

impl PlanDefinitionProcessor {
    /// Evaluates each dynamic value of `action` and assigns the first result.
    ///
    /// Paths starting with `action.` target the request node; other paths
    /// target the resolved resource, or the node when there is none. A
    /// failing binding is logged and skipped.
    pub(crate) fn apply_dynamic_values(
        &self,
        frame: &PlanFrame<'_>,
        ctx: &mut EvaluationContext,
        action: &PlanAction,
        node: &mut RequestAction,
        mut resource: Option<&mut Value>,
    ) {
        if action.dynamic_value.is_empty() {
            return;
        }
        let parameters = ctx.input_parameters(&action.input);

        for binding in &action.dynamic_value {
            let Some(expression) = binding
                .expression
                .as_ref()
                .and_then(|e| CqfExpression::from_expression(e, frame.default_library()))
            else {
                continue;
            };

            let outcome = self
                .evaluator
                .evaluate(&ctx.subject, &expression, parameters.as_ref(), ctx.data.as_ref())
                .and_then(|values| self.assign(binding, values, node, resource.as_deref_mut()));

            if let Err(e) = outcome {
                let message = format!(
                    "DynamicValue expression {} encountered exception: {e}",
                    expression.expression
                );
                tracing::error!("{}", message);
                ctx.outcome.error(message);
            }
        }
    }

    fn assign(
        &self,
        binding: &DynamicValue,
        values: Vec<Value>,
        node: &mut RequestAction,
        resource: Option<&mut Value>,
    ) -> Result<()> {
        let Some(path) = binding.path.as_deref() else {
            return Ok(());
        };
        let Some(value) = values.into_iter().next() else {
            tracing::debug!("Dynamic value for {} returned no result", path);
            return Ok(());
        };

        match (path.strip_prefix(ACTION_PREFIX), resource) {
            (None, Some(resource)) => self.value_setter.set_value(resource, path, value),
            (stripped, _) => self.set_on_node(node, stripped.unwrap_or(path), value),
        }
    }

    fn set_on_node(&self, node: &mut RequestAction, path: &str, value: Value) -> Result<()> {
        let mut document = serde_json::to_value(&*node)?;
        self.value_setter.set_value(&mut document, path, value)?;
        *node = serde_json::from_value(document)
            .map_err(|e| PlanApplyError::invalid_path(path.to_string(), e.to_string()))?;
        Ok(())
    }
}
