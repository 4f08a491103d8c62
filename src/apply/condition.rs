use serde_json::Value;

use crate::context::EvaluationContext;
use crate::model::{ActionCondition, PlanAction};
use crate::provider::CqfExpression;

use super::{PlanDefinitionProcessor, PlanFrame};

impl PlanDefinitionProcessor {
    /// All conditions of `action` must pass. No conditions passes.
    pub(crate) fn meets_conditions(
        &self,
        frame: &PlanFrame<'_>,
        ctx: &mut EvaluationContext,
        action: &PlanAction,
    ) -> bool {
        if action.condition.is_empty() {
            return true;
        }
        let parameters = ctx.input_parameters(&action.input);
        action.condition.iter().all(|condition| {
            self.evaluate_condition(ctx, condition, frame.default_library(), parameters.as_ref())
        })
    }

    /// Evaluates one condition.
    ///
    /// An empty result fails the condition. A result that is not a boolean
    /// passes it, with a warning. An evaluator error is written to the
    /// outcome log and fails the condition.
    pub fn evaluate_condition(
        &self,
        ctx: &mut EvaluationContext,
        condition: &ActionCondition,
        default_library: Option<&str>,
        parameters: Option<&Value>,
    ) -> bool {
        let Some(expression) = condition
            .expression
            .as_ref()
            .and_then(|e| CqfExpression::from_expression(e, default_library))
        else {
            return true;
        };

        let first = match self.evaluator.evaluate(
            &ctx.subject,
            &expression,
            parameters,
            ctx.data.as_ref(),
        ) {
            Ok(values) => values.into_iter().next(),
            Err(e) => {
                let message = format!(
                    "Condition expression {} encountered exception: {e}",
                    expression.expression
                );
                tracing::error!("{}", message);
                ctx.outcome.error(message);
                return false;
            }
        };

        match first {
            None | Some(Value::Null) => {
                tracing::warn!("Condition expression {} returned null", expression.expression);
                false
            }
            Some(Value::Bool(result)) => {
                tracing::debug!(
                    "The result of condition expression {} is {}",
                    expression.expression,
                    result
                );
                result
            }
            Some(other) => {
                tracing::warn!(
                    "The condition expression {} returned a non-boolean value: {}",
                    expression.expression,
                    other
                );
                true
            }
        }
    }
}
