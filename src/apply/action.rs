use crate::context::EvaluationContext;
use crate::error::Result;
use crate::model::{PlanAction, RequestAction};

use super::{PlanDefinitionProcessor, PlanFrame};

impl PlanDefinitionProcessor {
    /// Resolves one action and its subtree into a request node.
    ///
    /// `Ok(None)` means a condition did not pass and the whole subtree is
    /// left out. Structural failures of the action, or of one of its
    /// descendants' definitions, come back as `Err`. A child that fails this
    /// way is logged and skipped by its parent while its siblings still
    /// resolve.
    pub fn resolve_action(
        &self,
        frame: &mut PlanFrame<'_>,
        ctx: &mut EvaluationContext,
        action: &PlanAction,
    ) -> Result<Option<RequestAction>> {
        self.generate_items(frame, ctx, action);

        if !self.meets_conditions(frame, ctx, action) {
            tracing::debug!("Action {} skipped, conditions not met", action.id_or_default());
            return Ok(None);
        }

        if let Some(id) = &action.id {
            frame.met_actions.push(id.clone());
        }
        let mut node = RequestAction::from_plan_action(action, |url| !self.config.is_excluded(url));

        for child in &action.action {
            match self.resolve_action(frame, ctx, child) {
                Ok(Some(child_node)) => node.action.push(child_node),
                Ok(None) => {}
                Err(e) => self.log_action_failure(ctx, child.id_or_default(), &e),
            }
        }

        let mut resource = match action.definition_reference() {
            Some(reference) => self.resolve_definition(frame, ctx, action, reference)?,
            None => None,
        };

        self.apply_dynamic_values(frame, ctx, action, &mut node, resource.as_mut());

        if let Some(resource) = resource {
            node.resource = Some(self.attach_resource(frame, ctx, resource));
        }

        Ok(Some(node))
    }

    /// Appends one Questionnaire item per profiled input when the plan asks
    /// for a generated questionnaire. Runs before the conditions are checked.
    fn generate_items(&self, frame: &PlanFrame<'_>, ctx: &mut EvaluationContext, action: &PlanAction) {
        if !frame
            .plan
            .has_extension(crate::constants::CPG_QUESTIONNAIRE_GENERATE)
        {
            return;
        }

        for input in action.input.iter().filter(|i| !i.profile.is_empty()) {
            let Some(generator) = &self.item_generator else {
                let message = format!(
                    "Questionnaire item for {} not generated: no item generator is configured",
                    input.profile[0]
                );
                tracing::warn!("{}", message);
                ctx.outcome.warning(message);
                return;
            };
            match generator.generate_item(input, ctx.questionnaire_items.len()) {
                Ok(item) => ctx.questionnaire_items.push(item),
                Err(e) => {
                    let message = format!(
                        "Error encountered generating Questionnaire item for {}: {e}",
                        input.profile[0]
                    );
                    tracing::error!("{}", message);
                    ctx.outcome.error(message);
                }
            }
        }
    }
}
