//! The PlanDefinition `$apply` engine.
//!
//! [`PlanDefinitionProcessor::apply`] walks a plan's action tree depth first,
//! gates every action on its conditions, resolves action definitions (nested
//! plans, activity templates, questionnaires) and produces a [`RequestGroup`]
//! plus the resources it refers to.
//!
//! Failures come in two tiers. Structural ones (`PlanApplyError::is_structural`)
//! propagate out of [`PlanDefinitionProcessor::resolve_action`]; everything
//! raised by a collaborator is caught where it happens and written to the
//! [`OutcomeLog`] carried by the result.
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
//! .build()?;
//!
//! let request = ApplyRequest::new(
//!     PlanSource::Canonical("http://example.org/PlanDefinition/diabetes".to_string()),
//!     "Patient/123",
//! );
//! let result = processor.apply(request)?;
//! let care_plan = result.to_care_plan()?;
//! # Ok(())
//! # }
//! ```

pub mod action;
pub mod care_plan;
pub mod condition;
pub mod definition;
pub mod dynamic;
pub mod goal;
pub mod package;
pub mod prepopulate;
pub mod task;

pub use definition::DefinitionKind;
pub use prepopulate::split_operation_url;

use serde_json::{Value, json};
use std::sync::Arc;

use crate::config::ApplyConfig;
use crate::context::{ApplyRequest, EvaluationContext, PlanSource};
use crate::error::{PlanApplyError, Result};
use crate::model::{PlanDefinition, Reference, RequestGroup, resource_id, resource_type};
use crate::outcome::OutcomeLog;
use crate::provider::{
    ActivityApplier, BasicActivityApplier, CanonicalResolver, ExpressionEvaluator, JsonPathSetter,
    QuestionnaireItemGenerator, QuestionnairePackageClient, QuestionnairePrePopulator,
    QuestionnaireResponseExtractor, ValueSetter,
};

/// Resolution state of one plan: the request group under construction and
/// the ids of actions whose conditions passed so far.
#[derive(Debug)]
pub struct PlanFrame<'p> {
    pub plan: &'p PlanDefinition,
    pub group: RequestGroup,
    pub met_actions: Vec<String>,
}

impl<'p> PlanFrame<'p> {
    pub fn default_library(&self) -> Option<&'p str> {
        self.plan.primary_library()
    }

    /// Value of `basedOn` for resources produced under this plan.
    pub fn group_reference(&self) -> Reference {
        self.group.reference()
    }
}

/// Everything produced by one `$apply` call.
#[derive(Debug, Clone)]
pub struct ApplyResult {
    pub request_group: RequestGroup,
    /// Resolved resources that are not embedded in the request group.
    pub request_resources: Vec<Value>,
    /// QuestionnaireResponses found in the data and the resources extracted from them.
    pub extracted_resources: Vec<Value>,
    /// Items generated from profiled action inputs.
    pub questionnaire_items: Vec<Value>,
    pub outcome: OutcomeLog,
    pub contain_resources: bool,
}

impl ApplyResult {
    pub fn plan_id(&self) -> &str {
        &self.request_group.id
    }

    /// The generated Questionnaire, when at least one item was generated.
    pub fn questionnaire(&self) -> Option<Value> {
        if self.questionnaire_items.is_empty() {
            return None;
        }
        Some(json!({
            "resourceType": "Questionnaire",
            "id": format!("{}-questionnaire", self.plan_id()),
            "status": "draft",
            "item": self.questionnaire_items,
        }))
    }

    pub fn operation_outcome(&self) -> Option<Value> {
        if self.outcome.is_empty() {
            return None;
        }
        Some(
            self.outcome
                .to_operation_outcome(&format!("apply-outcome-{}", self.plan_id())),
        )
    }

    /// Collection Bundle with the request group followed by every resource
    /// the call produced.
    pub fn to_bundle(&self) -> Result<Value> {
        let mut entries = vec![self.request_group.to_resource()?];
        entries.extend(self.request_resources.iter().cloned());
        entries.extend(self.extracted_resources.iter().cloned());
        entries.extend(self.questionnaire());
        entries.extend(self.operation_outcome());

        Ok(json!({
            "resourceType": "Bundle",
            "id": self.plan_id(),
            "type": "collection",
            "entry": entries
                .into_iter()
                .map(|resource| json!({ "resource": resource }))
                .collect::<Vec<_>>(),
        }))
    }
}

/// Applies PlanDefinitions. Holds only collaborators and configuration, so
/// one processor can serve many calls, from many threads.
pub struct PlanDefinitionProcessor {
    repository: Arc<dyn CanonicalResolver>,
    evaluator: Arc<dyn ExpressionEvaluator>,
    activity_applier: Arc<dyn ActivityApplier>,
    value_setter: Arc<dyn ValueSetter>,
    item_generator: Option<Arc<dyn QuestionnaireItemGenerator>>,
    prepopulator: Option<Arc<dyn QuestionnairePrePopulator>>,
    extractor: Option<Arc<dyn QuestionnaireResponseExtractor>>,
    package_client: Option<Arc<dyn QuestionnairePackageClient>>,
    config: ApplyConfig,
}

impl PlanDefinitionProcessor {
    pub fn builder(
        repository: Arc<dyn CanonicalResolver>,
        evaluator: Arc<dyn ExpressionEvaluator>,
    ) -> PlanDefinitionProcessorBuilder {
        PlanDefinitionProcessorBuilder::new(repository, evaluator)
    }

    pub fn config(&self) -> &ApplyConfig {
        &self.config
    }

    /// Applies a plan for one subject.
    ///
    /// Returns `Err` only when the plan itself cannot be loaded; every other
    /// failure is reported through [`ApplyResult::outcome`].
    pub fn apply(&self, request: ApplyRequest) -> Result<ApplyResult> {
        let plan = self.load_plan(&request.plan)?;
        let mut ctx = EvaluationContext::from_request(&request, self.config.contain_resources);

        tracing::info!(
            "Applying PlanDefinition {} for {}",
            plan.identity(),
            ctx.subject
        );

        self.extract_responses(&mut ctx);

        ctx.enter_plan(plan.identity());
        let group = self.resolve_plan(&plan, &mut ctx);
        ctx.exit_plan();
        let group = group?;

        if !ctx.outcome.is_empty() {
            tracing::info!(
                "PlanDefinition {} applied with {} issue(s)",
                plan.identity(),
                ctx.outcome.len()
            );
        }

        Ok(ApplyResult {
            request_group: group,
            request_resources: ctx.request_resources,
            extracted_resources: ctx.extracted_resources,
            questionnaire_items: ctx.questionnaire_items,
            outcome: ctx.outcome,
            contain_resources: ctx.contain_resources,
        })
    }

    pub fn load_plan(&self, source: &PlanSource) -> Result<PlanDefinition> {
        let resource = match source {
            PlanSource::Resource(plan) => return Ok(plan.as_ref().clone()),
            PlanSource::Canonical(canonical) => self.repository.search_by_canonical(canonical)?,
            PlanSource::Id(id) => self.repository.read("PlanDefinition", id)?,
        };
        let reference = match source {
            PlanSource::Canonical(reference) | PlanSource::Id(reference) => reference.as_str(),
            PlanSource::Resource(_) => "",
        };
        let resource = resource.ok_or_else(|| PlanApplyError::plan_not_found(reference))?;
        PlanDefinition::from_resource(resource)
    }

    /// Starts a frame for `plan`: the request group header is filled in from
    /// the plan and the caller context.
    pub fn plan_frame<'p>(&self, plan: &'p PlanDefinition, ctx: &EvaluationContext) -> PlanFrame<'p> {
        let mut group = RequestGroup::new(plan.id_part());
        group.instantiates_canonical.extend(plan.canonical());
        group.subject = Some(Reference::new(ctx.subject.clone()));
        group.encounter = ctx.encounter.clone().map(Reference::new);
        group.author = ctx
            .organization
            .clone()
            .or_else(|| ctx.practitioner.clone())
            .map(Reference::new);
        group.language = ctx
            .user_language
            .as_ref()
            .and_then(|l| l.pointer("/coding/0/code"))
            .and_then(|c| c.as_str())
            .map(str::to_string);
        group.extension = plan
            .extension
            .iter()
            .filter(|e| !self.config.is_excluded(&e.url))
            .cloned()
            .collect();

        PlanFrame {
            plan,
            group,
            met_actions: Vec::new(),
        }
    }

    /// Builds the request group for `plan`. Top-level actions that fail
    /// structurally are logged and left out; their siblings still resolve.
    fn resolve_plan(&self, plan: &PlanDefinition, ctx: &mut EvaluationContext) -> Result<RequestGroup> {
        let mut frame = self.plan_frame(plan, ctx);
        self.resolve_goals(&mut frame, ctx)?;

        for action in &plan.action {
            match self.resolve_action(&mut frame, ctx, action) {
                Ok(Some(node)) => frame.group.action.push(node),
                Ok(None) => {}
                Err(e) => self.log_action_failure(ctx, action.id_or_default(), &e),
            }
        }

        Ok(frame.group)
    }

    fn log_action_failure(&self, ctx: &mut EvaluationContext, action_id: &str, error: &PlanApplyError) {
        let message = format!("Action {action_id} could not be resolved: {error}");
        tracing::error!("{}", message);
        ctx.outcome.error(message);
    }

    /// Runs every QuestionnaireResponse in the data through the extractor.
    fn extract_responses(&self, ctx: &mut EvaluationContext) {
        let Some(extractor) = &self.extractor else {
            return;
        };
        let responses: Vec<Value> = ctx
            .data_of_type("QuestionnaireResponse")
            .into_iter()
            .cloned()
            .collect();

        for response in responses {
            let id = resource_id(&response).unwrap_or("").to_string();
            match extractor.extract(&response, ctx.parameters.as_ref(), ctx.data.as_ref()) {
                Ok(bundle) => {
                    ctx.extracted_resources.push(response);
                    let extracted = bundle
                        .get("entry")
                        .and_then(|e| e.as_array())
                        .map(|entries| {
                            entries
                                .iter()
                                .filter_map(|entry| entry.get("resource").cloned())
                                .collect::<Vec<_>>()
                        })
                        .unwrap_or_default();
                    tracing::debug!(
                        "Extracted {} resource(s) from QuestionnaireResponse {}",
                        extracted.len(),
                        id
                    );
                    for resource in extracted {
                        ctx.add_to_data(resource);
                    }
                }
                Err(e) => {
                    let message = format!("Error encountered extracting {id}: {e}");
                    tracing::error!("{}", message);
                    ctx.outcome.error(message);
                }
            }
        }
    }

    /// Embeds `resource` in the frame's request group or returns it flat,
    /// and gives back the reference the request node should carry.
    pub(crate) fn attach_resource(
        &self,
        frame: &mut PlanFrame<'_>,
        ctx: &mut EvaluationContext,
        resource: Value,
    ) -> Reference {
        let id = resource_id(&resource).unwrap_or("").to_string();
        let reference = if ctx.contain_resources {
            Reference::contained(&id)
        } else {
            Reference::new(format!("{}/{}", resource_type(&resource).unwrap_or("Resource"), id))
        };
        if ctx.contain_resources {
            frame.group.contained.push(resource);
        } else {
            ctx.request_resources.push(resource);
        }
        reference
    }
}

impl std::fmt::Debug for PlanDefinitionProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlanDefinitionProcessor")
            .field("config", &self.config)
            .field("item_generator", &self.item_generator.is_some())
            .field("prepopulator", &self.prepopulator.is_some())
            .field("extractor", &self.extractor.is_some())
            .field("package_client", &self.package_client.is_some())
            .finish_non_exhaustive()
    }
}

pub struct PlanDefinitionProcessorBuilder {
    repository: Arc<dyn CanonicalResolver>,
    evaluator: Arc<dyn ExpressionEvaluator>,
    activity_applier: Option<Arc<dyn ActivityApplier>>,
    value_setter: Option<Arc<dyn ValueSetter>>,
    item_generator: Option<Arc<dyn QuestionnaireItemGenerator>>,
    prepopulator: Option<Arc<dyn QuestionnairePrePopulator>>,
    extractor: Option<Arc<dyn QuestionnaireResponseExtractor>>,
    package_client: Option<Arc<dyn QuestionnairePackageClient>>,
    config: ApplyConfig,
}

impl PlanDefinitionProcessorBuilder {
    pub fn new(
        repository: Arc<dyn CanonicalResolver>,
        evaluator: Arc<dyn ExpressionEvaluator>,
    ) -> Self {
        Self {
            repository,
            evaluator,
            activity_applier: None,
            value_setter: None,
            item_generator: None,
            prepopulator: None,
            extractor: None,
            package_client: None,
            config: ApplyConfig::default(),
        }
    }

    pub fn with_activity_applier(mut self, applier: Arc<dyn ActivityApplier>) -> Self {
        self.activity_applier = Some(applier);
        self
    }

    pub fn with_value_setter(mut self, setter: Arc<dyn ValueSetter>) -> Self {
        self.value_setter = Some(setter);
        self
    }

    pub fn with_item_generator(mut self, generator: Arc<dyn QuestionnaireItemGenerator>) -> Self {
        self.item_generator = Some(generator);
        self
    }

    pub fn with_prepopulator(mut self, prepopulator: Arc<dyn QuestionnairePrePopulator>) -> Self {
        self.prepopulator = Some(prepopulator);
        self
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn QuestionnaireResponseExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn with_package_client(mut self, client: Arc<dyn QuestionnairePackageClient>) -> Self {
        self.package_client = Some(client);
        self
    }

    pub fn with_config(mut self, config: ApplyConfig) -> Self {
        self.config = config;
        self
    }

    /// Missing collaborators fall back to the in-process defaults; with the
    /// `http-client` feature the package client defaults to HTTP.
    pub fn build(self) -> Result<PlanDefinitionProcessor> {
        #[cfg(feature = "http-client")]
        let package_client = match self.package_client {
            Some(client) => Some(client),
            None => Some(Arc::new(crate::provider::HttpPackageClient::new(
                self.config.http_timeout,
            )?) as Arc<dyn QuestionnairePackageClient>),
        };
        #[cfg(not(feature = "http-client"))]
        let package_client = self.package_client;

        Ok(PlanDefinitionProcessor {
            repository: self.repository,
            evaluator: self.evaluator,
            activity_applier: self
                .activity_applier
                .unwrap_or_else(|| Arc::new(BasicActivityApplier::new())),
            value_setter: self
                .value_setter
                .unwrap_or_else(|| Arc::new(JsonPathSetter::new())),
            item_generator: self.item_generator,
            prepopulator: self.prepopulator,
            extractor: self.extractor,
            package_client,
            config: self.config,
        })
    }
}
