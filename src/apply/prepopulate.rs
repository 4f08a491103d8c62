use serde_json::{Value, json};

use crate::constants::{
    SDC_QUESTIONNAIRE_LOOKUP_QUESTIONNAIRE, SDC_QUESTIONNAIRE_PREPOPULATE,
    SDC_QUESTIONNAIRE_PREPOPULATE_PARAMETER,
};
use crate::context::{EvaluationContext, parameter_text};
use crate::error::{PlanApplyError, Result};
use crate::model::{Extension, PlanAction, Reference, resource_id, resource_type};

use super::{PlanDefinitionProcessor, PlanFrame};

const SUPPORT_TYPES: [&str; 3] = ["Library", "ValueSet", "CodeSystem"];

/// Splits `http://host/fhir$operation` into base URL and operation name.
/// Without a `$` the whole text is the base URL and `default_operation` is used.
pub fn split_operation_url<'a>(url: &'a str, default_operation: &'a str) -> (&'a str, &'a str) {
    match url.split_once('$') {
        Some((base, operation)) if !operation.is_empty() => (base.trim_end_matches('/'), operation),
        Some((base, _)) => (base.trim_end_matches('/'), default_operation),
        None => (url.trim_end_matches('/'), default_operation),
    }
}

/// Where the questionnaire package of a pre-population directive comes from.
enum PackageSource<'a> {
    Canonical(&'a str),
    Operation(&'a str),
}

fn package_source(directive: &Extension) -> Result<PackageSource<'_>> {
    let lookup = directive
        .extension_by_url(SDC_QUESTIONNAIRE_LOOKUP_QUESTIONNAIRE)
        .ok_or_else(|| PlanApplyError::missing_extension(SDC_QUESTIONNAIRE_LOOKUP_QUESTIONNAIRE))?;
    match lookup.value_entry() {
        Some(("valueCanonical" | "valueUri", Value::String(canonical))) => {
            Ok(PackageSource::Canonical(canonical))
        }
        Some(("valueString" | "valueUrl", Value::String(url))) => Ok(PackageSource::Operation(url)),
        _ => Err(PlanApplyError::missing_extension(
            SDC_QUESTIONNAIRE_LOOKUP_QUESTIONNAIRE,
        )),
    }
}

fn bundle_resources(bundle: &Value) -> Vec<&Value> {
    bundle
        .get("entry")
        .and_then(|e| e.as_array())
        .map(|entries| entries.iter().filter_map(|e| e.get("resource")).collect())
        .unwrap_or_default()
}

impl PlanDefinitionProcessor {
    /// Runs the pre-population directive of `action`, if any, and points the
    /// task's `focus` at the populated questionnaire.
    ///
    /// A directive without its parameter name, or naming a parameter the
    /// caller did not pass, is a structural failure. Package and
    /// pre-population failures are logged and leave the task unfocused.
    pub(crate) fn prepopulate_task(
        &self,
        frame: &mut PlanFrame<'_>,
        ctx: &mut EvaluationContext,
        task: &mut Value,
        action: &PlanAction,
    ) -> Result<()> {
        let Some(directive) = action.extension_by_url(SDC_QUESTIONNAIRE_PREPOPULATE) else {
            return Ok(());
        };

        let parameter_name = directive
            .extension_by_url(SDC_QUESTIONNAIRE_PREPOPULATE_PARAMETER)
            .and_then(Extension::value_str)
            .ok_or_else(|| {
                PlanApplyError::missing_extension(SDC_QUESTIONNAIRE_PREPOPULATE_PARAMETER)
            })?;
        let order = ctx
            .parameter(parameter_name)
            .and_then(parameter_text)
            .ok_or_else(|| PlanApplyError::missing_parameter(parameter_name))?;
        let source = package_source(directive)?;

        let package = match self.questionnaire_package(ctx, &source, &order) {
            Ok(Some(package)) => package,
            Ok(None) => {
                let message = format!(
                    "Questionnaire package for action {} was empty",
                    action.id_or_default()
                );
                tracing::warn!("{}", message);
                ctx.outcome.warning(message);
                return Ok(());
            }
            Err(e) => {
                let message = format!(
                    "Error encountered retrieving the Questionnaire package for action {}: {e}",
                    action.id_or_default()
                );
                tracing::warn!("{}", message);
                ctx.outcome.warning(message);
                return Ok(());
            }
        };

        let populated = match self.prepopulate_package(ctx, &package) {
            Ok(populated) => populated,
            Err(e) => {
                let message = format!(
                    "Error encountered pre-populating the Questionnaire for action {}: {e}",
                    action.id_or_default()
                );
                tracing::error!("{}", message);
                ctx.outcome.error(message);
                return Ok(());
            }
        };

        let id = resource_id(&populated).unwrap_or("").to_string();
        let focus = if ctx.contain_resources {
            Reference::contained(&id)
        } else {
            Reference::new(format!("Questionnaire/{id}"))
        };
        self.attach_resource(frame, ctx, populated);

        if let Some(object) = task.as_object_mut() {
            object.insert("focus".to_string(), focus.to_value());
        }
        Ok(())
    }

    /// The package bundle, or `None` when nothing usable came back.
    fn questionnaire_package(
        &self,
        ctx: &EvaluationContext,
        source: &PackageSource<'_>,
        order: &str,
    ) -> Result<Option<Value>> {
        let package = match source {
            PackageSource::Canonical(canonical) => {
                self.repository
                    .search_by_canonical(canonical)?
                    .map(|resource| match resource_type(&resource) {
                        Some("Bundle") => resource,
                        _ => json!({
                            "resourceType": "Bundle",
                            "type": "collection",
                            "entry": [{ "resource": resource }],
                        }),
                    })
            }
            PackageSource::Operation(url) => {
                let client = self
                    .package_client
                    .as_ref()
                    .ok_or(PlanApplyError::MissingCollaborator("questionnaire package client"))?;
                let (base, operation) = split_operation_url(url, &self.config.package_operation);

                let mut parameters = vec![json!({
                    "name": "order",
                    "valueReference": { "reference": order },
                })];
                if let Some(coverage) = ctx.parameter("coverage").and_then(parameter_text) {
                    parameters.push(json!({
                        "name": "coverage",
                        "valueReference": { "reference": coverage },
                    }));
                }
                let body = json!({"resourceType": "Parameters", "parameter": parameters});

                tracing::debug!("Requesting ${} from {} for {}", operation, base, order);
                Some(client.fetch_package(base, operation, &body)?)
            }
        };

        Ok(package.filter(|bundle| {
            bundle_resources(bundle)
                .iter()
                .any(|r| resource_type(r) == Some("Questionnaire"))
        }))
    }

    /// Pre-populates the package's questionnaire against a copy of the data
    /// extended with the package's libraries and terminology.
    fn prepopulate_package(&self, ctx: &EvaluationContext, package: &Value) -> Result<Value> {
        let prepopulator = self
            .prepopulator
            .as_ref()
            .ok_or(PlanApplyError::MissingCollaborator("questionnaire pre-populator"))?;

        let resources = bundle_resources(package);
        let questionnaire = resources
            .iter()
            .find(|r| resource_type(r) == Some("Questionnaire"))
            .ok_or_else(|| PlanApplyError::package("package holds no Questionnaire"))?;

        let mut support = ctx
            .data
            .clone()
            .unwrap_or_else(|| json!({"resourceType": "Bundle", "type": "collection"}));
        if let Some(object) = support.as_object_mut() {
            let entries = object.entry("entry").or_insert_with(|| json!([]));
            if let Some(entries) = entries.as_array_mut() {
                entries.extend(
                    resources
                        .iter()
                        .filter(|r| resource_type(r).is_some_and(|t| SUPPORT_TYPES.contains(&t)))
                        .map(|r| json!({ "resource": r })),
                );
            }
        }

        prepopulator.pre_populate(questionnaire, &ctx.subject, ctx.parameters.as_ref(), &support)
    }
}
