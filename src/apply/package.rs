use serde_json::{Value, json};

use crate::context::PlanSource;
use crate::error::Result;
use crate::model::{PlanDefinition, resource_id, resource_type};

use super::PlanDefinitionProcessor;

const PACKAGED_ARTIFACTS: [&str; 2] = ["depends-on", "composed-of"];

/// Transaction entry creating or updating `resource`.
pub fn transaction_entry(resource: Value, is_put: bool) -> Value {
    let kind = resource_type(&resource).unwrap_or("Resource").to_string();
    let request = match resource_id(&resource) {
        Some(id) if is_put => json!({"method": "PUT", "url": format!("{kind}/{id}")}),
        _ => json!({"method": "POST", "url": kind}),
    };
    json!({ "resource": resource, "request": request })
}

impl PlanDefinitionProcessor {
    /// Bundles a plan with its primary library and every `depends-on` or
    /// `composed-of` artifact the repository can resolve, as a transaction.
    pub fn package(&self, source: &PlanSource, is_put: bool) -> Result<Value> {
        let plan = self.load_plan(source)?;
        let mut resources = vec![plan.to_resource()?];

        let mut canonicals: Vec<&str> = plan.primary_library().into_iter().collect();
        canonicals.extend(artifact_canonicals(&plan));

        for canonical in canonicals {
            match self.repository.search_by_canonical(canonical)? {
                Some(resource) => {
                    let duplicate = resources.iter().any(|r| {
                        resource_type(r) == resource_type(&resource)
                            && resource_id(r) == resource_id(&resource)
                    });
                    if !duplicate {
                        resources.push(resource);
                    }
                }
                None => tracing::warn!("Packaged artifact {} could not be resolved", canonical),
            }
        }

        tracing::info!(
            "Packaged PlanDefinition {} with {} resource(s)",
            plan.identity(),
            resources.len()
        );

        Ok(json!({
            "resourceType": "Bundle",
            "type": "transaction",
            "entry": resources
                .into_iter()
                .map(|r| transaction_entry(r, is_put))
                .collect::<Vec<_>>(),
        }))
    }
}

fn artifact_canonicals(plan: &PlanDefinition) -> impl Iterator<Item = &str> {
    plan.related_artifact
        .iter()
        .filter(|a| PACKAGED_ARTIFACTS.contains(&a.type_name.as_str()))
        .filter_map(|a| a.resource.as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{InMemoryRepository, LiteralExpressionEvaluator};
    use std::sync::Arc;

    fn repository() -> InMemoryRepository {
        InMemoryRepository::from_resources([
            json!({
                "resourceType": "PlanDefinition",
                "id": "diabetes",
                "url": "http://example.org/PlanDefinition/diabetes",
                "library": ["http://example.org/Library/diabetes"],
                "relatedArtifact": [
                    {"type": "depends-on", "resource": "http://example.org/Library/diabetes"},
                    {"type": "composed-of", "resource": "http://example.org/ActivityDefinition/order"},
                    {"type": "documentation", "resource": "http://example.org/Library/docs"},
                    {"type": "depends-on", "resource": "http://example.org/ValueSet/missing"}
                ]
            }),
            json!({"resourceType": "Library", "id": "diabetes", "url": "http://example.org/Library/diabetes"}),
            json!({"resourceType": "Library", "id": "docs", "url": "http://example.org/Library/docs"}),
            json!({"resourceType": "ActivityDefinition", "id": "order", "url": "http://example.org/ActivityDefinition/order"}),
        ])
    }

    #[test]
    fn test_package_collects_dependencies() {
        let processor = PlanDefinitionProcessor::builder(
            Arc::new(repository()),
            Arc::new(LiteralExpressionEvaluator::new()),
        )
        .build()
        .unwrap();

        let source = PlanSource::Canonical("http://example.org/PlanDefinition/diabetes".to_string());
        let bundle = processor.package(&source, true).unwrap();
        let entries = bundle["entry"].as_array().unwrap();

        assert_eq!(bundle["type"], "transaction");
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0]["request"]["url"], "PlanDefinition/diabetes");
        assert_eq!(entries[0]["request"]["method"], "PUT");
        assert_eq!(entries[1]["resource"]["resourceType"], "Library");
        assert_eq!(entries[2]["resource"]["resourceType"], "ActivityDefinition");
    }

    #[test]
    fn test_post_entries() {
        let entry = transaction_entry(json!({"resourceType": "Library", "id": "l"}), false);
        assert_eq!(entry["request"]["method"], "POST");
        assert_eq!(entry["request"]["url"], "Library");
    }
}
