//! Containment flattening.
//!
//! Resources produced by `$apply` may embed other resources at any depth
//! (a CarePlan contains a RequestGroup which contains a nested RequestGroup
//! which contains Tasks). FHIR only allows one level of `contained`, so the
//! tree is rewritten into a single container owned by the root.
//!
//! Children are collected bottom-up. A child without an id gets a generated
//! one. When two different resources claim the same id the first one keeps
//! it, the later one is renamed `<id>-<n>` and every `#id` reference in its
//! former container is rewritten. Identical duplicates are kept once.

use serde_json::{Value, json};

use crate::model::resource_id;
use crate::outcome::OutcomeLog;

/// Moves every resource embedded below `root` into `root.contained`.
pub fn flatten_contained(root: &mut Value, log: &mut OutcomeLog) {
    let mut flat = Vec::new();
    collect(root, &mut flat, log);
    if !flat.is_empty()
        && let Some(object) = root.as_object_mut()
    {
        object.insert("contained".to_string(), Value::Array(flat));
    }
}

/// Number of resources embedded below `resource`, at any depth.
pub fn embedded_count(resource: &Value) -> usize {
    resource
        .get("contained")
        .and_then(|c| c.as_array())
        .map(|children| children.iter().map(|c| 1 + embedded_count(c)).sum())
        .unwrap_or(0)
}

fn collect(container: &mut Value, flat: &mut Vec<Value>, log: &mut OutcomeLog) {
    let children = match container.as_object_mut().and_then(|o| o.remove("contained")) {
        Some(Value::Array(children)) => children,
        _ => return,
    };

    let mut renames: Vec<(String, String)> = Vec::new();

    for mut child in children {
        if !child.is_object() {
            continue;
        }
        collect(&mut child, flat, log);

        let id = match resource_id(&child) {
            Some(id) => id.trim_start_matches('#').to_string(),
            None => {
                let id = uuid::Uuid::new_v4().to_string();
                child["id"] = json!(id);
                id
            }
        };

        match flat.iter().position(|r| resource_id(r) == Some(id.as_str())) {
            None => {
                child["id"] = json!(id);
                flat.push(child);
            }
            Some(existing) if flat[existing] == child => {
                tracing::debug!("Dropping duplicate contained resource {}", id);
            }
            Some(_) => {
                let renamed = unique_id(&id, flat);
                let message = format!("Contained resource id {id} is already in use, renamed to {renamed}");
                tracing::warn!("{}", message);
                log.warning(message);

                child["id"] = json!(renamed);
                renames.push((format!("#{id}"), format!("#{renamed}")));
                flat.push(child);
            }
        }
    }

    // Only the container refers to its direct children; references held by
    // the children point at their own former children.
    if !renames.is_empty() {
        rewrite_references(container, &renames);
    }
}

fn unique_id(id: &str, flat: &[Value]) -> String {
    (1..)
        .map(|n| format!("{id}-{n}"))
        .find(|candidate| !flat.iter().any(|r| resource_id(r) == Some(candidate.as_str())))
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

/// Rewrites `reference` fields equal to a renamed fragment, at any depth.
fn rewrite_references(value: &mut Value, renames: &[(String, String)]) {
    match value {
        Value::Object(object) => {
            for (key, field) in object.iter_mut() {
                if key == "reference"
                    && let Value::String(reference) = field
                    && let Some((_, new)) = renames.iter().find(|(old, _)| old.as_str() == reference.as_str())
                {
                    *reference = new.clone();
                } else {
                    rewrite_references(field, renames);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                rewrite_references(item, renames);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_resources_move_to_root() {
        let mut care_plan = json!({
            "resourceType": "CarePlan",
            "activity": [{"reference": {"reference": "#rg"}}],
            "contained": [{
                "resourceType": "RequestGroup",
                "id": "rg",
                "action": [{"resource": {"reference": "#task"}}],
                "contained": [{"resourceType": "Task", "id": "task"}]
            }]
        });
        let mut log = OutcomeLog::new();
        flatten_contained(&mut care_plan, &mut log);

        let contained = care_plan["contained"].as_array().unwrap();
        assert_eq!(contained.len(), 2);
        assert_eq!(contained[0]["id"], "task");
        assert_eq!(contained[1]["id"], "rg");
        assert!(contained[1].get("contained").is_none());
        assert!(log.is_empty());
    }

    #[test]
    fn test_collision_renames_and_rewrites() {
        let mut root = json!({
            "resourceType": "CarePlan",
            "contained": [
                {
                    "resourceType": "RequestGroup",
                    "id": "a",
                    "action": [{"resource": {"reference": "#task"}}],
                    "contained": [{"resourceType": "Task", "id": "task", "code": {"text": "first"}}]
                },
                {
                    "resourceType": "RequestGroup",
                    "id": "b",
                    "action": [{"resource": {"reference": "#task"}}],
                    "contained": [{"resourceType": "Task", "id": "task", "code": {"text": "second"}}]
                }
            ]
        });
        let mut log = OutcomeLog::new();
        flatten_contained(&mut root, &mut log);

        let contained = root["contained"].as_array().unwrap();
        assert_eq!(contained.len(), 4);
        let b = contained.iter().find(|r| r["id"] == "b").unwrap();
        assert_eq!(b["action"][0]["resource"]["reference"], "#task-1");
        let a = contained.iter().find(|r| r["id"] == "a").unwrap();
        assert_eq!(a["action"][0]["resource"]["reference"], "#task");
        assert_eq!(log.len(), 1);
        assert_eq!(log.mentions("task-1"), 1);
    }

    #[test]
    fn test_sibling_references_survive_rename_at_outer_level() {
        let mut root = json!({
            "resourceType": "RequestGroup",
            "id": "outer",
            "action": [
                {"resource": {"reference": "#inner"}},
                {"resource": {"reference": "#1"}}
            ],
            "contained": [
                {
                    "resourceType": "RequestGroup",
                    "id": "inner",
                    "action": [{"resource": {"reference": "#1"}}],
                    "contained": [{"resourceType": "Task", "id": "1", "code": {"text": "inner"}}]
                },
                {"resourceType": "Task", "id": "1", "code": {"text": "outer"}}
            ]
        });
        let mut log = OutcomeLog::new();
        flatten_contained(&mut root, &mut log);

        let contained = root["contained"].as_array().unwrap();
        let target = |reference: &Value| {
            let id = reference.as_str().unwrap().trim_start_matches('#');
            contained.iter().find(|r| r["id"] == id).unwrap()["code"]["text"].clone()
        };
        let inner = contained.iter().find(|r| r["id"] == "inner").unwrap();
        assert_eq!(target(&inner["action"][0]["resource"]["reference"]), "inner");
        assert_eq!(target(&root["action"][1]["resource"]["reference"]), "outer");
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_identical_duplicates_are_kept_once() {
        let goal = json!({"resourceType": "Goal", "id": "g1"});
        let mut root = json!({
            "resourceType": "CarePlan",
            "contained": [
                {"resourceType": "RequestGroup", "id": "rg", "contained": [goal.clone()]},
                goal
            ]
        });
        let mut log = OutcomeLog::new();
        flatten_contained(&mut root, &mut log);

        assert_eq!(root["contained"].as_array().unwrap().len(), 2);
        assert!(log.is_empty());
    }

    #[test]
    fn test_missing_ids_are_generated() {
        let mut root = json!({
            "resourceType": "RequestGroup",
            "contained": [{"resourceType": "Task"}]
        });
        flatten_contained(&mut root, &mut OutcomeLog::new());
        assert!(root["contained"][0]["id"].as_str().is_some_and(|id| !id.is_empty()));
    }

    #[test]
    fn test_embedded_count() {
        let root = json!({
            "contained": [
                {"id": "a", "contained": [{"id": "b"}, {"id": "c"}]},
                {"id": "d"}
            ]
        });
        assert_eq!(embedded_count(&root), 4);
    }
}
