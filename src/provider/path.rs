use std::cmp::Ordering;

use serde_json::{Map, Value};

use super::ValueSetter;
use crate::error::{PlanApplyError, Result};

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Key(String),
    Index(usize),
}

fn parse_path(path: &str) -> Result<Vec<Segment>> {
    let mut segments = Vec::new();
    for part in path.split('.') {
        let (name, mut rest) = match part.find('[') {
            Some(pos) => (&part[..pos], &part[pos..]),
            None => (part, ""),
        };
        if name.is_empty() {
            return Err(PlanApplyError::invalid_path(path, "empty element name"));
        }
        segments.push(Segment::Key(name.to_string()));

        while !rest.is_empty() {
            let close = rest
                .find(']')
                .ok_or_else(|| PlanApplyError::invalid_path(path, "unclosed index"))?;
            let index = rest[1..close]
                .parse::<usize>()
                .map_err(|_| PlanApplyError::invalid_path(path, "index is not a number"))?;
            segments.push(Segment::Index(index));
            rest = &rest[close + 1..];
            if !rest.is_empty() && !rest.starts_with('[') {
                return Err(PlanApplyError::invalid_path(path, "unexpected text after index"));
            }
        }
    }
    Ok(segments)
}

fn empty_container(next: Option<&Segment>) -> Value {
    match next {
        Some(Segment::Index(_)) => Value::Array(Vec::new()),
        _ => Value::Object(Map::new()),
    }
}

/// Sets values on JSON documents using dotted paths with `[n]` indexes,
/// e.g. `extension[0].valueString`. Missing intermediate elements are created.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonPathSetter;

impl JsonPathSetter {
    pub fn new() -> Self {
        Self
    }
}

impl ValueSetter for JsonPathSetter {
    fn set_value(&self, target: &mut Value, path: &str, value: Value) -> Result<()> {
        let segments = parse_path(path)?;
        let mut current = target;

        for (i, segment) in segments.iter().enumerate() {
            let next = segments.get(i + 1);
            let is_last = next.is_none();
            current = match segment {
                Segment::Key(key) => {
                    let object = current.as_object_mut().ok_or_else(|| {
                        PlanApplyError::invalid_path(path, "cannot descend into a primitive")
                    })?;
                    if is_last {
                        object.insert(key.clone(), value);
                        return Ok(());
                    }
                    let slot = object.entry(key.clone()).or_insert(Value::Null);
                    if slot.is_null() {
                        *slot = empty_container(next);
                    }
                    slot
                }
                Segment::Index(index) => {
                    let array = current.as_array_mut().ok_or_else(|| {
                        PlanApplyError::invalid_path(path, "indexed element is not a list")
                    })?;
                    match array.len().cmp(index) {
                        Ordering::Less => {
                            return Err(PlanApplyError::invalid_path(
                                path.to_string(),
                                format!("index {index} skips past the end of a list of {}", array.len()),
                            ));
                        }
                        Ordering::Equal => array.push(Value::Null),
                        Ordering::Greater => {}
                    }
                    if is_last {
                        array[*index] = value;
                        return Ok(());
                    }
                    let slot = &mut array[*index];
                    if slot.is_null() {
                        *slot = empty_container(next);
                    }
                    slot
                }
            };
        }
        Ok(())
    }
}
