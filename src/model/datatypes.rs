use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::constants::UCUM_SYSTEM;
use crate::error::{PlanApplyError, Result};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Extension {
    pub url: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extension: Vec<Extension>,
    /// The `value[x]` element, keyed by its typed name (`valueString`, `valueReference`, ...).
    #[serde(flatten)]
    pub value: Map<String, Value>,
}

impl Extension {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_value(url: impl Into<String>, key: &str, value: Value) -> Self {
        let mut extension = Self::new(url);
        extension.value.insert(key.to_string(), value);
        extension
    }

    pub fn push(&mut self, extension: Extension) {
        self.extension.push(extension);
    }

    /// Returns the `value[x]` entry as `(typed name, value)`.
    pub fn value_entry(&self) -> Option<(&str, &Value)> {
        self.value
            .iter()
            .find(|(key, _)| key.starts_with("value"))
            .map(|(key, value)| (key.as_str(), value))
    }

    pub fn value_str(&self) -> Option<&str> {
        self.value_entry().and_then(|(_, value)| value.as_str())
    }

    pub fn extension_by_url(&self, url: &str) -> Option<&Extension> {
        self.extension.iter().find(|e| e.url == url)
    }
}

pub fn find_extension<'a>(extensions: &'a [Extension], url: &str) -> Option<&'a Extension> {
    extensions.iter().find(|e| e.url == url)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

impl Reference {
    pub fn new(reference: impl Into<String>) -> Self {
        Self {
            reference: Some(reference.into()),
            display: None,
        }
    }

    /// Reference to a resource held in the same container.
    pub fn contained(id: &str) -> Self {
        Self::new(format!("#{}", id.trim_start_matches('#')))
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Expression {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
    /// Library holding the expression, when it differs from the plan's primary library.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

impl Expression {
    pub fn new(language: impl Into<String>, expression: impl Into<String>) -> Self {
        Self {
            language: Some(language.into()),
            expression: Some(expression.into()),
            reference: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataRequirement {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub profile: Vec<String>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl DataRequirement {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: Some(type_name.into()),
            ..Default::default()
        }
    }

    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile.push(profile.into());
        self
    }

    /// Parameter name used when the requirement is handed to an expression.
    pub fn parameter_name(&self) -> Option<&str> {
        self.id.as_deref().or(self.type_name.as_deref())
    }
}

/// A FHIR `Duration`.
///
/// Deserializes from either a quantity object or an ISO-8601 duration string
/// such as `"P1D"` or `"PT1H30M"`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "DurationRepr")]
pub struct Duration {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DurationRepr {
    Iso(String),
    Quantity {
        value: Option<f64>,
        unit: Option<String>,
        system: Option<String>,
        code: Option<String>,
    },
}

impl TryFrom<DurationRepr> for Duration {
    type Error = PlanApplyError;

    fn try_from(repr: DurationRepr) -> Result<Self> {
        match repr {
            DurationRepr::Iso(text) => Duration::from_iso8601(&text),
            DurationRepr::Quantity {
                value,
                unit,
                system,
                code,
            } => Ok(Duration {
                value,
                unit,
                system,
                code,
            }),
        }
    }
}

static ISO_DURATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^P(?:(?P<y>\d+(?:\.\d+)?)Y)?(?:(?P<mo>\d+(?:\.\d+)?)M)?(?:(?P<wk>\d+(?:\.\d+)?)W)?(?:(?P<d>\d+(?:\.\d+)?)D)?(?:T(?:(?P<h>\d+(?:\.\d+)?)H)?(?:(?P<min>\d+(?:\.\d+)?)M)?(?:(?P<s>\d+(?:\.\d+)?)S)?)?$",
    )
    .expect("ISO-8601 duration pattern is valid")
});

// UCUM code, display unit, seconds (None for calendar units)
const UNITS: [(&str, &str, Option<f64>); 7] = [
    ("a", "year", None),
    ("mo", "month", None),
    ("wk", "week", Some(604_800.0)),
    ("d", "day", Some(86_400.0)),
    ("h", "hour", Some(3_600.0)),
    ("min", "minute", Some(60.0)),
    ("s", "second", Some(1.0)),
];

impl Duration {
    pub fn new(value: f64, code: &str) -> Self {
        let unit = UNITS
            .iter()
            .find(|(ucum, _, _)| *ucum == code)
            .map(|(_, unit, _)| unit.to_string())
            .unwrap_or_else(|| code.to_string());
        Self {
            value: Some(value),
            unit: Some(unit),
            system: Some(UCUM_SYSTEM.to_string()),
            code: Some(code.to_string()),
        }
    }

    /// Parses an ISO-8601 duration. Compound durations are folded into their
    /// smallest unit; years and months only stand alone.
    pub fn from_iso8601(text: &str) -> Result<Self> {
        let captures = ISO_DURATION
            .captures(text.trim())
            .ok_or_else(|| PlanApplyError::InvalidDuration(text.to_string()))?;

        let mut parts = Vec::new();
        for (name, (code, _, seconds)) in ["y", "mo", "wk", "d", "h", "min", "s"].iter().zip(UNITS) {
            if let Some(m) = captures.name(name) {
                let amount: f64 = m
                    .as_str()
                    .parse()
                    .map_err(|_| PlanApplyError::InvalidDuration(text.to_string()))?;
                parts.push((code, amount, seconds));
            }
        }

        match parts.as_slice() {
            [] => Err(PlanApplyError::InvalidDuration(text.to_string())),
            [(code, amount, _)] => Ok(Duration::new(*amount, code)),
            _ => {
                if parts.iter().any(|(_, _, seconds)| seconds.is_none()) {
                    return Err(PlanApplyError::InvalidDuration(text.to_string()));
                }
                let (smallest, _, smallest_seconds) = parts[parts.len() - 1];
                let smallest_seconds = smallest_seconds.unwrap_or(1.0);
                let total: f64 = parts
                    .iter()
                    .map(|(_, amount, seconds)| amount * seconds.unwrap_or(1.0))
                    .sum();
                Ok(Duration::new(total / smallest_seconds, smallest))
            }
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
