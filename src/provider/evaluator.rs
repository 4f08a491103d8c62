use serde_json::{Number, Value};
use std::collections::HashMap;
use std::path::Path;

use super::ExpressionEvaluator;
use crate::error::{PlanApplyError, Result};
use crate::model::Expression;

/// An expression bound to the library it should be evaluated against.
#[derive(Debug, Clone, PartialEq)]
pub struct CqfExpression {
    pub language: String,
    pub expression: String,
    pub library_url: Option<String>,
}

impl CqfExpression {
    /// Falls back to `default_library` when the expression does not name one.
    pub fn from_expression(expression: &Expression, default_library: Option<&str>) -> Option<Self> {
        let text = expression.expression.as_ref()?;
        Some(Self {
            language: expression
                .language
                .clone()
                .unwrap_or_else(|| "text/cql".to_string()),
            expression: text.clone(),
            library_url: expression
                .reference
                .clone()
                .or_else(|| default_library.map(str::to_string)),
        })
    }
}

/// Evaluates literals and looks everything else up in a fixed result table.
///
/// Table entries win over literal parsing, so `"true"` can be overridden.
#[derive(Debug, Default, Clone)]
pub struct LiteralExpressionEvaluator {
    results: HashMap<String, Vec<Value>>,
}

impl LiteralExpressionEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_result(mut self, expression: impl Into<String>, values: Vec<Value>) -> Self {
        self.results.insert(expression.into(), values);
        self
    }

    /// Reads a JSON object mapping expression text to a value or a list of values.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let table: HashMap<String, Value> = serde_json::from_str(&content)?;
        let results = table
            .into_iter()
            .map(|(expression, value)| {
                let values = match value {
                    Value::Array(values) => values,
                    Value::Null => Vec::new(),
                    other => vec![other],
                };
                (expression, values)
            })
            .collect();
        Ok(Self { results })
    }

    fn literal(text: &str) -> Option<Vec<Value>> {
        match text {
            "true" => return Some(vec![Value::Bool(true)]),
            "false" => return Some(vec![Value::Bool(false)]),
            "null" | "{}" => return Some(Vec::new()),
            _ => {}
        }
        if let Ok(i) = text.parse::<i64>() {
            return Some(vec![Value::Number(i.into())]);
        }
        if let Some(n) = text.parse::<f64>().ok().and_then(Number::from_f64) {
            return Some(vec![Value::Number(n)]);
        }
        let quoted = (text.starts_with('\'') && text.ends_with('\''))
            || (text.starts_with('"') && text.ends_with('"'));
        if quoted && text.len() >= 2 {
            return Some(vec![Value::String(text[1..text.len() - 1].to_string())]);
        }
        None
    }
}

impl ExpressionEvaluator for LiteralExpressionEvaluator {
    fn evaluate(
        &self,
        _subject: &str,
        expression: &CqfExpression,
        _parameters: Option<&Value>,
        _data: Option<&Value>,
    ) -> Result<Vec<Value>> {
        let text = expression.expression.trim();
        if let Some(values) = self.results.get(text) {
            return Ok(values.clone());
        }
        Self::literal(text).ok_or_else(|| {
            PlanApplyError::evaluation(text, "no result is registered for this expression")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cql(text: &str) -> CqfExpression {
        CqfExpression {
            language: "text/cql".to_string(),
            expression: text.to_string(),
            library_url: None,
        }
    }

    #[test]
    fn test_literals() {
        let evaluator = LiteralExpressionEvaluator::new();
        let eval = |text: &str| evaluator.evaluate("Patient/1", &cql(text), None, None);

        assert_eq!(eval("true").unwrap(), vec![json!(true)]);
        assert_eq!(eval(" false ").unwrap(), vec![json!(false)]);
        assert_eq!(eval("42").unwrap(), vec![json!(42)]);
        assert_eq!(eval("'high'").unwrap(), vec![json!("high")]);
        assert!(eval("null").unwrap().is_empty());
        assert!(matches!(
            eval("Has Diabetes").unwrap_err(),
            PlanApplyError::Evaluation { .. }
        ));
    }

    #[test]
    fn test_table_overrides_literals() {
        let evaluator = LiteralExpressionEvaluator::new()
            .with_result("true", vec![json!(false)])
            .with_result("Has Diabetes", vec![json!(true)]);
        assert_eq!(
            evaluator.evaluate("Patient/1", &cql("true"), None, None).unwrap(),
            vec![json!(false)]
        );
        assert_eq!(
            evaluator
                .evaluate("Patient/1", &cql("Has Diabetes"), None, None)
                .unwrap(),
            vec![json!(true)]
        );
    }

    #[test]
    fn test_from_expression_uses_default_library() {
        let expression = Expression::new("text/cql", "Has Diabetes");
        let cqf = CqfExpression::from_expression(&expression, Some("http://example.org/Library/lib"))
            .unwrap();
        assert_eq!(cqf.library_url.as_deref(), Some("http://example.org/Library/lib"));

        let empty = Expression::default();
        assert!(CqfExpression::from_expression(&empty, None).is_none());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");
        std::fs::write(&path, r#"{"Has Diabetes": true, "Labs": [1, 2], "Nothing": null}"#).unwrap();

        let evaluator = LiteralExpressionEvaluator::from_file(&path).unwrap();
        assert_eq!(
            evaluator.evaluate("p", &cql("Labs"), None, None).unwrap().len(),
            2
        );
        assert!(evaluator.evaluate("p", &cql("Nothing"), None, None).unwrap().is_empty());
    }
}
