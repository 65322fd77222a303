//! assert tool - explicit pass/fail checks recorded by the agent

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::context::{ToolContext, ToolError};
use super::{Tool, ToolInputSchema, ToolResult};

const COMPARISONS: &[&str] = &[
    "equals",
    "not_equals",
    "contains",
    "not_contains",
    "greater_than",
    "less_than",
    "is_true",
    "is_false",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Comparison {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    GreaterThan,
    LessThan,
    IsTrue,
    IsFalse,
}

impl Comparison {
    fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "equals" => Self::Equals,
            "not_equals" => Self::NotEquals,
            "contains" => Self::Contains,
            "not_contains" => Self::NotContains,
            "greater_than" => Self::GreaterThan,
            "less_than" => Self::LessThan,
            "is_true" => Self::IsTrue,
            "is_false" => Self::IsFalse,
            _ => return None,
        })
    }

    fn needs_expected(self) -> bool {
        !matches!(self, Self::IsTrue | Self::IsFalse)
    }

    fn evaluate(self, actual: &Value, expected: &Value) -> Result<bool, ToolError> {
        Ok(match self {
            Self::Equals => loosely_equal(actual, expected),
            Self::NotEquals => !loosely_equal(actual, expected),
            Self::Contains => contains(actual, expected),
            Self::NotContains => !contains(actual, expected),
            Self::GreaterThan => numeric(actual)? > numeric(expected)?,
            Self::LessThan => numeric(actual)? < numeric(expected)?,
            Self::IsTrue => truthy(actual),
            Self::IsFalse => !truthy(actual),
        })
    }
}

/// Equal as JSON, or equal once both sides are rendered as strings
fn loosely_equal(a: &Value, b: &Value) -> bool {
    a == b || render(a) == render(b)
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn contains(haystack: &Value, needle: &Value) -> bool {
    match haystack {
        Value::Array(items) => items.iter().any(|item| loosely_equal(item, needle)),
        Value::Object(map) => map.contains_key(&render(needle)),
        other => render(other).contains(&render(needle)),
    }
}

fn numeric(value: &Value) -> Result<f64, ToolError> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .ok_or_else(|| ToolError::InvalidInput(format!("{} is not a number", value)))
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => matches!(s.trim().to_lowercase().as_str(), "true" | "yes" | "1"),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Assertion checker
pub struct AssertTool;

impl AssertTool {
    pub fn factory(_ctx: &ToolContext) -> Arc<dyn Tool> {
        Arc::new(Self)
    }

    fn check(&self, input: &Value) -> Result<ToolResult, ToolError> {
        let description = input["description"].as_str().unwrap_or("assertion");
        let comparison = input["comparison"]
            .as_str()
            .and_then(Comparison::parse)
            .ok_or_else(|| ToolError::InvalidInput("comparison is required".to_string()))?;
        let actual = &input["actual"];
        let expected = &input["expected"];

        if comparison.needs_expected() && expected.is_null() {
            return Err(ToolError::InvalidInput(format!(
                "expected is required for comparison {:?}",
                comparison
            )));
        }

        let passed = comparison.evaluate(actual, expected)?;
        let detail = if comparison.needs_expected() {
            format!("actual {} {} {}", actual, describe(comparison), expected)
        } else {
            format!("actual {} {}", actual, describe(comparison))
        };
        log::info!("assert '{}': {}", description, if passed { "PASS" } else { "FAIL" });

        if passed {
            Ok(ToolResult::success(format!("PASS: {} ({})", description, detail)))
        } else {
            Ok(ToolResult::failed(format!("FAIL: {} ({})", description, detail)))
        }
    }
}

fn describe(comparison: Comparison) -> &'static str {
    match comparison {
        Comparison::Equals => "equals",
        Comparison::NotEquals => "does not equal",
        Comparison::Contains => "contains",
        Comparison::NotContains => "does not contain",
        Comparison::GreaterThan => "is greater than",
        Comparison::LessThan => "is less than",
        Comparison::IsTrue => "is true",
        Comparison::IsFalse => "is false",
    }
}

#[async_trait]
impl Tool for AssertTool {
    fn name(&self) -> &'static str {
        "assert"
    }

    fn schema(&self) -> ToolInputSchema {
        ToolInputSchema::new("assert", "Check a condition and record PASS or FAIL").with_schema(serde_json::json!({
            "type": "object",
            "properties": {
                "description": { "type": "string", "description": "What is being checked" },
                "actual": { "description": "Observed value" },
                "expected": { "description": "Expected value (not needed for is_true/is_false)" },
                "comparison": { "type": "string", "enum": COMPARISONS }
            },
            "required": ["description", "actual", "comparison"]
        }))
    }

    async fn invoke(&self, input: Value) -> Result<ToolResult, eyre::Error> {
        if let Err(message) = self.schema().validate(&input) {
            return Ok(ToolResult::invalid_input(message));
        }
        Ok(self.check(&input).unwrap_or_else(ToolResult::from))
    }
}
