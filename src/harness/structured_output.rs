use crate::errors::{AppError, AppResult};
use crate::models::ForecastPoint;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

pub const INVALID_FORMAT_MESSAGE: &str = "The AI returned an invalid data format. Please try again.";
pub const NON_ARRAY_MESSAGE: &str = "AI returned a non-array format for the forecast.";

static CODE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(\w*)?\s*\n?(.*?)\n?\s*```$").expect("valid regex"));

#[derive(Debug, Clone)]
pub struct StructuredOutputValidationResult {
    pub value: Option<Value>,
    pub error: Option<String>,
    pub errors: Vec<String>,
}

/// Returns the body of a single fenced block, or the trimmed input when it is not fenced.
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    CODE_FENCE
        .captures(trimmed)
        .and_then(|caps| caps.get(2))
        .map(|body| body.as_str().trim())
        .filter(|body| !body.is_empty())
        .unwrap_or(trimmed)
}

pub fn decode_json_payload(raw: &str) -> AppResult<Value> {
    let candidate = strip_code_fence(raw);
    serde_json::from_str(candidate).map_err(|error| {
        tracing::warn!(error = %error, chars = raw.len(), "generator output is not valid JSON");
        AppError::AiFormat(INVALID_FORMAT_MESSAGE.to_string())
    })
}

/// Schema for one forecast element: an object carrying both chart keys.
pub fn forecast_point_schema(date_key: &str, value_key: &str) -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            date_key: { "type": "string" },
            value_key: { "type": "number" }
        },
        "required": [date_key, value_key]
    })
}

pub fn validate_structured_output(value: Option<Value>, schema: Option<&Value>) -> StructuredOutputValidationResult {
    let Some(value) = value else {
        if schema.is_some() {
            return StructuredOutputValidationResult {
                value: None,
                error: Some("Structured output is missing or invalid JSON.".to_string()),
                errors: vec![],
            };
        }
        return StructuredOutputValidationResult {
            value: None,
            error: None,
            errors: vec![],
        };
    };

    let Some(schema) = schema else {
        return StructuredOutputValidationResult {
            value: Some(value),
            error: None,
            errors: vec![],
        };
    };

    let compiled = match jsonschema::JSONSchema::compile(schema) {
        Ok(compiled) => compiled,
        Err(error) => {
            return StructuredOutputValidationResult {
                value: Some(value),
                error: Some(format!("Failed to compile structured output schema: {}", error)),
                errors: vec![],
            }
        }
    };

    let errors: Vec<String> = compiled
        .validate(&value)
        .err()
        .map(|errors| {
            errors
                .map(|error| {
                    let path = error.instance_path.to_string();
                    if path.is_empty() {
                        error.to_string()
                    } else {
                        format!("{}: {}", path, error)
                    }
                })
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    if errors.is_empty() {
        StructuredOutputValidationResult {
            value: Some(value),
            error: None,
            errors,
        }
    } else {
        StructuredOutputValidationResult {
            value: Some(value),
            error: Some("Structured output did not match schema.".to_string()),
            errors,
        }
    }
}

/// Decodes untrusted forecast text into typed points.
///
/// The text may be wrapped in a fenced block; it must hold a JSON array whose
/// elements carry `date_key` (string) and `value_key` (number). Other keys are dropped.
pub fn decode_forecast(raw: &str, date_key: &str, value_key: &str) -> AppResult<Vec<ForecastPoint>> {
    let value = decode_json_payload(raw)?;
    let Value::Array(items) = value else {
        tracing::warn!("forecast output is not an array");
        return Err(AppError::AiFormat(NON_ARRAY_MESSAGE.to_string()));
    };

    let schema = serde_json::json!({
        "type": "array",
        "items": forecast_point_schema(date_key, value_key)
    });
    let validation = validate_structured_output(Some(Value::Array(items)), Some(&schema));
    if let Some(error) = validation.error {
        tracing::warn!(errors = ?validation.errors, "forecast output failed schema validation");
        let detail = if validation.errors.is_empty() {
            error
        } else {
            validation.errors.join("; ")
        };
        return Err(AppError::AiFormat(format!(
            "The AI forecast did not have the expected shape ({}). Please try again.",
            detail
        )));
    }

    let items = match validation.value {
        Some(Value::Array(items)) => items,
        _ => return Err(AppError::AiFormat(NON_ARRAY_MESSAGE.to_string())),
    };

    items
        .iter()
        .map(|item| {
            let period = item.get(date_key).and_then(Value::as_str);
            let value = item.get(value_key).and_then(Value::as_f64);
            match (period, value) {
                (Some(period), Some(value)) => Ok(ForecastPoint {
                    period: period.to_string(),
                    value,
                }),
                _ => Err(AppError::AiFormat(INVALID_FORMAT_MESSAGE.to_string())),
            }
        })
        .collect()
}
