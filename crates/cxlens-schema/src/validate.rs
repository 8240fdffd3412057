//! Structural validation of analyzer output.
//!
//! Checks are deliberately shape-only: keys exist and have the declared JSON
//! types. Negative complexities, empty names, duplicate function names and
//! unusual metric values are accepted as-is. Unknown keys are ignored.

use crate::{AnalysisResult, FUNCTIONS_FIELD, FunctionComplexity, Metric, SUMMARY_FIELD, Summary};
use serde_json::{Map, Number, Value};
use thiserror::Error;

/// Structural mismatch between a payload and the analysis result shape.
///
/// Both variants carry the payload text so callers can surface it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("payload is not valid json: {reason}")]
    Parse { raw: String, reason: String },

    #[error("{path}: {reason}")]
    Shape {
        raw: String,
        path: String,
        reason: String,
    },
}

impl SchemaError {
    pub fn raw(&self) -> &str {
        match self {
            Self::Parse { raw, .. } | Self::Shape { raw, .. } => raw,
        }
    }

    fn shape(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Shape {
            raw: String::new(),
            path: path.into(),
            reason: reason.into(),
        }
    }

    fn with_raw(self, payload: String) -> Self {
        match self {
            Self::Parse { reason, .. } => Self::Parse {
                raw: payload,
                reason,
            },
            Self::Shape { path, reason, .. } => Self::Shape {
                raw: payload,
                path,
                reason,
            },
        }
    }
}

/// Parse and structurally check an analyzer payload.
pub fn validate(bytes: &[u8]) -> Result<AnalysisResult, SchemaError> {
    let raw = || String::from_utf8_lossy(bytes).into_owned();
    let value: Value = serde_json::from_slice(bytes).map_err(|e| SchemaError::Parse {
        raw: raw(),
        reason: e.to_string(),
    })?;
    validate_value(&value).map_err(|e| e.with_raw(raw()))
}

/// Structurally check an already-parsed payload.
///
/// Errors from this entry point carry the compact JSON text of `value` as
/// their raw payload.
pub fn validate_value(value: &Value) -> Result<AnalysisResult, SchemaError> {
    check_root(value).map_err(|e| e.with_raw(value.to_string()))
}

fn check_root(value: &Value) -> Result<AnalysisResult, SchemaError> {
    let root = expect_object(value, "(root)")?;

    let summary_value = root
        .get(SUMMARY_FIELD)
        .ok_or_else(|| SchemaError::shape("(root)", format!("missing field `{SUMMARY_FIELD}`")))?;
    let functions_value = root.get(FUNCTIONS_FIELD).ok_or_else(|| {
        SchemaError::shape("(root)", format!("missing field `{FUNCTIONS_FIELD}`"))
    })?;

    let summary = check_summary(summary_value)?;
    let functions = check_functions(functions_value)?;
    Ok(AnalysisResult::new(summary, functions))
}

fn check_summary(value: &Value) -> Result<Summary, SchemaError> {
    let map = expect_object(value, SUMMARY_FIELD)?;
    let mut metrics = Vec::with_capacity(map.len());
    for (name, metric) in map {
        let path = format!("{SUMMARY_FIELD}.{name}");
        metrics.push(Metric {
            name: name.clone(),
            value: expect_number(metric, &path)?.clone(),
        });
    }
    Ok(Summary::new(metrics))
}

fn check_functions(value: &Value) -> Result<Vec<FunctionComplexity>, SchemaError> {
    let Value::Array(items) = value else {
        return Err(type_mismatch(FUNCTIONS_FIELD, "array", value));
    };

    items
        .iter()
        .enumerate()
        .map(|(idx, item)| check_function(item, &format!("{FUNCTIONS_FIELD}[{idx}]")))
        .collect()
}

fn check_function(value: &Value, path: &str) -> Result<FunctionComplexity, SchemaError> {
    let record = expect_object(value, path)?;

    let name = required(record, path, "name")?;
    let Value::String(name) = name else {
        return Err(type_mismatch(&format!("{path}.name"), "string", name));
    };
    let complexity = expect_number(
        required(record, path, "complexity")?,
        &format!("{path}.complexity"),
    )?;

    Ok(FunctionComplexity {
        name: name.clone(),
        complexity: complexity.clone(),
        issues: optional_string_list(record, path, "issues")?,
        time_complexity: optional_string(record, path, "time_complexity")?,
        space_complexity: optional_string(record, path, "space_complexity")?,
    })
}

fn required<'a>(
    record: &'a Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<&'a Value, SchemaError> {
    record
        .get(key)
        .ok_or_else(|| SchemaError::shape(path, format!("missing field `{key}`")))
}

fn optional_string(
    record: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<Option<String>, SchemaError> {
    match record.get(key) {
        None => Ok(None),
        Some(Value::String(text)) => Ok(Some(text.clone())),
        Some(other) => Err(type_mismatch(&format!("{path}.{key}"), "string", other)),
    }
}

fn optional_string_list(
    record: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<Option<Vec<String>>, SchemaError> {
    let Some(value) = record.get(key) else {
        return Ok(None);
    };
    let Value::Array(items) = value else {
        return Err(type_mismatch(&format!("{path}.{key}"), "array", value));
    };
    items
        .iter()
        .enumerate()
        .map(|(idx, item)| match item {
            Value::String(text) => Ok(text.clone()),
            other => Err(type_mismatch(
                &format!("{path}.{key}[{idx}]"),
                "string",
                other,
            )),
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

fn expect_object<'a>(value: &'a Value, path: &str) -> Result<&'a Map<String, Value>, SchemaError> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(type_mismatch(path, "object", other)),
    }
}

fn expect_number<'a>(value: &'a Value, path: &str) -> Result<&'a Number, SchemaError> {
    match value {
        Value::Number(number) => Ok(number),
        other => Err(type_mismatch(path, "number", other)),
    }
}

fn type_mismatch(path: &str, expected: &str, found: &Value) -> SchemaError {
    SchemaError::shape(
        path,
        format!("expected {expected}, found {}", json_type(found)),
    )
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
