//! Analysis result model.
//!
//! An [`AnalysisResult`] only exists fully valid: the one way to obtain one
//! from bytes is [`validate`], which rejects anything structurally off and
//! keeps the raw payload in the error.
//!
//! Numbers are kept as [`serde_json::Number`] with `arbitrary_precision`,
//! so the text the analyzer emitted (`120`, `3.20`, `1e2`, integers wider
//! than 64 bits) reaches the rendered report unchanged.

mod validate;

pub use validate::{SchemaError, validate, validate_value};

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Number, Value};

/// Top-level key holding the summary metrics.
pub const SUMMARY_FIELD: &str = "summary";
/// Top-level key holding per-function records.
pub const FUNCTIONS_FIELD: &str = "functions";

/// One summary metric.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metric {
    pub name: String,
    pub value: Number,
}

/// Summary metrics in the order the analyzer emitted them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Summary {
    metrics: Vec<Metric>,
}

impl Summary {
    pub fn new(metrics: Vec<Metric>) -> Self {
        Self { metrics }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Metric> {
        self.metrics.iter()
    }

    pub fn get(&self, name: &str) -> Option<&Number> {
        self.metrics
            .iter()
            .find(|metric| metric.name == name)
            .map(|metric| &metric.value)
    }

    pub fn names(&self) -> Vec<&str> {
        self.metrics.iter().map(|m| m.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }
}

impl Serialize for Summary {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.metrics.len()))?;
        for metric in &self.metrics {
            map.serialize_entry(&metric.name, &metric.value)?;
        }
        map.end()
    }
}

/// Complexity record for one function.
///
/// `issues`, `time_complexity` and `space_complexity` are optional detail
/// some analyzers attach; they are kept only when present.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct FunctionComplexity {
    pub name: String,
    pub complexity: Number,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issues: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_complexity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub space_complexity: Option<String>,
}

impl FunctionComplexity {
    pub fn new(name: impl Into<String>, complexity: impl Into<Number>) -> Self {
        Self {
            name: name.into(),
            complexity: complexity.into(),
            issues: None,
            time_complexity: None,
            space_complexity: None,
        }
    }
}

/// Validated analyzer output.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct AnalysisResult {
    summary: Summary,
    functions: Vec<FunctionComplexity>,
}

impl AnalysisResult {
    pub fn new(summary: Summary, functions: Vec<FunctionComplexity>) -> Self {
        Self { summary, functions }
    }

    pub fn summary(&self) -> &Summary {
        &self.summary
    }

    pub fn functions(&self) -> &[FunctionComplexity] {
        &self.functions
    }

    /// JSON form with summary metrics in emitted order.
    pub fn to_json_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}
