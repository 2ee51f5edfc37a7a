//! Context entries and their read-views
//!
//! Every value a capability writes is wrapped in a [`ContextEntry`] carrying the
//! raw payload plus two views: a machine-oriented [`DetailView`] used when
//! planning and a human-oriented summary used when assembling the final response.
//! Summaries downsample large payloads so they stay within a prompt budget.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt::Debug;

/// Default number of points kept when a numeric series is downsampled
pub const DEFAULT_SAMPLE_POINTS: usize = 20;

/// Strings longer than this are cut in summaries
const MAX_SUMMARY_STRING_CHARS: usize = 500;

/// Nesting depth beyond which summaries stop descending
const MAX_SUMMARY_DEPTH: usize = 6;

pub const SAMPLE_WARNING: &str =
    "Downsampled for display. Do not use the sample for final numeric answers; use the aggregate statistics.";

/// One field of a payload as seen by the planner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldInfo {
    pub name: String,
    pub kind: String,
}

/// Machine-oriented description of a payload
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DetailView {
    pub fields: Vec<FieldInfo>,

    /// How downstream capabilities should read the payload
    #[serde(default)]
    pub access_hints: Vec<String>,

    /// Trimmed example of the payload
    #[serde(default)]
    pub example: Value,
}

/// A typed value a capability can write to the context store
pub trait ContextPayload: Send + Sync + Debug {
    /// Context type this payload is written under
    fn context_type(&self) -> &str;

    fn to_value(&self) -> Value;

    fn detail_view(&self) -> DetailView {
        describe_value(&self.to_value())
    }

    fn summary_view(&self, max_points: usize) -> Value {
        summarize_value(&self.to_value(), max_points)
    }
}

/// Payload backed by a plain JSON value, using the generic views
#[derive(Debug, Clone, PartialEq)]
pub struct JsonPayload {
    context_type: String,
    value: Value,
}

impl JsonPayload {
    pub fn new(context_type: impl Into<String>, value: Value) -> Self {
        Self {
            context_type: context_type.into(),
            value,
        }
    }
}

impl ContextPayload for JsonPayload {
    fn context_type(&self) -> &str {
        &self.context_type
    }

    fn to_value(&self) -> Value {
        self.value.clone()
    }
}

/// Immutable unit of context identified by (context_type, key)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextEntry {
    pub context_type: String,
    pub key: String,
    pub payload: Value,
    pub detail: DetailView,
    pub summary: Value,
}

impl ContextEntry {
    /// Wrap a payload, rendering both read-views once at write time
    pub fn from_payload(key: impl Into<String>, payload: &dyn ContextPayload, max_points: usize) -> Self {
        Self {
            context_type: payload.context_type().to_string(),
            key: key.into(),
            payload: payload.to_value(),
            detail: payload.detail_view(),
            summary: payload.summary_view(max_points),
        }
    }

    pub fn from_json(context_type: impl Into<String>, key: impl Into<String>, value: Value) -> Self {
        let payload = JsonPayload::new(context_type, value);
        Self::from_payload(key, &payload, DEFAULT_SAMPLE_POINTS)
    }

    /// Address of the entry as `TYPE/key`
    pub fn address(&self) -> String {
        format!("{}/{}", self.context_type, self.key)
    }

    /// Human-oriented view of this entry, without the raw payload
    pub fn to_summary(&self) -> ContextSummary {
        ContextSummary {
            context_type: self.context_type.clone(),
            key: self.key.clone(),
            summary: self.summary.clone(),
        }
    }
}

/// What a terminal step sees of an entry when assembling the final response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSummary {
    pub context_type: String,
    pub key: String,
    pub summary: Value,
}

/// Aggregate view of a downsampled numeric series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesSummary {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub first: f64,
    pub last: f64,
    pub sample: Vec<f64>,
    pub warning: String,
}

/// Reduce a series to an evenly spaced sample plus aggregate statistics
///
/// Returns `None` for an empty series.
pub fn downsample_series(values: &[f64], max_points: usize) -> Option<SeriesSummary> {
    let (first, last) = (*values.first()?, *values.last()?);
    let count = values.len();
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mean = values.iter().sum::<f64>() / count as f64;

    let max_points = max_points.max(1);
    let sample = if count <= max_points {
        values.to_vec()
    } else if max_points == 1 {
        vec![first]
    } else {
        (0..max_points)
            .map(|i| values[i * (count - 1) / (max_points - 1)])
            .collect()
    };

    Some(SeriesSummary {
        count,
        min,
        max,
        mean,
        first,
        last,
        sample,
        warning: SAMPLE_WARNING.to_string(),
    })
}

/// Human-oriented view of a JSON value with large parts reduced
pub fn summarize_value(value: &Value, max_points: usize) -> Value {
    summarize_at_depth(value, max_points, 0)
}

fn summarize_at_depth(value: &Value, max_points: usize, depth: usize) -> Value {
    if depth >= MAX_SUMMARY_DEPTH {
        return json!("[nested data omitted]");
    }

    match value {
        Value::String(s) if s.chars().count() > MAX_SUMMARY_STRING_CHARS => {
            let cut: String = s.chars().take(MAX_SUMMARY_STRING_CHARS).collect();
            Value::String(format!("{}... [truncated, total_chars={}]", cut, s.chars().count()))
        }
        Value::Array(items) if items.len() > max_points => {
            let numbers: Option<Vec<f64>> = items.iter().map(Value::as_f64).collect();
            match numbers.and_then(|n| downsample_series(&n, max_points)) {
                Some(series) => serde_json::to_value(series).unwrap_or(Value::Null),
                None => json!({
                    "items": items
                        .iter()
                        .take(max_points)
                        .map(|v| summarize_at_depth(v, max_points, depth + 1))
                        .collect::<Vec<_>>(),
                    "total_items": items.len(),
                    "truncated": true,
                }),
            }
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|v| summarize_at_depth(v, max_points, depth + 1))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), summarize_at_depth(v, max_points, depth + 1)))
                .collect::<Map<String, Value>>(),
        ),
        other => other.clone(),
    }
}

/// Machine-oriented description: top-level fields, hints and a trimmed example
pub fn describe_value(value: &Value) -> DetailView {
    let fields = match value {
        Value::Object(map) => map
            .iter()
            .map(|(name, v)| FieldInfo {
                name: name.clone(),
                kind: kind_of(v).to_string(),
            })
            .collect(),
        other => vec![FieldInfo {
            name: "value".to_string(),
            kind: kind_of(other).to_string(),
        }],
    };

    let mut access_hints = Vec::new();
    if let Value::Object(map) = value {
        for (name, v) in map {
            if let Value::Array(items) = v {
                access_hints.push(format!("'{}' is a list of {} item(s)", name, items.len()));
            }
        }
    } else if let Value::Array(items) = value {
        access_hints.push(format!("payload is a list of {} item(s)", items.len()));
    }

    DetailView {
        fields,
        access_hints,
        example: summarize_value(value, 3),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_long_series_is_downsampled_with_stats() {
        let readings: Vec<f64> = (0..1000).map(|i| i as f64).collect();
        let value = json!({ "station": "SFO", "temperatures": readings });

        let summary = summarize_value(&value, 10);
        let temps = &summary["temperatures"];

        assert_eq!(temps["count"], json!(1000));
        assert_eq!(temps["sample"].as_array().unwrap().len(), 10);
        assert_eq!(temps["first"], json!(0.0));
        assert_eq!(temps["last"], json!(999.0));
        assert_eq!(temps["mean"], json!(499.5));
        assert!(temps["warning"].as_str().unwrap().contains("final numeric answers"));
        assert_eq!(summary["station"], json!("SFO"));
    }

    #[test]
    fn test_short_series_untouched() {
        let value = json!([1, 2, 3]);
        assert_eq!(summarize_value(&value, 20), value);
    }

    #[test]
    fn test_long_object_list_truncated() {
        let items: Vec<Value> = (0..50).map(|i| json!({ "id": i })).collect();
        let summary = summarize_value(&Value::Array(items), 5);
        assert_eq!(summary["total_items"], json!(50));
        assert_eq!(summary["items"].as_array().unwrap().len(), 5);
    }

    #[test]
    fn test_downsample_keeps_endpoints() {
        let values: Vec<f64> = (0..101).map(|i| i as f64).collect();
        let series = downsample_series(&values, 5).unwrap();
        assert_eq!(series.sample, vec![0.0, 25.0, 50.0, 75.0, 100.0]);
        assert!(downsample_series(&[], 5).is_none());
    }

    #[test]
    fn test_detail_view_lists_fields() {
        let entry = ContextEntry::from_json(
            "CURRENT_WEATHER",
            "weather_sf",
            json!({ "location": "San Francisco", "temp_c": 17.5, "hourly": [1, 2] }),
        );

        let names: Vec<&str> = entry.detail.fields.iter().map(|f| f.name.as_str()).collect();
        assert!(names.contains(&"location"));
        assert!(names.contains(&"temp_c"));
        assert_eq!(entry.address(), "CURRENT_WEATHER/weather_sf");
        assert!(entry.detail.access_hints[0].contains("hourly"));
    }
}
