//! Log records and their text rendering

use serde::Serialize;
use serde_json::{Map, Value};

use super::finite::ensure_finite;
use super::level::LogLevel;
use crate::error::{LoggerError, LoggerResult};

/// A single key/value record tagged with its level and step
///
/// Built once from a serializable payload and never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    level: LogLevel,
    step: u64,
    payload: Map<String, Value>,
}

impl LogRecord {
    /// Build a record from any payload that serializes to a string-keyed map
    ///
    /// Fails with [`LoggerError::Serialization`] when the payload cannot be
    /// serialized, holds a NaN or infinite float, or is not a map.
    pub fn new<T: Serialize + ?Sized>(level: LogLevel, step: u64, data: &T) -> LoggerResult<Self> {
        ensure_finite(data)?;
        match serde_json::to_value(data)? {
            Value::Object(payload) => Ok(Self::from_map(level, step, payload)),
            other => Err(LoggerError::Serialization(
                <serde_json::Error as serde::ser::Error>::custom(format!(
                    "payload must be a map, got {}",
                    value_kind(&other)
                )),
            )),
        }
    }

    /// Build a record from an already-assembled map
    pub fn from_map(level: LogLevel, step: u64, payload: Map<String, Value>) -> Self {
        Self {
            level,
            step,
            payload,
        }
    }

    pub fn level(&self) -> LogLevel {
        self.level
    }

    pub fn step(&self) -> u64 {
        self.step
    }

    pub fn payload(&self) -> &Map<String, Value> {
        &self.payload
    }

    /// Render as a single line: `[LEVEL][batch=N]: { "key": value, }\n`
    pub fn to_line(&self) -> String {
        format!(
            "[{}][batch={}]: {}\n",
            self.level.as_str(),
            self.step,
            format_map(&self.payload)
        )
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a map",
    }
}

/// Render a single payload value
fn format_value(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() => format!("{:.4}", f),
            _ => n.to_string(),
        },
        Value::String(_) => value.to_string(),
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(format_value).collect();
            format!("[{}]", items.join(", "))
        }
        Value::Object(map) => format_map(map),
    }
}

/// Render a map with every entry followed by a comma, in insertion order
fn format_map(map: &Map<String, Value>) -> String {
    let mut out = String::from("{ ");
    for (key, value) in map {
        out.push_str(&format!(
            "{}: {}, ",
            Value::from(key.as_str()),
            format_value(value)
        ));
    }
    out.push('}');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn test_record_line_format() {
        let record = LogRecord::new(LogLevel::Fit, 2, &json!({"metric": "fit"})).unwrap();
        assert_eq!(record.to_line(), "[FIT][batch=2]: { \"metric\": \"fit\", }\n");
    }

    #[test]
    fn test_record_preserves_insertion_order() {
        let record = LogRecord::new(
            LogLevel::Batch,
            7,
            &json!({"zeta": 1, "alpha": 2, "mid": 3}),
        )
        .unwrap();
        assert_eq!(
            record.to_line(),
            "[BATCH][batch=7]: { \"zeta\": 1, \"alpha\": 2, \"mid\": 3, }\n"
        );
    }

    #[test]
    fn test_format_values() {
        assert_eq!(format_value(&json!(0.1)), "0.1000");
        assert_eq!(format_value(&json!(42)), "42");
        assert_eq!(format_value(&json!(true)), "true");
        assert_eq!(format_value(&json!(null)), "null");
        assert_eq!(format_value(&json!([1, "a"])), "[1, \"a\"]");
        assert_eq!(format_value(&json!({"k": 1.5})), "{ \"k\": 1.5000, }");
        assert_eq!(format_value(&json!({})), "{ }");
    }

    #[test]
    fn test_non_map_payload_rejected() {
        let err = LogRecord::new(LogLevel::Epoch, 0, &3.0_f64).unwrap_err();
        assert!(matches!(err, LoggerError::Serialization(_)));
    }

    #[test]
    fn test_non_string_keys_rejected() {
        let mut data = HashMap::new();
        data.insert((1, 2), 0.5_f64);
        let err = LogRecord::new(LogLevel::Epoch, 0, &data).unwrap_err();
        assert!(matches!(err, LoggerError::Serialization(_)));
    }

    #[test]
    fn test_non_finite_floats_rejected() {
        let mut data = HashMap::new();
        data.insert("loss", f64::NAN);
        let err = LogRecord::new(LogLevel::Batch, 1, &data).unwrap_err();
        assert!(matches!(err, LoggerError::Serialization(_)));

        let mut data = std::collections::BTreeMap::new();
        data.insert("loss", f64::INFINITY);
        let err = LogRecord::new(LogLevel::Batch, 1, &data).unwrap_err();
        assert!(matches!(err, LoggerError::Serialization(_)));
    }

    #[test]
    fn test_strings_and_keys_are_escaped() {
        let record =
            LogRecord::new(LogLevel::Fit, 0, &json!({"msg": "a\nb\"c", "k\"ey": 1})).unwrap();
        let line = record.to_line();
        assert_eq!(
            line,
            "[FIT][batch=0]: { \"msg\": \"a\\nb\\\"c\", \"k\\\"ey\": 1, }\n"
        );
        assert_eq!(line.lines().count(), 1);
    }

    #[test]
    fn test_struct_payload() {
        #[derive(Serialize)]
        struct Metrics {
            loss: f64,
            accuracy: f64,
        }

        let record = LogRecord::new(
            LogLevel::Epoch,
            10,
            &Metrics {
                loss: 0.25,
                accuracy: 0.9,
            },
        )
        .unwrap();
        assert_eq!(record.payload().len(), 2);
        assert_eq!(
            record.to_line(),
            "[EPOCH][batch=10]: { \"loss\": 0.2500, \"accuracy\": 0.9000, }\n"
        );
    }
}
