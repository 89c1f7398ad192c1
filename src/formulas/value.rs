use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, NaiveDate};
use serde::{Serialize, Serializer};
use serde_json::Value;

/// Runtime value of a formula expression.
#[derive(Debug, Clone, PartialEq)]
pub enum FormulaValue {
    Null,
    Number(f64),
    Text(String),
    Boolean(bool),
    Date(NaiveDate),
}

impl FormulaValue {
    /// Converts a JSON value. Strings shaped like dates become dates.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => FormulaValue::Null,
            Value::Bool(b) => FormulaValue::Boolean(*b),
            Value::Number(n) => n
                .as_f64()
                .map(FormulaValue::Number)
                .unwrap_or(FormulaValue::Null),
            Value::String(s) => parse_date(s)
                .map(FormulaValue::Date)
                .unwrap_or_else(|| FormulaValue::Text(s.clone())),
            other => FormulaValue::Text(other.to_string()),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            FormulaValue::Null => Value::Null,
            FormulaValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            FormulaValue::Text(s) => Value::String(s.clone()),
            FormulaValue::Boolean(b) => Value::Bool(*b),
            FormulaValue::Date(d) => Value::String(d.format("%Y-%m-%d").to_string()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FormulaValue::Null)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            FormulaValue::Null => "null",
            FormulaValue::Number(_) => "number",
            FormulaValue::Text(_) => "text",
            FormulaValue::Boolean(_) => "boolean",
            FormulaValue::Date(_) => "date",
        }
    }

    /// Truthiness used by logical operators and `IF`.
    pub fn truthy(&self) -> bool {
        match self {
            FormulaValue::Null => false,
            FormulaValue::Number(n) => *n != 0.0,
            FormulaValue::Text(s) => !s.is_empty(),
            FormulaValue::Boolean(b) => *b,
            FormulaValue::Date(_) => true,
        }
    }

    /// Text rendering used by concatenation; null renders empty.
    pub fn display_text(&self) -> String {
        match self {
            FormulaValue::Null => String::new(),
            other => other.to_string(),
        }
    }

    /// Ordering between values of the same type.
    pub fn compare(&self, other: &FormulaValue) -> Option<Ordering> {
        match (self, other) {
            (FormulaValue::Number(a), FormulaValue::Number(b)) => a.partial_cmp(b),
            (FormulaValue::Text(a), FormulaValue::Text(b)) => Some(a.cmp(b)),
            (FormulaValue::Boolean(a), FormulaValue::Boolean(b)) => Some(a.cmp(b)),
            (FormulaValue::Date(a), FormulaValue::Date(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl fmt::Display for FormulaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormulaValue::Null => f.write_str("null"),
            FormulaValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                write!(f, "{}", *n as i64)
            }
            FormulaValue::Number(n) => write!(f, "{n}"),
            FormulaValue::Text(s) => f.write_str(s),
            FormulaValue::Boolean(b) => write!(f, "{b}"),
            FormulaValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
        }
    }
}

impl Serialize for FormulaValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

/// Parses `YYYY-MM-DD` or an RFC 3339 timestamp into a calendar date.
pub(crate) fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok().or_else(|| {
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|timestamp| timestamp.date_naive())
    })
}
