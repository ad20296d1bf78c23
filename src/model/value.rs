use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::model::Conversion;

/// Doubles closer than this compare equal
const DOUBLE_EPSILON: f64 = 1.0e-8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Undefined,
    Bool,
    Integer,
    Double,
    String,
    Timestamp,
}

impl ValueKind {
    pub fn name(&self) -> &'static str {
        match self {
            ValueKind::Undefined => "undefined",
            ValueKind::Bool => "bool",
            ValueKind::Integer => "integer",
            ValueKind::Double => "double",
            ValueKind::String => "string",
            ValueKind::Timestamp => "timestamp",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Undefined,
    Bool(bool),
    Integer(i64),
    Double(f64),
    String(String),
    Timestamp(DateTime<Utc>),
}

/// Borrowed view of a value. Scalars are copied, strings and timestamps are
/// borrowed from the owner.
#[derive(Debug, Clone, Copy, Default)]
pub enum ValueRef<'a> {
    #[default]
    Undefined,
    Bool(bool),
    Integer(i64),
    Double(f64),
    String(&'a str),
    Timestamp(&'a DateTime<Utc>),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        self.as_value_ref().kind()
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn as_value_ref(&self) -> ValueRef<'_> {
        match self {
            Value::Undefined => ValueRef::Undefined,
            Value::Bool(b) => ValueRef::Bool(*b),
            Value::Integer(i) => ValueRef::Integer(*i),
            Value::Double(d) => ValueRef::Double(*d),
            Value::String(s) => ValueRef::String(s.as_str()),
            Value::Timestamp(t) => ValueRef::Timestamp(t),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Double(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<&DateTime<Utc>> {
        match self {
            Value::Timestamp(t) => Some(t),
            _ => None,
        }
    }

    /// Convert into `kind` using `conversion`, or the process-wide default
    pub fn convert_to(&self, kind: ValueKind, conversion: Option<&Conversion>) -> Option<Value> {
        self.as_value_ref().convert_to(kind, conversion)
    }

    pub fn can_convert_to(&self, kind: ValueKind, conversion: Option<&Conversion>) -> bool {
        self.as_value_ref().can_convert_to(kind, conversion)
    }

    /// Exact text form used to persist a value on a backend node. It does
    /// not depend on any [`Conversion`], so a stored value reads back as
    /// written.
    pub fn to_storage_text(&self) -> Option<String> {
        match self {
            Value::Undefined => None,
            Value::Bool(b) => Some(b.to_string()),
            Value::Integer(i) => Some(i.to_string()),
            // Shortest representation that parses back to the same bits
            Value::Double(d) => Some(d.to_string()),
            Value::String(s) => Some(s.clone()),
            Value::Timestamp(t) => Some(t.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
        }
    }

    /// Read text written by [`Value::to_storage_text`]. Text in any other
    /// form, e.g. from hand-edited documents, goes through the default
    /// conversion.
    pub fn from_storage_text(kind: ValueKind, text: &str) -> Option<Value> {
        let exact = match kind {
            ValueKind::Undefined => None,
            ValueKind::Bool => match text {
                "true" => Some(Value::Bool(true)),
                "false" => Some(Value::Bool(false)),
                _ => None,
            },
            ValueKind::Integer => text.parse().ok().map(Value::Integer),
            ValueKind::Double => text.parse().ok().map(Value::Double),
            ValueKind::String => Some(Value::String(text.to_string())),
            ValueKind::Timestamp => DateTime::parse_from_rfc3339(text)
                .ok()
                .map(|t| Value::Timestamp(t.with_timezone(&Utc))),
        };
        exact.or_else(|| ValueRef::String(text).convert_to(kind, None))
    }

    pub fn compare(
        &self,
        other: &Value,
        allow_conversion: bool,
        conversion: Option<&Conversion>,
    ) -> Option<Ordering> {
        self.as_value_ref()
            .compare(other.as_value_ref(), allow_conversion, conversion)
    }
}

impl<'a> ValueRef<'a> {
    pub fn kind(&self) -> ValueKind {
        match self {
            ValueRef::Undefined => ValueKind::Undefined,
            ValueRef::Bool(_) => ValueKind::Bool,
            ValueRef::Integer(_) => ValueKind::Integer,
            ValueRef::Double(_) => ValueKind::Double,
            ValueRef::String(_) => ValueKind::String,
            ValueRef::Timestamp(_) => ValueKind::Timestamp,
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, ValueRef::Undefined)
    }

    pub fn to_value(&self) -> Value {
        match *self {
            ValueRef::Undefined => Value::Undefined,
            ValueRef::Bool(b) => Value::Bool(b),
            ValueRef::Integer(i) => Value::Integer(i),
            ValueRef::Double(d) => Value::Double(d),
            ValueRef::String(s) => Value::String(s.to_string()),
            ValueRef::Timestamp(t) => Value::Timestamp(*t),
        }
    }

    pub fn convert_to(&self, kind: ValueKind, conversion: Option<&Conversion>) -> Option<Value> {
        match conversion {
            Some(conversion) => conversion.convert(kind, *self),
            None => Conversion::global_default().convert(kind, *self),
        }
    }

    pub fn can_convert_to(&self, kind: ValueKind, conversion: Option<&Conversion>) -> bool {
        match conversion {
            Some(conversion) => conversion.can_convert(kind, *self),
            None => Conversion::global_default().can_convert(kind, *self),
        }
    }

    /// Three-way comparison. Returns `None` when the kinds differ and
    /// conversion is not allowed, or when the conversion fails.
    pub fn compare(
        &self,
        other: ValueRef<'_>,
        allow_conversion: bool,
        conversion: Option<&Conversion>,
    ) -> Option<Ordering> {
        if self.kind() != other.kind() {
            if !allow_conversion {
                return None;
            }
            let converted = other.convert_to(self.kind(), conversion)?;
            return self.compare_same_kind(converted.as_value_ref());
        }
        self.compare_same_kind(other)
    }

    fn compare_same_kind(&self, other: ValueRef<'_>) -> Option<Ordering> {
        match (*self, other) {
            (ValueRef::Undefined, ValueRef::Undefined) => Some(Ordering::Equal),
            (ValueRef::Bool(a), ValueRef::Bool(b)) => Some(a.cmp(&b)),
            (ValueRef::Integer(a), ValueRef::Integer(b)) => Some(a.cmp(&b)),
            (ValueRef::Double(a), ValueRef::Double(b)) => {
                if (a - b).abs() < DOUBLE_EPSILON {
                    Some(Ordering::Equal)
                } else {
                    a.partial_cmp(&b)
                }
            }
            (ValueRef::String(a), ValueRef::String(b)) => Some(a.cmp(b)),
            (ValueRef::Timestamp(a), ValueRef::Timestamp(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other, false, None) == Some(Ordering::Equal)
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.compare(other, false, None)
    }
}

impl PartialEq for ValueRef<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.compare(*other, false, None) == Some(Ordering::Equal)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.convert_to(ValueKind::String, None) {
            Some(Value::String(s)) => f.write_str(&s),
            _ => Ok(()),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Integer(value as i64)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Double(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Value::Timestamp(value)
    }
}

impl<'a> From<&'a Value> for ValueRef<'a> {
    fn from(value: &'a Value) -> Self {
        value.as_value_ref()
    }
}

impl<'a> From<&'a str> for ValueRef<'a> {
    fn from(value: &'a str) -> Self {
        ValueRef::String(value)
    }
}

impl<'a> From<&'a String> for ValueRef<'a> {
    fn from(value: &'a String) -> Self {
        ValueRef::String(value.as_str())
    }
}

impl From<bool> for ValueRef<'_> {
    fn from(value: bool) -> Self {
        ValueRef::Bool(value)
    }
}

impl From<i64> for ValueRef<'_> {
    fn from(value: i64) -> Self {
        ValueRef::Integer(value)
    }
}

impl From<f64> for ValueRef<'_> {
    fn from(value: f64) -> Self {
        ValueRef::Double(value)
    }
}

impl<'a> From<&'a DateTime<Utc>> for ValueRef<'a> {
    fn from(value: &'a DateTime<Utc>) -> Self {
        ValueRef::Timestamp(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mismatched_kinds_are_not_comparable() {
        let a = Value::from(1);
        let b = Value::from("1");
        assert_eq!(a.compare(&b, false, None), None);
        assert_ne!(a, b);
        assert_eq!(a.compare(&b, true, None), Some(Ordering::Equal));
    }

    #[test]
    fn test_storage_text_reads_back_exactly() {
        let stamp = DateTime::parse_from_rfc3339("2024-02-29T23:59:58.123456789Z")
            .unwrap()
            .with_timezone(&Utc);
        let values = [
            Value::Bool(true),
            Value::Bool(false),
            Value::Integer(i64::MIN),
            Value::Double(3.14159265),
            Value::Double(1234567.0),
            Value::Double(1e-12),
            Value::String(" spaced ".to_string()),
            Value::Timestamp(stamp),
        ];
        for value in values {
            let text = value.to_storage_text().unwrap();
            let back = Value::from_storage_text(value.kind(), &text).unwrap();
            // Bitwise for doubles, not within tolerance
            match (&value, &back) {
                (Value::Double(a), Value::Double(b)) => assert_eq!(a.to_bits(), b.to_bits(), "{}", text),
                _ => assert_eq!(value, back),
            }
        }
        assert_eq!(Value::Double(3.14159265).to_storage_text().as_deref(), Some("3.14159265"));
        assert_eq!(Value::Undefined.to_storage_text(), None);
    }

    #[test]
    fn test_storage_text_accepts_foreign_forms() {
        assert_eq!(
            Value::from_storage_text(ValueKind::Timestamp, "2024-01-05"),
            Some(Value::Timestamp(
                DateTime::parse_from_rfc3339("2024-01-05T00:00:00Z")
                    .unwrap()
                    .with_timezone(&Utc)
            ))
        );
        assert_eq!(Value::from_storage_text(ValueKind::Integer, " 12 "), Some(Value::Integer(12)));
        assert_eq!(Value::from_storage_text(ValueKind::Integer, "abc"), None);
        assert_eq!(Value::from_storage_text(ValueKind::Undefined, "x"), None);
    }

    #[test]
    fn test_double_tolerance() {
        let a = Value::from(0.1 + 0.2);
        let b = Value::from(0.3);
        assert_eq!(a, b);
        assert!(Value::from(1.0) < Value::from(2.0));
    }

    #[test]
    fn test_undefined_equals_only_undefined() {
        assert_eq!(Value::Undefined, Value::Undefined);
        assert_ne!(Value::Undefined, Value::from(false));
        assert!(Value::default().is_undefined());
    }

    #[test]
    fn test_value_ref_borrows_string() {
        let owned = Value::from("Fruit");
        let borrowed = owned.as_value_ref();
        assert_eq!(borrowed.kind(), ValueKind::String);
        assert_eq!(borrowed, ValueRef::from("Fruit"));
        assert_eq!(borrowed.to_value(), owned);
    }

    #[test]
    fn test_untagged_json_values() {
        let values: Vec<Value> = serde_json::from_str(r#"[null, true, 3, 2.5, "text"]"#).unwrap();
        assert_eq!(values[0].kind(), ValueKind::Undefined);
        assert_eq!(values[1].kind(), ValueKind::Bool);
        assert_eq!(values[2].kind(), ValueKind::Integer);
        assert_eq!(values[3].kind(), ValueKind::Double);
        assert_eq!(values[4].kind(), ValueKind::String);
    }
}
