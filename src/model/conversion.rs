//! Conversion rules between value kinds.
//!
//! Only an explicit allow-list of kind pairs converts:
//!
//! | from \ to  | bool | integer | double | string | timestamp |
//! |------------|------|---------|--------|--------|-----------|
//! | bool       | ✓    | ✓       |        | ✓      |           |
//! | integer    | ✓    | ✓       | ✓      | ✓      |           |
//! | double     |      | ✓       | ✓      | ✓      |           |
//! | string     | ✓    | ✓       | ✓      | ✓      | ✓         |
//! | timestamp  |      |         |        | ✓      | ✓         |
//!
//! Pairs are never chained, so e.g. bool → double fails even though
//! bool → integer → double would succeed.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::model::{Value, ValueKind, ValueRef};

static GLOBAL_DEFAULT: RwLock<Option<Arc<Conversion>>> = parking_lot::const_rwlock(None);

/// How a double is turned into an integer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoundingRule {
    #[default]
    Round,
    Floor,
    Ceil,
    Truncate,
}

/// How a double is turned into a string
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DoubleFormat {
    /// Shortest of fixed/scientific with `precision` significant digits
    #[default]
    Default,
    Scientific,
    Fixed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Conversion {
    pub bool_true: String,
    pub bool_false: String,
    pub rounding: RoundingRule,
    pub double_format: DoubleFormat,
    pub double_precision: usize,
}

impl Default for Conversion {
    fn default() -> Self {
        Self {
            bool_true: "true".to_string(),
            bool_false: "false".to_string(),
            rounding: RoundingRule::Round,
            double_format: DoubleFormat::Default,
            double_precision: 6,
        }
    }
}

impl Conversion {
    /// Process-wide default used whenever no explicit conversion is given
    pub fn global_default() -> Arc<Conversion> {
        if let Some(conversion) = GLOBAL_DEFAULT.read().as_ref() {
            return conversion.clone();
        }
        GLOBAL_DEFAULT
            .write()
            .get_or_insert_with(|| Arc::new(Conversion::default()))
            .clone()
    }

    pub fn set_global_default(conversion: Conversion) {
        *GLOBAL_DEFAULT.write() = Some(Arc::new(conversion));
    }

    pub fn with_bool_tokens(mut self, bool_true: &str, bool_false: &str) -> Self {
        self.bool_true = bool_true.to_string();
        self.bool_false = bool_false.to_string();
        self
    }

    pub fn with_rounding(mut self, rounding: RoundingRule) -> Self {
        self.rounding = rounding;
        self
    }

    pub fn with_double_format(mut self, format: DoubleFormat, precision: usize) -> Self {
        self.double_format = format;
        self.double_precision = precision;
        self
    }

    /// Whether the pair (src kind, dest kind) is on the allow-list at all
    pub fn is_allowed(src: ValueKind, dest: ValueKind) -> bool {
        use ValueKind::*;
        if src == dest {
            return true;
        }
        matches!(
            (src, dest),
            (Bool, Integer)
                | (Integer, Bool)
                | (Integer, Double)
                | (Double, Integer)
                | (Bool, String)
                | (String, Bool)
                | (Integer, String)
                | (String, Integer)
                | (Double, String)
                | (String, Double)
                | (String, Timestamp)
                | (Timestamp, String)
        )
    }

    /// Pure predicate; always agrees with [`Conversion::convert`]
    pub fn can_convert(&self, dest: ValueKind, src: ValueRef<'_>) -> bool {
        self.convert(dest, src).is_some()
    }

    pub fn convert(&self, dest: ValueKind, src: ValueRef<'_>) -> Option<Value> {
        if !Self::is_allowed(src.kind(), dest) {
            return None;
        }
        match (src, dest) {
            (src, dest) if src.kind() == dest => Some(src.to_value()),

            (ValueRef::Integer(i), ValueKind::Bool) => Some(Value::Bool(i != 0)),
            (ValueRef::Bool(b), ValueKind::Integer) => Some(Value::Integer(i64::from(b))),

            (ValueRef::Integer(i), ValueKind::Double) => Some(Value::Double(i as f64)),
            (ValueRef::Double(d), ValueKind::Integer) => self.double_to_integer(d).map(Value::Integer),

            (ValueRef::Bool(b), ValueKind::String) => Some(Value::String(if b {
                self.bool_true.clone()
            } else {
                self.bool_false.clone()
            })),
            (ValueRef::String(s), ValueKind::Bool) => {
                if s == self.bool_true {
                    Some(Value::Bool(true))
                } else if s == self.bool_false {
                    Some(Value::Bool(false))
                } else {
                    None
                }
            }

            (ValueRef::Integer(i), ValueKind::String) => Some(Value::String(i.to_string())),
            (ValueRef::String(s), ValueKind::Integer) => s.trim().parse::<i64>().ok().map(Value::Integer),

            (ValueRef::Double(d), ValueKind::String) => Some(Value::String(self.format_double(d))),
            (ValueRef::String(s), ValueKind::Double) => s.trim().parse::<f64>().ok().map(Value::Double),

            (ValueRef::Timestamp(t), ValueKind::String) => {
                Some(Value::String(t.to_rfc3339_opts(SecondsFormat::AutoSi, true)))
            }
            (ValueRef::String(s), ValueKind::Timestamp) => parse_timestamp(s).map(Value::Timestamp),

            _ => None,
        }
    }

    fn double_to_integer(&self, value: f64) -> Option<i64> {
        if !value.is_finite() {
            return None;
        }
        let rounded = match self.rounding {
            RoundingRule::Round => value.round(),
            RoundingRule::Floor => value.floor(),
            RoundingRule::Ceil => value.ceil(),
            RoundingRule::Truncate => value.trunc(),
        };
        if rounded < i64::MIN as f64 || rounded >= i64::MAX as f64 {
            return None;
        }
        Some(rounded as i64)
    }

    fn format_double(&self, value: f64) -> String {
        if value.is_nan() {
            return "nan".to_string();
        }
        if value.is_infinite() {
            return if value > 0.0 { "inf" } else { "-inf" }.to_string();
        }
        let precision = self.double_precision;
        match self.double_format {
            DoubleFormat::Fixed => format!("{:.*}", precision, value),
            DoubleFormat::Scientific => {
                let formatted = format!("{:.*e}", precision, value);
                normalize_exponent(&formatted)
            }
            DoubleFormat::Default => format_general(value, precision),
        }
    }
}

/// `%g` style: significant digits, trailing zeros removed, scientific
/// notation for very small or large magnitudes
fn format_general(value: f64, precision: usize) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    let precision = precision.max(1);
    let scientific = format!("{:.*e}", precision - 1, value);
    let exponent: i32 = scientific
        .split_once('e')
        .and_then(|(_, exp)| exp.parse().ok())
        .unwrap_or(0);

    if exponent < -4 || exponent >= precision as i32 {
        let (mantissa, _) = scientific.split_once('e').unwrap_or((&scientific, ""));
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", trim_fraction(mantissa), sign, exponent.abs())
    } else {
        let decimals = (precision as i32 - 1 - exponent).max(0) as usize;
        trim_fraction(&format!("{:.*}", decimals, value))
    }
}

fn normalize_exponent(formatted: &str) -> String {
    match formatted.split_once('e') {
        Some((mantissa, exp)) => {
            let exponent: i32 = exp.parse().unwrap_or(0);
            let sign = if exponent < 0 { '-' } else { '+' };
            format!("{}e{}{:02}", mantissa, sign, exponent.abs())
        }
        None => formatted.to_string(),
    }
}

fn trim_fraction(number: &str) -> String {
    if !number.contains('.') {
        return number.to_string();
    }
    number
        .trim_end_matches('0')
        .trim_end_matches('.')
        .to_string()
}

fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conv() -> Conversion {
        Conversion::default()
    }

    #[test]
    fn test_allow_list_is_not_chained() {
        let c = conv();
        assert!(c.convert(ValueKind::Double, ValueRef::Bool(true)).is_none());
        assert!(!c.can_convert(ValueKind::Double, ValueRef::Bool(true)));
        assert!(c.convert(ValueKind::Timestamp, ValueRef::Integer(0)).is_none());
        assert!(c.convert(ValueKind::Integer, ValueRef::Undefined).is_none());
        assert_eq!(
            c.convert(ValueKind::Undefined, ValueRef::Undefined),
            Some(Value::Undefined)
        );
    }

    #[test]
    fn test_bool_integer_round_trip() {
        let c = conv();
        for b in [true, false] {
            let i = c.convert(ValueKind::Integer, ValueRef::Bool(b)).unwrap();
            let back = c.convert(ValueKind::Bool, i.as_value_ref()).unwrap();
            assert_eq!(back, Value::Bool(b));
        }
        assert_eq!(c.convert(ValueKind::Bool, ValueRef::Integer(7)), Some(Value::Bool(true)));
    }

    #[test]
    fn test_integer_double_round_trip() {
        let c = conv();
        for i in [-42_i64, 0, 1, 1 << 40] {
            let d = c.convert(ValueKind::Double, ValueRef::Integer(i)).unwrap();
            let back = c.convert(ValueKind::Integer, d.as_value_ref()).unwrap();
            assert_eq!(back, Value::Integer(i));
        }
    }

    #[test]
    fn test_rounding_rules() {
        let value = ValueRef::Double(-2.5);
        let expect = [
            (RoundingRule::Round, -3),
            (RoundingRule::Floor, -3),
            (RoundingRule::Ceil, -2),
            (RoundingRule::Truncate, -2),
        ];
        for (rule, expected) in expect {
            let c = conv().with_rounding(rule);
            assert_eq!(c.convert(ValueKind::Integer, value), Some(Value::Integer(expected)));
        }
        assert!(conv().convert(ValueKind::Integer, ValueRef::Double(f64::NAN)).is_none());
    }

    #[test]
    fn test_bool_tokens_are_configurable() {
        let c = conv().with_bool_tokens("yes", "no");
        assert_eq!(c.convert(ValueKind::String, ValueRef::Bool(true)), Some(Value::from("yes")));
        assert_eq!(c.convert(ValueKind::Bool, ValueRef::String("no")), Some(Value::Bool(false)));
        assert!(c.convert(ValueKind::Bool, ValueRef::String("true")).is_none());
        assert!(!c.can_convert(ValueKind::Bool, ValueRef::String("maybe")));
    }

    #[test]
    fn test_double_formats() {
        let c = conv();
        assert_eq!(c.convert(ValueKind::String, ValueRef::Double(1.5)), Some(Value::from("1.5")));
        assert_eq!(c.convert(ValueKind::String, ValueRef::Double(1234567.0)), Some(Value::from("1.23457e+06")));
        assert_eq!(c.convert(ValueKind::String, ValueRef::Double(0.0001)), Some(Value::from("0.0001")));

        let fixed = conv().with_double_format(DoubleFormat::Fixed, 2);
        assert_eq!(fixed.convert(ValueKind::String, ValueRef::Double(3.14159)), Some(Value::from("3.14")));

        let sci = conv().with_double_format(DoubleFormat::Scientific, 3);
        assert_eq!(sci.convert(ValueKind::String, ValueRef::Double(1500.0)), Some(Value::from("1.500e+03")));
    }

    #[test]
    fn test_string_parsing() {
        let c = conv();
        assert_eq!(c.convert(ValueKind::Integer, ValueRef::String(" 12 ")), Some(Value::Integer(12)));
        assert!(c.convert(ValueKind::Integer, ValueRef::String("12abc")).is_none());
        assert_eq!(c.convert(ValueKind::Double, ValueRef::String("2.25")), Some(Value::Double(2.25)));
    }

    #[test]
    fn test_timestamp_string_round_trip() {
        let c = conv();
        let ts = c
            .convert(ValueKind::Timestamp, ValueRef::String("2024-01-01T10:30:00Z"))
            .unwrap();
        let text = c.convert(ValueKind::String, ts.as_value_ref()).unwrap();
        assert_eq!(text, Value::from("2024-01-01T10:30:00Z"));
        assert!(c.can_convert(ValueKind::Timestamp, ValueRef::String("2024-01-01")));
        assert!(!c.can_convert(ValueKind::Timestamp, ValueRef::String("yesterday")));
    }
}
