use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::schema::FieldType;

/// A bound parameter value.
///
/// Integers that do not fit `i64` and every string stay text; nothing is ever
/// routed through a float unless the input already was one. Numeric text
/// compared against a numeric field is kept apart as [`Param::Numeric`] so the
/// renderer can cast it where the database will not compare text to numbers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Param {
    Null,
    String(String),
    Numeric(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Time(NaiveTime),
    Timestamp(DateTime<Utc>),
}

impl Param {
    /// Converts a scalar JSON value. Arrays and objects are rejected with the
    /// operator name so the error points at the offending clause.
    pub fn from_json(operator: &str, value: &Value) -> Result<Self> {
        match value {
            Value::Null => Ok(Param::Null),
            Value::Bool(b) => Ok(Param::Bool(*b)),
            Value::String(s) => Ok(Param::String(s.clone())),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Param::Int(i))
                } else if n.is_u64() {
                    Ok(Param::String(n.to_string()))
                } else {
                    Ok(n.as_f64().map(Param::Float).unwrap_or_else(|| Param::String(n.to_string())))
                }
            }
            Value::Array(_) | Value::Object(_) => Err(Error::shape(operator, value)),
        }
    }

    /// Like [`Param::from_json`], then parses strings compared against
    /// temporal fields into typed chrono values when they are well formed.
    /// Number-shaped strings on numeric fields become [`Param::Numeric`].
    pub fn for_field(operator: &str, value: &Value, field_type: FieldType) -> Result<Self> {
        let param = Self::from_json(operator, value)?;
        Ok(match param {
            Param::String(s) if field_type.is_temporal() => {
                parse_temporal(&s, field_type).unwrap_or(Param::String(s))
            }
            Param::String(s) if field_type.is_numeric() && is_numeric_text(&s) => {
                Param::Numeric(s)
            }
            other => other,
        })
    }

    pub fn as_string(&self) -> Option<&str> {
        match self {
            Param::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Param::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Param::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Param::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Param::Null)
    }

    /// Text form used when building LIKE patterns.
    pub fn to_text(&self) -> String {
        match self {
            Param::Null => String::new(),
            Param::String(s) | Param::Numeric(s) => s.clone(),
            Param::Int(i) => i.to_string(),
            Param::Float(f) => f.to_string(),
            Param::Bool(b) => b.to_string(),
            Param::Date(d) => d.to_string(),
            Param::DateTime(dt) => dt.to_string(),
            Param::Time(t) => t.to_string(),
            Param::Timestamp(t) => t.to_rfc3339(),
        }
    }
}

fn is_numeric_text(raw: &str) -> bool {
    raw.parse::<i128>().is_ok() || raw.parse::<f64>().is_ok_and(f64::is_finite)
}

fn parse_temporal(raw: &str, field_type: FieldType) -> Option<Param> {
    match field_type {
        FieldType::Date => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .ok()
            .map(Param::Date),
        FieldType::Time => NaiveTime::parse_from_str(raw, "%H:%M:%S%.f")
            .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
            .ok()
            .map(Param::Time),
        FieldType::DateTime => parse_naive_datetime(raw)
            .or_else(|| {
                DateTime::parse_from_rfc3339(raw)
                    .ok()
                    .map(|dt| dt.with_timezone(&Utc).naive_utc())
            })
            .map(Param::DateTime),
        FieldType::Timestamp => DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
            .or_else(|| parse_naive_datetime(raw).map(|naive| naive.and_utc()))
            .map(Param::Timestamp),
        _ => None,
    }
}

fn parse_naive_datetime(raw: &str) -> Option<NaiveDateTime> {
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Conversion of plain Rust values into bound parameters.
pub trait ToParam {
    fn to_param(&self) -> Param;
}

impl ToParam for String {
    fn to_param(&self) -> Param {
        Param::String(self.clone())
    }
}

impl ToParam for &str {
    fn to_param(&self) -> Param {
        Param::String(self.to_string())
    }
}

impl ToParam for i64 {
    fn to_param(&self) -> Param {
        Param::Int(*self)
    }
}

impl ToParam for i32 {
    fn to_param(&self) -> Param {
        Param::Int(*self as i64)
    }
}

impl ToParam for f64 {
    fn to_param(&self) -> Param {
        Param::Float(*self)
    }
}

impl ToParam for bool {
    fn to_param(&self) -> Param {
        Param::Bool(*self)
    }
}

impl ToParam for NaiveDate {
    fn to_param(&self) -> Param {
        Param::Date(*self)
    }
}

impl ToParam for DateTime<Utc> {
    fn to_param(&self) -> Param {
        Param::Timestamp(*self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_large_integers_stay_exact() {
        let above_i64 = Param::from_json("_eq", &json!(18446744073709551615u64)).unwrap();
        assert_eq!(above_i64, Param::String("18446744073709551615".into()));

        let text = Param::from_json("_eq", &json!("9007199254740993")).unwrap();
        assert_eq!(text, Param::String("9007199254740993".into()));

        let int = Param::from_json("_eq", &json!(9007199254740993i64)).unwrap();
        assert_eq!(int.as_int(), Some(9007199254740993));
    }

    #[test]
    fn test_to_param() {
        assert_eq!("image".to_param(), Param::String("image".into()));
        assert_eq!(7i32.to_param().as_int(), Some(7));
        assert_eq!(true.to_param().as_bool(), Some(true));
        assert_eq!(1.5f64.to_param().as_float(), Some(1.5));
        assert!(Param::Null.is_null());
    }

    #[test]
    fn test_arrays_rejected() {
        let err = Param::from_json("_eq", &json!([1, 2])).unwrap_err();
        assert!(matches!(err, Error::InvalidOperatorValueShape { .. }));
    }

    #[test]
    fn test_temporal_normalization() {
        let date = Param::for_field("_eq", &json!("2021-03-04"), FieldType::Date).unwrap();
        assert_eq!(date, Param::Date(NaiveDate::from_ymd_opt(2021, 3, 4).unwrap()));

        let ts =
            Param::for_field("_gt", &json!("2021-03-04T10:00:00Z"), FieldType::Timestamp).unwrap();
        assert!(matches!(ts, Param::Timestamp(_)));

        let dt =
            Param::for_field("_gt", &json!("2021-03-04 10:00:00"), FieldType::DateTime).unwrap();
        assert!(matches!(dt, Param::DateTime(_)));

        // dynamic variables and garbage pass through untouched
        let raw = Param::for_field("_eq", &json!("$NOW"), FieldType::Date).unwrap();
        assert_eq!(raw.as_string(), Some("$NOW"));

        let text = Param::for_field("_eq", &json!("42"), FieldType::String).unwrap();
        assert_eq!(text.as_string(), Some("42"));
    }

    #[test]
    fn test_numeric_text_on_numeric_fields() {
        let num =
            Param::for_field("_eq", &json!("9007199254740993"), FieldType::BigInteger).unwrap();
        assert_eq!(num, Param::Numeric("9007199254740993".into()));
        assert_eq!(num.to_text(), "9007199254740993");

        let num = Param::for_field("_gt", &json!("-1.25"), FieldType::Decimal).unwrap();
        assert_eq!(num, Param::Numeric("-1.25".into()));

        let above_i64 = Param::for_field("_eq", &json!(u64::MAX), FieldType::BigInteger).unwrap();
        assert_eq!(above_i64, Param::Numeric(u64::MAX.to_string()));

        // not number shaped, left for the database to reject
        for raw in ["abc", "NaN", "inf", ""] {
            let param = Param::for_field("_eq", &json!(raw), FieldType::Integer).unwrap();
            assert_eq!(param.as_string(), Some(raw));
        }
    }
}
