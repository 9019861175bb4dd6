//! Operator registry.
//!
//! Every filter operator is a variant of [`Operator`]; [`Operator::apply`]
//! turns one `(operator, value)` pair on an already resolved expression into
//! a [`Condition`]. Operators never resolve joins themselves.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::trace;

use crate::error::{Error, Result};
use crate::schema::FieldType;
use crate::sql::{CompareOp, Condition, Expr, Param, SpatialOp, to_wkt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "_eq")]
    Eq,
    #[serde(rename = "_neq")]
    Neq,
    #[serde(rename = "_ieq")]
    Ieq,
    #[serde(rename = "_nieq")]
    Nieq,
    #[serde(rename = "_lt")]
    Lt,
    #[serde(rename = "_lte")]
    Lte,
    #[serde(rename = "_gt")]
    Gt,
    #[serde(rename = "_gte")]
    Gte,
    #[serde(rename = "_in")]
    In,
    #[serde(rename = "_nin")]
    Nin,
    #[serde(rename = "_null")]
    Null,
    #[serde(rename = "_nnull")]
    Nnull,
    #[serde(rename = "_empty")]
    Empty,
    #[serde(rename = "_nempty")]
    Nempty,
    #[serde(rename = "_contains")]
    Contains,
    #[serde(rename = "_ncontains")]
    Ncontains,
    #[serde(rename = "_icontains")]
    Icontains,
    #[serde(rename = "_nicontains")]
    Nicontains,
    #[serde(rename = "_starts_with")]
    StartsWith,
    #[serde(rename = "_nstarts_with")]
    NstartsWith,
    #[serde(rename = "_istarts_with")]
    IstartsWith,
    #[serde(rename = "_nistarts_with")]
    NistartsWith,
    #[serde(rename = "_ends_with")]
    EndsWith,
    #[serde(rename = "_nends_with")]
    NendsWith,
    #[serde(rename = "_iends_with")]
    IendsWith,
    #[serde(rename = "_niends_with")]
    NiendsWith,
    #[serde(rename = "_between")]
    Between,
    #[serde(rename = "_nbetween")]
    Nbetween,
    #[serde(rename = "_intersects")]
    Intersects,
    #[serde(rename = "_nintersects")]
    Nintersects,
    #[serde(rename = "_intersects_bbox")]
    IntersectsBbox,
    #[serde(rename = "_nintersects_bbox")]
    NintersectsBbox,
}

use Operator::*;

const ALL: &[Operator] = &[
    Eq,
    Neq,
    Ieq,
    Nieq,
    Lt,
    Lte,
    Gt,
    Gte,
    In,
    Nin,
    Null,
    Nnull,
    Empty,
    Nempty,
    Contains,
    Ncontains,
    Icontains,
    Nicontains,
    StartsWith,
    NstartsWith,
    IstartsWith,
    NistartsWith,
    EndsWith,
    NendsWith,
    IendsWith,
    NiendsWith,
    Between,
    Nbetween,
    Intersects,
    Nintersects,
    IntersectsBbox,
    NintersectsBbox,
];

const TEXT: &[Operator] = &[
    Eq,
    Neq,
    Ieq,
    Nieq,
    Contains,
    Ncontains,
    Icontains,
    Nicontains,
    StartsWith,
    NstartsWith,
    IstartsWith,
    NistartsWith,
    EndsWith,
    NendsWith,
    IendsWith,
    NiendsWith,
    Empty,
    Nempty,
    Null,
    Nnull,
    In,
    Nin,
];

const ORDERED: &[Operator] = &[
    Eq, Neq, Lt, Lte, Gt, Gte, Between, Nbetween, Null, Nnull, In, Nin,
];

const UUID: &[Operator] = &[Eq, Neq, Null, Nnull, In, Nin];

const BOOLEAN: &[Operator] = &[Eq, Neq, Null, Nnull];

const JSON: &[Operator] = &[Null, Nnull];

const GEOMETRY: &[Operator] = &[
    Null,
    Nnull,
    Intersects,
    Nintersects,
    IntersectsBbox,
    NintersectsBbox,
];

const HASH: &[Operator] = &[Null, Nnull, Empty, Nempty];

impl Operator {
    pub fn parse(name: &str) -> Result<Self> {
        ALL.iter()
            .copied()
            .find(|op| op.as_str() == name)
            .ok_or_else(|| Error::UnknownOperator(name.to_string()))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Eq => "_eq",
            Neq => "_neq",
            Ieq => "_ieq",
            Nieq => "_nieq",
            Lt => "_lt",
            Lte => "_lte",
            Gt => "_gt",
            Gte => "_gte",
            In => "_in",
            Nin => "_nin",
            Null => "_null",
            Nnull => "_nnull",
            Empty => "_empty",
            Nempty => "_nempty",
            Contains => "_contains",
            Ncontains => "_ncontains",
            Icontains => "_icontains",
            Nicontains => "_nicontains",
            StartsWith => "_starts_with",
            NstartsWith => "_nstarts_with",
            IstartsWith => "_istarts_with",
            NistartsWith => "_nistarts_with",
            EndsWith => "_ends_with",
            NendsWith => "_nends_with",
            IendsWith => "_iends_with",
            NiendsWith => "_niends_with",
            Between => "_between",
            Nbetween => "_nbetween",
            Intersects => "_intersects",
            Nintersects => "_nintersects",
            IntersectsBbox => "_intersects_bbox",
            NintersectsBbox => "_nintersects_bbox",
        }
    }

    /// Operators a field of `field_type` accepts.
    pub fn for_type(field_type: FieldType) -> &'static [Operator] {
        match field_type {
            FieldType::String | FieldType::Text | FieldType::Csv => TEXT,
            FieldType::Integer
            | FieldType::BigInteger
            | FieldType::Float
            | FieldType::Decimal
            | FieldType::Date
            | FieldType::DateTime
            | FieldType::Time
            | FieldType::Timestamp => ORDERED,
            FieldType::Uuid => UUID,
            FieldType::Boolean => BOOLEAN,
            FieldType::Json => JSON,
            FieldType::Geometry => GEOMETRY,
            FieldType::Hash => HASH,
            FieldType::Binary | FieldType::Alias | FieldType::Unknown => ALL,
        }
    }

    /// Rejects operators the field type does not support. Concealed fields
    /// are limited to the hash operator set whatever their declared type.
    pub fn validate(&self, field_type: FieldType, concealed: bool) -> Result<()> {
        if !Self::for_type(field_type).contains(self) {
            return Err(Error::OperatorNotAllowedForType {
                field_type: field_type.as_str().to_string(),
                operator: self.as_str().to_string(),
            });
        }
        if concealed && !HASH.contains(self) {
            return Err(Error::OperatorNotAllowedForType {
                field_type: "conceal".to_string(),
                operator: self.as_str().to_string(),
            });
        }
        Ok(())
    }

    /// Builds the condition for `expr <op> value`. `field_type` drives date
    /// normalization of bound values and is `None` for expressions without a
    /// backing field (aggregates).
    pub fn apply(
        &self,
        expr: Expr,
        value: &Value,
        field_type: Option<FieldType>,
    ) -> Result<Condition> {
        trace!(operator = self.as_str(), value = %value, "applying operator");

        let op = self.as_str();
        let param = |v: &Value| match field_type {
            Some(t) => Param::for_field(op, v, t),
            None => Param::from_json(op, v),
        };

        let condition = match self {
            // value-less operators; `false` flips polarity
            Null | Nnull => Condition::Null {
                expr,
                negated: (*self == Nnull) != is_false(value),
            },
            Empty | Nempty => Condition::Empty {
                expr,
                negated: (*self == Nempty) != is_false(value),
            },
            Eq | Neq if value.is_null() => Condition::Null {
                expr,
                negated: *self == Neq,
            },
            Eq | Neq | Lt | Lte | Gt | Gte => Condition::Compare {
                expr,
                op: compare_op(*self),
                value: param(value)?,
                lower: false,
            },
            Ieq | Nieq => Condition::Compare {
                expr,
                op: if *self == Ieq { CompareOp::Eq } else { CompareOp::Neq },
                value: Param::String(Param::from_json(op, value)?.to_text()),
                lower: true,
            },
            Contains | Ncontains | Icontains | Nicontains => like(expr, value, "%", "%", *self)?,
            StartsWith | NstartsWith | IstartsWith | NistartsWith => {
                like(expr, value, "", "%", *self)?
            }
            EndsWith | NendsWith | IendsWith | NiendsWith => like(expr, value, "%", "", *self)?,
            In | Nin => Condition::In {
                expr,
                values: list(op, value)?
                    .iter()
                    .map(|v| param(v))
                    .collect::<Result<Vec<_>>>()?,
                negated: *self == Nin,
            },
            Between | Nbetween => {
                let bounds = list(op, value)?;
                if bounds.len() != 2 {
                    return Err(Error::InvalidOperatorArity {
                        operator: op.to_string(),
                        got: bounds.len(),
                    });
                }
                Condition::Between {
                    expr,
                    low: param(&bounds[0])?,
                    high: param(&bounds[1])?,
                    negated: *self == Nbetween,
                }
            }
            Intersects | Nintersects | IntersectsBbox | NintersectsBbox => Condition::Spatial {
                expr,
                op: if matches!(self, Intersects | Nintersects) {
                    SpatialOp::Intersects
                } else {
                    SpatialOp::IntersectsBbox
                },
                wkt: to_wkt(value)?,
                negated: matches!(self, Nintersects | NintersectsBbox),
            },
        };

        Ok(condition)
    }
}

fn is_false(value: &Value) -> bool {
    matches!(value, Value::Bool(false))
}

fn compare_op(operator: Operator) -> CompareOp {
    match operator {
        Neq => CompareOp::Neq,
        Lt => CompareOp::Lt,
        Lte => CompareOp::Lte,
        Gt => CompareOp::Gt,
        Gte => CompareOp::Gte,
        _ => CompareOp::Eq,
    }
}

fn like(
    expr: Expr,
    value: &Value,
    prefix: &str,
    suffix: &str,
    operator: Operator,
) -> Result<Condition> {
    let text = Param::from_json(operator.as_str(), value)?.to_text();
    Ok(Condition::Like {
        expr,
        pattern: format!("{}{}{}", prefix, text, suffix),
        negated: matches!(
            operator,
            Ncontains | Nicontains | NstartsWith | NistartsWith | NendsWith | NiendsWith
        ),
        lower: matches!(
            operator,
            Icontains | Nicontains | IstartsWith | NistartsWith | IendsWith | NiendsWith
        ),
    })
}

/// Array values pass through; strings are split on commas.
fn list(op: &str, value: &Value) -> Result<Vec<Value>> {
    match value {
        Value::Array(items) => Ok(items.clone()),
        Value::String(s) if s.is_empty() => Ok(Vec::new()),
        Value::String(s) => Ok(s.split(',').map(|part| Value::String(part.to_string())).collect()),
        other => Err(Error::shape(op, other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::{Dialect, QueryBuilder};
    use serde_json::json;

    fn render(op: Operator, value: Value) -> (String, Vec<Param>) {
        let mut query = QueryBuilder::new("t");
        query.and_where(op.apply(Expr::column("t", "f"), &value, None).unwrap());
        let statement = query.where_statement(Dialect::Sqlite);
        (statement.sql, statement.params)
    }

    #[test]
    fn test_parse_unknown_operator() {
        assert_eq!(Operator::parse("_starts_with").unwrap(), StartsWith);
        assert!(matches!(
            Operator::parse("_like"),
            Err(Error::UnknownOperator(name)) if name == "_like"
        ));
    }

    #[test]
    fn test_eq_null_matches_null_true() {
        assert_eq!(render(Eq, Value::Null), render(Null, json!(true)));
        assert_eq!(render(Neq, Value::Null), render(Nnull, json!(true)));
    }

    #[test]
    fn test_false_flips_polarity() {
        assert_eq!(render(Null, json!(false)), render(Nnull, json!(true)));
        assert_eq!(render(Empty, json!(false)), render(Nempty, json!(true)));
        assert_eq!(render(Empty, json!(true)).0, "(\"t\".\"f\" IS NULL OR \"t\".\"f\" = ?)");
        assert_eq!(
            render(Nempty, json!(true)).0,
            "(\"t\".\"f\" IS NOT NULL AND \"t\".\"f\" <> ?)"
        );
    }

    #[test]
    fn test_like_variants() {
        let (sql, params) = render(Nicontains, json!("Ab"));
        assert_eq!(sql, "LOWER(\"t\".\"f\") NOT LIKE LOWER(?)");
        assert_eq!(params, vec![Param::String("%Ab%".into())]);

        let (sql, params) = render(StartsWith, json!("x"));
        assert_eq!(sql, "\"t\".\"f\" LIKE ?");
        assert_eq!(params, vec![Param::String("x%".into())]);

        let (sql, params) = render(NiendsWith, json!("z"));
        assert_eq!(sql, "LOWER(\"t\".\"f\") NOT LIKE LOWER(?)");
        assert_eq!(params, vec![Param::String("%z".into())]);
    }

    #[test]
    fn test_between_arity() {
        let (sql, params) = render(Between, json!([1, 10]));
        assert_eq!(sql, "\"t\".\"f\" BETWEEN ? AND ?");
        assert_eq!(params, vec![Param::Int(1), Param::Int(10)]);

        let (_, params) = render(Nbetween, json!("a,b"));
        assert_eq!(params, vec![Param::String("a".into()), Param::String("b".into())]);

        for bad in [json!([1]), json!([1, 2, 3]), json!("1,2,3")] {
            let err = Between.apply(Expr::column("t", "f"), &bad, None).unwrap_err();
            assert!(matches!(err, Error::InvalidOperatorArity { .. }));
        }
        let err = Nbetween.apply(Expr::column("t", "f"), &json!(5), None).unwrap_err();
        assert!(matches!(err, Error::InvalidOperatorValueShape { .. }));
    }

    #[test]
    fn test_in_shapes() {
        let (sql, params) = render(In, json!("1,2"));
        assert_eq!(sql, "\"t\".\"f\" IN (?, ?)");
        assert_eq!(params, vec![Param::String("1".into()), Param::String("2".into())]);

        assert_eq!(render(In, json!([])).0, "1 = 0");
        assert_eq!(render(Nin, json!([])).0, "1 = 1");

        let err = In.apply(Expr::column("t", "f"), &json!({"a": 1}), None).unwrap_err();
        assert!(matches!(err, Error::InvalidOperatorValueShape { .. }));
    }

    #[test]
    fn test_spatial() {
        let (sql, params) = render(
            Nintersects,
            json!({"type": "Point", "coordinates": [1, 2]}),
        );
        assert_eq!(sql, "NOT (ST_Intersects(\"t\".\"f\", ST_GeomFromText(?, 4326)))");
        assert_eq!(params, vec![Param::String("POINT(1 2)".into())]);
    }

    #[test]
    fn test_case_insensitive_equality() {
        let (sql, params) = render(Ieq, json!("AbC"));
        assert_eq!(sql, "LOWER(\"t\".\"f\") = LOWER(?)");
        assert_eq!(params, vec![Param::String("AbC".into())]);

        // non-string values are compared by their text form
        let (sql, params) = render(Nieq, json!(5));
        assert_eq!(sql, "LOWER(\"t\".\"f\") <> LOWER(?)");
        assert_eq!(params, vec![Param::String("5".into())]);
    }

    #[test]
    fn test_spatial_bbox() {
        let point = json!({"type": "Point", "coordinates": [1, 2]});

        let (sql, params) = render(IntersectsBbox, point.clone());
        assert_eq!(sql, "MbrIntersects(\"t\".\"f\", ST_GeomFromText(?, 4326))");
        assert_eq!(params, vec![Param::String("POINT(1 2)".into())]);

        let (sql, _) = render(NintersectsBbox, point.clone());
        assert_eq!(sql, "NOT (MbrIntersects(\"t\".\"f\", ST_GeomFromText(?, 4326)))");

        let (sql, _) = render(Intersects, point);
        assert_eq!(sql, "ST_Intersects(\"t\".\"f\", ST_GeomFromText(?, 4326))");
    }

    #[test]
    fn test_validate_per_type() {
        assert!(Contains.validate(FieldType::String, false).is_ok());
        assert!(Contains.validate(FieldType::Integer, false).is_err());
        assert!(Gt.validate(FieldType::Date, false).is_ok());
        assert!(Intersects.validate(FieldType::Geometry, false).is_ok());
        assert!(Eq.validate(FieldType::Boolean, false).is_ok());
        assert!(Eq.validate(FieldType::String, true).is_err());
        assert!(Null.validate(FieldType::String, true).is_ok());
    }
}
