//! Filter AST.
//!
//! A filter arrives as a JSON object and is parsed once into [`Filter`]; the
//! compiler never looks at raw JSON keys again. Key order is preserved.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::operator::Operator;
use crate::schema::FieldType;

/// Object of clauses, implicitly AND-ed.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(try_from = "Value")]
pub struct Filter {
    clauses: Vec<Clause>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Field { key: FieldKey, node: FieldNode },
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldNode {
    /// Operator/value pairs on the field itself.
    Operators(Vec<(Operator, Value)>),
    /// Filter scoped to the related collection.
    Nested(Filter),
    Quantified(Quantifier, Filter),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantifier {
    Some,
    None,
}

impl Quantifier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Quantifier::Some => "_some",
            Quantifier::None => "_none",
        }
    }
}

impl Filter {
    pub fn parse(value: &Value) -> Result<Self> {
        match value {
            Value::Object(map) => Self::parse_object(map),
            other => Err(Error::InvalidFilter(format!(
                "expected an object, got {}",
                other
            ))),
        }
    }

    fn parse_object(map: &Map<String, Value>) -> Result<Self> {
        let mut clauses = Vec::with_capacity(map.len());

        for (key, value) in map {
            let clause = match key.as_str() {
                "_and" => Clause::And(parse_list(key, value)?),
                "_or" => Clause::Or(parse_list(key, value)?),
                _ if key.starts_with('_') => {
                    return Err(Error::InvalidFilter(format!(
                        "\"{}\" must be applied to a field",
                        key
                    )));
                }
                _ => parse_field(key, value)?,
            };
            clauses.push(clause);
        }

        Ok(Self { clauses })
    }

    pub(crate) fn from_clauses(clauses: Vec<Clause>) -> Self {
        Self { clauses }
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }
}

impl TryFrom<Value> for Filter {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        Self::parse(&value)
    }
}

fn parse_list(key: &str, value: &Value) -> Result<Vec<Filter>> {
    value
        .as_array()
        .ok_or_else(|| Error::InvalidFilter(format!("\"{}\" expects an array", key)))?
        .iter()
        .map(Filter::parse)
        .collect()
}

fn parse_field(key: &str, value: &Value) -> Result<Clause> {
    let segments = split_path(key);
    let (last, parents) = segments
        .split_last()
        .ok_or_else(|| Error::InvalidFilter("empty filter key".into()))?;

    let mut clause = Clause::Field {
        key: FieldKey::parse(last)?,
        node: FieldNode::parse(value)?,
    };

    // "a.b.c" is {a: {b: {c: ...}}}
    for parent in parents.iter().rev() {
        clause = Clause::Field {
            key: FieldKey::parse(parent)?,
            node: FieldNode::Nested(Filter {
                clauses: vec![clause],
            }),
        };
    }

    Ok(clause)
}

/// Splits on dots that are not inside parentheses.
pub(crate) fn split_path(key: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;

    for (i, c) in key.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            '.' if depth == 0 => {
                parts.push(&key[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&key[start..]);
    parts
}

impl FieldNode {
    fn parse(value: &Value) -> Result<Self> {
        let map = match value {
            Value::Object(map) => map,
            // bare values are `_eq` shorthand
            other => return Ok(FieldNode::Operators(vec![(Operator::Eq, other.clone())])),
        };

        if map.len() == 1 {
            if let Some(inner) = map.get("_some") {
                return Ok(FieldNode::Quantified(Quantifier::Some, Filter::parse(inner)?));
            }
            if let Some(inner) = map.get("_none") {
                return Ok(FieldNode::Quantified(Quantifier::None, Filter::parse(inner)?));
            }
        }

        let is_operator = |k: &String| {
            k.starts_with('_') && !matches!(k.as_str(), "_and" | "_or" | "_some" | "_none")
        };

        if !map.is_empty() && map.keys().all(is_operator) {
            let operators = map
                .iter()
                .map(|(k, v)| Ok((Operator::parse(k)?, v.clone())))
                .collect::<Result<Vec<_>>>()?;
            return Ok(FieldNode::Operators(operators));
        }

        if map.keys().any(|k| matches!(k.as_str(), "_some" | "_none")) {
            return Err(Error::InvalidFilter(
                "\"_some\" / \"_none\" must be the only key of a relational filter".into(),
            ));
        }

        Ok(FieldNode::Nested(Filter::parse_object(map)?))
    }
}

/// One segment of a filter key: `field`, `field:scope`, `fn(field)` or
/// `$FOLLOW(...)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldKey {
    /// Segment as written; also the alias map path segment.
    pub raw: String,
    pub field: String,
    pub scope: Option<String>,
    pub function: Option<FieldFunction>,
}

impl FieldKey {
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.is_empty() {
            return Err(Error::InvalidFilter("empty filter key".into()));
        }

        if raw.starts_with("$FOLLOW(") {
            return Ok(Self {
                raw: raw.to_string(),
                field: raw.to_string(),
                scope: None,
                function: None,
            });
        }

        if let (Some(open), true) = (raw.find('('), raw.ends_with(')')) {
            let name = &raw[..open];
            let function = FieldFunction::parse(name)
                .ok_or_else(|| Error::InvalidFieldFunction(raw.to_string()))?;
            let field = &raw[open + 1..raw.len() - 1];
            if field.is_empty() {
                return Err(Error::InvalidFieldFunction(raw.to_string()));
            }
            return Ok(Self {
                raw: raw.to_string(),
                field: field.to_string(),
                scope: None,
                function: Some(function),
            });
        }

        let (field, scope) = match raw.split_once(':') {
            Some((field, scope)) => (field, Some(scope.to_string())),
            None => (raw, None),
        };

        Ok(Self {
            raw: raw.to_string(),
            field: field.to_string(),
            scope,
            function: None,
        })
    }

    pub fn is_follow(&self) -> bool {
        self.field.starts_with("$FOLLOW(")
    }
}

/// Function applied to a column before comparison, e.g. `year(date_created)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldFunction {
    Year,
    Month,
    Week,
    Day,
    Weekday,
    Hour,
    Minute,
    Second,
    /// Number of elements of a JSON array.
    Count,
    /// Number of items of a comma separated value.
    CountCsv,
}

const DATE_FUNCTIONS: &[FieldFunction] = &[
    FieldFunction::Year,
    FieldFunction::Month,
    FieldFunction::Week,
    FieldFunction::Day,
    FieldFunction::Weekday,
];

const TIME_FUNCTIONS: &[FieldFunction] = &[
    FieldFunction::Hour,
    FieldFunction::Minute,
    FieldFunction::Second,
];

const DATETIME_FUNCTIONS: &[FieldFunction] = &[
    FieldFunction::Year,
    FieldFunction::Month,
    FieldFunction::Week,
    FieldFunction::Day,
    FieldFunction::Weekday,
    FieldFunction::Hour,
    FieldFunction::Minute,
    FieldFunction::Second,
];

const COUNT_FUNCTIONS: &[FieldFunction] = &[FieldFunction::Count];

impl FieldFunction {
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "year" => FieldFunction::Year,
            "month" => FieldFunction::Month,
            "week" => FieldFunction::Week,
            "day" => FieldFunction::Day,
            "weekday" => FieldFunction::Weekday,
            "hour" => FieldFunction::Hour,
            "minute" => FieldFunction::Minute,
            "second" => FieldFunction::Second,
            "count" => FieldFunction::Count,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            FieldFunction::Count | FieldFunction::CountCsv => "count",
            other => other.unit(),
        }
    }

    /// Date part name as understood by `EXTRACT` / `DATEPART`.
    pub fn unit(&self) -> &'static str {
        match self {
            FieldFunction::Year => "year",
            FieldFunction::Month => "month",
            FieldFunction::Week => "week",
            FieldFunction::Day => "day",
            FieldFunction::Weekday => "weekday",
            FieldFunction::Hour => "hour",
            FieldFunction::Minute => "minute",
            FieldFunction::Second => "second",
            FieldFunction::Count | FieldFunction::CountCsv => "count",
        }
    }

    pub fn output_type(&self) -> FieldType {
        FieldType::Integer
    }

    /// Functions available on a field of `field_type`. Relational alias
    /// fields accept `count`, compiled as an aggregate subquery.
    pub fn for_type(field_type: FieldType) -> &'static [FieldFunction] {
        match field_type {
            FieldType::Date => DATE_FUNCTIONS,
            FieldType::Time => TIME_FUNCTIONS,
            FieldType::DateTime | FieldType::Timestamp => DATETIME_FUNCTIONS,
            FieldType::Json | FieldType::Csv | FieldType::Alias => COUNT_FUNCTIONS,
            _ => &[],
        }
    }

    /// Specializes `count` for the column type it is applied to.
    pub fn for_column(self, field_type: FieldType) -> Self {
        match (self, field_type) {
            (FieldFunction::Count, FieldType::Csv) => FieldFunction::CountCsv,
            (other, _) => other,
        }
    }
}
